pub fn regulation_answer_prompt(context: &str, question: &str) -> String {
    format!(
        "Vous êtes un expert en règlements techniques. Basé sur la documentation fournie, \
         répondez à la question de manière claire et précise en français ou en russe selon \
         la langue de la question.\n\n\
         Documentation:\n{context}\n\n\
         Question: {question}\n\n\
         Réponse (soyez précis, citez les articles et points pertinents):"
    )
}
