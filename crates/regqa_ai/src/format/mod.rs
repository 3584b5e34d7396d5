//! Display rendering for answers and their cited sources.
use regqa_core::domain::ChunkMetadata;

pub const MAX_CITATIONS: usize = 3;
pub const PREVIEW_CHARS: usize = 150;

fn or_na(s: &str) -> &str {
    if s.trim().is_empty() {
        "N/A"
    } else {
        s
    }
}

fn preview(doc: &str) -> String {
    let head: String = doc.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", head.replace('\n', " "))
}

/// Streaming render of the answer so far; every emission replaces the previous one.
pub fn partial_response(question: &str, answer_so_far: &str) -> String {
    format!("**Question:** {question}\n\n**Réponse:** {answer_so_far}")
}

pub fn format_response(
    question: &str,
    answer: &str,
    documents: &[String],
    metadatas: &[ChunkMetadata],
) -> String {
    let mut out = format!("**Question:** {question}\n\n**Réponse:** {answer}\n\n**Sources:**\n");
    for (i, (doc, meta)) in documents
        .iter()
        .zip(metadatas.iter())
        .take(MAX_CITATIONS)
        .enumerate()
    {
        out.push_str(&format!(
            "\n{}. **Article {}, Point {}** ({})\n   {}\n",
            i + 1,
            or_na(&meta.article_num),
            or_na(&meta.point_num),
            or_na(&meta.article_title),
            preview(doc)
        ));
    }
    out
}

/// Every retrieved passage in rank order with its distance; no answer section.
pub fn format_hits(documents: &[String], metadatas: &[ChunkMetadata], distances: &[f32]) -> String {
    let mut out = String::new();
    for (i, ((doc, meta), distance)) in documents
        .iter()
        .zip(metadatas.iter())
        .zip(distances.iter())
        .enumerate()
    {
        out.push_str(&format!(
            "{}. **Article {}, Point {}** ({}) [distance {:.4}]\n   {}\n",
            i + 1,
            or_na(&meta.article_num),
            or_na(&meta.point_num),
            or_na(&meta.article_title),
            distance,
            preview(doc)
        ));
    }
    out
}
