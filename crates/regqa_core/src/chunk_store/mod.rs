use std::fs;
use std::path::Path;

use crate::domain::Chunk;
use crate::error::{codes, AppError};

const ID_LABEL: &str = "ID:";
const ARTICLE_LABEL: &str = "номер статьи:";
const POINT_LABEL: &str = "номер пункта внутри статьи:";
const TEXT_LABEL: &str = "Text:";

/// 80 dashes; terminates every block.
pub fn block_separator() -> String {
    "-".repeat(80)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLoad {
    pub chunks: Vec<Chunk>,
    /// Blocks without a non-empty `ID:` or `Text:` line.
    pub skipped_blocks: usize,
}

/// Render chunks in the line-oriented chunk file format.
pub fn render_chunks(chunks: &[Chunk]) -> String {
    let sep = block_separator();
    let mut out = String::new();
    for c in chunks {
        out.push_str(&format!("{ID_LABEL} {}\n", c.id));
        out.push_str(&format!("{ARTICLE_LABEL} {}\t{}\n", c.article_num, c.article_title));
        out.push_str(&format!("{POINT_LABEL} {}\n", c.point_num));
        out.push_str(&format!("{TEXT_LABEL} {}\n", c.text));
        out.push_str(&sep);
        out.push_str("\n\n");
    }
    out
}

/// Exact inverse of [`render_chunks`] for texts that do not contain the separator.
pub fn parse_chunks(content: &str) -> ChunkLoad {
    let mut chunks = Vec::new();
    let mut skipped_blocks = 0usize;

    for (ordinal, block) in content.split(block_separator().as_str()).enumerate() {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        match parse_block(block) {
            Some(chunk) => chunks.push(chunk),
            None => {
                skipped_blocks += 1;
                tracing::warn!(block = ordinal, "skipping malformed chunk block");
            }
        }
    }

    ChunkLoad {
        chunks,
        skipped_blocks,
    }
}

fn parse_block(block: &str) -> Option<Chunk> {
    let lines: Vec<&str> = block.split('\n').collect();

    let mut id: Option<String> = None;
    let mut article_num = String::new();
    let mut article_title = String::new();
    let mut point_num = String::new();
    let mut text: Option<String> = None;

    for (i, line) in lines.iter().enumerate() {
        if let Some(rest) = line.strip_prefix(ID_LABEL) {
            id = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix(ARTICLE_LABEL) {
            let mut parts = rest.trim().splitn(2, '\t');
            article_num = parts.next().unwrap_or("").trim().to_string();
            article_title = parts.next().unwrap_or("").trim().to_string();
        } else if let Some(rest) = line.strip_prefix(POINT_LABEL) {
            point_num = rest.trim().to_string();
        } else if let Some(first) = line.strip_prefix(TEXT_LABEL) {
            // The text body is everything from here to the end of the block.
            let mut body = first.to_string();
            for more in &lines[i + 1..] {
                body.push('\n');
                body.push_str(more);
            }
            text = Some(body.trim().to_string());
            break;
        }
    }

    let id = id.filter(|id| !id.is_empty())?;
    let text = text.filter(|text| !text.is_empty())?;
    Some(Chunk {
        id,
        article_num,
        article_title,
        point_num,
        text,
    })
}

/// Write the chunk file atomically (tmp file, then rename).
pub fn save_chunks(chunks: &[Chunk], path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::new(codes::CHUNK_STORE_FAILED, "Failed to create chunk file directory")
                .with_details(format!("path={}; err={}", parent.display(), e))
        })?;
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, render_chunks(chunks).as_bytes()).map_err(|e| {
        AppError::new(codes::CHUNK_STORE_FAILED, "Failed to write chunk file")
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::new(codes::CHUNK_STORE_FAILED, "Failed to finalize chunk file write")
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })?;

    tracing::info!(path = %path.display(), chunks = chunks.len(), "saved chunks");
    Ok(())
}

pub fn load_chunks(path: &Path) -> Result<ChunkLoad, AppError> {
    let content = fs::read_to_string(path).map_err(|e| {
        AppError::new(codes::CHUNK_STORE_FAILED, "Failed to read chunk file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    let loaded = parse_chunks(&content);
    tracing::info!(
        path = %path.display(),
        chunks = loaded.chunks.len(),
        skipped = loaded.skipped_blocks,
        "loaded chunks"
    );
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_labeled_block() {
        let rendered = render_chunks(&[Chunk::new("5", "Требования", "1", "Текст пункта.")]);
        let expected = format!(
            "ID: 5.1\nномер статьи: 5\tТребования\n\
             номер пункта внутри статьи: 1\nText: Текст пункта.\n{}\n\n",
            "-".repeat(80)
        );
        assert_eq!(rendered, expected);
    }

    #[test]
    fn skips_blocks_missing_id_or_text() {
        let sep = block_separator();
        let blocks = [
            "номер статьи: 1\tA\nText: orphan",
            "ID: 1.2\nномер пункта внутри статьи: 2",
            "ID: 1.4\nномер статьи: 1\tA\nText:   \n",
            "ID:\nText: no id",
            "ID: 1.3\nText: ok",
        ];
        let content: String = blocks
            .iter()
            .map(|b| format!("{b}\n{sep}\n\n"))
            .collect();

        let loaded = parse_chunks(&content);
        assert_eq!(loaded.skipped_blocks, 4);
        assert_eq!(loaded.chunks.len(), 1);
        assert_eq!(loaded.chunks[0].id, "1.3");
        assert_eq!(loaded.chunks[0].article_num, "");
        assert_eq!(loaded.chunks[0].text, "ok");
    }

    #[test]
    fn article_line_without_title() {
        let loaded =
            parse_chunks("ID: 7.1\nномер статьи: 7\nномер пункта внутри статьи: 1\nText: x\n");
        assert_eq!(loaded.chunks[0].article_num, "7");
        assert_eq!(loaded.chunks[0].article_title, "");
    }
}
