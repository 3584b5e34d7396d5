use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::Chunk;
use crate::error::{codes, AppError};

pub const DEFAULT_ARTICLE_MARKER: &str = "Статья";

/// Splits regulation text into one chunk per numbered point.
///
/// An article header is `"<marker> <number>. <title>"` up to the end of the line. The
/// article body runs until the next header (or end of text). Inside a body, a point starts
/// at the beginning of a line with `"<number>."` followed by whitespace and runs until the
/// next point start.
#[derive(Debug, Clone)]
pub struct ChunkParser {
    article_re: Regex,
    point_re: Regex,
}

impl ChunkParser {
    pub fn new(article_marker: &str) -> Result<Self, AppError> {
        let marker = article_marker.trim();
        if marker.is_empty() {
            return Err(AppError::new(
                codes::CONFIG_INVALID,
                "Article marker must not be empty",
            ));
        }

        let article_re = Regex::new(&format!(r"{} (\d+)\. (.+)", regex::escape(marker)))
            .map_err(|e| {
                AppError::new(codes::CONFIG_INVALID, "Invalid article marker")
                    .with_details(format!("marker={marker}; err={e}"))
            })?;
        let point_re = Regex::new(r"(?m)^(\d+)\.\s+").map_err(|e| {
            AppError::new(codes::CONFIG_INVALID, "Invalid point pattern")
                .with_details(e.to_string())
        })?;

        Ok(Self {
            article_re,
            point_re,
        })
    }

    pub fn parse(&self, text: &str) -> Vec<Chunk> {
        let headers: Vec<_> = self.article_re.captures_iter(text).collect();
        let mut chunks = Vec::new();

        for (i, caps) in headers.iter().enumerate() {
            let (Some(whole), Some(num), Some(title)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let end = headers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(text.len());
            let body = text[whole.end()..end].trim();

            let before = chunks.len();
            self.push_points(num.as_str(), title.as_str().trim(), body, &mut chunks);
            if chunks.len() == before {
                tracing::debug!(article = num.as_str(), "article has no numbered points");
            }
        }

        if chunks.is_empty() {
            tracing::warn!(
                text_len = text.len(),
                articles = headers.len(),
                "regulation text produced no chunks"
            );
        }
        chunks
    }

    fn push_points(
        &self,
        article_num: &str,
        article_title: &str,
        body: &str,
        out: &mut Vec<Chunk>,
    ) {
        let starts: Vec<_> = self.point_re.captures_iter(body).collect();
        for (i, caps) in starts.iter().enumerate() {
            let (Some(whole), Some(num)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let end = starts
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(body.len());
            let point_text = body[whole.end()..end].trim();
            if point_text.is_empty() {
                continue;
            }
            out.push(Chunk::new(article_num, article_title, num.as_str(), point_text));
        }
    }
}

fn default_parser() -> &'static ChunkParser {
    static PARSER: OnceLock<ChunkParser> = OnceLock::new();
    PARSER.get_or_init(|| {
        ChunkParser::new(DEFAULT_ARTICLE_MARKER).expect("default article marker compiles")
    })
}

/// Parse with the default `"Статья"` article marker.
pub fn parse_regulation_to_chunks(text: &str) -> Vec<Chunk> {
    default_parser().parse(text)
}

/// Read a UTF-8 regulation file and parse it into chunks.
pub fn load_regulation(parser: &ChunkParser, path: &Path) -> Result<Vec<Chunk>, AppError> {
    let text = fs::read_to_string(path).map_err(|e| {
        AppError::new(codes::REGULATION_READ_FAILED, "Failed to read regulation file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    let chunks = parser.parse(&text);
    tracing::info!(path = %path.display(), chunks = chunks.len(), "parsed regulation");
    Ok(chunks)
}
