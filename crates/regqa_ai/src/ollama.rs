use std::time::Duration;

use regqa_core::error::{codes, AppError};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
}

impl OllamaClient {
    /// Create a client for an Ollama server given as `http(s)://host[:port]`.
    /// Paths, queries and userinfo are rejected so request URLs can be built by appending.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let invalid = |why: &str| {
            AppError::new(codes::OLLAMA_URL_INVALID, "Ollama base URL is invalid")
                .with_details(format!("base_url={base_url}; {why}"))
        };

        let authority = base_url
            .strip_prefix("http://")
            .or_else(|| base_url.strip_prefix("https://"))
            .ok_or_else(|| invalid("scheme must be http or https"))?;
        if authority.contains(&['/', '?', '#', '@'][..]) {
            return Err(invalid("only scheme, host and port are allowed"));
        }

        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            // Bracketed IPv6 literal.
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 host"))?;
            let port = match after {
                "" => None,
                p => Some(p.strip_prefix(':').ok_or_else(|| invalid("bad port separator"))?),
            };
            (host, port)
        } else {
            match authority.split_once(':') {
                Some((h, p)) => (h, Some(p)),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        if let Some(p) = port {
            match p.parse::<u16>() {
                Ok(n) if n > 0 => {}
                _ => return Err(invalid("port must be within 1..=65535")),
            }
        }

        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn health_check(&self) -> Result<(), AppError> {
        let url = self.endpoint("api/tags");
        let resp = ureq::get(&url).timeout(HEALTH_TIMEOUT).call();

        match resp {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(
                AppError::new(codes::OLLAMA_UNHEALTHY, "Ollama health check failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(ureq::Error::Status(status, _)) => Err(
                AppError::new(codes::OLLAMA_UNHEALTHY, "Ollama health check failed")
                    .with_details(format!("status={status}")),
            ),
            Err(e) => Err(AppError::new(codes::OLLAMA_UNREACHABLE, "Failed to reach Ollama")
                .with_details(format!("url={url}; err={e}"))
                .with_retryable(true)),
        }
    }
}
