//! Application configuration.
//!
//! Built once at startup and handed to each component's constructor. Sources are merged
//! with Figment, later ones winning: built-in defaults, an optional TOML file, then
//! `REGQA_*` environment variables (`REGQA_OLLAMA_HOST=...`).
use std::borrow::Cow;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::chunking::DEFAULT_ARTICLE_MARKER;
use crate::error::{codes, AppError};

pub const DEFAULT_CONFIG_FILE: &str = "regqa.toml";
pub const ENV_PREFIX: &str = "REGQA_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/regulation.txt`.
    pub regulation_file: Option<PathBuf>,
    /// Defaults to `<data_dir>/chunks.txt`.
    pub chunks_file: Option<PathBuf>,
    /// Defaults to `<data_dir>/vector_index.sqlite`.
    pub index_db: Option<PathBuf>,
    pub collection: String,
    pub article_marker: String,

    pub ollama_host: String,
    pub embedding_model: String,
    pub llm_model: String,
    pub temperature: f32,

    pub n_results: usize,
    pub context_max_chars: usize,
    pub embed_batch_size: usize,
    pub generation_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            regulation_file: None,
            chunks_file: None,
            index_db: None,
            collection: "regulation_collection".to_string(),
            article_marker: DEFAULT_ARTICLE_MARKER.to_string(),
            ollama_host: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            llm_model: "llama3.2:latest".to_string(),
            temperature: 0.1,
            n_results: 5,
            context_max_chars: 4000,
            embed_batch_size: 32,
            generation_timeout_secs: 120,
        }
    }
}

impl AppConfig {
    /// Load defaults + `regqa.toml` (or `file`, when given) + `REGQA_*` env vars.
    /// A missing `regqa.toml` is fine; a missing explicit `file` is an error.
    pub fn load(file: Option<&Path>) -> Result<Self, AppError> {
        let file = match file {
            Some(explicit) => {
                if !explicit.is_file() {
                    return Err(AppError::new(
                        codes::CONFIG_LOAD_FAILED,
                        "Configuration file not found",
                    )
                    .with_details(format!("path={}", explicit.display())));
                }
                explicit.to_path_buf()
            }
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        Self::from_figment(
            Figment::from(Serialized::defaults(AppConfig::default()))
                .merge(Toml::file(&file))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self, AppError> {
        let config: AppConfig = figment.extract().map_err(|e| {
            AppError::new(codes::CONFIG_LOAD_FAILED, "Failed to load configuration")
                .with_details(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |field: &str, why: &str| {
            Err(AppError::new(codes::CONFIG_INVALID, "Invalid configuration")
                .with_details(format!("{field}: {why}")))
        };

        if self.n_results == 0 {
            return invalid("n_results", "must be at least 1");
        }
        if self.context_max_chars == 0 {
            return invalid("context_max_chars", "must be at least 1");
        }
        if self.embed_batch_size == 0 {
            return invalid("embed_batch_size", "must be at least 1");
        }
        if self.generation_timeout_secs == 0 {
            return invalid("generation_timeout_secs", "must be at least 1");
        }
        if self.embedding_model.trim().is_empty() {
            return invalid("embedding_model", "must not be empty");
        }
        if self.llm_model.trim().is_empty() {
            return invalid("llm_model", "must not be empty");
        }
        if self.collection.trim().is_empty() {
            return invalid("collection", "must not be empty");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return invalid("temperature", "must be within 0..=2");
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.data_dir.to_string_lossy())
    }

    pub fn regulation_path(&self) -> PathBuf {
        self.resolve(self.regulation_file.as_deref(), "regulation.txt")
    }

    pub fn chunks_path(&self) -> PathBuf {
        self.resolve(self.chunks_file.as_deref(), "chunks.txt")
    }

    pub fn index_db_path(&self) -> PathBuf {
        self.resolve(self.index_db.as_deref(), "vector_index.sqlite")
    }

    fn resolve(&self, explicit: Option<&Path>, default_name: &str) -> PathBuf {
        match explicit {
            Some(p) => expand_path(&p.to_string_lossy()),
            None => self.data_dir().join(default_name),
        }
    }
}

/// Expand a leading `~` and `$VAR`/`${VAR}` references. Unknown variables are left as-is.
pub fn expand_path(input: &str) -> PathBuf {
    let expanded_env = shellexpand::env(input).unwrap_or(Cow::Borrowed(input));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().expect("defaults validate");
        assert_eq!(cfg.n_results, 5);
        assert_eq!(cfg.context_max_chars, 4000);
        assert_eq!(cfg.chunks_path(), PathBuf::from("./data").join("chunks.txt"));
    }

    #[test]
    fn toml_and_env_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "regqa.toml",
                r#"
                llm_model = "mistral:7b"
                n_results = 3
                chunks_file = "/tmp/custom_chunks.txt"
                "#,
            )?;
            jail.set_env("REGQA_OLLAMA_HOST", "http://127.0.0.1:9999");

            let cfg = AppConfig::load(None).expect("load");
            assert_eq!(cfg.llm_model, "mistral:7b");
            assert_eq!(cfg.n_results, 3);
            assert_eq!(cfg.ollama_host, "http://127.0.0.1:9999");
            assert_eq!(cfg.chunks_path(), PathBuf::from("/tmp/custom_chunks.txt"));
            assert_eq!(cfg.embedding_model, AppConfig::default().embedding_model);
            Ok(())
        });
    }

    #[test]
    fn explicit_config_file_must_exist() {
        Jail::expect_with(|jail| {
            let err = AppConfig::load(Some(Path::new("missing/regqa.toml")))
                .expect_err("missing explicit file");
            assert_eq!(err.code, codes::CONFIG_LOAD_FAILED);
            assert_eq!(err.details.as_deref(), Some("path=missing/regqa.toml"));

            // Without an explicit path a missing regqa.toml falls back to defaults.
            assert_eq!(AppConfig::load(None).expect("defaults"), AppConfig::default());

            jail.create_file("custom.toml", "n_results = 7")?;
            let cfg = AppConfig::load(Some(Path::new("custom.toml"))).expect("explicit file");
            assert_eq!(cfg.n_results, 7);
            Ok(())
        });
    }

    #[test]
    fn rejects_zero_context_budget() {
        let cfg = AppConfig {
            context_max_chars: 0,
            ..AppConfig::default()
        };
        let err = cfg.validate().expect_err("invalid");
        assert_eq!(err.code, codes::CONFIG_INVALID);
    }
}
