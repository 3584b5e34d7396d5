pub mod chunk_store;
pub mod chunking;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
