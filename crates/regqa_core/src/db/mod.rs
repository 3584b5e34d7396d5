use std::collections::HashSet;
use std::path::Path;

use rusqlite::Connection;

use crate::error::{codes, AppError};

const MIGRATION_0001: (&str, &str) = (
    "0001_vector_index.sql",
    include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../migrations/0001_vector_index.sql"
    )),
);

fn migrations() -> Vec<(&'static str, &'static str)> {
    vec![MIGRATION_0001]
}

pub fn open(path: &Path) -> Result<Connection, AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::new(codes::DB_OPEN_FAILED, "Failed to create database directory")
                .with_details(format!("path={}; err={}", parent.display(), e))
        })?;
    }
    Connection::open(path).map_err(|e| {
        AppError::new(codes::DB_OPEN_FAILED, "Failed to open SQLite database")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    Connection::open_in_memory().map_err(|e| {
        AppError::new(codes::DB_OPEN_FAILED, "Failed to open in-memory SQLite database")
            .with_details(e.to_string())
    })
}

/// Apply each named migration exactly once, in order.
pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    conn.execute_batch(
        r#"
      PRAGMA foreign_keys = ON;
      CREATE TABLE IF NOT EXISTS _migrations (
        name TEXT PRIMARY KEY NOT NULL,
        applied_at TEXT NOT NULL
      );
    "#,
    )
    .map_err(|e| {
        AppError::new(
            codes::DB_MIGRATION_FAILED,
            "Failed to ensure migrations table exists",
        )
        .with_details(e.to_string())
    })?;

    let applied: HashSet<String> = {
        let mut stmt = conn.prepare("SELECT name FROM _migrations").map_err(|e| {
            AppError::new(codes::DB_MIGRATION_FAILED, "Failed to query applied migrations")
                .with_details(e.to_string())
        })?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| {
                AppError::new(codes::DB_MIGRATION_FAILED, "Failed to read applied migrations")
                    .with_details(e.to_string())
            })?;
        rows.collect::<Result<_, _>>().map_err(|e| {
            AppError::new(
                codes::DB_MIGRATION_FAILED,
                "Failed to read applied migration row",
            )
            .with_details(e.to_string())
        })?
    };

    for (name, sql) in migrations() {
        if applied.contains(name) {
            continue;
        }

        let tx = conn.transaction().map_err(|e| {
            AppError::new(codes::DB_TX_FAILED, "Failed to start migration transaction")
                .with_details(e.to_string())
        })?;
        tx.execute_batch(sql).map_err(|e| {
            AppError::new(codes::DB_MIGRATION_FAILED, format!("Migration {name} failed"))
                .with_details(e.to_string())
        })?;
        tx.execute(
            "INSERT INTO _migrations(name, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
            [name],
        )
        .map_err(|e| {
            AppError::new(
                codes::DB_MIGRATION_FAILED,
                format!("Failed to record migration {name}"),
            )
            .with_details(e.to_string())
        })?;
        tx.commit().map_err(|e| {
            AppError::new(codes::DB_TX_FAILED, "Failed to commit migration transaction")
                .with_details(e.to_string())
        })?;
        tracing::debug!(migration = name, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::OptionalExtension;

    #[test]
    fn migrations_create_index_tables() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("migrate");
        // Second run is a no-op.
        migrate(&mut conn).expect("migrate again");

        for table in ["collections", "entries"] {
            let name: Option<String> = conn
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .optional()
                .unwrap();
            assert_eq!(name.as_deref(), Some(table));
        }

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 1);
    }
}
