use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::models::error::{not_found, parse_failure};
use crate::models::{
    CoreError, CoreErrorKind, CoreResult, DocumentAddress, DocumentBody, PutOutcome,
    StoredDocument,
};
use crate::persistence::{DocumentStore, MigrationStore, PersistenceResult};
use crate::query::Query;
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "resultstore_schema_migrations";
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Document store persisted in a single SQLite file.
///
/// Bodies are kept as JSON text next to an integer version that is bumped on
/// every write. A fresh connection is opened per operation, so one instance
/// can be shared freely between threads.
pub struct SqliteDocumentStore {
    database_path: PathBuf,
    busy_timeout: Duration,
}

enum ConditionalWrite {
    Missing,
    Conflict(i64),
    Written(i64),
}

impl SqliteDocumentStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Uses the configured request timeout as the SQLite busy timeout.
    pub fn with_config(database_path: impl Into<PathBuf>, config: &StoreConfig) -> Self {
        Self::new(database_path).with_busy_timeout(config.request_timeout())
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path, self.busy_timeout)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }
}

impl MigrationStore for SqliteDocumentStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version == current_version {
                // Tables may have been dropped behind our back; re-running the
                // recorded DDL is idempotent.
                for version in 1..=target_version {
                    connection.execute_batch(defined_migration(version)?.up_sql)?;
                }
                return Ok(());
            }

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(connection, defined_migration(version)?)?;
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(connection, defined_migration(version)?)?;
                }
            }

            Ok(())
        })
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn get(&self, address: &DocumentAddress) -> PersistenceResult<StoredDocument> {
        let row = self.with_connection("get", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    "
SELECT body, version
FROM documents
WHERE index_name = ?1 AND doc_type = ?2 AND doc_id = ?3
",
                    params![address.index, address.doc_type, address.id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()
        })?;

        let (body, version) = row.ok_or_else(|| not_found(address))?;
        Ok(StoredDocument {
            id: address.id.clone(),
            body: parse_body(&body).map_err(|error| error.at(address))?,
            version: to_version(version)?,
        })
    }

    fn put(&self, address: &DocumentAddress, body: &DocumentBody) -> PersistenceResult<u64> {
        let body = serialize_body(body)?;
        let version = self.with_connection("put", |connection| {
            ensure_schema_ready(connection)?;
            connection.query_row(
                "
INSERT INTO documents (index_name, doc_type, doc_id, body, version)
VALUES (?1, ?2, ?3, ?4, 1)
ON CONFLICT(index_name, doc_type, doc_id) DO UPDATE SET
    body = excluded.body,
    version = documents.version + 1
RETURNING version
",
                params![address.index, address.doc_type, address.id, body],
                |row| row.get::<_, i64>(0),
            )
        })?;
        to_version(version)
    }

    fn put_if_version(
        &self,
        address: &DocumentAddress,
        body: &DocumentBody,
        expected_version: u64,
    ) -> PersistenceResult<PutOutcome> {
        let body = serialize_body(body)?;
        let expected = i64::try_from(expected_version)
            .map_err(|_| storage_error_text("put_if_version", "version exceeds i64 range"))?;

        let outcome = self.with_connection("put_if_version", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current: Option<i64> = transaction
                .query_row(
                    "
SELECT version
FROM documents
WHERE index_name = ?1 AND doc_type = ?2 AND doc_id = ?3
",
                    params![address.index, address.doc_type, address.id],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = match current {
                None => ConditionalWrite::Missing,
                Some(current) if current != expected => ConditionalWrite::Conflict(current),
                Some(current) => {
                    let next = current + 1;
                    transaction.execute(
                        "
UPDATE documents
SET body = ?4, version = ?5
WHERE index_name = ?1 AND doc_type = ?2 AND doc_id = ?3
",
                        params![address.index, address.doc_type, address.id, body, next],
                    )?;
                    ConditionalWrite::Written(next)
                }
            };

            transaction.commit()?;
            Ok(outcome)
        })?;

        match outcome {
            ConditionalWrite::Missing => Err(not_found(address)),
            ConditionalWrite::Conflict(current) => Ok(PutOutcome::VersionConflict {
                current: to_version(current)?,
            }),
            ConditionalWrite::Written(version) => Ok(PutOutcome::Written {
                version: to_version(version)?,
            }),
        }
    }

    fn search(
        &self,
        index: &str,
        doc_type: &str,
        query: &Query,
        limit: usize,
    ) -> PersistenceResult<Vec<StoredDocument>> {
        // Rows are stepped one at a time so at most `limit` bodies are held.
        let hits = self.with_connection("search", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT doc_id, body, version
FROM documents
WHERE index_name = ?1 AND doc_type = ?2
ORDER BY doc_id
",
            )?;
            let mut rows = statement.query(params![index, doc_type])?;
            let mut hits = Vec::new();

            while hits.len() < limit {
                let Some(row) = rows.next()? else {
                    break;
                };
                let id: String = row.get(0)?;
                let raw_body: String = row.get(1)?;
                let body = match parse_body(&raw_body) {
                    Ok(body) => body,
                    Err(error) => {
                        tracing::warn!(
                            index,
                            doc_type,
                            id = %id,
                            message = %error.message,
                            "skipping sqlite document with unreadable body"
                        );
                        continue;
                    }
                };
                if query.matches(&body) {
                    hits.push((id, body, row.get::<_, i64>(2)?));
                }
            }

            Ok(hits)
        })?;

        hits.into_iter()
            .map(|(id, body, version)| {
                Ok(StoredDocument {
                    id,
                    body,
                    version: to_version(version)?,
                })
            })
            .collect()
    }

    fn create(
        &self,
        index: &str,
        doc_type: &str,
        body: &DocumentBody,
    ) -> PersistenceResult<String> {
        let body = serialize_body(body)?;
        let id = Uuid::new_v4().to_string();
        self.with_connection("create", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO documents (index_name, doc_type, doc_id, body, version)
VALUES (?1, ?2, ?3, ?4, 1)
",
                params![index, doc_type, id, body],
            )
        })?;
        Ok(id)
    }

    fn delete(&self, address: &DocumentAddress) -> PersistenceResult<bool> {
        let removed = self.with_connection("delete", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "DELETE FROM documents WHERE index_name = ?1 AND doc_type = ?2 AND doc_id = ?3",
                params![address.index, address.doc_type, address.id],
            )
        })?;
        Ok(removed > 0)
    }
}

fn open_connection(database_path: &Path, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    let connection = Connection::open(database_path)?;
    connection.busy_timeout(busy_timeout)?;
    Ok(connection)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version <= 0 {
        return Err(storage_error_sqlite(
            "database schema is not initialized; apply migrations before document operations",
        ));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version).ok_or_else(|| {
        storage_error_sqlite(&format!("migration version '{version}' is not defined"))
    })
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()
}

fn parse_body(raw: &str) -> CoreResult<DocumentBody> {
    serde_json::from_str(raw)
        .map_err(|error| parse_failure(format!("stored document body is not a JSON object: {error}")))
}

fn serialize_body(body: &DocumentBody) -> PersistenceResult<String> {
    serde_json::to_string(body).map_err(|error| {
        CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("document body cannot be serialized: {error}"),
        )
    })
}

fn to_version(value: i64) -> PersistenceResult<u64> {
    u64::try_from(value)
        .map_err(|_| storage_error_text("read_version", "negative version in sqlite record"))
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StoreUnavailable,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}
