//! SQLite-based registration store implementation

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::store::{Queries, QueryName, RegistrationStore};
use crate::types::*;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS namespaces (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        local_part TEXT NOT NULL,
        domain TEXT NOT NULL,
        UNIQUE (local_part, domain)
    );
    CREATE TABLE IF NOT EXISTS registrations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        namespace_id INTEGER NOT NULL REFERENCES namespaces (id) ON DELETE CASCADE,
        account_id TEXT NOT NULL,
        device_token TEXT NOT NULL,
        UNIQUE (namespace_id, account_id, device_token)
    );
    CREATE TABLE IF NOT EXISTS mailbox_interests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        registration_id INTEGER NOT NULL REFERENCES registrations (id) ON DELETE CASCADE,
        mailbox TEXT NOT NULL,
        UNIQUE (registration_id, mailbox)
    );
    CREATE INDEX IF NOT EXISTS mailbox_interests_by_mailbox ON mailbox_interests (mailbox);
";

/// SQLite-based registration store
///
/// Holds a single connection whose statement cache keeps every named query
/// prepared for the lifetime of the store.
pub struct SQLiteRegistrationStore {
    conn: Arc<Mutex<Connection>>,
    queries: Arc<Queries>,
}

impl SQLiteRegistrationStore {
    /// Open a store file with the built-in schema and queries
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::open(db_path, Queries::default(), true).await
    }

    /// Open a store file
    ///
    /// Every query is prepared up front, so a query that does not match the
    /// schema fails here rather than on the first request.
    pub async fn open<P: AsRef<Path>>(
        db_path: P,
        queries: Queries,
        create_schema: bool,
    ) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || Connection::open(&db_path)).await??;
        Self::init(conn, queries, create_schema).await
    }

    /// Create an in-memory store for testing
    pub async fn in_memory() -> Result<Self> {
        let conn = tokio::task::spawn_blocking(Connection::open_in_memory).await??;
        Self::init(conn, Queries::default(), true).await
    }

    async fn init(conn: Connection, queries: Queries, create_schema: bool) -> Result<Self> {
        let (conn, queries) = tokio::task::spawn_blocking(move || {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            if create_schema {
                conn.execute_batch(SCHEMA)?;
            }

            conn.set_prepared_statement_cache_capacity(QueryName::ALL.len());
            for (name, sql) in queries.iter() {
                conn.prepare_cached(sql).map_err(|e| {
                    Error::Database(format!("Unable to prepare query '{}': {}", name, e))
                })?;
            }

            Ok::<_, Error>((conn, queries))
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            queries: Arc::new(queries),
        })
    }

    /// Run a closure against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &Queries) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let queries = Arc::clone(&self.queries);

        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::Internal("Store connection lock poisoned".to_string()))?;
            f(&mut guard, &queries)
        })
        .await?
    }

    /// Provision a namespace, returning the existing one if already present
    pub async fn create_namespace(&self, namespace: &Namespace) -> Result<NamespaceId> {
        let namespace = namespace.clone();

        self.with_conn(move |conn, _| {
            conn.execute(
                "INSERT OR IGNORE INTO namespaces (local_part, domain) VALUES (?1, ?2)",
                params![namespace.local, namespace.domain],
            )?;
            let id = conn.query_row(
                "SELECT id FROM namespaces WHERE local_part = ?1 AND domain = ?2",
                params![namespace.local, namespace.domain],
                |row| row.get(0),
            )?;
            Ok(NamespaceId(id))
        })
        .await
    }
}

#[async_trait]
impl RegistrationStore for SQLiteRegistrationStore {
    async fn resolve_namespace(&self, namespace: &Namespace) -> Result<NamespaceId> {
        let namespace = namespace.clone();

        self.with_conn(move |conn, queries| {
            let mut stmt = conn.prepare_cached(queries.get(QueryName::ResolveNamespaceId))?;
            let id: Option<i64> = stmt
                .query_row(params![namespace.local, namespace.domain], |row| row.get(0))
                .optional()?;

            id.map(NamespaceId)
                .ok_or_else(|| Error::NotFound(format!("Unknown namespace: {}", namespace)))
        })
        .await
    }

    async fn find_registration(
        &self,
        namespace: NamespaceId,
        account_id: &str,
        device_token: &str,
    ) -> Result<Option<RegistrationId>> {
        let account_id = account_id.to_string();
        let device_token = device_token.to_string();

        self.with_conn(move |conn, queries| {
            let mut stmt = conn.prepare_cached(queries.get(QueryName::FindRegistrationId))?;
            let id: Option<i64> = stmt
                .query_row(params![namespace.0, account_id, device_token], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(id.map(RegistrationId))
        })
        .await
    }

    async fn insert_registration(
        &self,
        namespace: NamespaceId,
        account_id: &str,
        device_token: &str,
    ) -> Result<RegistrationId> {
        let account_id = account_id.to_string();
        let device_token = device_token.to_string();

        self.with_conn(move |conn, queries| {
            let id = {
                let mut stmt = conn.prepare_cached(queries.get(QueryName::InsertRegistration))?;
                stmt.insert(params![namespace.0, account_id, device_token])?
            };
            Ok(RegistrationId(id))
        })
        .await
    }

    async fn list_mailbox_interests(
        &self,
        registration: RegistrationId,
    ) -> Result<Vec<MailboxInterest>> {
        self.with_conn(move |conn, queries| {
            let mut stmt = conn.prepare_cached(queries.get(QueryName::ListMailboxInterests))?;
            let interests = stmt
                .query_map(params![registration.0], |row| {
                    Ok(MailboxInterest {
                        id: InterestId(row.get(0)?),
                        mailbox: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(interests)
        })
        .await
    }

    async fn apply_interest_changes(
        &self,
        registration: RegistrationId,
        changes: &InterestChanges,
    ) -> Result<()> {
        let changes = changes.clone();

        self.with_conn(move |conn, queries| {
            // Dropping the transaction without commit rolls it back.
            let tx = conn.transaction()?;
            {
                let mut insert = tx.prepare_cached(queries.get(QueryName::InsertMailboxInterest))?;
                for mailbox in &changes.insert {
                    insert.execute(params![registration.0, mailbox])?;
                }

                let mut delete = tx.prepare_cached(queries.get(QueryName::DeleteMailboxInterest))?;
                for interest in &changes.delete {
                    delete.execute(params![interest.id.0])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn find_registrations_for_mailbox(
        &self,
        namespace: &Namespace,
        mailbox: &str,
    ) -> Result<Vec<Registration>> {
        let namespace = namespace.clone();
        let mailbox = mailbox.to_string();

        self.with_conn(move |conn, queries| {
            let mut stmt =
                conn.prepare_cached(queries.get(QueryName::FindRegistrationsForMailbox))?;
            let registrations = stmt
                .query_map(params![mailbox, namespace.local, namespace.domain], |row| {
                    Ok(Registration {
                        id: RegistrationId(row.get(0)?),
                        account_id: row.get(1)?,
                        device_token: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(registrations)
        })
        .await
    }

    async fn delete_registration(&self, registration: RegistrationId) -> Result<()> {
        self.with_conn(move |conn, queries| {
            let mut stmt = conn.prepare_cached(queries.get(QueryName::DeleteRegistration))?;
            stmt.execute(params![registration.0])?;
            Ok(())
        })
        .await
    }
}
