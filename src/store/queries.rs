//! Named SQL queries used by the registration store
//!
//! Deployments whose schema differs from the built-in one can override any
//! query by name from the configuration file. Parameters are positional and
//! must keep the order documented on each [`QueryName`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryName {
    /// `(local, domain) -> id`
    ResolveNamespaceId,
    /// `(namespace_id, account_id, device_token) -> id`
    FindRegistrationId,
    /// `(namespace_id, account_id, device_token)`
    InsertRegistration,
    /// `(registration_id) -> (id, mailbox)*`
    ListMailboxInterests,
    /// `(registration_id, mailbox)`
    InsertMailboxInterest,
    /// `(interest_id)`
    DeleteMailboxInterest,
    /// `(mailbox, local, domain) -> (id, account_id, device_token)*`
    FindRegistrationsForMailbox,
    /// `(registration_id)`
    DeleteRegistration,
}

impl QueryName {
    pub const ALL: [QueryName; 8] = [
        QueryName::ResolveNamespaceId,
        QueryName::FindRegistrationId,
        QueryName::InsertRegistration,
        QueryName::ListMailboxInterests,
        QueryName::InsertMailboxInterest,
        QueryName::DeleteMailboxInterest,
        QueryName::FindRegistrationsForMailbox,
        QueryName::DeleteRegistration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryName::ResolveNamespaceId => "resolve_namespace_id",
            QueryName::FindRegistrationId => "find_registration_id",
            QueryName::InsertRegistration => "insert_registration",
            QueryName::ListMailboxInterests => "list_mailbox_interests",
            QueryName::InsertMailboxInterest => "insert_mailbox_interest",
            QueryName::DeleteMailboxInterest => "delete_mailbox_interest",
            QueryName::FindRegistrationsForMailbox => "find_registrations_for_mailbox",
            QueryName::DeleteRegistration => "delete_registration",
        }
    }

    /// SQL matching the built-in schema
    pub fn default_sql(&self) -> &'static str {
        match self {
            QueryName::ResolveNamespaceId => {
                "SELECT id FROM namespaces WHERE local_part = ?1 AND domain = ?2"
            }
            QueryName::FindRegistrationId => {
                "SELECT id FROM registrations
                 WHERE namespace_id = ?1 AND account_id = ?2 AND device_token = ?3"
            }
            QueryName::InsertRegistration => {
                "INSERT INTO registrations (namespace_id, account_id, device_token)
                 VALUES (?1, ?2, ?3)"
            }
            QueryName::ListMailboxInterests => {
                "SELECT id, mailbox FROM mailbox_interests WHERE registration_id = ?1 ORDER BY id"
            }
            QueryName::InsertMailboxInterest => {
                "INSERT INTO mailbox_interests (registration_id, mailbox) VALUES (?1, ?2)"
            }
            QueryName::DeleteMailboxInterest => "DELETE FROM mailbox_interests WHERE id = ?1",
            QueryName::FindRegistrationsForMailbox => {
                "SELECT r.id, r.account_id, r.device_token
                 FROM registrations r
                 JOIN mailbox_interests m ON m.registration_id = r.id
                 JOIN namespaces n ON n.id = r.namespace_id
                 WHERE m.mailbox = ?1 AND n.local_part = ?2 AND n.domain = ?3"
            }
            QueryName::DeleteRegistration => "DELETE FROM registrations WHERE id = ?1",
        }
    }
}

impl fmt::Display for QueryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        QueryName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| Error::Config(format!("Unknown query name: {}", s)))
    }
}

/// The SQL text for every named query
#[derive(Debug, Clone)]
pub struct Queries {
    sql: BTreeMap<QueryName, String>,
}

impl Queries {
    /// Built-in queries with the given overrides applied
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Result<Self> {
        let mut queries = Self::default();
        for (name, sql) in overrides {
            let name: QueryName = name.parse()?;
            queries.sql.insert(name, sql.clone());
        }
        Ok(queries)
    }

    pub fn get(&self, name: QueryName) -> &str {
        self.sql
            .get(&name)
            .map(String::as_str)
            .unwrap_or_else(|| name.default_sql())
    }

    pub fn iter(&self) -> impl Iterator<Item = (QueryName, &str)> {
        QueryName::ALL.into_iter().map(move |name| (name, self.get(name)))
    }
}

impl Default for Queries {
    fn default() -> Self {
        let sql = QueryName::ALL
            .into_iter()
            .map(|name| (name, name.default_sql().to_string()))
            .collect();
        Self { sql }
    }
}
