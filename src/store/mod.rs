//! RegistrationStore trait and implementations
//!
//! The RegistrationStore holds device registrations and the mailboxes each
//! registration is interested in. Every method corresponds to one named,
//! parameterized query prepared once when the store is opened.

use async_trait::async_trait;
use crate::error::Result;
use crate::types::*;

pub mod queries;
pub mod r#impl;

pub use queries::{Queries, QueryName};

/// Trait for storing push registrations
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Resolve a namespace to its store identifier
    ///
    /// Fails with `Error::NotFound` when the namespace is unknown.
    async fn resolve_namespace(&self, namespace: &Namespace) -> Result<NamespaceId>;

    /// Find the registration for an (account id, device token) pair
    async fn find_registration(
        &self,
        namespace: NamespaceId,
        account_id: &str,
        device_token: &str,
    ) -> Result<Option<RegistrationId>>;

    /// Insert a new registration and return its identifier
    async fn insert_registration(
        &self,
        namespace: NamespaceId,
        account_id: &str,
        device_token: &str,
    ) -> Result<RegistrationId>;

    /// List the mailbox interests of a registration
    async fn list_mailbox_interests(&self, registration: RegistrationId)
        -> Result<Vec<MailboxInterest>>;

    /// Apply interest inserts and deletes for a registration atomically
    ///
    /// Either every change lands or none does.
    async fn apply_interest_changes(
        &self,
        registration: RegistrationId,
        changes: &InterestChanges,
    ) -> Result<()>;

    /// Find every registration in a namespace interested in a mailbox
    async fn find_registrations_for_mailbox(
        &self,
        namespace: &Namespace,
        mailbox: &str,
    ) -> Result<Vec<Registration>>;

    /// Delete a registration together with its mailbox interests
    async fn delete_registration(&self, registration: RegistrationId) -> Result<()>;
}
