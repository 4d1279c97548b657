//! Core types used throughout the push relay

use std::fmt;

use crate::error::{Error, Result};

/// Store identifier of a mailbox namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(pub i64);

/// Store identifier of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub i64);

/// Store identifier of a single mailbox interest row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterestId(pub i64);

/// Mailbox name
pub type MailboxName = String;

/// Account identifier handed out by the mail client
pub type AccountId = String;

/// Opaque push token of a device
pub type DeviceToken = String;

/// The mail account scope a username resolves to
///
/// A namespace is derived from a `local@domain` username and is only ever
/// used as a lookup key into the registration store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub local: String,
    pub domain: String,
}

impl Namespace {
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Split a `local@domain` username into its namespace
    ///
    /// The domain is the text between the first and second `@`; anything after
    /// a second `@` is ignored.
    pub fn from_username(username: &str) -> Result<Self> {
        let mut parts = username.split('@');
        match (parts.next(), parts.next()) {
            (Some(local), Some(domain)) if !local.is_empty() && !domain.is_empty() => {
                Ok(Self::new(local, domain))
            }
            _ => Err(Error::InvalidUsername(format!(
                "expected local@domain, got {:?}",
                username
            ))),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

/// A device registered for push notifications on behalf of one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: RegistrationId,
    pub account_id: AccountId,
    pub device_token: DeviceToken,
}

/// A stored "notify this registration when this mailbox changes" row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxInterest {
    pub id: InterestId,
    pub mailbox: MailboxName,
}

/// Inserts and deletes that bring a registration's interests to a desired set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestChanges {
    pub insert: Vec<MailboxName>,
    pub delete: Vec<MailboxInterest>,
}

impl InterestChanges {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.delete.is_empty()
    }

    /// Total number of store writes these changes amount to
    pub fn len(&self) -> usize {
        self.insert.len() + self.delete.len()
    }
}
