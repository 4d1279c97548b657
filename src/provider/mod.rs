//! NotificationProvider trait and implementations
//!
//! A provider delivers a push payload to a single device token and reports
//! the status the push service answered with.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

pub mod r#impl;

/// Status code with which APNs reports a device token as no longer valid
pub const STATUS_UNREGISTERED: u16 = 410;

/// The answer of the push service to one send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub status_code: u16,
    pub provider_message_id: Option<String>,
    pub reason: Option<String>,
}

impl Delivery {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Push payload announcing new mail for an account
///
/// Serializes to `{"aps":{"account-id":"<account id>"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payload {
    aps: Aps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Aps {
    #[serde(rename = "account-id")]
    account_id: String,
}

impl Payload {
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self {
            aps: Aps {
                account_id: account_id.into(),
            },
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| crate::Error::Internal(e.to_string()))
    }
}

/// Trait for push notification services
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// Send a payload to a device
    ///
    /// Returns `Err` only when no answer was obtained. Rejections by the
    /// service are reported through the returned [`Delivery`].
    async fn send(&self, device_token: &str, payload: &[u8]) -> Result<Delivery>;

    /// Whether a delivery means the device token will never be valid again
    fn is_permanent_rejection(&self, delivery: &Delivery) -> bool {
        delivery.status_code == STATUS_UNREGISTERED
    }
}
