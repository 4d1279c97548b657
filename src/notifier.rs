//! Fan-out of new-mail events to registered devices

use std::sync::Arc;

use crate::error::Result;
use crate::provider::{Delivery, NotificationProvider, Payload};
use crate::store::RegistrationStore;
use crate::types::*;

/// How a single push attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The push service accepted the notification
    Delivered(Delivery),
    /// The push service refused the notification for a transient or
    /// unspecified reason
    Rejected(Delivery),
    /// The device token is permanently invalid; `removed` tells whether the
    /// registration could be deleted
    Unregistered { delivery: Delivery, removed: bool },
    /// No answer was obtained from the push service
    Failed(String),
}

/// Result of pushing to one registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub registration: Registration,
    pub outcome: DeliveryOutcome,
}

/// Sends a push to every registration interested in a mailbox
pub struct Notifier {
    store: Arc<dyn RegistrationStore>,
    provider: Arc<dyn NotificationProvider>,
}

impl Notifier {
    pub fn new(store: Arc<dyn RegistrationStore>, provider: Arc<dyn NotificationProvider>) -> Self {
        Self { store, provider }
    }

    /// Notify all devices interested in `mailbox`
    ///
    /// Only the registration lookup can fail. Every matched registration gets
    /// exactly one attempt, whatever happened to the others.
    pub async fn notify(&self, namespace: &Namespace, mailbox: &str) -> Result<Vec<DeliveryReport>> {
        let registrations = self
            .store
            .find_registrations_for_mailbox(namespace, mailbox)
            .await?;
        log::debug!(
            "Found {} registrations for {} in {}",
            registrations.len(),
            mailbox,
            namespace
        );

        let mut reports = Vec::with_capacity(registrations.len());
        for registration in registrations {
            let outcome = self.deliver(&registration).await;
            reports.push(DeliveryReport {
                registration,
                outcome,
            });
        }

        Ok(reports)
    }

    async fn deliver(&self, registration: &Registration) -> DeliveryOutcome {
        log::debug!(
            "Sending notification to {} / {}",
            registration.account_id,
            registration.device_token
        );

        let payload = match Payload::for_account(&registration.account_id).to_bytes() {
            Ok(payload) => payload,
            Err(e) => return DeliveryOutcome::Failed(e.to_string()),
        };

        let delivery = match self.provider.send(&registration.device_token, &payload).await {
            Ok(delivery) => delivery,
            Err(e) => {
                log::warn!(
                    "Sending notification to {} failed: {}",
                    registration.account_id,
                    e
                );
                return DeliveryOutcome::Failed(e.to_string());
            }
        };

        if self.provider.is_permanent_rejection(&delivery) {
            log::debug!(
                "Device {} ({:?}) is no longer registered. Status: {} ({:?})",
                registration.account_id,
                registration.id,
                delivery.status_code,
                delivery.reason
            );
            let removed = match self.store.delete_registration(registration.id).await {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Failed to delete registration {:?}: {}", registration.id, e);
                    false
                }
            };
            return DeliveryOutcome::Unregistered { delivery, removed };
        }

        if delivery.is_success() {
            DeliveryOutcome::Delivered(delivery)
        } else {
            log::debug!(
                "Notification to {} rejected: {} ({:?})",
                registration.account_id,
                delivery.status_code,
                delivery.reason
            );
            DeliveryOutcome::Rejected(delivery)
        }
    }
}
