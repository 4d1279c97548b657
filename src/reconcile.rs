//! Reconciliation of a registration's mailbox interests
//!
//! A REGISTER replaces the set of mailboxes a device is interested in. The
//! reconciler computes the minimal inserts and deletes that turn the stored
//! set into the requested one and applies them in a single transaction.
//! Mailboxes present in both sets are never touched.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::store::RegistrationStore;
use crate::types::*;

/// What a reconcile call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub registration: RegistrationId,
    /// The registration did not exist before this call
    pub created: bool,
    pub inserted: usize,
    pub deleted: usize,
}

impl ReconcileOutcome {
    /// Whether the interest set was already up to date
    pub fn is_unchanged(&self) -> bool {
        self.inserted == 0 && self.deleted == 0
    }
}

/// Compute the changes turning `current` into `desired`
///
/// If the store holds the same mailbox more than once, the first row is kept
/// and the duplicates are deleted.
pub fn diff_interests(current: Vec<MailboxInterest>, desired: &BTreeSet<MailboxName>) -> InterestChanges {
    let mut changes = InterestChanges::default();
    let mut kept: HashSet<MailboxName> = HashSet::new();

    for interest in current {
        if desired.contains(&interest.mailbox) && !kept.contains(&interest.mailbox) {
            kept.insert(interest.mailbox);
        } else {
            changes.delete.push(interest);
        }
    }

    changes.insert = desired
        .iter()
        .filter(|mailbox| !kept.contains(*mailbox))
        .cloned()
        .collect();

    changes
}

/// Identity of a registration before its store id is known
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RegistrationKey {
    namespace: Namespace,
    account_id: AccountId,
    device_token: DeviceToken,
}

/// Async mutual exclusion per key
///
/// Entries are created on demand and dropped again once nobody holds or
/// waits for them.
struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

struct KeyedGuard<'a, K: Eq + Hash> {
    owner: &'a KeyedLocks<K>,
    key: K,
    entry: Arc<tokio::sync::Mutex<()>>,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock(&self, key: K) -> KeyedGuard<'_, K> {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&entry).lock_owned().await;

        KeyedGuard {
            owner: self,
            key,
            entry,
            guard: Some(guard),
        }
    }

    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<K: Eq + Hash> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self.owner.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map and ours: nobody else is waiting.
        if Arc::strong_count(&self.entry) == 2 {
            locks.remove(&self.key);
        }
    }
}

/// Keeps registrations and their mailbox interests in sync with REGISTER calls
pub struct Reconciler {
    store: Arc<dyn RegistrationStore>,
    locks: KeyedLocks<RegistrationKey>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Make the stored interests of a device exactly `desired`
    ///
    /// Concurrent calls for the same (namespace, account, device) are
    /// serialized; the last one to run determines the stored set. An empty
    /// `desired` removes every interest but keeps the registration.
    pub async fn reconcile(
        &self,
        namespace: &Namespace,
        account_id: &str,
        device_token: &str,
        desired: &BTreeSet<MailboxName>,
    ) -> Result<ReconcileOutcome> {
        let _guard = self
            .locks
            .lock(RegistrationKey {
                namespace: namespace.clone(),
                account_id: account_id.to_string(),
                device_token: device_token.to_string(),
            })
            .await;

        let namespace_id = self.store.resolve_namespace(namespace).await?;
        log::debug!("Namespace {} resolved to {:?}", namespace, namespace_id);

        let (registration, created) = match self
            .store
            .find_registration(namespace_id, account_id, device_token)
            .await?
        {
            Some(id) => (id, false),
            None => {
                let id = self
                    .store
                    .insert_registration(namespace_id, account_id, device_token)
                    .await?;
                log::debug!("Registered account {} as {:?}", account_id, id);
                (id, true)
            }
        };

        let current = self.store.list_mailbox_interests(registration).await?;
        let changes = diff_interests(current, desired);

        if !changes.is_empty() {
            log::debug!(
                "Modifying {} mailboxes of {:?}: +{:?} -{:?}",
                changes.len(),
                registration,
                changes.insert,
                changes.delete.iter().map(|i| &i.mailbox).collect::<Vec<_>>()
            );
            self.store
                .apply_interest_changes(registration, &changes)
                .await?;
        }

        Ok(ReconcileOutcome {
            registration,
            created,
            inserted: changes.insert.len(),
            deleted: changes.delete.len(),
        })
    }
}
