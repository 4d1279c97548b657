//! NotificationProvider implementations

pub mod apns;

pub use apns::{ApnsProvider, Environment};
