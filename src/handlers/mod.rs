//! Built-in relay command handlers

pub mod register;
pub mod notify;

pub use register::RegisterHandler;
pub use notify::NotifyHandler;
