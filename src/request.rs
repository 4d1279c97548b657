//! Typed requests validated from parsed protocol commands

use crate::error::{Error, Result};
use crate::protocol::{Command, Value};
use crate::types::{AccountId, DeviceToken, MailboxName};

/// The only subtopic mail clients register for
pub const MAIL_SUBTOPIC: &str = "com.apple.mobilemail";

/// A device asking to be notified about a set of mailboxes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub account_id: AccountId,
    pub device_token: DeviceToken,
    pub username: String,
    pub mailboxes: Vec<MailboxName>,
}

/// The mail server announcing new mail in a mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyRequest {
    pub username: String,
    pub mailbox: MailboxName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register(RegisterRequest),
    Notify(NotifyRequest),
}

fn required_string(command: &Command, key: &str) -> Result<String> {
    match command.get(key) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(Value::List(_)) => Err(Error::Validation(format!("Invalid {} argument", key))),
        None => Err(Error::Validation(format!("Missing {} argument", key))),
    }
}

fn required_list(command: &Command, key: &str) -> Result<Vec<String>> {
    match command.get(key) {
        Some(Value::List(values)) => Ok(values.clone()),
        Some(Value::String(_)) => Err(Error::Validation(format!("Invalid {} argument", key))),
        None => Err(Error::Validation(format!("Missing {} argument", key))),
    }
}

impl RegisterRequest {
    // Argument order matters: the first failing check is the one reported.
    fn from_command(command: &Command) -> Result<Self> {
        let subtopic = required_string(command, "aps-subtopic")?;
        if subtopic != MAIL_SUBTOPIC {
            return Err(Error::Validation("Unknown aps-subtopic".to_string()));
        }

        Ok(Self {
            account_id: required_string(command, "aps-account-id")?,
            device_token: required_string(command, "aps-device-token")?,
            username: required_string(command, "dovecot-username")?,
            mailboxes: required_list(command, "dovecot-mailboxes")?,
        })
    }
}

impl NotifyRequest {
    fn from_command(command: &Command) -> Result<Self> {
        Ok(Self {
            username: required_string(command, "dovecot-username")?,
            mailbox: required_string(command, "dovecot-mailbox")?,
        })
    }
}

impl Request {
    /// Validate a parsed command into a typed request
    pub fn from_command(command: &Command) -> Result<Self> {
        match command.name.as_str() {
            "REGISTER" => RegisterRequest::from_command(command).map(Request::Register),
            "NOTIFY" => NotifyRequest::from_command(command).map(Request::Notify),
            _ => Err(Error::Validation("Unknown command".to_string())),
        }
    }
}
