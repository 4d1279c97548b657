//! Line protocol spoken on the relay socket
//!
//! A request is a single line of the form
//!
//! ```text
//! NAME key="value"<TAB>key2=("a","b")
//! ```
//!
//! Values are either a double-quoted string or a parenthesized list of
//! double-quoted strings. Quotes and commas inside values are not escaped:
//! the interior of a quoted value is taken verbatim, and list elements are
//! split on every comma.

use std::fmt;

use crate::error::{Error, Result};

/// An argument value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    List(Vec<String>),
}

/// A parsed request line
///
/// Arguments keep their order on the wire. When a key is repeated the last
/// occurrence wins on lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<(String, Value)>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append a scalar argument
    pub fn with_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((key.into(), Value::String(value.into())));
        self
    }

    /// Append a list argument
    pub fn with_list<I, T>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.args.push((key.into(), Value::List(values)));
        self
    }

    /// Look up an argument of any shape
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.args
            .iter()
            .rev()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Look up a scalar argument; `None` if absent or a list
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            Value::String(value) => Some(value),
            Value::List(_) => None,
        }
    }

    /// Look up a list argument; `None` if absent or a scalar
    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        match self.get(key)? {
            Value::List(values) => Some(values),
            Value::String(_) => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.name)?;
        for (i, (key, value)) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str("\t")?;
            }
            write!(f, "{}=", key)?;
            match value {
                Value::String(value) => write!(f, "\"{}\"", value)?,
                Value::List(values) => {
                    f.write_str("(")?;
                    for (j, value) in values.iter().enumerate() {
                        if j > 0 {
                            f.write_str(",")?;
                        }
                        write!(f, "\"{}\"", value)?;
                    }
                    f.write_str(")")?;
                }
            }
        }
        Ok(())
    }
}

/// Response written back for every request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok { message: String },
    Error { message: String },
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Response::Ok {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Response::Ok { message } | Response::Error { message } => message,
        }
    }
}

// The status token is always followed by a space, even when the message is
// empty; mail server plugins match on the "OK " prefix.
impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok { message } => writeln!(f, "OK {}", message),
            Response::Error { message } => writeln!(f, "ERROR {}", message),
        }
    }
}

fn malformed(reason: &str) -> Error {
    Error::MalformedCommand(format!("Failed to parse: {}", reason))
}

/// Strip the surrounding double quotes of a scalar value
fn parse_string_value(raw: &str) -> Option<&str> {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        Some(&raw[1..raw.len() - 1])
    } else {
        None
    }
}

fn parse_list_value(raw: &str) -> Option<Vec<String>> {
    if raw.len() < 2 || !raw.starts_with('(') || !raw.ends_with(')') {
        return None;
    }

    let inner = &raw[1..raw.len() - 1];
    if inner.is_empty() {
        return Some(Vec::new());
    }

    inner
        .split(',')
        .map(|element| parse_string_value(element).map(str::to_string))
        .collect()
}

fn parse_value(raw: &str) -> Result<Value> {
    if let Some(value) = parse_string_value(raw) {
        return Ok(Value::String(value.to_string()));
    }
    parse_list_value(raw)
        .map(Value::List)
        .ok_or_else(|| malformed("invalid value in key/value pair"))
}

/// Parse a request line (without its line terminator)
pub fn parse_command(line: &str) -> Result<Command> {
    let (name, pairs) = line
        .split_once(' ')
        .ok_or_else(|| malformed("no name found"))?;

    let mut command = Command::new(name);
    for pair in pairs.split('\t') {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| malformed("no name/value pair found"))?;
        let value = parse_value(raw)?;
        command.args.push((key.to_string(), value));
    }

    Ok(command)
}
