//! Daemon configuration
//!
//! Loaded from a TOML file; every field has a default so a partial file (or
//! no file at all) is accepted as long as [`Config::validate`] passes.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::provider::r#impl::Environment;
use crate::store::Queries;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/pushrelayd.toml";
const DEFAULT_SOCKET: &str = "/var/run/pushrelayd/pushrelayd.sock";
const DEFAULT_CERTIFICATE: &str = "/etc/pushrelayd/certificate.pem";
const DEFAULT_DATABASE: &str = "/var/lib/pushrelayd/registrations.db";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Log at debug level regardless of `RUST_LOG`
    pub debug: bool,
    /// Path of the socket the mail server connects to
    pub socket: PathBuf,
    /// Permission bits applied to the socket file
    pub socket_mode: u32,
    /// Upper bound on concurrently served connections
    pub max_connections: usize,
    pub provider: ProviderConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// PEM certificate (optionally with its key) or a PKCS#12 archive
    pub certificate: PathBuf,
    /// PEM key, when not bundled with the certificate
    pub key: Option<PathBuf>,
    /// PKCS#12 password
    pub password: String,
    /// APNs topic returned to registering clients; read from the
    /// certificate's UID attribute when empty
    pub topic: String,
    pub environment: Environment,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub create_schema: bool,
    /// SQL overrides keyed by query name
    pub queries: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            socket: PathBuf::from(DEFAULT_SOCKET),
            socket_mode: 0o777,
            max_connections: 64,
            provider: ProviderConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            certificate: PathBuf::from(DEFAULT_CERTIFICATE),
            key: None,
            password: String::new(),
            topic: String::new(),
            environment: Environment::default(),
            timeout_secs: 10,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE),
            create_schema: true,
            queries: HashMap::new(),
        }
    }
}

impl StoreConfig {
    pub fn queries(&self) -> Result<Queries> {
        Queries::with_overrides(&self.queries)
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load the configuration file, falling back to defaults when it does
    /// not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Config(format!("{}: {}", path.display(), e))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be positive".to_string()));
        }
        if self.socket_mode > 0o777 {
            return Err(Error::Config(format!(
                "socket_mode {:o} is not a permission mode",
                self.socket_mode
            )));
        }
        self.store.queries()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::QueryName;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.socket, PathBuf::from(DEFAULT_SOCKET));
        assert_eq!(config.socket_mode, 0o777);
        assert_eq!(config.provider.environment, Environment::Production);
        assert!(config.store.create_schema);
        assert!(config.provider.topic.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full() {
        let config = Config::from_toml_str(
            r#"
            debug = true
            socket = "/tmp/relay.sock"
            socket_mode = 0o660
            max_connections = 8

            [provider]
            certificate = "/etc/relay/cert.p12"
            password = "secret"
            topic = "com.apple.mail.XServer.1234"
            environment = "development"

            [store]
            path = "/tmp/relay.db"
            create_schema = false

            [store.queries]
            delete_registration = "DELETE FROM aps WHERE id = ?1"
            "#,
        )
        .unwrap();

        assert!(config.debug);
        assert_eq!(config.socket, PathBuf::from("/tmp/relay.sock"));
        assert_eq!(config.socket_mode, 0o660);
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.provider.environment, Environment::Development);
        assert_eq!(config.provider.topic, "com.apple.mail.XServer.1234");
        assert_eq!(config.provider.timeout_secs, 10);
        assert!(!config.store.create_schema);
        assert_eq!(
            config.store.queries().unwrap().get(QueryName::DeleteRegistration),
            "DELETE FROM aps WHERE id = ?1"
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(Config::from_toml_str("sockett = \"/tmp/x\"").is_err());
    }

    #[test]
    fn test_rejects_unknown_query() {
        let config = Config::from_toml_str(
            r#"
            [store.queries]
            nope = "SELECT 1"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let config = Config::load(tmp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.max_connections, 64);
    }

    #[test]
    fn test_load_invalid_file() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("bad.toml");
        std::fs::write(&path, "debug = \"maybe\"").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
