//! Apple Push Notification service provider
//!
//! Pushes are sent over HTTP/2 with certificate-based client authentication.

use async_trait::async_trait;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::x509::X509;
use reqwest::{Client, Identity};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::provider::{Delivery, NotificationProvider};

const PRODUCTION_HOST: &str = "https://api.push.apple.com";
const DEVELOPMENT_HOST: &str = "https://api.sandbox.push.apple.com";

/// Which APNs gateway to talk to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    pub fn host(&self) -> &'static str {
        match self {
            Environment::Production => PRODUCTION_HOST,
            Environment::Development => DEVELOPMENT_HOST,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    reason: String,
}

/// Extract the `reason` of an APNs error body
fn parse_reason(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .map(|body| body.reason)
}

async fn read_credential(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))
}

/// Load the client identity from a PEM certificate and key, falling back to
/// a PKCS#12 archive
pub fn load_identity(certificate: &[u8], key: &[u8], password: &str) -> Result<Identity> {
    match Identity::from_pkcs8_pem(certificate, key) {
        Ok(identity) => Ok(identity),
        Err(e) => {
            log::warn!("PEM certificate loading failed, trying PKCS#12: {}", e);
            Identity::from_pkcs12_der(certificate, password)
                .map_err(|e| Error::Config(format!("Cannot load certificate: {}", e)))
        }
    }
}

/// Read the APNs topic from the UID attribute of the certificate subject
///
/// `certificate` is either PEM or a PKCS#12 archive opened with `password`.
pub fn topic_from_certificate(certificate: &[u8], password: &str) -> Result<String> {
    let leaf = match X509::from_pem(certificate) {
        Ok(leaf) => leaf,
        Err(_) => Pkcs12::from_der(certificate)
            .and_then(|archive| archive.parse2(password))
            .map_err(|e| Error::Config(format!("Cannot parse certificate: {}", e)))?
            .cert
            .ok_or_else(|| Error::Config("PKCS#12 archive holds no certificate".to_string()))?,
    };

    let entry = leaf
        .subject_name()
        .entries_by_nid(Nid::USERID)
        .next()
        .ok_or_else(|| Error::Config("Certificate subject has no UID attribute".to_string()))?;
    let topic = entry
        .data()
        .as_utf8()
        .map_err(|e| Error::Config(format!("Certificate UID is not text: {}", e)))?;

    Ok(topic.to_string())
}

/// APNs client shared by all sessions
pub struct ApnsProvider {
    client: Client,
    host: String,
    topic: String,
}

impl ApnsProvider {
    pub fn new(identity: Identity, topic: impl Into<String>, environment: Environment, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .use_native_tls()
            .identity(identity)
            .http2_prior_knowledge()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            host: environment.host().to_string(),
            topic: topic.into(),
        })
    }

    /// Build a provider from the `[provider]` configuration section
    ///
    /// The topic is taken from the certificate unless `provider.topic`
    /// overrides it.
    pub async fn from_config(config: &ProviderConfig) -> Result<Self> {
        log::debug!("Loading APNs credentials from {}", config.certificate.display());
        let certificate = read_credential(&config.certificate).await?;
        let key = match &config.key {
            Some(key) => read_credential(key).await?,
            None => certificate.clone(),
        };
        let identity = load_identity(&certificate, &key, &config.password)?;

        let topic = if config.topic.is_empty() {
            topic_from_certificate(&certificate, &config.password)?
        } else {
            config.topic.clone()
        };
        log::debug!("Using APNs topic {}", topic);

        log::debug!("Creating APNs client to {}", config.environment.host());
        Self::new(
            identity,
            topic,
            config.environment,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn device_url(&self, device_token: &str) -> String {
        format!("{}/3/device/{}", self.host, device_token)
    }
}

#[async_trait]
impl NotificationProvider for ApnsProvider {
    async fn send(&self, device_token: &str, payload: &[u8]) -> Result<Delivery> {
        let response = self
            .client
            .post(self.device_url(device_token))
            .header("apns-topic", self.topic.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await?;

        let status_code = response.status().as_u16();
        let provider_message_id = response
            .headers()
            .get("apns-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        let delivery = Delivery {
            status_code,
            provider_message_id,
            reason: parse_reason(&body),
        };
        log::debug!(
            "{} {:?} {:?}",
            delivery.status_code,
            delivery.provider_message_id,
            delivery.reason
        );

        Ok(delivery)
    }
}
