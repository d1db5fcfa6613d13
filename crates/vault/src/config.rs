//! Configuration loading and validation for the field vault service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use envelope::kms::{KmsSettings, StaticCredentials, DATA_KEY_LEN};
use envelope::rotation::{RotationPolicy, DEFAULT_ROTATION_DAYS};
use serde::Deserialize;
use zeroize::Zeroizing;

/// Which [`envelope::KeyService`] backend issues data keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyServiceKind {
    Aws,
    /// In-process master key. Development and tests only.
    Local,
}

impl KeyServiceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyServiceKind::Aws => "aws",
            KeyServiceKind::Local => "local",
        }
    }
}

/// Validated service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_key_service")]
    pub key_service: KeyServiceKind,

    /// KMS master key id, ARN or alias. **Required** for the `aws` backend.
    #[serde(default)]
    pub kms_key_id: Option<String>,

    /// **Required** for the `aws` backend.
    #[serde(default)]
    pub aws_region: Option<String>,

    /// KMS endpoint override, e.g. a LocalStack URL.
    #[serde(default)]
    pub kms_endpoint_url: Option<String>,

    /// Static credentials. When absent the default AWS credential chain is used.
    #[serde(default)]
    pub aws_access_key_id: Option<String>,
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,
    #[serde(default)]
    pub aws_session_token: Option<String>,

    /// Per-call key service timeout.
    #[serde(default = "default_kms_timeout_ms")]
    pub kms_timeout_ms: u64,

    /// Base64 of a 32-byte master key for the `local` backend. A random key
    /// is generated when unset, which makes stored envelopes unreadable after
    /// a restart.
    #[serde(default)]
    pub local_master_key: Option<String>,

    /// Collector that receives a copy of every audit event.
    #[serde(default)]
    pub audit_webhook_url: Option<String>,

    /// HMAC-SHA256 key for the `X-Audit-Signature` header.
    #[serde(default)]
    pub audit_webhook_secret: Option<String>,

    #[serde(default = "default_audit_webhook_timeout")]
    pub audit_webhook_timeout_secs: u64,

    /// Master keys older than this many days are due for rotation.
    #[serde(default = "default_key_rotation_days")]
    pub key_rotation_days: u32,

    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP endpoint for span export. Spans are not exported when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
}

fn default_key_service() -> KeyServiceKind {
    KeyServiceKind::Aws
}
fn default_kms_timeout_ms() -> u64 {
    5000
}
fn default_audit_webhook_timeout() -> u64 {
    5
}
fn default_key_rotation_days() -> u32 {
    DEFAULT_ROTATION_DAYS
}
fn default_listen_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::load(config::Environment::default())
    }

    fn load(source: config::Environment) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(source)
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.key_service == KeyServiceKind::Aws {
            ensure_present(&self.kms_key_id, "KMS_KEY_ID")?;
            ensure_present(&self.aws_region, "AWS_REGION")?;
        }
        if non_empty(&self.aws_access_key_id).is_some()
            != non_empty(&self.aws_secret_access_key).is_some()
        {
            anyhow::bail!("AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together");
        }
        if self.kms_timeout_ms == 0 {
            anyhow::bail!("KMS_TIMEOUT_MS must be > 0");
        }
        if self.audit_webhook_timeout_secs == 0 {
            anyhow::bail!("AUDIT_WEBHOOK_TIMEOUT_SECS must be > 0");
        }
        if non_empty(&self.audit_webhook_secret).is_some()
            && non_empty(&self.audit_webhook_url).is_none()
        {
            anyhow::bail!("AUDIT_WEBHOOK_SECRET is set but AUDIT_WEBHOOK_URL is not");
        }
        self.local_master_key()?;
        Ok(())
    }

    /// Settings for the AWS backend.
    pub fn kms_settings(&self) -> KmsSettings {
        let credentials = match (
            non_empty(&self.aws_access_key_id),
            non_empty(&self.aws_secret_access_key),
        ) {
            (Some(id), Some(secret)) => Some(StaticCredentials {
                access_key_id: id.to_owned(),
                secret_access_key: secret.to_owned(),
                session_token: non_empty(&self.aws_session_token).map(str::to_owned),
            }),
            _ => None,
        };
        KmsSettings {
            key_id: non_empty(&self.kms_key_id).unwrap_or_default().to_owned(),
            region: non_empty(&self.aws_region).map(str::to_owned),
            endpoint_url: non_empty(&self.kms_endpoint_url).map(str::to_owned),
            credentials,
        }
    }

    pub fn kms_timeout(&self) -> Duration {
        Duration::from_millis(self.kms_timeout_ms)
    }

    pub fn audit_webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.audit_webhook_timeout_secs)
    }

    pub fn audit_webhook_url(&self) -> Option<&str> {
        non_empty(&self.audit_webhook_url)
    }

    pub fn audit_webhook_secret(&self) -> Option<&str> {
        non_empty(&self.audit_webhook_secret)
    }

    pub fn otlp_endpoint(&self) -> Option<&str> {
        non_empty(&self.otel_exporter_otlp_endpoint)
    }

    pub fn rotation_policy(&self) -> RotationPolicy {
        RotationPolicy::new(self.key_rotation_days)
    }

    /// Decoded `LOCAL_MASTER_KEY`, if set.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not base64 of exactly 32 bytes.
    pub fn local_master_key(&self) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let Some(encoded) = non_empty(&self.local_master_key) else {
            return Ok(None);
        };
        let key = Zeroizing::new(
            STANDARD
                .decode(encoded)
                .context("LOCAL_MASTER_KEY is not valid base64")?,
        );
        if key.len() != DATA_KEY_LEN {
            anyhow::bail!(
                "LOCAL_MASTER_KEY must decode to {DATA_KEY_LEN} bytes, got {}",
                key.len()
            );
        }
        Ok(Some(key))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn ensure_present(value: &Option<String>, name: &str) -> Result<()> {
    if non_empty(value).is_none() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
