//! AWS KMS backend.
//!
//! The SDK client is built on first use and then reused for the life of the
//! process. Concurrent first calls race on a [`OnceCell`]; exactly one of them
//! loads the SDK configuration.

use aws_config::{BehaviorVersion, Region};
use aws_sdk_kms::config::Credentials;
use aws_sdk_kms::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::DataKeySpec;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::{DataKey, DataKeyPair, KeyService, KeyServiceError, MasterKeyInfo, UnwrappedKey};

/// Error codes meaning "this blob is not something the master key produced".
const REJECTED_CIPHERTEXT_CODES: &[&str] = &["InvalidCiphertextException", "IncorrectKeyException"];

/// Static AWS credentials.
#[derive(Clone)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Connection settings for [`AwsKeyService`].
#[derive(Debug, Clone, Default)]
pub struct KmsSettings {
    /// Master key id, ARN, or `alias/...`.
    pub key_id: String,
    pub region: Option<String>,
    /// Endpoint override, e.g. a LocalStack URL.
    pub endpoint_url: Option<String>,
    /// When absent the default AWS credential chain is used.
    pub credentials: Option<StaticCredentials>,
}

impl KmsSettings {
    /// True when key id, region and a full set of credentials are present.
    pub fn is_configured(&self) -> bool {
        let has_region = self
            .region
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());
        let has_credentials = self.credentials.as_ref().is_some_and(|c| {
            !c.access_key_id.trim().is_empty() && !c.secret_access_key.trim().is_empty()
        });
        !self.key_id.trim().is_empty() && has_region && has_credentials
    }
}

/// [`KeyService`] backed by AWS KMS `GenerateDataKey`, `Decrypt` and `DescribeKey`.
pub struct AwsKeyService {
    settings: KmsSettings,
    client: OnceCell<aws_sdk_kms::Client>,
}

impl AwsKeyService {
    /// Record settings; no network activity happens until the first call.
    pub fn new(settings: KmsSettings) -> Self {
        Self {
            settings,
            client: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &KmsSettings {
        &self.settings
    }

    /// Whether the SDK client has been built yet.
    pub fn is_initialised(&self) -> bool {
        self.client.initialized()
    }

    async fn client(&self) -> &aws_sdk_kms::Client {
        self.client
            .get_or_init(|| build_client(&self.settings))
            .await
    }
}

async fn build_client(settings: &KmsSettings) -> aws_sdk_kms::Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &settings.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(creds) = &settings.credentials {
        loader = loader.credentials_provider(Credentials::new(
            creds.access_key_id.clone(),
            creds.secret_access_key.clone(),
            creds.session_token.clone(),
            None,
            "field-vault-static",
        ));
    }
    let sdk_config = loader.load().await;

    let mut builder = aws_sdk_kms::config::Builder::from(&sdk_config);
    if let Some(endpoint) = &settings.endpoint_url {
        builder = builder.endpoint_url(endpoint);
    }

    info!(
        key_id = %settings.key_id,
        region = settings.region.as_deref().unwrap_or("default"),
        "KMS client initialised"
    );
    aws_sdk_kms::Client::from_conf(builder.build())
}

/// `Decrypt` for a wrapped data key.
///
/// No key id: the blob names the master key that wrapped it, which may no
/// longer be the one the configured alias points at.
fn decrypt_request(
    client: &aws_sdk_kms::Client,
    wrapped: &[u8],
) -> aws_sdk_kms::operation::decrypt::builders::DecryptFluentBuilder {
    client
        .decrypt()
        .ciphertext_blob(Blob::new(wrapped.to_vec()))
}

/// Map an SDK failure onto the backend contract.
fn classify<E, R>(op: &str, err: SdkError<E, R>) -> KeyServiceError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    let code = err.code().map(str::to_owned);
    let message = format!("{op}: {}", DisplayErrorContext(&err));
    match code.as_deref() {
        Some(c) if REJECTED_CIPHERTEXT_CODES.contains(&c) => KeyServiceError::InvalidCiphertext(message),
        _ => {
            warn!(op, code = code.as_deref().unwrap_or("none"), "KMS request failed");
            KeyServiceError::Unavailable(message)
        }
    }
}

#[async_trait]
impl KeyService for AwsKeyService {
    async fn generate_data_key(&self) -> Result<DataKeyPair, KeyServiceError> {
        let mut resp = self
            .client()
            .await
            .generate_data_key()
            .key_id(&self.settings.key_id)
            .key_spec(DataKeySpec::Aes256)
            .send()
            .await
            .map_err(|e| classify("GenerateDataKey", e))?;

        let plaintext = Zeroizing::new(
            resp.plaintext
                .take()
                .ok_or_else(|| {
                    KeyServiceError::MalformedResponse("GenerateDataKey returned no plaintext".into())
                })?
                .into_inner(),
        );
        let wrapped = resp
            .ciphertext_blob()
            .map(|b| b.as_ref().to_vec())
            .ok_or_else(|| {
                KeyServiceError::MalformedResponse("GenerateDataKey returned no ciphertext blob".into())
            })?;
        let master_key_id = resp
            .key_id()
            .unwrap_or(self.settings.key_id.as_str())
            .to_owned();

        Ok(DataKeyPair {
            plaintext: DataKey::from_slice(&plaintext)?,
            wrapped,
            master_key_id,
        })
    }

    async fn unwrap_data_key(&self, wrapped: &[u8]) -> Result<UnwrappedKey, KeyServiceError> {
        let mut resp = decrypt_request(self.client().await, wrapped)
            .send()
            .await
            .map_err(|e| classify("Decrypt", e))?;

        let plaintext = Zeroizing::new(
            resp.plaintext
                .take()
                .ok_or_else(|| KeyServiceError::MalformedResponse("Decrypt returned no plaintext".into()))?
                .into_inner(),
        );

        Ok(UnwrappedKey {
            plaintext: DataKey::from_slice(&plaintext)?,
            master_key_id: resp.key_id().map(str::to_owned),
        })
    }

    async fn describe_master_key(&self) -> Result<MasterKeyInfo, KeyServiceError> {
        let resp = self
            .client()
            .await
            .describe_key()
            .key_id(&self.settings.key_id)
            .send()
            .await
            .map_err(|e| classify("DescribeKey", e))?;

        let created_at = resp
            .key_metadata()
            .and_then(|m| m.creation_date())
            .and_then(|d| DateTime::<Utc>::from_timestamp(d.secs(), d.subsec_nanos()));

        Ok(MasterKeyInfo {
            key_id: self.settings.key_id.clone(),
            created_at,
        })
    }
}
