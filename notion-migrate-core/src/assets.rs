//! [`AssetStore`] implementations.
//!
//! - [`S3AssetStore`] uploads to an S3-compatible bucket with a SigV4-signed PUT.
//! - [`OriginBucketStore`] assumes the export's files already live in a public
//!   bucket and only checks that they exist there.
//! - [`DisabledAssetStore`] refuses every asset, leaving references untouched.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, PayloadChecksumKind, PercentEncodingMode, SignableBody, SignableRequest,
    SigningSettings, UriPathNormalizationMode,
};
use aws_sigv4::sign::v4;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::contract::{AssetRef, AssetStore};
use crate::error::AssetError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// RFC 3986 unreserved characters are left as-is in SigV4 canonical URIs.
const SIGV4_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetMode {
    #[default]
    Upload,
    Origin,
    Disabled,
}

/// Bucket coordinates; credentials are supplied separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default)]
    pub mode: AssetMode,
    /// S3 endpoint, e.g. `https://s3.eu-west-3.amazonaws.com`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Base of the URLs handed back for uploaded objects. Defaults to
    /// `<endpoint>/<bucket>`.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Where the original export's files are served from (`origin` mode).
    #[serde(default)]
    pub origin_base_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Percent-encode every segment of an object key, keeping the `/` separators.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, SIGV4_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// A signed, publicly readable PUT: the target URL and every header to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPut {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl SignedPut {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct S3AssetStore {
    http: Client,
    endpoint: Url,
    bucket: String,
    region: String,
    public_base_url: String,
    credentials: S3Credentials,
}

impl S3AssetStore {
    pub fn new(config: &AssetsConfig, credentials: S3Credentials) -> Result<Self, AssetError> {
        let endpoint_raw = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", config.region));
        let endpoint = Url::parse(&endpoint_raw)
            .map_err(|e| AssetError::Config(format!("invalid endpoint {endpoint_raw}: {e}")))?;
        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| AssetError::Config("assets.bucket is required in upload mode".into()))?;
        let public_base_url = config
            .public_base_url
            .clone()
            .unwrap_or_else(|| format!("{}/{}", endpoint_raw.trim_end_matches('/'), bucket));
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        info!(endpoint = %endpoint, bucket = %bucket, region = %config.region, "Initialized S3 asset store");
        Ok(Self {
            http,
            endpoint,
            bucket,
            region: config.region.clone(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Sign a path-style PUT of `body` to `key`.
    pub fn sign_put(
        &self,
        key: &str,
        content_type: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SignedPut, AssetError> {
        let url = format!(
            "{}/{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            self.bucket,
            encode_key(key)
        );
        let identity = Credentials::new(
            &self.credentials.access_key_id,
            &self.credentials.secret_access_key,
            None,
            None,
            "notion-migrate",
        )
        .into();

        // S3 signs the already encoded path as-is, and wants the payload hash header.
        let mut settings = SigningSettings::default();
        settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
        settings.percent_encoding_mode = PercentEncodingMode::Single;
        settings.uri_path_normalization_mode = UriPathNormalizationMode::Disabled;

        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name("s3")
            .time(SystemTime::from(now))
            .settings(settings)
            .build()
            .map_err(|e| AssetError::Signing(e.to_string()))?
            .into();

        let mut headers = vec![
            ("content-type".to_string(), content_type.to_string()),
            ("x-amz-acl".to_string(), "public-read".to_string()),
        ];
        let signable = SignableRequest::new(
            "PUT",
            url.as_str(),
            headers.iter().map(|(name, value)| (name.as_str(), value.as_str())),
            SignableBody::Bytes(body),
        )
        .map_err(|e| AssetError::Signing(e.to_string()))?;
        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| AssetError::Signing(e.to_string()))?
            .into_parts();

        headers.extend(
            instructions
                .headers()
                .map(|(name, value)| (name.to_string(), value.to_string())),
        );
        Ok(SignedPut { url, headers })
    }
}

/// `uploads/<uuid>-<file name>`
pub fn object_key(file_name: &str) -> String {
    format!("uploads/{}-{}", uuid::Uuid::new_v4(), file_name)
}

#[async_trait]
impl AssetStore for S3AssetStore {
    async fn upload_file(&self, asset: &AssetRef) -> Result<String, AssetError> {
        let body = tokio::fs::read(&asset.local_path)
            .await
            .map_err(|source| AssetError::Unreadable {
                path: asset.local_path.clone(),
                source,
            })?;
        let file_name = asset
            .local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "asset".to_string());
        let key = object_key(&file_name);
        let content_type = mime_guess::from_path(&asset.local_path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        let signed = self.sign_put(&key, &content_type, &body, Utc::now())?;
        let mut request = self.http.put(&signed.url);
        for (name, value) in &signed.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.body(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(key = %key, status = %status, "Asset upload rejected");
            return Err(AssetError::Rejected {
                key,
                status: status.as_u16(),
            });
        }
        let url = format!("{}/{}", self.public_base_url, encode_key(&key));
        info!(path = %asset.local_path.display(), url = %url, "Uploaded asset");
        Ok(url)
    }
}

/// Resolves assets against the bucket the export was originally served from.
#[derive(Debug, Clone)]
pub struct OriginBucketStore {
    http: Client,
    base_url: String,
}

impl OriginBucketStore {
    pub fn new(base_url: &str) -> Result<Self, AssetError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AssetStore for OriginBucketStore {
    async fn upload_file(&self, asset: &AssetRef) -> Result<String, AssetError> {
        let url = format!("{}/{}", self.base_url, encode_key(&asset.relative_path));
        let response = self.http.head(&url).send().await?;
        if !response.status().is_success() {
            debug!(url = %url, status = %response.status(), "Asset missing from origin bucket");
            return Err(AssetError::Missing { url });
        }
        Ok(url)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAssetStore;

#[async_trait]
impl AssetStore for DisabledAssetStore {
    async fn upload_file(&self, _asset: &AssetRef) -> Result<String, AssetError> {
        Err(AssetError::Disabled)
    }
}
