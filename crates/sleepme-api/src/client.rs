// Sleep.me REST client
//
// Wraps `reqwest::Client` with URL construction, status classification and
// JSON decoding. One call = one HTTP request: rate limiting and retries are
// layered on top by sleepme-core.

use std::time::Duration;

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::{ClaimedDevice, DevicePatch, DeviceStatus};
use crate::transport::TransportConfig;

/// Production API root.
pub const DEFAULT_API_URL: &str = "https://api.developer.sleep.me/v1";

/// Raw HTTP client for the Sleep.me developer API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct SleepMeClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl SleepMeClient {
    /// Create a client that authenticates with `token`.
    pub fn new(
        base_url: Url,
        token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client(token)?;
        Ok(Self {
            http,
            base_url,
            timeout: transport.timeout,
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    ///
    /// The caller is responsible for the `Authorization` header.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            timeout: TransportConfig::default().timeout,
        }
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /devices`: devices claimed by this token.
    pub async fn list_devices(&self) -> Result<Vec<ClaimedDevice>, Error> {
        let url = self.url("devices")?;
        debug!("GET {url}");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.parse_json(resp).await
    }

    /// `GET /devices/{id}`: full status/control/about document.
    pub async fn get_device(&self, device_id: &str) -> Result<DeviceStatus, Error> {
        let url = self.device_url(device_id)?;
        debug!("GET {url}");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.parse_json(resp).await
    }

    /// `PATCH /devices/{id}`: partial control update.
    ///
    /// Returns the response body, or `Value::Null` when the API answers
    /// with an empty body.
    pub async fn patch_device(&self, device_id: &str, patch: &DevicePatch) -> Result<Value, Error> {
        let url = self.device_url(device_id)?;
        debug!(body = ?patch, "PATCH {url}");
        let resp = self
            .http
            .patch(url)
            .json(patch)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let body = self.checked_body(resp).await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        decode(&body)
    }

    // ── URL builders ─────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    fn device_url(&self, device_id: &str) -> Result<Url, Error> {
        let mut url = self.url("devices")?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .push(device_id);
        Ok(url)
    }

    // ── Response handling ────────────────────────────────────────────

    fn map_send_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }

    /// Read the body, turning non-success statuses into typed errors.
    async fn checked_body(&self, resp: reqwest::Response) -> Result<String, Error> {
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_send_error(e))?;
        trace!(%status, len = body.len(), "response received");

        if status.is_success() {
            Ok(body)
        } else {
            Err(Error::from_status(status.as_u16(), &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T, Error> {
        let body = self.checked_body(resp).await?;
        decode(&body)
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.to_owned(),
        }
    })
}
