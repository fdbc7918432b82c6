mod credentials;
mod device;

pub use credentials::Credentials;
pub use device::LoginFlow;

use crate::error::Error;
use crate::response;
use base64::Engine;
use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;

pub(crate) const AUTH_BASE_URL: &str = "https://auth.tidal.com/v1/oauth2";

// Compiled-in OAuth client, the TV-profile client used for device flows.
const CLIENT_ID: &str = "zU4XHVVkc2tDPo4t";
const CLIENT_SECRET: &str = "VJKhDFqJPqvsPVNBV6ukXTJmwlvbttP7wlMlrc72se4=";

const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

const INVALID_GRANT_SUB_STATUS: u32 = 11101;

/// Credential store: wait-free snapshots, linearized replacement, and
/// single-flight admission for the device flow and for refreshes.
///
/// A replacement only becomes visible to readers after the credentials file
/// has been written, so a crash never leaves readers ahead of disk.
pub struct Auth {
    http: reqwest::Client,
    path: PathBuf,
    current: RwLock<Arc<Credentials>>,
    pub(crate) login_gate: Arc<Semaphore>,
    refresh_gate: Semaphore,
}

impl Auth {
    pub(crate) async fn load(http: reqwest::Client, credentials_directory: &Path) -> Result<Self, Error> {
        let path = credentials::credentials_path(credentials_directory);
        let stored = credentials::load(&path).await?.unwrap_or_default();
        if stored.is_logged_in() {
            tracing::debug!(country = %stored.country_code, "loaded stored credentials");
        }
        Ok(Self {
            http,
            path,
            current: RwLock::new(Arc::new(stored)),
            login_gate: Arc::new(Semaphore::new(1)),
            refresh_gate: Semaphore::new(1),
        })
    }

    pub fn snapshot(&self) -> Arc<Credentials> {
        self.current.read().unwrap().clone()
    }

    /// Persists then publishes a new credential record.
    pub(crate) async fn install(&self, next: Credentials) -> Result<(), Error> {
        credentials::store(&self.path, &next).await?;
        *self.current.write().unwrap() = Arc::new(next);
        Ok(())
    }

    pub(crate) async fn logout(&self) -> Result<(), Error> {
        credentials::remove(&self.path).await?;
        *self.current.write().unwrap() = Arc::new(Credentials::default());
        Ok(())
    }

    /// Exchanges the stored refresh token for a fresh access token.
    ///
    /// Single-flight: a second concurrent call fails with
    /// `TokenRefreshInProgress` instead of queueing. The previous refresh
    /// token is kept; only the access token and expiry change.
    pub async fn try_refresh(&self) -> Result<(), Error> {
        let _permit = self
            .refresh_gate
            .try_acquire()
            .map_err(|_| Error::TokenRefreshInProgress)?;

        let current = self.snapshot();
        if current.refresh_token.is_empty() {
            return Err(Error::LoginRequired);
        }

        tracing::debug!("refreshing access token");
        let request = self
            .http
            .post(const_format::formatcp!("{AUTH_BASE_URL}/token"))
            .basic_auth(CLIENT_ID, Some(CLIENT_SECRET))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", current.refresh_token.as_str()),
            ])
            .timeout(REFRESH_TIMEOUT);
        let (status, _, body) = response::read(response::send(request).await?).await?;

        match status.as_u16() {
            200 => {}
            401 => {
                let text = String::from_utf8_lossy(&body).to_lowercase();
                if text.contains("expired") || text.contains("could not be verified") {
                    return Err(Error::Unauthorized(response::body_tail(&body)));
                }
                return Err(Error::UnexpectedResponse {
                    status: 401,
                    tail: response::body_tail(&body),
                });
            }
            400 => {
                #[derive(Deserialize)]
                struct GrantFailure {
                    error: String,
                    sub_status: u32,
                }
                if let Ok(failure) = serde_json::from_slice::<GrantFailure>(&body) {
                    if failure.error == "invalid_grant"
                        && failure.sub_status == INVALID_GRANT_SUB_STATUS
                    {
                        return Err(Error::Unauthorized(response::body_tail(&body)));
                    }
                }
                return Err(Error::UnexpectedResponse {
                    status: 400,
                    tail: response::body_tail(&body),
                });
            }
            other => {
                return Err(Error::UnexpectedResponse {
                    status: other,
                    tail: response::body_tail(&body),
                });
            }
        }

        #[derive(Deserialize)]
        struct Refreshed {
            access_token: String,
        }
        let refreshed: Refreshed = serde_json::from_slice(&body)?;
        let expires_at = jwt_exp(&refreshed.access_token)?;

        self.install(Credentials {
            access_token: refreshed.access_token,
            refresh_token: current.refresh_token.clone(),
            expires_at,
            country_code: current.country_code.clone(),
        })
        .await?;

        tracing::info!(expires_at, "access token refreshed");
        Ok(())
    }
}

/// Reads the `exp` claim out of a JWT without verifying the signature; the
/// server is trusted, the claim only schedules our own refresh.
pub(crate) fn jwt_exp(token: &str) -> Result<i64, Error> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::InvalidPayload("access token is not a JWT".into()))?;
    let raw = BASE64_URL_SAFE_NO_PAD.decode(payload)?;

    #[derive(Deserialize)]
    struct Claims {
        exp: i64,
    }
    let claims: Claims = serde_json::from_slice(&raw)?;
    Ok(claims.exp)
}
