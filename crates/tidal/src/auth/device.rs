use super::{Auth, AUTH_BASE_URL, CLIENT_ID, CLIENT_SECRET, Credentials, jwt_exp};
use crate::error::Error;
use crate::response;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SCOPE: &str = "r_usr w_usr";
const DEVICE_AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const AUTHORIZATION_PENDING_SUB_STATUS: u32 = 1002;

/// A running device-code login. The verification URL goes to the user; the
/// flow resolves once they authorize, the link expires, or it is canceled.
pub struct LoginFlow {
    pub verification_url: String,
    waiter: JoinHandle<Result<(), Error>>,
}

impl LoginFlow {
    pub async fn finished(self) -> Result<(), Error> {
        self.waiter.await?
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceAuthorization {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    expires_in: u64,
    interval: u64,
}

#[derive(Debug, Deserialize)]
struct DeviceToken {
    access_token: String,
    refresh_token: String,
}

enum Poll {
    Pending,
    Authorized(DeviceToken),
}

impl Auth {
    /// Starts the device-code login flow.
    ///
    /// Admits one flow at a time; a concurrent call fails with
    /// `LoginInProgress`. The spawned waiter polls the token endpoint at 5x
    /// the server-provided interval until authorization, the
    /// `expires_in` deadline, or cancellation, and releases the gate when it
    /// resolves.
    pub async fn start_login(self: Arc<Self>, cancel: CancellationToken) -> Result<LoginFlow, Error> {
        let permit = self
            .login_gate
            .clone()
            .try_acquire_owned()
            .map_err(|_| Error::LoginInProgress)?;

        let request = self
            .http
            .post(const_format::formatcp!("{AUTH_BASE_URL}/device_authorization"))
            .form(&[("client_id", CLIENT_ID), ("scope", SCOPE)])
            .timeout(DEVICE_AUTHORIZATION_TIMEOUT);
        let (status, headers, body) = response::read(response::send(request).await?).await?;
        response::ensure_success(status, &headers, &body)?;

        let grant: DeviceAuthorization = serde_json::from_slice(&body)?;
        let verification_url = match &grant.verification_uri_complete {
            Some(complete) => format!("https://{complete}"),
            None => format!("https://{}/{}", grant.verification_uri, grant.user_code),
        };
        tracing::info!(
            user_code = %grant.user_code,
            expires_in = grant.expires_in,
            "device authorization issued"
        );

        let auth = Arc::clone(&self);
        let waiter = tokio::spawn(async move {
            let _permit = permit;
            auth.wait_for_authorization(grant, cancel).await
        });

        Ok(LoginFlow {
            verification_url,
            waiter,
        })
    }

    async fn wait_for_authorization(
        &self,
        grant: DeviceAuthorization,
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(grant.expires_in);
        let token = wait_until_authorized(deadline, poll_cadence(grant.interval), &cancel, || {
            self.poll_token(&grant.device_code)
        })
        .await?;
        self.complete_login(token).await
    }

    /// One poll of the token endpoint; the per-request timeout is independent
    /// of the overall deadline.
    async fn poll_token(&self, device_code: &str) -> Result<Poll, Error> {
        let request = self
            .http
            .post(const_format::formatcp!("{AUTH_BASE_URL}/token"))
            .basic_auth(CLIENT_ID, Some(CLIENT_SECRET))
            .form(&[
                ("client_id", CLIENT_ID),
                ("device_code", device_code),
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("scope", SCOPE),
            ])
            .timeout(POLL_REQUEST_TIMEOUT);
        let (status, _, body) = response::read(response::send(request).await?).await?;

        if status.as_u16() == 200 {
            return Ok(Poll::Authorized(serde_json::from_slice(&body)?));
        }

        if status.as_u16() == 400 {
            #[derive(Deserialize)]
            struct PendingBody {
                error: String,
                sub_status: u32,
            }
            if let Ok(pending) = serde_json::from_slice::<PendingBody>(&body) {
                if pending.error == "authorization_pending"
                    && pending.sub_status == AUTHORIZATION_PENDING_SUB_STATUS
                {
                    return Ok(Poll::Pending);
                }
            }
        }

        Err(Error::UnexpectedResponse {
            status: status.as_u16(),
            tail: response::body_tail(&body),
        })
    }

    async fn complete_login(&self, token: DeviceToken) -> Result<(), Error> {
        let expires_at = jwt_exp(&token.access_token)?;
        let country_code = self.fetch_country_code(&token.access_token).await?;

        self.install(Credentials {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            country_code,
        })
        .await?;

        tracing::info!("login complete");
        Ok(())
    }

    async fn fetch_country_code(&self, access_token: &str) -> Result<String, Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Me {
            country_code: String,
        }

        let request = self
            .http
            .get(const_format::formatcp!("{}/me", crate::API_BASE_URL))
            .bearer_auth(access_token)
            .timeout(DEVICE_AUTHORIZATION_TIMEOUT);
        let (status, headers, body) = response::read(response::send(request).await?).await?;
        response::ensure_success(status, &headers, &body)?;

        let me: Me = serde_json::from_slice(&body)?;
        Ok(me.country_code)
    }
}

/// Poll cadence is 5x the server-provided interval.
fn poll_cadence(interval: u64) -> Duration {
    Duration::from_secs(interval.max(1) * 5)
}

/// Polls the given source on the cadence until it authorizes, the deadline
/// passes, or the flow is canceled. Cancellation and the deadline take
/// priority over starting another poll.
async fn wait_until_authorized<F, Fut>(
    deadline: tokio::time::Instant,
    cadence: Duration,
    cancel: &CancellationToken,
    mut poll: F,
) -> Result<DeviceToken, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll, Error>>,
{
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + cadence, cadence);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("login flow canceled");
                return Err(Error::Canceled);
            }
            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!("login link expired without authorization");
                return Err(Error::LoginLinkExpired);
            }
            _ = ticker.tick() => {
                match poll().await? {
                    Poll::Pending => continue,
                    Poll::Authorized(token) => return Ok(token),
                }
            }
        }
    }
}
