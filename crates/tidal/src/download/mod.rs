mod album;
mod dash;
mod list;
mod range;
mod track;

use crate::error::Error;
use crate::id::{AlbumId, ArtistId, TrackId};
use crate::link::{Link, LinkKind};
use crate::Tidal;
use chrono::Utc;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_retry::strategy::FibonacciBackoff;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const MAX_ATTEMPTS: usize = 7;
const EXPIRY_MARGIN_SECS: i64 = 10 * 60;
const BACKOFF_BASE_MS: u64 = 1000;
const BACKOFF_CAP: Duration = Duration::from_secs(30);

impl Tidal {
    /// Downloads the entity behind a parsed link into the downloads root and
    /// returns the entity directory.
    ///
    /// One download runs per process; a second call fails with
    /// `DownloadInProgress`. The retry wrapper walks a Fibonacci backoff for
    /// up to seven attempts: rate limits and per-request deadlines retry,
    /// `Unauthorized` triggers a token refresh and retries, and a stale token
    /// is refreshed in preflight. A refresh spends the attempt it happens in,
    /// so when the final attempt is consumed by one, a single extra attempt
    /// is granted - otherwise the refresh would never be used.
    pub async fn download(&self, link: &Link, cancel: &CancellationToken) -> Result<PathBuf, Error> {
        let _permit = self
            .download_gate
            .try_acquire()
            .map_err(|_| Error::DownloadInProgress)?;

        let mut delays = FibonacciBackoff::from_millis(BACKOFF_BASE_MS)
            .max_delay(BACKOFF_CAP)
            .take(MAX_ATTEMPTS);
        let mut extra_granted = false;
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let mut refreshed = false;

            let creds = self.auth.snapshot();
            if !creds.is_logged_in() {
                return Err(Error::LoginRequired);
            }

            let failure = if creds.expires_within(Utc::now().timestamp(), EXPIRY_MARGIN_SECS) {
                match self.auth.try_refresh().await {
                    Ok(()) => {
                        refreshed = true;
                        None
                    }
                    Err(e) => match retry_class(&e) {
                        RetryClass::Retry => Some(e),
                        _ => return Err(e),
                    },
                }
            } else {
                match self.dispatch(link, cancel).await {
                    Ok(dir) => return Ok(dir),
                    Err(e) => match retry_class(&e) {
                        RetryClass::Fatal => return Err(e),
                        RetryClass::Retry => Some(e),
                        RetryClass::Refresh => {
                            match self.auth.try_refresh().await {
                                Ok(()) => refreshed = true,
                                Err(re) if matches!(retry_class(&re), RetryClass::Retry) => {}
                                Err(re) => return Err(re),
                            }
                            Some(e)
                        }
                    },
                }
            };

            if !may_continue(attempt, refreshed, &mut extra_granted) {
                return Err(failure.unwrap_or_else(|| {
                    Error::Unauthorized("token refresh kept producing a stale token".into())
                }));
            }

            if let Some(e) = &failure {
                tracing::warn!(attempt, error = %e, "download attempt failed, retrying");
                if let Some(delay) = delays.next() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(Error::Canceled),
                    }
                }
            }
        }
    }

    async fn dispatch(&self, link: &Link, cancel: &CancellationToken) -> Result<PathBuf, Error> {
        let bad_id = || Error::InvalidLink(link.id.clone());
        match link.kind {
            LinkKind::Track => {
                let id: TrackId = link.id.parse().map_err(|_| bad_id())?;
                self.download_single_track(id, cancel).await
            }
            LinkKind::Album => {
                let id: AlbumId = link.id.parse().map_err(|_| bad_id())?;
                self.download_album(id, cancel).await
            }
            LinkKind::Playlist => {
                let uuid = Uuid::parse_str(&link.id).map_err(|_| bad_id())?;
                self.download_playlist(uuid, cancel).await
            }
            LinkKind::Mix => self.download_mix(&link.id, cancel).await,
            LinkKind::Artist => Err(Error::UnsupportedArtistLink),
            LinkKind::Video => Err(Error::UnsupportedVideoLink),
        }
    }

    /// Downloads the artist-credit compilation for an artist id.
    ///
    /// Artist *links* stay unsupported in [`Tidal::download`]; this is the
    /// separate operation behind the bot's explicit credits command.
    pub async fn download_artist_credits(
        &self,
        id: ArtistId,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, Error> {
        let _permit = self
            .download_gate
            .try_acquire()
            .map_err(|_| Error::DownloadInProgress)?;
        self.download_credits_listing(id, cancel).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryClass {
    Fatal,
    Retry,
    Refresh,
}

fn retry_class(e: &Error) -> RetryClass {
    match e {
        Error::RateLimited | Error::DeadlineExceeded | Error::TokenRefreshInProgress => {
            RetryClass::Retry
        }
        Error::Unauthorized(_) => RetryClass::Refresh,
        _ => RetryClass::Fatal,
    }
}

/// Whether the retry loop may take another attempt after `attempt` finished.
///
/// A token refresh spends the attempt it happens in, so a refresh on the
/// final attempt grants exactly one attempt beyond the cap.
fn may_continue(attempt: usize, refreshed: bool, extra_granted: &mut bool) -> bool {
    if attempt < MAX_ATTEMPTS {
        return true;
    }
    if refreshed && !*extra_granted {
        *extra_granted = true;
        return true;
    }
    false
}

/// Side file for one worker's output: `<dest>.chunk.<index>`.
pub(crate) fn chunk_path(dest: &Path, index: u64) -> PathBuf {
    let mut os: OsString = dest.as_os_str().to_owned();
    os.push(format!(".chunk.{index}"));
    PathBuf::from(os)
}

/// Concatenates the side files into `dest` in index order, removing each side
/// file after it is copied, and fsyncs the result.
pub(crate) async fn assemble_chunks(dest: &Path, count: u64) -> Result<(), Error> {
    let mut out = tokio::fs::File::create(dest).await?;
    for index in 0..count {
        let path = chunk_path(dest, index);
        let mut side = tokio::fs::File::open(&path).await?;
        tokio::io::copy(&mut side, &mut out).await?;
        drop(side);
        tokio::fs::remove_file(&path).await?;
    }
    out.sync_all().await?;
    Ok(())
}

/// Removes every side file and the (possibly partial) destination.
pub(crate) async fn discard_chunks(dest: &Path, count: u64) {
    for index in 0..count {
        let _ = tokio::fs::remove_file(chunk_path(dest, index)).await;
    }
    let _ = tokio::fs::remove_file(dest).await;
}
