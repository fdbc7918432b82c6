mod album;
mod artist;
mod auth;
mod cache;
mod config;
mod cover;
pub mod descriptor;
mod download;
mod error;
mod ffmpeg;
pub mod id;
mod link;
mod manifest;
mod mix;
mod page;
mod playlist;
mod response;
mod track;

pub use album::Album;
pub use auth::{Auth, Credentials, LoginFlow};
pub use config::{Concurrency, Config, Timeouts};
pub use error::Error;
pub use link::{Link, LinkKind};
pub use playlist::Playlist;
pub use track::{ArtistRole, Track, TrackCredits};

use bytes::Bytes;
use cache::Cache;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub(crate) const API_BASE_URL: &str = "https://api.tidal.com/v1";
pub(crate) const LISTEN_BASE_URL: &str = "https://listen.tidal.com/v1";
pub(crate) const PAGES_BASE_URL: &str = "https://tidal.com/v1";
pub(crate) const COVER_BASE_URL: &str = "https://resources.tidal.com/images";

const ALBUM_META_TTL: Duration = Duration::from_secs(6 * 60 * 60);
const COVER_TTL: Duration = Duration::from_secs(6 * 60 * 60);
const CREDITS_TTL: Duration = Duration::from_secs(6 * 60 * 60);

pub(crate) struct Caches {
    pub albums: Cache<Album>,
    pub covers: Cache<Bytes>,
    pub credits: Cache<TrackCredits>,
}

impl Caches {
    fn new() -> Self {
        Self {
            albums: Cache::new(ALBUM_META_TTL),
            covers: Cache::new(COVER_TTL),
            credits: Cache::new(CREDITS_TTL),
        }
    }
}

/// The download engine: catalog client, credential store, caches, and the
/// per-process download gate.
pub struct Tidal {
    pub(crate) http: reqwest::Client,
    pub(crate) auth: Arc<Auth>,
    pub(crate) caches: Caches,
    pub(crate) config: Arc<Config>,
    pub(crate) download_gate: Semaphore,
}

impl Tidal {
    /// Builds the engine: validates both configured directories and loads any
    /// persisted credentials. A missing credentials file just means logged
    /// out.
    pub async fn new(config: Config) -> Result<Self, Error> {
        ensure_directory(&config.credentials_directory, "credentials_directory").await?;
        ensure_directory(&config.downloads_directory, "downloads_directory").await?;

        let http = reqwest::Client::new();
        let auth = Arc::new(Auth::load(http.clone(), &config.credentials_directory).await?);

        Ok(Self {
            http,
            auth,
            caches: Caches::new(),
            config: Arc::new(config),
            download_gate: Semaphore::new(1),
        })
    }

    /// Wait-free snapshot of the stored credentials.
    pub fn credentials(&self) -> Arc<Credentials> {
        self.auth.snapshot()
    }

    /// Starts the device-code login flow; see [`Auth::start_login`].
    pub async fn start_login(&self, cancel: CancellationToken) -> Result<LoginFlow, Error> {
        Arc::clone(&self.auth).start_login(cancel).await
    }

    /// Forgets the stored credentials, on disk and in memory.
    pub async fn logout(&self) -> Result<(), Error> {
        self.auth.logout().await
    }

    pub(crate) fn country(&self) -> String {
        self.auth.snapshot().country_code.clone()
    }

    /// Bearer-authenticated JSON GET with a per-operation timeout, classified
    /// through the response taxonomy before decoding.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<T, Error> {
        let creds = self.auth.snapshot();
        let request = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(&creds.access_token)
            .timeout(timeout);

        let (status, headers, body) = response::read(response::send(request).await?).await?;
        response::ensure_success(status, &headers, &body)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

async fn ensure_directory(path: &Path, key: &str) -> Result<(), Error> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::Config(format!(
            "{key} {} is not a directory",
            path.display()
        ))),
        Err(_) => Err(Error::Config(format!(
            "{key} {} does not exist",
            path.display()
        ))),
    }
}
