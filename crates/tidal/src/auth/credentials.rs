use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub(crate) const CREDENTIALS_FILE: &str = "tidal.json";

/// The persisted login state. A fresh install deserializes to the default
/// record, whose zero `expires_at` marks the logged-out state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "Token")]
    pub access_token: String,
    #[serde(rename = "RefreshToken")]
    pub refresh_token: String,
    /// Unix seconds, taken from the access token's JWT `exp` claim.
    #[serde(rename = "ExpiresAt")]
    pub expires_at: i64,
    #[serde(rename = "CountryCode")]
    pub country_code: String,
}

impl Credentials {
    pub fn is_logged_in(&self) -> bool {
        self.expires_at != 0
    }

    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at < now + margin_secs
    }
}

pub(crate) fn credentials_path(dir: &Path) -> PathBuf {
    dir.join(CREDENTIALS_FILE)
}

pub(crate) async fn load(path: &Path) -> Result<Option<Credentials>, Error> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replaces the credentials file atomically: write a sibling temp file, fsync
/// it, then rename over the destination.
pub(crate) async fn store(path: &Path, credentials: &Credentials) -> Result<(), Error> {
    let raw = serde_json::to_vec_pretty(credentials)?;
    let tmp = path.with_extension("json.tmp");

    let mut file = tokio::fs::File::create(&tmp).await?;
    tokio::io::AsyncWriteExt::write_all(&mut file, &raw).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

pub(crate) async fn remove(path: &Path) -> Result<(), Error> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
