use crate::error::Error;
use crate::{COVER_BASE_URL, Tidal, ffmpeg, response};
use bytes::Bytes;
use std::path::Path;

/// Cover art URL: the dashes in the cover id are path separators.
pub(crate) fn cover_url(cover_id: &str) -> String {
    format!("{COVER_BASE_URL}/{}/1280x1280.jpg", cover_id.replace('-', "/"))
}

impl Tidal {
    /// Cover bytes, cache-through; albums share one entry across all tracks.
    pub(crate) async fn cover_bytes(&self, cover_id: &str) -> Result<Bytes, Error> {
        self.caches
            .covers
            .fetch(cover_id, || async move {
                let creds = self.auth.snapshot();
                let request = self
                    .http
                    .get(cover_url(cover_id))
                    .bearer_auth(&creds.access_token)
                    .timeout(self.config.timeouts.download_cover());
                let (status, headers, body) = response::read(response::send(request).await?).await?;
                response::ensure_success(status, &headers, &body)?;
                Ok(body)
            })
            .await
    }

    /// Writes the cover next to the audio, skipping when already present.
    /// Chroma normalization is best-effort; consumers accept either form.
    pub(crate) async fn write_cover(&self, cover_id: &str, dest: &Path) -> Result<(), Error> {
        if tokio::fs::try_exists(dest).await? {
            return Ok(());
        }

        let bytes = self.cover_bytes(cover_id).await?;
        tokio::fs::write(dest, &bytes).await?;

        if let Err(e) = ffmpeg::normalize_cover(dest).await {
            tracing::warn!(cover = %dest.display(), error = %e, "cover normalization failed, keeping original");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_id_dashes_become_path_separators() {
        assert_eq!(
            cover_url("24f52ab0-e7d6-414d-a650-9258cd84c4cc"),
            "https://resources.tidal.com/images/24f52ab0/e7d6/414d/a650/9258cd84c4cc/1280x1280.jpg"
        );
    }
}
