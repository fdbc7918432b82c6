use super::track::CoverSource;
use crate::descriptor::{self, ListInfo};
use crate::error::Error;
use crate::id::ArtistId;
use crate::track::Track;
use crate::Tidal;
use std::path::PathBuf;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

impl Tidal {
    pub(crate) async fn download_playlist(
        &self,
        uuid: Uuid,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, Error> {
        let playlist = self.playlist(uuid).await?;
        let tracks = self.playlist_items(uuid).await?;
        tracing::info!(playlist = %playlist.title, tracks = tracks.len(), "downloading playlist");

        self.download_listing(
            self.entity_dir("playlist", &uuid.to_string()),
            uuid.to_string(),
            playlist.caption(),
            tracks,
            self.config.concurrency.playlist_tracks,
            cancel,
        )
        .await
    }

    pub(crate) async fn download_mix(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, Error> {
        let title = self.mix_title(id).await?;
        let tracks = self.mix_items(id).await?;
        tracing::info!(mix = %title, tracks = tracks.len(), "downloading mix");

        self.download_listing(
            self.entity_dir("mix", id),
            id.to_string(),
            title,
            tracks,
            self.config.concurrency.mix_tracks,
            cancel,
        )
        .await
    }

    pub(crate) async fn download_credits_listing(
        &self,
        id: ArtistId,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, Error> {
        let (artist, tracks) = self.artist_credit_tracks(id).await?;
        tracing::info!(artist = %artist, tracks = tracks.len(), "downloading artist credits");

        self.download_listing(
            self.entity_dir("artist", &id.to_string()),
            id.to_string(),
            artist,
            tracks,
            self.config.concurrency.mix_tracks,
            cancel,
        )
        .await
    }

    /// Shared flat-listing downloader. Tracks here span albums, so every
    /// track materializes its own cover in its own directory.
    async fn download_listing(
        &self,
        dir: PathBuf,
        id: String,
        caption: String,
        tracks: Vec<Track>,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, Error> {
        tokio::fs::create_dir_all(&dir).await?;

        let pool = Semaphore::new(limit.max(1));
        futures::future::try_join_all(tracks.iter().map(|track| {
            let pool = &pool;
            let dir = &dir;
            async move {
                let _permit = pool.acquire().await.map_err(|_| Error::Canceled)?;
                let cover_id = track.album.cover.clone().ok_or_else(|| {
                    Error::InvalidPayload(format!("track {} has no cover id", track.id))
                })?;
                let track_dir = dir.join(track.id.to_string());
                self.download_track_files(
                    track,
                    &track_dir,
                    &CoverSource::Own(cover_id),
                    None,
                    cancel,
                )
                .await
            }
        }))
        .await?;

        let info = ListInfo {
            id,
            caption,
            track_ids: tracks.iter().map(|track| track.id).collect(),
        };
        descriptor::write(&dir, &info).await?;
        Ok(dir)
    }
}
