use super::track::CoverSource;
use crate::album::assemble_volumes;
use crate::descriptor::{self, AlbumInfo, COVER_FILE};
use crate::error::Error;
use crate::id::AlbumId;
use crate::Tidal;
use std::path::PathBuf;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

impl Tidal {
    /// Album entity: one shared cover, tracks laid out per `(volume, id)`,
    /// credits harvested in bulk during volume paging and pre-seeded into the
    /// cache so per-track workers never ask for them over the network.
    pub(crate) async fn download_album(
        &self,
        id: AlbumId,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, Error> {
        let album = self.album(id).await?;
        tracing::info!(album = %album.title, artist = %album.artist.name, "downloading album");

        let dir = self.entity_dir("album", &id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let cover_path = dir.join(COVER_FILE);
        self.write_cover(&album.cover, &cover_path).await?;

        let items = self.album_items_with_credits(id).await?;
        for (track, credits) in &items {
            self.caches
                .credits
                .set(&track.id.to_string(), credits.clone())
                .await;
        }

        let volumes = assemble_volumes(items.iter().map(|(track, _)| track))?;
        let totals = Some((album.number_of_tracks, album.number_of_volumes));

        let pool = Semaphore::new(self.config.concurrency.album_tracks);
        futures::future::try_join_all(items.iter().map(|(track, _)| {
            let pool = &pool;
            let cover_path = &cover_path;
            let dir = &dir;
            async move {
                let _permit = pool.acquire().await.map_err(|_| Error::Canceled)?;
                let track_dir = dir
                    .join(track.volume_number.to_string())
                    .join(track.id.to_string());
                self.download_track_files(
                    track,
                    &track_dir,
                    &CoverSource::Shared(cover_path.clone()),
                    totals,
                    cancel,
                )
                .await
            }
        }))
        .await?;

        let info = AlbumInfo {
            id,
            title: album.title.clone(),
            artist: album.artist.name.clone(),
            release_date: album.release_date,
            cover_id: album.cover.clone(),
            total_tracks: album.number_of_tracks,
            total_volumes: album.number_of_volumes,
            caption: format!("{} ({})", album.title, album.release_date.format("%Y-%m-%d")),
            volume_track_ids: volumes,
        };
        descriptor::write(&dir, &info).await?;
        Ok(dir)
    }
}
