use crate::descriptor::{self, AUDIO_FILE, COVER_FILE, TrackInfo};
use crate::error::Error;
use crate::ffmpeg::{self, Tags};
use crate::id::TrackId;
use crate::manifest::Stream;
use crate::track::Track;
use crate::Tidal;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Where a track's cover art comes from: a file shared by the whole entity
/// (album tracks) or the track's own copy (entities whose tracks span
/// albums).
pub(crate) enum CoverSource {
    Shared(PathBuf),
    Own(String),
}

impl Tidal {
    /// The per-track workflow: subtree, cover, skip-if-present, concurrent
    /// lyrics and audio, credits, tag embedding, descriptor. On any failure
    /// the track directory is removed whole, so an audio file on disk always
    /// has its descriptor next to it.
    pub(crate) async fn download_track_files(
        &self,
        track: &Track,
        dir: &Path,
        cover: &CoverSource,
        totals: Option<(u32, u32)>,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        tokio::fs::create_dir_all(dir).await?;

        let cover_path = match cover {
            CoverSource::Shared(path) => path.clone(),
            CoverSource::Own(cover_id) => {
                let path = dir.join(COVER_FILE);
                self.write_cover(cover_id, &path).await?;
                path
            }
        };

        let audio = dir.join(AUDIO_FILE);
        if tokio::fs::try_exists(&audio).await? {
            tracing::info!(track = %track.id, dir = %dir.display(), "track already downloaded, skipping");
            return Ok(());
        }

        match self
            .fetch_track(track, dir, &audio, &cover_path, totals, cancel)
            .await
        {
            Ok(()) => {
                tracing::info!(track = %track.id, title = %track.full_title(), "track finished");
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(dir).await;
                Err(e)
            }
        }
    }

    async fn fetch_track(
        &self,
        track: &Track,
        dir: &Path,
        audio: &Path,
        cover_path: &Path,
        totals: Option<(u32, u32)>,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let (lyrics, extension) = tokio::try_join!(self.track_lyrics(track.id), async {
            let stream = self.stream_manifest(track.id).await?;
            let extension = stream.file_extension();
            match &stream {
                Stream::Dash(dash) => self.download_dash(dash, audio, cancel).await?,
                Stream::Raw(raw) => self.download_raw(raw, audio, cancel).await?,
            }
            Ok::<_, Error>(extension)
        })?;

        let credits = self.track_credits(track.id).await?;
        let tags = Tags::for_track(track, &credits, lyrics, totals);
        ffmpeg::embed(audio, cover_path, &tags, extension, cancel).await?;

        descriptor::write(dir, &TrackInfo::from_track(track, extension)).await?;
        Ok(())
    }

    /// Single-track entity: `<root>/track/<id>/` with its own cover.
    pub(crate) async fn download_single_track(
        &self,
        id: TrackId,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, Error> {
        let track = self.track(id).await?;
        let cover_id = track
            .album
            .cover
            .clone()
            .ok_or_else(|| Error::InvalidPayload(format!("track {id} has no cover id")))?;

        let dir = self.entity_dir("track", &id.to_string());
        self.download_track_files(&track, &dir, &CoverSource::Own(cover_id), None, cancel)
            .await?;
        Ok(dir)
    }

    pub(crate) fn entity_dir(&self, kind: &str, id: &str) -> PathBuf {
        self.config.downloads_directory.join(kind).join(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::tests::sample_track;
    use crate::{Config, Credentials, Timeouts};

    async fn offline_engine(timeouts: Timeouts) -> (Tidal, PathBuf) {
        let root = std::env::temp_dir().join(format!("tidal-dl-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(root.join("creds")).await.unwrap();
        tokio::fs::create_dir_all(root.join("downloads")).await.unwrap();

        let engine = Tidal::new(Config {
            credentials_directory: root.join("creds"),
            downloads_directory: root.join("downloads"),
            timeouts,
            ..Config::default()
        })
        .await
        .unwrap();
        engine
            .auth
            .install(Credentials {
                access_token: "stale".into(),
                refresh_token: "rt".into(),
                expires_at: i64::MAX / 2,
                country_code: "US".into(),
            })
            .await
            .unwrap();
        (engine, root)
    }

    #[tokio::test]
    async fn existing_audio_skips_without_touching_anything() {
        let (engine, root) = offline_engine(Timeouts::default()).await;
        let dir = engine.entity_dir("track", "1");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join(AUDIO_FILE), b"finished audio").await.unwrap();

        let cover = root.join("cover.jpg");
        tokio::fs::write(&cover, b"jpg").await.unwrap();

        let track = sample_track(1, 1, 1);
        engine
            .download_track_files(
                &track,
                &dir,
                &CoverSource::Shared(cover),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            tokio::fs::read(dir.join(AUDIO_FILE)).await.unwrap(),
            b"finished audio"
        );

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn failed_download_leaves_no_partial_track() {
        // zero per-request timeouts make both concurrent fetches (lyrics and
        // the manifest) fail with DeadlineExceeded before any byte leaves the
        // process, so the workflow must take the whole track directory with it
        let timeouts = Timeouts {
            get_track_lyrics: 0,
            get_stream_urls: 0,
            ..Timeouts::default()
        };
        let (engine, root) = offline_engine(timeouts).await;
        let dir = engine.entity_dir("track", "2");

        let cover = root.join("cover.jpg");
        tokio::fs::write(&cover, b"jpg").await.unwrap();

        let track = sample_track(2, 1, 1);
        let result = engine
            .download_track_files(
                &track,
                &dir,
                &CoverSource::Shared(cover),
                None,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(Error::DeadlineExceeded)));
        assert!(!dir.exists());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
