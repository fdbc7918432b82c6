use crate::error::Error;
use crate::id::{AlbumId, TrackId};
use crate::track::{ArtistRole, Track};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const INFO_FILE: &str = "info.json";
pub const AUDIO_FILE: &str = "audio";
pub const COVER_FILE: &str = "cover.jpg";

/// Per-track descriptor, written once the audio file is complete. Its
/// presence is the marker that the track directory is fully materialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackInfo {
    pub id: TrackId,
    pub title: String,
    #[serde(default)]
    pub version: Option<String>,
    pub track_number: u32,
    pub volume_number: u32,
    pub duration: u32,
    pub isrc: String,
    pub copyright: String,
    pub lead_artist: String,
    pub artists: Vec<ArtistRole>,
    pub album_id: AlbumId,
    pub album_title: String,
    pub cover_id: String,
    /// Audio file extension discovered from the stream manifest; the upload
    /// side uses it to name the file it sends.
    pub extension: String,
    pub caption: String,
}

impl TrackInfo {
    pub(crate) fn from_track(track: &Track, extension: &str) -> Self {
        Self {
            id: track.id,
            title: track.title.clone(),
            version: track.version.clone(),
            track_number: track.track_number,
            volume_number: track.volume_number,
            duration: track.duration,
            isrc: track.isrc.clone().unwrap_or_default(),
            copyright: track.copyright.clone().unwrap_or_default(),
            lead_artist: track.lead_artist().unwrap_or_default().to_string(),
            artists: track.artists.clone(),
            album_id: track.album.id,
            album_title: track.album.title.clone(),
            cover_id: track.album.cover.clone().unwrap_or_default(),
            extension: extension.to_string(),
            caption: track_caption(track),
        }
    }
}

/// `"<album title> (<release date>)"`, dropping the date when the catalog
/// omits it.
pub(crate) fn track_caption(track: &Track) -> String {
    match track.album.release_date {
        Some(date) => format!("{} ({})", track.album.title, date.format("%Y-%m-%d")),
        None => track.album.title.clone(),
    }
}

/// Album descriptor: the caption plus the volume-ordered track-id matrix the
/// uploader walks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlbumInfo {
    pub id: AlbumId,
    pub title: String,
    pub artist: String,
    pub release_date: chrono::NaiveDate,
    pub cover_id: String,
    pub total_tracks: u32,
    pub total_volumes: u32,
    pub caption: String,
    pub volume_track_ids: Vec<Vec<TrackId>>,
}

/// Flat descriptor for playlists, mixes, and artist-credit compilations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListInfo {
    pub id: String,
    pub caption: String,
    pub track_ids: Vec<TrackId>,
}

/// Writes `<dir>/info.json` atomically (temp sibling, fsync, rename).
pub(crate) async fn write<T: Serialize>(dir: &Path, info: &T) -> Result<(), Error> {
    let path = dir.join(INFO_FILE);
    let tmp = dir.join(const_format::concatcp!(INFO_FILE, ".tmp"));
    let raw = serde_json::to_vec_pretty(info)?;

    let mut file = tokio::fs::File::create(&tmp).await?;
    tokio::io::AsyncWriteExt::write_all(&mut file, &raw).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

pub async fn read<T: DeserializeOwned>(dir: &Path) -> Result<T, Error> {
    let raw = tokio::fs::read(dir.join(INFO_FILE)).await?;
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::tests::sample_track;
    use std::path::PathBuf;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tidal-desc-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn track_caption_includes_release_date() {
        let track = sample_track(1, 1, 1);
        assert_eq!(track_caption(&track), "Album (2024-03-01)");

        let mut undated = sample_track(1, 1, 1);
        undated.album.release_date = None;
        assert_eq!(track_caption(&undated), "Album");
    }

    #[tokio::test]
    async fn track_info_round_trips() {
        let dir = scratch_dir();
        let info = TrackInfo::from_track(&sample_track(5, 2, 7), "flac");
        write(&dir, &info).await.unwrap();

        let back: TrackInfo = read(&dir).await.unwrap();
        assert_eq!(back, info);
        assert_eq!(back.extension, "flac");
        assert_eq!(back.artists[0].role, "MAIN");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn album_info_round_trips_with_matrix_order() {
        let dir = scratch_dir();
        let info = AlbumInfo {
            id: AlbumId::from(9),
            title: "LP".into(),
            artist: "Artist".into(),
            release_date: chrono::NaiveDate::from_ymd_opt(2016, 5, 8).unwrap(),
            cover_id: "aa-bb".into(),
            total_tracks: 6,
            total_volumes: 2,
            caption: "LP (2016-05-08)".into(),
            volume_track_ids: vec![
                vec![TrackId::from(1), TrackId::from(2), TrackId::from(3)],
                vec![TrackId::from(4), TrackId::from(5), TrackId::from(6)],
            ],
        };
        write(&dir, &info).await.unwrap();

        let back: AlbumInfo = read(&dir).await.unwrap();
        assert_eq!(back, info);
        assert_eq!(back.volume_track_ids.len(), back.total_volumes as usize);
        assert_eq!(
            back.volume_track_ids.iter().map(Vec::len).sum::<usize>(),
            back.total_tracks as usize
        );

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn list_info_round_trips() {
        let dir = scratch_dir();
        let info = ListInfo {
            id: "36ea71a8-445e-41a4-82ab-6628c581535d".into(),
            caption: "Deep Focus (2018 - 2024)".into(),
            track_ids: vec![TrackId::from(3), TrackId::from(1), TrackId::from(2)],
        };
        write(&dir, &info).await.unwrap();

        let back: ListInfo = read(&dir).await.unwrap();
        assert_eq!(back, info);
        // order is preserved exactly as written
        assert_eq!(back.track_ids[0], TrackId::from(3));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
