use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration. Every field has a default so the bot can run from an
/// empty config file; directories are validated when the client is built.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub credentials_directory: PathBuf,
    pub downloads_directory: PathBuf,
    pub timeouts: Timeouts,
    pub concurrency: Concurrency,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_directory: PathBuf::from("./creds"),
            downloads_directory: PathBuf::from("./downloads"),
            timeouts: Timeouts::default(),
            concurrency: Concurrency::default(),
        }
    }
}

/// Per-operation request timeouts, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub get_track_credits: u64,
    pub get_track_lyrics: u64,
    pub download_cover: u64,
    pub get_album_info: u64,
    pub get_stream_urls: u64,
    pub get_playlist_info: u64,
    pub get_mix_info: u64,
    pub get_paged_tracks: u64,
    pub download_dash_segment: u64,
    pub get_vnd_track_file_size: u64,
    pub download_vnd_segment: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            get_track_credits: 2,
            get_track_lyrics: 2,
            download_cover: 10,
            get_album_info: 2,
            get_stream_urls: 2,
            get_playlist_info: 2,
            get_mix_info: 2,
            get_paged_tracks: 2,
            download_dash_segment: 60,
            get_vnd_track_file_size: 5,
            download_vnd_segment: 60,
        }
    }
}

macro_rules! duration_getters {
    ($($name:ident),*$(,)?) => {
        $(
            pub fn $name(&self) -> Duration {
                Duration::from_secs(self.$name)
            }
        )*
    };
}

impl Timeouts {
    duration_getters![
        get_track_credits,
        get_track_lyrics,
        download_cover,
        get_album_info,
        get_stream_urls,
        get_playlist_info,
        get_mix_info,
        get_paged_tracks,
        download_dash_segment,
        get_vnd_track_file_size,
        download_vnd_segment,
    ];
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Concurrency {
    pub album_tracks: usize,
    pub playlist_tracks: usize,
    pub mix_tracks: usize,
    pub vnd_track_parts: usize,
}

impl Default for Concurrency {
    fn default() -> Self {
        Self {
            album_tracks: 20,
            playlist_tracks: 20,
            mix_tracks: 20,
            vnd_track_parts: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.credentials_directory, PathBuf::from("./creds"));
        assert_eq!(config.downloads_directory, PathBuf::from("./downloads"));
        assert_eq!(config.timeouts.download_dash_segment, 60);
        assert_eq!(config.timeouts.get_vnd_track_file_size, 5);
        assert_eq!(config.timeouts.get_album_info, 2);
        assert_eq!(config.concurrency.album_tracks, 20);
        assert_eq!(config.concurrency.vnd_track_parts, 5);
    }
}
