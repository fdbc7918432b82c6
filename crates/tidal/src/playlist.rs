use crate::error::Error;
use crate::page::{self, PAGE_LIMIT};
use crate::track::Track;
use crate::{API_BASE_URL, Tidal};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub uuid: Uuid,
    pub title: String,
    pub number_of_tracks: u32,
    #[serde(with = "catalog_datetime")]
    pub created: DateTime<Utc>,
    #[serde(with = "catalog_datetime")]
    pub last_updated: DateTime<Utc>,
}

impl Playlist {
    /// Upload caption, spanning creation to last update years.
    pub fn caption(&self) -> String {
        format!(
            "{} ({} - {})",
            self.title,
            self.created.year(),
            self.last_updated.year()
        )
    }
}

/// Catalog timestamps come as `2018-05-09T14:32:23.750+0000`, whose numeric
/// offset has no colon and so is not RFC 3339.
mod catalog_datetime {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_str(&raw, FORMAT)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// The `{item, type}` envelope used by playlist and mix listings.
#[derive(Debug, Deserialize)]
pub(crate) struct ListedItem {
    pub item: Track,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Keeps only stream-ready tracks, validating artist roles on the way.
pub(crate) fn keep_tracks(items: Vec<ListedItem>) -> Result<Vec<Track>, Error> {
    let mut tracks = Vec::with_capacity(items.len());
    for entry in items {
        if entry.kind != "track" || !entry.item.stream_ready {
            continue;
        }
        entry.item.ensure_known_roles()?;
        tracks.push(entry.item);
    }
    Ok(tracks)
}

impl Tidal {
    pub async fn playlist(&self, uuid: Uuid) -> Result<Playlist, Error> {
        self.get_json(
            &format!("{API_BASE_URL}/playlists/{uuid}"),
            &[("countryCode", self.country().as_str())],
            self.config.timeouts.get_playlist_info(),
        )
        .await
    }

    pub(crate) async fn playlist_items(&self, uuid: Uuid) -> Result<Vec<Track>, Error> {
        let url = format!("{API_BASE_URL}/playlists/{uuid}/items");
        self.paged_tracks(&url).await
    }

    /// Shared pager for the `{item, type}` listings.
    pub(crate) async fn paged_tracks(&self, url: &str) -> Result<Vec<Track>, Error> {
        let country = self.country();
        let limit = PAGE_LIMIT.to_string();

        let items = page::drain_pages(|offset| {
            let country = country.clone();
            let limit = limit.clone();
            async move {
                let offset = offset.to_string();
                self.get_json::<page::Page<ListedItem>>(
                    url,
                    &[
                        ("countryCode", country.as_str()),
                        ("limit", limit.as_str()),
                        ("offset", offset.as_str()),
                    ],
                    self.config.timeouts.get_paged_tracks(),
                )
                .await
            }
        })
        .await?;

        keep_tracks(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::tests::sample_track;

    #[test]
    fn deserializes_playlist_and_formats_caption() {
        let raw = r#"{
            "uuid": "36ea71a8-445e-41a4-82ab-6628c581535d",
            "title": "Deep Focus",
            "numberOfTracks": 12,
            "created": "2018-05-09T14:32:23.750+0000",
            "lastUpdated": "2024-11-02T09:05:00.000+0000"
        }"#;
        let playlist: Playlist = serde_json::from_str(raw).unwrap();
        assert_eq!(playlist.caption(), "Deep Focus (2018 - 2024)");
    }

    #[test]
    fn datetime_round_trips() {
        let raw = r#"{
            "uuid": "36ea71a8-445e-41a4-82ab-6628c581535d",
            "title": "t",
            "numberOfTracks": 0,
            "created": "2020-01-31T23:59:59.999+0000",
            "lastUpdated": "2020-01-31T23:59:59.999+0000"
        }"#;
        let playlist: Playlist = serde_json::from_str(raw).unwrap();
        let serialized = serde_json::to_string(&playlist).unwrap();
        let back: Playlist = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back.created, playlist.created);
    }

    #[test]
    fn keep_tracks_filters_and_validates() {
        let mut not_ready = sample_track(2, 1, 2);
        not_ready.stream_ready = false;

        let items = vec![
            ListedItem {
                item: sample_track(1, 1, 1),
                kind: "track".into(),
            },
            ListedItem {
                item: not_ready,
                kind: "track".into(),
            },
            ListedItem {
                item: sample_track(3, 1, 3),
                kind: "video".into(),
            },
        ];
        let tracks = keep_tracks(items).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, crate::id::TrackId::from(1));
    }

    #[test]
    fn keep_tracks_rejects_unknown_roles() {
        let mut bad = sample_track(1, 1, 1);
        bad.artists[0].role = "PRODUCER".into();
        let items = vec![ListedItem {
            item: bad,
            kind: "track".into(),
        }];
        assert!(keep_tracks(items).is_err());
    }
}
