use crate::error::Error;
use crate::id::{AlbumId, ArtistId, TrackId};
use crate::{API_BASE_URL, Tidal};
use serde::{Deserialize, Serialize};

/// A catalog track as it appears in listings and `/tracks/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub duration: u32,
    pub track_number: u32,
    pub volume_number: u32,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub isrc: Option<String>,
    #[serde(default)]
    pub copyright: Option<String>,
    #[serde(default)]
    pub stream_ready: bool,
    pub artists: Vec<ArtistRole>,
    pub album: AlbumSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistRole {
    pub id: ArtistId,
    pub name: String,
    #[serde(rename = "type")]
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumSummary {
    pub id: AlbumId,
    pub title: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub release_date: Option<chrono::NaiveDate>,
}

pub(crate) const ROLE_MAIN: &str = "MAIN";
pub(crate) const ROLE_FEATURED: &str = "FEATURED";

impl Track {
    /// Catalog payloads must only credit `MAIN` or `FEATURED` artists; any
    /// other role means the payload is not one we know how to tag.
    pub fn ensure_known_roles(&self) -> Result<(), Error> {
        for artist in &self.artists {
            if artist.role != ROLE_MAIN && artist.role != ROLE_FEATURED {
                return Err(Error::InvalidPayload(format!(
                    "track {} credits artist {:?} with unknown role {:?}",
                    self.id, artist.name, artist.role
                )));
            }
        }
        Ok(())
    }

    pub fn lead_artist(&self) -> Option<&str> {
        self.artists
            .iter()
            .find(|a| a.role == ROLE_MAIN)
            .or(self.artists.first())
            .map(|a| a.name.as_str())
    }

    /// Display title including the version qualifier, e.g. "Song (Remix)".
    pub fn full_title(&self) -> String {
        match self.version.as_deref() {
            Some(version) if !version.is_empty() => format!("{} ({version})", self.title),
            _ => self.title.clone(),
        }
    }
}

/// Per-track credit roles, harvested either from `/tracks/{id}/credits` or in
/// bulk from album volume paging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackCredits {
    pub producers: Vec<String>,
    pub composers: Vec<String>,
    pub lyricists: Vec<String>,
    pub additional_producers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreditGroup {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub contributors: Vec<Contributor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Contributor {
    pub name: String,
}

impl TrackCredits {
    pub(crate) fn from_groups(groups: Vec<CreditGroup>) -> Self {
        let mut credits = Self::default();
        for group in groups {
            let names = group.contributors.into_iter().map(|c| c.name);
            match group.kind.as_str() {
                "Producer" => credits.producers.extend(names),
                "Composer" => credits.composers.extend(names),
                "Lyricist" => credits.lyricists.extend(names),
                "Additional Producer" => credits.additional_producers.extend(names),
                _ => {}
            }
        }
        credits
    }
}

impl Tidal {
    pub async fn track(&self, id: TrackId) -> Result<Track, Error> {
        let country = self.country();
        let track: Track = self
            .get_json(
                &format!("{API_BASE_URL}/tracks/{id}"),
                &[("countryCode", country.as_str())],
                self.config.timeouts.get_stream_urls(),
            )
            .await?;
        track.ensure_known_roles()?;
        Ok(track)
    }

    /// Cache-through credits lookup. Album downloads pre-seed this cache from
    /// their bulk `items/credits` pass, so only stray tracks hit the network.
    pub(crate) async fn track_credits(&self, id: TrackId) -> Result<TrackCredits, Error> {
        self.caches
            .credits
            .fetch(&id.to_string(), || async move {
                let groups: Vec<CreditGroup> = self
                    .get_json(
                        &format!("{API_BASE_URL}/tracks/{id}/credits"),
                        &[("countryCode", self.country().as_str())],
                        self.config.timeouts.get_track_credits(),
                    )
                    .await?;
                Ok(TrackCredits::from_groups(groups))
            })
            .await
    }

    /// Lyrics are best-effort: a 404 means the catalog has none and yields an
    /// empty string; other failures follow the usual taxonomy.
    pub(crate) async fn track_lyrics(&self, id: TrackId) -> Result<String, Error> {
        #[derive(Deserialize)]
        struct Lyrics {
            #[serde(default)]
            lyrics: Option<String>,
        }

        let creds = self.auth.snapshot();
        let request = self
            .http
            .get(format!("{API_BASE_URL}/tracks/{id}/lyrics"))
            .query(&[("countryCode", creds.country_code.as_str())])
            .bearer_auth(&creds.access_token)
            .timeout(self.config.timeouts.get_track_lyrics());
        let (status, headers, body) = crate::response::read(crate::response::send(request).await?).await?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(String::new());
        }
        crate::response::ensure_success(status, &headers, &body)?;

        let lyrics: Lyrics = serde_json::from_slice(&body)?;
        Ok(lyrics.lyrics.unwrap_or_default())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_track(id: u64, volume: u32, number: u32) -> Track {
        Track {
            id: TrackId::from(id),
            title: format!("Track {id}"),
            duration: 200,
            track_number: number,
            volume_number: volume,
            version: None,
            isrc: Some("USX9P1234567".into()),
            copyright: Some("(p) 2024".into()),
            stream_ready: true,
            artists: vec![ArtistRole {
                id: ArtistId::from(1),
                name: "Artist".into(),
                role: ROLE_MAIN.into(),
            }],
            album: AlbumSummary {
                id: AlbumId::from(9),
                title: "Album".into(),
                cover: Some("aa-bb-cc".into()),
                release_date: chrono::NaiveDate::from_ymd_opt(2024, 3, 1),
            },
        }
    }

    #[test]
    fn deserializes_catalog_shape() {
        let raw = r#"{
            "id": 251380837,
            "title": "Song",
            "duration": 289,
            "trackNumber": 4,
            "volumeNumber": 1,
            "version": "Remastered",
            "isrc": "GBAYE0601498",
            "copyright": "2016 ACME",
            "streamReady": true,
            "artists": [
                {"id": 1, "name": "Lead", "type": "MAIN"},
                {"id": 2, "name": "Guest", "type": "FEATURED"}
            ],
            "album": {"id": 77646169, "title": "LP", "cover": "aa-bb", "releaseDate": "2016-09-23"}
        }"#;
        let track: Track = serde_json::from_str(raw).unwrap();
        assert_eq!(track.track_number, 4);
        assert_eq!(track.lead_artist(), Some("Lead"));
        assert_eq!(track.full_title(), "Song (Remastered)");
        track.ensure_known_roles().unwrap();
    }

    #[test]
    fn unknown_artist_role_is_fatal() {
        let mut track = sample_track(1, 1, 1);
        track.artists[0].role = "REMIXER".into();
        assert!(matches!(
            track.ensure_known_roles(),
            Err(Error::InvalidPayload(_))
        ));
    }

    #[test]
    fn credits_group_mapping() {
        let groups = vec![
            CreditGroup {
                kind: "Producer".into(),
                contributors: vec![Contributor { name: "P1".into() }],
            },
            CreditGroup {
                kind: "Composer".into(),
                contributors: vec![
                    Contributor { name: "C1".into() },
                    Contributor { name: "C2".into() },
                ],
            },
            CreditGroup {
                kind: "Lyricist".into(),
                contributors: vec![Contributor { name: "L1".into() }],
            },
            CreditGroup {
                kind: "Additional Producer".into(),
                contributors: vec![Contributor { name: "AP1".into() }],
            },
            CreditGroup {
                kind: "Mastering Engineer".into(),
                contributors: vec![Contributor { name: "ignored".into() }],
            },
        ];
        let credits = TrackCredits::from_groups(groups);
        assert_eq!(credits.producers, vec!["P1"]);
        assert_eq!(credits.composers, vec!["C1", "C2"]);
        assert_eq!(credits.lyricists, vec!["L1"]);
        assert_eq!(credits.additional_producers, vec!["AP1"]);
    }
}
