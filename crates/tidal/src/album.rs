use crate::error::Error;
use crate::id::{AlbumId, TrackId};
use crate::page::{self, PAGE_LIMIT};
use crate::track::{ArtistRole, CreditGroup, Track, TrackCredits};
use crate::{API_BASE_URL, Tidal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: AlbumId,
    pub title: String,
    pub release_date: chrono::NaiveDate,
    pub artist: ArtistRole,
    pub cover: String,
    pub number_of_tracks: u32,
    pub number_of_volumes: u32,
}

/// One entry of `/albums/{id}/items/credits`: the track plus its credit
/// groups, so a single paging pass yields both.
#[derive(Debug, Deserialize)]
pub(crate) struct CreditedItem {
    pub item: Track,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub credits: Vec<CreditGroup>,
}

impl Tidal {
    /// Album metadata, cache-through with a several-hour TTL.
    pub async fn album(&self, id: AlbumId) -> Result<Album, Error> {
        self.caches
            .albums
            .fetch(&id.to_string(), || async move {
                self.get_json(
                    &format!("{API_BASE_URL}/albums/{id}"),
                    &[("countryCode", self.country().as_str())],
                    self.config.timeouts.get_album_info(),
                )
                .await
            })
            .await
    }

    /// Pages the album's track listing with credits attached, keeping only
    /// stream-ready tracks and validating artist roles.
    pub(crate) async fn album_items_with_credits(
        &self,
        id: AlbumId,
    ) -> Result<Vec<(Track, TrackCredits)>, Error> {
        let country = self.country();
        let url = format!("{API_BASE_URL}/albums/{id}/items/credits");
        let limit = PAGE_LIMIT.to_string();

        let items = page::drain_pages(|offset| {
            let url = url.clone();
            let country = country.clone();
            let limit = limit.clone();
            async move {
                let offset = offset.to_string();
                self.get_json::<page::Page<CreditedItem>>(
                    &url,
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

        let mut tracks = Vec::with_capacity(items.len());
        for entry in items {
            if entry.kind != "track" || !entry.item.stream_ready {
                continue;
            }
            entry.item.ensure_known_roles()?;
            tracks.push((entry.item, TrackCredits::from_groups(entry.credits)));
        }
        Ok(tracks)
    }
}

/// Groups a paged track stream into volumes by observed `volumeNumber`.
///
/// The stream must be volume-ordered: each track either stays in the current
/// volume or opens the next one. Anything else means pages arrived out of
/// order and the matrix would be wrong.
pub(crate) fn assemble_volumes<'a, I>(tracks: I) -> Result<Vec<Vec<TrackId>>, Error>
where
    I: IntoIterator<Item = &'a Track>,
{
    let mut volumes: Vec<Vec<TrackId>> = Vec::new();
    for track in tracks {
        let current = volumes.len() as u32;
        if track.volume_number == current && current > 0 {
            volumes.last_mut().unwrap().push(track.id);
        } else if track.volume_number == current + 1 {
            volumes.push(vec![track.id]);
        } else {
            return Err(Error::InvalidPayload(format!(
                "track {} has volume {} while reading volume {current}",
                track.id, track.volume_number
            )));
        }
    }
    Ok(volumes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::tests::sample_track;

    #[test]
    fn deserializes_album_shape() {
        let raw = r#"{
            "id": 77646169,
            "title": "A Moon Shaped Pool",
            "releaseDate": "2016-05-08",
            "artist": {"id": 8, "name": "Radiohead", "type": "MAIN"},
            "cover": "5bbd-ab-cd-ef",
            "numberOfTracks": 11,
            "numberOfVolumes": 1
        }"#;
        let album: Album = serde_json::from_str(raw).unwrap();
        assert_eq!(album.number_of_tracks, 11);
        assert_eq!(
            album.release_date,
            chrono::NaiveDate::from_ymd_opt(2016, 5, 8).unwrap()
        );
    }

    #[test]
    fn assembles_two_volumes_across_pages() {
        // page 1: volumes 1,1,1,2 — page 2: volumes 2,2
        let tracks = vec![
            sample_track(1, 1, 1),
            sample_track(2, 1, 2),
            sample_track(3, 1, 3),
            sample_track(4, 2, 1),
            sample_track(5, 2, 2),
            sample_track(6, 2, 3),
        ];
        let volumes = assemble_volumes(&tracks).unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(
            volumes[0],
            vec![TrackId::from(1), TrackId::from(2), TrackId::from(3)]
        );
        assert_eq!(
            volumes[1],
            vec![TrackId::from(4), TrackId::from(5), TrackId::from(6)]
        );
        assert_eq!(volumes.iter().map(Vec::len).sum::<usize>(), 6);
    }

    #[test]
    fn rejects_out_of_order_volumes() {
        let tracks = vec![sample_track(1, 1, 1), sample_track(2, 3, 1)];
        assert!(matches!(
            assemble_volumes(&tracks),
            Err(Error::InvalidPayload(_))
        ));

        let tracks = vec![sample_track(1, 2, 1)];
        assert!(matches!(
            assemble_volumes(&tracks),
            Err(Error::InvalidPayload(_))
        ));

        let tracks = vec![
            sample_track(1, 1, 1),
            sample_track(2, 2, 1),
            sample_track(3, 1, 2),
        ];
        assert!(matches!(
            assemble_volumes(&tracks),
            Err(Error::InvalidPayload(_))
        ));
    }

    #[test]
    fn empty_album_has_no_volumes() {
        let tracks: Vec<Track> = Vec::new();
        let volumes = assemble_volumes(&tracks).unwrap();
        assert!(volumes.is_empty());
    }
}
