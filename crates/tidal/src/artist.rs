use crate::error::Error;
use crate::id::ArtistId;
use crate::track::Track;
use crate::{PAGES_BASE_URL, Tidal};
use serde::Deserialize;

/// The contributor web page: its title is the artist's name and one of its
/// modules carries the API path of the credited-tracks listing.
#[derive(Debug, Deserialize)]
pub(crate) struct ContributorPage {
    pub title: String,
    rows: Vec<PageRow>,
}

#[derive(Debug, Deserialize)]
struct PageRow {
    #[serde(default)]
    modules: Vec<PageModule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageModule {
    #[serde(default)]
    paged_list: Option<PagedList>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PagedList {
    data_api_path: String,
}

impl ContributorPage {
    /// The credited-tracks listing path sits at `rows[1].modules[0]`.
    fn data_api_path(&self) -> Result<&str, Error> {
        self.rows
            .get(1)
            .and_then(|row| row.modules.first())
            .and_then(|module| module.paged_list.as_ref())
            .map(|list| list.data_api_path.as_str())
            .ok_or_else(|| {
                Error::InvalidPayload("contributor page has no credited-tracks module".into())
            })
    }
}

impl Tidal {
    /// Resolves the artist-credit compilation: the artist's name plus every
    /// credited track, discovered through the contributor page.
    pub(crate) async fn artist_credit_tracks(
        &self,
        id: ArtistId,
    ) -> Result<(String, Vec<Track>), Error> {
        let artist_id = id.to_string();
        let page: ContributorPage = self
            .get_json(
                const_format::formatcp!("{PAGES_BASE_URL}/pages/contributor"),
                &[
                    ("artistId", artist_id.as_str()),
                    ("countryCode", self.country().as_str()),
                    ("locale", "en"),
                    ("deviceType", "BROWSER"),
                ],
                self.config.timeouts.get_paged_tracks(),
            )
            .await?;

        let url = format!("{PAGES_BASE_URL}/{}", page.data_api_path()?.trim_start_matches('/'));
        let tracks = self.paged_tracks(&url).await?;
        Ok((page.title, tracks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_data_api_path() {
        let raw = r#"{
            "title": "Nils Frahm",
            "rows": [
                {"modules": [{"type": "HEADER"}]},
                {"modules": [{"pagedList": {"dataApiPath": "pages/data/abc?artistId=9"}}]}
            ]
        }"#;
        let page: ContributorPage = serde_json::from_str(raw).unwrap();
        assert_eq!(page.title, "Nils Frahm");
        assert_eq!(page.data_api_path().unwrap(), "pages/data/abc?artistId=9");
    }

    #[test]
    fn missing_module_is_invalid() {
        let raw = r#"{"title": "x", "rows": [{"modules": []}]}"#;
        let page: ContributorPage = serde_json::from_str(raw).unwrap();
        assert!(page.data_api_path().is_err());
    }
}
