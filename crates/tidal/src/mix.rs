use crate::error::Error;
use crate::track::Track;
use crate::{API_BASE_URL, LISTEN_BASE_URL, Tidal};
use serde::Deserialize;

/// The listen-web mix page. Its title is the mix's upload caption; the items
/// listing has no title of its own.
#[derive(Debug, Deserialize)]
struct MixPage {
    title: String,
}

impl Tidal {
    pub(crate) async fn mix_title(&self, id: &str) -> Result<String, Error> {
        let page: MixPage = self
            .get_json(
                const_format::formatcp!("{LISTEN_BASE_URL}/pages/mix"),
                &[
                    ("mixId", id),
                    ("countryCode", self.country().as_str()),
                    ("locale", "en"),
                    ("deviceType", "BROWSER"),
                ],
                self.config.timeouts.get_mix_info(),
            )
            .await?;
        Ok(page.title)
    }

    pub(crate) async fn mix_items(&self, id: &str) -> Result<Vec<Track>, Error> {
        let url = format!("{API_BASE_URL}/mixes/{id}/items");
        self.paged_tracks(&url).await
    }
}
