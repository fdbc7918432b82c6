use crate::error::Error;
use url::Url;

/// A catalog link: the entity kind plus its raw id segment.
///
/// Links come in two path shapes, `/<kind>/<id>` and `/<locale>/<kind>/<id>`,
/// so parsing scans for the first recognized kind segment. The id stays a
/// string here because playlists use UUIDs and mixes use opaque tokens; the
/// numeric kinds parse their ids at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub kind: LinkKind,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Track,
    Album,
    Playlist,
    Mix,
    Artist,
    Video,
}

impl LinkKind {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "track" => Some(Self::Track),
            "album" => Some(Self::Album),
            "playlist" => Some(Self::Playlist),
            "mix" => Some(Self::Mix),
            "artist" => Some(Self::Artist),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

}

impl Link {
    pub fn parse(input: &str) -> Result<Self, Error> {
        let url = Url::parse(input.trim()).map_err(|_| Error::InvalidLink(input.into()))?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|part| !part.is_empty()).collect())
            .unwrap_or_default();

        for (i, segment) in segments.iter().enumerate() {
            if let Some(kind) = LinkKind::from_segment(segment) {
                let id = segments
                    .get(i + 1)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| Error::InvalidLink(input.into()))?;
                return Ok(Self {
                    kind,
                    id: (*id).to_string(),
                });
            }
        }

        Err(Error::InvalidLink(input.into()))
    }
}

impl std::str::FromStr for Link {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
