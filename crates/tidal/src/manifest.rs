use crate::error::Error;
use crate::id::TrackId;
use crate::{API_BASE_URL, Tidal};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::Deserialize;

/// A resolved playback stream: either segmented DASH or a single URL fetched
/// by byte ranges.
#[derive(Debug, Clone)]
pub(crate) enum Stream {
    Dash(DashStream),
    Raw(RawStream),
}

#[derive(Debug, Clone)]
pub(crate) struct DashStream {
    /// Segment URL template with a `$Number$` placeholder; substituting the
    /// indices `0..segment_count` yields the initialization segment followed
    /// by every media segment.
    pub url_template: String,
    pub segment_count: u64,
    pub mime_type: String,
    pub codec: String,
}

#[derive(Debug, Clone)]
pub(crate) struct RawStream {
    pub url: String,
    pub mime_type: String,
    pub codec: String,
}

impl Stream {
    pub fn mime_type(&self) -> &str {
        match self {
            Self::Dash(dash) => &dash.mime_type,
            Self::Raw(raw) => &raw.mime_type,
        }
    }

    pub fn codec(&self) -> &str {
        match self {
            Self::Dash(dash) => &dash.codec,
            Self::Raw(raw) => &raw.codec,
        }
    }

    /// File extension for the finished track, from codec first and container
    /// mime type as the fallback.
    pub fn file_extension(&self) -> &'static str {
        let codec = self.codec().to_ascii_lowercase();
        if codec.contains("flac") {
            return "flac";
        }
        if codec.starts_with("mp4a") || codec.contains("aac") {
            return "m4a";
        }
        match self.mime_type() {
            "audio/flac" => "flac",
            "audio/mp4" => "m4a",
            _ => "m4a",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaybackInfo {
    manifest_mime_type: String,
    manifest: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BtsManifest {
    mime_type: String,
    codecs: String,
    #[serde(default = "default_encryption")]
    encryption_type: String,
    #[serde(default)]
    urls: Vec<String>,
}

fn default_encryption() -> String {
    "NONE".into()
}

impl Tidal {
    /// Resolves `/tracks/{id}/playbackinfo` into a typed stream.
    pub(crate) async fn stream_manifest(&self, id: TrackId) -> Result<Stream, Error> {
        let info: PlaybackInfo = self
            .get_json(
                &format!("{API_BASE_URL}/tracks/{id}/playbackinfo"),
                &[
                    ("countryCode", self.country().as_str()),
                    ("audioquality", "HI_RES_LOSSLESS"),
                    ("playbackmode", "STREAM"),
                    ("assetpresentation", "FULL"),
                    ("immersiveaudio", "false"),
                    ("locale", "en"),
                ],
                self.config.timeouts.get_stream_urls(),
            )
            .await?;

        let manifest = BASE64_STANDARD.decode(info.manifest.as_bytes())?;
        match info.manifest_mime_type.as_str() {
            "application/dash+xml" | "dash+xml" => {
                let text = std::str::from_utf8(&manifest)
                    .map_err(|_| Error::ManifestDecode("dash manifest is not utf-8".into()))?;
                Ok(Stream::Dash(parse_dash(text)?))
            }
            "application/vnd.tidal.bts" | "application/vnd.tidal.bt" | "vnd.tidal.bt" => {
                Ok(Stream::Raw(parse_bts(&manifest)?))
            }
            other => Err(Error::UnsupportedManifestMimeType(other.into())),
        }
    }
}

/// Pulls the `$Number$` template and segment count out of a DASH document.
///
/// The count is the initialization segment plus every `SegmentTimeline`
/// entry, expanding non-negative `r` repeats.
pub(crate) fn parse_dash(text: &str) -> Result<DashStream, Error> {
    let doc = roxmltree::Document::parse(text)?;

    let adaptation = doc
        .descendants()
        .find(|n| n.tag_name().name() == "AdaptationSet");
    let representation = doc
        .descendants()
        .find(|n| n.tag_name().name() == "Representation")
        .ok_or_else(|| Error::ManifestDecode("no Representation in manifest".into()))?;

    let mime_type = representation
        .attribute("mimeType")
        .or_else(|| adaptation.and_then(|n| n.attribute("mimeType")))
        .unwrap_or("audio/mp4")
        .to_string();
    let codec = representation
        .attribute("codecs")
        .or_else(|| adaptation.and_then(|n| n.attribute("codecs")))
        .unwrap_or_default()
        .to_string();

    let template = doc
        .descendants()
        .find(|n| n.tag_name().name() == "SegmentTemplate")
        .ok_or_else(|| Error::ManifestDecode("no SegmentTemplate in manifest".into()))?;
    let media = template
        .attribute("media")
        .ok_or_else(|| Error::ManifestDecode("SegmentTemplate has no media template".into()))?;
    if !media.contains("$Number$") {
        return Err(Error::ManifestDecode(
            "media template has no $Number$ placeholder".into(),
        ));
    }

    let mut media_segments = 0u64;
    if let Some(timeline) = template
        .children()
        .find(|n| n.tag_name().name() == "SegmentTimeline")
    {
        for entry in timeline.children().filter(|n| n.tag_name().name() == "S") {
            let repeat: i64 = entry
                .attribute("r")
                .map(str::parse)
                .transpose()
                .map_err(|_| Error::ManifestDecode("S@r is not an integer".into()))?
                .unwrap_or(0);
            if repeat < 0 {
                return Err(Error::ManifestDecode(
                    "negative segment repeats are unsupported".into(),
                ));
            }
            media_segments += 1 + repeat as u64;
        }
    }
    if media_segments == 0 {
        return Err(Error::ManifestDecode("manifest lists no segments".into()));
    }

    Ok(DashStream {
        url_template: media.to_string(),
        segment_count: 1 + media_segments,
        mime_type,
        codec,
    })
}

pub(crate) fn parse_bts(raw: &[u8]) -> Result<RawStream, Error> {
    let manifest: BtsManifest = serde_json::from_slice(raw)?;
    if manifest.encryption_type != "NONE" {
        return Err(Error::EncryptedStream(manifest.encryption_type));
    }
    let url = manifest
        .urls
        .into_iter()
        .next()
        .ok_or_else(|| Error::ManifestDecode("manifest carries no stream urls".into()))?;
    Ok(RawStream {
        url,
        mime_type: manifest.mime_type,
        codec: manifest.codecs,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const DASH_23_SEGMENTS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static">
  <Period>
    <AdaptationSet contentType="audio" mimeType="audio/mp4">
      <Representation id="0" codecs="flac" bandwidth="1411000">
        <SegmentTemplate media="https://sp-ad-cf.audio.tidal.com/mediatracks/abc/$Number$.mp4" startNumber="0" timescale="44100">
          <SegmentTimeline>
            <S d="176128" r="20"/>
            <S d="16384"/>
          </SegmentTimeline>
        </SegmentTemplate>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#;

    #[test]
    fn parses_dash_template_and_count() {
        let stream = parse_dash(DASH_23_SEGMENTS).unwrap();
        // 1 init + (1 + 20) repeated + 1 trailing = 23
        assert_eq!(stream.segment_count, 23);
        assert!(stream.url_template.contains("$Number$"));
        assert_eq!(stream.codec, "flac");
        assert_eq!(stream.mime_type, "audio/mp4");
    }

    #[test]
    fn dash_without_number_placeholder_fails() {
        let manifest = DASH_23_SEGMENTS.replace("$Number$", "static");
        assert!(matches!(
            parse_dash(&manifest),
            Err(Error::ManifestDecode(_))
        ));
    }

    #[test]
    fn dash_with_negative_repeat_fails() {
        let manifest = DASH_23_SEGMENTS.replace(r#"r="20""#, r#"r="-1""#);
        assert!(matches!(
            parse_dash(&manifest),
            Err(Error::ManifestDecode(_))
        ));
    }

    #[test]
    fn parses_bts_manifest() {
        let raw = br#"{
            "mimeType": "audio/flac",
            "codecs": "flac",
            "encryptionType": "NONE",
            "urls": ["https://sp-pr-fa.audio.tidal.com/mediatracks/abc/0.flac"]
        }"#;
        let stream = parse_bts(raw).unwrap();
        assert_eq!(stream.codec, "flac");
        assert!(stream.url.ends_with("0.flac"));
    }

    #[test]
    fn encrypted_bts_is_fatal() {
        let raw = br#"{"mimeType":"audio/flac","codecs":"flac","encryptionType":"OLD_AES","urls":["u"]}"#;
        assert!(matches!(
            parse_bts(raw),
            Err(Error::EncryptedStream(kind)) if kind == "OLD_AES"
        ));
    }

    #[test]
    fn bts_without_urls_is_fatal() {
        let raw = br#"{"mimeType":"audio/flac","codecs":"flac","encryptionType":"NONE","urls":[]}"#;
        assert!(matches!(parse_bts(raw), Err(Error::ManifestDecode(_))));
    }

    #[test]
    fn extension_from_codec_and_mime() {
        let flac = Stream::Raw(RawStream {
            url: "u".into(),
            mime_type: "audio/flac".into(),
            codec: "flac".into(),
        });
        assert_eq!(flac.file_extension(), "flac");

        let aac = Stream::Raw(RawStream {
            url: "u".into(),
            mime_type: "audio/mp4".into(),
            codec: "mp4a.40.2".into(),
        });
        assert_eq!(aac.file_extension(), "m4a");
    }
}
