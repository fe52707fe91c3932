// Manifest parsing for the headless engine: levels, audio renditions, fragment lists.

use std::collections::HashMap;

use m3u8_rs::{
    AlternativeMediaType, ByteRange, KeyMethod, MasterPlaylist, MediaPlaylist, parse_playlist_res,
};
use tracing::warn;
use url::Url;

use crate::PlaygateError;
use crate::tracks::{AudioTrack, QualityLevel};

pub enum ParsedManifest {
    Master {
        levels: Vec<QualityLevel>,
        audio_tracks: Vec<AudioTrack>,
    },
    Media(MediaPlaylist),
}

/// A fragment ready to load: absolute URLs, key and init segment resolved
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentRef {
    pub sequence: u64,
    pub url: Url,
    pub byte_range: Option<ByteRange>,
    pub duration: f32,
    /// AES-128 key URL in effect for this fragment
    pub key_url: Option<Url>,
    /// Initialization segment (`EXT-X-MAP`) in effect for this fragment
    pub init: Option<(Url, Option<ByteRange>)>,
}

pub fn parse_manifest(bytes: &[u8], base: &Url) -> Result<ParsedManifest, PlaygateError> {
    match parse_playlist_res(bytes) {
        Ok(m3u8_rs::Playlist::MasterPlaylist(master)) => {
            let levels = levels_from_master(&master, base);
            if levels.is_empty() {
                return Err(PlaygateError::PlaylistError(
                    "Master playlist has no playable variants".to_string(),
                ));
            }
            Ok(ParsedManifest::Master {
                levels,
                audio_tracks: audio_tracks_from_master(&master, base),
            })
        }
        Ok(m3u8_rs::Playlist::MediaPlaylist(media)) => Ok(ParsedManifest::Media(media)),
        Err(e) => Err(PlaygateError::PlaylistError(format!(
            "Failed to parse playlist: {e}"
        ))),
    }
}

pub fn parse_media_playlist(bytes: &[u8]) -> Result<MediaPlaylist, PlaygateError> {
    match parse_playlist_res(bytes) {
        Ok(m3u8_rs::Playlist::MediaPlaylist(media)) => Ok(media),
        Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => Err(PlaygateError::PlaylistError(
            "Expected a media playlist, got a master playlist".to_string(),
        )),
        Err(e) => Err(PlaygateError::PlaylistError(format!(
            "Failed to parse level playlist: {e}"
        ))),
    }
}

fn resolve(base: &Url, uri: &str) -> Option<Url> {
    match base.join(uri) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("Failed to resolve URI '{}' with base '{}': {}", uri, base, e);
            None
        }
    }
}

/// Playable variants in manifest order; I-frame-only variants are skipped
pub fn levels_from_master(master: &MasterPlaylist, base: &Url) -> Vec<QualityLevel> {
    master
        .variants
        .iter()
        .filter(|v| !v.is_i_frame)
        .filter_map(|v| {
            let url = resolve(base, &v.uri)?;
            Some(QualityLevel {
                bitrate: v.bandwidth,
                width: v.resolution.as_ref().map(|r| r.width),
                height: v.resolution.as_ref().map(|r| r.height),
                codecs: v.codecs.clone(),
                name: v.video.clone(),
                url: url.to_string(),
            })
        })
        .collect()
}

/// Audio renditions, numbered in manifest order
pub fn audio_tracks_from_master(master: &MasterPlaylist, base: &Url) -> Vec<AudioTrack> {
    master
        .alternatives
        .iter()
        .filter(|alt| alt.media_type == AlternativeMediaType::Audio)
        .enumerate()
        .map(|(id, alt)| AudioTrack {
            id: id as u32,
            name: alt.name.clone(),
            lang: alt.language.clone(),
            group_id: alt.group_id.clone(),
            default: alt.default,
            autoselect: alt.autoselect,
            forced: alt.forced,
            url: alt
                .uri
                .as_deref()
                .and_then(|uri| resolve(base, uri))
                .map(|u| u.to_string()),
        })
        .collect()
}

/// Fragments of a level playlist with key and map tags carried forward.
///
/// Every returned byte range has an explicit offset. A range written without
/// one continues where the previous range of the same resource ended.
pub fn fragments(playlist: &MediaPlaylist, base: &Url) -> Vec<FragmentRef> {
    let mut range_ends: HashMap<Url, u64> = HashMap::new();
    let mut key_url: Option<Url> = None;
    let mut init: Option<(Url, Option<ByteRange>)> = None;
    let mut out = Vec::with_capacity(playlist.segments.len());

    for (idx, segment) in playlist.segments.iter().enumerate() {
        if let Some(key) = &segment.key {
            key_url = match key.method {
                KeyMethod::AES128 => key.uri.as_deref().and_then(|uri| resolve(base, uri)),
                _ => None,
            };
        }
        if let Some(map) = &segment.map {
            init = resolve(base, &map.uri).map(|url| (url, map.byte_range.clone()));
        }
        let Some(url) = resolve(base, &segment.uri) else {
            continue;
        };
        let byte_range = segment.byte_range.as_ref().map(|range| {
            let start = range
                .offset
                .or_else(|| range_ends.get(&url).copied())
                .unwrap_or(0);
            range_ends.insert(url.clone(), start + range.length);
            ByteRange {
                length: range.length,
                offset: Some(start),
            }
        });
        out.push(FragmentRef {
            sequence: playlist.media_sequence + idx as u64,
            url,
            byte_range,
            duration: segment.duration,
            key_url: key_url.clone(),
            init: init.clone(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"Français\",LANGUAGE=\"fr\",DEFAULT=YES,AUTOSELECT=YES,URI=\"audio/fr.m3u8\"
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"English\",LANGUAGE=\"en\",DEFAULT=NO,AUTOSELECT=YES,URI=\"audio/en.m3u8\"
#EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"subs\",NAME=\"English\",LANGUAGE=\"en\",URI=\"subs/en.m3u8\"
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360,CODECS=\"avc1.4d401e,mp4a.40.2\",AUDIO=\"aud\"
360p/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720,AUDIO=\"aud\"
https://other.example/720p/index.m3u8
#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=86000,URI=\"iframes.m3u8\"
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:100
#EXTINF:6.0,
seg100.ts
#EXT-X-KEY:METHOD=AES-128,URI=\"keys/k1.bin\"
#EXTINF:6.0,
seg101.ts
#EXTINF:6.0,
seg102.ts
#EXT-X-KEY:METHOD=NONE
#EXTINF:4.0,
seg103.ts
#EXT-X-ENDLIST
";

    fn base() -> Url {
        Url::parse("https://cdn.example/live/master.m3u8").unwrap()
    }

    #[test]
    fn test_master_levels_and_audio() {
        let ParsedManifest::Master {
            levels,
            audio_tracks,
        } = parse_manifest(MASTER.as_bytes(), &base()).unwrap()
        else {
            panic!("expected a master playlist");
        };

        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].bitrate, 800_000);
        assert_eq!(levels[0].height, Some(360));
        assert_eq!(levels[0].url, "https://cdn.example/live/360p/index.m3u8");
        assert_eq!(levels[1].url, "https://other.example/720p/index.m3u8");

        assert_eq!(audio_tracks.len(), 2);
        assert_eq!(audio_tracks[0].id, 0);
        assert_eq!(audio_tracks[0].lang.as_deref(), Some("fr"));
        assert!(audio_tracks[0].default);
        assert_eq!(audio_tracks[1].id, 1);
        assert_eq!(
            audio_tracks[1].url.as_deref(),
            Some("https://cdn.example/live/audio/en.m3u8")
        );
    }

    #[test]
    fn test_media_fragments_carry_keys() {
        let ParsedManifest::Media(media) = parse_manifest(MEDIA.as_bytes(), &base()).unwrap()
        else {
            panic!("expected a media playlist");
        };
        assert!(media.end_list);

        let frags = fragments(&media, &base());
        assert_eq!(frags.len(), 4);
        assert_eq!(frags[0].sequence, 100);
        assert_eq!(frags[0].url.as_str(), "https://cdn.example/live/seg100.ts");
        assert!(frags[0].key_url.is_none());

        let key = Url::parse("https://cdn.example/live/keys/k1.bin").unwrap();
        assert_eq!(frags[1].key_url.as_ref(), Some(&key));
        assert_eq!(frags[2].key_url.as_ref(), Some(&key));
        assert!(frags[3].key_url.is_none());
        assert_eq!(frags[3].sequence, 103);
    }

    #[test]
    fn test_implicit_byte_ranges_follow_the_previous_range() {
        let playlist = "#EXTM3U
#EXT-X-VERSION:4
#EXT-X-TARGETDURATION:6
#EXTINF:6.0,
#EXT-X-BYTERANGE:1000@0
all.ts
#EXTINF:6.0,
#EXT-X-BYTERANGE:1000
all.ts
#EXTINF:6.0,
#EXT-X-BYTERANGE:500@0
other.ts
#EXTINF:6.0,
#EXT-X-BYTERANGE:1000
all.ts
#EXTINF:6.0,
#EXT-X-BYTERANGE:500
other.ts
#EXT-X-ENDLIST
";
        let media = parse_media_playlist(playlist.as_bytes()).unwrap();
        let ranges: Vec<(String, u64, Option<u64>)> = fragments(&media, &base())
            .into_iter()
            .map(|f| {
                let range = f.byte_range.unwrap();
                (f.url.path().to_string(), range.length, range.offset)
            })
            .collect();

        assert_eq!(
            ranges,
            vec![
                ("/live/all.ts".to_string(), 1000, Some(0)),
                ("/live/all.ts".to_string(), 1000, Some(1000)),
                ("/live/other.ts".to_string(), 500, Some(0)),
                ("/live/all.ts".to_string(), 1000, Some(2000)),
                ("/live/other.ts".to_string(), 500, Some(500)),
            ]
        );
    }

    #[test]
    fn test_garbage_manifest() {
        assert!(matches!(
            parse_manifest(b"<html>not a playlist</html>", &base()),
            Err(PlaygateError::PlaylistError(_))
        ));
    }

    #[test]
    fn test_master_is_not_a_level_playlist() {
        assert!(matches!(
            parse_media_playlist(MASTER.as_bytes()),
            Err(PlaygateError::PlaylistError(_))
        ));
        assert!(parse_media_playlist(MEDIA.as_bytes()).is_ok());
    }
}
