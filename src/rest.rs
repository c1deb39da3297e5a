use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::header::AUTHORIZATION;
use tracing::{debug, warn};

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::model::rest::{LoadTracksResponse, LoadType};
use crate::model::track::Track;

const DEFAULT_SOURCE: &str = "yt";

/// Tracks returned by [`RestClient::load_tracks`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedTracks {
    pub tracks: Vec<Track>,
    /// Name of the playlist, when the query resolved to one.
    pub playlist: Option<String>
}

/// HTTP client for the nodes' REST endpoints. Requests rotate over the
/// configured nodes.
pub struct RestClient {
    client: reqwest::Client,
    nodes: Vec<(String, String)>,
    next: AtomicUsize
}

impl RestClient {
    pub(crate) fn new<'a>(nodes: impl IntoIterator<Item = &'a NodeConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            nodes: nodes.into_iter().map(|n| (n.http_url(), n.password.clone())).collect(),
            next: AtomicUsize::new(0)
        }
    }

    /// Resolves `query` into tracks. Anything that is not an http(s) URL is
    /// searched on `source`, YouTube by default.
    pub async fn load_tracks(&self, query: &str, source: Option<&str>) -> Result<LoadedTracks> {
        let (url, password) = self.next_node().ok_or(Error::NodeUnavailable)?;
        let identifier = identifier(query, source);
        debug!("Loading tracks for {identifier} from {url}");

        let response = self.client
            .get(format!("{url}/loadtracks?identifier={}", urlencoding::encode(&identifier)))
            .header(AUTHORIZATION, password)
            .send()
            .await?
            .error_for_status()?
            .json::<LoadTracksResponse>()
            .await?;

        loaded_tracks(response)
    }

    fn next_node(&self) -> Option<&(String, String)> {
        if self.nodes.is_empty() {
            return None;
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.nodes.len();
        self.nodes.get(index)
    }
}

fn identifier(query: &str, source: Option<&str>) -> String {
    if query.starts_with("http://") || query.starts_with("https://") {
        query.to_owned()
    } else {
        format!("{}search:{query}", source.unwrap_or(DEFAULT_SOURCE))
    }
}

fn loaded_tracks(response: LoadTracksResponse) -> Result<LoadedTracks> {
    if let (LoadType::LoadFailed, Some(exception)) = (response.load_type, &response.exception) {
        return Err(Error::LoadFailed {
            message: exception.message.clone().unwrap_or_default(),
            severity: exception.severity.clone()
        });
    }

    let tracks = response.tracks.iter()
        .filter_map(|t| match Track::decode(&t.track) {
            Ok(track) => Some(track),
            Err(e) => {
                warn!("Skipping undecodable track {}: {e}", t.track);
                None
            }
        })
        .collect();

    let playlist = match response.load_type {
        LoadType::PlaylistLoaded => response.playlist_info.and_then(|info| info.name),
        _ => None
    };

    Ok(LoadedTracks { tracks, playlist })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::track::tests::track;
    use serde_json::json;

    fn response(value: serde_json::Value) -> LoadTracksResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn searches_plain_queries() {
        assert_eq!(identifier("never gonna", None), "ytsearch:never gonna");
        assert_eq!(identifier("never gonna", Some("sc")), "scsearch:never gonna");
        assert_eq!(identifier("https://example.com/a.mp3", Some("sc")), "https://example.com/a.mp3");
    }

    #[test]
    fn rotates_over_nodes() {
        let configs = [NodeConfig::new("a", 1, "x"), NodeConfig::new("b", 2, "y")];
        let client = RestClient::new(&configs);

        let urls: Vec<_> = (0..3).filter_map(|_| client.next_node().map(|(url, _)| url.clone())).collect();
        assert_eq!(urls, ["http://a:1", "http://b:2", "http://a:1"]);
        assert!(RestClient::new(&[] as &[NodeConfig]).next_node().is_none());
    }

    #[test]
    fn decodes_playlists() {
        let (a, b) = (track("a", 1), track("b", 2));
        let loaded = loaded_tracks(response(json!({
            "loadType": "PLAYLIST_LOADED",
            "playlistInfo": { "name": "mix", "selectedTrack": -1 },
            "tracks": [{ "track": a.encoded(), "info": {} }, { "track": b.encoded() }]
        }))).unwrap();

        assert_eq!(loaded, LoadedTracks { tracks: vec![a, b], playlist: Some("mix".into()) });
    }

    #[test]
    fn load_failure_is_an_error() {
        let result = loaded_tracks(response(json!({
            "loadType": "LOAD_FAILED",
            "playlistInfo": {},
            "tracks": [],
            "exception": { "message": "blocked", "severity": "COMMON" }
        })));

        match result {
            Err(Error::LoadFailed { message, severity }) => {
                assert_eq!(message, "blocked");
                assert_eq!(severity, "COMMON");
            },
            other => panic!("unexpected result: {other:?}")
        }
    }

    #[test]
    fn undecodable_tracks_are_skipped() {
        let a = track("a", 1);
        let loaded = loaded_tracks(response(json!({
            "loadType": "SEARCH_RESULT",
            "tracks": [{ "track": "%%%" }, { "track": a.encoded() }, { "track": "QAAAAQ==" }]
        }))).unwrap();

        assert_eq!(loaded, LoadedTracks { tracks: vec![a], playlist: None });
    }
}
