use serde::Deserialize;

/// Outcome of a `/loadtracks` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    TrackLoaded,
    PlaylistLoaded,
    SearchResult,
    NoMatches,
    LoadFailed
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTracksResponse {
    pub load_type: LoadType,
    #[serde(default)]
    pub playlist_info: Option<PlaylistInfo>,
    #[serde(default)]
    pub tracks: Vec<LoadedTrack>,
    #[serde(default)]
    pub exception: Option<LoadException>
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub selected_track: Option<i64>
}

/// A track as listed by the node. Only the encoded form is used, the rest is
/// decoded locally.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadedTrack {
    pub track: String
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadException {
    pub message: Option<String>,
    pub severity: String
}
