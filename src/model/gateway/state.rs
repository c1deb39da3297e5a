use serde::Deserialize;

/// Periodic position update of a player.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    #[serde(with = "crate::model::id")]
    pub guild_id: u64,
    pub state: PlayerUpdateState
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PlayerUpdateState {
    /// Node timestamp of the update, in milliseconds.
    pub time: u64,
    /// Playback position in milliseconds, absent when nothing is playing.
    #[serde(default)]
    pub position: Option<u64>,
    /// Whether the node is connected to the voice server.
    #[serde(default)]
    pub connected: bool
}
