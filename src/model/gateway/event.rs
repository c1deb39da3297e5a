use serde::Deserialize;
use serde_json::{Map, Value};

/// Kind of a player event sent by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EventType {
    #[serde(rename = "TrackStartEvent")]
    TrackStart,
    #[serde(rename = "TrackEndEvent")]
    TrackEnd,
    #[serde(rename = "TrackExceptionEvent")]
    TrackException,
    #[serde(rename = "TrackStuckEvent")]
    TrackStuck,
    /// The node's voice connection to the host platform closed.
    #[serde(rename = "WebSocketClosedEvent")]
    WebSocketClosed
}

/// Why a track stopped playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup
}

impl TrackEndReason {
    /// Whether the queue may start the next track after this reason.
    pub fn may_start_next(self) -> bool {
        !matches!(self, Self::Stopped | Self::Cleanup | Self::Replaced)
    }
}

/// Event fired by the node for a guild's player.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    #[serde(rename = "type")]
    pub kind: EventType,
    #[serde(with = "crate::model::id")]
    pub guild_id: u64,
    /// Encoded track the event refers to.
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub reason: Option<TrackEndReason>,
    /// Close code, for `WebSocketClosedEvent`.
    #[serde(default)]
    pub code: Option<u16>,
    /// Every other field, kept verbatim for the application.
    #[serde(flatten)]
    pub extra: Map<String, Value>
}
