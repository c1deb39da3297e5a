use serde_json::{Map, Value};

use crate::error::Error;
use crate::model::gateway::event::TrackEndReason;
use crate::model::track::Track;
use crate::node::Node;
use crate::player::Player;

/// Everything the client reports to the application.
#[derive(Debug)]
pub enum Event {
    Node(NodeEvent),
    Player(PlayerEvent)
}

/// Connection lifecycle of a node.
#[derive(Debug)]
pub enum NodeEvent {
    /// The socket is open and queued payloads were flushed.
    Connect(Node),
    /// The socket closed. Code `1000` means the close was requested.
    Disconnect {
        node: Node,
        code: u16,
        reason: String
    },
    /// A reconnect attempt is about to start, `attempt` counts from 1.
    Reconnecting {
        node: Node,
        attempt: u32
    },
    /// A recoverable failure: a failed connection attempt, a failed write of
    /// a queued payload or a payload that could not be understood.
    Error {
        node: Node,
        error: Error
    },
    /// Every reconnect attempt failed, the node stays disconnected.
    ReconnectFailed {
        node: Node,
        attempts: u32
    }
}

/// Playback events of a guild's player.
#[derive(Debug)]
pub enum PlayerEvent {
    TrackStart {
        player: Player,
        track: Option<Track>
    },
    TrackEnd {
        player: Player,
        track: Option<Track>,
        reason: TrackEndReason
    },
    TrackStuck {
        player: Player,
        track: Option<Track>,
        payload: Map<String, Value>
    },
    TrackException {
        player: Player,
        track: Option<Track>,
        payload: Map<String, Value>
    },
    /// The last track of the queue finished.
    QueueEnd {
        player: Player
    },
    /// The node's voice connection closed, `message` describes the recovery
    /// attempted, if any.
    SocketClosed {
        player: Player,
        code: u16,
        message: Option<&'static str>
    }
}

impl From<NodeEvent> for Event {
    fn from(event: NodeEvent) -> Self {
        Self::Node(event)
    }
}

impl From<PlayerEvent> for Event {
    fn from(event: PlayerEvent) -> Self {
        Self::Player(event)
    }
}
