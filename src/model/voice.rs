use serde::{Deserialize, Serialize, Serializer};

use crate::model::payload::VoiceServer;

/// Raw voice events of the host platform gateway, as dispatched with their
/// `t` and `d` fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "t", content = "d")]
pub enum VoiceEvent {
    #[serde(rename = "VOICE_STATE_UPDATE")]
    StateUpdate(VoiceStateUpdate),
    #[serde(rename = "VOICE_SERVER_UPDATE")]
    ServerUpdate(VoiceServerUpdate)
}

impl VoiceEvent {
    pub fn guild_id(&self) -> u64 {
        match self {
            Self::StateUpdate(state) => state.guild_id,
            Self::ServerUpdate(server) => server.guild_id
        }
    }
}

/// A user joined, left or moved between voice channels.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceStateUpdate {
    #[serde(with = "crate::model::id")]
    pub guild_id: u64,
    #[serde(with = "crate::model::id")]
    pub user_id: u64,
    /// Channel the user is now in, `None` when they left.
    #[serde(default, with = "crate::model::id::option")]
    pub channel_id: Option<u64>,
    pub session_id: String
}

/// Voice server credentials for a guild.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceServerUpdate {
    #[serde(with = "crate::model::id")]
    pub guild_id: u64,
    pub token: String,
    #[serde(default)]
    pub endpoint: Option<String>
}

/// Both halves of a voice handshake, ready to be forwarded to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceHandshake {
    pub guild_id: u64,
    pub channel_id: Option<u64>,
    pub session_id: String,
    pub event: VoiceServer
}

#[derive(Debug, Default)]
pub(crate) struct PartialVoiceHandshake {
    pub channel_id: Option<u64>,
    pub session_id: Option<String>,
    pub event: Option<VoiceServer>
}

impl PartialVoiceHandshake {
    pub fn complete(&self) -> bool {
        self.session_id.is_some() && self.event.is_some()
    }

    /// Takes the handshake out, leaving `self` empty. `None` while incomplete.
    pub fn take(&mut self, guild_id: u64) -> Option<VoiceHandshake> {
        if !self.complete() {
            return None;
        }

        Some(VoiceHandshake {
            guild_id,
            channel_id: self.channel_id.take(),
            session_id: self.session_id.take()?,
            event: self.event.take()?
        })
    }
}

/// Cached session data allowing a dropped voice connection to be resumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceResumeData {
    #[serde(with = "crate::model::id")]
    pub server_id: u64,
    pub session_id: String,
    pub token: String
}

/// Body of a host gateway voice state update (op 4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceStateUpdatePacket {
    #[serde(with = "crate::model::id")]
    pub guild_id: u64,
    #[serde(with = "crate::model::id::option")]
    pub channel_id: Option<u64>,
    pub self_mute: bool,
    pub self_deaf: bool
}

/// Packets this client asks the host platform to send on its gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayPacket {
    /// Join, move or leave a voice channel (op 4).
    VoiceStateUpdate(VoiceStateUpdatePacket),
    /// Resume a voice session (op 7).
    Resume(VoiceResumeData)
}

impl GatewayPacket {
    pub fn join(guild_id: u64, channel_id: u64, self_deaf: bool) -> Self {
        Self::VoiceStateUpdate(VoiceStateUpdatePacket {
            guild_id,
            channel_id: Some(channel_id),
            self_mute: false,
            self_deaf
        })
    }

    pub fn leave(guild_id: u64) -> Self {
        Self::VoiceStateUpdate(VoiceStateUpdatePacket {
            guild_id,
            channel_id: None,
            self_mute: false,
            self_deaf: false
        })
    }

    pub fn op(&self) -> u8 {
        match self {
            Self::VoiceStateUpdate(_) => 4,
            Self::Resume(_) => 7
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    op: u8,
    d: &'a T
}

impl Serialize for GatewayPacket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::VoiceStateUpdate(d) => Envelope { op: self.op(), d }.serialize(serializer),
            Self::Resume(d) => Envelope { op: self.op(), d }.serialize(serializer)
        }
    }
}
