use serde::Serialize;

use crate::filters::Filters;

/// Payloads sent to a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op")]
#[serde(rename_all = "camelCase")]
pub enum OutgoingPayload {
    VoiceUpdate(VoiceUpdate),
    Play(Play),
    Stop(GuildOnly),
    Pause(Pause),
    Seek(Seek),
    /// Standalone volume op for nodes without filter support. Players send
    /// their volume with [`Filters`](OutgoingPayload::Filters) instead.
    Volume(Volume),
    Filters(FiltersPayload),
    Destroy(GuildOnly)
}

impl OutgoingPayload {
    pub fn guild_id(&self) -> u64 {
        match self {
            Self::VoiceUpdate(p) => p.guild_id,
            Self::Play(p) => p.guild_id,
            Self::Stop(p) | Self::Destroy(p) => p.guild_id,
            Self::Pause(p) => p.guild_id,
            Self::Seek(p) => p.guild_id,
            Self::Volume(p) => p.guild_id,
            Self::Filters(p) => p.guild_id
        }
    }

    pub fn stop(guild_id: u64) -> Self {
        Self::Stop(GuildOnly { guild_id })
    }

    pub fn destroy(guild_id: u64) -> Self {
        Self::Destroy(GuildOnly { guild_id })
    }

    pub fn volume(guild_id: u64, volume: u16) -> Self {
        Self::Volume(Volume { guild_id, volume })
    }
}

/// Voice server information forwarded to the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceServer {
    pub token: String,
    pub endpoint: Option<String>
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceUpdate {
    #[serde(with = "crate::model::id")]
    pub guild_id: u64,
    pub session_id: String,
    pub event: VoiceServer
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Play {
    #[serde(with = "crate::model::id")]
    pub guild_id: u64,
    pub track: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_replace: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause: Option<bool>
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildOnly {
    #[serde(with = "crate::model::id")]
    pub guild_id: u64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pause {
    #[serde(with = "crate::model::id")]
    pub guild_id: u64,
    pub pause: bool
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Seek {
    #[serde(with = "crate::model::id")]
    pub guild_id: u64,
    pub position: u64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(with = "crate::model::id")]
    pub guild_id: u64,
    pub volume: u16
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiltersPayload {
    #[serde(with = "crate::model::id")]
    pub guild_id: u64,
    /// Volume multiplier, `1.0` being 100%.
    pub volume: f64,
    #[serde(flatten)]
    pub filters: Filters
}
