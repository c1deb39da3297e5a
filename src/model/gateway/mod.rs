pub mod event;
pub mod state;

use serde::Deserialize;

use crate::model::stats::ServerStats;

/// Payloads that can be received from a node.
#[derive(Debug, Deserialize)]
#[serde(tag = "op")]
#[serde(rename_all = "camelCase")]
pub enum IncomingPayload {
    Stats(ServerStats),
    PlayerUpdate(state::PlayerUpdate),
    Event(event::TrackEvent)
}

impl IncomingPayload {
    /// Guild the payload is addressed to, if any.
    pub fn guild_id(&self) -> Option<u64> {
        match self {
            Self::Stats(_) => None,
            Self::PlayerUpdate(update) => Some(update.guild_id),
            Self::Event(event) => Some(event.guild_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::event::{EventType, TrackEndReason};

    #[test]
    fn parses_stats() {
        let payload: IncomingPayload = serde_json::from_str(r#"{
            "op": "stats",
            "players": 3,
            "playingPlayers": 1,
            "uptime": 60000,
            "memory": { "free": 1, "used": 2, "allocated": 3, "reservable": 4 },
            "cpu": { "cores": 4, "systemLoad": 0.5, "lavalinkLoad": 0.25 }
        }"#).unwrap();

        let IncomingPayload::Stats(stats) = payload else { panic!("expected stats") };
        assert_eq!(stats.players, 3);
        assert_eq!(stats.playing_players, 1);
        assert_eq!(stats.cpu.cores, 4);
        assert!(stats.frame_stats.is_none());
    }

    #[test]
    fn parses_player_update_with_string_guild() {
        let payload: IncomingPayload = serde_json::from_str(r#"{
            "op": "playerUpdate",
            "guildId": "81384788765712384",
            "state": { "time": 1500, "position": 600, "connected": true }
        }"#).unwrap();

        assert_eq!(payload.guild_id(), Some(81384788765712384));
        let IncomingPayload::PlayerUpdate(update) = payload else { panic!("expected update") };
        assert_eq!(update.state.position, Some(600));
        assert!(update.state.connected);
    }

    #[test]
    fn parses_track_end_event() {
        let payload: IncomingPayload = serde_json::from_str(r#"{
            "op": "event",
            "type": "TrackEndEvent",
            "guildId": "1",
            "track": "QAAA",
            "reason": "REPLACED"
        }"#).unwrap();

        let IncomingPayload::Event(event) = payload else { panic!("expected event") };
        assert_eq!(event.kind, EventType::TrackEnd);
        assert_eq!(event.reason, Some(TrackEndReason::Replaced));
        assert_eq!(event.track.as_deref(), Some("QAAA"));
    }

    #[test]
    fn keeps_extra_event_fields() {
        let payload: IncomingPayload = serde_json::from_str(r#"{
            "op": "event",
            "type": "TrackStuckEvent",
            "guildId": 5,
            "track": "QAAA",
            "thresholdMs": 10000
        }"#).unwrap();

        let IncomingPayload::Event(event) = payload else { panic!("expected event") };
        assert_eq!(event.kind, EventType::TrackStuck);
        assert_eq!(event.extra["thresholdMs"], 10000);
    }

    #[test]
    fn unknown_op_is_an_error() {
        assert!(serde_json::from_str::<IncomingPayload>(r#"{"op": "ready"}"#).is_err());
        assert!(serde_json::from_str::<IncomingPayload>(r#"{"op": "event", "type": "TrackStartEvent"}"#).is_err());
    }
}
