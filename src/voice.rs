use dashmap::DashMap;
use tracing::trace;

use crate::model::payload::VoiceServer;
use crate::model::voice::{PartialVoiceHandshake, VoiceEvent, VoiceHandshake};

/// Joins the two independent halves of a voice connection, the state update
/// and the server update, into one handshake per guild.
pub(crate) struct VoiceCorrelator {
    user_id: u64,
    pending: DashMap<u64, PartialVoiceHandshake>
}

impl VoiceCorrelator {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            pending: DashMap::new()
        }
    }

    /// Buffers `event` and returns the handshake once both halves arrived.
    pub fn accept(&self, event: VoiceEvent) -> Option<VoiceHandshake> {
        let guild_id = event.guild_id();

        let mut partial = match event {
            VoiceEvent::StateUpdate(state) => {
                if state.user_id != self.user_id {
                    trace!("Ignoring voice state of user {} in guild {guild_id}", state.user_id);
                    return None;
                }

                let mut partial = self.pending.entry(guild_id).or_default();
                partial.channel_id = state.channel_id;
                partial.session_id = Some(state.session_id);
                partial
            },
            VoiceEvent::ServerUpdate(server) => {
                let mut partial = self.pending.entry(guild_id).or_default();
                partial.event = Some(VoiceServer {
                    token: server.token,
                    endpoint: server.endpoint
                });
                partial
            }
        };

        let handshake = partial.take(guild_id)?;
        drop(partial);
        self.pending.remove_if(&guild_id, |_, p| p.session_id.is_none() && p.event.is_none());
        trace!("Voice handshake for guild {guild_id} is complete");

        Some(handshake)
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
