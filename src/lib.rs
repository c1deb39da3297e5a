//! Client for Lavalink-style audio nodes: connects to the nodes, keeps one
//! player per guild and relays the host platform's voice handshake.

pub mod model;
pub mod config;
pub mod filters;
pub mod gateway;
pub mod selector;
mod codec;
mod error;
mod events;
mod manager;
mod node;
mod player;
mod queue;
mod rest;
mod socket;
mod stream;
mod voice;

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};

use crate::model::payload::{OutgoingPayload, VoiceUpdate};
use crate::model::voice::VoiceResumeData;
use crate::voice::VoiceCorrelator;

pub use crate::config::{ClientConfig, NodeConfig, ReconnectPolicy};
pub use crate::error::{BoxError, CodecError, Error, Result, SocketError};
pub use crate::events::{Event, NodeEvent, PlayerEvent};
pub use crate::filters::Filters;
pub use crate::gateway::GatewaySender;
pub use crate::model::gateway::event::{TrackEndReason, TrackEvent};
pub use crate::model::track::Track;
pub use crate::model::voice::{GatewayPacket, VoiceEvent};
pub use crate::node::{Node, NodeStatus, SendStatus};
pub use crate::player::{InstanceState, PlayOptions, Player, PlayerOptions, TrackEndHandler, TrackState};
pub use crate::queue::{Queue, RepeatMode};
pub use crate::rest::{LoadedTracks, RestClient};
pub use crate::selector::{GuildHash, LeastLoaded, NodeSelector};
pub use crate::stream::EventStream;

/// State shared by the client, its nodes and their players.
pub(crate) struct Shared {
    pub config: ClientConfig,
    pub gateway: Arc<dyn GatewaySender>,
    events: UnboundedSender<Event>
}

impl Shared {
    pub fn emit(&self, event: impl Into<Event>) {
        if self.events.send(event.into()).is_err() {
            trace!("Event receiver dropped, discarding event");
        }
    }
}

pub struct LavalinkClient {
    shared: Arc<Shared>,
    nodes: Vec<Node>,
    selector: Box<dyn NodeSelector>,
    voice: VoiceCorrelator,
    events: Mutex<Option<UnboundedReceiver<Event>>>,
    /// Held while a player is looked up and placed, so a guild never ends up
    /// with players on two nodes.
    placement: Mutex<()>,
    rest: RestClient
}

impl LavalinkClient {
    /// Creates a client over `nodes`. Nothing connects until
    /// [`connect_all`](Self::connect_all) is called.
    pub fn new(config: ClientConfig, nodes: Vec<NodeConfig>, gateway: impl GatewaySender + 'static) -> Self {
        let (tx, rx) = unbounded_channel();
        let shared = Arc::new(Shared {
            config,
            gateway: Arc::new(gateway),
            events: tx
        });

        Self {
            voice: VoiceCorrelator::new(shared.config.user_id),
            rest: RestClient::new(&nodes),
            nodes: nodes.into_iter().map(|config| Node::new(config, Arc::clone(&shared))).collect(),
            selector: Box::new(GuildHash),
            events: Mutex::new(Some(rx)),
            placement: Mutex::new(()),
            shared
        }
    }

    /// Replaces the strategy used to place new players.
    pub fn with_selector(mut self, selector: impl NodeSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Connects every node. Nodes that fail keep retrying in the background,
    /// their errors are returned in node order.
    pub async fn connect_all(&self) -> Vec<Result<()>> {
        join_all(self.nodes.iter().map(|node| node.connect())).await
    }

    /// Closes every node, none of them will reconnect.
    pub async fn destroy_all(&self, reason: &str) -> Vec<Result<()>> {
        join_all(self.nodes.iter().map(|node| node.destroy(reason))).await
    }

    /// Takes the event stream. Returns `None` while another stream is alive.
    pub fn events(&self) -> Option<EventStream<'_>> {
        EventStream::new(&self.events)
    }

    pub fn get_player(&self, guild_id: u64) -> Option<Player> {
        self.nodes.iter().find_map(|node| node.player(guild_id))
    }

    /// Returns the player of the guild, creating it on the selected node when
    /// there is none. A new player joins its voice channel right away.
    pub async fn create_player(&self, options: PlayerOptions) -> Result<Player> {
        let guild_id = options.guild_id;

        let (node, player, created) = {
            let _placement = self.placement.lock();

            if let Some(player) = self.get_player(guild_id) {
                return Ok(player);
            }

            let node = self.selector
                .select(guild_id, &self.nodes)
                .and_then(|index| self.nodes.get(index))
                .ok_or(Error::NodeUnavailable)?;

            let (player, created) = node.get_or_create_player(options);
            (node, player, created)
        };

        if created {
            debug!("Created player for guild {guild_id} on {}", node.config().address());

            if let Err(e) = player.connect().await {
                node.players().remove(guild_id);
                return Err(e);
            }
        }

        Ok(player)
    }

    /// Feeds a raw voice event of the host gateway. Once both halves of the
    /// handshake arrived for a guild with a player, the node receives them.
    pub async fn send_voice_update(&self, event: VoiceEvent) -> Result<()> {
        let Some(handshake) = self.voice.accept(event) else {
            return Ok(());
        };

        let guild_id = handshake.guild_id;
        let Some(player) = self.get_player(guild_id) else {
            trace!("Dropping voice handshake for guild {guild_id} without a player");
            return Ok(());
        };
        let node = player.node().ok_or(Error::NodeUnavailable)?;

        player.set_voice_resume_data(VoiceResumeData {
            server_id: guild_id,
            session_id: handshake.session_id.clone(),
            token: handshake.event.token.clone()
        });

        match handshake.channel_id {
            Some(channel_id) => player.set_channel(channel_id),
            None => {
                debug!("Left voice in guild {guild_id}, removing player");
                node.players().remove(guild_id);
            }
        }

        let payload = OutgoingPayload::VoiceUpdate(VoiceUpdate {
            guild_id,
            session_id: handshake.session_id,
            event: handshake.event
        });

        if let Err(e) = node.send(payload).await {
            warn!("Failed to forward voice update of guild {guild_id}: {e}");
            return Err(e);
        }

        Ok(())
    }
}
