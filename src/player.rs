use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace, warn};
use typemap_rev::TypeMap;

use crate::error::{Error, Result};
use crate::events::PlayerEvent;
use crate::filters::Filters;
use crate::model::gateway::event::{EventType, TrackEndReason, TrackEvent};
use crate::model::gateway::state::PlayerUpdate;
use crate::model::payload::{FiltersPayload, OutgoingPayload, Pause, Play, Seek};
use crate::model::track::Track;
use crate::model::voice::{GatewayPacket, VoiceResumeData};
use crate::node::{Node, NodeInner, SendStatus};
use crate::queue::{Queue, RepeatMode};
use crate::Shared;

pub const DEFAULT_VOLUME: u16 = 100;
pub const MAX_VOLUME: u16 = 500;

const REJOIN_MESSAGE: &str = "Re-establishing voice connection";
const RESUME_MESSAGE: &str = "Trying to resume voice connection";

/// Connection and playback settings of a player, replaced as a whole on every
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceState {
    /// Node timestamp of the last `playerUpdate`, in milliseconds.
    pub last_updated: Option<u64>,
    pub position: Option<u64>,
    pub connected: bool,
    pub volume: u16,
    pub queue_repeat_mode: RepeatMode,
    pub queue_preserve: bool,
    pub deafen: bool
}

impl Default for InstanceState {
    fn default() -> Self {
        Self {
            last_updated: None,
            position: None,
            connected: false,
            volume: DEFAULT_VOLUME,
            queue_repeat_mode: RepeatMode::Off,
            queue_preserve: false,
            deafen: true
        }
    }
}

/// State of the loaded track. `current_track_index` is only meaningful while
/// `track_loaded` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackState {
    pub paused: bool,
    pub track_loaded: bool,
    /// Unix time in milliseconds the current track started at.
    pub track_started_at: Option<u64>,
    pub current_track_index: Option<usize>
}

/// Replaces the queue advance that runs when a track ends.
pub type TrackEndHandler = Arc<dyn Fn(&Player, &TrackEvent) + Send + Sync>;

/// Settings of a newly created player.
#[derive(Clone)]
pub struct PlayerOptions {
    pub guild_id: u64,
    pub channel_id: u64,
    pub volume: u16,
    pub repeat_mode: RepeatMode,
    pub preserve: bool,
    pub deafen: bool,
    /// Called instead of the built-in queue advance on every track end. The
    /// queue is left untouched, the `TrackEnd` event is still emitted.
    pub track_end_handler: Option<TrackEndHandler>
}

impl PlayerOptions {
    pub fn new(guild_id: u64, channel_id: u64) -> Self {
        Self {
            guild_id,
            channel_id,
            volume: DEFAULT_VOLUME,
            repeat_mode: RepeatMode::Off,
            preserve: false,
            deafen: true,
            track_end_handler: None
        }
    }

    pub fn with_track_end_handler(mut self, handler: impl Fn(&Player, &TrackEvent) + Send + Sync + 'static) -> Self {
        self.track_end_handler = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for PlayerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerOptions")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("volume", &self.volume)
            .field("repeat_mode", &self.repeat_mode)
            .field("preserve", &self.preserve)
            .field("deafen", &self.deafen)
            .field("track_end_handler", &self.track_end_handler.is_some())
            .finish()
    }
}

/// Optional parameters of [`Player::play`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayOptions {
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    /// Overrides the player volume for this track.
    pub volume: Option<u16>,
    /// Ignore the request if a track is already playing.
    pub no_replace: Option<bool>,
    pub pause: Option<bool>
}

/// What the queue does after a track ended.
#[derive(Debug, PartialEq)]
enum Advance {
    Play(Track),
    QueueEnd,
    Idle
}

struct PlayerState {
    channel_id: Option<u64>,
    instance: InstanceState,
    track: TrackState,
    resume: Option<VoiceResumeData>,
    queue: Queue,
    filters: Filters
}

impl PlayerState {
    fn current_track(&self) -> Option<&Track> {
        if !self.track.track_loaded {
            return None;
        }

        self.queue.get(self.track.current_track_index?)
    }

    fn filters_payload(&self, guild_id: u64) -> OutgoingPayload {
        OutgoingPayload::Filters(FiltersPayload {
            guild_id,
            volume: f64::from(self.instance.volume) / 100.0,
            filters: self.filters.clone()
        })
    }

    /// Applies the repeat mode after the current track ended.
    fn advance(&mut self, reason: TrackEndReason) -> Advance {
        let current = self.track.current_track_index.take();
        self.track = TrackState { track_loaded: false, ..self.track };

        let mode = self.instance.queue_repeat_mode;
        let preserve = self.instance.queue_preserve;
        let next = match current {
            Some(index) if mode == RepeatMode::Track => Some(index),
            Some(index) => Some(index + 1),
            None if mode == RepeatMode::Track => None,
            None => Some(0)
        };

        if mode != RepeatMode::Track && next == Some(self.queue.len()) {
            if let (Some(index), RepeatMode::Off, false) = (current, mode, preserve) {
                self.queue.remove(index);
            }

            return Advance::QueueEnd;
        }

        let candidate = next.and_then(|index| self.queue.get(index).cloned());

        if let Some(index) = current {
            if (mode == RepeatMode::Off || reason == TrackEndReason::Replaced) && !preserve {
                self.queue.remove(index);
            } else if mode == RepeatMode::Queue {
                if let Some(track) = self.queue.remove(index) {
                    self.queue.add(track, None);
                }
            }
        }

        match candidate {
            Some(track) if reason.may_start_next() => Advance::Play(track),
            _ => Advance::Idle
        }
    }
}

struct PlayerInner {
    guild_id: u64,
    node: Weak<NodeInner>,
    shared: Arc<Shared>,
    state: Mutex<PlayerState>,
    track_end: Option<TrackEndHandler>,
    data: RwLock<TypeMap>
}

/// Audio player of a guild. Cloning it is cheap, every clone controls the
/// same player.
#[derive(Clone)]
pub struct Player {
    inner: Arc<PlayerInner>
}

impl Player {
    pub(crate) fn new(node: &Node, options: PlayerOptions) -> Self {
        let volume = if options.volume > MAX_VOLUME {
            warn!("Invalid volume {} for guild {}, using {DEFAULT_VOLUME}", options.volume, options.guild_id);
            DEFAULT_VOLUME
        } else {
            options.volume
        };

        Self {
            inner: Arc::new(PlayerInner {
                guild_id: options.guild_id,
                node: node.downgrade(),
                shared: Arc::clone(node.shared()),
                state: Mutex::new(PlayerState {
                    channel_id: Some(options.channel_id),
                    instance: InstanceState {
                        volume,
                        queue_repeat_mode: options.repeat_mode,
                        queue_preserve: options.preserve,
                        deafen: options.deafen,
                        ..InstanceState::default()
                    },
                    track: TrackState::default(),
                    resume: None,
                    queue: Queue::new(),
                    filters: Filters::default()
                }),
                track_end: options.track_end_handler,
                data: RwLock::new(TypeMap::new())
            })
        }
    }

    pub fn guild_id(&self) -> u64 {
        self.inner.guild_id
    }

    pub fn channel_id(&self) -> Option<u64> {
        self.inner.state.lock().channel_id
    }

    /// The node this player lives on, `None` once the node was dropped.
    pub fn node(&self) -> Option<Node> {
        Node::upgrade(&self.inner.node)
    }

    pub fn instance_state(&self) -> InstanceState {
        self.inner.state.lock().instance
    }

    pub fn track_state(&self) -> TrackState {
        self.inner.state.lock().track
    }

    pub fn current_track(&self) -> Option<Track> {
        self.inner.state.lock().current_track().cloned()
    }

    pub fn filters(&self) -> Filters {
        self.inner.state.lock().filters.clone()
    }

    pub fn voice_resume_data(&self) -> Option<VoiceResumeData> {
        self.inner.state.lock().resume.clone()
    }

    /// Arbitrary data attached to the player by the application.
    pub fn data(&self) -> RwLockReadGuard<'_, TypeMap> {
        self.inner.data.read()
    }

    pub fn data_mut(&self) -> RwLockWriteGuard<'_, TypeMap> {
        self.inner.data.write()
    }

    /// Runs `f` with the queue.
    pub fn queue<R>(&self, f: impl FnOnce(&Queue) -> R) -> R {
        f(&self.inner.state.lock().queue)
    }

    /// Runs `f` with mutable access to the queue. The lock is held for the
    /// duration of `f`, so it must not block.
    pub fn queue_mut<R>(&self, f: impl FnOnce(&mut Queue) -> R) -> R {
        f(&mut self.inner.state.lock().queue)
    }

    /// Adds a track to the queue, at `position` or at the end.
    pub fn add_track(&self, track: Track, position: Option<usize>) {
        self.inner.state.lock().queue.add(track, position);
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.inner.state.lock().queue.tracks().to_vec()
    }

    pub fn set_queue_repeat_mode(&self, mode: RepeatMode) {
        let mut state = self.inner.state.lock();
        state.instance = InstanceState { queue_repeat_mode: mode, ..state.instance };
    }

    /// With preserve set, finished tracks stay in the queue.
    pub fn set_queue_preserve(&self, preserve: bool) {
        let mut state = self.inner.state.lock();
        state.instance = InstanceState { queue_preserve: preserve, ..state.instance };
    }

    /// Asks the node to play `track`. The track state changes once the node
    /// reports the start.
    pub async fn play(&self, track: &Track, options: PlayOptions) -> Result<SendStatus> {
        let volume = options.volume.unwrap_or_else(|| self.instance_state().volume);

        if volume > MAX_VOLUME {
            return Err(Error::validation(format!("volume must be within 0..={MAX_VOLUME}, got {volume}")));
        }

        debug!("Playing {} in guild {}", track.title, self.guild_id());
        self.send(OutgoingPayload::Play(Play {
            guild_id: self.guild_id(),
            track: track.encoded().to_owned(),
            start_time: options.start_time,
            end_time: options.end_time,
            volume: Some(volume),
            no_replace: options.no_replace,
            pause: options.pause
        })).await
    }

    /// Plays the current queue track, or the head of the queue.
    pub async fn play_queue(&self) -> Result<SendStatus> {
        let track = {
            let state = self.inner.state.lock();
            let index = match state.track {
                TrackState { track_loaded: true, current_track_index: Some(index), .. } => index,
                _ => 0
            };

            state.queue.get(index).cloned()
        };

        match track {
            Some(track) => self.play(&track, PlayOptions::default()).await,
            None => Err(Error::state("the queue is empty"))
        }
    }

    pub async fn stop(&self) -> Result<SendStatus> {
        self.send(OutgoingPayload::stop(self.guild_id())).await
    }

    /// Toggles pause, returning the new state along with the send status.
    pub async fn pause(&self) -> Result<(bool, SendStatus)> {
        let paused = {
            let mut state = self.inner.state.lock();
            state.track = TrackState { paused: !state.track.paused, ..state.track };
            state.track.paused
        };

        let status = self.send_pause(paused).await?;

        Ok((paused, status))
    }

    pub async fn set_paused(&self, paused: bool) -> Result<SendStatus> {
        {
            let mut state = self.inner.state.lock();

            if state.track.paused == paused {
                let current = if paused { "paused" } else { "playing" };
                return Err(Error::state(format!("player is already {current}")));
            }

            state.track = TrackState { paused, ..state.track };
        }

        self.send_pause(paused).await
    }

    async fn send_pause(&self, pause: bool) -> Result<SendStatus> {
        self.send(OutgoingPayload::Pause(Pause {
            guild_id: self.guild_id(),
            pause
        })).await
    }

    /// Seeks the loaded track to `position` milliseconds.
    pub async fn seek(&self, position: i64) -> Result<SendStatus> {
        let position = {
            let mut state = self.inner.state.lock();
            let Some(length) = state.current_track().map(|t| t.length) else {
                return Err(Error::validation("no track is loaded"));
            };

            let position = match u64::try_from(position) {
                Ok(position) if position <= length => position,
                _ => return Err(Error::validation(format!("position must be within 0..={length}, got {position}")))
            };

            state.instance = InstanceState { position: Some(position), ..state.instance };
            position
        };

        self.send(OutgoingPayload::Seek(Seek {
            guild_id: self.guild_id(),
            position
        })).await
    }

    /// Sets the volume, from 0 to 500. The node receives it with the filters.
    pub async fn set_volume(&self, volume: i32) -> Result<SendStatus> {
        let volume = match u16::try_from(volume) {
            Ok(volume) if volume <= MAX_VOLUME => volume,
            _ => return Err(Error::validation(format!("volume must be within 0..={MAX_VOLUME}, got {volume}")))
        };

        let payload = {
            let mut state = self.inner.state.lock();
            state.instance = InstanceState { volume, ..state.instance };
            state.filters_payload(self.guild_id())
        };

        self.send(payload).await
    }

    /// Replaces every filter of the player.
    pub async fn set_filters(&self, filters: Filters) -> Result<SendStatus> {
        filters.validate()?;

        let payload = {
            let mut state = self.inner.state.lock();
            state.filters = filters;
            state.filters_payload(self.guild_id())
        };

        self.send(payload).await
    }

    /// Joins the voice channel of the player.
    pub async fn connect(&self) -> Result<()> {
        let (channel, deafen) = {
            let state = self.inner.state.lock();
            (state.channel_id, state.instance.deafen)
        };

        let channel = channel.ok_or_else(|| Error::state("player has no voice channel"))?;
        self.send_gateway(GatewayPacket::join(self.guild_id(), channel, deafen)).await
    }

    /// Removes the player, leaves the voice channel and destroys the player on
    /// the node.
    pub async fn destroy(&self) -> Result<SendStatus> {
        let node = self.node().ok_or(Error::NodeUnavailable)?;
        node.players().remove(self.guild_id());
        debug!("Destroying player of guild {}", self.guild_id());

        self.send_gateway(GatewayPacket::leave(self.guild_id())).await?;
        node.send(OutgoingPayload::destroy(self.guild_id())).await
    }

    async fn send(&self, payload: OutgoingPayload) -> Result<SendStatus> {
        let node = self.node().ok_or(Error::NodeUnavailable)?;

        node.send(payload).await
    }

    async fn send_gateway(&self, packet: GatewayPacket) -> Result<()> {
        self.inner.shared.gateway
            .send_gateway_packet(self.guild_id(), packet)
            .await
            .map_err(Error::Gateway)
    }

    pub(crate) fn set_voice_resume_data(&self, data: VoiceResumeData) {
        self.inner.state.lock().resume = Some(data);
    }

    pub(crate) fn set_channel(&self, channel_id: u64) {
        self.inner.state.lock().channel_id = Some(channel_id);
    }

    pub(crate) fn handle_update(&self, update: PlayerUpdate) {
        let mut state = self.inner.state.lock();

        state.instance = InstanceState {
            last_updated: Some(update.state.time),
            position: update.state.position,
            connected: update.state.connected,
            ..state.instance
        };
    }

    pub(crate) async fn handle_event(&self, event: TrackEvent) {
        trace!("Player of guild {} received {:?}", self.guild_id(), event.kind);

        match event.kind {
            EventType::TrackStart => self.handle_track_start(event),
            EventType::TrackEnd => self.handle_track_end(event).await,
            EventType::TrackStuck => {
                let track = self.event_track(&event);
                self.emit(PlayerEvent::TrackStuck { player: self.clone(), track, payload: event.extra });
            },
            EventType::TrackException => {
                let track = self.event_track(&event);
                self.emit(PlayerEvent::TrackException { player: self.clone(), track, payload: event.extra });
            },
            EventType::WebSocketClosed => self.handle_socket_closed(event.code.unwrap_or_default()).await
        }
    }

    fn handle_track_start(&self, event: TrackEvent) {
        let track = {
            let mut state = self.inner.state.lock();
            let index = event.track.as_deref().and_then(|t| state.queue.index_of_encoded(t));

            state.track = TrackState {
                track_loaded: true,
                track_started_at: Some(now_millis()),
                current_track_index: index,
                ..state.track
            };
            index.and_then(|i| state.queue.get(i).cloned())
        };

        let track = track.or_else(|| decode(event.track.as_deref()));
        self.emit(PlayerEvent::TrackStart { player: self.clone(), track });
    }

    async fn handle_track_end(&self, event: TrackEvent) {
        let reason = event.reason.unwrap_or(TrackEndReason::Finished);
        let track = self.event_track(&event);

        if let Some(handler) = &self.inner.track_end {
            {
                let mut state = self.inner.state.lock();
                state.track = TrackState { track_loaded: false, current_track_index: None, ..state.track };
            }

            self.emit(PlayerEvent::TrackEnd { player: self.clone(), track, reason });
            handler(self, &event);
            return;
        }

        let advance = self.inner.state.lock().advance(reason);

        self.emit(PlayerEvent::TrackEnd { player: self.clone(), track, reason });

        match advance {
            Advance::QueueEnd => self.emit(PlayerEvent::QueueEnd { player: self.clone() }),
            Advance::Play(next) => {
                if let Err(e) = self.play(&next, PlayOptions::default()).await {
                    warn!("Failed to play the next track in guild {}: {e}", self.guild_id());
                }
            },
            Advance::Idle => {}
        }
    }

    async fn handle_socket_closed(&self, code: u16) {
        let (packet, message) = {
            let state = self.inner.state.lock();
            let join = state.channel_id
                .map(|channel| GatewayPacket::join(self.guild_id(), channel, state.instance.deafen));

            match (code, state.resume.clone()) {
                (4006 | 4009, _) => (join, Some(REJOIN_MESSAGE)),
                (4015, Some(resume)) => (Some(GatewayPacket::Resume(resume)), Some(RESUME_MESSAGE)),
                (4015, None) => (join, Some(REJOIN_MESSAGE)),
                _ => (None, None)
            }
        };

        if let Some(packet) = packet {
            debug!("Voice connection of guild {} closed with {code}, sending op {}", self.guild_id(), packet.op());

            if let Err(e) = self.send_gateway(packet).await {
                warn!("Failed to recover voice connection of guild {}: {e}", self.guild_id());
            }
        }

        self.emit(PlayerEvent::SocketClosed { player: self.clone(), code, message });
    }

    /// The queue track the event refers to, or the decoded event track.
    fn event_track(&self, event: &TrackEvent) -> Option<Track> {
        let encoded = event.track.as_deref()?;
        let queued = {
            let state = self.inner.state.lock();
            state.queue.index_of_encoded(encoded).and_then(|i| state.queue.get(i).cloned())
        };

        queued.or_else(|| decode(Some(encoded)))
    }

    fn emit(&self, event: PlayerEvent) {
        self.inner.shared.emit(event);
    }
}

fn decode(encoded: Option<&str>) -> Option<Track> {
    match Track::decode(encoded?) {
        Ok(track) => Some(track),
        Err(e) => {
            warn!("Failed to decode track from event: {e}");
            None
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();

        f.debug_struct("Player")
            .field("guild_id", &self.inner.guild_id)
            .field("channel_id", &state.channel_id)
            .field("instance", &state.instance)
            .field("track", &state.track)
            .field("queue", &state.queue.len())
            .finish()
    }
}
