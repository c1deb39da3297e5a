//! A single connection to a remote audio node.
//!
//! Each node runs one read loop task that handles inbound payloads in order,
//! while writes go through an async mutex around the socket sink. Payloads
//! sent while the node is offline are kept in a queue that is flushed, in
//! submission order, as soon as a connection opens.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use crate::config::NodeConfig;
use crate::error::{Error, Result, SocketError};
use crate::events::NodeEvent;
use crate::manager::PlayerManager;
use crate::model::gateway::IncomingPayload;
use crate::model::payload::OutgoingPayload;
use crate::model::stats::ServerStats;
use crate::player::{Player, PlayerOptions};
use crate::socket::{self, Socket, SocketEvent, SocketSink, WsStream};
use crate::Shared;

/// Close code of a requested, clean close.
const NORMAL_CLOSE: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Disconnected,
    Connected,
    Reconnecting
}

/// Outcome of [`Node::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The payload was written to the socket.
    Sent,
    /// The node is offline, the payload will be sent once it connects.
    Queued
}

struct ConnectionState {
    status: NodeStatus,
    reconnect_attempts: u32,
    connected_at: Option<Instant>,
    /// Whether a reconnect loop task is alive. Only changes together with
    /// `status`, so a loop never exits while another one is being requested.
    reconnect_task: bool
}

pub(crate) struct NodeInner {
    config: NodeConfig,
    shared: Arc<Shared>,
    state: Mutex<ConnectionState>,
    stats: RwLock<Option<ServerStats>>,
    queue: Mutex<Vec<OutgoingPayload>>,
    sink: AsyncMutex<Option<SocketSink>>,
    closing: AtomicBool,
    players: PlayerManager
}

/// Handle to a node. Cloning it is cheap and every clone refers to the same
/// connection.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>
}

impl Node {
    pub(crate) fn new(config: NodeConfig, shared: Arc<Shared>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                config,
                shared,
                state: Mutex::new(ConnectionState {
                    status: NodeStatus::Disconnected,
                    reconnect_attempts: 0,
                    connected_at: None,
                    reconnect_task: false
                }),
                stats: RwLock::new(None),
                queue: Mutex::new(Vec::new()),
                sink: AsyncMutex::new(None),
                closing: AtomicBool::new(false),
                players: PlayerManager::new()
            })
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<NodeInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(inner: &Weak<NodeInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.inner.shared
    }

    pub(crate) fn players(&self) -> &PlayerManager {
        &self.inner.players
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    pub fn status(&self) -> NodeStatus {
        self.inner.state.lock().status
    }

    pub fn is_online(&self) -> bool {
        self.status() == NodeStatus::Connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().reconnect_attempts
    }

    /// Time since the current connection opened, `None` while offline.
    pub fn uptime(&self) -> Option<Duration> {
        let state = self.inner.state.lock();

        match state.status {
            NodeStatus::Connected => state.connected_at.map(|at| at.elapsed()),
            _ => None
        }
    }

    /// Last statistics reported by the node.
    pub fn stats(&self) -> Option<ServerStats> {
        self.inner.stats.read().clone()
    }

    /// Number of payloads waiting for a connection.
    pub fn queued_payloads(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn player(&self, guild_id: u64) -> Option<Player> {
        self.inner.players.get(guild_id)
    }

    pub fn player_count(&self) -> usize {
        self.inner.players.len()
    }

    /// Returns the player of the guild, registering a new one if there is none.
    pub(crate) fn get_or_create_player(&self, options: PlayerOptions) -> (Player, bool) {
        let guild_id = options.guild_id;

        self.inner.players.get_or_insert_with(guild_id, || Player::new(self, options))
    }

    /// Opens the connection. When the socket cannot be opened the error is
    /// returned and the node keeps retrying in the background.
    pub async fn connect(&self) -> Result<()> {
        match self.status() {
            NodeStatus::Connected => return Ok(()),
            NodeStatus::Reconnecting => return Err(Error::state("node is already reconnecting")),
            NodeStatus::Disconnected => {}
        }

        self.inner.closing.store(false, Ordering::Release);
        self.inner.state.lock().reconnect_attempts = 0;

        if let Err(e) = self.open().await {
            warn!("Failed to connect to node {}: {e}", self.inner.config.address());
            self.spawn_reconnect();
            return Err(e);
        }

        Ok(())
    }

    /// Sends a payload, or queues it while the node is offline.
    ///
    /// The result only reflects the write to the socket, the node does not
    /// acknowledge payloads.
    pub async fn send(&self, payload: OutgoingPayload) -> Result<SendStatus> {
        let mut sink = self.inner.sink.lock().await;
        let online = self.is_online();

        match sink.as_mut() {
            Some(sink) if online => {
                write(sink, &payload).await?;
                Ok(SendStatus::Sent)
            },
            _ => {
                trace!("Node {} is offline, queueing payload", self.inner.config.address());
                self.inner.queue.lock().push(payload);
                Ok(SendStatus::Queued)
            }
        }
    }

    /// Closes the connection with code 1000. The node will not reconnect.
    pub async fn destroy(&self, reason: &str) -> Result<()> {
        self.inner.closing.store(true, Ordering::Release);

        let mut sink = self.inner.sink.lock().await;
        self.inner.state.lock().status = NodeStatus::Disconnected;
        info!("Destroying node {}: {reason}", self.inner.config.address());

        match sink.take() {
            Some(mut sink) => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: reason.to_owned().into()
                };
                sink.send(Message::Close(Some(frame))).await.map_err(SocketError::from)?;
            },
            None => self.inner.queue.lock().clear()
        }

        Ok(())
    }

    async fn open(&self) -> Result<()> {
        let config = &self.inner.config;
        let client = &self.inner.shared.config;
        let url = config.socket_url();
        let user_id = client.user_id.to_string();
        let headers = [
            ("Authorization", config.password.as_str()),
            ("User-Id", user_id.as_str()),
            ("Client-Name", client.client_name.as_str())
        ];

        debug!("Trying to establish websocket connection to {url}");
        let (mut sink, stream) = socket::connect(&url, &headers).await?.split();

        let mut guard = self.inner.sink.lock().await;

        if self.inner.closing.load(Ordering::Acquire) {
            let _ = sink.close().await;
            return Err(Error::state("node was destroyed while connecting"));
        }

        let queued = std::mem::take(&mut *self.inner.queue.lock());
        debug!("Connected to {url}, flushing {} queued payloads", queued.len());

        for payload in queued {
            if let Err(e) = write(&mut sink, &payload).await {
                warn!("Failed to send queued payload to {url}: {e}");
                self.emit(NodeEvent::Error { node: self.clone(), error: e });
            }
        }

        *guard = Some(sink);
        {
            let mut state = self.inner.state.lock();
            state.status = NodeStatus::Connected;
            state.reconnect_attempts = 0;
            state.connected_at = Some(Instant::now());
        }
        drop(guard);

        info!("Connected to node {}", config.address());
        self.spawn_reader(stream);
        self.emit(NodeEvent::Connect(self.clone()));

        Ok(())
    }

    fn spawn_reader(&self, stream: SplitStream<WsStream>) {
        let node = self.clone();

        tokio::spawn(node.read_loop(Socket::new(stream)));
    }

    async fn read_loop(self, mut socket: Socket) {
        while let Some(event) = socket.next().await {
            match event {
                Ok(SocketEvent::Payload(payload)) => self.handle_payload(payload).await,
                Ok(SocketEvent::Closed { code, reason }) => return self.handle_close(code, reason).await,
                Err(SocketError::Json(e)) => {
                    warn!("Received an invalid payload from {}: {e}", self.inner.config.address());
                    self.emit(NodeEvent::Error {
                        node: self.clone(),
                        error: Error::Protocol(e.to_string())
                    });
                },
                Err(e) => return self.handle_error(e).await
            }
        }
    }

    async fn handle_payload(&self, payload: IncomingPayload) {
        match payload {
            IncomingPayload::Stats(stats) => {
                *self.inner.stats.write() = Some(stats);
            },
            IncomingPayload::PlayerUpdate(update) => match self.inner.players.get(update.guild_id) {
                Some(player) => player.handle_update(update),
                None if update.state.connected => {
                    debug!("Destroying orphaned player of guild {}", update.guild_id);
                    if let Err(e) = self.send(OutgoingPayload::destroy(update.guild_id)).await {
                        warn!("Failed to destroy orphaned player of guild {}: {e}", update.guild_id);
                    }
                },
                None => {}
            },
            IncomingPayload::Event(event) => match self.inner.players.get(event.guild_id) {
                Some(player) => player.handle_event(event).await,
                None => debug!("Dropping {:?} for unknown guild {}", event.kind, event.guild_id)
            }
        }
    }

    async fn handle_close(&self, code: u16, reason: String) {
        *self.inner.sink.lock().await = None;

        if code == NORMAL_CLOSE || self.inner.closing.load(Ordering::Acquire) {
            info!("Node {} closed the connection: {code} {reason}", self.inner.config.address());
            self.inner.state.lock().status = NodeStatus::Disconnected;
            self.inner.queue.lock().clear();
        } else {
            warn!("Node {} disconnected uncleanly: {code} {reason}", self.inner.config.address());
            self.spawn_reconnect();
        }

        self.emit(NodeEvent::Disconnect { node: self.clone(), code, reason });
    }

    async fn handle_error(&self, e: SocketError) {
        *self.inner.sink.lock().await = None;

        if self.inner.closing.load(Ordering::Acquire) {
            self.inner.state.lock().status = NodeStatus::Disconnected;
            self.inner.queue.lock().clear();
        } else {
            self.spawn_reconnect();
        }

        self.emit(NodeEvent::Error { node: self.clone(), error: Error::Connection(e) });
    }

    /// Marks the node as reconnecting and starts the reconnect loop unless
    /// one is already running, in which case that loop carries on.
    fn spawn_reconnect(&self) {
        {
            let mut state = self.inner.state.lock();
            state.status = NodeStatus::Reconnecting;

            if std::mem::replace(&mut state.reconnect_task, true) {
                return;
            }
        }

        let node = self.clone();
        tokio::spawn(async move { node.reconnect_loop().await });
    }

    async fn reconnect_loop(&self) {
        let policy = self.inner.config.reconnect;

        loop {
            let attempts = {
                let mut state = self.inner.state.lock();

                if state.status != NodeStatus::Reconnecting {
                    state.reconnect_task = false;
                    return;
                }

                if state.reconnect_attempts >= policy.limit {
                    state.status = NodeStatus::Disconnected;
                    state.reconnect_task = false;
                    Err(state.reconnect_attempts)
                } else {
                    Ok(state.reconnect_attempts)
                }
            };

            let attempts = match attempts {
                Ok(attempts) => attempts,
                Err(attempts) => {
                    error!("Failed to reconnect to node {} after {attempts} attempts", self.inner.config.address());
                    self.emit(NodeEvent::ReconnectFailed { node: self.clone(), attempts });
                    return;
                }
            };

            self.emit(NodeEvent::Reconnecting { node: self.clone(), attempt: attempts + 1 });
            *self.inner.sink.lock().await = None;

            match self.open().await {
                // The connection may already be gone again, the status decides.
                Ok(()) => continue,
                Err(e) => {
                    warn!("Reconnect attempt {} to node {} failed: {e}", attempts + 1, self.inner.config.address());
                    self.emit(NodeEvent::Error { node: self.clone(), error: e });
                }
            }

            self.inner.state.lock().reconnect_attempts += 1;
            tokio::time::sleep(policy.interval).await;
        }
    }

    fn emit(&self, event: NodeEvent) {
        self.inner.shared.emit(event);
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> Vec<OutgoingPayload> {
        self.inner.queue.lock().clone()
    }
}

async fn write(sink: &mut SocketSink, payload: &OutgoingPayload) -> Result<()> {
    let text = serde_json::to_string(payload).map_err(SocketError::from)?;
    trace!("Sending payload: {text}");
    sink.send(Message::Text(text)).await.map_err(SocketError::from)?;

    Ok(())
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.inner.config.address())
            .field("status", &self.status())
            .field("players", &self.player_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconnectPolicy;
    use crate::events::Event;
    use crate::testing::shared;
    use serde_json::Value;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    const WAIT: Duration = Duration::from_secs(5);

    fn node(port: u16, limit: u32) -> (Node, UnboundedReceiver<Event>) {
        let (shared, events, _gateway) = shared();
        let config = NodeConfig {
            host: "127.0.0.1".into(),
            port,
            password: "secret".into(),
            secure: false,
            reconnect: ReconnectPolicy { limit, interval: Duration::from_millis(20) }
        };

        (Node::new(config, shared), events)
    }

    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn next_node_event(events: &mut UnboundedReceiver<Event>) -> NodeEvent {
        loop {
            match timeout(WAIT, events.recv()).await.expect("timed out waiting for event") {
                Some(Event::Node(event)) => return event,
                Some(_) => continue,
                None => panic!("event channel closed")
            }
        }
    }

    #[tokio::test]
    async fn send_while_offline_is_queued() {
        let (node, _events) = node(unused_port(), 0);

        assert_eq!(node.status(), NodeStatus::Disconnected);
        assert_eq!(node.send(OutgoingPayload::stop(1)).await.unwrap(), SendStatus::Queued);
        assert_eq!(node.queued_payloads(), 1);
    }

    #[tokio::test]
    async fn flushes_queue_in_order_after_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut headers = None;
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, res: Response| -> Result<Response, ErrorResponse> {
                headers = Some(req.headers().clone());
                Ok(res)
            }).await.unwrap();

            let mut received = Vec::new();
            while received.len() < 4 {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => received.push(serde_json::from_str::<Value>(&text).unwrap()),
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected message: {other:?}")
                }
            }

            (headers.unwrap(), received)
        });

        let (node, mut events) = node(port, 0);
        for guild in 1..=3 {
            assert_eq!(node.send(OutgoingPayload::stop(guild)).await.unwrap(), SendStatus::Queued);
        }

        node.connect().await.unwrap();
        assert!(node.is_online());
        assert_eq!(node.queued_payloads(), 0);
        assert!(matches!(next_node_event(&mut events).await, NodeEvent::Connect(_)));
        assert_eq!(node.send(OutgoingPayload::destroy(4)).await.unwrap(), SendStatus::Sent);

        let (headers, received) = timeout(WAIT, server).await.unwrap().unwrap();
        let guilds: Vec<_> = received.iter().map(|p| p["guildId"].as_str().unwrap().to_owned()).collect();
        assert_eq!(guilds, ["1", "2", "3", "4"]);
        assert_eq!(received[3]["op"], "destroy");
        assert_eq!(headers["Authorization"], "secret");
        assert_eq!(headers["User-Id"], "1");
        assert!(headers.contains_key("Client-Name"));
    }

    #[tokio::test]
    async fn reconnect_gives_up_after_limit() {
        let (node, mut events) = node(unused_port(), 3);

        assert!(node.connect().await.is_err());

        let mut attempts = Vec::new();
        loop {
            match next_node_event(&mut events).await {
                NodeEvent::Reconnecting { attempt, .. } => attempts.push(attempt),
                NodeEvent::ReconnectFailed { attempts: total, .. } => {
                    assert_eq!(total, 3);
                    break;
                },
                _ => {}
            }
        }

        assert_eq!(attempts, [1, 2, 3]);
        assert_eq!(node.status(), NodeStatus::Disconnected);

        tokio::time::sleep(Duration::from_millis(100)).await;
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, Event::Node(NodeEvent::ReconnectFailed { .. } | NodeEvent::Reconnecting { .. })));
        }
    }

    #[tokio::test]
    async fn connect_after_giving_up_retries_again() {
        let (node, mut events) = node(unused_port(), 1);

        for _ in 0..2 {
            assert!(node.connect().await.is_err());

            let mut attempts = Vec::new();
            loop {
                match next_node_event(&mut events).await {
                    NodeEvent::Reconnecting { attempt, .. } => attempts.push(attempt),
                    NodeEvent::ReconnectFailed { .. } => break,
                    _ => {}
                }
            }

            assert_eq!(attempts, [1]);
            assert_eq!(node.status(), NodeStatus::Disconnected);
        }
    }

    #[tokio::test]
    async fn drop_right_after_reconnect_reconnects_again() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                drop(tokio_tungstenite::accept_async(stream).await.unwrap());
            }

            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.close(Some(CloseFrame { code: CloseCode::Normal, reason: "bye".into() })).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let (node, mut events) = node(port, 5);
        node.connect().await.unwrap();

        let mut connects = 0;
        loop {
            match next_node_event(&mut events).await {
                NodeEvent::Connect(_) => connects += 1,
                NodeEvent::Disconnect { code: 1000, .. } => break,
                _ => {}
            }
        }

        assert_eq!(connects, 3);
        assert_eq!(node.status(), NodeStatus::Disconnected);
        timeout(WAIT, server).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(node.status(), NodeStatus::Disconnected);
        assert!(!node.inner.state.lock().reconnect_task);
    }

    #[tokio::test]
    async fn unclean_close_reconnects_and_clean_close_does_not() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            // First connection is dropped without a close frame.
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            drop(ws);

            // The reconnect is closed normally.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.close(Some(CloseFrame { code: CloseCode::Normal, reason: "bye".into() })).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let (node, mut events) = node(port, 5);
        node.connect().await.unwrap();

        let mut saw_reconnect = false;
        loop {
            match next_node_event(&mut events).await {
                NodeEvent::Reconnecting { .. } => saw_reconnect = true,
                NodeEvent::Disconnect { code: 1000, .. } => break,
                _ => {}
            }
        }

        assert!(saw_reconnect);
        assert_eq!(node.status(), NodeStatus::Disconnected);
        assert_eq!(node.send(OutgoingPayload::stop(1)).await.unwrap(), SendStatus::Queued);
        timeout(WAIT, server).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stats_are_stored_and_orphans_destroyed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let stats = r#"{"op":"stats","players":2,"playingPlayers":1,"uptime":10,
                "memory":{"free":1,"used":1,"allocated":1,"reservable":1},
                "cpu":{"cores":2,"systemLoad":0.1,"lavalinkLoad":0.05}}"#;
            ws.send(Message::Text(stats.into())).await.unwrap();
            ws.send(Message::Text(r#"{"op":"nonsense"}"#.into())).await.unwrap();
            let orphan = r#"{"op":"playerUpdate","guildId":"77","state":{"time":1,"position":5,"connected":true}}"#;
            ws.send(Message::Text(orphan.into())).await.unwrap();

            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return serde_json::from_str::<Value>(&text).unwrap(),
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected message: {other:?}")
                }
            }
        });

        let (node, mut events) = node(port, 0);
        node.connect().await.unwrap();

        let destroy = timeout(WAIT, server).await.unwrap().unwrap();
        assert_eq!(destroy["op"], "destroy");
        assert_eq!(destroy["guildId"], "77");
        assert_eq!(node.stats().unwrap().players, 2);

        let mut protocol_errors = 0;
        while let Ok(event) = events.try_recv() {
            if let Event::Node(NodeEvent::Error { error: Error::Protocol(_), .. }) = event {
                protocol_errors += 1;
            }
        }
        assert_eq!(protocol_errors, 1);
    }

    #[tokio::test]
    async fn destroy_closes_without_reconnecting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(frame))) => return frame.map(|f| (u16::from(f.code), f.reason.into_owned())),
                    Some(Ok(_)) => continue,
                    _ => return None
                }
            }
        });

        let (node, mut events) = node(port, 5);
        node.connect().await.unwrap();
        node.destroy("shutting down").await.unwrap();

        let frame = timeout(WAIT, server).await.unwrap().unwrap();
        assert_eq!(frame, Some((1000, "shutting down".to_owned())));
        assert_eq!(node.status(), NodeStatus::Disconnected);

        tokio::time::sleep(Duration::from_millis(100)).await;
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, Event::Node(NodeEvent::Reconnecting { .. })));
        }
    }
}
