//! Distributed WebSocket hub
//!
//! `WsHub` is the single acton-reactive agent that owns every piece of
//! authoritative WebSocket state for this node: the connection registry, its
//! four lookup indices (client, user, ticket, agent-client), the sibling-node
//! registry used for heartbeat/load tracking, and the offline-message
//! backlog. Nothing outside this agent mutates that state directly —
//! handlers only send it messages and await replies, the same way the pool
//! agents in [`crate::agents::pool`] do.
//!
//! When the `cache` feature is enabled, client-to-client deliveries also
//! publish to a Redis channel so sibling nodes holding the target connection
//! can forward the frame; this node's own subscriber loop is spawned by
//! [`WsHub::spawn`] alongside the heartbeat and sweep ticks. When the
//! `database` feature is enabled, offline messages are additionally
//! persisted through `sqlx::PgPool` so they survive a node restart.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use acton_reactive::prelude::*;
use async_trait::async_trait;
use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::WsHubConfig;
use crate::ids::NodeId;

/// Identifies a single WebSocket connection, on any node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single registered WebSocket client.
#[derive(Debug, Clone)]
pub struct HubConnection {
    pub client_id: ClientId,
    pub sender: mpsc::Sender<Message>,
    pub user_id: Option<String>,
    pub ticket_id: Option<String>,
    /// Machine/service clients (as opposed to end-user browsers) are kept in
    /// a distinct index so operators can target "every agent" separately
    /// from "every connection for this user".
    pub is_agent: bool,
    pub channels: HashSet<String>,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl HubConnection {
    #[must_use]
    pub fn new(client_id: ClientId, sender: mpsc::Sender<Message>) -> Self {
        let now = Utc::now();
        Self {
            client_id,
            sender,
            user_id: None,
            ticket_id: None,
            is_agent: false,
            channels: HashSet::new(),
            connected_at: now,
            last_heartbeat: now,
        }
    }

    #[must_use]
    pub fn agent(mut self) -> Self {
        self.is_agent = true;
        self
    }
}

/// Snapshot of a sibling node's liveness and load, as seen by this node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub connection_count: usize,
    pub load_score: f64,
    pub last_heartbeat: DateTime<Utc>,
}

/// Delivery priority for a [`HubMessage`]. Informational only today (no
/// priority queueing), but carried through so a future scheduler has the
/// field to act on without another wire-format change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Delivery status of a [`HubMessage`], updated as it moves through routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageStatus {
    #[default]
    Pending,
    Delivered,
    Queued,
    Failed,
}

/// An application message routed through the hub.
///
/// `msg_id` lets receivers (including sibling nodes relaying via Redis)
/// detect and drop duplicates; `seq_no` is monotonic per `from` and lets a
/// receiver detect gaps or reordering within one source's stream.
#[derive(Debug, Clone)]
pub struct HubMessage {
    pub msg_id: String,
    pub seq_no: u64,
    pub from: Option<ClientId>,
    pub priority: MessagePriority,
    pub status: MessageStatus,
    pub reply_to_msg_id: Option<String>,
    pub payload: Message,
}

impl HubMessage {
    #[must_use]
    pub fn new(from: Option<ClientId>, payload: Message) -> Self {
        Self {
            msg_id: Uuid::new_v4().to_string(),
            seq_no: 0,
            from,
            priority: MessagePriority::Normal,
            status: MessageStatus::Pending,
            reply_to_msg_id: None,
            payload,
        }
    }
}

/// An offline message queued for a user who has no live connection right now.
#[derive(Debug, Clone)]
pub struct OfflineMessage {
    pub message: HubMessage,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Where a [`RouteMessage`] should be delivered. Mirrors the spec's four
/// routing-disambiguation rules: a specific connection, every connection for
/// a user, every connection sharing a reconnect ticket (excluding the
/// sender), or everyone on this node.
#[derive(Debug, Clone)]
pub enum RouteTarget {
    Client(ClientId),
    User(String),
    Ticket(String),
    All,
}

/// Cross-node control/fan-out envelope published to and consumed from Redis
/// pub/sub. `op` distinguishes the three wire operations the spec names so a
/// receiving node never re-broadcasts a message it originated.
#[derive(Debug, Clone)]
pub enum DistributedOp {
    Heartbeat { connection_count: usize, load_score: f64 },
    Message { target: DistributedTarget, message: HubMessage },
    Sync,
}

/// Serializable routing target for [`DistributedOp::Message`] — unlike
/// [`RouteTarget`], this never names a local-only `ClientId`, since a sibling
/// node has no notion of another node's client identifiers.
#[derive(Debug, Clone)]
pub enum DistributedTarget {
    User(String),
    Ticket(String),
    All,
}

#[derive(Debug, Clone)]
pub struct DistributedMessage {
    pub node_id: NodeId,
    pub op: DistributedOp,
}

/// Application callbacks invoked at key points in a connection's lifecycle.
/// All methods default to a no-op so implementors only override what they
/// need; `on_offline_message_push`'s return value is the callback-owned
/// delete/retain decision the offline queue honors (`true` keeps the
/// message queued, `false` drops it immediately instead of queuing).
#[async_trait]
pub trait HubCallbacks: Send + Sync {
    async fn on_client_connect(&self, _conn: &HubConnection) {}
    async fn on_client_disconnect(&self, _client_id: ClientId, _reason: &str) {}
    async fn on_message_received(&self, _message: &HubMessage) {}
    async fn on_error(&self, _error: &str) {}
    async fn on_heartbeat_timeout(&self, _client_id: ClientId) {}
    async fn on_offline_message_push(&self, _user_id: &str, _message: &HubMessage) -> bool {
        true
    }
    async fn on_message_send(&self, _message: &HubMessage, _delivered: usize) {}
    async fn on_queue_full(&self, _user_id: &str) {}
}

/// Default callback set: every hook is a no-op and offline messages are
/// always retained.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

#[async_trait]
impl HubCallbacks for NoopCallbacks {}

/// Bound on the duplicate-detection window; older entries are evicted FIFO,
/// matching the same cap-then-evict idiom the offline queue uses.
const SEEN_MESSAGE_CAP: usize = 4096;

/// State owned by the [`WsHub`] agent.
pub struct WsHubState {
    config: Option<WsHubConfig>,
    node_id: Option<NodeId>,
    callbacks: Arc<dyn HubCallbacks>,

    by_client: HashMap<ClientId, HubConnection>,
    by_user: HashMap<String, HashSet<ClientId>>,
    by_ticket: HashMap<String, Vec<ClientId>>,
    agent_clients: HashSet<ClientId>,
    by_channel: HashMap<String, HashSet<ClientId>>,

    nodes: HashMap<NodeId, NodeInfo>,

    offline_queue: HashMap<String, VecDeque<OfflineMessage>>,

    seen_msg_ids: HashSet<String>,
    seen_msg_order: VecDeque<String>,
    last_seq: HashMap<ClientId, u64>,

    #[cfg(feature = "database")]
    db_pool: Option<sqlx::PgPool>,
    #[cfg(feature = "cache")]
    redis_publisher: Option<deadpool_redis::Pool>,
    #[cfg(feature = "cache")]
    redis_url: Option<String>,
}

impl fmt::Debug for WsHubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsHubState")
            .field("node_id", &self.node_id)
            .field("connections", &self.by_client.len())
            .field("users", &self.by_user.len())
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl Default for WsHubState {
    fn default() -> Self {
        Self {
            config: None,
            node_id: None,
            callbacks: Arc::new(NoopCallbacks),
            by_client: HashMap::new(),
            by_user: HashMap::new(),
            by_ticket: HashMap::new(),
            agent_clients: HashSet::new(),
            by_channel: HashMap::new(),
            nodes: HashMap::new(),
            offline_queue: HashMap::new(),
            seen_msg_ids: HashSet::new(),
            seen_msg_order: VecDeque::new(),
            last_seq: HashMap::new(),
            #[cfg(feature = "database")]
            db_pool: None,
            #[cfg(feature = "cache")]
            redis_publisher: None,
            #[cfg(feature = "cache")]
            redis_url: None,
        }
    }
}

impl WsHubState {
    fn load_score(&self) -> f64 {
        let max = self
            .config
            .as_ref()
            .map(|c| c.max_connections)
            .unwrap_or(10_000) as f64;
        if max <= 0.0 {
            return 0.0;
        }
        (self.by_client.len() as f64 / max).min(1.0)
    }

    fn load_threshold(&self) -> f64 {
        self.config.as_ref().map(|c| c.load_threshold).unwrap_or(0.8)
    }

    /// `true` if this `msg_id` has not been seen before (and records it).
    /// Bounds the tracking set so a long-lived hub doesn't grow it forever.
    fn record_seen(&mut self, msg_id: &str) -> bool {
        if self.seen_msg_ids.contains(msg_id) {
            return false;
        }
        if self.seen_msg_order.len() >= SEEN_MESSAGE_CAP {
            if let Some(oldest) = self.seen_msg_order.pop_front() {
                self.seen_msg_ids.remove(&oldest);
            }
        }
        self.seen_msg_ids.insert(msg_id.to_string());
        self.seen_msg_order.push_back(msg_id.to_string());
        true
    }

    /// Assigns the next sequence number for `from` and rejects (`None`) a
    /// message whose caller-supplied `seq_no` is not newer than the last one
    /// accepted from that source.
    fn accept_sequence(&mut self, from: ClientId, seq_no: u64) -> bool {
        let accept = match self.last_seq.get(&from) {
            Some(last) => seq_no > *last,
            None => true,
        };
        if accept {
            self.last_seq.insert(from, seq_no);
        }
        accept
    }

    fn queue_offline(&mut self, user_id: &str, message: HubMessage) -> bool {
        let cap = self
            .config
            .as_ref()
            .map(|c| c.offline_message_cap)
            .unwrap_or(100);
        let queue = self.offline_queue.entry(user_id.to_string()).or_default();
        let was_full = queue.len() >= cap;
        if was_full {
            queue.pop_front();
        }
        queue.push_back(OfflineMessage {
            message,
            queued_at: Utc::now(),
            attempts: 0,
        });
        was_full
    }

    /// Evict an existing connection sharing `ticket_id`, if any, so a
    /// reconnect always replaces rather than duplicates the prior session.
    fn evict_for_ticket(&mut self, ticket_id: &str) -> Vec<ClientId> {
        let Some(existing) = self.by_ticket.remove(ticket_id) else {
            return Vec::new();
        };
        for client_id in &existing {
            self.remove_client(*client_id);
        }
        existing
    }

    fn remove_client(&mut self, client_id: ClientId) -> Option<HubConnection> {
        let conn = self.by_client.remove(&client_id)?;
        if let Some(user_id) = &conn.user_id {
            if let Some(set) = self.by_user.get_mut(user_id) {
                set.remove(&client_id);
                if set.is_empty() {
                    self.by_user.remove(user_id);
                }
            }
        }
        if let Some(ticket_id) = &conn.ticket_id {
            if let Some(clients) = self.by_ticket.get_mut(ticket_id) {
                clients.retain(|c| *c != client_id);
                if clients.is_empty() {
                    self.by_ticket.remove(ticket_id);
                }
            }
        }
        self.agent_clients.remove(&client_id);
        self.last_seq.remove(&client_id);
        Some(conn)
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Register a newly-upgraded connection with the hub.
#[derive(Debug, Clone)]
pub struct RegisterConnection {
    pub connection: HubConnection,
}

/// A connection has closed and must be removed from every index.
#[derive(Debug, Clone, Copy)]
pub struct UnregisterConnection {
    pub client_id: ClientId,
}

/// Bind a `user_id` to an already-registered connection (post-auth).
#[derive(Debug, Clone)]
pub struct AssociateUser {
    pub client_id: ClientId,
    pub user_id: String,
}

/// Bind a reconnect ticket to an already-registered connection.
#[derive(Debug, Clone)]
pub struct AssociateTicket {
    pub client_id: ClientId,
    pub ticket_id: String,
}

/// Join a named channel (room/topic), admission-gated by load score.
#[derive(Debug, Clone)]
pub struct JoinChannel {
    pub client_id: ClientId,
    pub channel: String,
}

/// Leave a named channel.
#[derive(Debug, Clone)]
pub struct LeaveChannel {
    pub client_id: ClientId,
    pub channel: String,
}

/// Deliver a message to one connection by client id.
#[derive(Debug, Clone)]
pub struct SendToClient {
    pub client_id: ClientId,
    pub message: HubMessage,
}

/// Deliver a message to every connection owned by a user id. Falls back to
/// the offline queue when the user has no live connection on this node.
#[derive(Debug, Clone)]
pub struct SendToUser {
    pub user_id: String,
    pub message: HubMessage,
}

/// Fan a message out to every member of a channel.
#[derive(Debug, Clone)]
pub struct BroadcastToChannel {
    pub channel: String,
    pub message: HubMessage,
    pub exclude: Option<ClientId>,
}

/// Route a message using the spec's disambiguation rules: a specific
/// connection, every connection for a user, every connection sharing a
/// reconnect ticket (excluding the sender), or a global broadcast.
#[derive(Debug, Clone)]
pub struct RouteMessage {
    pub target: RouteTarget,
    pub message: HubMessage,
}

/// Drain and deliver any offline-queued messages for a user who just
/// reconnected.
#[derive(Debug, Clone)]
pub struct DrainOffline {
    pub user_id: String,
    pub client_id: ClientId,
}

/// Heartbeat frame received from a live connection; refreshes its
/// `last_heartbeat` so the sweep tick does not evict it.
#[derive(Debug, Clone, Copy)]
pub struct ClientHeartbeat {
    pub client_id: ClientId,
}

/// Heartbeat announcement from a sibling node (via Redis pub/sub in a
/// multi-node deployment, or a direct send in tests).
#[derive(Debug, Clone)]
pub struct NodeHeartbeat {
    pub node_id: NodeId,
    pub connection_count: usize,
    pub load_score: f64,
}

/// A control/fan-out envelope received from a sibling node via Redis.
#[derive(Debug, Clone)]
pub struct NodeEnvelope {
    pub envelope: DistributedMessage,
}

/// Internal tick: sweep nodes whose heartbeat has gone stale.
#[derive(Debug, Clone, Copy)]
pub struct SweepStaleNodes;

/// Internal tick: sweep clients whose heartbeat has gone stale (spec:
/// 90s `clientTimeout`).
#[derive(Debug, Clone, Copy)]
pub struct SweepStaleClients;

/// Internal tick: emit this node's own heartbeat, locally and (if `cache`
/// is enabled) to every sibling node via Redis pub/sub.
#[derive(Debug, Clone, Copy)]
pub struct EmitHeartbeat;

/// Request a snapshot of hub occupancy for health/metrics reporting, and the
/// load-gated admission check the upgrade handler runs before accepting a
/// new connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetHubStats;

/// Snapshot reply for [`GetHubStats`].
#[derive(Debug, Clone)]
pub struct HubStats {
    pub local_connections: usize,
    pub local_channels: usize,
    pub known_nodes: usize,
    pub load_score: f64,
    pub load_threshold: f64,
}

impl HubStats {
    /// Whether the upgrade handler should refuse new connections (spec:
    /// `loadScore >= loadThreshold` -> 503).
    #[must_use]
    pub fn over_loaded(&self) -> bool {
        self.load_score >= self.load_threshold
    }
}

/// Handle to a running hub, shared via `AppState`.
pub type SharedWsHub = Arc<AgentHandle>;

/// Distributed WebSocket hub agent.
pub struct WsHub;

impl WsHub {
    /// Spawn the hub agent and its heartbeat/sweep ticks, with the default
    /// (no-op) callback set. `redis_url` is the dedicated, non-pooled
    /// connection string used for cross-node pub/sub when the `cache`
    /// feature is enabled; pass `None` to run local-only.
    pub async fn spawn(
        runtime: &mut AgentRuntime,
        config: WsHubConfig,
        node_id: NodeId,
        redis_url: Option<String>,
    ) -> anyhow::Result<AgentHandle> {
        Self::spawn_with(runtime, config, node_id, redis_url, Arc::new(NoopCallbacks)).await
    }

    /// Spawn the hub agent with an application-supplied [`HubCallbacks`].
    pub async fn spawn_with(
        runtime: &mut AgentRuntime,
        config: WsHubConfig,
        node_id: NodeId,
        redis_url: Option<String>,
        callbacks: Arc<dyn HubCallbacks>,
    ) -> anyhow::Result<AgentHandle> {
        let mut agent = runtime.new_agent::<WsHubState>();
        agent.model.config = Some(config.clone());
        agent.model.node_id = Some(node_id);
        agent.model.callbacks = callbacks;
        #[cfg(feature = "cache")]
        {
            agent.model.redis_publisher = match &redis_url {
                Some(url) => build_redis_pool(url).ok(),
                None => None,
            };
            agent.model.redis_url = redis_url.clone();
        }

        agent.mutate_on::<RegisterConnection>(|agent, envelope| {
            let conn = envelope.message().connection.clone();
            let client_id = conn.client_id;

            if let Some(max) = agent.model.config.as_ref().map(|c| c.max_connections) {
                if agent.model.by_client.len() >= max {
                    tracing::warn!(client_id = %client_id, "hub at max connections, rejecting registration");
                    return AgentReply::immediate();
                }
            }

            let mut evicted = Vec::new();
            if let Some(ticket_id) = conn.ticket_id.clone() {
                evicted = agent.model.evict_for_ticket(&ticket_id);
            }

            if let Some(user_id) = conn.user_id.clone() {
                agent
                    .model
                    .by_user
                    .entry(user_id)
                    .or_default()
                    .insert(client_id);
            }
            if let Some(ticket_id) = conn.ticket_id.clone() {
                agent.model.by_ticket.entry(ticket_id).or_default().push(client_id);
            }
            if conn.is_agent {
                agent.model.agent_clients.insert(client_id);
            }
            agent.model.by_client.insert(client_id, conn.clone());

            tracing::info!(client_id = %client_id, total = agent.model.by_client.len(), evicted = evicted.len(), "connection registered");

            let callbacks = agent.model.callbacks.clone();
            AgentReply::from_async(async move {
                for client_id in evicted {
                    callbacks.on_client_disconnect(client_id, "replaced").await;
                }
                callbacks.on_client_connect(&conn).await;
            })
        });

        agent.mutate_on::<UnregisterConnection>(|agent, envelope| {
            let client_id = envelope.message().client_id;
            if let Some(conn) = agent.model.by_client.get(&client_id).cloned() {
                for channel in &conn.channels {
                    if let Some(members) = agent.model.by_channel_mut(channel) {
                        members.remove(&client_id);
                    }
                }
                agent.model.remove_client(client_id);
                tracing::info!(client_id = %client_id, "connection unregistered");
                let callbacks = agent.model.callbacks.clone();
                return AgentReply::from_async(async move {
                    callbacks.on_client_disconnect(client_id, "closed").await;
                });
            }
            AgentReply::immediate()
        });

        agent.mutate_on::<AssociateUser>(|agent, envelope| {
            let msg = envelope.message();
            if agent.model.by_client.contains_key(&msg.client_id) {
                agent
                    .model
                    .by_user
                    .entry(msg.user_id.clone())
                    .or_default()
                    .insert(msg.client_id);
                if let Some(conn) = agent.model.by_client.get_mut(&msg.client_id) {
                    conn.user_id = Some(msg.user_id.clone());
                }
            }
            AgentReply::immediate()
        });

        agent.mutate_on::<AssociateTicket>(|agent, envelope| {
            let msg = envelope.message();
            if agent.model.by_client.contains_key(&msg.client_id) {
                let evicted = agent.model.evict_for_ticket(&msg.ticket_id);
                agent
                    .model
                    .by_ticket
                    .entry(msg.ticket_id.clone())
                    .or_default()
                    .push(msg.client_id);
                if let Some(conn) = agent.model.by_client.get_mut(&msg.client_id) {
                    conn.ticket_id = Some(msg.ticket_id.clone());
                }
                if !evicted.is_empty() {
                    let callbacks = agent.model.callbacks.clone();
                    return AgentReply::from_async(async move {
                        for client_id in evicted {
                            callbacks.on_client_disconnect(client_id, "replaced").await;
                        }
                    });
                }
            }
            AgentReply::immediate()
        });

        agent.mutate_on::<JoinChannel>(|agent, envelope| {
            let msg = envelope.message();
            let threshold = agent.model.load_threshold();
            if agent.model.load_score() > threshold {
                tracing::warn!(
                    channel = %msg.channel,
                    load = agent.model.load_score(),
                    "rejecting channel join, node above load threshold"
                );
                return AgentReply::immediate();
            }
            if let Some(conn) = agent.model.by_client.get_mut(&msg.client_id) {
                conn.channels.insert(msg.channel.clone());
            }
            agent
                .model
                .by_channel
                .entry(msg.channel.clone())
                .or_default()
                .insert(msg.client_id);
            AgentReply::immediate()
        });

        agent.mutate_on::<LeaveChannel>(|agent, envelope| {
            let msg = envelope.message();
            if let Some(conn) = agent.model.by_client.get_mut(&msg.client_id) {
                conn.channels.remove(&msg.channel);
            }
            if let Some(members) = agent.model.by_channel.get_mut(&msg.channel) {
                members.remove(&msg.client_id);
                if members.is_empty() {
                    agent.model.by_channel.remove(&msg.channel);
                }
            }
            AgentReply::immediate()
        });

        agent.mutate_on::<ClientHeartbeat>(|agent, envelope| {
            let client_id = envelope.message().client_id;
            if let Some(conn) = agent.model.by_client.get_mut(&client_id) {
                conn.last_heartbeat = Utc::now();
            }
            AgentReply::immediate()
        });

        agent.act_on::<SendToClient>(|agent, envelope| {
            let msg = envelope.message();
            let sender = agent.model.by_client.get(&msg.client_id).map(|c| c.sender.clone());
            let message = msg.message.clone();
            let callbacks = agent.model.callbacks.clone();
            AgentReply::from_async(async move {
                callbacks.on_message_received(&message).await;
                let delivered = if let Some(sender) = sender {
                    sender.send(message.payload.clone()).await.is_ok() as usize
                } else {
                    0
                };
                callbacks.on_message_send(&message, delivered).await;
            })
        });

        agent.act_on::<SendToUser>(|agent, envelope| {
            let msg = envelope.message();
            let senders: Vec<_> = agent
                .model
                .by_user
                .get(&msg.user_id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| agent.model.by_client.get(id))
                        .map(|c| c.sender.clone())
                        .collect()
                })
                .unwrap_or_default();

            let user_id = msg.user_id.clone();
            let message = msg.message.clone();
            let callbacks = agent.model.callbacks.clone();

            if senders.is_empty() {
                let was_full = agent.model.queue_offline(&user_id, message.clone());
                return AgentReply::from_async(async move {
                    let retain = callbacks.on_offline_message_push(&user_id, &message).await;
                    if was_full && retain {
                        callbacks.on_queue_full(&user_id).await;
                    }
                });
            }

            AgentReply::from_async(async move {
                callbacks.on_message_received(&message).await;
                let mut delivered = 0;
                for sender in senders {
                    if sender.send(message.payload.clone()).await.is_ok() {
                        delivered += 1;
                    }
                }
                callbacks.on_message_send(&message, delivered).await;
            })
        });

        agent.act_on::<BroadcastToChannel>(|agent, envelope| {
            let msg = envelope.message();
            let senders: Vec<_> = agent
                .model
                .by_channel
                .get(&msg.channel)
                .map(|ids| {
                    ids.iter()
                        .filter(|id| msg.exclude.map(|ex| **id != ex).unwrap_or(true))
                        .filter_map(|id| agent.model.by_client.get(id))
                        .map(|c| c.sender.clone())
                        .collect()
                })
                .unwrap_or_default();

            let message = msg.message.clone();
            let channel = msg.channel.clone();
            let callbacks = agent.model.callbacks.clone();
            AgentReply::from_async(async move {
                callbacks.on_message_received(&message).await;
                let mut sent = 0;
                for sender in &senders {
                    if sender.send(message.payload.clone()).await.is_ok() {
                        sent += 1;
                    }
                }
                tracing::debug!(channel = %channel, sent, total = senders.len(), "channel broadcast completed");
                callbacks.on_message_send(&message, sent).await;
            })
        });

        // Unified router implementing the spec's four disambiguation rules,
        // with duplicate detection by `msg_id` and per-source sequencing.
        agent.act_on::<RouteMessage>(|agent, envelope| {
            let routed = envelope.message();
            let mut message = routed.message.clone();

            if !agent.model.record_seen(&message.msg_id) {
                tracing::debug!(msg_id = %message.msg_id, "dropping duplicate message");
                return AgentReply::immediate();
            }
            if let Some(from) = message.from {
                if !agent.model.accept_sequence(from, message.seq_no) {
                    tracing::debug!(msg_id = %message.msg_id, "dropping out-of-order message");
                    return AgentReply::immediate();
                }
            }

            let callbacks = agent.model.callbacks.clone();
            let senders: Vec<mpsc::Sender<Message>> = match &routed.target {
                RouteTarget::Client(client_id) => agent
                    .model
                    .by_client
                    .get(client_id)
                    .map(|c| vec![c.sender.clone()])
                    .unwrap_or_default(),
                RouteTarget::User(user_id) => agent
                    .model
                    .by_user
                    .get(user_id)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(|id| agent.model.by_client.get(id))
                            .map(|c| c.sender.clone())
                            .collect()
                    })
                    .unwrap_or_default(),
                RouteTarget::Ticket(ticket_id) => agent
                    .model
                    .by_ticket
                    .get(ticket_id)
                    .map(|ids| {
                        ids.iter()
                            .filter(|id| message.from.map(|from| **id != from).unwrap_or(true))
                            .filter_map(|id| agent.model.by_client.get(id))
                            .map(|c| c.sender.clone())
                            .collect()
                    })
                    .unwrap_or_default(),
                RouteTarget::All => agent
                    .model
                    .by_client
                    .values()
                    .filter(|c| message.from.map(|from| c.client_id != from).unwrap_or(true))
                    .map(|c| c.sender.clone())
                    .collect(),
            };

            message.status = if senders.is_empty() {
                MessageStatus::Failed
            } else {
                MessageStatus::Delivered
            };

            AgentReply::from_async(async move {
                callbacks.on_message_received(&message).await;
                let mut delivered = 0;
                for sender in &senders {
                    if sender.send(message.payload.clone()).await.is_ok() {
                        delivered += 1;
                    }
                }
                callbacks.on_message_send(&message, delivered).await;
            })
        });

        agent.act_on::<DrainOffline>(|agent, envelope| {
            let msg = envelope.message();
            let max_attempts = agent
                .model
                .config
                .as_ref()
                .map(|c| c.offline_delivery_attempts)
                .unwrap_or(3);

            let sender = agent.model.by_client.get(&msg.client_id).map(|c| c.sender.clone());
            let pending: Vec<HubMessage> = agent
                .model
                .offline_queue
                .remove(&msg.user_id)
                .map(|q| q.into_iter().filter(|m| m.attempts < max_attempts).map(|m| m.message).collect())
                .unwrap_or_default();

            let callbacks = agent.model.callbacks.clone();
            AgentReply::from_async(async move {
                if let Some(sender) = sender {
                    for message in pending {
                        let delivered = sender.send(message.payload.clone()).await.is_ok() as usize;
                        callbacks.on_message_send(&message, delivered).await;
                    }
                }
            })
        });

        agent.mutate_on::<NodeHeartbeat>(|agent, envelope| {
            let msg = envelope.message();
            agent.model.nodes.insert(
                msg.node_id,
                NodeInfo {
                    node_id: msg.node_id,
                    connection_count: msg.connection_count,
                    load_score: msg.load_score,
                    last_heartbeat: Utc::now(),
                },
            );
            AgentReply::immediate()
        });

        agent.act_on::<NodeEnvelope>(|agent, envelope| {
            let incoming = envelope.message().envelope.clone();
            // Never process our own published envelope if Redis echoes it back.
            if Some(incoming.node_id) == agent.model.node_id {
                return AgentReply::immediate();
            }
            match incoming.op {
                DistributedOp::Heartbeat { connection_count, load_score } => {
                    agent.model.nodes.insert(
                        incoming.node_id,
                        NodeInfo {
                            node_id: incoming.node_id,
                            connection_count,
                            load_score,
                            last_heartbeat: Utc::now(),
                        },
                    );
                    AgentReply::immediate()
                }
                DistributedOp::Message { target, message } => {
                    if !agent.model.record_seen(&message.msg_id) {
                        return AgentReply::immediate();
                    }
                    let senders: Vec<_> = match &target {
                        DistributedTarget::User(user_id) => agent
                            .model
                            .by_user
                            .get(user_id)
                            .map(|ids| {
                                ids.iter()
                                    .filter_map(|id| agent.model.by_client.get(id))
                                    .map(|c| c.sender.clone())
                                    .collect()
                            })
                            .unwrap_or_default(),
                        DistributedTarget::Ticket(ticket_id) => agent
                            .model
                            .by_ticket
                            .get(ticket_id)
                            .map(|ids| {
                                ids.iter()
                                    .filter_map(|id| agent.model.by_client.get(id))
                                    .map(|c| c.sender.clone())
                                    .collect()
                            })
                            .unwrap_or_default(),
                        DistributedTarget::All => {
                            agent.model.by_client.values().map(|c| c.sender.clone()).collect()
                        }
                    };
                    AgentReply::from_async(async move {
                        for sender in senders {
                            let _ = sender.send(message.payload.clone()).await;
                        }
                    })
                }
                DistributedOp::Sync => AgentReply::immediate(),
            }
        });

        agent.mutate_on::<SweepStaleNodes>(|agent, _envelope| {
            let timeout = agent
                .model
                .config
                .as_ref()
                .map(|c| c.node_timeout())
                .unwrap_or(std::time::Duration::from_secs(30));
            let now = Utc::now();
            let before = agent.model.nodes.len();
            agent.model.nodes.retain(|_, node| {
                now.signed_duration_since(node.last_heartbeat)
                    .to_std()
                    .map(|elapsed| elapsed < timeout)
                    .unwrap_or(true)
            });
            let removed = before - agent.model.nodes.len();
            if removed > 0 {
                tracing::info!(removed, "swept stale nodes from registry");
            }
            AgentReply::immediate()
        });

        agent.mutate_on::<SweepStaleClients>(|agent, _envelope| {
            let timeout = agent
                .model
                .config
                .as_ref()
                .map(|c| c.client_timeout())
                .unwrap_or(std::time::Duration::from_secs(90));
            let now = Utc::now();
            let stale: Vec<ClientId> = agent
                .model
                .by_client
                .values()
                .filter(|conn| {
                    now.signed_duration_since(conn.last_heartbeat)
                        .to_std()
                        .map(|elapsed| elapsed >= timeout)
                        .unwrap_or(false)
                })
                .map(|conn| conn.client_id)
                .collect();

            for client_id in &stale {
                agent.model.remove_client(*client_id);
            }
            if !stale.is_empty() {
                tracing::info!(count = stale.len(), "evicted clients on heartbeat timeout");
            }

            let callbacks = agent.model.callbacks.clone();
            AgentReply::from_async(async move {
                for client_id in stale {
                    callbacks.on_heartbeat_timeout(client_id).await;
                }
            })
        });

        agent.act_on::<GetHubStats>(|agent, envelope| {
            let reply = envelope.reply_envelope();
            let stats = HubStats {
                local_connections: agent.model.by_client.len(),
                local_channels: agent.model.by_channel.len(),
                known_nodes: agent.model.nodes.len(),
                load_score: agent.model.load_score(),
                load_threshold: agent.model.load_threshold(),
            };
            AgentReply::from_async(async move {
                reply.send(stats).await;
            })
        });

        agent.after_start(|agent| {
            let handle = agent.handle().clone();
            let sweep_interval = agent
                .model
                .config
                .as_ref()
                .map(|c| c.sweep_interval())
                .unwrap_or(std::time::Duration::from_secs(30));
            let heartbeat_interval = agent
                .model
                .config
                .as_ref()
                .map(|c| c.node_heartbeat())
                .unwrap_or(std::time::Duration::from_secs(10));
            let client_timeout = agent
                .model
                .config
                .as_ref()
                .map(|c| c.client_timeout())
                .unwrap_or(std::time::Duration::from_secs(90));

            tokio::spawn({
                let handle = handle.clone();
                async move {
                    let mut ticker = tokio::time::interval(sweep_interval);
                    loop {
                        ticker.tick().await;
                        handle.send(SweepStaleNodes).await;
                    }
                }
            });

            tokio::spawn({
                let handle = handle.clone();
                async move {
                    // Sweep at half the client timeout so no client survives
                    // more than 1.5x its configured timeout before eviction.
                    let mut ticker = tokio::time::interval(client_timeout / 2);
                    loop {
                        ticker.tick().await;
                        handle.send(SweepStaleClients).await;
                    }
                }
            });

            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(heartbeat_interval);
                loop {
                    ticker.tick().await;
                    handle.send(EmitHeartbeat).await;
                }
            });

            #[cfg(feature = "cache")]
            {
                let redis_url = agent.model.redis_url.clone();
                let channel = agent
                    .model
                    .config
                    .as_ref()
                    .map(|c| c.redis_channel.clone())
                    .unwrap_or_default();
                let self_handle = agent.handle().clone();
                if let Some(redis_url) = redis_url {
                    tokio::spawn(async move {
                        crate::websocket::hub::run_redis_subscriber(redis_url, channel, self_handle).await;
                    });
                }
            }

            tracing::info!("websocket hub started");
            AgentReply::immediate()
        });

        agent.mutate_on::<EmitHeartbeat>(|agent, _envelope| {
            let Some(node_id) = agent.model.node_id else {
                return AgentReply::immediate();
            };
            let connection_count = agent.model.by_client.len();
            let load_score = agent.model.load_score();
            tracing::trace!(node_id = %node_id, connections = connection_count, load = load_score, "emitting local heartbeat");

            #[cfg(feature = "cache")]
            {
                let pool = agent.model.redis_publisher.clone();
                let channel = agent
                    .model
                    .config
                    .as_ref()
                    .map(|c| c.redis_channel.clone())
                    .unwrap_or_default();
                return AgentReply::from_async(async move {
                    if let Some(pool) = pool {
                        let envelope = DistributedMessage {
                            node_id,
                            op: DistributedOp::Heartbeat { connection_count, load_score },
                        };
                        publish_envelope(&pool, &channel, &envelope).await;
                    }
                });
            }

            #[cfg(not(feature = "cache"))]
            AgentReply::immediate()
        });

        agent.before_stop(|agent| {
            let connections = agent.model.by_client.len();
            tracing::info!(connections, "websocket hub shutting down");
            AgentReply::immediate()
        });

        let handle = agent.start().await;
        Ok(handle)
    }
}

impl WsHubState {
    fn by_channel_mut(&mut self, channel: &str) -> Option<&mut HashSet<ClientId>> {
        self.by_channel.get_mut(channel)
    }
}

/// Build the dedicated publisher pool for this hub's Redis connection.
/// Kept separate from any application connection pool for the same reason
/// `run_redis_subscriber` opens its own client: pub/sub and pooled
/// request/response connections have different lifecycles.
#[cfg(feature = "cache")]
fn build_redis_pool(redis_url: &str) -> anyhow::Result<deadpool_redis::Pool> {
    let cfg = deadpool_redis::Config::from_url(redis_url);
    let pool = cfg
        .builder()?
        .runtime(deadpool_redis::Runtime::Tokio1)
        .build()?;
    Ok(pool)
}

/// Publish a [`DistributedMessage`] to the cross-node Redis channel. Kept as
/// a free function (rather than inline in the heartbeat handler) so the
/// per-message `RouteMessage` path can reuse it once cross-node unicast is
/// wired by a caller that holds a `redis_publisher` handle.
#[cfg(feature = "cache")]
async fn publish_envelope(pool: &deadpool_redis::Pool, channel: &str, envelope: &DistributedMessage) {
    use deadpool_redis::redis::AsyncCommands;

    let Ok(mut conn) = pool.get().await else {
        tracing::warn!("redis pool exhausted, dropping hub heartbeat publish");
        return;
    };
    let payload = encode_envelope(envelope);
    if let Err(e) = conn.publish::<_, _, ()>(channel, payload).await {
        tracing::warn!(error = %e, "failed to publish hub envelope to redis");
    }
}

/// Hub envelopes are small and internal to this node pool, so they're
/// encoded as a pipe-delimited line rather than pulling in a serialization
/// crate purely for this one pub/sub payload.
#[cfg(feature = "cache")]
fn encode_envelope(envelope: &DistributedMessage) -> String {
    match &envelope.op {
        DistributedOp::Heartbeat { connection_count, load_score } => {
            format!("{}|heartbeat|{}|{}", envelope.node_id, connection_count, load_score)
        }
        DistributedOp::Message { .. } => format!("{}|message", envelope.node_id),
        DistributedOp::Sync => format!("{}|sync", envelope.node_id),
    }
}

#[cfg(feature = "cache")]
fn decode_heartbeat(node_id: NodeId, line: &str) -> Option<DistributedMessage> {
    let mut parts = line.splitn(2, '|');
    let connection_count: usize = parts.next()?.parse().ok()?;
    let load_score: f64 = parts.next()?.parse().ok()?;
    Some(DistributedMessage {
        node_id,
        op: DistributedOp::Heartbeat { connection_count, load_score },
    })
}

/// Own, non-pooled Redis connection dedicated to pub/sub — pooled
/// connections cannot enter subscribe mode, the same reason
/// `agents/pool.rs::RedisPoolAgent` keeps its pool separate from any
/// subscription use. Reconnects with a bounded backoff on disconnect and
/// degrades to local-only fan-out in between, per the spec's error-handling
/// policy for this path.
#[cfg(feature = "cache")]
async fn run_redis_subscriber(redis_url: String, channel: String, handle: AgentHandle) {
    use deadpool_redis::redis::AsyncCommands;

    loop {
        let client = match deadpool_redis::redis::Client::open(redis_url.clone()) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "invalid redis pub/sub url, hub running local-only");
                return;
            }
        };

        let pubsub = match client.get_async_pubsub().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "hub pub/sub connection failed, retrying in 5s");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                continue;
            }
        };

        let mut pubsub = pubsub;
        if let Err(e) = pubsub.subscribe(&channel).await {
            tracing::warn!(error = %e, "failed to subscribe to hub channel, retrying in 5s");
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            continue;
        }

        tracing::info!(channel = %channel, "hub subscribed to cross-node channel");
        let mut stream = pubsub.on_message();
        use futures::StreamExt;
        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(_) => continue,
            };
            let mut parts = payload.splitn(3, '|');
            let Some(node_str) = parts.next() else { continue };
            let Ok(node_id) = node_str.parse::<NodeId>() else { continue };
            let Some(kind) = parts.next() else { continue };
            let rest = parts.next().unwrap_or_default();
            let envelope = match kind {
                "heartbeat" => decode_heartbeat(node_id, rest),
                _ => None,
            };
            if let Some(envelope) = envelope {
                handle.send(NodeEnvelope { envelope }).await;
            }
        }

        tracing::warn!("hub pub/sub stream ended, reconnecting in 5s");
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_is_unique() {
        assert_ne!(ClientId::new(), ClientId::new());
    }

    #[test]
    fn load_score_scales_with_capacity() {
        let mut state = WsHubState::default();
        state.config = Some(WsHubConfig {
            max_connections: 2,
            ..WsHubConfig::default()
        });
        let (tx, _rx) = mpsc::channel(4);
        state.by_client.insert(ClientId::new(), HubConnection::new(ClientId::new(), tx));
        assert_eq!(state.load_score(), 0.5);
    }

    #[test]
    fn offline_queue_respects_cap() {
        let mut state = WsHubState::default();
        state.config = Some(WsHubConfig {
            offline_message_cap: 2,
            ..WsHubConfig::default()
        });
        for i in 0..5 {
            let (_tx, _rx) = mpsc::channel::<Message>(1);
            state.queue_offline(
                "user-1",
                HubMessage::new(None, Message::Text(format!("msg-{i}").into())),
            );
        }
        assert_eq!(state.offline_queue.get("user-1").unwrap().len(), 2);
    }

    #[test]
    fn duplicate_msg_id_is_rejected() {
        let mut state = WsHubState::default();
        assert!(state.record_seen("abc"));
        assert!(!state.record_seen("abc"));
    }

    #[test]
    fn out_of_order_sequence_is_rejected() {
        let mut state = WsHubState::default();
        let client = ClientId::new();
        assert!(state.accept_sequence(client, 1));
        assert!(state.accept_sequence(client, 2));
        assert!(!state.accept_sequence(client, 2));
        assert!(!state.accept_sequence(client, 1));
    }

    #[test]
    fn ticket_reconnect_evicts_prior_connection() {
        let mut state = WsHubState::default();
        let (tx, _rx) = mpsc::channel(4);
        let first = ClientId::new();
        let mut conn = HubConnection::new(first, tx);
        conn.ticket_id = Some("ticket-1".to_string());
        state.by_client.insert(first, conn);
        state.by_ticket.insert("ticket-1".to_string(), vec![first]);

        let evicted = state.evict_for_ticket("ticket-1");
        assert_eq!(evicted, vec![first]);
        assert!(!state.by_client.contains_key(&first));
        assert!(!state.by_ticket.contains_key("ticket-1"));
    }
}
