//! The session state machine, its reader/writer tasks, and the public
//! client API (§4.4).

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tio_core::{
    Environment, ProtocolState, Row, RpcDescriptor, env::SystemEnvironment, metadata::rpc_flags,
};
use tio_proto::{
    PacketType, Payload, RawPacket, RpcErrorCode, RpcMethod, RpcReply, RpcRequest, TypeTag, Value,
};
use tokio::{
    sync::{Mutex, RwLock, mpsc, oneshot},
    task::AbortHandle,
};
use tracing::{debug, info, warn};

use crate::{cache, config::SessionConfig, error::SessionError, queue::DropOldestQueue, transport::Connection, url};

/// A session's lifecycle state (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The transport is being opened.
    Connecting,
    /// `dev.desc` has been requested; the cache is being consulted.
    Handshake,
    /// Cold enumeration: walking `rpc.list`/`rpc.listinfo` and waiting for a
    /// stream descriptor.
    Enumerating,
    /// Steady state: reader/writer tasks are running, callers can issue
    /// RPCs and read samples.
    Running,
    /// The transport was lost; the session is dead (no reconnection — §1
    /// Non-goals).
    Failed,
}

struct PendingRpc {
    request_id: u16,
    reply_tx: oneshot::Sender<RpcOutcome>,
}

enum RpcOutcome {
    Reply(Bytes),
    Error(RpcErrorCode),
}

/// A live session bound to one device or routed child (§4.4).
///
/// Generic over [`Environment`] so tests can drive it against a
/// [`tio_core::env::test_utils::MockEnv`] instead of the wall clock; ordinary
/// callers use the `SystemEnvironment`-flavored [`Session::open`].
pub struct Session<E: Environment = SystemEnvironment> {
    env: E,
    config: SessionConfig,
    routing: Bytes,
    state: Arc<RwLock<State>>,
    protocol: Arc<Mutex<ProtocolState>>,
    pub_queue: Arc<DropOldestQueue<Row>>,
    pending_rpc: Arc<Mutex<Option<PendingRpc>>>,
    router_tx: Arc<Mutex<Option<mpsc::Sender<RawPacket>>>>,
    req_tx: mpsc::Sender<RawPacket>,
    rpc_gate: Mutex<()>,
    transport_tasks: Vec<AbortHandle>,
    reader_task: AbortHandle,
    writer_task: AbortHandle,
}

impl Session<SystemEnvironment> {
    /// Parse `url` and open a session against it, using the real clock and
    /// RNG (§6).
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidUrl`] if `url` doesn't parse; otherwise
    /// whatever [`Session::attach`]'s handshake can fail with.
    pub async fn open(url: &str, config: SessionConfig) -> Result<Self, SessionError> {
        Self::open_with_env(url, config, SystemEnvironment).await
    }
}

impl<E: Environment> Session<E> {
    /// [`Session::open`], generalized over the environment — the
    /// construction path a router uses for `router://interthread/` children
    /// never goes through here, since they already have a live
    /// [`Connection`] (§11.5).
    ///
    /// # Errors
    ///
    /// Propagates URL parse errors, transport-open errors, and handshake
    /// errors.
    pub async fn open_with_env(url: &str, config: SessionConfig, env: E) -> Result<Self, SessionError> {
        let target = url::parse(url)?;
        let routing = target.routing().to_vec();
        let connection = Connection::open(&target, &config.serial).await?;
        Self::attach(connection, routing, config, env).await
    }

    /// Bind a session to an already-open [`Connection`] and run its
    /// handshake to completion (§4.4 `Connecting` → `Handshake` →
    /// `Enumerating` → `Running`).
    ///
    /// The entry point a [`crate::url::ConnectTarget::Router`] child uses,
    /// handed a [`Connection::from_channels`] virtual transport instead of
    /// real I/O (§4.5, §11.5).
    ///
    /// # Errors
    ///
    /// [`SessionError::Transport`]/[`SessionError::Framing`]/
    /// [`SessionError::Protocol`]/[`SessionError::State`] if the handshake
    /// RPCs fail or the device's replies are malformed; [`SessionError::RpcTimeout`]
    /// if `dev.desc` never answers.
    pub async fn attach(
        connection: Connection,
        routing: Vec<u8>,
        config: SessionConfig,
        env: E,
    ) -> Result<Self, SessionError> {
        let (to_transport, from_transport, transport_tasks) = connection.into_parts();
        let routing = Bytes::from(routing);

        let state = Arc::new(RwLock::new(State::Connecting));
        let protocol = Arc::new(Mutex::new(ProtocolState::new()));
        let pub_queue = Arc::new(DropOldestQueue::new(config.pub_queue_capacity));
        let pending_rpc = Arc::new(Mutex::new(None));
        let router_tx = Arc::new(Mutex::new(None));
        let (req_tx, req_rx) = mpsc::channel(config.req_queue_capacity.max(1));

        let reader_task = tokio::spawn(run_reader(
            from_transport,
            routing.clone(),
            Arc::clone(&protocol),
            Arc::clone(&pub_queue),
            Arc::clone(&pending_rpc),
            Arc::clone(&router_tx),
            Arc::clone(&state),
        ));
        let writer_task = tokio::spawn(run_writer(
            req_rx,
            to_transport,
            env.clone(),
            config.heartbeat_interval,
            routing.clone(),
        ));

        let session = Self {
            env,
            config,
            routing,
            state,
            protocol,
            pub_queue,
            pending_rpc,
            router_tx,
            req_tx,
            rpc_gate: Mutex::new(()),
            transport_tasks,
            reader_task: reader_task.abort_handle(),
            writer_task: writer_task.abort_handle(),
        };

        session.handshake_and_enumerate().await?;
        Ok(session)
    }

    /// Wire a router's demux channel so packets whose routing doesn't match
    /// this session get forwarded to the router instead of logged and
    /// dropped (§4.5, §11.5).
    pub async fn set_router(&self, router_tx: mpsc::Sender<RawPacket>) {
        *self.router_tx.lock().await = Some(router_tx);
    }

    /// This session's routing prefix.
    #[must_use]
    pub fn routing(&self) -> &[u8] {
        &self.routing
    }

    /// A clone of this session's outbound channel.
    ///
    /// A routing demultiplexer hands this to a child session as its virtual
    /// transport's send half, so the child's packets (already
    /// tagged with the child's own routing prefix by its own `encode`) flow
    /// out through this session's one physical writer task rather than
    /// opening a transport of their own (§4.5: "children send through the
    /// parent").
    #[must_use]
    pub fn raw_outbound(&self) -> mpsc::Sender<RawPacket> {
        self.req_tx.clone()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> State {
        *self.state.read().await
    }

    /// Column names for the live stream, in schema order (§3).
    pub async fn column_names(&self) -> Vec<String> {
        self.protocol.lock().await.column_names()
    }

    /// Effective sample rate, in Hz, for `source_name`'s columns (§3).
    pub async fn rate_for(&self, source_name: &str) -> Option<f64> {
        self.protocol.lock().await.rate_for(source_name)
    }

    /// Whether `stream_read*` should stamp rows with `t = stream_start_time
    /// + sample_number / rate` (§4.3).
    ///
    /// A stream synchronizer turns this on before reading from a session it
    /// drives, since aligning handles to a common time axis needs every row
    /// timestamped (§4.6).
    pub async fn set_time_axis(&self, enabled: bool) {
        self.protocol.lock().await.set_time_axis(enabled);
    }

    /// Call `topic` with `args` and wait for its reply (§4.4).
    ///
    /// Concurrent callers are serialized through an internal gate — this
    /// session's `req_queue`/`rep_queue` each hold one in-flight RPC, so a
    /// second call waits for the first to resolve rather than racing it
    /// (§9 "concurrent rpc calls" is unspecified upstream; this crate picks
    /// serialization over undefined interleaving).
    ///
    /// # Errors
    ///
    /// [`SessionError::RpcTimeout`] if no reply arrives within
    /// `config.rpc_timeout`; [`SessionError::RpcError`] if the device
    /// replies with an `RPC_ERROR`; [`SessionError::NotRunning`] if the
    /// writer task has already stopped (a dead transport).
    pub async fn rpc(&self, topic: &str, args: impl Into<Bytes>) -> Result<Bytes, SessionError> {
        let _gate = self.rpc_gate.lock().await;
        let request_id = self.env.random_u16();
        let (reply_tx, reply_rx) = oneshot::channel();
        *self.pending_rpc.lock().await = Some(PendingRpc { request_id, reply_tx });

        let request =
            RpcRequest { request_id, method: RpcMethod::Named(topic.to_string()), args: args.into() };
        let packet = self.encode(Payload::RpcReq(request))?;
        if self.req_tx.send(packet).await.is_err() {
            self.pending_rpc.lock().await.take();
            return Err(SessionError::NotRunning("writer task has stopped"));
        }

        let outcome = tokio::select! {
            result = reply_rx => {
                result.map_err(|_| SessionError::NotRunning("session reader has stopped"))?
            },
            () = self.env.sleep(self.config.rpc_timeout) => {
                self.pending_rpc.lock().await.take();
                return Err(SessionError::RpcTimeout { topic: topic.to_string() });
            },
        };

        match outcome {
            RpcOutcome::Reply(payload) => Ok(payload),
            RpcOutcome::Error(code) => Err(SessionError::RpcError { topic: topic.to_string(), code }),
        }
    }

    /// [`Session::rpc`], marshaling `value` to bytes before the call and the
    /// reply back to a [`Value`] of `reply_type` afterward (§4.4, §6).
    ///
    /// Returns `Ok(None)` if the reply payload was empty (a write-only RPC
    /// called for effect, or a read that returned nothing).
    ///
    /// # Errors
    ///
    /// Everything [`Session::rpc`] can fail with, plus
    /// [`SessionError::Protocol`] if the reply doesn't decode as
    /// `reply_type`.
    pub async fn rpc_typed(
        &self,
        topic: &str,
        reply_type: TypeTag,
        value: Option<Value>,
    ) -> Result<Option<Value>, SessionError> {
        let args = value.map(|v| Bytes::from(v.to_bytes())).unwrap_or_default();
        let reply = self.rpc(topic, args).await?;
        if reply.is_empty() {
            return Ok(None);
        }
        Ok(Some(Value::from_bytes(reply_type, &reply)?))
    }

    /// Enable or disable (or just query, with `active: None`) a source's
    /// `<topic>.data.active` flag (§4.4).
    ///
    /// # Errors
    ///
    /// Whatever [`Session::rpc_typed`] can fail with.
    pub async fn source_active(&self, topic: &str, active: Option<bool>) -> Result<bool, SessionError> {
        let path = format!("{topic}.data.active");
        let value = active.map(|on| Value::U8(u8::from(on)));
        let reply = self.rpc_typed(&path, TypeTag::U8, value).await?;
        Ok(matches!(reply, Some(Value::U8(flag)) if flag != 0))
    }

    /// Pop rows off the publish queue, optionally discarding whatever was
    /// already queued first (§4.4 `stream_read`).
    ///
    /// If `duration` is given, `samples` is ignored and the row count is
    /// instead derived from the current stream's row rate (`duration *
    /// rate`, rounded to the nearest sample).
    pub async fn stream_read(
        &self,
        samples: usize,
        duration: Option<Duration>,
        flush: bool,
    ) -> Vec<Row> {
        if flush {
            self.pub_queue.clear().await;
        }
        let samples = match duration {
            Some(duration) => self.samples_for_duration(duration).await.unwrap_or(samples),
            None => samples,
        };
        let mut rows = Vec::with_capacity(samples);
        for _ in 0..samples {
            rows.push(self.pub_queue.pop().await);
        }
        rows
    }

    /// Row count equivalent to `duration` at the current stream's row rate,
    /// or `None` if no stream schema has compiled yet.
    async fn samples_for_duration(&self, duration: Duration) -> Option<usize> {
        let schema = self.protocol.lock().await.schemas().current()?;
        let rate_hz = 1e6 / schema.sample_period_us;
        #[allow(clippy::cast_sign_loss)]
        Some((duration.as_secs_f64() * rate_hz).round() as usize)
    }

    /// [`Session::stream_read`], projected down to just `topic`'s columns
    /// (§4.4 `stream_read_topic`).
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownTopic`] if `topic` isn't a known source;
    /// [`SessionError::NotRunning`] if no stream schema has compiled yet.
    pub async fn stream_read_topic(
        &self,
        topic: &str,
        samples: usize,
        duration: Option<Duration>,
    ) -> Result<Vec<Row>, SessionError> {
        let indices = {
            let protocol = self.protocol.lock().await;
            let schema = protocol
                .schemas()
                .current()
                .ok_or(SessionError::NotRunning("no stream schema compiled yet"))?;
            let source = protocol
                .metadata()
                .source_by_name(topic)
                .ok_or_else(|| SessionError::UnknownTopic(topic.to_string()))?;
            schema
                .columns
                .iter()
                .enumerate()
                .filter(|(_, col)| col.source_id == source.source_id)
                .map(|(index, _)| index)
                .collect::<Vec<_>>()
        };

        let samples = match duration {
            Some(duration) => {
                let rate_hz = self.rate_for(topic).await.unwrap_or(0.0);
                #[allow(clippy::cast_sign_loss)]
                let derived = (duration.as_secs_f64() * rate_hz).round() as usize;
                derived
            },
            None => samples,
        };

        let rows = self.stream_read(samples, None, false).await;
        Ok(rows
            .into_iter()
            .map(|row| Row {
                time: row.time,
                cells: indices.iter().filter_map(|&index| row.cells.get(index).cloned()).collect(),
            })
            .collect())
    }

    fn encode(&self, payload: Payload) -> Result<RawPacket, SessionError> {
        RawPacket::new(payload.kind().to_u8(), self.routing.clone(), payload.encode().freeze())
            .map_err(SessionError::Framing)
    }

    /// `Handshake` then (cold only) `Enumerating`, per §4.4's state diagram.
    async fn handshake_and_enumerate(&self) -> Result<(), SessionError> {
        *self.state.write().await = State::Handshake;
        let description_bytes = self.rpc("dev.desc", Bytes::new()).await?;
        let description = String::from_utf8_lossy(&description_bytes).into_owned();

        let mut cache_hit = false;
        if self.config.use_state_cache {
            if let Some(cached) = cache::load(&description) {
                self.protocol.lock().await.load_metadata(cached);
                cache_hit = true;
                info!(%description, "loaded cached protocol state");
            }
        }

        if let Err(err) = self.rpc("data.send_all", Bytes::new()).await {
            warn!(error = %err, "data.send_all failed during handshake");
        }

        if !cache_hit {
            *self.state.write().await = State::Enumerating;
            self.enumerate_rpcs().await?;
            self.wait_for_stream_descriptor().await;
            if self.config.use_state_cache {
                let metadata = self.protocol.lock().await.metadata().clone();
                if let Err(err) = cache::save(&description, &metadata) {
                    warn!(error = %err, "failed to persist state cache");
                }
            }
        }

        *self.state.write().await = State::Running;
        info!(%description, cache_hit, "session running");
        Ok(())
    }

    /// Walk `rpc.list` and `rpc.listinfo` to populate the RPC table (§11.1).
    ///
    /// `rpc.list`'s reply is a `u16` count of RPCs the device exposes;
    /// `rpc.listinfo(index)` replies with `type_tag:u8, flags:u8, name...`
    /// for the RPC at that ordinal, and the name comes solely from that
    /// tail. A descriptor missing the `VALID` flag means the device hasn't
    /// finished resolving it yet and is skipped.
    async fn enumerate_rpcs(&self) -> Result<(), SessionError> {
        let list_reply = self.rpc("rpc.list", Bytes::new()).await?;
        let count = match <[u8; 2]>::try_from(&list_reply[..]) {
            Ok(bytes) => u16::from_le_bytes(bytes),
            Err(_) => {
                warn!("rpc.list reply wasn't a u16 count, assuming no RPCs");
                0
            },
        };

        for ordinal in 0..count {
            let args = Bytes::from(Value::U16(ordinal).to_bytes());
            let reply = match self.rpc("rpc.listinfo", args).await {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(error = %err, ordinal, "rpc.listinfo failed, skipping descriptor");
                    continue;
                },
            };
            if reply.len() < 2 {
                warn!(ordinal, "rpc.listinfo reply too short, skipping");
                continue;
            }
            let Ok(data_type) = TypeTag::from_u8(reply[0]) else {
                warn!(ordinal, "rpc.listinfo reply has an unrecognized type tag, skipping");
                continue;
            };
            let flags = reply[1];
            if flags & rpc_flags::VALID == 0 {
                debug!(ordinal, "rpc descriptor not yet valid, skipping");
                continue;
            }
            let name = String::from_utf8_lossy(&reply[2..]).into_owned();
            self.protocol.lock().await.metadata_mut().insert_rpc(RpcDescriptor {
                name,
                ordinal: Some(ordinal),
                data_type,
                flags,
            });
        }
        Ok(())
    }

    /// Poll for a stream descriptor up to `enumerate_poll_attempts` times,
    /// `enumerate_poll_interval` apart, before giving up and moving to
    /// `Running` anyway — the device may simply have no active stream yet
    /// (§11.3).
    async fn wait_for_stream_descriptor(&self) {
        for _ in 0..self.config.enumerate_poll_attempts {
            if self.protocol.lock().await.metadata().stream().is_some() {
                return;
            }
            self.env.sleep(self.config.enumerate_poll_interval).await;
        }
        debug!("no stream descriptor observed during enumeration, proceeding anyway");
    }
}

impl<E: Environment> Drop for Session<E> {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
        for task in &self.transport_tasks {
            task.abort();
        }
    }
}

/// Drains `from_transport`, dispatching each packet by routing match:
/// matching packets fold into protocol state or fulfill a pending RPC;
/// mismatched packets go to the router demux channel if one's registered,
/// else are logged and dropped (§4.5, §11.5).
async fn run_reader(
    mut from_transport: mpsc::Receiver<RawPacket>,
    routing: Bytes,
    protocol: Arc<Mutex<ProtocolState>>,
    pub_queue: Arc<DropOldestQueue<Row>>,
    pending_rpc: Arc<Mutex<Option<PendingRpc>>>,
    router_tx: Arc<Mutex<Option<mpsc::Sender<RawPacket>>>>,
    state: Arc<RwLock<State>>,
) {
    while let Some(packet) = from_transport.recv().await {
        if packet.routing != routing {
            let forward_to = router_tx.lock().await.clone();
            match forward_to {
                Some(tx) => {
                    let _ = tx.send(packet).await;
                },
                None => warn!(routing = ?packet.routing, "dropping packet for unregistered routing"),
            }
            continue;
        }

        let kind = match PacketType::from_u8(packet.header.payload_type()) {
            Ok(kind) => kind,
            Err(err) => {
                warn!(error = %err, "dropping packet with an unknown type tag");
                continue;
            },
        };
        let payload = match Payload::decode(kind, &packet.payload) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "dropping malformed payload");
                continue;
            },
        };

        match payload {
            Payload::RpcRep(RpcReply { request_id, payload }) => {
                deliver_rpc_outcome(&pending_rpc, request_id, RpcOutcome::Reply(payload)).await;
            },
            Payload::RpcError(err) => {
                let code = RpcErrorCode::from_u16(err.error_code);
                deliver_rpc_outcome(&pending_rpc, err.request_id, RpcOutcome::Error(code)).await;
            },
            Payload::Log(message) => debug!(%message, "device log"),
            Payload::Heartbeat(_) => debug!("heartbeat received"),
            Payload::RpcReq(_) => debug!("ignoring unexpected RPC_REQ addressed to this session"),
            other => {
                if let tio_core::Ingested::Sample { row, .. } = protocol.lock().await.ingest(&other) {
                    if let Some(_dropped) = pub_queue.push(row).await {
                        warn!("publish queue full, dropping oldest sample");
                    }
                }
            },
        }
    }

    *state.write().await = State::Failed;
    warn!("transport closed, session failed");
}

/// Drains `req_queue`, forwarding each outgoing packet to the transport,
/// and emits a heartbeat whenever it's been idle for `heartbeat_interval`
/// (§4.4: "the writer task sends a heartbeat if it's gone idle").
async fn run_writer<E: Environment>(
    mut req_rx: mpsc::Receiver<RawPacket>,
    to_transport: mpsc::Sender<RawPacket>,
    env: E,
    heartbeat_interval: std::time::Duration,
    routing: Bytes,
) {
    loop {
        tokio::select! {
            next = req_rx.recv() => {
                match next {
                    Some(packet) => {
                        if to_transport.send(packet).await.is_err() {
                            break;
                        }
                    },
                    None => break,
                }
            },
            () = env.sleep(heartbeat_interval) => {
                debug!("writer idle, sending heartbeat");
                match RawPacket::new(PacketType::Heartbeat.to_u8(), routing.clone(), Bytes::new()) {
                    Ok(heartbeat) => {
                        if to_transport.send(heartbeat).await.is_err() {
                            break;
                        }
                    },
                    Err(err) => warn!(error = %err, "failed to build heartbeat packet"),
                }
            },
        }
    }
}

/// Fulfill the pending RPC if `request_id` matches it; otherwise it's a
/// stale or mismatched reply, logged per §11.2's reply-queue-overflow
/// distinction (separate from `pub_queue`'s sample-drop warning).
async fn deliver_rpc_outcome(
    pending_rpc: &Mutex<Option<PendingRpc>>,
    request_id: u16,
    outcome: RpcOutcome,
) {
    let mut slot = pending_rpc.lock().await;
    match slot.take() {
        Some(pending) if pending.request_id == request_id => {
            let _ = pending.reply_tx.send(outcome);
        },
        Some(pending) => {
            warn!(
                expected = pending.request_id,
                got = request_id,
                "reply queue overflow: reply doesn't match the in-flight request, dropping"
            );
            *slot = Some(pending);
        },
        None => warn!(request_id, "reply queue overflow: no RPC in flight, dropping"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tio_proto::{Source, Stream, Stream0, StreamComponent, Timebase};

    use super::*;
    use crate::config::SessionConfig;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            rpc_timeout: Duration::from_millis(200),
            heartbeat_interval: Duration::from_secs(30),
            enumerate_poll_attempts: 2,
            enumerate_poll_interval: Duration::from_millis(10),
            use_state_cache: false,
            ..SessionConfig::default()
        }
    }

    /// A minimal fake device: answers the handshake/enumeration RPCs this
    /// crate issues, then pushes one `TIMEBASE`/`SOURCE`/`STREAM` triple and
    /// a sample so tests can exercise the full pipeline without real I/O.
    fn spawn_fake_device(
        mut inbound: mpsc::Receiver<RawPacket>,
        outbound: mpsc::Sender<RawPacket>,
        routing: Bytes,
    ) {
        tokio::spawn(async move {
            while let Some(packet) = inbound.recv().await {
                let Ok(kind) = PacketType::from_u8(packet.header.payload_type()) else { continue };
                let Ok(Payload::RpcReq(request)) = Payload::decode(kind, &packet.payload) else {
                    continue;
                };
                let RpcMethod::Named(name) = &request.method else { continue };

                if name == "slow.rpc" {
                    continue; // never replies, for the timeout test.
                }

                let reply_payload = match name.as_str() {
                    "dev.desc" => Bytes::from_static(b"fake-device-01"),
                    "data.send_all" => {
                        send_descriptors(&outbound, &routing).await;
                        Bytes::new()
                    },
                    "rpc.list" => Bytes::from(1u16.to_le_bytes().to_vec()),
                    "rpc.listinfo" => {
                        let mut info = vec![TypeTag::Str as u8, rpc_flags::VALID | rpc_flags::READABLE];
                        info.extend_from_slice(b"dev.desc");
                        Bytes::from(info)
                    },
                    "echo" => request.args.clone(),
                    _ => Bytes::new(),
                };
                let reply = RpcReply { request_id: request.request_id, payload: reply_payload };
                if let Ok(packet) =
                    RawPacket::new(PacketType::RpcRep.to_u8(), routing.clone(), reply.encode().freeze())
                {
                    let _ = outbound.send(packet).await;
                }
            }
        });
    }

    async fn send_descriptors(outbound: &mpsc::Sender<RawPacket>, routing: &Bytes) {
        let timebase = Timebase {
            timebase_id: 0,
            epoch: 0,
            flags: 0,
            start_time_ns: 0,
            period_num_us: 1000,
            period_denom_us: 1,
            reserved: 0,
            stability_ppb: 0.0,
        };
        let source = Source {
            source_id: 0,
            timebase_id: 0,
            period: 1,
            offset: 0,
            reserved: 0,
            data_type: TypeTag::F32 as u16,
            channels: 1,
            flags: 0,
            name: "temp".to_string(),
            column_names: vec![],
            title: String::new(),
            units: String::new(),
        };
        let stream = Stream {
            stream_id: 0,
            timebase_id: 0,
            period: 1,
            reserved: 0,
            sample_counter_baseline: 0,
            component_count: 1,
            flags: 0,
            components: vec![StreamComponent { source_id: 0, reserved: 0, period: 1, offset: 0 }],
        };
        for payload in [Payload::Timebase(timebase), Payload::Source(source), Payload::Stream(stream)] {
            if let Ok(packet) =
                RawPacket::new(payload.kind().to_u8(), routing.clone(), payload.encode().freeze())
            {
                let _ = outbound.send(packet).await;
            }
        }
    }

    async fn attached_session() -> (Session<SystemEnvironment>, mpsc::Sender<RawPacket>) {
        let (session_out_tx, device_in_rx) = mpsc::channel(16);
        let (device_out_tx, session_in_rx) = mpsc::channel(16);
        let routing = Bytes::new();
        spawn_fake_device(device_in_rx, device_out_tx.clone(), routing.clone());

        let connection = Connection::from_channels(session_out_tx, session_in_rx);
        let session =
            Session::attach(connection, routing.to_vec(), fast_config(), SystemEnvironment).await.unwrap();
        (session, device_out_tx)
    }

    #[tokio::test]
    async fn handshake_brings_the_session_to_running() {
        let (session, _device_tx) = attached_session().await;
        assert_eq!(session.state().await, State::Running);
        assert_eq!(session.column_names().await, vec!["temp"]);
    }

    #[tokio::test]
    async fn rpc_round_trip_returns_the_reply_payload() {
        let (session, _device_tx) = attached_session().await;
        let reply = session.rpc("echo", Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(reply, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn rpc_times_out_without_a_reply() {
        let (session, _device_tx) = attached_session().await;
        let err = session.rpc("slow.rpc", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::RpcTimeout { .. }));
    }

    #[tokio::test]
    async fn stream_sample_arrives_through_the_publish_queue() {
        let (session, device_tx) = attached_session().await;

        // Handshake already compiled a 4-byte-row schema (one f32 column).
        let sample = Payload::Stream0(Stream0 { sample_number: 0, row: Bytes::from_static(&[0u8; 4]) });
        let packet =
            RawPacket::new(sample.kind().to_u8(), Bytes::new(), sample.encode().freeze()).unwrap();
        device_tx.send(packet).await.unwrap();

        let rows = session.stream_read(1, None, false).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells, vec![Value::F32(0.0)]);
    }

    #[tokio::test]
    async fn stream_read_topic_projects_to_one_sources_columns() {
        let (session, device_tx) = attached_session().await;
        let sample = Payload::Stream0(Stream0 { sample_number: 0, row: Bytes::from_static(&[0u8; 4]) });
        let packet =
            RawPacket::new(sample.kind().to_u8(), Bytes::new(), sample.encode().freeze()).unwrap();
        device_tx.send(packet).await.unwrap();

        let rows = session.stream_read_topic("temp", 1, None).await.unwrap();
        assert_eq!(rows[0].cells, vec![Value::F32(0.0)]);

        let err = session.stream_read_topic("missing", 1, None).await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownTopic(_)));
    }
}
