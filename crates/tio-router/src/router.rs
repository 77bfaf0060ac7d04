//! The [`Router`] type: a routing-key-keyed map of child sessions fed by
//! the root session's mismatched-routing packets (§4.5).

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use tio_core::Environment;
use tio_proto::RawPacket;
use tio_session::{Connection, Session, SessionConfig};
use tokio::{
    sync::{Mutex, mpsc},
    task::AbortHandle,
};
use tracing::{info, warn};

use crate::error::RouterError;

/// Inbound channel capacity for a child session's virtual transport.
const CHILD_CHANNEL_CAPACITY: usize = 64;
/// Capacity of the channel the root session forwards mismatched packets
/// through.
const ROUTER_CHANNEL_CAPACITY: usize = 64;

struct Child<E: Environment> {
    inbound_tx: mpsc::Sender<RawPacket>,
    session: Option<Arc<Session<E>>>,
}

/// Turns one session's recv/send pipeline into a tree of per-prefix child
/// sessions (§4.5).
///
/// The routing-byte order on the wire is LSB-first along the path (§4.5);
/// a child's routing key is simply its raw routing bytes, decimal-joined
/// with `/` in wire order (matching the source's `'/'.join(map(str,
/// routing))`), so the same prefix always maps to the same key regardless
/// of how it was spelled in a connect URL.
pub struct Router<E: Environment = tio_core::env::SystemEnvironment> {
    root: Arc<Session<E>>,
    children: Arc<Mutex<HashMap<String, Child<E>>>>,
    env: E,
    demux_task: AbortHandle,
}

impl Router<tio_core::env::SystemEnvironment> {
    /// Open a root session at `url` and start routing its mismatched
    /// traffic to lazily created children.
    ///
    /// # Errors
    ///
    /// Whatever [`Session::open`] can fail with.
    pub async fn open(url: &str, config: SessionConfig) -> Result<Self, RouterError> {
        let root = Session::open(url, config.clone()).await?;
        Ok(Self::attach(root, config, tio_core::env::SystemEnvironment).await)
    }
}

impl<E: Environment> Router<E> {
    /// Wrap an already-attached root session, wiring its router channel so
    /// mismatched-routing packets flow into this router's demux loop
    /// (§4.5, §11.5).
    pub async fn attach(root: Session<E>, config: SessionConfig, env: E) -> Self {
        let root = Arc::new(root);
        let children: Arc<Mutex<HashMap<String, Child<E>>>> = Arc::new(Mutex::new(HashMap::new()));
        let (router_tx, router_rx) = mpsc::channel(ROUTER_CHANNEL_CAPACITY);
        root.set_router(router_tx).await;

        let demux_task = tokio::spawn(demux_loop(
            router_rx,
            Arc::clone(&root),
            Arc::clone(&children),
            config,
            env.clone(),
        ));

        Self { root, children, env, demux_task: demux_task.abort_handle() }
    }

    /// The root session.
    #[must_use]
    pub fn root(&self) -> &Session<E> {
        &self.root
    }

    /// The child session bound to `routing_key`, if one has finished its
    /// handshake. `None` both when the key has never been observed and
    /// when its session is still enumerating in the background.
    pub async fn child(&self, routing_key: &str) -> Option<Arc<Session<E>>> {
        self.children.lock().await.get(routing_key).and_then(|child| child.session.clone())
    }

    /// Routing keys observed so far, whether or not each one's handshake
    /// has completed.
    pub async fn child_keys(&self) -> Vec<String> {
        self.children.lock().await.keys().cloned().collect()
    }

    /// Poll for `routing_key`'s child session up to `attempts` times,
    /// `poll_interval` apart, returning as soon as it's running.
    ///
    /// A child's handshake runs on its own spawned task (§11.5); callers
    /// that need to address a child right after it appears use this
    /// instead of racing [`Router::child`] against that task.
    pub async fn wait_for_child(
        &self,
        routing_key: &str,
        poll_interval: Duration,
        attempts: u32,
    ) -> Option<Arc<Session<E>>> {
        for _ in 0..attempts {
            if let Some(session) = self.child(routing_key).await {
                return Some(session);
            }
            self.env.sleep(poll_interval).await;
        }
        None
    }

    /// Call `topic` on the child bound to `routing_key` (§4.4, forwarded
    /// through the router's child map).
    ///
    /// # Errors
    ///
    /// [`RouterError::UnknownChild`] if no running child is bound to
    /// `routing_key`; otherwise whatever [`Session::rpc`] can fail with.
    pub async fn child_rpc(
        &self,
        routing_key: &str,
        topic: &str,
        args: impl Into<Bytes>,
    ) -> Result<Bytes, RouterError> {
        let child = self
            .child(routing_key)
            .await
            .ok_or_else(|| RouterError::UnknownChild(routing_key.to_string()))?;
        Ok(child.rpc(topic, args).await?)
    }
}

impl<E: Environment> Drop for Router<E> {
    fn drop(&mut self) {
        self.demux_task.abort();
    }
}

/// `"a/b/c"` joined from `routing`'s bytes in wire order (§4.5).
fn routing_key(routing: &[u8]) -> String {
    routing.iter().map(u8::to_string).collect::<Vec<_>>().join("/")
}

/// Drains the root session's mismatched-routing channel, dispatching each
/// packet to its child's virtual-transport queue — creating the child and
/// spawning its handshake/enumeration task on first sight of a new routing
/// key (§4.5, §11.5).
async fn demux_loop<E: Environment>(
    mut router_rx: mpsc::Receiver<RawPacket>,
    root: Arc<Session<E>>,
    children: Arc<Mutex<HashMap<String, Child<E>>>>,
    config: SessionConfig,
    env: E,
) {
    while let Some(packet) = router_rx.recv().await {
        let key = routing_key(&packet.routing);

        let inbound_tx = {
            let mut guard = children.lock().await;
            if let Some(child) = guard.get(&key) {
                child.inbound_tx.clone()
            } else {
                let (inbound_tx, inbound_rx) = mpsc::channel(CHILD_CHANNEL_CAPACITY);
                guard.insert(key.clone(), Child { inbound_tx: inbound_tx.clone(), session: None });
                drop(guard);

                info!(routing_key = %key, "router: new routing observed, spawning child session");
                spawn_child(
                    Arc::clone(&root),
                    Arc::clone(&children),
                    key.clone(),
                    inbound_rx,
                    packet.routing.to_vec(),
                    config.clone(),
                    env.clone(),
                );

                inbound_tx
            }
        };

        if inbound_tx.send(packet).await.is_err() {
            warn!(routing_key = %key, "router: child transport closed, dropping packet");
        }
    }

    warn!("router: root session's demux channel closed, no further packets will be routed");
}

/// Run a new child's handshake/enumeration on a spawned task so a slow or
/// never-responding device doesn't block [`demux_loop`] or the caller
/// (§11.5: "the child's own `specialize()` runs on a background thread").
fn spawn_child<E: Environment>(
    root: Arc<Session<E>>,
    children: Arc<Mutex<HashMap<String, Child<E>>>>,
    key: String,
    inbound_rx: mpsc::Receiver<RawPacket>,
    routing: Vec<u8>,
    config: SessionConfig,
    env: E,
) {
    tokio::spawn(async move {
        let connection = Connection::from_channels(root.raw_outbound(), inbound_rx);
        match Session::attach(connection, routing, config, env).await {
            Ok(session) => {
                if let Some(child) = children.lock().await.get_mut(&key) {
                    child.session = Some(Arc::new(session));
                }
                info!(routing_key = %key, "router: child session running");
            },
            Err(err) => {
                warn!(error = %err, routing_key = %key, "router: child handshake failed, dropping child");
                children.lock().await.remove(&key);
            },
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tio_core::env::SystemEnvironment;
    use tio_proto::{
        Payload, PacketType, RpcMethod, RpcReply, Source, Stream, StreamComponent, Timebase, TypeTag,
    };

    use super::*;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            rpc_timeout: Duration::from_millis(200),
            heartbeat_interval: Duration::from_secs(30),
            enumerate_poll_attempts: 2,
            enumerate_poll_interval: Duration::from_millis(5),
            use_state_cache: false,
            ..SessionConfig::default()
        }
    }

    /// A fake multiplexed device: answers the handshake/enumeration RPCs
    /// for *any* routing prefix, replying on the same routing it was asked
    /// on, so a single fake transport can stand in for root and child
    /// traffic sharing one physical wire (§4.5).
    fn spawn_multiplex_fake_device(mut inbound: mpsc::Receiver<RawPacket>, outbound: mpsc::Sender<RawPacket>) {
        tokio::spawn(async move {
            while let Some(packet) = inbound.recv().await {
                let routing = packet.routing.clone();
                let Ok(kind) = PacketType::from_u8(packet.header.payload_type()) else { continue };
                let Ok(Payload::RpcReq(request)) = Payload::decode(kind, &packet.payload) else {
                    continue;
                };
                let RpcMethod::Named(name) = &request.method else { continue };

                let reply_payload = match name.as_str() {
                    "dev.desc" => Bytes::from(format!("fake-{}", routing_key(&routing))),
                    "data.send_all" => Bytes::new(),
                    "rpc.list" => Bytes::from(1u16.to_le_bytes().to_vec()),
                    "rpc.listinfo" => {
                        let mut info = vec![
                            TypeTag::Str as u8,
                            tio_core::metadata::rpc_flags::VALID | tio_core::metadata::rpc_flags::READABLE,
                        ];
                        info.extend_from_slice(b"dev.desc");
                        Bytes::from(info)
                    },
                    _ => Bytes::new(),
                };
                let reply = RpcReply { request_id: request.request_id, payload: reply_payload };
                if let Ok(packet) = RawPacket::new(PacketType::RpcRep.to_u8(), routing, reply.encode().freeze()) {
                    let _ = outbound.send(packet).await;
                }
            }
        });
    }

    async fn push_descriptor_triple(outbound: &mpsc::Sender<RawPacket>, routing: Bytes, source_name: &str) {
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
            name: source_name.to_string(),
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

    #[tokio::test]
    async fn routing_key_joins_bytes_in_wire_order() {
        assert_eq!(routing_key(&[0]), "0");
        assert_eq!(routing_key(&[2, 1]), "2/1");
        assert_eq!(routing_key(&[]), "");
    }

    #[tokio::test]
    async fn scenario_f_routing_fan_out_with_no_cross_contamination() {
        let (session_out_tx, device_in_rx) = mpsc::channel(64);
        let (device_out_tx, session_in_rx) = mpsc::channel(64);
        spawn_multiplex_fake_device(device_in_rx, device_out_tx.clone());

        let connection = Connection::from_channels(session_out_tx, session_in_rx);
        let config = fast_config();
        let root = Session::attach(connection, Vec::new(), config.clone(), SystemEnvironment).await.unwrap();
        let router = Router::attach(root, config, SystemEnvironment).await;

        push_descriptor_triple(&device_out_tx, Bytes::new(), "roottemp").await;
        push_descriptor_triple(&device_out_tx, Bytes::from_static(&[0]), "childtemp").await;

        let child = router
            .wait_for_child("0", Duration::from_millis(5), 40)
            .await
            .expect("child session should come up");

        assert_eq!(router.root().column_names().await, vec!["roottemp".to_string()]);
        assert_eq!(child.column_names().await, vec!["childtemp".to_string()]);
    }

    #[tokio::test]
    async fn property_8_two_routed_children_each_get_their_own_traffic() {
        let (session_out_tx, device_in_rx) = mpsc::channel(64);
        let (device_out_tx, session_in_rx) = mpsc::channel(64);
        spawn_multiplex_fake_device(device_in_rx, device_out_tx.clone());

        let connection = Connection::from_channels(session_out_tx, session_in_rx);
        let config = fast_config();
        let root = Session::attach(connection, Vec::new(), config.clone(), SystemEnvironment).await.unwrap();
        let router = Router::attach(root, config, SystemEnvironment).await;

        // interleaved: routing [0] then [1] then [0] again.
        push_descriptor_triple(&device_out_tx, Bytes::from_static(&[0]), "zero").await;
        push_descriptor_triple(&device_out_tx, Bytes::from_static(&[1]), "one").await;

        let zero = router.wait_for_child("0", Duration::from_millis(5), 40).await.unwrap();
        let one = router.wait_for_child("1", Duration::from_millis(5), 40).await.unwrap();

        assert_eq!(zero.column_names().await, vec!["zero".to_string()]);
        assert_eq!(one.column_names().await, vec!["one".to_string()]);
        assert_eq!(router.child_keys().await.len(), 2);
    }

    #[tokio::test]
    async fn unknown_child_rpc_is_reported_not_dropped() {
        let (session_out_tx, device_in_rx) = mpsc::channel(64);
        let (device_out_tx, session_in_rx) = mpsc::channel(64);
        spawn_multiplex_fake_device(device_in_rx, device_out_tx);

        let connection = Connection::from_channels(session_out_tx, session_in_rx);
        let config = fast_config();
        let root = Session::attach(connection, Vec::new(), config.clone(), SystemEnvironment).await.unwrap();
        let router = Router::attach(root, config, SystemEnvironment).await;

        let err = router.child_rpc("9", "dev.desc", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, RouterError::UnknownChild(key) if key == "9"));
    }
}
