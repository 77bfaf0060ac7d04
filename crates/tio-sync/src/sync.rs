//! [`Synchronizer`]: aligns several [`StreamHandle`]s to a common time axis
//! (§4.6).

use tio_core::{Environment, Row, env::SystemEnvironment};
use tracing::warn;

use crate::{error::SyncError, handle::StreamHandle};

/// How many samples a handle may be made to discard while catching up to
/// the others before [`Synchronizer::sync`] gives up (§4.6: "bound the
/// catch-up work per handle").
///
/// The source this crate is grounded on hard-codes the same bound (`5`,
/// `tldevicesync.py`'s `SyncStream.sync`); this crate makes it a knob via
/// [`Synchronizer::with_max_catchup`] instead.
pub const DEFAULT_MAX_CATCHUP: u32 = 5;

/// Reads one row at a time from each of an ordered list of stream handles,
/// keeping them aligned to a common timestamp (§4.6).
///
/// Does not itself check that the handles' rates are compatible — a caller
/// combining a 1 Hz and a 1 kHz handle will simply see the slow handle's
/// row repeat across many reads of the fast one's catch-up. [`StreamHandle::rate`]
/// and [`StreamHandle::column_names`] exist so callers can reject
/// incompatible combinations up front (§4.6: "rate compatibility is the
/// caller's responsibility").
pub struct Synchronizer<E: Environment = SystemEnvironment> {
    handles: Vec<StreamHandle<E>>,
    max_catchup: u32,
}

impl<E: Environment> Synchronizer<E> {
    /// Build a synchronizer over `handles`, in read order, with the default
    /// catch-up bound.
    #[must_use]
    pub fn new(handles: Vec<StreamHandle<E>>) -> Self {
        Self { handles, max_catchup: DEFAULT_MAX_CATCHUP }
    }

    /// [`Synchronizer::new`] with an explicit catch-up bound.
    #[must_use]
    pub fn with_max_catchup(handles: Vec<StreamHandle<E>>, max_catchup: u32) -> Self {
        Self { handles, max_catchup }
    }

    /// The handles this synchronizer reads, in order.
    #[must_use]
    pub fn handles(&self) -> &[StreamHandle<E>] {
        &self.handles
    }

    /// Read one row from each handle, then bring any handle that's behind
    /// up to the furthest-ahead handle's timestamp (§4.6 step 1).
    ///
    /// # Errors
    ///
    /// [`SyncError::SyncImpossible`] if a handle doesn't catch up within
    /// `max_catchup` samples; otherwise whatever reading a handle can fail
    /// with.
    pub async fn sync(&self) -> Result<Vec<Row>, SyncError> {
        let mut rows = Vec::with_capacity(self.handles.len());
        for handle in &self.handles {
            rows.push(handle.read_one().await?);
        }

        let t_max = rows.iter().filter_map(|row| row.time).fold(f64::NEG_INFINITY, f64::max);

        for (handle, row) in self.handles.iter().zip(rows.iter_mut()) {
            let mut discarded = 0u32;
            while row.time.is_none_or(|t| t < t_max) {
                if discarded >= self.max_catchup {
                    return Err(SyncError::SyncImpossible {
                        handle: handle.topic().to_string(),
                        lag: discarded,
                    });
                }
                *row = handle.read_one().await?;
                discarded += 1;
            }
            if discarded > 0 {
                warn!(topic = handle.topic(), discarded, "dropped samples to catch up to peers");
            }
        }

        Ok(rows)
    }

    /// Read one row from each handle (§4.6 step 2).
    ///
    /// If `resync` is set, calls [`Synchronizer::sync`] first — the caller
    /// flag §4.6 leaves up to the caller for what a timestamp mismatch
    /// should do. With `resync` unset, a mismatch is reported as
    /// [`SyncError::Desynced`] rather than corrected.
    ///
    /// # Errors
    ///
    /// [`SyncError::Desynced`] if the handles' rows don't share a
    /// timestamp; otherwise whatever [`Synchronizer::sync`] or reading a
    /// handle can fail with.
    pub async fn read(&self, resync: bool) -> Result<Vec<Row>, SyncError> {
        if resync {
            return self.sync().await;
        }

        let mut rows = Vec::with_capacity(self.handles.len());
        for handle in &self.handles {
            rows.push(handle.read_one().await?);
        }

        let expected = rows.first().and_then(|row| row.time);
        for (handle, row) in self.handles.iter().zip(rows.iter()) {
            if row.time != expected {
                return Err(SyncError::Desynced {
                    handle: handle.topic().to_string(),
                    expected,
                    got: row.time,
                });
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use bytes::Bytes;
    use tio_core::env::SystemEnvironment;
    use tio_proto::{
        Payload, PacketType, RpcMethod, RpcReply, Source, Stream, Stream0, StreamComponent, Timebase,
        TypeTag,
    };
    use tio_session::{Connection, Session, SessionConfig};
    use tokio::sync::mpsc;

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

    /// A fake device exposing one `ch` source at 10 Hz (period 100ms),
    /// whose timebase starts at `start_time_ns` (§4.6's "simulated
    /// streams").
    fn spawn_fake_10hz_device(
        mut inbound: mpsc::Receiver<tio_proto::RawPacket>,
        outbound: mpsc::Sender<tio_proto::RawPacket>,
        start_time_ns: u64,
    ) {
        tokio::spawn(async move {
            while let Some(packet) = inbound.recv().await {
                let Ok(kind) = PacketType::from_u8(packet.header.payload_type()) else { continue };
                let Ok(Payload::RpcReq(request)) = Payload::decode(kind, &packet.payload) else {
                    continue;
                };
                let RpcMethod::Named(name) = &request.method else { continue };

                let reply_payload = match name.as_str() {
                    "dev.desc" => Bytes::from(format!("fake-{start_time_ns}")),
                    "data.send_all" => {
                        send_descriptors(&outbound, start_time_ns).await;
                        Bytes::new()
                    },
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
                if let Ok(packet) = tio_proto::RawPacket::new(
                    PacketType::RpcRep.to_u8(),
                    Bytes::new(),
                    reply.encode().freeze(),
                ) {
                    let _ = outbound.send(packet).await;
                }
            }
        });
    }

    async fn send_descriptors(outbound: &mpsc::Sender<tio_proto::RawPacket>, start_time_ns: u64) {
        let timebase = Timebase {
            timebase_id: 0,
            epoch: 0,
            flags: 0,
            start_time_ns,
            period_num_us: 100_000,
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
            name: "ch".to_string(),
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
            if let Ok(packet) = tio_proto::RawPacket::new(
                payload.kind().to_u8(),
                Bytes::new(),
                payload.encode().freeze(),
            ) {
                let _ = outbound.send(packet).await;
            }
        }
    }

    async fn push_sample(outbound: &mpsc::Sender<tio_proto::RawPacket>, sample_number: u32) {
        let sample = Payload::Stream0(Stream0 { sample_number, row: Bytes::from_static(&[0u8; 4]) });
        let packet =
            tio_proto::RawPacket::new(sample.kind().to_u8(), Bytes::new(), sample.encode().freeze())
                .unwrap();
        outbound.send(packet).await.unwrap();
    }

    async fn attached_10hz_session(start_time_ns: u64) -> (Session<SystemEnvironment>, mpsc::Sender<tio_proto::RawPacket>) {
        let (session_out_tx, device_in_rx) = mpsc::channel(64);
        let (device_out_tx, session_in_rx) = mpsc::channel(64);
        spawn_fake_10hz_device(device_in_rx, device_out_tx.clone(), start_time_ns);

        let connection = Connection::from_channels(session_out_tx, session_in_rx);
        let session =
            Session::attach(connection, Vec::new(), fast_config(), SystemEnvironment).await.unwrap();
        (session, device_out_tx)
    }

    #[tokio::test]
    async fn property_7_synchronizer_aligns_streams_starting_at_different_times() {
        let (session_a, device_a_tx) = attached_10hz_session(0).await;
        let (session_b, device_b_tx) = attached_10hz_session(5_000_000_000).await;

        // A starts at t=0, B starts at t=5; A needs to catch up to t=5,
        // which at a 10 Hz period is 50 samples (well under the default
        // catch-up bound once raised for this test).
        for n in 0..=50u32 {
            push_sample(&device_a_tx, n).await;
        }
        push_sample(&device_b_tx, 0).await;

        let handle_a = StreamHandle::new(Arc::new(session_a), "ch").await;
        let handle_b = StreamHandle::new(Arc::new(session_b), "ch").await;
        let synchronizer = Synchronizer::with_max_catchup(vec![handle_a, handle_b], 64);

        let rows = synchronizer.sync().await.unwrap();
        assert!(rows[0].time.unwrap() >= 5.0);
        assert_eq!(rows[0].time, rows[1].time);
    }

    #[tokio::test]
    async fn scenario_e_sync_drop_discards_exactly_five_samples() {
        let (session_a, device_a_tx) = attached_10hz_session(0).await;
        let (session_b, device_b_tx) = attached_10hz_session(500_000_000).await;

        // A at 10Hz starting at t=0, B at 10Hz starting at t=0.5: A must
        // discard samples 0..=4 (t=0.0..=0.4) before reaching t=0.5.
        for n in 0..=5u32 {
            push_sample(&device_a_tx, n).await;
        }
        push_sample(&device_b_tx, 0).await;

        let handle_a = StreamHandle::new(Arc::new(session_a), "ch").await;
        let handle_b = StreamHandle::new(Arc::new(session_b), "ch").await;
        let synchronizer = Synchronizer::new(vec![handle_a, handle_b]);

        let rows = synchronizer.sync().await.unwrap();
        assert_eq!(rows[0].time, Some(0.5));
        assert_eq!(rows[1].time, Some(0.5));

        // Exactly the six pushed A samples were consumed (five discarded,
        // one accepted): the next A sample we push is the next one read.
        push_sample(&device_a_tx, 6).await;
        push_sample(&device_b_tx, 1).await;
        let rows = synchronizer.read(false).await.unwrap();
        assert_eq!(rows[0].time, Some(0.6));
        assert_eq!(rows[1].time, Some(0.6));
    }

    #[tokio::test]
    async fn sync_impossible_when_catchup_bound_is_exceeded() {
        let (session_a, device_a_tx) = attached_10hz_session(0).await;
        let (session_b, device_b_tx) = attached_10hz_session(5_000_000_000).await;

        for n in 0..=50u32 {
            push_sample(&device_a_tx, n).await;
        }
        push_sample(&device_b_tx, 0).await;

        let handle_a = StreamHandle::new(Arc::new(session_a), "ch").await;
        let handle_b = StreamHandle::new(Arc::new(session_b), "ch").await;
        let synchronizer = Synchronizer::with_max_catchup(vec![handle_a, handle_b], 3);

        let err = synchronizer.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::SyncImpossible { lag: 3, .. }));
    }

    #[tokio::test]
    async fn read_without_resync_reports_desync_instead_of_correcting() {
        let (session_a, device_a_tx) = attached_10hz_session(0).await;
        let (session_b, device_b_tx) = attached_10hz_session(0).await;

        push_sample(&device_a_tx, 0).await;
        push_sample(&device_b_tx, 1).await; // out of step with A.

        let handle_a = StreamHandle::new(Arc::new(session_a), "ch").await;
        let handle_b = StreamHandle::new(Arc::new(session_b), "ch").await;
        let synchronizer = Synchronizer::new(vec![handle_a, handle_b]);

        let err = synchronizer.read(false).await.unwrap_err();
        assert!(matches!(err, SyncError::Desynced { .. }));
    }
}
