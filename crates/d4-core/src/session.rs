//! Per-connection admission and commit pipeline.
//!
//! One [`Session`] is constructed per accepted TLS connection and fed every
//! frame the reassembler emits, in order. It owns exactly the per-connection
//! state named in the data model (bound identity, cached key, cached cap,
//! first-frame/first-commit flags) and talks to the two store clients for
//! everything else - no mutable state is ever shared across connections.

use d4_proto::{Frame, Header};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    clock,
    env::Environment,
    error::SessionError,
    metadata_store::MetadataStore,
    store::Datastore,
    stream_store::StreamStore,
};

type HmacSha256 = Hmac<Sha256>;

/// Disposition of a single frame after running the admission pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was appended to the stream and counters were updated.
    Committed,
    /// The frame was discarded; the connection stays open.
    Dropped {
        /// Human-readable reason, suitable for a log line.
        reason: String,
    },
    /// The connection must be torn down.
    Aborted(SessionError),
}

/// Identity bound to a session after its first admitted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BoundIdentity {
    msg_type: u8,
    sensor_id: String,
}

/// Per-connection policy engine.
pub struct Session<D, E> {
    metadata: MetadataStore<D>,
    streams: StreamStore<D>,
    env: E,
    default_hmac_key: Vec<u8>,
    session_uuid: String,
    peer_ip: String,
    bound: Option<BoundIdentity>,
    cached_hmac_key: Option<Vec<u8>>,
    cached_stream_max_size: Option<u64>,
    data_saved: bool,
}

impl<D: Datastore, E: Environment> Session<D, E> {
    /// Start a new session for one accepted connection.
    pub fn new(
        metadata: MetadataStore<D>,
        streams: StreamStore<D>,
        env: E,
        default_hmac_key: Vec<u8>,
        session_uuid: String,
        peer_ip: String,
    ) -> Self {
        Self {
            metadata,
            streams,
            env,
            default_hmac_key,
            session_uuid,
            peer_ip,
            bound: None,
            cached_hmac_key: None,
            cached_stream_max_size: None,
            data_saved: false,
        }
    }

    /// Session-UUID minted for this connection.
    #[must_use]
    pub fn session_uuid(&self) -> &str {
        &self.session_uuid
    }

    /// The `(type, sensor_id)` this session is bound to, if any frame has
    /// been admitted yet.
    #[must_use]
    pub fn bound_identity(&self) -> Option<(u8, &str)> {
        self.bound.as_ref().map(|b| (b.msg_type, b.sensor_id.as_str()))
    }

    /// Run the full per-frame pipeline described in the admission pipeline.
    ///
    /// # Errors
    ///
    /// Returns `Err` only when a datastore call fails; pipeline rejections
    /// are reported through [`FrameOutcome`], not as errors, since a
    /// rejected frame is an ordinary outcome rather than a failure of the
    /// pipeline itself.
    pub async fn process_frame(&mut self, frame: &Frame) -> Result<FrameOutcome, SessionError> {
        // 1. Peer-IP blacklist.
        if self.metadata.is_ip_blacklisted(&self.peer_ip).await? {
            warn!(peer_ip = %self.peer_ip, "blacklisted IP");
            return Ok(FrameOutcome::Aborted(SessionError::BlacklistedIp));
        }

        // 2. Header well-formedness: sensor_id must be UUID v4, type accepted.
        let sensor_uuid = Uuid::from_bytes(frame.header.sensor_id_bytes());
        if sensor_uuid.get_version_num() != 4 {
            info!(sensor_id = %sensor_uuid, "malformed sensor UUID, dropping frame");
            return Ok(FrameOutcome::Dropped { reason: "malformed UUID".to_string() });
        }
        let sensor_id = sensor_uuid.to_string();
        let msg_type = frame.header.msg_type();
        if !self.metadata.is_type_accepted(msg_type).await? {
            warn!(msg_type, "unaccepted type, dropping frame");
            return Ok(FrameOutcome::Dropped { reason: "unaccepted type".to_string() });
        }

        // 3. Sensor-derived IP blacklist.
        if self.metadata.is_sensor_ip_blacklisted(&sensor_id).await? {
            self.metadata.blacklist_ip(&self.peer_ip).await?;
            warn!(sensor_id, peer_ip = %self.peer_ip, "sensor-derived IP blacklist, promoting peer IP");
            return Ok(FrameOutcome::Aborted(SessionError::SensorDerivedIpBlacklist));
        }

        // 4. Sensor blacklist.
        if self.metadata.is_sensor_blacklisted(&sensor_id).await? {
            warn!(sensor_id, "blacklisted sensor");
            return Ok(FrameOutcome::Aborted(SessionError::BlacklistedSensor));
        }

        // 5. Size ceiling.
        if frame.header.size() > d4_proto::DATA_DEFAULT_SIZE_LIMIT {
            warn!(size = frame.header.size(), "oversize declared size");
            return Ok(FrameOutcome::Aborted(SessionError::OversizeFrame));
        }

        // 6. Worker-signalled rejection.
        if self.streams.is_marked_incorrect_type(msg_type, &self.session_uuid).await? {
            self.streams.discard(msg_type, &self.session_uuid).await?;
            self.streams.clear_incorrect_type_marker(msg_type, &self.session_uuid).await?;
            warn!(msg_type, "worker-signalled incorrect type");
            return Ok(FrameOutcome::Aborted(SessionError::WorkerIncorrectType));
        }

        // 7. First-frame admission.
        if self.bound.is_none() {
            if self.streams.is_active(msg_type, &self.peer_ip, &sensor_id).await? {
                self.metadata
                    .set_error(
                        &sensor_id,
                        &format!("Error: This UUID is using the same UUID for one type={msg_type}"),
                    )
                    .await?;
                warn!(sensor_id, msg_type, "duplicate admission");
                return Ok(FrameOutcome::Aborted(SessionError::DuplicateAdmission { msg_type }));
            }
            self.streams.mark_active(msg_type, &self.peer_ip, &sensor_id).await?;
            self.metadata.clear_error(&sensor_id).await?;
            self.bound = Some(BoundIdentity { msg_type, sensor_id: sensor_id.clone() });
        }

        // 8. HMAC verification, key cached for the session lifetime.
        if self.cached_hmac_key.is_none() {
            let key = self.metadata.sensor_hmac_key(&sensor_id).await?;
            self.cached_hmac_key = Some(key.unwrap_or_else(|| self.default_hmac_key.clone()));
        }
        let key = self.cached_hmac_key.as_ref().expect("just populated above");
        if !verify_hmac(key, &frame.raw, &frame.header) {
            self.metadata.set_error(&sensor_id, "Error: HMAC don't match").await?;
            info!(sensor_id, "HMAC mismatch, dropping frame");
            return Ok(FrameOutcome::Dropped { reason: "HMAC don't match".to_string() });
        }

        // 9. Stream cap.
        if self.cached_stream_max_size.is_none() {
            self.cached_stream_max_size = Some(self.metadata.stream_max_size(&sensor_id).await?);
        }
        let cap = self.cached_stream_max_size.expect("just populated above");
        let current_len = self.streams.len(msg_type, &self.session_uuid).await?;
        if current_len >= cap {
            self.metadata.set_error(&sensor_id, "Error: stream exceed max entries limit").await?;
            warn!(sensor_id, cap, "stream cap exceeded");
            return Ok(FrameOutcome::Aborted(SessionError::StreamCapExceeded));
        }

        // 10. Commit.
        self.commit(frame, msg_type, &sensor_id).await?;
        Ok(FrameOutcome::Committed)
    }

    async fn commit(&mut self, frame: &Frame, msg_type: u8, sensor_id: &str) -> Result<(), SessionError> {
        let entry = StreamEntry {
            message: frame.payload.to_vec(),
            uuid: sensor_id.to_string(),
            timestamp: frame.header.timestamp(),
            version: frame.header.version(),
        };
        let encoded = encode_entry(&entry);
        self.streams.append(msg_type, &self.session_uuid, encoded).await?;

        let now = self.env.unix_time_secs();
        let date = clock::date_ymd(now);
        self.metadata.incr_counter(&format!("stat_uuid_ip:{date}:{sensor_id}"), &self.peer_ip).await?;
        self.metadata.incr_counter(&format!("stat_ip_uuid:{date}:{}", self.peer_ip), sensor_id).await?;
        self.metadata.incr_counter(&format!("daily_uuid:{date}"), sensor_id).await?;
        self.metadata.incr_counter(&format!("daily_ip:{date}"), &self.peer_ip).await?;
        self.metadata.incr_counter(&format!("daily_type:{date}"), &msg_type.to_string()).await?;
        self.metadata
            .incr_counter(&format!("stat_type_uuid:{date}:{msg_type}"), sensor_id)
            .await?;

        self.metadata.touch_first_seen(sensor_id, frame.header.timestamp()).await?;
        self.metadata.set_last_seen(sensor_id, frame.header.timestamp()).await?;

        if !self.data_saved {
            self.data_saved = true;
            self.streams.record_session(msg_type, &self.session_uuid, sensor_id).await?;
            let label = clock::timestamp_ymdhms(now);
            self.metadata.push_recent_ip(sensor_id, &self.peer_ip, &label).await?;
        }

        Ok(())
    }

    /// Run teardown exactly once: mark the session ended, release the
    /// active-connection entries it holds (if any frame was ever admitted),
    /// and leave the store in the state callers expect after disconnect.
    ///
    /// Callers must only call this once per connection; the idle timer and
    /// transport shutdown are the caller's responsibility.
    pub async fn teardown(&mut self) -> Result<(), SessionError> {
        self.streams.mark_ended(&self.session_uuid).await?;
        if let Some(bound) = self.bound.take() {
            self.streams
                .mark_inactive(bound.msg_type, &self.peer_ip, &bound.sensor_id)
                .await?;
        }
        Ok(())
    }
}

fn verify_hmac(key: &[u8], raw_frame: &[u8], header: &Header) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(&d4_proto::hmac_input(raw_frame));
    mac.verify_slice(&header.hmac()).is_ok()
}

/// Entry appended to a session's stream on commit.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StreamEntry {
    message: Vec<u8>,
    uuid: String,
    timestamp: u64,
    version: u8,
}

fn encode_entry(entry: &StreamEntry) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::into_writer(entry, &mut buf).expect("StreamEntry always serializes");
    buf
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::{env::tests::ManualEnv, memory::InMemoryDatastore};

    const DEFAULT_KEY: &[u8] = b"private key to change";

    fn frame_with(sensor_id: [u8; 16], msg_type: u8, timestamp: u64, payload: &[u8], key: &[u8]) -> Frame {
        let mut buf = vec![0u8; Header::SIZE + payload.len()];
        buf[0] = 1;
        buf[1] = msg_type;
        buf[2..18].copy_from_slice(&sensor_id);
        buf[18..26].copy_from_slice(&timestamp.to_le_bytes());
        buf[58..62].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        buf[62..].copy_from_slice(payload);

        let mut mac = HmacSha256::new_from_slice(key).unwrap();
        mac.update(&d4_proto::hmac_input(&buf));
        let tag = mac.finalize().into_bytes();
        buf[26..58].copy_from_slice(&tag);

        let raw = Bytes::from(buf);
        let header = Header::decode(&raw).unwrap();
        Frame::from_raw(header, raw)
    }

    const SENSOR_A: [u8; 16] = [
        0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x41, 0x11, 0x81, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
        0x11,
    ];

    async fn bootstrapped(
        db: &InMemoryDatastore,
    ) -> (MetadataStore<InMemoryDatastore>, StreamStore<InMemoryDatastore>) {
        let metadata = MetadataStore::new(db.clone());
        let streams = StreamStore::new(db.clone());
        metadata.reset_accepted_types(&[1, 4]).await.unwrap();
        (metadata, streams)
    }

    #[tokio::test]
    async fn happy_path_commits_and_updates_counters() {
        let db = InMemoryDatastore::new();
        let (metadata, streams) = bootstrapped(&db).await;
        let env = ManualEnv::new(1);
        let mut session = Session::new(
            metadata.clone(),
            streams,
            env,
            DEFAULT_KEY.to_vec(),
            "session-1".to_string(),
            "10.0.0.1".to_string(),
        );

        let frame = frame_with(SENSOR_A, 1, 1, b"hello", DEFAULT_KEY);
        let outcome = session.process_frame(&frame).await.unwrap();

        assert_eq!(outcome, FrameOutcome::Committed);
        let sensor_id = Uuid::from_bytes(SENSOR_A).to_string();
        assert_eq!(metadata.error(&sensor_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn hmac_mismatch_drops_frame_and_keeps_connection_open() {
        let db = InMemoryDatastore::new();
        let (metadata, streams) = bootstrapped(&db).await;
        let env = ManualEnv::new(1);
        let mut session = Session::new(
            metadata.clone(),
            streams,
            env,
            DEFAULT_KEY.to_vec(),
            "session-1".to_string(),
            "10.0.0.1".to_string(),
        );

        let mut frame = frame_with(SENSOR_A, 1, 1, b"hello", DEFAULT_KEY);
        // Flip a payload byte after HMAC was computed over the original.
        let mut raw = frame.raw.to_vec();
        let payload_start = Header::SIZE;
        raw[payload_start] ^= 0xFF;
        let raw = Bytes::from(raw);
        let header = Header::decode(&raw).unwrap();
        frame = Frame::from_raw(header, raw);

        let outcome = session.process_frame(&frame).await.unwrap();

        assert!(matches!(outcome, FrameOutcome::Dropped { .. }));
        let sensor_id = Uuid::from_bytes(SENSOR_A).to_string();
        assert_eq!(metadata.error(&sensor_id).await.unwrap(), Some("Error: HMAC don't match".to_string()));
    }

    #[tokio::test]
    async fn duplicate_admission_is_rejected_for_the_second_session() {
        let db = InMemoryDatastore::new();
        let (metadata, streams) = bootstrapped(&db).await;

        let mut first = Session::new(
            metadata.clone(),
            streams.clone(),
            ManualEnv::new(1),
            DEFAULT_KEY.to_vec(),
            "session-1".to_string(),
            "10.0.0.1".to_string(),
        );
        let mut second = Session::new(
            metadata.clone(),
            streams,
            ManualEnv::new(1),
            DEFAULT_KEY.to_vec(),
            "session-2".to_string(),
            "10.0.0.1".to_string(),
        );

        let frame = frame_with(SENSOR_A, 1, 1, b"hello", DEFAULT_KEY);
        assert_eq!(first.process_frame(&frame).await.unwrap(), FrameOutcome::Committed);

        let outcome = second.process_frame(&frame).await.unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Aborted(SessionError::DuplicateAdmission { msg_type: 1 })
        );
    }

    #[tokio::test]
    async fn oversize_declared_size_aborts_before_any_commit() {
        let db = InMemoryDatastore::new();
        let (metadata, streams) = bootstrapped(&db).await;
        let mut session = Session::new(
            metadata,
            streams.clone(),
            ManualEnv::new(1),
            DEFAULT_KEY.to_vec(),
            "session-1".to_string(),
            "10.0.0.1".to_string(),
        );

        let mut frame = frame_with(SENSOR_A, 1, 1, b"hello", DEFAULT_KEY);
        frame.header = {
            let mut bytes = frame.raw.to_vec();
            bytes[58..62].copy_from_slice(&2_000_000u32.to_le_bytes());
            Header::decode(&bytes).unwrap()
        };

        let outcome = session.process_frame(&frame).await.unwrap();
        assert_eq!(outcome, FrameOutcome::Aborted(SessionError::OversizeFrame));
        assert_eq!(streams.len(1, "session-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stream_cap_exceeded_aborts_once_limit_reached() {
        let db = InMemoryDatastore::new();
        let (metadata, streams) = bootstrapped(&db).await;
        let sensor_id = Uuid::from_bytes(SENSOR_A).to_string();
        db.hset("stream_max_size_by_uuid", &sensor_id, "1").await.unwrap();

        let mut session = Session::new(
            metadata,
            streams,
            ManualEnv::new(1),
            DEFAULT_KEY.to_vec(),
            "session-1".to_string(),
            "10.0.0.1".to_string(),
        );

        let first = frame_with(SENSOR_A, 1, 1, b"a", DEFAULT_KEY);
        assert_eq!(session.process_frame(&first).await.unwrap(), FrameOutcome::Committed);

        let second = frame_with(SENSOR_A, 1, 2, b"b", DEFAULT_KEY);
        let outcome = session.process_frame(&second).await.unwrap();
        assert_eq!(outcome, FrameOutcome::Aborted(SessionError::StreamCapExceeded));
    }

    #[tokio::test]
    async fn split_frame_across_two_chunks_commits_once_reassembled() {
        let db = InMemoryDatastore::new();
        let (metadata, streams) = bootstrapped(&db).await;
        let mut session = Session::new(
            metadata,
            streams.clone(),
            ManualEnv::new(1),
            DEFAULT_KEY.to_vec(),
            "session-1".to_string(),
            "10.0.0.1".to_string(),
        );

        let frame_bytes = frame_with(SENSOR_A, 1, 1, b"hello", DEFAULT_KEY).raw.to_vec();
        let (first_chunk, second_chunk) = frame_bytes.split_at(30);

        let mut reassembler = crate::reassembler::Reassembler::new();
        assert!(reassembler.feed(first_chunk).is_empty());
        let frames = reassembler.feed(second_chunk);
        assert_eq!(frames.len(), 1);

        let outcome = session.process_frame(&frames[0]).await.unwrap();
        assert_eq!(outcome, FrameOutcome::Committed);
        assert_eq!(streams.len(1, "session-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn two_frames_in_one_chunk_commit_in_order() {
        let db = InMemoryDatastore::new();
        let (metadata, streams) = bootstrapped(&db).await;
        let mut session = Session::new(
            metadata,
            streams.clone(),
            ManualEnv::new(1),
            DEFAULT_KEY.to_vec(),
            "session-1".to_string(),
            "10.0.0.1".to_string(),
        );

        let first = frame_with(SENSOR_A, 1, 1, b"a", DEFAULT_KEY).raw.to_vec();
        let second = frame_with(SENSOR_A, 1, 2, b"bb", DEFAULT_KEY).raw.to_vec();
        let mut chunk = first;
        chunk.extend(second);

        let mut reassembler = crate::reassembler::Reassembler::new();
        let frames = reassembler.feed(&chunk);
        assert_eq!(frames.len(), 2);

        assert_eq!(session.process_frame(&frames[0]).await.unwrap(), FrameOutcome::Committed);
        assert_eq!(session.process_frame(&frames[1]).await.unwrap(), FrameOutcome::Committed);
        assert_eq!(streams.len(1, "session-1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn teardown_releases_active_connection_entries() {
        let db = InMemoryDatastore::new();
        let (metadata, streams) = bootstrapped(&db).await;
        let mut session = Session::new(
            metadata,
            streams.clone(),
            ManualEnv::new(1),
            DEFAULT_KEY.to_vec(),
            "session-1".to_string(),
            "10.0.0.1".to_string(),
        );

        let frame = frame_with(SENSOR_A, 1, 1, b"hello", DEFAULT_KEY);
        session.process_frame(&frame).await.unwrap();
        let sensor_id = Uuid::from_bytes(SENSOR_A).to_string();
        assert!(streams.is_active(1, "10.0.0.1", &sensor_id).await.unwrap());

        session.teardown().await.unwrap();
        assert!(!streams.is_active(1, "10.0.0.1", &sensor_id).await.unwrap());
    }
}
