// ABOUTME: Wraps a TCP endpoint into a CMPP session with framing and sequencing
// ABOUTME: Owns the state machine, per-read deadlines and the reusable body buffer

//! CMPP session over a TCP connection.
//!
//! A session moves through three states:
//!
//! ```text
//! CLOSED -> CONNECTED -> AUTH_OK -> CLOSED
//! ```
//!
//! `CONNECTED` on socket establishment, `AUTH_OK` only on a zero CONNECT
//! response status, `CLOSED` on any close call (idempotent) or a fatal
//! framer error. A session is single-use.
//!
//! The read half and the scratch buffer stay with [`Conn`] (one reader
//! per session); the write half, state and sequence counter live behind
//! a cloneable [`ConnHandle`] so the server's active-test task can send
//! probes while the worker sits in a read.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time;
use tracing::debug;

use crate::codec::{OpError, Packable, Unpackable};
use crate::datatypes::*;
use crate::frame::Frame;

/// Errors produced by session operations.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("connection is closed")]
    ConnectionClosed,
    #[error("total_length in packet data is invalid")]
    TotalLengthInvalid,
    #[error("command_id in packet data is invalid")]
    CommandIdInvalid,
    #[error("command_id in packet data is not supported")]
    CommandIdNotSupported,
    #[error("read command_id timeout")]
    ReadCmdIdTimeout,
    #[error("read packet body timeout")]
    ReadPktBodyTimeout,
    #[error("data not being handled completed")]
    NotCompleted,
    #[error(transparent)]
    Codec(#[from] OpError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ConnError {
    /// True for the deadline expiring on the first header read, i.e. the
    /// peer was simply quiet. Timeouts mid-frame are not idle: the stream
    /// position is unknowable and the session has to go down.
    pub fn is_idle_timeout(&self) -> bool {
        matches!(self, ConnError::Io(e) if e.kind() == io::ErrorKind::TimedOut)
    }
}

/// Session states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Closed = 0,
    Connected = 1,
    AuthOk = 2,
}

struct Shared {
    writer: Mutex<OwnedWriteHalf>,
    state: AtomicU8,
    seq: AtomicU32,
    version: Version,
    peer_addr: SocketAddr,
}

impl Shared {
    fn state(&self) -> State {
        match self.state.load(Ordering::Acquire) {
            0 => State::Closed,
            1 => State::Connected,
            _ => State::AuthOk,
        }
    }

    fn set_state(&self, state: State) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn next_seq(&self) -> Result<u32, ConnError> {
        if self.state() == State::Closed {
            return Err(ConnError::ConnectionClosed);
        }
        // Returns the current value and increments; wraparound back to 0
        // is benign because requests pair by echoed seq_id.
        Ok(self.seq.fetch_add(1, Ordering::Relaxed))
    }

    async fn send(&self, pdu: &mut dyn Packable, seq_id: u32) -> Result<(), ConnError> {
        if self.state() == State::Closed {
            return Err(ConnError::ConnectionClosed);
        }
        let data = pdu.pack(seq_id)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&data).await?;
        Ok(())
    }
}

/// Cloneable sending side of a session: sequence ids, packed writes and
/// state, shared between the worker and the heartbeat task.
#[derive(Clone)]
pub struct ConnHandle(Arc<Shared>);

impl ConnHandle {
    pub fn version(&self) -> Version {
        self.0.version
    }

    pub fn state(&self) -> State {
        self.0.state()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.0.peer_addr
    }

    /// Hands out the next sequence id. Fails once the session is closed.
    pub fn next_seq(&self) -> Result<u32, ConnError> {
        self.0.next_seq()
    }

    /// Packs the PDU and writes it in one locked, blocking write.
    pub async fn send(&self, pdu: &mut dyn Packable, seq_id: u32) -> Result<(), ConnError> {
        self.0.send(pdu, seq_id).await
    }
}

/// One CMPP session. Created on dial (client) or accept (server).
pub struct Conn {
    reader: OwnedReadHalf,
    shared: Arc<Shared>,
    // Reused across frames; capacity covers the version's max packet so
    // steady-state reads never allocate.
    body_buf: Vec<u8>,
}

impl Conn {
    /// Wraps an established stream. Enables TCP keep-alive and starts the
    /// session in `Connected`.
    pub fn new(stream: TcpStream, version: Version) -> io::Result<Self> {
        SockRef::from(&stream).set_tcp_keepalive(&TcpKeepalive::new())?;
        let peer_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();

        Ok(Conn {
            reader,
            shared: Arc::new(Shared {
                writer: Mutex::new(writer),
                state: AtomicU8::new(State::Connected as u8),
                seq: AtomicU32::new(0),
                version,
                peer_addr,
            }),
            body_buf: Vec::with_capacity(version.max_packet_len() as usize),
        })
    }

    pub fn version(&self) -> Version {
        self.shared.version
    }

    pub fn state(&self) -> State {
        self.shared.state()
    }

    pub fn set_state(&self, state: State) {
        self.shared.set_state(state);
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.peer_addr
    }

    /// A cloneable handle over the sending side of this session.
    pub fn handle(&self) -> ConnHandle {
        ConnHandle(self.shared.clone())
    }

    /// Hands out the next sequence id. Fails once the session is closed.
    pub fn next_seq(&self) -> Result<u32, ConnError> {
        self.shared.next_seq()
    }

    /// Packs the PDU and writes it to the peer.
    pub async fn send(&self, pdu: &mut dyn Packable, seq_id: u32) -> Result<(), ConnError> {
        self.shared.send(pdu, seq_id).await
    }

    /// Reads one frame off the wire and unpacks it into the record picked
    /// by `(command_id, version)`.
    ///
    /// With a non-zero `timeout` each of the three reads (total_length,
    /// command_id, remainder) runs under its own deadline. The deadline
    /// expiring on the first read surfaces as an `io::ErrorKind::TimedOut`
    /// error (see [`ConnError::is_idle_timeout`]); on the later reads it
    /// maps to `ReadCmdIdTimeout` / `ReadPktBodyTimeout`.
    pub async fn recv_and_unpack(&mut self, timeout: Duration) -> Result<Frame, ConnError> {
        if self.shared.state() == State::Closed {
            return Err(ConnError::ConnectionClosed);
        }
        let version = self.shared.version;

        // Total_Length
        let mut word = [0u8; 4];
        read_exact_deadline(&mut self.reader, &mut word, timeout).await?;
        let total_len = u32::from_be_bytes(word);
        if total_len < version.min_packet_len() || total_len > version.max_packet_len() {
            return Err(ConnError::TotalLengthInvalid);
        }

        // Command_Id
        read_exact_deadline(&mut self.reader, &mut word, timeout)
            .await
            .map_err(|e| {
                if e.kind() == io::ErrorKind::TimedOut {
                    ConnError::ReadCmdIdTimeout
                } else {
                    ConnError::Io(e)
                }
            })?;
        let raw_id = u32::from_be_bytes(word);
        if !CommandId::is_valid_raw(raw_id) {
            return Err(ConnError::CommandIdInvalid);
        }

        // The rest of the packet, starting at seq_id.
        let body_len = (total_len - 8) as usize;
        self.body_buf.resize(body_len, 0);
        read_exact_deadline(&mut self.reader, &mut self.body_buf[..body_len], timeout)
            .await
            .map_err(|e| {
                if e.kind() == io::ErrorKind::TimedOut {
                    ConnError::ReadPktBodyTimeout
                } else {
                    ConnError::Io(e)
                }
            })?;
        let data = &self.body_buf[..body_len];

        let command_id =
            CommandId::try_from(raw_id).map_err(|_| ConnError::CommandIdNotSupported)?;

        let frame = match command_id {
            CommandId::Connect => Frame::ConnReq(CmppConnReq::unpack(data)?),
            CommandId::ConnectResp => {
                if version.is_v3() {
                    Frame::Cmpp3ConnRsp(Cmpp3ConnRsp::unpack(data)?)
                } else {
                    Frame::Cmpp2ConnRsp(Cmpp2ConnRsp::unpack(data)?)
                }
            }
            CommandId::Terminate => Frame::TerminateReq(CmppTerminateReq::unpack(data)?),
            CommandId::TerminateResp => Frame::TerminateRsp(CmppTerminateRsp::unpack(data)?),
            CommandId::Submit => {
                if version.is_v3() {
                    Frame::Cmpp3SubmitReq(Box::new(Cmpp3SubmitReq::unpack(data)?))
                } else {
                    Frame::Cmpp2SubmitReq(Box::new(Cmpp2SubmitReq::unpack(data)?))
                }
            }
            CommandId::SubmitResp => {
                if version.is_v3() {
                    Frame::Cmpp3SubmitRsp(Cmpp3SubmitRsp::unpack(data)?)
                } else {
                    Frame::Cmpp2SubmitRsp(Cmpp2SubmitRsp::unpack(data)?)
                }
            }
            CommandId::Deliver => {
                if version.is_v3() {
                    Frame::Cmpp3DeliverReq(Box::new(Cmpp3DeliverReq::unpack(data)?))
                } else {
                    Frame::Cmpp2DeliverReq(Box::new(Cmpp2DeliverReq::unpack(data)?))
                }
            }
            CommandId::DeliverResp => {
                if version.is_v3() {
                    Frame::Cmpp3DeliverRsp(Cmpp3DeliverRsp::unpack(data)?)
                } else {
                    Frame::Cmpp2DeliverRsp(Cmpp2DeliverRsp::unpack(data)?)
                }
            }
            CommandId::Fwd => {
                if version.is_v3() {
                    Frame::Cmpp3FwdReq(Box::new(Cmpp3FwdReq::unpack(data)?))
                } else {
                    Frame::Cmpp2FwdReq(Box::new(Cmpp2FwdReq::unpack(data)?))
                }
            }
            CommandId::FwdResp => {
                if version.is_v3() {
                    Frame::Cmpp3FwdRsp(Cmpp3FwdRsp::unpack(data)?)
                } else {
                    Frame::Cmpp2FwdRsp(Cmpp2FwdRsp::unpack(data)?)
                }
            }
            CommandId::ActiveTest => Frame::ActiveTestReq(CmppActiveTestReq::unpack(data)?),
            CommandId::ActiveTestResp => Frame::ActiveTestRsp(CmppActiveTestRsp::unpack(data)?),
            // Query, Cancel and the route family are enumerated but not
            // dispatched.
            _ => return Err(ConnError::CommandIdNotSupported),
        };
        Ok(frame)
    }

    /// Closes the session: stops the sequence id producer, shuts the
    /// socket down, moves to `Closed`. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.shared.state.swap(State::Closed as u8, Ordering::AcqRel) == State::Closed as u8 {
            return;
        }
        debug!(peer = %self.shared.peer_addr, "session closed");
        let mut writer = self.shared.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

async fn read_exact_deadline(
    reader: &mut OwnedReadHalf,
    buf: &mut [u8],
    timeout: Duration,
) -> io::Result<()> {
    if timeout.is_zero() {
        reader.read_exact(buf).await?;
        return Ok(());
    }
    match time::timeout(timeout, reader.read_exact(buf)).await {
        Ok(res) => res.map(|_| ()),
        Err(_) => Err(io::ErrorKind::TimedOut.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// A connected pair: the left side a `Conn`, the right side raw.
    async fn conn_pair(version: Version) -> (Conn, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (Conn::new(server, version).unwrap(), client)
    }

    #[tokio::test]
    async fn send_and_recv_one_frame() {
        let (mut conn, mut peer) = conn_pair(Version::V30).await;

        let mut req = CmppActiveTestReq::default();
        let data = req.pack(5).unwrap();
        peer.write_all(&data).await.unwrap();

        let frame = conn.recv_and_unpack(Duration::ZERO).await.unwrap();
        match frame {
            Frame::ActiveTestReq(p) => assert_eq!(p.seq_id, 5),
            other => panic!("expected ActiveTestReq, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn total_length_out_of_range_is_rejected() {
        // 8 < min: rejected before any body read.
        let (mut conn, mut peer) = conn_pair(Version::V21).await;
        peer.write_all(&8u32.to_be_bytes()).await.unwrap();
        let err = conn.recv_and_unpack(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ConnError::TotalLengthInvalid));

        // Above the V2 max.
        let (mut conn, mut peer) = conn_pair(Version::V21).await;
        peer.write_all(&2478u32.to_be_bytes()).await.unwrap();
        let err = conn.recv_and_unpack(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ConnError::TotalLengthInvalid));

        // 3000 is valid for V3 but not V2.
        let (mut conn, mut peer) = conn_pair(Version::V30).await;
        peer.write_all(&3000u32.to_be_bytes()).await.unwrap();
        peer.write_all(&(CommandId::Submit as u32).to_be_bytes())
            .await
            .unwrap();
        // No body follows, so the framer must get past validation and
        // block on the body read.
        let err = conn
            .recv_and_unpack(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnError::ReadPktBodyTimeout));
    }

    #[tokio::test]
    async fn command_id_outside_ranges_is_invalid() {
        let (mut conn, mut peer) = conn_pair(Version::V30).await;
        peer.write_all(&12u32.to_be_bytes()).await.unwrap();
        peer.write_all(&0x7fff_ffffu32.to_be_bytes()).await.unwrap();
        let err = conn.recv_and_unpack(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ConnError::CommandIdInvalid));
    }

    #[tokio::test]
    async fn route_family_id_is_not_supported() {
        let (mut conn, mut peer) = conn_pair(Version::V30).await;
        peer.write_all(&12u32.to_be_bytes()).await.unwrap();
        peer.write_all(&(CommandId::MtRoute as u32).to_be_bytes())
            .await
            .unwrap();
        peer.write_all(&7u32.to_be_bytes()).await.unwrap(); // seq_id
        let err = conn.recv_and_unpack(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ConnError::CommandIdNotSupported));
    }

    #[tokio::test]
    async fn submit_rsp_dispatch_follows_session_version() {
        // The same CMPP_SUBMIT_RESP id decodes to the V2 record on a V2
        // session...
        let (mut conn, mut peer) = conn_pair(Version::V21).await;
        let mut rsp = Cmpp2SubmitRsp {
            msg_id: 99,
            result: 0,
            seq_id: 0,
        };
        peer.write_all(&rsp.pack(11).unwrap()).await.unwrap();
        let frame = conn.recv_and_unpack(Duration::ZERO).await.unwrap();
        assert!(matches!(frame, Frame::Cmpp2SubmitRsp(p) if p.msg_id == 99 && p.seq_id == 11));

        // ...and to the V3 record on a V3 session.
        let (mut conn, mut peer) = conn_pair(Version::V30).await;
        let mut rsp = Cmpp3SubmitRsp {
            msg_id: 99,
            result: 0,
            seq_id: 0,
        };
        peer.write_all(&rsp.pack(12).unwrap()).await.unwrap();
        let frame = conn.recv_and_unpack(Duration::ZERO).await.unwrap();
        assert!(matches!(frame, Frame::Cmpp3SubmitRsp(p) if p.msg_id == 99 && p.seq_id == 12));
    }

    #[tokio::test]
    async fn idle_timeout_is_distinguishable() {
        let (mut conn, _peer) = conn_pair(Version::V30).await;
        let err = conn
            .recv_and_unpack(Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(err.is_idle_timeout());
    }

    #[tokio::test]
    async fn seq_ids_are_monotonic_and_stop_on_close() {
        let (mut conn, _peer) = conn_pair(Version::V30).await;
        assert_eq!(conn.next_seq().unwrap(), 0);
        assert_eq!(conn.next_seq().unwrap(), 1);
        assert_eq!(conn.next_seq().unwrap(), 2);

        conn.close().await;
        assert!(matches!(
            conn.next_seq(),
            Err(ConnError::ConnectionClosed)
        ));
        // Idempotent.
        conn.close().await;
        assert_eq!(conn.state(), State::Closed);
    }

    #[tokio::test]
    async fn closed_session_fails_fast() {
        let (mut conn, _peer) = conn_pair(Version::V30).await;
        conn.close().await;

        let mut req = CmppActiveTestReq::default();
        assert!(matches!(
            conn.send(&mut req, 1).await,
            Err(ConnError::ConnectionClosed)
        ));
        assert!(matches!(
            conn.recv_and_unpack(Duration::ZERO).await,
            Err(ConnError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn handle_sends_while_conn_is_reading() {
        let (mut conn, mut peer) = conn_pair(Version::V30).await;
        let handle = conn.handle();

        let reader = tokio::spawn(async move {
            conn.recv_and_unpack(Duration::from_secs(2)).await
        });

        // Probe from the handle while the read is pending.
        let seq = handle.next_seq().unwrap();
        let mut probe = CmppActiveTestReq::default();
        handle.send(&mut probe, seq).await.unwrap();

        let mut buf = [0u8; 12];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[4..8], &(CommandId::ActiveTest as u32).to_be_bytes());

        // Answer so the pending read resolves.
        let mut rsp = CmppActiveTestRsp::default();
        peer.write_all(&rsp.pack(seq).unwrap()).await.unwrap();
        let frame = reader.await.unwrap().unwrap();
        assert!(matches!(frame, Frame::ActiveTestRsp(p) if p.seq_id == seq));
    }
}
