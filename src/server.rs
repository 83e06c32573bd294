// ABOUTME: ISMG-side server: accept loop, per-connection worker, handler chain
// ABOUTME: Includes the active-test heartbeat that drops sessions gone quiet

//! CMPP server.
//!
//! The server accepts many client sessions concurrently. Each accepted
//! connection gets one worker task that reads requests, pre-allocates the
//! matching response record, runs the configured handler chain over
//! `(response, packet)` and writes whatever the handlers left in the
//! response. A per-connection active-test task probes the peer every `t`
//! and asks the worker to drop the session once `n` probes go unanswered.
//!
//! ```no_run
//! use std::time::Duration;
//! use cmpp::{listen_and_serve, Frame, Handler, Packet, Response, Version};
//!
//! fn handle_submit(rsp: &mut Response, pkt: &Packet) -> Result<bool, cmpp::Error> {
//!     let Frame::Cmpp3SubmitReq(req) = &pkt.frame else {
//!         return Ok(true); // not ours, next handler
//!     };
//!     if let Some(Frame::Cmpp3SubmitRsp(out)) = rsp.packer.as_mut() {
//!         out.msg_id = 12878564852733378560;
//!         assert_eq!(out.seq_id, req.seq_id);
//!     }
//!     Ok(false)
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cmpp::ServerError> {
//!     let handlers: Vec<Box<dyn Handler>> = vec![Box::new(handle_submit)];
//!     listen_and_serve(
//!         "0.0.0.0:8888",
//!         Version::V30,
//!         Duration::from_secs(5),
//!         3,
//!         handlers,
//!     )
//!     .await
//! }
//! ```

use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use socket2::{SockRef, TcpKeepalive};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::connection::{Conn, ConnError, ConnHandle};
use crate::datatypes::*;
use crate::frame::Frame;

/// Deadline for each worker read; expiry just means the peer was quiet.
const READ_PACKET_TIMEOUT: Duration = Duration::from_secs(2);

/// Keep-alive period on accepted sockets.
const ACCEPT_KEEPALIVE_PERIOD: Duration = Duration::from_secs(60);

/// Errors surfaced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cmpp server listen: empty server addr")]
    EmptyServerAddr,
    #[error("cmpp server: no connection handler")]
    NoHandlers,
    #[error("cmpp server read packet: receive a unsupported pkt")]
    UnsupportedPkt,
    #[error(transparent)]
    Conn(#[from] ConnError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One received PDU plus the session it arrived on. Handlers that need to
/// push traffic (e.g. a deliver) can clone the handle.
pub struct Packet {
    pub frame: Frame,
    pub conn: ConnHandle,
}

/// The response the worker will write back: a pre-allocated packer of the
/// matching type (or none, when the received PDU was itself a response)
/// and the request's sequence id to echo.
pub struct Response {
    pub packer: Option<Frame>,
    pub seq_id: u32,
}

/// One link of the server's handler chain.
///
/// A handler observes the received packet; when it recognizes the PDU it
/// mutates the pre-allocated response in place and returns `Ok(false)` to
/// stop the chain, otherwise `Ok(true)` to pass on. Returning an error
/// also stops the chain; the response is still written.
pub trait Handler: Send + Sync {
    fn serve_cmpp(&self, rsp: &mut Response, pkt: &Packet) -> Result<bool, crate::Error>;
}

impl<F> Handler for F
where
    F: Fn(&mut Response, &Packet) -> Result<bool, crate::Error> + Send + Sync,
{
    fn serve_cmpp(&self, rsp: &mut Response, pkt: &Packet) -> Result<bool, crate::Error> {
        self(rsp, pkt)
    }
}

fn serve_chain(
    handlers: &[Box<dyn Handler>],
    rsp: &mut Response,
    pkt: &Packet,
) -> Result<bool, crate::Error> {
    for h in handlers {
        if !h.serve_cmpp(rsp, pkt)? {
            return Ok(false);
        }
    }
    Ok(false)
}

/// A CMPP server bound to one listen address.
pub struct Server {
    addr: String,
    version: Version,
    /// Interval between two active tests.
    t: Duration,
    /// How many unanswered active tests drop the session.
    n: i32,
    handlers: Arc<Vec<Box<dyn Handler>>>,
}

impl Server {
    pub fn new(
        addr: impl Into<String>,
        version: Version,
        t: Duration,
        n: i32,
        handlers: Vec<Box<dyn Handler>>,
    ) -> Self {
        Server {
            addr: addr.into(),
            version,
            t,
            n,
            handlers: Arc::new(handlers),
        }
    }

    /// Binds the configured address and serves until the listener fails.
    pub async fn listen_and_serve(self) -> Result<(), ServerError> {
        if self.addr.is_empty() {
            return Err(ServerError::EmptyServerAddr);
        }
        if self.handlers.is_empty() {
            return Err(ServerError::NoHandlers);
        }
        let listener = TcpListener::bind(&self.addr).await?;
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener. Transient accept
    /// failures back off exponentially from 5 ms up to 1 s; anything else
    /// returns.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let mut temp_delay = Duration::ZERO;
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    temp_delay = Duration::ZERO;
                    if let Err(e) = set_accepted_keepalive(&stream) {
                        warn!(%peer, error = %e, "set keepalive on accepted socket");
                    }
                    let conn = match Conn::new(stream, self.version) {
                        Ok(c) => c,
                        Err(e) => {
                            warn!(%peer, error = %e, "wrap accepted connection");
                            continue;
                        }
                    };
                    info!(%peer, "accept a connection");
                    let worker = ServerConn {
                        conn,
                        handlers: self.handlers.clone(),
                        t: self.t,
                        n: self.n,
                        counter: Arc::new(AtomicI32::new(0)),
                        exceed: None,
                        done: None,
                    };
                    tokio::spawn(worker.serve());
                }
                Err(e) if is_temporary(&e) => {
                    temp_delay = if temp_delay.is_zero() {
                        Duration::from_millis(5)
                    } else {
                        (temp_delay * 2).min(Duration::from_secs(1))
                    };
                    warn!(error = %e, delay = ?temp_delay, "accept error; retrying");
                    time::sleep(temp_delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Listens on `addr` and serves CMPP sessions with the given handler
/// chain, version and active-test parameters.
pub async fn listen_and_serve(
    addr: impl Into<String>,
    version: Version,
    t: Duration,
    n: i32,
    handlers: Vec<Box<dyn Handler>>,
) -> Result<(), ServerError> {
    let addr = addr.into();
    if addr.is_empty() {
        return Err(ServerError::EmptyServerAddr);
    }
    if handlers.is_empty() {
        return Err(ServerError::NoHandlers);
    }
    Server::new(addr, version, t, n, handlers)
        .listen_and_serve()
        .await
}

fn set_accepted_keepalive(stream: &TcpStream) -> io::Result<()> {
    SockRef::from(stream)
        .set_tcp_keepalive(&TcpKeepalive::new().with_time(ACCEPT_KEEPALIVE_PERIOD))
}

fn is_temporary(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// The server side of one accepted session.
struct ServerConn {
    conn: Conn,
    handlers: Arc<Vec<Box<dyn Handler>>>,
    t: Duration,
    n: i32,
    /// Probes sent and not yet answered. Written by the active-test task,
    /// decremented by the worker; must stay atomic.
    counter: Arc<AtomicI32>,
    exceed: Option<oneshot::Receiver<()>>,
    done: Option<oneshot::Sender<()>>,
}

impl ServerConn {
    async fn serve(mut self) {
        let (exceed, done) =
            start_active_test(self.conn.handle(), self.counter.clone(), self.t, self.n);
        self.exceed = Some(exceed);
        self.done = Some(done);

        // A panicking handler must not leak the session.
        let outcome = AssertUnwindSafe(self.run()).catch_unwind().await;
        if let Err(panic) = outcome {
            error!(
                peer = %self.conn.peer_addr(),
                panic = panic_message(&panic),
                "panic serving connection"
            );
        }
        self.close().await;
    }

    async fn run(&mut self) {
        loop {
            if let Some(exceed) = self.exceed.as_mut() {
                if exceed.try_recv().is_ok() {
                    return;
                }
            }

            let frame = match self.conn.recv_and_unpack(READ_PACKET_TIMEOUT).await {
                Ok(f) => f,
                Err(e) if e.is_idle_timeout() => continue,
                Err(e) => {
                    debug!(peer = %self.conn.peer_addr(), error = %e, "read packet");
                    return;
                }
            };
            debug!(
                peer = %self.conn.peer_addr(),
                cmd = %frame.command_id(),
                seq_id = frame.seq_id(),
                version = %self.conn.version(),
                "receive a packet"
            );

            let (pkt, mut rsp) = match self.build_response(frame) {
                Ok(v) => v,
                Err(e) => {
                    warn!(peer = %self.conn.peer_addr(), error = %e, "read packet");
                    return;
                }
            };

            // A handler error does not end the session by itself; the
            // response (possibly carrying an error status the handler
            // set) is still written. Only a write failure is terminal.
            if let Err(e) = serve_chain(&self.handlers, &mut rsp, &pkt) {
                warn!(peer = %self.conn.peer_addr(), error = %e, "handler error");
            }

            if let Err(e) = self.finish_packet(&pkt, rsp).await {
                warn!(peer = %self.conn.peer_addr(), error = %e, "send response");
                return;
            }
        }
    }

    /// Pairs a received frame with its pre-allocated response packer.
    /// Received responses get no packer; anything outside the table is
    /// unsupported and ends the session.
    fn build_response(&self, frame: Frame) -> Result<(Packet, Response), ServerError> {
        let seq_id = frame.seq_id();
        let is_v3 = self.conn.version().is_v3();

        let packer = match &frame {
            Frame::ConnReq(_) => Some(if is_v3 {
                Frame::Cmpp3ConnRsp(Cmpp3ConnRsp {
                    seq_id,
                    ..Default::default()
                })
            } else {
                Frame::Cmpp2ConnRsp(Cmpp2ConnRsp {
                    seq_id,
                    ..Default::default()
                })
            }),
            Frame::Cmpp2SubmitReq(_) => Some(Frame::Cmpp2SubmitRsp(Cmpp2SubmitRsp {
                seq_id,
                ..Default::default()
            })),
            Frame::Cmpp3SubmitReq(_) => Some(Frame::Cmpp3SubmitRsp(Cmpp3SubmitRsp {
                seq_id,
                ..Default::default()
            })),
            Frame::Cmpp2FwdReq(_) => Some(Frame::Cmpp2FwdRsp(Cmpp2FwdRsp {
                seq_id,
                ..Default::default()
            })),
            Frame::Cmpp3FwdReq(_) => Some(Frame::Cmpp3FwdRsp(Cmpp3FwdRsp {
                seq_id,
                ..Default::default()
            })),
            Frame::ActiveTestReq(_) => Some(Frame::ActiveTestRsp(CmppActiveTestRsp {
                seq_id,
                ..Default::default()
            })),
            Frame::TerminateReq(_) => Some(Frame::TerminateRsp(CmppTerminateRsp { seq_id })),
            Frame::Cmpp2DeliverRsp(_)
            | Frame::Cmpp3DeliverRsp(_)
            | Frame::ActiveTestRsp(_)
            | Frame::TerminateRsp(_) => None,
            _ => return Err(ServerError::UnsupportedPkt),
        };

        let pkt = Packet {
            frame,
            conn: self.conn.handle(),
        };
        Ok((pkt, Response { packer, seq_id }))
    }

    async fn finish_packet(&mut self, pkt: &Packet, rsp: Response) -> Result<(), ConnError> {
        // An answered probe settles the outstanding counter; nothing goes
        // back on the wire.
        if matches!(pkt.frame, Frame::ActiveTestRsp(_)) {
            self.counter.fetch_sub(1, Ordering::SeqCst);
            return Ok(());
        }

        // A received response needs nothing sent back.
        let Some(mut packer) = rsp.packer else {
            return Ok(());
        };
        self.conn.send(&mut packer, rsp.seq_id).await
    }

    async fn close(&mut self) {
        // Best-effort TERMINATE before the socket goes down.
        if let Ok(seq_id) = self.conn.next_seq() {
            let mut req = CmppTerminateReq::default();
            if let Err(e) = self.conn.send(&mut req, seq_id).await {
                warn!(peer = %self.conn.peer_addr(), error = %e, "send terminate request");
            }
        }

        self.done.take(); // dropping the sender stops the active-test task
        info!(peer = %self.conn.peer_addr(), "close connection");
        self.conn.close().await;
    }
}

/// Spawns the per-connection active-test task.
///
/// Every `t` the task checks the outstanding counter: at `n` or above it
/// signals `exceed` (at most once) and stops; otherwise it sends one
/// ACTIVE_TEST request under a fresh sequence id and increments the
/// counter. Send failures are logged but not counted. Dropping the
/// returned `done` sender stops the task.
fn start_active_test(
    conn: ConnHandle,
    counter: Arc<AtomicI32>,
    t: Duration,
    n: i32,
) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
    let (exceed_tx, exceed_rx) = oneshot::channel();
    let (done_tx, mut done_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + t, t);
        loop {
            tokio::select! {
                _ = &mut done_rx => return,
                _ = ticker.tick() => {
                    if counter.load(Ordering::SeqCst) >= n {
                        warn!(
                            peer = %conn.peer_addr(),
                            times = n,
                            "no active test response returned"
                        );
                        let _ = exceed_tx.send(());
                        return;
                    }
                    let seq_id = match conn.next_seq() {
                        Ok(s) => s,
                        Err(_) => return, // session already closed
                    };
                    let mut probe = CmppActiveTestReq::default();
                    match conn.send(&mut probe, seq_id).await {
                        Ok(()) => {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            warn!(peer = %conn.peer_addr(), error = %e, "send active test request");
                        }
                    }
                }
            }
        }
    });

    (exceed_rx, done_tx)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
