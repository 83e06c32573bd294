// ABOUTME: Client-side session orchestration: dial, authenticate, steady-state traffic
// ABOUTME: Thin layer over Conn that owns the CONNECT handshake and its teardown

//! CMPP client.
//!
//! A [`Client`] is one client-side session: it dials the ISMG, runs the
//! CONNECT handshake, then exposes plain send/receive until the session
//! is torn down.
//!
//! ```no_run
//! use std::time::Duration;
//! use cmpp::{Client, Cmpp3SubmitReq, Frame, Version};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new(Version::V30);
//!     client
//!         .connect("ismg.example.com:7890", "900001", "888888", Duration::from_secs(5))
//!         .await?;
//!
//!     let mut submit = Cmpp3SubmitReq {
//!         msg_src: "900001".to_string(),
//!         src_id: "900001".to_string(),
//!         dest_usr_tl: 1,
//!         dest_terminal_id: vec!["13500002696".to_string()],
//!         ..Default::default()
//!     };
//!     let seq_id = client.send_req_pkt(&mut submit).await?;
//!
//!     if let Frame::Cmpp3SubmitRsp(rsp) = client.recv_and_unpack(Duration::from_secs(5)).await? {
//!         assert_eq!(rsp.seq_id, seq_id);
//!     }
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

use crate::codec::Packable;
use crate::connection::{Conn, ConnError, State};
use crate::datatypes::{CmppConnReq, ConnectError, Version};
use crate::frame::Frame;

/// Errors surfaced by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The CONNECT reply was not the expected response variant.
    #[error("the response is not matched with the request")]
    RespNotMatch,
    /// The ISMG refused the login.
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Conn(#[from] ConnError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One client-side CMPP session.
pub struct Client {
    conn: Option<Conn>,
    version: Version,
}

impl Client {
    pub fn new(version: Version) -> Self {
        Client {
            conn: None,
            version,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Dials the server and runs the CONNECT handshake in block mode.
    ///
    /// `timeout` applies to the dial and to each framer read of the
    /// response. On any failure the half-built session is closed before
    /// the error returns.
    pub async fn connect(
        &mut self,
        addr: &str,
        user: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        let stream = dial(addr, timeout).await?;
        let mut conn = Conn::new(stream, self.version)?;

        match handshake(&mut conn, self.version, user, password, timeout).await {
            Ok(()) => {
                conn.set_state(State::AuthOk);
                debug!(addr, user, version = %self.version, "login ok");
                self.conn = Some(conn);
                Ok(())
            }
            Err(e) => {
                conn.close().await;
                Err(e)
            }
        }
    }

    /// Sends a request packet under a freshly allocated sequence id and
    /// returns that id so the caller can pair the response.
    pub async fn send_req_pkt(&mut self, pdu: &mut dyn Packable) -> Result<u32, ClientError> {
        let conn = self.conn()?;
        let seq_id = conn.next_seq()?;
        conn.send(pdu, seq_id).await?;
        Ok(seq_id)
    }

    /// Sends a response packet under the sequence id of the request it
    /// answers.
    pub async fn send_rsp_pkt(
        &mut self,
        pdu: &mut dyn Packable,
        seq_id: u32,
    ) -> Result<(), ClientError> {
        self.conn()?.send(pdu, seq_id).await?;
        Ok(())
    }

    /// Receives one frame; see [`Conn::recv_and_unpack`].
    pub async fn recv_and_unpack(&mut self, timeout: Duration) -> Result<Frame, ClientError> {
        let frame = self.conn()?.recv_and_unpack(timeout).await?;
        Ok(frame)
    }

    /// Closes the session. Safe to call on an unconnected client.
    pub async fn disconnect(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
        }
    }

    fn conn(&mut self) -> Result<&mut Conn, ClientError> {
        self.conn
            .as_mut()
            .ok_or(ClientError::Conn(ConnError::ConnectionClosed))
    }
}

async fn dial(addr: &str, timeout: Duration) -> io::Result<TcpStream> {
    if timeout.is_zero() {
        return TcpStream::connect(addr).await;
    }
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(res) => res,
        Err(_) => Err(io::ErrorKind::TimedOut.into()),
    }
}

async fn handshake(
    conn: &mut Conn,
    version: Version,
    user: &str,
    password: &str,
    timeout: Duration,
) -> Result<(), ClientError> {
    let mut req = CmppConnReq {
        src_addr: user.to_string(),
        secret: password.to_string(),
        version: version as u8,
        ..Default::default()
    };
    let seq_id = conn.next_seq()?;
    conn.send(&mut req, seq_id).await?;

    let status = match conn.recv_and_unpack(timeout).await? {
        Frame::Cmpp2ConnRsp(rsp) if !version.is_v3() => u32::from(rsp.status),
        Frame::Cmpp3ConnRsp(rsp) if version.is_v3() => rsp.status,
        _ => return Err(ClientError::RespNotMatch),
    };

    match ConnectError::from_status(status) {
        None => Ok(()),
        Some(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Packable, Unpackable};
    use crate::datatypes::{auth_src, timestamp_to_str, Cmpp3ConnRsp};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const USER: &str = "900001";
    const PASSWORD: &str = "888888";

    /// Accepts one connection and answers the CONNECT request with the
    /// given V3 status.
    async fn one_shot_ismg(listener: TcpListener, status: u32) {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut head = [0u8; 12];
        stream.read_exact(&mut head).await.unwrap();
        let total_len = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as usize;
        let mut body = vec![0u8; total_len - 12];
        stream.read_exact(&mut body).await.unwrap();

        let mut full = head[8..].to_vec();
        full.extend_from_slice(&body);
        let req = CmppConnReq::unpack(&full).unwrap();
        assert_eq!(req.src_addr, USER);
        let expected = auth_src(USER, PASSWORD, &timestamp_to_str(req.timestamp));
        assert_eq!(req.auth_src, expected);

        let mut rsp = Cmpp3ConnRsp {
            status,
            version: 0x30,
            secret: PASSWORD.to_string(),
            auth_src: req.auth_src,
            ..Default::default()
        };
        let data = rsp.pack(req.seq_id).unwrap();
        stream.write_all(&data).await.unwrap();
        // Hold the socket open until the client is done with it.
        let _ = stream.read(&mut [0u8; 1]).await;
    }

    #[tokio::test]
    async fn connect_reaches_auth_ok_on_zero_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(one_shot_ismg(listener, 0));

        let mut client = Client::new(Version::V30);
        client
            .connect(&addr.to_string(), USER, PASSWORD, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(client.conn.as_ref().unwrap().state(), State::AuthOk);

        client.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_maps_nonzero_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(one_shot_ismg(listener, 3));

        let mut client = Client::new(Version::V30);
        let err = client
            .connect(&addr.to_string(), USER, PASSWORD, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Connect(ConnectError::AuthFailed)
        ));
        // Session was torn down.
        assert!(client.conn.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_status_maps_to_others() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(one_shot_ismg(listener, 200));

        let mut client = Client::new(Version::V30);
        let err = client
            .connect(&addr.to_string(), USER, PASSWORD, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Connect(ConnectError::Others)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn send_on_unconnected_client_fails() {
        let mut client = Client::new(Version::V30);
        let mut req = crate::datatypes::CmppActiveTestReq::default();
        let err = client.send_req_pkt(&mut req).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Conn(ConnError::ConnectionClosed)
        ));
    }
}
