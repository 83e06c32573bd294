//! CONNECT request and its version-specific responses.
//!
//! The request authenticates with `MD5(src_addr + 9 NUL bytes + secret +
//! timestamp)`, where the timestamp is the 10-digit decimal MMDDHHMMSS
//! clock. The response authenticates back with `MD5(status + auth_src +
//! secret)`; the status contributes one octet in V2 and four big-endian
//! octets in V3.

use bytes::Bytes;
use chrono::Local;
use md5::{Digest, Md5};
use thiserror::Error;

use crate::codec::{Packable, PacketReader, PacketWriter, Unpackable, CMPP_HEADER_LEN};
use crate::datatypes::CommandId;

pub const CMPP_CONN_REQ_PKT_LEN: u32 = CMPP_HEADER_LEN + 6 + 16 + 1 + 4; // 39
pub const CMPP2_CONN_RSP_PKT_LEN: u32 = CMPP_HEADER_LEN + 1 + 16 + 1; // 30
pub const CMPP3_CONN_RSP_PKT_LEN: u32 = CMPP_HEADER_LEN + 4 + 16 + 1; // 33

/// Non-zero CONNECT response status, mapped to an error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    #[error("connect response status: invalid protocol structure")]
    InvalidStruct,
    #[error("connect response status: invalid source address")]
    InvalidSrcAddr,
    #[error("connect response status: auth failed")]
    AuthFailed,
    #[error("connect response status: protocol version is too high")]
    VersionTooHigh,
    #[error("connect response status: other errors")]
    Others,
}

impl ConnectError {
    /// Maps a response status to its error; `0` is success. Unknown
    /// non-zero codes collapse to [`ConnectError::Others`].
    pub fn from_status(status: u32) -> Option<Self> {
        match status {
            0 => None,
            1 => Some(ConnectError::InvalidStruct),
            2 => Some(ConnectError::InvalidSrcAddr),
            3 => Some(ConnectError::AuthFailed),
            4 => Some(ConnectError::VersionTooHigh),
            _ => Some(ConnectError::Others),
        }
    }

    /// The wire status code for this error.
    pub fn status(self) -> u8 {
        match self {
            ConnectError::InvalidStruct => 1,
            ConnectError::InvalidSrcAddr => 2,
            ConnectError::AuthFailed => 3,
            ConnectError::VersionTooHigh => 4,
            ConnectError::Others => 5,
        }
    }
}

/// Renders a MMDDHHMMSS timestamp as its 10-digit zero-padded decimal
/// string, the form that feeds the authenticator digest.
pub fn timestamp_to_str(t: u32) -> String {
    format!("{t:010}")
}

fn now_timestamp() -> (String, u32) {
    let s = Local::now().format("%m%d%H%M%S").to_string();
    let n = s.parse::<u32>().expect("MMDDHHMMSS fits in u32");
    (s, n)
}

/// Computes `auth_src` for a CONNECT request.
pub fn auth_src(src_addr: &str, secret: &str, timestamp: &str) -> [u8; 16] {
    let mut h = Md5::new();
    h.update(src_addr.as_bytes());
    h.update([0u8; 9]);
    h.update(secret.as_bytes());
    h.update(timestamp.as_bytes());
    h.finalize().into()
}

fn auth_ismg(status_bytes: &[u8], auth_src: &[u8; 16], secret: &str) -> [u8; 16] {
    let mut h = Md5::new();
    h.update(status_bytes);
    h.update(auth_src);
    h.update(secret.as_bytes());
    h.finalize().into()
}

/// CONNECT request, sent by the client side (SP) to log in to the ISMG.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CmppConnReq {
    pub src_addr: String,
    pub auth_src: [u8; 16],
    pub version: u8,
    /// MMDDHHMMSS as a decimal integer. Left at zero, pack substitutes
    /// the current local time.
    pub timestamp: u32,
    pub secret: String,

    pub seq_id: u32,
}

impl Packable for CmppConnReq {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP_CONN_REQ_PKT_LEN;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::Connect as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        let ts = if self.timestamp == 0 {
            let (s, n) = now_timestamp();
            self.timestamp = n;
            s
        } else {
            timestamp_to_str(self.timestamp)
        };

        w.write_fixed_string(&self.src_addr, 6);

        self.auth_src = auth_src(&self.src_addr, &self.secret, &ts);
        w.write_bytes(&self.auth_src);

        w.write_u8(self.version);
        w.write_u32(self.timestamp);

        w.into_bytes()
    }
}

impl Unpackable for CmppConnReq {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let p = CmppConnReq {
            seq_id: r.read_u32(),
            src_addr: r.read_cstring(6),
            auth_src: r.read_array::<16>(),
            version: r.read_u8(),
            timestamp: r.read_u32(),
            secret: String::new(),
        };
        r.finish()?;
        Ok(p)
    }
}

/// CONNECT response in the V2 layout: one status octet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp2ConnRsp {
    pub status: u8,
    pub auth_ismg: [u8; 16],
    pub version: u8,
    pub secret: String,
    pub auth_src: [u8; 16],

    pub seq_id: u32,
}

impl Packable for Cmpp2ConnRsp {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP2_CONN_RSP_PKT_LEN;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::ConnectResp as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.write_u8(self.status);

        self.auth_ismg = auth_ismg(&[self.status], &self.auth_src, &self.secret);
        w.write_bytes(&self.auth_ismg);

        w.write_u8(self.version);

        w.into_bytes()
    }
}

impl Unpackable for Cmpp2ConnRsp {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let p = Cmpp2ConnRsp {
            seq_id: r.read_u32(),
            status: r.read_u8(),
            auth_ismg: r.read_array::<16>(),
            version: r.read_u8(),
            secret: String::new(),
            auth_src: [0; 16],
        };
        r.finish()?;
        Ok(p)
    }
}

/// CONNECT response in the V3 layout: four status octets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp3ConnRsp {
    pub status: u32,
    pub auth_ismg: [u8; 16],
    pub version: u8,
    pub secret: String,
    pub auth_src: [u8; 16],

    pub seq_id: u32,
}

impl Packable for Cmpp3ConnRsp {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP3_CONN_RSP_PKT_LEN;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::ConnectResp as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.write_u32(self.status);

        self.auth_ismg = auth_ismg(&self.status.to_be_bytes(), &self.auth_src, &self.secret);
        w.write_bytes(&self.auth_ismg);

        w.write_u8(self.version);

        w.into_bytes()
    }
}

impl Unpackable for Cmpp3ConnRsp {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let p = Cmpp3ConnRsp {
            seq_id: r.read_u32(),
            status: r.read_u32(),
            auth_ismg: r.read_array::<16>(),
            version: r.read_u8(),
            secret: String::new(),
            auth_src: [0; 16],
        };
        r.finish()?;
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC_ADDR: &str = "900001";
    const SECRET: &str = "888888";
    const TIMESTAMP: u32 = 1021080510;
    const SEQ_ID: u32 = 0x17;

    const AUTH_SRC: [u8; 16] = [
        0x90, 0xd0, 0x0c, 0x1d, 0x51, 0x7a, 0xbd, 0x0b, 0x4f, 0x65, 0xf6, 0xbc, 0xf8, 0x53, 0x5d,
        0x16,
    ];

    #[test]
    fn conn_req_pack() {
        let mut p = CmppConnReq {
            src_addr: SRC_ADDR.to_string(),
            secret: SECRET.to_string(),
            version: 0x21,
            timestamp: TIMESTAMP,
            ..Default::default()
        };

        let data = p.pack(SEQ_ID).unwrap();
        assert_eq!(p.seq_id, SEQ_ID);

        let expected: [u8; 39] = [
            0x00, 0x00, 0x00, 0x27, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x17, 0x39, 0x30,
            0x30, 0x30, 0x30, 0x31, 0x90, 0xd0, 0x0c, 0x1d, 0x51, 0x7a, 0xbd, 0x0b, 0x4f, 0x65,
            0xf6, 0xbc, 0xf8, 0x53, 0x5d, 0x16, 0x21, 0x3c, 0xdc, 0x73, 0xbe,
        ];
        assert_eq!(&data[..], &expected[..]);
    }

    #[test]
    fn conn_req_unpack() {
        let data: [u8; 39] = [
            0x00, 0x00, 0x00, 0x27, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x17, 0x39, 0x30,
            0x30, 0x30, 0x30, 0x31, 0x90, 0xd0, 0x0c, 0x1d, 0x51, 0x7a, 0xbd, 0x0b, 0x4f, 0x65,
            0xf6, 0xbc, 0xf8, 0x53, 0x5d, 0x16, 0x21, 0x3c, 0xdc, 0x73, 0xbe,
        ];

        let p = CmppConnReq::unpack(&data[8..]).unwrap();
        assert_eq!(p.seq_id, SEQ_ID);
        assert_eq!(p.src_addr, SRC_ADDR);
        assert_eq!(p.version, 0x21);
        assert_eq!(p.timestamp, TIMESTAMP);
        assert_eq!(p.auth_src, AUTH_SRC);
    }

    #[test]
    fn cmpp2_conn_rsp_round_trip() {
        let expected: [u8; 30] = [
            0x00, 0x00, 0x00, 0x1e, 0x80, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x17, 0x00, 0x6c,
            0x0b, 0x84, 0x6e, 0x25, 0xba, 0xb6, 0xda, 0xa4, 0xed, 0x1c, 0x46, 0x6e, 0x0f, 0x4b,
            0xd8, 0x21,
        ];

        let mut p = Cmpp2ConnRsp {
            status: 0,
            version: 0x21,
            secret: SECRET.to_string(),
            auth_src: AUTH_SRC,
            ..Default::default()
        };
        let data = p.pack(SEQ_ID).unwrap();
        assert_eq!(&data[..], &expected[..]);

        let q = Cmpp2ConnRsp::unpack(&expected[8..]).unwrap();
        assert_eq!(q.seq_id, SEQ_ID);
        assert_eq!(q.status, 0);
        assert_eq!(q.version, 0x21);
        assert_eq!(q.auth_ismg, p.auth_ismg);
    }

    #[test]
    fn cmpp3_conn_rsp_round_trip() {
        let expected: [u8; 33] = [
            0x00, 0x00, 0x00, 0x21, 0x80, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x17, 0x00, 0x00,
            0x00, 0x00, 0x79, 0x42, 0x97, 0x72, 0x74, 0x09, 0x8c, 0xf2, 0x10, 0xab, 0x0c, 0x16,
            0xc3, 0x67, 0xbc, 0x8d, 0x30,
        ];

        let mut p = Cmpp3ConnRsp {
            status: 0,
            version: 0x30,
            secret: SECRET.to_string(),
            auth_src: AUTH_SRC,
            ..Default::default()
        };
        let data = p.pack(SEQ_ID).unwrap();
        assert_eq!(&data[..], &expected[..]);

        let q = Cmpp3ConnRsp::unpack(&expected[8..]).unwrap();
        assert_eq!(q.seq_id, SEQ_ID);
        assert_eq!(q.status, 0);
        assert_eq!(q.version, 0x30);
        assert_eq!(q.auth_ismg, p.auth_ismg);
    }

    #[test]
    fn status_error_mapping() {
        assert_eq!(ConnectError::from_status(0), None);
        assert_eq!(ConnectError::from_status(3), Some(ConnectError::AuthFailed));
        assert_eq!(ConnectError::from_status(5), Some(ConnectError::Others));
        // Unknown non-zero codes collapse to "others".
        assert_eq!(ConnectError::from_status(77), Some(ConnectError::Others));
        assert_eq!(ConnectError::AuthFailed.status(), 3);
    }

    #[test]
    fn timestamp_is_zero_padded() {
        assert_eq!(timestamp_to_str(102030405), "0102030405");
        assert_eq!(timestamp_to_str(1021080510), "1021080510");
    }
}
