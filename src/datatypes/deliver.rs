//! DELIVER request/response in both wire layouts. When
//! `register_delivery` is 1 the message content carries a
//! [`CmppReceipt`](crate::datatypes::CmppReceipt) status report.

use bytes::Bytes;
use thiserror::Error;

use crate::codec::{Packable, PacketReader, PacketWriter, Unpackable, CMPP_HEADER_LEN};
use crate::datatypes::CommandId;

pub const CMPP2_DELIVER_REQ_PKT_MAX_LEN: u32 = CMPP_HEADER_LEN + 233; // 245
pub const CMPP2_DELIVER_RSP_PKT_LEN: u32 = CMPP_HEADER_LEN + 8 + 1; // 21
pub const CMPP3_DELIVER_REQ_PKT_MAX_LEN: u32 = CMPP_HEADER_LEN + 257; // 269
pub const CMPP3_DELIVER_RSP_PKT_LEN: u32 = CMPP_HEADER_LEN + 8 + 4; // 24

/// Non-zero DELIVER response result, mapped to an error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliverError {
    #[error("deliver response status: invalid protocol structure")]
    InvalidStruct,
    #[error("deliver response status: invalid command id")]
    InvalidCommandId,
    #[error("deliver response status: invalid message sequence")]
    InvalidSequence,
    #[error("deliver response status: invalid message length")]
    InvalidMsgLength,
    #[error("deliver response status: invalid fee code")]
    InvalidFeeCode,
    #[error("deliver response status: exceed max message length")]
    ExceedMaxMsgLength,
    #[error("deliver response status: invalid service id")]
    InvalidServiceId,
    #[error("deliver response status: not pass the flow control")]
    NotPassFlowControl,
    #[error("deliver response status: other error")]
    OtherError,
    /// Result codes outside 1..=9 are surfaced raw.
    #[error("deliver response status: unknown result {0}")]
    Other(u32),
}

impl DeliverError {
    /// Maps a response result to its error; `0` is success.
    pub fn from_result(result: u32) -> Option<Self> {
        match result {
            0 => None,
            1 => Some(DeliverError::InvalidStruct),
            2 => Some(DeliverError::InvalidCommandId),
            3 => Some(DeliverError::InvalidSequence),
            4 => Some(DeliverError::InvalidMsgLength),
            5 => Some(DeliverError::InvalidFeeCode),
            6 => Some(DeliverError::ExceedMaxMsgLength),
            7 => Some(DeliverError::InvalidServiceId),
            8 => Some(DeliverError::NotPassFlowControl),
            9 => Some(DeliverError::OtherError),
            other => Some(DeliverError::Other(other)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp2DeliverReq {
    pub msg_id: u64,
    pub dest_id: String,
    pub service_id: String,
    pub tp_pid: u8,
    pub tp_udhi: u8,
    pub msg_fmt: u8,
    pub src_terminal_id: String,
    pub register_delivery: u8,
    pub msg_length: u8,
    pub msg_content: Vec<u8>,
    pub reserve: String,

    pub seq_id: u32,
}

impl Packable for Cmpp2DeliverReq {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP_HEADER_LEN + 65 + u32::from(self.msg_length) + 8;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::Deliver as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.write_u64(self.msg_id);
        w.write_fixed_string(&self.dest_id, 21);
        w.write_fixed_string(&self.service_id, 10);
        w.write_u8(self.tp_pid);
        w.write_u8(self.tp_udhi);
        w.write_u8(self.msg_fmt);
        w.write_fixed_string(&self.src_terminal_id, 21);
        w.write_u8(self.register_delivery);
        w.write_u8(self.msg_length);
        w.write_bytes(&self.msg_content);
        w.write_fixed_string(&self.reserve, 8);

        w.into_bytes()
    }
}

impl Unpackable for Cmpp2DeliverReq {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let mut p = Cmpp2DeliverReq {
            seq_id: r.read_u32(),
            msg_id: r.read_u64(),
            dest_id: r.read_cstring(21),
            service_id: r.read_cstring(10),
            tp_pid: r.read_u8(),
            tp_udhi: r.read_u8(),
            msg_fmt: r.read_u8(),
            src_terminal_id: r.read_cstring(21),
            register_delivery: r.read_u8(),
            msg_length: 0,
            msg_content: Vec::new(),
            reserve: String::new(),
        };

        p.msg_length = r.read_u8();
        p.msg_content = r.read_bytes(p.msg_length as usize);
        p.reserve = r.read_cstring(8);

        r.finish()?;
        Ok(p)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp2DeliverRsp {
    pub msg_id: u64,
    pub result: u8,

    pub seq_id: u32,
}

impl Packable for Cmpp2DeliverRsp {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP2_DELIVER_RSP_PKT_LEN;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::DeliverResp as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.write_u64(self.msg_id);
        w.write_u8(self.result);

        w.into_bytes()
    }
}

impl Unpackable for Cmpp2DeliverRsp {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let p = Cmpp2DeliverRsp {
            seq_id: r.read_u32(),
            msg_id: r.read_u64(),
            result: r.read_u8(),
        };
        r.finish()?;
        Ok(p)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp3DeliverReq {
    pub msg_id: u64,
    pub dest_id: String,
    pub service_id: String,
    pub tp_pid: u8,
    pub tp_udhi: u8,
    pub msg_fmt: u8,
    pub src_terminal_id: String,
    pub src_terminal_type: u8,
    pub register_delivery: u8,
    pub msg_length: u8,
    pub msg_content: Vec<u8>,
    pub link_id: String,

    pub seq_id: u32,
}

impl Packable for Cmpp3DeliverReq {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP_HEADER_LEN + 77 + u32::from(self.msg_length) + 20;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::Deliver as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.write_u64(self.msg_id);
        w.write_fixed_string(&self.dest_id, 21);
        w.write_fixed_string(&self.service_id, 10);
        w.write_u8(self.tp_pid);
        w.write_u8(self.tp_udhi);
        w.write_u8(self.msg_fmt);
        w.write_fixed_string(&self.src_terminal_id, 32);
        w.write_u8(self.src_terminal_type);
        w.write_u8(self.register_delivery);
        w.write_u8(self.msg_length);
        w.write_bytes(&self.msg_content);
        w.write_fixed_string(&self.link_id, 20);

        w.into_bytes()
    }
}

impl Unpackable for Cmpp3DeliverReq {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let mut p = Cmpp3DeliverReq {
            seq_id: r.read_u32(),
            msg_id: r.read_u64(),
            dest_id: r.read_cstring(21),
            service_id: r.read_cstring(10),
            tp_pid: r.read_u8(),
            tp_udhi: r.read_u8(),
            msg_fmt: r.read_u8(),
            src_terminal_id: r.read_cstring(32),
            src_terminal_type: r.read_u8(),
            register_delivery: r.read_u8(),
            msg_length: 0,
            msg_content: Vec::new(),
            link_id: String::new(),
        };

        p.msg_length = r.read_u8();
        p.msg_content = r.read_bytes(p.msg_length as usize);
        p.link_id = r.read_cstring(20);

        r.finish()?;
        Ok(p)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp3DeliverRsp {
    pub msg_id: u64,
    pub result: u32,

    pub seq_id: u32,
}

impl Packable for Cmpp3DeliverRsp {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP3_DELIVER_RSP_PKT_LEN;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::DeliverResp as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.write_u64(self.msg_id);
        w.write_u32(self.result);

        w.into_bytes()
    }
}

impl Unpackable for Cmpp3DeliverRsp {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let p = Cmpp3DeliverRsp {
            seq_id: r.read_u32(),
            msg_id: r.read_u64(),
            result: r.read_u32(),
        };
        r.finish()?;
        Ok(p)
    }
}
