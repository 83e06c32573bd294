//! FWD request/response, the gateway-to-gateway forward of a short
//! message. On top of the submit fields the request names the forwarding
//! route (`source_id`/`destination_id`/`nodes_count`) and, in V3, pseudo
//! addresses and user types for both ends.

use bytes::Bytes;
use thiserror::Error;

use crate::codec::{Packable, PacketReader, PacketWriter, Unpackable, CMPP_HEADER_LEN};
use crate::datatypes::CommandId;

pub const CMPP2_FWD_REQ_PKT_MAX_LEN: u32 = CMPP_HEADER_LEN + 2379; // 2391
pub const CMPP2_FWD_RSP_PKT_LEN: u32 = CMPP_HEADER_LEN + 8 + 1 + 1 + 1; // 23
pub const CMPP3_FWD_REQ_PKT_MAX_LEN: u32 = CMPP_HEADER_LEN + 2491; // 2503
pub const CMPP3_FWD_RSP_PKT_LEN: u32 = CMPP_HEADER_LEN + 8 + 1 + 1 + 4; // 26

/// Non-zero FWD response result, mapped to an error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FwdError {
    #[error("fwd response status: invalid protocol structure")]
    InvalidStruct,
    #[error("fwd response status: invalid command id")]
    InvalidCommandId,
    #[error("fwd response status: invalid message sequence")]
    InvalidSequence,
    #[error("fwd response status: invalid message length")]
    InvalidMsgLength,
    #[error("fwd response status: invalid fee code")]
    InvalidFeeCode,
    #[error("fwd response status: exceed max message length")]
    ExceedMaxMsgLength,
    #[error("fwd response status: invalid service id")]
    InvalidServiceId,
    #[error("fwd response status: not pass the flow control")]
    NotPassFlowControl,
    #[error("fwd response status: msg has no fwd privilege")]
    NoPrivilege,
    /// Result codes outside 1..=9 are surfaced raw.
    #[error("fwd response status: unknown result {0}")]
    Other(u32),
}

impl FwdError {
    /// Maps a response result to its error; `0` is success.
    pub fn from_result(result: u32) -> Option<Self> {
        match result {
            0 => None,
            1 => Some(FwdError::InvalidStruct),
            2 => Some(FwdError::InvalidCommandId),
            3 => Some(FwdError::InvalidSequence),
            4 => Some(FwdError::InvalidMsgLength),
            5 => Some(FwdError::InvalidFeeCode),
            6 => Some(FwdError::ExceedMaxMsgLength),
            7 => Some(FwdError::InvalidServiceId),
            8 => Some(FwdError::NotPassFlowControl),
            9 => Some(FwdError::NoPrivilege),
            other => Some(FwdError::Other(other)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp2FwdReq {
    pub source_id: String,
    pub destination_id: String,
    pub nodes_count: u8,
    pub msg_fwd_type: u8,
    pub msg_id: u64,
    pub pk_total: u8,
    pub pk_number: u8,
    pub registered_delivery: u8,
    pub msg_level: u8,
    pub service_id: String,
    pub fee_user_type: u8,
    pub fee_terminal_id: String,
    pub tp_pid: u8,
    pub tp_udhi: u8,
    pub msg_fmt: u8,
    pub msg_src: String,
    pub fee_type: String,
    pub fee_code: String,
    pub valid_time: String,
    pub at_time: String,
    pub src_id: String,
    pub dest_usr_tl: u8,
    pub dest_id: Vec<String>,
    pub msg_length: u8,
    pub msg_content: Vec<u8>,

    pub seq_id: u32,
}

impl Packable for Cmpp2FwdReq {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP_HEADER_LEN
            + 131
            + u32::from(self.dest_usr_tl) * 21
            + 1
            + u32::from(self.msg_length)
            + 8;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::Fwd as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.write_fixed_string(&self.source_id, 6);
        w.write_fixed_string(&self.destination_id, 6);
        w.write_u8(self.nodes_count);
        w.write_u8(self.msg_fwd_type);
        w.write_u64(self.msg_id);

        if self.pk_total == 0 && self.pk_number == 0 {
            self.pk_total = 1;
            self.pk_number = 1;
        }
        w.write_u8(self.pk_total);
        w.write_u8(self.pk_number);
        w.write_u8(self.registered_delivery);
        w.write_u8(self.msg_level);
        w.write_fixed_string(&self.service_id, 10);
        w.write_u8(self.fee_user_type);
        w.write_fixed_string(&self.fee_terminal_id, 21);
        w.write_u8(self.tp_pid);
        w.write_u8(self.tp_udhi);
        w.write_u8(self.msg_fmt);
        w.write_fixed_string(&self.msg_src, 6);
        w.write_fixed_string(&self.fee_type, 2);
        w.write_fixed_string(&self.fee_code, 6);
        w.write_fixed_string(&self.valid_time, 17);
        w.write_fixed_string(&self.at_time, 17);
        w.write_fixed_string(&self.src_id, 21);
        w.write_u8(self.dest_usr_tl);
        for d in &self.dest_id {
            w.write_fixed_string(d, 21);
        }
        w.write_u8(self.msg_length);
        w.write_bytes(&self.msg_content);
        w.write_fixed_string("", 8); // reserved

        w.into_bytes()
    }
}

impl Unpackable for Cmpp2FwdReq {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let mut p = Cmpp2FwdReq {
            seq_id: r.read_u32(),
            source_id: r.read_cstring(6),
            destination_id: r.read_cstring(6),
            nodes_count: r.read_u8(),
            msg_fwd_type: r.read_u8(),
            msg_id: r.read_u64(),
            pk_total: r.read_u8(),
            pk_number: r.read_u8(),
            registered_delivery: r.read_u8(),
            msg_level: r.read_u8(),
            service_id: r.read_cstring(10),
            fee_user_type: r.read_u8(),
            fee_terminal_id: r.read_cstring(21),
            tp_pid: r.read_u8(),
            tp_udhi: r.read_u8(),
            msg_fmt: r.read_u8(),
            msg_src: r.read_cstring(6),
            fee_type: String::from_utf8_lossy(&r.read_bytes(2)).into_owned(),
            fee_code: r.read_cstring(6),
            valid_time: r.read_cstring(17),
            at_time: r.read_cstring(17),
            src_id: r.read_cstring(21),
            dest_usr_tl: 0,
            dest_id: Vec::new(),
            msg_length: 0,
            msg_content: Vec::new(),
        };

        p.dest_usr_tl = r.read_u8();
        for _ in 0..p.dest_usr_tl {
            p.dest_id.push(r.read_cstring(21));
        }

        p.msg_length = r.read_u8();
        p.msg_content = r.read_bytes(p.msg_length as usize);

        r.finish()?;
        Ok(p)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp2FwdRsp {
    pub msg_id: u64,
    pub pk_total: u8,
    pub pk_number: u8,
    pub result: u8,

    pub seq_id: u32,
}

impl Packable for Cmpp2FwdRsp {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP2_FWD_RSP_PKT_LEN;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::FwdResp as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.write_u64(self.msg_id);
        w.write_u8(self.pk_total);
        w.write_u8(self.pk_number);
        w.write_u8(self.result);

        w.into_bytes()
    }
}

impl Unpackable for Cmpp2FwdRsp {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let p = Cmpp2FwdRsp {
            seq_id: r.read_u32(),
            msg_id: r.read_u64(),
            pk_total: r.read_u8(),
            pk_number: r.read_u8(),
            result: r.read_u8(),
        };
        r.finish()?;
        Ok(p)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp3FwdReq {
    pub source_id: String,
    pub destination_id: String,
    pub nodes_count: u8,
    pub msg_fwd_type: u8,
    pub msg_id: u64,
    pub pk_total: u8,
    pub pk_number: u8,
    pub registered_delivery: u8,
    pub msg_level: u8,
    pub service_id: String,
    pub fee_user_type: u8,
    pub fee_terminal_id: String,
    pub fee_terminal_pseudo: String,
    pub fee_terminal_user_type: u8,
    pub tp_pid: u8,
    pub tp_udhi: u8,
    pub msg_fmt: u8,
    pub msg_src: String,
    pub fee_type: String,
    pub fee_code: String,
    pub valid_time: String,
    pub at_time: String,
    pub src_id: String,
    pub src_pseudo: String,
    pub src_user_type: u8,
    pub src_type: u8,
    pub dest_usr_tl: u8,
    pub dest_id: Vec<String>,
    pub dest_pseudo: String,
    pub dest_user_type: u8,
    pub msg_length: u8,
    pub msg_content: Vec<u8>,
    pub link_id: String,

    pub seq_id: u32,
}

impl Packable for Cmpp3FwdReq {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP_HEADER_LEN
            + 198
            + u32::from(self.dest_usr_tl) * 21
            + 32
            + 1
            + 1
            + u32::from(self.msg_length)
            + 20;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::Fwd as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.write_fixed_string(&self.source_id, 6);
        w.write_fixed_string(&self.destination_id, 6);
        w.write_u8(self.nodes_count);
        w.write_u8(self.msg_fwd_type);
        w.write_u64(self.msg_id);

        if self.pk_total == 0 && self.pk_number == 0 {
            self.pk_total = 1;
            self.pk_number = 1;
        }
        w.write_u8(self.pk_total);
        w.write_u8(self.pk_number);
        w.write_u8(self.registered_delivery);
        w.write_u8(self.msg_level);
        w.write_fixed_string(&self.service_id, 10);
        w.write_u8(self.fee_user_type);
        w.write_fixed_string(&self.fee_terminal_id, 21);
        w.write_fixed_string(&self.fee_terminal_pseudo, 32);
        w.write_u8(self.fee_terminal_user_type);
        w.write_u8(self.tp_pid);
        w.write_u8(self.tp_udhi);
        w.write_u8(self.msg_fmt);
        w.write_fixed_string(&self.msg_src, 6);
        w.write_fixed_string(&self.fee_type, 2);
        w.write_fixed_string(&self.fee_code, 6);
        w.write_fixed_string(&self.valid_time, 17);
        w.write_fixed_string(&self.at_time, 17);
        w.write_fixed_string(&self.src_id, 21);
        w.write_fixed_string(&self.src_pseudo, 32);
        w.write_u8(self.src_user_type);
        w.write_u8(self.src_type);
        w.write_u8(self.dest_usr_tl);
        for d in &self.dest_id {
            w.write_fixed_string(d, 21);
        }
        w.write_fixed_string(&self.dest_pseudo, 32);
        w.write_u8(self.dest_user_type);
        w.write_u8(self.msg_length);
        w.write_bytes(&self.msg_content);
        w.write_fixed_string(&self.link_id, 20);

        w.into_bytes()
    }
}

impl Unpackable for Cmpp3FwdReq {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let mut p = Cmpp3FwdReq {
            seq_id: r.read_u32(),
            source_id: r.read_cstring(6),
            destination_id: r.read_cstring(6),
            nodes_count: r.read_u8(),
            msg_fwd_type: r.read_u8(),
            msg_id: r.read_u64(),
            pk_total: r.read_u8(),
            pk_number: r.read_u8(),
            registered_delivery: r.read_u8(),
            msg_level: r.read_u8(),
            service_id: r.read_cstring(10),
            fee_user_type: r.read_u8(),
            fee_terminal_id: r.read_cstring(21),
            fee_terminal_pseudo: r.read_cstring(32),
            fee_terminal_user_type: r.read_u8(),
            tp_pid: r.read_u8(),
            tp_udhi: r.read_u8(),
            msg_fmt: r.read_u8(),
            msg_src: r.read_cstring(6),
            fee_type: String::from_utf8_lossy(&r.read_bytes(2)).into_owned(),
            fee_code: r.read_cstring(6),
            valid_time: r.read_cstring(17),
            at_time: r.read_cstring(17),
            src_id: r.read_cstring(21),
            src_pseudo: r.read_cstring(32),
            src_user_type: r.read_u8(),
            src_type: r.read_u8(),
            dest_usr_tl: 0,
            dest_id: Vec::new(),
            dest_pseudo: String::new(),
            dest_user_type: 0,
            msg_length: 0,
            msg_content: Vec::new(),
            link_id: String::new(),
        };

        p.dest_usr_tl = r.read_u8();
        for _ in 0..p.dest_usr_tl {
            p.dest_id.push(r.read_cstring(21));
        }
        p.dest_pseudo = r.read_cstring(32);
        p.dest_user_type = r.read_u8();

        p.msg_length = r.read_u8();
        p.msg_content = r.read_bytes(p.msg_length as usize);
        p.link_id = r.read_cstring(20);

        r.finish()?;
        Ok(p)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp3FwdRsp {
    pub msg_id: u64,
    pub pk_total: u8,
    pub pk_number: u8,
    pub result: u32,

    pub seq_id: u32,
}

impl Packable for Cmpp3FwdRsp {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP3_FWD_RSP_PKT_LEN;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::FwdResp as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.write_u64(self.msg_id);
        w.write_u8(self.pk_total);
        w.write_u8(self.pk_number);
        w.write_u32(self.result);

        w.into_bytes()
    }
}

impl Unpackable for Cmpp3FwdRsp {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let p = Cmpp3FwdRsp {
            seq_id: r.read_u32(),
            msg_id: r.read_u64(),
            pk_total: r.read_u8(),
            pk_number: r.read_u8(),
            result: r.read_u32(),
        };
        r.finish()?;
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmpp2_fwd_req_round_trip() {
        let mut p = Cmpp2FwdReq {
            source_id: "900001".to_string(),
            destination_id: "900002".to_string(),
            nodes_count: 2,
            msg_fwd_type: 0,
            msg_id: 0x0102030405060708,
            registered_delivery: 1,
            msg_level: 1,
            service_id: "test".to_string(),
            fee_user_type: 2,
            fee_terminal_id: "13500002696".to_string(),
            msg_fmt: 8,
            msg_src: "900001".to_string(),
            fee_type: "02".to_string(),
            fee_code: "10".to_string(),
            src_id: "900001".to_string(),
            dest_usr_tl: 1,
            dest_id: vec!["13500002696".to_string()],
            msg_length: 5,
            msg_content: b"hello".to_vec(),
            ..Default::default()
        };
        let data = p.pack(0x101).unwrap();

        let total_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        assert_eq!(total_len as usize, data.len());
        assert_eq!(total_len, 12 + 131 + 21 + 1 + 5 + 8);
        assert_eq!((p.pk_total, p.pk_number), (1, 1));

        let q = Cmpp2FwdReq::unpack(&data[8..]).unwrap();
        assert_eq!(q, p);
    }

    #[test]
    fn cmpp3_fwd_req_round_trip() {
        let mut p = Cmpp3FwdReq {
            source_id: "900001".to_string(),
            destination_id: "900002".to_string(),
            nodes_count: 2,
            msg_fwd_type: 0,
            msg_id: 0x0102030405060708,
            registered_delivery: 1,
            msg_level: 1,
            service_id: "test".to_string(),
            fee_user_type: 2,
            fee_terminal_id: "13500002696".to_string(),
            fee_terminal_pseudo: "pseudo-fee".to_string(),
            fee_terminal_user_type: 1,
            msg_fmt: 8,
            msg_src: "900001".to_string(),
            fee_type: "02".to_string(),
            fee_code: "10".to_string(),
            src_id: "900001".to_string(),
            src_pseudo: "pseudo-src".to_string(),
            src_user_type: 1,
            src_type: 0,
            dest_usr_tl: 2,
            dest_id: vec!["13500002696".to_string(), "13500002697".to_string()],
            dest_pseudo: "pseudo-dst".to_string(),
            dest_user_type: 1,
            msg_length: 5,
            msg_content: b"hello".to_vec(),
            link_id: "link".to_string(),
            ..Default::default()
        };
        let data = p.pack(0x102).unwrap();

        let total_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        assert_eq!(total_len as usize, data.len());
        assert_eq!(total_len, 12 + 198 + 2 * 21 + 32 + 1 + 1 + 5 + 20);

        let q = Cmpp3FwdReq::unpack(&data[8..]).unwrap();
        assert_eq!(q, p);
    }

    #[test]
    fn fwd_rsp_round_trips() {
        let mut p2 = Cmpp2FwdRsp {
            msg_id: 7,
            pk_total: 1,
            pk_number: 1,
            result: 9,
            seq_id: 0,
        };
        let d2 = p2.pack(2).unwrap();
        assert_eq!(d2.len(), CMPP2_FWD_RSP_PKT_LEN as usize);
        assert_eq!(Cmpp2FwdRsp::unpack(&d2[8..]).unwrap(), p2);

        let mut p3 = Cmpp3FwdRsp {
            msg_id: 7,
            pk_total: 1,
            pk_number: 1,
            result: 9,
            seq_id: 0,
        };
        let d3 = p3.pack(2).unwrap();
        assert_eq!(d3.len(), CMPP3_FWD_RSP_PKT_LEN as usize);
        assert_eq!(Cmpp3FwdRsp::unpack(&d3[8..]).unwrap(), p3);
    }

    #[test]
    fn result_error_mapping() {
        assert_eq!(FwdError::from_result(0), None);
        assert_eq!(FwdError::from_result(9), Some(FwdError::NoPrivilege));
        assert_eq!(FwdError::from_result(33), Some(FwdError::Other(33)));
    }
}
