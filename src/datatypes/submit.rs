//! SUBMIT request/response in both wire layouts.
//!
//! V2 and V3 differ in the width of the fee/destination terminal ids
//! (21 vs 32 octets), the extra `fee_terminal_type`/`dest_terminal_type`
//! octets, the trailing field (8 reserved octets vs a 20-octet `link_id`)
//! and the width of the response result (u8 vs u32).

use bytes::Bytes;
use thiserror::Error;

use crate::codec::{Packable, PacketReader, PacketWriter, Unpackable, CMPP_HEADER_LEN};
use crate::datatypes::CommandId;

pub const CMPP2_SUBMIT_REQ_PKT_MAX_LEN: u32 = CMPP_HEADER_LEN + 2265; // 2277
pub const CMPP2_SUBMIT_RSP_PKT_LEN: u32 = CMPP_HEADER_LEN + 8 + 1; // 21
pub const CMPP3_SUBMIT_REQ_PKT_MAX_LEN: u32 = CMPP_HEADER_LEN + 3479; // 3491
pub const CMPP3_SUBMIT_RSP_PKT_LEN: u32 = CMPP_HEADER_LEN + 8 + 4; // 24

/// Non-zero SUBMIT response result, mapped to an error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("submit response status: invalid protocol structure")]
    InvalidStruct,
    #[error("submit response status: invalid command id")]
    InvalidCommandId,
    #[error("submit response status: invalid message sequence")]
    InvalidSequence,
    #[error("submit response status: invalid message length")]
    InvalidMsgLength,
    #[error("submit response status: invalid fee code")]
    InvalidFeeCode,
    #[error("submit response status: exceed max message length")]
    ExceedMaxMsgLength,
    #[error("submit response status: invalid service id")]
    InvalidServiceId,
    #[error("submit response status: not pass the flow control")]
    NotPassFlowControl,
    #[error("submit response status: feeTerminalId is not served")]
    NotServeFeeTerminalId,
    #[error("submit response status: invalid srcId")]
    InvalidSrcId,
    #[error("submit response status: invalid msgSrc")]
    InvalidMsgSrc,
    #[error("submit response status: invalid feeTerminalId")]
    InvalidFeeTerminalId,
    #[error("submit response status: invalid destTerminalId")]
    InvalidDestTerminalId,
    /// Result codes outside 1..=13 are surfaced raw.
    #[error("submit response status: unknown result {0}")]
    Other(u32),
}

impl SubmitError {
    /// Maps a response result to its error; `0` is success.
    pub fn from_result(result: u32) -> Option<Self> {
        match result {
            0 => None,
            1 => Some(SubmitError::InvalidStruct),
            2 => Some(SubmitError::InvalidCommandId),
            3 => Some(SubmitError::InvalidSequence),
            4 => Some(SubmitError::InvalidMsgLength),
            5 => Some(SubmitError::InvalidFeeCode),
            6 => Some(SubmitError::ExceedMaxMsgLength),
            7 => Some(SubmitError::InvalidServiceId),
            8 => Some(SubmitError::NotPassFlowControl),
            9 => Some(SubmitError::NotServeFeeTerminalId),
            10 => Some(SubmitError::InvalidSrcId),
            11 => Some(SubmitError::InvalidMsgSrc),
            12 => Some(SubmitError::InvalidFeeTerminalId),
            13 => Some(SubmitError::InvalidDestTerminalId),
            other => Some(SubmitError::Other(other)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp2SubmitReq {
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
    pub dest_terminal_id: Vec<String>,
    pub msg_length: u8,
    pub msg_content: Vec<u8>,

    pub seq_id: u32,
}

impl Packable for Cmpp2SubmitReq {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP_HEADER_LEN
            + 117
            + u32::from(self.dest_usr_tl) * 21
            + 1
            + u32::from(self.msg_length)
            + 8;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::Submit as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

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
        for d in &self.dest_terminal_id {
            w.write_fixed_string(d, 21);
        }
        w.write_u8(self.msg_length);
        w.write_bytes(&self.msg_content);
        w.write_fixed_string("", 8); // reserved

        w.into_bytes()
    }
}

impl Unpackable for Cmpp2SubmitReq {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let mut p = Cmpp2SubmitReq {
            seq_id: r.read_u32(),
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
            dest_terminal_id: Vec::new(),
            msg_length: 0,
            msg_content: Vec::new(),
        };

        p.dest_usr_tl = r.read_u8();
        for _ in 0..p.dest_usr_tl {
            p.dest_terminal_id.push(r.read_cstring(21));
        }

        p.msg_length = r.read_u8();
        p.msg_content = r.read_bytes(p.msg_length as usize);

        r.finish()?;
        Ok(p)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp2SubmitRsp {
    pub msg_id: u64,
    pub result: u8,

    pub seq_id: u32,
}

impl Packable for Cmpp2SubmitRsp {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP2_SUBMIT_RSP_PKT_LEN;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::SubmitResp as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.write_u64(self.msg_id);
        w.write_u8(self.result);

        w.into_bytes()
    }
}

impl Unpackable for Cmpp2SubmitRsp {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let p = Cmpp2SubmitRsp {
            seq_id: r.read_u32(),
            msg_id: r.read_u64(),
            result: r.read_u8(),
        };
        r.finish()?;
        Ok(p)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp3SubmitReq {
    pub msg_id: u64,
    pub pk_total: u8,
    pub pk_number: u8,
    pub registered_delivery: u8,
    pub msg_level: u8,
    pub service_id: String,
    pub fee_user_type: u8,
    pub fee_terminal_id: String,
    pub fee_terminal_type: u8,
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
    pub dest_terminal_id: Vec<String>,
    pub dest_terminal_type: u8,
    pub msg_length: u8,
    pub msg_content: Vec<u8>,
    pub link_id: String,

    pub seq_id: u32,
}

impl Packable for Cmpp3SubmitReq {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP_HEADER_LEN
            + 129
            + u32::from(self.dest_usr_tl) * 32
            + 1
            + 1
            + u32::from(self.msg_length)
            + 20;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::Submit as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

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
        w.write_fixed_string(&self.fee_terminal_id, 32);
        w.write_u8(self.fee_terminal_type);
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
        for d in &self.dest_terminal_id {
            w.write_fixed_string(d, 32);
        }
        w.write_u8(self.dest_terminal_type);
        w.write_u8(self.msg_length);
        w.write_bytes(&self.msg_content);
        w.write_fixed_string(&self.link_id, 20);

        w.into_bytes()
    }
}

impl Unpackable for Cmpp3SubmitReq {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let mut p = Cmpp3SubmitReq {
            seq_id: r.read_u32(),
            msg_id: r.read_u64(),
            pk_total: r.read_u8(),
            pk_number: r.read_u8(),
            registered_delivery: r.read_u8(),
            msg_level: r.read_u8(),
            service_id: r.read_cstring(10),
            fee_user_type: r.read_u8(),
            fee_terminal_id: r.read_cstring(32),
            fee_terminal_type: r.read_u8(),
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
            dest_terminal_id: Vec::new(),
            dest_terminal_type: 0,
            msg_length: 0,
            msg_content: Vec::new(),
            link_id: String::new(),
        };

        p.dest_usr_tl = r.read_u8();
        for _ in 0..p.dest_usr_tl {
            p.dest_terminal_id.push(r.read_cstring(32));
        }

        p.dest_terminal_type = r.read_u8();
        p.msg_length = r.read_u8();
        p.msg_content = r.read_bytes(p.msg_length as usize);
        p.link_id = r.read_cstring(20);

        r.finish()?;
        Ok(p)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmpp3SubmitRsp {
    pub msg_id: u64,
    pub result: u32,

    pub seq_id: u32,
}

impl Packable for Cmpp3SubmitRsp {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP3_SUBMIT_RSP_PKT_LEN;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::SubmitResp as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.write_u64(self.msg_id);
        w.write_u32(self.result);

        w.into_bytes()
    }
}

impl Unpackable for Cmpp3SubmitRsp {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let p = Cmpp3SubmitRsp {
            seq_id: r.read_u32(),
            msg_id: r.read_u64(),
            result: r.read_u32(),
        };
        r.finish()?;
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_v3_req() -> Cmpp3SubmitReq {
        Cmpp3SubmitReq {
            pk_total: 1,
            pk_number: 1,
            registered_delivery: 1,
            msg_level: 1,
            service_id: "test".to_string(),
            fee_user_type: 2,
            fee_terminal_id: "13500002696".to_string(),
            fee_terminal_type: 0,
            msg_fmt: 8,
            msg_src: "900001".to_string(),
            fee_type: "02".to_string(),
            fee_code: "10".to_string(),
            valid_time: "151105131555101+".to_string(),
            at_time: "".to_string(),
            src_id: "900001".to_string(),
            dest_usr_tl: 1,
            dest_terminal_id: vec!["13500002696".to_string()],
            dest_terminal_type: 0,
            msg_length: 12,
            msg_content: b"hello cmpp 3".to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn cmpp3_submit_req_round_trip() {
        let mut p = sample_v3_req();
        let data = p.pack(0x17).unwrap();

        // Length contract: the header's total_length equals the byte count
        // and the formula.
        let total_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        assert_eq!(total_len as usize, data.len());
        assert_eq!(total_len, 12 + 129 + 32 + 1 + 1 + 12 + 20);

        let q = Cmpp3SubmitReq::unpack(&data[8..]).unwrap();
        assert_eq!(q, p);
    }

    #[test]
    fn cmpp2_submit_req_round_trip_multi_dest() {
        let mut p = Cmpp2SubmitReq {
            registered_delivery: 1,
            msg_level: 1,
            service_id: "test".to_string(),
            fee_user_type: 2,
            fee_terminal_id: "13500002696".to_string(),
            msg_fmt: 8,
            msg_src: "900001".to_string(),
            fee_type: "02".to_string(),
            fee_code: "10".to_string(),
            valid_time: "151105131555101+".to_string(),
            src_id: "900001".to_string(),
            dest_usr_tl: 2,
            dest_terminal_id: vec!["13500002696".to_string(), "13500002697".to_string()],
            msg_length: 10,
            msg_content: b"hello cmpp".to_vec(),
            ..Default::default()
        };
        let data = p.pack(7).unwrap();

        let total_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        assert_eq!(total_len as usize, data.len());
        assert_eq!(total_len, 12 + 117 + 2 * 21 + 1 + 10 + 8);

        // Pack normalized (0, 0) to (1, 1).
        assert_eq!((p.pk_total, p.pk_number), (1, 1));

        let q = Cmpp2SubmitReq::unpack(&data[8..]).unwrap();
        assert_eq!(q, p);
    }

    #[test]
    fn submit_rsp_round_trips() {
        let mut p2 = Cmpp2SubmitRsp {
            msg_id: 0x0102030405060708,
            result: 9,
            seq_id: 0,
        };
        let d2 = p2.pack(0x21).unwrap();
        assert_eq!(d2.len(), CMPP2_SUBMIT_RSP_PKT_LEN as usize);
        assert_eq!(Cmpp2SubmitRsp::unpack(&d2[8..]).unwrap(), p2);

        let mut p3 = Cmpp3SubmitRsp {
            msg_id: 0x0102030405060708,
            result: 13,
            seq_id: 0,
        };
        let d3 = p3.pack(0x21).unwrap();
        assert_eq!(d3.len(), CMPP3_SUBMIT_RSP_PKT_LEN as usize);
        assert_eq!(Cmpp3SubmitRsp::unpack(&d3[8..]).unwrap(), p3);
    }

    #[test]
    fn unpack_preserves_pk_zero_pair() {
        // Unpack must pass (0, 0) through untouched; only pack normalizes.
        let mut p = sample_v3_req();
        p.pk_total = 0;
        p.pk_number = 0;
        let mut on_wire = p.clone();
        let data = on_wire.pack(1).unwrap();
        let q = Cmpp3SubmitReq::unpack(&data[8..]).unwrap();
        assert_eq!((q.pk_total, q.pk_number), (1, 1));

        // Hand-build a body with a zero pair to check the unpack side.
        let mut raw = data.to_vec();
        raw[12 + 8] = 0; // pk_total
        raw[12 + 9] = 0; // pk_number
        let q = Cmpp3SubmitReq::unpack(&raw[8..]).unwrap();
        assert_eq!((q.pk_total, q.pk_number), (0, 0));
    }

    #[test]
    fn overlong_field_fails_pack() {
        let mut p = sample_v3_req();
        p.service_id = "far-too-long-service-id".to_string();
        let err = p.pack(1).unwrap_err();
        assert_eq!(err.cause(), crate::codec::CodecError::InvalidParams);
    }

    #[test]
    fn result_error_mapping() {
        assert_eq!(SubmitError::from_result(0), None);
        assert_eq!(SubmitError::from_result(8), Some(SubmitError::NotPassFlowControl));
        assert_eq!(SubmitError::from_result(13), Some(SubmitError::InvalidDestTerminalId));
        assert_eq!(SubmitError::from_result(99), Some(SubmitError::Other(99)));
    }
}
