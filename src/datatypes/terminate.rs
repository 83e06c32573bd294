//! TERMINATE request/response. Both are header-only packets.

use bytes::Bytes;

use crate::codec::{Packable, PacketReader, PacketWriter, Unpackable, CMPP_HEADER_LEN};
use crate::datatypes::CommandId;

pub const CMPP_TERMINATE_REQ_PKT_LEN: u32 = CMPP_HEADER_LEN; // 12
pub const CMPP_TERMINATE_RSP_PKT_LEN: u32 = CMPP_HEADER_LEN; // 12

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CmppTerminateReq {
    pub seq_id: u32,
}

impl Packable for CmppTerminateReq {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP_TERMINATE_REQ_PKT_LEN;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::Terminate as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.into_bytes()
    }
}

impl Unpackable for CmppTerminateReq {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let p = CmppTerminateReq {
            seq_id: r.read_u32(),
        };
        r.finish()?;
        Ok(p)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CmppTerminateRsp {
    pub seq_id: u32,
}

impl Packable for CmppTerminateRsp {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, crate::codec::OpError> {
        let pkt_len = CMPP_TERMINATE_RSP_PKT_LEN;
        let mut w = PacketWriter::new(pkt_len);

        w.write_u32(pkt_len);
        w.write_u32(CommandId::TerminateResp as u32);
        w.write_u32(seq_id);
        self.seq_id = seq_id;

        w.into_bytes()
    }
}

impl Unpackable for CmppTerminateRsp {
    fn unpack(data: &[u8]) -> Result<Self, crate::codec::OpError> {
        let mut r = PacketReader::new(data);
        let p = CmppTerminateRsp {
            seq_id: r.read_u32(),
        };
        r.finish()?;
        Ok(p)
    }
}
