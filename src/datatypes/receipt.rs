//! Status-report sub-record carried in a deliver body when
//! `register_delivery` is 1. It has no CMPP header of its own.

use bytes::Bytes;

use crate::codec::{OpError, PacketReader, PacketWriter};

pub const CMPP_RECEIPT_PKT_LEN: u32 = 60;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CmppReceipt {
    pub msg_id: u64,
    /// Delivery state, e.g. "DELIVRD".
    pub stat: String,
    /// YYMMDDHHMM
    pub submit_time: String,
    /// YYMMDDHHMM
    pub done_time: String,
    pub dest_terminal_id: String,
    pub smsc_sequence: u32,
}

impl CmppReceipt {
    pub fn pack(&self) -> Result<Bytes, OpError> {
        let mut w = PacketWriter::new(CMPP_RECEIPT_PKT_LEN);

        w.write_u64(self.msg_id);
        w.write_fixed_string(&self.stat, 7);
        w.write_fixed_string(&self.submit_time, 10);
        w.write_fixed_string(&self.done_time, 10);
        w.write_fixed_string(&self.dest_terminal_id, 21);
        w.write_u32(self.smsc_sequence);

        w.into_bytes()
    }

    pub fn unpack(data: &[u8]) -> Result<Self, OpError> {
        let mut r = PacketReader::new(data);
        let p = CmppReceipt {
            msg_id: r.read_u64(),
            stat: r.read_cstring(7),
            submit_time: r.read_cstring(10),
            done_time: r.read_cstring(10),
            dest_terminal_id: r.read_cstring(21),
            smsc_sequence: r.read_u32(),
        };
        r.finish()?;
        Ok(p)
    }
}
