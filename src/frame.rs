//! One framed CMPP message of any supported type.
//!
//! `Frame` is the tagged union the session framer hands out and the
//! server's handler chain matches on. Large request records are boxed so
//! the enum stays cheap to move.

use bytes::Bytes;

use crate::codec::{OpError, Packable};
use crate::datatypes::*;

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    ConnReq(CmppConnReq),
    Cmpp2ConnRsp(Cmpp2ConnRsp),
    Cmpp3ConnRsp(Cmpp3ConnRsp),
    TerminateReq(CmppTerminateReq),
    TerminateRsp(CmppTerminateRsp),
    ActiveTestReq(CmppActiveTestReq),
    ActiveTestRsp(CmppActiveTestRsp),
    Cmpp2SubmitReq(Box<Cmpp2SubmitReq>),
    Cmpp2SubmitRsp(Cmpp2SubmitRsp),
    Cmpp3SubmitReq(Box<Cmpp3SubmitReq>),
    Cmpp3SubmitRsp(Cmpp3SubmitRsp),
    Cmpp2DeliverReq(Box<Cmpp2DeliverReq>),
    Cmpp2DeliverRsp(Cmpp2DeliverRsp),
    Cmpp3DeliverReq(Box<Cmpp3DeliverReq>),
    Cmpp3DeliverRsp(Cmpp3DeliverRsp),
    Cmpp2FwdReq(Box<Cmpp2FwdReq>),
    Cmpp2FwdRsp(Cmpp2FwdRsp),
    Cmpp3FwdReq(Box<Cmpp3FwdReq>),
    Cmpp3FwdRsp(Cmpp3FwdRsp),
}

impl Frame {
    /// The command id this frame travels under.
    pub fn command_id(&self) -> CommandId {
        match self {
            Frame::ConnReq(_) => CommandId::Connect,
            Frame::Cmpp2ConnRsp(_) | Frame::Cmpp3ConnRsp(_) => CommandId::ConnectResp,
            Frame::TerminateReq(_) => CommandId::Terminate,
            Frame::TerminateRsp(_) => CommandId::TerminateResp,
            Frame::ActiveTestReq(_) => CommandId::ActiveTest,
            Frame::ActiveTestRsp(_) => CommandId::ActiveTestResp,
            Frame::Cmpp2SubmitReq(_) | Frame::Cmpp3SubmitReq(_) => CommandId::Submit,
            Frame::Cmpp2SubmitRsp(_) | Frame::Cmpp3SubmitRsp(_) => CommandId::SubmitResp,
            Frame::Cmpp2DeliverReq(_) | Frame::Cmpp3DeliverReq(_) => CommandId::Deliver,
            Frame::Cmpp2DeliverRsp(_) | Frame::Cmpp3DeliverRsp(_) => CommandId::DeliverResp,
            Frame::Cmpp2FwdReq(_) | Frame::Cmpp3FwdReq(_) => CommandId::Fwd,
            Frame::Cmpp2FwdRsp(_) | Frame::Cmpp3FwdRsp(_) => CommandId::FwdResp,
        }
    }

    /// The sequence id recorded on the inner record.
    pub fn seq_id(&self) -> u32 {
        match self {
            Frame::ConnReq(p) => p.seq_id,
            Frame::Cmpp2ConnRsp(p) => p.seq_id,
            Frame::Cmpp3ConnRsp(p) => p.seq_id,
            Frame::TerminateReq(p) => p.seq_id,
            Frame::TerminateRsp(p) => p.seq_id,
            Frame::ActiveTestReq(p) => p.seq_id,
            Frame::ActiveTestRsp(p) => p.seq_id,
            Frame::Cmpp2SubmitReq(p) => p.seq_id,
            Frame::Cmpp2SubmitRsp(p) => p.seq_id,
            Frame::Cmpp3SubmitReq(p) => p.seq_id,
            Frame::Cmpp3SubmitRsp(p) => p.seq_id,
            Frame::Cmpp2DeliverReq(p) => p.seq_id,
            Frame::Cmpp2DeliverRsp(p) => p.seq_id,
            Frame::Cmpp3DeliverReq(p) => p.seq_id,
            Frame::Cmpp3DeliverRsp(p) => p.seq_id,
            Frame::Cmpp2FwdReq(p) => p.seq_id,
            Frame::Cmpp2FwdRsp(p) => p.seq_id,
            Frame::Cmpp3FwdReq(p) => p.seq_id,
            Frame::Cmpp3FwdRsp(p) => p.seq_id,
        }
    }

    pub fn is_response(&self) -> bool {
        self.command_id().is_response()
    }
}

impl Packable for Frame {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, OpError> {
        match self {
            Frame::ConnReq(p) => p.pack(seq_id),
            Frame::Cmpp2ConnRsp(p) => p.pack(seq_id),
            Frame::Cmpp3ConnRsp(p) => p.pack(seq_id),
            Frame::TerminateReq(p) => p.pack(seq_id),
            Frame::TerminateRsp(p) => p.pack(seq_id),
            Frame::ActiveTestReq(p) => p.pack(seq_id),
            Frame::ActiveTestRsp(p) => p.pack(seq_id),
            Frame::Cmpp2SubmitReq(p) => p.pack(seq_id),
            Frame::Cmpp2SubmitRsp(p) => p.pack(seq_id),
            Frame::Cmpp3SubmitReq(p) => p.pack(seq_id),
            Frame::Cmpp3SubmitRsp(p) => p.pack(seq_id),
            Frame::Cmpp2DeliverReq(p) => p.pack(seq_id),
            Frame::Cmpp2DeliverRsp(p) => p.pack(seq_id),
            Frame::Cmpp3DeliverReq(p) => p.pack(seq_id),
            Frame::Cmpp3DeliverRsp(p) => p.pack(seq_id),
            Frame::Cmpp2FwdReq(p) => p.pack(seq_id),
            Frame::Cmpp2FwdRsp(p) => p.pack(seq_id),
            Frame::Cmpp3FwdReq(p) => p.pack(seq_id),
            Frame::Cmpp3FwdRsp(p) => p.pack(seq_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Unpackable;

    #[test]
    fn frame_accessors() {
        let mut req = CmppActiveTestReq::default();
        let data = req.pack(42).unwrap();
        let frame = Frame::ActiveTestReq(CmppActiveTestReq::unpack(&data[8..]).unwrap());

        assert_eq!(frame.command_id(), CommandId::ActiveTest);
        assert_eq!(frame.seq_id(), 42);
        assert!(!frame.is_response());

        let frame = Frame::Cmpp3SubmitRsp(Cmpp3SubmitRsp {
            seq_id: 43,
            ..Default::default()
        });
        assert_eq!(frame.command_id(), CommandId::SubmitResp);
        assert_eq!(frame.seq_id(), 43);
        assert!(frame.is_response());
    }

    #[test]
    fn frame_packs_like_inner_record() {
        let mut inner = CmppTerminateReq::default();
        let direct = inner.pack(7).unwrap();

        let mut frame = Frame::TerminateReq(CmppTerminateReq::default());
        let via_frame = frame.pack(7).unwrap();
        assert_eq!(direct, via_frame);
        assert_eq!(frame.seq_id(), 7);
    }
}
