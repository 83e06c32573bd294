//! CMPP PDU records and the protocol's primitive enums.
//!
//! One module per PDU family, mirroring the request/response pairs of the
//! protocol. Every record implements `pack(seq_id)`/`unpack(body)` via the
//! [`Packable`](crate::codec::Packable)/[`Unpackable`](crate::codec::Unpackable)
//! traits; the receipt sub-record is header-less and has inherent methods
//! instead.

pub mod command_id;
pub mod connect;
pub mod deliver;
pub mod fwd;
pub mod receipt;
pub mod submit;
pub mod terminate;
pub mod version;

pub use active_test::{
    CmppActiveTestReq, CmppActiveTestRsp, CMPP_ACTIVE_TEST_REQ_PKT_LEN,
    CMPP_ACTIVE_TEST_RSP_PKT_LEN,
};
pub use command_id::{
    CommandId, CMPP_REQUEST_MAX, CMPP_REQUEST_MIN, CMPP_RESPONSE_MAX, CMPP_RESPONSE_MIN,
};
pub use connect::{
    auth_src, timestamp_to_str, Cmpp2ConnRsp, Cmpp3ConnRsp, CmppConnReq, ConnectError,
    CMPP2_CONN_RSP_PKT_LEN, CMPP3_CONN_RSP_PKT_LEN, CMPP_CONN_REQ_PKT_LEN,
};
pub use deliver::{
    Cmpp2DeliverReq, Cmpp2DeliverRsp, Cmpp3DeliverReq, Cmpp3DeliverRsp, DeliverError,
    CMPP2_DELIVER_REQ_PKT_MAX_LEN, CMPP2_DELIVER_RSP_PKT_LEN, CMPP3_DELIVER_REQ_PKT_MAX_LEN,
    CMPP3_DELIVER_RSP_PKT_LEN,
};
pub use fwd::{
    Cmpp2FwdReq, Cmpp2FwdRsp, Cmpp3FwdReq, Cmpp3FwdRsp, FwdError, CMPP2_FWD_REQ_PKT_MAX_LEN,
    CMPP2_FWD_RSP_PKT_LEN, CMPP3_FWD_REQ_PKT_MAX_LEN, CMPP3_FWD_RSP_PKT_LEN,
};
pub use receipt::{CmppReceipt, CMPP_RECEIPT_PKT_LEN};
pub use submit::{
    Cmpp2SubmitReq, Cmpp2SubmitRsp, Cmpp3SubmitReq, Cmpp3SubmitRsp, SubmitError,
    CMPP2_SUBMIT_REQ_PKT_MAX_LEN, CMPP2_SUBMIT_RSP_PKT_LEN, CMPP3_SUBMIT_REQ_PKT_MAX_LEN,
    CMPP3_SUBMIT_RSP_PKT_LEN,
};
pub use terminate::{
    CmppTerminateReq, CmppTerminateRsp, CMPP_TERMINATE_REQ_PKT_LEN, CMPP_TERMINATE_RSP_PKT_LEN,
};
pub use version::{
    Version, CMPP2_PACKET_MAX, CMPP2_PACKET_MIN, CMPP3_PACKET_MAX, CMPP3_PACKET_MIN,
};
