use std::fmt;

use num_enum::TryFromPrimitive;

/// Sentinel bounds for the two command id ranges. A valid id lies
/// strictly between a min and its matching max.
pub const CMPP_REQUEST_MIN: u32 = 0x0000_0000;
pub const CMPP_REQUEST_MAX: u32 = 0x0000_0018;
pub const CMPP_RESPONSE_MIN: u32 = 0x8000_0000;
pub const CMPP_RESPONSE_MAX: u32 = 0x8000_0018;

/// CMPP command identifiers.
///
/// Requests occupy `0x00000001..0x0000000F` and `0x00000010..0x00000017`;
/// a response carries its request id with bit 31 set. The MT/MO route
/// family is enumerated for completeness but not dispatched: a route PDU
/// read off the wire surfaces `CommandIdNotSupported`.
#[derive(TryFromPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandId {
    Connect = 0x0000_0001,
    ConnectResp = 0x8000_0001,
    Terminate = 0x0000_0002,
    TerminateResp = 0x8000_0002,
    Submit = 0x0000_0004,
    SubmitResp = 0x8000_0004,
    Deliver = 0x0000_0005,
    DeliverResp = 0x8000_0005,
    Query = 0x0000_0006,
    QueryResp = 0x8000_0006,
    Cancel = 0x0000_0007,
    CancelResp = 0x8000_0007,
    ActiveTest = 0x0000_0008,
    ActiveTestResp = 0x8000_0008,
    Fwd = 0x0000_0009,
    FwdResp = 0x8000_0009,

    MtRoute = 0x0000_0010,
    MtRouteResp = 0x8000_0010,
    MoRoute = 0x0000_0011,
    MoRouteResp = 0x8000_0011,
    GetMtRoute = 0x0000_0012,
    GetMtRouteResp = 0x8000_0012,
    MtRouteUpdate = 0x0000_0013,
    MtRouteUpdateResp = 0x8000_0013,
    MoRouteUpdate = 0x0000_0014,
    MoRouteUpdateResp = 0x8000_0014,
    PushMtRouteUpdate = 0x0000_0015,
    PushMtRouteUpdateResp = 0x8000_0015,
    PushMoRouteUpdate = 0x0000_0016,
    PushMoRouteUpdateResp = 0x8000_0016,
    GetMoRoute = 0x0000_0017,
    GetMoRouteResp = 0x8000_0017,
}

impl CommandId {
    /// Range validity test for a raw id read off the wire. Passing this
    /// does not mean the id is dispatchable; unused ids inside the range
    /// fail later with `CommandIdNotSupported`.
    pub fn is_valid_raw(id: u32) -> bool {
        (id > CMPP_REQUEST_MIN && id < CMPP_REQUEST_MAX)
            || (id > CMPP_RESPONSE_MIN && id < CMPP_RESPONSE_MAX)
    }

    /// True when bit 31 is set.
    pub fn is_response(self) -> bool {
        (self as u32) & 0x8000_0000 != 0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandId::Connect => "CMPP_CONNECT",
            CommandId::ConnectResp => "CMPP_CONNECT_RESP",
            CommandId::Terminate => "CMPP_TERMINATE",
            CommandId::TerminateResp => "CMPP_TERMINATE_RESP",
            CommandId::Submit => "CMPP_SUBMIT",
            CommandId::SubmitResp => "CMPP_SUBMIT_RESP",
            CommandId::Deliver => "CMPP_DELIVER",
            CommandId::DeliverResp => "CMPP_DELIVER_RESP",
            CommandId::Query => "CMPP_QUERY",
            CommandId::QueryResp => "CMPP_QUERY_RESP",
            CommandId::Cancel => "CMPP_CANCEL",
            CommandId::CancelResp => "CMPP_CANCEL_RESP",
            CommandId::ActiveTest => "CMPP_ACTIVE_TEST",
            CommandId::ActiveTestResp => "CMPP_ACTIVE_TEST_RESP",
            CommandId::Fwd => "CMPP_FWD",
            CommandId::FwdResp => "CMPP_FWD_RESP",
            CommandId::MtRoute => "CMPP_MT_ROUTE",
            CommandId::MtRouteResp => "CMPP_MT_ROUTE_RESP",
            CommandId::MoRoute => "CMPP_MO_ROUTE",
            CommandId::MoRouteResp => "CMPP_MO_ROUTE_RESP",
            CommandId::GetMtRoute => "CMPP_GET_MT_ROUTE",
            CommandId::GetMtRouteResp => "CMPP_GET_MT_ROUTE_RESP",
            CommandId::MtRouteUpdate => "CMPP_MT_ROUTE_UPDATE",
            CommandId::MtRouteUpdateResp => "CMPP_MT_ROUTE_UPDATE_RESP",
            CommandId::MoRouteUpdate => "CMPP_MO_ROUTE_UPDATE",
            CommandId::MoRouteUpdateResp => "CMPP_MO_ROUTE_UPDATE_RESP",
            CommandId::PushMtRouteUpdate => "CMPP_PUSH_MT_ROUTE_UPDATE",
            CommandId::PushMtRouteUpdateResp => "CMPP_PUSH_MT_ROUTE_UPDATE_RESP",
            CommandId::PushMoRouteUpdate => "CMPP_PUSH_MO_ROUTE_UPDATE",
            CommandId::PushMoRouteUpdateResp => "CMPP_PUSH_MO_ROUTE_UPDATE_RESP",
            CommandId::GetMoRoute => "CMPP_GET_MO_ROUTE",
            CommandId::GetMoRouteResp => "CMPP_GET_MO_ROUTE_RESP",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_bit() {
        assert!(!CommandId::Connect.is_response());
        assert!(CommandId::ConnectResp.is_response());
        assert!(!CommandId::ActiveTest.is_response());
        assert!(CommandId::ActiveTestResp.is_response());
    }

    #[test]
    fn raw_range_validity() {
        assert!(!CommandId::is_valid_raw(0x0000_0000));
        assert!(CommandId::is_valid_raw(0x0000_0001));
        // The gap id 0x03 is range-valid even though no PDU uses it.
        assert!(CommandId::is_valid_raw(0x0000_0003));
        assert!(CommandId::is_valid_raw(0x0000_0017));
        assert!(!CommandId::is_valid_raw(0x0000_0018));
        assert!(!CommandId::is_valid_raw(0x8000_0000));
        assert!(CommandId::is_valid_raw(0x8000_0001));
        assert!(!CommandId::is_valid_raw(0x8000_0018));
        assert!(!CommandId::is_valid_raw(0x7fff_ffff));
    }

    #[test]
    fn unused_gap_id_is_not_a_member() {
        assert!(CommandId::try_from(0x0000_0003u32).is_err());
        assert!(CommandId::try_from(0x0000_0004u32).is_ok());
    }

    #[test]
    fn display_names() {
        assert_eq!(CommandId::Connect.to_string(), "CMPP_CONNECT");
        assert_eq!(CommandId::SubmitResp.to_string(), "CMPP_SUBMIT_RESP");
        assert_eq!(CommandId::GetMoRoute.to_string(), "CMPP_GET_MO_ROUTE");
    }
}
