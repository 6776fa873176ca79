//! AVRCP message vocabulary
//!
//! The remote-control transport hands the engine already-decoded pass-through and vendor-dependent
//! messages. This module names the command/response codes the engine reasons about and implements
//! the checks it answers locally: operation support, group navigation and the metadata commands
//! that never need the application (capability queries and malformed requests).

use crate::constants::MAX_RC_DATA;
use heapless::Vec;

/// Operand bytes of a pass-through or vendor-dependent message
pub type RcData = Vec<u8, MAX_RC_DATA>;

/// Target category 1 (player/recorder)
pub const CATEGORY_PLAYER_RECORDER: u16 = 0x0001;
/// Category 2 (monitor/amplifier)
pub const CATEGORY_MONITOR_AMP: u16 = 0x0002;
/// Category 3 (tuner)
pub const CATEGORY_TUNER: u16 = 0x0004;
/// Category 4 (menu)
pub const CATEGORY_MENU: u16 = 0x0008;

/// Command types
pub mod ctype {
    /// Control
    pub const CTRL: u8 = 0x00;
    /// Status
    pub const STATUS: u8 = 0x01;
    /// Specific inquiry
    pub const SPEC_INQ: u8 = 0x02;
    /// Notify
    pub const NOTIF: u8 = 0x03;
    /// General inquiry
    pub const GEN_INQ: u8 = 0x04;
}

/// Response codes
pub mod rsp {
    /// Not implemented
    pub const NOT_IMPL: u8 = 0x08;
    /// Accepted
    pub const ACCEPT: u8 = 0x09;
    /// Rejected
    pub const REJ: u8 = 0x0A;
    /// In transition
    pub const IN_TRANS: u8 = 0x0B;
    /// Implemented / stable
    pub const IMPL_STBL: u8 = 0x0C;
    /// Changed
    pub const CHANGED: u8 = 0x0D;
    /// Interim
    pub const INTERIM: u8 = 0x0F;
}

/// Pass-through operation id carrying a vendor unique payload
pub const ID_VENDOR: u8 = 0x7E;

/// Bluetooth SIG company id used by metadata and group navigation
pub const CO_METADATA: u32 = 0x00_19_58;

/// Panel subunit type
pub const SUB_PANEL: u8 = 0x09;

/// Length of a group navigation vendor unique operand
pub const PASS_THRU_GROUP_LEN: usize = 5;

/// Next group vendor unique operation
pub const GRP_NEXT: u16 = 0x0000;
/// Previous group vendor unique operation
pub const GRP_PREV: u16 = 0x0001;

/// Metadata PDU ids
pub mod pdu {
    /// Get capabilities
    pub const GET_CAPABILITIES: u8 = 0x10;
    /// List player application settings attributes
    pub const LIST_PLAYER_APP_ATTR: u8 = 0x11;
    /// Set player application setting value
    pub const SET_PLAYER_APP_VALUE: u8 = 0x14;
    /// Get element attributes
    pub const GET_ELEMENT_ATTR: u8 = 0x20;
    /// Get play status
    pub const GET_PLAY_STATUS: u8 = 0x30;
    /// Register notification
    pub const REGISTER_NOTIFICATION: u8 = 0x31;
    /// Set absolute volume
    pub const SET_ABSOLUTE_VOLUME: u8 = 0x50;
    /// Marker for an unparseable PDU
    pub const INVALID: u8 = 0xFF;
}

/// `GetCapabilities` capability ids
pub const CAP_COMPANY_ID: u8 = 0x02;
/// Events supported capability id
pub const CAP_EVENTS_SUPPORTED: u8 = 0x03;

/// Metadata status codes
pub mod status {
    /// Invalid command
    pub const BAD_CMD: u8 = 0x00;
    /// Invalid parameter
    pub const BAD_PARAM: u8 = 0x01;
    /// Internal error
    pub const INTERNAL_ERR: u8 = 0x03;
    /// Success
    pub const NO_ERROR: u8 = 0x04;
}

/// A decoded pass-through message
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PassThrough {
    /// Command type or response code
    pub ctype: u8,
    /// Operation id
    pub op_id: u8,
    /// Key pressed (false for release)
    pub pressed: bool,
    /// Vendor unique operand, only used with [`ID_VENDOR`]
    pub data: RcData,
}

/// A decoded vendor-dependent message
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VendorMessage {
    /// Command type or response code
    pub ctype: u8,
    /// Subunit type
    pub subunit_type: u8,
    /// Company id
    pub company_id: u32,
    /// Operand: metadata PDU id followed by its parameters
    pub data: RcData,
}

/// Message received on an AVRCP connection
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RcMessage {
    /// Pass-through command or response
    PassThrough(PassThrough),
    /// Vendor-dependent command or response
    Vendor(VendorMessage),
}

/// Metadata response handed to the remote-control transport
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MetaResponse {
    /// PDU being answered
    pub pdu: u8,
    /// Metadata status, [`status::NO_ERROR`] for a regular response
    pub status: u8,
    /// Response parameters
    pub payload: RcData,
}

impl MetaResponse {
    /// An error response for `pdu`
    #[must_use]
    pub fn error(pdu: u8, status: u8) -> Self {
        Self {
            pdu,
            status,
            payload: Vec::new(),
        }
    }
}

/// What the engine does with a metadata command
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MetaOutcome {
    /// Answer locally with `ctype`, nothing reaches the application
    Respond {
        /// Response code
        ctype: u8,
        /// Response body
        response: MetaResponse,
    },
    /// Deliver to the application as a metadata message
    Forward,
    /// Answer with a NOT IMPLEMENTED vendor response
    NotImplemented,
}

/// True for the command ctypes (as opposed to responses)
#[must_use]
pub const fn is_command(ctype: u8) -> bool {
    ctype <= ctype::GEN_INQ
}

/// Response code for a pass-through operation the target does or does not support
#[must_use]
pub const fn op_response(supported: bool, is_inquiry: bool) -> u8 {
    match (supported, is_inquiry) {
        (false, _) => rsp::NOT_IMPL,
        (true, true) => rsp::IMPL_STBL,
        (true, false) => rsp::ACCEPT,
    }
}

/// Response code for a vendor unique pass-through, which may carry group navigation
#[must_use]
pub fn group_navigation_response(data: &[u8], enabled: bool, is_inquiry: bool) -> u8 {
    if !enabled || data.len() != PASS_THRU_GROUP_LEN {
        return rsp::NOT_IMPL;
    }
    let company = u32::from_be_bytes([0, data[0], data[1], data[2]]);
    if company != CO_METADATA {
        return rsp::NOT_IMPL;
    }
    match u16::from_be_bytes([data[3], data[4]]) {
        GRP_NEXT | GRP_PREV => op_response(true, is_inquiry),
        _ => rsp::NOT_IMPL,
    }
}

const fn expected_ctype(pdu: u8) -> Option<u8> {
    match pdu {
        pdu::GET_CAPABILITIES | pdu::LIST_PLAYER_APP_ATTR | pdu::GET_ELEMENT_ATTR
        | pdu::GET_PLAY_STATUS => Some(ctype::STATUS),
        pdu::REGISTER_NOTIFICATION => Some(ctype::NOTIF),
        pdu::SET_PLAYER_APP_VALUE | pdu::SET_ABSOLUTE_VOLUME => Some(ctype::CTRL),
        _ => None,
    }
}

fn reject(pdu: u8, status: u8) -> MetaOutcome {
    MetaOutcome::Respond {
        ctype: rsp::REJ,
        response: MetaResponse::error(pdu, status),
    }
}

/// Classify a metadata command.
///
/// `company_id` answers `GetCapabilities(COMPANY_ID)` and `events` lists the notification event
/// ids the local target supports.
#[must_use]
pub fn process_meta_command(msg: &VendorMessage, company_id: u32, events: &[u8]) -> MetaOutcome {
    if msg.subunit_type != SUB_PANEL {
        return MetaOutcome::NotImplemented;
    }
    let Some(&pdu) = msg.data.first() else {
        return reject(pdu::INVALID, status::BAD_CMD);
    };
    if let Some(expected) = expected_ctype(pdu)
        && expected != msg.ctype
    {
        return reject(pdu, status::BAD_CMD);
    }

    match pdu {
        pdu::GET_CAPABILITIES => {
            let Some(&cap_id) = msg.data.get(1) else {
                return reject(pdu, status::INTERNAL_ERR);
            };
            let mut payload = RcData::new();
            let _ = payload.push(cap_id);
            match cap_id {
                CAP_COMPANY_ID => {
                    let be = company_id.to_be_bytes();
                    let _ = payload.push(1);
                    let _ = payload.extend_from_slice(&be[1..]);
                }
                CAP_EVENTS_SUPPORTED => {
                    let count = events.len().min(MAX_RC_DATA - 2);
                    let _ = payload.push(count as u8);
                    let _ = payload.extend_from_slice(&events[..count]);
                }
                _ => return reject(pdu, status::BAD_PARAM),
            }
            MetaOutcome::Respond {
                ctype: rsp::IMPL_STBL,
                response: MetaResponse {
                    pdu,
                    status: status::NO_ERROR,
                    payload,
                },
            }
        }
        pdu::REGISTER_NOTIFICATION => match msg.data.get(1) {
            Some(id) if events.contains(id) => MetaOutcome::Forward,
            _ => reject(pdu, status::BAD_PARAM),
        },
        pdu::INVALID => reject(pdu, status::BAD_CMD),
        _ => MetaOutcome::Forward,
    }
}
