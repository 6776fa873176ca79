//! Events flowing through the serial queue and the upcalls the engine emits.
//!
//! Everything that can change engine state arrives as one [`Event`]: application requests, codec
//! responses, transport and discovery callbacks and timer expiries. The dispatcher routes stream
//! events to a stream state machine, main events to the main state machine and system events to
//! their handlers.

use crate::avrc::{MetaResponse, RcData, RcMessage};
use crate::codec::{CodecInfo, MediaType, StreamConfig, Tsep};
use crate::constants::{
    MAX_DISC_SEPS, MAX_LOCAL_SEPS, MAX_RC_SDP_RECORDS, MAX_SECURITY_DATA, avdt_err,
};
use crate::{AvChannel, AvHandle, BluetoothAddress, Features, LinkRole, Status};
use heapless::Vec;

/// Content protection payload
pub type SecurityData = Vec<u8, MAX_SECURITY_DATA>;

/// Peer stream endpoints reported by discovery
pub type PeerSeps = Vec<SepInfo, MAX_DISC_SEPS>;

/// Peer stream endpoint as reported by stream discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SepInfo {
    /// Peer endpoint id
    pub seid: u8,
    /// Endpoint already in use on the peer
    pub in_use: bool,
    /// Media type
    pub media: MediaType,
    /// Endpoint role on the peer
    pub tsep: Tsep,
}

/// Local endpoint requested at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LocalSepConfig {
    /// Endpoint role
    pub tsep: Tsep,
    /// Codec capabilities advertised for the endpoint
    pub codec_info: CodecInfo,
}

/// Outcome of a role switch an open was waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwitchResult {
    /// No switch was involved yet
    #[default]
    None,
    /// Switch completed
    Ok,
    /// Switch failed
    Fail,
    /// Proceed without waiting any further
    Done,
}

/// Parameters of an open request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpenRequest {
    /// Peer to connect to
    pub peer: BluetoothAddress,
    /// Local service class (audio source or sink)
    pub uuid: u16,
    /// Bring up AVRCP with the stream
    pub use_rc: bool,
    /// Security mask for the signalling channel
    pub sec_mask: u8,
    /// Role switch outcome when the open is being resumed
    pub switch_res: SwitchResult,
}

/// Parameters of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StopRequest {
    /// Suspend the stream instead of only stopping local media
    pub suspend: bool,
    /// Flush queued media
    pub flush: bool,
}

/// Parameters of a reconfiguration request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReconfigRequest {
    /// New codec configuration
    pub codec_info: CodecInfo,
    /// Peer endpoint index to use
    pub sep_info_idx: u8,
    /// Suspend and reconfigure in place rather than close and reopen
    pub suspend: bool,
    /// Number of content protection elements
    pub num_protect: u8,
    /// Content protection information
    pub protect_info: [u8; crate::constants::PROTECT_INFO_LEN],
}

/// A configuration indication from the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigIndication {
    /// Transaction label to answer with
    pub label: u8,
    /// Peer (initiator) endpoint id
    pub int_seid: u8,
    /// Local endpoint transport handle being configured
    pub avdt_handle: u8,
    /// Peer address
    pub peer: BluetoothAddress,
    /// Requested configuration
    pub cfg: StreamConfig,
}

/// Events handled by the stream state machine
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamEvent {
    /// Open a stream to a peer
    ApiOpen(OpenRequest),
    /// Close the stream
    ApiClose,
    /// Start streaming
    ApiStart,
    /// Stop or suspend streaming
    ApiStop(StopRequest),
    /// Reconfigure the stream
    ApiReconfig(ReconfigRequest),
    /// Send a content protection request
    ApiProtectReq(SecurityData),
    /// Answer a content protection request
    ApiProtectRsp {
        /// Error code, 0 for success
        err: u8,
        /// Payload
        data: SecurityData,
    },
    /// Bring up AVRCP for the stream
    ApiRcOpen,
    /// Set the local delay value
    ApiSetDelayValue(u16),
    /// The codec has media ready to send
    SrcDataReady,
    /// The codec accepted a peer configuration
    CiSetconfigOk {
        /// Number of peer endpoints to probe afterwards
        num_seps: u8,
        /// Peer endpoint ids to probe
        seids: Vec<u8, MAX_DISC_SEPS>,
        /// The codec wants to reconfigure once streaming
        recfg_needed: bool,
        /// Local endpoint transport handle
        avdt_handle: u8,
    },
    /// The codec rejected a peer configuration
    CiSetconfigFail {
        /// AVDTP error to answer with
        err: u8,
        /// Offending service category
        category: u8,
        /// Local endpoint transport handle
        avdt_handle: u8,
    },
    /// A2DP service found on the peer
    SdpDiscOk,
    /// A2DP service lookup failed
    SdpDiscFail,
    /// Stream discovery succeeded
    StrDiscOk(PeerSeps),
    /// Stream discovery failed
    StrDiscFail,
    /// Capability query succeeded
    StrGetcapOk(StreamConfig),
    /// Capability query failed
    StrGetcapFail,
    /// Transport stream open
    StrOpenOk {
        /// Peer L2CAP MTU
        peer_mtu: u16,
    },
    /// Transport stream open failed
    StrOpenFail {
        /// AVDTP error
        err: u8,
    },
    /// Streaming started
    StrStartOk,
    /// Start rejected
    StrStartFail {
        /// AVDTP error
        err: u8,
    },
    /// Stream closed
    StrClose,
    /// Peer configures a local endpoint
    StrConfigInd(ConfigIndication),
    /// Peer content protection request
    StrSecurityInd {
        /// Transaction label
        label: u8,
        /// Payload
        data: SecurityData,
    },
    /// Peer content protection response
    StrSecurityCfm {
        /// Error code
        err: u8,
        /// Payload
        data: SecurityData,
    },
    /// The transport accepted a media packet
    StrWriteCfm,
    /// Suspend confirmed or indicated
    StrSuspendCfm {
        /// AVDTP error
        err: u8,
        /// The local side asked for the suspend
        initiator: bool,
    },
    /// Reconfiguration confirmed
    StrReconfigCfm {
        /// AVDTP error
        err: u8,
        /// Configuration now in use
        codec_info: CodecInfo,
    },
    /// Per-stream timer expired
    AvrcTimer,
    /// Signalling channel up
    AvdtConnect,
    /// Signalling channel down
    AvdtDisconnect,
    /// Link role changed
    RoleChange {
        /// HCI status of the switch
        hci_status: u8,
        /// New role
        new_role: LinkRole,
    },
    /// Peer delay report
    AvdtDelayReport(u16),
    /// Peer opened signalling towards this endpoint
    AcpConnect,
}

/// Discriminant of [`StreamEvent`], used for table lookups and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum StreamEventKind {
    ApiOpen,
    ApiClose,
    ApiStart,
    ApiStop,
    ApiReconfig,
    ApiProtectReq,
    ApiProtectRsp,
    ApiRcOpen,
    ApiSetDelayValue,
    SrcDataReady,
    CiSetconfigOk,
    CiSetconfigFail,
    SdpDiscOk,
    SdpDiscFail,
    StrDiscOk,
    StrDiscFail,
    StrGetcapOk,
    StrGetcapFail,
    StrOpenOk,
    StrOpenFail,
    StrStartOk,
    StrStartFail,
    StrClose,
    StrConfigInd,
    StrSecurityInd,
    StrSecurityCfm,
    StrWriteCfm,
    StrSuspendCfm,
    StrReconfigCfm,
    AvrcTimer,
    AvdtConnect,
    AvdtDisconnect,
    RoleChange,
    AvdtDelayReport,
    AcpConnect,
}

impl StreamEventKind {
    /// Every stream event kind
    pub const ALL: [Self; 35] = [
        Self::ApiOpen,
        Self::ApiClose,
        Self::ApiStart,
        Self::ApiStop,
        Self::ApiReconfig,
        Self::ApiProtectReq,
        Self::ApiProtectRsp,
        Self::ApiRcOpen,
        Self::ApiSetDelayValue,
        Self::SrcDataReady,
        Self::CiSetconfigOk,
        Self::CiSetconfigFail,
        Self::SdpDiscOk,
        Self::SdpDiscFail,
        Self::StrDiscOk,
        Self::StrDiscFail,
        Self::StrGetcapOk,
        Self::StrGetcapFail,
        Self::StrOpenOk,
        Self::StrOpenFail,
        Self::StrStartOk,
        Self::StrStartFail,
        Self::StrClose,
        Self::StrConfigInd,
        Self::StrSecurityInd,
        Self::StrSecurityCfm,
        Self::StrWriteCfm,
        Self::StrSuspendCfm,
        Self::StrReconfigCfm,
        Self::AvrcTimer,
        Self::AvdtConnect,
        Self::AvdtDisconnect,
        Self::RoleChange,
        Self::AvdtDelayReport,
        Self::AcpConnect,
    ];
}

impl StreamEvent {
    /// The event's discriminant
    #[must_use]
    pub const fn kind(&self) -> StreamEventKind {
        match self {
            Self::ApiOpen(_) => StreamEventKind::ApiOpen,
            Self::ApiClose => StreamEventKind::ApiClose,
            Self::ApiStart => StreamEventKind::ApiStart,
            Self::ApiStop(_) => StreamEventKind::ApiStop,
            Self::ApiReconfig(_) => StreamEventKind::ApiReconfig,
            Self::ApiProtectReq(_) => StreamEventKind::ApiProtectReq,
            Self::ApiProtectRsp { .. } => StreamEventKind::ApiProtectRsp,
            Self::ApiRcOpen => StreamEventKind::ApiRcOpen,
            Self::ApiSetDelayValue(_) => StreamEventKind::ApiSetDelayValue,
            Self::SrcDataReady => StreamEventKind::SrcDataReady,
            Self::CiSetconfigOk { .. } => StreamEventKind::CiSetconfigOk,
            Self::CiSetconfigFail { .. } => StreamEventKind::CiSetconfigFail,
            Self::SdpDiscOk => StreamEventKind::SdpDiscOk,
            Self::SdpDiscFail => StreamEventKind::SdpDiscFail,
            Self::StrDiscOk(_) => StreamEventKind::StrDiscOk,
            Self::StrDiscFail => StreamEventKind::StrDiscFail,
            Self::StrGetcapOk(_) => StreamEventKind::StrGetcapOk,
            Self::StrGetcapFail => StreamEventKind::StrGetcapFail,
            Self::StrOpenOk { .. } => StreamEventKind::StrOpenOk,
            Self::StrOpenFail { .. } => StreamEventKind::StrOpenFail,
            Self::StrStartOk => StreamEventKind::StrStartOk,
            Self::StrStartFail { .. } => StreamEventKind::StrStartFail,
            Self::StrClose => StreamEventKind::StrClose,
            Self::StrConfigInd(_) => StreamEventKind::StrConfigInd,
            Self::StrSecurityInd { .. } => StreamEventKind::StrSecurityInd,
            Self::StrSecurityCfm { .. } => StreamEventKind::StrSecurityCfm,
            Self::StrWriteCfm => StreamEventKind::StrWriteCfm,
            Self::StrSuspendCfm { .. } => StreamEventKind::StrSuspendCfm,
            Self::StrReconfigCfm { .. } => StreamEventKind::StrReconfigCfm,
            Self::AvrcTimer => StreamEventKind::AvrcTimer,
            Self::AvdtConnect => StreamEventKind::AvdtConnect,
            Self::AvdtDisconnect => StreamEventKind::AvdtDisconnect,
            Self::RoleChange { .. } => StreamEventKind::RoleChange,
            Self::AvdtDelayReport(_) => StreamEventKind::AvdtDelayReport,
            Self::AcpConnect => StreamEventKind::AcpConnect,
        }
    }
}

/// Events handled by the main (non-stream) state machine and the registration handlers
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MainEvent {
    /// Enable the engine
    Enable {
        /// Local feature mask
        features: Features,
        /// Security mask
        sec_mask: u8,
    },
    /// Disable the engine
    Disable,
    /// Register a stream
    Register {
        /// Channel
        channel: AvChannel,
        /// Application id echoed in the upcall
        app_id: u8,
        /// Local endpoints
        seps: Vec<LocalSepConfig, MAX_LOCAL_SEPS>,
    },
    /// Deregister a stream
    Deregister(AvHandle),
    /// Drop the signalling channel to a peer
    Disconnect(BluetoothAddress),
    /// Send a pass-through command
    RemoteCmd {
        /// RC handle
        rc_handle: u8,
        /// Transaction label
        label: u8,
        /// Operation id
        op_id: u8,
        /// Key pressed (false for release)
        pressed: bool,
    },
    /// Send a vendor-dependent command
    VendorCmd {
        /// RC handle
        rc_handle: u8,
        /// Transaction label
        label: u8,
        /// Command type
        ctype: u8,
        /// Operand
        data: RcData,
    },
    /// Send a vendor-dependent response
    VendorRsp {
        /// RC handle
        rc_handle: u8,
        /// Transaction label
        label: u8,
        /// Response code
        rsp_code: u8,
        /// Operand
        data: RcData,
    },
    /// Send a metadata response or command
    MetaRsp {
        /// RC handle
        rc_handle: u8,
        /// Transaction label
        label: u8,
        /// True for a response, false for a command
        is_rsp: bool,
        /// Command type or response code
        code: u8,
        /// Body
        response: MetaResponse,
    },
    /// Close an AVRCP connection
    RcClose(u8),
    /// An AVRCP connection opened
    AvrcOpen {
        /// RC handle
        rc_handle: u8,
        /// Peer address
        peer: BluetoothAddress,
    },
    /// A message arrived on an AVRCP connection
    AvrcMsg {
        /// RC handle
        rc_handle: u8,
        /// Transaction label
        label: u8,
        /// Decoded message
        msg: RcMessage,
    },
    /// The last AVRCP connection went away
    AvrcNone,
}

/// Discriminant of [`MainEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum MainEventKind {
    Enable,
    Disable,
    Register,
    Deregister,
    Disconnect,
    RemoteCmd,
    VendorCmd,
    VendorRsp,
    MetaRsp,
    RcClose,
    AvrcOpen,
    AvrcMsg,
    AvrcNone,
}

impl MainEvent {
    /// The event's discriminant
    #[must_use]
    pub const fn kind(&self) -> MainEventKind {
        match self {
            Self::Enable { .. } => MainEventKind::Enable,
            Self::Disable => MainEventKind::Disable,
            Self::Register { .. } => MainEventKind::Register,
            Self::Deregister(_) => MainEventKind::Deregister,
            Self::Disconnect(_) => MainEventKind::Disconnect,
            Self::RemoteCmd { .. } => MainEventKind::RemoteCmd,
            Self::VendorCmd { .. } => MainEventKind::VendorCmd,
            Self::VendorRsp { .. } => MainEventKind::VendorRsp,
            Self::MetaRsp { .. } => MainEventKind::MetaRsp,
            Self::RcClose(_) => MainEventKind::RcClose,
            Self::AvrcOpen { .. } => MainEventKind::AvrcOpen,
            Self::AvrcMsg { .. } => MainEventKind::AvrcMsg,
            Self::AvrcNone => MainEventKind::AvrcNone,
        }
    }
}

/// AVRC service record found on a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RcSdpRecord {
    /// Service class of the record
    pub service_uuid: u16,
    /// AVRCP profile version, 0 when absent
    pub version: u16,
    /// Supported categories/features attribute, 0 when absent
    pub categories: u16,
}

/// Control callback from the stream transport for one local endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportCallback {
    /// Discover confirmation
    DiscoverCfm {
        /// AVDTP error
        err: u8,
        /// Endpoints found
        seps: PeerSeps,
    },
    /// Get capabilities confirmation
    GetcapCfm {
        /// AVDTP error
        err: u8,
        /// Capabilities
        cfg: StreamConfig,
    },
    /// Open confirmation
    OpenCfm {
        /// AVDTP error
        err: u8,
        /// Peer MTU
        peer_mtu: u16,
    },
    /// Peer opened the stream
    OpenInd {
        /// Peer MTU
        peer_mtu: u16,
    },
    /// Peer configures a local endpoint
    ConfigInd(ConfigIndication),
    /// Start confirmation
    StartCfm {
        /// AVDTP error
        err: u8,
    },
    /// Peer started the stream
    StartInd,
    /// Suspend confirmation
    SuspendCfm {
        /// AVDTP error
        err: u8,
    },
    /// Peer suspended the stream
    SuspendInd,
    /// Close confirmation
    CloseCfm {
        /// AVDTP error
        err: u8,
    },
    /// Peer closed the stream
    CloseInd,
    /// Reconfiguration confirmation
    ReconfigCfm {
        /// AVDTP error
        err: u8,
        /// Configuration now in use
        codec_info: CodecInfo,
    },
    /// Content protection confirmation
    SecurityCfm {
        /// AVDTP error
        err: u8,
        /// Payload
        data: SecurityData,
    },
    /// Peer content protection request
    SecurityInd {
        /// Transaction label
        label: u8,
        /// Payload
        data: SecurityData,
    },
    /// Media packet handed to L2CAP
    WriteCfm,
    /// Signalling channel up
    ConnectInd {
        /// Peer address
        peer: BluetoothAddress,
        /// The peer initiated the connection
        acceptor: bool,
    },
    /// Signalling channel down
    DisconnectInd {
        /// Peer address
        peer: BluetoothAddress,
        /// HCI disconnect reason
        reason: u8,
    },
    /// Peer delay report
    DelayReport(u16),
}

impl TransportCallback {
    /// Translate into the stream event the state machine consumes.
    ///
    /// An error code selects the failure variant where one exists; indications always map to the
    /// success variant.
    #[must_use]
    pub fn into_stream_event(self) -> StreamEvent {
        match self {
            Self::DiscoverCfm { err, seps } => {
                if err == avdt_err::NONE {
                    StreamEvent::StrDiscOk(seps)
                } else {
                    StreamEvent::StrDiscFail
                }
            }
            Self::GetcapCfm { err, cfg } => {
                if err == avdt_err::NONE {
                    StreamEvent::StrGetcapOk(cfg)
                } else {
                    StreamEvent::StrGetcapFail
                }
            }
            Self::OpenCfm { err, peer_mtu } => {
                if err == avdt_err::NONE {
                    StreamEvent::StrOpenOk { peer_mtu }
                } else {
                    StreamEvent::StrOpenFail { err }
                }
            }
            Self::OpenInd { peer_mtu } => StreamEvent::StrOpenOk { peer_mtu },
            Self::ConfigInd(ind) => StreamEvent::StrConfigInd(ind),
            Self::StartCfm { err } => {
                if err == avdt_err::NONE {
                    StreamEvent::StrStartOk
                } else {
                    StreamEvent::StrStartFail { err }
                }
            }
            Self::StartInd => StreamEvent::StrStartOk,
            Self::SuspendCfm { err } => StreamEvent::StrSuspendCfm {
                err,
                initiator: true,
            },
            Self::SuspendInd => StreamEvent::StrSuspendCfm {
                err: avdt_err::NONE,
                initiator: false,
            },
            Self::CloseCfm { .. } | Self::CloseInd => StreamEvent::StrClose,
            Self::ReconfigCfm { err, codec_info } => StreamEvent::StrReconfigCfm { err, codec_info },
            Self::SecurityCfm { err, data } => StreamEvent::StrSecurityCfm { err, data },
            Self::SecurityInd { label, data } => StreamEvent::StrSecurityInd { label, data },
            Self::WriteCfm => StreamEvent::StrWriteCfm,
            Self::ConnectInd { .. } => StreamEvent::AvdtConnect,
            Self::DisconnectInd { .. } => StreamEvent::AvdtDisconnect,
            Self::DelayReport(delay) => StreamEvent::AvdtDelayReport(delay),
        }
    }
}

/// Signalling channel change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SigChange {
    /// Signalling channel connected
    Connect {
        /// The peer initiated the connection
        acceptor: bool,
    },
    /// Signalling channel disconnected
    Disconnect {
        /// HCI disconnect reason
        reason: u8,
    },
    /// A stream reached the open state over this link
    StreamConnected,
}

/// Events handled outside the state machine tables
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemEvent {
    /// Signalling channel up or down
    SigChange {
        /// Peer address
        peer: BluetoothAddress,
        /// What changed
        change: SigChange,
    },
    /// The "pending" notification timer expired
    SigTimer,
    /// The acceptor signalling timer of a link slot expired
    AcpSigTimer(u8),
    /// A2DP service lookup finished
    A2dpSdpResult {
        /// Service found
        found: bool,
        /// Peer AVDTP version, 0 when unknown
        avdt_version: u16,
    },
    /// AVRC service lookup finished
    AvrcSdpDone(Vec<RcSdpRecord, MAX_RC_SDP_RECORDS>),
    /// An AVRCP connection closed
    AvrcClosed {
        /// RC handle
        rc_handle: u8,
        /// Peer address
        peer: BluetoothAddress,
    },
    /// Link role changed
    RoleChanged {
        /// Peer address
        peer: BluetoothAddress,
        /// New role
        new_role: LinkRole,
        /// HCI status
        hci_status: u8,
    },
    /// SCO link opened or closed
    ScoChange {
        /// SCO link open
        open: bool,
    },
    /// Transport control callback for a local endpoint
    Transport {
        /// Stream the endpoint belongs to
        handle: AvHandle,
        /// Callback
        callback: TransportCallback,
    },
}

/// Every event accepted by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Event for one stream
    Stream {
        /// Target stream
        handle: AvHandle,
        /// Event
        event: StreamEvent,
    },
    /// Event for the main state machine
    Main(MainEvent),
    /// System event
    System(SystemEvent),
}

impl Event {
    /// Shorthand for a stream event
    #[must_use]
    pub const fn stream(handle: AvHandle, event: StreamEvent) -> Self {
        Self::Stream { handle, event }
    }
}

/// Upcalls delivered to the application callback
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AvEvent {
    /// Engine enabled
    Enabled {
        /// Features in effect
        features: Features,
    },
    /// Registration finished
    Registered {
        /// Outcome
        status: Status,
        /// Assigned handle, meaningless on failure
        handle: AvHandle,
        /// Channel
        channel: AvChannel,
        /// Application id from the request
        app_id: u8,
    },
    /// Deregistration finished
    Deregistered {
        /// Handle from the request
        handle: AvHandle,
    },
    /// Open finished
    Opened {
        /// Stream
        handle: AvHandle,
        /// Peer address
        peer: BluetoothAddress,
        /// Outcome
        status: Status,
        /// The stream starts right away
        starting: bool,
        /// Negotiated media MTU
        mtu: u16,
        /// Role of the peer endpoint
        peer_sep: Tsep,
    },
    /// Start finished
    Started {
        /// Stream
        handle: AvHandle,
        /// Outcome
        status: Status,
        /// The local side asked for the start
        initiator: bool,
        /// The stream is suspended again right away
        suspending: bool,
    },
    /// Local media stopped
    Stopped {
        /// Stream
        handle: AvHandle,
        /// Outcome
        status: Status,
    },
    /// Stream suspended
    Suspended {
        /// Stream
        handle: AvHandle,
        /// Outcome
        status: Status,
        /// The local side asked for the suspend
        initiator: bool,
    },
    /// Stream closed
    Closed {
        /// Stream
        handle: AvHandle,
        /// Peer address
        peer: BluetoothAddress,
        /// HCI disconnect reason, 0 for a local close
        disc_reason: u8,
    },
    /// Reconfiguration finished
    Reconfigured {
        /// Stream
        handle: AvHandle,
        /// Outcome
        status: Status,
    },
    /// Link role changed
    RoleChanged {
        /// Peer address
        peer: BluetoothAddress,
        /// New role
        new_role: LinkRole,
        /// HCI status
        hci_status: u8,
    },
    /// Peer content protection request
    ProtectReq {
        /// Stream
        handle: AvHandle,
        /// Payload
        data: SecurityData,
    },
    /// Peer content protection response
    ProtectRsp {
        /// Stream
        handle: AvHandle,
        /// AVDTP error
        err: u8,
        /// Payload
        data: SecurityData,
    },
    /// Pass-through command from the peer
    RemoteCmd {
        /// RC handle
        rc_handle: u8,
        /// Transaction label
        label: u8,
        /// Operation id
        op_id: u8,
        /// Key pressed
        pressed: bool,
    },
    /// Pass-through response from the peer
    RemoteRsp {
        /// RC handle
        rc_handle: u8,
        /// Transaction label
        label: u8,
        /// Operation id
        op_id: u8,
        /// Key pressed
        pressed: bool,
        /// Response code
        rsp_code: u8,
    },
    /// Vendor command from the peer
    VendorCmd {
        /// RC handle
        rc_handle: u8,
        /// Transaction label
        label: u8,
        /// Command type
        code: u8,
        /// Company id
        company_id: u32,
        /// Operand
        data: RcData,
    },
    /// Vendor response from the peer
    VendorRsp {
        /// RC handle
        rc_handle: u8,
        /// Transaction label
        label: u8,
        /// Response code
        code: u8,
        /// Company id
        company_id: u32,
        /// Operand
        data: RcData,
    },
    /// Metadata message for the application
    MetaMsg {
        /// RC handle
        rc_handle: u8,
        /// Transaction label
        label: u8,
        /// Command type or response code
        code: u8,
        /// Company id
        company_id: u32,
        /// Operand
        data: RcData,
    },
    /// AVRCP connection opened, or failed to
    RcOpened {
        /// RC handle
        rc_handle: u8,
        /// Peer address
        peer: BluetoothAddress,
        /// Peer features
        peer_features: Features,
        /// Outcome
        status: Status,
        /// Peer feature discovery already ran
        sdp_disc_done: bool,
    },
    /// AVRCP connection closed
    RcClosed {
        /// RC handle
        rc_handle: u8,
        /// Peer address
        peer: BluetoothAddress,
    },
    /// Peer features discovered
    RcFeatures {
        /// RC handle
        rc_handle: u8,
        /// Peer address
        peer: BluetoothAddress,
        /// Peer features
        peer_features: Features,
    },
    /// Peer configuration rejected
    Rejected {
        /// Stream
        handle: AvHandle,
        /// Peer address
        peer: BluetoothAddress,
    },
    /// Signalling is up but no stream followed yet
    Pending {
        /// Peer address
        peer: BluetoothAddress,
    },
    /// Peer delay report
    SinkDelayReport {
        /// Stream
        handle: AvHandle,
        /// Delay in 1/10 ms
        delay: u16,
    },
    /// Local delay value applied
    DelayValueSet {
        /// Stream
        handle: AvHandle,
        /// Outcome
        status: Status,
        /// Delay in 1/10 ms
        delay: u16,
    },
}
