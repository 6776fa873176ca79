//! `avctl` Constants
//!
//! Capacity limits, timer defaults and the protocol numbers the stream-control core needs to
//! interpret transport, SDP and AVRCP results. Wire encodings stay in the collaborators; only the
//! values that drive decisions here are listed.

/// Maximum number of registered streams (SCB slots)
pub const MAX_STREAMS: usize = 4;

/// Maximum number of simultaneous ACL links carrying AV traffic
pub const MAX_LINKS: usize = 2;

/// Maximum number of AVRCP connections (one per stream, the listening acceptor and one spare)
pub const MAX_RCBS: usize = MAX_STREAMS + 2;

/// Link index used for an RC-only connection that is not bound to any stream
pub const RC_ONLY_LINK_INDEX: u8 = MAX_LINKS as u8 + 1;

/// Maximum number of local stream endpoints per registration
pub const MAX_LOCAL_SEPS: usize = 2;

/// Maximum number of peer stream endpoints kept from one discovery
pub const MAX_DISC_SEPS: usize = 6;

/// Hard upper bound of the per-stream outbound media queue
pub const MAX_MEDIA_QUEUE: usize = 8;

/// Default depth of the per-stream outbound media queue
pub const DEFAULT_MEDIA_QUEUE_DEPTH: usize = 5;

/// Number of frames kept when a frame has to be put back at the head of the queue
pub const MEDIA_REQUEUE_LIMIT: usize = 3;

/// Default number of buffers the transport may hold before new frames are held back
pub const DEFAULT_TRANSPORT_QUEUE_LIMIT: u8 = 5;

/// Depth of the serial event queue
pub const EVENT_QUEUE_DEPTH: usize = 16;

/// Maximum codec information element length (length byte included)
pub const CODEC_INFO_LEN: usize = 10;

/// Maximum content protection information length
pub const PROTECT_INFO_LEN: usize = 10;

/// Maximum security/content-protection payload carried in one event
pub const MAX_SECURITY_DATA: usize = 32;

/// Maximum AVRCP operand payload carried in one event
pub const MAX_RC_DATA: usize = 64;

/// Maximum number of SDP records reported by one AVRC service discovery
pub const MAX_RC_SDP_RECORDS: usize = 4;

/// Invalid RC handle marker
pub const RC_HANDLE_NONE: u8 = 0xFF;

/// Default RC discovery delay in milliseconds
pub const DEFAULT_RC_DISC_TIME_MS: u32 = 3500;

/// Default close request watchdog in milliseconds
pub const DEFAULT_CLOSE_REQ_TIME_MS: u32 = 4000;

/// Default signalling "pending" timer in milliseconds
pub const DEFAULT_SIG_TIME_MS: u32 = 8000;

/// Default acceptor signalling timer in milliseconds
pub const DEFAULT_ACP_SIG_TIME_MS: u32 = 2000;

/// Default role switch retry delay in milliseconds
pub const DEFAULT_RS_TIME_MS: u32 = 1000;

/// Default bound on reconfiguration retries
pub const DEFAULT_RECONFIG_RETRY: u8 = 6;

/// Audio flush timeouts indexed by the number of concurrently started audio streams
pub const DEFAULT_AUDIO_FLUSH_TIMEOUTS: [u16; MAX_STREAMS] = [120, 100, 80, 60];

/// Default flush timeout for a single link (infinite)
pub const DEFAULT_FLUSH_TIMEOUT: u16 = 0xFFFF;

/// Default AVRCP MTU
pub const DEFAULT_AVRC_MTU: u16 = 672;

/// Bluetooth SIG company identifier advertised in AVRCP capability responses
pub const DEFAULT_COMPANY_ID: u32 = 0x00_19_58;

/// Service class UUIDs the core looks up or advertises.
pub mod uuid {
    /// Audio source
    pub const AUDIO_SOURCE: u16 = 0x110A;
    /// Audio sink
    pub const AUDIO_SINK: u16 = 0x110B;
    /// AV remote control target
    pub const AV_REM_CTRL_TARGET: u16 = 0x110C;
    /// AV remote control (controller)
    pub const AV_REMOTE_CONTROL: u16 = 0x110E;
    /// AV remote control controller
    pub const AV_REM_CTRL_CONTROL: u16 = 0x110F;
    /// Video source
    pub const VIDEO_SOURCE: u16 = 0x1303;
    /// Video sink
    pub const VIDEO_SINK: u16 = 0x1304;
}

/// AVDTP error codes carried in control callbacks.
pub mod avdt_err {
    /// Success
    pub const NONE: u8 = 0x00;
    /// Command not supported
    pub const NSC: u8 = 0x19;
    /// Unsupported configuration
    pub const UNSUP_CFG: u8 = 0x29;
    /// Bad state
    pub const BAD_STATE: u8 = 0x31;
    /// Signalling connection failed
    pub const CONNECT: u8 = 0x81;
    /// Response timeout
    pub const TIMEOUT: u8 = 0x82;
}

/// AVDTP version with delay reporting
pub const AVDT_VERSION_SYNC: u16 = 0x0103;

/// Media transport service category bit
pub const AVDT_PSC_TRANS: u8 = 0x01;

/// Delay reporting service category bit
pub const AVDT_PSC_DELAY_RPT: u8 = 0x08;

/// RTP media header length subtracted from the peer MTU
pub const AVDT_MEDIA_HDR_SIZE: u16 = 12;

/// RTP payload type base for media packets
pub const AVDT_MEDIA_PT_BASE: u8 = 0x60;

/// HCI status for "unknown connection"; a role switch on a vanished link counts as done
pub const HCI_ERR_NO_CONNECTION: u8 = 0x02;

/// AVRCP 1.3
pub const AVRC_REV_1_3: u16 = 0x0103;
/// AVRCP 1.4
pub const AVRC_REV_1_4: u16 = 0x0104;

/// AVRCP controller browsing supported-feature bit
pub const AVRC_SUPF_CT_BROWSE: u16 = 0x0040;
