#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(clippy::too_many_lines, clippy::struct_excessive_bools)]

#[macro_use]
mod fmt;

mod address;
pub mod ar;
pub mod api;
pub mod avrc;
pub mod codec;
pub mod constants;
pub mod engine;
pub mod event;
pub mod platform;
pub mod processor;
pub mod scb;
pub mod ssm;

#[cfg(test)]
mod testing;

use crate::constants::{
    DEFAULT_ACP_SIG_TIME_MS, DEFAULT_AUDIO_FLUSH_TIMEOUTS, DEFAULT_AVRC_MTU,
    DEFAULT_CLOSE_REQ_TIME_MS, DEFAULT_COMPANY_ID, DEFAULT_FLUSH_TIMEOUT,
    DEFAULT_MEDIA_QUEUE_DEPTH, DEFAULT_RC_DISC_TIME_MS, DEFAULT_RECONFIG_RETRY, DEFAULT_RS_TIME_MS,
    DEFAULT_SIG_TIME_MS, DEFAULT_TRANSPORT_QUEUE_LIMIT, MAX_MEDIA_QUEUE, MAX_STREAMS,
};

pub use address::BluetoothAddress;
pub use api::AvClient;
pub use engine::{AvEngine, EventQueue};
pub use event::{AvEvent, Event, MainEvent, StreamEvent, SystemEvent};
pub use platform::Platform;

/// Errors returned synchronously by the engine and its collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AvError {
    /// The serial event queue is full
    QueueFull,
    /// No free stream, link or remote-control slot
    NoResources,
    /// The handle does not name a registered stream or connection
    InvalidHandle,
    /// Invalid parameter provided (e.g., malformed address)
    InvalidParameter,
    /// The engine has not been enabled
    NotEnabled,
    /// The transport rejected a request with the given AVDTP error code
    Transport(u8),
    /// Service discovery could not be started
    Discovery,
    /// The remote-control transport rejected a request
    RemoteControl,
}

/// Protocol outcome reported to the application with each upcall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    /// Operation completed
    #[default]
    Success = 0,
    /// Generic failure
    Fail = 2,
    /// Service discovery failed
    FailSdp = 3,
    /// Stream connection failed
    FailStream = 4,
    /// No resources
    FailResources = 5,
    /// Failed because of a link role switch
    FailRole = 6,
    /// No discovered endpoint had a matching capability
    FailGetCap = 7,
}

impl Status {
    /// True for anything but [`Status::Success`]
    #[must_use]
    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::Success)
    }
}

/// Feature mask passed to `Enable`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Features(pub u16);

impl Features {
    /// Remote control target
    pub const RCTG: u16 = 0x0001;
    /// Remote control controller
    pub const RCCT: u16 = 0x0002;
    /// Content protection
    pub const PROTECT: u16 = 0x0004;
    /// Vendor dependent commands
    pub const VENDOR: u16 = 0x0008;
    /// Browsing
    pub const BROWSE: u16 = 0x0010;
    /// Use reporting service for VDP
    pub const REPORT: u16 = 0x0020;
    /// Metadata transfer
    pub const METADATA: u16 = 0x0040;
    /// More than one AV connection at a time
    pub const MULTI_AV: u16 = 0x0080;
    /// Stay master on every AV link
    pub const MASTER: u16 = 0x0100;
    /// Advanced control
    pub const ADV_CTRL: u16 = 0x0200;
    /// Delay reporting
    pub const DELAY_RPT: u16 = 0x0400;
    /// Accept a peer-initiated start while suspended
    pub const ACP_START: u16 = 0x0800;

    /// Check whether every bit in `mask` is set
    #[must_use]
    pub const fn has(self, mask: u16) -> bool {
        self.0 & mask == mask
    }

    /// Check whether any bit in `mask` is set
    #[must_use]
    pub const fn any(self, mask: u16) -> bool {
        self.0 & mask != 0
    }
}

/// Channel a stream is registered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AvChannel {
    /// A2DP audio
    #[default]
    Audio,
    /// VDP video
    Video,
}

impl AvChannel {
    /// Channel bits carried in an [`AvHandle`]
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Audio => 0x40,
            Self::Video => 0x80,
        }
    }
}

/// Stream handle handed to the application: `(slot + 1) | channel bits`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AvHandle(pub u8);

impl AvHandle {
    /// Low bits holding the slot number
    pub const INDEX_MASK: u8 = 0x0F;

    /// Build the handle for slot `hdi` on `channel`
    #[must_use]
    pub const fn new(hdi: usize, channel: AvChannel) -> Self {
        Self(((hdi as u8) + 1) | channel.bits())
    }

    /// Slot index, or `None` when the handle does not name a slot
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        let low = (self.0 & Self::INDEX_MASK) as usize;
        if low == 0 || low > MAX_STREAMS {
            None
        } else {
            Some(low - 1)
        }
    }

    /// Per-slot bit used in the connection masks
    #[must_use]
    pub const fn mask(self) -> u8 {
        match self.index() {
            Some(i) => 1 << i,
            None => 0,
        }
    }

    /// Channel encoded in the handle
    #[must_use]
    pub const fn channel(self) -> AvChannel {
        if self.0 & 0x80 != 0 {
            AvChannel::Video
        } else {
            AvChannel::Audio
        }
    }
}

/// Baseband link role towards a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkRole {
    /// Local side is master (central)
    Master,
    /// Local side is slave (peripheral)
    Slave,
}

/// HCI link policy bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkPolicy(pub u8);

impl LinkPolicy {
    /// Master/slave switch allowed
    pub const ROLE_SWITCH: u8 = 0x01;
    /// Hold mode allowed
    pub const HOLD: u8 = 0x02;
    /// Sniff mode allowed
    pub const SNIFF: u8 = 0x04;
    /// Park mode allowed
    pub const PARK: u8 = 0x08;

    /// Add the bits in `mask`
    #[must_use]
    pub const fn with(self, mask: u8) -> Self {
        Self(self.0 | mask)
    }

    /// Check whether any bit in `mask` is set
    #[must_use]
    pub const fn contains(self, mask: u8) -> bool {
        self.0 & mask != 0
    }
}

/// Options for configuring an [`AvEngine`]
///
/// ```rust
/// use avctl::AvOptions;
///
/// let options = AvOptions {
///     media_queue_depth: 3,
///     reconfig_retry: 2,
///     ..AvOptions::default()
/// };
/// assert_eq!(options.effective_media_queue_depth(), 3);
/// ```
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AvOptions {
    /// Depth of the per-stream outbound media queue, clamped to [`constants::MAX_MEDIA_QUEUE`]
    pub media_queue_depth: usize,
    /// Number of buffers the transport may hold before frames are held back
    pub transport_queue_limit: u8,
    /// Delay before AVRCP discovery after a stream opens
    pub rc_disc_time_ms: u32,
    /// Watchdog for an outstanding close request
    pub close_req_time_ms: u32,
    /// Interval of the "pending" notification for half-open signalling links
    pub sig_time_ms: u32,
    /// How long to wait for a peer that opened signalling to configure a stream
    pub acp_sig_time_ms: u32,
    /// Retry delay when a role switch could not be started
    pub rs_time_ms: u32,
    /// Audio flush timeout indexed by concurrently started audio streams minus one
    pub audio_flush_timeouts: [u16; MAX_STREAMS],
    /// Video flush timeout
    pub video_flush_timeout: u16,
    /// Reconfiguration attempts before the stream is closed
    pub reconfig_retry: u8,
    /// Categories advertised in the AVRCP target record
    pub avrc_tg_categories: u16,
    /// Categories advertised in the AVRCP controller record
    pub avrc_ct_categories: u16,
    /// Company id reported to `GetCapabilities(COMPANY_ID)`
    pub company_id: u32,
    /// AVRCP control channel MTU
    pub avrc_mtu: u16,
    /// Accept group navigation pass-through commands
    pub avrc_group: bool,
}

impl AvOptions {
    /// Media queue depth after clamping to the hard maximum
    #[must_use]
    pub const fn effective_media_queue_depth(&self) -> usize {
        if self.media_queue_depth > MAX_MEDIA_QUEUE {
            MAX_MEDIA_QUEUE
        } else if self.media_queue_depth == 0 {
            1
        } else {
            self.media_queue_depth
        }
    }

    /// Flush timeout for `started` concurrently started audio streams
    #[must_use]
    pub fn audio_flush_timeout(&self, started: usize) -> u16 {
        let idx = started.clamp(1, MAX_STREAMS) - 1;
        self.audio_flush_timeouts[idx]
    }
}

impl Default for AvOptions {
    fn default() -> Self {
        Self {
            media_queue_depth: DEFAULT_MEDIA_QUEUE_DEPTH,
            transport_queue_limit: DEFAULT_TRANSPORT_QUEUE_LIMIT,
            rc_disc_time_ms: DEFAULT_RC_DISC_TIME_MS,
            close_req_time_ms: DEFAULT_CLOSE_REQ_TIME_MS,
            sig_time_ms: DEFAULT_SIG_TIME_MS,
            acp_sig_time_ms: DEFAULT_ACP_SIG_TIME_MS,
            rs_time_ms: DEFAULT_RS_TIME_MS,
            audio_flush_timeouts: DEFAULT_AUDIO_FLUSH_TIMEOUTS,
            video_flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            reconfig_retry: DEFAULT_RECONFIG_RETRY,
            avrc_tg_categories: avrc::CATEGORY_PLAYER_RECORDER,
            avrc_ct_categories: avrc::CATEGORY_PLAYER_RECORDER | avrc::CATEGORY_MONITOR_AMP,
            company_id: DEFAULT_COMPANY_ID,
            avrc_mtu: DEFAULT_AVRC_MTU,
            avrc_group: true,
        }
    }
}
