//! Stream control block
//!
//! One [`Scb`] per registered stream. Slots live in a fixed array inside the engine and are reused
//! across connect/disconnect cycles; a slot is only reset when its stream is deregistered.

use crate::codec::{CodecInfo, MediaType, StreamConfig, Tsep};
use crate::constants::{MAX_DISC_SEPS, MAX_LOCAL_SEPS, MAX_MEDIA_QUEUE, RC_HANDLE_NONE};
use crate::event::{OpenRequest, SepInfo};
use crate::ssm::StreamState;
use crate::{AvChannel, AvHandle, BluetoothAddress, Status};
use heapless::{Deque, Vec};

/// Local stream endpoint created at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LocalSep {
    /// Transport handle of the endpoint
    pub avdt_handle: u8,
    /// Endpoint role
    pub tsep: Tsep,
    /// Codec type byte
    pub codec_type: u8,
    /// Media type
    pub media: MediaType,
}

/// Operations waiting on something else to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaitFlags(pub u8);

impl WaitFlags {
    /// Acceptor is collecting peer capabilities
    pub const ACP_CAPS_ON: u8 = 0x01;
    /// A start arrived while capabilities were collected
    pub const ACP_CAPS_STARTED: u8 = 0x02;
    /// An open waits for a role switch result
    pub const ROLE_SW_RES_OPEN: u8 = 0x04;
    /// A start waits for a role switch result
    pub const ROLE_SW_RES_START: u8 = 0x08;
    /// Streaming was confirmed while a switch was pending
    pub const ROLE_SW_STARTED: u8 = 0x10;
    /// The switch is being retried
    pub const ROLE_SW_RETRY: u8 = 0x20;
    /// AVRC discovery is deferred until the running one finishes
    pub const CHECK_RC: u8 = 0x40;
    /// The awaited switch failed
    pub const ROLE_SW_FAILED: u8 = 0x80;
    /// All role switch bookkeeping bits
    pub const ROLE_SW_BITS: u8 = Self::ROLE_SW_RES_OPEN
        | Self::ROLE_SW_RES_START
        | Self::ROLE_SW_STARTED
        | Self::ROLE_SW_RETRY;

    /// Any bit of `mask` set
    #[must_use]
    pub const fn has(self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    /// Set the bits of `mask`
    pub fn insert(&mut self, mask: u8) {
        self.0 |= mask;
    }

    /// Clear the bits of `mask`
    pub fn remove(&mut self, mask: u8) {
        self.0 &= !mask;
    }

    /// Nothing pending
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Which side initiated the stream and its start/suspend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RoleFlags(pub u8);

impl RoleFlags {
    /// Local side initiated the stream
    pub const INT: u8 = 0x00;
    /// Peer initiated the stream
    pub const ACP: u8 = 0x01;
    /// Local side initiated the start
    pub const START_INT: u8 = 0x10;
    /// Stream is suspended by the local side
    pub const SUSPEND: u8 = 0x20;
    /// Suspend right after a peer-initiated start
    pub const SUSPEND_OPT: u8 = 0x40;

    /// Any bit of `mask` set
    #[must_use]
    pub const fn has(self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    /// Set the bits of `mask`
    pub fn insert(&mut self, mask: u8) {
        self.0 |= mask;
    }

    /// Clear the bits of `mask`
    pub fn remove(&mut self, mask: u8) {
        self.0 &= !mask;
    }
}

/// Incoming-connection collision state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CollisionMask(pub u8);

impl CollisionMask {
    /// The acceptor signalling timer runs
    pub const INC_TMR: u8 = 0x01;
    /// The application asked to open while the timer ran
    pub const API_CALLED: u8 = 0x02;

    /// Any bit of `mask` set
    #[must_use]
    pub const fn has(self, mask: u8) -> bool {
        self.0 & mask != 0
    }
}

/// Operation queued behind a role switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueTag {
    /// Nothing queued
    #[default]
    None,
    /// An open
    Open,
    /// A start
    Start,
    /// Streaming
    Stream,
}

/// Bounded FIFO of outbound media frames.
///
/// Pushing onto a full queue evicts the oldest frame and hands it back so the caller can tell the
/// codec.
#[derive(Debug)]
pub struct MediaQueue<F> {
    frames: Deque<(F, u32), MAX_MEDIA_QUEUE>,
    depth: usize,
}

impl<F> MediaQueue<F> {
    /// Empty queue holding at most `depth` frames (clamped to [`MAX_MEDIA_QUEUE`])
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            frames: Deque::new(),
            depth: depth.clamp(1, MAX_MEDIA_QUEUE),
        }
    }

    /// Configured depth
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Change the depth; excess frames are dropped from the front
    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth.clamp(1, MAX_MEDIA_QUEUE);
        while self.frames.len() > self.depth {
            self.frames.pop_front();
        }
    }

    /// Append a frame, returning the evicted oldest frame when the queue was full
    pub fn push(&mut self, frame: F, timestamp: u32) -> Option<(F, u32)> {
        let evicted = if self.frames.len() >= self.depth {
            self.frames.pop_front()
        } else {
            None
        };
        if let Err(rejected) = self.frames.push_back((frame, timestamp)) {
            return Some(rejected);
        }
        evicted
    }

    /// Put a frame back at the head.
    ///
    /// # Errors
    /// Hands the frame back when the queue is full.
    pub fn push_front(&mut self, frame: F, timestamp: u32) -> Result<(), (F, u32)> {
        if self.frames.len() >= self.depth {
            return Err((frame, timestamp));
        }
        self.frames.push_front((frame, timestamp))
    }

    /// Take the oldest frame
    pub fn pop(&mut self) -> Option<(F, u32)> {
        self.frames.pop_front()
    }

    /// Number of queued frames
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// No frames queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop every frame
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Stream control block
#[derive(Debug)]
pub struct Scb<F> {
    /// Slot in use
    pub registered: bool,
    /// Slot index
    pub hdi: usize,
    /// Handle handed to the application
    pub handle: AvHandle,
    /// Channel
    pub channel: AvChannel,
    /// Media type of the channel
    pub media: MediaType,
    /// Application id from registration
    pub app_id: u8,
    /// Stream state
    pub state: StreamState,
    /// Peer address, `NONE` while unconnected
    pub peer: BluetoothAddress,
    /// Local endpoints
    pub seps: Vec<LocalSep, MAX_LOCAL_SEPS>,
    /// Local endpoint in use
    pub sep_idx: usize,
    /// Transport handle in use
    pub avdt_handle: u8,
    /// Peer endpoints from the last discovery
    pub sep_info: Vec<SepInfo, MAX_DISC_SEPS>,
    /// Peer endpoint being probed or in use
    pub sep_info_idx: usize,
    /// Number of peer endpoints to probe
    pub num_seps: u8,
    /// Matching peer sinks found by discovery
    pub num_disc_snks: u8,
    /// Peer endpoint a reconfiguration targets
    pub rcfg_idx: usize,
    /// Local service class of the open
    pub uuid_int: u16,
    /// Codec type in use
    pub codec_type: u8,
    /// Configuration in use
    pub cfg: StreamConfig,
    /// Capability buffer, held while negotiating or reconfiguring
    pub cap: Option<StreamConfig>,
    /// Discovery database lease
    pub disc_db: bool,
    /// Open request, kept while it waits
    pub open_api: OpenRequest,
    /// Operation queued behind a role switch
    pub q_tag: QueueTag,
    /// Pending work
    pub wait: WaitFlags,
    /// Initiator/acceptor bits
    pub role: RoleFlags,
    /// Incoming collision state
    pub coll_mask: CollisionMask,
    /// Failure to report once the stream is torn down
    pub open_status: Status,
    /// Security mask
    pub sec_mask: u8,
    /// Bring up AVRCP with the stream
    pub use_rc: bool,
    /// AVRCP connection bound to the stream
    pub rc_handle: u8,
    /// Streaming confirmed
    pub started: bool,
    /// Codec started; number of concurrently started audio streams for flush tuning
    pub co_started: u8,
    /// Media sending blocked
    pub cong: bool,
    /// Peer accepts suspend
    pub suspend_sup: bool,
    /// Peer accepts reconfigure
    pub recfg_sup: bool,
    /// Deregistration in progress
    pub deregistering: bool,
    /// Stopped to make room for SCO
    pub sco_suspend: bool,
    /// Frames carry no RTP header
    pub no_rtp: bool,
    /// Reconfiguration attempts
    pub num_recfg: u8,
    /// Media MTU
    pub stream_mtu: u16,
    /// Peer AVDTP version
    pub avdt_version: u16,
    /// Label of the configuration or security indication to answer
    pub avdt_label: u8,
    /// Service categories in use
    pub cur_psc: u8,
    /// Disconnect reason
    pub disc_rsn: u8,
    /// Outbound media frames
    pub media_queue: MediaQueue<F>,
}

impl<F> Scb<F> {
    /// An empty slot
    #[must_use]
    pub fn new(hdi: usize, media_queue_depth: usize) -> Self {
        Self {
            registered: false,
            hdi,
            handle: AvHandle::new(hdi, AvChannel::Audio),
            channel: AvChannel::Audio,
            media: MediaType::Audio,
            app_id: 0,
            state: StreamState::Init,
            peer: BluetoothAddress::NONE,
            seps: Vec::new(),
            sep_idx: 0,
            avdt_handle: 0,
            sep_info: Vec::new(),
            sep_info_idx: 0,
            num_seps: 0,
            num_disc_snks: 0,
            rcfg_idx: 0,
            uuid_int: 0,
            codec_type: 0,
            cfg: StreamConfig::default(),
            cap: None,
            disc_db: false,
            open_api: OpenRequest::default(),
            q_tag: QueueTag::None,
            wait: WaitFlags::default(),
            role: RoleFlags::default(),
            coll_mask: CollisionMask::default(),
            open_status: Status::Success,
            sec_mask: 0,
            use_rc: false,
            rc_handle: RC_HANDLE_NONE,
            started: false,
            co_started: 0,
            cong: false,
            suspend_sup: true,
            recfg_sup: true,
            deregistering: false,
            sco_suspend: false,
            no_rtp: false,
            num_recfg: 0,
            stream_mtu: 0,
            avdt_version: 0,
            avdt_label: 0,
            cur_psc: 0,
            disc_rsn: 0,
            media_queue: MediaQueue::new(media_queue_depth),
        }
    }

    /// Reset the slot to its unregistered state
    pub fn reset(&mut self) {
        let depth = self.media_queue.depth();
        *self = Self::new(self.hdi, depth);
    }

    /// Local endpoint in use
    #[must_use]
    pub fn local_sep(&self) -> Option<&LocalSep> {
        self.seps.get(self.sep_idx)
    }

    /// Role of the local endpoint in use
    #[must_use]
    pub fn local_tsep(&self) -> Tsep {
        self.local_sep().map_or(Tsep::Source, |s| s.tsep)
    }

    /// Remember the peer; a new peer gets the benefit of the doubt for suspend and reconfigure
    pub fn save_addr(&mut self, peer: BluetoothAddress) {
        if self.peer != peer {
            self.recfg_sup = true;
            self.suspend_sup = true;
        }
        self.peer = peer;
    }

    /// Point `sep_idx` at the local endpoint with transport handle `avdt_handle`
    pub fn adjust_seps_idx(&mut self, avdt_handle: u8) {
        if avdt_handle == 0 {
            return;
        }
        if let Some(idx) = self.seps.iter().position(|s| s.avdt_handle == avdt_handle) {
            self.sep_idx = idx;
            self.avdt_handle = avdt_handle;
        }
    }

    /// Transport handle of the local endpoint with role `tsep` and the current codec
    #[must_use]
    pub fn find_sep_handle(&self, tsep: Tsep) -> u8 {
        self.seps
            .iter()
            .find(|s| s.tsep == tsep && s.codec_type == self.codec_type)
            .map_or(0, |s| s.avdt_handle)
    }

    /// Codec information in use
    #[must_use]
    pub const fn codec_info(&self) -> &CodecInfo {
        &self.cfg.codec_info
    }
}
