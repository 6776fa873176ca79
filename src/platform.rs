//! Collaborator seams.
//!
//! The engine owns no radio, no L2CAP and no SDP database. Everything below it is reached through
//! these traits, and everything it learns comes back as queued [`Event`]s. Requests never block;
//! their outcome arrives later as a confirmation event.

use crate::avrc::{MetaResponse, RcData};
use crate::codec::{CodecInfo, StreamConfig, Tsep};
use crate::event::{AvEvent, Event, LocalSepConfig};
use crate::{AvError, AvHandle, BluetoothAddress, LinkPolicy, LinkRole};

/// Stream transport (AVDTP) requests
pub trait Transport {
    /// Register with the stream transport.
    ///
    /// # Errors
    /// Returns an error if the transport refuses the registration.
    fn register_avdt(&mut self, sec_mask: u8) -> Result<(), AvError>;
    /// Drop the stream transport registration
    fn deregister_avdt(&mut self);
    /// Create a local endpoint and return its transport handle.
    ///
    /// # Errors
    /// Returns an error when the transport has no room for another endpoint.
    fn create_stream(&mut self, handle: AvHandle, sep: &LocalSepConfig) -> Result<u8, AvError>;
    /// Remove a local endpoint
    fn remove_stream(&mut self, avdt_handle: u8);
    /// Open the signalling channel.
    ///
    /// # Errors
    /// Returns an error if the request cannot be issued.
    fn connect_req(&mut self, peer: BluetoothAddress, sec_mask: u8, handle: AvHandle)
    -> Result<(), AvError>;
    /// Close the signalling channel.
    ///
    /// # Errors
    /// Returns an error if the request cannot be issued.
    fn disconnect_req(&mut self, peer: BluetoothAddress) -> Result<(), AvError>;
    /// Discover the peer's endpoints.
    ///
    /// # Errors
    /// Returns an error if the request cannot be issued.
    fn discover_req(&mut self, peer: BluetoothAddress, handle: AvHandle) -> Result<(), AvError>;
    /// Query one peer endpoint's capabilities (all capabilities when `all` is set).
    ///
    /// # Errors
    /// Returns an error if the request cannot be issued.
    fn get_caps_req(
        &mut self,
        peer: BluetoothAddress,
        seid: u8,
        all: bool,
        handle: AvHandle,
    ) -> Result<(), AvError>;
    /// Configure and open a stream.
    ///
    /// # Errors
    /// Returns an error if the request cannot be issued.
    fn open_req(
        &mut self,
        avdt_handle: u8,
        peer: BluetoothAddress,
        seid: u8,
        cfg: &StreamConfig,
    ) -> Result<(), AvError>;
    /// Answer a configuration indication
    fn config_rsp(&mut self, avdt_handle: u8, label: u8, err: u8, category: u8);
    /// Start the stream.
    ///
    /// # Errors
    /// Returns an error if the request cannot be issued.
    fn start_req(&mut self, avdt_handle: u8) -> Result<(), AvError>;
    /// Suspend the stream.
    ///
    /// # Errors
    /// Returns an error if the request cannot be issued.
    fn suspend_req(&mut self, avdt_handle: u8) -> Result<(), AvError>;
    /// Close the stream.
    ///
    /// # Errors
    /// Returns an error if the request cannot be issued.
    fn close_req(&mut self, avdt_handle: u8) -> Result<(), AvError>;
    /// Reconfigure an open, suspended stream.
    ///
    /// # Errors
    /// Returns an error if the request cannot be issued.
    fn reconfig_req(&mut self, avdt_handle: u8, cfg: &StreamConfig) -> Result<(), AvError>;
    /// Send a content protection request.
    ///
    /// # Errors
    /// Returns an error if the request cannot be issued.
    fn security_req(&mut self, avdt_handle: u8, data: &[u8]) -> Result<(), AvError>;
    /// Answer a content protection request
    fn security_rsp(&mut self, avdt_handle: u8, label: u8, err: u8, data: &[u8]);
    /// Send a delay report.
    ///
    /// # Errors
    /// Returns an error if the request cannot be issued.
    fn delay_report(&mut self, avdt_handle: u8, seid: u8, delay: u16) -> Result<(), AvError>;
    /// Store the local delay value reported on the next configuration
    fn set_delay_value(&mut self, delay: u16);
}

/// Outbound media path of a source stream
pub trait MediaPath {
    /// Opaque media frame
    type Frame: Clone;
    /// Pull the next encoded frame from the codec together with its timestamp
    fn next_frame(&mut self, codec_type: u8) -> Option<(Self::Frame, u32)>;
    /// Hand a frame to the transport
    fn write_media(&mut self, avdt_handle: u8, frame: Self::Frame, timestamp: u32, m_pt: u8, no_rtp: bool);
    /// Number of buffers the transport still holds for `avdt_handle`
    fn queued_buffers(&mut self, avdt_handle: u8) -> u8;
    /// Discard whatever the transport holds for `avdt_handle`
    fn flush_media(&mut self, avdt_handle: u8);
}

/// ACL link control
pub trait LinkControl {
    /// Current local role on the link to `peer`, `None` when there is no link
    fn link_role(&mut self, peer: BluetoothAddress) -> Option<LinkRole>;
    /// Request a role switch.
    ///
    /// # Errors
    /// Returns an error if the switch could not be started.
    fn switch_role(&mut self, peer: BluetoothAddress, role: LinkRole) -> Result<(), AvError>;
    /// Set (`enable`) or clear link policy bits on one link
    fn set_link_policy(&mut self, peer: BluetoothAddress, policy: LinkPolicy, enable: bool);
    /// Set or clear default link policy bits for new links
    fn set_default_policy(&mut self, policy: LinkPolicy, enable: bool);
    /// Allow or disallow role switches requested by the local L2CAP
    fn set_desired_role_allow(&mut self, allow: bool);
    /// Set the automatic flush timeout of the link
    fn set_flush_timeout(&mut self, peer: BluetoothAddress, timeout: u16);
    /// Raise or restore ACL priority
    fn set_acl_priority(&mut self, peer: BluetoothAddress, high: bool);
}

/// Service discovery
pub trait ServiceDiscovery {
    /// Look up the A2DP service `uuid` on `peer`; the result arrives as
    /// [`SystemEvent::A2dpSdpResult`](crate::event::SystemEvent::A2dpSdpResult).
    ///
    /// # Errors
    /// Returns an error if the lookup could not be started.
    fn find_a2dp(&mut self, uuid: u16, peer: BluetoothAddress) -> Result<(), AvError>;
    /// Look up the AVRC records on `peer`; the result arrives as
    /// [`SystemEvent::AvrcSdpDone`](crate::event::SystemEvent::AvrcSdpDone).
    ///
    /// # Errors
    /// Returns an error if the lookup could not be started.
    fn find_avrc(&mut self, peer: BluetoothAddress) -> Result<(), AvError>;
    /// Add an AVRC record and return its record handle.
    ///
    /// # Errors
    /// Returns an error if the record could not be created.
    fn add_avrc_record(&mut self, uuid: u16, categories: u16) -> Result<u32, AvError>;
    /// Rewrite the supported categories of a record
    fn update_avrc_categories(&mut self, record: u32, categories: u16);
    /// Delete a record
    fn delete_record(&mut self, record: u32);
}

/// Remote-control transport (AVCTP/AVRCP)
pub trait RemoteControl {
    /// Register with the remote-control transport
    fn register_avct(&mut self, mtu: u16, sec_mask: u8);
    /// Drop the remote-control transport registration
    fn deregister_avct(&mut self);
    /// Create an initiating (`acceptor == false`) or listening connection and return its handle.
    ///
    /// # Errors
    /// Returns an error if no connection can be created.
    fn rc_open(&mut self, acceptor: bool, peer: BluetoothAddress, control: u16) -> Result<u8, AvError>;
    /// Close a connection
    fn rc_close(&mut self, rc_handle: u8);
    /// Send a pass-through command
    fn rc_pass_cmd(&mut self, rc_handle: u8, label: u8, op_id: u8, pressed: bool);
    /// Send a pass-through response
    fn rc_pass_rsp(&mut self, rc_handle: u8, label: u8, ctype: u8, op_id: u8, pressed: bool);
    /// Send a vendor-dependent command
    fn rc_vendor_cmd(&mut self, rc_handle: u8, label: u8, ctype: u8, data: &RcData);
    /// Send a vendor-dependent response
    fn rc_vendor_rsp(&mut self, rc_handle: u8, label: u8, ctype: u8, company_id: u32, data: &RcData);
    /// Send a metadata message
    fn rc_msg_req(&mut self, rc_handle: u8, label: u8, ctype: u8, msg: &MetaResponse);
    /// Whether the local target handles pass-through operation `op_id`
    fn rc_op_supported(&mut self, op_id: u8) -> bool;
    /// Notification event ids the local target supports
    fn rc_supported_events(&mut self) -> RcData;
}

/// Codec call-out
pub trait CodecCallout {
    /// Discovery found `num_seps` endpoints, `num_snks` sinks and `num_srcs` sources
    fn co_disc_res(&mut self, handle: AvHandle, num_seps: u8, num_snks: u8, num_srcs: u8, peer: BluetoothAddress, uuid: u16);
    /// Inspect peer capabilities `caps` of endpoint `seid`; fill `cfg` and return true to accept
    fn co_getcfg(&mut self, handle: AvHandle, seid: u8, caps: &StreamConfig, cfg: &mut StreamConfig) -> bool;
    /// The peer proposes `cfg`; answer later with a setconfig ok/fail stream event
    fn co_setcfg(
        &mut self,
        handle: AvHandle,
        codec_type: u8,
        cfg: &StreamConfig,
        seid: u8,
        peer: BluetoothAddress,
        local_tsep: Tsep,
        avdt_handle: u8,
    );
    /// The stream opened with `mtu`
    fn co_open(&mut self, handle: AvHandle, codec_type: u8, codec_info: &CodecInfo, mtu: u16);
    /// The stream closed
    fn co_close(&mut self, handle: AvHandle, codec_type: u8, mtu: u16);
    /// Streaming starts; return true when frames carry no RTP header
    fn co_start(&mut self, handle: AvHandle, codec_type: u8, codec_info: &CodecInfo) -> bool;
    /// Streaming stops
    fn co_stop(&mut self, handle: AvHandle, codec_type: u8);
    /// The peer reported its rendering delay
    fn co_delay(&mut self, handle: AvHandle, delay: u16);
    /// A queued frame was dropped
    fn co_dropped(&mut self, handle: AvHandle);
}

/// Slot a timer is armed in; starting a slot again re-arms it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerSlot {
    /// Per-stream watchdog
    Stream(usize),
    /// "Pending" signalling notification
    Signalling,
    /// Acceptor signalling wait
    AcpSignalling,
}

/// One-shot timers that post an event on expiry
pub trait TimerService {
    /// Arm `slot`; after `ms` milliseconds post `fire` to the event queue
    fn start_timer(&mut self, slot: TimerSlot, ms: u32, fire: Event);
    /// Disarm `slot`
    fn stop_timer(&mut self, slot: TimerSlot);
}

/// Application upcalls
pub trait AppCallback {
    /// Deliver an upcall
    fn on_event(&mut self, event: AvEvent);
}

/// Everything the engine needs from its environment
pub trait Platform:
    Transport + MediaPath + LinkControl + ServiceDiscovery + RemoteControl + CodecCallout + TimerService + AppCallback
{
}

impl<T> Platform for T where
    T: Transport
        + MediaPath
        + LinkControl
        + ServiceDiscovery
        + RemoteControl
        + CodecCallout
        + TimerService
        + AppCallback
{
}
