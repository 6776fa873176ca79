//! Stream control engine
//!
//! The engine owns every control block and processes one event at a time to completion.
//!
//! ## Architecture
//!
//! 1. **Stream state machines** - one per registered stream, driven by [`crate::ssm`]
//! 2. **Main state machine** - tracks whether any AVRCP connection exists and routes RC traffic
//! 3. **System handlers** - registration, signalling changes, role changes, SCO, timers
//! 4. **Collaborators** - everything below the engine is reached through [`Platform`]
//!
//! ## Event Flow
//!
//! 1. API calls, transport callbacks and timer expiries are posted to the [`EventQueue`]
//! 2. [`AvEngine::dispatch`] routes each event to a stream, the main machine or a system handler
//! 3. Handlers call collaborators and emit upcalls through [`AppCallback`](crate::platform::AppCallback)
//! 4. Internal follow-up events are posted back to the same queue
//!
//! ## Implementation Details
//!
//! - Control blocks live in fixed arrays; stream slots are reused until deregistration
//! - At most one role switch is outstanding (`rs_idx`)
//! - At most one A2DP and one AVRC service discovery run at a time

mod main_actions;
mod remote_control;
mod role_switch;
mod stream_actions;
mod streaming;

use crate::ar::Arbiter;
use crate::constants::{EVENT_QUEUE_DEPTH, MAX_LINKS, MAX_RCBS, MAX_STREAMS, RC_HANDLE_NONE};
use crate::event::{AvEvent, Event, MainEvent, MainEventKind, StreamEvent};
use crate::platform::{Platform, TimerSlot};
use crate::scb::Scb;
use crate::ssm::{self, Action, StreamState};
use crate::{AvChannel, AvHandle, AvOptions, BluetoothAddress, Features};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;

/// Serial event queue shared by the engine, the API handle and the collaborators
pub type EventQueue<M> = Channel<M, Event, EVENT_QUEUE_DEPTH>;

/// Main state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MainState {
    /// No AVRCP connection
    #[default]
    Init,
    /// At least one AVRCP connection
    Open,
}

/// Main state machine actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum MainAction {
    Disable,
    RcOpened,
    RemoteCmd,
    VendorCmd,
    VendorRsp,
    MetaRsp,
    RcClose,
    RcMsg,
    Discard,
}

fn main_lookup(state: MainState, event: MainEventKind) -> Option<(Option<MainAction>, MainState)> {
    use MainEventKind as E;
    let row = match state {
        MainState::Init => match event {
            E::Disable => (Some(MainAction::Disable), MainState::Init),
            E::MetaRsp | E::AvrcMsg => (Some(MainAction::Discard), MainState::Init),
            E::AvrcOpen => (Some(MainAction::RcOpened), MainState::Open),
            _ => return None,
        },
        MainState::Open => match event {
            E::Disable => (Some(MainAction::Disable), MainState::Init),
            E::RemoteCmd => (Some(MainAction::RemoteCmd), MainState::Open),
            E::VendorCmd => (Some(MainAction::VendorCmd), MainState::Open),
            E::VendorRsp => (Some(MainAction::VendorRsp), MainState::Open),
            E::MetaRsp => (Some(MainAction::MetaRsp), MainState::Open),
            E::RcClose => (Some(MainAction::RcClose), MainState::Open),
            E::AvrcOpen => (Some(MainAction::RcOpened), MainState::Open),
            E::AvrcMsg => (Some(MainAction::RcMsg), MainState::Open),
            E::AvrcNone => (None, MainState::Init),
            _ => return None,
        },
    };
    Some(row)
}

/// Link control block, one per ACL link carrying AV traffic plus one for RC-only links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Lcb {
    /// Peer address
    pub addr: BluetoothAddress,
    /// Link index (slot + 1), 0 when free
    pub lidx: u8,
    /// Streams multiplexed over the link, bit `hdi + 1`; bit 0 marks an RC-only link
    pub conn_msk: u8,
}

/// Remote-control control block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rcb {
    /// RC transport handle, [`RC_HANDLE_NONE`] when unused
    pub handle: u8,
    /// Role and connection bits
    pub status: u8,
    /// Stream the connection belongs to (`hdi + 1`), 0 for RC-only
    pub shdl: u8,
    /// Link index the connection runs over
    pub lidx: u8,
    /// Peer features
    pub peer_features: Features,
}

impl Rcb {
    /// Acceptor role bit
    pub const ROLE_ACP: u8 = 0x01;
    /// Connected bit
    pub const CONNECTED: u8 = 0x20;

    /// An unused block
    pub const EMPTY: Self = Self {
        handle: RC_HANDLE_NONE,
        status: 0,
        shdl: 0,
        lidx: 0,
        peer_features: Features(0),
    };

    /// Block in use
    #[must_use]
    pub const fn in_use(&self) -> bool {
        self.handle != RC_HANDLE_NONE
    }

    /// Connection established
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.status & Self::CONNECTED != 0
    }

    /// Created as a listening acceptor
    #[must_use]
    pub const fn is_acceptor(&self) -> bool {
        self.status & Self::ROLE_ACP != 0
    }
}

impl Default for Rcb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Subject of the running AVRC service discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RcDiscTarget {
    /// Discovery for a stream slot
    Stream(usize),
    /// Discovery for an RC-only connection
    RcOnly(u8),
}

/// Engine-wide bookkeeping
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlBlock {
    /// `Enable` was processed
    pub enabled: bool,
    /// Local features
    pub features: Features,
    /// Security mask
    pub sec_mask: u8,
    /// `Disable` is tearing things down
    pub disabling: bool,
    /// Registered audio streams, bit `hdi`
    pub reg_audio: u8,
    /// Registered video streams, bit `hdi`
    pub reg_video: u8,
    /// Connected audio streams, bit `hdi`
    pub conn_audio: u8,
    /// Connected video streams, bit `hdi`
    pub conn_video: u8,
    /// Number of connected audio streams
    pub audio_open_cnt: u8,
    /// Streaming audio streams, bit `hdi`
    pub audio_streams: u8,
    /// Streaming video streams, bit `hdi`
    pub video_streams: u8,
    /// Link slots in use, bit per slot
    pub conn_lcb: u8,
    /// Stream waiting for a role switch (`hdi + 1`), 0 for none
    pub rs_idx: u8,
    /// Stream running the A2DP service lookup
    pub a2dp_disc: Option<usize>,
    /// Subject of the running AVRC service lookup
    pub rc_disc: Option<RcDiscTarget>,
    /// Handle of the listening acceptor connection
    pub rc_acp_handle: u8,
    /// Block index of the listening acceptor (index + 1)
    pub rc_acp_idx: u8,
    /// SCO link up
    pub sco_occupied: bool,
}

/// The stream control engine.
///
/// Generic over the collaborator bundle `P` and the mutex flavour `M` of the event queue.
pub struct AvEngine<'q, P: Platform, M: RawMutex> {
    platform: P,
    queue: &'q EventQueue<M>,
    options: AvOptions,
    cb: ControlBlock,
    scbs: [Scb<P::Frame>; MAX_STREAMS],
    rcbs: [Rcb; MAX_RCBS],
    lcbs: [Lcb; MAX_LINKS + 1],
    ar: Arbiter,
    main_state: MainState,
}

impl<'q, P: Platform, M: RawMutex> AvEngine<'q, P, M> {
    /// Create an engine with default options
    #[must_use]
    pub fn new(platform: P, queue: &'q EventQueue<M>) -> Self {
        Self::with_options(platform, queue, AvOptions::default())
    }

    /// Create an engine with custom options
    #[must_use]
    pub fn with_options(platform: P, queue: &'q EventQueue<M>, options: AvOptions) -> Self {
        let depth = options.effective_media_queue_depth();
        Self {
            platform,
            queue,
            options,
            cb: ControlBlock {
                rc_acp_handle: RC_HANDLE_NONE,
                ..ControlBlock::default()
            },
            scbs: core::array::from_fn(|hdi| Scb::new(hdi, depth)),
            rcbs: [Rcb::EMPTY; MAX_RCBS],
            lcbs: [Lcb::default(); MAX_LINKS + 1],
            ar: Arbiter::new(),
            main_state: MainState::Init,
        }
    }

    /// The collaborator bundle
    #[must_use]
    pub const fn platform(&self) -> &P {
        &self.platform
    }

    /// The collaborator bundle, mutably
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// The event queue the engine consumes
    #[must_use]
    pub const fn queue(&self) -> &'q EventQueue<M> {
        self.queue
    }

    /// Engine options
    #[must_use]
    pub const fn options(&self) -> &AvOptions {
        &self.options
    }

    /// Engine-wide bookkeeping
    #[must_use]
    pub const fn control_block(&self) -> &ControlBlock {
        &self.cb
    }

    /// Main state machine state
    #[must_use]
    pub const fn main_state(&self) -> MainState {
        self.main_state
    }

    /// Registration arbiter
    #[must_use]
    pub const fn arbiter(&self) -> &Arbiter {
        &self.ar
    }

    /// Stream control block behind `handle`, if registered
    #[must_use]
    pub fn scb(&self, handle: AvHandle) -> Option<&Scb<P::Frame>> {
        let hdi = handle.index()?;
        let scb = &self.scbs[hdi];
        (scb.registered && scb.handle == handle).then_some(scb)
    }

    /// State of the stream behind `handle`
    #[must_use]
    pub fn stream_state(&self, handle: AvHandle) -> Option<StreamState> {
        self.scb(handle).map(|scb| scb.state)
    }

    /// Remote-control blocks
    #[must_use]
    pub const fn rcbs(&self) -> &[Rcb; MAX_RCBS] {
        &self.rcbs
    }

    /// Link control blocks
    #[must_use]
    pub const fn lcbs(&self) -> &[Lcb; MAX_LINKS + 1] {
        &self.lcbs
    }

    /// Route one event
    pub fn dispatch(&mut self, event: Event) {
        match event {
            Event::Stream { handle, event } => self.dispatch_stream(handle, event),
            Event::Main(event) => self.dispatch_main(event),
            Event::System(event) => self.dispatch_system(event),
        }
    }

    fn dispatch_stream(&mut self, handle: AvHandle, event: StreamEvent) {
        if !self.cb.enabled {
            warn!("[SSM] engine not enabled, dropping {:?}", event.kind());
            return;
        }
        match self.resolve(handle) {
            Some(hdi) => self.ssm_execute(hdi, event),
            None => warn!("[SSM] no stream for handle {=u8:#x}", handle.0),
        }
    }

    fn dispatch_main(&mut self, event: MainEvent) {
        if !self.cb.enabled && !matches!(event, MainEvent::Enable { .. } | MainEvent::Deregister(_)) {
            warn!("[MAIN] engine not enabled, dropping {:?}", event.kind());
            return;
        }
        match event {
            MainEvent::Enable { features, sec_mask } => self.api_enable(features, sec_mask),
            MainEvent::Register {
                channel,
                app_id,
                seps,
            } => self.api_register(channel, app_id, &seps),
            MainEvent::Deregister(handle) => self.api_deregister(handle),
            MainEvent::Disconnect(peer) => self.api_disconnect(peer),
            other => self.main_execute(other),
        }
    }

    /// Slot index of a registered handle
    pub(crate) fn resolve(&self, handle: AvHandle) -> Option<usize> {
        let hdi = handle.index()?;
        let scb = &self.scbs[hdi];
        (scb.registered && scb.handle == handle).then_some(hdi)
    }

    /// Run the main state machine
    pub(crate) fn main_execute(&mut self, event: MainEvent) {
        let kind = event.kind();
        let Some((action, next)) = main_lookup(self.main_state, kind) else {
            trace!("[MAIN] {:?} ignored in {:?}", kind, self.main_state);
            return;
        };
        debug!("[MAIN] {:?}: {:?} -> {:?}", kind, self.main_state, next);
        self.main_state = next;
        let Some(action) = action else {
            return;
        };
        match (action, event) {
            (MainAction::Disable, _) => self.disable(),
            (MainAction::RcOpened, MainEvent::AvrcOpen { rc_handle, peer }) => {
                self.rc_opened(rc_handle, peer);
            }
            (
                MainAction::RemoteCmd,
                MainEvent::RemoteCmd {
                    rc_handle,
                    label,
                    op_id,
                    pressed,
                },
            ) => self.remote_cmd(rc_handle, label, op_id, pressed),
            (
                MainAction::VendorCmd,
                MainEvent::VendorCmd {
                    rc_handle,
                    label,
                    ctype,
                    data,
                },
            ) => self.vendor_cmd(rc_handle, label, ctype, &data),
            (
                MainAction::VendorRsp,
                MainEvent::VendorRsp {
                    rc_handle,
                    label,
                    rsp_code,
                    data,
                },
            ) => self.vendor_rsp(rc_handle, label, rsp_code, &data),
            (
                MainAction::MetaRsp,
                MainEvent::MetaRsp {
                    rc_handle,
                    label,
                    is_rsp,
                    code,
                    response,
                },
            ) => self.meta_rsp(rc_handle, label, is_rsp, code, &response),
            (MainAction::RcClose, MainEvent::RcClose(rc_handle)) => self.rc_close(rc_handle),
            (MainAction::RcMsg, MainEvent::AvrcMsg { rc_handle, label, msg }) => {
                self.rc_msg(rc_handle, label, msg);
            }
            (MainAction::Discard, _) => trace!("[MAIN] discarded {:?}", kind),
            _ => {}
        }
    }

    /// Run the stream state machine of slot `hdi`
    pub(crate) fn ssm_execute(&mut self, hdi: usize, event: StreamEvent) {
        let kind = event.kind();
        if !self.scbs[hdi].registered {
            warn!("[SSM] {} not registered, dropping {:?}", hdi, kind);
            return;
        }
        let state = self.scbs[hdi].state;

        // A configuration from the peer wins over another stream still waiting as acceptor
        if state == StreamState::Init && kind == crate::event::StreamEventKind::StrConfigInd {
            for (i, other) in self.scbs.iter_mut().enumerate() {
                if i != hdi && other.registered && other.state == StreamState::Incoming {
                    debug!("[SSM] {} leaves INCOMING for {}", i, hdi);
                    other.state = StreamState::Init;
                    other.coll_mask = crate::scb::CollisionMask::default();
                }
            }
        }

        let Some((actions, next)) = ssm::lookup(state, kind) else {
            trace!("[SSM] {} {:?} ignored in {:?}", hdi, kind, state);
            return;
        };
        debug!("[SSM] {} {:?}: {:?} -> {:?}", hdi, kind, state, next);
        self.scbs[hdi].state = next;

        for &action in actions {
            if !self.scbs[hdi].registered {
                break;
            }
            self.run_action(hdi, action, &event);
        }
    }

    fn run_action(&mut self, hdi: usize, action: Action, ev: &StreamEvent) {
        trace!("[SSM] {} action {:?}", hdi, action);
        match action {
            Action::DoDisc => self.act_do_disc(hdi, ev),
            Action::Cleanup => self.act_cleanup(hdi),
            Action::FreeSdb => self.act_free_sdb(hdi),
            Action::ConfigInd => self.act_config_ind(hdi, ev),
            Action::DisconnectReq => self.act_disconnect_req(hdi),
            Action::SecurityReq => self.act_security_req(hdi, ev),
            Action::SecurityRsp => self.act_security_rsp(hdi, ev),
            Action::SecurityInd => self.act_security_ind(hdi, ev),
            Action::SecurityCfm => self.act_security_cfm(hdi, ev),
            Action::SecurityRej => self.act_security_rej(hdi),
            Action::SetconfigRsp => self.act_setconfig_rsp(hdi, ev),
            Action::SetconfigRej => self.act_setconfig_rej(hdi, ev),
            Action::StRcTimer => self.act_st_rc_timer(hdi),
            Action::StrOpened => self.act_str_opened(hdi, ev),
            Action::DoClose => self.act_do_close(hdi),
            Action::ConnectReq => self.act_connect_req(hdi),
            Action::SdpFailed => self.act_sdp_failed(hdi),
            Action::DiscResults => self.act_disc_results(hdi, ev),
            Action::DiscResAsAcp => self.act_disc_res_as_acp(hdi, ev),
            Action::OpenFailed => self.act_open_failed(hdi, ev),
            Action::GetcapResults => self.act_getcap_results(hdi, ev),
            Action::DiscoverReq => self.act_discover_req(hdi),
            Action::ConnFailed => self.act_conn_failed(hdi),
            Action::DoStart => self.act_do_start(hdi),
            Action::StrStopped => self.act_str_stopped(hdi, ev),
            Action::Reconfig => self.act_reconfig(hdi, ev),
            Action::DataPath => self.act_data_path(hdi),
            Action::StartOk => self.start_ok(hdi, crate::event::SwitchResult::None),
            Action::StartFailed => self.act_start_failed(hdi),
            Action::StrClosed => self.act_str_closed(hdi),
            Action::ClrCong => self.act_clr_cong(hdi),
            Action::SuspendCfm => self.act_suspend_cfm(hdi, ev),
            Action::RcfgStrOk => self.act_rcfg_str_ok(hdi),
            Action::RcfgFailed => self.act_rcfg_failed(hdi),
            Action::RcfgConnect => self.act_rcfg_connect(hdi),
            Action::RcfgDiscntd => self.act_rcfg_discntd(hdi),
            Action::SuspendCont => self.act_suspend_cont(hdi, ev),
            Action::RcfgCfm => self.act_rcfg_cfm(hdi, ev),
            Action::RcfgOpen => self.act_rcfg_open(hdi),
            Action::OpenRc => self.act_open_rc(hdi),
            Action::Chk2ndStart => self.act_chk_2nd_start(hdi),
            Action::SaveCaps => self.act_save_caps(hdi, ev),
            Action::SetUseRc => self.scbs[hdi].use_rc = true,
            Action::CcoClose => self.act_cco_close(hdi),
            Action::SwitchRole => self.act_switch_role(hdi),
            Action::RoleRes => self.act_role_res(hdi, ev),
            Action::DelayCo => self.act_delay_co(hdi, ev),
            Action::OpenAtInc => self.act_open_at_inc(hdi, ev),
            Action::SetDelayValue => self.act_set_delay_value(hdi, ev),
        }
    }

    /// Post an event to the queue without blocking
    pub(crate) fn post(&self, event: Event) {
        if self.queue.try_send(event).is_err() {
            error!("[MAIN] event queue full, event dropped");
        }
    }

    /// Deliver an upcall
    pub(crate) fn emit(&mut self, event: AvEvent) {
        self.platform.on_event(event);
    }

    /// Arm the watchdog of slot `hdi`
    pub(crate) fn start_stream_timer(&mut self, hdi: usize, ms: u32, fire: StreamEvent) {
        let handle = self.scbs[hdi].handle;
        self.platform
            .start_timer(TimerSlot::Stream(hdi), ms, Event::stream(handle, fire));
    }

    /// Disarm the watchdog of slot `hdi`
    pub(crate) fn stop_stream_timer(&mut self, hdi: usize) {
        self.platform.stop_timer(TimerSlot::Stream(hdi));
    }

    /// Link control block in use for `addr`
    pub(crate) fn find_lcb(&self, addr: BluetoothAddress) -> Option<usize> {
        (0..MAX_LINKS).find(|&i| self.cb.conn_lcb & (1 << i) != 0 && self.lcbs[i].addr == addr)
    }

    /// Bit in the connected-stream mask of `channel`
    pub(crate) const fn conn_mask(&self, channel: AvChannel) -> u8 {
        match channel {
            AvChannel::Audio => self.cb.conn_audio,
            AvChannel::Video => self.cb.conn_video,
        }
    }
}

#[cfg(test)]
mod tests;
