//! Registration and system event handlers.
//!
//! Everything that is not owned by one stream: enable/disable, stream registration through the
//! [`Arbiter`](crate::ar::Arbiter), link bookkeeping when signalling channels come and go, the
//! signalling timers and the routing of transport callbacks into stream events.

use super::{AvEngine, Lcb, RcDiscTarget};
use crate::ar::ArRole;
use crate::codec::{MediaType, StreamConfig, Tsep};
use crate::constants::{
    AVDT_PSC_DELAY_RPT, AVDT_PSC_TRANS, MAX_LINKS, MAX_LOCAL_SEPS, MAX_STREAMS, RC_HANDLE_NONE,
    RC_ONLY_LINK_INDEX, uuid,
};
use crate::event::{
    AvEvent, Event, LocalSepConfig, MainEvent, SigChange, StreamEvent, SystemEvent,
    TransportCallback,
};
use crate::platform::{Platform, TimerSlot};
use crate::scb::{CollisionMask, LocalSep};
use crate::ssm::StreamState;
use crate::{AvChannel, AvHandle, BluetoothAddress, Features, LinkPolicy, Status};
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

impl<P: Platform, M: RawMutex> AvEngine<'_, P, M> {
    /// Enable the engine and report the features in effect
    pub(super) fn api_enable(&mut self, features: Features, sec_mask: u8) {
        if self.cb.enabled {
            warn!("[MAIN] already enabled, features {=u16:#x}", self.cb.features.0);
        }
        self.cb = super::ControlBlock {
            enabled: true,
            features,
            sec_mask,
            rc_acp_handle: RC_HANDLE_NONE,
            ..super::ControlBlock::default()
        };
        self.rcbs = [super::Rcb::EMPTY; crate::constants::MAX_RCBS];
        self.lcbs = [Lcb::default(); MAX_LINKS + 1];
        self.main_state = super::MainState::Init;
        info!("[MAIN] enabled, features {=u16:#x}", features.0);
        self.emit(AvEvent::Enabled { features });
    }

    /// Registration role of a set of local endpoints
    fn ar_role_of(seps: &[LocalSep]) -> ArRole {
        match seps.first() {
            Some(sep) if sep.tsep == Tsep::Sink => ArRole::Avk,
            _ => ArRole::Av,
        }
    }

    /// Register a stream: claim a slot, create its endpoints, take the shared registrations
    pub(super) fn api_register(&mut self, channel: AvChannel, app_id: u8, seps: &[LocalSepConfig]) {
        let failed = AvEvent::Registered {
            status: Status::FailResources,
            handle: AvHandle(0),
            channel,
            app_id,
        };
        let Some(hdi) = self.scbs.iter().position(|s| !s.registered) else {
            warn!("[MAIN] no free stream slot for app {}", app_id);
            self.emit(failed);
            return;
        };
        if seps.is_empty() {
            warn!("[MAIN] registration without endpoints");
            self.emit(failed);
            return;
        }

        let handle = AvHandle::new(hdi, channel);
        let media = match channel {
            AvChannel::Audio => MediaType::Audio,
            AvChannel::Video => MediaType::Video,
        };
        let mut created: Vec<LocalSep, MAX_LOCAL_SEPS> = Vec::new();
        for sep in seps {
            match self.platform.create_stream(handle, sep) {
                Ok(avdt_handle) => {
                    let _ = created.push(LocalSep {
                        avdt_handle,
                        tsep: sep.tsep,
                        codec_type: sep.codec_info.codec_type_raw(),
                        media,
                    });
                }
                Err(e) => warn!("[MAIN] endpoint creation failed: {:?}", e),
            }
        }
        if created.is_empty() {
            self.emit(failed);
            return;
        }

        let first_stream = self.cb.reg_audio | self.cb.reg_video == 0;
        let first_audio = self.cb.reg_audio == 0 && channel == AvChannel::Audio;
        let role = Self::ar_role_of(&created);
        let features = self.cb.features;
        let sec_mask = self.cb.sec_mask;

        self.ar.reg_avdt(&mut self.platform, role, sec_mask);
        if first_stream && features.has(Features::RCTG) {
            self.ar
                .reg_avct(&mut self.platform, role, self.options.avrc_mtu, sec_mask);
            self.ar.reg_avrc(
                &mut self.platform,
                uuid::AV_REM_CTRL_TARGET,
                role,
                self.options.avrc_tg_categories,
            );
        }

        let mut psc = AVDT_PSC_TRANS;
        if features.has(Features::DELAY_RPT) {
            psc |= AVDT_PSC_DELAY_RPT;
        }
        let first_codec = seps[0].codec_info;

        let scb = &mut self.scbs[hdi];
        scb.reset();
        scb.registered = true;
        scb.handle = handle;
        scb.channel = channel;
        scb.media = media;
        scb.app_id = app_id;
        scb.codec_type = created[0].codec_type;
        scb.seps = created;
        scb.cfg = StreamConfig::with_codec(first_codec);
        scb.cfg.psc_mask = psc;

        match channel {
            AvChannel::Audio => self.cb.reg_audio |= 1 << hdi,
            AvChannel::Video => self.cb.reg_video |= 1 << hdi,
        }

        if first_audio {
            if features.has(Features::RCTG) {
                self.rc_create(true, 0, RC_ONLY_LINK_INDEX);
            }
            if features.has(Features::RCCT) {
                if !features.has(Features::RCTG) {
                    self.ar
                        .reg_avct(&mut self.platform, role, self.options.avrc_mtu, sec_mask);
                }
                self.ar.reg_avrc(
                    &mut self.platform,
                    uuid::AV_REMOTE_CONTROL,
                    role,
                    self.options.avrc_ct_categories,
                );
            }
        }

        info!("[MAIN] registered {} as {=u8:#x}, role {:?}", hdi, handle.0, role);
        self.emit(AvEvent::Registered {
            status: Status::Success,
            handle,
            channel,
            app_id,
        });
    }

    /// Tear a stream down; completion is reported by [`Self::dereg_comp`]
    pub(super) fn api_deregister(&mut self, handle: AvHandle) {
        match self.resolve(handle) {
            Some(hdi) => {
                debug!("[MAIN] deregistering {}", hdi);
                self.scbs[hdi].deregistering = true;
                if self.scbs[hdi].state == StreamState::Init {
                    self.act_cleanup(hdi);
                } else {
                    self.ssm_execute(hdi, StreamEvent::ApiClose);
                }
            }
            None => self.dereg_comp(handle),
        }
    }

    /// Release a stream slot and drop the shared registrations nobody needs any more
    pub(super) fn dereg_comp(&mut self, handle: AvHandle) {
        if let Some(hdi) = self.resolve(handle) {
            let mask = 1u8 << hdi;
            let role = Self::ar_role_of(&self.scbs[hdi].seps);
            let channel = self.scbs[hdi].channel;
            let peer = self.scbs[hdi].peer;
            self.stop_stream_timer(hdi);

            if let Some(rcb) = self
                .rcbs
                .iter()
                .position(|r| r.in_use() && usize::from(r.shdl) == hdi + 1)
            {
                self.del_rc(rcb);
            }
            if let Some(l) = self.find_lcb(peer) {
                self.lcbs[l].conn_msk &= !(1 << (hdi + 1));
            }

            match channel {
                AvChannel::Audio => {
                    self.cb.reg_audio &= !mask;
                    if self.cb.conn_audio & mask != 0 && self.cb.audio_open_cnt > 0 {
                        self.cb.audio_open_cnt -= 1;
                    }
                    self.cb.conn_audio &= !mask;
                    if self.cb.reg_audio == 0 {
                        self.ar
                            .dereg_avrc(&mut self.platform, uuid::AV_REMOTE_CONTROL, role);
                    }
                }
                AvChannel::Video => {
                    self.cb.reg_video &= !mask;
                    self.cb.conn_video &= !mask;
                }
            }
            if self.cb.a2dp_disc == Some(hdi) {
                self.cb.a2dp_disc = None;
            }
            if self.cb.rc_disc == Some(RcDiscTarget::Stream(hdi)) {
                self.cb.rc_disc = None;
            }
            self.scbs[hdi].reset();

            let role_left = self
                .scbs
                .iter()
                .any(|s| s.registered && Self::ar_role_of(&s.seps) == role);
            if !role_left {
                self.ar.dereg_avdt(&mut self.platform, role);
                self.ar
                    .dereg_avrc(&mut self.platform, uuid::AV_REM_CTRL_TARGET, role);
                self.ar.dereg_avct(&mut self.platform, role);
            }
            info!("[MAIN] deregistered {}", hdi);
        } else {
            debug!("[MAIN] deregister of unknown handle {=u8:#x}", handle.0);
        }

        self.emit(AvEvent::Deregistered { handle });

        if self.cb.reg_audio | self.cb.reg_video == 0 {
            let acp_handle = self.cb.rc_acp_handle;
            if let Some(acp) = self.rcbs.iter().position(|r| r.in_use() && r.handle == acp_handle) {
                self.del_rc(acp);
            }
            if self.cb.disabling {
                info!("[MAIN] disabled");
                self.cb.disabling = false;
                self.cb.enabled = false;
                self.cb.features = Features(0);
            }
        }
    }

    /// Drop the signalling channel to `peer`
    pub(super) fn api_disconnect(&mut self, peer: BluetoothAddress) {
        if let Err(e) = self.platform.disconnect_req(peer) {
            warn!("[MAIN] disconnect of {} failed: {:?}", peer, e);
        }
        self.platform.stop_timer(TimerSlot::Signalling);
    }

    /// Close every RC connection and deregister every stream
    pub(super) fn disable(&mut self) {
        info!("[MAIN] disabling");
        self.cb.disabling = true;
        self.close_all_rc();
        self.platform.stop_timer(TimerSlot::Signalling);
        self.platform.stop_timer(TimerSlot::AcpSignalling);

        let handles: Vec<AvHandle, MAX_STREAMS> = self
            .scbs
            .iter()
            .filter(|s| s.registered)
            .map(|s| s.handle)
            .collect();
        if handles.is_empty() {
            self.cb.disabling = false;
            self.cb.enabled = false;
            self.cb.features = Features(0);
            return;
        }
        for handle in handles {
            self.api_deregister(handle);
        }
    }

    /// A stream's transport came up or went down: maintain link, RC and policy bookkeeping
    pub(super) fn conn_chg(&mut self, hdi: usize, up: bool) {
        let mask = 1u8 << hdi;
        let conn_msk = 1u8 << (hdi + 1);
        let scb = &self.scbs[hdi];
        let (peer, channel) = (scb.peer, scb.channel);
        let lcb = self.find_lcb(peer);
        let features = self.cb.features;

        if up {
            if let Some(l) = lcb {
                self.lcbs[l].conn_msk |= conn_msk;
                let lidx = self.lcbs[l].lidx;
                if let Some(rcb) = self.rcbs.iter_mut().find(|r| r.in_use() && r.lidx == lidx) {
                    rcb.shdl = (hdi + 1) as u8;
                }
            }
            let old = self.conn_mask(channel);
            match channel {
                AvChannel::Audio => self.cb.conn_audio |= mask,
                AvChannel::Video => self.cb.conn_video |= mask,
            }
            if channel == AvChannel::Audio && old & mask == 0 {
                self.cb.audio_open_cnt += 1;
            }

            let rc_only = self.lcbs[MAX_LINKS];
            if let Some(l) = lcb
                && self.cb.rc_acp_handle != RC_HANDLE_NONE
                && self.cb.rc_acp_idx != 0
                && rc_only.conn_msk != 0
                && rc_only.addr == peer
            {
                self.bind_rc_only(hdi, l);
            }
        } else {
            if self.cb.conn_audio & mask != 0 && self.cb.audio_open_cnt > 0 {
                self.cb.audio_open_cnt -= 1;
            }
            self.cb.conn_audio &= !mask;
            self.cb.conn_video &= !mask;
            self.scbs[hdi].peer = BluetoothAddress::NONE;

            if let Some(l) = lcb {
                self.lcbs[l].conn_msk &= !conn_msk;
            }
            let chk_restore = channel == AvChannel::Audio;
            if chk_restore {
                self.stop_stream_timer(hdi);
            }

            if let Some(rcb) = self
                .rcbs
                .iter()
                .position(|r| r.in_use() && usize::from(r.shdl) == hdi + 1)
            {
                self.del_rc(rcb);
            }
            if self.cb.conn_audio == 0 && self.cb.conn_video == 0 {
                self.close_all_rc();
            }
            if self.cb.rc_acp_handle == RC_HANDLE_NONE && features.has(Features::RCTG) {
                self.rc_create(true, 0, RC_ONLY_LINK_INDEX);
            }

            if chk_restore {
                self.restore_after_close();
            }
        }
        debug!(
            "[MAIN] conn_chg {} up {}: audio {=u8:#x} video {=u8:#x} open {}",
            hdi, up, self.cb.conn_audio, self.cb.conn_video, self.cb.audio_open_cnt
        );
    }

    /// An RC-only connection to the stream's peer now belongs to the stream
    fn bind_rc_only(&mut self, hdi: usize, lcb: usize) {
        let acp = usize::from(self.cb.rc_acp_idx - 1);
        debug!("[RC] binding RC-only connection {} to stream {}", acp, hdi);
        self.lcbs[MAX_LINKS].conn_msk = 0;
        self.lcbs[MAX_LINKS].lidx = 0;
        self.scbs[hdi].rc_handle = self.cb.rc_acp_handle;
        self.rcbs[acp].shdl = (hdi + 1) as u8;

        let listener = (0..self.rcbs.len()).find(|&i| {
            let r = &self.rcbs[i];
            i != acp && r.in_use() && usize::from(r.shdl) == hdi + 1
        });
        match listener {
            Some(r2) => {
                self.cb.rc_acp_handle = self.rcbs[r2].handle;
                self.cb.rc_acp_idx = (r2 + 1) as u8;
                self.rcbs[r2].lidx = RC_ONLY_LINK_INDEX;
                self.rcbs[r2].shdl = 0;
            }
            None => {
                self.cb.rc_acp_handle = RC_HANDLE_NONE;
                self.cb.rc_acp_idx = 0;
            }
        }
        self.rcbs[acp].lidx = self.lcbs[lcb].lidx;
        if self.cb.rc_acp_handle == RC_HANDLE_NONE && self.cb.features.has(Features::RCTG) {
            self.rc_create(true, 0, RC_ONLY_LINK_INDEX);
        }
    }

    /// One audio stream went down: give role switching back and relax the flush timeouts
    fn restore_after_close(&mut self) {
        if self.cb.audio_open_cnt == 1 {
            self.platform
                .set_default_policy(LinkPolicy(LinkPolicy::ROLE_SWITCH), true);
            if let Some(i) = (0..self.scbs.len()).find(|&i| self.cb.conn_audio == 1 << i) {
                let peer = self.scbs[i].peer;
                self.platform
                    .set_link_policy(peer, LinkPolicy(LinkPolicy::ROLE_SWITCH), true);
            }
        }
        if self.cb.audio_open_cnt > 0 {
            let _ = self.sync_flush_timeouts();
        }
    }

    /// Handle an event that bypasses the state machine tables
    pub(super) fn dispatch_system(&mut self, event: SystemEvent) {
        if !self.cb.enabled {
            warn!("[MAIN] engine not enabled, dropping system event");
            return;
        }
        match event {
            SystemEvent::SigChange { peer, change } => self.sig_chg(peer, change),
            SystemEvent::SigTimer => self.sig_timer(),
            SystemEvent::AcpSigTimer(idx) => self.acp_sig_timer(usize::from(idx)),
            SystemEvent::A2dpSdpResult {
                found,
                avdt_version,
            } => self.a2dp_sdp_result(found, avdt_version),
            SystemEvent::AvrcSdpDone(records) => self.rc_disc_done(&records),
            SystemEvent::AvrcClosed { rc_handle, peer } => self.rc_closed(rc_handle, peer),
            SystemEvent::RoleChanged {
                peer,
                new_role,
                hci_status,
            } => self.role_changed(peer, new_role, hci_status),
            SystemEvent::ScoChange { open } => self.sco_change(open),
            SystemEvent::Transport { handle, callback } => self.transport_event(handle, callback),
        }
    }

    /// Route a transport callback: link changes go through [`Self::sig_chg`], the rest to the stream
    fn transport_event(&mut self, handle: AvHandle, callback: TransportCallback) {
        match callback {
            TransportCallback::ConnectInd { peer, acceptor } => {
                self.sig_chg(peer, SigChange::Connect { acceptor });
                if !acceptor && let Some(hdi) = self.resolve(handle) {
                    self.ssm_execute(hdi, StreamEvent::AvdtConnect);
                }
            }
            TransportCallback::DisconnectInd { peer, reason } => {
                self.sig_chg(peer, SigChange::Disconnect { reason });
            }
            other => match self.resolve(handle) {
                Some(hdi) => self.ssm_execute(hdi, other.into_stream_event()),
                None => warn!("[SSM] transport callback for unknown handle {=u8:#x}", handle.0),
            },
        }
    }

    /// Signalling channel to `peer` changed
    pub(super) fn sig_chg(&mut self, peer: BluetoothAddress, change: SigChange) {
        debug!("[MAIN] signalling {:?} for {}", change, peer);
        match change {
            SigChange::Connect { acceptor } => {
                if self.find_lcb(peer).is_some() {
                    return;
                }
                let Some(xx) = (0..MAX_LINKS)
                    .find(|&xx| self.cb.conn_lcb & (1 << xx) == 0 && self.scbs[xx].registered)
                else {
                    error!("[MAIN] no stream available for signalling from {}", peer);
                    if let Err(e) = self.platform.disconnect_req(peer) {
                        warn!("[MAIN] disconnect failed: {:?}", e);
                    }
                    return;
                };
                let lidx = (xx + 1) as u8;
                self.lcbs[xx] = Lcb {
                    addr: peer,
                    lidx,
                    conn_msk: 0,
                };
                if self.cb.features.has(Features::RCTG) {
                    self.rc_create(true, 0, lidx);
                }
                self.cb.conn_lcb |= 1 << xx;

                if acceptor && self.scbs[xx].state == StreamState::Init {
                    debug!("[MAIN] incoming signalling on {}", xx);
                    let scb = &mut self.scbs[xx];
                    scb.save_addr(peer);
                    scb.use_rc = true;
                    self.ssm_execute(xx, StreamEvent::AcpConnect);
                    self.sig_timer();
                    self.scbs[xx].coll_mask = CollisionMask(CollisionMask::INC_TMR);
                    let ms = self.options.acp_sig_time_ms;
                    self.platform.start_timer(
                        TimerSlot::AcpSignalling,
                        ms,
                        Event::System(SystemEvent::AcpSigTimer(xx as u8)),
                    );
                }
            }
            SigChange::StreamConnected => self.platform.stop_timer(TimerSlot::Signalling),
            SigChange::Disconnect { reason } => {
                if let Some(l) = self.find_lcb(peer) {
                    self.cb.conn_lcb &= !(1 << l);
                }
                for hdi in 0..self.scbs.len() {
                    let scb = &mut self.scbs[hdi];
                    if scb.registered && scb.peer == peer && scb.state != StreamState::Init {
                        scb.disc_rsn = reason;
                        self.ssm_execute(hdi, StreamEvent::AvdtDisconnect);
                    }
                }
            }
        }
    }

    /// Report links whose signalling is up without any stream, and keep reporting
    pub(super) fn sig_timer(&mut self) {
        for xx in 0..MAX_LINKS {
            if self.cb.conn_lcb & (1 << xx) == 0 || self.lcbs[xx].conn_msk != 0 {
                continue;
            }
            let peer = self.lcbs[xx].addr;
            let ms = self.options.sig_time_ms;
            self.platform
                .start_timer(TimerSlot::Signalling, ms, Event::System(SystemEvent::SigTimer));
            self.emit(AvEvent::Pending { peer });
        }
    }

    /// The peer opened signalling but has not configured a stream in time
    fn acp_sig_timer(&mut self, idx: usize) {
        let Some(scb) = self.scbs.get_mut(idx) else {
            return;
        };
        if !scb.registered || !scb.coll_mask.has(CollisionMask::INC_TMR) {
            return;
        }
        debug!("[MAIN] acceptor timer for {}, collision {=u8:#x}", idx, scb.coll_mask.0);
        scb.coll_mask.0 &= !CollisionMask::INC_TMR;

        match scb.state {
            StreamState::Opening if scb.disc_db => {
                scb.coll_mask.0 |= CollisionMask::INC_TMR;
                let ms = self.options.acp_sig_time_ms;
                self.platform.start_timer(
                    TimerSlot::AcpSignalling,
                    ms,
                    Event::System(SystemEvent::AcpSigTimer(idx as u8)),
                );
            }
            StreamState::Opening => self.act_discover_req(idx),
            StreamState::Incoming if scb.coll_mask.has(CollisionMask::API_CALLED) => {
                scb.coll_mask.0 &= !CollisionMask::API_CALLED;
                let (handle, req) = (scb.handle, scb.open_api);
                self.post(Event::stream(handle, StreamEvent::ApiOpen(req)));
            }
            _ => {}
        }
    }

    /// Outcome of the A2DP service lookup started by `do_disc`
    fn a2dp_sdp_result(&mut self, found: bool, avdt_version: u16) {
        let Some(hdi) = self.cb.a2dp_disc.take() else {
            warn!("[MAIN] A2DP lookup result without a lookup");
            return;
        };
        debug!("[MAIN] {} A2DP lookup found {}, version {=u16:#x}", hdi, found, avdt_version);
        if found {
            self.scbs[hdi].avdt_version = avdt_version;
            self.ssm_execute(hdi, StreamEvent::SdpDiscOk);
        } else {
            self.ssm_execute(hdi, StreamEvent::SdpDiscFail);
        }
    }

    /// Post the "no RC left" event to the main state machine
    pub(super) fn rc_none(&mut self) {
        self.main_execute(MainEvent::AvrcNone);
    }
}
