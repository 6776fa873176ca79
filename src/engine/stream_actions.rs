//! Stream setup and teardown actions.
//!
//! Discovery, capability negotiation, configuration indications from the peer, open and close,
//! content protection and delay reporting. Every failure funnels into [`AvEngine::act_cleanup`].

use super::AvEngine;
use crate::codec::{StreamConfig, Tsep};
use crate::constants::{AVDT_MEDIA_HDR_SIZE, AVDT_PSC_DELAY_RPT, AVDT_VERSION_SYNC, avdt_err, uuid};
use crate::event::{AvEvent, Event, SepInfo, StreamEvent};
use crate::platform::{Platform, TimerSlot};
use crate::scb::{CollisionMask, QueueTag, RoleFlags, WaitFlags};
use crate::ssm::StreamState;
use crate::{AvChannel, Features, Status};
use embassy_sync::blocking_mutex::raw::RawMutex;

impl<P: Platform, M: RawMutex> AvEngine<'_, P, M> {
    /// Release discovery and capability leases, stop the watchdog, drop connection bookkeeping
    pub(super) fn act_cleanup(&mut self, hdi: usize) {
        debug!("[SSM] {} cleanup", hdi);
        self.stop_stream_timer(hdi);
        if self.cb.a2dp_disc == Some(hdi) {
            self.cb.a2dp_disc = None;
        }
        if self.cb.rs_idx as usize == hdi + 1 {
            self.cb.rs_idx = 0;
        }

        let scb = &mut self.scbs[hdi];
        scb.cap = None;
        scb.disc_db = false;
        scb.avdt_version = 0;
        scb.open_status = Status::Success;
        scb.started = false;
        scb.co_started = 0;
        scb.cong = false;
        scb.role = RoleFlags::default();
        scb.cur_psc = 0;
        scb.wait = WaitFlags::default();
        scb.q_tag = QueueTag::None;
        scb.num_disc_snks = 0;
        scb.num_recfg = 0;
        scb.disc_rsn = 0;
        scb.avdt_handle = 0;
        scb.media_queue.clear();
        let deregistering = scb.deregistering;
        let handle = scb.handle;

        if deregistering {
            let seps = scb.seps.clone();
            for sep in &seps {
                self.platform.remove_stream(sep.avdt_handle);
            }
            self.dereg_comp(handle);
        } else {
            self.conn_chg(hdi, false);
        }
    }

    pub(super) fn act_free_sdb(&mut self, hdi: usize) {
        self.scbs[hdi].disc_db = false;
        if self.cb.a2dp_disc == Some(hdi) {
            self.cb.a2dp_disc = None;
        }
    }

    /// The peer configures one of our endpoints
    pub(super) fn act_config_ind(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::StrConfigInd(ind) = ev else {
            return;
        };
        self.platform.stop_timer(TimerSlot::AcpSignalling);
        let features = self.cb.features;

        let scb = &mut self.scbs[hdi];
        scb.coll_mask = CollisionMask::default();
        scb.avdt_label = ind.label;
        scb.save_addr(ind.peer);
        scb.adjust_seps_idx(ind.avdt_handle);

        let local_psc = scb.cfg.psc_mask;
        let psc = ind.cfg.psc_mask | local_psc;
        if ind.cfg.num_codec == 0 || (psc != local_psc && psc != (local_psc & !AVDT_PSC_DELAY_RPT)) {
            warn!("[SSM] {} unsupported configuration psc {=u8:#x}", hdi, ind.cfg.psc_mask);
            let rej = StreamEvent::CiSetconfigFail {
                err: avdt_err::UNSUP_CFG,
                category: 0,
                avdt_handle: ind.avdt_handle,
            };
            self.ssm_execute(hdi, rej);
            return;
        }

        let local_tsep = scb.local_tsep();
        scb.role.insert(RoleFlags::ACP);
        scb.cur_psc = ind.cfg.psc_mask;
        scb.use_rc = features.has(Features::RCTG);
        scb.codec_type = ind.cfg.codec_info.codec_type_raw();
        scb.cfg.codec_info = ind.cfg.codec_info;
        scb.cfg.num_codec = ind.cfg.num_codec;
        scb.cfg.num_protect = ind.cfg.num_protect;
        scb.cfg.protect_info = ind.cfg.protect_info;
        scb.num_seps = 1;
        scb.sep_info_idx = 0;
        scb.sep_info.clear();
        let _ = scb.sep_info.push(SepInfo {
            seid: ind.int_seid,
            in_use: false,
            media: scb.media,
            tsep: local_tsep.peer(),
        });
        if scb.uuid_int == 0 {
            scb.uuid_int = local_uuid(scb.channel, local_tsep);
        }

        let (handle, codec_type, peer, avdt_handle) = (scb.handle, scb.codec_type, scb.peer, scb.avdt_handle);
        self.platform
            .co_setcfg(handle, codec_type, &ind.cfg, ind.int_seid, peer, local_tsep, avdt_handle);
    }

    /// The codec accepted the peer's configuration
    pub(super) fn act_setconfig_rsp(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::CiSetconfigOk {
            num_seps,
            seids,
            recfg_needed,
            avdt_handle,
        } = ev
        else {
            return;
        };
        self.platform.stop_timer(TimerSlot::Signalling);

        let scb = &mut self.scbs[hdi];
        scb.adjust_seps_idx(*avdt_handle);
        let (avdt, label) = (scb.avdt_handle, scb.avdt_label);
        self.platform.config_rsp(avdt, label, avdt_err::NONE, 0);

        let scb = &mut self.scbs[hdi];
        scb.wait = WaitFlags(WaitFlags::ACP_CAPS_ON);
        if *recfg_needed {
            scb.role.insert(RoleFlags::SUSPEND_OPT);
        }
        scb.num_seps = *num_seps;
        if scb.cur_psc & AVDT_PSC_DELAY_RPT != 0 {
            scb.avdt_version = AVDT_VERSION_SYNC;
        }
        let local_tsep = scb.local_tsep();

        if scb.codec_type != crate::codec::CodecType::Sbc as u8 && *num_seps <= 1 {
            // unknown peer with a non-SBC codec: learn every endpoint first
            self.act_discover_req(hdi);
            return;
        }
        if local_tsep == Tsep::Source {
            let (handle, peer) = (scb.handle, scb.peer);
            self.platform
                .co_disc_res(handle, *num_seps, *num_seps, 0, peer, uuid::AUDIO_SOURCE);
        }

        let scb = &mut self.scbs[hdi];
        scb.sep_info.truncate(1);
        for &seid in seids.iter().take(usize::from(num_seps.saturating_sub(1))) {
            let _ = scb.sep_info.push(SepInfo {
                seid,
                in_use: false,
                media: scb.media,
                tsep: Tsep::Sink,
            });
        }
        if local_tsep == Tsep::Source {
            if scb.uuid_int == 0 {
                scb.uuid_int = scb.open_api.uuid;
            }
            self.next_getcap(hdi);
        }
    }

    /// Answer a configuration we cannot take and tell the application
    pub(super) fn act_setconfig_rej(&mut self, hdi: usize, ev: &StreamEvent) {
        let (err, category, avdt_handle, label, peer) = match ev {
            StreamEvent::CiSetconfigFail {
                err,
                category,
                avdt_handle,
            } => (*err, *category, *avdt_handle, self.scbs[hdi].avdt_label, self.scbs[hdi].peer),
            StreamEvent::StrConfigInd(ind) => (avdt_err::UNSUP_CFG, 0, ind.avdt_handle, ind.label, ind.peer),
            _ => return,
        };
        let err = if err == avdt_err::NONE { avdt_err::UNSUP_CFG } else { err };
        let scb = &mut self.scbs[hdi];
        // an open stream keeps its endpoint; only a fresh configuration moves it
        let target = if matches!(ev, StreamEvent::CiSetconfigFail { .. }) {
            scb.adjust_seps_idx(avdt_handle);
            scb.avdt_handle
        } else {
            avdt_handle
        };
        let handle = scb.handle;
        info!("[SSM] {} reject configuration err {=u8:#x}", hdi, err);
        self.platform.config_rsp(target, label, err, category);
        self.emit(AvEvent::Rejected { handle, peer });
    }

    /// Arm the AVRC discovery timer once a stream exists
    pub(super) fn act_st_rc_timer(&mut self, hdi: usize) {
        let features = self.cb.features;
        let scb = &mut self.scbs[hdi];
        if scb.rc_handle != crate::constants::RC_HANDLE_NONE
            || !(scb.use_rc || scb.role.has(RoleFlags::ACP))
            || !features.any(Features::RCTG | Features::RCCT)
        {
            return;
        }
        if scb.wait.has(WaitFlags::ROLE_SW_BITS) {
            scb.wait.insert(WaitFlags::CHECK_RC);
        } else {
            let ms = self.options.rc_disc_time_ms;
            self.start_stream_timer(hdi, ms, StreamEvent::AvrcTimer);
        }
    }

    /// Signalling is up; ask the peer for its endpoints
    pub(super) fn act_discover_req(&mut self, hdi: usize) {
        let scb = &self.scbs[hdi];
        let (peer, handle) = (scb.peer, scb.handle);
        debug!("[SSM] {} discover", hdi);
        if let Err(e) = self.platform.discover_req(peer, handle) {
            warn!("[SSM] {} discover request failed: {:?}", hdi, e);
            self.ssm_execute(hdi, StreamEvent::StrDiscFail);
        }
    }

    /// Discovery finished on the initiating side
    pub(super) fn act_disc_results(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::StrDiscOk(seps) = ev else {
            return;
        };
        let scb = &mut self.scbs[hdi];
        scb.sep_info.clone_from(seps);
        scb.num_seps = seps.len() as u8;
        let (mut num_snks, mut num_srcs) = (0u8, 0u8);
        for sep in seps.iter().filter(|s| !s.in_use && s.media == scb.media) {
            match sep.tsep {
                Tsep::Sink => num_snks += 1,
                Tsep::Source => num_srcs += 1,
            }
        }
        scb.num_disc_snks = num_snks;
        debug!("[SSM] {} discovered {} seps, {} sinks, {} sources", hdi, seps.len(), num_snks, num_srcs);
        let (handle, num_seps, peer, uuid_int) = (scb.handle, scb.num_seps, scb.peer, scb.uuid_int);
        self.platform
            .co_disc_res(handle, num_seps, num_snks, num_srcs, peer, uuid_int);

        if num_seps > 0 {
            self.scbs[hdi].sep_info_idx = 0;
            self.next_getcap(hdi);
        } else {
            self.ssm_execute(hdi, StreamEvent::StrDiscFail);
        }
    }

    /// Discovery finished on the accepting side; only sinks are of interest
    pub(super) fn act_disc_res_as_acp(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::StrDiscOk(seps) = ev else {
            return;
        };
        let scb = &mut self.scbs[hdi];
        scb.sep_info.clone_from(seps);
        scb.num_seps = seps.len() as u8;
        let media = scb.media;
        let mut num_snks = 0u8;
        for sep in scb.sep_info.iter_mut().filter(|s| s.tsep == Tsep::Sink && s.media == media) {
            sep.in_use = false;
            num_snks += 1;
        }
        scb.num_disc_snks = num_snks;
        if scb.uuid_int == 0 {
            scb.uuid_int = uuid::AUDIO_SOURCE;
        }
        let (handle, num_seps, peer) = (scb.handle, scb.num_seps, scb.peer);
        self.platform
            .co_disc_res(handle, num_seps, num_snks, 0, peer, uuid::AUDIO_SOURCE);

        if num_seps > 0 {
            self.scbs[hdi].sep_info_idx = 0;
            self.next_getcap(hdi);
        } else {
            self.ssm_execute(hdi, StreamEvent::StrDiscFail);
        }
    }

    /// Query the next candidate at or after `sep_info_idx`; returns whether a query went out
    pub(super) fn next_getcap(&mut self, hdi: usize) -> bool {
        let scb = &mut self.scbs[hdi];
        let requested = requested_peer_tsep(scb.uuid_int);
        let media = scb.media;
        let candidate = scb
            .sep_info
            .iter()
            .enumerate()
            .skip(scb.sep_info_idx)
            .find(|(_, s)| !s.in_use && s.tsep == requested && s.media == media)
            .map(|(i, s)| (i, s.seid));

        let Some((idx, seid)) = candidate else {
            debug!("[SSM] {} no more candidates", hdi);
            self.ssm_execute(hdi, StreamEvent::StrGetcapFail);
            return false;
        };
        scb.sep_info_idx = idx;
        if scb.cap.is_none() {
            scb.cap = Some(StreamConfig::default());
        }
        let all = scb.avdt_version >= AVDT_VERSION_SYNC;
        let (peer, handle) = (scb.peer, scb.handle);
        debug!("[SSM] {} get caps of seid {}", hdi, seid);
        if let Err(e) = self.platform.get_caps_req(peer, seid, all, handle) {
            warn!("[SSM] {} get caps request failed: {:?}", hdi, e);
            self.ssm_execute(hdi, StreamEvent::StrGetcapFail);
            return false;
        }
        true
    }

    /// Capabilities of the current candidate arrived; open it if the codec agrees
    pub(super) fn act_getcap_results(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::StrGetcapOk(caps) = ev else {
            return;
        };
        let scb = &mut self.scbs[hdi];
        scb.cap = Some(*caps);

        let mut cfg = scb.cfg;
        cfg.num_codec = 1;
        cfg.num_protect = caps.num_protect;
        cfg.codec_info = caps.codec_info;
        cfg.protect_info = caps.protect_info;

        let seid = scb.sep_info.get(scb.sep_info_idx).map_or(0, |s| s.seid);
        let media_ok = caps.num_codec != 0 && caps.codec_info.media_type() == scb.media;
        let handle = scb.handle;
        let accepted = media_ok && self.platform.co_getcfg(handle, seid, caps, &mut cfg);

        if !accepted {
            debug!("[SSM] {} seid {} rejected", hdi, seid);
            self.scbs[hdi].sep_info_idx += 1;
            self.next_getcap(hdi);
            return;
        }

        let scb = &mut self.scbs[hdi];
        scb.codec_type = cfg.codec_info.codec_type_raw();
        scb.cfg.codec_info = cfg.codec_info;
        scb.cfg.num_codec = cfg.num_codec;
        scb.cfg.num_protect = cfg.num_protect;
        scb.cfg.protect_info = cfg.protect_info;
        let local = if scb.uuid_int == uuid::AUDIO_SOURCE || scb.uuid_int == uuid::VIDEO_SOURCE {
            Tsep::Source
        } else {
            Tsep::Sink
        };
        let sep_handle = scb.find_sep_handle(local);
        scb.adjust_seps_idx(sep_handle);
        cfg.psc_mask &= caps.psc_mask;
        scb.cur_psc = cfg.psc_mask;
        if scb.state != StreamState::Rcfg {
            scb.cap = None;
        }

        let (avdt, peer) = (scb.avdt_handle, scb.peer);
        info!("[SSM] {} opening seid {} avdt {=u8:#x}", hdi, seid, avdt);
        if let Err(e) = self.platform.open_req(avdt, peer, seid, &cfg) {
            warn!("[SSM] {} open request failed: {:?}", hdi, e);
            let err = match e {
                crate::AvError::Transport(code) => code,
                _ => avdt_err::BAD_STATE,
            };
            self.ssm_execute(hdi, StreamEvent::StrOpenFail { err });
        }
    }

    /// Collect peer capabilities as acceptor; resumes a start that arrived meanwhile
    pub(super) fn act_save_caps(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::StrGetcapOk(caps) = ev else {
            return;
        };
        let scb = &mut self.scbs[hdi];
        let old_wait = scb.wait;
        let seid = scb.sep_info.get(scb.sep_info_idx).map_or(0, |s| s.seid);
        let handle = scb.handle;
        let mut scratch = scb.cfg;
        let _ = self.platform.co_getcfg(handle, seid, caps, &mut scratch);

        let scb = &mut self.scbs[hdi];
        scb.sep_info_idx += 1;
        let done = if usize::from(scb.num_seps) > scb.sep_info_idx {
            !self.next_getcap(hdi)
        } else {
            true
        };
        if !done {
            return;
        }

        let scb = &mut self.scbs[hdi];
        scb.sep_info_idx = 0;
        scb.cap = None;
        scb.wait.remove(WaitFlags::ACP_CAPS_ON | WaitFlags::ACP_CAPS_STARTED);
        if old_wait.has(WaitFlags::ACP_CAPS_STARTED) {
            self.start_ok(hdi, crate::event::SwitchResult::None);
        }
    }

    /// Both ends agreed and the transport stream is up
    pub(super) fn act_str_opened(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::StrOpenOk { peer_mtu } = ev else {
            return;
        };
        self.conn_chg(hdi, true);

        let scb = &mut self.scbs[hdi];
        scb.cong = true;
        scb.stream_mtu = peer_mtu.saturating_sub(AVDT_MEDIA_HDR_SIZE);
        scb.media_queue.clear();
        let stream_mtu = scb.stream_mtu;
        let mtu = match self.chk_mtu(hdi) {
            0 => stream_mtu,
            m if m > stream_mtu => stream_mtu,
            m => m,
        };

        let scb = &self.scbs[hdi];
        let (handle, codec_type, codec_info, peer, tsep) =
            (scb.handle, scb.codec_type, scb.cfg.codec_info, scb.peer, scb.local_tsep());
        info!("[SSM] {} opened, mtu {}", hdi, mtu);
        self.platform.co_open(handle, codec_type, &codec_info, mtu);

        let starting = self.chk_start(hdi);
        self.emit(AvEvent::Opened {
            handle,
            peer,
            status: Status::Success,
            starting,
            mtu,
            peer_sep: tsep.peer(),
        });
        if starting {
            self.ssm_execute(hdi, StreamEvent::ApiStart);
        }

        let role = if tsep == Tsep::Sink {
            crate::ar::ArRole::Avk
        } else {
            crate::ar::ArRole::Av
        };
        if self.ar.avdt_conn(role) != 0 {
            self.post(Event::System(crate::event::SystemEvent::SigChange {
                peer,
                change: crate::event::SigChange::StreamConnected,
            }));
        }
    }

    /// Smallest MTU among the other connected audio streams, 0 when there is none
    pub(super) fn chk_mtu(&self, hdi: usize) -> u16 {
        if self.scbs[hdi].channel != AvChannel::Audio || self.cb.audio_open_cnt < 2 {
            return 0;
        }
        self.scbs
            .iter()
            .enumerate()
            .filter(|(i, s)| {
                *i != hdi && s.registered && s.channel == AvChannel::Audio && self.cb.conn_audio & (1 << *i) != 0
            })
            .map(|(_, s)| s.stream_mtu)
            .min()
            .unwrap_or(0)
    }

    pub(super) fn act_do_close(&mut self, hdi: usize) {
        if self.scbs[hdi].co_started > 0 {
            self.str_stopped(hdi, None);
        }
        self.platform.stop_timer(TimerSlot::Signalling);
        let scb = &mut self.scbs[hdi];
        scb.started = false;
        let avdt = scb.avdt_handle;
        self.platform.flush_media(avdt);
        if let Err(e) = self.platform.close_req(avdt) {
            warn!("[SSM] {} close request failed: {:?}", hdi, e);
        }
        let ms = self.options.close_req_time_ms;
        self.start_stream_timer(hdi, ms, StreamEvent::ApiClose);
    }

    /// Service found; open signalling unless the peer beat us to it
    pub(super) fn act_connect_req(&mut self, hdi: usize) {
        self.act_free_sdb(hdi);
        let scb = &self.scbs[hdi];
        if scb.coll_mask.has(CollisionMask::INC_TMR) {
            debug!("[SSM] {} waiting for the peer's signalling", hdi);
            return;
        }
        let (peer, sec_mask, handle) = (scb.peer, scb.sec_mask, scb.handle);
        if let Err(e) = self.platform.connect_req(peer, sec_mask, handle) {
            warn!("[SSM] {} connect request failed: {:?}", hdi, e);
            self.ssm_execute(hdi, StreamEvent::AvdtDisconnect);
        }
    }

    /// Drop the signalling channel (and the stream's RC connection with it)
    pub(super) fn act_disconnect_req(&mut self, hdi: usize) {
        self.platform.stop_timer(TimerSlot::Signalling);
        self.stop_stream_timer(hdi);
        let peer = self.scbs[hdi].peer;
        if self.find_lcb(peer).is_some() {
            if let Some(rcb) = self.rcbs.iter().position(|r| r.in_use() && usize::from(r.shdl) == hdi + 1) {
                self.del_rc(rcb);
            }
            if let Err(e) = self.platform.disconnect_req(peer) {
                warn!("[SSM] {} disconnect request failed: {:?}", hdi, e);
                self.ssm_execute(hdi, StreamEvent::AvdtDisconnect);
            }
        } else {
            self.ssm_execute(hdi, StreamEvent::AvdtDisconnect);
        }
    }

    pub(super) fn act_sdp_failed(&mut self, hdi: usize) {
        let scb = &mut self.scbs[hdi];
        if scb.open_status == Status::Success {
            scb.open_status = Status::FailSdp;
        }
        self.act_free_sdb(hdi);
        self.act_str_closed(hdi);
    }

    pub(super) fn act_conn_failed(&mut self, hdi: usize) {
        let scb = &mut self.scbs[hdi];
        if scb.open_status == Status::Success {
            scb.open_status = Status::FailStream;
        }
        self.act_str_closed(hdi);
    }

    /// Opening failed after signalling came up
    pub(super) fn act_open_failed(&mut self, hdi: usize, ev: &StreamEvent) {
        let status = match ev {
            StreamEvent::StrGetcapFail => Status::FailGetCap,
            _ => Status::FailStream,
        };
        self.scbs[hdi].open_status = status;
        self.act_cco_close(hdi);

        let peer = self.scbs[hdi].peer;
        let sibling_open = self
            .scbs
            .iter()
            .enumerate()
            .any(|(i, s)| i != hdi && s.registered && s.state == StreamState::Open && s.peer == peer);

        if sibling_open {
            // keep the link the other stream runs on
            let scb = &mut self.scbs[hdi];
            let (handle, tsep) = (scb.handle, scb.local_tsep());
            scb.state = StreamState::Init;
            scb.open_status = Status::Success;
            let starting = self.chk_start(hdi);
            self.act_cleanup(hdi);
            self.emit(AvEvent::Opened {
                handle,
                peer,
                status: Status::FailGetCap,
                starting,
                mtu: 0,
                peer_sep: tsep.peer(),
            });
        } else if let Err(e) = self.platform.disconnect_req(peer) {
            warn!("[SSM] {} disconnect request failed: {:?}", hdi, e);
            self.ssm_execute(hdi, StreamEvent::AvdtDisconnect);
        }
    }

    /// Report the close (or the pending open failure) and clean up
    pub(super) fn act_str_closed(&mut self, hdi: usize) {
        let peer = self.scbs[hdi].peer;
        let policy = self.restored_policy();
        self.platform.set_link_policy(peer, policy, true);
        if self.cb.audio_open_cnt <= 1 {
            self.platform.set_desired_role_allow(true);
        }

        let scb = &mut self.scbs[hdi];
        let (handle, tsep, open_status) = (scb.handle, scb.local_tsep(), scb.open_status);
        if open_status.is_failure() {
            info!("[SSM] {} open failed: {:?}", hdi, open_status);
            scb.open_status = Status::Success;
            self.act_cleanup(hdi);
            self.emit(AvEvent::Opened {
                handle,
                peer,
                status: open_status,
                starting: false,
                mtu: 0,
                peer_sep: tsep.peer(),
            });
        } else {
            if scb.co_started > 0 {
                self.str_stopped(hdi, None);
            }
            self.act_cco_close(hdi);
            let disc_reason = self.scbs[hdi].disc_rsn;
            info!("[SSM] {} closed, reason {=u8:#x}", hdi, disc_reason);
            self.act_cleanup(hdi);
            self.emit(AvEvent::Closed {
                handle,
                peer,
                disc_reason,
            });
        }
    }

    /// Tell the codec the stream is gone
    pub(super) fn act_cco_close(&mut self, hdi: usize) {
        let mtu = match self.chk_mtu(hdi) {
            0 => self.scbs[hdi].stream_mtu,
            m => m,
        };
        let scb = &self.scbs[hdi];
        let (handle, codec_type) = (scb.handle, scb.codec_type);
        self.platform.co_close(handle, codec_type, mtu);
    }

    /// The application opens while the peer's signalling is pending
    pub(super) fn act_open_at_inc(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::ApiOpen(req) = ev else {
            return;
        };
        let scb = &mut self.scbs[hdi];
        scb.open_api = *req;
        if scb.coll_mask.has(CollisionMask::INC_TMR) {
            scb.coll_mask.0 |= CollisionMask::API_CALLED;
            debug!("[SSM] {} open deferred until the acceptor timer fires", hdi);
            return;
        }
        // The peer never configured a stream; start over as initiator
        scb.coll_mask = CollisionMask::default();
        scb.state = StreamState::Init;
        let handle = scb.handle;
        self.post(Event::stream(handle, StreamEvent::ApiOpen(*req)));
    }

    pub(super) fn act_security_req(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::ApiProtectReq(data) = ev else {
            return;
        };
        if !self.cb.features.has(Features::PROTECT) {
            return;
        }
        let avdt = self.scbs[hdi].avdt_handle;
        if let Err(e) = self.platform.security_req(avdt, data) {
            warn!("[SSM] {} security request failed: {:?}", hdi, e);
        }
    }

    pub(super) fn act_security_rsp(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::ApiProtectRsp { err, data } = ev else {
            return;
        };
        let scb = &self.scbs[hdi];
        let (avdt, label) = (scb.avdt_handle, scb.avdt_label);
        if self.cb.features.has(Features::PROTECT) {
            self.platform.security_rsp(avdt, label, *err, data);
        } else {
            self.platform.security_rsp(avdt, label, avdt_err::NSC, &[]);
        }
    }

    pub(super) fn act_security_ind(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::StrSecurityInd { label, data } = ev else {
            return;
        };
        let scb = &mut self.scbs[hdi];
        scb.avdt_label = *label;
        let (handle, avdt) = (scb.handle, scb.avdt_handle);
        if self.cb.features.has(Features::PROTECT) {
            self.emit(AvEvent::ProtectReq {
                handle,
                data: data.clone(),
            });
        } else {
            self.platform.security_rsp(avdt, *label, avdt_err::NSC, &[]);
        }
    }

    pub(super) fn act_security_cfm(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::StrSecurityCfm { err, data } = ev else {
            return;
        };
        if self.cb.features.has(Features::PROTECT) {
            let handle = self.scbs[hdi].handle;
            self.emit(AvEvent::ProtectRsp {
                handle,
                err: *err,
                data: data.clone(),
            });
        }
    }

    pub(super) fn act_security_rej(&mut self, hdi: usize) {
        let scb = &self.scbs[hdi];
        let (avdt, label) = (scb.avdt_handle, scb.avdt_label);
        self.platform.security_rsp(avdt, label, avdt_err::BAD_STATE, &[]);
    }

    pub(super) fn act_delay_co(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::AvdtDelayReport(delay) = ev else {
            return;
        };
        let handle = self.scbs[hdi].handle;
        self.platform.co_delay(handle, *delay);
        self.emit(AvEvent::SinkDelayReport { handle, delay: *delay });
    }

    pub(super) fn act_set_delay_value(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::ApiSetDelayValue(delay) = ev else {
            return;
        };
        self.platform.set_delay_value(*delay);
        let scb = &self.scbs[hdi];
        let handle = scb.handle;
        let status = if scb.state == StreamState::Open {
            let seid = scb.sep_info.get(scb.sep_info_idx).map_or(0, |s| s.seid);
            match self.platform.delay_report(scb.avdt_handle, seid, *delay) {
                Ok(()) => Status::Success,
                Err(e) => {
                    warn!("[SSM] {} delay report failed: {:?}", hdi, e);
                    Status::Fail
                }
            }
        } else {
            Status::Success
        };
        self.emit(AvEvent::DelayValueSet {
            handle,
            status,
            delay: *delay,
        });
    }
}

/// Service class the local endpoint answers to
pub(super) const fn local_uuid(channel: AvChannel, tsep: Tsep) -> u16 {
    match (channel, tsep) {
        (AvChannel::Audio, Tsep::Source) => uuid::AUDIO_SOURCE,
        (AvChannel::Audio, Tsep::Sink) => uuid::AUDIO_SINK,
        (AvChannel::Video, Tsep::Source) => uuid::VIDEO_SOURCE,
        (AvChannel::Video, Tsep::Sink) => uuid::VIDEO_SINK,
    }
}

/// Peer endpoint role to look for when opening as `uuid_int`
const fn requested_peer_tsep(uuid_int: u16) -> Tsep {
    if uuid_int == uuid::AUDIO_SINK || uuid_int == uuid::VIDEO_SINK {
        Tsep::Source
    } else {
        Tsep::Sink
    }
}
