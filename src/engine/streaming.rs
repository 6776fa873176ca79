//! Start, stop, media path and reconfiguration actions

use super::AvEngine;
use crate::codec::Tsep;
use crate::constants::{AVDT_MEDIA_HDR_SIZE, AVDT_MEDIA_PT_BASE, DEFAULT_FLUSH_TIMEOUT, MEDIA_REQUEUE_LIMIT, avdt_err};
use crate::event::{AvEvent, ReconfigRequest, StopRequest, StreamEvent, SwitchResult};
use crate::platform::Platform;
use crate::scb::{QueueTag, RoleFlags, WaitFlags};
use crate::ssm::StreamState;
use crate::{AvChannel, Features, LinkPolicy, LinkRole, Status};
use embassy_sync::blocking_mutex::raw::RawMutex;

impl<P: Platform, M: RawMutex> AvEngine<'_, P, M> {
    /// Ask the peer to start, or confirm a start that already happened
    pub(super) fn act_do_start(&mut self, hdi: usize) {
        if self.cb.sco_occupied {
            debug!("[SSM] {} start refused, SCO active", hdi);
            self.act_start_failed(hdi);
            return;
        }
        let peer = self.scbs[hdi].peer;
        let mut policy = LinkPolicy(LinkPolicy::SNIFF);
        if self.platform.link_role(peer) == Some(LinkRole::Master) {
            policy = policy.with(LinkPolicy::ROLE_SWITCH);
        }
        self.platform.set_link_policy(peer, policy, false);

        let scb = &mut self.scbs[hdi];
        if !scb.started && !scb.role.has(RoleFlags::START_INT) {
            scb.role.insert(RoleFlags::START_INT);
            let avdt = scb.avdt_handle;
            debug!("[SSM] {} start request", hdi);
            if let Err(e) = self.platform.start_req(avdt) {
                warn!("[SSM] {} start request failed: {:?}", hdi, e);
                let err = match e {
                    crate::AvError::Transport(code) => code,
                    _ => avdt_err::BAD_STATE,
                };
                self.ssm_execute(hdi, StreamEvent::StrStartFail { err });
            }
        } else if scb.started {
            scb.role.insert(RoleFlags::START_INT);
            if scb.wait.is_empty() {
                if scb.role.has(RoleFlags::SUSPEND) {
                    self.notify_start_failed(hdi, Status::Fail);
                } else {
                    self.start_ok(hdi, SwitchResult::None);
                }
            }
        }
    }

    /// Streaming confirmed by the transport (or resumed after a role switch)
    pub(crate) fn start_ok(&mut self, hdi: usize, switch_res: SwitchResult) {
        let scb = &mut self.scbs[hdi];
        scb.started = true;
        scb.sco_suspend = false;
        let initiator = scb.role.has(RoleFlags::START_INT);
        if scb.local_tsep() == Tsep::Sink {
            scb.wait.remove(WaitFlags::ACP_CAPS_ON);
        }

        let mut switch_res = switch_res;
        if scb.wait.has(WaitFlags::ROLE_SW_FAILED) {
            scb.wait.remove(WaitFlags::ROLE_SW_FAILED);
            switch_res = SwitchResult::Fail;
        }
        if switch_res != SwitchResult::None {
            scb.wait.remove(WaitFlags::ROLE_SW_BITS);
            if switch_res == SwitchResult::Fail {
                let handle = scb.handle;
                warn!("[SSM] {} start failed on role switch", hdi);
                self.emit(AvEvent::Started {
                    handle,
                    status: Status::FailRole,
                    initiator,
                    suspending: false,
                });
                return;
            }
        }

        if self.link_role_ok(hdi, 1) {
            // already master; a late role switch result is of no interest any more
            self.scbs[hdi].wait.remove(WaitFlags::ROLE_SW_BITS);
        } else {
            self.scbs[hdi].q_tag = QueueTag::Start;
        }
        let scb = &mut self.scbs[hdi];
        if scb.wait.has(WaitFlags::ROLE_SW_RES_OPEN | WaitFlags::ROLE_SW_RES_START) {
            scb.wait.insert(WaitFlags::ROLE_SW_STARTED);
            scb.q_tag = QueueTag::Start;
        }
        if scb.wait.has(WaitFlags::ROLE_SW_BITS) {
            debug!("[SSM] {} start deferred until the role switch completes", hdi);
            return;
        }
        if scb.wait.has(WaitFlags::ACP_CAPS_ON) {
            debug!("[SSM] {} start deferred until peer capabilities are known", hdi);
            scb.wait.insert(WaitFlags::ACP_CAPS_STARTED);
            return;
        }

        let flush_to = if scb.channel == AvChannel::Audio {
            scb.co_started = self.cb.audio_open_cnt.max(1);
            self.options.audio_flush_timeout(usize::from(scb.co_started))
        } else {
            self.options.video_flush_timeout
        };
        let peer = scb.peer;
        self.platform.set_flush_timeout(peer, flush_to);

        let scb = &mut self.scbs[hdi];
        scb.cong = false;
        let mut role = scb.role;
        let suspend = if role.has(RoleFlags::START_INT) {
            role.remove(RoleFlags::START_INT);
            false
        } else {
            role.has(RoleFlags::ACP) && role.has(RoleFlags::SUSPEND_OPT)
        };
        if !suspend {
            scb.q_tag = QueueTag::Stream;
            self.stream_chg(hdi, true);
        }
        if !initiator {
            let mut policy = LinkPolicy(LinkPolicy::SNIFF);
            if self.platform.link_role(peer) == Some(LinkRole::Master) {
                policy = policy.with(LinkPolicy::ROLE_SWITCH);
            }
            self.platform.set_link_policy(peer, policy, false);
        }

        let scb = &mut self.scbs[hdi];
        role.remove(RoleFlags::ACP | RoleFlags::SUSPEND_OPT);
        scb.role = role;
        let (handle, codec_type, codec_info) = (scb.handle, scb.codec_type, scb.cfg.codec_info);
        let no_rtp = self.platform.co_start(handle, codec_type, &codec_info);
        self.scbs[hdi].no_rtp = no_rtp;
        info!("[SSM] {} started, initiator {}, suspending {}", hdi, initiator, suspend);
        self.emit(AvEvent::Started {
            handle,
            status: Status::Success,
            initiator,
            suspending: suspend,
        });

        if suspend {
            let scb = &mut self.scbs[hdi];
            scb.role.insert(RoleFlags::SUSPEND);
            scb.cong = true;
            scb.co_started = 0;
            self.platform.co_stop(handle, codec_type);
            let stop = StopRequest {
                suspend: true,
                flush: false,
            };
            self.ssm_execute(hdi, StreamEvent::ApiStop(stop));
        }
    }

    pub(super) fn act_start_failed(&mut self, hdi: usize) {
        let scb = &mut self.scbs[hdi];
        if !scb.started && scb.co_started == 0 {
            self.notify_start_failed(hdi, Status::Fail);
        }
        let scb = &mut self.scbs[hdi];
        scb.sco_suspend = false;
        let peer = scb.peer;
        let policy = LinkPolicy(LinkPolicy::SNIFF | LinkPolicy::ROLE_SWITCH);
        self.platform.set_link_policy(peer, policy, true);
    }

    pub(super) fn notify_start_failed(&mut self, hdi: usize, status: Status) {
        let scb = &mut self.scbs[hdi];
        scb.role.remove(RoleFlags::START_INT);
        let handle = scb.handle;
        self.emit(AvEvent::Started {
            handle,
            status,
            initiator: true,
            suspending: false,
        });
    }

    pub(super) fn act_str_stopped(&mut self, hdi: usize, ev: &StreamEvent) {
        let req = match ev {
            StreamEvent::ApiStop(req) => Some(*req),
            _ => None,
        };
        self.str_stopped(hdi, req);
    }

    /// Stop local media; with `suspend` also suspend the stream at the peer
    pub(super) fn str_stopped(&mut self, hdi: usize, req: Option<StopRequest>) {
        let peer = self.scbs[hdi].peer;
        let policy = self.restored_policy();
        self.platform.set_link_policy(peer, policy, true);

        if self.scbs[hdi].co_started > 0 {
            self.stream_chg(hdi, false);
            let scb = &mut self.scbs[hdi];
            scb.co_started = 0;
            let (handle, codec_type) = (scb.handle, scb.codec_type);
            self.platform.co_stop(handle, codec_type);
            self.platform.set_flush_timeout(peer, DEFAULT_FLUSH_TIMEOUT);
        }

        let scb = &mut self.scbs[hdi];
        let avdt = scb.avdt_handle;
        if scb.channel == AvChannel::Audio {
            scb.media_queue.clear();
            if req.is_some_and(|r| r.flush) {
                self.platform.flush_media(avdt);
            }
        }

        let scb = &mut self.scbs[hdi];
        let (handle, started, in_rcfg) = (scb.handle, scb.started, scb.state == StreamState::Rcfg);
        match req {
            Some(req) if req.suspend => {
                if started && scb.suspend_sup {
                    debug!("[SSM] {} suspend request", hdi);
                    if let Err(e) = self.platform.suspend_req(avdt) {
                        warn!("[SSM] {} suspend request failed: {:?}", hdi, e);
                        self.emit(AvEvent::Suspended {
                            handle,
                            status: Status::Fail,
                            initiator: true,
                        });
                    }
                } else if !in_rcfg {
                    self.emit(AvEvent::Suspended {
                        handle,
                        status: Status::Success,
                        initiator: true,
                    });
                }
            }
            _ => {
                if !in_rcfg {
                    self.emit(AvEvent::Stopped {
                        handle,
                        status: Status::Success,
                    });
                }
            }
        }
    }

    /// Suspend confirmed (or indicated by the peer)
    pub(super) fn act_suspend_cfm(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::StrSuspendCfm { err, initiator } = ev else {
            return;
        };
        if !self.scbs[hdi].started {
            // both sides suspended at once; the second one may be rejected
            warn!("[SSM] {} already suspended, err {=u8:#x}", hdi, err);
            return;
        }
        let mut status = Status::Success;
        if *err != avdt_err::NONE && *err != avdt_err::BAD_STATE {
            if *err != avdt_err::TIMEOUT {
                self.scbs[hdi].suspend_sup = false;
            }
            status = Status::Fail;
            error!("[SSM] {} suspend failed, closing", hdi);
            self.ssm_execute(hdi, StreamEvent::ApiClose);
        } else {
            self.scbs[hdi].started = false;
        }

        let scb = &mut self.scbs[hdi];
        if scb.role.has(RoleFlags::SUSPEND) {
            scb.role.remove(RoleFlags::SUSPEND);
            scb.cong = false;
        }
        let peer = scb.peer;
        let policy = self.restored_policy();
        self.platform.set_link_policy(peer, policy, true);

        if self.scbs[hdi].co_started > 0 {
            self.stream_chg(hdi, false);
            let scb = &mut self.scbs[hdi];
            scb.co_started = 0;
            let (handle, codec_type) = (scb.handle, scb.codec_type);
            self.platform.co_stop(handle, codec_type);
            self.platform.set_flush_timeout(peer, DEFAULT_FLUSH_TIMEOUT);
        }

        let handle = self.scbs[hdi].handle;
        info!("[SSM] {} suspended: {:?}", hdi, status);
        self.emit(AvEvent::Suspended {
            handle,
            status,
            initiator: *initiator,
        });
    }

    /// Move one frame towards the transport
    pub(super) fn act_data_path(&mut self, hdi: usize) {
        let scb = &mut self.scbs[hdi];
        if scb.cong {
            return;
        }
        let (handle, avdt, codec_type, no_rtp) = (scb.handle, scb.avdt_handle, scb.codec_type, scb.no_rtp);
        let (frame, timestamp, fresh) = match scb.media_queue.pop() {
            Some((frame, timestamp)) => (frame, timestamp, false),
            None => match self.platform.next_frame(codec_type) {
                Some((frame, timestamp)) => (frame, timestamp, true),
                None => return,
            },
        };

        let held = self.platform.queued_buffers(avdt);
        if fresh {
            self.dup_frame(hdi, &frame, timestamp);
        }

        if held < self.options.transport_queue_limit {
            self.platform
                .write_media(avdt, frame, timestamp, AVDT_MEDIA_PT_BASE | codec_type, no_rtp);
            self.scbs[hdi].cong = true;
            return;
        }

        // the transport is not draining; hold the frame back
        let queue = &mut self.scbs[hdi].media_queue;
        let dropped = if fresh {
            queue.push(frame, timestamp).is_some()
        } else if queue.len() < MEDIA_REQUEUE_LIMIT {
            queue.push_front(frame, timestamp).is_err()
        } else {
            true
        };
        if dropped {
            trace!("[SSM] {} media frame dropped", hdi);
            self.platform.co_dropped(handle);
        }
    }

    /// Copy a fresh frame to every other started stream
    fn dup_frame(&mut self, hdi: usize, frame: &P::Frame, timestamp: u32) {
        for i in 0..self.scbs.len() {
            let scb = &mut self.scbs[i];
            if i == hdi || !scb.registered || scb.co_started == 0 {
                continue;
            }
            if scb.media_queue.push(frame.clone(), timestamp).is_some() {
                let handle = scb.handle;
                self.platform.co_dropped(handle);
            }
        }
    }

    pub(super) fn act_clr_cong(&mut self, hdi: usize) {
        let scb = &mut self.scbs[hdi];
        if scb.co_started > 0 {
            scb.cong = false;
        }
    }

    /// A second audio stream opened while another one streams: start it too
    pub(super) fn act_chk_2nd_start(&mut self, hdi: usize) {
        let scb = &self.scbs[hdi];
        if scb.channel != AvChannel::Audio
            || self.cb.audio_open_cnt < 2
            || scb.role.has(RoleFlags::SUSPEND_OPT)
        {
            return;
        }
        let sibling_started = self
            .scbs
            .iter()
            .enumerate()
            .any(|(i, s)| i != hdi && s.registered && s.channel == AvChannel::Audio && s.co_started > 0);
        if sibling_started {
            debug!("[SSM] {} joins the running audio stream", hdi);
            self.ssm_execute(hdi, StreamEvent::ApiStart);
        }
        self.sync_flush_timeouts();
    }

    /// Whether a freshly opened stream should start right away
    pub(super) fn chk_start(&mut self, hdi: usize) -> bool {
        let scb = &self.scbs[hdi];
        if scb.channel != AvChannel::Audio || self.cb.audio_open_cnt < 2 {
            return false;
        }
        if scb.role.has(RoleFlags::ACP) && !self.cb.features.has(Features::ACP_START) {
            return false;
        }
        self.sync_flush_timeouts()
    }

    /// Retune the flush timeout of every started audio stream; returns whether any is started
    pub(super) fn sync_flush_timeouts(&mut self) -> bool {
        let count = self.cb.audio_open_cnt;
        let mut any = false;
        for scb in &mut self.scbs {
            if !scb.registered || scb.channel != AvChannel::Audio || scb.co_started == 0 {
                continue;
            }
            any = true;
            if scb.co_started != count {
                scb.co_started = count;
                let timeout = self.options.audio_flush_timeout(usize::from(count));
                self.platform.set_flush_timeout(scb.peer, timeout);
            }
        }
        any
    }

    /// Track streaming streams and ACL priority
    pub(super) fn stream_chg(&mut self, hdi: usize, started: bool) {
        let scb = &self.scbs[hdi];
        let (peer, channel) = (scb.peer, scb.channel);
        let bit = 1u8 << hdi;
        let streams = match channel {
            AvChannel::Audio => &mut self.cb.audio_streams,
            AvChannel::Video => &mut self.cb.video_streams,
        };
        if started {
            *streams |= bit;
            self.platform.set_acl_priority(peer, true);
            return;
        }
        *streams &= !bit;

        let no_streams = match channel {
            AvChannel::Audio => self.cb.video_streams == 0,
            AvChannel::Video => !self
                .scbs
                .iter()
                .enumerate()
                .any(|(i, s)| self.cb.audio_streams & (1 << i) != 0 && s.peer == peer),
        };
        if no_streams {
            self.platform.set_acl_priority(peer, false);
        }
    }

    /// Suspend streams for SCO, or restart them once SCO is gone
    pub(super) fn sco_change(&mut self, open: bool) {
        self.cb.sco_occupied = open;
        for hdi in 0..self.scbs.len() {
            let scb = &mut self.scbs[hdi];
            if !scb.registered {
                continue;
            }
            if open && scb.co_started > 0 && !scb.sco_suspend {
                debug!("[SSM] {} suspending for SCO", hdi);
                scb.sco_suspend = true;
                let stop = StopRequest {
                    suspend: true,
                    flush: false,
                };
                self.ssm_execute(hdi, StreamEvent::ApiStop(stop));
            } else if !open && scb.sco_suspend {
                debug!("[SSM] {} restarting after SCO", hdi);
                self.ssm_execute(hdi, StreamEvent::ApiStart);
            }
        }
    }

    pub(super) fn restored_policy(&self) -> LinkPolicy {
        let policy = LinkPolicy(LinkPolicy::SNIFF);
        if !self.cb.features.has(Features::MASTER) || self.cb.audio_open_cnt == 1 {
            policy.with(LinkPolicy::ROLE_SWITCH)
        } else {
            policy
        }
    }

    /// Begin a reconfiguration, in place when possible, otherwise by close and reopen
    pub(super) fn act_reconfig(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::ApiReconfig(req) = ev else {
            return;
        };
        let ReconfigRequest {
            codec_info,
            sep_info_idx,
            suspend,
            num_protect,
            protect_info,
        } = *req;
        self.stop_stream_timer(hdi);

        let scb = &mut self.scbs[hdi];
        scb.num_recfg = 0;
        let mut cap = scb.cfg;
        cap.codec_info = codec_info;
        cap.num_protect = num_protect;
        cap.protect_info = protect_info;
        cap.psc_mask = scb.cur_psc;
        scb.cap = Some(cap);
        scb.rcfg_idx = usize::from(sep_info_idx);
        let (avdt, started) = (scb.avdt_handle, scb.started);
        debug!(
            "[SSM] {} reconfig to idx {} (current {}), suspend {}",
            hdi, scb.rcfg_idx, scb.sep_info_idx, suspend
        );

        if scb.rcfg_idx == scb.sep_info_idx && suspend && scb.recfg_sup && scb.suspend_sup {
            if started {
                let stop = StopRequest {
                    suspend: true,
                    flush: false,
                };
                self.str_stopped(hdi, Some(stop));
            } else if let Err(e) = self.platform.reconfig_req(avdt, &cap) {
                warn!("[SSM] {} reconfig request failed: {:?}", hdi, e);
                self.close_for_reconfig(hdi);
            }
        } else {
            if started {
                self.str_stopped(hdi, None);
                self.scbs[hdi].started = false;
            }
            self.close_for_reconfig(hdi);
        }
    }

    fn close_for_reconfig(&mut self, hdi: usize) {
        let avdt = self.scbs[hdi].avdt_handle;
        self.platform.flush_media(avdt);
        if let Err(e) = self.platform.close_req(avdt) {
            warn!("[SSM] {} close request failed: {:?}", hdi, e);
            self.ssm_execute(hdi, StreamEvent::ApiClose);
        }
    }

    /// Reconfigured stream is open again
    pub(super) fn act_rcfg_str_ok(&mut self, hdi: usize) {
        self.act_st_rc_timer(hdi);
        let scb = &mut self.scbs[hdi];
        scb.cap = None;
        scb.role.remove(RoleFlags::ACP | RoleFlags::SUSPEND_OPT | RoleFlags::START_INT);
        let handle = scb.handle;
        info!("[SSM] {} reconfigured", hdi);
        self.emit(AvEvent::Reconfigured {
            handle,
            status: Status::Success,
        });
    }

    pub(super) fn act_rcfg_failed(&mut self, hdi: usize) {
        let retry = self.options.reconfig_retry;
        let scb = &mut self.scbs[hdi];
        scb.num_recfg += 1;
        if scb.num_recfg > retry {
            let handle = scb.handle;
            error!("[SSM] {} reconfig gave up", hdi);
            self.act_cco_close(hdi);
            self.emit(AvEvent::Reconfigured {
                handle,
                status: Status::FailStream,
            });
            self.ssm_execute(hdi, StreamEvent::ApiClose);
        } else {
            let peer = scb.peer;
            if let Err(e) = self.platform.disconnect_req(peer) {
                warn!("[SSM] {} disconnect request failed: {:?}", hdi, e);
                self.ssm_execute(hdi, StreamEvent::AvdtDisconnect);
            }
        }
    }

    /// Old stream closed during reconfiguration; reconnect
    pub(super) fn act_rcfg_connect(&mut self, hdi: usize) {
        let retry = self.options.reconfig_retry;
        let scb = &mut self.scbs[hdi];
        scb.cong = false;
        scb.num_recfg += 1;
        if scb.num_recfg > retry {
            self.act_rcfg_failed(hdi);
            return;
        }
        self.rcfg_reconnect(hdi);
    }

    /// Signalling dropped during reconfiguration
    pub(super) fn act_rcfg_discntd(&mut self, hdi: usize) {
        let retry = self.options.reconfig_retry;
        let scb = &mut self.scbs[hdi];
        scb.num_recfg += 1;
        if scb.num_recfg > retry {
            let handle = scb.handle;
            error!("[SSM] {} reconfig gave up after disconnect", hdi);
            self.emit(AvEvent::Reconfigured {
                handle,
                status: Status::FailStream,
            });
            self.ssm_execute(hdi, StreamEvent::StrDiscFail);
        } else {
            self.rcfg_reconnect(hdi);
        }
    }

    fn rcfg_reconnect(&mut self, hdi: usize) {
        let scb = &self.scbs[hdi];
        let (peer, sec_mask, handle) = (scb.peer, scb.sec_mask, scb.handle);
        if let Err(e) = self.platform.connect_req(peer, sec_mask, handle) {
            warn!("[SSM] {} reconnect failed: {:?}", hdi, e);
            self.ssm_execute(hdi, StreamEvent::AvdtDisconnect);
        }
    }

    /// Suspend for reconfiguration finished
    pub(super) fn act_suspend_cont(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::StrSuspendCfm { err, .. } = ev else {
            return;
        };
        let scb = &mut self.scbs[hdi];
        scb.started = false;
        scb.cong = false;
        let handle = scb.handle;
        match *err {
            avdt_err::NONE => {
                let avdt = scb.avdt_handle;
                let Some(cap) = scb.cap else {
                    self.close_for_reconfig(hdi);
                    return;
                };
                if let Err(e) = self.platform.reconfig_req(avdt, &cap) {
                    warn!("[SSM] {} reconfig request failed: {:?}", hdi, e);
                    self.close_for_reconfig(hdi);
                }
            }
            avdt_err::CONNECT => {
                self.emit(AvEvent::Reconfigured {
                    handle,
                    status: Status::Fail,
                });
                self.ssm_execute(hdi, StreamEvent::StrDiscFail);
            }
            other => {
                warn!("[SSM] {} suspend rejected ({=u8:#x}), closing instead", hdi, other);
                if other != avdt_err::TIMEOUT {
                    scb.suspend_sup = false;
                }
                self.close_for_reconfig(hdi);
            }
        }
    }

    /// Reconfiguration answered by the peer
    pub(super) fn act_rcfg_cfm(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::StrReconfigCfm { err, codec_info } = ev else {
            return;
        };
        let scb = &mut self.scbs[hdi];
        if *err != avdt_err::NONE {
            warn!("[SSM] {} reconfig rejected ({=u8:#x}), closing instead", hdi, err);
            if *err != avdt_err::TIMEOUT {
                scb.recfg_sup = false;
            }
            self.close_for_reconfig(hdi);
            return;
        }
        scb.cfg.codec_info = *codec_info;
        scb.codec_type = codec_info.codec_type_raw();
        let peer_mtu = scb.stream_mtu.saturating_add(AVDT_MEDIA_HDR_SIZE);
        self.ssm_execute(hdi, StreamEvent::StrOpenOk { peer_mtu });
    }

    /// Signalling is back during reconfiguration; reopen with the new configuration
    pub(super) fn act_rcfg_open(&mut self, hdi: usize) {
        let scb = &mut self.scbs[hdi];
        if scb.num_disc_snks == 0 {
            let (handle, codec_type) = (scb.handle, scb.codec_type);
            self.platform.co_stop(handle, codec_type);
            self.act_discover_req(hdi);
            return;
        }
        let Some(cap) = scb.cap else {
            warn!("[SSM] {} no configuration to reopen with", hdi);
            self.ssm_execute(hdi, StreamEvent::StrDiscFail);
            return;
        };
        scb.codec_type = cap.codec_info.codec_type_raw();
        scb.cfg.codec_info = cap.codec_info;
        let sep_handle = scb.find_sep_handle(Tsep::Source);
        scb.adjust_seps_idx(sep_handle);
        scb.sep_info_idx = scb.rcfg_idx;
        let seid = scb.sep_info.get(scb.sep_info_idx).map_or(0, |s| s.seid);
        let (avdt, peer) = (scb.avdt_handle, scb.peer);
        if let Err(e) = self.platform.open_req(avdt, peer, seid, &cap) {
            warn!("[SSM] {} reopen failed: {:?}", hdi, e);
            let err = match e {
                crate::AvError::Transport(code) => code,
                _ => avdt_err::BAD_STATE,
            };
            self.ssm_execute(hdi, StreamEvent::StrOpenFail { err });
        }
    }
}
