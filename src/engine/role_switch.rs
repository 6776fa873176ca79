//! Role-switch coordination.
//!
//! A source that streams to more than one sink wants to be master on every link. Before an open
//! proceeds, the other connected links are asked to switch; the opening stream then waits as the
//! single recorded waiter (`rs_idx`) until the role change arrives. Streams that find the slot
//! taken retry from their watchdog timer.

use super::AvEngine;
use crate::constants::{HCI_ERR_NO_CONNECTION, uuid};
use crate::event::{AvEvent, Event, OpenRequest, StreamEvent, SwitchResult, SystemEvent};
use crate::platform::Platform;
use crate::scb::{QueueTag, RoleFlags, WaitFlags};
use crate::ssm::StreamState;
use crate::{BluetoothAddress, Features, LinkPolicy, LinkRole, Status};
use embassy_sync::blocking_mutex::raw::RawMutex;

/// Number of set bits, saturated at 2
const fn bits_set(mask: u8) -> u8 {
    match mask.count_ones() {
        0 => 0,
        1 => 1,
        _ => 2,
    }
}

impl<P: Platform, M: RawMutex> AvEngine<'_, P, M> {
    pub(super) fn act_do_disc(&mut self, hdi: usize, ev: &StreamEvent) {
        if let StreamEvent::ApiOpen(req) = ev {
            self.do_disc(hdi, *req);
        }
    }

    /// Admission gate for an open, then the A2DP service lookup
    pub(super) fn do_disc(&mut self, hdi: usize, req: OpenRequest) {
        debug!(
            "[ROLE] {} open, use_rc {}, switch {:?}, audio open {}",
            hdi, req.use_rc, req.switch_res, self.cb.audio_open_cnt
        );
        let scb = &mut self.scbs[hdi];
        scb.open_api = req;
        scb.save_addr(req.peer);

        let proceed = match req.switch_res {
            SwitchResult::None => {
                if self.switch_if_needed(hdi) || !self.link_role_ok(hdi, 2) {
                    let scb = &mut self.scbs[hdi];
                    scb.wait.insert(WaitFlags::ROLE_SW_RES_OPEN);
                    scb.q_tag = QueueTag::Open;
                    false
                } else {
                    true
                }
            }
            SwitchResult::Fail => {
                self.scbs[hdi].open_status = Status::FailRole;
                self.ssm_execute(hdi, StreamEvent::SdpDiscFail);
                false
            }
            SwitchResult::Ok => {
                if self.link_role_ok(hdi, 2) {
                    true
                } else {
                    self.scbs[hdi].wait.insert(WaitFlags::ROLE_SW_RES_OPEN);
                    false
                }
            }
            SwitchResult::Done => true,
        };
        if !proceed {
            return;
        }

        if let Some(busy) = self.cb.a2dp_disc
            && busy != hdi
        {
            debug!("[ROLE] {} service lookup busy with {}, retrying", hdi, busy);
            self.scbs[hdi].q_tag = QueueTag::Open;
            let ms = self.options.rs_time_ms;
            self.start_stream_timer(hdi, ms, StreamEvent::AvrcTimer);
            return;
        }

        let scb = &mut self.scbs[hdi];
        scb.wait.remove(WaitFlags::ROLE_SW_BITS);
        scb.q_tag = QueueTag::None;
        if scb.wait.has(WaitFlags::CHECK_RC) {
            scb.wait.remove(WaitFlags::CHECK_RC);
            let ms = self.options.rc_disc_time_ms;
            self.start_stream_timer(hdi, ms, StreamEvent::AvrcTimer);
        }

        if self.cb.features.has(Features::MASTER) {
            self.platform.set_desired_role_allow(false);
            if self.cb.audio_open_cnt == 1 {
                self.platform
                    .set_default_policy(LinkPolicy(LinkPolicy::ROLE_SWITCH), false);
            }
        }

        let scb = &mut self.scbs[hdi];
        scb.sec_mask = req.sec_mask;
        scb.use_rc = req.use_rc;
        scb.uuid_int = req.uuid;
        scb.disc_db = true;
        self.cb.a2dp_disc = Some(hdi);

        let sdp_uuid = match req.uuid {
            uuid::AUDIO_SINK => uuid::AUDIO_SOURCE,
            uuid::VIDEO_SINK => uuid::VIDEO_SOURCE,
            uuid::VIDEO_SOURCE => uuid::VIDEO_SINK,
            _ => uuid::AUDIO_SINK,
        };
        info!("[ROLE] {} looking up {=u16:#x}", hdi, sdp_uuid);
        if let Err(e) = self.platform.find_a2dp(sdp_uuid, req.peer) {
            warn!("[ROLE] {} service lookup failed to start: {:?}", hdi, e);
            self.post(Event::System(SystemEvent::A2dpSdpResult {
                found: false,
                avdt_version: 0,
            }));
        }
    }

    /// Ask every other connected link to make us master; true when the open has to wait
    pub(super) fn switch_if_needed(&mut self, hdi: usize) -> bool {
        for i in 0..self.scbs.len() {
            let mask = 1u8 << i;
            let other = &self.scbs[i];
            if i == hdi || !other.registered || (self.cb.conn_audio | self.cb.conn_video) & mask == 0 {
                continue;
            }
            let peer = other.peer;
            if self.platform.link_role(peer) == Some(LinkRole::Master) {
                continue;
            }

            if self.cb.rs_idx != 0 && usize::from(self.cb.rs_idx) != hdi + 1 {
                debug!("[ROLE] {} switch slot held by {}, retrying later", hdi, self.cb.rs_idx - 1);
                let ms = self.options.rs_time_ms;
                self.start_stream_timer(hdi, ms, StreamEvent::AvrcTimer);
                return true;
            }

            if self.cb.features.has(Features::MASTER) {
                self.platform
                    .set_link_policy(peer, LinkPolicy(LinkPolicy::ROLE_SWITCH), false);
            }
            info!("[ROLE] {} asks the link of {} to switch", hdi, i);
            if let Err(e) = self.platform.switch_role(peer, LinkRole::Master) {
                warn!("[ROLE] switch could not start: {:?}", e);
                let ms = self.options.rs_time_ms;
                self.start_stream_timer(hdi, ms, StreamEvent::AvrcTimer);
            }
            self.cb.rs_idx = (hdi + 1) as u8;
            return true;
        }
        false
    }

    /// Whether our role on the stream's own link is acceptable with `bits` other audio links.
    ///
    /// When it is not, a switch is requested and `ROLE_SW_RES_START` is set.
    pub(super) fn link_role_ok(&mut self, hdi: usize, bits: u8) -> bool {
        let peer = self.scbs[hdi].peer;
        let Some(role) = self.platform.link_role(peer) else {
            return true;
        };
        let master_feature = self.cb.features.has(Features::MASTER);
        if role == LinkRole::Master || (bits_set(self.cb.conn_audio) <= bits && !master_feature) {
            return true;
        }

        if master_feature {
            self.platform
                .set_link_policy(peer, LinkPolicy(LinkPolicy::ROLE_SWITCH), false);
        }
        let slot_taken = self.cb.rs_idx != 0 && usize::from(self.cb.rs_idx) != hdi + 1;
        let started = !slot_taken && self.platform.switch_role(peer, LinkRole::Master).is_ok();
        if started {
            info!("[ROLE] {} asks its own link to switch", hdi);
            self.cb.rs_idx = (hdi + 1) as u8;
        } else {
            debug!("[ROLE] {} own link switch postponed", hdi);
            let ms = self.options.rs_time_ms;
            self.start_stream_timer(hdi, ms, StreamEvent::AvrcTimer);
        }
        self.scbs[hdi].wait.insert(WaitFlags::ROLE_SW_RES_START);
        false
    }

    /// Watchdog fired while an open waits for a role switch: try again
    pub(super) fn act_switch_role(&mut self, hdi: usize) {
        let scb = &mut self.scbs[hdi];
        if scb.q_tag != QueueTag::Open {
            trace!("[ROLE] {} stale retry timer", hdi);
            return;
        }
        if scb.wait.has(WaitFlags::ROLE_SW_RES_START) {
            scb.wait.insert(WaitFlags::ROLE_SW_RETRY);
        }
        scb.wait
            .remove(WaitFlags::ROLE_SW_RES_OPEN | WaitFlags::ROLE_SW_RES_START);

        if self.switch_if_needed(hdi) || !self.link_role_ok(hdi, 2) {
            self.scbs[hdi].wait.insert(WaitFlags::ROLE_SW_RES_OPEN);
            return;
        }
        if usize::from(self.cb.rs_idx) == hdi + 1 {
            self.cb.rs_idx = 0;
        }
        let scb = &mut self.scbs[hdi];
        scb.wait.remove(WaitFlags::ROLE_SW_RETRY);
        scb.q_tag = QueueTag::None;
        let mut req = scb.open_api;
        req.switch_res = SwitchResult::Done;
        self.do_disc(hdi, req);
    }

    /// Role change on the stream's own link
    pub(super) fn act_role_res(&mut self, hdi: usize, ev: &StreamEvent) {
        let StreamEvent::RoleChange { hci_status, .. } = ev else {
            return;
        };
        if usize::from(self.cb.rs_idx) == hdi + 1 {
            self.cb.rs_idx = 0;
        }
        let scb = &mut self.scbs[hdi];
        let initiator = scb.role.has(RoleFlags::START_INT);
        debug!("[ROLE] {} result {=u8:#x}, q_tag {:?}, wait {=u8:#x}", hdi, hci_status, scb.q_tag, scb.wait.0);

        match scb.q_tag {
            QueueTag::Start if scb.wait.has(WaitFlags::ROLE_SW_STARTED) => {
                scb.wait.remove(WaitFlags::ROLE_SW_BITS);
                if *hci_status == 0 {
                    self.start_ok(hdi, SwitchResult::Ok);
                } else {
                    scb.role.remove(RoleFlags::START_INT);
                    let handle = scb.handle;
                    self.emit(AvEvent::Started {
                        handle,
                        status: Status::FailRole,
                        initiator,
                        suspending: false,
                    });
                }
            }
            QueueTag::Start if scb.wait.has(WaitFlags::ROLE_SW_RES_START) => {
                scb.wait.insert(WaitFlags::ROLE_SW_FAILED);
            }
            QueueTag::Open if scb.wait.has(WaitFlags::ROLE_SW_RES_OPEN) => {
                scb.role.remove(RoleFlags::START_INT);
                scb.wait.remove(WaitFlags::ROLE_SW_BITS);
                if *hci_status == 0 {
                    let mut req = scb.open_api;
                    req.switch_res = SwitchResult::Done;
                    self.do_disc(hdi, req);
                } else {
                    scb.open_status = Status::FailRole;
                    self.ssm_execute(hdi, StreamEvent::SdpDiscFail);
                }
            }
            QueueTag::Open => {
                warn!("[ROLE] {} unexpected role change, wait {=u8:#x}", hdi, scb.wait.0);
            }
            _ => {}
        }
    }

    /// Role change indication from the link layer
    pub(super) fn role_changed(&mut self, peer: BluetoothAddress, new_role: LinkRole, hci_status: u8) {
        info!("[ROLE] {} is now {:?}, status {=u8:#x}", peer, new_role, hci_status);
        self.emit(AvEvent::RoleChanged {
            peer,
            new_role,
            hci_status,
        });

        // A waiter switching its own link keeps the slot until that link reports.
        let waiter = self.cb.rs_idx;
        let own_link_pending = waiter != 0
            && self.scbs.get(usize::from(waiter - 1)).is_some_and(|s| {
                s.wait.has(WaitFlags::ROLE_SW_RES_START) && s.peer != peer
            });
        if own_link_pending {
            debug!("[ROLE] {} still waits for its own link", waiter - 1);
        } else {
            self.cb.rs_idx = 0;
        }

        let mut peer_idx = 0u8;
        for hdi in 0..self.scbs.len() {
            let scb = &self.scbs[hdi];
            if !scb.registered || scb.peer != peer {
                continue;
            }
            peer_idx = (hdi + 1) as u8;
            if matches!(scb.state, StreamState::Opening | StreamState::Open) {
                self.ssm_execute(hdi, StreamEvent::RoleChange { hci_status, new_role });
            }
        }

        if hci_status != 0 && self.platform.link_role(peer) == Some(LinkRole::Slave) {
            self.platform
                .set_link_policy(peer, LinkPolicy(LinkPolicy::ROLE_SWITCH), true);
        }

        if waiter == 0 || waiter == peer_idx || own_link_pending {
            return;
        }
        let hdi = usize::from(waiter - 1);
        let Some(scb) = self.scbs.get_mut(hdi) else {
            return;
        };
        if !scb.registered || scb.q_tag != QueueTag::Open {
            return;
        }
        let mut req = scb.open_api;
        req.switch_res = if hci_status == 0 || hci_status == HCI_ERR_NO_CONNECTION {
            SwitchResult::Ok
        } else {
            SwitchResult::Fail
        };
        debug!("[ROLE] resuming open of {} with {:?}", hdi, req.switch_res);
        self.do_disc(hdi, req);
    }
}
