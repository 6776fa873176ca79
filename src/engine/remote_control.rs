//! AVRCP connection management.
//!
//! Remote-control blocks are indexed by the handle the remote-control transport assigns. One
//! listening acceptor is kept for peers that connect AVRCP without a stream (the RC-only link
//! slot); connections opened alongside a stream are bound to it through `shdl`.

use super::{AvEngine, Lcb, RcDiscTarget, Rcb};
use crate::avrc::{self, MetaOutcome, MetaResponse, RcData, RcMessage, ctype, rsp};
use crate::constants::{
    AVRC_REV_1_3, AVRC_REV_1_4, AVRC_SUPF_CT_BROWSE, MAX_LINKS, MAX_RCBS, MAX_STREAMS,
    RC_HANDLE_NONE, RC_ONLY_LINK_INDEX, uuid,
};
use crate::event::{AvEvent, Event, RcSdpRecord, StreamEvent, SystemEvent};
use crate::platform::Platform;
use crate::scb::{QueueTag, RoleFlags, WaitFlags};
use crate::{BluetoothAddress, Features, Status};
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

/// Features a peer advertises in its AVRC records of class `service_uuid`
fn peer_rc_features(records: &[RcSdpRecord], service_uuid: u16) -> Features {
    let mut features = 0u16;
    for record in records.iter().filter(|r| r.service_uuid == service_uuid) {
        if records.iter().any(|r| r.service_uuid == uuid::AV_REMOTE_CONTROL) {
            features |= Features::RCCT;
        }
        if records.iter().any(|r| r.service_uuid == uuid::AV_REM_CTRL_TARGET) {
            features |= Features::RCTG;
        }
        if record.version >= AVRC_REV_1_3 {
            features |= Features::VENDOR | Features::METADATA;
        }
        if record.version >= AVRC_REV_1_4 {
            features |= Features::ADV_CTRL;
            if record.categories & AVRC_SUPF_CT_BROWSE != 0 {
                features |= Features::BROWSE;
            }
        }
    }
    Features(features)
}

impl<P: Platform, M: RawMutex> AvEngine<'_, P, M> {
    /// Connection in use bound to stream `shdl` (`hdi + 1`, 0 for none)
    fn rcb_by_shdl(&self, shdl: u8) -> Option<usize> {
        self.rcbs.iter().position(|r| r.in_use() && r.shdl == shdl)
    }

    /// Block of a connected or listening handle
    fn rcb(&self, rc_handle: u8) -> Option<&Rcb> {
        self.rcbs.get(usize::from(rc_handle)).filter(|r| r.in_use())
    }

    /// Open an AVRCP connection: a listening acceptor, or an initiator towards stream `shdl`'s peer
    pub(super) fn rc_create(&mut self, acceptor: bool, shdl: u8, lidx: u8) -> u8 {
        let (peer, status) = if acceptor {
            if let Some(existing) = self.rcb_by_shdl(shdl) {
                debug!("[RC] acceptor for {} already exists", shdl);
                return self.rcbs[existing].handle;
            }
            (BluetoothAddress::NONE, Rcb::ROLE_ACP)
        } else {
            let Some(scb) = usize::from(shdl).checked_sub(1).and_then(|i| self.scbs.get(i)) else {
                return RC_HANDLE_NONE;
            };
            (scb.peer, 0)
        };

        let control = self.cb.features.0 & (Features::RCTG | Features::RCCT);
        let handle = match self.platform.rc_open(acceptor, peer, control) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("[RC] open failed: {:?}", e);
                return RC_HANDLE_NONE;
            }
        };
        let idx = usize::from(handle);
        if idx >= MAX_RCBS {
            error!("[RC] handle {} out of range", handle);
            self.platform.rc_close(handle);
            return RC_HANDLE_NONE;
        }
        if self.rcbs[idx].in_use() {
            warn!("[RC] duplicated handle {}", handle);
        }

        self.rcbs[idx] = Rcb {
            handle,
            status,
            shdl,
            lidx,
            peer_features: Features(0),
        };
        if lidx == RC_ONLY_LINK_INDEX {
            self.cb.rc_acp_handle = handle;
            self.cb.rc_acp_idx = handle + 1;
        }
        debug!(
            "[RC] created {} acceptor {}, shdl {}, lidx {}",
            handle, acceptor, shdl, lidx
        );
        handle
    }

    /// Close the connection of block `idx`; a connected acceptor keeps its block until it closes
    pub(super) fn del_rc(&mut self, idx: usize) {
        let Some(rcb) = self.rcbs.get(idx).copied().filter(Rcb::in_use) else {
            return;
        };
        if let Some(hdi) = usize::from(rcb.shdl).checked_sub(1)
            && hdi < MAX_STREAMS
        {
            if self.scbs[hdi].rc_handle == rcb.handle {
                self.scbs[hdi].rc_handle = RC_HANDLE_NONE;
            }
            self.stop_stream_timer(hdi);
        }
        debug!(
            "[RC] del {} status {=u8:#x}, acceptor handle {}",
            rcb.handle, rcb.status, self.cb.rc_acp_handle
        );
        if !rcb.is_connected() || !rcb.is_acceptor() {
            self.rcbs[idx] = Rcb::EMPTY;
        }
        self.platform.rc_close(rcb.handle);
        if rcb.handle == self.cb.rc_acp_handle {
            self.cb.rc_acp_handle = RC_HANDLE_NONE;
        }
    }

    /// Close stream-bound connections, or every connection while disabling
    pub(super) fn close_all_rc(&mut self) {
        for idx in 0..MAX_RCBS {
            if self.cb.disabling || self.rcbs[idx].shdl != 0 {
                self.del_rc(idx);
            }
        }
    }

    /// An AVRCP connection came up
    pub(super) fn rc_opened(&mut self, rc_handle: u8, peer: BluetoothAddress) {
        let mut shdl = 0u8;
        let mut disc = None;
        if let Some(hdi) = (0..self.scbs.len()).find(|&i| self.scbs[i].registered && self.scbs[i].peer == peer) {
            self.scbs[hdi].rc_handle = rc_handle;
            shdl = (hdi + 1) as u8;
            self.stop_stream_timer(hdi);
            disc = Some(RcDiscTarget::Stream(hdi));
        }

        let i = usize::from(rc_handle);
        if self.rcb(rc_handle).is_none() {
            error!("[RC] handle {} no longer valid", rc_handle);
            return;
        }

        if self.rcbs[i].lidx == RC_ONLY_LINK_INDEX
            && shdl != 0
            && let Some(other) = self.rcb_by_shdl(shdl)
        {
            // The listener accepted a stream's peer; the stream's own block becomes the listener.
            self.rcbs[other].shdl = self.rcbs[i].shdl;
            let lidx = self.rcbs[other].lidx;
            self.rcbs[other].lidx = self.rcbs[i].lidx;
            self.rcbs[i].lidx = lidx;
            self.cb.rc_acp_handle = self.rcbs[other].handle;
            self.cb.rc_acp_idx = (other + 1) as u8;
            debug!("[RC] listener moves to {}", self.cb.rc_acp_handle);
        }

        self.rcbs[i].shdl = shdl;
        self.rcbs[i].status |= Rcb::CONNECTED;

        if shdl == 0 && self.lcbs[MAX_LINKS].lidx == 0 {
            self.lcbs[MAX_LINKS] = Lcb {
                addr: peer,
                lidx: RC_ONLY_LINK_INDEX,
                conn_msk: 1,
            };
            self.rcbs[i].lidx = RC_ONLY_LINK_INDEX;
            disc = Some(RcDiscTarget::RcOnly(rc_handle));
        }

        let mut peer_features = self.rcbs[i].peer_features;
        let mut sdp_disc_done = true;
        if peer_features.0 == 0 {
            peer_features = Features(Features::RCCT);
            sdp_disc_done = false;
            if let Some(target) = disc {
                self.rc_disc(target);
            }
        }
        info!("[RC] {} opened to {}, shdl {}", rc_handle, peer, shdl);
        self.emit(AvEvent::RcOpened {
            rc_handle,
            peer,
            peer_features,
            status: Status::Success,
            sdp_disc_done,
        });
    }

    /// Start the AVRC service lookup unless one is running
    pub(super) fn rc_disc(&mut self, target: RcDiscTarget) {
        if self.cb.rc_disc.is_some() {
            debug!("[RC] lookup busy, {:?} skipped", target);
            return;
        }
        let peer = match target {
            RcDiscTarget::Stream(hdi) => self.scbs.get(hdi).map(|s| s.peer),
            RcDiscTarget::RcOnly(rc_handle) => self
                .rcb(rc_handle)
                .and_then(|r| usize::from(r.lidx).checked_sub(1))
                .map(|l| self.lcbs[l].addr),
        };
        let Some(peer) = peer else {
            return;
        };
        self.cb.rc_disc = Some(target);
        if let Err(e) = self.platform.find_avrc(peer) {
            warn!("[RC] lookup of {} failed to start: {:?}", peer, e);
            self.post(Event::System(SystemEvent::AvrcSdpDone(Vec::new())));
        }
    }

    /// AVRC service lookup finished: open a connection or report the peer's features
    pub(super) fn rc_disc_done(&mut self, records: &[RcSdpRecord]) {
        let Some(target) = self.cb.rc_disc.take() else {
            return;
        };
        let (rc_handle, stream, peer) = match target {
            RcDiscTarget::Stream(hdi) => {
                let scb = &self.scbs[hdi];
                if !scb.registered {
                    return;
                }
                (scb.rc_handle, Some(hdi), scb.peer)
            }
            RcDiscTarget::RcOnly(rc_handle) => (rc_handle, None, self.lcbs[MAX_LINKS].addr),
        };

        let remote = peer_rc_features(records, uuid::AV_REMOTE_CONTROL);
        let target_features = peer_rc_features(records, uuid::AV_REM_CTRL_TARGET);
        let peer_features = Features(remote.0 | target_features.0);
        debug!(
            "[RC] peer features {=u16:#x}, local {=u16:#x}",
            peer_features.0, self.cb.features.0
        );

        if rc_handle != RC_HANDLE_NONE {
            if let Some(rcb) = self.rcbs.get_mut(usize::from(rc_handle)) {
                rcb.peer_features = peer_features;
            }
            self.emit(AvEvent::RcFeatures {
                rc_handle,
                peer,
                peer_features,
            });
            return;
        }

        let Some(hdi) = stream else {
            return;
        };
        let local = self.cb.features;
        let matching = (local.has(Features::RCCT) && peer_features.has(Features::RCTG))
            || (local.has(Features::RCTG) && peer_features.has(Features::RCCT));
        if matching {
            match self.find_lcb(peer) {
                Some(l) => {
                    let lidx = self.lcbs[l].lidx;
                    let handle = self.rc_create(false, (hdi + 1) as u8, lidx);
                    if let Some(rcb) = self.rcbs.get_mut(usize::from(handle)) {
                        rcb.peer_features = peer_features;
                    }
                }
                None => error!("[RC] no link for {}", peer),
            }
        } else if self.scbs[hdi].use_rc {
            self.scbs[hdi].use_rc = false;
            self.emit(AvEvent::RcOpened {
                rc_handle: RC_HANDLE_NONE,
                peer,
                peer_features: Features(0),
                status: Status::FailSdp,
                sdp_disc_done: false,
            });
        }
    }

    /// An AVRCP connection went down
    pub(super) fn rc_closed(&mut self, rc_handle: u8, peer: BluetoothAddress) {
        let mut closed_peer = peer;
        let mut connected = false;
        for i in 0..MAX_RCBS {
            let rcb = self.rcbs[i];
            if !rcb.in_use() {
                continue;
            }
            if rcb.handle != rc_handle {
                connected |= rcb.is_connected();
                continue;
            }

            let r = &mut self.rcbs[i];
            r.status &= !Rcb::CONNECTED;
            r.peer_features = Features(0);
            if let Some(hdi) = usize::from(rcb.shdl).checked_sub(1) {
                if let Some(scb) = self.scbs.get_mut(hdi) {
                    closed_peer = scb.peer;
                    if scb.rc_handle == rc_handle {
                        scb.rc_handle = RC_HANDLE_NONE;
                    }
                }
                self.rcbs[i].shdl = 0;
            } else if rcb.lidx == RC_ONLY_LINK_INDEX {
                self.lcbs[MAX_LINKS] = Lcb::default();
            }
            self.rcbs[i].lidx = 0;

            if rcb.is_acceptor() {
                self.del_rc(i);
                if self.cb.rc_acp_handle == RC_HANDLE_NONE && self.cb.features.has(Features::RCTG) {
                    self.rc_create(true, 0, RC_ONLY_LINK_INDEX);
                }
            } else {
                self.rcbs[i] = Rcb::EMPTY;
            }
        }

        if !connected {
            self.rc_none();
        }
        info!("[RC] {} closed", rc_handle);
        self.emit(AvEvent::RcClosed {
            rc_handle,
            peer: closed_peer,
        });
    }

    /// Application asks to close a connection
    pub(super) fn rc_close(&mut self, rc_handle: u8) {
        let Some(rcb) = self.rcb(rc_handle).copied() else {
            return;
        };
        debug!("[RC] closing {} status {=u8:#x}", rc_handle, rcb.status);
        if let Some(hdi) = usize::from(rcb.shdl).checked_sub(1)
            && hdi < MAX_STREAMS
        {
            self.stop_stream_timer(hdi);
        }
        self.platform.rc_close(rcb.handle);
    }

    pub(super) fn remote_cmd(&mut self, rc_handle: u8, label: u8, op_id: u8, pressed: bool) {
        if !self.cb.features.has(Features::RCCT) {
            return;
        }
        if let Some(rcb) = self.rcb(rc_handle).copied()
            && rcb.is_connected()
        {
            self.platform.rc_pass_cmd(rcb.handle, label, op_id, pressed);
        }
    }

    pub(super) fn vendor_cmd(&mut self, rc_handle: u8, label: u8, ctype: u8, data: &RcData) {
        if !self.cb.features.has(Features::RCCT | Features::VENDOR) {
            return;
        }
        if let Some(rcb) = self.rcb(rc_handle).copied() {
            self.platform.rc_vendor_cmd(rcb.handle, label, ctype, data);
        }
    }

    pub(super) fn vendor_rsp(&mut self, rc_handle: u8, label: u8, rsp_code: u8, data: &RcData) {
        if !self.cb.features.has(Features::RCTG | Features::VENDOR) {
            return;
        }
        if let Some(rcb) = self.rcb(rc_handle).copied() {
            let company_id = self.options.company_id;
            self.platform
                .rc_vendor_rsp(rcb.handle, label, rsp_code, company_id, data);
        }
    }

    /// Metadata response (target side) or command (controller side)
    pub(super) fn meta_rsp(&mut self, rc_handle: u8, label: u8, is_rsp: bool, code: u8, response: &MetaResponse) {
        let features = self.cb.features;
        let allowed = features.has(Features::METADATA)
            && ((is_rsp && features.has(Features::RCTG)) || (!is_rsp && features.has(Features::RCCT)));
        if !allowed {
            debug!("[RC] metadata message dropped, features {=u16:#x}", features.0);
            return;
        }
        if let Some(rcb) = self.rcb(rc_handle).copied() {
            self.platform.rc_msg_req(rcb.handle, label, code, response);
        }
    }

    /// A message arrived on a connection
    pub(super) fn rc_msg(&mut self, rc_handle: u8, label: u8, msg: RcMessage) {
        match msg {
            RcMessage::PassThrough(pass) => self.rc_pass_through(rc_handle, label, &pass),
            RcMessage::Vendor(vendor) => self.rc_vendor(rc_handle, label, vendor),
        }
    }

    fn rc_pass_through(&mut self, rc_handle: u8, label: u8, pass: &avrc::PassThrough) {
        let (op_id, pressed) = (pass.op_id, pass.pressed);
        match pass.ctype {
            ctype::CTRL | ctype::SPEC_INQ | ctype::GEN_INQ => {
                let inquiry = pass.ctype != ctype::CTRL;
                let code = if op_id == avrc::ID_VENDOR {
                    if self.cb.features.has(Features::METADATA) {
                        avrc::group_navigation_response(&pass.data, self.options.avrc_group, inquiry)
                    } else {
                        rsp::NOT_IMPL
                    }
                } else {
                    let supported = self.platform.rc_op_supported(op_id);
                    avrc::op_response(supported, inquiry)
                };
                trace!("[RC] pass-through {=u8:#x} answered {=u8:#x}", op_id, code);
                if code != rsp::INTERIM {
                    self.platform.rc_pass_rsp(rc_handle, label, code, op_id, pressed);
                }
                if code == rsp::ACCEPT || code == rsp::INTERIM {
                    self.emit(AvEvent::RemoteCmd {
                        rc_handle,
                        label,
                        op_id,
                        pressed,
                    });
                }
            }
            rsp::NOT_IMPL => {}
            code if code >= rsp::ACCEPT => self.emit(AvEvent::RemoteRsp {
                rc_handle,
                label,
                op_id,
                pressed,
                rsp_code: code,
            }),
            _ => self.platform.rc_pass_rsp(rc_handle, label, rsp::REJ, op_id, pressed),
        }
    }

    fn rc_vendor(&mut self, rc_handle: u8, label: u8, msg: avrc::VendorMessage) {
        let features = self.cb.features;
        let vendor = features.has(Features::VENDOR);
        let metadata = features.has(Features::METADATA) && msg.company_id == avrc::CO_METADATA;
        let command = avrc::is_command(msg.ctype);

        if vendor && command {
            if !metadata {
                self.emit(AvEvent::VendorCmd {
                    rc_handle,
                    label,
                    code: msg.ctype,
                    company_id: msg.company_id,
                    data: msg.data,
                });
                return;
            }
            let events = self.platform.rc_supported_events();
            match avrc::process_meta_command(&msg, self.options.company_id, &events) {
                MetaOutcome::Respond { ctype, response } => {
                    debug!("[RC] metadata pdu answered locally with {=u8:#x}", ctype);
                    self.platform.rc_msg_req(rc_handle, label, ctype, &response);
                }
                MetaOutcome::Forward => self.emit(AvEvent::MetaMsg {
                    rc_handle,
                    label,
                    code: msg.ctype,
                    company_id: msg.company_id,
                    data: msg.data,
                }),
                MetaOutcome::NotImplemented => {
                    self.platform
                        .rc_vendor_rsp(rc_handle, label, rsp::NOT_IMPL, msg.company_id, &msg.data);
                }
            }
        } else if vendor && msg.ctype >= rsp::ACCEPT {
            let (code, company_id, data) = (msg.ctype, msg.company_id, msg.data);
            let event = if metadata {
                AvEvent::MetaMsg {
                    rc_handle,
                    label,
                    code,
                    company_id,
                    data,
                }
            } else {
                AvEvent::VendorRsp {
                    rc_handle,
                    label,
                    code,
                    company_id,
                    data,
                }
            };
            self.emit(event);
        } else if !vendor && command {
            let code = if msg.data.first() == Some(&avrc::pdu::INVALID) {
                rsp::REJ
            } else {
                rsp::NOT_IMPL
            };
            self.platform
                .rc_vendor_rsp(rc_handle, label, code, msg.company_id, &msg.data);
        }
    }

    /// Stream timer fired in OPEN: finish a deferred start, or bring up AVRCP for the stream
    pub(super) fn act_open_rc(&mut self, hdi: usize) {
        let scb = &self.scbs[hdi];
        debug!(
            "[RC] {} open, use_rc {}, wait {=u8:#x}, role {=u8:#x}",
            hdi, scb.use_rc, scb.wait.0, scb.role.0
        );
        if scb.wait.has(WaitFlags::ROLE_SW_BITS) && scb.q_tag == QueueTag::Start {
            if self.link_role_ok(hdi, 1) {
                if usize::from(self.cb.rs_idx) == hdi + 1 {
                    self.cb.rs_idx = 0;
                }
                self.start_ok(hdi, crate::event::SwitchResult::Ok);
            } else {
                error!("[ROLE] {} cannot start streaming, role switch failed", hdi);
                self.stop_stream_timer(hdi);
                let scb = &mut self.scbs[hdi];
                scb.wait.remove(WaitFlags::ROLE_SW_BITS);
                let handle = scb.handle;
                self.emit(AvEvent::Started {
                    handle,
                    status: Status::FailRole,
                    initiator: true,
                    suspending: false,
                });
            }
            return;
        }

        let scb = &mut self.scbs[hdi];
        if scb.use_rc || scb.role.has(RoleFlags::ACP) {
            if self.cb.rc_disc.is_none() {
                self.rc_disc(RcDiscTarget::Stream(hdi));
            } else if scb.rc_handle == RC_HANDLE_NONE {
                if scb.wait.has(WaitFlags::ROLE_SW_BITS) {
                    scb.wait.insert(WaitFlags::CHECK_RC);
                } else {
                    let ms = self.options.rc_disc_time_ms;
                    self.start_stream_timer(hdi, ms, StreamEvent::AvrcTimer);
                }
            }
        } else if scb.rc_handle != RC_HANDLE_NONE {
            let rc_handle = scb.rc_handle;
            debug!("[RC] {} does not want remote control, closing {}", hdi, rc_handle);
            self.platform.rc_close(rc_handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec;

    fn record(service_uuid: u16, version: u16, categories: u16) -> RcSdpRecord {
        RcSdpRecord {
            service_uuid,
            version,
            categories,
        }
    }

    #[test]
    fn test_peer_features_from_versions() {
        let records: Vec<RcSdpRecord, 4> = Vec::from_slice(&[
            record(uuid::AV_REMOTE_CONTROL, AVRC_REV_1_3, 0),
            record(uuid::AV_REM_CTRL_TARGET, AVRC_REV_1_4, AVRC_SUPF_CT_BROWSE),
        ])
        .unwrap();

        let ct = peer_rc_features(&records, uuid::AV_REMOTE_CONTROL);
        assert!(ct.has(Features::RCCT | Features::RCTG | Features::VENDOR | Features::METADATA));
        assert!(!ct.any(Features::ADV_CTRL | Features::BROWSE));

        let tg = peer_rc_features(&records, uuid::AV_REM_CTRL_TARGET);
        assert!(tg.has(Features::ADV_CTRL | Features::BROWSE));
    }

    #[test]
    fn test_peer_features_without_records() {
        assert_eq!(peer_rc_features(&[], uuid::AV_REMOTE_CONTROL), Features(0));
        let old = [record(uuid::AV_REM_CTRL_TARGET, 0x0100, 0)];
        assert_eq!(
            peer_rc_features(&old, uuid::AV_REM_CTRL_TARGET),
            Features(Features::RCTG)
        );
    }
}
