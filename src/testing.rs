//! Recording collaborator bundle for unit tests
//!
//! Every request the engine makes is appended to `calls`, every upcall to `events`. Timers are
//! kept armed in `timers` until a test fires them by hand.

extern crate std;

use crate::avrc::{MetaResponse, RcData};
use crate::codec::{CodecInfo, StreamConfig, Tsep};
use crate::event::{AvEvent, Event, LocalSepConfig};
use crate::platform::{
    AppCallback, CodecCallout, LinkControl, MediaPath, RemoteControl, ServiceDiscovery, TimerService, TimerSlot,
    Transport,
};
use crate::{AvError, AvHandle, BluetoothAddress, LinkPolicy, LinkRole};
use std::collections::VecDeque;
use std::vec::Vec;

/// A request the engine made of its collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RegisterAvdt,
    DeregisterAvdt,
    CreateStream(AvHandle),
    RemoveStream(u8),
    ConnectReq(BluetoothAddress),
    DisconnectReq(BluetoothAddress),
    DiscoverReq(BluetoothAddress),
    GetCaps { seid: u8, all: bool },
    OpenReq { avdt_handle: u8, seid: u8 },
    ConfigRsp { avdt_handle: u8, err: u8 },
    StartReq(u8),
    SuspendReq(u8),
    CloseReq(u8),
    ReconfigReq(u8),
    SecurityReq(u8),
    SecurityRsp { err: u8 },
    DelayReport(u16),
    SetDelayValue(u16),
    WriteMedia { avdt_handle: u8, timestamp: u32 },
    FlushMedia(u8),
    SwitchRole(BluetoothAddress),
    LinkPolicy { peer: BluetoothAddress, policy: LinkPolicy, enable: bool },
    DefaultPolicy { policy: LinkPolicy, enable: bool },
    DesiredRoleAllow(bool),
    FlushTimeout { peer: BluetoothAddress, timeout: u16 },
    AclPriority { peer: BluetoothAddress, high: bool },
    FindA2dp(u16),
    FindAvrc(BluetoothAddress),
    AddRecord { uuid: u16, categories: u16 },
    UpdateCategories { categories: u16 },
    DeleteRecord(u32),
    RegisterAvct,
    DeregisterAvct,
    RcOpen { acceptor: bool, handle: u8 },
    RcClose(u8),
    RcPassCmd { op_id: u8 },
    RcPassRsp { code: u8, op_id: u8 },
    RcVendorCmd,
    RcVendorRsp { code: u8 },
    RcMsgReq { ctype: u8, pdu: u8 },
    CoDiscRes { num_snks: u8 },
    CoSetcfg { seid: u8 },
    CoOpen { mtu: u16 },
    CoClose,
    CoStart,
    CoStop,
    CoDelay(u16),
    CoDropped(AvHandle),
}

/// Collaborators that record everything and answer from configurable knobs
#[derive(Debug)]
pub struct MockPlatform {
    pub events: Vec<AvEvent>,
    pub calls: Vec<Call>,
    pub timers: Vec<(TimerSlot, u32, Event)>,
    pub roles: Vec<(BluetoothAddress, LinkRole)>,
    pub switch_fails: bool,
    pub rejected_seids: Vec<u8>,
    pub queued_buffers: u8,
    pub frames: VecDeque<(u32, u32)>,
    pub max_endpoints: u8,
    pub rc_open_fails: bool,
    pub avrc_lookup_fails: bool,
    pub unsupported_ops: Vec<u8>,
    next_avdt: u8,
    next_rc: u8,
    next_record: u32,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            calls: Vec::new(),
            timers: Vec::new(),
            roles: Vec::new(),
            switch_fails: false,
            rejected_seids: Vec::new(),
            queued_buffers: 0,
            frames: VecDeque::new(),
            max_endpoints: 8,
            rc_open_fails: false,
            avrc_lookup_fails: false,
            unsupported_ops: Vec::new(),
            next_avdt: 1,
            next_rc: 0,
            next_record: 0x1_0000,
        }
    }
}

impl MockPlatform {
    /// Number of recorded calls matching `pred`
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Whether `call` was recorded
    pub fn called(&self, call: &Call) -> bool {
        self.calls.contains(call)
    }

    /// Number of upcalls matching `pred`
    pub fn count_events(&self, pred: impl Fn(&AvEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    /// Most recent upcall
    pub fn last_event(&self) -> Option<&AvEvent> {
        self.events.last()
    }

    /// Set the local role on the link to `peer`
    pub fn set_role(&mut self, peer: BluetoothAddress, role: LinkRole) {
        self.roles.retain(|(p, _)| *p != peer);
        self.roles.push((peer, role));
    }

    /// Disarm `slot` and return the event it would have posted
    pub fn fire(&mut self, slot: TimerSlot) -> Option<Event> {
        let pos = self.timers.iter().position(|(s, _, _)| *s == slot)?;
        Some(self.timers.remove(pos).2)
    }

    /// Whether `slot` is armed
    pub fn armed(&self, slot: TimerSlot) -> bool {
        self.timers.iter().any(|(s, _, _)| *s == slot)
    }
}

impl Transport for MockPlatform {
    fn register_avdt(&mut self, _sec_mask: u8) -> Result<(), AvError> {
        self.calls.push(Call::RegisterAvdt);
        Ok(())
    }

    fn deregister_avdt(&mut self) {
        self.calls.push(Call::DeregisterAvdt);
    }

    fn create_stream(&mut self, handle: AvHandle, _sep: &LocalSepConfig) -> Result<u8, AvError> {
        if self.next_avdt > self.max_endpoints {
            return Err(AvError::NoResources);
        }
        self.calls.push(Call::CreateStream(handle));
        let avdt = self.next_avdt;
        self.next_avdt += 1;
        Ok(avdt)
    }

    fn remove_stream(&mut self, avdt_handle: u8) {
        self.calls.push(Call::RemoveStream(avdt_handle));
    }

    fn connect_req(&mut self, peer: BluetoothAddress, _sec_mask: u8, _handle: AvHandle) -> Result<(), AvError> {
        self.calls.push(Call::ConnectReq(peer));
        Ok(())
    }

    fn disconnect_req(&mut self, peer: BluetoothAddress) -> Result<(), AvError> {
        self.calls.push(Call::DisconnectReq(peer));
        Ok(())
    }

    fn discover_req(&mut self, peer: BluetoothAddress, _handle: AvHandle) -> Result<(), AvError> {
        self.calls.push(Call::DiscoverReq(peer));
        Ok(())
    }

    fn get_caps_req(&mut self, _peer: BluetoothAddress, seid: u8, all: bool, _handle: AvHandle) -> Result<(), AvError> {
        self.calls.push(Call::GetCaps { seid, all });
        Ok(())
    }

    fn open_req(
        &mut self,
        avdt_handle: u8,
        _peer: BluetoothAddress,
        seid: u8,
        _cfg: &StreamConfig,
    ) -> Result<(), AvError> {
        self.calls.push(Call::OpenReq { avdt_handle, seid });
        Ok(())
    }

    fn config_rsp(&mut self, avdt_handle: u8, _label: u8, err: u8, _category: u8) {
        self.calls.push(Call::ConfigRsp { avdt_handle, err });
    }

    fn start_req(&mut self, avdt_handle: u8) -> Result<(), AvError> {
        self.calls.push(Call::StartReq(avdt_handle));
        Ok(())
    }

    fn suspend_req(&mut self, avdt_handle: u8) -> Result<(), AvError> {
        self.calls.push(Call::SuspendReq(avdt_handle));
        Ok(())
    }

    fn close_req(&mut self, avdt_handle: u8) -> Result<(), AvError> {
        self.calls.push(Call::CloseReq(avdt_handle));
        Ok(())
    }

    fn reconfig_req(&mut self, avdt_handle: u8, _cfg: &StreamConfig) -> Result<(), AvError> {
        self.calls.push(Call::ReconfigReq(avdt_handle));
        Ok(())
    }

    fn security_req(&mut self, avdt_handle: u8, _data: &[u8]) -> Result<(), AvError> {
        self.calls.push(Call::SecurityReq(avdt_handle));
        Ok(())
    }

    fn security_rsp(&mut self, _avdt_handle: u8, _label: u8, err: u8, _data: &[u8]) {
        self.calls.push(Call::SecurityRsp { err });
    }

    fn delay_report(&mut self, _avdt_handle: u8, _seid: u8, delay: u16) -> Result<(), AvError> {
        self.calls.push(Call::DelayReport(delay));
        Ok(())
    }

    fn set_delay_value(&mut self, delay: u16) {
        self.calls.push(Call::SetDelayValue(delay));
    }
}

impl MediaPath for MockPlatform {
    type Frame = u32;

    fn next_frame(&mut self, _codec_type: u8) -> Option<(u32, u32)> {
        self.frames.pop_front()
    }

    fn write_media(&mut self, avdt_handle: u8, _frame: u32, timestamp: u32, _m_pt: u8, _no_rtp: bool) {
        self.calls.push(Call::WriteMedia {
            avdt_handle,
            timestamp,
        });
    }

    fn queued_buffers(&mut self, _avdt_handle: u8) -> u8 {
        self.queued_buffers
    }

    fn flush_media(&mut self, avdt_handle: u8) {
        self.calls.push(Call::FlushMedia(avdt_handle));
    }
}

impl LinkControl for MockPlatform {
    fn link_role(&mut self, peer: BluetoothAddress) -> Option<LinkRole> {
        self.roles.iter().find(|(p, _)| *p == peer).map(|(_, r)| *r)
    }

    fn switch_role(&mut self, peer: BluetoothAddress, _role: LinkRole) -> Result<(), AvError> {
        if self.switch_fails {
            return Err(AvError::NoResources);
        }
        self.calls.push(Call::SwitchRole(peer));
        Ok(())
    }

    fn set_link_policy(&mut self, peer: BluetoothAddress, policy: LinkPolicy, enable: bool) {
        self.calls.push(Call::LinkPolicy { peer, policy, enable });
    }

    fn set_default_policy(&mut self, policy: LinkPolicy, enable: bool) {
        self.calls.push(Call::DefaultPolicy { policy, enable });
    }

    fn set_desired_role_allow(&mut self, allow: bool) {
        self.calls.push(Call::DesiredRoleAllow(allow));
    }

    fn set_flush_timeout(&mut self, peer: BluetoothAddress, timeout: u16) {
        self.calls.push(Call::FlushTimeout { peer, timeout });
    }

    fn set_acl_priority(&mut self, peer: BluetoothAddress, high: bool) {
        self.calls.push(Call::AclPriority { peer, high });
    }
}

impl ServiceDiscovery for MockPlatform {
    fn find_a2dp(&mut self, uuid: u16, _peer: BluetoothAddress) -> Result<(), AvError> {
        self.calls.push(Call::FindA2dp(uuid));
        Ok(())
    }

    fn find_avrc(&mut self, peer: BluetoothAddress) -> Result<(), AvError> {
        self.calls.push(Call::FindAvrc(peer));
        if self.avrc_lookup_fails {
            return Err(AvError::Discovery);
        }
        Ok(())
    }

    fn add_avrc_record(&mut self, uuid: u16, categories: u16) -> Result<u32, AvError> {
        self.calls.push(Call::AddRecord { uuid, categories });
        let record = self.next_record;
        self.next_record += 1;
        Ok(record)
    }

    fn update_avrc_categories(&mut self, _record: u32, categories: u16) {
        self.calls.push(Call::UpdateCategories { categories });
    }

    fn delete_record(&mut self, record: u32) {
        self.calls.push(Call::DeleteRecord(record));
    }
}

impl RemoteControl for MockPlatform {
    fn register_avct(&mut self, _mtu: u16, _sec_mask: u8) {
        self.calls.push(Call::RegisterAvct);
    }

    fn deregister_avct(&mut self) {
        self.calls.push(Call::DeregisterAvct);
    }

    fn rc_open(&mut self, acceptor: bool, _peer: BluetoothAddress, _control: u16) -> Result<u8, AvError> {
        if self.rc_open_fails {
            return Err(AvError::RemoteControl);
        }
        let handle = self.next_rc;
        self.next_rc += 1;
        self.calls.push(Call::RcOpen { acceptor, handle });
        Ok(handle)
    }

    fn rc_close(&mut self, rc_handle: u8) {
        self.calls.push(Call::RcClose(rc_handle));
    }

    fn rc_pass_cmd(&mut self, _rc_handle: u8, _label: u8, op_id: u8, _pressed: bool) {
        self.calls.push(Call::RcPassCmd { op_id });
    }

    fn rc_pass_rsp(&mut self, _rc_handle: u8, _label: u8, ctype: u8, op_id: u8, _pressed: bool) {
        self.calls.push(Call::RcPassRsp { code: ctype, op_id });
    }

    fn rc_vendor_cmd(&mut self, _rc_handle: u8, _label: u8, _ctype: u8, _data: &RcData) {
        self.calls.push(Call::RcVendorCmd);
    }

    fn rc_vendor_rsp(&mut self, _rc_handle: u8, _label: u8, ctype: u8, _company_id: u32, _data: &RcData) {
        self.calls.push(Call::RcVendorRsp { code: ctype });
    }

    fn rc_msg_req(&mut self, _rc_handle: u8, _label: u8, ctype: u8, msg: &MetaResponse) {
        self.calls.push(Call::RcMsgReq { ctype, pdu: msg.pdu });
    }

    fn rc_op_supported(&mut self, op_id: u8) -> bool {
        !self.unsupported_ops.contains(&op_id)
    }

    fn rc_supported_events(&mut self) -> RcData {
        RcData::from_slice(&[0x01, 0x02, 0x0D]).unwrap_or_default()
    }
}

impl CodecCallout for MockPlatform {
    fn co_disc_res(&mut self, _handle: AvHandle, _num_seps: u8, num_snks: u8, _num_srcs: u8, _peer: BluetoothAddress, _uuid: u16) {
        self.calls.push(Call::CoDiscRes { num_snks });
    }

    fn co_getcfg(&mut self, _handle: AvHandle, seid: u8, _caps: &StreamConfig, _cfg: &mut StreamConfig) -> bool {
        !self.rejected_seids.contains(&seid)
    }

    fn co_setcfg(
        &mut self,
        _handle: AvHandle,
        _codec_type: u8,
        _cfg: &StreamConfig,
        seid: u8,
        _peer: BluetoothAddress,
        _local_tsep: Tsep,
        _avdt_handle: u8,
    ) {
        self.calls.push(Call::CoSetcfg { seid });
    }

    fn co_open(&mut self, _handle: AvHandle, _codec_type: u8, _codec_info: &CodecInfo, mtu: u16) {
        self.calls.push(Call::CoOpen { mtu });
    }

    fn co_close(&mut self, _handle: AvHandle, _codec_type: u8, _mtu: u16) {
        self.calls.push(Call::CoClose);
    }

    fn co_start(&mut self, _handle: AvHandle, _codec_type: u8, _codec_info: &CodecInfo) -> bool {
        self.calls.push(Call::CoStart);
        false
    }

    fn co_stop(&mut self, _handle: AvHandle, _codec_type: u8) {
        self.calls.push(Call::CoStop);
    }

    fn co_delay(&mut self, _handle: AvHandle, delay: u16) {
        self.calls.push(Call::CoDelay(delay));
    }

    fn co_dropped(&mut self, handle: AvHandle) {
        self.calls.push(Call::CoDropped(handle));
    }
}

impl TimerService for MockPlatform {
    fn start_timer(&mut self, slot: TimerSlot, ms: u32, fire: Event) {
        self.timers.retain(|(s, _, _)| *s != slot);
        self.timers.push((slot, ms, fire));
    }

    fn stop_timer(&mut self, slot: TimerSlot) {
        self.timers.retain(|(s, _, _)| *s != slot);
    }
}

impl AppCallback for MockPlatform {
    fn on_event(&mut self, event: AvEvent) {
        self.events.push(event);
    }
}
