//! Stream state machine table
//!
//! Each (state, event) pair maps to a list of actions and a next state. Pairs that are not listed
//! are ignored: no action runs and the state does not change. The engine commits the next state
//! before running the actions, so an action may feed another event into the same machine.

use crate::event::StreamEventKind as E;

/// Stream states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamState {
    /// Idle
    #[default]
    Init,
    /// The peer is setting up a stream towards us
    Incoming,
    /// We are setting up a stream
    Opening,
    /// Stream open (streaming or not)
    Open,
    /// Reconfiguring
    Rcfg,
    /// Closing
    Closing,
}

/// Stream state machine actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Action {
    DoDisc,
    Cleanup,
    FreeSdb,
    ConfigInd,
    DisconnectReq,
    SecurityReq,
    SecurityRsp,
    SecurityInd,
    SecurityCfm,
    SecurityRej,
    SetconfigRsp,
    SetconfigRej,
    StRcTimer,
    StrOpened,
    DoClose,
    ConnectReq,
    SdpFailed,
    DiscResults,
    DiscResAsAcp,
    OpenFailed,
    GetcapResults,
    DiscoverReq,
    ConnFailed,
    DoStart,
    StrStopped,
    Reconfig,
    DataPath,
    StartOk,
    StartFailed,
    StrClosed,
    ClrCong,
    SuspendCfm,
    RcfgStrOk,
    RcfgFailed,
    RcfgConnect,
    RcfgDiscntd,
    SuspendCont,
    RcfgCfm,
    RcfgOpen,
    OpenRc,
    Chk2ndStart,
    SaveCaps,
    SetUseRc,
    CcoClose,
    SwitchRole,
    RoleRes,
    DelayCo,
    OpenAtInc,
    SetDelayValue,
}

use Action as A;
use StreamState as S;

/// Look up the row for `event` in `state`; `None` means the event is ignored
#[must_use]
pub fn lookup(state: StreamState, event: E) -> Option<(&'static [Action], StreamState)> {
    let row: (&'static [Action], StreamState) = match state {
        S::Init => match event {
            E::ApiOpen => (&[A::DoDisc], S::Opening),
            E::ApiClose => (&[A::Cleanup], S::Init),
            E::SdpDiscFail => (&[A::FreeSdb], S::Init),
            E::StrConfigInd => (&[A::ConfigInd], S::Incoming),
            E::StrSecurityInd => (&[A::SecurityInd], S::Init),
            E::StrSecurityCfm => (&[A::SecurityCfm], S::Init),
            E::AvrcTimer => (&[A::SwitchRole], S::Init),
            E::AcpConnect => (&[], S::Incoming),
            E::ApiSetDelayValue => (&[A::SetDelayValue], S::Init),
            _ => return None,
        },
        S::Incoming => match event {
            E::ApiOpen => (&[A::OpenAtInc], S::Incoming),
            E::ApiClose => (&[A::CcoClose, A::DisconnectReq], S::Closing),
            E::ApiProtectRsp => (&[A::SecurityRsp], S::Incoming),
            E::CiSetconfigOk => (&[A::SetconfigRsp, A::StRcTimer], S::Incoming),
            E::CiSetconfigFail => (&[A::SetconfigRej, A::Cleanup], S::Init),
            E::StrDiscOk => (&[A::DiscResAsAcp], S::Incoming),
            E::StrGetcapOk => (&[A::SaveCaps], S::Incoming),
            E::StrOpenOk => (&[A::StrOpened], S::Open),
            E::StrClose => (&[A::CcoClose, A::Cleanup], S::Init),
            E::StrConfigInd => (&[A::ConfigInd], S::Incoming),
            E::StrSecurityInd => (&[A::SecurityInd], S::Incoming),
            E::StrSecurityCfm => (&[A::SecurityCfm], S::Incoming),
            E::AvdtDisconnect => (&[A::CcoClose, A::DisconnectReq], S::Closing),
            E::AvdtDelayReport => (&[A::DelayCo], S::Incoming),
            E::ApiSetDelayValue => (&[A::SetDelayValue], S::Incoming),
            _ => return None,
        },
        S::Opening => match event {
            E::ApiClose => (&[A::DoClose], S::Closing),
            E::ApiProtectReq => (&[A::SecurityReq], S::Opening),
            E::ApiProtectRsp => (&[A::SecurityRsp], S::Opening),
            E::SdpDiscOk => (&[A::ConnectReq], S::Opening),
            E::SdpDiscFail => (&[A::SdpFailed], S::Init),
            E::StrDiscOk => (&[A::DiscResults], S::Opening),
            E::StrDiscFail => (&[A::OpenFailed], S::Closing),
            E::StrGetcapOk => (&[A::GetcapResults], S::Opening),
            E::StrGetcapFail => (&[A::OpenFailed], S::Closing),
            E::StrOpenOk => (&[A::StRcTimer, A::StrOpened], S::Open),
            E::StrOpenFail => (&[A::OpenFailed], S::Closing),
            E::StrConfigInd => (&[A::ConfigInd], S::Incoming),
            E::StrSecurityInd => (&[A::SecurityInd], S::Opening),
            E::StrSecurityCfm => (&[A::SecurityCfm], S::Opening),
            E::AvrcTimer => (&[A::SwitchRole], S::Opening),
            E::AvdtConnect => (&[A::DiscoverReq], S::Opening),
            E::AvdtDisconnect => (&[A::ConnFailed], S::Init),
            E::RoleChange => (&[A::RoleRes], S::Opening),
            E::AvdtDelayReport => (&[A::DelayCo], S::Opening),
            _ => return None,
        },
        S::Open => match event {
            E::ApiClose => (&[A::DoClose], S::Closing),
            E::ApiStart => (&[A::DoStart], S::Open),
            E::ApiStop => (&[A::StrStopped], S::Open),
            E::ApiReconfig => (&[A::Reconfig], S::Rcfg),
            E::ApiProtectReq => (&[A::SecurityReq], S::Open),
            E::ApiProtectRsp => (&[A::SecurityRsp], S::Open),
            E::ApiRcOpen => (&[A::SetUseRc, A::OpenRc], S::Open),
            E::SrcDataReady => (&[A::DataPath], S::Open),
            E::StrGetcapOk => (&[A::SaveCaps], S::Open),
            E::StrStartOk => (&[A::StartOk], S::Open),
            E::StrStartFail => (&[A::StartFailed], S::Open),
            E::StrClose => (&[A::StrClosed], S::Init),
            E::StrConfigInd => (&[A::SetconfigRej], S::Open),
            E::StrSecurityInd => (&[A::SecurityInd], S::Open),
            E::StrSecurityCfm => (&[A::SecurityCfm], S::Open),
            E::StrWriteCfm => (&[A::ClrCong, A::DataPath], S::Open),
            E::StrSuspendCfm => (&[A::SuspendCfm], S::Open),
            E::AvrcTimer => (&[A::OpenRc, A::Chk2ndStart], S::Open),
            E::AvdtDisconnect => (&[A::StrClosed], S::Init),
            E::RoleChange => (&[A::RoleRes], S::Open),
            E::AvdtDelayReport => (&[A::DelayCo], S::Open),
            E::ApiSetDelayValue => (&[A::SetDelayValue], S::Open),
            _ => return None,
        },
        S::Rcfg => match event {
            E::ApiClose => (&[A::DisconnectReq], S::Closing),
            E::ApiReconfig => (&[A::Reconfig], S::Rcfg),
            E::StrDiscOk => (&[A::DiscResults], S::Rcfg),
            E::StrDiscFail => (&[A::StrClosed], S::Init),
            E::StrGetcapOk => (&[A::GetcapResults], S::Rcfg),
            E::StrGetcapFail => (&[A::StrClosed], S::Init),
            E::StrOpenOk => (&[A::RcfgStrOk], S::Open),
            E::StrOpenFail => (&[A::RcfgFailed], S::Rcfg),
            E::StrClose => (&[A::RcfgConnect], S::Rcfg),
            E::StrSuspendCfm => (&[A::SuspendCont], S::Rcfg),
            E::StrReconfigCfm => (&[A::RcfgCfm], S::Rcfg),
            E::AvdtConnect => (&[A::RcfgOpen], S::Rcfg),
            E::AvdtDisconnect => (&[A::RcfgDiscntd], S::Rcfg),
            E::AvdtDelayReport => (&[A::DelayCo], S::Rcfg),
            _ => return None,
        },
        S::Closing => match event {
            E::ApiClose => (&[A::DisconnectReq], S::Closing),
            E::SdpDiscOk | E::SdpDiscFail => (&[A::SdpFailed], S::Init),
            E::StrOpenOk => (&[A::DoClose], S::Closing),
            E::StrOpenFail => (&[A::DisconnectReq], S::Closing),
            E::StrClose => (&[A::DisconnectReq], S::Closing),
            E::StrConfigInd => (&[A::SetconfigRej], S::Closing),
            E::StrSecurityInd => (&[A::SecurityRej], S::Closing),
            E::AvdtDisconnect => (&[A::StrClosed], S::Init),
            _ => return None,
        },
    };
    Some(row)
}
