use super::*;
use crate::avrc::{PassThrough, RcData, RcMessage, ctype, rsp};
use crate::codec::{CodecInfo, CodecType, MediaType, StreamConfig, Tsep};
use crate::constants::{AVDT_PSC_TRANS, avdt_err};
use crate::event::{
    ConfigIndication, LocalSepConfig, OpenRequest, PeerSeps, RcSdpRecord, ReconfigRequest,
    SepInfo, StopRequest, SystemEvent, TransportCallback,
};
use crate::processor::process_pending;
use crate::testing::{Call, MockPlatform};
use crate::{LinkRole, Status};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use heapless::Vec;

type Engine<'q> = AvEngine<'q, MockPlatform, NoopRawMutex>;

const PEER_A: BluetoothAddress = BluetoothAddress::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x01]);
const PEER_B: BluetoothAddress = BluetoothAddress::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x02]);
const PEER_C: BluetoothAddress = BluetoothAddress::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x03]);

fn run(engine: &mut Engine<'_>, event: Event) {
    engine.dispatch(event);
    process_pending(engine);
}

fn transport(handle: AvHandle, callback: TransportCallback) -> Event {
    Event::System(SystemEvent::Transport { handle, callback })
}

/// SBC 44.1/48 kHz, stereo or joint stereo, 16 blocks, 8 subbands, loudness
fn sbc_info(max_bitpool: u8) -> CodecInfo {
    CodecInfo::from_parts(MediaType::Audio, CodecType::Sbc as u8, &[0x33, 0x15, 2, max_bitpool]).unwrap()
}

fn sbc_source() -> LocalSepConfig {
    LocalSepConfig {
        tsep: Tsep::Source,
        codec_info: sbc_info(53),
    }
}

fn sbc_caps() -> StreamConfig {
    StreamConfig {
        psc_mask: AVDT_PSC_TRANS,
        ..StreamConfig::with_codec(sbc_info(53))
    }
}

fn sinks(seids: &[u8]) -> PeerSeps {
    seids
        .iter()
        .map(|&seid| SepInfo {
            seid,
            in_use: false,
            media: MediaType::Audio,
            tsep: Tsep::Sink,
        })
        .collect()
}

fn enabled(queue: &EventQueue<NoopRawMutex>, features: u16) -> Engine<'_> {
    let mut engine = AvEngine::new(MockPlatform::default(), queue);
    run(
        &mut engine,
        Event::Main(MainEvent::Enable {
            features: Features(features),
            sec_mask: 0,
        }),
    );
    engine
}

fn register(engine: &mut Engine<'_>) -> AvHandle {
    let seps = Vec::from_slice(&[sbc_source()]).unwrap();
    run(
        engine,
        Event::Main(MainEvent::Register {
            channel: AvChannel::Audio,
            app_id: 1,
            seps,
        }),
    );
    match engine.platform().last_event() {
        Some(AvEvent::Registered {
            status: Status::Success,
            handle,
            ..
        }) => *handle,
        other => panic!("registration failed: {other:?}"),
    }
}

fn api_open(handle: AvHandle, peer: BluetoothAddress) -> Event {
    Event::stream(
        handle,
        StreamEvent::ApiOpen(OpenRequest {
            peer,
            uuid: crate::constants::uuid::AUDIO_SOURCE,
            ..OpenRequest::default()
        }),
    )
}

/// Drive an initiator open to the OPEN state against a peer with one SBC sink
fn open_stream(engine: &mut Engine<'_>, handle: AvHandle, peer: BluetoothAddress) {
    run(engine, api_open(handle, peer));
    run(
        engine,
        Event::System(SystemEvent::A2dpSdpResult {
            found: true,
            avdt_version: 0x0103,
        }),
    );
    run(engine, transport(handle, TransportCallback::ConnectInd { peer, acceptor: false }));
    run(
        engine,
        transport(
            handle,
            TransportCallback::DiscoverCfm {
                err: 0,
                seps: sinks(&[1]),
            },
        ),
    );
    run(engine, transport(handle, TransportCallback::GetcapCfm { err: 0, cfg: sbc_caps() }));
    run(engine, transport(handle, TransportCallback::OpenCfm { err: 0, peer_mtu: 672 }));
    assert_eq!(engine.stream_state(handle), Some(StreamState::Open));
}

fn start_stream(engine: &mut Engine<'_>, handle: AvHandle) {
    run(engine, Event::stream(handle, StreamEvent::ApiStart));
    run(engine, transport(handle, TransportCallback::StartCfm { err: 0 }));
}

#[test]
fn test_initiator_open_reaches_open() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);
    assert_eq!(handle, AvHandle::new(0, AvChannel::Audio));

    open_stream(&mut engine, handle, PEER_A);

    let platform = engine.platform();
    assert!(platform.called(&Call::FindA2dp(crate::constants::uuid::AUDIO_SINK)));
    assert!(platform.called(&Call::ConnectReq(PEER_A)));
    assert!(platform.called(&Call::DiscoverReq(PEER_A)));
    assert!(platform.called(&Call::GetCaps { seid: 1, all: true }));
    assert!(platform.called(&Call::OpenReq {
        avdt_handle: 1,
        seid: 1
    }));
    assert!(platform.called(&Call::CoOpen { mtu: 660 }));
    assert_eq!(
        platform.last_event(),
        Some(&AvEvent::Opened {
            handle,
            peer: PEER_A,
            status: Status::Success,
            starting: false,
            mtu: 660,
            peer_sep: Tsep::Sink,
        })
    );
    assert_eq!(engine.control_block().audio_open_cnt, 1);
    assert_eq!(engine.control_block().conn_audio, 0b1);
    assert_eq!(engine.control_block().a2dp_disc, None);
}

#[test]
fn test_start_suspend_close() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);
    open_stream(&mut engine, handle, PEER_A);

    start_stream(&mut engine, handle);
    assert!(engine.platform().called(&Call::StartReq(1)));
    assert!(engine.platform().called(&Call::FlushTimeout {
        peer: PEER_A,
        timeout: 120
    }));
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::Started {
            handle,
            status: Status::Success,
            initiator: true,
            suspending: false,
        })
    );
    assert_eq!(engine.control_block().audio_streams, 0b1);

    let stop = StopRequest {
        suspend: true,
        flush: false,
    };
    run(&mut engine, Event::stream(handle, StreamEvent::ApiStop(stop)));
    assert!(engine.platform().called(&Call::SuspendReq(1)));
    assert_eq!(engine.control_block().audio_streams, 0);
    run(&mut engine, transport(handle, TransportCallback::SuspendCfm { err: 0 }));
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::Suspended {
            handle,
            status: Status::Success,
            initiator: true,
        })
    );

    run(&mut engine, Event::stream(handle, StreamEvent::ApiClose));
    assert!(engine.platform().called(&Call::CloseReq(1)));
    assert!(engine.platform().armed(TimerSlot::Stream(0)));
    run(&mut engine, transport(handle, TransportCallback::CloseCfm { err: 0 }));
    assert!(engine.platform().called(&Call::DisconnectReq(PEER_A)));
    run(
        &mut engine,
        transport(
            handle,
            TransportCallback::DisconnectInd {
                peer: PEER_A,
                reason: 0x13,
            },
        ),
    );
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::Closed {
            handle,
            peer: PEER_A,
            disc_reason: 0x13,
        })
    );
    assert_eq!(engine.stream_state(handle), Some(StreamState::Init));
    assert_eq!(engine.control_block().audio_open_cnt, 0);
    assert!(!engine.platform().armed(TimerSlot::Stream(0)));
}

#[test]
fn test_events_without_a_row_change_nothing() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);
    let (calls, events) = (engine.platform().calls.len(), engine.platform().events.len());

    run(&mut engine, Event::stream(handle, StreamEvent::ApiStart));
    run(&mut engine, Event::stream(handle, StreamEvent::SrcDataReady));
    run(&mut engine, transport(handle, TransportCallback::WriteCfm));
    run(
        &mut engine,
        Event::stream(handle, StreamEvent::ApiStop(StopRequest::default())),
    );

    assert_eq!(engine.platform().calls.len(), calls);
    assert_eq!(engine.platform().events.len(), events);
    assert_eq!(engine.stream_state(handle), Some(StreamState::Init));
}

#[test]
fn test_disabled_engine_drops_everything() {
    let queue = EventQueue::new();
    let mut engine = AvEngine::new(MockPlatform::default(), &queue);
    run(&mut engine, api_open(AvHandle::new(0, AvChannel::Audio), PEER_A));
    run(&mut engine, Event::Main(MainEvent::Disable));
    run(&mut engine, Event::System(SystemEvent::ScoChange { open: true }));
    assert!(engine.platform().calls.is_empty());
    assert!(engine.platform().events.is_empty());
}

#[test]
fn test_every_candidate_rejected() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);
    engine.platform_mut().rejected_seids.extend_from_slice(&[1, 2]);

    run(&mut engine, api_open(handle, PEER_A));
    run(
        &mut engine,
        Event::System(SystemEvent::A2dpSdpResult {
            found: true,
            avdt_version: 0x0103,
        }),
    );
    run(&mut engine, transport(handle, TransportCallback::ConnectInd { peer: PEER_A, acceptor: false }));
    run(
        &mut engine,
        transport(
            handle,
            TransportCallback::DiscoverCfm {
                err: 0,
                seps: sinks(&[1, 2]),
            },
        ),
    );
    run(&mut engine, transport(handle, TransportCallback::GetcapCfm { err: 0, cfg: sbc_caps() }));
    run(&mut engine, transport(handle, TransportCallback::GetcapCfm { err: 0, cfg: sbc_caps() }));

    let platform = engine.platform();
    assert_eq!(platform.count(|c| matches!(c, Call::GetCaps { .. })), 2);
    assert_eq!(platform.count(|c| matches!(c, Call::OpenReq { .. })), 0);
    assert!(platform.called(&Call::DisconnectReq(PEER_A)));
    assert_eq!(engine.stream_state(handle), Some(StreamState::Closing));

    run(
        &mut engine,
        transport(
            handle,
            TransportCallback::DisconnectInd {
                peer: PEER_A,
                reason: 0x16,
            },
        ),
    );
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::Opened {
            handle,
            peer: PEER_A,
            status: Status::FailGetCap,
            starting: false,
            mtu: 0,
            peer_sep: Tsep::Sink,
        })
    );
    let scb = engine.scb(handle).unwrap();
    assert_eq!(scb.state, StreamState::Init);
    assert!(!scb.disc_db);
    assert_eq!(scb.cap, None);
    assert_eq!(engine.control_block().a2dp_disc, None);
}

#[test]
fn test_sdp_failure_reports_open_failure() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);

    run(&mut engine, api_open(handle, PEER_A));
    run(
        &mut engine,
        Event::System(SystemEvent::A2dpSdpResult {
            found: false,
            avdt_version: 0,
        }),
    );
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::Opened {
            handle,
            peer: PEER_A,
            status: Status::FailSdp,
            starting: false,
            mtu: 0,
            peer_sep: Tsep::Sink,
        })
    );
    assert_eq!(engine.stream_state(handle), Some(StreamState::Init));
    assert!(!engine.platform().called(&Call::ConnectReq(PEER_A)));
}

#[test]
fn test_role_switch_single_waiter() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let h0 = register(&mut engine);
    let h1 = register(&mut engine);
    let h2 = register(&mut engine);
    open_stream(&mut engine, h0, PEER_A);
    engine.platform_mut().set_role(PEER_A, LinkRole::Slave);

    run(&mut engine, api_open(h1, PEER_B));
    assert_eq!(engine.platform().count(|c| matches!(c, Call::SwitchRole(_))), 1);
    assert!(engine.platform().called(&Call::SwitchRole(PEER_A)));
    assert_eq!(engine.control_block().rs_idx, 2);
    assert_eq!(engine.platform().count(|c| matches!(c, Call::FindA2dp(_))), 1);

    // the switch slot is taken; the third open retries from its watchdog
    run(&mut engine, api_open(h2, PEER_C));
    assert_eq!(engine.platform().count(|c| matches!(c, Call::SwitchRole(_))), 1);
    assert!(engine.platform().armed(TimerSlot::Stream(2)));
    assert_eq!(engine.control_block().rs_idx, 2);

    engine.platform_mut().set_role(PEER_A, LinkRole::Master);
    run(
        &mut engine,
        Event::System(SystemEvent::RoleChanged {
            peer: PEER_A,
            new_role: LinkRole::Master,
            hci_status: 0,
        }),
    );
    assert_eq!(engine.control_block().rs_idx, 0);
    assert_eq!(engine.platform().count(|c| matches!(c, Call::FindA2dp(_))), 2);
    assert_eq!(engine.control_block().a2dp_disc, Some(1));

    // service lookup is now busy with stream 1, so stream 2 keeps waiting
    let retry = engine.platform_mut().fire(TimerSlot::Stream(2)).unwrap();
    run(&mut engine, retry);
    assert!(engine.platform().armed(TimerSlot::Stream(2)));
    assert_eq!(engine.platform().count(|c| matches!(c, Call::FindA2dp(_))), 2);
    assert_eq!(engine.stream_state(h2), Some(StreamState::Opening));
}

#[test]
fn test_role_switch_failure_fails_open() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let h0 = register(&mut engine);
    let h1 = register(&mut engine);
    open_stream(&mut engine, h0, PEER_A);
    engine.platform_mut().set_role(PEER_A, LinkRole::Slave);

    run(&mut engine, api_open(h1, PEER_B));
    run(
        &mut engine,
        Event::System(SystemEvent::RoleChanged {
            peer: PEER_A,
            new_role: LinkRole::Slave,
            hci_status: 0x23,
        }),
    );
    assert!(engine.platform().events.contains(&AvEvent::Opened {
        handle: h1,
        peer: PEER_B,
        status: Status::FailRole,
        starting: false,
        mtu: 0,
        peer_sep: Tsep::Sink,
    }));
    assert_eq!(engine.stream_state(h1), Some(StreamState::Init));
    assert_eq!(engine.stream_state(h0), Some(StreamState::Open));
}

#[test]
fn test_own_link_switches_one_at_a_time() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, Features::MASTER);
    let h0 = register(&mut engine);
    let h1 = register(&mut engine);
    engine.platform_mut().set_role(PEER_A, LinkRole::Slave);
    engine.platform_mut().set_role(PEER_B, LinkRole::Slave);
    let switches = |engine: &Engine<'_>| engine.platform().count(|c| matches!(c, Call::SwitchRole(_)));

    run(&mut engine, api_open(h0, PEER_A));
    assert!(engine.platform().called(&Call::SwitchRole(PEER_A)));
    assert_eq!(engine.control_block().rs_idx, 1);

    run(&mut engine, api_open(h1, PEER_B));
    assert_eq!(switches(&engine), 1);
    assert_eq!(engine.control_block().rs_idx, 1);
    assert!(engine.platform().armed(TimerSlot::Stream(1)));

    // a role change on an unrelated link leaves the slot with stream 0
    run(
        &mut engine,
        Event::System(SystemEvent::RoleChanged {
            peer: PEER_C,
            new_role: LinkRole::Master,
            hci_status: 0,
        }),
    );
    assert_eq!(engine.control_block().rs_idx, 1);
    assert_eq!(engine.platform().count(|c| matches!(c, Call::FindA2dp(_))), 0);

    engine.platform_mut().set_role(PEER_A, LinkRole::Master);
    run(
        &mut engine,
        Event::System(SystemEvent::RoleChanged {
            peer: PEER_A,
            new_role: LinkRole::Master,
            hci_status: 0,
        }),
    );
    assert_eq!(engine.control_block().rs_idx, 0);
    assert_eq!(engine.platform().count(|c| matches!(c, Call::FindA2dp(_))), 1);
    assert_eq!(engine.control_block().a2dp_disc, Some(0));

    let retry = engine.platform_mut().fire(TimerSlot::Stream(1)).unwrap();
    run(&mut engine, retry);
    assert_eq!(switches(&engine), 2);
    assert!(engine.platform().called(&Call::SwitchRole(PEER_B)));
    assert_eq!(engine.control_block().rs_idx, 2);
    assert_eq!(engine.stream_state(h1), Some(StreamState::Opening));
}

#[test]
fn test_reconfigure_in_place_while_started() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);
    open_stream(&mut engine, handle, PEER_A);
    start_stream(&mut engine, handle);

    let codec_info = sbc_info(35);
    let req = ReconfigRequest {
        codec_info,
        sep_info_idx: 0,
        suspend: true,
        ..ReconfigRequest::default()
    };
    run(&mut engine, Event::stream(handle, StreamEvent::ApiReconfig(req)));
    assert_eq!(engine.stream_state(handle), Some(StreamState::Rcfg));
    assert!(engine.platform().called(&Call::SuspendReq(1)));

    run(&mut engine, transport(handle, TransportCallback::SuspendCfm { err: 0 }));
    assert!(engine.platform().called(&Call::ReconfigReq(1)));

    run(
        &mut engine,
        transport(handle, TransportCallback::ReconfigCfm { err: 0, codec_info }),
    );
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::Reconfigured {
            handle,
            status: Status::Success,
        })
    );
    let scb = engine.scb(handle).unwrap();
    assert_eq!(scb.state, StreamState::Open);
    assert_eq!(scb.cfg.codec_info, codec_info);
    assert_eq!(engine.platform().count(|c| matches!(c, Call::CloseReq(_))), 0);
}

#[test]
fn test_reconfigure_to_other_endpoint_closes_first() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);
    open_stream(&mut engine, handle, PEER_A);

    let req = ReconfigRequest {
        codec_info: sbc_caps().codec_info,
        sep_info_idx: 1,
        suspend: true,
        ..ReconfigRequest::default()
    };
    run(&mut engine, Event::stream(handle, StreamEvent::ApiReconfig(req)));
    assert!(engine.platform().called(&Call::CloseReq(1)));
    assert!(!engine.platform().called(&Call::ReconfigReq(1)));

    run(&mut engine, transport(handle, TransportCallback::CloseCfm { err: 0 }));
    assert_eq!(engine.platform().count(|c| *c == Call::ConnectReq(PEER_A)), 2);
    assert_eq!(engine.stream_state(handle), Some(StreamState::Rcfg));
}

/// Start a reconfiguration to another endpoint and let the old stream close
fn reconfigure_by_reopen(engine: &mut Engine<'_>, handle: AvHandle) {
    let req = ReconfigRequest {
        codec_info: sbc_caps().codec_info,
        sep_info_idx: 1,
        suspend: true,
        ..ReconfigRequest::default()
    };
    run(engine, Event::stream(handle, StreamEvent::ApiReconfig(req)));
    run(engine, transport(handle, TransportCallback::CloseCfm { err: 0 }));
}

fn reconfig_failures(engine: &Engine<'_>) -> usize {
    engine.platform().count_events(|e| {
        matches!(
            e,
            AvEvent::Reconfigured {
                status: Status::FailStream,
                ..
            }
        )
    })
}

#[test]
fn test_reconfigure_gives_up_after_retries() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);
    open_stream(&mut engine, handle, PEER_A);
    reconfigure_by_reopen(&mut engine, handle);

    for cycle in 0..3 {
        assert_eq!(engine.stream_state(handle), Some(StreamState::Rcfg));
        run(&mut engine, transport(handle, TransportCallback::ConnectInd { peer: PEER_A, acceptor: false }));
        run(&mut engine, transport(handle, TransportCallback::OpenCfm { err: 0x81, peer_mtu: 0 }));
        assert!(engine.platform().called(&Call::DisconnectReq(PEER_A)), "cycle {cycle}");
        assert_eq!(reconfig_failures(&engine), 0);
        run(
            &mut engine,
            transport(
                handle,
                TransportCallback::DisconnectInd {
                    peer: PEER_A,
                    reason: 0x13,
                },
            ),
        );
    }

    // one open for the stream, three reopens
    assert_eq!(engine.platform().count(|c| matches!(c, Call::OpenReq { .. })), 4);
    assert_eq!(engine.platform().count(|c| *c == Call::ConnectReq(PEER_A)), 4);
    assert_eq!(reconfig_failures(&engine), 1);
    assert_eq!(engine.stream_state(handle), Some(StreamState::Init));
}

#[test]
fn test_reconfigure_failure_closes_codec() {
    let queue = EventQueue::new();
    let options = crate::AvOptions {
        reconfig_retry: 1,
        ..crate::AvOptions::default()
    };
    let mut engine = AvEngine::with_options(MockPlatform::default(), &queue, options);
    run(
        &mut engine,
        Event::Main(MainEvent::Enable {
            features: Features(0),
            sec_mask: 0,
        }),
    );
    let handle = register(&mut engine);
    open_stream(&mut engine, handle, PEER_A);
    reconfigure_by_reopen(&mut engine, handle);
    assert_eq!(engine.platform().count(|c| *c == Call::CoClose), 0);

    run(&mut engine, transport(handle, TransportCallback::ConnectInd { peer: PEER_A, acceptor: false }));
    run(&mut engine, transport(handle, TransportCallback::OpenCfm { err: 0x81, peer_mtu: 0 }));
    assert_eq!(engine.platform().count(|c| *c == Call::CoClose), 1);
    assert_eq!(reconfig_failures(&engine), 1);
    assert_eq!(engine.stream_state(handle), Some(StreamState::Closing));
    assert!(engine.platform().called(&Call::DisconnectReq(PEER_A)));
}

#[test]
fn test_register_over_capacity() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    for _ in 0..MAX_STREAMS {
        register(&mut engine);
    }
    let seps = Vec::from_slice(&[sbc_source()]).unwrap();
    run(
        &mut engine,
        Event::Main(MainEvent::Register {
            channel: AvChannel::Audio,
            app_id: 9,
            seps,
        }),
    );
    assert!(matches!(
        engine.platform().last_event(),
        Some(AvEvent::Registered {
            status: Status::FailResources,
            app_id: 9,
            ..
        })
    ));
    assert_eq!(engine.platform().count(|c| *c == Call::RegisterAvdt), 1);
    assert_eq!(engine.control_block().reg_audio, 0b1111);
}

#[test]
fn test_deregister_reports_once() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);

    run(&mut engine, Event::Main(MainEvent::Deregister(handle)));
    assert!(engine.platform().called(&Call::RemoveStream(1)));
    assert_eq!(engine.platform().count(|c| *c == Call::DeregisterAvdt), 1);
    assert_eq!(
        engine
            .platform()
            .count_events(|e| matches!(e, AvEvent::Deregistered { .. })),
        1
    );
    assert!(engine.scb(handle).is_none());

    let unknown = AvHandle::new(3, AvChannel::Audio);
    run(&mut engine, Event::Main(MainEvent::Deregister(unknown)));
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::Deregistered { handle: unknown })
    );
    assert_eq!(engine.platform().count(|c| *c == Call::DeregisterAvdt), 1);
}

#[test]
fn test_deregister_answered_while_disabled() {
    let queue = EventQueue::new();
    let mut engine = AvEngine::new(MockPlatform::default(), &queue);
    let never = AvHandle::new(3, AvChannel::Audio);
    run(&mut engine, Event::Main(MainEvent::Deregister(never)));
    assert_eq!(engine.platform().events, [AvEvent::Deregistered { handle: never }]);
    assert!(engine.platform().calls.is_empty());

    run(
        &mut engine,
        Event::Main(MainEvent::Enable {
            features: Features(0),
            sec_mask: 0,
        }),
    );
    let handle = register(&mut engine);
    run(&mut engine, Event::Main(MainEvent::Disable));
    assert!(!engine.control_block().enabled);
    let before = engine
        .platform()
        .count_events(|e| *e == AvEvent::Deregistered { handle });
    run(&mut engine, Event::Main(MainEvent::Deregister(handle)));
    assert_eq!(
        engine
            .platform()
            .count_events(|e| *e == AvEvent::Deregistered { handle }),
        before + 1
    );
}

#[test]
fn test_deregister_open_stream_closes_it_first() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);
    open_stream(&mut engine, handle, PEER_A);

    run(&mut engine, Event::Main(MainEvent::Deregister(handle)));
    assert!(engine.platform().called(&Call::CloseReq(1)));
    assert_eq!(
        engine
            .platform()
            .count_events(|e| matches!(e, AvEvent::Deregistered { .. })),
        0
    );

    run(&mut engine, transport(handle, TransportCallback::CloseCfm { err: 0 }));
    run(
        &mut engine,
        transport(
            handle,
            TransportCallback::DisconnectInd {
                peer: PEER_A,
                reason: 0x16,
            },
        ),
    );
    assert_eq!(
        engine
            .platform()
            .count_events(|e| matches!(e, AvEvent::Deregistered { .. })),
        1
    );
    assert!(engine.scb(handle).is_none());
}

#[test]
fn test_disable_deregisters_every_stream() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    register(&mut engine);
    register(&mut engine);

    run(&mut engine, Event::Main(MainEvent::Disable));
    assert_eq!(
        engine
            .platform()
            .count_events(|e| matches!(e, AvEvent::Deregistered { .. })),
        2
    );
    assert!(!engine.control_block().enabled);
    assert_eq!(engine.platform().count(|c| *c == Call::DeregisterAvdt), 1);
}

#[test]
fn test_media_held_back_while_transport_is_full() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);
    open_stream(&mut engine, handle, PEER_A);
    start_stream(&mut engine, handle);

    engine.platform_mut().queued_buffers = 10;
    engine.platform_mut().frames.push_back((1, 100));
    run(&mut engine, Event::stream(handle, StreamEvent::SrcDataReady));
    assert_eq!(engine.scb(handle).unwrap().media_queue.len(), 1);
    assert_eq!(engine.platform().count(|c| matches!(c, Call::WriteMedia { .. })), 0);

    engine.platform_mut().queued_buffers = 0;
    run(&mut engine, Event::stream(handle, StreamEvent::SrcDataReady));
    assert!(engine.platform().called(&Call::WriteMedia {
        avdt_handle: 1,
        timestamp: 100
    }));
    assert!(engine.scb(handle).unwrap().media_queue.is_empty());

    // congested until the transport confirms the write
    engine.platform_mut().frames.push_back((2, 200));
    run(&mut engine, Event::stream(handle, StreamEvent::SrcDataReady));
    assert_eq!(engine.platform().count(|c| matches!(c, Call::WriteMedia { .. })), 1);
    run(&mut engine, transport(handle, TransportCallback::WriteCfm));
    assert!(engine.platform().called(&Call::WriteMedia {
        avdt_handle: 1,
        timestamp: 200
    }));
}

#[test]
fn test_second_stream_joins_and_queue_is_bounded() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let h0 = register(&mut engine);
    let h1 = register(&mut engine);
    engine.platform_mut().set_role(PEER_A, LinkRole::Master);
    engine.platform_mut().set_role(PEER_B, LinkRole::Master);
    open_stream(&mut engine, h0, PEER_A);
    start_stream(&mut engine, h0);

    open_stream(&mut engine, h1, PEER_B);
    assert!(engine.platform().events.contains(&AvEvent::Opened {
        handle: h1,
        peer: PEER_B,
        status: Status::Success,
        starting: true,
        mtu: 660,
        peer_sep: Tsep::Sink,
    }));
    assert!(engine.platform().called(&Call::StartReq(2)));
    assert!(engine.platform().called(&Call::FlushTimeout {
        peer: PEER_A,
        timeout: 100
    }));
    run(&mut engine, transport(h1, TransportCallback::StartCfm { err: 0 }));
    assert!(engine.platform().called(&Call::FlushTimeout {
        peer: PEER_B,
        timeout: 100
    }));
    assert_eq!(engine.control_block().audio_streams, 0b11);

    // every fresh frame of stream 0 is copied to stream 1, which never drains
    for i in 1..=8 {
        engine.platform_mut().frames.push_back((i, i));
    }
    run(&mut engine, Event::stream(h0, StreamEvent::SrcDataReady));
    for _ in 0..7 {
        run(&mut engine, transport(h0, TransportCallback::WriteCfm));
    }
    assert_eq!(engine.platform().count(|c| matches!(c, Call::WriteMedia { avdt_handle: 1, .. })), 8);
    assert_eq!(engine.scb(h1).unwrap().media_queue.len(), 5);
    assert_eq!(engine.platform().count(|c| *c == Call::CoDropped(h1)), 3);
}

#[test]
fn test_sco_suspends_and_restarts() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);
    open_stream(&mut engine, handle, PEER_A);
    start_stream(&mut engine, handle);

    run(&mut engine, Event::System(SystemEvent::ScoChange { open: true }));
    assert!(engine.platform().called(&Call::SuspendReq(1)));
    run(&mut engine, transport(handle, TransportCallback::SuspendCfm { err: 0 }));
    assert!(matches!(
        engine.platform().last_event(),
        Some(AvEvent::Suspended {
            status: Status::Success,
            ..
        })
    ));

    run(&mut engine, Event::System(SystemEvent::ScoChange { open: false }));
    assert_eq!(engine.platform().count(|c| matches!(c, Call::StartReq(_))), 2);

    // a start while SCO is up fails without reaching the peer
    run(&mut engine, Event::System(SystemEvent::ScoChange { open: true }));
    run(&mut engine, Event::stream(handle, StreamEvent::ApiStart));
    assert_eq!(engine.platform().count(|c| matches!(c, Call::StartReq(_))), 2);
    assert!(matches!(
        engine.platform().last_event(),
        Some(AvEvent::Started {
            status: Status::Fail,
            ..
        })
    ));
}

#[test]
fn test_security_and_delay_report() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);
    open_stream(&mut engine, handle, PEER_A);

    let data = Vec::from_slice(&[0x01, 0x02]).unwrap();
    run(&mut engine, transport(handle, TransportCallback::SecurityInd { label: 4, data }));
    assert!(engine.platform().called(&Call::SecurityRsp { err: avdt_err::NSC }));
    assert_eq!(engine.platform().count_events(|e| matches!(e, AvEvent::ProtectReq { .. })), 0);

    run(&mut engine, transport(handle, TransportCallback::DelayReport(1500)));
    assert!(engine.platform().called(&Call::CoDelay(1500)));
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::SinkDelayReport { handle, delay: 1500 })
    );

    run(&mut engine, Event::stream(handle, StreamEvent::ApiSetDelayValue(200)));
    assert!(engine.platform().called(&Call::DelayReport(200)));
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::DelayValueSet {
            handle,
            status: Status::Success,
            delay: 200,
        })
    );
}

#[test]
fn test_protected_security_request_reaches_application() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, Features::PROTECT);
    let handle = register(&mut engine);
    open_stream(&mut engine, handle, PEER_A);

    let data: crate::event::SecurityData = Vec::from_slice(&[0x07]).unwrap();
    run(
        &mut engine,
        transport(handle, TransportCallback::SecurityInd { label: 4, data: data.clone() }),
    );
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::ProtectReq { handle, data })
    );
    assert_eq!(engine.scb(handle).unwrap().avdt_label, 4);
}

#[test]
fn test_acceptor_open() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);

    run(&mut engine, transport(handle, TransportCallback::ConnectInd { peer: PEER_A, acceptor: true }));
    assert_eq!(engine.platform().last_event(), Some(&AvEvent::Pending { peer: PEER_A }));
    assert_eq!(engine.stream_state(handle), Some(StreamState::Incoming));
    assert!(engine.platform().armed(TimerSlot::AcpSignalling));

    let ind = ConfigIndication {
        label: 3,
        int_seid: 5,
        avdt_handle: 1,
        peer: PEER_A,
        cfg: sbc_caps(),
    };
    run(&mut engine, transport(handle, TransportCallback::ConfigInd(ind)));
    assert!(engine.platform().called(&Call::CoSetcfg { seid: 5 }));
    assert!(!engine.platform().armed(TimerSlot::AcpSignalling));

    let ok = StreamEvent::CiSetconfigOk {
        num_seps: 1,
        seids: Vec::new(),
        recfg_needed: false,
        avdt_handle: 1,
    };
    run(&mut engine, Event::stream(handle, ok));
    assert!(engine.platform().called(&Call::ConfigRsp {
        avdt_handle: 1,
        err: 0
    }));
    assert!(engine.platform().called(&Call::GetCaps { seid: 5, all: false }));

    run(&mut engine, transport(handle, TransportCallback::GetcapCfm { err: 0, cfg: sbc_caps() }));
    run(&mut engine, transport(handle, TransportCallback::OpenInd { peer_mtu: 672 }));
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::Opened {
            handle,
            peer: PEER_A,
            status: Status::Success,
            starting: false,
            mtu: 660,
            peer_sep: Tsep::Sink,
        })
    );
    assert_eq!(engine.stream_state(handle), Some(StreamState::Open));
}

#[test]
fn test_acceptor_rejects_unsupported_configuration() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);

    let ind = ConfigIndication {
        label: 3,
        int_seid: 5,
        avdt_handle: 1,
        peer: PEER_A,
        cfg: StreamConfig {
            num_codec: 0,
            ..sbc_caps()
        },
    };
    run(&mut engine, transport(handle, TransportCallback::ConfigInd(ind)));
    assert!(engine.platform().called(&Call::ConfigRsp {
        avdt_handle: 1,
        err: avdt_err::UNSUP_CFG
    }));
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::Rejected { handle, peer: PEER_A })
    );
    assert_eq!(engine.stream_state(handle), Some(StreamState::Init));
}

#[test]
fn test_rc_only_connection_lifecycle() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, Features::RCTG | Features::RCCT);
    register(&mut engine);
    assert!(engine.platform().called(&Call::RegisterAvct));
    assert!(engine.platform().called(&Call::RcOpen {
        acceptor: true,
        handle: 0
    }));
    assert_eq!(engine.control_block().rc_acp_handle, 0);

    run(&mut engine, Event::Main(MainEvent::AvrcOpen { rc_handle: 0, peer: PEER_A }));
    assert_eq!(engine.main_state(), MainState::Open);
    assert!(engine.platform().called(&Call::FindAvrc(PEER_A)));
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::RcOpened {
            rc_handle: 0,
            peer: PEER_A,
            peer_features: Features(Features::RCCT),
            status: Status::Success,
            sdp_disc_done: false,
        })
    );
    assert_eq!(engine.lcbs()[MAX_LINKS].addr, PEER_A);

    let records = Vec::from_slice(&[RcSdpRecord {
        service_uuid: crate::constants::uuid::AV_REM_CTRL_TARGET,
        version: 0x0104,
        categories: 0,
    }])
    .unwrap();
    run(&mut engine, Event::System(SystemEvent::AvrcSdpDone(records)));
    match engine.platform().last_event() {
        Some(AvEvent::RcFeatures {
            rc_handle: 0,
            peer,
            peer_features,
        }) => {
            assert_eq!(*peer, PEER_A);
            assert!(peer_features.has(Features::RCTG | Features::METADATA));
        }
        other => panic!("unexpected {other:?}"),
    }

    run(
        &mut engine,
        Event::Main(MainEvent::RemoteCmd {
            rc_handle: 0,
            label: 1,
            op_id: 0x44,
            pressed: true,
        }),
    );
    assert!(engine.platform().called(&Call::RcPassCmd { op_id: 0x44 }));

    let play = RcMessage::PassThrough(PassThrough {
        ctype: ctype::CTRL,
        op_id: 0x44,
        pressed: true,
        data: RcData::new(),
    });
    run(
        &mut engine,
        Event::Main(MainEvent::AvrcMsg {
            rc_handle: 0,
            label: 2,
            msg: play,
        }),
    );
    assert!(engine.platform().called(&Call::RcPassRsp {
        code: rsp::ACCEPT,
        op_id: 0x44
    }));
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::RemoteCmd {
            rc_handle: 0,
            label: 2,
            op_id: 0x44,
            pressed: true,
        })
    );

    run(&mut engine, Event::System(SystemEvent::AvrcClosed { rc_handle: 0, peer: PEER_A }));
    assert_eq!(engine.main_state(), MainState::Init);
    assert!(engine.platform().called(&Call::RcOpen {
        acceptor: true,
        handle: 1
    }));
    assert_eq!(engine.control_block().rc_acp_handle, 1);
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::RcClosed {
            rc_handle: 0,
            peer: PEER_A,
        })
    );
}

#[test]
fn test_listener_accepting_a_stream_peer_hands_over() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, Features::RCTG | Features::RCCT);
    let handle = register(&mut engine);
    open_stream(&mut engine, handle, PEER_A);

    run(&mut engine, Event::stream(handle, StreamEvent::ApiRcOpen));
    assert!(engine.platform().called(&Call::FindAvrc(PEER_A)));
    let records = Vec::from_slice(&[RcSdpRecord {
        service_uuid: crate::constants::uuid::AV_REM_CTRL_TARGET,
        version: 0x0104,
        categories: 0,
    }])
    .unwrap();
    run(&mut engine, Event::System(SystemEvent::AvrcSdpDone(records)));
    assert!(engine.platform().called(&Call::RcOpen {
        acceptor: false,
        handle: 1
    }));
    assert_eq!(engine.rcbs()[1].shdl, 1);

    // the peer connects to the listener instead of answering our initiator
    run(&mut engine, Event::Main(MainEvent::AvrcOpen { rc_handle: 0, peer: PEER_A }));
    let rcbs = engine.rcbs();
    assert_eq!((rcbs[0].shdl, rcbs[0].lidx), (1, 1));
    assert!(rcbs[0].is_connected());
    assert_eq!((rcbs[1].shdl, rcbs[1].lidx), (0, crate::constants::RC_ONLY_LINK_INDEX));
    assert_eq!(engine.control_block().rc_acp_handle, 1);
    assert_eq!(engine.scb(handle).unwrap().rc_handle, 0);
    assert_eq!(engine.main_state(), MainState::Open);
}

#[test]
fn test_unsupported_pass_through_is_not_implemented() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, Features::RCTG);
    register(&mut engine);
    engine.platform_mut().unsupported_ops.push(0x41);
    run(&mut engine, Event::Main(MainEvent::AvrcOpen { rc_handle: 0, peer: PEER_A }));
    let events = engine.platform().events.len();

    let msg = RcMessage::PassThrough(PassThrough {
        ctype: ctype::CTRL,
        op_id: 0x41,
        pressed: true,
        data: RcData::new(),
    });
    run(&mut engine, Event::Main(MainEvent::AvrcMsg { rc_handle: 0, label: 5, msg }));
    assert!(engine.platform().called(&Call::RcPassRsp {
        code: rsp::NOT_IMPL,
        op_id: 0x41
    }));
    assert_eq!(engine.platform().events.len(), events);
}

#[test]
fn test_rc_events_ignored_without_connection() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, Features::RCCT);
    register(&mut engine);
    let calls = engine.platform().calls.len();
    run(
        &mut engine,
        Event::Main(MainEvent::RemoteCmd {
            rc_handle: 0,
            label: 1,
            op_id: 0x44,
            pressed: true,
        }),
    );
    assert_eq!(engine.platform().calls.len(), calls);
    assert_eq!(engine.main_state(), MainState::Init);
}

#[test]
fn test_pending_notification_repeats() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, 0);
    let handle = register(&mut engine);
    run(&mut engine, transport(handle, TransportCallback::ConnectInd { peer: PEER_A, acceptor: true }));
    assert_eq!(engine.platform().count_events(|e| matches!(e, AvEvent::Pending { .. })), 1);

    let tick = engine.platform_mut().fire(TimerSlot::Signalling).unwrap();
    run(&mut engine, tick);
    assert_eq!(engine.platform().count_events(|e| matches!(e, AvEvent::Pending { .. })), 2);
    assert!(engine.platform().armed(TimerSlot::Signalling));
}

#[test]
fn test_rc_lookup_that_cannot_start_still_reports_features() {
    let queue = EventQueue::new();
    let mut engine = enabled(&queue, Features::RCTG | Features::RCCT);
    register(&mut engine);
    engine.platform_mut().avrc_lookup_fails = true;

    run(&mut engine, Event::Main(MainEvent::AvrcOpen { rc_handle: 0, peer: PEER_A }));
    assert!(engine.platform().called(&Call::FindAvrc(PEER_A)));
    assert_eq!(engine.control_block().rc_disc, None);
    assert_eq!(
        engine.platform().last_event(),
        Some(&AvEvent::RcFeatures {
            rc_handle: 0,
            peer: PEER_A,
            peer_features: Features(0),
        })
    );
}
