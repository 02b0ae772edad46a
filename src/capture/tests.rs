//! Capture-orchestration tests against the stateful fake camera.
//!
//! Anything that sleeps runs on the paused tokio clock, so the long
//! completion budgets cost nothing in wall time.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::capture::{
    CapturePhase, CaptureSequencer, CaptureStrategy, CaptureTuning, CompletionSignal, EventSource,
    Liveview, LiveviewStrategy, ObjectLocation, TriggerMethod,
};
use crate::capture::strategy::CaptureFault;
use crate::error::PtpError;
use crate::proto::{DevicePropCode, EventCode, ObjectHandle, OpCode, ResponseCode};
use crate::session::PtpSession;
use crate::testing::{VirtualCamera, VirtualDevice};
use crate::transport::{TransferContext, UsbTransport};
use crate::types::PtpConfig;

fn test_config() -> PtpConfig {
    PtpConfig::builder()
        .capture_timeout(Duration::from_secs(5))
        .backoff(
            Duration::from_millis(20),
            Duration::from_millis(50),
            Duration::from_millis(200),
        )
        .build()
}

async fn open_session(device: VirtualDevice) -> PtpSession<UsbTransport<VirtualCamera>> {
    let config = test_config();
    let transport = UsbTransport::new(VirtualCamera::new(device), &config);
    let mut session = PtpSession::new(transport, config);
    session.open().await.unwrap();
    session
}

#[tokio::test]
async fn test_capture_downloads_the_announced_object() {
    let mut device = VirtualDevice::new();
    device.set_capture_payload(vec![0x42; 4096]);
    let mut session = open_session(device).await;

    let mut sequencer = CaptureSequencer::for_session(&session).unwrap();
    assert_eq!(sequencer.strategy().name, "standard");

    let outcome = sequencer
        .capture(&mut session, &mut TransferContext::new())
        .await
        .unwrap();
    assert_eq!(outcome.data, vec![0x42; 4096]);
    assert_eq!(
        outcome.info.unwrap().filename,
        "CAPT0001.JPG"
    );
    assert_eq!(sequencer.phase(), CapturePhase::Idle);
}

#[tokio::test]
async fn test_capture_completes_with_events_in_either_order() {
    let mut device = VirtualDevice::new();
    device.announce_complete_first();
    let mut session = open_session(device).await;

    let mut sequencer = CaptureSequencer::for_session(&session).unwrap();
    let outcome = sequencer
        .capture(&mut session, &mut TransferContext::new())
        .await
        .unwrap();
    assert!(!outcome.data.is_empty());
}

#[tokio::test]
async fn test_object_event_alone_completes_when_complete_is_not_advertised() {
    // Firmware that never sends CaptureComplete and does not advertise
    // it: the object announcement alone finishes the wait.
    let mut device = VirtualDevice::new();
    device.info.events.retain(|&code| code != EventCode::CAPTURE_COMPLETE);
    device.announce_object_only();
    let mut session = open_session(device).await;

    let mut sequencer = CaptureSequencer::for_session(&session).unwrap();
    let outcome = sequencer
        .capture(&mut session, &mut TransferContext::new())
        .await
        .unwrap();
    assert_eq!(outcome.info.unwrap().filename, "CAPT0001.JPG");
}

#[tokio::test(start_paused = true)]
async fn test_busy_trigger_retries_on_backoff() {
    let mut device = VirtualDevice::new();
    device.busy_captures(3);
    let mut session = open_session(device).await;

    let mut sequencer = CaptureSequencer::for_session(&session).unwrap();
    let outcome = sequencer
        .capture(&mut session, &mut TransferContext::new())
        .await
        .unwrap();
    assert!(!outcome.data.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_silent_capture_times_out_with_no_object() {
    let mut device = VirtualDevice::new();
    device.suppress_capture_events();
    let mut session = open_session(device).await;

    let mut sequencer = CaptureSequencer::for_session(&session).unwrap();
    let err = sequencer
        .capture(&mut session, &mut TransferContext::new())
        .await
        .unwrap_err();
    match err {
        PtpError::NoObjectProduced { waited } => {
            assert!(waited >= Duration::from_secs(5));
        }
        other => panic!("expected NoObjectProduced, got {other:?}"),
    }
    assert_eq!(sequencer.phase(), CapturePhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_mid_wait_cancels_in_flight() {
    let mut device = VirtualDevice::new();
    device.suppress_capture_events();
    let mut session = open_session(device).await;

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });

    let mut sequencer = CaptureSequencer::for_session(&session).unwrap();
    let mut ctx = TransferContext::new().with_cancellation(token);
    let err = sequencer.capture(&mut session, &mut ctx).await.unwrap_err();
    assert!(matches!(err, PtpError::Cancelled));
    // The session synthesized the cancellation record.
    assert_eq!(
        session.last_response().unwrap().code,
        ResponseCode::TRANSACTION_CANCELLED
    );
}

#[tokio::test(start_paused = true)]
async fn test_listing_diff_finds_the_new_object() {
    let mut device = VirtualDevice::new();
    // No events advertised at all: the strategy falls back to diffing
    // the object listing.
    device.info.events.clear();
    device.suppress_capture_events();
    device.add_object("OLD_0001.JPG", vec![1; 8]);
    let mut session = open_session(device).await;

    let mut sequencer = CaptureSequencer::for_session(&session).unwrap();
    assert_eq!(
        sequencer.strategy().completion,
        CompletionSignal::ListingDiff
    );

    let outcome = sequencer
        .capture(&mut session, &mut TransferContext::new())
        .await
        .unwrap();
    assert_eq!(outcome.info.unwrap().filename, "CAPT0001.JPG");
}

const SLOW_EXPOSURE_WAITS: &[(u32, Duration)] = &[
    (10_000, Duration::from_secs(5)),
    (100_000, Duration::from_secs(15)),
];

#[tokio::test(start_paused = true)]
async fn test_long_exposure_widens_the_completion_wait() {
    let mut device = VirtualDevice::new();
    // A 10 s exposure, reported in 0.1 ms units.
    device.set_exposure_time(100_000);
    device.suppress_capture_events();
    let mut session = open_session(device).await;

    let strategy = CaptureStrategy {
        tuning: CaptureTuning {
            exposure_wait: SLOW_EXPOSURE_WAITS,
            extra_wait: Duration::ZERO,
        },
        ..CaptureStrategy::select(session.device_info().unwrap(), session.config())
    };
    let mut sequencer = CaptureSequencer::new(strategy);
    let err = sequencer
        .capture(&mut session, &mut TransferContext::new())
        .await
        .unwrap_err();
    match err {
        PtpError::NoObjectProduced { waited } => {
            // 5 s configured wait plus the 15 s the table grants.
            assert!(waited >= Duration::from_secs(20), "waited only {waited:?}");
        }
        other => panic!("expected NoObjectProduced, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_short_exposure_keeps_the_configured_wait() {
    let mut device = VirtualDevice::new();
    // 1/100 s, well below the first table threshold.
    device.set_exposure_time(100);
    device.suppress_capture_events();
    let mut session = open_session(device).await;

    let strategy = CaptureStrategy {
        tuning: CaptureTuning {
            exposure_wait: SLOW_EXPOSURE_WAITS,
            extra_wait: Duration::ZERO,
        },
        ..CaptureStrategy::select(session.device_info().unwrap(), session.config())
    };
    let mut sequencer = CaptureSequencer::new(strategy);
    let err = sequencer
        .capture(&mut session, &mut TransferContext::new())
        .await
        .unwrap_err();
    match err {
        PtpError::NoObjectProduced { waited } => {
            assert!(waited >= Duration::from_secs(5));
            assert!(waited < Duration::from_secs(6), "waited {waited:?}");
        }
        other => panic!("expected NoObjectProduced, got {other:?}"),
    }
}

const FOCUS_FAULTS: &[(ResponseCode, CaptureFault)] =
    &[(ResponseCode(0xA002), CaptureFault::Focus)];

#[tokio::test]
async fn test_vendor_failure_refines_through_the_error_table() {
    let mut device = VirtualDevice::new();
    device.fail_capture_with(ResponseCode(0xA002));
    let mut session = open_session(device).await;

    let strategy = CaptureStrategy {
        error_table: FOCUS_FAULTS,
        ..CaptureStrategy::select(session.device_info().unwrap(), session.config())
    };
    let mut sequencer = CaptureSequencer::new(strategy);
    let err = sequencer
        .capture(&mut session, &mut TransferContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PtpError::NoFocus));
}

#[tokio::test]
async fn test_unlisted_vendor_code_stays_a_general_failure() {
    let mut device = VirtualDevice::new();
    device.fail_capture_with(ResponseCode(0xA777));
    let mut session = open_session(device).await;

    let mut sequencer = CaptureSequencer::for_session(&session).unwrap();
    let err = sequencer
        .capture(&mut session, &mut TransferContext::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PtpError::GeneralFailure {
            code: ResponseCode(0xA777)
        }
    ));
}

/// A press-to-capture family built from operations the fake device
/// serves, shaped like the property-press vendors.
fn press_strategy(handle: ObjectHandle) -> CaptureStrategy {
    CaptureStrategy {
        name: "press-test",
        trigger: TriggerMethod::PropertyPress {
            op: OpCode::SET_DEVICE_PROP_VALUE,
            half: DevicePropCode::WHITE_BALANCE,
            full: DevicePropCode::WHITE_BALANCE,
        },
        completion: CompletionSignal::PropertyThreshold {
            property: DevicePropCode::WHITE_BALANCE,
            base: 1,
        },
        location: ObjectLocation::PendingFetch { handle },
        event_source: EventSource::Interrupt,
        object_added_events: vec![EventCode::OBJECT_ADDED],
        complete_events: vec![],
        autofocus_op: None,
        ready_op: None,
        cleanup_op: None,
        error_table: &[],
        tuning: CaptureTuning::default(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_property_press_with_threshold_and_pending_fetch() {
    let mut device = VirtualDevice::new();
    let staged = device.add_object("STAGED.JPG", vec![7; 256]);
    let mut session = open_session(device).await;

    let mut sequencer = CaptureSequencer::new(press_strategy(staged));
    let outcome = sequencer
        .capture(&mut session, &mut TransferContext::new())
        .await
        .unwrap();
    assert_eq!(outcome.handle, staged);
    assert_eq!(outcome.data, vec![7; 256]);
}

#[tokio::test(start_paused = true)]
async fn test_pending_fetch_gives_up_when_the_object_never_lands() {
    let mut session = open_session(VirtualDevice::new()).await;

    // The pseudo-handle never resolves to a stored object.
    let mut sequencer = CaptureSequencer::new(press_strategy(ObjectHandle(0xFFFF_C001)));
    let err = sequencer
        .capture(&mut session, &mut TransferContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PtpError::NoObjectProduced { .. }));
}

#[tokio::test]
async fn test_capture_requires_an_open_session() {
    let config = test_config();
    let transport = UsbTransport::new(VirtualCamera::new(VirtualDevice::new()), &config);
    let session = PtpSession::new(transport, config);
    let err = CaptureSequencer::for_session(&session).unwrap_err();
    assert!(matches!(err, PtpError::InvalidState { .. }));
}

/// A liveview family built from the stock `GetObject`, standing in for
/// the vendor frame fetch.
fn frame_strategy(handle: ObjectHandle) -> LiveviewStrategy {
    LiveviewStrategy {
        name: "frame-test",
        start_op: None,
        frame_op: OpCode::GET_OBJECT,
        frame_params: vec![handle.0],
        stop_op: None,
        prohibit_property: None,
    }
}

#[tokio::test]
async fn test_liveview_strips_the_vendor_frame_header() {
    let mut device = VirtualDevice::new();
    let mut frame = vec![0u8; 32];
    frame.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE1, 9, 9]);
    let handle = device.add_object("FRAME.JPG", frame);
    let mut session = open_session(device).await;

    let mut liveview = Liveview::new(frame_strategy(handle));
    assert!(!liveview.is_running());
    liveview.start(&mut session).await.unwrap();
    assert!(liveview.is_running());

    let jpeg = liveview.frame(&mut session).await.unwrap();
    assert_eq!(jpeg, vec![0xFF, 0xD8, 0xFF, 0xE1, 9, 9]);

    liveview.stop(&mut session).await.unwrap();
    assert!(!liveview.is_running());
}

#[tokio::test]
async fn test_liveview_frame_requires_start() {
    let mut session = open_session(VirtualDevice::new()).await;
    let mut liveview = Liveview::new(frame_strategy(ObjectHandle(0x1001)));
    let err = liveview.frame(&mut session).await.unwrap_err();
    assert!(matches!(err, PtpError::InvalidState { .. }));
}
