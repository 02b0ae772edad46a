//! Integration tests for the PTP/IP transport over real TCP sockets.
//!
//! Runs the session and capture layers against the loopback mock
//! device, exercising the same code paths a networked camera would.

use std::time::Duration;

use ptplink::prelude::*;
use ptplink::testing::{MockDevice, VirtualDevice};
use ptplink::transport::TransferContext;
use ptplink::EventCode;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn test_config() -> PtpConfig {
    PtpConfig::builder()
        .normal_timeout(Duration::from_secs(2))
        .capture_timeout(Duration::from_secs(5))
        .event_check_timeout(Duration::from_millis(50))
        .backoff(
            Duration::from_millis(5),
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .host_name("ptplink-integration")
        .build()
}

async fn connect(device: VirtualDevice) -> (MockDevice, PtpSession<IpTransport>) {
    let server = MockDevice::start(device).await.unwrap();
    let config = test_config();
    let transport = IpTransport::connect(server.addr(), &config).await.unwrap();
    (server, PtpSession::new(transport, config))
}

#[tokio::test]
async fn test_session_over_tcp() {
    init_tracing();
    let mut device = VirtualDevice::new();
    let handle = device.add_object("NET_0001.JPG", vec![0x3C; 100_000]);
    let (_server, mut session) = connect(device).await;

    session.open().await.unwrap();
    assert_eq!(session.device_info().unwrap().model, "Example X100");

    let handles = session.object_handles(StorageId::ALL, None).await.unwrap();
    assert_eq!(handles, vec![handle]);
    let data = session.get_object(handle).await.unwrap();
    assert_eq!(data.len(), 100_000);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_capture_over_tcp() {
    init_tracing();
    let mut device = VirtualDevice::new();
    device.set_capture_payload(vec![0x7E; 16 * 1024]);
    let (_server, mut session) = connect(device).await;
    session.open().await.unwrap();

    let mut sequencer = CaptureSequencer::for_session(&session).unwrap();
    let shot = sequencer
        .capture(&mut session, &mut TransferContext::new())
        .await
        .unwrap();
    assert_eq!(shot.data.len(), 16 * 1024);
    assert_eq!(shot.info.unwrap().filename, "CAPT0001.JPG");
}

#[tokio::test]
async fn test_events_arrive_on_the_event_channel() {
    init_tracing();
    let (_server, mut session) = connect(VirtualDevice::new()).await;
    session.open().await.unwrap();

    session.initiate_capture().await.unwrap();
    let added = session
        .wait_event(Duration::from_secs(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(added.code, EventCode::OBJECT_ADDED);
    let complete = session
        .wait_event(Duration::from_secs(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(complete.code, EventCode::CAPTURE_COMPLETE);
}

#[tokio::test]
async fn test_upload_over_tcp() {
    init_tracing();
    let (_server, mut session) = connect(VirtualDevice::new()).await;
    session.open().await.unwrap();

    let storage = session.storage_ids().await.unwrap()[0];
    let info = ptplink::testing::test_object_info(storage, "REMOTE.DAT", 5);
    let handle = session.send_object_info(storage, None, &info).await.unwrap();
    session.send_object(b"bytes").await.unwrap();
    assert_eq!(session.get_object(handle).await.unwrap(), b"bytes");
}
