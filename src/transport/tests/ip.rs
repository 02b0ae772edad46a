//! PTP/IP transport tests against the TCP mock device.

use std::time::Duration;

use crate::codec::DeviceInfo;
use crate::error::PtpError;
use crate::proto::{EventCode, OpCode, ResponseCode, StorageId};
use crate::testing::{test_object_info, MockDevice, MockDeviceConfig, VirtualDevice};
use crate::transport::{DataReply, IpTransport, Request, Transport, TransferContext};
use crate::types::PtpConfig;

fn test_config() -> PtpConfig {
    PtpConfig::builder()
        .normal_timeout(Duration::from_secs(2))
        .event_check_timeout(Duration::from_millis(50))
        .host_name("ptplink-test")
        .build()
}

async fn connect(device: VirtualDevice) -> (MockDevice, IpTransport) {
    let server = MockDevice::start(device).await.unwrap();
    let transport = IpTransport::connect(server.addr(), &test_config())
        .await
        .unwrap();
    (server, transport)
}

async fn open_session(transport: &mut IpTransport) {
    let request = Request::new(OpCode::OPEN_SESSION, 1, &[1]);
    transport.send_request(&request).await.unwrap();
    let response = transport.get_response(&request).await.unwrap();
    assert_eq!(response.code, ResponseCode::OK);
}

#[tokio::test]
async fn test_handshake_reports_device_identity() {
    let (_server, transport) = connect(VirtualDevice::new()).await;
    assert_eq!(transport.connection_number(), 1);
    assert_eq!(transport.device_name(), "virtual ptpip camera");
    assert_eq!(&transport.device_guid(), b"ptplink-mock-cam");
}

#[tokio::test]
async fn test_refused_handshake_surfaces_the_reason() {
    let config = MockDeviceConfig {
        refuse_reason: Some(0x0000_0201),
        ..MockDeviceConfig::default()
    };
    let server = MockDevice::start_with(VirtualDevice::new(), config)
        .await
        .unwrap();
    let err = IpTransport::connect(server.addr(), &test_config())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PtpError::ConnectionRejected {
            reason: 0x0000_0201
        }
    ));
}

#[tokio::test]
async fn test_leftover_end_data_is_skipped_before_the_response() {
    // Firmware that never rewinds an aborted data phase trails an
    // empty EndData in front of every response.
    let config = MockDeviceConfig {
        stray_end_data: true,
        ..MockDeviceConfig::default()
    };
    let server = MockDevice::start_with(VirtualDevice::new(), config)
        .await
        .unwrap();
    let mut transport = IpTransport::connect(server.addr(), &test_config())
        .await
        .unwrap();
    open_session(&mut transport).await;

    // A second dataless transaction shows the framing stayed aligned
    // after the first skip.
    let request = Request::new(OpCode::DELETE_OBJECT, 2, &[0xDEAD, 0]);
    transport.send_request(&request).await.unwrap();
    let response = transport.get_response(&request).await.unwrap();
    assert_eq!(response.code, ResponseCode::INVALID_OBJECT_HANDLE);
    assert_eq!(response.transaction_id, 2);
}

#[tokio::test]
async fn test_data_in_transaction() {
    let (_server, mut transport) = connect(VirtualDevice::new()).await;

    let request = Request::new(OpCode::GET_DEVICE_INFO, 1, &[]);
    transport.send_request(&request).await.unwrap();
    let reply = transport
        .get_data(&request, &mut TransferContext::new())
        .await
        .unwrap();
    let DataReply::Payload(bytes) = reply else {
        panic!("expected a data phase");
    };
    let info = DeviceInfo::decode(&bytes, transport.endian());
    assert_eq!(info.model, "Example X100");

    let response = transport.get_response(&request).await.unwrap();
    assert_eq!(response.code, ResponseCode::OK);
    assert_eq!(response.transaction_id, 1);
}

#[tokio::test]
async fn test_data_out_transaction_round_trips_an_upload() {
    let (server, mut transport) = connect(VirtualDevice::new()).await;
    open_session(&mut transport).await;

    let info = test_object_info(StorageId(0x0001_0001), "UPLOAD.JPG", 5);
    let bytes = info.to_bytes(transport.endian()).unwrap();
    let request = Request::new(OpCode::SEND_OBJECT_INFO, 2, &[0, 0]);
    transport.send_request(&request).await.unwrap();
    transport.send_data(&request, &bytes).await.unwrap();
    let response = transport.get_response(&request).await.unwrap();
    assert_eq!(response.code, ResponseCode::OK);
    let handle = response.param(2).unwrap();

    let request = Request::new(OpCode::SEND_OBJECT, 3, &[]);
    transport.send_request(&request).await.unwrap();
    transport.send_data(&request, b"pixel").await.unwrap();
    let response = transport.get_response(&request).await.unwrap();
    assert_eq!(response.code, ResponseCode::OK);

    // Read it back through the data phase.
    let request = Request::new(OpCode::GET_OBJECT, 4, &[handle]);
    transport.send_request(&request).await.unwrap();
    let reply = transport
        .get_data(&request, &mut TransferContext::new())
        .await
        .unwrap();
    assert_eq!(reply, DataReply::Payload(b"pixel".to_vec()));
    transport.get_response(&request).await.unwrap();
    drop(server);
}

#[tokio::test]
async fn test_error_short_circuit_parks_the_response() {
    let (_server, mut transport) = connect(VirtualDevice::new()).await;
    open_session(&mut transport).await;

    let request = Request::new(OpCode::GET_OBJECT, 2, &[0xDEAD]);
    transport.send_request(&request).await.unwrap();
    let reply = transport
        .get_data(&request, &mut TransferContext::new())
        .await
        .unwrap();
    let DataReply::Response(response) = reply else {
        panic!("expected the error response in place of data");
    };
    assert_eq!(response.code, ResponseCode::INVALID_OBJECT_HANDLE);

    let response = transport.get_response(&request).await.unwrap();
    assert_eq!(response.code, ResponseCode::INVALID_OBJECT_HANDLE);
}

#[tokio::test]
async fn test_capture_events_arrive_on_the_event_channel() {
    let (_server, mut transport) = connect(VirtualDevice::new()).await;
    open_session(&mut transport).await;

    let request = Request::new(OpCode::INITIATE_CAPTURE, 2, &[0, 0]);
    transport.send_request(&request).await.unwrap();
    let response = transport.get_response(&request).await.unwrap();
    assert_eq!(response.code, ResponseCode::OK);

    let added = transport
        .wait_event(Duration::from_secs(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(added.code, EventCode::OBJECT_ADDED);
    assert!(added.param(0).is_some());

    let complete = transport
        .wait_event(Duration::from_secs(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(complete.code, EventCode::CAPTURE_COMPLETE);

    // Quiet channel polls back as None, not an error.
    assert!(transport.check_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_reset_is_not_available_over_ip() {
    let (_server, mut transport) = connect(VirtualDevice::new()).await;
    let err = transport.reset_device().await.unwrap_err();
    assert!(matches!(err, PtpError::InvalidState { .. }));
}
