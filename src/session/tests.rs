//! Session-layer tests over the stateful fake camera.

use std::time::Duration;

use crate::codec::{PropAccess, PropertyValue};
use crate::error::PtpError;
use crate::proto::{DataTypeCode, DevicePropCode, EventCode, ObjectHandle, OpCode, StorageId};
use crate::session::PtpSession;
use crate::testing::{test_object_info, VirtualCamera, VirtualDevice};
use crate::transport::{Event, UsbTransport};
use crate::types::PtpConfig;

fn test_config() -> PtpConfig {
    PtpConfig::builder()
        .normal_timeout(Duration::from_millis(200))
        .backoff(
            Duration::from_millis(1),
            Duration::from_millis(1),
            Duration::from_millis(5),
        )
        .build()
}

fn session(device: VirtualDevice) -> PtpSession<UsbTransport<VirtualCamera>> {
    let config = test_config();
    let transport = UsbTransport::new(VirtualCamera::new(device), &config);
    PtpSession::new(transport, config)
}

#[tokio::test]
async fn test_open_assigns_session_and_fetches_device_info() {
    let mut session = session(VirtualDevice::new());
    assert!(!session.is_open());

    session.open().await.unwrap();
    assert!(session.is_open());
    assert_eq!(session.session_id(), 1);
    let info = session.device_info().unwrap();
    assert_eq!(info.model, "Example X100");
    assert!(info.supports_operation(OpCode::INITIATE_CAPTURE));
}

#[tokio::test]
async fn test_open_walks_past_stale_session_ids() {
    let mut device = VirtualDevice::new();
    device.reject_opens(2);
    let mut session = session(device);

    session.open().await.unwrap();
    assert_eq!(session.session_id(), 3);
}

#[tokio::test]
async fn test_open_escalates_to_device_reset() {
    // More rejections than retries; only the class reset clears them.
    let mut device = VirtualDevice::new();
    device.reject_opens(10);
    let mut session = session(device);

    session.open().await.unwrap();
    assert_eq!(session.session_id(), 4);
}

#[tokio::test]
async fn test_double_open_is_an_invalid_state() {
    let mut session = session(VirtualDevice::new());
    session.open().await.unwrap();
    let err = session.open().await.unwrap_err();
    assert!(matches!(err, PtpError::InvalidState { .. }));
}

#[tokio::test]
async fn test_device_session_gate_maps_to_session_not_open() {
    let mut session = session(VirtualDevice::new());
    let err = session.storage_ids().await.unwrap_err();
    assert!(matches!(err, PtpError::SessionNotOpen));
}

#[tokio::test]
async fn test_unadvertised_operation_is_refused_locally() {
    let mut session = session(VirtualDevice::new());
    session.open().await.unwrap();

    // The fake's descriptor does not advertise GetThumb.
    let err = session.get_thumb(ObjectHandle(0x1001)).await.unwrap_err();
    assert!(matches!(
        err,
        PtpError::NotSupported {
            op: OpCode::GET_THUMB
        }
    ));
}

#[tokio::test]
async fn test_object_workflow() {
    let mut device = VirtualDevice::new();
    let handle = device.add_object("DSC_0001.JPG", vec![0xAB; 2048]);
    let mut session = session(device);
    session.open().await.unwrap();

    let storages = session.storage_ids().await.unwrap();
    assert_eq!(storages, vec![StorageId(0x0001_0001)]);
    let storage = session.storage_info(storages[0]).await.unwrap();
    assert_eq!(storage.description, "SD card");

    assert_eq!(session.num_objects(StorageId::ALL).await.unwrap(), 1);
    let handles = session.object_handles(StorageId::ALL, None).await.unwrap();
    assert_eq!(handles, vec![handle]);

    let info = session.object_info(handle).await.unwrap();
    assert_eq!(info.filename, "DSC_0001.JPG");
    assert_eq!(info.object_compressed_size, 2048);

    let data = session.get_object(handle).await.unwrap();
    assert_eq!(data.len(), 2048);
    let slice = session.get_partial_object(handle, 2000, 100).await.unwrap();
    assert_eq!(slice.len(), 48);

    session.delete_object(handle).await.unwrap();
    let err = session.object_info(handle).await.unwrap_err();
    assert!(matches!(err, PtpError::InvalidObjectHandle));
}

#[tokio::test]
async fn test_object_info_is_served_from_cache_while_fresh() {
    let mut device = VirtualDevice::new();
    let handle = device.add_object("DSC_0002.JPG", vec![1; 16]);
    let config = PtpConfig::builder()
        .object_cache_ttl(Duration::from_secs(60))
        .build();
    let transport = UsbTransport::new(VirtualCamera::new(device), &config);
    let mut session = PtpSession::new(transport, config);
    session.open().await.unwrap();

    session.object_info(handle).await.unwrap();

    // Delete behind the cache's back; the raw command skips the
    // bookkeeping the typed wrapper does.
    session
        .command(OpCode::DELETE_OBJECT, &[handle.0, 0])
        .await
        .unwrap();

    let info = session.object_info(handle).await.unwrap();
    assert_eq!(info.filename, "DSC_0002.JPG");
}

#[tokio::test]
async fn test_upload_round_trip() {
    let mut session = session(VirtualDevice::new());
    session.open().await.unwrap();

    let info = test_object_info(StorageId(0x0001_0001), "UPLOAD.JPG", 9);
    let handle = session
        .send_object_info(StorageId(0x0001_0001), None, &info)
        .await
        .unwrap();
    session.send_object(b"nine byte").await.unwrap();

    let data = session.get_object(handle).await.unwrap();
    assert_eq!(data, b"nine byte");
}

#[tokio::test]
async fn test_send_object_without_info_is_refused() {
    let mut session = session(VirtualDevice::new());
    session.open().await.unwrap();

    let err = session.send_object(b"data").await.unwrap_err();
    assert!(matches!(err, PtpError::GeneralFailure { .. }));
}

#[tokio::test]
async fn test_property_read_and_write() {
    let mut session = session(VirtualDevice::new());
    session.open().await.unwrap();

    let desc = session.prop_desc(DevicePropCode::WHITE_BALANCE).await.unwrap();
    assert_eq!(desc.access, PropAccess::ReadWrite);
    assert_eq!(desc.datatype, DataTypeCode::UINT16);

    let value = session
        .prop_value(DevicePropCode::WHITE_BALANCE, DataTypeCode::UINT16)
        .await
        .unwrap();
    assert_eq!(value, PropertyValue::U16(2));

    session
        .set_prop_value(DevicePropCode::WHITE_BALANCE, &PropertyValue::U16(4))
        .await
        .unwrap();
    let value = session
        .prop_value(DevicePropCode::WHITE_BALANCE, DataTypeCode::UINT16)
        .await
        .unwrap();
    assert_eq!(value, PropertyValue::U16(4));

    // 3 is outside the advertised enumeration.
    let err = session
        .set_prop_value(DevicePropCode::WHITE_BALANCE, &PropertyValue::U16(3))
        .await
        .unwrap_err();
    assert!(matches!(err, PtpError::BadParameter { .. }));

    let err = session
        .set_prop_value(DevicePropCode::BATTERY_LEVEL, &PropertyValue::U8(50))
        .await
        .unwrap_err();
    assert!(matches!(err, PtpError::AccessDenied));
}

#[tokio::test]
async fn test_capture_queues_events_in_device_order() {
    let mut session = session(VirtualDevice::new());
    session.open().await.unwrap();

    session.initiate_capture().await.unwrap();
    assert_eq!(session.poll_events().await.unwrap(), 2);

    let added = session.events().pop().unwrap();
    assert_eq!(added.code, EventCode::OBJECT_ADDED);
    let complete = session.events().pop().unwrap();
    assert_eq!(complete.code, EventCode::CAPTURE_COMPLETE);
    assert!(session.events().pop().is_none());
}

#[tokio::test]
async fn test_busy_capture_maps_and_clears() {
    let mut device = VirtualDevice::new();
    device.busy_captures(1);
    let mut session = session(device);
    session.open().await.unwrap();

    let err = session.initiate_capture().await.unwrap_err();
    assert!(matches!(err, PtpError::DeviceBusy));
    session.initiate_capture().await.unwrap();
}

#[tokio::test]
async fn test_wait_event_prefers_the_queue() {
    let mut session = session(VirtualDevice::new());
    session.open().await.unwrap();

    session.events().push(Event {
        code: EventCode::DEVICE_PROP_CHANGED,
        transaction_id: 0,
        params: vec![u32::from(DevicePropCode::WHITE_BALANCE.0)],
    });
    let event = session
        .wait_event(Duration::from_millis(10))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.code, EventCode::DEVICE_PROP_CHANGED);
}

#[tokio::test]
async fn test_wait_event_times_out_quietly() {
    let mut session = session(VirtualDevice::new());
    session.open().await.unwrap();
    let event = session.wait_event(Duration::from_millis(20)).await.unwrap();
    assert!(event.is_none());
}

#[tokio::test]
async fn test_transaction_ids_are_sequential() {
    let mut session = session(VirtualDevice::new());
    // OpenSession is transaction 1, GetDeviceInfo 2.
    session.open().await.unwrap();
    session.storage_ids().await.unwrap();
    assert_eq!(session.last_response().unwrap().transaction_id, 3);
}

#[tokio::test]
async fn test_cancel_in_flight_records_a_cancellation() {
    use crate::proto::ResponseCode;

    let mut session = session(VirtualDevice::new());
    session.open().await.unwrap();
    session.cancel_in_flight().await.unwrap();
    assert_eq!(
        session.last_response().unwrap().code,
        ResponseCode::TRANSACTION_CANCELLED
    );
}

#[tokio::test]
async fn test_close_tears_down_local_state() {
    let mut session = session(VirtualDevice::new());
    session.open().await.unwrap();
    session.close().await.unwrap();

    assert!(!session.is_open());
    assert!(session.device_info().is_none());
    // Closing again is a no-op, not an error.
    session.close().await.unwrap();
}
