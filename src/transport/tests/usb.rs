//! Framing-layer tests over a scripted pipe.

use std::time::Duration;

use crate::codec::{Endian, WireReader, WireWriter};
use crate::error::PtpError;
use crate::proto::{ContainerKind, EventCode, OpCode, ResponseCode, CONTAINER_HEADER_LEN};
use crate::testing::{
    bulk_container, data_container, event_container, response_container, FakePipe,
};
use crate::transport::usb::TRANSFER_CHUNK;
use crate::transport::{DataReply, Request, Transport, TransferContext, UsbTransport};
use crate::types::{PtpConfig, Quirk};

fn transport(pipe: FakePipe) -> UsbTransport<FakePipe> {
    UsbTransport::new(pipe, &PtpConfig::default())
}

fn transport_with_quirks(pipe: FakePipe, quirks: Quirk) -> UsbTransport<FakePipe> {
    let config = PtpConfig::builder().quirks(quirks.into()).build();
    UsbTransport::new(pipe, &config)
}

#[tokio::test]
async fn test_send_request_frames_a_command_container() {
    let mut transport = transport(FakePipe::new());
    let request = Request::new(OpCode::GET_OBJECT, 7, &[0x1001]);
    transport.send_request(&request).await.unwrap();

    let pipe = transport.into_pipe();
    assert_eq!(pipe.writes.len(), 1);
    let mut reader = WireReader::new(&pipe.writes[0], Endian::Little);
    assert_eq!(reader.u32("len").unwrap(), 16);
    assert_eq!(reader.u16("kind").unwrap(), ContainerKind::Command as u16);
    assert_eq!(reader.u16("code").unwrap(), OpCode::GET_OBJECT.0);
    assert_eq!(reader.u32("tid").unwrap(), 7);
    assert_eq!(reader.u32("param").unwrap(), 0x1001);
}

#[tokio::test]
async fn test_get_data_unsplit_single_read() {
    let mut pipe = FakePipe::new();
    pipe.push_read(data_container(
        Endian::Little,
        OpCode::GET_OBJECT,
        3,
        b"hello camera",
    ));
    let mut transport = transport(pipe);

    let request = Request::new(OpCode::GET_OBJECT, 3, &[0x1001]);
    let reply = transport
        .get_data(&request, &mut TransferContext::new())
        .await
        .unwrap();
    assert_eq!(reply, DataReply::Payload(b"hello camera".to_vec()));
    assert_eq!(transport.split_mode(), Some(false));
}

#[tokio::test]
async fn test_get_data_detects_split_headers() {
    // A bare 12-byte header declaring more is the split-mode tell.
    let mut header = WireWriter::with_capacity(Endian::Little, CONTAINER_HEADER_LEN);
    header.u32((CONTAINER_HEADER_LEN + 5) as u32);
    header.u16(ContainerKind::Data as u16);
    header.u16(OpCode::GET_OBJECT.0);
    header.u32(4);

    let mut pipe = FakePipe::new();
    pipe.push_read(header.into_bytes());
    pipe.push_read(b"bytes".to_vec());
    let mut transport = transport(pipe);

    let request = Request::new(OpCode::GET_OBJECT, 4, &[0x1001]);
    let reply = transport
        .get_data(&request, &mut TransferContext::new())
        .await
        .unwrap();
    assert_eq!(reply, DataReply::Payload(b"bytes".to_vec()));
    assert_eq!(transport.split_mode(), Some(true));
}

#[tokio::test]
async fn test_split_mode_is_sticky_for_writes() {
    let mut header = WireWriter::with_capacity(Endian::Little, CONTAINER_HEADER_LEN);
    header.u32((CONTAINER_HEADER_LEN + 2) as u32);
    header.u16(ContainerKind::Data as u16);
    header.u16(OpCode::GET_OBJECT.0);
    header.u32(1);

    let mut pipe = FakePipe::new();
    pipe.push_read(header.into_bytes());
    pipe.push_read(vec![0xAA, 0xBB]);
    let mut transport = transport(pipe);

    let request = Request::new(OpCode::GET_OBJECT, 1, &[]);
    transport
        .get_data(&request, &mut TransferContext::new())
        .await
        .unwrap();
    assert_eq!(transport.split_mode(), Some(true));

    // Outbound data now goes header first, payload second.
    let request = Request::new(OpCode::SEND_OBJECT, 2, &[]);
    transport.send_data(&request, b"payload").await.unwrap();
    let pipe = transport.into_pipe();
    assert_eq!(pipe.writes.len(), 2);
    assert_eq!(pipe.writes[0].len(), CONTAINER_HEADER_LEN);
    assert_eq!(pipe.writes[1], b"payload");
}

#[tokio::test]
async fn test_unsplit_write_is_one_transfer() {
    let mut transport = transport(FakePipe::new());
    let request = Request::new(OpCode::SEND_OBJECT, 2, &[]);
    transport.send_data(&request, b"payload").await.unwrap();

    let pipe = transport.into_pipe();
    assert_eq!(pipe.writes.len(), 1);
    assert_eq!(pipe.writes[0].len(), CONTAINER_HEADER_LEN + 7);
}

#[tokio::test]
async fn test_data_phase_short_circuits_to_response() {
    let mut pipe = FakePipe::new();
    pipe.push_read(response_container(
        Endian::Little,
        ResponseCode::INVALID_OBJECT_HANDLE,
        5,
        &[],
    ));
    let mut transport = transport(pipe);

    let request = Request::new(OpCode::GET_OBJECT, 5, &[0xDEAD]);
    let reply = transport
        .get_data(&request, &mut TransferContext::new())
        .await
        .unwrap();
    let DataReply::Response(response) = reply else {
        panic!("expected the parked response");
    };
    assert_eq!(response.code, ResponseCode::INVALID_OBJECT_HANDLE);

    // The follow-up response phase is served from the buffer, no read.
    let response = transport.get_response(&request).await.unwrap();
    assert_eq!(response.code, ResponseCode::INVALID_OBJECT_HANDLE);
    assert!(transport.into_pipe().reads.is_empty());
}

#[tokio::test]
async fn test_surplus_after_data_serves_the_response() {
    // Device packs the response into the same transfer as the data tail.
    let mut packet = data_container(Endian::Little, OpCode::GET_OBJECT, 6, b"abc");
    packet.extend_from_slice(&response_container(
        Endian::Little,
        ResponseCode::OK,
        6,
        &[],
    ));
    let mut pipe = FakePipe::new();
    pipe.push_read(packet);
    let mut transport = transport(pipe);

    let request = Request::new(OpCode::GET_OBJECT, 6, &[0x1001]);
    let reply = transport
        .get_data(&request, &mut TransferContext::new())
        .await
        .unwrap();
    assert_eq!(reply, DataReply::Payload(b"abc".to_vec()));

    let response = transport.get_response(&request).await.unwrap();
    assert_eq!(response.code, ResponseCode::OK);
    assert!(transport.into_pipe().reads.is_empty());
}

#[tokio::test]
async fn test_stalled_bulk_in_clears_halt_and_retries_once() {
    let mut pipe = FakePipe::new();
    pipe.push_read_err(PtpError::EndpointStalled);
    pipe.push_read(response_container(Endian::Little, ResponseCode::OK, 8, &[]));
    let mut transport = transport(pipe);

    let request = Request::new(OpCode::OPEN_SESSION, 8, &[1]);
    let response = transport.get_response(&request).await.unwrap();
    assert_eq!(response.code, ResponseCode::OK);
    assert_eq!(transport.into_pipe().cleared_in, 1);
}

#[tokio::test]
async fn test_second_stall_is_fatal() {
    let mut pipe = FakePipe::new();
    pipe.push_read_err(PtpError::EndpointStalled);
    pipe.push_read_err(PtpError::EndpointStalled);
    let mut transport = transport(pipe);

    let request = Request::new(OpCode::OPEN_SESSION, 8, &[1]);
    let err = transport.get_response(&request).await.unwrap_err();
    assert!(matches!(err, PtpError::EndpointStalled));
}

#[tokio::test]
async fn test_zlp_quirk_terminates_exact_multiple_writes() {
    let mut pipe = FakePipe::new();
    pipe.max_packet = 16;
    let mut transport = transport_with_quirks(pipe, Quirk::ZlpAfterWrite);

    // Header plus one parameter is exactly 16 bytes.
    let request = Request::new(OpCode::OPEN_SESSION, 1, &[1]);
    transport.send_request(&request).await.unwrap();

    let pipe = transport.into_pipe();
    assert_eq!(pipe.writes.len(), 2);
    assert_eq!(pipe.writes[0].len(), 16);
    assert!(pipe.writes[1].is_empty());
}

#[tokio::test]
async fn test_no_zlp_without_the_quirk() {
    let mut pipe = FakePipe::new();
    pipe.max_packet = 16;
    let mut transport = transport(pipe);

    let request = Request::new(OpCode::OPEN_SESSION, 1, &[1]);
    transport.send_request(&request).await.unwrap();
    assert_eq!(transport.into_pipe().writes.len(), 1);
}

#[tokio::test]
async fn test_unknown_length_reads_until_short_packet() {
    let mut header = WireWriter::with_capacity(Endian::Little, CONTAINER_HEADER_LEN);
    header.u32(0xFFFF_FFFF);
    header.u16(ContainerKind::Data as u16);
    header.u16(OpCode::GET_OBJECT.0);
    header.u32(9);
    let mut first = header.into_bytes();
    first.extend_from_slice(&[1u8; 40]);

    let mut pipe = FakePipe::new();
    pipe.push_read(first);
    pipe.push_read(vec![2u8; TRANSFER_CHUNK]);
    pipe.push_read(vec![3u8; 30]);
    let mut transport = transport(pipe);

    let request = Request::new(OpCode::GET_OBJECT, 9, &[0x1001]);
    let reply = transport
        .get_data(&request, &mut TransferContext::new())
        .await
        .unwrap();
    let DataReply::Payload(payload) = reply else {
        panic!("expected payload");
    };
    assert_eq!(payload.len(), 40 + TRANSFER_CHUNK + 30);
    assert_eq!(payload[payload.len() - 1], 3);
}

#[tokio::test]
async fn test_truncated_data_phase_is_malformed() {
    let mut header = WireWriter::with_capacity(Endian::Little, CONTAINER_HEADER_LEN);
    header.u32((CONTAINER_HEADER_LEN + 100) as u32);
    header.u16(ContainerKind::Data as u16);
    header.u16(OpCode::GET_OBJECT.0);
    header.u32(2);
    let mut first = header.into_bytes();
    first.extend_from_slice(&[0u8; 50]);

    let mut pipe = FakePipe::new();
    pipe.push_read(first);
    pipe.push_read(Vec::new());
    let mut transport = transport(pipe);

    let request = Request::new(OpCode::GET_OBJECT, 2, &[0x1001]);
    let err = transport
        .get_data(&request, &mut TransferContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PtpError::MalformedContainer { .. }));
}

#[tokio::test]
async fn test_transaction_mismatch_is_rejected() {
    let mut pipe = FakePipe::new();
    pipe.push_read(response_container(Endian::Little, ResponseCode::OK, 99, &[]));
    let mut transport = transport(pipe);

    let request = Request::new(OpCode::OPEN_SESSION, 1, &[1]);
    let err = transport.get_response(&request).await.unwrap_err();
    assert!(matches!(
        err,
        PtpError::TransactionMismatch { sent: 1, got: 99 }
    ));
}

#[tokio::test]
async fn test_broken_transaction_id_quirk_accepts_mismatch() {
    let mut pipe = FakePipe::new();
    pipe.push_read(response_container(Endian::Little, ResponseCode::OK, 99, &[]));
    let mut transport = transport_with_quirks(pipe, Quirk::BrokenTransactionId);

    let request = Request::new(OpCode::OPEN_SESSION, 1, &[1]);
    let response = transport.get_response(&request).await.unwrap();
    assert_eq!(response.code, ResponseCode::OK);
}

#[tokio::test]
async fn test_cancelled_transfer_stops_between_chunks() {
    let mut header = WireWriter::with_capacity(Endian::Little, CONTAINER_HEADER_LEN);
    header.u32((CONTAINER_HEADER_LEN + 2 * TRANSFER_CHUNK) as u32);
    header.u16(ContainerKind::Data as u16);
    header.u16(OpCode::GET_OBJECT.0);
    header.u32(3);

    let mut pipe = FakePipe::new();
    pipe.push_read(header.into_bytes());
    pipe.push_read(vec![0u8; TRANSFER_CHUNK]);
    let mut transport = transport(pipe);

    let mut ctx = TransferContext::new();
    ctx.token().cancel();
    let request = Request::new(OpCode::GET_OBJECT, 3, &[0x1001]);
    let err = transport.get_data(&request, &mut ctx).await.unwrap_err();
    assert!(matches!(err, PtpError::Cancelled));
}

#[tokio::test]
async fn test_progress_reports_running_totals() {
    let mut pipe = FakePipe::new();
    pipe.push_read(data_container(
        Endian::Little,
        OpCode::GET_OBJECT,
        4,
        &[5u8; 64],
    ));
    let mut transport = transport(pipe);

    let reported = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = reported.clone();
    let mut ctx = TransferContext::new().with_progress(move |done, total| {
        sink.lock().unwrap().push((done, total));
    });
    let request = Request::new(OpCode::GET_OBJECT, 4, &[0x1001]);
    transport.get_data(&request, &mut ctx).await.unwrap();

    let reported = reported.lock().unwrap();
    assert_eq!(reported.last(), Some(&(64, Some(64))));
}

#[tokio::test]
async fn test_check_event_decodes_interrupt_container() {
    let mut pipe = FakePipe::new();
    pipe.push_interrupt(event_container(
        Endian::Little,
        EventCode::OBJECT_ADDED,
        0,
        &[0x1001],
    ));
    let mut transport = transport(pipe);

    let event = transport.check_event().await.unwrap().unwrap();
    assert_eq!(event.code, EventCode::OBJECT_ADDED);
    assert_eq!(event.param(0), Some(0x1001));
}

#[tokio::test]
async fn test_garbage_interrupt_is_retried_once() {
    let mut pipe = FakePipe::new();
    pipe.push_interrupt(vec![0xFF, 0xFF, 0xFF]);
    pipe.push_interrupt(event_container(
        Endian::Little,
        EventCode::CAPTURE_COMPLETE,
        0,
        &[],
    ));
    let mut transport = transport(pipe);

    let event = transport.check_event().await.unwrap().unwrap();
    assert_eq!(event.code, EventCode::CAPTURE_COMPLETE);
}

#[tokio::test]
async fn test_quiet_interrupt_endpoint_is_not_an_error() {
    let mut transport = transport(FakePipe::new());
    assert!(transport.check_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_no_event_interrupt_quirk_skips_the_endpoint() {
    let mut pipe = FakePipe::new();
    pipe.push_interrupt(event_container(
        Endian::Little,
        EventCode::OBJECT_ADDED,
        0,
        &[0x1001],
    ));
    let mut transport = transport_with_quirks(pipe, Quirk::NoEventInterrupt);

    assert!(transport.check_event().await.unwrap().is_none());
    // The scripted interrupt was never consumed.
    assert_eq!(transport.into_pipe().interrupts.len(), 1);
}

#[tokio::test]
async fn test_cancel_sends_the_class_request() {
    let mut transport = transport(FakePipe::new());
    transport.cancel(5).await.unwrap();

    let pipe = transport.into_pipe();
    assert_eq!(pipe.control_out_log.len(), 1);
    let (request, _, _, data) = &pipe.control_out_log[0];
    assert_eq!(*request, 0x64);
    let mut reader = WireReader::new(data, Endian::Little);
    assert_eq!(reader.u16("event code").unwrap(), EventCode::CANCEL_TRANSACTION.0);
    assert_eq!(reader.u32("tid").unwrap(), 5);
}

#[tokio::test]
async fn test_device_status_parses_the_control_reply() {
    let mut pipe = FakePipe::new();
    let mut status = WireWriter::new(Endian::Little);
    status.u16(4);
    status.u16(ResponseCode::DEVICE_BUSY.0);
    pipe.control_replies.push_back(status.into_bytes());
    let mut transport = transport(pipe);

    let code = transport.device_status().await.unwrap();
    assert_eq!(code, ResponseCode::DEVICE_BUSY);
    assert_eq!(transport.into_pipe().control_in_log, vec![(0x67, 0, 0)]);
}

#[tokio::test]
async fn test_reset_clears_buffered_state_and_split_mode() {
    let mut pipe = FakePipe::new();
    pipe.push_read(data_container(Endian::Little, OpCode::GET_OBJECT, 1, b"x"));
    let mut transport = transport(pipe);

    let request = Request::new(OpCode::GET_OBJECT, 1, &[0x1001]);
    transport
        .get_data(&request, &mut TransferContext::new())
        .await
        .unwrap();
    assert!(transport.split_mode().is_some());

    transport.reset_device().await.unwrap();
    assert_eq!(transport.split_mode(), None);
    let pipe = transport.into_pipe();
    assert_eq!(pipe.control_out_log.last().map(|entry| entry.0), Some(0x66));
}

#[tokio::test]
async fn test_unexpected_container_kind_is_rejected() {
    let mut pipe = FakePipe::new();
    pipe.push_read(bulk_container(
        Endian::Little,
        ContainerKind::Command,
        OpCode::GET_OBJECT.0,
        1,
        &[],
    ));
    let mut transport = transport(pipe);

    let request = Request::new(OpCode::GET_OBJECT, 1, &[0x1001]);
    let err = transport
        .get_data(&request, &mut TransferContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PtpError::UnexpectedContainer { .. }));
}
