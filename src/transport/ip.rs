//! PTP/IP over TCP.
//!
//! The protocol runs two sockets against the device: a command socket
//! carrying transactions and a separate event socket the device pushes
//! notifications down. Each is handshaken before use. Every packet is
//! framed as a little-endian u32 length (whole packet) plus u32 type,
//! regardless of what byte order the device speaks over USB.

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Duration, Instant, sleep, timeout};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::codec::{Endian, WireReader, WireWriter};
use crate::error::{CodecError, PtpError, Result};
use crate::proto::{EventCode, MAX_EVENT_PARAMS, MAX_PARAMS, ResponseCode};
use crate::types::{PtpConfig, Quirk, QuirkSet};

use super::{DataReply, Event, Request, Response, Transport, TransferContext};

/// TCP port still-image devices listen on.
pub const PTPIP_PORT: u16 = 15740;

/// Largest payload carried by one Data/EndData packet.
pub(crate) const IP_CHUNK: usize = 65536;

/// u32 length + u32 type.
const PACKET_HEADER_LEN: usize = 8;

/// Upper bound on a single packet, against corrupt length fields. Data
/// packets never exceed [`IP_CHUNK`] plus framing; handshake packets
/// are far smaller.
const MAX_PACKET_LEN: usize = IP_CHUNK + 64;

/// Protocol version 1.0, major in the high half.
const PROTOCOL_VERSION: u32 = 0x0001_0000;

/// Extra connect attempts for the event socket. Devices bring the
/// listener up lazily after the command handshake.
const EVENT_CONNECT_RETRIES: u32 = 2;
const EVENT_CONNECT_PAUSE: Duration = Duration::from_millis(100);

/// PTP/IP packet discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum PacketType {
    InitCommandRequest = 1,
    InitCommandAck = 2,
    InitEventRequest = 3,
    InitEventAck = 4,
    InitFail = 5,
    CmdRequest = 6,
    CmdResponse = 7,
    Event = 8,
    StartData = 9,
    Data = 10,
    Cancel = 11,
    EndData = 12,
}

impl PacketType {
    pub(crate) fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::InitCommandRequest),
            2 => Some(Self::InitCommandAck),
            3 => Some(Self::InitEventRequest),
            4 => Some(Self::InitEventAck),
            5 => Some(Self::InitFail),
            6 => Some(Self::CmdRequest),
            7 => Some(Self::CmdResponse),
            8 => Some(Self::Event),
            9 => Some(Self::StartData),
            10 => Some(Self::Data),
            11 => Some(Self::Cancel),
            12 => Some(Self::EndData),
            _ => None,
        }
    }
}

/// Data-phase flag carried in every CmdRequest: 2 when the host will
/// send data, 1 otherwise (none or device-to-host).
mod dataphase {
    pub const IN_OR_NONE: u32 = 1;
    pub const OUT: u32 = 2;
}

pub(crate) fn pack_packet(ptype: PacketType, body: &[u8]) -> Vec<u8> {
    debug_assert!(body.len() <= MAX_PACKET_LEN - PACKET_HEADER_LEN);
    let mut w = WireWriter::with_capacity(Endian::Little, PACKET_HEADER_LEN + body.len());
    w.u32((PACKET_HEADER_LEN + body.len()) as u32);
    w.u32(ptype as u32);
    w.raw(body);
    w.into_bytes()
}

/// Appends a NUL-terminated UTF-16LE string, the form the handshake
/// uses (no length prefix, unlike PTP dataset strings).
pub(crate) fn put_utf16z(w: &mut WireWriter, s: &str) {
    for unit in s.encode_utf16() {
        w.u16(unit);
    }
    w.u16(0);
}

pub(crate) fn take_utf16z(r: &mut WireReader<'_>) -> std::result::Result<String, CodecError> {
    let mut units = Vec::new();
    loop {
        let unit = r.u16("utf16 string")?;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    Ok(String::from_utf16_lossy(&units))
}

/// One TCP stream plus a reassembly buffer. A timed-out read leaves any
/// partial packet in the buffer, so short event polls never lose framing.
#[derive(Debug)]
struct PacketStream {
    stream: TcpStream,
    buf: BytesMut,
}

impl PacketStream {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(PACKET_HEADER_LEN + IP_CHUNK),
        }
    }

    /// Accumulates at least `needed` bytes before `deadline`.
    async fn fill(&mut self, needed: usize, deadline: Instant, total: Duration) -> Result<()> {
        while self.buf.len() < needed {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PtpError::Timeout { duration: total });
            }
            let read = timeout(remaining, self.stream.read_buf(&mut self.buf))
                .await
                .map_err(|_| PtpError::Timeout { duration: total })?;
            if read? == 0 {
                return Err(PtpError::Disconnected);
            }
        }
        Ok(())
    }

    /// Reads one whole packet, returning its type and body.
    async fn read_packet(&mut self, io_timeout: Duration) -> Result<(PacketType, Vec<u8>)> {
        let deadline = Instant::now() + io_timeout;
        self.fill(PACKET_HEADER_LEN, deadline, io_timeout).await?;

        let mut reader = WireReader::new(&self.buf[..PACKET_HEADER_LEN], Endian::Little);
        let length = reader.u32("packet length")? as usize;
        let raw_type = reader.u32("packet type")?;

        if length < PACKET_HEADER_LEN || length > MAX_PACKET_LEN {
            return Err(PtpError::MalformedContainer {
                message: format!("packet length {length} out of range"),
            });
        }
        let Some(ptype) = PacketType::from_u32(raw_type) else {
            return Err(PtpError::MalformedContainer {
                message: format!("unknown packet type {raw_type:#x}"),
            });
        };

        self.fill(length, deadline, io_timeout).await?;
        self.buf.advance(PACKET_HEADER_LEN);
        let body = self.buf.split_to(length - PACKET_HEADER_LEN).to_vec();
        trace!("ptpip read {:?}, {} byte body", ptype, body.len());
        Ok((ptype, body))
    }

    async fn write_packet(&mut self, packet: &[u8], io_timeout: Duration) -> Result<()> {
        timeout(io_timeout, async {
            self.stream.write_all(packet).await?;
            self.stream.flush().await
        })
        .await
        .map_err(|_| PtpError::Timeout {
            duration: io_timeout,
        })??;
        Ok(())
    }
}

/// PTP/IP transport over a pair of handshaken TCP sockets.
///
/// The CmdRequest packet announces up front whether a host-to-device
/// data phase follows, which the phase-split [`Transport`] contract
/// only reveals one call later. [`send_request`](Transport::send_request)
/// therefore holds the request until the next phase call shows the
/// direction, then puts it on the wire with the right flag.
#[derive(Debug)]
pub struct IpTransport {
    command: PacketStream,
    event: PacketStream,
    connection_number: u32,
    device_guid: [u8; 16],
    device_name: String,
    quirks: QuirkSet,
    io_timeout: Duration,
    event_check_timeout: Duration,
    unsent_request: Option<Request>,
    buffered_response: Option<Response>,
}

impl IpTransport {
    /// Connects both sockets and runs the init handshake.
    ///
    /// # Errors
    ///
    /// [`PtpError::ConnectionRejected`] when the device answers either
    /// init request with InitFail; I/O and timeout errors otherwise.
    pub async fn connect(addr: SocketAddr, config: &PtpConfig) -> Result<Self> {
        let io_timeout = config.normal_timeout;
        let guid = config.guid.unwrap_or_else(Uuid::new_v4);
        let host_name = match &config.host_name {
            Some(name) => name.clone(),
            None => local_host_name(),
        };

        let mut command = PacketStream::new(connect_socket(addr, io_timeout).await?);
        let (connection_number, device_guid, device_name) =
            init_command(&mut command, &guid, &host_name, io_timeout).await?;
        debug!(
            "ptpip command channel up: connection {} to \"{}\"",
            connection_number, device_name
        );

        let mut event = PacketStream::new(connect_event_socket(addr, io_timeout).await?);
        init_event(&mut event, connection_number, io_timeout).await?;
        debug!("ptpip event channel up");

        Ok(Self {
            command,
            event,
            connection_number,
            device_guid,
            device_name,
            quirks: config.quirks,
            io_timeout,
            event_check_timeout: config.event_check_timeout,
            unsent_request: None,
            buffered_response: None,
        })
    }

    /// Connection number the device assigned in the handshake.
    #[must_use]
    pub fn connection_number(&self) -> u32 {
        self.connection_number
    }

    /// Friendly name the device reported, empty if it sent none.
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// GUID the device reported.
    #[must_use]
    pub fn device_guid(&self) -> [u8; 16] {
        self.device_guid
    }

    fn check_transaction(&self, request: &Request, got: u32) -> Result<()> {
        if got != request.transaction_id && !self.quirks.contains(Quirk::BrokenTransactionId) {
            return Err(PtpError::TransactionMismatch {
                sent: request.transaction_id,
                got,
            });
        }
        Ok(())
    }

    /// Puts the held CmdRequest on the wire with the given data-phase
    /// flag. No-op if it already went out.
    async fn flush_request(&mut self, phase: u32) -> Result<()> {
        let Some(request) = self.unsent_request.take() else {
            return Ok(());
        };
        let mut w = WireWriter::with_capacity(Endian::Little, 10 + request.params.len() * 4);
        w.u32(phase);
        w.u16(request.code.0);
        w.u32(request.transaction_id);
        for &param in &request.params {
            w.u32(param);
        }
        let packet = pack_packet(PacketType::CmdRequest, &w.into_bytes());
        self.command.write_packet(&packet, self.io_timeout).await
    }

    fn decode_response(&self, body: &[u8]) -> Result<Response> {
        let mut r = WireReader::new(body, Endian::Little);
        let code = ResponseCode(r.u16("response code")?);
        let transaction_id = r.u32("response transaction id")?;
        let mut params = Vec::new();
        while r.remaining() >= 4 && params.len() < MAX_PARAMS {
            params.push(r.u32("response parameter")?);
        }
        Ok(Response {
            code,
            transaction_id,
            params,
        })
    }

    fn decode_event(&self, body: &[u8]) -> Result<Event> {
        let mut r = WireReader::new(body, Endian::Little);
        let code = EventCode(r.u16("event code")?);
        let transaction_id = r.u32("event transaction id")?;
        let mut params = Vec::new();
        while r.remaining() >= 4 && params.len() < MAX_EVENT_PARAMS {
            params.push(r.u32("event parameter")?);
        }
        Ok(Event {
            code,
            transaction_id,
            params,
        })
    }

    /// Reads `transid` off a Data/StartData/EndData body and returns
    /// the rest as payload.
    fn split_data_body(body: &[u8]) -> Result<(u32, &[u8])> {
        let mut r = WireReader::new(body, Endian::Little);
        let transaction_id = r.u32("data transaction id")?;
        Ok((transaction_id, r.rest()))
    }
}

fn local_host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "ptplink".to_string())
}

async fn connect_socket(addr: SocketAddr, io_timeout: Duration) -> Result<TcpStream> {
    let stream = timeout(io_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| PtpError::Timeout {
            duration: io_timeout,
        })??;
    if let Err(err) = stream.set_nodelay(true) {
        debug!("set_nodelay failed: {err}");
    }
    Ok(stream)
}

async fn connect_event_socket(addr: SocketAddr, io_timeout: Duration) -> Result<TcpStream> {
    let mut attempt = 0;
    loop {
        match connect_socket(addr, io_timeout).await {
            Ok(stream) => return Ok(stream),
            Err(err) if attempt < EVENT_CONNECT_RETRIES => {
                attempt += 1;
                debug!("event socket connect failed ({err}), retry {attempt}");
                sleep(EVENT_CONNECT_PAUSE).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn init_command(
    stream: &mut PacketStream,
    guid: &Uuid,
    host_name: &str,
    io_timeout: Duration,
) -> Result<(u32, [u8; 16], String)> {
    let mut w = WireWriter::new(Endian::Little);
    w.raw(guid.as_bytes());
    put_utf16z(&mut w, host_name);
    w.u32(PROTOCOL_VERSION);
    let packet = pack_packet(PacketType::InitCommandRequest, &w.into_bytes());
    stream.write_packet(&packet, io_timeout).await?;

    let (ptype, body) = stream.read_packet(io_timeout).await?;
    match ptype {
        PacketType::InitCommandAck => {}
        PacketType::InitFail => return Err(init_fail(&body)),
        other => {
            return Err(PtpError::MalformedContainer {
                message: format!("expected InitCommandAck, got {other:?}"),
            });
        }
    }

    let mut r = WireReader::new(&body, Endian::Little);
    let connection_number = r.u32("connection number")?;
    let mut device_guid = [0u8; 16];
    for byte in &mut device_guid {
        *byte = r.u8("device guid")?;
    }
    // Some firmwares truncate the ack after the guid.
    let device_name = take_utf16z(&mut r).unwrap_or_default();
    Ok((connection_number, device_guid, device_name))
}

async fn init_event(
    stream: &mut PacketStream,
    connection_number: u32,
    io_timeout: Duration,
) -> Result<()> {
    let mut w = WireWriter::new(Endian::Little);
    w.u32(connection_number);
    let packet = pack_packet(PacketType::InitEventRequest, &w.into_bytes());
    stream.write_packet(&packet, io_timeout).await?;

    let (ptype, body) = stream.read_packet(io_timeout).await?;
    match ptype {
        PacketType::InitEventAck => Ok(()),
        PacketType::InitFail => Err(init_fail(&body)),
        other => Err(PtpError::MalformedContainer {
            message: format!("expected InitEventAck, got {other:?}"),
        }),
    }
}

fn init_fail(body: &[u8]) -> PtpError {
    let mut r = WireReader::new(body, Endian::Little);
    let reason = r.u32("init fail reason").unwrap_or(0);
    PtpError::ConnectionRejected { reason }
}

#[async_trait]
impl Transport for IpTransport {
    async fn send_request(&mut self, request: &Request) -> Result<()> {
        if let Some(stale) = self.unsent_request.take() {
            warn!(
                "request {} replaced before any phase ran",
                stale.transaction_id
            );
        }
        self.unsent_request = Some(request.clone());
        Ok(())
    }

    async fn send_data(&mut self, request: &Request, payload: &[u8]) -> Result<()> {
        self.flush_request(dataphase::OUT).await?;

        let mut w = WireWriter::with_capacity(Endian::Little, 12);
        w.u32(request.transaction_id);
        w.u64(payload.len() as u64);
        let packet = pack_packet(PacketType::StartData, &w.into_bytes());
        self.command.write_packet(&packet, self.io_timeout).await?;

        // Every chunk but the last rides in a Data packet; the last is
        // the EndData packet, even when empty.
        let mut chunks = payload.chunks(IP_CHUNK);
        let last = if payload.is_empty() {
            &[][..]
        } else {
            chunks.next_back().unwrap_or(&[])
        };
        for chunk in chunks {
            let mut w = WireWriter::with_capacity(Endian::Little, 4 + chunk.len());
            w.u32(request.transaction_id);
            w.raw(chunk);
            let packet = pack_packet(PacketType::Data, &w.into_bytes());
            self.command.write_packet(&packet, self.io_timeout).await?;
        }
        let mut w = WireWriter::with_capacity(Endian::Little, 4 + last.len());
        w.u32(request.transaction_id);
        w.raw(last);
        let packet = pack_packet(PacketType::EndData, &w.into_bytes());
        self.command.write_packet(&packet, self.io_timeout).await
    }

    async fn get_data(
        &mut self,
        request: &Request,
        ctx: &mut TransferContext,
    ) -> Result<DataReply> {
        self.flush_request(dataphase::IN_OR_NONE).await?;

        let (ptype, body) = self.command.read_packet(self.io_timeout).await?;
        let total = match ptype {
            PacketType::StartData => {
                let mut r = WireReader::new(&body, Endian::Little);
                let transaction_id = r.u32("start data transaction id")?;
                self.check_transaction(request, transaction_id)?;
                let declared = r.u64("start data total length")?;
                (declared != u64::MAX).then_some(declared)
            }
            PacketType::CmdResponse => {
                let response = self.decode_response(&body)?;
                debug!(
                    "device answered data phase of {:?} with {:?}",
                    request.code, response.code
                );
                self.check_transaction(request, response.transaction_id)?;
                self.buffered_response = Some(response.clone());
                return Ok(DataReply::Response(response));
            }
            other => {
                return Err(PtpError::MalformedContainer {
                    message: format!("expected StartData, got {other:?}"),
                });
            }
        };

        let mut payload = Vec::new();
        loop {
            if ctx.is_cancelled() {
                return Err(PtpError::Cancelled);
            }
            ctx.report(payload.len() as u64, total);

            let (ptype, body) = self.command.read_packet(self.io_timeout).await?;
            let done = match ptype {
                PacketType::Data => false,
                PacketType::EndData => true,
                other => {
                    return Err(PtpError::MalformedContainer {
                        message: format!("expected Data/EndData, got {other:?}"),
                    });
                }
            };
            let (transaction_id, chunk) = Self::split_data_body(&body)?;
            self.check_transaction(request, transaction_id)?;
            payload.extend_from_slice(chunk);
            if done {
                break;
            }
        }

        if let Some(total) = total {
            if payload.len() as u64 != total {
                debug!(
                    "data phase declared {} bytes, delivered {}",
                    total,
                    payload.len()
                );
            }
        }
        ctx.report(payload.len() as u64, total);
        Ok(DataReply::Payload(payload))
    }

    async fn get_response(&mut self, request: &Request) -> Result<Response> {
        if let Some(response) = self.buffered_response.take() {
            self.check_transaction(request, response.transaction_id)?;
            return Ok(response);
        }
        self.flush_request(dataphase::IN_OR_NONE).await?;

        let mut skipped_end_data = false;
        loop {
            let (ptype, body) = self.command.read_packet(self.io_timeout).await?;
            match ptype {
                PacketType::CmdResponse => {
                    let response = self.decode_response(&body)?;
                    self.check_transaction(request, response.transaction_id)?;
                    return Ok(response);
                }
                // Some devices trail an empty EndData behind the data
                // phase; eat one and read on.
                PacketType::EndData if !skipped_end_data => {
                    skipped_end_data = true;
                    debug!("skipping leftover EndData before response");
                }
                other => {
                    return Err(PtpError::MalformedContainer {
                        message: format!("expected CmdResponse, got {other:?}"),
                    });
                }
            }
        }
    }

    async fn check_event(&mut self) -> Result<Option<Event>> {
        match self.event.read_packet(self.event_check_timeout).await {
            Ok((PacketType::Event, body)) => Ok(Some(self.decode_event(&body)?)),
            Ok((other, _)) => {
                debug!("ignoring {:?} on event channel", other);
                Ok(None)
            }
            Err(PtpError::Timeout { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn wait_event(&mut self, timeout: Duration) -> Result<Option<Event>> {
        match self.event.read_packet(timeout).await {
            Ok((PacketType::Event, body)) => Ok(Some(self.decode_event(&body)?)),
            Ok((other, _)) => {
                debug!("ignoring {:?} on event channel", other);
                Ok(None)
            }
            Err(PtpError::Timeout { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn cancel(&mut self, transaction_id: u32) -> Result<()> {
        if let Some(unsent) = self.unsent_request.take() {
            // Never reached the wire, nothing for the device to abandon.
            debug!("dropping unsent request {}", unsent.transaction_id);
            if unsent.transaction_id == transaction_id {
                return Ok(());
            }
        }
        let mut w = WireWriter::with_capacity(Endian::Little, 4);
        w.u32(transaction_id);
        let packet = pack_packet(PacketType::Cancel, &w.into_bytes());
        self.command.write_packet(&packet, self.io_timeout).await?;
        self.buffered_response = None;
        Ok(())
    }

    async fn reset_device(&mut self) -> Result<()> {
        Err(PtpError::InvalidState {
            message: "PTP/IP has no device reset".into(),
        })
    }

    fn set_io_timeout(&mut self, timeout: Duration) {
        self.io_timeout = timeout;
    }

    fn endian(&self) -> Endian {
        Endian::Little
    }
}
