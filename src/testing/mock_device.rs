//! A [`VirtualDevice`] served over PTP/IP on a real TCP listener.
//!
//! The server accepts exactly one host: first connection is the command
//! channel, second the event channel, both handshaken per the protocol.
//! Commands are executed against the shared device state and queued
//! device events are flushed down the event channel after every
//! transaction, which is when real devices get around to it too.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::codec::{Endian, WireReader, WireWriter};
use crate::error::{PtpError, Result};
use crate::proto::OpCode;
use crate::transport::ip::{pack_packet, put_utf16z, take_utf16z, PacketType, IP_CHUNK};
use crate::transport::{Event, Request};

use super::virtual_device::VirtualDevice;

/// Knobs for the mock server.
#[derive(Debug, Clone)]
pub struct MockDeviceConfig {
    /// Friendly name reported in the command handshake.
    pub name: String,
    /// GUID reported in the command handshake.
    pub guid: [u8; 16],
    /// Answer the command handshake with InitFail carrying this reason.
    pub refuse_reason: Option<u32>,
    /// Trail an empty EndData behind each dataless transaction before
    /// the response, like firmwares that never rewind an aborted data
    /// phase.
    pub stray_end_data: bool,
}

impl Default for MockDeviceConfig {
    fn default() -> Self {
        Self {
            name: "virtual ptpip camera".to_string(),
            guid: *b"ptplink-mock-cam",
            refuse_reason: None,
            stray_end_data: false,
        }
    }
}

/// Handle to a running mock PTP/IP device.
#[derive(Debug)]
pub struct MockDevice {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl MockDevice {
    /// Binds a loopback listener and serves `device` with default
    /// settings.
    pub async fn start(device: VirtualDevice) -> std::io::Result<Self> {
        Self::start_with(device, MockDeviceConfig::default()).await
    }

    /// Binds a loopback listener and serves `device`.
    pub async fn start_with(
        device: VirtualDevice,
        config: MockDeviceConfig,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            if let Err(err) = serve(listener, device, config).await {
                debug!(%err, "mock device stopped");
            }
        });
        Ok(Self { addr, task })
    }

    /// Address the server listens on.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Frame {
    ptype: PacketType,
    body: Vec<u8>,
}

async fn read_frame(stream: &mut TcpStream) -> Result<Frame> {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await?;
    let mut reader = WireReader::new(&header, Endian::Little);
    let length = reader.u32("packet length")? as usize;
    let raw_type = reader.u32("packet type")?;
    let Some(ptype) = PacketType::from_u32(raw_type) else {
        return Err(PtpError::MalformedContainer {
            message: format!("host sent unknown packet type {raw_type:#x}"),
        });
    };
    if length < 8 || length > IP_CHUNK + 64 {
        return Err(PtpError::MalformedContainer {
            message: format!("host sent packet length {length}"),
        });
    }
    let mut body = vec![0u8; length - 8];
    stream.read_exact(&mut body).await?;
    trace!(?ptype, len = body.len(), "mock device read");
    Ok(Frame { ptype, body })
}

async fn write_frame(stream: &mut TcpStream, ptype: PacketType, body: &[u8]) -> Result<()> {
    stream.write_all(&pack_packet(ptype, body)).await?;
    stream.flush().await?;
    Ok(())
}

async fn serve(
    listener: TcpListener,
    mut device: VirtualDevice,
    config: MockDeviceConfig,
) -> Result<()> {
    let (mut command, peer) = listener.accept().await?;
    debug!(%peer, "mock device: command channel connected");
    let connection_number = handshake_command(&mut command, &config).await?;

    let (mut event, _) = listener.accept().await?;
    handshake_event(&mut event, connection_number).await?;
    debug!("mock device: event channel connected");

    loop {
        let frame = match read_frame(&mut command).await {
            Ok(frame) => frame,
            Err(PtpError::Io(_) | PtpError::Disconnected) => return Ok(()),
            Err(err) => return Err(err),
        };
        match frame.ptype {
            PacketType::CmdRequest => {
                run_transaction(&mut command, &mut device, &frame.body, &config).await?;
                flush_events(&mut event, &mut device).await?;
            }
            PacketType::Cancel => {
                debug!("mock device: host cancelled");
            }
            other => {
                return Err(PtpError::MalformedContainer {
                    message: format!("host sent {other:?} on the command channel"),
                });
            }
        }
    }
}

async fn handshake_command(stream: &mut TcpStream, config: &MockDeviceConfig) -> Result<u32> {
    let frame = read_frame(stream).await?;
    if frame.ptype != PacketType::InitCommandRequest {
        return Err(PtpError::MalformedContainer {
            message: format!("expected InitCommandRequest, got {:?}", frame.ptype),
        });
    }
    if let Some(reason) = config.refuse_reason {
        let mut w = WireWriter::new(Endian::Little);
        w.u32(reason);
        write_frame(stream, PacketType::InitFail, &w.into_bytes()).await?;
        return Err(PtpError::ConnectionRejected { reason });
    }

    let mut reader = WireReader::new(&frame.body, Endian::Little);
    reader.skip(16, "host guid")?;
    let host_name = take_utf16z(&mut reader).unwrap_or_default();
    debug!(host = %host_name, "mock device: handshake from host");

    let connection_number = 1;
    let mut w = WireWriter::new(Endian::Little);
    w.u32(connection_number);
    w.raw(&config.guid);
    put_utf16z(&mut w, &config.name);
    w.u32(0x0001_0000);
    write_frame(stream, PacketType::InitCommandAck, &w.into_bytes()).await?;
    Ok(connection_number)
}

async fn handshake_event(stream: &mut TcpStream, connection_number: u32) -> Result<()> {
    let frame = read_frame(stream).await?;
    if frame.ptype != PacketType::InitEventRequest {
        return Err(PtpError::MalformedContainer {
            message: format!("expected InitEventRequest, got {:?}", frame.ptype),
        });
    }
    let mut reader = WireReader::new(&frame.body, Endian::Little);
    let got = reader.u32("connection number")?;
    if got != connection_number {
        let mut w = WireWriter::new(Endian::Little);
        w.u32(1);
        write_frame(stream, PacketType::InitFail, &w.into_bytes()).await?;
        return Err(PtpError::ConnectionRejected { reason: 1 });
    }
    write_frame(stream, PacketType::InitEventAck, &[]).await
}

async fn run_transaction(
    command: &mut TcpStream,
    device: &mut VirtualDevice,
    body: &[u8],
    config: &MockDeviceConfig,
) -> Result<()> {
    let mut reader = WireReader::new(body, Endian::Little);
    let dataphase = reader.u32("data phase flag")?;
    let code = OpCode(reader.u16("operation code")?);
    let transaction_id = reader.u32("transaction id")?;
    let mut params = Vec::new();
    while reader.remaining() >= 4 {
        params.push(reader.u32("parameter")?);
    }
    let request = Request {
        code,
        transaction_id,
        params,
    };

    // Host-to-device data rides in before the device acts.
    let payload = if dataphase == 2 {
        Some(read_data_phase(command, transaction_id).await?)
    } else {
        None
    };

    let reply = device.handle_command(&request, payload.as_deref());

    if config.stray_end_data && reply.data.is_none() && dataphase != 2 {
        let mut w = WireWriter::new(Endian::Little);
        w.u32(transaction_id);
        write_frame(command, PacketType::EndData, &w.into_bytes()).await?;
    }

    if let Some(data) = reply.data {
        let mut w = WireWriter::new(Endian::Little);
        w.u32(transaction_id);
        w.u64(data.len() as u64);
        write_frame(command, PacketType::StartData, &w.into_bytes()).await?;

        let mut chunks = data.chunks(IP_CHUNK);
        let last = if data.is_empty() {
            &[][..]
        } else {
            chunks.next_back().unwrap_or(&[])
        };
        for chunk in chunks {
            let mut w = WireWriter::with_capacity(Endian::Little, 4 + chunk.len());
            w.u32(transaction_id);
            w.raw(chunk);
            write_frame(command, PacketType::Data, &w.into_bytes()).await?;
        }
        let mut w = WireWriter::with_capacity(Endian::Little, 4 + last.len());
        w.u32(transaction_id);
        w.raw(last);
        write_frame(command, PacketType::EndData, &w.into_bytes()).await?;
    }

    let mut w = WireWriter::new(Endian::Little);
    w.u16(reply.code.0);
    w.u32(transaction_id);
    for &param in &reply.params {
        w.u32(param);
    }
    write_frame(command, PacketType::CmdResponse, &w.into_bytes()).await
}

async fn read_data_phase(command: &mut TcpStream, transaction_id: u32) -> Result<Vec<u8>> {
    let frame = read_frame(command).await?;
    if frame.ptype != PacketType::StartData {
        return Err(PtpError::MalformedContainer {
            message: format!("expected StartData, got {:?}", frame.ptype),
        });
    }
    let mut payload = Vec::new();
    loop {
        let frame = read_frame(command).await?;
        let done = match frame.ptype {
            PacketType::Data => false,
            PacketType::EndData => true,
            other => {
                return Err(PtpError::MalformedContainer {
                    message: format!("expected Data/EndData, got {other:?}"),
                });
            }
        };
        let mut reader = WireReader::new(&frame.body, Endian::Little);
        let got = reader.u32("data transaction id")?;
        if got != transaction_id {
            return Err(PtpError::TransactionMismatch {
                sent: transaction_id,
                got,
            });
        }
        payload.extend_from_slice(reader.rest());
        if done {
            return Ok(payload);
        }
    }
}

async fn flush_events(event: &mut TcpStream, device: &mut VirtualDevice) -> Result<()> {
    while let Some(Event {
        code,
        transaction_id,
        params,
    }) = device.take_event()
    {
        let mut w = WireWriter::new(Endian::Little);
        w.u16(code.0);
        w.u32(transaction_id);
        for &param in &params {
            w.u32(param);
        }
        write_frame(event, PacketType::Event, &w.into_bytes()).await?;
    }
    Ok(())
}
