//! USB bulk/interrupt framing.
//!
//! Everything protocol-shaped lives here, above the [`UsbPipe`] trait:
//! container packing, split/unsplit header negotiation, surplus
//! buffering, halt recovery and the class control requests. The pipe
//! underneath only moves bytes, which is what lets the whole engine run
//! against an in-memory fake in tests.

use std::mem;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::codec::{Endian, WireReader, WireWriter};
use crate::error::{PtpError, Result};
use crate::proto::{
    CONTAINER_HEADER_LEN, ContainerKind, EventCode, MAX_EVENT_PARAMS, MAX_PARAMS, ResponseCode,
};
use crate::types::{PtpConfig, Quirk, QuirkSet};

use super::{DataReply, Event, Request, Response, Transport, TransferContext};

/// Block size for chunked bulk reads. Progress and cancellation are
/// checked at every block boundary.
pub const TRANSFER_CHUNK: usize = 64 * 1024;

/// Largest interrupt container: header plus three parameters.
const EVENT_BUF: usize = CONTAINER_HEADER_LEN + MAX_EVENT_PARAMS * 4;

/// Declared length announcing "read until short packet".
const LENGTH_UNKNOWN: u32 = 0xFFFF_FFFF;

/// Still-image class control requests.
mod control {
    pub const CANCEL_TRANSACTION: u8 = 0x64;
    pub const GET_EXTENDED_EVENT_DATA: u8 = 0x65;
    pub const DEVICE_RESET: u8 = 0x66;
    pub const GET_DEVICE_STATUS: u8 = 0x67;
}

/// Raw endpoint I/O for one claimed still-image interface.
///
/// Reads return whatever the endpoint produced up to `max_len`; a
/// stalled endpoint surfaces as [`PtpError::EndpointStalled`] so the
/// framing layer can clear the halt and retry. Timeouts surface as
/// [`PtpError::Timeout`].
#[async_trait]
pub trait UsbPipe: Send {
    /// Writes to the bulk-out endpoint, returning the bytes accepted.
    async fn bulk_out(&mut self, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Reads from the bulk-in endpoint.
    async fn bulk_in(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Reads from the interrupt endpoint.
    async fn interrupt_in(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Class control transfer, host to device.
    async fn control_out(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<()>;

    /// Class control transfer, device to host.
    async fn control_in(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>>;

    /// Clears a halt on the bulk-in endpoint.
    async fn clear_halt_in(&mut self) -> Result<()>;

    /// Clears a halt on the bulk-out endpoint.
    async fn clear_halt_out(&mut self) -> Result<()>;

    /// Max packet size of the bulk endpoints.
    fn max_packet_size(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct ContainerHead {
    declared_len: u32,
    kind: ContainerKind,
    code: u16,
    transaction_id: u32,
}

/// The PTP framing engine over any [`UsbPipe`].
pub struct UsbTransport<P> {
    pipe: P,
    endian: Endian,
    quirks: QuirkSet,
    io_timeout: Duration,
    event_timeout: Duration,
    /// `None` until the first data phase reveals which mode the device
    /// uses; sticky for the rest of the session after that.
    split_mode: Option<bool>,
    /// Surplus bytes from a previous read that already contain the
    /// next container.
    pending: Vec<u8>,
    /// Response that arrived in place of a data phase, parked for the
    /// next `get_response`.
    buffered_response: Option<Response>,
}

impl<P: UsbPipe> UsbTransport<P> {
    /// Wraps a claimed pipe.
    pub fn new(pipe: P, config: &PtpConfig) -> Self {
        let event_timeout = if config.quirks.contains(Quirk::SlowEventTurnaround) {
            config.event_check_timeout * 2
        } else {
            config.event_check_timeout
        };
        Self {
            pipe,
            endian: config.endian,
            quirks: config.quirks,
            io_timeout: config.normal_timeout,
            event_timeout,
            split_mode: None,
            pending: Vec::new(),
            buffered_response: None,
        }
    }

    /// The detected header mode, `None` before the first data phase.
    #[must_use]
    pub fn split_mode(&self) -> Option<bool> {
        self.split_mode
    }

    /// Gives back the pipe, dropping any buffered state.
    pub fn into_pipe(self) -> P {
        self.pipe
    }

    fn parse_head(&self, bytes: &[u8]) -> Result<ContainerHead> {
        if bytes.len() < CONTAINER_HEADER_LEN {
            return Err(PtpError::MalformedContainer {
                message: format!("{} byte read is shorter than a container header", bytes.len()),
            });
        }
        let mut reader = WireReader::new(bytes, self.endian);
        let mut declared_len = reader.u32("container length")?;
        let raw_kind = reader.u16("container kind")?;
        let code = reader.u16("container code")?;
        let transaction_id = reader.u32("container transaction id")?;

        let Some(kind) = ContainerKind::from_u16(raw_kind) else {
            return Err(PtpError::MalformedContainer {
                message: format!("unknown container kind {raw_kind:#06x}"),
            });
        };
        if declared_len != LENGTH_UNKNOWN && (declared_len as usize) < CONTAINER_HEADER_LEN {
            if self.quirks.contains(Quirk::IgnoreHeaderErrors) {
                warn!(
                    "container declares {} bytes, trusting the {} actually read",
                    declared_len,
                    bytes.len()
                );
                declared_len = bytes.len() as u32;
            } else {
                return Err(PtpError::MalformedContainer {
                    message: format!("container declares impossible length {declared_len}"),
                });
            }
        }
        Ok(ContainerHead {
            declared_len,
            kind,
            code,
            transaction_id,
        })
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

    async fn bulk_out_all(&mut self, data: &[u8]) -> Result<()> {
        let wrote = match self.pipe.bulk_out(data, self.io_timeout).await {
            Err(PtpError::EndpointStalled) => {
                debug!("bulk-out stalled, clearing halt and retrying once");
                self.pipe.clear_halt_out().await?;
                self.pipe.bulk_out(data, self.io_timeout).await?
            }
            other => other?,
        };
        if wrote != data.len() {
            return Err(PtpError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short bulk write: {wrote} of {} bytes", data.len()),
            )));
        }
        Ok(())
    }

    async fn bulk_in_block(&mut self, max_len: usize) -> Result<Vec<u8>> {
        match self.pipe.bulk_in(max_len, self.io_timeout).await {
            Err(PtpError::EndpointStalled) => {
                debug!("bulk-in stalled, clearing halt and retrying once");
                self.pipe.clear_halt_in().await?;
                self.pipe.bulk_in(max_len, self.io_timeout).await
            }
            other => other,
        }
    }

    /// One bus read, served from the surplus buffer first.
    async fn read_packet(&mut self) -> Result<Vec<u8>> {
        if !self.pending.is_empty() {
            trace!("serving {} buffered bytes as the next container", self.pending.len());
            return Ok(mem::take(&mut self.pending));
        }
        self.bulk_in_block(TRANSFER_CHUNK).await
    }

    /// Stashes read-ahead bytes. Anything too short to even hold a
    /// container header is line noise and gets dropped.
    fn stash_surplus(&mut self, surplus: Vec<u8>) {
        if surplus.is_empty() {
            return;
        }
        if surplus.len() >= CONTAINER_HEADER_LEN {
            trace!("buffering {} surplus bytes as the next container", surplus.len());
            self.pending = surplus;
        } else {
            debug!("discarding {} trailing bytes after container", surplus.len());
        }
    }

    /// Decodes a response container and re-buffers anything that rode
    /// in behind it.
    fn decode_response(&mut self, head: &ContainerHead, packet: &[u8]) -> Result<Response> {
        let declared = if head.declared_len == LENGTH_UNKNOWN {
            packet.len()
        } else {
            (head.declared_len as usize).min(packet.len())
        };
        let mut reader = WireReader::new(&packet[CONTAINER_HEADER_LEN..declared], self.endian);
        let mut params = Vec::new();
        while reader.remaining() >= 4 && params.len() < MAX_PARAMS {
            params.push(reader.u32("response parameter")?);
        }
        if packet.len() > declared {
            let surplus = packet[declared..].to_vec();
            self.stash_surplus(surplus);
        }
        Ok(Response {
            code: ResponseCode(head.code),
            transaction_id: head.transaction_id,
            params,
        })
    }

    fn decode_event(&self, bytes: &[u8]) -> Result<Event> {
        let head = self.parse_head(bytes)?;
        if head.kind != ContainerKind::Event {
            return Err(PtpError::UnexpectedContainer {
                got: head.kind,
                wanted: ContainerKind::Event,
            });
        }
        let end = (head.declared_len as usize).min(bytes.len());
        let mut reader = WireReader::new(&bytes[CONTAINER_HEADER_LEN..end], self.endian);
        let mut params = Vec::new();
        while reader.remaining() >= 4 && params.len() < MAX_EVENT_PARAMS {
            params.push(reader.u32("event parameter")?);
        }
        Ok(Event {
            code: EventCode(head.code),
            transaction_id: head.transaction_id,
            params,
        })
    }

    /// Interrupt poll with one immediate retry on empty or garbage
    /// reads, which some devices emit between real events.
    async fn poll_interrupt(&mut self, timeout: Duration) -> Result<Option<Event>> {
        for attempt in 0..2 {
            let bytes = match self.pipe.interrupt_in(EVENT_BUF, timeout).await {
                Ok(bytes) => bytes,
                Err(PtpError::Timeout { .. }) => return Ok(None),
                Err(err) => return Err(err),
            };
            if bytes.is_empty() {
                trace!("zero-length interrupt read");
                continue;
            }
            match self.decode_event(&bytes) {
                Ok(event) => {
                    trace!("interrupt event {}", event.code);
                    return Ok(Some(event));
                }
                Err(err) if attempt == 0 => {
                    debug!("garbage interrupt packet ({err}), retrying once");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// Terminates a write whose size was an exact multiple of the max
    /// packet size, for devices that wait for the zero-length packet.
    async fn maybe_zlp(&mut self, last_write: usize) -> Result<()> {
        if !self.quirks.contains(Quirk::ZlpAfterWrite) {
            return Ok(());
        }
        let max_packet = self.pipe.max_packet_size();
        if max_packet > 0 && last_write > 0 && last_write % max_packet == 0 {
            trace!("terminating exact-multiple write with a zero-length packet");
            self.pipe.bulk_out(&[], self.io_timeout).await?;
        }
        Ok(())
    }

    /// Consumes the zero-length packet a device appends when the data
    /// phase filled its final packet exactly. Whatever else shows up
    /// instead is kept for the next read.
    async fn consume_trailing_zlp(&mut self, wire_len: u64) -> Result<()> {
        if self.quirks.contains(Quirk::NoZeroReads) || !self.pending.is_empty() {
            return Ok(());
        }
        let max_packet = self.pipe.max_packet_size() as u64;
        if max_packet == 0 || wire_len == 0 || wire_len % max_packet != 0 {
            return Ok(());
        }
        match self.pipe.bulk_in(TRANSFER_CHUNK, self.event_timeout).await {
            Ok(extra) if extra.is_empty() => trace!("consumed trailing zero-length packet"),
            Ok(extra) => self.stash_surplus(extra),
            // Nothing came; plenty of devices skip the terminator.
            Err(PtpError::Timeout { .. }) => {}
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Copies `block` into `payload` up to `total`, buffering overrun
    /// bytes as the next container. Returns true when `payload` is
    /// complete.
    fn absorb(&mut self, payload: &mut Vec<u8>, block: &[u8], total: Option<u64>) -> bool {
        match total {
            Some(total) => {
                let missing = usize::try_from(total - payload.len() as u64).unwrap_or(usize::MAX);
                let want = block.len().min(missing);
                payload.extend_from_slice(&block[..want]);
                if want < block.len() {
                    self.stash_surplus(block[want..].to_vec());
                }
                payload.len() as u64 >= total
            }
            None => {
                payload.extend_from_slice(block);
                false
            }
        }
    }
}

#[async_trait]
impl<P: UsbPipe> Transport for UsbTransport<P> {
    async fn send_request(&mut self, request: &Request) -> Result<()> {
        trace!(
            "> {} transaction {} params {:x?}",
            request.code, request.transaction_id, request.params
        );
        let len = CONTAINER_HEADER_LEN + request.params.len() * 4;
        let mut writer = WireWriter::with_capacity(self.endian, len);
        writer.u32(len as u32);
        writer.u16(ContainerKind::Command as u16);
        writer.u16(request.code.0);
        writer.u32(request.transaction_id);
        for &param in &request.params {
            writer.u32(param);
        }
        let container = writer.into_bytes();
        self.bulk_out_all(&container).await?;
        self.maybe_zlp(container.len()).await
    }

    async fn send_data(&mut self, request: &Request, payload: &[u8]) -> Result<()> {
        // Totals past u32 range use the MTP "unknown" convention.
        let wire_len =
            u32::try_from(CONTAINER_HEADER_LEN + payload.len()).unwrap_or(LENGTH_UNKNOWN);
        let mut writer = WireWriter::with_capacity(self.endian, CONTAINER_HEADER_LEN);
        writer.u32(wire_len);
        writer.u16(ContainerKind::Data as u16);
        writer.u16(request.code.0);
        writer.u32(request.transaction_id);
        let header = writer.into_bytes();

        let last_write = if self.split_mode == Some(true) {
            self.bulk_out_all(&header).await?;
            if payload.is_empty() {
                header.len()
            } else {
                self.bulk_out_all(payload).await?;
                payload.len()
            }
        } else {
            let mut container = header;
            container.extend_from_slice(payload);
            self.bulk_out_all(&container).await?;
            container.len()
        };
        self.maybe_zlp(last_write).await
    }

    async fn get_data(
        &mut self,
        request: &Request,
        ctx: &mut TransferContext,
    ) -> Result<DataReply> {
        let first = self.read_packet().await?;
        let head = self.parse_head(&first)?;

        match head.kind {
            ContainerKind::Data => {}
            ContainerKind::Response => {
                // Error short-circuit: park it for get_response.
                let response = self.decode_response(&head, &first)?;
                debug!(
                    "data phase short-circuited with {} for transaction {}",
                    response.code, response.transaction_id
                );
                self.buffered_response = Some(response.clone());
                return Ok(DataReply::Response(response));
            }
            other => {
                return Err(PtpError::UnexpectedContainer {
                    got: other,
                    wanted: ContainerKind::Data,
                });
            }
        }
        self.check_transaction(request, head.transaction_id)?;
        if head.code != request.code.0 {
            warn!(
                "data container answers {:#06x}, expected {}",
                head.code, request.code
            );
        }

        let total: Option<u64> = if head.declared_len == LENGTH_UNKNOWN {
            None
        } else {
            Some(u64::from(head.declared_len) - CONTAINER_HEADER_LEN as u64)
        };

        // First read of a session that carries a bare header while
        // declaring payload reveals a split-mode device.
        if self.split_mode.is_none() {
            if first.len() == CONTAINER_HEADER_LEN && head.declared_len != CONTAINER_HEADER_LEN as u32
            {
                debug!("device sends data headers separately; split mode on for this session");
                self.split_mode = Some(true);
            } else if first.len() > CONTAINER_HEADER_LEN {
                self.split_mode = Some(false);
            }
        }

        // Sized by what actually arrives, not by the declared length,
        // which an adversarial device could set to anything.
        let mut payload = Vec::with_capacity(TRANSFER_CHUNK.min(first.len()));
        let mut done = self.absorb(&mut payload, &first[CONTAINER_HEADER_LEN..], total);

        while !done {
            if ctx.is_cancelled() {
                debug!(
                    "transfer cancelled at {} of {:?} bytes",
                    payload.len(),
                    total
                );
                return Err(PtpError::Cancelled);
            }
            ctx.report(payload.len() as u64, total);

            let block = self.bulk_in_block(TRANSFER_CHUNK).await?;
            if block.is_empty() {
                match total {
                    // Zero-length packet ends an unknown-length read.
                    None => break,
                    Some(total) => {
                        return Err(PtpError::MalformedContainer {
                            message: format!(
                                "data phase ended {} bytes early",
                                total - payload.len() as u64
                            ),
                        });
                    }
                }
            }
            let short = block.len() < TRANSFER_CHUNK;
            done = self.absorb(&mut payload, &block, total);
            if total.is_none() && short {
                break;
            }
        }
        ctx.report(payload.len() as u64, total);

        if let Some(total) = total {
            self.consume_trailing_zlp(total + CONTAINER_HEADER_LEN as u64)
                .await?;
        }
        Ok(DataReply::Payload(payload))
    }

    async fn get_response(&mut self, request: &Request) -> Result<Response> {
        if let Some(response) = self.buffered_response.take() {
            trace!("< buffered {} transaction {}", response.code, response.transaction_id);
            self.check_transaction(request, response.transaction_id)?;
            return Ok(response);
        }
        let packet = self.read_packet().await?;
        let head = self.parse_head(&packet)?;
        if head.kind != ContainerKind::Response {
            return Err(PtpError::UnexpectedContainer {
                got: head.kind,
                wanted: ContainerKind::Response,
            });
        }
        let response = self.decode_response(&head, &packet)?;
        trace!(
            "< {} transaction {} params {:x?}",
            response.code, response.transaction_id, response.params
        );
        self.check_transaction(request, response.transaction_id)?;
        Ok(response)
    }

    async fn check_event(&mut self) -> Result<Option<Event>> {
        if self.quirks.contains(Quirk::NoEventInterrupt) {
            return Ok(None);
        }
        let timeout = self.event_timeout;
        self.poll_interrupt(timeout).await
    }

    async fn wait_event(&mut self, timeout: Duration) -> Result<Option<Event>> {
        if self.quirks.contains(Quirk::NoEventInterrupt) {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        }
        self.poll_interrupt(timeout).await
    }

    async fn cancel(&mut self, transaction_id: u32) -> Result<()> {
        debug!("cancelling transaction {transaction_id}");
        let mut writer = WireWriter::with_capacity(self.endian, 6);
        writer.u16(EventCode::CANCEL_TRANSACTION.0);
        writer.u32(transaction_id);
        self.pipe
            .control_out(
                control::CANCEL_TRANSACTION,
                0,
                0,
                &writer.into_bytes(),
                self.io_timeout,
            )
            .await?;
        // Whatever was mid-flight is void now.
        self.pending.clear();
        self.buffered_response = None;
        Ok(())
    }

    async fn device_status(&mut self) -> Result<ResponseCode> {
        let bytes = self
            .pipe
            .control_in(control::GET_DEVICE_STATUS, 0, 0, 64, self.io_timeout)
            .await?;
        let mut reader = WireReader::new(&bytes, self.endian);
        reader.u16("status length")?;
        Ok(ResponseCode(reader.u16("status code")?))
    }

    async fn reset_device(&mut self) -> Result<()> {
        debug!("issuing class device reset");
        self.pipe
            .control_out(control::DEVICE_RESET, 0, 0, &[], self.io_timeout)
            .await?;
        self.pending.clear();
        self.buffered_response = None;
        self.split_mode = None;
        Ok(())
    }

    fn set_io_timeout(&mut self, timeout: Duration) {
        self.io_timeout = timeout;
    }

    fn endian(&self) -> Endian {
        self.endian
    }
}

impl<P: UsbPipe> UsbTransport<P> {
    /// Reads the extended event blob some devices park behind control
    /// request 0x65 after signalling an interrupt event.
    pub async fn extended_event_data(&mut self) -> Result<Vec<u8>> {
        self.pipe
            .control_in(
                control::GET_EXTENDED_EVENT_DATA,
                0,
                0,
                TRANSFER_CHUNK,
                self.io_timeout,
            )
            .await
    }
}
