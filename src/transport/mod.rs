//! Transports move containers; they know nothing about sessions.
//!
//! Both backends expose the same [`Transport`] contract. The USB
//! backend frames bulk containers and reads interrupt events; the
//! PTP/IP backend runs the dual-socket TCP protocol. The session layer
//! above drives the three transaction phases through this trait and is
//! the only place that interprets response codes.

pub mod ip;
#[cfg(feature = "usb")]
pub mod rusb_pipe;
pub mod usb;

#[cfg(test)]
mod tests;

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::codec::Endian;
use crate::error::Result;
use crate::proto::{EventCode, MAX_PARAMS, OpCode, ResponseCode};

pub use ip::IpTransport;
#[cfg(feature = "usb")]
pub use rusb_pipe::RusbPipe;
pub use usb::{UsbPipe, UsbTransport};

/// One operation request, already bound to a transaction id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The operation to run.
    pub code: OpCode,
    /// Session-assigned transaction id.
    pub transaction_id: u32,
    /// Up to five parameters.
    pub params: Vec<u32>,
}

impl Request {
    /// Creates a request. Panics in debug builds on more than five
    /// parameters; the protocol has no encoding for them.
    #[must_use]
    pub fn new(code: OpCode, transaction_id: u32, params: &[u32]) -> Self {
        debug_assert!(params.len() <= MAX_PARAMS);
        Self {
            code,
            transaction_id,
            params: params.to_vec(),
        }
    }
}

/// The response phase of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Device response code.
    pub code: ResponseCode,
    /// Transaction id the device echoed.
    pub transaction_id: u32,
    /// Up to five response parameters.
    pub params: Vec<u32>,
}

impl Response {
    /// Parameter `index`, if the device sent that many.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<u32> {
        self.params.get(index).copied()
    }

    /// True when the device reported success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

/// A device-initiated notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event code.
    pub code: EventCode,
    /// Transaction id of the operation the event relates to, zero for
    /// unsolicited events.
    pub transaction_id: u32,
    /// Up to three parameters.
    pub params: Vec<u32>,
}

impl Event {
    /// Parameter `index`, if the device sent that many.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<u32> {
        self.params.get(index).copied()
    }
}

/// What came back from a data phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataReply {
    /// The data payload.
    Payload(Vec<u8>),
    /// The device skipped the data phase and answered with a response
    /// container, usually an error. The transport buffers it so the
    /// following `get_response` returns it without touching the wire.
    Response(Response),
}

/// Caller-supplied progress reporting and cancellation for one data
/// phase. Checked at every chunk boundary.
pub struct TransferContext {
    cancel: CancellationToken,
    progress: Option<Box<dyn FnMut(u64, Option<u64>) + Send>>,
}

impl TransferContext {
    /// A context that never cancels and reports nothing.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Ties the transfer to `token`.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Installs a progress callback. Called with bytes transferred so
    /// far and the total if the device declared one.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(u64, Option<u64>) + Send + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// True once the caller has asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The token this context checks.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn report(&mut self, done: u64, total: Option<u64>) {
        if let Some(callback) = &mut self.progress {
            callback(done, total);
        }
    }
}

impl Default for TransferContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransferContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferContext")
            .field("cancelled", &self.is_cancelled())
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

/// One transaction phase at a time over some medium.
///
/// Implementations are exclusively owned by a session; methods take
/// `&mut self` and there is no internal locking.
#[async_trait]
pub trait Transport: Send {
    /// Sends the command container.
    async fn send_request(&mut self, request: &Request) -> Result<()>;

    /// Sends the host-to-device data phase.
    async fn send_data(&mut self, request: &Request, payload: &[u8]) -> Result<()>;

    /// Reads the device-to-host data phase, or the response container
    /// a device short-circuits with.
    async fn get_data(&mut self, request: &Request, ctx: &mut TransferContext)
    -> Result<DataReply>;

    /// Reads the response container.
    async fn get_response(&mut self, request: &Request) -> Result<Response>;

    /// Polls for one pending event without blocking beyond the fast
    /// check interval.
    async fn check_event(&mut self) -> Result<Option<Event>>;

    /// Waits up to `timeout` for one event.
    async fn wait_event(&mut self, timeout: Duration) -> Result<Option<Event>>;

    /// Asks the device to abandon the transaction.
    async fn cancel(&mut self, transaction_id: u32) -> Result<()>;

    /// Current device status, polled while a cancellation settles.
    /// Media without a status channel report OK.
    async fn device_status(&mut self) -> Result<ResponseCode> {
        Ok(ResponseCode::OK)
    }

    /// Issues a device reset, where the medium supports one.
    async fn reset_device(&mut self) -> Result<()>;

    /// Sets the per-call I/O deadline for subsequent operations. The
    /// session raises this before captures and lowers it afterwards.
    fn set_io_timeout(&mut self, timeout: Duration);

    /// Byte order of this connection.
    fn endian(&self) -> Endian;
}
