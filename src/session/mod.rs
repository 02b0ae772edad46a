//! Session management.
//!
//! A [`PtpSession`] owns one transport end-to-end and drives the
//! three-phase transaction exchange over it: command, optional data,
//! response. It assigns transaction ids, picks the timeout tier for
//! each operation, translates response codes into the error taxonomy
//! and feeds device events into the session's [`EventQueue`].
//!
//! One logical owner per session: every method takes `&mut self` and
//! there is no internal locking. Callers needing shared access
//! serialize it themselves.

pub mod cache;
mod fixup;
pub mod queue;

#[cfg(test)]
mod tests;

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::codec::{
    DeviceInfo, DevicePropDesc, ObjectInfo, PropertyValue, StorageInfo, WireReader, WireWriter,
};
use crate::error::{PtpError, Result};
use crate::proto::{DataTypeCode, DevicePropCode, ObjectHandle, OpCode, ResponseCode, StorageId};
use crate::transport::{DataReply, Event, Request, Response, TransferContext, Transport};
use crate::types::{PtpConfig, Quirk};

pub use cache::ObjectCache;
pub use queue::EventQueue;

/// Probe ceiling for firmware flagged [`Quirk::ShortProbe`].
const SHORT_PROBE: Duration = Duration::from_millis(1500);

/// How many times a settling cancellation polls device status.
const CANCEL_STATUS_POLLS: u32 = 10;

/// Where a transaction stands. Purely diagnostic; the phases always
/// run to completion or error within one `run` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionPhase {
    /// No transaction in flight.
    #[default]
    Idle,
    /// Command container sent.
    RequestSent,
    /// Data phase in progress.
    DataPhase,
    /// Response received, about to go idle.
    ResponseReceived,
}

/// The data phase of one transaction, from the host's point of view.
#[derive(Debug)]
pub enum DataPhase<'a> {
    /// No data phase.
    None,
    /// Device-to-host data expected.
    Receive,
    /// Host-to-device payload to send.
    Send(&'a [u8]),
}

/// One open PTP session over a [`Transport`].
pub struct PtpSession<T> {
    transport: T,
    config: PtpConfig,
    /// Device-visible session id; zero while closed.
    session_id: u32,
    next_transaction: u32,
    phase: TransactionPhase,
    alive: bool,
    device_info: Option<DeviceInfo>,
    events: EventQueue,
    cache: ObjectCache,
    last_response: Option<Response>,
    capture_timeout_override: Option<Duration>,
}

impl<T: Transport> PtpSession<T> {
    /// Wraps a connected transport. The session is not open yet; call
    /// [`open`](Self::open) before anything that needs one.
    pub fn new(transport: T, config: PtpConfig) -> Self {
        let cache = ObjectCache::new(config.object_cache_ttl);
        Self {
            transport,
            config,
            session_id: 0,
            next_transaction: 1,
            phase: TransactionPhase::Idle,
            alive: true,
            device_info: None,
            events: EventQueue::new(),
            cache,
            last_response: None,
            capture_timeout_override: None,
        }
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &PtpConfig {
        &self.config
    }

    /// True until a fatal transport error.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// True while a session is open on the device.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.session_id != 0
    }

    /// Device-assigned session id, zero while closed.
    #[must_use]
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Current transaction phase.
    #[must_use]
    pub fn phase(&self) -> TransactionPhase {
        self.phase
    }

    /// The cached device descriptor, populated by [`open`](Self::open).
    #[must_use]
    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.device_info.as_ref()
    }

    /// The response that completed the most recent transaction.
    #[must_use]
    pub fn last_response(&self) -> Option<&Response> {
        self.last_response.as_ref()
    }

    /// The session's pending-event queue.
    pub fn events(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    /// The session's object descriptor cache.
    pub fn object_cache(&mut self) -> &mut ObjectCache {
        &mut self.cache
    }

    /// Direct transport access, for backend-specific extras.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Tears the session apart, returning the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Overrides the capture timeout tier for subsequent operations.
    pub fn set_capture_timeout(&mut self, timeout: Option<Duration>) {
        self.capture_timeout_override = timeout;
    }

    // ===== Transaction engine =====

    fn ensure_alive(&self) -> Result<()> {
        if self.alive {
            Ok(())
        } else {
            Err(PtpError::InvalidState {
                message: "session is dead after a transport failure".into(),
            })
        }
    }

    /// Advertised-set check. Open/info commands pass regardless since
    /// they are what populates the set.
    fn check_supported(&self, code: OpCode) -> Result<()> {
        if matches!(code, OpCode::GET_DEVICE_INFO | OpCode::OPEN_SESSION) {
            return Ok(());
        }
        match &self.device_info {
            Some(info) if !info.supports_operation(code) => {
                Err(PtpError::NotSupported { op: code })
            }
            _ => Ok(()),
        }
    }

    fn timeout_for(&self, code: OpCode) -> Duration {
        if code.is_capture() {
            return self
                .capture_timeout_override
                .unwrap_or(self.config.capture_timeout);
        }
        if self.session_id == 0 {
            // Still probing: fail fast, faster still for firmware that
            // never recovers from a silent start.
            return if self.config.quirks.contains(Quirk::ShortProbe) {
                self.config.probe_timeout.min(SHORT_PROBE)
            } else {
                self.config.probe_timeout
            };
        }
        self.config.normal_timeout
    }

    fn take_transaction_id(&mut self) -> u32 {
        let id = self.next_transaction;
        self.next_transaction = self.next_transaction.wrapping_add(1).max(1);
        id
    }

    /// Runs one complete transaction.
    async fn run(
        &mut self,
        code: OpCode,
        params: &[u32],
        data: DataPhase<'_>,
        ctx: &mut TransferContext,
    ) -> Result<(Response, Option<Vec<u8>>)> {
        self.ensure_alive()?;
        self.check_supported(code)?;
        self.transport.set_io_timeout(self.timeout_for(code));

        let request = Request::new(code, self.take_transaction_id(), params);
        trace!(op = %code, transaction = request.transaction_id, "transaction start");

        let outcome = self.drive(&request, data, ctx).await;
        self.phase = TransactionPhase::Idle;
        match outcome {
            Ok((response, payload)) => {
                self.last_response = Some(response.clone());
                Ok((response, payload))
            }
            Err(err) => {
                if err.is_fatal() {
                    warn!(op = %code, %err, "transport failure, marking session dead");
                    self.alive = false;
                }
                Err(err)
            }
        }
    }

    async fn drive(
        &mut self,
        request: &Request,
        data: DataPhase<'_>,
        ctx: &mut TransferContext,
    ) -> Result<(Response, Option<Vec<u8>>)> {
        self.phase = TransactionPhase::RequestSent;
        self.transport.send_request(request).await?;

        let mut payload = None;
        match data {
            DataPhase::None => {}
            DataPhase::Send(bytes) => {
                self.phase = TransactionPhase::DataPhase;
                self.transport.send_data(request, bytes).await?;
            }
            DataPhase::Receive => {
                self.phase = TransactionPhase::DataPhase;
                match self.transport.get_data(request, ctx).await? {
                    DataReply::Payload(bytes) => payload = Some(bytes),
                    // Error short-circuit; the response is buffered and
                    // get_response below will surface it.
                    DataReply::Response(_) => {}
                }
            }
        }

        let response = self.transport.get_response(request).await?;
        self.phase = TransactionPhase::ResponseReceived;
        Ok((response, payload))
    }

    fn check(code: OpCode, response: &Response) -> Result<()> {
        if response.is_ok() {
            Ok(())
        } else {
            Err(PtpError::from_response(code, response.code))
        }
    }

    /// A transaction with no data phase. Non-OK responses map into the
    /// error taxonomy.
    pub async fn command(&mut self, code: OpCode, params: &[u32]) -> Result<Response> {
        let (response, _) = self
            .run(code, params, DataPhase::None, &mut TransferContext::new())
            .await?;
        Self::check(code, &response)?;
        Ok(response)
    }

    /// A transaction expecting device-to-host data.
    pub async fn read_data(&mut self, code: OpCode, params: &[u32]) -> Result<Vec<u8>> {
        self.read_data_with(code, params, &mut TransferContext::new())
            .await
    }

    /// Like [`read_data`](Self::read_data), with caller-supplied
    /// progress reporting and cancellation.
    pub async fn read_data_with(
        &mut self,
        code: OpCode,
        params: &[u32],
        ctx: &mut TransferContext,
    ) -> Result<Vec<u8>> {
        let (response, payload) = self.run(code, params, DataPhase::Receive, ctx).await?;
        Self::check(code, &response)?;
        Ok(payload.unwrap_or_default())
    }

    /// A transaction with a host-to-device data phase.
    pub async fn write_data(
        &mut self,
        code: OpCode,
        params: &[u32],
        payload: &[u8],
    ) -> Result<Response> {
        let (response, _) = self
            .run(
                code,
                params,
                DataPhase::Send(payload),
                &mut TransferContext::new(),
            )
            .await?;
        Self::check(code, &response)?;
        Ok(response)
    }

    // ===== Session lifecycle =====

    /// Opens a session and fetches the device descriptor.
    ///
    /// `SessionAlreadyOpened` and `InvalidTransactionID` answers mean a
    /// stale session is wedged on the device; retry with the next
    /// session id, and after [`PtpConfig::open_retries`] failures
    /// escalate to a device reset before the final attempts.
    pub async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(PtpError::InvalidState {
                message: "session already open on this side".into(),
            });
        }

        let mut session_id = 1u32;
        let mut attempts = 0u32;
        let mut reset_used = false;
        loop {
            self.next_transaction = 1;
            match self.command(OpCode::OPEN_SESSION, &[session_id]).await {
                Ok(_) => break,
                Err(err) if Self::open_collision(&err) => {
                    attempts += 1;
                    debug!(session_id, %err, "open rejected, trying the next session id");
                    if attempts < self.config.open_retries {
                        session_id += 1;
                        continue;
                    }
                    if !reset_used {
                        warn!("open keeps failing, escalating to device reset");
                        self.transport.reset_device().await?;
                        reset_used = true;
                        attempts = 0;
                        session_id += 1;
                        continue;
                    }
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }
        self.session_id = session_id;

        let mut device_info = self.fetch_device_info().await?;
        fixup::apply_device_fixups(&mut device_info);
        info!(
            manufacturer = %device_info.manufacturer,
            model = %device_info.model,
            vendor = %device_info.vendor_extension_id,
            session_id,
            "session open"
        );
        self.device_info = Some(device_info);
        Ok(())
    }

    fn open_collision(err: &PtpError) -> bool {
        match err {
            PtpError::SessionAlreadyOpen => true,
            PtpError::GeneralFailure { code } => *code == ResponseCode::INVALID_TRANSACTION_ID,
            _ => false,
        }
    }

    /// Closes the session. The device side is best-effort; local state
    /// is torn down regardless.
    pub async fn close(&mut self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        let result = self.command(OpCode::CLOSE_SESSION, &[]).await;
        self.session_id = 0;
        self.device_info = None;
        self.cache.clear();
        self.events.drain();
        info!("session closed");
        result.map(|_| ())
    }

    /// Fetches and decodes the device descriptor without caching it.
    pub async fn fetch_device_info(&mut self) -> Result<DeviceInfo> {
        let bytes = self.read_data(OpCode::GET_DEVICE_INFO, &[]).await?;
        Ok(DeviceInfo::decode(&bytes, self.transport.endian()))
    }

    /// Issues a transport-level device reset and drops session state.
    pub async fn reset_device(&mut self) -> Result<()> {
        self.transport.reset_device().await?;
        self.session_id = 0;
        self.device_info = None;
        self.cache.clear();
        self.events.drain();
        Ok(())
    }

    // ===== Storage and objects =====

    /// Lists the device's storage ids.
    pub async fn storage_ids(&mut self) -> Result<Vec<StorageId>> {
        let bytes = self.read_data(OpCode::GET_STORAGE_IDS, &[]).await?;
        let mut reader = WireReader::new(&bytes, self.transport.endian());
        Ok(reader
            .array_u32("storage ids")?
            .into_iter()
            .map(StorageId)
            .collect())
    }

    /// Fetches one storage descriptor.
    pub async fn storage_info(&mut self, storage: StorageId) -> Result<StorageInfo> {
        let bytes = self
            .read_data(OpCode::GET_STORAGE_INFO, &[storage.0])
            .await?;
        Ok(StorageInfo::decode(&bytes, self.transport.endian()))
    }

    /// Counts objects on `storage` ([`StorageId::ALL`] for every store).
    pub async fn num_objects(&mut self, storage: StorageId) -> Result<u32> {
        let response = self
            .command(OpCode::GET_NUM_OBJECTS, &[storage.0, 0, 0])
            .await?;
        response.param(0).ok_or_else(|| PtpError::MalformedContainer {
            message: "GetNumObjects response carried no count".into(),
        })
    }

    /// Lists object handles on `storage`, optionally under one parent
    /// folder (`None` lists the whole store).
    pub async fn object_handles(
        &mut self,
        storage: StorageId,
        parent: Option<ObjectHandle>,
    ) -> Result<Vec<ObjectHandle>> {
        let parent = parent.map_or(0, |h| h.0);
        let bytes = self
            .read_data(OpCode::GET_OBJECT_HANDLES, &[storage.0, 0, parent])
            .await?;
        let mut reader = WireReader::new(&bytes, self.transport.endian());
        Ok(reader
            .array_u32("object handles")?
            .into_iter()
            .map(ObjectHandle)
            .collect())
    }

    /// Fetches one object descriptor, served from the session cache
    /// while fresh.
    pub async fn object_info(&mut self, handle: ObjectHandle) -> Result<ObjectInfo> {
        if let Some(info) = self.cache.get(handle) {
            trace!(%handle, "object info served from cache");
            return Ok(info.clone());
        }
        let bytes = self.read_data(OpCode::GET_OBJECT_INFO, &[handle.0]).await?;
        let info = ObjectInfo::decode(&bytes, self.transport.endian());
        self.cache.insert(handle, info.clone());
        Ok(info)
    }

    /// Downloads an object.
    pub async fn get_object(&mut self, handle: ObjectHandle) -> Result<Vec<u8>> {
        self.get_object_with(handle, &mut TransferContext::new())
            .await
    }

    /// Downloads an object with progress reporting and cancellation.
    pub async fn get_object_with(
        &mut self,
        handle: ObjectHandle,
        ctx: &mut TransferContext,
    ) -> Result<Vec<u8>> {
        self.read_data_with(OpCode::GET_OBJECT, &[handle.0], ctx)
            .await
    }

    /// Downloads `length` bytes of an object starting at `offset`.
    pub async fn get_partial_object(
        &mut self,
        handle: ObjectHandle,
        offset: u32,
        length: u32,
    ) -> Result<Vec<u8>> {
        self.read_data(OpCode::GET_PARTIAL_OBJECT, &[handle.0, offset, length])
            .await
    }

    /// Downloads an object's thumbnail.
    pub async fn get_thumb(&mut self, handle: ObjectHandle) -> Result<Vec<u8>> {
        self.read_data(OpCode::GET_THUMB, &[handle.0]).await
    }

    /// Deletes an object and drops it from the cache.
    pub async fn delete_object(&mut self, handle: ObjectHandle) -> Result<()> {
        self.command(OpCode::DELETE_OBJECT, &[handle.0, 0]).await?;
        self.cache.remove(handle);
        Ok(())
    }

    /// Announces an upload. Returns the handle the device reserved for
    /// the object; [`send_object`](Self::send_object) must follow.
    pub async fn send_object_info(
        &mut self,
        storage: StorageId,
        parent: Option<ObjectHandle>,
        info: &ObjectInfo,
    ) -> Result<ObjectHandle> {
        let mut writer = WireWriter::new(self.transport.endian());
        info.encode(&mut writer)?;
        let parent = parent.map_or(0, |h| h.0);
        let response = self
            .write_data(
                OpCode::SEND_OBJECT_INFO,
                &[storage.0, parent],
                &writer.into_bytes(),
            )
            .await?;
        response
            .param(2)
            .map(ObjectHandle)
            .ok_or_else(|| PtpError::MalformedContainer {
                message: "SendObjectInfo response carried no handle".into(),
            })
    }

    /// Uploads the bytes announced by the preceding `SendObjectInfo`.
    pub async fn send_object(&mut self, data: &[u8]) -> Result<()> {
        self.write_data(OpCode::SEND_OBJECT, &[], data).await?;
        Ok(())
    }

    // ===== Device properties =====

    /// Fetches a property descriptor.
    pub async fn prop_desc(&mut self, prop: DevicePropCode) -> Result<DevicePropDesc> {
        let bytes = self
            .read_data(OpCode::GET_DEVICE_PROP_DESC, &[u32::from(prop.0)])
            .await?;
        Ok(DevicePropDesc::decode(&bytes, self.transport.endian()))
    }

    /// Fetches a property value. The wire carries no type information,
    /// so the caller supplies the datatype from the descriptor.
    pub async fn prop_value(
        &mut self,
        prop: DevicePropCode,
        datatype: DataTypeCode,
    ) -> Result<PropertyValue> {
        let bytes = self
            .read_data(OpCode::GET_DEVICE_PROP_VALUE, &[u32::from(prop.0)])
            .await?;
        let mut reader = WireReader::new(&bytes, self.transport.endian());
        Ok(PropertyValue::decode(&mut reader, datatype)?)
    }

    /// Writes a property value.
    pub async fn set_prop_value(
        &mut self,
        prop: DevicePropCode,
        value: &PropertyValue,
    ) -> Result<()> {
        let mut writer = WireWriter::new(self.transport.endian());
        value.encode(&mut writer)?;
        self.write_data(
            OpCode::SET_DEVICE_PROP_VALUE,
            &[u32::from(prop.0)],
            &writer.into_bytes(),
        )
        .await?;
        Ok(())
    }

    // ===== Capture =====

    /// Standard capture trigger: the device decides where the object
    /// lands and announces it by event.
    pub async fn initiate_capture(&mut self) -> Result<()> {
        self.command(OpCode::INITIATE_CAPTURE, &[0, 0]).await?;
        Ok(())
    }

    /// Begins an open-capture sequence (burst, video). Returns the
    /// transaction id to pass to
    /// [`terminate_open_capture`](Self::terminate_open_capture).
    pub async fn initiate_open_capture(&mut self) -> Result<u32> {
        let response = self.command(OpCode::INITIATE_OPEN_CAPTURE, &[0, 0]).await?;
        Ok(response.transaction_id)
    }

    /// Ends the open-capture sequence started by the transaction named.
    pub async fn terminate_open_capture(&mut self, transaction_id: u32) -> Result<()> {
        self.command(OpCode::TERMINATE_OPEN_CAPTURE, &[transaction_id])
            .await?;
        Ok(())
    }

    // ===== Events =====

    /// Moves every pending transport event into the queue without
    /// blocking. Returns how many arrived.
    pub async fn poll_events(&mut self) -> Result<usize> {
        let mut count = 0;
        while let Some(event) = self.transport.check_event().await? {
            trace!(code = %event.code, "event queued");
            self.events.push(event);
            count += 1;
        }
        Ok(count)
    }

    /// The next event, from the queue first, then the transport, waiting
    /// up to `timeout`.
    pub async fn wait_event(&mut self, timeout: Duration) -> Result<Option<Event>> {
        if let Some(event) = self.events.pop() {
            return Ok(Some(event));
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if let Some(event) = self.transport.wait_event(remaining).await? {
                return Ok(Some(event));
            }
        }
    }

    /// Discards every queued and pending event. Returns the discarded
    /// queue contents.
    pub async fn drain_events(&mut self) -> Result<Vec<Event>> {
        self.poll_events().await?;
        let stale = self.events.drain();
        if !stale.is_empty() {
            debug!(count = stale.len(), "drained stale events");
        }
        Ok(stale)
    }

    // ===== Cancellation =====

    /// Cancels the most recently issued transaction and waits for the
    /// device to settle, then records a synthesized cancellation
    /// response so the local transaction record is complete.
    pub async fn cancel_in_flight(&mut self) -> Result<()> {
        let transaction_id = self.next_transaction.wrapping_sub(1).max(1);
        self.transport.cancel(transaction_id).await?;

        for _ in 0..CANCEL_STATUS_POLLS {
            match self.transport.device_status().await {
                Ok(code) if code.is_ok() => break,
                Ok(code) => {
                    trace!(%code, "device still settling after cancel");
                    tokio::time::sleep(self.config.backoff_initial).await;
                }
                Err(err) => {
                    debug!(%err, "device status unavailable after cancel");
                    break;
                }
            }
        }

        self.last_response = Some(Response {
            code: ResponseCode::TRANSACTION_CANCELLED,
            transaction_id,
            params: Vec::new(),
        });
        self.phase = TransactionPhase::Idle;
        Ok(())
    }
}
