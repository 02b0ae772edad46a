//! A stateful fake camera, transport-agnostic.
//!
//! [`VirtualDevice`] is the protocol brain: it takes decoded command
//! requests plus any host-sent data and produces the reply a device
//! would, keeping real session, object and property state. The USB
//! shape around it is [`VirtualCamera`]; the PTP/IP shape is
//! [`MockDevice`](super::MockDevice). Fault injection (rejected opens,
//! busy spells) drives the retry paths the real engine has to survive.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;

use crate::codec::{
    DeviceInfo, DevicePropDesc, Endian, ObjectInfo, PropAccess, PropForm, PropertyValue,
    StorageInfo, WireReader, WireWriter,
};
use crate::error::{PtpError, Result};
use crate::proto::{
    ContainerKind, DevicePropCode, EventCode, ObjectHandle, OpCode, ResponseCode, StorageId,
    CONTAINER_HEADER_LEN,
};
use crate::transport::{Event, Request, UsbPipe};

use super::{
    data_container, event_container, response_container, test_device_info, test_object_info,
    test_storage_info,
};

/// What the fake device answers one command with.
#[derive(Debug, Clone)]
pub struct CommandReply {
    /// Device-to-host data phase, if the operation has one.
    pub data: Option<Vec<u8>>,
    /// Response code.
    pub code: ResponseCode,
    /// Response parameters.
    pub params: Vec<u32>,
}

impl CommandReply {
    /// Plain OK.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            data: None,
            code: ResponseCode::OK,
            params: Vec::new(),
        }
    }

    /// OK with response parameters.
    #[must_use]
    pub fn ok_with(params: Vec<u32>) -> Self {
        Self {
            data: None,
            code: ResponseCode::OK,
            params,
        }
    }

    /// Data phase followed by OK.
    #[must_use]
    pub fn data(payload: Vec<u8>) -> Self {
        Self {
            data: Some(payload),
            code: ResponseCode::OK,
            params: Vec::new(),
        }
    }

    /// Error response, no data.
    #[must_use]
    pub fn error(code: ResponseCode) -> Self {
        Self {
            data: None,
            code,
            params: Vec::new(),
        }
    }
}

/// One object in the fake store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Its descriptor.
    pub info: ObjectInfo,
    /// Its bytes.
    pub data: Vec<u8>,
}

/// How a capture announces itself, for exercising both event orders
/// and the no-announcement paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CaptureEvents {
    /// ObjectAdded then CaptureComplete, the common order.
    #[default]
    Normal,
    /// CaptureComplete first; some firmwares report this way.
    CompleteFirst,
    /// ObjectAdded only, no CaptureComplete.
    ObjectOnly,
    /// No events at all.
    Silent,
}

/// Protocol state machine of the fake camera.
#[derive(Debug)]
pub struct VirtualDevice {
    endian: Endian,
    /// Descriptor served by `GetDeviceInfo`; tests tweak it freely.
    pub info: DeviceInfo,
    storage: StorageId,
    storage_info: StorageInfo,
    objects: BTreeMap<u32, StoredObject>,
    next_handle: u32,
    session: Option<u32>,
    open_rejections: u32,
    busy_captures: u32,
    capture_failures: VecDeque<ResponseCode>,
    capture_events: CaptureEvents,
    capture_payload: Vec<u8>,
    pending_info: Option<(ObjectHandle, ObjectInfo)>,
    events: VecDeque<Event>,
    properties: HashMap<u16, DevicePropDesc>,
}

impl Default for VirtualDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualDevice {
    /// A closed-session camera with one empty card and two properties.
    #[must_use]
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            DevicePropCode::BATTERY_LEVEL.0,
            DevicePropDesc {
                code: DevicePropCode::BATTERY_LEVEL,
                datatype: crate::proto::DataTypeCode::UINT8,
                access: PropAccess::ReadOnly,
                factory_default: Some(PropertyValue::U8(0)),
                current: Some(PropertyValue::U8(80)),
                form: PropForm::Range {
                    min: PropertyValue::U8(0),
                    max: PropertyValue::U8(100),
                    step: PropertyValue::U8(1),
                },
            },
        );
        properties.insert(
            DevicePropCode::WHITE_BALANCE.0,
            DevicePropDesc {
                code: DevicePropCode::WHITE_BALANCE,
                datatype: crate::proto::DataTypeCode::UINT16,
                access: PropAccess::ReadWrite,
                factory_default: Some(PropertyValue::U16(2)),
                current: Some(PropertyValue::U16(2)),
                form: PropForm::Enumeration {
                    values: vec![
                        PropertyValue::U16(2),
                        PropertyValue::U16(4),
                        PropertyValue::U16(5),
                        PropertyValue::U16(6),
                    ],
                },
            },
        );
        Self {
            endian: Endian::Little,
            info: test_device_info(),
            storage: StorageId(0x0001_0001),
            storage_info: test_storage_info(),
            objects: BTreeMap::new(),
            next_handle: 0x1001,
            session: None,
            open_rejections: 0,
            busy_captures: 0,
            capture_failures: VecDeque::new(),
            capture_events: CaptureEvents::default(),
            capture_payload: b"\xFF\xD8fake jpeg\xFF\xD9".to_vec(),
            pending_info: None,
            events: VecDeque::new(),
            properties,
        }
    }

    /// Byte order this device speaks.
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// True while a host session is open.
    #[must_use]
    pub fn session_open(&self) -> bool {
        self.session.is_some()
    }

    /// Puts an object on the card, returning its handle.
    pub fn add_object(&mut self, filename: &str, data: Vec<u8>) -> ObjectHandle {
        let handle = ObjectHandle(self.next_handle);
        self.next_handle += 1;
        let info = test_object_info(self.storage, filename, data.len() as u32);
        self.objects.insert(handle.0, StoredObject { info, data });
        handle
    }

    /// The stored object for `handle`.
    #[must_use]
    pub fn object(&self, handle: ObjectHandle) -> Option<&StoredObject> {
        self.objects.get(&handle.0)
    }

    /// Number of stored objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Answer the next `n` OpenSession attempts with SessionAlreadyOpen.
    pub fn reject_opens(&mut self, n: u32) {
        self.open_rejections = n;
    }

    /// Answer the next `n` capture triggers with DeviceBusy.
    pub fn busy_captures(&mut self, n: u32) {
        self.busy_captures = n;
    }

    /// Answer the next capture trigger with `code` instead of firing.
    pub fn fail_capture_with(&mut self, code: ResponseCode) {
        self.capture_failures.push_back(code);
    }

    /// Captures still fire but queue no events.
    pub fn suppress_capture_events(&mut self) {
        self.capture_events = CaptureEvents::Silent;
    }

    /// Captures announce CaptureComplete before ObjectAdded.
    pub fn announce_complete_first(&mut self) {
        self.capture_events = CaptureEvents::CompleteFirst;
    }

    /// Captures announce the object but never CaptureComplete.
    pub fn announce_object_only(&mut self) {
        self.capture_events = CaptureEvents::ObjectOnly;
    }

    /// The bytes the next capture produces.
    pub fn set_capture_payload(&mut self, data: Vec<u8>) {
        self.capture_payload = data;
    }

    /// Advertises `ExposureTime` and serves `value` (0.1 ms units).
    pub fn set_exposure_time(&mut self, value: u32) {
        self.info.add_properties(&[DevicePropCode::EXPOSURE_TIME]);
        self.properties.insert(
            DevicePropCode::EXPOSURE_TIME.0,
            DevicePropDesc {
                code: DevicePropCode::EXPOSURE_TIME,
                datatype: crate::proto::DataTypeCode::UINT32,
                access: PropAccess::ReadOnly,
                factory_default: Some(PropertyValue::U32(100)),
                current: Some(PropertyValue::U32(value)),
                form: PropForm::None,
            },
        );
    }

    /// Queues an event for the host to pick up.
    pub fn push_event(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// The next pending event, in device order.
    pub fn take_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// True for operations whose transaction carries host-to-device
    /// data.
    #[must_use]
    pub fn expects_data_out(op: OpCode) -> bool {
        matches!(
            op,
            OpCode::SEND_OBJECT_INFO | OpCode::SEND_OBJECT | OpCode::SET_DEVICE_PROP_VALUE
        ) || (op.is_vendor() && op.0 == crate::proto::vendor::sony::SET_CONTROL_DEVICE_B.0)
    }

    /// Executes one command the way firmware would.
    pub fn handle_command(&mut self, request: &Request, data: Option<&[u8]>) -> CommandReply {
        match request.code {
            OpCode::GET_DEVICE_INFO => self.reply_data(self.info.to_bytes(self.endian)),
            OpCode::OPEN_SESSION => self.open_session(request.params.first().copied()),
            OpCode::CLOSE_SESSION => self.close_session(),
            _ if self.session.is_none() => CommandReply::error(ResponseCode::SESSION_NOT_OPEN),
            OpCode::GET_STORAGE_IDS => {
                let mut w = WireWriter::new(self.endian);
                w.array_u32(&[self.storage.0]);
                CommandReply::data(w.into_bytes())
            }
            OpCode::GET_STORAGE_INFO => {
                if request.params.first() != Some(&self.storage.0) {
                    return CommandReply::error(ResponseCode::INVALID_STORAGE_ID);
                }
                self.reply_data(self.storage_info.to_bytes(self.endian))
            }
            OpCode::GET_NUM_OBJECTS => CommandReply::ok_with(vec![self.objects.len() as u32]),
            OpCode::GET_OBJECT_HANDLES => self.object_handles(&request.params),
            OpCode::GET_OBJECT_INFO => match self.lookup(request.params.first()) {
                Ok(object) => self.reply_data(object.info.to_bytes(self.endian)),
                Err(code) => CommandReply::error(code),
            },
            OpCode::GET_OBJECT => match self.lookup(request.params.first()) {
                Ok(object) => CommandReply::data(object.data.clone()),
                Err(code) => CommandReply::error(code),
            },
            OpCode::GET_PARTIAL_OBJECT => self.partial_object(&request.params),
            OpCode::GET_THUMB => CommandReply::error(ResponseCode::NO_THUMBNAIL_PRESENT),
            OpCode::DELETE_OBJECT => match request.params.first() {
                Some(&raw) if self.objects.remove(&raw).is_some() => CommandReply::ok(),
                _ => CommandReply::error(ResponseCode::INVALID_OBJECT_HANDLE),
            },
            OpCode::SEND_OBJECT_INFO => self.send_object_info(data),
            OpCode::SEND_OBJECT => self.send_object(data),
            OpCode::GET_DEVICE_PROP_DESC => match self.prop(request.params.first()) {
                Ok(desc) => self.reply_data(desc.to_bytes(self.endian)),
                Err(code) => CommandReply::error(code),
            },
            OpCode::GET_DEVICE_PROP_VALUE => match self.prop(request.params.first()) {
                Ok(desc) => match &desc.current {
                    Some(value) => {
                        let mut w = WireWriter::new(self.endian);
                        match value.encode(&mut w) {
                            Ok(()) => CommandReply::data(w.into_bytes()),
                            Err(_) => CommandReply::error(ResponseCode::GENERAL_ERROR),
                        }
                    }
                    None => CommandReply::error(ResponseCode::GENERAL_ERROR),
                },
                Err(code) => CommandReply::error(code),
            },
            OpCode::SET_DEVICE_PROP_VALUE => self.set_prop(&request.params, data),
            OpCode::INITIATE_CAPTURE => self.initiate_capture(),
            _ => CommandReply::error(ResponseCode::OPERATION_NOT_SUPPORTED),
        }
    }

    fn reply_data(
        &self,
        bytes: std::result::Result<Vec<u8>, crate::error::CodecError>,
    ) -> CommandReply {
        match bytes {
            Ok(bytes) => CommandReply::data(bytes),
            Err(_) => CommandReply::error(ResponseCode::GENERAL_ERROR),
        }
    }

    fn open_session(&mut self, session_id: Option<u32>) -> CommandReply {
        if self.open_rejections > 0 {
            self.open_rejections -= 1;
            return CommandReply::error(ResponseCode::SESSION_ALREADY_OPEN);
        }
        if self.session.is_some() {
            return CommandReply::error(ResponseCode::SESSION_ALREADY_OPEN);
        }
        match session_id {
            Some(id) if id != 0 => {
                self.session = Some(id);
                CommandReply::ok()
            }
            _ => CommandReply::error(ResponseCode::INVALID_PARAMETER),
        }
    }

    fn close_session(&mut self) -> CommandReply {
        if self.session.take().is_none() {
            return CommandReply::error(ResponseCode::SESSION_NOT_OPEN);
        }
        self.pending_info = None;
        CommandReply::ok()
    }

    fn lookup(&self, param: Option<&u32>) -> std::result::Result<&StoredObject, ResponseCode> {
        param
            .and_then(|raw| self.objects.get(raw))
            .ok_or(ResponseCode::INVALID_OBJECT_HANDLE)
    }

    fn prop(&self, param: Option<&u32>) -> std::result::Result<&DevicePropDesc, ResponseCode> {
        param
            .and_then(|&raw| self.properties.get(&(raw as u16)))
            .ok_or(ResponseCode::DEVICE_PROP_NOT_SUPPORTED)
    }

    fn object_handles(&self, params: &[u32]) -> CommandReply {
        let storage = params.first().copied().unwrap_or(StorageId::ALL.0);
        if storage != StorageId::ALL.0 && storage != self.storage.0 {
            return CommandReply::error(ResponseCode::INVALID_STORAGE_ID);
        }
        let parent = params.get(2).copied().unwrap_or(0);
        let handles: Vec<u32> = self
            .objects
            .iter()
            .filter(|(_, object)| match parent {
                0 => true,
                raw if raw == ObjectHandle::ALL.0 => {
                    object.info.parent_object == ObjectHandle::ROOT
                }
                raw => object.info.parent_object.0 == raw,
            })
            .map(|(&handle, _)| handle)
            .collect();
        let mut w = WireWriter::new(self.endian);
        w.array_u32(&handles);
        CommandReply::data(w.into_bytes())
    }

    fn partial_object(&self, params: &[u32]) -> CommandReply {
        let object = match self.lookup(params.first()) {
            Ok(object) => object,
            Err(code) => return CommandReply::error(code),
        };
        let offset = params.get(1).copied().unwrap_or(0) as usize;
        let length = params.get(2).copied().unwrap_or(u32::MAX) as usize;
        if offset > object.data.len() {
            return CommandReply::error(ResponseCode::INVALID_PARAMETER);
        }
        let end = object.data.len().min(offset.saturating_add(length));
        let slice = object.data[offset..end].to_vec();
        CommandReply {
            params: vec![slice.len() as u32],
            ..CommandReply::data(slice)
        }
    }

    fn send_object_info(&mut self, data: Option<&[u8]>) -> CommandReply {
        let Some(bytes) = data else {
            return CommandReply::error(ResponseCode::INVALID_PARAMETER);
        };
        let info = ObjectInfo::decode(bytes, self.endian);
        let handle = ObjectHandle(self.next_handle);
        self.next_handle += 1;
        self.pending_info = Some((handle, info));
        CommandReply::ok_with(vec![self.storage.0, ObjectHandle::ROOT.0, handle.0])
    }

    fn send_object(&mut self, data: Option<&[u8]>) -> CommandReply {
        let Some((handle, info)) = self.pending_info.take() else {
            return CommandReply::error(ResponseCode::NO_VALID_OBJECT_INFO);
        };
        let data = data.unwrap_or_default().to_vec();
        self.objects.insert(handle.0, StoredObject { info, data });
        CommandReply::ok()
    }

    fn set_prop(&mut self, params: &[u32], data: Option<&[u8]>) -> CommandReply {
        let Some(&raw) = params.first() else {
            return CommandReply::error(ResponseCode::INVALID_PARAMETER);
        };
        let Some(desc) = self.properties.get_mut(&(raw as u16)) else {
            return CommandReply::error(ResponseCode::DEVICE_PROP_NOT_SUPPORTED);
        };
        if desc.access != PropAccess::ReadWrite {
            return CommandReply::error(ResponseCode::ACCESS_DENIED);
        }
        let Some(bytes) = data else {
            return CommandReply::error(ResponseCode::INVALID_PARAMETER);
        };
        let mut reader = WireReader::new(bytes, self.endian);
        let Ok(value) = PropertyValue::decode(&mut reader, desc.datatype) else {
            return CommandReply::error(ResponseCode::INVALID_DEVICE_PROP_FORMAT);
        };
        if !desc.accepts(&value) {
            return CommandReply::error(ResponseCode::INVALID_DEVICE_PROP_VALUE);
        }
        desc.current = Some(value);
        CommandReply::ok()
    }

    fn initiate_capture(&mut self) -> CommandReply {
        if let Some(code) = self.capture_failures.pop_front() {
            return CommandReply::error(code);
        }
        if self.busy_captures > 0 {
            self.busy_captures -= 1;
            return CommandReply::error(ResponseCode::DEVICE_BUSY);
        }
        let handle = self.add_object("CAPT0001.JPG", self.capture_payload.clone());
        let added = Event {
            code: EventCode::OBJECT_ADDED,
            transaction_id: 0,
            params: vec![handle.0],
        };
        let complete = Event {
            code: EventCode::CAPTURE_COMPLETE,
            transaction_id: 0,
            params: vec![],
        };
        match self.capture_events {
            CaptureEvents::Normal => self.events.extend([added, complete]),
            CaptureEvents::CompleteFirst => self.events.extend([complete, added]),
            CaptureEvents::ObjectOnly => self.events.push_back(added),
            CaptureEvents::Silent => {}
        }
        CommandReply::ok()
    }
}

/// The [`VirtualDevice`] behind a USB endpoint surface.
///
/// Containers arrive unsplit (header and payload in one transfer), the
/// way most real devices answer, so the framing layer settles into
/// unsplit mode against it.
#[derive(Debug)]
pub struct VirtualCamera {
    device: VirtualDevice,
    inbound: VecDeque<Vec<u8>>,
    pending_command: Option<Request>,
    status: ResponseCode,
    max_packet: usize,
}

impl VirtualCamera {
    /// Wraps a device in endpoint framing.
    #[must_use]
    pub fn new(device: VirtualDevice) -> Self {
        Self {
            device,
            inbound: VecDeque::new(),
            pending_command: None,
            status: ResponseCode::OK,
            max_packet: 512,
        }
    }

    /// The device inside, for staging state and injecting faults.
    pub fn device_mut(&mut self) -> &mut VirtualDevice {
        &mut self.device
    }

    /// The device inside.
    #[must_use]
    pub fn device(&self) -> &VirtualDevice {
        &self.device
    }

    fn execute(&mut self, request: Request, data: Option<&[u8]>) {
        let endian = self.device.endian();
        let reply = self.device.handle_command(&request, data);
        if let Some(payload) = reply.data {
            self.inbound.push_back(data_container(
                endian,
                request.code,
                request.transaction_id,
                &payload,
            ));
        }
        self.inbound.push_back(response_container(
            endian,
            reply.code,
            request.transaction_id,
            &reply.params,
        ));
    }

    fn accept(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            // Zero-length packet terminating an exact-multiple write.
            return Ok(());
        }
        let endian = self.device.endian();
        let mut reader = WireReader::new(bytes, endian);
        let _declared = reader.u32("container length")?;
        let raw_kind = reader.u16("container kind")?;
        let code = reader.u16("container code")?;
        let transaction_id = reader.u32("transaction id")?;

        match ContainerKind::from_u16(raw_kind) {
            Some(ContainerKind::Command) => {
                let mut params = Vec::new();
                while reader.remaining() >= 4 {
                    params.push(reader.u32("parameter")?);
                }
                let request = Request {
                    code: OpCode(code),
                    transaction_id,
                    params,
                };
                if VirtualDevice::expects_data_out(request.code) {
                    self.pending_command = Some(request);
                } else {
                    self.execute(request, None);
                }
                Ok(())
            }
            Some(ContainerKind::Data) => {
                let payload = &bytes[CONTAINER_HEADER_LEN.min(bytes.len())..];
                match self.pending_command.take() {
                    Some(request) => {
                        self.execute(request, Some(payload));
                        Ok(())
                    }
                    None => Err(PtpError::MalformedContainer {
                        message: "data container with no command outstanding".into(),
                    }),
                }
            }
            _ => Err(PtpError::MalformedContainer {
                message: format!("unexpected container kind {raw_kind:#06x} from host"),
            }),
        }
    }
}

#[async_trait]
impl UsbPipe for VirtualCamera {
    async fn bulk_out(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.accept(data)?;
        Ok(data.len())
    }

    async fn bulk_in(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        match self.inbound.pop_front() {
            Some(mut transfer) => {
                if transfer.len() > max_len {
                    let rest = transfer.split_off(max_len);
                    self.inbound.push_front(rest);
                }
                Ok(transfer)
            }
            None => Err(PtpError::Timeout { duration: timeout }),
        }
    }

    async fn interrupt_in(&mut self, _max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let endian = self.device.endian();
        match self.device.take_event() {
            Some(event) => Ok(event_container(
                endian,
                event.code,
                event.transaction_id,
                &event.params,
            )),
            None => Err(PtpError::Timeout { duration: timeout }),
        }
    }

    async fn control_out(
        &mut self,
        request: u8,
        _value: u16,
        _index: u16,
        _data: &[u8],
        _timeout: Duration,
    ) -> Result<()> {
        match request {
            // Cancel: drop the exchange in progress.
            0x64 => {
                self.inbound.clear();
                self.pending_command = None;
                self.status = ResponseCode::OK;
                Ok(())
            }
            // Device reset: back to the closed-session state.
            0x66 => {
                self.device.session = None;
                self.device.open_rejections = 0;
                self.inbound.clear();
                self.pending_command = None;
                self.status = ResponseCode::OK;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn control_in(
        &mut self,
        request: u8,
        _value: u16,
        _index: u16,
        _max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        if request == 0x67 {
            let mut w = WireWriter::new(self.device.endian());
            w.u16(4);
            w.u16(self.status.0);
            return Ok(w.into_bytes());
        }
        Err(PtpError::Timeout { duration: timeout })
    }

    async fn clear_halt_in(&mut self) -> Result<()> {
        Ok(())
    }

    async fn clear_halt_out(&mut self) -> Result<()> {
        Ok(())
    }

    fn max_packet_size(&self) -> usize {
        self.max_packet
    }
}
