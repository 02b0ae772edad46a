//! PTP protocol constants and code types.
//!
//! PTP identifies everything by 16-bit codes: operations, responses,
//! events, object formats, device properties and data types. The code
//! spaces are open — vendors allocate freely above 0x9000 (operations)
//! and 0xC000 (events) — so codes are newtypes over the raw integer
//! with well-known values as associated constants, not closed enums.
//!
//! Vendor-specific codes live in the [`vendor`] submodule.

pub mod vendor;

use std::fmt;

/// Container kind discriminant carried in every bulk container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ContainerKind {
    /// Command block (request phase).
    Command = 1,
    /// Data block (data phase).
    Data = 2,
    /// Response block (response phase).
    Response = 3,
    /// Asynchronous event block.
    Event = 4,
}

impl ContainerKind {
    /// Decodes the wire discriminant, `None` for unknown values.
    #[must_use]
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Self::Command),
            2 => Some(Self::Data),
            3 => Some(Self::Response),
            4 => Some(Self::Event),
            _ => None,
        }
    }
}

/// Size of the bulk container header: length + type + code + transaction id.
pub const CONTAINER_HEADER_LEN: usize = 12;

/// Maximum number of u32 parameters in a command or response container.
pub const MAX_PARAMS: usize = 5;

/// Maximum number of u32 parameters in an event container.
pub const MAX_EVENT_PARAMS: usize = 3;

/// Maximum character count of a PTP string (excluding the terminator).
pub const MAX_STRING_CHARS: usize = 255;

/// An object handle as assigned by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectHandle(pub u32);

impl ObjectHandle {
    /// The root of the object forest (no parent).
    pub const ROOT: Self = Self(0);
    /// Wildcard handle meaning "all objects" in listing operations.
    pub const ALL: Self = Self(0xFFFF_FFFF);

    /// True for the handle values that never name a plain stored object.
    #[must_use]
    pub fn is_special(self) -> bool {
        self == Self::ROOT || self == Self::ALL
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// A storage identifier. The high 16 bits name the physical store, the
/// low 16 bits the logical partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StorageId(pub u32);

impl StorageId {
    /// Wildcard matching every store in listing operations.
    pub const ALL: Self = Self(0xFFFF_FFFF);

    /// True if the logical partition half is populated.
    #[must_use]
    pub fn has_logical(self) -> bool {
        self.0 & 0x0000_FFFF != 0
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// An operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpCode(pub u16);

impl OpCode {
    /// `GetDeviceInfo` — fetch the device descriptor, allowed outside a session.
    pub const GET_DEVICE_INFO: Self = Self(0x1001);
    /// `OpenSession` — open a session with the given session id.
    pub const OPEN_SESSION: Self = Self(0x1002);
    /// `CloseSession`.
    pub const CLOSE_SESSION: Self = Self(0x1003);
    /// `GetStorageIDs`.
    pub const GET_STORAGE_IDS: Self = Self(0x1004);
    /// `GetStorageInfo`.
    pub const GET_STORAGE_INFO: Self = Self(0x1005);
    /// `GetNumObjects`.
    pub const GET_NUM_OBJECTS: Self = Self(0x1006);
    /// `GetObjectHandles`.
    pub const GET_OBJECT_HANDLES: Self = Self(0x1007);
    /// `GetObjectInfo`.
    pub const GET_OBJECT_INFO: Self = Self(0x1008);
    /// `GetObject`.
    pub const GET_OBJECT: Self = Self(0x1009);
    /// `GetThumb`.
    pub const GET_THUMB: Self = Self(0x100A);
    /// `DeleteObject`.
    pub const DELETE_OBJECT: Self = Self(0x100B);
    /// `SendObjectInfo` — announce an upload.
    pub const SEND_OBJECT_INFO: Self = Self(0x100C);
    /// `SendObject` — upload the bytes announced by `SendObjectInfo`.
    pub const SEND_OBJECT: Self = Self(0x100D);
    /// `InitiateCapture`.
    pub const INITIATE_CAPTURE: Self = Self(0x100E);
    /// `FormatStore`.
    pub const FORMAT_STORE: Self = Self(0x100F);
    /// `ResetDevice`.
    pub const RESET_DEVICE: Self = Self(0x1010);
    /// `SelfTest`.
    pub const SELF_TEST: Self = Self(0x1011);
    /// `SetObjectProtection`.
    pub const SET_OBJECT_PROTECTION: Self = Self(0x1012);
    /// `PowerDown`.
    pub const POWER_DOWN: Self = Self(0x1013);
    /// `GetDevicePropDesc`.
    pub const GET_DEVICE_PROP_DESC: Self = Self(0x1014);
    /// `GetDevicePropValue`.
    pub const GET_DEVICE_PROP_VALUE: Self = Self(0x1015);
    /// `SetDevicePropValue`.
    pub const SET_DEVICE_PROP_VALUE: Self = Self(0x1016);
    /// `ResetDevicePropValue`.
    pub const RESET_DEVICE_PROP_VALUE: Self = Self(0x1017);
    /// `TerminateOpenCapture`.
    pub const TERMINATE_OPEN_CAPTURE: Self = Self(0x1018);
    /// `MoveObject`.
    pub const MOVE_OBJECT: Self = Self(0x1019);
    /// `CopyObject`.
    pub const COPY_OBJECT: Self = Self(0x101A);
    /// `GetPartialObject`.
    pub const GET_PARTIAL_OBJECT: Self = Self(0x101B);
    /// `InitiateOpenCapture` — capture until `TerminateOpenCapture`.
    pub const INITIATE_OPEN_CAPTURE: Self = Self(0x101C);

    /// True for vendor-allocated codes (0x9xxx space).
    #[must_use]
    pub fn is_vendor(self) -> bool {
        self.0 & 0xF000 == 0x9000
    }

    /// True for operations that trigger image acquisition and therefore
    /// run under the long capture timeout tier.
    #[must_use]
    pub fn is_capture(self) -> bool {
        matches!(
            self,
            Self::INITIATE_CAPTURE | Self::INITIATE_OPEN_CAPTURE
        ) || matches!(
            self,
            vendor::nikon::CAPTURE
                | vendor::nikon::AF_CAPTURE_SDRAM
                | vendor::canon::INITIATE_CAPTURE_IN_MEMORY
                | vendor::canon::eos::REMOTE_RELEASE
        )
    }

    /// Well-known name, if this is a standard code.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::GET_DEVICE_INFO => "GetDeviceInfo",
            Self::OPEN_SESSION => "OpenSession",
            Self::CLOSE_SESSION => "CloseSession",
            Self::GET_STORAGE_IDS => "GetStorageIDs",
            Self::GET_STORAGE_INFO => "GetStorageInfo",
            Self::GET_NUM_OBJECTS => "GetNumObjects",
            Self::GET_OBJECT_HANDLES => "GetObjectHandles",
            Self::GET_OBJECT_INFO => "GetObjectInfo",
            Self::GET_OBJECT => "GetObject",
            Self::GET_THUMB => "GetThumb",
            Self::DELETE_OBJECT => "DeleteObject",
            Self::SEND_OBJECT_INFO => "SendObjectInfo",
            Self::SEND_OBJECT => "SendObject",
            Self::INITIATE_CAPTURE => "InitiateCapture",
            Self::FORMAT_STORE => "FormatStore",
            Self::RESET_DEVICE => "ResetDevice",
            Self::SELF_TEST => "SelfTest",
            Self::SET_OBJECT_PROTECTION => "SetObjectProtection",
            Self::POWER_DOWN => "PowerDown",
            Self::GET_DEVICE_PROP_DESC => "GetDevicePropDesc",
            Self::GET_DEVICE_PROP_VALUE => "GetDevicePropValue",
            Self::SET_DEVICE_PROP_VALUE => "SetDevicePropValue",
            Self::RESET_DEVICE_PROP_VALUE => "ResetDevicePropValue",
            Self::TERMINATE_OPEN_CAPTURE => "TerminateOpenCapture",
            Self::MOVE_OBJECT => "MoveObject",
            Self::COPY_OBJECT => "CopyObject",
            Self::GET_PARTIAL_OBJECT => "GetPartialObject",
            Self::INITIATE_OPEN_CAPTURE => "InitiateOpenCapture",
            _ => return None,
        })
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "Op(0x{:04x})", self.0),
        }
    }
}

/// A response code returned in the response phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(pub u16);

impl ResponseCode {
    /// Undefined.
    pub const UNDEFINED: Self = Self(0x2000);
    /// Operation succeeded.
    pub const OK: Self = Self(0x2001);
    /// Unspecified failure.
    pub const GENERAL_ERROR: Self = Self(0x2002);
    /// No session is open.
    pub const SESSION_NOT_OPEN: Self = Self(0x2003);
    /// Transaction id did not match the device's expectation.
    pub const INVALID_TRANSACTION_ID: Self = Self(0x2004);
    /// Operation absent from the device's supported set.
    pub const OPERATION_NOT_SUPPORTED: Self = Self(0x2005);
    /// A parameter is not supported for this operation.
    pub const PARAMETER_NOT_SUPPORTED: Self = Self(0x2006);
    /// A data transfer was cut short.
    pub const INCOMPLETE_TRANSFER: Self = Self(0x2007);
    /// Storage id does not name a store.
    pub const INVALID_STORAGE_ID: Self = Self(0x2008);
    /// Handle does not name an object.
    pub const INVALID_OBJECT_HANDLE: Self = Self(0x2009);
    /// Property code not supported.
    pub const DEVICE_PROP_NOT_SUPPORTED: Self = Self(0x200A);
    /// Object format code not valid here.
    pub const INVALID_OBJECT_FORMAT_CODE: Self = Self(0x200B);
    /// Store cannot hold more objects.
    pub const STORE_FULL: Self = Self(0x200C);
    /// Object is write protected.
    pub const OBJECT_WRITE_PROTECTED: Self = Self(0x200D);
    /// Store is read only.
    pub const STORE_READ_ONLY: Self = Self(0x200E);
    /// Access denied (also: object staged but not yet readable).
    pub const ACCESS_DENIED: Self = Self(0x200F);
    /// Object has no thumbnail.
    pub const NO_THUMBNAIL_PRESENT: Self = Self(0x2010);
    /// Self test failed.
    pub const SELF_TEST_FAILED: Self = Self(0x2011);
    /// Only part of a multi-object deletion succeeded.
    pub const PARTIAL_DELETION: Self = Self(0x2012);
    /// Store exists but is not currently available.
    pub const STORE_NOT_AVAILABLE: Self = Self(0x2013);
    /// Listing by format not supported.
    pub const SPECIFICATION_BY_FORMAT_UNSUPPORTED: Self = Self(0x2014);
    /// No `SendObjectInfo` preceded `SendObject`.
    pub const NO_VALID_OBJECT_INFO: Self = Self(0x2015);
    /// Malformed code in request.
    pub const INVALID_CODE_FORMAT: Self = Self(0x2016);
    /// Vendor code not understood.
    pub const UNKNOWN_VENDOR_CODE: Self = Self(0x2017);
    /// Open capture already terminated.
    pub const CAPTURE_ALREADY_TERMINATED: Self = Self(0x2018);
    /// Device cannot service the request right now; retry with backoff.
    pub const DEVICE_BUSY: Self = Self(0x2019);
    /// Parent handle does not name an association.
    pub const INVALID_PARENT_OBJECT: Self = Self(0x201A);
    /// Property descriptor format invalid.
    pub const INVALID_DEVICE_PROP_FORMAT: Self = Self(0x201B);
    /// Property value out of range.
    pub const INVALID_DEVICE_PROP_VALUE: Self = Self(0x201C);
    /// Parameter value invalid.
    pub const INVALID_PARAMETER: Self = Self(0x201D);
    /// A session is already open.
    pub const SESSION_ALREADY_OPEN: Self = Self(0x201E);
    /// Transaction was cancelled by the initiator.
    pub const TRANSACTION_CANCELLED: Self = Self(0x201F);
    /// Upload destination specification unsupported.
    pub const SPECIFICATION_OF_DESTINATION_UNSUPPORTED: Self = Self(0x2020);

    /// True when the code signals success.
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    /// Well-known name, if this is a standard code.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::UNDEFINED => "Undefined",
            Self::OK => "OK",
            Self::GENERAL_ERROR => "GeneralError",
            Self::SESSION_NOT_OPEN => "SessionNotOpen",
            Self::INVALID_TRANSACTION_ID => "InvalidTransactionID",
            Self::OPERATION_NOT_SUPPORTED => "OperationNotSupported",
            Self::PARAMETER_NOT_SUPPORTED => "ParameterNotSupported",
            Self::INCOMPLETE_TRANSFER => "IncompleteTransfer",
            Self::INVALID_STORAGE_ID => "InvalidStorageID",
            Self::INVALID_OBJECT_HANDLE => "InvalidObjectHandle",
            Self::DEVICE_PROP_NOT_SUPPORTED => "DevicePropNotSupported",
            Self::INVALID_OBJECT_FORMAT_CODE => "InvalidObjectFormatCode",
            Self::STORE_FULL => "StoreFull",
            Self::OBJECT_WRITE_PROTECTED => "ObjectWriteProtected",
            Self::STORE_READ_ONLY => "StoreReadOnly",
            Self::ACCESS_DENIED => "AccessDenied",
            Self::NO_THUMBNAIL_PRESENT => "NoThumbnailPresent",
            Self::SELF_TEST_FAILED => "SelfTestFailed",
            Self::PARTIAL_DELETION => "PartialDeletion",
            Self::STORE_NOT_AVAILABLE => "StoreNotAvailable",
            Self::SPECIFICATION_BY_FORMAT_UNSUPPORTED => "SpecificationByFormatUnsupported",
            Self::NO_VALID_OBJECT_INFO => "NoValidObjectInfo",
            Self::INVALID_CODE_FORMAT => "InvalidCodeFormat",
            Self::UNKNOWN_VENDOR_CODE => "UnknownVendorCode",
            Self::CAPTURE_ALREADY_TERMINATED => "CaptureAlreadyTerminated",
            Self::DEVICE_BUSY => "DeviceBusy",
            Self::INVALID_PARENT_OBJECT => "InvalidParentObject",
            Self::INVALID_DEVICE_PROP_FORMAT => "InvalidDevicePropFormat",
            Self::INVALID_DEVICE_PROP_VALUE => "InvalidDevicePropValue",
            Self::INVALID_PARAMETER => "InvalidParameter",
            Self::SESSION_ALREADY_OPEN => "SessionAlreadyOpen",
            Self::TRANSACTION_CANCELLED => "TransactionCancelled",
            Self::SPECIFICATION_OF_DESTINATION_UNSUPPORTED => {
                "SpecificationOfDestinationUnsupported"
            }
            _ => return None,
        })
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "Response(0x{:04x})", self.0),
        }
    }
}

/// An event code carried in event containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventCode(pub u16);

impl EventCode {
    /// Undefined.
    pub const UNDEFINED: Self = Self(0x4000);
    /// The initiator cancelled the transaction named by param 1.
    pub const CANCEL_TRANSACTION: Self = Self(0x4001);
    /// A new object exists; param 1 is its handle.
    pub const OBJECT_ADDED: Self = Self(0x4002);
    /// The object named by param 1 is gone.
    pub const OBJECT_REMOVED: Self = Self(0x4003);
    /// A store appeared; param 1 is its id.
    pub const STORE_ADDED: Self = Self(0x4004);
    /// A store disappeared.
    pub const STORE_REMOVED: Self = Self(0x4005);
    /// The property named by param 1 changed value.
    pub const DEVICE_PROP_CHANGED: Self = Self(0x4006);
    /// Object metadata changed; param 1 is the handle.
    pub const OBJECT_INFO_CHANGED: Self = Self(0x4007);
    /// The device descriptor changed; re-fetch it.
    pub const DEVICE_INFO_CHANGED: Self = Self(0x4008);
    /// Device asks the host to fetch the object named by param 1.
    pub const REQUEST_OBJECT_TRANSFER: Self = Self(0x4009);
    /// A store filled up.
    pub const STORE_FULL: Self = Self(0x400A);
    /// The device reset itself.
    pub const DEVICE_RESET: Self = Self(0x400B);
    /// Storage info changed.
    pub const STORAGE_INFO_CHANGED: Self = Self(0x400C);
    /// A capture sequence finished.
    pub const CAPTURE_COMPLETE: Self = Self(0x400D);
    /// Events were lost; poll device state.
    pub const UNREPORTED_STATUS: Self = Self(0x400E);

    /// True for vendor-allocated codes (0xCxxx space).
    #[must_use]
    pub fn is_vendor(self) -> bool {
        self.0 & 0xF000 == 0xC000
    }

    /// Well-known name, if this is a standard code.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::UNDEFINED => "Undefined",
            Self::CANCEL_TRANSACTION => "CancelTransaction",
            Self::OBJECT_ADDED => "ObjectAdded",
            Self::OBJECT_REMOVED => "ObjectRemoved",
            Self::STORE_ADDED => "StoreAdded",
            Self::STORE_REMOVED => "StoreRemoved",
            Self::DEVICE_PROP_CHANGED => "DevicePropChanged",
            Self::OBJECT_INFO_CHANGED => "ObjectInfoChanged",
            Self::DEVICE_INFO_CHANGED => "DeviceInfoChanged",
            Self::REQUEST_OBJECT_TRANSFER => "RequestObjectTransfer",
            Self::STORE_FULL => "StoreFull",
            Self::DEVICE_RESET => "DeviceReset",
            Self::STORAGE_INFO_CHANGED => "StorageInfoChanged",
            Self::CAPTURE_COMPLETE => "CaptureComplete",
            Self::UNREPORTED_STATUS => "UnreportedStatus",
            _ => return None,
        })
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "Event(0x{:04x})", self.0),
        }
    }
}

/// A device property code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DevicePropCode(pub u16);

impl DevicePropCode {
    /// Battery charge as a fraction of full.
    pub const BATTERY_LEVEL: Self = Self(0x5001);
    /// Functional mode.
    pub const FUNCTIONAL_MODE: Self = Self(0x5002);
    /// Sensor resolution in use.
    pub const IMAGE_SIZE: Self = Self(0x5003);
    /// Compression level in use.
    pub const COMPRESSION_SETTING: Self = Self(0x5004);
    /// White balance mode.
    pub const WHITE_BALANCE: Self = Self(0x5005);
    /// F-number ×100.
    pub const F_NUMBER: Self = Self(0x5007);
    /// Focal length in 0.01 mm.
    pub const FOCAL_LENGTH: Self = Self(0x5008);
    /// Focus mode.
    pub const FOCUS_MODE: Self = Self(0x500A);
    /// Exposure metering mode.
    pub const EXPOSURE_METERING_MODE: Self = Self(0x500B);
    /// Flash mode.
    pub const FLASH_MODE: Self = Self(0x500C);
    /// Exposure time in 0.1 ms.
    pub const EXPOSURE_TIME: Self = Self(0x500D);
    /// Exposure program mode.
    pub const EXPOSURE_PROGRAM_MODE: Self = Self(0x500E);
    /// ISO value.
    pub const EXPOSURE_INDEX: Self = Self(0x500F);
    /// Exposure compensation in 1/1000 EV.
    pub const EXPOSURE_BIAS_COMPENSATION: Self = Self(0x5010);
    /// Device clock as an ISO-8601 string.
    pub const DATE_TIME: Self = Self(0x5011);
    /// Self-timer delay in ms.
    pub const CAPTURE_DELAY: Self = Self(0x5012);
    /// Still capture mode (single, burst, timelapse).
    pub const STILL_CAPTURE_MODE: Self = Self(0x5013);
    /// Number of frames per burst.
    pub const BURST_NUMBER: Self = Self(0x5018);

    /// True for vendor-allocated codes (0xDxxx space).
    #[must_use]
    pub fn is_vendor(self) -> bool {
        self.0 & 0xF000 == 0xD000
    }
}

impl fmt::Display for DevicePropCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prop(0x{:04x})", self.0)
    }
}

/// An object format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectFormatCode(pub u16);

impl ObjectFormatCode {
    /// Unknown non-image object.
    pub const UNDEFINED: Self = Self(0x3000);
    /// Folder (association).
    pub const ASSOCIATION: Self = Self(0x3001);
    /// Device script.
    pub const SCRIPT: Self = Self(0x3002);
    /// Plain text.
    pub const TEXT: Self = Self(0x3004);
    /// Unknown image object.
    pub const UNDEFINED_IMAGE: Self = Self(0x3800);
    /// EXIF/JPEG image.
    pub const EXIF_JPEG: Self = Self(0x3801);
    /// TIFF/EP image.
    pub const TIFF_EP: Self = Self(0x3802);
    /// PNG image.
    pub const PNG: Self = Self(0x380B);
    /// TIFF image.
    pub const TIFF: Self = Self(0x380D);

    /// True if the format names any kind of image.
    #[must_use]
    pub fn is_image(self) -> bool {
        self.0 & 0xF800 == 0x3800
    }
}

impl fmt::Display for ObjectFormatCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Format(0x{:04x})", self.0)
    }
}

/// A data type code, as used in property descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataTypeCode(pub u16);

impl DataTypeCode {
    /// No value.
    pub const UNDEFINED: Self = Self(0x0000);
    /// Signed 8 bit.
    pub const INT8: Self = Self(0x0001);
    /// Unsigned 8 bit.
    pub const UINT8: Self = Self(0x0002);
    /// Signed 16 bit.
    pub const INT16: Self = Self(0x0003);
    /// Unsigned 16 bit.
    pub const UINT16: Self = Self(0x0004);
    /// Signed 32 bit.
    pub const INT32: Self = Self(0x0005);
    /// Unsigned 32 bit.
    pub const UINT32: Self = Self(0x0006);
    /// Signed 64 bit.
    pub const INT64: Self = Self(0x0007);
    /// Unsigned 64 bit.
    pub const UINT64: Self = Self(0x0008);
    /// Signed 128 bit.
    pub const INT128: Self = Self(0x0009);
    /// Unsigned 128 bit.
    pub const UINT128: Self = Self(0x000A);
    /// Array of signed 8 bit.
    pub const AINT8: Self = Self(0x4001);
    /// Array of unsigned 8 bit.
    pub const AUINT8: Self = Self(0x4002);
    /// Array of signed 16 bit.
    pub const AINT16: Self = Self(0x4003);
    /// Array of unsigned 16 bit.
    pub const AUINT16: Self = Self(0x4004);
    /// Array of signed 32 bit.
    pub const AINT32: Self = Self(0x4005);
    /// Array of unsigned 32 bit.
    pub const AUINT32: Self = Self(0x4006);
    /// Array of signed 64 bit.
    pub const AINT64: Self = Self(0x4007);
    /// Array of unsigned 64 bit.
    pub const AUINT64: Self = Self(0x4008);
    /// Array of signed 128 bit.
    pub const AINT128: Self = Self(0x4009);
    /// Array of unsigned 128 bit.
    pub const AUINT128: Self = Self(0x400A);
    /// UTF-16 string.
    pub const STRING: Self = Self(0xFFFF);

    /// True for the array flavors (element type in the low bits).
    #[must_use]
    pub fn is_array(self) -> bool {
        self.0 & 0x4000 != 0 && self != Self::STRING
    }

    /// Element type of an array flavor, identity otherwise.
    #[must_use]
    pub fn element(self) -> Self {
        if self.is_array() {
            Self(self.0 & !0x4000)
        } else {
            self
        }
    }
}

impl fmt::Display for DataTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type(0x{:04x})", self.0)
    }
}

/// Vendor extension id reported in the device descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VendorExtensionId(pub u32);

impl VendorExtensionId {
    /// Eastman Kodak.
    pub const KODAK: Self = Self(0x0000_0001);
    /// Seiko Epson.
    pub const EPSON: Self = Self(0x0000_0002);
    /// Agilent.
    pub const AGILENT: Self = Self(0x0000_0003);
    /// Polaroid.
    pub const POLAROID: Self = Self(0x0000_0004);
    /// Agfa-Gevaert.
    pub const AGFA_GEVAERT: Self = Self(0x0000_0005);
    /// Microsoft (MTP devices).
    pub const MICROSOFT: Self = Self(0x0000_0006);
    /// Equinox.
    pub const EQUINOX: Self = Self(0x0000_0007);
    /// Viewquest.
    pub const VIEWQUEST: Self = Self(0x0000_0008);
    /// STMicroelectronics.
    pub const ST_MICRO: Self = Self(0x0000_0009);
    /// Nikon.
    pub const NIKON: Self = Self(0x0000_000A);
    /// Canon.
    pub const CANON: Self = Self(0x0000_000B);
    /// Fujifilm.
    pub const FUJI: Self = Self(0x0000_000E);
    /// Sony.
    pub const SONY: Self = Self(0x0000_0011);
}

impl fmt::Display for VendorExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::KODAK => "Kodak",
            Self::EPSON => "Epson",
            Self::AGILENT => "Agilent",
            Self::POLAROID => "Polaroid",
            Self::AGFA_GEVAERT => "Agfa-Gevaert",
            Self::MICROSOFT => "Microsoft",
            Self::EQUINOX => "Equinox",
            Self::VIEWQUEST => "Viewquest",
            Self::ST_MICRO => "STMicroelectronics",
            Self::NIKON => "Nikon",
            Self::CANON => "Canon",
            Self::FUJI => "Fuji",
            Self::SONY => "Sony",
            Self(other) => return write!(f, "Vendor(0x{other:08x})"),
        };
        write!(f, "{name}")
    }
}

/// Association (folder) type codes used in object descriptors.
pub mod association {
    /// Plain folder.
    pub const GENERIC_FOLDER: u16 = 0x0001;
    /// Photo album.
    pub const ALBUM: u16 = 0x0002;
    /// Time sequence (burst).
    pub const TIME_SEQUENCE: u16 = 0x0003;
    /// Panorama in the horizontal direction.
    pub const HORIZONTAL_PANORAMIC: u16 = 0x0004;
    /// Panorama in the vertical direction.
    pub const VERTICAL_PANORAMIC: u16 = 0x0005;
    /// Two-dimensional panorama.
    pub const PANORAMIC_2D: u16 = 0x0006;
    /// Ancillary data association.
    pub const ANCILLARY_DATA: u16 = 0x0007;
}

/// Protection status values in object descriptors.
pub mod protection {
    /// Object may be deleted or overwritten.
    pub const NONE: u16 = 0x0000;
    /// Object is read only.
    pub const READ_ONLY: u16 = 0x0001;
}

/// Storage descriptor constants.
pub mod storage {
    /// Store type: undefined.
    pub const TYPE_UNDEFINED: u16 = 0x0000;
    /// Store type: fixed ROM.
    pub const TYPE_FIXED_ROM: u16 = 0x0001;
    /// Store type: removable ROM.
    pub const TYPE_REMOVABLE_ROM: u16 = 0x0002;
    /// Store type: fixed RAM.
    pub const TYPE_FIXED_RAM: u16 = 0x0003;
    /// Store type: removable media (cards).
    pub const TYPE_REMOVABLE_RAM: u16 = 0x0004;

    /// Filesystem: generic flat.
    pub const FS_GENERIC_FLAT: u16 = 0x0001;
    /// Filesystem: generic hierarchical.
    pub const FS_GENERIC_HIERARCHICAL: u16 = 0x0002;
    /// Filesystem: DCF layout.
    pub const FS_DCF: u16 = 0x0003;

    /// Access: read-write.
    pub const ACCESS_READ_WRITE: u16 = 0x0000;
    /// Access: read-only without object deletion.
    pub const ACCESS_READ_ONLY: u16 = 0x0001;
    /// Access: read-only with object deletion allowed.
    pub const ACCESS_READ_ONLY_WITH_DELETE: u16 = 0x0002;
}
