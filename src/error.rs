use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::proto::{ContainerKind, OpCode, ResponseCode};

/// Wire decode errors produced by the codec layer.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Buffer ended before the value did
    #[error("truncated {what}: need {needed} bytes, have {remaining}")]
    Truncated {
        /// What was being decoded
        what: &'static str,
        /// Bytes the decode needed
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// Declared element count would read past the buffer
    #[error("array count {count} overruns buffer ({remaining} bytes left)")]
    CountOverrun {
        /// Declared element count
        count: u32,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// Value does not fit the declared wire type
    #[error("invalid {what}: {value:#x}")]
    InvalidValue {
        /// What was being decoded
        what: &'static str,
        /// The offending raw value
        value: u64,
    },

    /// String exceeds the protocol's 255 character limit
    #[error("string too long to pack: {chars} characters")]
    StringTooLong {
        /// Character count of the rejected string
        chars: usize,
    },
}

/// Errors that can occur during PTP operations
#[derive(Debug, Error)]
pub enum PtpError {
    /// Wire decode error
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    // ===== Device Response Errors =====
    /// Operation absent from the device's advertised set
    #[error("operation not supported: {op}")]
    NotSupported {
        /// The rejected operation
        op: OpCode,
    },

    /// A request parameter was rejected
    #[error("bad parameter: {code}")]
    BadParameter {
        /// The device's response code
        code: ResponseCode,
    },

    /// The device cannot service the request yet; retry with backoff
    #[error("device busy")]
    DeviceBusy,

    /// Session command arrived without an open session
    #[error("session not open")]
    SessionNotOpen,

    /// A session is already open on this connection
    #[error("session already open")]
    SessionAlreadyOpen,

    /// Handle does not name an object on the device
    #[error("invalid object handle")]
    InvalidObjectHandle,

    /// Access to the object was denied (possibly: staged but not ready)
    #[error("access denied")]
    AccessDenied,

    /// The store is out of space
    #[error("store full")]
    StoreFull,

    /// The object or store is write protected
    #[error("write protected")]
    WriteProtected,

    /// The transaction was cancelled on the device side
    #[error("transaction cancelled by device")]
    TransactionCancelled,

    /// Response code with no specific mapping
    #[error("device failure: {code}")]
    GeneralFailure {
        /// The raw response code
        code: ResponseCode,
    },

    // ===== Capture Errors =====
    /// Autofocus could not lock
    #[error("focus could not be acquired")]
    NoFocus,

    /// Mirror is up; capture blocked until it is released
    #[error("mirror is locked up")]
    MirrorUp,

    /// Capture rejected because the storage is full
    #[error("storage full")]
    StorageFull,

    /// Capture rejected because the storage is write protected
    #[error("storage is write protected")]
    StorageProtected,

    /// Device ran out of internal buffer memory
    #[error("device out of memory")]
    NoMoreMemory,

    /// Capture finished but no object was produced before the deadline
    #[error("no object appeared within {waited:?}")]
    NoObjectProduced {
        /// How long the orchestrator waited
        waited: Duration,
    },

    // ===== Transport Errors =====
    /// Transport I/O failure; fatal to the session
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bulk endpoint stalled; the framing layer clears the halt and
    /// retries the transfer once before surfacing this
    #[error("endpoint stalled")]
    EndpointStalled,

    /// Operation did not complete within its timeout tier
    #[error("timed out after {duration:?}")]
    Timeout {
        /// The timeout that elapsed
        duration: Duration,
    },

    /// Cancelled by the caller's cancellation token
    #[error("cancelled")]
    Cancelled,

    /// The peer closed the connection
    #[error("device disconnected")]
    Disconnected,

    /// Operation attempted before the transport was connected
    #[error("not connected")]
    NotConnected,

    /// A container of one kind arrived where another was required
    #[error("unexpected {got:?} container while awaiting {wanted:?}")]
    UnexpectedContainer {
        /// Kind that arrived
        got: ContainerKind,
        /// Kind that was required
        wanted: ContainerKind,
    },

    /// Container or packet contents violated the framing rules
    #[error("malformed container: {message}")]
    MalformedContainer {
        /// What was wrong
        message: String,
    },

    /// Response echoed a transaction id other than the request's
    #[error("transaction id mismatch: sent {sent}, got {got}")]
    TransactionMismatch {
        /// Id the request carried
        sent: u32,
        /// Id the response carried
        got: u32,
    },

    /// PTP/IP peer rejected the connection handshake
    #[error("connection rejected by device (reason {reason:#010x})")]
    ConnectionRejected {
        /// Reason code from the INIT_FAIL packet
        reason: u32,
    },

    // ===== State Errors =====
    /// Operation not valid in the current session state
    #[error("invalid state: {message}")]
    InvalidState {
        /// Why the state does not admit the operation
        message: String,
    },
}

impl PtpError {
    /// Maps a device response code onto the error taxonomy.
    ///
    /// `ResponseCode::OK` has no error mapping; callers check for success
    /// before translating. The table is fixed: unlisted codes collapse to
    /// [`PtpError::GeneralFailure`] with the raw code preserved.
    #[must_use]
    pub fn from_response(op: OpCode, code: ResponseCode) -> Self {
        match code {
            ResponseCode::OPERATION_NOT_SUPPORTED => Self::NotSupported { op },
            ResponseCode::PARAMETER_NOT_SUPPORTED
            | ResponseCode::INVALID_PARAMETER
            | ResponseCode::INVALID_DEVICE_PROP_FORMAT
            | ResponseCode::INVALID_DEVICE_PROP_VALUE => Self::BadParameter { code },
            ResponseCode::DEVICE_BUSY => Self::DeviceBusy,
            ResponseCode::SESSION_NOT_OPEN => Self::SessionNotOpen,
            ResponseCode::SESSION_ALREADY_OPEN => Self::SessionAlreadyOpen,
            ResponseCode::INVALID_OBJECT_HANDLE => Self::InvalidObjectHandle,
            ResponseCode::ACCESS_DENIED => Self::AccessDenied,
            ResponseCode::STORE_FULL => Self::StoreFull,
            ResponseCode::OBJECT_WRITE_PROTECTED | ResponseCode::STORE_READ_ONLY => {
                Self::WriteProtected
            }
            ResponseCode::TRANSACTION_CANCELLED => Self::TransactionCancelled,
            other => Self::GeneralFailure { code: other },
        }
    }

    /// Reverse mapping, used when this host synthesizes a response during
    /// cancellation bookkeeping.
    #[must_use]
    pub fn to_response(&self) -> ResponseCode {
        match self {
            Self::NotSupported { .. } => ResponseCode::OPERATION_NOT_SUPPORTED,
            Self::BadParameter { code } | Self::GeneralFailure { code } => *code,
            Self::DeviceBusy => ResponseCode::DEVICE_BUSY,
            Self::SessionNotOpen => ResponseCode::SESSION_NOT_OPEN,
            Self::SessionAlreadyOpen => ResponseCode::SESSION_ALREADY_OPEN,
            Self::InvalidObjectHandle => ResponseCode::INVALID_OBJECT_HANDLE,
            Self::AccessDenied => ResponseCode::ACCESS_DENIED,
            Self::StoreFull | Self::StorageFull => ResponseCode::STORE_FULL,
            Self::WriteProtected | Self::StorageProtected => {
                ResponseCode::OBJECT_WRITE_PROTECTED
            }
            Self::Cancelled | Self::TransactionCancelled => ResponseCode::TRANSACTION_CANCELLED,
            _ => ResponseCode::GENERAL_ERROR,
        }
    }

    /// True for errors worth retrying after a backoff
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeviceBusy | Self::AccessDenied)
    }

    /// True for errors that leave the session unusable
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Disconnected | Self::NotConnected
        )
    }
}

/// Result type alias for PTP operations
pub type Result<T> = std::result::Result<T, PtpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PtpError::NotSupported {
            op: OpCode::GET_THUMB,
        };
        assert_eq!(err.to_string(), "operation not supported: GetThumb");
    }

    #[test]
    fn test_response_mapping_table() {
        let op = OpCode::GET_OBJECT;
        assert!(matches!(
            PtpError::from_response(op, ResponseCode::DEVICE_BUSY),
            PtpError::DeviceBusy
        ));
        assert!(matches!(
            PtpError::from_response(op, ResponseCode::ACCESS_DENIED),
            PtpError::AccessDenied
        ));
        assert!(matches!(
            PtpError::from_response(op, ResponseCode::INVALID_OBJECT_HANDLE),
            PtpError::InvalidObjectHandle
        ));
        assert!(matches!(
            PtpError::from_response(op, ResponseCode::SESSION_ALREADY_OPEN),
            PtpError::SessionAlreadyOpen
        ));
        // Unmapped codes preserve the raw value.
        match PtpError::from_response(op, ResponseCode(0xA123)) {
            PtpError::GeneralFailure { code } => assert_eq!(code, ResponseCode(0xA123)),
            other => panic!("expected GeneralFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_reverse_mapping() {
        assert_eq!(
            PtpError::DeviceBusy.to_response(),
            ResponseCode::DEVICE_BUSY
        );
        assert_eq!(
            PtpError::Cancelled.to_response(),
            ResponseCode::TRANSACTION_CANCELLED
        );
        assert_eq!(
            PtpError::Timeout {
                duration: Duration::from_secs(1)
            }
            .to_response(),
            ResponseCode::GENERAL_ERROR
        );
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(PtpError::DeviceBusy.is_retryable());
        assert!(PtpError::AccessDenied.is_retryable());
        assert!(!PtpError::NoFocus.is_retryable());
        assert!(!PtpError::Cancelled.is_retryable());
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(PtpError::Disconnected.is_fatal());
        assert!(PtpError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "x")).is_fatal());
        assert!(!PtpError::DeviceBusy.is_fatal());
        assert!(
            !PtpError::Timeout {
                duration: Duration::from_secs(1)
            }
            .is_fatal()
        );
    }
}
