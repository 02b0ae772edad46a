//! # ptplink
//!
//! A pure Rust host-side implementation of the Picture Transfer
//! Protocol (PTP/MTP) for driving still cameras.
//!
//! ## Features
//!
//! - Wire codec for PTP containers, datasets, and property values
//! - USB transport with split/unsplit framing and quirk handling
//! - PTP/IP transport over dual TCP sockets
//! - Session management with typed operation wrappers
//! - Capture orchestration across vendor trigger families
//! - Liveview frame streaming
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use ptplink::{CaptureSequencer, IpTransport, PtpConfig, PtpSession};
//! use ptplink::transport::TransferContext;
//!
//! # async fn example() -> ptplink::Result<()> {
//! let config = PtpConfig::builder()
//!     .capture_timeout(Duration::from_secs(20))
//!     .build();
//!
//! let addr: std::net::SocketAddr = "192.168.1.50:15740".parse().unwrap();
//! let transport = IpTransport::connect(addr, &config).await?;
//! let mut session = PtpSession::new(transport, config);
//! session.open().await?;
//!
//! let mut sequencer = CaptureSequencer::for_session(&session)?;
//! let shot = sequencer
//!     .capture(&mut session, &mut TransferContext::new())
//!     .await?;
//! println!("captured {} bytes", shot.data.len());
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **High-level**: [`CaptureSequencer`] and [`Liveview`] - shooting workflows
//! - **Mid-level**: [`PtpSession`] - typed operations over any transport
//! - **Low-level**: [`codec`] and [`transport`] - direct wire access

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Protocol code registries
pub mod proto;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod capture;
pub mod codec;
pub mod session;
pub mod transport;

// Re-exports
pub use capture::{CaptureOutcome, CapturePhase, CaptureSequencer, CaptureStrategy, Liveview};
pub use codec::{DeviceInfo, ObjectInfo, PropertyValue, StorageInfo};
pub use error::{PtpError, Result};
pub use proto::{DevicePropCode, EventCode, ObjectHandle, OpCode, ResponseCode, StorageId};
pub use session::PtpSession;
#[cfg(feature = "usb")]
pub use transport::RusbPipe;
pub use transport::{IpTransport, UsbTransport};
pub use types::{PtpConfig, Quirk, QuirkSet};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{
        CaptureOutcome, CaptureSequencer, DeviceInfo, IpTransport, Liveview, ObjectHandle,
        ObjectInfo, OpCode, PtpConfig, PtpError, PtpSession, ResponseCode, StorageId,
        UsbTransport,
    };
}
