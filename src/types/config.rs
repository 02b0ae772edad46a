use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::Endian;
use crate::types::quirks::QuirkSet;

/// Where capture-class operations should place new objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureTarget {
    /// Removable media (card); objects persist and are announced by handle.
    #[default]
    Card,
    /// Device volatile memory; the object is staged at a vendor
    /// pseudo-handle and must be downloaded (and usually deleted) promptly.
    Sdram,
}

/// Configuration for a PTP session.
///
/// Everything tunable lives here; there is no process-wide state. The
/// struct is serde-friendly so an outer CLI/config layer can populate it
/// from key/value settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PtpConfig {
    /// Timeout for the initial probe commands at session open (default: 8s)
    pub probe_timeout: Duration,

    /// Timeout for ordinary commands (default: 20s)
    pub normal_timeout: Duration,

    /// Timeout for image-acquisition commands (default: 100s)
    pub capture_timeout: Duration,

    /// Fast event-poll timeout on the interrupt pipe (default: 150ms)
    pub event_check_timeout: Duration,

    /// How long cached object descriptors stay valid (default: 2s)
    pub object_cache_ttl: Duration,

    /// First sleep of a poll backoff sequence (default: 20ms)
    pub backoff_initial: Duration,

    /// Added to the sleep after each unsuccessful poll (default: 50ms)
    pub backoff_step: Duration,

    /// Per-iteration sleep cap (default: 200ms)
    pub backoff_cap: Duration,

    /// `OpenSession` attempts before escalating to a device reset (default: 3)
    pub open_retries: u32,

    /// Destination for captured objects (default: card)
    pub capture_target: CaptureTarget,

    /// Run autofocus as part of the capture sequence (default: true)
    pub autofocus: bool,

    /// Byte order the device speaks on USB (default: little endian)
    pub endian: Endian,

    /// Firmware quirk flags, from the external device table
    pub quirks: QuirkSet,

    /// GUID sent in the PTP/IP handshake (default: random per connect)
    pub guid: Option<Uuid>,

    /// Host name sent in the PTP/IP handshake (default: this machine's)
    pub host_name: Option<String>,
}

impl Default for PtpConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(8),
            normal_timeout: Duration::from_secs(20),
            capture_timeout: Duration::from_secs(100),
            event_check_timeout: Duration::from_millis(150),
            object_cache_ttl: Duration::from_secs(2),
            backoff_initial: Duration::from_millis(20),
            backoff_step: Duration::from_millis(50),
            backoff_cap: Duration::from_millis(200),
            open_retries: 3,
            capture_target: CaptureTarget::Card,
            autofocus: true,
            endian: Endian::Little,
            quirks: QuirkSet::empty(),
            guid: None,
            host_name: None,
        }
    }
}

impl PtpConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> PtpConfigBuilder {
        PtpConfigBuilder::default()
    }
}

/// Builder for [`PtpConfig`]
#[derive(Debug, Clone, Default)]
pub struct PtpConfigBuilder {
    config: PtpConfig,
}

impl PtpConfigBuilder {
    /// Set the probe timeout used at session open
    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    /// Set the timeout for ordinary commands
    #[must_use]
    pub fn normal_timeout(mut self, timeout: Duration) -> Self {
        self.config.normal_timeout = timeout;
        self
    }

    /// Set the timeout for capture-class commands
    #[must_use]
    pub fn capture_timeout(mut self, timeout: Duration) -> Self {
        self.config.capture_timeout = timeout;
        self
    }

    /// Set the fast event-poll timeout
    #[must_use]
    pub fn event_check_timeout(mut self, timeout: Duration) -> Self {
        self.config.event_check_timeout = timeout;
        self
    }

    /// Set how long cached object descriptors stay valid
    #[must_use]
    pub fn object_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.object_cache_ttl = ttl;
        self
    }

    /// Set the backoff shape: first sleep, per-poll step, cap
    #[must_use]
    pub fn backoff(mut self, initial: Duration, step: Duration, cap: Duration) -> Self {
        self.config.backoff_initial = initial;
        self.config.backoff_step = step;
        self.config.backoff_cap = cap;
        self
    }

    /// Set the number of `OpenSession` attempts before a device reset
    #[must_use]
    pub fn open_retries(mut self, retries: u32) -> Self {
        self.config.open_retries = retries;
        self
    }

    /// Set the capture destination
    #[must_use]
    pub fn capture_target(mut self, target: CaptureTarget) -> Self {
        self.config.capture_target = target;
        self
    }

    /// Enable or disable autofocus during capture
    #[must_use]
    pub fn autofocus(mut self, enable: bool) -> Self {
        self.config.autofocus = enable;
        self
    }

    /// Set the device byte order
    #[must_use]
    pub fn endian(mut self, endian: Endian) -> Self {
        self.config.endian = endian;
        self
    }

    /// Set the firmware quirk flags
    #[must_use]
    pub fn quirks(mut self, quirks: QuirkSet) -> Self {
        self.config.quirks = quirks;
        self
    }

    /// Set the PTP/IP handshake GUID
    #[must_use]
    pub fn guid(mut self, guid: Uuid) -> Self {
        self.config.guid = Some(guid);
        self
    }

    /// Set the PTP/IP handshake host name
    #[must_use]
    pub fn host_name(mut self, name: impl Into<String>) -> Self {
        self.config.host_name = Some(name.into());
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> PtpConfig {
        self.config
    }
}
