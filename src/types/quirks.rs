//! Firmware quirk flags.
//!
//! Real devices deviate from the PTP specification in recurring,
//! well-catalogued ways. The external device-identification table maps
//! USB vendor/product ids to a set of these flags; the engine only
//! consumes the set. Membership tests are compile-time checked, unlike
//! the OR'd integer this replaces in older stacks.

use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};

/// One catalogued firmware deviation.
#[derive(EnumSetType, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quirk {
    /// Device stalls on zero-length reads; never issue flush reads.
    NoZeroReads,
    /// Device needs a zero-length packet after bulk writes that are an
    /// exact multiple of the endpoint packet size.
    ZlpAfterWrite,
    /// Tolerate garbage in bulk container headers where recovery is
    /// possible (length field smaller than the header, bogus kind).
    IgnoreHeaderErrors,
    /// Device only accepts 7-bit ASCII filenames.
    Only7BitFilenames,
    /// Device echoes wrong transaction ids in responses; skip the check.
    BrokenTransactionId,
    /// No usable interrupt endpoint; events come from a vendor poll
    /// operation instead.
    NoEventInterrupt,
    /// Event reads need twice the fast-check timeout to turn around.
    SlowEventTurnaround,
    /// Images staged in SDRAM must be deleted after download or the
    /// staging buffer fills up.
    DeleteSdramAfterDownload,
    /// Fail the session-open probe fast (1.5s) instead of the configured
    /// probe timeout; the firmware never recovers from a silent start.
    ShortProbe,
    /// Keep the USB interface claimed on close; releasing it crashes
    /// the firmware.
    NoReleaseInterface,
}

/// A set of [`Quirk`] flags.
pub type QuirkSet = EnumSet<Quirk>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_membership() {
        let quirks: QuirkSet = Quirk::NoZeroReads | Quirk::ZlpAfterWrite;
        assert!(quirks.contains(Quirk::NoZeroReads));
        assert!(quirks.contains(Quirk::ZlpAfterWrite));
        assert!(!quirks.contains(Quirk::Only7BitFilenames));
    }

    #[test]
    fn test_empty_set() {
        let quirks = QuirkSet::empty();
        assert!(quirks.is_empty());
        assert!(!quirks.contains(Quirk::BrokenTransactionId));
    }

    #[test]
    fn test_single_flag_conversion() {
        let quirks: QuirkSet = Quirk::ShortProbe.into();
        assert_eq!(quirks.len(), 1);
        assert!(quirks.contains(Quirk::ShortProbe));
    }
}
