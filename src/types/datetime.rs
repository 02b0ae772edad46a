//! PTP timestamps.
//!
//! Object descriptors carry dates as ISO-8601 basic strings,
//! `YYYYMMDDThhmmss`, optionally followed by tenths of a second (`.5`)
//! and a zone suffix (`Z` or `±hhmm`). Firmware frequently emits empty
//! or malformed strings, so parsing is total: anything unusable maps to
//! `None` at the call site rather than failing the enclosing decode.

use std::fmt;

/// A wall-clock timestamp as carried in object descriptors.
///
/// No calendar arithmetic: this is a faithful carrier of what the device
/// said, including out-of-range values the device believes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PtpDateTime {
    /// Four digit year.
    pub year: u16,
    /// Month, 1-12.
    pub month: u8,
    /// Day of month, 1-31.
    pub day: u8,
    /// Hour, 0-23.
    pub hour: u8,
    /// Minute, 0-59.
    pub minute: u8,
    /// Second, 0-59.
    pub second: u8,
    /// Tenths of a second, when the device reports them.
    pub tenths: Option<u8>,
}

impl PtpDateTime {
    /// Parses the wire form. Returns `None` for empty or malformed input.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() < 15 || bytes[8] != b'T' {
            return None;
        }
        let digits = |range: std::ops::Range<usize>| -> Option<u16> {
            let mut value = 0u16;
            for &b in &bytes[range] {
                if !b.is_ascii_digit() {
                    return None;
                }
                value = value.checked_mul(10)?.checked_add(u16::from(b - b'0'))?;
            }
            Some(value)
        };

        let year = digits(0..4)?;
        let month = digits(4..6)? as u8;
        let day = digits(6..8)? as u8;
        let hour = digits(9..11)? as u8;
        let minute = digits(11..13)? as u8;
        let second = digits(13..15)? as u8;

        let tenths = if bytes.len() >= 17 && bytes[15] == b'.' && bytes[16].is_ascii_digit() {
            Some(bytes[16] - b'0')
        } else {
            None
        };

        if month == 0 || month > 12 || day == 0 || day > 31 {
            return None;
        }
        if hour > 23 || minute > 59 || second > 59 {
            return None;
        }

        Some(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            tenths,
        })
    }

    /// Formats back to the wire form.
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self.tenths {
            Some(t) => format!(
                "{:04}{:02}{:02}T{:02}{:02}{:02}.{}",
                self.year, self.month, self.day, self.hour, self.minute, self.second, t
            ),
            None => format!(
                "{:04}{:02}{:02}T{:02}{:02}{:02}",
                self.year, self.month, self.day, self.hour, self.minute, self.second
            ),
        }
    }
}

impl fmt::Display for PtpDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let dt = PtpDateTime::parse("20240311T142530").unwrap();
        assert_eq!(dt.year, 2024);
        assert_eq!(dt.month, 3);
        assert_eq!(dt.day, 11);
        assert_eq!(dt.hour, 14);
        assert_eq!(dt.minute, 25);
        assert_eq!(dt.second, 30);
        assert_eq!(dt.tenths, None);
    }

    #[test]
    fn test_parse_with_tenths() {
        let dt = PtpDateTime::parse("20240311T142530.5").unwrap();
        assert_eq!(dt.tenths, Some(5));
    }

    #[test]
    fn test_parse_tolerates_zone_suffix() {
        let dt = PtpDateTime::parse("20240311T142530Z").unwrap();
        assert_eq!(dt.hour, 14);
        let dt = PtpDateTime::parse("20240311T142530+0200").unwrap();
        assert_eq!(dt.minute, 25);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(PtpDateTime::parse(""), None);
        assert_eq!(PtpDateTime::parse("2024"), None);
        assert_eq!(PtpDateTime::parse("20240311 142530"), None);
        assert_eq!(PtpDateTime::parse("2024ab11T142530"), None);
        assert_eq!(PtpDateTime::parse("20241311T142530"), None);
        assert_eq!(PtpDateTime::parse("20240311T242530"), None);
    }

    #[test]
    fn test_wire_roundtrip() {
        for s in ["20240311T142530", "19991231T235959.9"] {
            let dt = PtpDateTime::parse(s).unwrap();
            assert_eq!(dt.to_wire(), s);
        }
    }

    #[test]
    fn test_display() {
        let dt = PtpDateTime::parse("20240311T142530").unwrap();
        assert_eq!(dt.to_string(), "2024-03-11 14:25:30");
    }
}
