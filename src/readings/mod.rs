//! Reading data model shared between the device driver and the reconciler.
//!
//! All raw fields arrive from the EMU-2 as hex-encoded integers; by the time
//! they reach this module they are plain integers. Calibration to physical
//! values happens in [`convert`].

pub mod convert;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// The three reading kinds the EMU-2 reports that this bridge republishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadingKind {
    Price,
    Demand,
    Summation,
}

impl ReadingKind {
    pub const ALL: [ReadingKind; 3] = [
        ReadingKind::Price,
        ReadingKind::Demand,
        ReadingKind::Summation,
    ];

    /// Topic suffix under the root topic. The cumulative summation publishes
    /// on `reading`, matching the established topic layout.
    pub fn topic_suffix(&self) -> &'static str {
        match self {
            ReadingKind::Price => "price",
            ReadingKind::Demand => "demand",
            ReadingKind::Summation => "reading",
        }
    }
}

impl fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingKind::Price => write!(f, "price"),
            ReadingKind::Demand => write!(f, "demand"),
            ReadingKind::Summation => write!(f, "summation"),
        }
    }
}

/// How a raw value is calibrated to a physical value.
///
/// Demand and summation carry a multiplier/divisor pair; price carries a
/// trailing-digits decimal shift. The formulas are intentionally kept
/// separate, see [`convert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Ratio { multiplier: u64, divisor: u64 },
    TrailingDigits(u32),
}

/// One decoded device reading. `timestamp` is the device clock: seconds
/// since 2000-01-01T00:00:00Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub kind: ReadingKind,
    pub raw_value: u64,
    pub scale: Scale,
    pub timestamp: u32,
}

impl Reading {
    /// Calibrated physical value. `None` when the divisor is zero, which is
    /// treated like any other malformed reading.
    pub fn value(&self) -> Option<f64> {
        match self.scale {
            Scale::Ratio {
                multiplier,
                divisor,
            } => convert::scaled_value(self.raw_value, multiplier, divisor),
            Scale::TrailingDigits(digits) => {
                Some(convert::price_value(self.raw_value, digits))
            }
        }
    }

    /// Device timestamp as absolute UTC time.
    pub fn absolute_timestamp(&self) -> DateTime<Utc> {
        convert::reading_timestamp(self.timestamp)
    }
}

/// A message on its way to the broker. The wire payload is the value only;
/// topic and timestamp are used for routing, dedup and logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub topic: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_suffixes() {
        assert_eq!(ReadingKind::Price.topic_suffix(), "price");
        assert_eq!(ReadingKind::Demand.topic_suffix(), "demand");
        assert_eq!(ReadingKind::Summation.topic_suffix(), "reading");
    }

    #[test]
    fn ratio_reading_value() {
        let reading = Reading {
            kind: ReadingKind::Demand,
            raw_value: 100,
            scale: Scale::Ratio {
                multiplier: 1,
                divisor: 1000,
            },
            timestamp: 0,
        };
        assert_eq!(reading.value(), Some(0.1));
    }

    #[test]
    fn price_reading_value() {
        let reading = Reading {
            kind: ReadingKind::Price,
            raw_value: 12345,
            scale: Scale::TrailingDigits(2),
            timestamp: 0,
        };
        assert_eq!(reading.value(), Some(123.45));
    }

    #[test]
    fn zero_divisor_yields_no_value() {
        let reading = Reading {
            kind: ReadingKind::Summation,
            raw_value: 42,
            scale: Scale::Ratio {
                multiplier: 1,
                divisor: 0,
            },
            timestamp: 0,
        };
        assert_eq!(reading.value(), None);
    }
}
