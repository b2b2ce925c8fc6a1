//! Calibration formulas for EMU-2 raw readings.
//!
//! The exact arithmetic matters: demand and summation multiply two integers
//! before a single float division; price shifts by a decimal digit count.

use chrono::{DateTime, Utc};

/// Seconds between the Unix epoch and the EMU device epoch
/// (2000-01-01T00:00:00Z).
pub const Y2K_EPOCH_OFFSET: i64 = 946_684_800;

/// Convert a raw device timestamp (seconds since the device epoch) to
/// absolute UTC time.
pub fn reading_timestamp(raw: u32) -> DateTime<Utc> {
    // Y2K + u32::MAX is still year 2136, comfortably inside chrono's range.
    DateTime::from_timestamp(Y2K_EPOCH_OFFSET + i64::from(raw), 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Demand / summation calibration: integer multiply, then float divide.
/// A zero divisor makes the reading unusable and returns `None`.
pub fn scaled_value(raw: u64, multiplier: u64, divisor: u64) -> Option<f64> {
    if divisor == 0 {
        return None;
    }
    let product = u128::from(raw) * u128::from(multiplier);
    Some(product as f64 / divisor as f64)
}

/// Price calibration: shift right by `trailing_digits` decimal digits.
pub fn price_value(raw_price: u64, trailing_digits: u32) -> f64 {
    raw_price as f64 / 10f64.powi(trailing_digits as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn device_epoch_zero_is_y2k() {
        let expected = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(reading_timestamp(0), expected);
    }

    #[test]
    fn one_year_of_seconds() {
        // 2000 is a leap year: 365 days of seconds lands on Dec 31, and it
        // takes 366 days to reach 2001.
        let expected = Utc.with_ymd_and_hms(2000, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(reading_timestamp(31_536_000), expected);

        let expected = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(reading_timestamp(31_622_400), expected);
    }

    #[test]
    fn timestamps_are_ordered() {
        assert!(reading_timestamp(10) > reading_timestamp(9));
    }

    #[test]
    fn scaled_value_divides_as_float() {
        assert_eq!(scaled_value(100, 1, 1000), Some(0.1));
        assert_eq!(scaled_value(1000, 1, 1000), Some(1.0));
        assert_eq!(scaled_value(3, 2, 4), Some(1.5));
    }

    #[test]
    fn scaled_value_zero_divisor() {
        assert_eq!(scaled_value(100, 1, 0), None);
    }

    #[test]
    fn scaled_value_large_product_does_not_overflow() {
        let value = scaled_value(u64::MAX, 16, 1).unwrap();
        assert!(value > u64::MAX as f64);
    }

    #[test]
    fn price_round_trip() {
        assert_eq!(price_value(12345, 2), 123.45);
        assert_eq!(price_value(9, 0), 9.0);
        assert_eq!(price_value(0, 5), 0.0);
    }
}
