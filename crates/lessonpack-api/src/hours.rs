//! Hour quantities
//!
//! Hours are counted in whole minutes so ledger arithmetic is exact. On the
//! wire they appear as decimal hours (`"total_hours": 1.5`), matching what the
//! dashboards already exchange.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A non-negative amount of tutoring time with minute precision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hours(u32);

impl Hours {
    pub const ZERO: Hours = Hours(0);

    pub const fn from_minutes(minutes: u32) -> Self {
        Self(minutes)
    }

    pub const fn whole(hours: u32) -> Self {
        Self(hours.saturating_mul(60))
    }

    /// Convert fractional hours, rounding to the nearest minute.
    ///
    /// Returns `None` for negative, non-finite or out-of-range input.
    pub fn from_hours_f64(hours: f64) -> Option<Self> {
        if !hours.is_finite() || hours < 0.0 {
            return None;
        }
        let minutes = (hours * 60.0).round();
        if minutes > u32::MAX as f64 {
            return None;
        }
        Some(Self(minutes as u32))
    }

    pub const fn as_minutes(self) -> u32 {
        self.0
    }

    pub fn as_hours_f64(self) -> f64 {
        self.0 as f64 / 60.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Hours) -> Option<Hours> {
        self.0.checked_add(rhs.0).map(Hours)
    }

    pub fn checked_sub(self, rhs: Hours) -> Option<Hours> {
        self.0.checked_sub(rhs.0).map(Hours)
    }

    pub fn saturating_add(self, rhs: Hours) -> Hours {
        Hours(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Hours) -> Hours {
        Hours(self.0.saturating_sub(rhs.0))
    }

    /// `percent`% of this amount, rounded down to the minute.
    pub fn scaled_percent(self, percent: u8) -> Hours {
        let scaled = (self.0 as u64 * percent.min(100) as u64) / 100;
        Hours(scaled as u32)
    }

    /// Share of `self` in `total` as a percentage with one decimal.
    pub fn percent_of(self, total: Hours) -> f64 {
        if total.is_zero() {
            return 0.0;
        }
        let per_mille = (self.0 as u64 * 1000) / total.0 as u64;
        per_mille as f64 / 10.0
    }
}

impl fmt::Display for Hours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 60;
        let minutes = self.0 % 60;
        if minutes == 0 {
            write!(f, "{}h", hours)
        } else if hours == 0 {
            write!(f, "{}m", minutes)
        } else {
            write!(f, "{}h {}m", hours, minutes)
        }
    }
}

impl Serialize for Hours {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_hours_f64())
    }
}

impl<'de> Deserialize<'de> for Hours {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hours = f64::deserialize(deserializer)?;
        Hours::from_hours_f64(hours).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid hour amount: {}", hours))
        })
    }
}

/// Hours a template grants per instance.
///
/// Some templates are sold "on request" without a fixed size; an admin must
/// then supply the total at assignment time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "hours", rename_all = "snake_case")]
pub enum HourAllotment {
    Specified(Hours),
    Unspecified,
}

impl HourAllotment {
    pub fn specified(&self) -> Option<Hours> {
        match self {
            HourAllotment::Specified(h) => Some(*h),
            HourAllotment::Unspecified => None,
        }
    }

    /// Resolve the total for a new instance: an override wins, otherwise the
    /// template's own figure.
    pub fn resolve(&self, override_hours: Option<Hours>) -> Option<Hours> {
        override_hours.or_else(|| self.specified())
    }
}

impl From<Option<Hours>> for HourAllotment {
    fn from(hours: Option<Hours>) -> Self {
        match hours {
            Some(h) => HourAllotment::Specified(h),
            None => HourAllotment::Unspecified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_hours_round_to_minutes() {
        assert_eq!(Hours::from_hours_f64(1.5), Some(Hours::from_minutes(90)));
        assert_eq!(Hours::from_hours_f64(0.25), Some(Hours::from_minutes(15)));
        assert_eq!(Hours::from_hours_f64(-1.0), None);
        assert_eq!(Hours::from_hours_f64(f64::NAN), None);
    }

    #[test]
    fn display_formats() {
        assert_eq!(Hours::whole(3).to_string(), "3h");
        assert_eq!(Hours::from_minutes(45).to_string(), "45m");
        assert_eq!(Hours::from_minutes(150).to_string(), "2h 30m");
    }

    #[test]
    fn serializes_as_decimal_hours() {
        let json = serde_json::to_string(&Hours::from_minutes(90)).unwrap();
        assert_eq!(json, "1.5");

        let parsed: Hours = serde_json::from_str("10").unwrap();
        assert_eq!(parsed, Hours::whole(10));

        assert!(serde_json::from_str::<Hours>("-2").is_err());
    }

    #[test]
    fn scaled_percent_rounds_down() {
        assert_eq!(Hours::whole(2).scaled_percent(50), Hours::whole(1));
        assert_eq!(Hours::from_minutes(45).scaled_percent(50), Hours::from_minutes(22));
        assert_eq!(Hours::whole(2).scaled_percent(0), Hours::ZERO);
        assert_eq!(Hours::whole(2).scaled_percent(150), Hours::whole(2));
    }

    #[test]
    fn percent_of_total() {
        assert_eq!(Hours::whole(6).percent_of(Hours::whole(10)), 60.0);
        assert_eq!(Hours::whole(1).percent_of(Hours::whole(3)), 33.3);
        assert_eq!(Hours::whole(1).percent_of(Hours::ZERO), 0.0);
    }

    #[test]
    fn allotment_resolution() {
        let fixed = HourAllotment::Specified(Hours::whole(10));
        assert_eq!(fixed.resolve(None), Some(Hours::whole(10)));
        assert_eq!(fixed.resolve(Some(Hours::whole(4))), Some(Hours::whole(4)));

        let open = HourAllotment::Unspecified;
        assert_eq!(open.resolve(None), None);
        assert_eq!(open.resolve(Some(Hours::whole(8))), Some(Hours::whole(8)));
    }
}
