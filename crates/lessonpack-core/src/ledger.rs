//! Hour ledger

use lessonpack_api::Hours;

use crate::{PackageError, PackageResult};

/// Outcome of consuming hours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumption {
    pub remaining: Hours,
    /// True when this consumption used up the last minute
    pub depleted: bool,
}

/// Allocated vs. consumed hours for one package instance
///
/// `used` never exceeds `total`. Once closed, the ledger rejects every
/// mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourLedger {
    total: Hours,
    used: Hours,
    closed: bool,
}

impl HourLedger {
    pub fn create(total: Hours) -> PackageResult<Self> {
        if total.is_zero() {
            return Err(PackageError::InvalidAmount(
                "total hours must be positive".into(),
            ));
        }
        Ok(Self {
            total,
            used: Hours::ZERO,
            closed: false,
        })
    }

    /// Rebuild a ledger from persisted values
    pub fn restore(total: Hours, used: Hours, closed: bool) -> PackageResult<Self> {
        let mut ledger = Self::create(total)?;
        if used > total {
            return Err(PackageError::InvalidAmount(format!(
                "used {} exceeds total {}",
                used, total
            )));
        }
        ledger.used = used;
        ledger.closed = closed;
        Ok(ledger)
    }

    pub fn consume(&mut self, hours: Hours) -> PackageResult<Consumption> {
        if self.closed {
            return Err(PackageError::LedgerClosed);
        }
        if hours.is_zero() {
            return Err(PackageError::InvalidAmount(
                "lesson hours must be positive".into(),
            ));
        }

        let remaining = self.remaining();
        if hours > remaining {
            return Err(PackageError::InsufficientHours {
                requested: hours,
                remaining,
            });
        }

        self.used = self.used.saturating_add(hours);
        let remaining = self.remaining();
        Ok(Consumption {
            remaining,
            depleted: remaining.is_zero(),
        })
    }

    /// Give back previously consumed hours
    pub fn refund(&mut self, hours: Hours) -> PackageResult<Hours> {
        if self.closed {
            return Err(PackageError::LedgerClosed);
        }
        if hours.is_zero() {
            return Err(PackageError::InvalidAmount(
                "refund hours must be positive".into(),
            ));
        }
        let Some(used) = self.used.checked_sub(hours) else {
            return Err(PackageError::InvalidAmount(format!(
                "cannot refund {} when only {} were used",
                hours, self.used
            )));
        };

        self.used = used;
        Ok(self.remaining())
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn total(&self) -> Hours {
        self.total
    }

    pub fn used(&self) -> Hours {
        self.used
    }

    pub fn remaining(&self) -> Hours {
        self.total.saturating_sub(self.used)
    }

    /// Share of the total already used, 0.0..=100.0 with one decimal
    pub fn percent_used(&self) -> f64 {
        self.used.percent_of(self.total)
    }

    pub fn is_depleted(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(hours: u32) -> Hours {
        Hours::whole(hours)
    }

    #[test]
    fn test_create_rejects_zero() {
        assert!(matches!(
            HourLedger::create(Hours::ZERO),
            Err(PackageError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_consume_until_depleted() {
        let mut ledger = HourLedger::create(h(10)).unwrap();

        let c = ledger.consume(h(6)).unwrap();
        assert_eq!(c.remaining, h(4));
        assert!(!c.depleted);
        assert_eq!(ledger.percent_used(), 60.0);

        let c = ledger.consume(h(4)).unwrap();
        assert_eq!(c.remaining, Hours::ZERO);
        assert!(c.depleted);
        assert!(ledger.is_depleted());
        assert_eq!(ledger.percent_used(), 100.0);
    }

    #[test]
    fn test_consume_more_than_remaining() {
        let mut ledger = HourLedger::create(h(2)).unwrap();
        let err = ledger.consume(h(3)).unwrap_err();
        assert_eq!(
            err,
            PackageError::InsufficientHours {
                requested: h(3),
                remaining: h(2)
            }
        );
        assert_eq!(ledger.used(), Hours::ZERO);
    }

    #[test]
    fn test_consume_zero_is_invalid() {
        let mut ledger = HourLedger::create(h(2)).unwrap();
        assert!(matches!(
            ledger.consume(Hours::ZERO),
            Err(PackageError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_consume_then_refund_restores_used() {
        let mut ledger = HourLedger::create(h(5)).unwrap();
        ledger.consume(Hours::from_minutes(90)).unwrap();
        let remaining = ledger.refund(Hours::from_minutes(90)).unwrap();
        assert_eq!(remaining, h(5));
        assert_eq!(ledger.used(), Hours::ZERO);
    }

    #[test]
    fn test_refund_more_than_used() {
        let mut ledger = HourLedger::create(h(10)).unwrap();
        ledger.consume(h(3)).unwrap();
        assert!(matches!(
            ledger.refund(h(5)),
            Err(PackageError::InvalidAmount(_))
        ));
        assert_eq!(ledger.used(), h(3));
    }

    #[test]
    fn test_closed_ledger_rejects_mutations() {
        let mut ledger = HourLedger::create(h(10)).unwrap();
        ledger.consume(h(1)).unwrap();
        ledger.close();

        assert_eq!(ledger.consume(h(1)), Err(PackageError::LedgerClosed));
        assert_eq!(ledger.refund(h(1)), Err(PackageError::LedgerClosed));
        assert_eq!(ledger.used(), h(1));
    }

    #[test]
    fn test_used_stays_within_total() {
        let mut ledger = HourLedger::create(h(4)).unwrap();
        let steps: [(bool, u32); 8] = [
            (true, 90),
            (true, 120),
            (false, 30),
            (true, 200),
            (true, 60),
            (false, 500),
            (true, 30),
            (false, 15),
        ];

        for (consume, minutes) in steps {
            let amount = Hours::from_minutes(minutes);
            let _ = if consume {
                ledger.consume(amount).map(|c| c.remaining)
            } else {
                ledger.refund(amount)
            };
            assert!(ledger.used() <= ledger.total());
            assert_eq!(ledger.remaining(), ledger.total().saturating_sub(ledger.used()));
        }
    }

    #[test]
    fn test_restore_validates() {
        assert!(HourLedger::restore(h(2), h(3), false).is_err());
        let ledger = HourLedger::restore(h(2), h(2), true).unwrap();
        assert!(ledger.is_closed());
        assert!(ledger.is_depleted());
    }
}
