//! Availability, rental state and quota rules

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::LedgerConfig;

/// Why a ledger operation was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerViolation {
    #[error("No available copies")]
    NoAvailableCopies,

    #[error("This book is already on hold")]
    HoldAlreadyExists,

    #[error("An active membership is required to reserve books")]
    NoActiveMembership,

    #[error("Monthly book limit reached ({used}/{quota})")]
    QuotaExhausted { used: i32, quota: i32 },

    #[error("You already have a book checked out or reserved")]
    OutstandingRental,

    #[error("No active rental found")]
    NoOutstandingRental,

    #[error("Cannot move a rental from {from} to {to}")]
    InvalidTransition { from: RentalState, to: RentalState },
}

/// Lifecycle of a single rental row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RentalState {
    /// Placed but not yet handed out
    Reserved,
    /// Physically checked out
    Active,
    Returned,
    /// Reservation withdrawn; the row no longer exists
    Cancelled,
}

impl RentalState {
    /// Derive the state from the stored flags
    pub fn from_flags(reserved: bool, is_active: bool, returned: bool) -> Self {
        if returned {
            RentalState::Returned
        } else if is_active {
            RentalState::Active
        } else if reserved {
            RentalState::Reserved
        } else {
            // outstanding rows always carry one of the flags; treat a bare row as handed out
            RentalState::Active
        }
    }

    pub fn is_outstanding(self) -> bool {
        matches!(self, RentalState::Reserved | RentalState::Active)
    }

    /// reserved → active → returned, reserved → returned, reserved → cancelled
    pub fn transition(self, to: RentalState) -> Result<RentalState, LedgerViolation> {
        use RentalState::*;
        match (self, to) {
            (Reserved, Active) | (Reserved, Returned) | (Active, Returned) | (Reserved, Cancelled) => {
                Ok(to)
            }
            (from, to) => Err(LedgerViolation::InvalidTransition { from, to }),
        }
    }
}

impl std::fmt::Display for RentalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RentalState::Reserved => "reserved",
            RentalState::Active => "active",
            RentalState::Returned => "returned",
            RentalState::Cancelled => "cancelled",
        };
        write!(f, "{}", label)
    }
}

/// Counts feeding the availability invariant for one book
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailabilityCounts {
    pub inventory: i32,
    pub reserved: i64,
    pub active: i64,
    pub holds: i64,
}

/// `max(inventory - (reserved + active + holds), 0)`
pub fn compute_available(counts: AvailabilityCounts) -> i32 {
    let taken = counts.reserved + counts.active + counts.holds;
    let available = i64::from(counts.inventory) - taken;
    available.clamp(0, i64::from(i32::MAX)) as i32
}

/// A rental is late while outstanding past its due date
pub fn is_late(now: DateTime<Utc>, due_date: DateTime<Utc>, return_date: Option<DateTime<Utc>>) -> bool {
    return_date.is_none() && now.date_naive() > due_date.date_naive()
}

/// Next billing date: a fixed step from the previous recurrence, or from the start date
pub fn next_recurrence(start_date: NaiveDate, recurrence: Option<NaiveDate>, step_days: i64) -> NaiveDate {
    recurrence.unwrap_or(start_date) + Duration::days(step_days)
}

/// Inputs for deciding whether a reservation may be placed
#[derive(Debug, Clone, Copy)]
pub struct ReservationCheck {
    pub available: i32,
    /// `monthly_books` of the active membership, `None` without one
    pub monthly_books: Option<i32>,
    pub has_outstanding: bool,
    /// Counted against the membership quota rather than paid
    pub free: bool,
}

/// Tunable ledger constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerPolicy {
    pub monthly_quota: i32,
    pub rental_days: i64,
    pub recurrence_days: i64,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self::from(&LedgerConfig::default())
    }
}

impl From<&LedgerConfig> for LedgerPolicy {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            monthly_quota: config.monthly_quota,
            rental_days: config.rental_days,
            recurrence_days: config.recurrence_days,
        }
    }
}

impl LedgerPolicy {
    pub fn due_date(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + Duration::days(self.rental_days)
    }

    /// Free books still available on a membership this period
    pub fn remaining_quota(&self, monthly_books: i32) -> i32 {
        (self.monthly_quota - monthly_books).max(0)
    }

    /// A hold needs a free copy and no other hold on the book
    pub fn check_hold(&self, available: i32, hold_exists: bool) -> Result<(), LedgerViolation> {
        if hold_exists {
            return Err(LedgerViolation::HoldAlreadyExists);
        }
        if available <= 0 {
            return Err(LedgerViolation::NoAvailableCopies);
        }
        Ok(())
    }

    pub fn check_reservation(&self, check: &ReservationCheck) -> Result<(), LedgerViolation> {
        if check.free {
            let used = check.monthly_books.ok_or(LedgerViolation::NoActiveMembership)?;
            if used >= self.monthly_quota {
                return Err(LedgerViolation::QuotaExhausted {
                    used,
                    quota: self.monthly_quota,
                });
            }
        }
        if check.has_outstanding {
            return Err(LedgerViolation::OutstandingRental);
        }
        if check.available <= 0 {
            return Err(LedgerViolation::NoAvailableCopies);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn counts(inventory: i32, reserved: i64, active: i64, holds: i64) -> AvailabilityCounts {
        AvailabilityCounts {
            inventory,
            reserved,
            active,
            holds,
        }
    }

    fn member_check(available: i32, monthly_books: i32) -> ReservationCheck {
        ReservationCheck {
            available,
            monthly_books: Some(monthly_books),
            has_outstanding: false,
            free: true,
        }
    }

    #[test]
    fn test_compute_available() {
        assert_eq!(compute_available(counts(3, 0, 0, 0)), 3);
        assert_eq!(compute_available(counts(3, 1, 1, 0)), 1);
        assert_eq!(compute_available(counts(3, 1, 1, 1)), 0);
        // over-committed inventory floors at zero
        assert_eq!(compute_available(counts(1, 2, 1, 1)), 0);
        assert_eq!(compute_available(counts(0, 0, 0, 0)), 0);
    }

    #[test]
    fn test_return_frees_exactly_one_copy() {
        let before = compute_available(counts(2, 0, 2, 0));
        let after = compute_available(counts(2, 0, 1, 0));
        assert_eq!(after - before, 1);
    }

    #[test]
    fn test_hold_rules() {
        let policy = LedgerPolicy::default();
        assert!(policy.check_hold(1, false).is_ok());
        assert_eq!(policy.check_hold(1, true), Err(LedgerViolation::HoldAlreadyExists));
        assert_eq!(policy.check_hold(0, false), Err(LedgerViolation::NoAvailableCopies));
    }

    #[test]
    fn test_reservation_quota() {
        let policy = LedgerPolicy::default();
        assert!(policy.check_reservation(&member_check(1, 3)).is_ok());
        assert_eq!(
            policy.check_reservation(&member_check(1, 4)),
            Err(LedgerViolation::QuotaExhausted { used: 4, quota: 4 })
        );
    }

    #[test]
    fn test_reservation_requires_membership_only_when_free() {
        let policy = LedgerPolicy::default();
        let mut check = ReservationCheck {
            available: 1,
            monthly_books: None,
            has_outstanding: false,
            free: true,
        };
        assert_eq!(
            policy.check_reservation(&check),
            Err(LedgerViolation::NoActiveMembership)
        );
        check.free = false;
        assert!(policy.check_reservation(&check).is_ok());
    }

    #[test]
    fn test_reservation_one_outstanding_and_availability() {
        let policy = LedgerPolicy::default();
        let mut check = member_check(1, 0);
        check.has_outstanding = true;
        assert_eq!(
            policy.check_reservation(&check),
            Err(LedgerViolation::OutstandingRental)
        );
        assert_eq!(
            policy.check_reservation(&member_check(0, 0)),
            Err(LedgerViolation::NoAvailableCopies)
        );
    }

    #[test]
    fn test_state_machine() {
        use RentalState::*;
        assert_eq!(Reserved.transition(Active), Ok(Active));
        assert_eq!(Active.transition(Returned), Ok(Returned));
        assert_eq!(Reserved.transition(Returned), Ok(Returned));
        assert_eq!(Reserved.transition(Cancelled), Ok(Cancelled));
        assert!(Active.transition(Cancelled).is_err());
        assert!(Returned.transition(Active).is_err());
        assert!(Active.transition(Reserved).is_err());
    }

    #[test]
    fn test_state_from_flags() {
        assert_eq!(RentalState::from_flags(true, false, false), RentalState::Reserved);
        assert_eq!(RentalState::from_flags(false, true, false), RentalState::Active);
        assert_eq!(RentalState::from_flags(false, false, true), RentalState::Returned);
        assert!(!RentalState::Returned.is_outstanding());
    }

    #[test]
    fn test_due_date_and_lateness() {
        let policy = LedgerPolicy::default();
        let rented = Utc.with_ymd_and_hms(2024, 11, 1, 10, 0, 0).unwrap();
        let due = policy.due_date(rented);
        assert_eq!(due, Utc.with_ymd_and_hms(2024, 11, 8, 10, 0, 0).unwrap());

        let same_day = Utc.with_ymd_and_hms(2024, 11, 8, 23, 0, 0).unwrap();
        assert!(!is_late(same_day, due, None));
        let next_day = Utc.with_ymd_and_hms(2024, 11, 9, 0, 30, 0).unwrap();
        assert!(is_late(next_day, due, None));
        assert!(!is_late(next_day, due, Some(same_day)));
    }

    #[test]
    fn test_next_recurrence() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let first = next_recurrence(start, None, 30);
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let second = next_recurrence(start, Some(first), 30);
        assert_eq!(second, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }
}
