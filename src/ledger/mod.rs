//! Rental ledger rules
//!
//! Pure bookkeeping for book availability, the rental state machine and
//! membership quotas. The repository layer runs these checks inside a
//! transaction holding row locks on the rows involved.

pub mod pricing;
pub mod rules;

pub use pricing::{quote_rentals, PricedBook, Quote, QuoteLine};
pub use rules::{
    compute_available, is_late, next_recurrence, AvailabilityCounts, LedgerPolicy,
    LedgerViolation, RentalState,
};
