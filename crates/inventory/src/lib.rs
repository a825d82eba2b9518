//! Inventory domain module.
//!
//! This crate contains the stock domain implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage): per-location stock levels
//! with their availability invariant, time-boxed reservations, the
//! append-only movement ledger entries, greedy allocation, and read-side
//! reporting.

pub mod allocation;
pub mod level;
pub mod movement;
pub mod reporting;
pub mod reservation;

pub use allocation::{AllocationLine, AllocationPlan, LocationStock, allocate};
pub use level::{StockKey, StockLevel};
pub use movement::{InventoryMovement, MovementType, SourceRef};
pub use reporting::{
    ItemValuation, LowStockAlert, ValuationReport, ValuationSummary, low_stock_alerts,
    valuation_report, weighted_average_cost,
};
pub use reservation::{ReservationStatus, ReservedFor, StockReservation};
