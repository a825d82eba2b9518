//! Persistence seam for stock levels, reservations and the movement ledger.
//!
//! [`StockStore`] hands out transactions; [`StockTx`] is the set of
//! operations available inside one. The Postgres implementation backs a
//! transaction with `SELECT ... FOR UPDATE` row locks; the in-memory
//! implementation serializes transactions behind one async mutex and
//! restores a snapshot on rollback. Either way, a transaction that is
//! dropped without `commit` leaves no trace — the engine relies on that to
//! keep the stock invariant intact on every failure path.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryStockStore;
pub use postgres::{PostgresStockStore, run_migrations};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use storekeep_core::{OrgId, ProductId, ReservationId, VariantId};
use storekeep_inventory::{
    InventoryMovement, ReservationStatus, ReservedFor, StockKey, StockLevel, StockReservation,
};

use crate::error::StoreResult;

/// Transactional store for the inventory write model.
#[async_trait]
pub trait StockStore: Send + Sync {
    type Tx: StockTx;

    /// Open a transaction.
    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Read one level without locking it.
    async fn get_level(&self, key: &StockKey) -> StoreResult<Option<StockLevel>>;

    /// All levels of one item (product or variant) across locations.
    async fn levels_for_item(
        &self,
        organization_id: OrgId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> StoreResult<Vec<StockLevel>>;

    /// All levels of an organization.
    async fn levels_for_org(&self, organization_id: OrgId) -> StoreResult<Vec<StockLevel>>;

    /// The full movement ledger of an organization.
    async fn movements_for_org(
        &self,
        organization_id: OrgId,
    ) -> StoreResult<Vec<InventoryMovement>>;

    /// Active reservations whose deadline has passed. `scope` limits the
    /// scan to one organization; `None` scans all of them (maintenance).
    async fn expired_reservations(
        &self,
        scope: Option<OrgId>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<StockReservation>>;
}

/// Operations available inside one stock transaction.
///
/// Lock ordering: callers always lock the stock level before touching its
/// reservations, and when two levels are involved, the one with the lower
/// location id first.
#[async_trait]
pub trait StockTx: Send {
    /// Read a level and lock it for the rest of the transaction.
    async fn level_for_update(&mut self, key: &StockKey) -> StoreResult<Option<StockLevel>>;

    /// Insert or update a level row.
    async fn save_level(&mut self, level: &StockLevel) -> StoreResult<()>;

    async fn insert_reservation(&mut self, reservation: &StockReservation) -> StoreResult<()>;

    /// The active reservation matching (key, reserved_for), locked.
    async fn active_reservation_for_update(
        &mut self,
        key: &StockKey,
        reserved_for: &ReservedFor,
    ) -> StoreResult<Option<StockReservation>>;

    /// Status-guarded transition: applies only while the reservation is
    /// still active. Returns whether this call performed the transition,
    /// so concurrent sweeps and releases settle who handled the row.
    async fn transition_reservation(
        &mut self,
        id: ReservationId,
        to: ReservationStatus,
    ) -> StoreResult<bool>;

    /// Append one ledger row. The ledger is append-only; there is no
    /// update or delete counterpart.
    async fn append_movement(&mut self, movement: &InventoryMovement) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}
