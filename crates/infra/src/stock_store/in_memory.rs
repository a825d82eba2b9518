//! In-memory stock store for tests and development.
//!
//! Transactions take the store's single async mutex for their whole
//! lifetime, which serializes writers — the row-lock-equivalent the
//! reservation engine needs, at test scale. A snapshot taken at `begin` is
//! restored when a transaction is dropped without commit, so failed
//! operations leave no partial writes behind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use storekeep_core::{OrgId, ProductId, ReservationId, VariantId};
use storekeep_inventory::{
    InventoryMovement, ReservationStatus, ReservedFor, StockKey, StockLevel, StockReservation,
};

use crate::error::StoreResult;

use super::{StockStore, StockTx};

#[derive(Debug, Default, Clone)]
struct StoreState {
    levels: HashMap<StockKey, StockLevel>,
    reservations: HashMap<ReservationId, StockReservation>,
    movements: Vec<InventoryMovement>,
}

/// In-memory [`StockStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    inner: Arc<Mutex<StoreState>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type Tx = InMemoryStockTx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let guard = self.inner.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(InMemoryStockTx {
            guard,
            snapshot: Some(snapshot),
        })
    }

    async fn get_level(&self, key: &StockKey) -> StoreResult<Option<StockLevel>> {
        let state = self.inner.lock().await;
        Ok(state.levels.get(key).cloned())
    }

    async fn levels_for_item(
        &self,
        organization_id: OrgId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> StoreResult<Vec<StockLevel>> {
        let state = self.inner.lock().await;
        Ok(state
            .levels
            .values()
            .filter(|level| {
                level.organization_id == organization_id
                    && level.product_id == product_id
                    && level.variant_id == variant_id
            })
            .cloned()
            .collect())
    }

    async fn levels_for_org(&self, organization_id: OrgId) -> StoreResult<Vec<StockLevel>> {
        let state = self.inner.lock().await;
        Ok(state
            .levels
            .values()
            .filter(|level| level.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn movements_for_org(
        &self,
        organization_id: OrgId,
    ) -> StoreResult<Vec<InventoryMovement>> {
        let state = self.inner.lock().await;
        Ok(state
            .movements
            .iter()
            .filter(|movement| movement.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn expired_reservations(
        &self,
        scope: Option<OrgId>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<StockReservation>> {
        let state = self.inner.lock().await;
        Ok(state
            .reservations
            .values()
            .filter(|resv| resv.is_expired_by(now))
            .filter(|resv| scope.is_none_or(|org| resv.organization_id == org))
            .cloned()
            .collect())
    }
}

/// One in-memory transaction. Holds the store lock until commit or drop.
pub struct InMemoryStockTx {
    guard: OwnedMutexGuard<StoreState>,
    /// Pre-transaction state; present until commit, restored on drop.
    snapshot: Option<StoreState>,
}

impl Drop for InMemoryStockTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl StockTx for InMemoryStockTx {
    async fn level_for_update(&mut self, key: &StockKey) -> StoreResult<Option<StockLevel>> {
        Ok(self.guard.levels.get(key).cloned())
    }

    async fn save_level(&mut self, level: &StockLevel) -> StoreResult<()> {
        self.guard.levels.insert(level.key(), level.clone());
        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &StockReservation) -> StoreResult<()> {
        self.guard
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn active_reservation_for_update(
        &mut self,
        key: &StockKey,
        reserved_for: &ReservedFor,
    ) -> StoreResult<Option<StockReservation>> {
        Ok(self
            .guard
            .reservations
            .values()
            .filter(|resv| resv.is_active())
            .find(|resv| resv.stock_key() == *key && resv.reserved_for == *reserved_for)
            .cloned())
    }

    async fn transition_reservation(
        &mut self,
        id: ReservationId,
        to: ReservationStatus,
    ) -> StoreResult<bool> {
        let Some(reservation) = self.guard.reservations.get_mut(&id) else {
            return Ok(false);
        };
        if !reservation.is_active() {
            return Ok(false);
        }
        reservation.status = to;
        Ok(true)
    }

    async fn append_movement(&mut self, movement: &InventoryMovement) -> StoreResult<()> {
        self.guard.movements.push(movement.clone());
        Ok(())
    }

    async fn commit(mut self) -> StoreResult<()> {
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        // Drop restores the snapshot.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storekeep_core::LocationId;

    fn test_key() -> StockKey {
        StockKey {
            organization_id: OrgId::new(),
            product_id: ProductId::new(),
            variant_id: None,
            location_id: LocationId::new(),
        }
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = InMemoryStockStore::new();
        let key = test_key();
        let mut level = StockLevel::empty(key, Utc::now());
        level.apply_on_hand_delta(5, Utc::now());

        let mut tx = store.begin().await.unwrap();
        tx.save_level(&level).await.unwrap();
        tx.commit().await.unwrap();

        let read = store.get_level(&key).await.unwrap().unwrap();
        assert_eq!(read.quantity_on_hand, 5);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryStockStore::new();
        let key = test_key();

        {
            let mut tx = store.begin().await.unwrap();
            tx.save_level(&StockLevel::empty(key, Utc::now())).await.unwrap();
            // No commit.
        }

        assert!(store.get_level(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn explicit_rollback_discards_writes() {
        let store = InMemoryStockStore::new();
        let key = test_key();

        let mut tx = store.begin().await.unwrap();
        tx.save_level(&StockLevel::empty(key, Utc::now())).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.get_level(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn guarded_transition_fires_once() {
        let store = InMemoryStockStore::new();
        let key = test_key();
        let now = Utc::now();
        let reservation = StockReservation::new(
            key,
            3,
            ReservedFor::new("order", uuid::Uuid::now_v7()),
            now + chrono::Duration::days(7),
            now,
        )
        .unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_reservation(&reservation).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(
            tx.transition_reservation(reservation.id, ReservationStatus::Expired)
                .await
                .unwrap()
        );
        assert!(
            !tx.transition_reservation(reservation.id, ReservationStatus::Consumed)
                .await
                .unwrap()
        );
        tx.commit().await.unwrap();
    }
}
