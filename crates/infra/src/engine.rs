//! Transactional reservation engine.
//!
//! The sole writer-of-record for stock levels and reservations. Every
//! mutating operation resolves its organization scope from the ambient
//! [`TenantScope`] (via the interceptor's typed-access path) and runs as
//! one store transaction with the affected stock row locked, so two
//! concurrent reservations against the same (product, variant, location)
//! cell can never both pass the availability check.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};

use storekeep_core::{DomainError, LocationId, OrgId, ProductId, VariantId};
use storekeep_inventory::{
    AllocationPlan, InventoryMovement, LowStockAlert, MovementType, ReservationStatus,
    ReservedFor, SourceRef, StockKey, StockLevel, StockReservation, ValuationReport, allocate,
    low_stock_alerts, valuation_report,
};
use storekeep_tenancy::{DataAccessInterceptor, EntityKind, TenantScope};

use crate::error::StoreResult;
use crate::ledger;
use crate::stock_store::{StockStore, StockTx};

/// Tunable policy for the engine.
///
/// Reservation lifetime defaults to 7 days; deployments that treat the
/// expiry window as a business rule can tune it here rather than in code.
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    pub reservation_ttl: Duration,
    pub low_stock_threshold: i64,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::days(7),
            low_stock_threshold: 10,
        }
    }
}

impl EnginePolicy {
    pub fn with_reservation_ttl(mut self, ttl: Duration) -> Self {
        self.reservation_ttl = ttl;
        self
    }

    pub fn with_low_stock_threshold(mut self, threshold: i64) -> Self {
        self.low_stock_threshold = threshold;
        self
    }
}

/// An authoritative stock mutation: a real movement, not an earmark.
#[derive(Debug, Clone)]
pub struct StockUpdate {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub location_id: LocationId,
    /// Signed change to on-hand: positive receives, negative issues.
    pub delta: i64,
    pub movement_type: MovementType,
    pub source_ref: Option<SourceRef>,
    pub unit_cost: Option<i64>,
    /// Validate availability before an outbound change (default). Opt out
    /// for corrections that deliberately cut into reserved stock.
    pub enforce_availability: bool,
}

impl StockUpdate {
    pub fn new(
        product_id: ProductId,
        location_id: LocationId,
        delta: i64,
        movement_type: MovementType,
    ) -> Self {
        Self {
            product_id,
            variant_id: None,
            location_id,
            delta,
            movement_type,
            source_ref: None,
            unit_cost: None,
            enforce_availability: true,
        }
    }

    pub fn with_variant(mut self, variant_id: VariantId) -> Self {
        self.variant_id = Some(variant_id);
        self
    }

    pub fn with_source(mut self, source_ref: SourceRef) -> Self {
        self.source_ref = Some(source_ref);
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: i64) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn allow_shortfall(mut self) -> Self {
        self.enforce_availability = false;
        self
    }
}

/// What a release call found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The active reservation was consumed and `restored` units returned
    /// to availability.
    Released {
        reservation: StockReservation,
        restored: i64,
    },
    /// No matching active reservation. Idempotent by design: higher-level
    /// retries may release at-least-once, so this is a no-op, not an error.
    NoActiveReservation,
}

/// Consolidated availability of an item across locations, with the
/// suggested greedy allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedAvailability {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub required: i64,
    pub total_available: i64,
    pub allocation: AllocationPlan,
}

/// The inventory consistency engine.
pub struct ReservationEngine<S> {
    store: S,
    policy: EnginePolicy,
}

impl<S: StockStore> ReservationEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_policy(store, EnginePolicy::default())
    }

    pub fn with_policy(store: S, policy: EnginePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    fn require_org(&self) -> StoreResult<OrgId> {
        Ok(DataAccessInterceptor::require_organization(
            EntityKind::StockLevel,
        )?)
    }

    fn key(
        &self,
        organization_id: OrgId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        location_id: LocationId,
    ) -> StockKey {
        StockKey {
            organization_id,
            product_id,
            variant_id,
            location_id,
        }
    }

    /// Current level of one stock cell, if it has ever seen stock.
    pub async fn get_level(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        location_id: LocationId,
    ) -> StoreResult<Option<StockLevel>> {
        let organization_id = self.require_org()?;
        self.store
            .get_level(&self.key(organization_id, product_id, variant_id, location_id))
            .await
    }

    /// Earmark stock for a claimant.
    ///
    /// One transaction: read-and-lock the level, check availability, bump
    /// the reserved quantity, insert the active reservation with
    /// `expires_at = now + policy.reservation_ttl`. No movement row is
    /// written — a reservation earmarks stock, it does not move it.
    #[instrument(skip(self, reserved_for), fields(product = %product_id, location = %location_id), err)]
    pub async fn reserve_stock(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        location_id: LocationId,
        quantity: i64,
        reserved_for: ReservedFor,
    ) -> StoreResult<StockReservation> {
        let organization_id = self.require_org()?;
        let now = Utc::now();
        let key = self.key(organization_id, product_id, variant_id, location_id);

        let mut tx = self.store.begin().await?;
        let mut level = tx.level_for_update(&key).await?.ok_or_else(|| {
            DomainError::not_found(format!(
                "stock level for product {product_id} at location {location_id}"
            ))
        })?;
        level.reserve(quantity, now)?;
        let reservation = StockReservation::new(
            key,
            quantity,
            reserved_for,
            now + self.policy.reservation_ttl,
            now,
        )?;
        tx.save_level(&level).await?;
        tx.insert_reservation(&reservation).await?;
        tx.commit().await?;

        debug!(reservation = %reservation.id, quantity, "stock reserved");
        Ok(reservation)
    }

    /// Release the active reservation held by a claimant.
    ///
    /// Marks it consumed and restores the lesser of the reservation's
    /// quantity and the currently reserved amount. Releasing a claim that
    /// has no active reservation is a no-op.
    #[instrument(skip(self, reserved_for), fields(product = %product_id, location = %location_id), err)]
    pub async fn release_reservation(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        location_id: LocationId,
        reserved_for: &ReservedFor,
    ) -> StoreResult<ReleaseOutcome> {
        let organization_id = self.require_org()?;
        let now = Utc::now();
        let key = self.key(organization_id, product_id, variant_id, location_id);

        let mut tx = self.store.begin().await?;
        let Some(mut level) = tx.level_for_update(&key).await? else {
            tx.rollback().await?;
            return Ok(ReleaseOutcome::NoActiveReservation);
        };
        let Some(mut reservation) = tx.active_reservation_for_update(&key, reserved_for).await?
        else {
            tx.rollback().await?;
            return Ok(ReleaseOutcome::NoActiveReservation);
        };

        if !tx
            .transition_reservation(reservation.id, ReservationStatus::Consumed)
            .await?
        {
            tx.rollback().await?;
            return Ok(ReleaseOutcome::NoActiveReservation);
        }
        reservation.consume()?;
        let restored = level.release_reserved(reservation.quantity, now);
        tx.save_level(&level).await?;
        tx.commit().await?;

        debug!(reservation = %reservation.id, restored, "reservation released");
        Ok(ReleaseOutcome::Released {
            reservation,
            restored,
        })
    }

    /// Apply an authoritative stock mutation (a shipment, a receipt, a
    /// correction): writes the ledger row and adjusts on-hand.
    #[instrument(skip(self, update), fields(product = %update.product_id, location = %update.location_id, delta = update.delta), err)]
    pub async fn update_stock(&self, update: StockUpdate) -> StoreResult<StockLevel> {
        let organization_id = self.require_org()?;
        let now = Utc::now();
        let key = self.key(
            organization_id,
            update.product_id,
            update.variant_id,
            update.location_id,
        );

        let mut tx = self.store.begin().await?;
        let level = ledger::apply_movement(
            &mut tx,
            &key,
            update.delta,
            update.movement_type,
            update.source_ref,
            update.unit_cost,
            update.enforce_availability,
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(level)
    }

    /// Move stock between two locations atomically.
    ///
    /// One ledger row covers both sides; both levels are locked (lower
    /// location id first, so opposing transfers cannot deadlock) and the
    /// source must have the quantity available.
    #[instrument(skip(self), fields(product = %product_id), err)]
    pub async fn transfer_stock(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        from_location: LocationId,
        to_location: LocationId,
        quantity: i64,
        source_ref: Option<SourceRef>,
    ) -> StoreResult<(StockLevel, StockLevel)> {
        let organization_id = self.require_org()?;
        if quantity <= 0 {
            return Err(DomainError::validation("transfer quantity must be positive").into());
        }
        if from_location == to_location {
            return Err(
                DomainError::validation("transfer requires two distinct locations").into(),
            );
        }
        let now = Utc::now();
        let from_key = self.key(organization_id, product_id, variant_id, from_location);
        let to_key = self.key(organization_id, product_id, variant_id, to_location);

        let mut tx = self.store.begin().await?;
        let (first, second) = if from_location < to_location {
            (&from_key, &to_key)
        } else {
            (&to_key, &from_key)
        };
        let first_level = tx.level_for_update(first).await?;
        let second_level = tx.level_for_update(second).await?;
        let source = if from_location < to_location {
            first_level
        } else {
            second_level
        };

        let Some(source) = source else {
            return Err(DomainError::not_found(format!(
                "stock level for product {product_id} at location {from_location}"
            ))
            .into());
        };
        if source.quantity_available < quantity {
            return Err(
                DomainError::insufficient_stock(quantity, source.quantity_available).into(),
            );
        }

        let movement = InventoryMovement::new(
            organization_id,
            product_id,
            variant_id,
            Some(from_location),
            Some(to_location),
            quantity,
            MovementType::Transfer,
            source_ref,
            None,
            now,
        )?;
        tx.append_movement(&movement).await?;
        let from_level = ledger::adjust_level(&mut tx, &from_key, -quantity, now).await?;
        let to_level = ledger::adjust_level(&mut tx, &to_key, quantity, now).await?;
        tx.commit().await?;

        Ok((from_level, to_level))
    }

    /// Reclaim active reservations whose deadline has passed.
    ///
    /// With an ambient context the sweep covers that organization; without
    /// one it covers all of them (the maintenance-job path). Each
    /// reservation is handled in its own transaction and guarded by its
    /// status transition, so the sweep is safe to run concurrently with
    /// new reservations and with itself. Returns how many were expired.
    #[instrument(skip(self), err)]
    pub async fn expire_reservations(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let scope = TenantScope::current().map(|ctx| ctx.organization_id());
        let expired = self.store.expired_reservations(scope, now).await?;

        let mut count = 0u64;
        for reservation in expired {
            let key = reservation.stock_key();
            let mut tx = self.store.begin().await?;
            let Some(mut level) = tx.level_for_update(&key).await? else {
                tx.rollback().await?;
                continue;
            };
            if !tx
                .transition_reservation(reservation.id, ReservationStatus::Expired)
                .await?
            {
                // Another sweep or a release got here first.
                tx.rollback().await?;
                continue;
            }
            level.release_reserved(reservation.quantity, now);
            tx.save_level(&level).await?;
            tx.commit().await?;
            count += 1;
            debug!(reservation = %reservation.id, "reservation expired");
        }

        if count > 0 {
            info!(count, "expired reservations reclaimed");
        }
        Ok(count)
    }

    /// Check whether `required` units are fulfillable across all locations
    /// and suggest an allocation.
    ///
    /// Fails with [`DomainError::InsufficientStock`] (carrying the
    /// consolidated total) when they are not.
    #[instrument(skip(self), fields(product = %product_id, required), err)]
    pub async fn validate_consolidated_availability(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        required: i64,
    ) -> StoreResult<ConsolidatedAvailability> {
        let organization_id = self.require_org()?;
        if required <= 0 {
            return Err(DomainError::validation("required quantity must be positive").into());
        }

        let levels = self
            .store
            .levels_for_item(organization_id, product_id, variant_id)
            .await?;
        let candidates: Vec<_> = levels
            .iter()
            .map(|level| storekeep_inventory::LocationStock {
                location_id: level.location_id,
                available: level.quantity_available,
            })
            .collect();
        let total_available: i64 = candidates.iter().map(|c| c.available.max(0)).sum();

        if total_available < required {
            return Err(DomainError::insufficient_stock(required, total_available).into());
        }

        Ok(ConsolidatedAvailability {
            product_id,
            variant_id,
            required,
            total_available,
            allocation: allocate(&candidates, required),
        })
    }

    /// Stock cells at or below the alert threshold, worst first.
    pub async fn get_low_stock_alerts(
        &self,
        threshold: Option<i64>,
    ) -> StoreResult<Vec<LowStockAlert>> {
        let organization_id = self.require_org()?;
        let levels = self.store.levels_for_org(organization_id).await?;
        Ok(low_stock_alerts(
            &levels,
            threshold.unwrap_or(self.policy.low_stock_threshold),
        ))
    }

    /// Valuation of the organization's stock, costed from the movement
    /// ledger (weighted average over costed inbound movements).
    pub async fn get_inventory_valuation(&self) -> StoreResult<ValuationReport> {
        let organization_id = self.require_org()?;
        let levels = self.store.levels_for_org(organization_id).await?;
        let movements = self.store.movements_for_org(organization_id).await?;
        Ok(valuation_report(&levels, &movements))
    }
}
