//! Stock ledger application.
//!
//! [`apply_movement`] is the only path through which `quantity_on_hand`
//! changes: it appends one [`InventoryMovement`] row and updates (or lazily
//! creates) the [`StockLevel`] it touches, with on-hand clamped at a floor
//! of 0 and availability recomputed from the invariant. Everything here
//! runs inside the caller's transaction — the ledger holds no transaction
//! boundary of its own.

use chrono::{DateTime, Utc};

use storekeep_core::DomainError;
use storekeep_inventory::{InventoryMovement, MovementType, SourceRef, StockKey, StockLevel};

use crate::error::StoreResult;
use crate::stock_store::StockTx;

/// Record a movement of `delta` units at one location and apply it.
///
/// Positive deltas are inbound (`to` = the location), negative deltas are
/// outbound (`from` = the location); the ledger row always carries the
/// absolute quantity. With `enforce_availability`, an outbound delta larger
/// than the current availability fails with
/// [`DomainError::InsufficientStock`] before anything is written.
#[allow(clippy::too_many_arguments)]
pub async fn apply_movement<T: StockTx>(
    tx: &mut T,
    key: &StockKey,
    delta: i64,
    movement_type: MovementType,
    source_ref: Option<SourceRef>,
    unit_cost: Option<i64>,
    enforce_availability: bool,
    now: DateTime<Utc>,
) -> StoreResult<StockLevel> {
    if delta == 0 {
        return Err(DomainError::validation("stock movement delta cannot be zero").into());
    }

    let mut level = tx
        .level_for_update(key)
        .await?
        .unwrap_or_else(|| StockLevel::empty(*key, now));

    if delta < 0 && enforce_availability && level.quantity_available < -delta {
        return Err(DomainError::insufficient_stock(-delta, level.quantity_available).into());
    }

    let (from_location, to_location) = if delta > 0 {
        (None, Some(key.location_id))
    } else {
        (Some(key.location_id), None)
    };
    let movement = InventoryMovement::new(
        key.organization_id,
        key.product_id,
        key.variant_id,
        from_location,
        to_location,
        delta.abs(),
        movement_type,
        source_ref,
        unit_cost,
        now,
    )?;

    tx.append_movement(&movement).await?;
    level.apply_on_hand_delta(delta, now);
    tx.save_level(&level).await?;
    Ok(level)
}

/// Adjust a level without writing a ledger row.
///
/// Only for callers that have already written the movement themselves —
/// a transfer records one row covering both sides and then adjusts each
/// level through here.
pub(crate) async fn adjust_level<T: StockTx>(
    tx: &mut T,
    key: &StockKey,
    delta: i64,
    now: DateTime<Utc>,
) -> StoreResult<StockLevel> {
    let mut level = tx
        .level_for_update(key)
        .await?
        .unwrap_or_else(|| StockLevel::empty(*key, now));
    level.apply_on_hand_delta(delta, now);
    tx.save_level(&level).await?;
    Ok(level)
}
