//! Per-location stock levels.
//!
//! A [`StockLevel`] tracks one (organization, product, variant, location)
//! cell. Its mutating methods are the only way the quantities change, and
//! each one re-establishes the availability invariant:
//! `quantity_available = quantity_on_hand − quantity_reserved`, with
//! `0 ≤ quantity_reserved ≤ quantity_on_hand`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storekeep_core::{DomainError, DomainResult, LocationId, OrgId, ProductId, VariantId};

/// Identity of one stock cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub organization_id: OrgId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub location_id: LocationId,
}

/// Quantities held at one location.
///
/// Created lazily on the first movement into a location; never deleted,
/// only zeroed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub organization_id: OrgId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub location_id: LocationId,
    pub quantity_on_hand: i64,
    pub quantity_reserved: i64,
    pub quantity_available: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockLevel {
    /// A fresh, empty level for a cell that has never seen stock.
    pub fn empty(key: StockKey, now: DateTime<Utc>) -> Self {
        Self {
            organization_id: key.organization_id,
            product_id: key.product_id,
            variant_id: key.variant_id,
            location_id: key.location_id,
            quantity_on_hand: 0,
            quantity_reserved: 0,
            quantity_available: 0,
            updated_at: now,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey {
            organization_id: self.organization_id,
            product_id: self.product_id,
            variant_id: self.variant_id,
            location_id: self.location_id,
        }
    }

    /// Earmark `quantity` units without moving stock.
    ///
    /// Fails with [`DomainError::InsufficientStock`] when fewer than
    /// `quantity` units are available, reporting both sides.
    pub fn reserve(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation(
                "reservation quantity must be positive",
            ));
        }
        if self.quantity_available < quantity {
            return Err(DomainError::insufficient_stock(
                quantity,
                self.quantity_available,
            ));
        }
        self.quantity_reserved += quantity;
        self.recompute(now);
        Ok(())
    }

    /// Give reserved units back to availability.
    ///
    /// Restores the lesser of `quantity` and the currently reserved amount,
    /// and returns how much was actually restored.
    pub fn release_reserved(&mut self, quantity: i64, now: DateTime<Utc>) -> i64 {
        let restored = quantity.clamp(0, self.quantity_reserved);
        self.quantity_reserved -= restored;
        self.recompute(now);
        restored
    }

    /// Apply a real stock movement to `quantity_on_hand`.
    ///
    /// On-hand is clamped at a floor of 0. If the new on-hand falls below
    /// the reserved amount, the reservation headroom is reduced to match so
    /// the invariant survives drifted data; availability is then recomputed.
    pub fn apply_on_hand_delta(&mut self, delta: i64, now: DateTime<Utc>) {
        self.quantity_on_hand = (self.quantity_on_hand + delta).max(0);
        if self.quantity_reserved > self.quantity_on_hand {
            self.quantity_reserved = self.quantity_on_hand;
        }
        self.recompute(now);
    }

    fn recompute(&mut self, now: DateTime<Utc>) {
        self.quantity_available = self.quantity_on_hand - self.quantity_reserved;
        self.updated_at = now;
        debug_assert!(self.invariant_holds());
    }

    /// The availability invariant; asserted after every mutation.
    pub fn invariant_holds(&self) -> bool {
        self.quantity_available == self.quantity_on_hand - self.quantity_reserved
            && self.quantity_reserved >= 0
            && self.quantity_reserved <= self.quantity_on_hand
            && self.quantity_available >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_key() -> StockKey {
        StockKey {
            organization_id: OrgId::new(),
            product_id: ProductId::new(),
            variant_id: None,
            location_id: LocationId::new(),
        }
    }

    fn level_with_on_hand(on_hand: i64) -> StockLevel {
        let mut level = StockLevel::empty(test_key(), Utc::now());
        level.apply_on_hand_delta(on_hand, Utc::now());
        level
    }

    #[test]
    fn reserve_moves_quantity_from_available() {
        let mut level = level_with_on_hand(10);
        level.reserve(4, Utc::now()).unwrap();

        assert_eq!(level.quantity_on_hand, 10);
        assert_eq!(level.quantity_reserved, 4);
        assert_eq!(level.quantity_available, 6);
    }

    #[test]
    fn reserve_beyond_availability_reports_both_sides() {
        let mut level = level_with_on_hand(10);
        level.reserve(7, Utc::now()).unwrap();

        let err = level.reserve(6, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                required: 6,
                available: 3
            }
        );
        // A failed reserve leaves the level untouched.
        assert_eq!(level.quantity_reserved, 7);
        assert_eq!(level.quantity_available, 3);
    }

    #[test]
    fn reserve_rejects_non_positive_quantity() {
        let mut level = level_with_on_hand(10);
        assert!(matches!(
            level.reserve(0, Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn release_restores_exactly_what_was_reserved() {
        let mut level = level_with_on_hand(10);
        level.reserve(4, Utc::now()).unwrap();
        let restored = level.release_reserved(4, Utc::now());

        assert_eq!(restored, 4);
        assert_eq!(level.quantity_available, 10);
        assert_eq!(level.quantity_reserved, 0);
    }

    #[test]
    fn release_is_bounded_by_reserved() {
        let mut level = level_with_on_hand(10);
        level.reserve(3, Utc::now()).unwrap();

        assert_eq!(level.release_reserved(5, Utc::now()), 3);
        assert_eq!(level.quantity_reserved, 0);
        assert_eq!(level.quantity_available, 10);
    }

    #[test]
    fn on_hand_is_clamped_at_zero() {
        let mut level = level_with_on_hand(3);
        level.apply_on_hand_delta(-10, Utc::now());

        assert_eq!(level.quantity_on_hand, 0);
        assert_eq!(level.quantity_available, 0);
    }

    #[test]
    fn shrinking_on_hand_below_reserved_keeps_invariant() {
        let mut level = level_with_on_hand(10);
        level.reserve(8, Utc::now()).unwrap();
        level.apply_on_hand_delta(-5, Utc::now());

        assert!(level.invariant_holds());
        assert_eq!(level.quantity_on_hand, 5);
        assert_eq!(level.quantity_reserved, 5);
        assert_eq!(level.quantity_available, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: no sequence of deltas, reserves and releases can break
        /// the availability invariant.
        #[test]
        fn invariant_survives_arbitrary_mutation_sequences(
            ops in prop::collection::vec((0u8..3, -50i64..50), 1..40)
        ) {
            let mut level = StockLevel::empty(test_key(), Utc::now());
            for (op, amount) in ops {
                match op {
                    0 => level.apply_on_hand_delta(amount, Utc::now()),
                    1 => { let _ = level.reserve(amount.abs().max(1), Utc::now()); }
                    _ => { let _ = level.release_reserved(amount.abs(), Utc::now()); }
                }
                prop_assert!(level.invariant_holds());
            }
        }

        /// Property: reserve followed by release restores availability
        /// exactly.
        #[test]
        fn reserve_release_round_trips(on_hand in 1i64..1000, qty in 1i64..1000) {
            let mut level = level_with_on_hand(on_hand);
            let before = level.quantity_available;
            if level.reserve(qty, Utc::now()).is_ok() {
                level.release_reserved(qty, Utc::now());
            }
            prop_assert_eq!(level.quantity_available, before);
        }
    }
}
