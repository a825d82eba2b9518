//! Time-boxed stock reservations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storekeep_core::{
    DomainError, DomainResult, LocationId, OrderId, OrgId, ProductId, ReservationId, VariantId,
};

use crate::level::StockKey;

/// Lifecycle of a reservation. `Consumed` and `Expired` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Consumed,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Consumed => "consumed",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a reservation earmarks stock for (type + id of the owning entity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedFor {
    pub kind: String,
    pub id: Uuid,
}

impl ReservedFor {
    pub fn new(kind: impl Into<String>, id: Uuid) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }

    pub fn order(order_id: OrderId) -> Self {
        Self::new("order", *order_id.as_uuid())
    }
}

/// A provisional, time-boxed claim on stock.
///
/// Reservations reduce availability without moving physical inventory; no
/// movement row is written until the claim is fulfilled. A reservation
/// that is never released is reclaimed by the expiry sweep once
/// `expires_at` passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservation {
    pub id: ReservationId,
    pub organization_id: OrgId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub location_id: LocationId,
    pub quantity: i64,
    pub reserved_for: ReservedFor,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl StockReservation {
    pub fn new(
        key: StockKey,
        quantity: i64,
        reserved_for: ReservedFor,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation(
                "reservation quantity must be positive",
            ));
        }
        Ok(Self {
            id: ReservationId::new(),
            organization_id: key.organization_id,
            product_id: key.product_id,
            variant_id: key.variant_id,
            location_id: key.location_id,
            quantity,
            reserved_for,
            status: ReservationStatus::Active,
            expires_at,
            created_at: now,
        })
    }

    pub fn stock_key(&self) -> StockKey {
        StockKey {
            organization_id: self.organization_id,
            product_id: self.product_id,
            variant_id: self.variant_id,
            location_id: self.location_id,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Whether the expiry sweep should pick this reservation up at `now`.
    pub fn is_expired_by(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at < now
    }

    /// Transition to `Consumed`. Terminal states are never mutated again.
    pub fn consume(&mut self) -> DomainResult<()> {
        self.transition(ReservationStatus::Consumed)
    }

    /// Transition to `Expired`. Terminal states are never mutated again.
    pub fn expire(&mut self) -> DomainResult<()> {
        self.transition(ReservationStatus::Expired)
    }

    fn transition(&mut self, to: ReservationStatus) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::invariant(format!(
                "reservation {} is already {}",
                self.id, self.status
            )));
        }
        self.status = to;
        Ok(())
    }
}
