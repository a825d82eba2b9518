//! Append-only inventory movement ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storekeep_core::{
    DomainError, DomainResult, LocationId, MovementId, OrgId, ProductId, VariantId,
};

/// Why stock moved.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    StockIn,
    Sale,
    Adjustment,
    Transfer,
    Return,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::StockIn => "stock_in",
            MovementType::Sale => "sale",
            MovementType::Adjustment => "adjustment",
            MovementType::Transfer => "transfer",
            MovementType::Return => "return",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the entity that caused a movement (an order, a purchase
/// receipt, a manual adjustment…).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: String,
    pub id: Uuid,
}

impl SourceRef {
    pub fn new(kind: impl Into<String>, id: Uuid) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }
}

/// One immutable ledger entry.
///
/// Quantity is always positive; direction is carried by the location pair
/// (`to` only = inbound, `from` only = outbound, both = transfer). Once
/// written a movement is never updated — valuation and audit history are
/// reconstructed from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: MovementId,
    pub organization_id: OrgId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub from_location: Option<LocationId>,
    pub to_location: Option<LocationId>,
    pub quantity: i64,
    pub movement_type: MovementType,
    pub source_ref: Option<SourceRef>,
    /// Cost per unit in the smallest currency unit, when known (inbound
    /// movements from receiving normally carry one).
    pub unit_cost: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

impl InventoryMovement {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        organization_id: OrgId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        from_location: Option<LocationId>,
        to_location: Option<LocationId>,
        quantity: i64,
        movement_type: MovementType,
        source_ref: Option<SourceRef>,
        unit_cost: Option<i64>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation(
                "movement quantity must be positive",
            ));
        }
        if from_location.is_none() && to_location.is_none() {
            return Err(DomainError::validation(
                "movement must reference at least one location",
            ));
        }
        Ok(Self {
            id: MovementId::new(),
            organization_id,
            product_id,
            variant_id,
            from_location,
            to_location,
            quantity,
            movement_type,
            source_ref,
            unit_cost,
            occurred_at,
        })
    }

    /// Quantity and unit cost, when this movement brought costed stock in.
    /// Used by the weighted-average valuation.
    pub fn costed_inbound(&self) -> Option<(i64, i64)> {
        match (self.to_location, self.unit_cost) {
            (Some(_), Some(cost)) => Some((self.quantity, cost)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_quantity() {
        let err = InventoryMovement::new(
            OrgId::new(),
            ProductId::new(),
            None,
            None,
            Some(LocationId::new()),
            0,
            MovementType::StockIn,
            None,
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn rejects_movement_with_no_location() {
        let err = InventoryMovement::new(
            OrgId::new(),
            ProductId::new(),
            None,
            None,
            None,
            5,
            MovementType::Adjustment,
            None,
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn outbound_movements_carry_no_inbound_cost() {
        let movement = InventoryMovement::new(
            OrgId::new(),
            ProductId::new(),
            None,
            Some(LocationId::new()),
            None,
            3,
            MovementType::Sale,
            None,
            Some(250),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(movement.costed_inbound(), None);
    }

    #[test]
    fn inbound_movement_exposes_cost() {
        let movement = InventoryMovement::new(
            OrgId::new(),
            ProductId::new(),
            None,
            None,
            Some(LocationId::new()),
            4,
            MovementType::StockIn,
            Some(SourceRef::new("purchase_receipt", Uuid::now_v7())),
            Some(250),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(movement.costed_inbound(), Some((4, 250)));
    }
}
