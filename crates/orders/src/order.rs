//! The owning order entity, as far as this core is concerned.
//!
//! The full order lifecycle (fulfilment, payment, returns) lives with the
//! consuming services; the core only needs the row that owns an order
//! number, so number uniqueness has something real to conflict on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storekeep_core::{OrderId, OrgId, StoreId};

use crate::number::OrderNumber;

/// A minimal order row: identity, tenant dimensions, and its number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub organization_id: OrgId,
    pub store_id: StoreId,
    pub number: OrderNumber,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        organization_id: OrgId,
        store_id: StoreId,
        number: OrderNumber,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            organization_id,
            store_id,
            number,
            created_at: now,
        }
    }
}
