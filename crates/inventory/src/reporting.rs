//! Read-side inventory reporting: low-stock alerts and valuation.
//!
//! Pure aggregation over stock levels and the movement ledger. Valuation
//! uses the weighted average of costed inbound movements; items that never
//! received a costed movement are reported unvalued rather than priced by
//! a made-up constant.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use storekeep_core::{LocationId, ProductId, VariantId};

use crate::level::StockLevel;
use crate::movement::InventoryMovement;

/// A stock cell at or below its alert threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub location_id: LocationId,
    pub quantity_available: i64,
    pub threshold: i64,
}

/// Cells with availability at or below `threshold`, worst first.
pub fn low_stock_alerts(levels: &[StockLevel], threshold: i64) -> Vec<LowStockAlert> {
    let mut alerts: Vec<LowStockAlert> = levels
        .iter()
        .filter(|level| level.quantity_available <= threshold)
        .map(|level| LowStockAlert {
            product_id: level.product_id,
            variant_id: level.variant_id,
            location_id: level.location_id,
            quantity_available: level.quantity_available,
            threshold,
        })
        .collect();
    alerts.sort_by(|a, b| {
        a.quantity_available
            .cmp(&b.quantity_available)
            .then(a.product_id.cmp(&b.product_id))
            .then(a.location_id.cmp(&b.location_id))
    });
    alerts
}

/// Valuation of one item (product or product variant) across locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemValuation {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity_on_hand: i64,
    /// Weighted-average unit cost in the smallest currency unit. `None`
    /// when no costed inbound movement exists for the item.
    pub unit_cost: Option<i64>,
    /// `quantity_on_hand × unit_cost`. `None` while the item is unvalued.
    pub total_value: Option<i64>,
}

/// Totals over an [`ItemValuation`] set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationSummary {
    pub total_items: usize,
    pub valued_items: usize,
    pub unvalued_items: usize,
    pub total_value: i64,
    pub total_quantity: i64,
}

/// Per-item rows plus the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationReport {
    pub items: Vec<ItemValuation>,
    pub summary: ValuationSummary,
}

/// Weighted-average unit cost over costed inbound movements.
///
/// Returns `None` when no movement carries a cost.
pub fn weighted_average_cost<'a>(
    movements: impl IntoIterator<Item = &'a InventoryMovement>,
) -> Option<i64> {
    let mut total_quantity: i64 = 0;
    let mut total_cost: i128 = 0;
    for movement in movements {
        if let Some((quantity, unit_cost)) = movement.costed_inbound() {
            total_quantity += quantity;
            total_cost += quantity as i128 * unit_cost as i128;
        }
    }
    if total_quantity == 0 {
        return None;
    }
    Some((total_cost / total_quantity as i128) as i64)
}

/// Aggregate levels and ledger into a valuation report.
///
/// Items are keyed by (product, variant); on-hand quantities are summed
/// across locations.
pub fn valuation_report(
    levels: &[StockLevel],
    movements: &[InventoryMovement],
) -> ValuationReport {
    let mut on_hand: BTreeMap<(ProductId, Option<VariantId>), i64> = BTreeMap::new();
    for level in levels {
        *on_hand
            .entry((level.product_id, level.variant_id))
            .or_default() += level.quantity_on_hand;
    }

    let items: Vec<ItemValuation> = on_hand
        .into_iter()
        .map(|((product_id, variant_id), quantity)| {
            let unit_cost = weighted_average_cost(
                movements
                    .iter()
                    .filter(|m| m.product_id == product_id && m.variant_id == variant_id),
            );
            ItemValuation {
                product_id,
                variant_id,
                quantity_on_hand: quantity,
                unit_cost,
                total_value: unit_cost.map(|cost| quantity.max(0).saturating_mul(cost)),
            }
        })
        .collect();

    let valued_items = items.iter().filter(|i| i.unit_cost.is_some()).count();
    let summary = ValuationSummary {
        total_items: items.len(),
        valued_items,
        unvalued_items: items.len() - valued_items,
        total_value: items.iter().filter_map(|i| i.total_value).sum(),
        total_quantity: items.iter().map(|i| i.quantity_on_hand).sum(),
    };

    ValuationReport { items, summary }
}
