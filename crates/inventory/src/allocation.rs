//! Greedy multi-location allocation.
//!
//! Pure function over an arena of (location, availability) pairs — no
//! hidden state, no I/O. The policy assigns from the largest-stock
//! location first, so orders are fulfilled from as few locations as
//! possible rather than depleting locations evenly.

use serde::{Deserialize, Serialize};

use storekeep_core::LocationId;

/// Availability of one candidate location.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationStock {
    pub location_id: LocationId,
    pub available: i64,
}

/// Quantity assigned to one location.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub location_id: LocationId,
    pub quantity: i64,
}

/// Result of an allocation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub lines: Vec<AllocationLine>,
    pub allocated: i64,
    pub shortfall: i64,
}

impl AllocationPlan {
    pub fn is_complete(&self) -> bool {
        self.shortfall == 0
    }
}

/// Assign `required` units across `levels`, largest availability first.
///
/// Candidates with equal availability are taken in ascending location-id
/// order, so the plan is deterministic for a given input set. Locations
/// with nothing available are skipped. A non-positive `required` yields an
/// empty, complete plan.
pub fn allocate(levels: &[LocationStock], required: i64) -> AllocationPlan {
    if required <= 0 {
        return AllocationPlan {
            lines: Vec::new(),
            allocated: 0,
            shortfall: 0,
        };
    }

    let mut candidates: Vec<LocationStock> =
        levels.iter().copied().filter(|l| l.available > 0).collect();
    candidates.sort_by(|a, b| {
        b.available
            .cmp(&a.available)
            .then(a.location_id.cmp(&b.location_id))
    });

    let mut lines = Vec::new();
    let mut remaining = required;
    for candidate in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(candidate.available);
        lines.push(AllocationLine {
            location_id: candidate.location_id,
            quantity: take,
        });
        remaining -= take;
    }

    AllocationPlan {
        lines,
        allocated: required - remaining,
        shortfall: remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn location(n: u128) -> LocationId {
        LocationId::from_uuid(Uuid::from_u128(n))
    }

    fn stock(n: u128, available: i64) -> LocationStock {
        LocationStock {
            location_id: location(n),
            available,
        }
    }

    #[test]
    fn prefers_largest_availability_first() {
        let plan = allocate(&[stock(1, 3), stock(2, 10), stock(3, 5)], 12);

        assert!(plan.is_complete());
        assert_eq!(
            plan.lines,
            vec![
                AllocationLine {
                    location_id: location(2),
                    quantity: 10
                },
                AllocationLine {
                    location_id: location(3),
                    quantity: 2
                },
            ]
        );
    }

    #[test]
    fn ties_break_by_location_id() {
        let plan = allocate(&[stock(9, 5), stock(2, 5), stock(5, 5)], 7);

        assert_eq!(plan.lines[0].location_id, location(2));
        assert_eq!(plan.lines[0].quantity, 5);
        assert_eq!(plan.lines[1].location_id, location(5));
        assert_eq!(plan.lines[1].quantity, 2);
    }

    #[test]
    fn reports_shortfall_when_stock_runs_out() {
        let plan = allocate(&[stock(1, 4), stock(2, 3)], 10);

        assert!(!plan.is_complete());
        assert_eq!(plan.allocated, 7);
        assert_eq!(plan.shortfall, 3);
    }

    #[test]
    fn skips_empty_locations() {
        let plan = allocate(&[stock(1, 0), stock(2, 6)], 4);
        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.lines[0].location_id, location(2));
    }

    #[test]
    fn non_positive_requirement_yields_empty_plan() {
        let plan = allocate(&[stock(1, 5)], 0);
        assert!(plan.lines.is_empty());
        assert!(plan.is_complete());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: allocated quantity equals min(required, total
        /// available), shortfall covers the rest, and no line exceeds its
        /// location's availability.
        #[test]
        fn allocation_accounting_is_exact(
            availabilities in prop::collection::vec(0i64..100, 0..12),
            required in 1i64..500,
        ) {
            let levels: Vec<LocationStock> = availabilities
                .iter()
                .enumerate()
                .map(|(i, &a)| stock(i as u128 + 1, a))
                .collect();
            let total: i64 = availabilities.iter().sum();

            let plan = allocate(&levels, required);

            prop_assert_eq!(plan.allocated, required.min(total));
            prop_assert_eq!(plan.allocated + plan.shortfall, required);
            let line_sum: i64 = plan.lines.iter().map(|l| l.quantity).sum();
            prop_assert_eq!(line_sum, plan.allocated);
            for line in &plan.lines {
                let level = levels
                    .iter()
                    .find(|l| l.location_id == line.location_id)
                    .unwrap();
                prop_assert!(line.quantity > 0);
                prop_assert!(line.quantity <= level.available);
            }
        }

        /// Property: lines come out in non-increasing quantity order — a
        /// consequence of taking the largest availability first.
        #[test]
        fn lines_are_non_increasing(
            availabilities in prop::collection::vec(1i64..100, 1..12),
            required in 1i64..500,
        ) {
            let levels: Vec<LocationStock> = availabilities
                .iter()
                .enumerate()
                .map(|(i, &a)| stock(i as u128 + 1, a))
                .collect();

            let plan = allocate(&levels, required);
            for pair in plan.lines.windows(2) {
                prop_assert!(pair[0].quantity >= pair[1].quantity);
            }
        }
    }
}
