//! Integration tests for the full scoped-inventory pipeline.
//!
//! Tests: TenantScope → engine → stock store (in-memory), and the order
//! sequencer on top of its store.
//!
//! Verifies:
//! - The availability invariant survives every operation and failure path
//! - Concurrent reservations never oversell a stock cell
//! - Tenant isolation is preserved end to end
//! - Expiry sweeps reclaim availability exactly once

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use storekeep_core::{DomainError, LocationId, OrgId, ProductId, StoreId};
    use storekeep_inventory::{MovementType, ReservedFor};
    use storekeep_tenancy::{TenantContext, TenantScope};

    use crate::engine::{EnginePolicy, ReleaseOutcome, ReservationEngine, StockUpdate};
    use crate::sequencer::{InMemoryOrderStore, OrderNumberSequencer};
    use crate::stock_store::{InMemoryStockStore, StockStore};

    fn engine() -> Arc<ReservationEngine<InMemoryStockStore>> {
        Arc::new(ReservationEngine::new(InMemoryStockStore::new()))
    }

    fn claimant() -> ReservedFor {
        ReservedFor::new("order", Uuid::now_v7())
    }

    async fn seed(
        engine: &ReservationEngine<InMemoryStockStore>,
        ctx: TenantContext,
        product: ProductId,
        location: LocationId,
        quantity: i64,
    ) {
        TenantScope::enter(ctx, async {
            engine
                .update_stock(StockUpdate::new(
                    product,
                    location,
                    quantity,
                    MovementType::StockIn,
                ))
                .await
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn reserving_earmarks_quantity_without_moving_stock() {
        let engine = engine();
        let ctx = TenantContext::new(OrgId::new());
        let product = ProductId::new();
        let location = LocationId::new();
        seed(&engine, ctx, product, location, 10).await;

        let reservation = TenantScope::enter(ctx, async {
            engine
                .reserve_stock(product, None, location, 4, claimant())
                .await
        })
        .await
        .unwrap();
        assert!(reservation.is_active());

        let level = TenantScope::enter(ctx, engine.get_level(product, None, location))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(level.quantity_on_hand, 10);
        assert_eq!(level.quantity_reserved, 4);
        assert_eq!(level.quantity_available, 6);
        assert!(level.invariant_holds());

        // Only the seeding stock-in hit the ledger — reservations move
        // nothing.
        let report = TenantScope::enter(ctx, engine.get_inventory_valuation())
            .await
            .unwrap();
        assert_eq!(report.summary.total_quantity, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn two_racing_reservations_cannot_jointly_oversell() {
        let engine = engine();
        let ctx = TenantContext::new(OrgId::new());
        let product = ProductId::new();
        let location = LocationId::new();
        seed(&engine, ctx, product, location, 10).await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            handles.push(tokio::spawn(TenantScope::enter(ctx, async move {
                engine
                    .reserve_stock(product, None, location, 6, claimant())
                    .await
            })));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(err) => {
                    let Some(DomainError::InsufficientStock {
                        required,
                        available,
                    }) = err.as_domain()
                    else {
                        panic!("unexpected error: {err}");
                    };
                    assert_eq!(*required, 6);
                    assert!(*available < 6);
                }
            }
        }
        assert_eq!(successes, 1);

        let level = TenantScope::enter(ctx, engine.get_level(product, None, location))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(level.quantity_available, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reserved_total_never_exceeds_availability() {
        let engine = engine();
        let ctx = TenantContext::new(OrgId::new());
        let product = ProductId::new();
        let location = LocationId::new();
        seed(&engine, ctx, product, location, 10).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let engine = engine.clone();
            handles.push(tokio::spawn(TenantScope::enter(ctx, async move {
                engine
                    .reserve_stock(product, None, location, 1, claimant())
                    .await
            })));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 10);

        let level = TenantScope::enter(ctx, engine.get_level(product, None, location))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(level.quantity_reserved, 10);
        assert_eq!(level.quantity_available, 0);
        assert!(level.invariant_holds());
    }

    #[tokio::test]
    async fn release_restores_availability_exactly_once() {
        let engine = engine();
        let ctx = TenantContext::new(OrgId::new());
        let product = ProductId::new();
        let location = LocationId::new();
        let order = claimant();
        seed(&engine, ctx, product, location, 10).await;

        TenantScope::enter(ctx, async {
            engine
                .reserve_stock(product, None, location, 4, order.clone())
                .await
        })
        .await
        .unwrap();

        let first = TenantScope::enter(ctx, async {
            engine
                .release_reservation(product, None, location, &order)
                .await
        })
        .await
        .unwrap();
        assert!(matches!(first, ReleaseOutcome::Released { restored: 4, .. }));

        // At-least-once delivery of release calls is harmless.
        let second = TenantScope::enter(ctx, async {
            engine
                .release_reservation(product, None, location, &order)
                .await
        })
        .await
        .unwrap();
        assert_eq!(second, ReleaseOutcome::NoActiveReservation);

        let level = TenantScope::enter(ctx, engine.get_level(product, None, location))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(level.quantity_available, 10);
        assert_eq!(level.quantity_reserved, 0);
    }

    #[tokio::test]
    async fn expiry_sweep_reclaims_availability_idempotently() {
        let engine = engine();
        let ctx = TenantContext::new(OrgId::new());
        let product = ProductId::new();
        let location = LocationId::new();
        seed(&engine, ctx, product, location, 10).await;

        TenantScope::enter(ctx, async {
            engine
                .reserve_stock(product, None, location, 4, claimant())
                .await
        })
        .await
        .unwrap();

        // Within the TTL the sweep finds nothing.
        let swept = TenantScope::enter(ctx, engine.expire_reservations(Utc::now()))
            .await
            .unwrap();
        assert_eq!(swept, 0);

        let after_deadline = Utc::now() + Duration::days(8);
        let swept = TenantScope::enter(ctx, engine.expire_reservations(after_deadline))
            .await
            .unwrap();
        assert_eq!(swept, 1);

        let level = TenantScope::enter(ctx, engine.get_level(product, None, location))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(level.quantity_available, 10);

        // Running the sweep again has no further effect.
        let swept = TenantScope::enter(ctx, engine.expire_reservations(after_deadline))
            .await
            .unwrap();
        assert_eq!(swept, 0);
        let level = TenantScope::enter(ctx, engine.get_level(product, None, location))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(level.quantity_available, 10);
    }

    #[tokio::test]
    async fn unscoped_sweep_covers_every_organization() {
        let store = InMemoryStockStore::new();
        let policy = EnginePolicy::default().with_reservation_ttl(Duration::minutes(1));
        let engine = Arc::new(ReservationEngine::with_policy(store, policy));

        for _ in 0..2 {
            let ctx = TenantContext::new(OrgId::new());
            let product = ProductId::new();
            let location = LocationId::new();
            seed(&engine, ctx, product, location, 5).await;
            TenantScope::enter(ctx, async {
                engine
                    .reserve_stock(product, None, location, 2, claimant())
                    .await
            })
            .await
            .unwrap();
        }

        // No ambient context: the maintenance path sweeps all tenants.
        let swept = engine
            .expire_reservations(Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(swept, 2);
    }

    #[tokio::test]
    async fn shipment_validates_availability_against_reservations() {
        let engine = engine();
        let ctx = TenantContext::new(OrgId::new());
        let product = ProductId::new();
        let location = LocationId::new();
        seed(&engine, ctx, product, location, 10).await;

        TenantScope::enter(ctx, async {
            engine
                .reserve_stock(product, None, location, 8, claimant())
                .await
        })
        .await
        .unwrap();

        let err = TenantScope::enter(ctx, async {
            engine
                .update_stock(StockUpdate::new(product, location, -5, MovementType::Sale))
                .await
        })
        .await
        .unwrap_err();
        assert_eq!(
            err.as_domain(),
            Some(&DomainError::InsufficientStock {
                required: 5,
                available: 2
            })
        );

        // A deliberate correction may cut into reserved stock; the level
        // clamps and keeps the invariant.
        let level = TenantScope::enter(ctx, async {
            engine
                .update_stock(
                    StockUpdate::new(product, location, -7, MovementType::Adjustment)
                        .allow_shortfall(),
                )
                .await
        })
        .await
        .unwrap();
        assert_eq!(level.quantity_on_hand, 3);
        assert_eq!(level.quantity_reserved, 3);
        assert_eq!(level.quantity_available, 0);
        assert!(level.invariant_holds());
    }

    #[tokio::test]
    async fn failed_operations_leave_no_partial_writes() {
        let engine = engine();
        let ctx = TenantContext::new(OrgId::new());
        let product = ProductId::new();
        let location = LocationId::new();
        seed(&engine, ctx, product, location, 3).await;

        let err = TenantScope::enter(ctx, async {
            engine
                .reserve_stock(product, None, location, 5, claimant())
                .await
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::InsufficientStock { .. })
        ));

        let level = TenantScope::enter(ctx, engine.get_level(product, None, location))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(level.quantity_on_hand, 3);
        assert_eq!(level.quantity_reserved, 0);
        assert_eq!(level.quantity_available, 3);
    }

    #[tokio::test]
    async fn stock_is_invisible_across_organizations() {
        let engine = engine();
        let org_a = TenantContext::new(OrgId::new());
        let org_b = TenantContext::new(OrgId::new());
        let product = ProductId::new();
        let location = LocationId::new();
        seed(&engine, org_a, product, location, 10).await;

        let level = TenantScope::enter(org_b, engine.get_level(product, None, location))
            .await
            .unwrap();
        assert!(level.is_none());

        let err = TenantScope::enter(org_b, async {
            engine
                .reserve_stock(product, None, location, 1, claimant())
                .await
        })
        .await
        .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn inventory_access_requires_a_tenant_context() {
        let engine = engine();
        let err = engine
            .get_level(ProductId::new(), None, LocationId::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn consolidated_availability_suggests_a_greedy_allocation() {
        let engine = engine();
        let ctx = TenantContext::new(OrgId::new());
        let product = ProductId::new();
        let (loc_1, loc_2, loc_3) = (LocationId::new(), LocationId::new(), LocationId::new());
        seed(&engine, ctx, product, loc_1, 3).await;
        seed(&engine, ctx, product, loc_2, 10).await;
        seed(&engine, ctx, product, loc_3, 5).await;

        let availability = TenantScope::enter(ctx, async {
            engine
                .validate_consolidated_availability(product, None, 12)
                .await
        })
        .await
        .unwrap();
        assert_eq!(availability.total_available, 18);
        assert!(availability.allocation.is_complete());
        assert_eq!(availability.allocation.lines[0].location_id, loc_2);
        assert_eq!(availability.allocation.lines[0].quantity, 10);
        assert_eq!(availability.allocation.lines[1].quantity, 2);

        let err = TenantScope::enter(ctx, async {
            engine
                .validate_consolidated_availability(product, None, 20)
                .await
        })
        .await
        .unwrap_err();
        assert_eq!(
            err.as_domain(),
            Some(&DomainError::InsufficientStock {
                required: 20,
                available: 18
            })
        );
    }

    #[tokio::test]
    async fn transfer_moves_stock_atomically_between_locations() {
        let engine = engine();
        let ctx = TenantContext::new(OrgId::new());
        let product = ProductId::new();
        let (source, dest) = (LocationId::new(), LocationId::new());
        seed(&engine, ctx, product, source, 10).await;

        let (from_level, to_level) = TenantScope::enter(ctx, async {
            engine
                .transfer_stock(product, None, source, dest, 4, None)
                .await
        })
        .await
        .unwrap();
        assert_eq!(from_level.quantity_on_hand, 6);
        assert_eq!(to_level.quantity_on_hand, 4);

        let err = TenantScope::enter(ctx, async {
            engine
                .transfer_stock(product, None, source, dest, 100, None)
                .await
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::InsufficientStock { .. })
        ));
    }

    #[tokio::test]
    async fn valuation_is_costed_from_the_movement_ledger() {
        let engine = engine();
        let ctx = TenantContext::new(OrgId::new());
        let costed = ProductId::new();
        let uncosted = ProductId::new();
        let location = LocationId::new();

        TenantScope::enter(ctx, async {
            engine
                .update_stock(
                    StockUpdate::new(costed, location, 10, MovementType::StockIn)
                        .with_unit_cost(100),
                )
                .await?;
            engine
                .update_stock(
                    StockUpdate::new(costed, location, 30, MovementType::StockIn)
                        .with_unit_cost(200),
                )
                .await?;
            engine
                .update_stock(StockUpdate::new(
                    uncosted,
                    location,
                    5,
                    MovementType::StockIn,
                ))
                .await
        })
        .await
        .unwrap();

        let report = TenantScope::enter(ctx, engine.get_inventory_valuation())
            .await
            .unwrap();
        assert_eq!(report.summary.total_items, 2);
        assert_eq!(report.summary.valued_items, 1);
        assert_eq!(report.summary.unvalued_items, 1);

        let item = report
            .items
            .iter()
            .find(|item| item.product_id == costed)
            .unwrap();
        assert_eq!(item.quantity_on_hand, 40);
        assert_eq!(item.unit_cost, Some(175));
        assert_eq!(item.total_value, Some(7000));
    }

    #[tokio::test]
    async fn low_stock_alerts_respect_the_threshold() {
        let engine = engine();
        let ctx = TenantContext::new(OrgId::new());
        let scarce = ProductId::new();
        let plentiful = ProductId::new();
        let location = LocationId::new();
        seed(&engine, ctx, scarce, location, 3).await;
        seed(&engine, ctx, plentiful, location, 15).await;

        let alerts = TenantScope::enter(ctx, engine.get_low_stock_alerts(None))
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].product_id, scarce);

        let alerts = TenantScope::enter(ctx, engine.get_low_stock_alerts(Some(20)))
            .await
            .unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].product_id, scarce);
    }

    #[tokio::test]
    async fn order_numbers_increment_within_a_store_day() {
        let sequencer = OrderNumberSequencer::new(InMemoryOrderStore::new());
        let store_id = StoreId::new();
        let ctx = TenantContext::for_store(OrgId::new(), store_id);
        let now = Utc::now();

        let first = TenantScope::enter(ctx, sequencer.create_order(store_id, now))
            .await
            .unwrap();
        let second = TenantScope::enter(ctx, sequencer.create_order(store_id, now))
            .await
            .unwrap();

        assert_eq!(first.number.sequence(), 1);
        assert_eq!(second.number.sequence(), 2);
        assert_eq!(second.number.next().unwrap().sequence(), 3);
    }

    #[tokio::test]
    async fn expired_scan_is_limited_by_the_ambient_scope() {
        let store = InMemoryStockStore::new();
        let policy = EnginePolicy::default().with_reservation_ttl(Duration::minutes(1));
        let engine = Arc::new(ReservationEngine::with_policy(store.clone(), policy));

        let org_a = TenantContext::new(OrgId::new());
        let org_b = TenantContext::new(OrgId::new());
        for ctx in [org_a, org_b] {
            let product = ProductId::new();
            let location = LocationId::new();
            seed(&engine, ctx, product, location, 5).await;
            TenantScope::enter(ctx, async {
                engine
                    .reserve_stock(product, None, location, 2, claimant())
                    .await
            })
            .await
            .unwrap();
        }

        let later = Utc::now() + Duration::hours(1);
        let swept = TenantScope::enter(org_a, engine.expire_reservations(later))
            .await
            .unwrap();
        assert_eq!(swept, 1);

        // Org B's reservation is still pending.
        let remaining = store
            .expired_reservations(Some(org_b.organization_id()), later)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
