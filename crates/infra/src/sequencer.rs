//! Order number generation with bounded optimistic retry.
//!
//! The sequencer scans the highest existing number for (store, day),
//! increments it, and lets the orders table's unique key arbitrate races:
//! on the specific uniqueness conflict it regenerates and retries up to a
//! fixed bound, then surfaces the conflict as definitive. No counter row,
//! no lock — rare regeneration under contention instead of serializing all
//! order creation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::RwLock;
use tracing::{debug, instrument};

use storekeep_core::{DomainError, OrgId, StoreId};
use storekeep_orders::{Order, OrderNumber, day_prefix};
use storekeep_tenancy::TenantScope;

use crate::error::{StoreError, StoreResult, map_sqlx_error};

/// How many times `create_order` regenerates before giving up.
pub const DEFAULT_ORDER_NUMBER_ATTEMPTS: u32 = 3;

/// Persistence seam for orders, as far as numbering is concerned.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Highest order number for (organization, store) with the given day
    /// prefix, or `None` when the store has no orders that day.
    async fn highest_number_for_day(
        &self,
        organization_id: OrgId,
        store_id: StoreId,
        prefix: &str,
    ) -> StoreResult<Option<OrderNumber>>;

    /// Insert the order row. Fails with
    /// [`DomainError::UniquenessConflict`] when its number is taken.
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;
}

/// Per-store, per-day order number sequencer.
pub struct OrderNumberSequencer<S> {
    store: S,
    attempts: u32,
}

impl<S: OrderStore> OrderNumberSequencer<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            attempts: DEFAULT_ORDER_NUMBER_ATTEMPTS,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Order numbering is store-scoped: the ambient context must carry the
    /// target store (or be super-admin), and an organization to pin the
    /// scan to.
    fn resolve_scope(store_id: StoreId) -> StoreResult<OrgId> {
        let ctx = TenantScope::current().ok_or_else(|| {
            DomainError::authorization("order numbering requires a tenant context")
        })?;
        if !ctx.is_super_admin() {
            match ctx.store_id() {
                Some(ctx_store) if ctx_store == store_id => {}
                Some(_) => {
                    return Err(DomainError::authorization(
                        "order numbering attempted for a store outside the current context",
                    )
                    .into());
                }
                None => {
                    return Err(DomainError::authorization(
                        "order numbering is store-scoped but the current context has no store id",
                    )
                    .into());
                }
            }
        }
        Ok(ctx.organization_id())
    }

    /// Next order number for the store at `now` — highest existing number
    /// of the day incremented, or the day's first.
    #[instrument(skip(self), fields(store = %store_id), err)]
    pub async fn generate(
        &self,
        store_id: StoreId,
        now: DateTime<Utc>,
    ) -> StoreResult<OrderNumber> {
        let organization_id = Self::resolve_scope(store_id)?;
        let date = now.date_naive();
        let prefix = day_prefix(date);

        match self
            .store
            .highest_number_for_day(organization_id, store_id, &prefix)
            .await?
        {
            Some(highest) => Ok(highest.next()?),
            None => Ok(OrderNumber::first_of_day(date)),
        }
    }

    /// Create the order row, regenerating its number on a uniqueness
    /// conflict up to the configured bound. Any other failure is
    /// propagated immediately — only the specific conflict kind is
    /// retryable.
    #[instrument(skip(self), fields(store = %store_id), err)]
    pub async fn create_order(
        &self,
        store_id: StoreId,
        now: DateTime<Utc>,
    ) -> StoreResult<Order> {
        let organization_id = Self::resolve_scope(store_id)?;

        let mut last_conflict = None;
        for attempt in 1..=self.attempts {
            let number = self.generate(store_id, now).await?;
            let order = Order::new(organization_id, store_id, number, now);
            match self.store.insert_order(&order).await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(attempt, number = %order.number, "order number settled after retry");
                    }
                    return Ok(order);
                }
                Err(StoreError::Domain(err @ DomainError::UniquenessConflict(_))) => {
                    debug!(attempt, "order number taken, regenerating");
                    last_conflict = Some(err);
                }
                Err(other) => return Err(other),
            }
        }

        Err(StoreError::Domain(last_conflict.unwrap_or_else(|| {
            DomainError::conflict("order number contention exhausted retries")
        })))
    }
}

/// In-memory [`OrderStore`] for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    inner: RwLock<Vec<Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn highest_number_for_day(
        &self,
        organization_id: OrgId,
        store_id: StoreId,
        prefix: &str,
    ) -> StoreResult<Option<OrderNumber>> {
        let orders = self
            .inner
            .read()
            .map_err(|_| StoreError::storage("highest_number_for_day", "lock poisoned"))?;
        Ok(orders
            .iter()
            .filter(|order| {
                order.organization_id == organization_id
                    && order.store_id == store_id
                    && order.number.as_str().starts_with(prefix)
            })
            .map(|order| order.number.clone())
            .max_by(|a, b| a.as_str().cmp(b.as_str())))
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut orders = self
            .inner
            .write()
            .map_err(|_| StoreError::storage("insert_order", "lock poisoned"))?;
        if orders
            .iter()
            .any(|existing| existing.store_id == order.store_id && existing.number == order.number)
        {
            return Err(DomainError::conflict(format!(
                "order number {} already exists for store {}",
                order.number, order.store_id
            ))
            .into());
        }
        orders.push(order.clone());
        Ok(())
    }
}

/// Postgres [`OrderStore`].
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn highest_number_for_day(
        &self,
        organization_id: OrgId,
        store_id: StoreId,
        prefix: &str,
    ) -> StoreResult<Option<OrderNumber>> {
        // Zero-padded sequences make lexicographic order numeric order.
        let row = sqlx::query(
            "SELECT order_number FROM orders \
             WHERE organization_id = $1 AND store_id = $2 AND order_number LIKE $3 || '%' \
             ORDER BY order_number DESC \
             LIMIT 1",
        )
        .bind(organization_id.as_uuid())
        .bind(store_id.as_uuid())
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("highest_number_for_day", e))?;

        row.map(|r| {
            let number: String = r
                .try_get("order_number")
                .map_err(|e| StoreError::storage("decode_order_number", e.to_string()))?;
            Ok(OrderNumber::parse(&number)?)
        })
        .transpose()
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO orders (id, organization_id, store_id, order_number, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(order.id.as_uuid())
        .bind(order.organization_id.as_uuid())
        .bind(order.store_id.as_uuid())
        .bind(order.number.as_str())
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        Ok(())
    }
}
