//! Postgres-backed stock store.
//!
//! Enforces tenant isolation and the stock invariant at the database
//! level: every query includes `organization_id` in its WHERE clause or
//! key, mutating reads take `FOR UPDATE` row locks so two transactions
//! cannot both pass an availability check on the same
//! (product, variant, location) cell, and check constraints back the
//! non-negative quantity invariant as a second line of defense.
//!
//! ## Error Mapping
//!
//! sqlx errors are mapped through `map_sqlx_error`: Postgres `23505`
//! (unique violation) surfaces as `DomainError::UniquenessConflict`,
//! `23514` (check violation) as `DomainError::InvariantViolation`, and
//! everything else as an opaque storage fault.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use storekeep_core::{
    LocationId, MovementId, OrgId, ProductId, ReservationId, VariantId,
};
use storekeep_inventory::{
    InventoryMovement, MovementType, ReservationStatus, ReservedFor, SourceRef, StockKey,
    StockLevel, StockReservation,
};

use crate::error::{StoreError, StoreResult, map_sqlx_error};

use super::{StockStore, StockTx};

/// Postgres [`StockStore`].
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::storage("run_migrations", e.to_string()))
}

const LEVEL_COLUMNS: &str = "organization_id, product_id, variant_id, location_id, \
     quantity_on_hand, quantity_reserved, quantity_available, updated_at";

const RESERVATION_COLUMNS: &str = "id, organization_id, product_id, variant_id, location_id, \
     quantity, reserved_for_kind, reserved_for_id, status, expires_at, created_at";

const MOVEMENT_COLUMNS: &str = "id, organization_id, product_id, variant_id, from_location, \
     to_location, quantity, movement_type, source_kind, source_id, unit_cost, occurred_at";

#[async_trait]
impl StockStore for PostgresStockStore {
    type Tx = PostgresStockTx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresStockTx { tx })
    }

    #[instrument(skip(self), fields(organization_id = %key.organization_id))]
    async fn get_level(&self, key: &StockKey) -> StoreResult<Option<StockLevel>> {
        let row = sqlx::query(&format!(
            "SELECT {LEVEL_COLUMNS} FROM stock_levels \
             WHERE organization_id = $1 AND product_id = $2 \
               AND variant_id IS NOT DISTINCT FROM $3 AND location_id = $4"
        ))
        .bind(key.organization_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .bind(key.variant_id.map(|v| *v.as_uuid()))
        .bind(key.location_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_level", e))?;

        row.map(|r| level_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    async fn levels_for_item(
        &self,
        organization_id: OrgId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> StoreResult<Vec<StockLevel>> {
        let rows = sqlx::query(&format!(
            "SELECT {LEVEL_COLUMNS} FROM stock_levels \
             WHERE organization_id = $1 AND product_id = $2 \
               AND variant_id IS NOT DISTINCT FROM $3 \
             ORDER BY location_id"
        ))
        .bind(organization_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(variant_id.map(|v| *v.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("levels_for_item", e))?;

        rows.iter().map(level_from_row).collect()
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    async fn levels_for_org(&self, organization_id: OrgId) -> StoreResult<Vec<StockLevel>> {
        let rows = sqlx::query(&format!(
            "SELECT {LEVEL_COLUMNS} FROM stock_levels \
             WHERE organization_id = $1 \
             ORDER BY product_id, location_id"
        ))
        .bind(organization_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("levels_for_org", e))?;

        rows.iter().map(level_from_row).collect()
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    async fn movements_for_org(
        &self,
        organization_id: OrgId,
    ) -> StoreResult<Vec<InventoryMovement>> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements \
             WHERE organization_id = $1 \
             ORDER BY occurred_at, id"
        ))
        .bind(organization_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("movements_for_org", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn expired_reservations(
        &self,
        scope: Option<OrgId>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<StockReservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM stock_reservations \
             WHERE status = 'active' AND expires_at < $1 \
               AND ($2::uuid IS NULL OR organization_id = $2) \
             ORDER BY expires_at"
        ))
        .bind(now)
        .bind(scope.map(|org| *org.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("expired_reservations", e))?;

        rows.iter().map(reservation_from_row).collect()
    }
}

/// One Postgres stock transaction.
pub struct PostgresStockTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StockTx for PostgresStockTx {
    async fn level_for_update(&mut self, key: &StockKey) -> StoreResult<Option<StockLevel>> {
        let row = sqlx::query(&format!(
            "SELECT {LEVEL_COLUMNS} FROM stock_levels \
             WHERE organization_id = $1 AND product_id = $2 \
               AND variant_id IS NOT DISTINCT FROM $3 AND location_id = $4 \
             FOR UPDATE"
        ))
        .bind(key.organization_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .bind(key.variant_id.map(|v| *v.as_uuid()))
        .bind(key.location_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("level_for_update", e))?;

        row.map(|r| level_from_row(&r)).transpose()
    }

    async fn save_level(&mut self, level: &StockLevel) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO stock_levels ( \
                 organization_id, product_id, variant_id, location_id, \
                 quantity_on_hand, quantity_reserved, quantity_available, updated_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (organization_id, product_id, variant_id, location_id) \
             DO UPDATE SET \
                 quantity_on_hand = EXCLUDED.quantity_on_hand, \
                 quantity_reserved = EXCLUDED.quantity_reserved, \
                 quantity_available = EXCLUDED.quantity_available, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(level.organization_id.as_uuid())
        .bind(level.product_id.as_uuid())
        .bind(level.variant_id.map(|v| *v.as_uuid()))
        .bind(level.location_id.as_uuid())
        .bind(level.quantity_on_hand)
        .bind(level.quantity_reserved)
        .bind(level.quantity_available)
        .bind(level.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_level", e))?;

        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &StockReservation) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO stock_reservations ( \
                 id, organization_id, product_id, variant_id, location_id, \
                 quantity, reserved_for_kind, reserved_for_id, status, expires_at, created_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.organization_id.as_uuid())
        .bind(reservation.product_id.as_uuid())
        .bind(reservation.variant_id.map(|v| *v.as_uuid()))
        .bind(reservation.location_id.as_uuid())
        .bind(reservation.quantity)
        .bind(&reservation.reserved_for.kind)
        .bind(reservation.reserved_for.id)
        .bind(reservation.status.as_str())
        .bind(reservation.expires_at)
        .bind(reservation.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_reservation", e))?;

        Ok(())
    }

    async fn active_reservation_for_update(
        &mut self,
        key: &StockKey,
        reserved_for: &ReservedFor,
    ) -> StoreResult<Option<StockReservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM stock_reservations \
             WHERE organization_id = $1 AND product_id = $2 \
               AND variant_id IS NOT DISTINCT FROM $3 AND location_id = $4 \
               AND reserved_for_kind = $5 AND reserved_for_id = $6 \
               AND status = 'active' \
             ORDER BY created_at \
             LIMIT 1 \
             FOR UPDATE"
        ))
        .bind(key.organization_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .bind(key.variant_id.map(|v| *v.as_uuid()))
        .bind(key.location_id.as_uuid())
        .bind(&reserved_for.kind)
        .bind(reserved_for.id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("active_reservation_for_update", e))?;

        row.map(|r| reservation_from_row(&r)).transpose()
    }

    async fn transition_reservation(
        &mut self,
        id: ReservationId,
        to: ReservationStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE stock_reservations SET status = $2 WHERE id = $1 AND status = 'active'",
        )
        .bind(id.as_uuid())
        .bind(to.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("transition_reservation", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_movement(&mut self, movement: &InventoryMovement) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO inventory_movements ( \
                 id, organization_id, product_id, variant_id, from_location, to_location, \
                 quantity, movement_type, source_kind, source_id, unit_cost, occurred_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(movement.id.as_uuid())
        .bind(movement.organization_id.as_uuid())
        .bind(movement.product_id.as_uuid())
        .bind(movement.variant_id.map(|v| *v.as_uuid()))
        .bind(movement.from_location.map(|l| *l.as_uuid()))
        .bind(movement.to_location.map(|l| *l.as_uuid()))
        .bind(movement.quantity)
        .bind(movement.movement_type.as_str())
        .bind(movement.source_ref.as_ref().map(|s| s.kind.clone()))
        .bind(movement.source_ref.as_ref().map(|s| s.id))
        .bind(movement.unit_cost)
        .bind(movement.occurred_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;

        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback_transaction", e))
    }
}

// sqlx row types

#[derive(Debug)]
struct StockLevelRow {
    organization_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    location_id: Uuid,
    quantity_on_hand: i64,
    quantity_reserved: i64,
    quantity_available: i64,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for StockLevelRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockLevelRow {
            organization_id: row.try_get("organization_id")?,
            product_id: row.try_get("product_id")?,
            variant_id: row.try_get("variant_id")?,
            location_id: row.try_get("location_id")?,
            quantity_on_hand: row.try_get("quantity_on_hand")?,
            quantity_reserved: row.try_get("quantity_reserved")?,
            quantity_available: row.try_get("quantity_available")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn level_from_row(row: &PgRow) -> StoreResult<StockLevel> {
    let row = StockLevelRow::from_row(row)
        .map_err(|e| StoreError::storage("decode_stock_level", e.to_string()))?;
    Ok(StockLevel {
        organization_id: OrgId::from_uuid(row.organization_id),
        product_id: ProductId::from_uuid(row.product_id),
        variant_id: row.variant_id.map(VariantId::from_uuid),
        location_id: LocationId::from_uuid(row.location_id),
        quantity_on_hand: row.quantity_on_hand,
        quantity_reserved: row.quantity_reserved,
        quantity_available: row.quantity_available,
        updated_at: row.updated_at,
    })
}

fn reservation_from_row(row: &PgRow) -> StoreResult<StockReservation> {
    let status: String = row
        .try_get("status")
        .map_err(|e| StoreError::storage("decode_reservation", e.to_string()))?;
    let status = parse_status(&status)?;

    let get = |field: &str| {
        row.try_get::<Uuid, _>(field)
            .map_err(|e| StoreError::storage("decode_reservation", e.to_string()))
    };

    Ok(StockReservation {
        id: ReservationId::from_uuid(get("id")?),
        organization_id: OrgId::from_uuid(get("organization_id")?),
        product_id: ProductId::from_uuid(get("product_id")?),
        variant_id: row
            .try_get::<Option<Uuid>, _>("variant_id")
            .map_err(|e| StoreError::storage("decode_reservation", e.to_string()))?
            .map(VariantId::from_uuid),
        location_id: LocationId::from_uuid(get("location_id")?),
        quantity: row
            .try_get("quantity")
            .map_err(|e| StoreError::storage("decode_reservation", e.to_string()))?,
        reserved_for: ReservedFor {
            kind: row
                .try_get("reserved_for_kind")
                .map_err(|e| StoreError::storage("decode_reservation", e.to_string()))?,
            id: get("reserved_for_id")?,
        },
        status,
        expires_at: row
            .try_get("expires_at")
            .map_err(|e| StoreError::storage("decode_reservation", e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StoreError::storage("decode_reservation", e.to_string()))?,
    })
}

fn movement_from_row(row: &PgRow) -> StoreResult<InventoryMovement> {
    let decode = |e: sqlx::Error| StoreError::storage("decode_movement", e.to_string());

    let movement_type: String = row.try_get("movement_type").map_err(decode)?;
    let source_kind: Option<String> = row.try_get("source_kind").map_err(decode)?;
    let source_id: Option<Uuid> = row.try_get("source_id").map_err(decode)?;

    Ok(InventoryMovement {
        id: MovementId::from_uuid(row.try_get("id").map_err(decode)?),
        organization_id: OrgId::from_uuid(row.try_get("organization_id").map_err(decode)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode)?),
        variant_id: row
            .try_get::<Option<Uuid>, _>("variant_id")
            .map_err(decode)?
            .map(VariantId::from_uuid),
        from_location: row
            .try_get::<Option<Uuid>, _>("from_location")
            .map_err(decode)?
            .map(LocationId::from_uuid),
        to_location: row
            .try_get::<Option<Uuid>, _>("to_location")
            .map_err(decode)?
            .map(LocationId::from_uuid),
        quantity: row.try_get("quantity").map_err(decode)?,
        movement_type: parse_movement_type(&movement_type)?,
        source_ref: match (source_kind, source_id) {
            (Some(kind), Some(id)) => Some(SourceRef { kind, id }),
            _ => None,
        },
        unit_cost: row.try_get("unit_cost").map_err(decode)?,
        occurred_at: row.try_get("occurred_at").map_err(decode)?,
    })
}

fn parse_status(s: &str) -> StoreResult<ReservationStatus> {
    match s {
        "active" => Ok(ReservationStatus::Active),
        "consumed" => Ok(ReservationStatus::Consumed),
        "expired" => Ok(ReservationStatus::Expired),
        other => Err(StoreError::storage(
            "decode_reservation",
            format!("unknown reservation status '{other}'"),
        )),
    }
}

fn parse_movement_type(s: &str) -> StoreResult<MovementType> {
    match s {
        "stock_in" => Ok(MovementType::StockIn),
        "sale" => Ok(MovementType::Sale),
        "adjustment" => Ok(MovementType::Adjustment),
        "transfer" => Ok(MovementType::Transfer),
        "return" => Ok(MovementType::Return),
        other => Err(StoreError::storage(
            "decode_movement",
            format!("unknown movement type '{other}'"),
        )),
    }
}
