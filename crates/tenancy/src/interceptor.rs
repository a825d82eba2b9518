//! Tenant rewriting of data-access operations.
//!
//! Every read/write on a scoped entity is routed through
//! [`DataAccessInterceptor`] before it reaches a data store: writes get the
//! tenant identifiers injected, reads/updates/deletes get the tenant filter
//! merged into their predicate with AND semantics. Centralizing the rewrite
//! here means no call site can forget a `WHERE organization_id = ?`.
//!
//! Bypass rules: no ambient context, a `Global` entity kind, or a
//! super-admin context all pass operations through unmodified. A
//! store-scoped *filtered* operation with a context that lacks a store id
//! fails with [`DomainError::Authorization`] — a missing store id is never
//! treated as "match any store". Creates inject `store_id` only when the
//! context carries one, since a create has no predicate to widen.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use storekeep_core::{DomainError, DomainResult, OrgId};

use crate::context::{TenantContext, TenantScope};
use crate::scoping::{EntityKind, rule_for};

/// Field name the organization dimension is stored under.
pub const ORGANIZATION_FIELD: &str = "organization_id";

/// Field name the store dimension is stored under.
pub const STORE_FIELD: &str = "store_id";

/// Conjunction of field equality predicates (AND semantics).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    fields: BTreeMap<String, JsonValue>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality predicate (builder form).
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<JsonValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether a record satisfies every predicate in this filter.
    pub fn matches(&self, record: &Record) -> bool {
        self.fields
            .iter()
            .all(|(field, value)| record.get(field) == Some(value))
    }
}

/// Field values of a row being written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, JsonValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value (builder form).
    pub fn field(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<JsonValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overlay `patch` on top of this record (used by updates/upserts).
    pub fn apply(&mut self, patch: &Record) {
        for (field, value) in patch.iter() {
            self.fields.insert(field.to_string(), value.clone());
        }
    }
}

/// The operation kinds the interceptor can rewrite.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    CreateMany,
    ReadOne,
    ReadMany,
    Count,
    Update,
    UpdateMany,
    Delete,
    DeleteMany,
    Upsert,
}

/// A data-access operation before/after tenant rewriting.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create { record: Record },
    CreateMany { records: Vec<Record> },
    ReadOne { filter: Filter },
    ReadMany { filter: Filter },
    Count { filter: Filter },
    Update { filter: Filter, patch: Record },
    UpdateMany { filter: Filter, patch: Record },
    Delete { filter: Filter },
    DeleteMany { filter: Filter },
    Upsert { filter: Filter, create: Record, update: Record },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create { .. } => OperationKind::Create,
            Operation::CreateMany { .. } => OperationKind::CreateMany,
            Operation::ReadOne { .. } => OperationKind::ReadOne,
            Operation::ReadMany { .. } => OperationKind::ReadMany,
            Operation::Count { .. } => OperationKind::Count,
            Operation::Update { .. } => OperationKind::Update,
            Operation::UpdateMany { .. } => OperationKind::UpdateMany,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::DeleteMany { .. } => OperationKind::DeleteMany,
            Operation::Upsert { .. } => OperationKind::Upsert,
        }
    }
}

/// Stateless rewriter consulting the scoping rule table and the ambient
/// [`TenantScope`].
pub struct DataAccessInterceptor;

impl DataAccessInterceptor {
    /// Merge the tenant predicate into `filter` for a filtered operation.
    pub fn scope_filter(kind: EntityKind, filter: Filter) -> DomainResult<Filter> {
        Self::scope_filter_with(TenantScope::current(), kind, filter)
    }

    /// As [`Self::scope_filter`], with the context passed explicitly.
    pub fn scope_filter_with(
        ctx: Option<TenantContext>,
        kind: EntityKind,
        mut filter: Filter,
    ) -> DomainResult<Filter> {
        let Some(ctx) = ctx else {
            return Ok(filter);
        };
        let rule = rule_for(kind);
        if rule.is_global() || ctx.is_super_admin() {
            return Ok(filter);
        }

        if rule.organization {
            // Tenant fields are always pinned to the context, even when the
            // caller supplied one: a caller-chosen organization must not be
            // able to escape the scope. Unrelated fields are left alone.
            filter.set(ORGANIZATION_FIELD, ctx.organization_id().to_string());
        }
        if rule.store {
            match ctx.store_id() {
                Some(store_id) => filter.set(STORE_FIELD, store_id.to_string()),
                None => {
                    return Err(DomainError::authorization(format!(
                        "{kind} is store-scoped but the current context has no store id",
                    )));
                }
            }
        }
        Ok(filter)
    }

    /// Resolve the organization a typed (non-record) access is pinned to.
    ///
    /// Services with strongly-typed stores (the inventory engine) have no
    /// field documents to rewrite, so they resolve their scope here
    /// instead. The rule table still classifies the entity, and the
    /// absence of an ambient context is a hard authorization failure — a
    /// typed access never falls back to an unscoped one.
    pub fn require_organization(kind: EntityKind) -> DomainResult<OrgId> {
        debug_assert!(rule_for(kind).organization);
        let ctx = TenantScope::current().ok_or_else(|| {
            DomainError::authorization(format!("{kind} access requires a tenant context"))
        })?;
        Ok(ctx.organization_id())
    }

    /// Inject the tenant identifiers into a record being created.
    pub fn scope_record(kind: EntityKind, record: Record) -> DomainResult<Record> {
        Self::scope_record_with(TenantScope::current(), kind, record)
    }

    /// As [`Self::scope_record`], with the context passed explicitly.
    pub fn scope_record_with(
        ctx: Option<TenantContext>,
        kind: EntityKind,
        mut record: Record,
    ) -> DomainResult<Record> {
        let Some(ctx) = ctx else {
            return Ok(record);
        };
        let rule = rule_for(kind);
        if rule.is_global() || ctx.is_super_admin() {
            return Ok(record);
        }

        if rule.organization {
            record.set(ORGANIZATION_FIELD, ctx.organization_id().to_string());
        }
        if rule.store {
            if let Some(store_id) = ctx.store_id() {
                record.set(STORE_FIELD, store_id.to_string());
            }
        }
        Ok(record)
    }

    /// Rewrite a whole operation according to its kind.
    ///
    /// Update patches are left untouched: updates are restricted by their
    /// (scoped) filter, and rewriting the patch would let an update move a
    /// row between tenants.
    pub fn scope_operation(kind: EntityKind, op: Operation) -> DomainResult<Operation> {
        Self::scope_operation_with(TenantScope::current(), kind, op)
    }

    /// As [`Self::scope_operation`], with the context passed explicitly.
    pub fn scope_operation_with(
        ctx: Option<TenantContext>,
        kind: EntityKind,
        op: Operation,
    ) -> DomainResult<Operation> {
        Ok(match op {
            Operation::Create { record } => Operation::Create {
                record: Self::scope_record_with(ctx, kind, record)?,
            },
            Operation::CreateMany { records } => Operation::CreateMany {
                records: records
                    .into_iter()
                    .map(|r| Self::scope_record_with(ctx, kind, r))
                    .collect::<DomainResult<Vec<_>>>()?,
            },
            Operation::ReadOne { filter } => Operation::ReadOne {
                filter: Self::scope_filter_with(ctx, kind, filter)?,
            },
            Operation::ReadMany { filter } => Operation::ReadMany {
                filter: Self::scope_filter_with(ctx, kind, filter)?,
            },
            Operation::Count { filter } => Operation::Count {
                filter: Self::scope_filter_with(ctx, kind, filter)?,
            },
            Operation::Update { filter, patch } => Operation::Update {
                filter: Self::scope_filter_with(ctx, kind, filter)?,
                patch,
            },
            Operation::UpdateMany { filter, patch } => Operation::UpdateMany {
                filter: Self::scope_filter_with(ctx, kind, filter)?,
                patch,
            },
            Operation::Delete { filter } => Operation::Delete {
                filter: Self::scope_filter_with(ctx, kind, filter)?,
            },
            Operation::DeleteMany { filter } => Operation::DeleteMany {
                filter: Self::scope_filter_with(ctx, kind, filter)?,
            },
            // An upsert is scoped on both sides: the match clause gets the
            // filter, the create clause gets the injected fields.
            Operation::Upsert {
                filter,
                create,
                update,
            } => Operation::Upsert {
                filter: Self::scope_filter_with(ctx, kind, filter)?,
                create: Self::scope_record_with(ctx, kind, create)?,
                update,
            },
        })
    }
}
