//! `storekeep-tenancy` — ambient tenant context and data-access scoping.
//!
//! Three pieces, used together: [`TenantScope`] establishes an immutable
//! [`TenantContext`] for one logical operation and propagates it across
//! async call chains; the [`scoping`] table classifies every entity type
//! into its tenant dimensions; and [`DataAccessInterceptor`] rewrites each
//! data-access operation so tenant isolation cannot be forgotten at a call
//! site.

pub mod context;
pub mod interceptor;
pub mod scoping;

pub use context::{TenantContext, TenantScope};
pub use interceptor::{
    DataAccessInterceptor, Filter, ORGANIZATION_FIELD, Operation, OperationKind, Record,
    STORE_FIELD,
};
pub use scoping::{EntityKind, ScopingRule, rule_for};
