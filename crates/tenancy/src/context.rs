//! Ambient tenant context and its propagation across async call chains.

use std::future::Future;

use storekeep_core::{OrgId, StoreId};

/// Tenant context for one logical operation.
///
/// Immutable once built; owned by the request boundary and handed to the
/// core for the operation's lifetime. Never persisted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    organization_id: OrgId,
    store_id: Option<StoreId>,
    is_super_admin: bool,
}

impl TenantContext {
    /// Context scoped to an organization, with no store selected.
    pub fn new(organization_id: OrgId) -> Self {
        Self {
            organization_id,
            store_id: None,
            is_super_admin: false,
        }
    }

    /// Context scoped to a specific store within an organization.
    pub fn for_store(organization_id: OrgId, store_id: StoreId) -> Self {
        Self {
            organization_id,
            store_id: Some(store_id),
            is_super_admin: false,
        }
    }

    /// Context that bypasses all scoping rules.
    pub fn super_admin(organization_id: OrgId) -> Self {
        Self {
            organization_id,
            store_id: None,
            is_super_admin: true,
        }
    }

    pub fn with_store(mut self, store_id: StoreId) -> Self {
        self.store_id = Some(store_id);
        self
    }

    pub fn organization_id(&self) -> OrgId {
        self.organization_id
    }

    pub fn store_id(&self) -> Option<StoreId> {
        self.store_id
    }

    pub fn is_super_admin(&self) -> bool {
        self.is_super_admin
    }
}

tokio::task_local! {
    static CURRENT: TenantContext;
}

/// Scoped establishment of the ambient [`TenantContext`].
///
/// [`TenantScope::enter`] runs a future such that every nested call to
/// [`TenantScope::current`] — across all of the future's await points —
/// observes the given context. The context is task-local: concurrently
/// running operations each observe only their own. Nested `enter` calls
/// shadow the outer context for the inner future and the outer value is
/// restored on every exit path, including panics and cancellation.
pub struct TenantScope;

impl TenantScope {
    /// Run `fut` with `ctx` as the ambient tenant context.
    pub async fn enter<F>(ctx: TenantContext, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(ctx, fut).await
    }

    /// Synchronous variant of [`TenantScope::enter`] for non-async sections.
    pub fn enter_sync<F, R>(ctx: TenantContext, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT.sync_scope(ctx, f)
    }

    /// The ambient context, or `None` outside any scope.
    pub fn current() -> Option<TenantContext> {
        CURRENT.try_with(|ctx| *ctx).ok()
    }
}
