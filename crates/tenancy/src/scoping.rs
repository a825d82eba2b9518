//! Static classification of entity types into tenant-scoping rules.
//!
//! The rule table is a single exhaustive `match`, so adding an entity kind
//! without classifying it fails to compile. This replaces per-model dynamic
//! interception with a dispatch the compiler can check.

/// Entity types known to the scoped data layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Organization,
    Store,
    Customer,
    Product,
    ProductVariant,
    Location,
    StockLevel,
    StockReservation,
    InventoryMovement,
    Order,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Organization => "organization",
            EntityKind::Store => "store",
            EntityKind::Customer => "customer",
            EntityKind::Product => "product",
            EntityKind::ProductVariant => "product_variant",
            EntityKind::Location => "location",
            EntityKind::StockLevel => "stock_level",
            EntityKind::StockReservation => "stock_reservation",
            EntityKind::InventoryMovement => "inventory_movement",
            EntityKind::Order => "order",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an entity type is restricted along the tenant dimensions.
///
/// A type can be scoped along both dimensions at once (e.g. orders belong
/// to an organization *and* to one of its stores).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScopingRule {
    pub organization: bool,
    pub store: bool,
}

impl ScopingRule {
    /// No tenant filter at all.
    pub const GLOBAL: ScopingRule = ScopingRule {
        organization: false,
        store: false,
    };

    /// Filtered/injected by `organization_id`.
    pub const ORGANIZATION: ScopingRule = ScopingRule {
        organization: true,
        store: false,
    };

    /// Filtered/injected by both `organization_id` and `store_id`.
    pub const ORGANIZATION_AND_STORE: ScopingRule = ScopingRule {
        organization: true,
        store: true,
    };

    pub fn is_global(&self) -> bool {
        !self.organization && !self.store
    }
}

/// The static rule table.
pub fn rule_for(kind: EntityKind) -> ScopingRule {
    use EntityKind::*;
    match kind {
        // Tenant roots are visible across the platform.
        Organization | Store => ScopingRule::GLOBAL,
        Product | ProductVariant | Location | StockLevel | StockReservation
        | InventoryMovement => ScopingRule::ORGANIZATION,
        Order | Customer => ScopingRule::ORGANIZATION_AND_STORE,
    }
}
