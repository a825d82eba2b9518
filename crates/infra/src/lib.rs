//! Infrastructure layer: stores, the reservation engine, the order number
//! sequencer, and the generic scoped data store.
//!
//! Every store comes in two flavors wired to the same trait: a Postgres
//! implementation for production and an in-memory one for tests and
//! development, so the engine and sequencer are exercised without a
//! database.

pub mod engine;
pub mod error;
pub mod ledger;
pub mod scoped_store;
pub mod sequencer;
pub mod stock_store;

#[cfg(test)]
mod integration_tests;

pub use engine::{
    ConsolidatedAvailability, EnginePolicy, ReleaseOutcome, ReservationEngine, StockUpdate,
};
pub use error::{StoreError, StoreResult};
pub use scoped_store::{DataStore, InMemoryDataStore, ScopedStore};
pub use sequencer::{
    DEFAULT_ORDER_NUMBER_ATTEMPTS, InMemoryOrderStore, OrderNumberSequencer, OrderStore,
    PostgresOrderStore,
};
pub use stock_store::{
    InMemoryStockStore, PostgresStockStore, StockStore, StockTx, run_migrations,
};
