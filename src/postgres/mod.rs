// PostgreSQL backend
//
// - bootstrap: one-time database/table/index creation
// - manager: bb8 connection manager and background error sink
// - executor: bootstrap-gated, one-statement-per-checkout execution
// - table: the per-collection document facade

pub mod bootstrap;
pub mod executor;
pub mod manager;
pub mod table;

pub use bootstrap::{BootstrapState, schema_statements};
pub use executor::{Executor, PoolStatus};
pub use manager::{LogErrorSink, PgManager};
pub use table::PgTable;
