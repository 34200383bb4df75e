//! Storage backends for monitors, checks and incidents
//!
//! ## Design
//!
//! - **Trait-based**: `MonitorStore` and `MaintenanceGate` let the scheduler
//!   run against any backend
//! - **Async**: All operations are async for compatibility with the actors
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database
//! - **In-Memory**: No persistence, for testing or alert-only deployments
//!
//! ## Usage
//!
//! ```no_run
//! use uptime_watch::storage::{MonitorStore, sqlite::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new("./uptime.db").await?;
//!     let monitors = store.active_monitors().await?;
//!     println!("{} active monitors", monitors.len());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{MaintenanceGate, MonitorStore};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
