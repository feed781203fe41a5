//! Catalog persistence layer.
//!
//! - [`store`]: the async [`CatalogStore`] trait consumed by the driver
//! - [`error`]: [`StoreError`] with structured context
//! - [`local`]: [`LocalCatalogStore`], an in-memory implementation

pub mod error;
pub mod local;
pub mod store;

pub use error::{ErrorContext, StoreError, StoreResult};
pub use local::LocalCatalogStore;
pub use store::{CatalogStore, TargetUpdate, WriteBatch};
