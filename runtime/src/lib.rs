//! # Request Queue Runtime
//!
//! Async store that serializes circulation actions per item and runs their
//! side effects.
//!
//! ## Core Components
//!
//! - **`QueueStore`**: per-item locking, transactional commit, queries
//! - **Effect Executor**: runs recall and notice effects after commit
//! - **Observability**: tracing bootstrap, Prometheus metrics, health checks
//!
//! ## Example
//!
//! ```ignore
//! use request_queue_runtime::QueueStore;
//!
//! let store = QueueStore::new(environment);
//! store.register_item(item).await?;
//!
//! let created = store.create(new_request).await?;
//! let queue = store.get_queue(created.value.item_id).await?;
//! ```

/// Store configuration loaded from the environment
pub mod config;

/// Effect execution and completion tracking
pub mod effects;

/// Health reporting
pub mod health;

/// Tracing subscriber bootstrap
pub mod logging;

/// Prometheus metrics for observability
pub mod metrics;

mod store;

pub use config::{ConfigError, StoreConfig};
pub use effects::EffectHandle;
pub use health::{HealthCheck, HealthStatus, StoreCounters};
pub use store::{Committed, QueueStore};

/// Error types for the store runtime
pub mod error {
    use request_queue_core::QueueError;
    use thiserror::Error;

    /// Errors returned by [`QueueStore`](crate::QueueStore) operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// The action was rejected; nothing was committed
        #[error(transparent)]
        Queue(#[from] QueueError),

        /// Store is shutting down and not accepting new mutations
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for effects
        #[error("Timeout waiting for effects")]
        Timeout,
    }

    impl StoreError {
        /// HTTP-style status code for the error
        #[must_use]
        pub const fn http_status(&self) -> u16 {
            match self {
                Self::Queue(err) => err.http_status(),
                Self::ShutdownInProgress | Self::ShutdownTimeout(_) => 503,
                Self::Timeout => 504,
            }
        }

        /// The domain error, if the action was rejected
        #[must_use]
        pub const fn as_queue_error(&self) -> Option<&QueueError> {
            match self {
                Self::Queue(err) => Some(err),
                _ => None,
            }
        }
    }
}

pub use error::StoreError;
