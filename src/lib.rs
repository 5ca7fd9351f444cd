//! # respool
//!
//! Bounded, TTL-aware resource pool for expensive closable handles
//! (network connections, file descriptors, authenticated sessions).
//!
//! ## Features
//!
//! - Caps on total live handles and cached idle handles
//! - Lazy idle-time and total-life eviction, checked at acquire time
//! - Async acquisition with caller-side cancellation
//! - Optional usability screening of cached handles
//! - Explicit return/discard with foreign-resource rejection
//! - Graceful shutdown that drains outstanding borrows
//! - Cheap inspection counters
//!
//! ## Quick Start
//!
//! ```rust
//! use respool::{BoxError, Closable, Pool, PoolConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Conn;
//!
//! impl Closable for Conn {
//!     fn close(&mut self) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), respool::PoolError> {
//! let pool = Pool::new(
//!     |_ctx| async { Ok::<_, BoxError>(Conn) },
//!     PoolConfig::new().with_max_open(10).with_max_idle(5),
//! )?;
//!
//! let ctx = CancellationToken::new();
//! let conn = pool.get(&ctx).await?;
//! // ... use the connection ...
//! pool.put(conn)?;
//! pool.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod errors;
mod eviction;
mod idle;
mod metrics;
mod pool;

pub use config::PoolConfig;
pub use errors::{BoxError, PoolError, PoolResult};
pub use metrics::{PoolMetrics, PoolStatus};
pub use pool::{Closable, OpenFuture, Pool, PooledResource};
