// ttlpool - Bounded connection pool with TTL-based staleness eviction

pub mod config;
pub mod pool;
pub mod utils;
pub mod workload;

// Re-export commonly used types
pub use pool::{Connection, ConnectionPool, Dialer, PoolStats, TcpDialer};
pub use utils::error::{ReleaseError, Result, TtlPoolError};
