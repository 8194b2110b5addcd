pub mod connection;
pub mod manager;
pub mod transport;

pub use connection::Connection;
pub use manager::{ConnectionPool, PoolStats};
pub use transport::{Dialer, TcpDialer};
