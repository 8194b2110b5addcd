use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

/// A pooled stream plus its slot identity and activity clock.
///
/// Borrowed from a [`ConnectionPool`](super::ConnectionPool) between
/// `acquire` and `release`. Every read or write refreshes the activity
/// clock, whether the transport call succeeded or not; that clock is the
/// only thing the pool looks at when deciding staleness.
#[derive(Debug)]
pub struct Connection<S> {
    id: usize,
    pool_id: u64,
    address: String,
    stream: S,
    created_at: Instant,
    last_activity: Instant,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(id: usize, pool_id: u64, address: &str, stream: S) -> Self {
        let now = Instant::now();
        Self {
            id,
            pool_id,
            address: address.to_string(),
            stream,
            created_at: now,
            last_activity: now,
        }
    }

    /// Slot number, stable across replacement.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Time since the last read or write.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Time since the underlying stream was dialed.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.idle_for() > ttl
    }

    pub(crate) fn pool_id(&self) -> u64 {
        self.pool_id
    }

    pub async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.stream.write(buf).await;
        self.touch();
        result
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let result = self.stream.write_all(buf).await;
        self.touch();
        result
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        let result = self.stream.flush().await;
        self.touch();
        result
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.stream.read(buf).await;
        self.touch();
        result
    }

    /// Shut the stream down and drop it.
    ///
    /// Only the pool calls this on connections it owns; borrowers hand
    /// connections back with `release` instead.
    pub(crate) async fn close(mut self) -> io::Result<()> {
        let result = self.stream.shutdown().await;
        self.touch();
        result
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}
