//! Demo workload: loops that borrow a connection, write a line, hold it
//! for a while and hand it back.

use crate::config::WorkloadSettings;
use crate::pool::{ConnectionPool, Dialer};
use crate::utils::error::{Result, TtlPoolError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct Worker {
    pub name: String,
    pub message: String,
    pub hold: Duration,
}

impl Worker {
    pub fn new(name: impl Into<String>, message: impl Into<String>, hold: Duration) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            hold,
        }
    }

    /// Run acquire/write/hold/release rounds until `rounds` is reached
    /// (forever when `None`) or the pool shuts down.
    ///
    /// Returns the number of completed rounds. A dial or write failure ends
    /// the worker with that error; the connection is released first.
    pub async fn run<D: Dialer>(
        &self,
        pool: &ConnectionPool<D>,
        rounds: Option<u64>,
    ) -> Result<u64> {
        let line = format!("{}\n", self.message);
        let mut completed = 0;

        while rounds.map_or(true, |limit| completed < limit) {
            let mut conn = match pool.acquire().await {
                Ok(conn) => conn,
                Err(TtlPoolError::PoolClosed) => {
                    debug!("Worker {} stopping: pool closed", self.name);
                    break;
                }
                Err(e) => return Err(e),
            };

            let id = conn.id();
            if let Err(e) = conn.write_all(line.as_bytes()).await {
                error!("Worker {} failed to write on connection {}: {}", self.name, id, e);
                pool.release(conn).await?;
                return Err(e.into());
            }
            debug!("Worker {} wrote {} bytes on connection {}", self.name, line.len(), id);

            tokio::time::sleep(self.hold).await;
            pool.release(conn).await?;
            completed += 1;
        }

        Ok(completed)
    }
}

/// One background worker plus one foreground worker sharing a pool.
#[derive(Debug, Clone)]
pub struct Workload {
    pub foreground: Worker,
    pub background: Worker,
}

impl Workload {
    pub fn from_settings(settings: &WorkloadSettings) -> Self {
        Self {
            foreground: Worker::new(
                "main",
                settings.main_message.clone(),
                Duration::from_millis(settings.main_hold_ms),
            ),
            background: Worker::new(
                "background",
                settings.background_message.clone(),
                Duration::from_millis(settings.background_hold_ms),
            ),
        }
    }

    /// Spawn the background worker and drive the foreground one.
    ///
    /// Finishes when either worker does; the first error wins. The
    /// background task is aborted when this future completes or is dropped.
    pub async fn run<D: Dialer>(&self, pool: Arc<ConnectionPool<D>>) -> Result<()> {
        let background = self.background.clone();
        let background_pool = Arc::clone(&pool);
        let mut background_task = JoinSet::new();
        background_task.spawn(async move { background.run(&*background_pool, None).await });

        info!(
            "Workload started against {} ({} connections, ttl {:?})",
            pool.address(),
            pool.capacity(),
            pool.ttl()
        );

        tokio::select! {
            result = self.foreground.run(&*pool, None) => result.map(|_| ()),
            Some(joined) = background_task.join_next() => match joined {
                Ok(result) => result.map(|_| ()),
                Err(e) => Err(TtlPoolError::Io(std::io::Error::other(e))),
            },
        }
    }
}
