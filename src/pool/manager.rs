use super::connection::Connection;
use super::transport::{Dialer, TcpDialer};
use crate::config::PoolSettings;
use crate::utils::error::{ReleaseError, Result, TtlPoolError};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};
use tracing::{debug, info, trace, warn};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A slot sitting in the holding area.
enum Slot<S> {
    Live(Connection<S>),
    /// Slot whose replacement dial failed; the next acquire redials it.
    Vacant(usize),
}

struct PoolState<S> {
    resting: VecDeque<Slot<S>>,
    checked_out: HashSet<usize>,
    closed: bool,
}

/// Fixed-size pool of connections to a single address with TTL eviction.
///
/// All `size` connections are dialed up front. Borrowers `acquire` a
/// connection, use it, and `release` it back. A connection that has been
/// idle for longer than the TTL is closed and redialed, keeping its slot
/// id, the next time it is acquired. There is no background sweep.
///
/// The holding area is a FIFO queue paired with a fair semaphore whose
/// permits track how many slots are at rest, so `acquire` waits in arrival
/// order and each `release` wakes exactly one waiter.
pub struct ConnectionPool<D: Dialer> {
    id: u64,
    dialer: D,
    address: String,
    capacity: usize,
    ttl: Duration,
    state: Mutex<PoolState<D::Stream>>,
    available: Semaphore,
    evictions: AtomicU64,
    dial_failures: AtomicU64,
}

impl ConnectionPool<TcpDialer> {
    /// Build a TCP pool from the `[pool]` config section.
    pub async fn from_settings(settings: &PoolSettings) -> Result<Self> {
        let dialer = TcpDialer::new(Duration::from_millis(settings.connect_timeout_ms));
        Self::connect(
            dialer,
            settings.address.clone(),
            settings.size,
            Duration::from_secs(settings.ttl_secs),
        )
        .await
    }
}

impl<D: Dialer> ConnectionPool<D> {
    /// Dial `size` connections to `address` and build the pool.
    ///
    /// Slots are dialed one after another with ids `0..size`. If any dial
    /// fails, the connections opened so far are closed and the dial error
    /// is returned; no partial pool is produced.
    pub async fn connect(
        dialer: D,
        address: impl Into<String>,
        size: usize,
        ttl: Duration,
    ) -> Result<Self> {
        let address = address.into();

        if size == 0 {
            return Err(TtlPoolError::Config(
                "pool size must be greater than 0".to_string(),
            ));
        }
        if ttl.is_zero() {
            return Err(TtlPoolError::Config(
                "connection TTL must be greater than 0".to_string(),
            ));
        }

        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let mut resting = VecDeque::with_capacity(size);

        for slot in 0..size {
            match dialer.dial(&address).await {
                Ok(stream) => {
                    trace!("Dialed slot {} to {}", slot, address);
                    resting.push_back(Slot::Live(Connection::new(slot, id, &address, stream)));
                }
                Err(e) => {
                    warn!(
                        "Failed to dial slot {} of {} to {}: {}",
                        slot, size, address, e
                    );
                    for dialed in resting {
                        if let Slot::Live(conn) = dialed {
                            close_quietly(conn).await;
                        }
                    }
                    return Err(TtlPoolError::dial(&address, e));
                }
            }
        }

        debug!(
            "Connection pool to {} ready ({} connections, ttl {:?})",
            address, size, ttl
        );

        Ok(Self {
            id,
            dialer,
            address,
            capacity: size,
            ttl,
            state: Mutex::new(PoolState {
                resting,
                checked_out: HashSet::with_capacity(size),
                closed: false,
            }),
            available: Semaphore::new(size),
            evictions: AtomicU64::new(0),
            dial_failures: AtomicU64::new(0),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Borrow a connection, waiting until one is at rest.
    ///
    /// The connection must come back through [`release`](Self::release).
    /// Dropping it instead closes the stream but the slot stays checked out,
    /// so the pool permanently runs one connection short.
    ///
    /// Stale connections are replaced before being handed out. If the
    /// replacement dial fails the slot stays in the pool as vacant and the
    /// dial error is returned; a later acquire of that slot dials again.
    /// Fails with [`TtlPoolError::PoolClosed`] once the pool is shut down,
    /// including for callers already waiting.
    pub async fn acquire(&self) -> Result<Connection<D::Stream>> {
        let permit = self
            .available
            .acquire()
            .await
            .map_err(|_| TtlPoolError::PoolClosed)?;

        let slot = self.take_slot(permit)?;
        self.checkout(slot).await
    }

    /// Like [`acquire`](Self::acquire) but returns `Ok(None)` instead of
    /// waiting when every connection is checked out.
    pub async fn try_acquire(&self) -> Result<Option<Connection<D::Stream>>> {
        let permit = match self.available.try_acquire() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Ok(None),
            Err(TryAcquireError::Closed) => return Err(TtlPoolError::PoolClosed),
        };

        let slot = self.take_slot(permit)?;
        self.checkout(slot).await.map(Some)
    }

    /// Hand a borrowed connection back to the pool.
    ///
    /// A connection dialed by a different pool is rejected with
    /// [`TtlPoolError::ForeignConnection`]; it comes back inside the
    /// [`ReleaseError`] untouched so it can be released to its own pool.
    /// After shutdown, released connections are closed instead of queued.
    pub async fn release(
        &self,
        conn: Connection<D::Stream>,
    ) -> std::result::Result<(), ReleaseError<D::Stream>> {
        let id = conn.id();

        if conn.pool_id() != self.id {
            warn!(
                "Rejected release of connection {} to {}: not owned by this pool",
                id,
                conn.address()
            );
            return Err(ReleaseError {
                error: TtlPoolError::ForeignConnection { id },
                connection: conn,
            });
        }

        let leftover = {
            let mut state = self.state.lock();
            state.checked_out.remove(&id);
            if state.closed {
                Some(conn)
            } else {
                state.resting.push_back(Slot::Live(conn));
                None
            }
        };

        match leftover {
            Some(conn) => {
                debug!("Pool to {} is closed, closing returned connection {}", self.address, id);
                close_quietly(conn).await;
            }
            None => {
                self.available.add_permits(1);
                trace!("Connection {} returned to pool for {}", id, self.address);
            }
        }

        Ok(())
    }

    /// Close the pool.
    ///
    /// Wakes every waiting `acquire` with [`TtlPoolError::PoolClosed`],
    /// closes all connections at rest and returns how many were closed.
    /// Connections still checked out are closed when released. Calling it
    /// again is a no-op.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Slot<D::Stream>> = {
            let mut state = self.state.lock();
            if state.closed {
                return 0;
            }
            state.closed = true;
            self.available.close();
            state.resting.drain(..).collect()
        };

        let mut closed = 0;
        for slot in drained {
            if let Slot::Live(conn) = slot {
                close_quietly(conn).await;
                closed += 1;
            }
        }

        let checked_out = self.state.lock().checked_out.len();
        if checked_out > 0 {
            warn!(
                "Connection pool to {} shut down with {} connections checked out; \
                 they are closed when released, unreleased ones were dropped by their borrower",
                self.address, checked_out
            );
        }
        info!(
            "Connection pool to {} shut down ({} closed, {} still checked out)",
            self.address, closed, checked_out
        );

        closed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let vacant = state
            .resting
            .iter()
            .filter(|slot| matches!(slot, Slot::Vacant(_)))
            .count();

        PoolStats {
            capacity: self.capacity,
            idle: state.resting.len() - vacant,
            vacant,
            checked_out: state.checked_out.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            closed: state.closed,
        }
    }

    /// Pop the front slot for a permit and mark it checked out.
    fn take_slot(&self, permit: SemaphorePermit<'_>) -> Result<Slot<D::Stream>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TtlPoolError::PoolClosed);
        }

        let slot = state.resting.pop_front().ok_or(TtlPoolError::PoolClosed)?;
        let id = match &slot {
            Slot::Live(conn) => conn.id(),
            Slot::Vacant(id) => *id,
        };
        state.checked_out.insert(id);
        permit.forget();

        Ok(slot)
    }

    async fn checkout(&self, slot: Slot<D::Stream>) -> Result<Connection<D::Stream>> {
        let id = match slot {
            Slot::Live(conn) if !conn.is_stale(self.ttl) => {
                trace!("Acquired connection {} to {}", conn.id(), self.address);
                return Ok(conn);
            }
            Slot::Live(conn) => {
                let id = conn.id();
                debug!(
                    "Connection {} to {} idle for {:?} (ttl {:?}), replacing",
                    id,
                    self.address,
                    conn.idle_for(),
                    self.ttl
                );
                self.evictions.fetch_add(1, Ordering::Relaxed);
                // Slot goes back as vacant if we bail out below or are cancelled.
                let guard = VacancyGuard::new(self, id);
                close_quietly(conn).await;
                return self.redial(guard).await;
            }
            Slot::Vacant(id) => id,
        };

        debug!("Redialing vacant slot {} to {}", id, self.address);
        self.redial(VacancyGuard::new(self, id)).await
    }

    async fn redial(&self, guard: VacancyGuard<'_, D>) -> Result<Connection<D::Stream>> {
        let id = guard.id;
        match self.dialer.dial(&self.address).await {
            Ok(stream) => {
                guard.disarm();
                trace!("Replacement for slot {} to {} dialed", id, self.address);
                Ok(Connection::new(id, self.id, &self.address, stream))
            }
            Err(e) => {
                self.dial_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Failed to redial slot {} to {}: {}",
                    id, self.address, e
                );
                Err(TtlPoolError::dial(&self.address, e))
            }
        }
    }

    fn restore_vacant(&self, id: usize) {
        {
            let mut state = self.state.lock();
            state.checked_out.remove(&id);
            if state.closed {
                return;
            }
            state.resting.push_back(Slot::Vacant(id));
        }
        self.available.add_permits(1);
    }
}

/// Puts a slot back as vacant unless disarmed.
struct VacancyGuard<'a, D: Dialer> {
    pool: &'a ConnectionPool<D>,
    id: usize,
    armed: bool,
}

impl<'a, D: Dialer> VacancyGuard<'a, D> {
    fn new(pool: &'a ConnectionPool<D>, id: usize) -> Self {
        Self {
            pool,
            id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<D: Dialer> Drop for VacancyGuard<'_, D> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.restore_vacant(self.id);
        }
    }
}

async fn close_quietly<S>(conn: Connection<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let id = conn.id();
    if let Err(e) = conn.close().await {
        warn!("Failed to close connection {}: {}", id, e);
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    /// Live connections at rest
    pub idle: usize,
    /// Slots at rest waiting to be redialed
    pub vacant: usize,
    pub checked_out: usize,
    /// Stale connections replaced so far
    pub evictions: u64,
    /// Replacement dials that failed
    pub dial_failures: u64,
    pub closed: bool,
}
