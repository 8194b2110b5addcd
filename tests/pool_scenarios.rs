/// Connection Pool Scenario Tests
///
/// End-to-end acquire/release/eviction behaviour against loopback TCP servers
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use ttlpool::{ConnectionPool, Dialer, TcpDialer, TtlPoolError};

#[derive(Default)]
struct ServerCounters {
    accepted: AtomicUsize,
    closed: AtomicUsize,
}

/// Spawn a sink server that counts accepted and peer-closed connections
async fn spawn_counting_server() -> (SocketAddr, Arc<ServerCounters>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let counters = Arc::new(ServerCounters::default());

    let server_counters = counters.clone();
    tokio::spawn(async move {
        loop {
            if let Ok((mut socket, _)) = listener.accept().await {
                server_counters.accepted.fetch_add(1, Ordering::SeqCst);
                let counters = server_counters.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    while let Ok(n) = socket.read(&mut buf).await {
                        if n == 0 {
                            break;
                        }
                    }
                    counters.closed.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
    });

    (addr, counters)
}

async fn wait_for(counter: &AtomicUsize, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while counter.load(Ordering::SeqCst) < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "counter stuck at {} (expected {})",
            counter.load(Ordering::SeqCst),
            expected
        )
    });
}

#[tokio::test]
async fn construct_dials_all_connections_eagerly() {
    let (addr, counters) = spawn_counting_server().await;

    let pool = ConnectionPool::connect(
        TcpDialer::default(),
        addr.to_string(),
        3,
        Duration::from_secs(3),
    )
    .await
    .unwrap();

    wait_for(&counters.accepted, 3).await;

    let stats = pool.stats();
    assert_eq!(stats.capacity, 3);
    assert_eq!(stats.idle, 3);
    assert_eq!(stats.checked_out, 0);

    let mut held = Vec::new();
    for expected_id in 0..3 {
        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.id(), expected_id);
        assert!(conn.idle_for() < Duration::from_secs(1));
        held.push(conn);
    }

    // No replacements happened
    assert_eq!(counters.accepted.load(Ordering::SeqCst), 3);
    assert_eq!(pool.stats().evictions, 0);
}

#[tokio::test]
async fn acquire_after_construct_returns_fresh_connection() {
    let (addr, counters) = spawn_counting_server().await;
    let ttl = Duration::from_secs(3);

    let pool = ConnectionPool::connect(TcpDialer::default(), addr.to_string(), 3, ttl)
        .await
        .unwrap();

    let conn = pool.acquire().await.unwrap();
    assert!(conn.idle_for() < ttl);
    assert!(!conn.is_stale(ttl));

    pool.release(conn).await.unwrap();
    wait_for(&counters.accepted, 3).await;
    assert_eq!(pool.stats().evictions, 0);
}

#[tokio::test]
async fn idle_connection_is_replaced_with_same_identity() {
    let (addr, counters) = spawn_counting_server().await;
    let ttl = Duration::from_millis(200);

    let pool = ConnectionPool::connect(TcpDialer::default(), addr.to_string(), 1, ttl)
        .await
        .unwrap();

    let conn = pool.acquire().await.unwrap();
    assert_eq!(conn.id(), 0);
    pool.release(conn).await.unwrap();

    tokio::time::sleep(ttl + Duration::from_millis(200)).await;

    let conn = pool.acquire().await.unwrap();
    assert_eq!(conn.id(), 0, "replacement keeps the slot identity");
    assert!(conn.idle_for() <= ttl, "replacement must be fresh");

    // Stale stream was closed and a new one dialed
    wait_for(&counters.accepted, 2).await;
    wait_for(&counters.closed, 1).await;

    let stats = pool.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.checked_out, 1);
}

#[tokio::test]
async fn construct_against_unreachable_address_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = ConnectionPool::connect(
        TcpDialer::default(),
        addr.to_string(),
        3,
        Duration::from_secs(3),
    )
    .await;

    match result {
        Err(TtlPoolError::Dial { address, source }) => {
            assert_eq!(address, addr.to_string());
            assert_eq!(source.kind(), io::ErrorKind::ConnectionRefused);
        }
        Err(e) => panic!("expected dial error, got {}", e),
        Ok(_) => panic!("pool should not be built"),
    }
}

/// TCP dialer that refuses once `budget` dials have succeeded
struct LimitedDialer {
    inner: TcpDialer,
    budget: AtomicUsize,
}

impl Dialer for LimitedDialer {
    type Stream = TcpStream;

    async fn dial(&self, address: &str) -> io::Result<TcpStream> {
        let remaining = self.budget.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "dial budget exhausted",
            ));
        }
        self.budget.store(remaining - 1, Ordering::SeqCst);
        self.inner.dial(address).await
    }
}

#[tokio::test]
async fn failed_construct_closes_earlier_connections() {
    let (addr, counters) = spawn_counting_server().await;
    let dialer = LimitedDialer {
        inner: TcpDialer::default(),
        budget: AtomicUsize::new(2),
    };

    let result =
        ConnectionPool::connect(dialer, addr.to_string(), 3, Duration::from_secs(3)).await;
    assert!(matches!(result, Err(TtlPoolError::Dial { .. })));

    // Both successful dials were closed, nothing left dangling
    wait_for(&counters.accepted, 2).await;
    wait_for(&counters.closed, 2).await;
}

#[tokio::test]
async fn second_acquire_blocks_until_release() {
    let (addr, _counters) = spawn_counting_server().await;

    let pool = Arc::new(
        ConnectionPool::connect(
            TcpDialer::default(),
            addr.to_string(),
            1,
            Duration::from_secs(3),
        )
        .await
        .unwrap(),
    );

    let first = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished(), "second acquire must wait");

    pool.release(first).await.unwrap();

    let second = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("release should wake the waiter")
        .unwrap()
        .unwrap();
    assert_eq!(second.id(), 0);
}

#[tokio::test]
async fn io_refreshes_last_activity() {
    let (addr, _counters) = spawn_counting_server().await;

    let pool = ConnectionPool::connect(
        TcpDialer::default(),
        addr.to_string(),
        1,
        Duration::from_secs(3),
    )
    .await
    .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let before = conn.last_activity();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let written = conn.write(b"hello from main\n").await.unwrap();
    assert_eq!(written, 16);
    assert!(conn.last_activity() > before);

    pool.release(conn).await.unwrap();
}
