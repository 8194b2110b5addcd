use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// Something that can open a byte stream to an address.
///
/// The pool only ever dials, reads, writes and shuts streams down, so any
/// `AsyncRead + AsyncWrite` transport can sit behind it.
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn dial(&self, address: &str) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Plain TCP dialer with a bounded connect time.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl TcpDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(Duration::from_millis(5000))
    }
}

impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, address: &str) -> io::Result<TcpStream> {
        let stream = match timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "Connection to {} timed out after {:?}",
                        address, self.connect_timeout
                    ),
                ))
            }
        };

        stream.set_nodelay(true)?;
        trace!("Dialed {} (local {:?})", address, stream.local_addr().ok());
        Ok(stream)
    }
}
