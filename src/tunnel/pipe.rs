//! Bidirectional byte pipe for established tunnels.
//!
//! # Data Flow
//! ```text
//! client ──read──▶ [16 KiB] ──write──▶ origin     (task 1)
//! client ◀─write── [16 KiB] ◀──read─── origin     (task 2)
//! ```
//!
//! # Design Decisions
//! - Two tasks per tunnel so neither direction starves the other
//! - A direction reads again only after its previous write completed,
//!   which back-pressures the faster side
//! - When a direction ends it shuts down the side it was writing, drops the
//!   side it was reading, and cancels the session so the other task stops
//!   within one read/write cycle
//! - Contents are never inspected

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;
use crate::tunnel::session::{TunnelSession, TunnelStats};

/// In-flight buffer per direction.
pub const BUFFER_SIZE: usize = 16 * 1024;

/// Upper bound on flushing/closing a write side once a direction is done.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ClientToOrigin,
    OriginToClient,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::ClientToOrigin => "client_to_origin",
            Direction::OriginToClient => "origin_to_client",
        }
    }
}

/// Last time either direction moved bytes.
#[derive(Debug)]
struct Activity {
    started: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_ms.store(now, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }
}

/// Move bytes both ways until either side closes, then close both.
pub async fn run<C, O>(session: TunnelSession<C, O>, idle_timeout: Duration) -> TunnelStats
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    O: AsyncRead + AsyncWrite + Send + 'static,
{
    let TunnelSession {
        client,
        origin,
        target,
        peer,
    } = session;

    let (client_read, client_write) = tokio::io::split(client);
    let (origin_read, origin_write) = tokio::io::split(origin);
    let closed = CancellationToken::new();
    let activity = Arc::new(Activity::new());

    let upstream = tokio::spawn(copy_direction(
        Direction::ClientToOrigin,
        client_read,
        origin_write,
        closed.clone(),
        activity.clone(),
        idle_timeout,
    ));
    let downstream = tokio::spawn(copy_direction(
        Direction::OriginToClient,
        origin_read,
        client_write,
        closed,
        activity,
        idle_timeout,
    ));

    let (up, down) = tokio::join!(upstream, downstream);
    let stats = TunnelStats {
        client_to_origin: up.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Tunnel task panicked");
            0
        }),
        origin_to_client: down.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Tunnel task panicked");
            0
        }),
    };

    metrics::record_tunnel_bytes(stats.client_to_origin, stats.origin_to_client);
    tracing::info!(
        authority = %target,
        peer = %peer,
        client_to_origin = stats.client_to_origin,
        origin_to_client = stats.origin_to_client,
        "Tunnel closed"
    );
    stats
}

async fn copy_direction<R, W>(
    direction: Direction,
    mut reader: R,
    mut writer: W,
    closed: CancellationToken,
    activity: Arc<Activity>,
    idle_timeout: Duration,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut copied = 0u64;

    let outcome = tokio::select! {
        result = pump(&mut reader, &mut writer, &mut copied, &activity, idle_timeout) => result,
        _ = closed.cancelled() => Ok(()),
    };

    if let Err(e) = outcome {
        tracing::warn!(direction = direction.as_str(), error = %e, "Tunnel direction failed");
    }

    closed.cancel();
    match tokio::time::timeout(CLOSE_TIMEOUT, writer.shutdown()).await {
        Ok(Err(e)) => {
            tracing::debug!(direction = direction.as_str(), error = %e, "Shutdown of write side failed")
        }
        Err(_) => tracing::debug!(direction = direction.as_str(), "Shutdown of write side timed out"),
        Ok(Ok(())) => {}
    }
    drop(reader);
    drop(writer);

    tracing::debug!(direction = direction.as_str(), bytes = copied, "Tunnel direction finished");
    copied
}

async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    copied: &mut u64,
    activity: &Activity,
    idle_timeout: Duration,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let n = match tokio::time::timeout(idle_timeout, reader.read(&mut buf)).await {
            Ok(read) => read?,
            Err(_) => {
                // Only give up when the other direction has been quiet too.
                if activity.idle_for() >= idle_timeout {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "tunnel idle timeout"));
                }
                continue;
            }
        };
        if n == 0 {
            return Ok(());
        }

        activity.touch();
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *copied += n as u64;
        activity.touch();
    }
}
