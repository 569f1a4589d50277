//! Liveness watchdog for one session.
//!
//! The session loop marks the connection alive on every inbound frame or
//! pong. The watchdog samples (and clears) that mark once per interval and
//! gives up after enough silent samples to cover the configured timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::connection::ClientConnection;

/// Why the watchdog stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// No traffic for the whole timeout window.
    TimedOut,
    /// The session (or the server) stopped it.
    Cancelled,
}

/// Silent samples tolerated for a given sampling `interval` and `timeout`.
///
/// Never less than one; a timeout shorter than the interval means the first
/// silent sample ends the session.
pub fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let samples = timeout.as_millis() / interval.as_millis().max(1);
    u32::try_from(samples).unwrap_or(u32::MAX).max(1)
}

/// Sample `connection` every `interval` until it stays silent for `timeout`
/// or `cancel` fires.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let budget = max_missed(interval, timeout);
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut silent = 0_u32;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticker.tick() => {}
        }

        silent = if connection.check_alive() { 0 } else { silent + 1 };
        if silent >= budget {
            debug!(conn_id = %connection.id, silent, "no traffic within heartbeat timeout");
            return HeartbeatResult::TimedOut;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn quiet_connection() -> (Arc<ClientConnection>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(4);
        let conn = Arc::new(ClientConnection::new("conn_hb".into(), tx));
        // consume the initial mark so the first sample is silent
        let _ = conn.check_alive();
        (conn, rx)
    }

    #[test]
    fn budget_covers_timeout() {
        assert_eq!(max_missed(Duration::from_millis(250), Duration::from_millis(1000)), 4);
        assert_eq!(max_missed(Duration::from_secs(15), Duration::from_secs(45)), 3);
        assert_eq!(max_missed(Duration::from_secs(20), Duration::from_secs(5)), 1);
        assert_eq!(max_missed(Duration::ZERO, Duration::from_millis(3)), 3);
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let (conn, _rx) = quiet_connection();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result =
            run_heartbeat(conn, Duration::from_secs(60), Duration::from_secs(180), cancel).await;
        assert_eq!(result, HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_ends_the_session() {
        let (conn, _rx) = quiet_connection();
        let started = time::Instant::now();

        let result = run_heartbeat(
            conn,
            Duration::from_millis(100),
            Duration::from_millis(300),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(result, HeartbeatResult::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_keeps_the_session_open() {
        let (conn, _rx) = quiet_connection();
        let cancel = CancellationToken::new();
        let watchdog = tokio::spawn(run_heartbeat(
            Arc::clone(&conn),
            Duration::from_millis(200),
            Duration::from_millis(400),
            cancel.clone(),
        ));

        for _ in 0..12 {
            time::sleep(Duration::from_millis(150)).await;
            conn.mark_alive();
        }
        assert!(!watchdog.is_finished());

        cancel.cancel();
        assert_eq!(watchdog.await.unwrap(), HeartbeatResult::Cancelled);
    }
}
