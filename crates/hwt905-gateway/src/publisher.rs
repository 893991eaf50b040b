//! TCP snapshot responder
//!
//! Every accepted connection receives one JSON line with the latest
//! measurement record, then the connection is closed.

use hwt905_protocol::MeasurementRecord;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Pause after a failed accept (e.g. EMFILE) before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// One published line
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    /// Gateway process id
    pub pid: u32,
    /// Connections answered so far, this one included
    pub message: u64,
    pub record: &'a MeasurementRecord,
}

/// Render the line sent to a client
pub fn snapshot_line(record: &MeasurementRecord, message: u64) -> Result<String, serde_json::Error> {
    let snapshot = Snapshot {
        pid: std::process::id(),
        message,
        record,
    };
    let mut line = serde_json::to_string(&snapshot)?;
    line.push('\n');
    Ok(line)
}

/// Answer connections on `listener` until the task is aborted
pub async fn serve(
    listener: TcpListener,
    records: watch::Receiver<MeasurementRecord>,
) -> std::io::Result<()> {
    info!("Serving HWT905 snapshots on {}", listener.local_addr()?);
    let mut message = 0u64;

    loop {
        let (mut socket, peer) = accept_retrying(|| listener.accept()).await;
        message += 1;

        let line = {
            let record = records.borrow();
            snapshot_line(&record, message)
        };
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode snapshot: {}", e);
                continue;
            }
        };

        tokio::spawn(async move {
            if let Err(e) = socket.write_all(line.as_bytes()).await {
                warn!("Failed to send snapshot to {}: {}", peer, e);
                return;
            }
            let _ = socket.shutdown().await;
            debug!("Sent snapshot {} to {}", message, peer);
        });
    }
}

/// Await `accept` until it succeeds, logging and backing off on each error
async fn accept_retrying<F, Fut, C>(mut accept: F) -> C
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<C>>,
{
    loop {
        match accept().await {
            Ok(connection) => return connection,
            Err(e) => {
                warn!("Failed to accept snapshot client: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    #[test]
    fn test_snapshot_line() {
        let mut record = MeasurementRecord::new();
        record.magnetic = [1, 2, 3];
        let line = snapshot_line(&record, 7).unwrap();

        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["message"], 7);
        assert_eq!(value["record"]["magnetic"], serde_json::json!([1, 2, 3]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_errors_are_retried() {
        let mut failures = 2;
        let started = tokio::time::Instant::now();

        let connection = accept_retrying(|| {
            let result = if failures > 0 {
                failures -= 1;
                Err(std::io::Error::from_raw_os_error(24))
            } else {
                Ok(42)
            };
            async move { result }
        })
        .await;

        assert_eq!(connection, 42);
        assert_eq!(failures, 0);
        assert!(started.elapsed() >= ACCEPT_BACKOFF * 2);
    }

    #[tokio::test]
    async fn test_each_connection_gets_latest_record() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(MeasurementRecord::new());
        let server = tokio::spawn(serve(listener, rx));

        let mut first = String::new();
        TcpStream::connect(addr)
            .await
            .unwrap()
            .read_to_string(&mut first)
            .await
            .unwrap();

        let mut record = MeasurementRecord::new();
        record.temperature = 24.5;
        tx.send_replace(record);

        let mut second = String::new();
        TcpStream::connect(addr)
            .await
            .unwrap()
            .read_to_string(&mut second)
            .await
            .unwrap();
        server.abort();

        let first: serde_json::Value = serde_json::from_str(first.trim_end()).unwrap();
        let second: serde_json::Value = serde_json::from_str(second.trim_end()).unwrap();
        assert_eq!(first["message"], 1);
        assert_eq!(first["record"]["temperature"], 0.0);
        assert_eq!(second["message"], 2);
        assert_eq!(second["record"]["temperature"], 24.5);
    }
}
