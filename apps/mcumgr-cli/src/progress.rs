//! Terminal progress line for a running transfer.

use std::io::Write;
use std::time::Duration;

use mcumgr_transfer::TransferProgress;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Updates buffered between the engine and the printer.
const CHANNEL_SIZE: usize = 64;

/// Spawns a printer and returns the sender to hand to the engine.
///
/// The printer redraws at most once per `interval` and exits after the
/// sender side is dropped.
pub fn spawn(label: String, interval: Duration) -> (mpsc::Sender<TransferProgress>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<TransferProgress>(CHANNEL_SIZE);
    let handle = tokio::spawn(async move {
        let mut last_draw: Option<Instant> = None;
        let mut latest = None;
        while let Some(progress) = rx.recv().await {
            latest = Some(progress);
            if last_draw.is_some_and(|t| t.elapsed() < interval) && !progress.is_complete() {
                continue;
            }
            draw(&label, &progress);
            last_draw = Some(Instant::now());
        }
        if let Some(progress) = latest {
            draw(&label, &progress);
            eprintln!();
        }
    });
    (tx, handle)
}

fn draw(label: &str, progress: &TransferProgress) {
    let mut stderr = std::io::stderr().lock();
    let _ = write!(
        stderr,
        "\r{label}: {:5.1}% {}/{} {}/s {}   ",
        progress.fraction() * 100.0,
        format_bytes(progress.transferred),
        format_bytes(progress.total),
        format_bytes(progress.bytes_per_second as u64),
        format_eta(progress.eta()),
    );
    let _ = stderr.flush();
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) => {
            let secs = eta.as_secs();
            format!("eta {}:{:02}", secs / 60, secs % 60)
        }
        None => "eta --:--".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn eta_formatting() {
        assert_eq!(format_eta(None), "eta --:--");
        assert_eq!(format_eta(Some(Duration::from_secs(75))), "eta 1:15");
        assert_eq!(format_eta(Some(Duration::from_millis(400))), "eta 0:00");
    }

    #[tokio::test]
    async fn printer_exits_when_sender_drops() {
        let (tx, handle) = spawn("test".into(), Duration::from_millis(10));
        tx.send(TransferProgress {
            offset: 10,
            transferred: 10,
            total: 10,
            bytes_per_second: 0.0,
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
