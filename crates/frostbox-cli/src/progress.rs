//! Byte-counter progress reporting.
//!
//! The transfer loops only bump an atomic counter; a background task polls
//! it into an indicatif bar. Keeps the hot path free of terminal writes and
//! the bar free of transfer-layer plumbing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::oneshot;

pub struct Observer {
    stop: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl Observer {
    /// Stop polling, draw the final position and clear the bar.
    pub async fn finish(self) {
        let _ = self.stop.send(());
        let _ = self.handle.await;
    }
}

/// Spawn a task that mirrors `counter` into a progress bar until
/// [`Observer::finish`] is called.
pub fn spawn_observer(counter: Arc<AtomicU64>, total: u64, prefix: &str) -> Observer {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
        )
        .unwrap()
        .progress_chars("=>-"),
    );
    bar.set_prefix(prefix.to_string());

    let (stop, mut rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(500));
        loop {
            tokio::select! {
                _ = &mut rx => {
                    bar.set_position(counter.load(Ordering::Relaxed));
                    bar.finish_and_clear();
                    break;
                }
                _ = tick.tick() => {
                    bar.set_position(counter.load(Ordering::Relaxed));
                }
            }
        }
    });

    Observer { stop, handle }
}
