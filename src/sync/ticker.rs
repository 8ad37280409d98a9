//! Flush Ticker: Background thread that paces the sync loop.
//!
//! Debounced updates only go out when the owner of the adapter calls
//! `pump`. The ticker sends a [`FlushTick`] at a fixed interval so a host
//! without its own frame loop can drive that call with `select!`.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A flush signal.
#[derive(Debug, Clone, Copy)]
pub struct FlushTick {
    /// Tick number, starting at 0.
    pub sequence: u64,
    /// When the tick was emitted; pass it to `pump`.
    pub at: Instant,
}

/// Thread emitting [`FlushTick`]s.
pub struct FlushTicker {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    tick_rx: Receiver<FlushTick>,
}

impl FlushTicker {
    /// Spawn a ticker firing every `interval`.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS fails to spawn the thread.
    pub fn spawn(interval: Duration) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        // One tick of slack; a slow consumer skips ticks instead of queueing them.
        let (tick_tx, tick_rx) = bounded(1);

        let handle = thread::Builder::new()
            .name("rowstack-flush".to_string())
            .spawn(move || run_loop(&tick_tx, &flag, interval))?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            tick_rx,
        })
    }

    /// The tick receiver.
    #[inline]
    pub const fn receiver(&self) -> &Receiver<FlushTick> {
        &self.tick_rx
    }

    /// Ask the thread to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Stop the thread and wait for it.
    pub fn join(mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FlushTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(tick_tx: &Sender<FlushTick>, shutdown: &AtomicBool, interval: Duration) {
    let mut sequence = 0u64;
    let mut next = Instant::now() + interval;

    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now < next {
            thread::sleep((next - now).min(Duration::from_millis(5)));
            continue;
        }

        match tick_tx.try_send(FlushTick { sequence, at: now }) {
            Ok(()) => sequence += 1,
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }

        next += interval;
        if next < now {
            next = now + interval;
        }
    }
}
