//! Readiness bridge
//!
//! Reduces the capture handle's OS-level readiness primitive to a payload-free
//! "please pump" wake on the host's execution context. Two depictions exist:
//!
//! - Descriptor poll: the handle's selectable descriptor is registered with
//!   the host reactor for readable interest; the pump then runs synchronously
//!   on the host task, no cross-thread hop.
//! - Wait object: a background wait thread observes the handle's signal and
//!   posts a wake through a bounded channel onto the host task. The channel
//!   holds at most one pending wake, so re-signalling while a wake is queued
//!   coalesces instead of double-delivering. A wait timeout re-arms silently.
//!
//! Either way the signal itself does no session work; the pump checks session
//! state before touching the handle, so a wake that was already queued when
//! the bridge shut down is ignored harmlessly.

#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use packetpump_core::Result;
#[cfg(unix)]
use tokio::io::unix::AsyncFd;
#[cfg(unix)]
use tokio::io::Interest;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Result of one observation of a wait object.
pub(crate) enum WaitOutcome {
    /// The handle signalled readiness
    Ready,
    /// The wait timed out; benign, re-arm
    Timeout,
    /// The wait object is gone; stop observing
    Gone,
}

#[cfg(unix)]
struct PollTarget(RawFd);

#[cfg(unix)]
impl AsRawFd for PollTarget {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// One registered readiness observer feeding pump wakes to a session task.
pub(crate) enum ReadinessBridge {
    #[cfg(unix)]
    Poll(AsyncFd<PollTarget>),
    Wake(WaitObjectBridge),
}

pub(crate) struct WaitObjectBridge {
    rx: mpsc::Receiver<()>,
    stop: Arc<AtomicBool>,
}

impl ReadinessBridge {
    /// Register the handle's selectable descriptor with the host reactor.
    ///
    /// Must be called from within the host runtime.
    #[cfg(unix)]
    pub(crate) fn poll(fd: RawFd) -> Result<Self> {
        let afd = AsyncFd::with_interest(PollTarget(fd), Interest::READABLE)?;
        debug!(fd, "registered capture descriptor with the host reactor");
        Ok(ReadinessBridge::Poll(afd))
    }

    /// Register a background wait against the handle's wait primitive.
    ///
    /// `wait` runs on a dedicated thread and is reduced to channel sends; it
    /// must never touch session state.
    pub(crate) fn wait_object<W>(mut wait: W) -> Result<Self>
    where
        W: FnMut() -> WaitOutcome + Send + 'static,
    {
        // Capacity 1: a second signal while a wake is already queued is
        // coalesced, never double-delivered.
        let (tx, rx) = mpsc::channel(1);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        std::thread::Builder::new()
            .name("packetpump-wait".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::Acquire) {
                    match wait() {
                        WaitOutcome::Timeout => continue,
                        WaitOutcome::Gone => break,
                        WaitOutcome::Ready => {
                            // Blocks while a wake is still queued, pacing the
                            // signal to the host's consumption.
                            if tx.blocking_send(()).is_err() {
                                break;
                            }
                        }
                    }
                }
                trace!("wait thread exited");
            })?;

        debug!("registered wait-object readiness bridge");
        Ok(ReadinessBridge::Wake(WaitObjectBridge { rx, stop }))
    }

    /// An always-ready wait object, used for offline sources whose handle is
    /// readable until exhausted.
    pub(crate) fn always_ready() -> Result<Self> {
        Self::wait_object(|| WaitOutcome::Ready)
    }

    /// Wait for the next readiness wake.
    ///
    /// Returns `false` when the bridge can produce no further wakes.
    pub(crate) async fn wake(&mut self) -> bool {
        match self {
            #[cfg(unix)]
            ReadinessBridge::Poll(afd) => match afd.readable().await {
                Ok(mut guard) => {
                    // The pump drains the handle until empty, so readiness is
                    // cleared up front without losing frames.
                    guard.clear_ready();
                    true
                }
                Err(_) => false,
            },
            ReadinessBridge::Wake(bridge) => bridge.rx.recv().await.is_some(),
        }
    }

    /// Stop producing wakes. Wakes already queued on the host context may
    /// still be observed once and must be ignored via the session state check.
    pub(crate) fn shutdown(&mut self) {
        if let ReadinessBridge::Wake(bridge) = self {
            bridge.stop.store(true, Ordering::Release);
            bridge.rx.close();
        }
        // The poll variant deregisters when the AsyncFd drops.
    }
}

impl Drop for WaitObjectBridge {
    fn drop(&mut self) {
        // Unblocks a sender parked in blocking_send so the thread can exit.
        self.stop.store(true, Ordering::Release);
        self.rx.close();
    }
}
