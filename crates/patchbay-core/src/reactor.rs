//! Descriptor reactor
//!
//! One iteration waits for readiness on every managed descriptor (bounded by
//! the smallest backend interval), lets each backend process its input and
//! then drains the event queue. The readiness primitive is tokio's `AsyncFd`
//! on whatever runtime drives the engine; the engine itself is meant to run
//! on a current-thread runtime so all backend callbacks share one thread.

use futures::future::poll_fn;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Poll;
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineState};
use crate::error::Result;
use crate::events::DrainReport;
use crate::fd::{FdTable, ManagedFd};

/// Readiness registrations for the live descriptor table entries
#[derive(Default)]
pub(crate) struct Selector {
    registered: Vec<(ManagedFd, AsyncFd<RawFd>)>,
}

impl Selector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Re-register every live entry of `table`
    pub(crate) fn rebuild(&mut self, table: &FdTable) {
        // old registrations must be gone before a descriptor is registered again
        self.registered.clear();

        for entry in table.entries() {
            match AsyncFd::with_interest(entry.fd, Interest::READABLE) {
                Ok(registration) => self.registered.push((*entry, registration)),
                Err(e) => warn!("Skipping descriptor {} of {}: {}", entry.fd, entry.backend, e),
            }
        }
        debug!("Built readiness set from {} descriptors", self.registered.len());
    }

    pub(crate) fn len(&self) -> usize {
        self.registered.len()
    }

    pub(crate) fn clear(&mut self) {
        self.registered.clear();
    }

    /// Wait up to `timeout` for any descriptor to become readable.
    ///
    /// Readiness is level-triggered: a descriptor with unread input is
    /// reported again on every call until it has been drained.
    pub(crate) async fn wait(&self, timeout: Duration) -> Result<Vec<ManagedFd>> {
        if self.registered.is_empty() {
            debug!("No descriptors, sleeping for {:?}", timeout);
            tokio::time::sleep(timeout).await;
            return Ok(Vec::new());
        }

        let ready = poll_fn(|cx| {
            let mut signaled = Vec::new();
            for (entry, registration) in &self.registered {
                loop {
                    match registration.poll_read_ready(cx) {
                        Poll::Ready(Ok(mut guard)) => {
                            if is_readable(entry.fd) {
                                signaled.push(*entry);
                                break;
                            }
                            // consumed since the last event; re-arm the waker
                            guard.clear_ready();
                        }
                        Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                        Poll::Pending => break,
                    }
                }
            }

            if signaled.is_empty() {
                Poll::Pending
            } else {
                Poll::Ready(Ok(signaled))
            }
        });

        match tokio::time::timeout(timeout, ready).await {
            Ok(result) => Ok(result?),
            Err(_) => Ok(Vec::new()),
        }
    }
}

/// Whether `fd` would not block on read right now
fn is_readable(fd: RawFd) -> bool {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pollfd` is a single valid entry and the call does not block
    let ready = unsafe { libc::poll(&mut pollfd, 1, 0) };
    ready > 0 && pollfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0
}

impl Engine {
    /// Run one reactor iteration: wait, process input, drain events
    pub async fn iteration(&mut self) -> Result<DrainReport> {
        if self.core.fds.is_dirty() {
            self.selector.rebuild(&self.core.fds);
            self.core.fds.mark_clean();
        }

        let timeout = self.backend_timeout();
        let mut signaled = self.selector.wait(timeout).await?;
        self.core.update_timestamp();

        debug!("{} backend descriptors signaled", signaled.len());
        self.process_backends(&mut signaled)?;

        self.drain()
    }

    /// Iterate until `shutdown` is set. The flag is only checked between iterations.
    ///
    /// Starts the engine first if it is still configuring.
    pub async fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        if self.state() == EngineState::Configuring {
            self.start()?;
        }

        info!(
            "Entering reactor loop with {} managed descriptors",
            self.core.fds.len()
        );
        while !shutdown.load(Ordering::SeqCst) {
            self.iteration().await?;
        }

        info!("Shutdown requested, leaving reactor loop");
        Ok(())
    }

    /// Descriptors currently registered with the readiness primitive
    pub fn registered_descriptors(&self) -> usize {
        self.selector.len()
    }
}
