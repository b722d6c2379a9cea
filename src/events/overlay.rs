use crossbeam_channel::{Receiver, Sender, unbounded};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

use crate::error::{OverlayError, Result};

/// Messages sent *to* the main loop from helper threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayEvent {
    /// The animation thread wants the bar redrawn.
    Redraw,
    /// The config file changed on disk.
    ReloadConfig,
    /// Fullscreen detection changed state.
    FullscreenChanged(bool),
    /// SIGINT or SIGTERM arrived.
    Shutdown,
}

/// Non-blocking eventfd the main loop polls next to the Wayland socket, so
/// a posted event interrupts its wait.
#[derive(Debug)]
pub struct EventWaker {
    fd: OwnedFd,
}

impl EventWaker {
    pub fn new() -> Result<Self> {
        // SAFETY: plain syscall; the fd is owned right after the check.
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(OverlayError::thread(format!(
                "eventfd failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        // SAFETY: `fd` is a fresh descriptor nobody else owns.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    pub fn wake(&self) {
        let one: u64 = 1;
        // SAFETY: writes 8 bytes from a live u64. A full counter (EAGAIN)
        // already means "awake".
        unsafe {
            libc::write(self.fd.as_raw_fd(), (&one as *const u64).cast(), 8);
        }
    }

    /// Reset the counter after a wakeup.
    pub fn drain(&self) {
        let mut value: u64 = 0;
        // SAFETY: reads 8 bytes into a live u64; EAGAIN when not signalled.
        unsafe {
            libc::read(self.fd.as_raw_fd(), (&mut value as *mut u64).cast(), 8);
        }
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Cloneable sending half used by helper threads.
#[derive(Debug, Clone)]
pub struct OverlaySender {
    tx: Sender<OverlayEvent>,
    waker: Option<Arc<EventWaker>>,
}

impl OverlaySender {
    pub fn new(tx: Sender<OverlayEvent>, waker: Option<Arc<EventWaker>>) -> Self {
        Self { tx, waker }
    }

    /// Post `event` and wake the main loop. False once the loop is gone.
    pub fn send(&self, event: OverlayEvent) -> bool {
        let sent = self.tx.send(event).is_ok();
        if sent && let Some(waker) = &self.waker {
            waker.wake();
        }
        sent
    }
}

/// Channel without a waker, for loops that poll the receiver themselves.
pub fn overlay_channel() -> (OverlaySender, Receiver<OverlayEvent>) {
    let (tx, rx) = unbounded();
    (OverlaySender::new(tx, None), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_delivers_and_wakes() {
        let waker = Arc::new(EventWaker::new().unwrap());
        let (tx, rx) = unbounded();
        let sender = OverlaySender::new(tx, Some(Arc::clone(&waker)));
        assert!(sender.send(OverlayEvent::Redraw));
        assert_eq!(rx.try_recv().unwrap(), OverlayEvent::Redraw);

        let mut pfd = libc::pollfd {
            fd: waker.raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: one valid pollfd.
        assert_eq!(unsafe { libc::poll(&mut pfd, 1, 0) }, 1);
        waker.drain();
        pfd.revents = 0;
        // SAFETY: as above.
        assert_eq!(unsafe { libc::poll(&mut pfd, 1, 0) }, 0);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (sender, rx) = overlay_channel();
        drop(rx);
        assert!(!sender.send(OverlayEvent::Shutdown));
    }
}
