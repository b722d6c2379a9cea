//! Key-press flags shared between the overlay and its input capture child.
//!
//! The flags live in an anonymous `MAP_SHARED` mapping created before the
//! child is forked, so both processes address the same physical page. The
//! child is the only writer of `last_key_code` and the only setter of
//! `any_key_pressed`; the animation thread reads and clears the flag. With a
//! single writer per field the atomics need no lock.
//!
//! [`SharedInputFlags`] owns the mapping and unmaps it on drop. It is
//! created once and reused across capture restarts.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::error::{OverlayError, Result};

#[repr(C)]
struct SharedRegion {
    any_key_pressed: AtomicBool,
    last_key_code: AtomicI32,
}

/// Owned handle to the shared flag page.
pub struct SharedInputFlags {
    region: NonNull<SharedRegion>,
    len: usize,
}

// SAFETY: the mapping is only accessed through atomics and stays valid until
// drop, which requires exclusive ownership.
unsafe impl Send for SharedInputFlags {}
unsafe impl Sync for SharedInputFlags {}

impl SharedInputFlags {
    /// Map a fresh zeroed region visible to future child processes.
    pub fn new() -> Result<Self> {
        let len = std::mem::size_of::<SharedRegion>();
        // SAFETY: anonymous mapping with no fd; the result is checked below.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(OverlayError::memory(format!(
                "mmap of shared input flags failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        let region = NonNull::new(ptr.cast::<SharedRegion>())
            .ok_or_else(|| OverlayError::memory("mmap returned null"))?;
        // Anonymous mappings are zero-filled, which is `false` / `0` for
        // both atomics.
        Ok(Self { region, len })
    }

    fn region(&self) -> &SharedRegion {
        // SAFETY: valid for the lifetime of `self`, see `new`.
        unsafe { self.region.as_ref() }
    }

    /// Publish a key-down: keycode first, then the flag, so a reader that
    /// sees the flag also sees the code.
    pub fn record_key_down(&self, keycode: i32) {
        let region = self.region();
        region.last_key_code.store(keycode, Ordering::Release);
        region.any_key_pressed.store(true, Ordering::Release);
    }

    /// Mark "a key was pressed" without touching the keycode.
    pub fn trigger(&self) {
        self.region().any_key_pressed.store(true, Ordering::Release);
    }

    /// Consume a pending press, returning the last keycode if there was one.
    pub fn take_press(&self) -> Option<i32> {
        let region = self.region();
        region
            .any_key_pressed
            .swap(false, Ordering::AcqRel)
            .then(|| region.last_key_code.load(Ordering::Acquire))
    }

    pub fn is_pressed(&self) -> bool {
        self.region().any_key_pressed.load(Ordering::Acquire)
    }

    pub fn last_key_code(&self) -> i32 {
        self.region().last_key_code.load(Ordering::Acquire)
    }

    /// Reset both fields, e.g. before relaunching the capture process.
    pub fn clear(&self) {
        let region = self.region();
        region.any_key_pressed.store(false, Ordering::Release);
        region.last_key_code.store(0, Ordering::Release);
    }
}

impl Drop for SharedInputFlags {
    fn drop(&mut self) {
        // SAFETY: region/len come from the successful mmap in `new`.
        unsafe {
            libc::munmap(self.region.as_ptr().cast(), self.len);
        }
    }
}

impl std::fmt::Debug for SharedInputFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedInputFlags")
            .field("any_key_pressed", &self.is_pressed())
            .field("last_key_code", &self.last_key_code())
            .finish()
    }
}
