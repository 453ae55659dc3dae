//! Explicit free lists for objects that are allocated per frame.
//!
//! A [`Pool`] hands out owned values with [`Pool::acquire`] and takes them
//! back with [`Pool::release`]. Release moves the value into the pool, so the
//! caller cannot keep using it; the value is reset with [`Recycle::recycle`]
//! before it is stored. Retaining a copy of anything borrowed from a pooled
//! value past its release is the caller's bug, not something the pool can
//! detect.

use std::sync::Mutex;

use bytes::BytesMut;

/// Objects that can be reset for reuse.
pub trait Recycle: Default {
    /// Reset the value to its just-constructed state, keeping allocations.
    fn recycle(&mut self);
}

impl Recycle for BytesMut {
    fn recycle(&mut self) { self.clear(); }
}

/// Bounded free list of reusable values.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use wirepool::pool::Pool;
///
/// let pool: Pool<BytesMut> = Pool::new(4);
/// let mut buf = pool.acquire();
/// buf.extend_from_slice(b"frame");
/// pool.release(buf);
/// assert_eq!(pool.idle(), 1);
/// assert!(pool.acquire().is_empty());
/// ```
#[derive(Debug)]
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    max_idle: usize,
}

impl<T: Recycle> Pool<T> {
    /// Create a pool that retains at most `max_idle` released values.
    #[must_use]
    pub fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        }
    }

    /// Take a value from the free list, or build a fresh one.
    pub fn acquire(&self) -> T {
        self.free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_default()
    }

    /// Reset `value` and return it to the free list.
    ///
    /// Values beyond the retention bound are dropped.
    pub fn release(&self, mut value: T) {
        value.recycle();
        if let Ok(mut free) = self.free.lock()
            && free.len() < self.max_idle
        {
            free.push(value);
        }
    }

    /// Number of values waiting in the free list.
    #[must_use]
    pub fn idle(&self) -> usize { self.free.lock().map_or(0, |free| free.len()) }
}

impl<T: Recycle> Default for Pool<T> {
    fn default() -> Self { Self::new(DEFAULT_MAX_IDLE) }
}

/// Retention bound used by [`Pool::default`].
pub const DEFAULT_MAX_IDLE: usize = 256;
