//! Single-frame hand-off between the decode thread and the render path
//!
//! The slot holds at most one value: the latest published frame. Publishing
//! overwrites whatever is there, so a slow consumer only ever sees the newest
//! frame. Acquiring never waits.

use parking_lot::Mutex;

#[derive(Debug)]
pub struct FrameSlot<T> {
    current: Mutex<Option<T>>,
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }
}

impl<T: Clone> FrameSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame
    pub fn publish(&self, value: T) {
        *self.current.lock() = Some(value);
    }

    /// Produce a frame and publish it under the slot lock.
    ///
    /// Readers cannot observe the slot between the start of `produce` and
    /// the swap. When `produce` fails or yields `None` the previous frame
    /// stays in place. Returns whether a frame was published.
    pub fn publish_with<E>(
        &self,
        produce: impl FnOnce() -> Result<Option<T>, E>,
    ) -> Result<bool, E> {
        let mut current = self.current.lock();
        match produce()? {
            Some(value) => {
                *current = Some(value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Latest published frame, if any
    pub fn acquire(&self) -> Option<T> {
        self.current.lock().clone()
    }

    pub fn clear(&self) {
        self.current.lock().take();
    }

    /// Empty the slot and run `f` while still holding the lock
    pub fn clear_with<R>(&self, f: impl FnOnce() -> R) -> R {
        let mut current = self.current.lock();
        current.take();
        f()
    }

    pub fn is_empty(&self) -> bool {
        self.current.lock().is_none()
    }
}
