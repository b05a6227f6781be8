//! Process-wide count of visible viewers.
//!
//! Background discovery polling only runs while at least one viewer is
//! visible. Each viewer owns a [`ViewerVisibility`] that moves the shared
//! counter on visibility edges only.

use std::sync::atomic::{AtomicUsize, Ordering};

static GLOBAL_COUNTER: VisibilityCounter = VisibilityCounter::new();

#[derive(Debug, Default)]
pub struct VisibilityCounter {
    visible: AtomicUsize,
}

impl VisibilityCounter {
    pub const fn new() -> Self {
        Self {
            visible: AtomicUsize::new(0),
        }
    }

    /// The counter shared by every viewer in the process
    pub fn global() -> &'static VisibilityCounter {
        &GLOBAL_COUNTER
    }

    pub fn has_any_visible(&self) -> bool {
        self.count() != 0
    }

    pub fn count(&self) -> usize {
        self.visible.load(Ordering::SeqCst)
    }

    fn increment(&self) {
        self.visible.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        // Saturate at zero; only reachable through edges we recorded
        if self
            .visible
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
        {
            tracing::warn!("Visibility count already zero, ignoring hide");
        }
    }
}

/// Visibility of one viewer
#[derive(Debug)]
pub struct ViewerVisibility {
    counter: &'static VisibilityCounter,
    visible: bool,
}

impl ViewerVisibility {
    pub fn new(counter: &'static VisibilityCounter) -> Self {
        Self {
            counter,
            visible: false,
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        if visible == self.visible {
            return;
        }
        if visible {
            self.counter.increment();
        } else {
            self.counter.decrement();
        }
        self.visible = visible;
        tracing::debug!(
            "Viewer visibility -> {} ({} visible)",
            visible,
            self.counter.count()
        );
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

impl Drop for ViewerVisibility {
    fn drop(&mut self) {
        self.set_visible(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_is_edge_triggered() {
        static COUNTER: VisibilityCounter = VisibilityCounter::new();
        let before = COUNTER.count();

        let mut viewer = ViewerVisibility::new(&COUNTER);
        viewer.set_visible(true);
        viewer.set_visible(true);
        assert_eq!(COUNTER.count(), before + 1);
        viewer.set_visible(false);

        assert_eq!(COUNTER.count(), before);
        assert!(!COUNTER.has_any_visible());
    }

    #[test]
    fn test_multiple_viewers_and_drop() {
        static COUNTER: VisibilityCounter = VisibilityCounter::new();

        let mut first = ViewerVisibility::new(&COUNTER);
        let mut second = ViewerVisibility::new(&COUNTER);
        first.set_visible(true);
        second.set_visible(true);
        assert_eq!(COUNTER.count(), 2);

        drop(first);
        assert_eq!(COUNTER.count(), 1);
        assert!(COUNTER.has_any_visible());

        second.set_visible(false);
        second.set_visible(false);
        assert_eq!(COUNTER.count(), 0);
    }

    #[test]
    fn test_unmatched_hide_saturates_at_zero() {
        let counter = VisibilityCounter::new();
        counter.decrement();
        assert_eq!(counter.count(), 0);

        counter.increment();
        counter.decrement();
        counter.decrement();
        assert_eq!(counter.count(), 0);
        assert!(!counter.has_any_visible());
    }
}
