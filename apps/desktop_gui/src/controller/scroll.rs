//! Follow-the-bottom behavior for the message thread.

/// Distance from the bottom, in points, within which the thread keeps
/// following new messages.
pub const FOLLOW_THRESHOLD_PX: f32 = 120.0;

#[derive(Debug, Clone, Default)]
pub struct ScrollFollow {
    distance_from_bottom: f32,
    pending: bool,
}

impl ScrollFollow {
    /// Records the viewport geometry rendered this frame.
    pub fn observe(&mut self, offset_y: f32, content_height: f32, viewport_height: f32) {
        self.distance_from_bottom = (content_height - viewport_height - offset_y).max(0.0);
    }

    /// Polled updates only follow when the reader was already near the bottom.
    pub fn on_messages_updated(&mut self) {
        if self.distance_from_bottom < FOLLOW_THRESHOLD_PX {
            self.pending = true;
        }
    }

    /// Own sends and freshly opened threads always jump to the bottom.
    pub fn force(&mut self) {
        self.pending = true;
    }

    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_when_near_bottom() {
        let mut follow = ScrollFollow::default();
        follow.observe(1_000.0 - 400.0 - 119.0, 1_000.0, 400.0);
        follow.on_messages_updated();
        assert!(follow.take_scroll_request());
        assert!(!follow.take_scroll_request());
    }

    #[test]
    fn stays_put_when_reading_history() {
        let mut follow = ScrollFollow::default();
        follow.observe(1_000.0 - 400.0 - 120.0, 1_000.0, 400.0);
        follow.on_messages_updated();
        assert!(!follow.take_scroll_request());

        follow.observe(0.0, 1_000.0, 400.0);
        follow.on_messages_updated();
        assert!(!follow.take_scroll_request());
    }

    #[test]
    fn forced_scroll_ignores_position() {
        let mut follow = ScrollFollow::default();
        follow.observe(0.0, 5_000.0, 400.0);
        follow.force();
        assert!(follow.take_scroll_request());
    }

    #[test]
    fn short_threads_count_as_at_bottom() {
        let mut follow = ScrollFollow::default();
        follow.observe(0.0, 100.0, 400.0);
        follow.on_messages_updated();
        assert!(follow.take_scroll_request());
    }
}
