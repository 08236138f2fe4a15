//! Per-panel timers. The host never runs callbacks on its own; it asks for
//! the next deadline, sleeps until then and calls [`TimerQueue::expire`].

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Tail poll for new samples.
    Poll,
    /// Live-mode advance of the window's right edge.
    Scroll,
    Inertia,
    /// Debounced write of the window into the page URL.
    UrlUpdate,
    /// Image history playback.
    Play,
    /// A redraw that was held back by the frame rate limit.
    Redraw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone)]
struct Entry {
    handle: TimerHandle,
    kind: TimerKind,
    due: f64,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: Vec<Entry>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, kind: TimerKind, due: f64) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        self.entries.push(Entry { handle, kind, due });
        handle
    }

    /// Schedules `kind`, replacing any pending timer of the same kind.
    pub fn reschedule(&mut self, kind: TimerKind, due: f64) -> TimerHandle {
        self.cancel_kind(kind);
        self.schedule(kind, due)
    }

    /// Schedules `kind` unless one is already pending.
    pub fn ensure(&mut self, kind: TimerKind, due: f64) {
        if !self.is_scheduled(kind) {
            self.schedule(kind, due);
        }
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.handle != handle);
        self.entries.len() != before
    }

    pub fn cancel_kind(&mut self, kind: TimerKind) {
        self.entries.retain(|e| e.kind != kind);
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.entries.iter().any(|e| e.kind == kind)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<f64> {
        self.entries.iter().filter(|e| e.kind == kind).map(|e| e.due).reduce(f64::min)
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.entries.iter().map(|e| e.due).reduce(f64::min)
    }

    /// Removes and returns every timer due at `now`, earliest first.
    pub fn expire(&mut self, now: f64) -> Vec<TimerKind> {
        let mut due: Vec<Entry> = Vec::new();
        self.entries.retain(|e| {
            if e.due <= now {
                due.push(e.clone());
                false
            } else {
                true
            }
        });
        due.sort_by(|a, b| a.due.total_cmp(&b.due));
        due.into_iter().map(|e| e.kind).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expire_in_order() {
        let mut q = TimerQueue::new();
        q.schedule(TimerKind::Scroll, 3.0);
        q.schedule(TimerKind::Poll, 1.0);
        q.schedule(TimerKind::UrlUpdate, 10.0);
        assert_eq!(q.next_deadline(), Some(1.0));
        assert_eq!(q.expire(5.0), vec![TimerKind::Poll, TimerKind::Scroll]);
        assert_eq!(q.next_deadline(), Some(10.0));
        assert!(q.expire(5.0).is_empty());
    }

    #[test]
    fn cancel_and_reschedule() {
        let mut q = TimerQueue::new();
        let h = q.schedule(TimerKind::Inertia, 1.0);
        assert!(q.cancel(h));
        assert!(!q.cancel(h));
        q.reschedule(TimerKind::UrlUpdate, 1.0);
        q.reschedule(TimerKind::UrlUpdate, 2.0);
        assert_eq!(q.deadline(TimerKind::UrlUpdate), Some(2.0));
        q.ensure(TimerKind::UrlUpdate, 0.5);
        assert_eq!(q.deadline(TimerKind::UrlUpdate), Some(2.0));
        q.clear();
        assert!(q.is_empty());
    }
}
