//! FIFO of device-initiated events.
//!
//! The transport surfaces events one at a time; the session parks them
//! here until a caller wants them. Orchestration loops need two
//! operations a plain channel cannot give: draining stale events before
//! an operation starts, and putting an event back when it arrived for a
//! later stage of the sequence.

use std::collections::VecDeque;

use crate::transport::Event;

/// Pending events in arrival order.
#[derive(Debug, Default)]
pub struct EventQueue {
    queue: VecDeque<Event>,
}

impl EventQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Appends an event in arrival order.
    pub fn push(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    /// Re-injects an event that was popped but could not be handled
    /// yet. It will be the next event popped, ahead of anything that
    /// arrived after it.
    pub fn push_front(&mut self, event: Event) {
        self.queue.push_front(event);
    }

    /// Removes and returns the oldest event.
    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    /// Removes and returns the oldest event satisfying `pred`, leaving
    /// the rest in order.
    ///
    /// This is the "peek" used by focus-wait loops: the matching event
    /// is consumed, not copied, so a second waiter can never resurrect
    /// an event someone already acted on.
    pub fn take_matching<F>(&mut self, pred: F) -> Option<Event>
    where
        F: Fn(&Event) -> bool,
    {
        let index = self.queue.iter().position(pred)?;
        self.queue.remove(index)
    }

    /// Empties the queue, returning the events in arrival order.
    ///
    /// Used before starting a capture so events left over from a prior
    /// operation are not mis-attributed to the new one.
    pub fn drain(&mut self) -> Vec<Event> {
        self.queue.drain(..).collect()
    }
}
