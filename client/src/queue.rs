//! Single-flight FIFO of directory operations.
//!
//! At most one entry is in flight. Completing it frees the slot; the caller
//! then asks for the next one, so a failure never stalls the backlog.

use std::collections::VecDeque;

#[derive(Debug)]
pub struct RequestQueue<T> {
    backlog: VecDeque<T>,
    in_flight: Option<T>,
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self {
            backlog: VecDeque::new(),
            in_flight: None,
        }
    }
}

impl<T> RequestQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: T) {
        self.backlog.push_back(operation);
    }

    /// Moves the backlog head into the in-flight slot if the slot is free.
    /// Returns the operation the caller must now transmit.
    pub fn start_next(&mut self) -> Option<&T> {
        if self.in_flight.is_some() {
            return None;
        }
        self.in_flight = self.backlog.pop_front();
        self.in_flight.as_ref()
    }

    /// Clears the in-flight slot and hands back its operation.
    pub fn finish(&mut self) -> Option<T> {
        self.in_flight.take()
    }

    pub fn in_flight(&self) -> Option<&T> {
        self.in_flight.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight() {
        let mut queue = RequestQueue::new();
        queue.push("register");
        queue.push("check_in");
        queue.push("unregister");

        assert_eq!(queue.start_next(), Some(&"register"));
        // Slot is taken until finished.
        assert_eq!(queue.start_next(), None);
        assert_eq!(queue.backlog_len(), 2);
        assert!(!queue.is_idle());
    }

    #[test]
    fn test_fifo_completion_order() {
        let mut queue = RequestQueue::new();
        for op in ["register", "check_in", "unregister"] {
            queue.push(op);
        }

        let mut completed = Vec::new();
        while queue.start_next().is_some() {
            assert_eq!(queue.backlog_len() + 1, 3 - completed.len());
            completed.push(queue.finish().unwrap());
        }
        assert_eq!(completed, vec!["register", "check_in", "unregister"]);
        assert!(queue.is_idle());
        assert_eq!(queue.finish(), None);
    }

    #[test]
    fn test_push_while_in_flight() {
        let mut queue = RequestQueue::new();
        queue.push(1);
        queue.start_next();
        queue.push(2);
        assert_eq!(queue.in_flight(), Some(&1));
        assert_eq!(queue.finish(), Some(1));
        assert_eq!(queue.start_next(), Some(&2));
    }
}
