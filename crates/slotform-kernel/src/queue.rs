use std::collections::VecDeque;

use slotform_contracts::ActionId;

/// Actions the policy has committed to, served one per turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionQueue {
    pending: VecDeque<ActionId>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever is pending. Only one plan is ever served at a time.
    pub fn enqueue<I>(&mut self, actions: I)
    where
        I: IntoIterator<Item = ActionId>,
    {
        self.pending = actions.into_iter().collect();
    }

    pub fn dequeue_next(&mut self) -> Option<ActionId> {
        self.pending.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_fifo_order() {
        let mut queue = ActionQueue::new();
        queue.enqueue([ActionId(3), ActionId(1), ActionId(2)]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue_next(), Some(ActionId(3)));
        assert_eq!(queue.dequeue_next(), Some(ActionId(1)));
        assert_eq!(queue.dequeue_next(), Some(ActionId(2)));
        assert_eq!(queue.dequeue_next(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn enqueue_overwrites_pending_actions() {
        let mut queue = ActionQueue::new();
        queue.enqueue([ActionId(1), ActionId(2)]);
        queue.enqueue([ActionId(9)]);
        assert_eq!(queue.dequeue_next(), Some(ActionId(9)));
        assert_eq!(queue.dequeue_next(), None);
    }
}
