use std::collections::VecDeque;

/// Unbounded insertion-ordered queue between the decode pump and a
/// pull-one-at-a-time consumer.
#[derive(Debug)]
pub struct FrameQueue<T> {
    frames: VecDeque<T>,
}

impl<T> FrameQueue<T> {
    pub fn new() -> Self {
        Self {
            frames: VecDeque::new(),
        }
    }

    pub fn put(&mut self, frame: T) {
        self.frames.push_back(frame);
    }

    pub fn try_next(&mut self) -> Option<T> {
        self.frames.pop_front()
    }

    pub fn try_peek(&self) -> Option<&T> {
        self.frames.front()
    }

    /// Removes and returns everything queued, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.frames.drain(..).collect()
    }

    /// Discards everything queued. Returns how many frames were dropped.
    pub fn flush(&mut self) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uneven_bursts_keep_production_order() {
        let mut queue = FrameQueue::new();
        let mut next = 0;
        for burst in [0, 1, 5, 0, 2, 0, 3] {
            for _ in 0..burst {
                queue.put(next);
                next += 1;
            }
        }

        let mut seen = queue.drain();
        assert!(queue.is_empty());

        for burst in [2, 0, 4] {
            for _ in 0..burst {
                queue.put(next);
                next += 1;
            }
        }
        while let Some(frame) = queue.try_next() {
            seen.push(frame);
        }

        assert_eq!(seen, (0..next).collect::<Vec<_>>());
    }

    #[test]
    fn peek_does_not_consume() {
        let mut queue = FrameQueue::new();
        queue.put("a");
        queue.put("b");
        assert_eq!(queue.try_peek(), Some(&"a"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.flush(), 2);
        assert_eq!(queue.try_peek(), None);
    }
}
