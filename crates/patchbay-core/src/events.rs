//! Double-buffered event queue
//!
//! New events always go to the active buffer. A drain pass freezes the
//! active buffer by swapping, so events generated while delivering the
//! frozen batch land in the other buffer and are delivered on the next swap.

use std::ops::Range;

use crate::error::Result;
use crate::types::{ChannelId, ChannelValue, Event, InstanceId};

/// Maximum buffer swaps per drain before pending events are dropped
pub const SWAP_LIMIT: usize = 20;

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Buffer swaps performed
    pub swaps: usize,
    /// Events handed to backends
    pub delivered: usize,
    /// Events discarded because the swap limit was reached
    pub dropped: usize,
}

impl DrainReport {
    pub fn limit_hit(&self) -> bool {
        self.dropped > 0
    }
}

/// The primary/secondary event buffer pair
#[derive(Debug, Default)]
pub struct EventQueue {
    pool: [Vec<Event>; 2],
    active: usize,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `value` for every destination
    pub fn push_all(&mut self, destinations: &[ChannelId], value: ChannelValue) -> Result<()> {
        let buffer = &mut self.pool[self.active];
        buffer.try_reserve(destinations.len())?;
        buffer.extend(
            destinations
                .iter()
                .map(|&channel| Event { channel, value }),
        );
        Ok(())
    }

    /// Events waiting in the active buffer
    pub fn pending(&self) -> usize {
        self.pool[self.active].len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Make the other buffer active and hand out the frozen one
    pub(crate) fn swap(&mut self) -> Vec<Event> {
        let frozen = self.active;
        self.active ^= 1;
        std::mem::take(&mut self.pool[frozen])
    }

    /// Return a processed batch so its allocation is reused
    pub(crate) fn recycle(&mut self, mut batch: Vec<Event>) {
        batch.clear();
        let spare = self.active ^ 1;
        if self.pool[spare].capacity() < batch.capacity() {
            self.pool[spare] = batch;
        }
    }

    /// Drop everything in the active buffer, returning the number of events
    pub(crate) fn discard(&mut self) -> usize {
        let buffer = &mut self.pool[self.active];
        let count = buffer.len();
        buffer.clear();
        count
    }
}

/// Reorder `events` so that events for the same instance are contiguous.
///
/// Instances appear in order of their first event, and the relative order
/// of one instance's events is preserved.
pub(crate) fn partition_by_instance<F>(
    events: &mut [Event],
    instance_of: F,
) -> Vec<(InstanceId, Range<usize>)>
where
    F: Fn(ChannelId) -> InstanceId,
{
    let mut groups = Vec::new();
    let mut start = 0;

    while start < events.len() {
        let instance = instance_of(events[start].channel);
        let mut end = start + 1;

        for p in start + 1..events.len() {
            if instance_of(events[p].channel) == instance {
                events[end..=p].rotate_right(1);
                end += 1;
            }
        }

        groups.push((instance, start..end));
        start = end;
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(channel: usize, value: f64) -> Event {
        Event {
            channel: ChannelId::from_index(channel),
            value: ChannelValue::new(value),
        }
    }

    #[test]
    fn test_swap_alternates_buffers() {
        let mut queue = EventQueue::new();
        let dest = [ChannelId::from_index(1), ChannelId::from_index(2)];
        queue.push_all(&dest, ChannelValue::new(0.5)).unwrap();
        assert_eq!(queue.pending(), 2);

        let batch = queue.swap();
        assert_eq!(batch.len(), 2);
        assert!(queue.is_empty());

        queue.push_all(&dest[..1], ChannelValue::new(0.1)).unwrap();
        queue.recycle(batch);
        assert_eq!(queue.pending(), 1);

        let batch = queue.swap();
        assert_eq!(batch[0].channel, ChannelId::from_index(1));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_discard() {
        let mut queue = EventQueue::new();
        queue
            .push_all(&[ChannelId::from_index(0)], ChannelValue::new(1.0))
            .unwrap();
        assert_eq!(queue.discard(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_partition_is_stable() {
        // instance = channel parity
        let mut events = vec![
            event(0, 0.0),
            event(1, 0.1),
            event(2, 0.2),
            event(3, 0.3),
            event(4, 0.4),
        ];
        let groups = partition_by_instance(&mut events, |c| {
            InstanceId::from_index(c.index() % 2)
        });

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], (InstanceId::from_index(0), 0..3));
        assert_eq!(groups[1], (InstanceId::from_index(1), 3..5));

        let order: Vec<usize> = events.iter().map(|e| e.channel.index()).collect();
        assert_eq!(order, vec![0, 2, 4, 1, 3]);
    }

    #[test]
    fn test_partition_empty() {
        let mut events: Vec<Event> = Vec::new();
        assert!(partition_by_instance(&mut events, |_| InstanceId::from_index(0)).is_empty());
    }
}
