//! Routing graph
//!
//! Static adjacency map from source channel to its destinations, built while
//! the configuration is loaded and only read afterwards.

use serde::Serialize;
use tracing::debug;

use crate::channel::{fold_hash, BUCKETS};
use crate::error::Result;
use crate::types::ChannelId;

#[derive(Debug)]
struct Mapping {
    from: ChannelId,
    to: Vec<ChannelId>,
}

/// Summary of the routing table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoutingStats {
    /// Channels with at least one outgoing edge
    pub sources: usize,
    /// Total number of edges
    pub edges: usize,
    /// Entries in the fullest bucket
    pub largest_bucket: usize,
}

/// Hashed source → destinations adjacency map
#[derive(Debug)]
pub struct RoutingGraph {
    buckets: Vec<Vec<Mapping>>,
}

impl Default for RoutingGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingGraph {
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(BUCKETS);
        buckets.resize_with(BUCKETS, Vec::new);
        Self { buckets }
    }

    fn bucket_of(channel: ChannelId) -> usize {
        fold_hash(channel.0 as u64)
    }

    /// Add the edge `from → to`. Returns `false` if it already existed.
    pub fn add_edge(&mut self, from: ChannelId, to: ChannelId) -> Result<bool> {
        let bucket = &mut self.buckets[Self::bucket_of(from)];

        let index = match bucket.iter().position(|mapping| mapping.from == from) {
            Some(index) => index,
            None => {
                bucket.try_reserve(1)?;
                bucket.push(Mapping {
                    from,
                    to: Vec::new(),
                });
                bucket.len() - 1
            }
        };

        let mapping = &mut bucket[index];
        if mapping.to.contains(&to) {
            return Ok(false);
        }

        mapping.to.try_reserve(1)?;
        mapping.to.push(to);
        debug!("Mapped {} to {}", from, to);
        Ok(true)
    }

    /// Destinations of `from` in insertion order
    pub fn destinations_of(&self, from: ChannelId) -> &[ChannelId] {
        self.buckets[Self::bucket_of(from)]
            .iter()
            .find(|mapping| mapping.from == from)
            .map(|mapping| mapping.to.as_slice())
            .unwrap_or(&[])
    }

    pub fn stats(&self) -> RoutingStats {
        RoutingStats {
            sources: self.buckets.iter().map(Vec::len).sum(),
            edges: self
                .buckets
                .iter()
                .flatten()
                .map(|mapping| mapping.to.len())
                .sum(),
            largest_bucket: self.buckets.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}
