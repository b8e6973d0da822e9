//! Channel identity store
//!
//! Maps `(instance, ident)` to a channel record. Records live in an arena
//! and are addressed by [`ChannelId`]; the hash buckets only hold handles,
//! so moving a record between buckets never invalidates a routing edge.

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Channel, ChannelId, InstanceId};

/// Number of hash buckets
pub(crate) const BUCKETS: usize = 256;

/// 8-bit xor-fold of a 64-bit key
pub(crate) fn fold_hash(repr: u64) -> usize {
    ((repr ^ (repr >> 8) ^ (repr >> 16) ^ (repr >> 24) ^ (repr >> 32)) & 0xFF) as usize
}

fn bucket_of(instance: InstanceId, ident: u64) -> usize {
    fold_hash(instance.0 as u64 ^ ident)
}

/// Hashed identity map of all channels
#[derive(Debug)]
pub struct ChannelStore {
    channels: Vec<Channel>,
    buckets: Vec<Vec<ChannelId>>,
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelStore {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            buckets: vec![Vec::new(); BUCKETS],
        }
    }

    /// Look up the channel for `(instance, ident)`
    pub fn find(&self, instance: InstanceId, ident: u64) -> Option<ChannelId> {
        self.buckets[bucket_of(instance, ident)]
            .iter()
            .copied()
            .find(|id| {
                let channel = &self.channels[id.index()];
                channel.instance == instance && channel.ident == ident
            })
    }

    /// Return the existing channel, or allocate one if `create` is set
    pub fn get_or_create(
        &mut self,
        instance: InstanceId,
        ident: u64,
        create: bool,
    ) -> Result<ChannelId> {
        if let Some(id) = self.find(instance, ident) {
            return Ok(id);
        }

        if !create {
            return Err(Error::ChannelNotFound { instance, ident });
        }

        let bucket = bucket_of(instance, ident);
        self.channels.try_reserve(1)?;
        self.buckets[bucket].try_reserve(1)?;

        let id = ChannelId::from_index(self.channels.len());
        self.channels.push(Channel { instance, ident });
        self.buckets[bucket].push(id);
        debug!(
            "Created channel {} on {} in bucket {}",
            ident, instance, bucket
        );
        Ok(id)
    }

    /// Rewrite the identity of an existing channel
    pub fn rekey(&mut self, channel: ChannelId, ident: u64) -> Result<()> {
        let current = self.channels[channel.index()];
        if current.ident == ident {
            return Ok(());
        }

        if self.find(current.instance, ident).is_some() {
            return Err(Error::ChannelIdentityCollision {
                instance: current.instance,
                ident,
            });
        }

        let old_bucket = bucket_of(current.instance, current.ident);
        let new_bucket = bucket_of(current.instance, ident);

        if old_bucket != new_bucket {
            self.buckets[new_bucket].try_reserve(1)?;
            if let Some(pos) = self.buckets[old_bucket].iter().position(|id| *id == channel) {
                self.buckets[old_bucket].remove(pos);
            }
            self.buckets[new_bucket].push(channel);
        }

        debug!(
            "Rekeyed channel {} on {} to {} (bucket {} to {})",
            current.ident, current.instance, ident, old_bucket, new_bucket
        );
        self.channels[channel.index()].ident = ident;
        Ok(())
    }

    pub fn get(&self, channel: ChannelId) -> &Channel {
        &self.channels[channel.index()]
    }

    /// All channel records in creation order
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &Channel)> {
        self.channels
            .iter()
            .enumerate()
            .map(|(index, channel)| (ChannelId::from_index(index), channel))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Remove every record, returning them in creation order
    pub(crate) fn take_all(&mut self) -> Vec<Channel> {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        std::mem::take(&mut self.channels)
    }
}
