//! Identity and value types shared by every component

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! index_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Position of this entry in its owning table
            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub(crate) fn from_index(index: usize) -> Self {
                Self(index as u32)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

index_type!(
    /// Handle of a registered backend
    BackendId,
    "backend"
);
index_type!(
    /// Handle of a configured instance
    InstanceId,
    "instance"
);
index_type!(
    /// Stable handle of a channel record, unaffected by rekeying
    ChannelId,
    "channel"
);

/// Backend-specific raw representation travelling alongside the normalised value
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawValue {
    #[default]
    None,
    Unsigned(u64),
    Float(f64),
}

/// The normalised currency flowing along routing edges
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelValue {
    /// Value in the range [0.0, 1.0]
    pub normalised: f64,
    /// Optional source precision
    pub raw: RawValue,
}

impl ChannelValue {
    /// Create a value from a normalised number, clamping into [0.0, 1.0]
    pub fn new(normalised: f64) -> Self {
        let normalised = if normalised.is_nan() {
            0.0
        } else {
            normalised.clamp(0.0, 1.0)
        };
        Self {
            normalised,
            raw: RawValue::None,
        }
    }

    /// Create a value from an unsigned integer in `0..=max`, keeping the raw integer
    pub fn from_u64(raw: u64, max: u64) -> Self {
        let normalised = if max == 0 {
            0.0
        } else {
            raw.min(max) as f64 / max as f64
        };
        Self {
            normalised,
            raw: RawValue::Unsigned(raw),
        }
    }

    /// Create a value from a float in `min..=max`, keeping the raw float
    pub fn from_f64_range(raw: f64, min: f64, max: f64) -> Self {
        let span = max - min;
        let mut value = if span == 0.0 {
            Self::new(0.0)
        } else {
            Self::new((raw - min) / span)
        };
        value.raw = RawValue::Float(raw);
        value
    }

    pub fn with_raw(mut self, raw: RawValue) -> Self {
        self.raw = raw;
        self
    }

    /// Scale the normalised value onto `0..=max`
    pub fn scaled(&self, max: u64) -> u64 {
        (self.normalised * max as f64).round() as u64
    }
}

/// Which side of a mapping a channel is resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelDirection {
    /// The channel generates events (mapping source)
    Input,
    /// The channel receives events (mapping destination)
    Output,
}

/// One routed value change waiting for delivery
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub channel: ChannelId,
    pub value: ChannelValue,
}

/// A configured endpoint of a backend
#[derive(Debug, Clone)]
pub struct Instance {
    pub(crate) name: String,
    pub(crate) backend: BackendId,
    pub(crate) ident: u64,
}

impl Instance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> BackendId {
        self.backend
    }

    /// Backend-assigned identity used by [`crate::Core::instance_find`]
    pub fn ident(&self) -> u64 {
        self.ident
    }
}

/// One addressable control point of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub(crate) instance: InstanceId,
    pub(crate) ident: u64,
}

impl Channel {
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn ident(&self) -> u64 {
        self.ident
    }
}
