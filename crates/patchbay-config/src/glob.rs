//! Channel glob resolver
//!
//! A channel spec may contain any number of `{…}` windows, each expanding
//! to several values:
//!
//! - `{N..M}` - decimal range, ascending or descending, both ends inclusive
//! - `{a,b,c}` - list of literal members
//!
//! A channel spec as a whole expands to the product of its glob counts. Expansion
//! `n` treats the globs as mixed-radix digits with the rightmost glob
//! varying fastest, so `ch{1..2}.{a,b}` expands to `ch1.a`, `ch1.b`,
//! `ch2.a`, `ch2.b`.

use crate::error::{ConfigError, Result};

/// Direction and shape of a glob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobKind {
    Ascending,
    Descending,
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GlobValues {
    Range { from: u64, to: u64 },
    List(Vec<String>),
}

/// One `{…}` window inside a channel spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGlob {
    /// Byte offset of the opening brace
    pub start: usize,
    /// Byte offset just past the closing brace
    pub end: usize,
    values: GlobValues,
}

impl ChannelGlob {
    fn parse(body: &str, start: usize, end: usize) -> Result<Self> {
        // whichever of `..` and `,` comes first decides the glob type
        let range_at = match (body.find(".."), body.find(',')) {
            (Some(range), Some(list)) if list < range => None,
            (range, _) => range,
        };

        let values = if let Some(at) = range_at {
            let (from, to) = (&body[..at], &body[at + 2..]);
            let bound = |text: &str| {
                if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ConfigError::GlobParse(format!(
                        "range bound {:?} in {{{}}} is not a decimal number",
                        text, body
                    )));
                }
                text.parse::<u64>().map_err(|e| {
                    ConfigError::GlobParse(format!("range bound {:?} in {{{}}}: {}", text, body, e))
                })
            };
            let (from, to) = (bound(from)?, bound(to)?);
            if from.abs_diff(to) == u64::MAX {
                return Err(ConfigError::GlobParse(format!("range {{{}}} is too large", body)));
            }
            GlobValues::Range { from, to }
        } else if body.contains(',') {
            let members: Vec<String> = body.split(',').map(str::to_string).collect();
            if members.iter().any(String::is_empty) {
                return Err(ConfigError::GlobParse(format!(
                    "empty member in list {{{}}}",
                    body
                )));
            }
            GlobValues::List(members)
        } else {
            return Err(ConfigError::GlobParse(format!(
                "cannot detect glob type of {{{}}}",
                body
            )));
        };

        Ok(Self { start, end, values })
    }

    pub fn kind(&self) -> GlobKind {
        match &self.values {
            GlobValues::Range { from, to } if from > to => GlobKind::Descending,
            GlobValues::Range { .. } => GlobKind::Ascending,
            GlobValues::List(_) => GlobKind::List,
        }
    }

    /// Number of values this glob expands to
    pub fn count(&self) -> u64 {
        match &self.values {
            GlobValues::Range { from, to } => from.abs_diff(*to) + 1,
            GlobValues::List(members) => members.len() as u64,
        }
    }

    /// The `index`-th value, wrapping around
    pub fn value(&self, index: u64) -> String {
        let index = index % self.count();
        match &self.values {
            GlobValues::Range { from, to } if from > to => (from - index).to_string(),
            GlobValues::Range { from, .. } => (from + index).to_string(),
            GlobValues::List(members) => members[index as usize].clone(),
        }
    }
}

/// A channel spec with its globs located and parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    text: String,
    globs: Vec<ChannelGlob>,
    count: u64,
}

impl ChannelSpec {
    /// Locate and parse every `{…}` window in `text`
    pub fn scan(text: &str) -> Result<Self> {
        let mut globs = Vec::new();
        let mut open: Option<usize> = None;

        for (offset, byte) in text.bytes().enumerate() {
            match (byte, open) {
                (b'{', Some(_)) => {
                    return Err(ConfigError::GlobParse(format!("nested glob in {}", text)));
                }
                (b'{', None) => open = Some(offset),
                (b'}', Some(start)) => {
                    globs.push(ChannelGlob::parse(&text[start + 1..offset], start, offset + 1)?);
                    open = None;
                }
                (b'}', None) => {
                    return Err(ConfigError::GlobParse(format!(
                        "closing brace without glob in {}",
                        text
                    )));
                }
                _ => {}
            }
        }

        if open.is_some() {
            return Err(ConfigError::GlobParse(format!("unterminated glob in {}", text)));
        }

        let mut count: u64 = 1;
        for glob in &globs {
            count = count.checked_mul(glob.count()).ok_or_else(|| {
                ConfigError::GlobParse(format!("{} expands to too many channels", text))
            })?;
        }

        Ok(Self {
            text: text.to_string(),
            globs,
            count,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn globs(&self) -> &[ChannelGlob] {
        &self.globs
    }

    /// Total number of concrete specs this expands to
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_glob(&self) -> bool {
        !self.globs.is_empty()
    }

    /// The `n`-th concrete spec
    pub fn resolve(&self, mut n: u64) -> String {
        if self.globs.is_empty() {
            return self.text.clone();
        }

        let mut values = vec![String::new(); self.globs.len()];
        for (slot, glob) in values.iter_mut().zip(&self.globs).rev() {
            *slot = glob.value(n % glob.count());
            n /= glob.count();
        }

        let mut resolved = String::with_capacity(self.text.len());
        let mut cursor = 0;
        for (glob, value) in self.globs.iter().zip(&values) {
            resolved.push_str(&self.text[cursor..glob.start]);
            resolved.push_str(value);
            cursor = glob.end;
        }
        resolved.push_str(&self.text[cursor..]);
        resolved
    }

    /// Every concrete spec in expansion order
    pub fn expand(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.count).map(move |n| self.resolve(n))
    }
}
