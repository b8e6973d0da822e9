//! Command-line configuration overrides
//!
//! An override has the form `target.option=value`. Backend overrides are
//! applied when the `[backend <target>]` header is read, instance overrides
//! right after the instance `<target>` has been created. Each override is
//! applied at most once.

use std::str::FromStr;

use crate::error::{ConfigError, Result};

/// What an override targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideKind {
    Backend,
    Instance,
}

/// One `target.option=value` override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub kind: OverrideKind,
    pub target: String,
    pub option: String,
    pub value: String,
    handled: bool,
}

impl Override {
    pub fn parse(kind: OverrideKind, text: &str) -> Result<Self> {
        let invalid = || ConfigError::InvalidOverride(text.to_string());

        let (target, rest) = text.split_once('.').ok_or_else(invalid)?;
        let (option, value) = rest.split_once('=').ok_or_else(invalid)?;

        let (target, option) = (target.trim(), option.trim());
        if target.is_empty() || option.is_empty() || target.contains('=') {
            return Err(invalid());
        }

        Ok(Self {
            kind,
            target: target.to_string(),
            option: option.to_string(),
            value: value.trim().to_string(),
            handled: false,
        })
    }

    pub fn backend(text: &str) -> Result<Self> {
        Self::parse(OverrideKind::Backend, text)
    }

    pub fn instance(text: &str) -> Result<Self> {
        Self::parse(OverrideKind::Instance, text)
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }

    pub(crate) fn matches(&self, kind: OverrideKind, target: &str) -> bool {
        !self.handled && self.kind == kind && self.target == target
    }

    pub(crate) fn mark_handled(&mut self) {
        self.handled = true;
    }
}

impl FromStr for Override {
    type Err = ConfigError;

    /// Parses `backend:target.option=value` or `instance:target.option=value`
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some(("backend", rest)) => Self::backend(rest),
            Some(("instance", rest)) => Self::instance(rest),
            _ => Err(ConfigError::InvalidOverride(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override() {
        let o = Override::backend("artnet.bind = 0.0.0.0 6454").unwrap();
        assert_eq!(o.kind, OverrideKind::Backend);
        assert_eq!(o.target, "artnet");
        assert_eq!(o.option, "bind");
        assert_eq!(o.value, "0.0.0.0 6454");
        assert!(!o.is_handled());
    }

    #[test]
    fn test_value_may_contain_dots_and_equals() {
        let o = Override::instance("out.dest=10.0.0.1:9000=x").unwrap();
        assert_eq!(o.target, "out");
        assert_eq!(o.option, "dest");
        assert_eq!(o.value, "10.0.0.1:9000=x");
    }

    #[test]
    fn test_invalid_overrides() {
        for text in ["noassignment", "target.option", "a=b.c", ".opt=1", "target.=1"] {
            assert!(Override::backend(text).is_err(), "{} was accepted", text);
        }
    }

    #[test]
    fn test_from_str() {
        let o: Override = "instance:in.ident=4".parse().unwrap();
        assert_eq!(o.kind, OverrideKind::Instance);
        assert!("other:in.ident=4".parse::<Override>().is_err());
    }

    #[test]
    fn test_matching_is_one_shot() {
        let mut o = Override::instance("in.ident=4").unwrap();
        assert!(o.matches(OverrideKind::Instance, "in"));
        assert!(!o.matches(OverrideKind::Backend, "in"));
        o.mark_handled();
        assert!(!o.matches(OverrideKind::Instance, "in"));
    }
}
