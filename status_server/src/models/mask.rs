//! Build-name mask: decides which builds contribute to the aggregate status.

use std::fmt;

use regex::Regex;

use crate::config::MaskConfig;

/// How a matching build name is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskPolicy {
    /// Only matching builds are processed.
    Include,
    /// Matching builds are dropped.
    Exclude,
}

impl MaskPolicy {
    /// Anything other than exactly `"include"` (including no policy) excludes.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("include") => MaskPolicy::Include,
            _ => MaskPolicy::Exclude,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaskPolicy::Include => "include",
            MaskPolicy::Exclude => "exclude",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Mask {
    pattern: Option<Regex>,
    policy: MaskPolicy,
}

impl Mask {
    pub fn new(pattern: Option<Regex>, policy: MaskPolicy) -> Self {
        Self { pattern, policy }
    }

    /// A mask that lets every build through.
    pub fn allow_all() -> Self {
        Self::new(None, MaskPolicy::Exclude)
    }

    pub fn from_config(config: &MaskConfig) -> Result<Self, regex::Error> {
        let pattern = config.regex.as_deref().map(Regex::new).transpose()?;
        Ok(Self::new(pattern, MaskPolicy::parse(config.policy.as_deref())))
    }

    /// Whether events for `name` should be processed.
    ///
    /// Matching is an unanchored search. A missing name never matches, so it
    /// is dropped under `include` and kept under `exclude`.
    pub fn should_process(&self, name: Option<&str>) -> bool {
        let Some(pattern) = &self.pattern else {
            return true;
        };
        let matched = name.is_some_and(|n| pattern.is_match(n));
        match self.policy {
            MaskPolicy::Include => matched,
            MaskPolicy::Exclude => !matched,
        }
    }

    pub fn policy(&self) -> MaskPolicy {
        self.policy
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pattern = self.pattern.as_ref().map(Regex::as_str).unwrap_or("");
        write!(f, "{}--{}", pattern, self.policy.as_str())
    }
}
