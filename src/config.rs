//! Host-supplied surface configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pixel metrics the GUI layer measures once and hands to the core.
///
/// The layout math is unit-agnostic; "pixels" here is whatever unit the
/// host's scrollbar and viewport speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceMetrics {
    /// Height of one row of terminal text.
    pub line_height: i64,
    /// Height of the always-visible header bar on a command frame.
    pub frame_header_height: i64,
}

impl Default for SurfaceMetrics {
    fn default() -> Self {
        Self {
            line_height: 20,
            frame_header_height: 24,
        }
    }
}

/// How a no-frame rule matches a command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Word-by-word prefix match against the command and its arguments.
    Name,
    /// Regular expression tested against the whole trimmed command line.
    Regex,
}

/// One host-configured command line rule.
///
/// Rules with `frame: false` suppress framing for matching commands; rules
/// with `frame: true` are inert here and kept only so a host config can round
/// trip through this type unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLineAction {
    #[serde(rename = "match")]
    pub pattern: String,
    pub match_kind: MatchKind,
    pub frame: bool,
}

/// Top-level configuration for one terminal surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Scrollback size budget in pixels. Eviction keeps the total virtual
    /// height within 1.1x this value.
    pub scrollback_budget: i64,
    #[serde(default)]
    pub metrics: SurfaceMetrics,
    #[serde(default)]
    pub command_line_actions: Vec<CommandLineAction>,
}

impl SurfaceConfig {
    pub fn new(scrollback_budget: i64) -> Self {
        Self {
            scrollback_budget,
            metrics: SurfaceMetrics::default(),
            command_line_actions: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid no-frame pattern {pattern:?}: {source}")]
    BadPattern {
        pattern: String,
        source: regex::Error,
    },
}

enum RuleMatcher {
    Name(Vec<String>),
    Regex(Regex),
}

/// Compiled form of the `frame: false` subset of [`CommandLineAction`]s.
pub struct NoFrameRules {
    matchers: Vec<RuleMatcher>,
}

impl NoFrameRules {
    pub fn compile(actions: &[CommandLineAction]) -> Result<Self, ConfigError> {
        let mut matchers = Vec::new();
        for action in actions.iter().filter(|action| !action.frame) {
            let matcher = match action.match_kind {
                MatchKind::Name => RuleMatcher::Name(
                    action
                        .pattern
                        .split_whitespace()
                        .map(str::to_string)
                        .collect(),
                ),
                MatchKind::Regex => RuleMatcher::Regex(Regex::new(&action.pattern).map_err(
                    |source| ConfigError::BadPattern {
                        pattern: action.pattern.clone(),
                        source,
                    },
                )?),
            };
            matchers.push(matcher);
        }
        Ok(Self { matchers })
    }

    pub fn empty() -> Self {
        Self {
            matchers: Vec::new(),
        }
    }

    /// Whether framing should be skipped for this command line.
    ///
    /// An empty command line never gets a frame.
    pub fn is_no_frame(&self, command_line: &str) -> bool {
        let clean = command_line.trim();
        if clean.is_empty() {
            return true;
        }

        let command_parts: Vec<&str> = clean.split_whitespace().collect();
        self.matchers.iter().any(|matcher| match matcher {
            RuleMatcher::Name(parts) => {
                parts.len() <= command_parts.len()
                    && parts
                        .iter()
                        .zip(command_parts.iter())
                        .all(|(rule, word)| rule == word)
            }
            RuleMatcher::Regex(regex) => regex.is_match(clean),
        })
    }
}
