//! Variable extraction: explicit per-category rules plus the generic
//! `key=value` fallback.

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static KEY_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_.]*)=([^\s,;]+)").expect("valid key=value regex")
});

/// When the generic `key=value` pattern is applied.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyValueMode {
    /// Only when no explicit rule is configured
    #[default]
    Auto,
    /// Always, for keys without an explicit rule
    Always,
    /// Never
    Never,
}

/// An explicit extraction rule: `category` receives the number captured by
/// the single group of `pattern`.
#[derive(Debug, Clone)]
pub struct VariableRule {
    pub category: String,
    pub pattern: Regex,
}

impl VariableRule {
    pub fn new(category: &str, pattern: &str) -> Result<Self> {
        let category = category.trim();
        if category.is_empty() {
            return Err(anyhow!("Tracking rule has an empty category name"));
        }

        let pattern = Regex::new(pattern)
            .with_context(|| format!("Invalid pattern for tracked category '{}'", category))?;

        // captures_len counts the implicit whole-match group
        if pattern.captures_len() != 2 {
            return Err(anyhow!(
                "Pattern for tracked category '{}' must have exactly one capture group, found {}",
                category,
                pattern.captures_len() - 1
            ));
        }

        Ok(Self {
            category: category.to_string(),
            pattern,
        })
    }

    /// Parse a `category=pattern` specification (the pattern may itself contain `=`).
    pub fn parse_spec(spec: &str) -> Result<Self> {
        let (category, pattern) = spec
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid tracking rule '{}': expected category=pattern", spec))?;
        Self::new(category, pattern)
    }
}

/// One captured candidate value, not yet checked for being numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableMatch<'a> {
    pub category: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct Extractor {
    rules: Vec<VariableRule>,
    key_values: KeyValueMode,
}

impl Extractor {
    pub fn new(rules: Vec<VariableRule>, key_values: KeyValueMode) -> Self {
        Self { rules, key_values }
    }

    fn generic_enabled(&self) -> bool {
        match self.key_values {
            KeyValueMode::Auto => self.rules.is_empty(),
            KeyValueMode::Always => true,
            KeyValueMode::Never => false,
        }
    }

    fn has_rule_for(&self, category: &str) -> bool {
        self.rules.iter().any(|rule| rule.category == category)
    }

    /// All candidate matches in `line`: explicit rules in configuration order,
    /// then generic pairs in the order they appear. Generic pairs whose key has
    /// an explicit rule are left to that rule.
    pub fn matches<'a>(&'a self, line: &'a str) -> Vec<VariableMatch<'a>> {
        let mut found = Vec::new();

        for rule in &self.rules {
            for caps in rule.pattern.captures_iter(line) {
                if let Some(value) = caps.get(1) {
                    found.push(VariableMatch {
                        category: &rule.category,
                        value: value.as_str(),
                    });
                }
            }
        }

        if self.generic_enabled() {
            for caps in KEY_VALUE_RE.captures_iter(line) {
                let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                if self.has_rule_for(key.as_str()) {
                    continue;
                }
                found.push(VariableMatch {
                    category: key.as_str(),
                    value: value.as_str(),
                });
            }
        }

        found
    }
}

/// Interpret a captured value as a finite number.
pub fn parse_numeric(value: &str) -> Option<f64> {
    value
        .trim_matches('"')
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}
