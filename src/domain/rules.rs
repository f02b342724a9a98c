//! Regex rules with per-rule debounce.

use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, info};

use super::error::DaemonError;
use super::types::{Command, LogLine};
use crate::config::RuleConfig;

/// Immutable rule definition.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub pattern: Regex,
    pub command: String,
    pub debounce: Duration,
}

impl Rule {
    /// Compile a rule from its configuration entry.
    ///
    /// # Errors
    ///
    /// Returns error if the pattern is not a valid regex.
    pub fn from_config(config: &RuleConfig) -> Result<Self, DaemonError> {
        Ok(Self {
            name: config.name.clone(),
            pattern: Regex::new(&config.pattern)?,
            command: config.command.clone(),
            debounce: Duration::from_secs(config.debounce_secs),
        })
    }

    /// True when the pattern matches anywhere in the line.
    pub fn matches(&self, line: &LogLine) -> bool {
        self.pattern.is_match(line.as_str())
    }
}

/// Evaluates lines against every rule and decides which ones fire.
///
/// `last_fired[i]` belongs to `rules[i]`; both are owned by the single
/// rule worker thread.
pub struct RuleEngine {
    rules: Vec<Rule>,
    last_fired: Vec<Option<Instant>>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>) -> Self {
        let last_fired = vec![None; rules.len()];
        Self { rules, last_fired }
    }

    /// Compile all configured rules.
    pub fn from_config(configs: &[RuleConfig]) -> Result<Self, DaemonError> {
        let rules = configs
            .iter()
            .map(Rule::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        if rules.is_empty() {
            return Err(DaemonError::Config("no rules configured".to_string()));
        }
        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Evaluate a line now.
    pub fn evaluate(&mut self, line: &LogLine) -> Vec<Command> {
        self.evaluate_at(line, Instant::now())
    }

    /// Evaluate a line as if it arrived at `now`.
    ///
    /// A rule fires on its first match, and afterwards only once at least
    /// its debounce interval has elapsed since it last fired. Matches inside
    /// the window are dropped and do not extend it.
    pub fn evaluate_at(&mut self, line: &LogLine, now: Instant) -> Vec<Command> {
        let mut fired = Vec::new();

        for (rule, last) in self.rules.iter().zip(self.last_fired.iter_mut()) {
            if !rule.matches(line) {
                continue;
            }

            if let Some(previous) = *last {
                let elapsed = now.saturating_duration_since(previous);
                if elapsed < rule.debounce {
                    debug!(
                        rule = %rule.name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Match suppressed by debounce"
                    );
                    continue;
                }
            }

            info!(rule = %rule.name, line = %line, "Rule fired");
            *last = Some(now);
            fired.push(Command {
                rule: rule.name.clone(),
                command_line: rule.command.clone(),
                submitted_at: now,
            });
        }

        fired
    }
}
