//! Semantic validation of the merged settings tree.
//!
//! Rules implement a small fixed interface and are registered in an explicit
//! ordered list. The engine runs every rule and concatenates their findings;
//! a failing rule never stops the others from running. Validation findings
//! are data, not exceptions; whether accumulated errors are fatal is the
//! caller's decision.

use serde::Serialize;
use serde_json::{Map, Value};

/// A single validation finding.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationError {
    /// Human-readable description of the constraint that failed.
    pub message: String,
    /// The subtree the rule was inspecting when it failed.
    pub context: Value,
}

impl ValidationError {
    /// Record a constraint failure against the given subtree.
    pub fn invalid(context: &Value, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: context.clone(),
        }
    }
}

/// A named validation rule over the merged settings tree.
pub trait Rule: Send + Sync {
    /// Stable rule name, used in logs.
    fn name(&self) -> &'static str;

    /// Inspect the settings tree and return any findings.
    fn check(&self, settings: &Map<String, Value>, role: &str) -> Vec<ValidationError>;
}

/// Ordered registry of validation rules.
pub struct ValidatorEngine {
    rules: Vec<Box<dyn Rule>>,
}

impl ValidatorEngine {
    /// Create an engine with no rules registered.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Register a rule. Rules run in registration order.
    pub fn register(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Run every registered rule against the tree and concatenate findings.
    pub fn run(&self, settings: &Map<String, Value>, role: &str) -> Vec<ValidationError> {
        let mut findings = Vec::new();
        for rule in &self.rules {
            let mut errors = rule.check(settings, role);
            if !errors.is_empty() {
                tracing::debug!(rule = rule.name(), count = errors.len(), "rule found errors");
            }
            findings.append(&mut errors);
        }
        findings
    }
}

impl Default for ValidatorEngine {
    /// Engine with the built-in rule set.
    fn default() -> Self {
        let mut engine = Self::empty();
        engine.register(Box::new(SpawnLimitRule));
        engine
    }
}

/// Validates the `legion` category: when present it must be a mapping whose
/// `spawn` entry is a mapping with a positive integer `limit`.
pub struct SpawnLimitRule;

impl Rule for SpawnLimitRule {
    fn name(&self) -> &'static str {
        "legion_spawn_limit"
    }

    fn check(&self, settings: &Map<String, Value>, _role: &str) -> Vec<ValidationError> {
        let Some(legion) = settings.get("legion") else {
            return Vec::new();
        };
        let Some(legion_map) = legion.as_object() else {
            return vec![ValidationError::invalid(legion, "legion must be a hash")];
        };
        let spawn = legion_map.get("spawn");
        let Some(spawn_map) = spawn.and_then(Value::as_object) else {
            return vec![ValidationError::invalid(legion, "legion spawn must be a hash")];
        };
        match spawn_map.get("limit").and_then(Value::as_i64) {
            Some(limit) if limit > 0 => Vec::new(),
            Some(_) => vec![ValidationError::invalid(
                legion,
                "legion spawn limit must be greater than 0",
            )],
            None => vec![ValidationError::invalid(
                legion,
                "legion spawn limit must be an integer",
            )],
        }
    }
}
