mod crypto;
mod flow;
mod hygiene;

use console::style;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{ConfigError, RuleError};
use crate::labels::LabelSet;
use crate::model::{FieldModel, Span, Statement};
use crate::taint::FlowState;
use crate::utils::config::{HeuristicsConfig, RulesConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Severity::Critical => style("CRITICAL").magenta().bold().to_string(),
            Severity::High => style("HIGH").red().bold().to_string(),
            Severity::Medium => style("MEDIUM").yellow().bold().to_string(),
            Severity::Low => style("LOW").cyan().bold().to_string(),
        };
        f.write_str(&s)
    }
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Critical, Severity::High, Severity::Medium, Severity::Low];

    /// Plain lowercase name, as used in config files and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl FromStr for Severity {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(ConfigError::Severity(input.to_owned())),
        }
    }
}

/// Static description of one rule.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuleMeta {
    /// Unique identifier (snake-case).
    pub id: &'static str,
    /// Human-readable explanation.
    pub description: &'static str,
    pub severity: Severity,
    /// What to change in the scanned code.
    pub remediation: &'static str,
}

/// Everything a statement-level predicate may look at.
pub struct StmtCx<'a> {
    pub stmt: &'a Statement,
    /// State on entry to `stmt`.
    pub state: &'a FlowState,
    pub labels: &'a LabelSet,
    pub heuristics: &'a HeuristicsConfig,
}

pub struct FieldCx<'a> {
    pub field: &'a FieldModel,
    pub heuristics: &'a HeuristicsConfig,
}

/// A vulnerability predicate. Implementations are stateless; every match
/// site is pushed into `out`.
pub trait Rule: Send + Sync {
    fn meta(&self) -> &'static RuleMeta;

    fn check_statement(&self, _cx: &StmtCx<'_>, _out: &mut Vec<Span>) -> Result<(), RuleError> {
        Ok(())
    }

    fn check_field(&self, _cx: &FieldCx<'_>, _out: &mut Vec<Span>) -> Result<(), RuleError> {
        Ok(())
    }
}

/// Every rule the scanner knows, in reporting order of the catalog listing.
pub static CATALOG: &[&dyn Rule] = &[
    &flow::InjectionViaConcatenation,
    &flow::UnescapedOutput,
    &flow::UnvalidatedPathUse,
    &crypto::WeakCipherSelection,
    &crypto::HardcodedSecret,
    &flow::CommandInjection,
    &flow::OpenRedirect,
    &flow::InsecureDeserialization,
    &crypto::WeakRandomness,
    &hygiene::PossibleNullDereference,
    &hygiene::PublicMutableField,
];

pub fn find(id: &str) -> Option<&'static dyn Rule> {
    CATALOG.iter().copied().find(|r| r.meta().id == id)
}

/// The rules active for one scan.
#[derive(Clone)]
pub struct RuleSet {
    active: Vec<&'static dyn Rule>,
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl RuleSet {
    pub fn all() -> Self {
        Self { active: CATALOG.to_vec() }
    }

    /// Apply `[rules] enabled/disabled`. Unknown ids and ids listed on both
    /// sides are configuration errors.
    pub fn from_config(cfg: &RulesConfig) -> Result<Self, ConfigError> {
        for id in cfg.enabled.iter().chain(cfg.disabled.iter()) {
            if find(id).is_none() {
                return Err(ConfigError::UnknownRule(id.clone()));
            }
        }
        if let Some(id) = cfg.enabled.iter().find(|id| cfg.disabled.contains(*id)) {
            return Err(ConfigError::Conflict(id.clone()));
        }

        let active = CATALOG
            .iter()
            .copied()
            .filter(|rule| {
                let id = rule.meta().id;
                let on = (cfg.enabled.is_empty() || cfg.enabled.iter().any(|e| e == id))
                    && !cfg.disabled.iter().any(|d| d == id);
                if !on {
                    tracing::debug!(rule = id, "rule disabled by configuration");
                }
                on
            })
            .collect();
        Ok(Self { active })
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static dyn Rule> + '_ {
        self.active.iter().copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.iter().map(|r| r.meta().id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids().any(|i| i == id)
    }
}

#[test]
fn severity_orders_low_to_critical() {
    assert!(Severity::Low < Severity::Medium);
    assert!(Severity::High < Severity::Critical);
    assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
    assert!(matches!("urgent".parse::<Severity>(), Err(ConfigError::Severity(_))));
}

#[test]
fn catalog_ids_are_unique_and_complete() {
    let ids: Vec<_> = RuleSet::all().ids().collect();
    assert_eq!(
        ids,
        vec![
            "injection_via_concatenation",
            "unescaped_output",
            "unvalidated_path_use",
            "weak_cipher_selection",
            "hardcoded_secret",
            "command_injection",
            "open_redirect",
            "insecure_deserialization",
            "weak_randomness",
            "possible_null_dereference",
            "public_mutable_field",
        ]
    );
    let severities: Vec<_> = CATALOG.iter().map(|r| r.meta().severity).collect();
    assert_eq!(
        severities,
        vec![
            Severity::Critical,
            Severity::High,
            Severity::High,
            Severity::High,
            Severity::High,
            Severity::Critical,
            Severity::Medium,
            Severity::Critical,
            Severity::Medium,
            Severity::Medium,
            Severity::Low,
        ]
    );
}

#[test]
fn enabled_list_restricts_and_disabled_list_removes() {
    let only = RuleSet::from_config(&RulesConfig {
        enabled: vec!["command_injection".into(), "hardcoded_secret".into()],
        disabled: vec![],
    })
    .unwrap();
    assert_eq!(only.ids().collect::<Vec<_>>(), vec!["hardcoded_secret", "command_injection"]);

    let without = RuleSet::from_config(&RulesConfig {
        enabled: vec![],
        disabled: vec!["public_mutable_field".into()],
    })
    .unwrap();
    assert!(!without.contains("public_mutable_field"));
    assert_eq!(without.ids().count(), CATALOG.len() - 1);
}
