use thiserror::Error;

pub type SnareResult<T, E = SnareError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SnareError {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("other: {0}")]
  Other(String),
}

impl From<&str> for SnareError {
  fn from(s: &str) -> Self {
    SnareError::Other(s.to_owned())
  }
}

/// A source unit could not be turned into a model. Terminal for that file only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{unit}:{line}:{col}: {reason}")]
pub struct ParseError {
  pub unit: String,
  pub line: usize,
  pub col: usize,
  pub reason: String,
}

impl ParseError {
  pub fn new(unit: impl Into<String>, line: usize, col: usize, reason: impl Into<String>) -> Self {
    Self { unit: unit.into(), line, col, reason: reason.into() }
  }

  /// Whole-file failure (unreadable, binary, bad encoding).
  pub fn unit(unit: impl Into<String>, reason: impl Into<String>) -> Self {
    Self::new(unit, 0, 0, reason)
  }
}

/// Invalid rule or word-list configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("unknown rule id `{0}`")]
  UnknownRule(String),

  #[error("rule `{0}` is both enabled and disabled")]
  Conflict(String),

  #[error("`{list}` contains an empty entry")]
  EmptyEntry { list: String },

  #[error("unknown severity `{0}` (expected low, medium, high or critical)")]
  Severity(String),

  #[error("malformed config {path}: {source}")]
  Toml {
    path: String,
    #[source]
    source: toml::de::Error,
  },

  #[error("cannot read config {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// A rule predicate hit structure it cannot evaluate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("rule `{rule}` failed: {reason}")]
pub struct RuleError {
  pub rule: &'static str,
  pub reason: String,
}

impl RuleError {
  pub fn new(rule: &'static str, reason: impl Into<String>) -> Self {
    Self { rule, reason: reason.into() }
  }
}

#[test]
fn parse_error_display_carries_location() {
  let e = ParseError::new("Foo.java", 3, 7, "unbalanced braces");
  assert_eq!(e.to_string(), "Foo.java:3:7: unbalanced braces");
}

#[test]
fn config_error_wraps_into_snare_error() {
  let e: SnareError = ConfigError::UnknownRule("nope".into()).into();
  assert!(matches!(e, SnareError::Config(ConfigError::UnknownRule(_))));
  assert_eq!(e.to_string(), "unknown rule id `nope`");
}
