mod java;

use bitflags::bitflags;
use once_cell::sync::Lazy;

use crate::utils::config::LabelsConfig;

/// A single rule: if the callee path equals (or ends with) one of the
/// `matchers`, the call gets `label`. A matcher ending in `_` is a prefix
/// match on the final path segment instead.
#[derive(Debug, Clone, Copy)]
pub struct LabelRule {
  pub matchers: &'static [&'static str],
  pub label:    DataLabel,
}

bitflags! {
    /// What a tainted value can still break. Sources carry every bit,
    /// sanitizers and guards clear some, sinks need one set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Cap: u8 {
        const SQL         = 0b0000_0001;
        const HTML        = 0b0000_0010;
        const PATH        = 0b0000_0100;
        const SHELL       = 0b0000_1000;
        const CIPHER      = 0b0001_0000;
        const REDIRECT    = 0b0010_0000;
        const DESERIALIZE = 0b0100_0000;
        const RANDOM      = 0b1000_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLabel {
  Source(Cap),
  Sanitizer(Cap),
  /// Allow-list or validation check on the call's arguments. Only has an
  /// effect inside a condition.
  Guard(Cap),
  /// Check on the receiver itself, e.g. `path.startsWith(base)`.
  Check(Cap),
  Sink(Cap),
  /// Returns a stream that writes to the HTTP response.
  Writer,
}

/// Built-in Java matchers, lowercased once.
static BUILTIN: Lazy<Vec<(String, DataLabel)>> = Lazy::new(|| {
  let rules: Vec<_> = java::RULES
    .iter()
    .flat_map(|r| r.matchers.iter().map(move |m| (m.to_ascii_lowercase(), r.label)))
    .collect();
  tracing::debug!("built-in label table initialised ({} matchers)", rules.len());
  rules
});

/// Built-in Java labels followed by whatever the config adds.
#[derive(Debug, Clone)]
pub struct LabelSet {
  rules: Vec<(String, DataLabel)>,
}

impl Default for LabelSet {
  fn default() -> Self {
    Self::new(&LabelsConfig::default())
  }
}

impl LabelSet {
  pub fn new(extra: &LabelsConfig) -> Self {
    let mut rules = BUILTIN.clone();

    let lc = |s: &String| s.to_ascii_lowercase();
    rules.extend(extra.sources.iter().map(|m| (lc(m), DataLabel::Source(Cap::all()))));
    rules.extend(extra.writers.iter().map(|m| (lc(m), DataLabel::Writer)));
    rules.extend(extra.sanitizers.entries().map(|(cap, m)| (lc(m), DataLabel::Sanitizer(cap))));
    rules.extend(extra.guards.entries().map(|(cap, m)| (lc(m), DataLabel::Guard(cap))));
    rules.extend(extra.sinks.entries().map(|(cap, m)| (lc(m), DataLabel::Sink(cap))));

    if rules.len() > BUILTIN.len() {
      tracing::debug!("{} configured label matchers added", rules.len() - BUILTIN.len());
    }
    Self { rules }
  }

  /// Every label whose matcher accepts `path` (a dotted callee path).
  pub fn classify(&self, path: &str) -> Vec<DataLabel> {
    let text_lc = path.trim().to_ascii_lowercase();
    self.rules
      .iter()
      .filter(|(m, _)| matches(m, &text_lc))
      .map(|(_, label)| *label)
      .collect()
  }

  pub fn is_source(&self, path: &str) -> bool {
    self.classify(path).iter().any(|l| matches!(l, DataLabel::Source(_)))
  }

  pub fn is_writer(&self, path: &str) -> bool {
    self.classify(path).contains(&DataLabel::Writer)
  }

  pub fn sanitizer_caps(&self, path: &str) -> Cap {
    self.fold(path, |l| match l {
      DataLabel::Sanitizer(c) => Some(c),
      _ => None,
    })
  }

  pub fn guard_caps(&self, path: &str) -> Cap {
    self.fold(path, |l| match l {
      DataLabel::Guard(c) => Some(c),
      _ => None,
    })
  }

  pub fn check_caps(&self, path: &str) -> Cap {
    self.fold(path, |l| match l {
      DataLabel::Check(c) => Some(c),
      _ => None,
    })
  }

  pub fn sink_caps(&self, path: &str) -> Cap {
    self.fold(path, |l| match l {
      DataLabel::Sink(c) => Some(c),
      _ => None,
    })
  }

  fn fold(&self, path: &str, pick: impl Fn(DataLabel) -> Option<Cap>) -> Cap {
    self.classify(path)
      .into_iter()
      .filter_map(pick)
      .fold(Cap::empty(), |acc, c| acc | c)
  }
}

fn matches(m: &str, text_lc: &str) -> bool {
  if let Some(prefix) = m.strip_suffix('_') {
    let last = text_lc.rsplit('.').next().unwrap_or(text_lc);
    return last.starts_with(prefix);
  }
  if !text_lc.ends_with(m) {
    return false;
  }
  let start = text_lc.len() - m.len();
  start == 0 || matches!(text_lc.as_bytes()[start - 1], b'.' | b':')
}

#[test]
fn suffix_match_respects_segment_boundary() {
  let labels = LabelSet::default();
  assert!(labels.sink_caps("stmt.executeQuery").contains(Cap::SQL));
  assert!(labels.sink_caps("Runtime.getRuntime.exec").contains(Cap::SHELL));
  // `exec` must not match the tail of an unrelated name
  assert!(!labels.sink_caps("Util.spexec").contains(Cap::SHELL));
  assert!(labels.sink_caps("FileReader").contains(Cap::PATH));
  assert!(labels.sink_caps("java.io.File").contains(Cap::PATH));
  assert!(!labels.sink_caps("f.getFile").contains(Cap::PATH));
  assert!(labels.sink_caps("java.util.Random").contains(Cap::RANDOM));
  assert!(labels.sink_caps("Math.random").contains(Cap::RANDOM));
  assert!(!labels.sink_caps("java.security.SecureRandom").contains(Cap::RANDOM));
}

#[test]
fn prefix_matchers_apply_to_last_segment() {
  let labels = LabelSet::default();
  assert!(labels.is_source("request.getParameterValues"));
  assert!(labels.sanitizer_caps("StringEscapeUtils.escapeHtml4").contains(Cap::HTML));
  assert!(labels.guard_caps("validator.isAllowedCommand").contains(Cap::SHELL));
  assert!(labels.is_writer("response.getWriter"));
  // `startsWith` checks its receiver, `contains` its argument
  assert!(labels.check_caps("requested.startsWith").contains(Cap::PATH));
  assert!(labels.guard_caps("requested.startsWith").is_empty());
  assert!(labels.check_caps("ALLOWED.contains").is_empty());
}

#[test]
fn configured_extras_are_appended() {
  let mut cfg = LabelsConfig::default();
  cfg.sanitizers.sql.push("Quoter.quote".into());
  cfg.sources.push("readUntrusted".into());
  let labels = LabelSet::new(&cfg);
  assert_eq!(labels.sanitizer_caps("Quoter.quote"), Cap::SQL);
  assert!(labels.is_source("io.readUntrusted"));
  assert!(LabelSet::default().sanitizer_caps("Quoter.quote").is_empty());
}
