use crate::errors::ConfigError;
use crate::labels::Cap;
use crate::rules::{RuleSet, Severity};
use console::style;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

static DEFAULT_CONFIG_TOML: &str = include_str!("../../default-snare.conf");

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    /// The minimum severity level to output
    pub min_severity: Severity,

    /// File extensions picked up when walking a directory.
    pub extensions: Vec<String>,

    /// The maximum file size to scan, in megabytes.
    pub max_file_size_mb: Option<u64>,

    /// File extensions to exclude from scanning.
    pub excluded_extensions: Vec<String>,

    /// Directories to exclude from scanning.
    pub excluded_directories: Vec<String>,

    /// Whether to respect the global ignore file or not.
    pub read_global_ignore: bool,

    /// Whether to respect VCS ignore files (`.gitignore`, ..) or not.
    pub read_vcsignore: bool,

    /// Whether to require a `.git` directory to respect gitignore files.
    pub require_git_to_read_vcsignore: bool,

    /// Whether to limit the search to starting file system or not.
    pub one_file_system: bool,

    /// Whether to follow symlinks or not.
    pub follow_symlinks: bool,

    /// Whether to scan hidden files or not.
    pub scan_hidden_files: bool,
}
impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            min_severity: Severity::Low,
            extensions: strings(&["java"]),
            max_file_size_mb: None,
            excluded_extensions: strings(&["jar", "class", "war", "zip", "gz", "png", "jpg"]),
            excluded_directories: strings(&["node_modules", ".git", "target", "build", ".gradle", ".idea"]),
            read_global_ignore: false,
            read_vcsignore: true,
            require_git_to_read_vcsignore: true,
            one_file_system: false,
            follow_symlinks: false,
            scan_hidden_files: false,
        }
    }
}

/// Rule selection. An empty `enabled` list means every rule in the catalog.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RulesConfig {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HeuristicsConfig {
    /// Case-insensitive substrings that mark a field name as holding a secret.
    pub secret_names: Vec<String>,

    /// Cipher transform components that are never acceptable.
    pub weak_ciphers: Vec<String>,

    /// Parameter types treated as externally controlled in non-private methods.
    pub tainted_parameter_types: Vec<String>,

    /// Built-in entries to drop from the lists above.
    pub remove: HeuristicsRemovals,
}

/// Entries a user file takes out of the default word lists. Matched
/// case-insensitively.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct HeuristicsRemovals {
    pub secret_names: Vec<String>,
    pub weak_ciphers: Vec<String>,
    pub tainted_parameter_types: Vec<String>,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            secret_names: strings(&[
                "key", "secret", "password", "passwd", "pwd", "token", "credential", "apikey", "api_key",
                "private_key",
            ]),
            weak_ciphers: strings(&["DES", "DESede", "TripleDES", "RC2", "RC4", "ARCFOUR", "Blowfish", "ECB"]),
            tainted_parameter_types: strings(&[
                "String",
                "String[]",
                "HttpServletRequest",
                "ServletRequest",
                "InputStream",
                "Reader",
            ]),
            remove: HeuristicsRemovals::default(),
        }
    }
}

/// Callee matchers grouped by the capability they act on.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CapLists {
    pub sql: Vec<String>,
    pub html: Vec<String>,
    pub path: Vec<String>,
    pub shell: Vec<String>,
    pub cipher: Vec<String>,
    pub redirect: Vec<String>,
    pub deserialize: Vec<String>,
    pub random: Vec<String>,
}

impl CapLists {
    pub fn entries(&self) -> impl Iterator<Item = (Cap, &String)> {
        [
            (Cap::SQL, &self.sql),
            (Cap::HTML, &self.html),
            (Cap::PATH, &self.path),
            (Cap::SHELL, &self.shell),
            (Cap::CIPHER, &self.cipher),
            (Cap::REDIRECT, &self.redirect),
            (Cap::DESERIALIZE, &self.deserialize),
            (Cap::RANDOM, &self.random),
        ]
        .into_iter()
        .flat_map(|(cap, list)| list.iter().map(move |m| (cap, m)))
    }

    fn named_lists(&self) -> [(&'static str, &Vec<String>); 8] {
        [
            ("sql", &self.sql),
            ("html", &self.html),
            ("path", &self.path),
            ("shell", &self.shell),
            ("cipher", &self.cipher),
            ("redirect", &self.redirect),
            ("deserialize", &self.deserialize),
            ("random", &self.random),
        ]
    }

    fn merge(&mut self, other: CapLists) {
        extend_sorted(&mut self.sql, other.sql);
        extend_sorted(&mut self.html, other.html);
        extend_sorted(&mut self.path, other.path);
        extend_sorted(&mut self.shell, other.shell);
        extend_sorted(&mut self.cipher, other.cipher);
        extend_sorted(&mut self.redirect, other.redirect);
        extend_sorted(&mut self.deserialize, other.deserialize);
        extend_sorted(&mut self.random, other.random);
    }
}

/// Extra label matchers appended to the built-in Java table.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct LabelsConfig {
    pub sources: Vec<String>,
    pub writers: Vec<String>,
    pub sanitizers: CapLists,
    pub guards: CapLists,
    pub sinks: CapLists,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// The default output format.
    pub default_format: OutputFormat,

    /// Suppress configuration notes on stderr.
    pub quiet: bool,

    /// The maximum number of results to show.
    pub max_results: Option<usize>,

    /// Lowest severity that makes `scan` exit with status 1.
    pub fail_on: Severity,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: OutputFormat::Text,
            quiet: false,
            max_results: None,
            fail_on: Severity::Low,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PerformanceConfig {
    /// The maximum number of worker threads to use, or `None` to auto-detect.
    pub worker_threads: Option<usize>,

    /// The maximum number of paths sent over the walk channel at once.
    pub batch_size: usize,

    /// capacity = threads × this
    pub channel_multiplier: usize,

    /// The stack size for Rayon threads, in bytes.
    pub rayon_thread_stack_size: usize,

    /// Budget for scanning a single file, after which it is reported as cancelled.
    pub scan_timeout_secs: Option<u64>,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            batch_size: 100usize,
            channel_multiplier: 4usize,
            rayon_thread_stack_size: 8 * 1024 * 1024, // 8 MiB
            scan_timeout_secs: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub scanner: ScannerConfig,
    pub rules: RulesConfig,
    pub heuristics: HeuristicsConfig,
    pub labels: LabelsConfig,
    pub output: OutputConfig,
    pub performance: PerformanceConfig,
}

impl Config {
    /// Write `snare.conf` into `config_dir` if it is missing, then merge an
    /// explicit override file (or `snare.local`) over the defaults.
    pub fn load(config_dir: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let default_config_path = config_dir.join("snare.conf");
        if !default_config_path.exists() {
            create_example_config(config_dir);
        }

        let user_config_path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config_dir.join("snare.local"));

        if user_config_path.exists() || explicit.is_some() {
            let user_config = read_user_config(&user_config_path)?;
            config = merge_configs(config, user_config);

            if !config.output.quiet {
                eprintln!(
                    "{}: Loaded user config from: {}\n",
                    style("note").green().bold(),
                    style(user_config_path.display()).underlined().white().bold()
                );
            }
        } else {
            eprintln!(
                "{}: Using {} configuration.\n      Create file in '{}' to customize.\n",
                style("note").green().bold(),
                style("default").bold(),
                style(user_config_path.display()).underlined().white().bold()
            );
        }

        Ok(config)
    }

    /// Reject configurations that would make a scan meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        RuleSet::from_config(&self.rules)?;

        let mut lists: Vec<(String, &Vec<String>)> = vec![
            ("rules.enabled".into(), &self.rules.enabled),
            ("rules.disabled".into(), &self.rules.disabled),
            ("heuristics.secret_names".into(), &self.heuristics.secret_names),
            ("heuristics.weak_ciphers".into(), &self.heuristics.weak_ciphers),
            ("heuristics.tainted_parameter_types".into(), &self.heuristics.tainted_parameter_types),
            ("heuristics.remove.secret_names".into(), &self.heuristics.remove.secret_names),
            ("heuristics.remove.weak_ciphers".into(), &self.heuristics.remove.weak_ciphers),
            (
                "heuristics.remove.tainted_parameter_types".into(),
                &self.heuristics.remove.tainted_parameter_types,
            ),
            ("scanner.extensions".into(), &self.scanner.extensions),
            ("labels.sources".into(), &self.labels.sources),
            ("labels.writers".into(), &self.labels.writers),
        ];
        for (group, caps) in [
            ("sanitizers", &self.labels.sanitizers),
            ("guards", &self.labels.guards),
            ("sinks", &self.labels.sinks),
        ] {
            for (cap, list) in caps.named_lists() {
                lists.push((format!("labels.{group}.{cap}"), list));
            }
        }

        for (name, list) in lists {
            if list.iter().any(|entry| entry.trim().is_empty()) {
                return Err(ConfigError::EmptyEntry { list: name });
            }
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn create_example_config(config_dir: &Path) {
    let example_path = config_dir.join("snare.conf");
    if let Err(e) = fs::create_dir_all(config_dir).and_then(|_| fs::write(&example_path, DEFAULT_CONFIG_TOML)) {
        tracing::debug!("could not write example config to {}: {e}", example_path.display());
        return;
    }
    tracing::debug!("Example config created at: {}", example_path.display());
}

fn read_user_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Toml {
        path: path.display().to_string(),
        source,
    })
}

fn extend_sorted(into: &mut Vec<String>, more: Vec<String>) {
    into.extend(more);
    into.sort_unstable();
    into.dedup();
}

fn remove_listed(from: &mut Vec<String>, drop: &[String]) {
    from.retain(|entry| !drop.iter().any(|d| d.eq_ignore_ascii_case(entry)));
}

/// Merge user config into default config: word lists are unioned minus the
/// user's `[heuristics.remove]` entries, every scalar is taken from the user
/// side.
fn merge_configs(mut default: Config, user: Config) -> Config {
    // --- ScannerConfig ---
    default.scanner.min_severity = user.scanner.min_severity;
    default.scanner.max_file_size_mb = user.scanner.max_file_size_mb;
    default.scanner.read_global_ignore = user.scanner.read_global_ignore;
    default.scanner.read_vcsignore = user.scanner.read_vcsignore;
    default.scanner.require_git_to_read_vcsignore = user.scanner.require_git_to_read_vcsignore;
    default.scanner.one_file_system = user.scanner.one_file_system;
    default.scanner.follow_symlinks = user.scanner.follow_symlinks;
    default.scanner.scan_hidden_files = user.scanner.scan_hidden_files;
    extend_sorted(&mut default.scanner.extensions, user.scanner.extensions);
    extend_sorted(&mut default.scanner.excluded_extensions, user.scanner.excluded_extensions);
    extend_sorted(&mut default.scanner.excluded_directories, user.scanner.excluded_directories);

    // --- RulesConfig ---
    default.rules = user.rules;

    // --- HeuristicsConfig ---
    extend_sorted(&mut default.heuristics.secret_names, user.heuristics.secret_names);
    extend_sorted(&mut default.heuristics.weak_ciphers, user.heuristics.weak_ciphers);
    extend_sorted(
        &mut default.heuristics.tainted_parameter_types,
        user.heuristics.tainted_parameter_types,
    );
    let removed = user.heuristics.remove;
    remove_listed(&mut default.heuristics.secret_names, &removed.secret_names);
    remove_listed(&mut default.heuristics.weak_ciphers, &removed.weak_ciphers);
    remove_listed(&mut default.heuristics.tainted_parameter_types, &removed.tainted_parameter_types);
    default.heuristics.remove = removed;

    // --- LabelsConfig ---
    extend_sorted(&mut default.labels.sources, user.labels.sources);
    extend_sorted(&mut default.labels.writers, user.labels.writers);
    default.labels.sanitizers.merge(user.labels.sanitizers);
    default.labels.guards.merge(user.labels.guards);
    default.labels.sinks.merge(user.labels.sinks);

    // --- OutputConfig ---
    default.output = user.output;

    // --- PerformanceConfig ---
    default.performance = user.performance;

    default
}

#[test]
fn merge_configs_dedupes_and_sorts_word_lists() {
    let mut default_cfg = Config::default();
    default_cfg.heuristics.weak_ciphers = vec!["RC4".into(), "DES".into()];

    let mut user_cfg = Config::default();
    user_cfg.heuristics.weak_ciphers = vec!["IDEA".into(), "RC4".into()];

    let merged = merge_configs(default_cfg, user_cfg);

    assert_eq!(merged.heuristics.weak_ciphers, vec!["DES", "IDEA", "RC4"]);
}

#[test]
fn remove_lists_drop_built_in_words() {
    let user: Config = toml::from_str(
        r#"
        [heuristics]
        weak_ciphers = ["IDEA"]

        [heuristics.remove]
        weak_ciphers = ["ecb"]
        secret_names = ["key"]
    "#,
    )
    .unwrap();
    let merged = merge_configs(Config::default(), user);

    assert!(merged.heuristics.weak_ciphers.contains(&"IDEA".to_string()));
    assert!(merged.heuristics.weak_ciphers.contains(&"DES".to_string()));
    assert!(!merged.heuristics.weak_ciphers.contains(&"ECB".to_string()));
    assert!(!merged.heuristics.secret_names.contains(&"key".to_string()));
    assert!(merged.heuristics.secret_names.contains(&"password".to_string()));
    assert!(merged.validate().is_ok());
}

#[test]
fn load_creates_example_and_reads_user_overrides() {
    let cfg_dir = tempfile::tempdir().unwrap();
    let cfg_path = cfg_dir.path();

    let user_toml = r#"
        [scanner]
        one_file_system = true

        [rules]
        disabled = ["public_mutable_field"]

        [heuristics]
        secret_names = ["salt"]

        [labels.sanitizers]
        sql = ["Quoter.quote"]

        [output]
        quiet = true
        fail_on = "high"
    "#;
    fs::write(cfg_path.join("snare.local"), user_toml).unwrap();

    let cfg = Config::load(cfg_path, None).expect("Config::load should succeed");

    assert!(cfg_path.join("snare.conf").is_file());
    assert!(cfg.scanner.one_file_system);
    assert!(cfg.output.quiet);
    assert_eq!(cfg.output.fail_on, Severity::High);
    assert_eq!(cfg.rules.disabled, vec!["public_mutable_field"]);
    assert!(cfg.heuristics.secret_names.contains(&"salt".to_string()));
    assert!(cfg.heuristics.secret_names.contains(&"password".to_string()));
    assert_eq!(cfg.labels.sanitizers.sql, vec!["Quoter.quote"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn explicit_config_errors_are_reported_with_path() {
    let cfg_dir = tempfile::tempdir().unwrap();
    let bad = cfg_dir.path().join("broken.toml");
    fs::write(&bad, "[rules\nenabled = 3").unwrap();

    let err = Config::load(cfg_dir.path(), Some(&bad)).unwrap_err();
    assert!(matches!(err, ConfigError::Toml { .. }));

    let missing = cfg_dir.path().join("absent.toml");
    let err = Config::load(cfg_dir.path(), Some(&missing)).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn validate_rejects_unknown_conflicting_and_empty_entries() {
    let mut cfg = Config::default();
    cfg.rules.enabled = vec!["no_such_rule".into()];
    assert!(matches!(cfg.validate(), Err(ConfigError::UnknownRule(id)) if id == "no_such_rule"));

    let mut cfg = Config::default();
    cfg.rules.enabled = vec!["command_injection".into()];
    cfg.rules.disabled = vec!["command_injection".into()];
    assert!(matches!(cfg.validate(), Err(ConfigError::Conflict(_))));

    let mut cfg = Config::default();
    cfg.heuristics.secret_names.push("  ".into());
    assert!(matches!(
        cfg.validate(),
        Err(ConfigError::EmptyEntry { list }) if list == "heuristics.secret_names"
    ));

    let mut cfg = Config::default();
    cfg.labels.sinks.shell.push(String::new());
    assert!(matches!(
        cfg.validate(),
        Err(ConfigError::EmptyEntry { list }) if list == "labels.sinks.shell"
    ));
}

#[test]
fn shipped_config_matches_built_in_defaults() {
    let shipped: Config = toml::from_str(DEFAULT_CONFIG_TOML).expect("default-snare.conf parses");
    assert_eq!(shipped, Config::default());
}

#[test]
fn effective_config_round_trips_through_toml() {
    let cfg = Config::default();
    let text = cfg.to_toml().unwrap();
    let back: Config = toml::from_str(&text).unwrap();
    assert_eq!(back, cfg);
}
