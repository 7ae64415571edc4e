//! Configuration validation engine.
//!
//! Validates TOML configuration files against the known schema, detects
//! unknown/misspelled fields, and reports settings that cannot work together.

use std::{collections::HashMap, path::Path};

use crate::schema::MinerConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "range", "instance", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "browser.max_browsers"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

/// Represents the expected shape of the configuration schema.
enum KnownKeys {
    /// A struct with fixed field names.
    Struct(HashMap<&'static str, KnownKeys>),
    /// An array of typed items.
    Array(Box<KnownKeys>),
    /// Scalar value; recursion stops here.
    Leaf,
}

/// Build the full schema map mirroring every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Array, Leaf, Struct};

    let leaves = |names: &[&'static str]| Struct(names.iter().map(|n| (*n, Leaf)).collect());

    let browser = leaves(&[
        "min_browsers",
        "max_browsers",
        "pages_per_browser",
        "headless",
        "chrome_path",
        "chrome_args",
        "viewport_width",
        "viewport_height",
        "device_scale_factor",
        "user_agent",
        "navigation_timeout_ms",
        "page_idle_timeout_secs",
        "health_check_interval_secs",
        "health_check_timeout_ms",
        "auto_scale",
        "scale_check_interval_secs",
        "scale_up_threshold",
        "scale_down_threshold",
        "scale_down_cooldown_secs",
    ]);

    let endpoint = leaves(&[
        "id", "host", "port", "protocol", "username", "password", "country", "provider",
    ]);

    let policy = Struct(HashMap::from([
        ("user_agent", Leaf),
        ("respect_robots", Leaf),
        ("robots_cache_ttl_secs", Leaf),
        ("robots_timeout_ms", Leaf),
        ("min_crawl_delay_ms", Leaf),
        ("max_crawl_delay_ms", Leaf),
        ("requests_per_second", Leaf),
        ("per_domain_limit", Leaf),
        (
            "retry",
            leaves(&["max_attempts", "base_delay_ms", "max_backoff_ms"]),
        ),
        (
            "proxy",
            Struct(HashMap::from([
                ("enabled", Leaf),
                ("strategy", Leaf),
                ("endpoints", Array(Box::new(endpoint))),
            ])),
        ),
    ]));

    let extractor = leaves(&[
        "min_importance_score",
        "max_depth",
        "max_layers",
        "cache_enabled",
        "cache_ttl_secs",
        "cache_max_entries",
    ]);

    let instance = Struct(HashMap::from([
        ("name", Leaf),
        ("topic", Leaf),
        ("urls", Leaf),
        (
            "attributes",
            Array(Box::new(leaves(&[
                "name",
                "selector",
                "attribute",
                "multiple",
            ]))),
        ),
        ("custom_extractors", Leaf),
        ("extract_structure", Leaf),
        ("follow_links", Leaf),
        ("max_discovered_urls", Leaf),
    ]));

    Struct(HashMap::from([
        ("browser", browser),
        ("policy", policy),
        ("extractor", extractor),
        (
            "miner",
            leaves(&["event_buffer", "max_concurrent_instances"]),
        ),
        ("metrics", leaves(&["enabled", "prometheus"])),
        ("instances", Array(Box::new(instance))),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Find the best match for `needle` among `candidates` using Levenshtein
/// distance. Returns `Some(best)` if the distance is <= `max_distance`.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = if let Some(p) = path {
        Some(p.to_path_buf())
    } else {
        crate::loader::find_config_file()
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    match std::fs::read_to_string(actual_path) {
        Ok(content) => {
            let content = crate::env_subst::substitute_env(&content);
            let mut result = validate_toml_str(&content);
            result.config_path = Some(actual_path.clone());
            result
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path: Some(actual_path.clone()),
        },
    }
}

/// Validate a TOML string without file-system side effects.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    // 1. Syntax: parse raw TOML
    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    // 2. Unknown fields: walk the TOML tree against KnownKeys
    let schema = build_schema_map();
    check_unknown_fields(&toml_value, &schema, "", &mut diagnostics);

    // 3. Type check and semantic checks on the parsed config
    match toml::from_str::<MinerConfig>(toml_str) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Validate an already-parsed config (YAML/JSON sources, programmatic configs).
#[must_use]
pub fn validate_config(config: &MinerConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();
    check_semantics(config, &mut diagnostics);
    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Walk the TOML value tree against the schema tree and flag unknown keys.
fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (value, schema) {
        (toml::Value::Table(table), KnownKeys::Struct(fields)) => {
            let known_keys: Vec<&str> = fields.keys().copied().collect();
            for (key, child_value) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                if let Some(child_schema) = fields.get(key.as_str()) {
                    check_unknown_fields(child_value, child_schema, &path, diagnostics);
                } else {
                    let level = if prefix.is_empty() {
                        "at top level "
                    } else {
                        ""
                    };
                    let msg = match suggest(key, &known_keys, 3) {
                        Some(s) => format!("unknown field {level}(did you mean \"{s}\"?)"),
                        None => format!("unknown field {level}"),
                    };
                    diagnostics.push(Diagnostic {
                        severity: Severity::Error,
                        category: "unknown-field",
                        path,
                        message: msg.trim().to_string(),
                    });
                }
            }
        },
        (toml::Value::Array(arr), KnownKeys::Array(item_schema)) => {
            for (i, item) in arr.iter().enumerate() {
                let path = format!("{prefix}[{i}]");
                check_unknown_fields(item, item_schema, &path, diagnostics);
            }
        },
        // Leaf or type mismatch; type errors are reported in step 3
        _ => {},
    }
}

fn push(
    diagnostics: &mut Vec<Diagnostic>,
    severity: Severity,
    category: &'static str,
    path: impl Into<String>,
    message: impl Into<String>,
) {
    diagnostics.push(Diagnostic {
        severity,
        category,
        path: path.into(),
        message: message.into(),
    });
}

/// Run semantic checks on a successfully parsed config.
fn check_semantics(config: &MinerConfig, diagnostics: &mut Vec<Diagnostic>) {
    let browser = &config.browser;
    if browser.max_browsers == 0 {
        push(
            diagnostics,
            Severity::Error,
            "range",
            "browser.max_browsers",
            "max_browsers must be at least 1",
        );
    }
    if browser.min_browsers > browser.max_browsers {
        push(
            diagnostics,
            Severity::Error,
            "range",
            "browser.min_browsers",
            format!(
                "min_browsers ({}) exceeds max_browsers ({})",
                browser.min_browsers, browser.max_browsers
            ),
        );
    }
    if browser.pages_per_browser == 0 {
        push(
            diagnostics,
            Severity::Error,
            "range",
            "browser.pages_per_browser",
            "pages_per_browser must be at least 1",
        );
    }
    if browser.scale_down_threshold >= browser.scale_up_threshold {
        push(
            diagnostics,
            Severity::Warning,
            "range",
            "browser.scale_down_threshold",
            "scale_down_threshold should be below scale_up_threshold or the pool will oscillate",
        );
    }
    if browser.health_check_interval_secs == 0 {
        push(
            diagnostics,
            Severity::Error,
            "range",
            "browser.health_check_interval_secs",
            "health_check_interval_secs must be at least 1",
        );
    }

    let policy = &config.policy;
    if policy.requests_per_second == 0 {
        push(
            diagnostics,
            Severity::Error,
            "range",
            "policy.requests_per_second",
            "requests_per_second must be at least 1",
        );
    }
    if policy.min_crawl_delay_ms > policy.max_crawl_delay_ms {
        push(
            diagnostics,
            Severity::Error,
            "range",
            "policy.min_crawl_delay_ms",
            "min_crawl_delay_ms exceeds max_crawl_delay_ms",
        );
    }
    if policy.retry.max_attempts == 0 {
        push(
            diagnostics,
            Severity::Error,
            "range",
            "policy.retry.max_attempts",
            "max_attempts must be at least 1",
        );
    }
    if policy.retry.base_delay_ms > policy.retry.max_backoff_ms {
        push(
            diagnostics,
            Severity::Warning,
            "range",
            "policy.retry.base_delay_ms",
            "base_delay_ms exceeds max_backoff_ms; every retry waits max_backoff_ms",
        );
    }
    if policy.proxy.enabled && policy.proxy.endpoints.is_empty() {
        push(
            diagnostics,
            Severity::Warning,
            "range",
            "policy.proxy.endpoints",
            "proxying is enabled but no endpoints are configured",
        );
    }
    for (i, ep) in policy.proxy.endpoints.iter().enumerate() {
        if ep.host.is_empty() || ep.port == 0 {
            push(
                diagnostics,
                Severity::Error,
                "range",
                format!("policy.proxy.endpoints[{i}]"),
                "proxy endpoint needs a host and a non-zero port",
            );
        }
        if ep.username.is_some() {
            push(
                diagnostics,
                Severity::Warning,
                "range",
                format!("policy.proxy.endpoints[{i}].username"),
                "browser proxies cannot carry credentials; the endpoint is used without auth",
            );
        }
    }

    let min_score = config.extractor.min_importance_score;
    if !(0.0..=1.0).contains(&min_score) {
        push(
            diagnostics,
            Severity::Error,
            "range",
            "extractor.min_importance_score",
            format!("min_importance_score must be within [0, 1], got {min_score}"),
        );
    }

    let mut names = std::collections::HashSet::new();
    for (i, inst) in config.instances.iter().enumerate() {
        let path = format!("instances[{i}]");
        if inst.name.trim().is_empty() {
            push(
                diagnostics,
                Severity::Error,
                "instance",
                format!("{path}.name"),
                "instance name is empty",
            );
        } else if !names.insert(inst.name.as_str()) {
            push(
                diagnostics,
                Severity::Error,
                "instance",
                format!("{path}.name"),
                format!("duplicate instance name \"{}\"", inst.name),
            );
        }
        if inst.urls.is_empty() {
            push(
                diagnostics,
                Severity::Error,
                "instance",
                format!("{path}.urls"),
                "instance has no URLs",
            );
        }
        for (j, raw) in inst.urls.iter().enumerate() {
            let ok = url::Url::parse(raw)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !ok {
                push(
                    diagnostics,
                    Severity::Error,
                    "instance",
                    format!("{path}.urls[{j}]"),
                    format!("not an http(s) URL: {raw}"),
                );
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn categories(result: &ValidationResult) -> Vec<(&'static str, String)> {
        result
            .diagnostics
            .iter()
            .map(|d| (d.category, d.path.clone()))
            .collect()
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn empty_config_is_valid() {
        let result = validate_toml_str("");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn unknown_nested_key_with_suggestion() {
        let result = validate_toml_str("[browser]\nmax_browser = 3\n");
        let d = &result.diagnostics[0];
        assert_eq!(d.category, "unknown-field");
        assert_eq!(d.path, "browser.max_browser");
        assert!(d.message.contains("max_browsers"));
    }

    #[test]
    fn unknown_field_inside_instance_attributes() {
        let toml = r#"
[[instances]]
name = "a"
urls = ["https://example.com"]

[[instances.attributes]]
name = "title"
selektor = "h1"
"#;
        let result = validate_toml_str(toml);
        assert!(
            categories(&result)
                .contains(&("unknown-field", "instances[0].attributes[0].selektor".into()))
        );
    }

    #[test]
    fn min_over_max_browsers_is_error() {
        let result = validate_toml_str("[browser]\nmin_browsers = 5\nmax_browsers = 2\n");
        assert!(result.has_errors());
        assert!(categories(&result).contains(&("range", "browser.min_browsers".into())));
    }

    #[test]
    fn zero_rate_is_error() {
        let result = validate_toml_str("[policy]\nrequests_per_second = 0\n");
        assert!(result.has_errors());
    }

    #[test]
    fn proxy_enabled_without_endpoints_warns() {
        let result = validate_toml_str("[policy.proxy]\nenabled = true\n");
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn importance_out_of_range_is_error() {
        let result = validate_toml_str("[extractor]\nmin_importance_score = 1.5\n");
        assert!(result.has_errors());
    }

    #[test]
    fn bad_instance_url_and_duplicate_name() {
        let toml = r#"
[[instances]]
name = "a"
urls = ["ftp://example.com"]

[[instances]]
name = "a"
urls = ["https://example.com"]
"#;
        let result = validate_toml_str(toml);
        let cats = categories(&result);
        assert!(cats.contains(&("instance", "instances[0].urls[0]".into())));
        assert!(cats.contains(&("instance", "instances[1].name".into())));
    }

    #[test]
    fn syntax_error_detected() {
        let result = validate_toml_str("[browser\n");
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn type_error_detected() {
        let result = validate_toml_str("[browser]\nmax_browsers = \"many\"\n");
        assert!(categories(&result).contains(&("type-error", String::new())));
    }
}
