use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::MinerConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "pagemine.toml",
    "pagemine.yaml",
    "pagemine.yml",
    "pagemine.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<MinerConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./pagemine.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/pagemine/pagemine.{toml,yaml,yml,json}` (user-global)
///
/// Returns `MinerConfig::default()` if no config file is found.
pub fn discover_and_load() -> MinerConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    MinerConfig::default()
}

/// Load from an explicit path when given, otherwise discover.
pub fn load_or_discover(path: Option<&Path>) -> anyhow::Result<MinerConfig> {
    match path {
        Some(p) => load_config(p),
        None => Ok(discover_and_load()),
    }
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/pagemine/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "pagemine").map(|d| d.config_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pagemine.toml")
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<MinerConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagemine.toml");
        std::fs::write(
            &path,
            r#"
[browser]
min_browsers = 2
max_browsers = 4
pages_per_browser = 2

[[instances]]
name = "docs"
urls = ["https://example.com/"]
"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.browser.min_browsers, 2);
        assert_eq!(cfg.browser.pages_per_browser, 2);
        assert_eq!(cfg.instances.len(), 1);
        assert_eq!(cfg.instances[0].topic(), "docs");
        assert!(cfg.instances[0].extract_structure);
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("pagemine.yaml");
        std::fs::write(&yaml, "policy:\n  requests_per_second: 7\n").unwrap();
        assert_eq!(load_config(&yaml).unwrap().policy.requests_per_second, 7);

        let json = dir.path().join("pagemine.json");
        std::fs::write(&json, r#"{"extractor": {"max_depth": 3}}"#).unwrap();
        assert_eq!(load_config(&json).unwrap().extractor.max_depth, 3);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagemine.ini");
        std::fs::write(&path, "").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_or_discover(Some(Path::new("/nonexistent/pagemine.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
