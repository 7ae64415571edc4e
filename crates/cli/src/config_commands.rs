use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    clap::Subcommand,
};

use pagemine_config::validate::{self, Severity};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Validate {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Write a documented default config file.
    Init {
        /// Destination (default: ~/.config/pagemine/pagemine.toml).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config(config_path: Option<&Path>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Validate { verbose } => check(config_path, verbose),
        ConfigAction::Init { path, force } => {
            let path = path.unwrap_or_else(pagemine_config::find_or_default_config_path);
            let written = write_template(&path, force)?;
            eprintln!("Wrote {}", written.display());
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config_path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate::validate(config_path);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn write_template(path: &Path, force: bool) -> Result<PathBuf> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, pagemine_config::template::default_config_template())
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path.to_path_buf())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_a_loadable_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pagemine.toml");
        write_template(&path, false).unwrap();

        let config = pagemine_config::load_config(&path).unwrap();
        assert!(config.browser.max_browsers >= config.browser.min_browsers);
        assert!(!validate::validate(Some(&path)).has_errors());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagemine.toml");
        std::fs::write(&path, "# mine").unwrap();

        let err = write_template(&path, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine");

        write_template(&path, true).unwrap();
        assert_ne!(std::fs::read_to_string(&path).unwrap(), "# mine");
    }
}
