//! `pagemine doctor`: config validation, browser detection and host audit.
//!
//! Prints a structured report with `[ok]`, `[warn]`, `[fail]` or `[info]`
//! per item and exits non-zero when anything failed.

use std::path::Path;

use {
    anyhow::Result,
    pagemine_browser::detect::{DetectionResult, detect_browser},
    pagemine_config::{
        MinerConfig,
        validate::{self, Severity},
    },
    sysinfo::System,
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Rough resident size of one headless Chromium with a few tabs.
const BROWSER_MEMORY_BYTES: u64 = 300 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Info => CYAN,
        }
    }
}

impl From<Severity> for Status {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Fail,
            Severity::Warning => Self::Warn,
            Severity::Info => Self::Info,
        }
    }
}

struct CheckItem {
    status: Status,
    message: String,
}

struct Section {
    title: String,
    items: Vec<CheckItem>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push(CheckItem {
            status,
            message: message.into(),
        });
    }
}

fn print_report(sections: &[Section]) -> (usize, usize) {
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for item in &section.items {
            let color = item.status.color();
            let label = item.status.label();
            eprintln!("  [{color}{label}{RESET}]  {}", item.message);
            match item.status {
                Status::Fail => errors += 1,
                Status::Warn => warnings += 1,
                _ => {},
            }
        }
        eprintln!();
    }

    (errors, warnings)
}

pub async fn handle_doctor(config_path: Option<&Path>) -> Result<()> {
    eprintln!("{BOLD}pagemine doctor{RESET}");
    eprintln!("{BOLD}==============={RESET}\n");

    let config = pagemine_config::load_or_discover(config_path).unwrap_or_default();

    let mut system = System::new();
    system.refresh_memory();
    let available = match system.available_memory() {
        // available_memory() is 0 on some platforms
        0 => system.total_memory().saturating_sub(system.used_memory()),
        v => v,
    };

    let sections = vec![
        check_config(config_path),
        check_browser(&config, &detect_browser(config.browser.chrome_path.as_deref())),
        check_memory(system.total_memory(), available, config.browser.max_browsers),
        check_instances(&config),
    ];

    let (errors, warnings) = print_report(&sections);
    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn check_config(config_path: Option<&Path>) -> Section {
    let result = validate::validate(config_path);
    let label = result
        .config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".into());
    let mut section = Section::new(format!("Config ({label})"));

    let syntax: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.category == "syntax" && d.severity == Severity::Error)
        .collect();
    if !syntax.is_empty() {
        for d in syntax {
            section.push(Status::Fail, format!("syntax: {}", d.message));
        }
        return section;
    }
    if result.config_path.is_some() {
        section.push(Status::Ok, "syntax valid");
    } else {
        section.push(Status::Info, "no config file found; using defaults");
    }

    let mut clean = true;
    for d in result
        .diagnostics
        .iter()
        .filter(|d| d.category != "file-ref")
    {
        clean &= d.severity == Severity::Info;
        let message = if d.path.is_empty() {
            d.message.clone()
        } else {
            format!("{}: {}", d.path, d.message)
        };
        section.push(d.severity.into(), message);
    }
    if clean {
        section.push(Status::Ok, "no errors or warnings");
    }
    section
}

fn check_browser(config: &MinerConfig, detection: &DetectionResult) -> Section {
    let mut section = Section::new("Browser");
    match &detection.path {
        Some(path) => section.push(
            Status::Ok,
            format!(
                "found {} (via {})",
                path.display(),
                detection.source.unwrap_or("unknown")
            ),
        ),
        None => {
            section.push(Status::Fail, "no Chrome/Chromium found");
            for line in detection.install_hint.lines() {
                section.push(Status::Info, line.trim());
            }
        },
    }
    if config.browser.chrome_path.is_some() && detection.source != Some("config") {
        section.push(
            Status::Warn,
            "configured chrome_path does not exist; fell back to auto-detection",
        );
    }
    if !config.browser.headless {
        section.push(Status::Info, "headless is off; a display is required");
    }
    section.push(
        Status::Info,
        format!(
            "pool: {}..{} browsers × {} pages",
            config.browser.min_browsers,
            config.browser.max_browsers,
            config.browser.pages_per_browser
        ),
    );
    section
}

fn check_memory(total: u64, available: u64, max_browsers: usize) -> Section {
    let mut section = Section::new("Host memory");
    let gib = |bytes: u64| bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    if total == 0 {
        section.push(Status::Info, "memory information unavailable");
        return section;
    }
    section.push(
        Status::Info,
        format!("{:.1} GiB available of {:.1} GiB", gib(available), gib(total)),
    );
    let needed = BROWSER_MEMORY_BYTES.saturating_mul(max_browsers as u64);
    if available >= needed {
        section.push(
            Status::Ok,
            format!("enough memory for {max_browsers} browser(s)"),
        );
    } else {
        let fits = available / BROWSER_MEMORY_BYTES;
        section.push(
            Status::Warn,
            format!(
                "max_browsers = {max_browsers} needs about {:.1} GiB; room for about {fits}",
                gib(needed)
            ),
        );
    }
    section
}

fn check_instances(config: &MinerConfig) -> Section {
    let mut section = Section::new("Instances");
    if config.instances.is_empty() {
        section.push(
            Status::Info,
            "none configured; `pagemine run --url` mines ad-hoc URLs",
        );
        return section;
    }
    for instance in &config.instances {
        section.push(
            Status::Ok,
            format!(
                "{} → topic {:?}, {} URL(s), {} attribute(s)",
                instance.name,
                instance.topic(),
                instance.urls.len(),
                instance.attributes.len()
            ),
        );
    }
    section
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, pagemine_config::InstanceConfig, std::path::PathBuf};

    #[test]
    fn status_labels() {
        assert_eq!(Status::Ok.label(), "ok");
        assert_eq!(Status::Warn.label(), "warn");
        assert_eq!(Status::Fail.label(), "fail");
        assert_eq!(Status::Info.label(), "info");
        assert_eq!(Status::from(Severity::Error), Status::Fail);
    }

    #[test]
    fn print_report_counts_errors_and_warnings() {
        let mut section = Section::new("test");
        section.push(Status::Ok, "fine");
        section.push(Status::Warn, "caution");
        section.push(Status::Warn, "caution2");
        section.push(Status::Fail, "broken");
        section.push(Status::Info, "note");

        let (errors, warnings) = print_report(&[section]);
        assert_eq!(errors, 1);
        assert_eq!(warnings, 2);
    }

    #[test]
    fn missing_browser_fails_with_install_hint() {
        let detection = DetectionResult {
            path: None,
            source: None,
            install_hint: "  apt install chromium\n  dnf install chromium".into(),
        };
        let section = check_browser(&MinerConfig::default(), &detection);
        assert_eq!(section.items[0].status, Status::Fail);
        assert!(
            section
                .items
                .iter()
                .any(|i| i.message == "apt install chromium")
        );
    }

    #[test]
    fn stale_chrome_path_warns() {
        let mut config = MinerConfig::default();
        config.browser.chrome_path = Some("/nonexistent/chrome".into());
        let detection = DetectionResult {
            path: Some(PathBuf::from("/usr/bin/chromium")),
            source: Some("path"),
            install_hint: String::new(),
        };
        let section = check_browser(&config, &detection);
        assert_eq!(section.items[0].status, Status::Ok);
        assert!(section.items.iter().any(|i| i.status == Status::Warn));
    }

    #[test]
    fn memory_budget_per_browser() {
        let gib = 1024 * 1024 * 1024;
        let ok = check_memory(16 * gib, 8 * gib, 4);
        assert!(ok.items.iter().any(|i| i.status == Status::Ok));

        let tight = check_memory(2 * gib, gib / 2, 4);
        let warn = tight
            .items
            .iter()
            .find(|i| i.status == Status::Warn)
            .unwrap();
        assert!(warn.message.contains("room for about 1"), "{}", warn.message);

        let unknown = check_memory(0, 0, 4);
        assert_eq!(unknown.items[0].status, Status::Info);
    }

    #[test]
    fn lists_configured_instances() {
        let config = MinerConfig {
            instances: vec![InstanceConfig {
                name: "news".into(),
                urls: vec!["https://news.test/".into()],
                ..Default::default()
            }],
            ..Default::default()
        };
        let section = check_instances(&config);
        assert_eq!(section.items.len(), 1);
        assert!(section.items[0].message.starts_with("news → topic \"news\""));
        assert_eq!(check_instances(&MinerConfig::default()).items[0].status, Status::Info);
    }

    #[test]
    fn config_check_on_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let section = check_config(Some(&dir.path().join("absent.toml")));
        assert_eq!(section.items[0].status, Status::Fail);
    }
}
