//! Chrome/Chromium discovery and install guidance.

use std::path::PathBuf;

/// Chromium-based executables that speak CDP, in preference order.
const CHROMIUM_EXECUTABLES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "chrome-browser",
    "microsoft-edge",
    "microsoft-edge-stable",
    "msedge",
    "brave-browser",
    "brave",
];

#[cfg(target_os = "macos")]
const MACOS_APP_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
];

#[cfg(target_os = "windows")]
const WINDOWS_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

/// Where (and whether) a usable browser was found.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub path: Option<PathBuf>,
    /// How the path was found: `config`, `env`, `platform` or `path`.
    pub source: Option<&'static str>,
    /// Install instructions, empty when found.
    pub install_hint: String,
}

impl DetectionResult {
    #[must_use]
    pub fn found(&self) -> bool {
        self.path.is_some()
    }

    fn hit(path: PathBuf, source: &'static str) -> Self {
        Self {
            path: Some(path),
            source: Some(source),
            install_hint: String::new(),
        }
    }
}

/// Locate a Chromium-based browser.
///
/// Order: configured `chrome_path`, `CHROME` env var, platform install
/// locations, then executables on `PATH`.
pub fn detect_browser(custom_path: Option<&str>) -> DetectionResult {
    if let Some(path) = custom_path {
        let p = PathBuf::from(path);
        if p.exists() {
            return DetectionResult::hit(p, "config");
        }
    }

    if let Ok(path) = std::env::var("CHROME") {
        let p = PathBuf::from(path);
        if p.exists() {
            return DetectionResult::hit(p, "env");
        }
    }

    #[cfg(target_os = "macos")]
    for path in MACOS_APP_PATHS {
        let p = PathBuf::from(path);
        if p.exists() {
            return DetectionResult::hit(p, "platform");
        }
    }

    #[cfg(target_os = "windows")]
    for path in WINDOWS_PATHS {
        let p = PathBuf::from(path);
        if p.exists() {
            return DetectionResult::hit(p, "platform");
        }
    }

    for name in CHROMIUM_EXECUTABLES {
        if let Ok(path) = which::which(name) {
            return DetectionResult::hit(path, "path");
        }
    }

    DetectionResult {
        path: None,
        source: None,
        install_hint: install_instructions(),
    }
}

/// Platform-specific install instructions.
pub fn install_instructions() -> String {
    let instructions = if cfg!(target_os = "macos") {
        "  brew install --cask chromium"
    } else if cfg!(target_os = "linux") {
        "  Debian/Ubuntu: sudo apt install chromium\n  \
         Fedora:        sudo dnf install chromium\n  \
         Arch:          sudo pacman -S chromium"
    } else if cfg!(target_os = "windows") {
        "  winget install Google.Chrome"
    } else {
        "  Download from https://www.chromium.org/getting-involved/download-chromium/"
    };

    format!(
        "No Chromium-based browser found. Install one:\n\n\
         {instructions}\n\n\
         Or point pagemine at it:\n  \
         [browser]\n  \
         chrome_path = \"/path/to/chromium\"\n\n\
         Or set the CHROME environment variable."
    )
}
