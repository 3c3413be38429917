use notebridge_core::config::BrowserConfig;
use notebridge_core::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

const EXECUTABLE_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

/// A launched browser process and the DevTools endpoint it advertised.
///
/// The process is killed when this handle drops; the profile directory is a
/// temp dir tied to the same lifetime.
pub struct Chrome {
    _child: Child,
    _profile_dir: tempfile::TempDir,
    ws_url: String,
}

impl Chrome {
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let executable = match &config.executable {
            Some(path) => path.clone(),
            None => detect_executable()
                .ok_or_else(|| Error::Surface("no browser executable found".to_string()))?,
        };

        let profile_dir = tempfile::tempdir()
            .map_err(|e| Error::Surface(format!("profile dir: {e}")))?;

        let mut cmd = Command::new(&executable);
        cmd.arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile_dir.path().display()))
            .arg(format!("--lang={}", config.locale))
            .arg(format!(
                "--window-size={},{}",
                config.viewport_width, config.viewport_height
            ))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if config.headless {
            cmd.arg("--headless=new");
        }

        debug!(executable = %executable, "Launching browser");
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Surface(format!("spawn {executable}: {e}")))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Surface("browser stderr not captured".to_string()))?;

        let ws_url = tokio::time::timeout(STARTUP_TIMEOUT, read_devtools_url(stderr))
            .await
            .map_err(|_| Error::Surface("browser did not advertise DevTools endpoint".to_string()))??;

        info!(ws_url = %ws_url, "Browser ready");
        Ok(Self {
            _child: child,
            _profile_dir: profile_dir,
            ws_url,
        })
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }
}

/// Chromium prints `DevTools listening on ws://...` to stderr once the
/// debugging endpoint is bound.
async fn read_devtools_url(stderr: tokio::process::ChildStderr) -> Result<String> {
    let mut lines = BufReader::new(stderr).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| Error::Surface(format!("read browser stderr: {e}")))?
    {
        if let Some(rest) = line.strip_prefix("DevTools listening on ") {
            return Ok(rest.trim().to_string());
        }
    }
    Err(Error::Surface(
        "browser exited before advertising DevTools endpoint".to_string(),
    ))
}

fn detect_executable() -> Option<String> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for candidate in EXECUTABLE_CANDIDATES {
            let full = dir.join(candidate);
            if full.is_file() {
                return Some(full.display().to_string());
            }
        }
    }
    None
}
