//! Chromium automation backend for slotwatch.
//!
//! Implements the core crate's `AutomationHandle`/`HandleProvider` pair
//! against a real Chromium instance: one child process per handle, driven
//! over the DevTools protocol. The process is launched with an ephemeral
//! debugging port and a throwaway profile directory, both discovered and
//! cleaned up here.

mod cdp;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use cdp::CdpConnection;
use serde_json::{Value, json};
use slotwatch_core::{AutomationError, AutomationHandle, HandleProvider};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Overrides the browser binary lookup entirely when set.
const BINARY_ENV: &str = "SLOTWATCH_CHROMIUM";

/// Written by Chromium into the profile directory once the ephemeral
/// debugging port is bound.
const PORT_FILE: &str = "DevToolsActivePort";

const DEFAULT_BINARIES: [&str; 4] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
const STARTUP_POLL: Duration = Duration::from_millis(250);

/// Launches one Chromium per acquired handle.
pub struct ChromiumProvider {
    headless: bool,
}

impl ChromiumProvider {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

#[async_trait]
impl HandleProvider for ChromiumProvider {
    async fn acquire(&self) -> Result<Arc<dyn AutomationHandle>, AutomationError> {
        let handle = ChromiumHandle::launch(self.headless)
            .await
            .map_err(|e| AutomationError::Acquisition(format!("{:#}", e)))?;
        Ok(Arc::new(handle))
    }
}

/// One live Chromium instance plus its devtools connection.
pub struct ChromiumHandle {
    child: Mutex<Child>,
    cdp: CdpConnection,
    profile: Mutex<Option<TempDir>>,
    released: AtomicBool,
}

impl ChromiumHandle {
    pub async fn launch(headless: bool) -> Result<Self> {
        let profile = tempfile::Builder::new()
            .prefix("slotwatch-profile-")
            .tempdir()
            .context("creating profile directory")?;

        let mut child = spawn_browser(profile.path(), headless)?;
        let port = match wait_for_port(profile.path()).await {
            Ok(port) => port,
            Err(e) => {
                let _ = child.start_kill();
                return Err(e);
            }
        };
        debug!(port, "chromium devtools port bound");

        let ws_url = match wait_for_page_target(port).await {
            Ok(url) => url,
            Err(e) => {
                let _ = child.start_kill();
                return Err(e);
            }
        };

        let cdp = match CdpConnection::connect(&ws_url).await {
            Ok(cdp) => cdp,
            Err(e) => {
                let _ = child.start_kill();
                return Err(e);
            }
        };

        info!(port, headless, "chromium instance ready");
        Ok(Self {
            child: Mutex::new(child),
            cdp,
            profile: Mutex::new(Some(profile)),
            released: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl AutomationHandle for ChromiumHandle {
    async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        let result = self
            .cdp
            .call("Page.navigate", json!({ "url": url }))
            .await
            .map_err(|e| AutomationError::Navigation(format!("{:#}", e)))?;

        // a resolved command can still report a network-level failure
        if let Some(error_text) = result.get("errorText").and_then(Value::as_str)
            && !error_text.is_empty()
        {
            return Err(AutomationError::Navigation(error_text.to_string()));
        }
        Ok(())
    }

    async fn set_identity(&self, agent: &str) {
        let params = json!({ "userAgent": agent });
        if let Err(e) = self.cdp.call("Network.setUserAgentOverride", params).await {
            warn!(error = %e, "user agent override failed, keeping previous identity");
        }
    }

    async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        // ask politely first, then make sure
        if let Err(e) = self.cdp.call("Browser.close", json!({})).await {
            debug!(error = %e, "graceful browser close failed, killing process");
        }

        let mut child = self.child.lock().await;
        let _ = child.start_kill();
        let _ = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;

        // removes the throwaway profile directory
        self.profile.lock().await.take();
        info!("chromium instance released");
    }
}

fn spawn_browser(profile_dir: &Path, headless: bool) -> Result<Child> {
    let mut last_error = None;
    for binary in binary_candidates(std::env::var(BINARY_ENV).ok()) {
        let mut command = Command::new(&binary);
        command
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-gpu")
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if headless {
            command.arg("--headless=new");
        }

        match command.spawn() {
            Ok(child) => {
                debug!(%binary, "chromium process spawned");
                return Ok(child);
            }
            Err(e) => last_error = Some((binary, e)),
        }
    }

    match last_error {
        Some((binary, e)) => bail!("could not start a browser, last tried {}: {}", binary, e),
        None => bail!("no browser binary candidates configured"),
    }
}

fn binary_candidates(override_path: Option<String>) -> Vec<String> {
    match override_path {
        Some(path) if !path.trim().is_empty() => vec![path],
        _ => DEFAULT_BINARIES.iter().map(|s| s.to_string()).collect(),
    }
}

/// Poll the profile directory until Chromium publishes its debugging port.
async fn wait_for_port(profile_dir: &Path) -> Result<u16> {
    let port_file = profile_dir.join(PORT_FILE);
    let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;

    loop {
        if let Ok(contents) = tokio::fs::read_to_string(&port_file).await
            && let Some(port) = parse_devtools_active_port(&contents)
        {
            return Ok(port);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("browser never published its devtools port");
        }
        tokio::time::sleep(STARTUP_POLL).await;
    }
}

/// Poll the devtools HTTP endpoint until a page target is listed.
async fn wait_for_page_target(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);
    let client = reqwest::Client::new();
    let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;

    loop {
        if let Ok(response) = client.get(&url).send().await
            && let Ok(targets) = response.json::<Vec<Value>>().await
            && let Some(ws_url) = pick_page_target(&targets)
        {
            return Ok(ws_url);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("no page target appeared on the devtools endpoint");
        }
        tokio::time::sleep(STARTUP_POLL).await;
    }
}

fn parse_devtools_active_port(contents: &str) -> Option<u16> {
    contents.lines().next()?.trim().parse().ok()
}

fn pick_page_target(targets: &[Value]) -> Option<String> {
    targets
        .iter()
        .find(|target| target.get("type").and_then(Value::as_str) == Some("page"))
        .and_then(|target| target.get("webSocketDebuggerUrl").and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_file_first_line_is_the_port() {
        assert_eq!(
            parse_devtools_active_port("39731\n/devtools/browser/abc-def\n"),
            Some(39731)
        );
    }

    #[test]
    fn malformed_port_file_yields_none() {
        assert_eq!(parse_devtools_active_port(""), None);
        assert_eq!(parse_devtools_active_port("not a port\n"), None);
        assert_eq!(parse_devtools_active_port("-1\n"), None);
    }

    #[test]
    fn page_target_is_preferred_over_others() {
        let targets = vec![
            json!({"type": "service_worker", "webSocketDebuggerUrl": "ws://x/sw"}),
            json!({"type": "page", "webSocketDebuggerUrl": "ws://x/page"}),
        ];
        assert_eq!(pick_page_target(&targets).as_deref(), Some("ws://x/page"));
    }

    #[test]
    fn page_target_without_socket_url_is_skipped() {
        let targets = vec![json!({"type": "page"})];
        assert_eq!(pick_page_target(&targets), None);
    }

    #[test]
    fn binary_override_replaces_the_candidate_list() {
        assert_eq!(
            binary_candidates(Some("/opt/chrome/chrome".to_string())),
            vec!["/opt/chrome/chrome".to_string()]
        );
        assert_eq!(binary_candidates(None).len(), DEFAULT_BINARIES.len());
        // blank override falls back to the defaults
        assert_eq!(binary_candidates(Some("  ".to_string())).len(), 4);
    }
}
