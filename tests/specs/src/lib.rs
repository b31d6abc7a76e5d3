// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `busl-relay` binary as a subprocess and exercises it
//! over plain HTTP.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Resolve the path to the compiled `busl-relay` binary.
pub fn relay_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("busl-relay")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `busl-relay` process that is killed on drop.
pub struct RelayProcess {
    child: Child,
    port: u16,
}

/// Builder for configuring a [`RelayProcess`] before spawning it.
///
/// Always runs with `--substrate memory`, so no Redis instance is needed
/// for the end-to-end suite.
pub struct RelayBuilder {
    storage_base_url: Option<String>,
    creds: Option<String>,
    heartbeat_interval_ms: Option<u64>,
}

impl Default for RelayBuilder {
    fn default() -> Self {
        Self { storage_base_url: None, creds: None, heartbeat_interval_ms: None }
    }
}

impl RelayBuilder {
    /// Point publish-side cold storage at a base URL (e.g. a local stub server).
    pub fn storage_base_url(mut self, url: &str) -> Self {
        self.storage_base_url = Some(url.to_owned());
        self
    }

    /// Require Basic auth for mint/register using `user:pass` pairs.
    pub fn creds(mut self, creds: &str) -> Self {
        self.creds = Some(creds.to_owned());
        self
    }

    /// Override the default heartbeat interval, in milliseconds.
    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = Some(ms);
        self
    }

    /// Spawn the relay with the configured options.
    pub fn spawn(self) -> anyhow::Result<RelayProcess> {
        let binary = relay_binary();
        anyhow::ensure!(binary.exists(), "busl-relay binary not found at {}", binary.display());

        let port = free_port()?;

        let mut args: Vec<String> = vec![
            "--host".into(),
            "127.0.0.1".into(),
            "--port".into(),
            port.to_string(),
            "--substrate-backend".into(),
            "memory".into(),
            "--log-format".into(),
            "text".into(),
            "--log-level".into(),
            "warn".into(),
        ];

        if let Some(ref url) = self.storage_base_url {
            args.extend(["--storage-base-url".into(), url.clone()]);
        }
        if let Some(ref creds) = self.creds {
            args.extend(["--creds".into(), creds.clone()]);
        }
        if let Some(ms) = self.heartbeat_interval_ms {
            args.extend(["--heartbeat-interval-ms".into(), ms.to_string()]);
        }

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(RelayProcess { child, port })
    }
}

impl RelayProcess {
    /// Create a builder for custom startup configuration.
    pub fn build() -> RelayBuilder {
        RelayBuilder::default()
    }

    /// Spawn a relay against an in-memory substrate with default options.
    pub fn start() -> anyhow::Result<Self> {
        Self::build().spawn()
    }

    /// The bound TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Poll `/health` until it responds successfully.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("busl-relay did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Wait for the process to exit within `timeout`.
    pub async fn wait_exit(&mut self, timeout: Duration) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("busl-relay did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for RelayProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
