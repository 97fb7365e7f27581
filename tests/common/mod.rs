#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;

pub const JWT_SECRET: &str = "integration-jwt-secret";
pub const ENCRYPTION_KEY: &str = "integration-encryption-key";

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

/// Command for the built binary with a hermetic environment.
/// The master store points at a closed port, so anything needing it fails fast.
pub fn binary() -> Command {
    let dead_port = portpicker::pick_unused_port().unwrap_or(1);
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tenant-db-router"));
    cmd.env("APP_ENV", "development")
        .env("DATABASE_URL", format!("postgres://postgres@127.0.0.1:{}/tenant_master", dead_port))
        .env("DATABASE_CONNECTION_TIMEOUT", "1")
        .env("JWT_SECRET", JWT_SECRET)
        .env("TENANT_ENCRYPTION_KEY", ENCRYPTION_KEY)
        .env("RUST_LOG", "warn")
        .stdin(Stdio::null());
    cmd
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let child = binary()
            .arg("serve")
            .env("PORT", port.to_string())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            // Any response from / means the listener is up
            if let Ok(resp) = client.get(format!("{}/", self.base_url)).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// One server per test; killed when the returned value is dropped
pub async fn start_server() -> Result<TestServer> {
    let server = TestServer::spawn()?;
    server.wait_ready(Duration::from_secs(15)).await?;
    Ok(server)
}

/// Mint a token through the CLI, the same way an operator would
pub fn token(user: uuid::Uuid, org: uuid::Uuid, access: &str) -> Result<String> {
    let output = binary()
        .args(["token", "--user", &user.to_string(), "--org", &org.to_string(), "--access", access])
        .output()
        .context("failed to run token command")?;
    anyhow::ensure!(output.status.success(), "token command failed: {:?}", output);
    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}
