use anyhow::Context;
use serde_json::{json, Value};
use std::time::Duration;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::AppConfig;

pub async fn handle(config: &AppConfig, url: Option<String>, output_format: OutputFormat) -> anyhow::Result<()> {
    let base = url.unwrap_or_else(|| format!("http://127.0.0.1:{}", config.server.port));
    let health_url = format!("{}/health", base.trim_end_matches('/'));

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let response = client
        .get(&health_url)
        .send()
        .await
        .with_context(|| format!("failed to reach {}", health_url))?;

    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if !status.is_success() {
        anyhow::bail!("{} responded {}: {}", health_url, status, body);
    }

    let active = body["data"]["active_connections"].as_u64().unwrap_or(0);
    output_success(
        output_format,
        &format!("{} is healthy ({} tenant connection(s))", base, active),
        Some(json!({ "url": base, "health": body["data"] })),
    )
}
