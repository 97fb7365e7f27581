mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn root_describes_the_service() -> Result<()> {
    let server = common::start_server().await?;

    let res = reqwest::get(format!("{}/", server.base_url)).await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "tenant-db-router");
    Ok(())
}

#[tokio::test]
async fn health_reports_unreachable_master_store() -> Result<()> {
    let server = common::start_server().await?;

    let res = reqwest::get(format!("{}/health", server.base_url)).await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = res.json().await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["master_store"], "unavailable");
    assert_eq!(body["data"]["active_connections"], 0);
    Ok(())
}

#[tokio::test]
async fn ping_command_fails_against_degraded_server() -> Result<()> {
    let server = common::start_server().await?;

    let output = common::binary()
        .args(["ping", "--url", &server.base_url])
        .output()?;
    assert!(!output.status.success());
    Ok(())
}
