use serde_json::json;
use uuid::Uuid;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::middleware::auth::{generate_jwt, Claims};

pub fn handle(
    config: &AppConfig,
    user: Uuid,
    org: Uuid,
    access: &str,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    if config.is_production() {
        anyhow::bail!("refusing to mint tokens in production");
    }

    let claims = Claims::new(user, org, access, config.security.jwt_expiry_hours);
    let token = generate_jwt(&claims, &config.security.jwt_secret)?;

    match output_format {
        OutputFormat::Text => println!("{}", token),
        OutputFormat::Json => output_success(
            output_format,
            "Token issued",
            Some(json!({ "token": token, "expires_at": claims.exp })),
        )?,
    }
    Ok(())
}
