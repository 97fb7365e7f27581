use crate::cli::utils::output_value;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::crypto::CredentialCipher;

/// Print the `encrypted_password` blob for a tenant row
pub fn handle(config: &AppConfig, password: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    if config.security.encryption_key.is_empty() {
        anyhow::bail!("TENANT_ENCRYPTION_KEY is not set");
    }
    let cipher = CredentialCipher::new(&config.security.encryption_key)?;
    let blob = cipher.encrypt(password)?;
    output_value(output_format, "encrypted_password", &blob)
}
