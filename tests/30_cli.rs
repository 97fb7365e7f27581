mod common;

use anyhow::Result;
use serde_json::Value;
use tenant_db_router::crypto::CredentialCipher;
use tenant_db_router::middleware::auth::validate_jwt;
use uuid::Uuid;

#[test]
fn encrypt_produces_a_decryptable_blob() -> Result<()> {
    let output = common::binary().args(["encrypt", "s3cret"]).output()?;
    assert!(output.status.success());

    let blob = String::from_utf8(output.stdout)?;
    let cipher = CredentialCipher::new(common::ENCRYPTION_KEY)?;
    assert_eq!(cipher.decrypt(blob.trim())?, "s3cret");
    Ok(())
}

#[test]
fn token_carries_identity_claims() -> Result<()> {
    let user = Uuid::new_v4();
    let org = Uuid::new_v4();
    let token = common::token(user, org, "root")?;

    let claims = validate_jwt(&token, common::JWT_SECRET).map_err(anyhow::Error::msg)?;
    assert_eq!(claims.sub, user);
    assert_eq!(claims.org, org);
    assert_eq!(claims.access, "root");
    Ok(())
}

#[test]
fn json_flag_wraps_output() -> Result<()> {
    let output = common::binary().args(["--json", "encrypt", "s3cret"]).output()?;
    assert!(output.status.success());

    let body: Value = serde_json::from_slice(&output.stdout)?;
    assert!(body["encrypted_password"].as_str().is_some_and(|s| !s.is_empty()));
    Ok(())
}
