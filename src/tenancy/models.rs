use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of a tenant row in the master store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Provisioning,
    Active,
    Suspended,
    Inactive,
    Error,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Provisioning => "provisioning",
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Inactive => "inactive",
            TenantStatus::Error => "error",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TenantStatus::Active)
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provisioning" => Ok(TenantStatus::Provisioning),
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "inactive" => Ok(TenantStatus::Inactive),
            "error" => Ok(TenantStatus::Error),
            other => Err(format!("unknown tenant status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Inactive,
    Invited,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Inactive => "inactive",
            MembershipStatus::Invited => "invited",
        }
    }
}

impl FromStr for MembershipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MembershipStatus::Active),
            "inactive" => Ok(MembershipStatus::Inactive),
            "invited" => Ok(MembershipStatus::Invited),
            other => Err(format!("unknown membership status '{}'", other)),
        }
    }
}

/// One row of the master tenants table.
///
/// `encrypted_password` stays ciphertext for the life of this value; it is
/// skipped on serialization and masked in Debug output.
#[derive(Clone, Serialize)]
pub struct TenantRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub slug: String,
    pub status: TenantStatus,
    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_name: String,
    pub db_ssl_mode: String,
    #[serde(skip_serializing)]
    pub encrypted_password: String,
}

impl fmt::Debug for TenantRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantRecord")
            .field("id", &self.id)
            .field("organization_id", &self.organization_id)
            .field("slug", &self.slug)
            .field("status", &self.status)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_user", &self.db_user)
            .field("db_name", &self.db_name)
            .field("db_ssl_mode", &self.db_ssl_mode)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MembershipRecord {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: String,
    pub status: MembershipStatus,
}

/// Caller identity produced by the upstream auth layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub access: String,
}

impl Identity {
    pub fn is_root(&self) -> bool {
        self.access == "root"
    }
}

/// Per-request tenant scope handed to business handlers
#[derive(Debug, Clone)]
pub struct TenantContext<H = PgPool> {
    pub tenant_id: Uuid,
    pub tenant_slug: String,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub connection: H,
    pub resolved_at: DateTime<Utc>,
}
