// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::provision::ProvisionError;
use crate::tenancy::resolver::ResolutionError;
use crate::tenancy::store::StoreError;

/// Generic message for every internal tenant-connection failure
pub const TENANT_DB_UNAVAILABLE: &str = "Tenant database unavailable";

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest { message: String, code: &'static str },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden { message: String, code: &'static str },

    // 404 Not Found
    NotFound { message: String, code: &'static str },

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest { .. } => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden { .. } => 403,
            ApiError::NotFound { .. } => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden { message, .. } => message,
            ApiError::NotFound { message, .. } => message,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. } => *code,
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden { code, .. } => *code,
            ApiError::NotFound { code, .. } => *code,
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "success": false,
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            code: "BAD_REQUEST",
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            message: message.into(),
            code: "FORBIDDEN",
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound {
            message: message.into(),
            code: "NOT_FOUND",
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// The one place resolution failures become client-visible.
// Internal causes are logged here and replaced with generic messages.
impl From<ResolutionError> for ApiError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::TenantNotSpecified => ApiError::BadRequest {
                message: "Tenant not specified".to_string(),
                code: "TENANT_NOT_SPECIFIED",
            },
            ResolutionError::TenantNotFound(slug) => {
                tracing::warn!("Tenant resolution failed: '{}' not found", slug);
                ApiError::NotFound {
                    message: "Tenant not found".to_string(),
                    code: "TENANT_NOT_FOUND",
                }
            }
            ResolutionError::TenantNotActive { slug, status } => {
                tracing::warn!("Tenant resolution failed: '{}' is {}", slug, status);
                ApiError::Forbidden {
                    message: "Tenant not active".to_string(),
                    code: "TENANT_NOT_ACTIVE",
                }
            }
            ResolutionError::MembershipNotFound { user_id, tenant_id }
            | ResolutionError::MembershipNotActive { user_id, tenant_id } => {
                tracing::warn!("Access denied: user {} in tenant {}", user_id, tenant_id);
                ApiError::Forbidden {
                    message: "Access denied".to_string(),
                    code: "ACCESS_DENIED",
                }
            }
            ResolutionError::CredentialDecryption(e) => {
                tracing::error!("Tenant credential decryption failed: {}", e);
                ApiError::service_unavailable(TENANT_DB_UNAVAILABLE)
            }
            ResolutionError::ConnectionCreation(e) => {
                tracing::error!("Tenant connection creation failed: {}", e);
                ApiError::service_unavailable(TENANT_DB_UNAVAILABLE)
            }
            ResolutionError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TenantNotFound(id) => {
                tracing::warn!("Tenant {} not found in master store", id);
                ApiError::not_found("Tenant not found")
            }
            other => {
                // Log the real error but return generic message
                tracing::error!("Master store error: {}", other);
                ApiError::service_unavailable("Tenant registry unavailable")
            }
        }
    }
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::TenantNotFound(id) => {
                tracing::warn!("Provisioning requested for unknown tenant {}", id);
                ApiError::NotFound {
                    message: "Tenant not found".to_string(),
                    code: "TENANT_NOT_FOUND",
                }
            }
            ProvisionError::AlreadyRunning(id) => {
                ApiError::conflict(format!("Provisioning already running for tenant {}", id))
            }
            ProvisionError::AlreadyActive(id) => ApiError::conflict(format!("Tenant {} is already active", id)),
            ProvisionError::Store(e) => e.into(),
            other => {
                tracing::error!("Provisioning error: {}", other);
                ApiError::internal_server_error("Tenant provisioning failed")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
