pub mod auth;
pub mod response;
pub mod tenant;

pub use auth::{jwt_auth_middleware, require_root_middleware, AuthState, Claims};
pub use response::{ApiResponse, ApiResult};
pub use tenant::{extract_tenant_slug, resolve_tenant_middleware, TenantExtractionConfig, TenantState};
