// Root-only operations on the connection registry and tenant lifecycle.
// Every route here sits behind jwt_auth_middleware + require_root_middleware.
pub mod connections;
pub mod tenant;
