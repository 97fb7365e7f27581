pub mod connection;
pub mod provision;
pub mod registry;

pub use connection::{ConnectionError, ConnectionFactory, PgConnectionFactory, PoolConfig, TenantConnectionInfo};
pub use provision::{PgTenantProvisioner, ProvisionError, ProvisioningJobs, TenantProvisioner};
pub use registry::{ConnectionRegistry, ConnectionStats, RegistryConfig};
