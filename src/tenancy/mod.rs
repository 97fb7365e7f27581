pub mod models;
pub mod resolver;
pub mod store;

pub use models::{Identity, MembershipRecord, MembershipStatus, TenantContext, TenantRecord, TenantStatus};
pub use resolver::{ResolutionError, TenantResolver};
pub use store::{PgTenantStore, StoreError, TenantStore};
