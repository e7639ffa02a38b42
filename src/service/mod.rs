pub mod mock;
pub mod provider;
pub mod types;
pub mod zitadel;

pub use mock::MockIdentityService;
pub use provider::{IdentityService, OrganizationResolver, Resolvable, ResolverTable};
pub use types::*;
pub use zitadel::{ZitadelClient, ZitadelConfig};
