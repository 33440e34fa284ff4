//! # Decorator
//!
//! Turns the parameters of a `create` or `update` invocation into a managed
//! cluster descriptor.
//!
//! - [`DecoratorContext`] resolves each logical parameter from the raw
//!   input, the attached descriptor and defaults, completing values through
//!   the injected collaborators where needed
//! - [`CreateDecorator`] builds a new descriptor phase by phase
//! - [`UpdateDecorator`] fetches a stored descriptor and patches it
//!
//! ## Example
//!
//! ```
//! use decorator::external::{MockCloud, MockClusterClient, NoTtySecrets};
//! use decorator::{CreateDecorator, RawParameters};
//! use std::sync::Arc;
//!
//! let raw = RawParameters {
//!     name: Some("aks".to_string()),
//!     resource_group_name: Some("rg".to_string()),
//!     location: Some("westus2".to_string()),
//!     no_ssh_key: Some(true),
//!     enable_managed_identity: Some(true),
//!     ..RawParameters::default()
//! };
//! let mut decorator = CreateDecorator::new(
//!     raw,
//!     Arc::new(MockCloud::new().with_subscription("1234-5678")),
//!     Arc::new(NoTtySecrets),
//!     Arc::new(MockClusterClient::new()),
//! )?;
//! let mc = decorator.construct_mc_profile_default()?;
//! assert_eq!(mc.dns_prefix.as_deref(), Some("aks-rg-1234-5"));
//! # Ok::<(), decorator::Error>(())
//! ```

pub mod context;
pub mod create;
pub mod error;
pub mod external;
pub mod graph;
pub mod intermediates;
pub mod mode;
pub mod params;
mod postprocess;
pub mod resolve;
pub mod update;

pub use context::DecoratorContext;
pub use create::CreateDecorator;
pub use error::{Error, ErrorCategory, Result};
pub use mode::DecoratorMode;
pub use params::RawParameters;
pub use update::UpdateDecorator;
