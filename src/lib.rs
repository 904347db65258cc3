pub mod api;
pub mod core;
pub mod credentials;
pub mod reconcile;
pub mod sweep;
pub mod utils;

pub use utils::{safe_truncate_ellipsis, token_fingerprint};

pub use api::{ApiError, PlatformApis, ProjectSession};
pub use core::config::{DEFAULT_STACK_SUFFIX, JanitorConfig};
pub use core::error::{JanitorError, Result};
pub use credentials::TokenSource;
pub use reconcile::{ReconciliationManager, RunReport, TargetSet};

pub const SINGLE_PROJECT_TOKEN_ENV: &str = "KBC_STORAGE_TOKEN";
