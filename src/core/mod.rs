pub mod config;
pub mod error;

pub use config::{Endpoints, JanitorConfig};
pub use error::{JanitorError, Result};
