pub mod types;
pub mod links;
pub mod config;
pub mod error;

pub use types::*;
pub use links::LinkType;
pub use config::{Config, EngineConfig};
pub use error::TalentGraphError;
