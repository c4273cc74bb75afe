//! Shared rule model for the novasound engine and its tooling.

pub mod config;
pub mod error;
pub mod lenient;
pub mod models;
pub mod pattern;
pub mod selector;

pub use config::*;
pub use error::*;
pub use models::*;
pub use pattern::UrlPattern;
pub use selector::{ClassIdSelector, SimpleSelector};
