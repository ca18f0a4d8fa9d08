//! Configuration, bootstrap and the service facade exposed to collaborators.

pub mod bootstrap;
pub mod config;
pub mod service;

pub use config::Config;
pub use service::{CodeSearchService, ServiceError};
