pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod outbox;
pub mod repositories;
pub mod server;
pub mod service;

pub use config::TenantServiceConfig;
pub use error::{TenantServiceError, TenantServiceResult};
pub use server::TenantServiceServer;
