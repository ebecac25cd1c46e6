pub mod auth;
pub mod client;
pub mod config;
pub mod credential;
pub mod credential_cache;
pub mod error;
pub mod gateway;
pub mod report_cache;
pub mod service;
pub mod types;

#[cfg(test)]
mod testing;

pub use auth::Authenticator;
pub use client::{TelemetryApi, TractiveClient};
pub use config::{AccountCredentials, FallbackPolicy, GatewayConfig};
pub use credential::Credential;
pub use credential_cache::CredentialStore;
pub use error::{GatewayError, Result};
pub use gateway::{FetchOutcome, GatewayReport, ReportGateway};
pub use report_cache::ReportCache;
pub use service::TrackerService;
pub use types::{
    Freshness, HardwareReport, LocationReport, Lookup, Report, ReportKind, TrackerId,
};
