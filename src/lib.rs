//! Asset Relay - caching delivery layer for remote media resources
//!
//! Fronts three kinds of remote resources for playback clients:
//!
//! - **Keys**: stream decryption keys, short TTL, served as octet-stream
//! - **Logos**: channel images, long TTL, image types only
//! - **Spider**: a plugin jar fetched from ordered mirrors, with an embedded
//!   fallback so the endpoint never fails
//!
//! Keys and logos share one generic fetch-through cache ([`proxy::ResourceProxy`])
//! with conditional revalidation against the origin. All outbound traffic goes
//! through one bounded connection pool ([`origin::OriginFetcher`]).

pub mod cache;
pub mod config;
pub mod origin;
pub mod proxy;
pub mod routes;
pub mod server;
pub mod sources;
pub mod spider;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{RelayError, Result};
