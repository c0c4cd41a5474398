//! Resource proxies for keys and logos
//!
//! One generic [`ResourceProxy`] is instantiated per asset class with a
//! different [`AssetPolicy`] and [`ProxyConfig`].

pub mod handler;
pub mod policy;

pub use handler::{
    content_etag, CacheStatus, ProxyConfig, ProxyResponse, ProxySnapshot, ResourceProxy,
};
pub use policy::{AssetPolicy, KeyPolicy, LogoPolicy, ACCEPTED_IMAGE_TYPES, DEFAULT_LOGO_MAX_BYTES};
