//! Outbound origin access

pub mod fetcher;

pub use fetcher::{
    FetchError, FetchOutcome, FetchRequest, FetchedResource, FetcherConfig, OriginFetcher,
};
