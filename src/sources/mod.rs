//! Source retrieval.
//!
//! The build only ever sees local, verified files. A [`Fetcher`] turns each
//! source and patch URL into such a file; [`CacheFetcher`] is the default
//! implementation backed by a content-addressed download cache.

pub mod fetch;

pub use fetch::{fetch_all, Artifact, CacheFetcher, FetchedSources, Fetcher};
