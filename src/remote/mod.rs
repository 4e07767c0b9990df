//! Remote sheet API access
//!
//! The `RemoteApi` trait is the narrow seam between the sync engine and the
//! spreadsheet-backed HTTP endpoints; `HttpRemoteClient` is the production
//! implementation. Tests substitute their own mock.

mod api;
mod client;

pub use api::{FetchResponse, PushResponse, RemoteApi};
pub use client::HttpRemoteClient;
