//! Blocking client for the Domo dataset and stream REST APIs.
//!
//! # Overview
//! `DomoClient` holds OAuth client credentials, fetches a bearer token on
//! first use and exposes one method per remote operation: dataset CRUD, CSV
//! import/export, and multi-part stream uploads.
//!
//! # Design
//! - `DomoProtocol` is pure: `build_*` produces an `HttpRequest`, `parse_*`
//!   consumes an `HttpResponse`. It can be driven by any HTTP stack.
//! - `DomoClient` adds the token and a `Transport` (ureq by default).
//! - Dataset, stream and execution ids are distinct types.
//! - Only `query_dataset` checks for an exact status; see `error` for how the
//!   other operations report failures.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod transport;
pub mod types;

pub use client::DomoClient;
pub use config::Credentials;
pub use error::{ApiError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, MediaType, Transport};
pub use protocol::DomoProtocol;
pub use transport::UreqTransport;
pub use types::{
    AccessToken, Column, CreateDataset, CreateStream, Dataset, DatasetId, Execution, ExecutionId,
    Schema, Stream, StreamDataSet, StreamId, UpdateDataset, UpdateMethod,
};
