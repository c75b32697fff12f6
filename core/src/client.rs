//! Stateful Domo API client.
//!
//! # Design
//! `DomoClient` owns the credentials, an optional bearer token and a
//! `Transport`. Every operation first makes sure a token is held (fetching
//! one only if it is absent), then builds the request with `DomoProtocol`,
//! executes it and parses the response. The token is never refreshed; it
//! lives as long as the client.
//!
//! Each public method sends exactly one request, plus the token request on
//! first use. Nothing is retried.

use tracing::debug;

use crate::config::{self, Credentials};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::protocol::DomoProtocol;
use crate::transport::UreqTransport;
use crate::types::{
    AccessToken, Column, CreateDataset, CreateStream, Dataset, DatasetId, Execution, ExecutionId,
    Stream, StreamId, UpdateDataset, UpdateMethod,
};

/// Blocking client for the Domo dataset and stream APIs.
///
/// Methods take `&mut self` because the first call may store a token. Share
/// an instance across threads only behind a lock.
#[derive(Debug)]
pub struct DomoClient<T = UreqTransport> {
    protocol: DomoProtocol,
    credentials: Credentials,
    token: Option<AccessToken>,
    transport: T,
}

impl DomoClient<UreqTransport> {
    /// Client against the production host. No I/O and no validation happen
    /// here.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::with_transport(
            Credentials::new(client_id, client_secret),
            UreqTransport::new(),
        )
    }

    /// Credentials and host from `DOMO_CLIENT_ID`, `DOMO_CLIENT_SECRET` and
    /// `DOMO_API_HOST`.
    pub fn from_env() -> Self {
        Self::with_transport(Credentials::from_env(), UreqTransport::new())
            .with_api_host(&config::api_host_from_env())
    }
}

impl<T: Transport> DomoClient<T> {
    pub fn with_transport(credentials: Credentials, transport: T) -> Self {
        Self {
            protocol: DomoProtocol::new(config::DEFAULT_API_HOST),
            credentials,
            token: None,
            transport,
        }
    }

    pub fn with_api_host(mut self, api_host: &str) -> Self {
        self.protocol = DomoProtocol::new(api_host);
        self
    }

    pub fn api_host(&self) -> &str {
        self.protocol.api_host()
    }

    pub fn access_token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Fetch a fresh token and keep it. Fails with `ApiError::Config` before
    /// any request when a credential is empty.
    pub fn authenticate(&mut self) -> Result<&mut Self, ApiError> {
        let token = self.fetch_token()?;
        self.token = Some(token);
        Ok(self)
    }

    fn fetch_token(&self) -> Result<AccessToken, ApiError> {
        let request = self.protocol.build_authenticate(&self.credentials)?;
        debug!(client_id = self.credentials.client_id(), "requesting access token");
        let token = self.protocol.parse_authenticate(self.send(&request)?)?;
        debug!("access token obtained");
        Ok(token)
    }

    /// The held token, fetched first if there is none.
    fn ensure_authenticated(&mut self) -> Result<AccessToken, ApiError> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        let token = self.fetch_token()?;
        self.token = Some(token.clone());
        Ok(token)
    }

    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = %request.method, url = %request.url, "sending request");
        let response = self.transport.execute(request)?;
        debug!(status = response.status, url = %request.url, "received response");
        Ok(response)
    }

    // -----------------------------------------------------------------------
    // Datasets
    // -----------------------------------------------------------------------

    /// Raw listing response; decode it with `HttpResponse::json`.
    pub fn list_datasets(&mut self) -> Result<HttpResponse, ApiError> {
        let token = self.ensure_authenticated()?;
        let request = self.protocol.build_list_datasets(&token);
        self.protocol.parse_list_datasets(self.send(&request)?)
    }

    pub fn get_dataset(&mut self, id: &DatasetId) -> Result<Dataset, ApiError> {
        let token = self.ensure_authenticated()?;
        let request = self.protocol.build_get_dataset(&token, id);
        self.protocol.parse_dataset(self.send(&request)?)
    }

    pub fn create_dataset(
        &mut self,
        name: &str,
        description: &str,
        columns: &[Column],
    ) -> Result<Dataset, ApiError> {
        let token = self.ensure_authenticated()?;
        let input = CreateDataset::new(name, description, columns);
        let request = self.protocol.build_create_dataset(&token, &input)?;
        self.protocol.parse_dataset(self.send(&request)?)
    }

    /// Replace the column schema. Existing rows are left alone.
    pub fn update_dataset(&mut self, id: &DatasetId, columns: &[Column]) -> Result<Dataset, ApiError> {
        let token = self.ensure_authenticated()?;
        let request = self
            .protocol
            .build_update_dataset(&token, id, &UpdateDataset::new(columns))?;
        self.protocol.parse_dataset(self.send(&request)?)
    }

    /// Append CSV rows in one request. Suited to small payloads; use a stream
    /// for large loads. The service answers 204.
    pub fn append_dataset(&mut self, id: &DatasetId, csv: &str) -> Result<HttpResponse, ApiError> {
        let token = self.ensure_authenticated()?;
        let request = self.protocol.build_append_dataset(&token, id, csv);
        self.protocol.parse_import(self.send(&request)?)
    }

    /// Overwrite the dataset contents with `csv`.
    pub fn replace_dataset(&mut self, id: &DatasetId, csv: &str) -> Result<HttpResponse, ApiError> {
        let token = self.ensure_authenticated()?;
        let request = self.protocol.build_replace_dataset(&token, id, csv);
        self.protocol.parse_import(self.send(&request)?)
    }

    /// Whole dataset as CSV, header row included. Any status other than 200
    /// is reported as `ApiError::Http`.
    pub fn query_dataset(&mut self, id: &DatasetId) -> Result<String, ApiError> {
        let token = self.ensure_authenticated()?;
        let request = self.protocol.build_query_dataset(&token, id);
        self.protocol.parse_query_dataset(self.send(&request)?)
    }

    /// Irreversible.
    pub fn delete_dataset(&mut self, id: &DatasetId) -> Result<HttpResponse, ApiError> {
        let token = self.ensure_authenticated()?;
        let request = self.protocol.build_delete_dataset(&token, id);
        self.protocol.parse_delete_dataset(self.send(&request)?)
    }

    // -----------------------------------------------------------------------
    // Streams
    // -----------------------------------------------------------------------

    /// Create a stream together with the dataset it feeds.
    pub fn create_stream(
        &mut self,
        name: &str,
        description: &str,
        columns: &[Column],
        update_method: UpdateMethod,
    ) -> Result<Stream, ApiError> {
        let token = self.ensure_authenticated()?;
        let input = CreateStream::new(name, description, columns, update_method);
        let request = self.protocol.build_create_stream(&token, &input)?;
        self.protocol.parse_stream(self.send(&request)?)
    }

    /// Open an execution. The stream's dataset stays locked until the
    /// execution is committed or aborted; that is the caller's job.
    pub fn create_execution(&mut self, stream: &StreamId) -> Result<Execution, ApiError> {
        let token = self.ensure_authenticated()?;
        let request = self.protocol.build_create_execution(&token, stream);
        self.protocol.parse_execution(self.send(&request)?)
    }

    pub fn upload_part(
        &mut self,
        stream: &StreamId,
        execution: &ExecutionId,
        part: u32,
        csv: &str,
    ) -> Result<Execution, ApiError> {
        let token = self.ensure_authenticated()?;
        let request = self
            .protocol
            .build_upload_part(&token, stream, execution, part, csv);
        self.protocol.parse_execution(self.send(&request)?)
    }

    pub fn commit_execution(
        &mut self,
        stream: &StreamId,
        execution: &ExecutionId,
    ) -> Result<Execution, ApiError> {
        let token = self.ensure_authenticated()?;
        let request = self.protocol.build_commit_execution(&token, stream, execution);
        self.protocol.parse_execution(self.send(&request)?)
    }

    /// Abandon an execution, e.g. after a failed part upload.
    pub fn abort_execution(
        &mut self,
        stream: &StreamId,
        execution: &ExecutionId,
    ) -> Result<Execution, ApiError> {
        let token = self.ensure_authenticated()?;
        let request = self.protocol.build_abort_execution(&token, stream, execution);
        self.protocol.parse_execution(self.send(&request)?)
    }
}
