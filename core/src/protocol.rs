//! Request builder and response parser for the Domo REST API.
//!
//! # Design
//! `DomoProtocol` holds only the API host and carries no mutable state. Each
//! operation is split into a `build_*` method that produces an `HttpRequest`
//! and a `parse_*` method that consumes an `HttpResponse`. Authenticated
//! builders take the bearer token explicitly; `DomoClient` is the layer that
//! obtains it and runs the exchange.
//!
//! Status handling differs per operation. `parse_query_dataset` requires
//! exactly 200 and reports anything else as `ApiError::Http`. Every other
//! parser accepts any 2xx and reports the rest as
//! `TransportError::Status`.

use base64::engine::general_purpose::STANDARD as BASE64;
use std::borrow::Cow;

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Credentials;
use crate::error::{ApiError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, MediaType};
use crate::types::{
    AccessToken, CreateDataset, CreateStream, Dataset, DatasetId, Execution, ExecutionId, Stream,
    StreamId, UpdateDataset,
};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Stateless request builder and response parser.
#[derive(Debug, Clone)]
pub struct DomoProtocol {
    api_host: String,
}

impl DomoProtocol {
    pub fn new(api_host: &str) -> Self {
        Self {
            api_host: api_host.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    fn datasets_url(&self) -> String {
        format!("{}/v1/datasets", self.api_host)
    }

    fn streams_url(&self) -> String {
        format!("{}/v1/streams", self.api_host)
    }

    fn dataset_url(&self, id: &DatasetId) -> String {
        format!("{}/{}", self.datasets_url(), segment(id.as_str()))
    }

    fn execution_url(&self, stream: &StreamId, execution: &ExecutionId) -> String {
        format!(
            "{}/{}/executions/{}",
            self.streams_url(),
            segment(stream.as_str()),
            segment(execution.as_str())
        )
    }

    // -----------------------------------------------------------------------
    // Authentication
    // -----------------------------------------------------------------------

    /// Client-credentials grant with scope `data`. Fails with
    /// `ApiError::Config` when either credential is empty.
    pub fn build_authenticate(&self, credentials: &Credentials) -> Result<HttpRequest, ApiError> {
        if !credentials.is_complete() {
            return Err(ApiError::Config(
                "missing parameters: client_id, client_secret".to_string(),
            ));
        }
        let basic = BASE64.encode(format!(
            "{}:{}",
            credentials.client_id(),
            credentials.client_secret()
        ));
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: format!(
                "{}/oauth/token?grant_type=client_credentials&scope=data",
                self.api_host
            ),
            headers: vec![
                ("authorization".to_string(), format!("Basic {basic}")),
                ("accept".to_string(), MediaType::Json.as_str().to_string()),
            ],
            body: None,
        })
    }

    pub fn parse_authenticate(&self, response: HttpResponse) -> Result<AccessToken, ApiError> {
        let token: TokenResponse = decode(response)?;
        Ok(AccessToken::new(token.access_token))
    }

    // -----------------------------------------------------------------------
    // Datasets
    // -----------------------------------------------------------------------

    pub fn build_list_datasets(&self, token: &AccessToken) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: self.datasets_url(),
            headers: api_headers(token, Some(MediaType::Json), MediaType::Json),
            body: None,
        }
    }

    pub fn build_get_dataset(&self, token: &AccessToken, id: &DatasetId) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: self.dataset_url(id),
            headers: api_headers(token, Some(MediaType::Json), MediaType::Json),
            body: None,
        }
    }

    pub fn build_create_dataset(
        &self,
        token: &AccessToken,
        input: &CreateDataset,
    ) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.datasets_url(),
            headers: api_headers(token, Some(MediaType::Json), MediaType::Json),
            body: Some(encode(input)?),
        })
    }

    /// Replaces the column schema only; data is untouched.
    pub fn build_update_dataset(
        &self,
        token: &AccessToken,
        id: &DatasetId,
        input: &UpdateDataset,
    ) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest {
            method: HttpMethod::Put,
            url: self.dataset_url(id),
            headers: api_headers(token, Some(MediaType::Json), MediaType::Json),
            body: Some(encode(input)?),
        })
    }

    pub fn build_append_dataset(&self, token: &AccessToken, id: &DatasetId, csv: &str) -> HttpRequest {
        self.import_request(
            token,
            format!("{}/data?updateMethod=APPEND", self.dataset_url(id)),
            csv,
        )
    }

    pub fn build_replace_dataset(&self, token: &AccessToken, id: &DatasetId, csv: &str) -> HttpRequest {
        self.import_request(token, format!("{}/data", self.dataset_url(id)), csv)
    }

    fn import_request(&self, token: &AccessToken, url: String, csv: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Put,
            url,
            headers: api_headers(token, Some(MediaType::Csv), MediaType::Json),
            body: Some(csv.to_string()),
        }
    }

    /// Export the whole dataset as CSV with a header row.
    pub fn build_query_dataset(&self, token: &AccessToken, id: &DatasetId) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: format!(
                "{}/data?includeHeader=true&fileName={}.csv",
                self.dataset_url(id),
                segment(id.as_str())
            ),
            headers: api_headers(token, None, MediaType::Csv),
            body: None,
        }
    }

    pub fn build_delete_dataset(&self, token: &AccessToken, id: &DatasetId) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Delete,
            url: self.dataset_url(id),
            headers: api_headers(token, Some(MediaType::Json), MediaType::Json),
            body: None,
        }
    }

    /// Raw response; the caller decodes the listing.
    pub fn parse_list_datasets(&self, response: HttpResponse) -> Result<HttpResponse, ApiError> {
        check_success(&response)?;
        Ok(response)
    }

    /// Shared by get, create and update: all three answer with the dataset.
    pub fn parse_dataset(&self, response: HttpResponse) -> Result<Dataset, ApiError> {
        decode(response)
    }

    /// Raw response of an append or replace; the service answers 204.
    pub fn parse_import(&self, response: HttpResponse) -> Result<HttpResponse, ApiError> {
        check_success(&response)?;
        Ok(response)
    }

    pub fn parse_query_dataset(&self, response: HttpResponse) -> Result<String, ApiError> {
        if response.status != 200 {
            return Err(ApiError::Http {
                status: response.status,
                message: server_message(&response.body),
            });
        }
        Ok(response.body)
    }

    pub fn parse_delete_dataset(&self, response: HttpResponse) -> Result<HttpResponse, ApiError> {
        check_success(&response)?;
        Ok(response)
    }

    // -----------------------------------------------------------------------
    // Streams
    // -----------------------------------------------------------------------

    pub fn build_create_stream(
        &self,
        token: &AccessToken,
        input: &CreateStream,
    ) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.streams_url(),
            headers: api_headers(token, Some(MediaType::Json), MediaType::Json),
            body: Some(encode(input)?),
        })
    }

    pub fn build_create_execution(&self, token: &AccessToken, stream: &StreamId) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Post,
            url: format!("{}/{}/executions", self.streams_url(), segment(stream.as_str())),
            headers: api_headers(token, Some(MediaType::Json), MediaType::Json),
            body: None,
        }
    }

    /// `part` is 1-based. Parts of one execution may be sent in any order.
    pub fn build_upload_part(
        &self,
        token: &AccessToken,
        stream: &StreamId,
        execution: &ExecutionId,
        part: u32,
        csv: &str,
    ) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Put,
            url: format!("{}/part/{part}", self.execution_url(stream, execution)),
            headers: api_headers(token, Some(MediaType::Csv), MediaType::Json),
            body: Some(csv.to_string()),
        }
    }

    pub fn build_commit_execution(
        &self,
        token: &AccessToken,
        stream: &StreamId,
        execution: &ExecutionId,
    ) -> HttpRequest {
        self.finish_request(token, stream, execution, "commit")
    }

    pub fn build_abort_execution(
        &self,
        token: &AccessToken,
        stream: &StreamId,
        execution: &ExecutionId,
    ) -> HttpRequest {
        self.finish_request(token, stream, execution, "abort")
    }

    fn finish_request(
        &self,
        token: &AccessToken,
        stream: &StreamId,
        execution: &ExecutionId,
        action: &str,
    ) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Put,
            url: format!("{}/{action}", self.execution_url(stream, execution)),
            headers: api_headers(token, Some(MediaType::Json), MediaType::Json),
            body: None,
        }
    }

    pub fn parse_stream(&self, response: HttpResponse) -> Result<Stream, ApiError> {
        decode(response)
    }

    /// Shared by create, upload, commit and abort.
    pub fn parse_execution(&self, response: HttpResponse) -> Result<Execution, ApiError> {
        decode(response)
    }
}

/// Headers carried by every authenticated request.
pub fn api_headers(
    token: &AccessToken,
    content_type: Option<MediaType>,
    accept: MediaType,
) -> Vec<(String, String)> {
    let mut headers = Vec::with_capacity(4);
    if let Some(content_type) = content_type {
        headers.push(("content-type".to_string(), content_type.as_str().to_string()));
    }
    headers.push((
        "authorization".to_string(),
        format!("Bearer {}", token.as_str()),
    ));
    headers.push(("accept".to_string(), accept.as_str().to_string()));
    headers.push(("accept-encoding".to_string(), "identity".to_string()));
    headers
}

/// Non-2xx becomes `TransportError::Status`.
fn check_success(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(TransportError::Status {
        status: response.status,
        body: response.body.clone(),
    }
    .into())
}

/// Ids are opaque, so they are percent-encoded before going into a path.
fn segment(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

fn decode<T: DeserializeOwned>(response: HttpResponse) -> Result<T, ApiError> {
    check_success(&response)?;
    serde_json::from_str(&response.body).map_err(ApiError::Deserialization)
}

fn encode<T: Serialize>(input: &T) -> Result<String, ApiError> {
    serde_json::to_string(input).map_err(ApiError::Serialization)
}

/// The platform's error bodies are JSON with a `message` field; anything
/// else is passed through verbatim.
fn server_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
