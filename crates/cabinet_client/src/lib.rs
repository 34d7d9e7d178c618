use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::CabinetName,
    error::{ErrorCode, ValidationError},
    protocol::{
        AddToCabinetRequest, CreateCabinetRequest, ErrorBody, HealthResponse,
        ListCabinetsResponse, MessageResponse, QueryCabinetParams, QueryCabinetResponse,
    },
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

mod score;
pub use score::{RelevanceScore, ScoreSource};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_DETAIL_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("{operation} could not reach the cabinet server: {detail}")]
    Transport {
        operation: &'static str,
        detail: String,
    },
    #[error("{operation} failed with HTTP {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Server {
        operation: &'static str,
        status: u16,
        detail: Option<String>,
    },
    #[error("{operation} returned an unexpected body: {detail}")]
    Decode {
        operation: &'static str,
        detail: String,
    },
    #[error("invalid server url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl ClientError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Server { .. } | Self::Decode { .. } => ErrorCode::Server,
            Self::InvalidBaseUrl { .. } => ErrorCode::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy { status: String },
    Unreachable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created { name: CabinetName, message: String },
    Conflict { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { message: String },
    NotFound { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Added {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabinetDescriptor {
    pub name: CabinetName,
    pub item_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub text: String,
    pub score: Option<RelevanceScore>,
    pub source_url: Option<String>,
}

impl SearchHit {
    pub fn percentage(&self) -> f64 {
        self.score.map(|s| s.as_percentage()).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    pub top_k: u32,
    pub similarity_threshold: f64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.3,
        }
    }
}

/// Remote cabinet operations. Every call is a single request; nothing is
/// retried here.
#[async_trait]
pub trait CabinetApi: Send + Sync {
    async fn health(&self) -> HealthStatus;
    async fn list_cabinets(&self) -> Result<Vec<CabinetDescriptor>, ClientError>;
    async fn create_cabinet(&self, name: &str) -> Result<CreateOutcome, ClientError>;
    async fn delete_cabinet(&self, name: &CabinetName) -> Result<DeleteOutcome, ClientError>;
    async fn add_text(
        &self,
        cabinet: &CabinetName,
        text: &str,
        source_url: &str,
    ) -> Result<Added, ClientError>;
    async fn query(
        &self,
        cabinet: &CabinetName,
        query: &str,
        options: QueryOptions,
    ) -> Result<Vec<SearchHit>, ClientError>;
}

#[derive(Debug, Clone)]
pub struct CabinetClient {
    http: Client,
    base_url: Url,
    timeout: Duration,
}

impl CabinetClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: Client::new(),
            base_url: parse_base_url(base_url)?,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: "url cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends one request and reads the whole body, cancelling the exchange
    /// once the configured timeout elapses.
    async fn exchange(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<(StatusCode, String), ClientError> {
        debug!(operation, "cabinet api request");
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "cabinet api request timed out"
                );
                Err(ClientError::Timeout {
                    operation,
                    after: self.timeout,
                })
            }
            Ok(Err(err)) if err.is_timeout() => Err(ClientError::Timeout {
                operation,
                after: self.timeout,
            }),
            Ok(Err(err)) => {
                warn!(operation, error = %err, "cabinet api transport failure");
                Err(ClientError::Transport {
                    operation,
                    detail: err.to_string(),
                })
            }
            Ok(Ok((status, body))) => {
                debug!(operation, status = status.as_u16(), "cabinet api response");
                Ok((status, body))
            }
        }
    }
}

#[async_trait]
impl CabinetApi for CabinetClient {
    async fn health(&self) -> HealthStatus {
        let url = match self.endpoint(&["health"]) {
            Ok(url) => url,
            Err(err) => {
                return HealthStatus::Unreachable {
                    reason: err.to_string(),
                }
            }
        };
        let (status, body) = match self.exchange("health", self.http.get(url)).await {
            Ok(pair) => pair,
            Err(err) => {
                return HealthStatus::Unreachable {
                    reason: err.to_string(),
                }
            }
        };
        if !status.is_success() {
            return HealthStatus::Unhealthy {
                status: format!("HTTP {}", status.as_u16()),
            };
        }
        match serde_json::from_str::<HealthResponse>(&body) {
            Ok(health) if health.status == "healthy" => HealthStatus::Healthy,
            Ok(health) => HealthStatus::Unhealthy {
                status: health.status,
            },
            Err(err) => HealthStatus::Unhealthy {
                status: format!("malformed health body: {err}"),
            },
        }
    }

    async fn list_cabinets(&self) -> Result<Vec<CabinetDescriptor>, ClientError> {
        const OP: &str = "list_cabinets";
        let url = self.endpoint(&["list_cabinets"])?;
        let (status, body) = self.exchange(OP, self.http.get(url)).await?;
        if !status.is_success() {
            return Err(server_error(OP, status, &body));
        }
        let listing: ListCabinetsResponse = decode(OP, &body)?;
        if !listing.success {
            return Err(reported_failure(OP, status));
        }
        Ok(listing
            .cabinets
            .into_iter()
            .map(|cabinet| CabinetDescriptor {
                name: cabinet.name,
                item_count: cabinet.chunk_count.unwrap_or(0),
            })
            .collect())
    }

    async fn create_cabinet(&self, name: &str) -> Result<CreateOutcome, ClientError> {
        const OP: &str = "create_cabinet";
        let name = CabinetName::parse(name)?;
        let url = self.endpoint(&["create_cabinet"])?;
        let request = self.http.post(url).json(&CreateCabinetRequest {
            cabinet_name: name.as_str().to_string(),
        });
        let (status, body) = self.exchange(OP, request).await?;
        if status.is_success() {
            let message = decode::<MessageResponse>(OP, &body)?
                .message
                .unwrap_or_else(|| format!("Created cabinet \"{name}\""));
            return Ok(CreateOutcome::Created { name, message });
        }
        let detail = error_detail(&body);
        let names_conflict = status == StatusCode::CONFLICT
            || (status == StatusCode::BAD_REQUEST
                && detail
                    .as_deref()
                    .is_some_and(|d| d.to_ascii_lowercase().contains("already exists")));
        if names_conflict {
            return Ok(CreateOutcome::Conflict {
                detail: detail.unwrap_or_else(|| format!("cabinet \"{name}\" already exists")),
            });
        }
        Err(ClientError::Server {
            operation: OP,
            status: status.as_u16(),
            detail,
        })
    }

    async fn delete_cabinet(&self, name: &CabinetName) -> Result<DeleteOutcome, ClientError> {
        const OP: &str = "delete_cabinet";
        let url = self.endpoint(&["delete_cabinet", name.as_str()])?;
        let (status, body) = self.exchange(OP, self.http.delete(url)).await?;
        if status.is_success() {
            let message = decode::<MessageResponse>(OP, &body)?
                .message
                .unwrap_or_else(|| format!("Deleted cabinet \"{name}\""));
            return Ok(DeleteOutcome::Deleted { message });
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(DeleteOutcome::NotFound {
                detail: error_detail(&body)
                    .unwrap_or_else(|| format!("cabinet \"{name}\" not found")),
            });
        }
        Err(server_error(OP, status, &body))
    }

    async fn add_text(
        &self,
        cabinet: &CabinetName,
        text: &str,
        source_url: &str,
    ) -> Result<Added, ClientError> {
        const OP: &str = "add_to_cabinet";
        let url = self.endpoint(&["add_to_cabinet"])?;
        let request = self.http.post(url).json(&AddToCabinetRequest {
            cabinet_name: cabinet.as_str().to_string(),
            text: text.to_string(),
            source_url: source_url.to_string(),
        });
        let (status, body) = self.exchange(OP, request).await?;
        if !status.is_success() {
            return Err(server_error(OP, status, &body));
        }
        let message = decode::<MessageResponse>(OP, &body)?
            .message
            .unwrap_or_else(|| format!("Added text to \"{cabinet}\""));
        Ok(Added { message })
    }

    async fn query(
        &self,
        cabinet: &CabinetName,
        query: &str,
        options: QueryOptions,
    ) -> Result<Vec<SearchHit>, ClientError> {
        const OP: &str = "query_cabinet";
        let url = self.endpoint(&["query_cabinet"])?;
        let request = self.http.get(url).query(&QueryCabinetParams {
            cabinet_name: cabinet.as_str().to_string(),
            query: query.to_string(),
            top_k: options.top_k,
            similarity_threshold: options.similarity_threshold,
        });
        let (status, body) = self.exchange(OP, request).await?;
        if !status.is_success() {
            return Err(server_error(OP, status, &body));
        }
        let response: QueryCabinetResponse = decode(OP, &body)?;
        if !response.success {
            return Err(reported_failure(OP, status));
        }
        if let Some(found) = response.results_found {
            if found != response.results.len() {
                debug!(found, returned = response.results.len(), "query result count mismatch");
            }
        }
        Ok(response
            .results
            .into_iter()
            .map(|result| SearchHit {
                score: RelevanceScore::from_result(&result),
                text: result.text,
                source_url: result.source_url,
            })
            .collect())
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let raw = raw.trim();
    let url = Url::parse(raw).map_err(|e| ClientError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.cannot_be_a_base() {
        return Err(ClientError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: "url cannot carry a path".to_string(),
        });
    }
    Ok(url)
}

fn decode<T: DeserializeOwned>(operation: &'static str, body: &str) -> Result<T, ClientError> {
    serde_json::from_str(body).map_err(|e| ClientError::Decode {
        operation,
        detail: e.to_string(),
    })
}

fn error_detail(body: &str) -> Option<String> {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(detail) = parsed.detail_text() {
            return Some(detail);
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(MAX_DETAIL_CHARS).collect())
    }
}

fn server_error(operation: &'static str, status: StatusCode, body: &str) -> ClientError {
    ClientError::Server {
        operation,
        status: status.as_u16(),
        detail: error_detail(body),
    }
}

fn reported_failure(operation: &'static str, status: StatusCode) -> ClientError {
    ClientError::Server {
        operation,
        status: status.as_u16(),
        detail: Some("server reported success=false".to_string()),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
