//! HTTP client for the downstream services.

use std::time::Duration;

use common::{BatchRequest, DataResponse};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::LoadError;
use crate::context::AuthToken;

/// One downstream service.
#[derive(Clone)]
pub struct DownstreamClient {
    http: Client,
    base_url: String,
    resource: &'static str,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl DownstreamClient {
    pub fn new(http: Client, base_url: impl Into<String>, resource: &'static str) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            resource,
        }
    }

    pub fn resource(&self) -> &'static str {
        self.resource
    }

    /// `POST {base}/api/v1/{path}/batch` with `{"ids": [...]}`, returning the
    /// `data` array in whatever order the service produced it.
    pub async fn batch<T: DeserializeOwned>(
        &self,
        path: &str,
        ids: Vec<String>,
        token: Option<&AuthToken>,
    ) -> Result<Vec<T>, LoadError> {
        let url = format!("{}/api/v1/{path}/batch", self.base_url);
        let request = self.http.post(&url).json(&BatchRequest { ids });
        let body: DataResponse<Vec<T>> = self.send(request, token).await?;
        Ok(body.data)
    }

    /// `GET {base}/api/v1/{path}` with query parameters.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: Option<&AuthToken>,
    ) -> Result<T, LoadError> {
        let url = format!("{}/api/v1/{path}", self.base_url);
        self.send(self.http.get(&url).query(query), token).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        mut request: RequestBuilder,
        token: Option<&AuthToken>,
    ) -> Result<T, LoadError> {
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, token.as_str());
        }

        let response = request.send().await.map_err(|e| self.downstream(e))?;
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| self.downstream(e));
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        if status.is_client_error() {
            Err(LoadError::Rejected {
                resource: self.resource,
                status: status.as_u16(),
                message,
            })
        } else {
            Err(LoadError::Downstream {
                resource: self.resource,
                message: format!("status {}: {message}", status.as_u16()),
            })
        }
    }

    fn downstream(&self, err: reqwest::Error) -> LoadError {
        LoadError::Downstream {
            resource: self.resource,
            message: err.to_string(),
        }
    }
}

/// The three services the gateway aggregates.
#[derive(Clone)]
pub struct Downstreams {
    pub users: DownstreamClient,
    pub orders: DownstreamClient,
    pub payments: DownstreamClient,
}

impl Downstreams {
    /// Builds clients sharing one connection pool.
    pub fn new(
        users_url: &str,
        orders_url: &str,
        payments_url: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            users: DownstreamClient::new(http.clone(), users_url, "users"),
            orders: DownstreamClient::new(http.clone(), orders_url, "orders"),
            payments: DownstreamClient::new(http, payments_url, "payments"),
        })
    }
}
