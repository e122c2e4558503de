use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use thiserror::Error;

use super::Gateway;
use crate::model::GatewayEndpoint;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("reading response body failed: {0}")]
    Body(#[source] reqwest::Error),
    #[error("{method} {url} answered with status {status}")]
    UnexpectedStatus {
        method: Method,
        url: String,
        status: StatusCode,
    },
}

/// Talks to the gateway over http with clients owned by this instance, so the
/// timeouts here never leak into other http users in the process.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    scrape_url: String,
    fetch_client: reqwest::Client,
    delete_client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(
        endpoint: &GatewayEndpoint,
        fetch_timeout: Duration,
        delete_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let fetch_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .connect_timeout(fetch_timeout)
            .build()?;
        let delete_client = reqwest::Client::builder()
            .timeout(delete_timeout)
            .connect_timeout(delete_timeout)
            .build()?;

        Ok(Self {
            scrape_url: endpoint.scrape_url(),
            fetch_client,
            delete_client,
        })
    }

    pub fn scrape_url(&self) -> &str {
        &self.scrape_url
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    type Error = GatewayError;

    async fn fetch_metrics(&self) -> Result<String, GatewayError> {
        let response = self.fetch_client.get(&self.scrape_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::UnexpectedStatus {
                method: Method::GET,
                url: self.scrape_url.clone(),
                status,
            });
        }

        response.text().await.map_err(GatewayError::Body)
    }

    async fn delete_group(&self, grouping_path: &str) -> Result<(), GatewayError> {
        let url = format!("{}{}", self.scrape_url, grouping_path);
        let response = self.delete_client.delete(&url).send().await?;

        // the gateway acknowledges deletions with 202 only
        let status = response.status();
        if status != StatusCode::ACCEPTED {
            return Err(GatewayError::UnexpectedStatus {
                method: Method::DELETE,
                url,
                status,
            });
        }

        Ok(())
    }
}
