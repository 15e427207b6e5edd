//! WLED JSON API client over HTTP.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use wled_core::{DeviceClient, WledHttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = WledHttpClient::new(Duration::from_secs(5))?;
//! let report = client.probe("192.168.1.40").await?;
//! println!("{:?} runs {:?}", report.id, report.attributes.firmware);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{ClientError, Error, Result};
use crate::traits::{DeviceClient, DeviceReport};
use crate::wled::{STATE_INFO_PATH, parse_report};

/// [`DeviceClient`] talking to the WLED JSON API.
///
/// Requests `GET http://{address}/json/si`. The timeout covers the whole
/// request, including reading the body.
#[derive(Debug, Clone)]
pub struct WledHttpClient {
    client: Client,
    timeout: Duration,
}

impl WledHttpClient {
    /// Create a client with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::invalid_config("request timeout must be non-zero"));
        }
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::invalid_config(format!("could not build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn classify(&self, address: &str, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::timeout(address, self.timeout)
        } else if e.is_connect() || e.is_request() {
            ClientError::unreachable(address, error_chain(&e))
        } else {
            ClientError::protocol(address, error_chain(&e))
        }
    }
}

/// Render an error with its sources, since reqwest hides the useful part
/// (connection refused, DNS failure) in the chain.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

fn url_for(address: &str) -> String {
    format!("http://{}{}", address.trim_end_matches('/'), STATE_INFO_PATH)
}

#[async_trait]
impl DeviceClient for WledHttpClient {
    async fn probe(&self, address: &str) -> std::result::Result<DeviceReport, ClientError> {
        let url = url_for(address);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(address, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::protocol(address, format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.classify(address, e))?;
        parse_report(&body).map_err(|message| ClientError::protocol(address, message))
    }
}
