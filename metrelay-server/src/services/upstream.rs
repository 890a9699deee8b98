//! Delivery of payloads to the collector.

use std::time::Instant;

use metrelay_config::Config;
use metrelay_log::LogError;
use metrelay_statsd::metric;
use metrelay_transform::{Deliver, UnixTimestamp};
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header;
use tokio::task::JoinSet;

use crate::constants;
use crate::statsd::{ServerCounters, ServerHistograms, ServerTimers};
use crate::status::SharedStatus;

/// A failed payload delivery.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The request could not be sent or did not complete.
    #[error("could not send request to upstream")]
    Reqwest(#[from] reqwest::Error),
    /// The upstream responded with a non-success status.
    #[error("upstream responded with status {0}")]
    Status(StatusCode),
}

impl UpstreamError {
    /// Returns `true` if the request did not reach the upstream or got no response.
    pub fn is_network_error(&self) -> bool {
        match self {
            Self::Reqwest(error) => error.is_timeout() || error.is_connect() || error.is_request(),
            Self::Status(_) => false,
        }
    }

    fn kind(&self) -> &'static str {
        if self.is_network_error() {
            "network"
        } else {
            "status"
        }
    }
}

/// Posts payload bodies to the upstream collector.
///
/// Every [`deliver`](Deliver::deliver) spawns an independent request on the current runtime and
/// returns immediately. Outcomes are recorded in the shared flush status. Failed requests are
/// not retried.
#[derive(Debug)]
pub struct UpstreamDelivery {
    client: reqwest::Client,
    url: String,
    status: SharedStatus,
    tasks: Mutex<JoinSet<()>>,
}

impl UpstreamDelivery {
    /// Creates the delivery for the configured upstream.
    pub fn new(config: &Config, status: SharedStatus) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.http_connection_timeout())
            .timeout(config.http_timeout())
            .user_agent(constants::CLIENT)
            .build()?;

        Ok(Self {
            client,
            url: config.upstream_descriptor().url(),
            status,
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    /// Returns the URL payloads are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Waits for all in-flight requests to complete.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        if !tasks.is_empty() {
            metrelay_log::debug!(pending = tasks.len(), "waiting for in-flight deliveries");
        }

        while tasks.join_next().await.is_some() {}
    }
}

impl Deliver for UpstreamDelivery {
    fn deliver(&self, body: Vec<u8>) {
        let client = self.client.clone();
        let url = self.url.clone();
        let status = self.status.clone();

        let mut tasks = self.tasks.lock();
        // Reap finished requests of earlier cycles.
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            let length = body.len();
            let start = Instant::now();
            let result = send(&client, &url, body).await;
            let elapsed = start.elapsed();

            match result {
                Ok(()) => {
                    metric!(counter(ServerCounters::UpstreamRequests) += 1, result = "success");
                    metric!(timer(ServerTimers::UpstreamDuration) = elapsed, result = "success");
                    metric!(histogram(ServerHistograms::UpstreamPayloadBytes) = length as u64);

                    metrelay_log::debug!(
                        flush_time = elapsed.as_millis() as u64,
                        flush_length = length,
                        "payload delivered"
                    );
                    status.write().delivered(elapsed.as_millis() as u64, length);
                }
                Err(error) => {
                    metric!(counter(ServerCounters::UpstreamRequests) += 1, result = "failure");
                    metric!(timer(ServerTimers::UpstreamDuration) = elapsed, result = "failure");
                    metric!(counter(ServerCounters::UpstreamErrors) += 1, kind = error.kind());

                    metrelay_log::error!("failed to deliver payload: {}", LogError(&error));
                    status
                        .write()
                        .failed(UnixTimestamp::now(), LogError(&error).to_string());
                }
            }
        });
    }
}

async fn send(client: &reqwest::Client, url: &str, body: Vec<u8>) -> Result<(), UpstreamError> {
    let response = client
        .post(url)
        .header(header::CONTENT_TYPE, constants::PAYLOAD_CONTENT_TYPE)
        .body(body)
        .send()
        .await?;

    match response.status() {
        status if status.is_success() => Ok(()),
        status => Err(UpstreamError::Status(status)),
    }
}
