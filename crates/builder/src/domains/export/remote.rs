use crate::{key_file_name, ExportError, ExportJob, ExportService, JobState, LongTable};
use async_trait::async_trait;
use reqwest::{multipart, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use slog::{debug, error, info, Logger};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    state: String,
}

/// Export service reached over HTTP.
///
/// `POST {base_url}/exports` takes a multipart form with the long table csv
/// (`file`) and the `destination` name and answers `{"id": ...}`;
/// `GET {base_url}/exports/{id}` answers `{"state": ...}`.
pub struct RemoteExportService {
    base_url: String,
    client: Client,
    status_client: ClientWithMiddleware,
    logger: Logger,
}

impl RemoteExportService {
    pub fn new(base_url: impl Into<String>, logger: Logger) -> Result<Self, ExportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ExportError::Request(format!("failed to build http client: {}", e)))?;

        // submissions are not idempotent, only status checks are retried
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let status_client = ClientBuilder::new(client.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client,
            status_client,
            logger,
        })
    }
}

#[async_trait]
impl ExportService for RemoteExportService {
    async fn submit(
        &self,
        table: &LongTable,
        destination: &str,
    ) -> Result<Box<dyn ExportJob>, ExportError> {
        let csv_part = multipart::Part::bytes(table.to_csv_bytes()?)
            .file_name(key_file_name(destination).to_owned())
            .mime_str("text/csv")
            .map_err(|e| ExportError::Request(e.to_string()))?;
        let form = multipart::Form::new()
            .part("file", csv_part)
            .text("destination", destination.to_owned());

        let url = format!("{}/exports", self.base_url);
        info!(self.logger, "submitting export of {} rows to {}", table.len(), url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ExportError::Request(format!("error sending export: {}", e)))?;

        if !response.status().is_success() {
            error!(self.logger, "export submission rejected: {:?}", response.status());
            return Err(ExportError::Request(format!(
                "export submission rejected with status {}",
                response.status()
            )));
        }
        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ExportError::Request(format!("error parsing submission reply: {}", e)))?;
        info!(self.logger, "export job created: {}", submitted.id);

        Ok(Box::new(RemoteExportJob {
            status_url: format!("{}/exports/{}", self.base_url, submitted.id),
            id: submitted.id,
            client: self.status_client.clone(),
            logger: self.logger.clone(),
        }))
    }
}

pub struct RemoteExportJob {
    id: String,
    status_url: String,
    client: ClientWithMiddleware,
    logger: Logger,
}

#[async_trait]
impl ExportJob for RemoteExportJob {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn status(&self) -> Result<JobState, ExportError> {
        debug!(self.logger, "requesting: {}", self.status_url);
        let response = self
            .client
            .get(&self.status_url)
            .timeout(Duration::from_secs(20))
            .send()
            .await
            .map_err(|e| ExportError::Request(format!("error sending request: {}", e)))?;
        if !response.status().is_success() {
            return Err(ExportError::Request(format!(
                "status check answered {}",
                response.status()
            )));
        }
        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| ExportError::Request(format!("error parsing body of request: {}", e)))?;
        body.state.parse()
    }
}
