//! HTTP client for the spreadsheet-backed remote API

use crate::config::{EndpointConfig, SyncConfig};
use crate::records::Partition;
use crate::remote::api::{FetchResponse, PushResponse, RemoteApi};
use crate::{PermisyncError, Result};
use async_trait::async_trait;
use serde::Serialize;

/// Push request body
///
/// `{ sheetId, data, validateRecords?, type? }` - the employees variant
/// adds `type: "employees"`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushBody {
    sheet_id: String,
    data: Vec<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    validate_records: Option<bool>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

/// Production implementation of [`RemoteApi`] over HTTP
#[derive(Debug)]
pub struct HttpRemoteClient {
    client: reqwest::Client,
    config: SyncConfig,
}

impl HttpRemoteClient {
    /// Create a client from config
    pub fn new(config: SyncConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, partition: Partition) -> &EndpointConfig {
        match partition {
            Partition::Administrative => &self.config.administrative,
            Partition::Legal => &self.config.legal,
        }
    }

    async fn fetch(&self, endpoint: &EndpointConfig, employees: bool) -> Result<Vec<Vec<String>>> {
        let mut query = vec![("sheetId", endpoint.sheet_id.as_str())];
        if employees {
            query.push(("type", "employees"));
        }

        let response = self
            .client
            .get(&endpoint.url)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PermisyncError::Network(format!(
                "fetch from {} failed with status {}",
                endpoint.url, status
            )));
        }

        let payload: FetchResponse = response.json().await?;
        if !payload.success {
            return Err(PermisyncError::Remote(
                payload.error.unwrap_or_else(|| "unknown remote error".to_string()),
            ));
        }

        Ok(payload.data.unwrap_or_default())
    }

    async fn push(
        &self,
        endpoint: &EndpointConfig,
        rows: Vec<Vec<String>>,
        employees: bool,
    ) -> Result<()> {
        let body = PushBody {
            sheet_id: endpoint.sheet_id.clone(),
            data: rows,
            validate_records: if self.config.validate_on_push {
                Some(true)
            } else {
                None
            },
            kind: if employees { Some("employees") } else { None },
        };

        let response = self
            .client
            .post(&endpoint.url)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PermisyncError::Network(format!(
                "push to {} failed with status {}",
                endpoint.url, status
            )));
        }

        let payload: PushResponse = response.json().await?;
        if !payload.success {
            let mut message = payload
                .error
                .unwrap_or_else(|| "unknown remote error".to_string());
            if let Some(validation_errors) = payload.validation_errors {
                if !validation_errors.is_empty() {
                    message = format!("{}: {}", message, validation_errors.join("; "));
                }
            }
            return Err(PermisyncError::Remote(message));
        }

        Ok(())
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteClient {
    async fn fetch_rows(&self, partition: Partition) -> Result<Vec<Vec<String>>> {
        tracing::debug!(partition = %partition, "Fetching partition rows");
        self.fetch(self.endpoint(partition), false).await
    }

    async fn fetch_employee_rows(&self) -> Result<Vec<Vec<String>>> {
        tracing::debug!("Fetching employee rows");
        self.fetch(&self.config.employees, true).await
    }

    async fn push_rows(&self, partition: Partition, rows: Vec<Vec<String>>) -> Result<()> {
        tracing::debug!(partition = %partition, rows = rows.len(), "Pushing partition rows");
        self.push(self.endpoint(partition), rows, false).await
    }

    async fn push_employee_rows(&self, rows: Vec<Vec<String>>) -> Result<()> {
        tracing::debug!(rows = rows.len(), "Pushing employee rows");
        self.push(&self.config.employees, rows, true).await
    }
}
