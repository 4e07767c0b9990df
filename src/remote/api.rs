//! Remote API trait and wire types

use crate::records::Partition;
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Response to a fetch request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    pub success: bool,

    #[serde(default)]
    pub data: Option<Vec<Vec<String>>>,

    #[serde(default)]
    pub error: Option<String>,
}

/// Response to a push request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub success: bool,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub validation_errors: Option<Vec<String>>,
}

/// Access to the remote system of record
///
/// One implementation per transport; the orchestrator only ever talks
/// through this trait.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetch the raw rows of one record partition
    async fn fetch_rows(&self, partition: Partition) -> Result<Vec<Vec<String>>>;

    /// Fetch the raw rows of the employee roster
    async fn fetch_employee_rows(&self) -> Result<Vec<Vec<String>>>;

    /// Overwrite one record partition with the given rows
    async fn push_rows(&self, partition: Partition, rows: Vec<Vec<String>>) -> Result<()>;

    /// Overwrite the employee roster with the given rows
    async fn push_employee_rows(&self, rows: Vec<Vec<String>>) -> Result<()>;
}
