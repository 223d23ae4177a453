//! REST API types with schemars annotations for OpenAPI generation

use chrono::{DateTime, Utc};
use herald::journal::JournalEntry;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::indexing::IndexStats;
use crate::models::{RetrievalResult, StoredDocument};
use crate::sync::SyncStatus;

// Base Response Structure
// ======================

/// Base response object for all API endpoints
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct BaseResponse<T> {
  /// API versioning information
  pub versioning: VersionInfo,

  /// Transaction ID for logging correlation
  pub transaction_id: Uuid,

  #[serde(skip_serializing_if = "Vec::is_empty", default)]
  pub errors: Vec<ApiError>,

  /// Response data (generic for different endpoint types)
  #[serde(flatten)]
  pub data: T,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct VersionInfo {
  pub latest: String,
  pub requested: String,
  pub resolved: String,
}

impl VersionInfo {
  fn current() -> Self {
    let version = env!("CARGO_PKG_VERSION");
    Self { latest: version.to_string(), requested: version.to_string(), resolved: version.to_string() }
  }
}

/// API error information
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiError {
  /// Error key, unique to the error source
  pub key: String,

  /// Human readable error message
  pub message: String,

  #[serde(default)]
  pub stack: Vec<String>,

  #[serde(default)]
  pub context: serde_json::Value,
}

impl<T> BaseResponse<T> {
  pub fn success(data: T, transaction_id: Uuid) -> Self {
    Self { versioning: VersionInfo::current(), transaction_id, errors: Vec::new(), data }
  }

  pub fn error(errors: Vec<ApiError>, transaction_id: Uuid) -> BaseResponse<()> {
    BaseResponse { versioning: VersionInfo::current(), transaction_id, errors, data: () }
  }
}

impl ApiError {
  pub fn new(key: &str, message: &str) -> Self {
    Self {
      key: key.to_string(),
      message: message.to_string(),
      stack: Vec::new(),
      context: serde_json::Value::Null,
    }
  }
}

// Status/Version Endpoints
// =======================

/// Result of checking one dependency
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ComponentHealth {
  pub name: String,
  pub healthy: bool,
  pub message: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StatusResponse {
  /// "healthy", or "degraded" when any component check failed
  pub status: String,
  pub version: String,
  pub started_at: DateTime<Utc>,
  pub uptime_secs: i64,
  /// Names of the configured source, provider and index
  pub source: String,
  pub provider: String,
  pub index: String,
  pub sync_running: bool,
  pub components: Vec<ComponentHealth>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct VersionResponse {
  pub version: String,
}

// Sync Endpoints
// ==============

/// Response for POST /sync
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SyncStartedResponse {
  pub run_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SyncStatusResponse {
  pub sync: SyncStatus,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CancelResponse {
  /// False when no run was active
  pub cancelled: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ResetResponse {
  pub reset: bool,
}

// Retrieval and Index Endpoints
// =============================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RetrieveResponse {
  pub results: Vec<RetrievalResult>,
  pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct IndexStatsResponse {
  pub stats: IndexStats,
}

/// Response for GET /documents/{id}
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DocumentResponse {
  pub document: StoredDocument,
}

// Source Endpoint
// ===============

/// Response for GET /source/check
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SourceCheckResponse {
  pub source: String,
  pub connected: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  pub checked_at: DateTime<Utc>,
}

// Logs Endpoint
// =============

/// Query string for GET /logs
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct LogsQuery {
  #[serde(default)]
  pub limit: Option<usize>,
  /// debug, info, success, warn or error
  #[serde(default)]
  pub level: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LogsResponse {
  pub logs: Vec<JournalEntry>,
}
