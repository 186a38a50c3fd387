//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`downloads`] - Starting, querying and stopping the download
//! - [`system`] - Health, events, OpenAPI

use crate::types::{DownloadId, DownloadRequest};
use serde::{Deserialize, Serialize};

mod downloads;
mod system;

// Re-export all handlers so `routes::function_name` continues to work
pub use downloads::*;
pub use system::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Request body for POST /downloads
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartDownloadRequest {
    /// Document, page range, format, title and credential
    #[serde(flatten)]
    pub request: DownloadRequest,
    /// Owner handle; a later stop carrying a different owner is ignored
    #[serde(default)]
    pub owner: Option<String>,
}

/// Response for POST /downloads
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartDownloadResponse {
    /// Download ID assigned at admission
    pub id: DownloadId,
}

/// Query parameters for DELETE /downloads/current
#[derive(Debug, Default, Deserialize, Serialize, utoipa::IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Query)]
pub struct StopQuery {
    /// Only stop the download if it belongs to this owner
    pub owner: Option<String>,
}

/// Response for DELETE /downloads/current
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StopResponse {
    /// Whether a download was stopped
    pub stopped: bool,
}
