//! Download handlers.

use super::{StartDownloadRequest, StartDownloadResponse, StopQuery, StopResponse};
use crate::api::AppState;
use crate::error::ApiError;
use crate::types::{DownloadId, OwnerId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// POST /downloads - Reserve the session slot and run the download in the background
#[utoipa::path(
    post,
    path = "/downloads",
    tag = "downloads",
    request_body = StartDownloadRequest,
    responses(
        (status = 202, description = "Download admitted and started", body = StartDownloadResponse),
        (status = 400, description = "Invalid page range or missing decryption key", body = ApiError),
        (status = 409, description = "Another download is in progress", body = ApiError),
        (status = 503, description = "Shutting down", body = ApiError)
    )
)]
pub async fn start_download(
    State(state): State<AppState>,
    Json(body): Json<StartDownloadRequest>,
) -> Response {
    let owner = body.owner.map(OwnerId::new);

    let reservation = match state.downloader.reserve(body.request, owner).await {
        Ok(reservation) => reservation,
        Err(e) => return e.into_response(),
    };
    let id = reservation.id;

    // The downloader keeps the finished document for GET /downloads/:id/file
    tokio::spawn(async move {
        if let Err(e) = state.downloader.run(reservation).await {
            tracing::warn!(download_id = id.0, error = %e, "background download failed");
        }
    });

    (StatusCode::ACCEPTED, Json(StartDownloadResponse { id })).into_response()
}

/// GET /downloads/current - Current session state
#[utoipa::path(
    get,
    path = "/downloads/current",
    tag = "downloads",
    responses(
        (status = 200, description = "Idle, pending or active download", body = crate::types::SessionState)
    )
)]
pub async fn current_download(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.downloader.state().await)
}

/// DELETE /downloads/current - Stop the current download
#[utoipa::path(
    delete,
    path = "/downloads/current",
    tag = "downloads",
    params(StopQuery),
    responses(
        (status = 200, description = "Whether a download was stopped", body = StopResponse)
    )
)]
pub async fn stop_download(
    State(state): State<AppState>,
    Query(query): Query<StopQuery>,
) -> impl IntoResponse {
    let stopped = state.downloader.stop(query.owner.map(OwnerId::new)).await;
    Json(StopResponse { stopped })
}

/// GET /downloads/:id/file - The finished document
#[utoipa::path(
    get,
    path = "/downloads/{id}/file",
    tag = "downloads",
    params(
        ("id" = u64, Path, description = "Download ID")
    ),
    responses(
        (status = 200, description = "Document bytes (application/pdf or application/epub+zip)"),
        (status = 404, description = "No finished document for this download", body = ApiError)
    )
)]
pub async fn download_file(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let Some(output) = state.downloader.finished_output(DownloadId(id)).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiError::not_found(format!("document for download {id}"))),
        )
            .into_response();
    };

    let disposition = format!(
        "attachment; filename=\"{}\"",
        output.filename.replace('"', "'")
    );
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, output.format.mime_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        output.bytes,
    )
        .into_response()
}
