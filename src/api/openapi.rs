//! OpenAPI documentation and schema generation
//!
//! The folio-dl REST API described with utoipa at compile time.

use utoipa::OpenApi;

/// OpenAPI documentation for the folio-dl REST API
///
/// Served as JSON from `/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "folio-dl REST API",
        version = "0.1.0",
        description = "Start a single page-range download, follow its progress and fetch the assembled PDF or EPUB",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790", description = "Local development server")
    ),
    paths(
        // Downloads
        crate::api::routes::start_download,
        crate::api::routes::current_download,
        crate::api::routes::stop_download,
        crate::api::routes::download_file,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::DocumentId,
        crate::types::DownloadId,
        crate::types::OwnerId,
        crate::types::OutputFormat,
        crate::types::DownloadRequest,
        crate::types::TocNode,
        crate::types::SessionStatus,
        crate::types::SessionState,
        crate::types::ReleaseReason,
        crate::types::Event,

        // Config types from config.rs
        crate::config::Config,
        crate::config::FetchConfig,
        crate::config::RetryConfig,
        crate::config::SessionConfig,
        crate::config::AssemblyConfig,
        crate::config::EpubCompression,
        crate::config::OutputConfig,
        crate::config::FileCollisionAction,
        crate::config::ApiConfig,

        // API request/response types from routes
        crate::api::routes::StartDownloadRequest,
        crate::api::routes::StartDownloadResponse,
        crate::api::routes::StopQuery,
        crate::api::routes::StopResponse,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "downloads", description = "The download session - Start, query and stop the single download, fetch its document"),
        (name = "system", description = "System endpoints - Health check, OpenAPI spec, events"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds the `X-Api-Key` header scheme to the generated document
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
