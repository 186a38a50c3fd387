//! Core types for folio-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Identifier of a source document in the remote reader (the `doc` query parameter)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Create a new DocumentId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 1-based page number within a source document
pub type PageIndex = u32;

/// Unique identifier of one admitted download (one reservation of the session slot)
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct DownloadId(pub u64);

impl DownloadId {
    /// Get the inner value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle of the context that owns a download (a tab, a client connection, ...)
///
/// Stop requests carrying a different owner are ignored so a stale context cannot tear down
/// somebody else's download.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    /// Create a new OwnerId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output container format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Paginated fixed-layout document (PDF) built from encrypted vector pages
    ImageContainer,
    /// Zip-based flowable markup document (EPUB) built from page text
    TextContainer,
}

impl OutputFormat {
    /// File extension of the produced document
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::ImageContainer => "pdf",
            OutputFormat::TextContainer => "epub",
        }
    }

    /// MIME type of the produced document
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::ImageContainer => "application/pdf",
            OutputFormat::TextContainer => "application/epub+zip",
        }
    }

    /// Name of the response element that carries the page payload
    pub fn payload_element(&self) -> &'static str {
        match self {
            OutputFormat::ImageContainer => "bookpage",
            OutputFormat::TextContainer => "page_text",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::ImageContainer => f.write_str("image_container"),
            OutputFormat::TextContainer => f.write_str("text_container"),
        }
    }
}

/// A request to download pages `range_start..=range_end` of a document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DownloadRequest {
    /// Source document
    pub source_id: DocumentId,
    /// First page (1-based, inclusive)
    pub range_start: PageIndex,
    /// Last page (inclusive)
    pub range_end: PageIndex,
    /// Output container
    pub format: OutputFormat,
    /// Document title (used for metadata and the suggested filename)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Session credential whose numeric prefix (up to the first `:`) is the page decryption key.
    /// Required for [`OutputFormat::ImageContainer`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl DownloadRequest {
    /// Create a request without title or credential
    pub fn new(
        source_id: impl Into<DocumentId>,
        range_start: PageIndex,
        range_end: PageIndex,
        format: OutputFormat,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            range_start,
            range_end,
            format,
            title: None,
            credential: None,
        }
    }

    /// Set the document title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the session credential carrying the decryption key
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Number of pages in the requested range (0 for an inverted range)
    pub fn page_count(&self) -> u32 {
        if self.range_end < self.range_start {
            0
        } else {
            self.range_end - self.range_start + 1
        }
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Validated content of one fetched page, consumed exactly once by the assembly engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageContent {
    /// Page number in the source document
    pub index: PageIndex,
    /// Page text (text container) or still-encrypted vector markup (image container)
    pub payload: String,
    /// Remote images the markup references, downloaded ahead of assembly
    pub images: Vec<PageImage>,
}

impl PageContent {
    /// Page with no prefetched images
    pub fn new(index: PageIndex, payload: impl Into<String>) -> Self {
        Self {
            index,
            payload: payload.into(),
            images: Vec::new(),
        }
    }

    /// Bytes held by the page: payload plus prefetched images
    pub fn size_bytes(&self) -> usize {
        self.payload.len() + self.images.iter().map(|i| i.bytes.len()).sum::<usize>()
    }
}

/// An image downloaded for the `href` it is referenced by
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageImage {
    /// Reference exactly as written in the page markup
    pub href: String,
    /// Encoded image (PNG, JPEG, GIF or WebP)
    pub bytes: Vec<u8>,
}

/// One node of a document's table of contents
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TocNode {
    /// Heading title
    pub title: String,
    /// Absolute page number in the source document
    pub page_number: i64,
    /// Nested headings, in order
    #[serde(default)]
    pub subitems: Vec<TocNode>,
}

/// Catalog metadata for a document (text container only)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// First author, if the catalog lists one
    pub author: Option<String>,
    /// Table of contents, if the catalog has one
    pub toc: Option<Vec<TocNode>>,
}

/// Lifecycle status of the download session slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No download admitted
    Idle,
    /// Slot reserved, waiting for the caller to start real work
    Pending,
    /// Pages are being fetched and assembled
    Active,
}

/// Snapshot of the session slot returned by state queries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionState {
    /// Nothing in flight
    Idle,
    /// A reservation waiting for promotion
    Pending {
        /// Download ID of the reservation
        id: DownloadId,
        /// Requested range and format
        request: DownloadRequest,
    },
    /// A download in progress
    Active {
        /// Download ID
        id: DownloadId,
        /// Requested range and format
        request: DownloadRequest,
        /// Last reported progress percentage (0..=99 while active)
        last_progress: u8,
    },
}

impl SessionState {
    /// Coarse status of this snapshot
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Idle => SessionStatus::Idle,
            SessionState::Pending { .. } => SessionStatus::Pending,
            SessionState::Active { .. } => SessionStatus::Active,
        }
    }

    /// Whether no download is admitted
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }
}

/// Why a session slot was released
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    /// The document was produced
    Completed,
    /// The download failed terminally
    Failed,
    /// The owner stopped the download or went away
    Stopped,
    /// The reservation was never started within the pending timeout
    Expired,
    /// The downloader is shutting down
    Shutdown,
}

/// Event emitted during the download lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A download was admitted into the session slot
    Reserved {
        /// Download ID
        id: DownloadId,
        /// Source document
        source_id: DocumentId,
        /// First requested page
        range_start: PageIndex,
        /// Last requested page
        range_end: PageIndex,
        /// Output container
        format: OutputFormat,
    },

    /// Fetching started
    Started {
        /// Download ID
        id: DownloadId,
    },

    /// A page attempt failed and will be retried
    PageRetry {
        /// Download ID
        id: DownloadId,
        /// Page being fetched
        page: PageIndex,
        /// Failed attempt number (1-based)
        attempt: u32,
        /// Maximum attempts per page
        max_attempts: u32,
        /// Error message of the failed attempt
        error: String,
    },

    /// A page was appended to the document
    Progress {
        /// Download ID
        id: DownloadId,
        /// Progress percentage (never 100 before completion)
        percent: u8,
        /// Pages assembled so far
        pages_done: u32,
        /// Pages in the requested range
        pages_total: u32,
    },

    /// The document is finished (implies 100%)
    Complete {
        /// Download ID
        id: DownloadId,
        /// Suggested filename
        filename: String,
        /// Size of the produced document
        size_bytes: u64,
        /// Where the document was written, when an output directory is configured
        #[serde(skip_serializing_if = "Option::is_none")]
        #[schema(value_type = Option<String>)]
        path: Option<PathBuf>,
    },

    /// The download failed; no further events follow for this ID
    Failed {
        /// Download ID
        id: DownloadId,
        /// Human-readable error message
        error: String,
    },

    /// The session slot was released
    Released {
        /// Download ID
        id: DownloadId,
        /// Why it was released
        reason: ReleaseReason,
    },

    /// Downloader is shutting down
    Shutdown,
}

impl Event {
    /// Short event name used for SSE event types
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Reserved { .. } => "reserved",
            Event::Started { .. } => "started",
            Event::PageRetry { .. } => "page_retry",
            Event::Progress { .. } => "progress",
            Event::Complete { .. } => "complete",
            Event::Failed { .. } => "failed",
            Event::Released { .. } => "released",
            Event::Shutdown => "shutdown",
        }
    }
}

/// A finished document
#[derive(Clone, Debug)]
pub struct DownloadOutput {
    /// Download ID
    pub id: DownloadId,
    /// Document bytes
    pub bytes: Vec<u8>,
    /// Suggested filename (`{title}.pdf` / `{title}.epub`)
    pub filename: String,
    /// Container format
    pub format: OutputFormat,
    /// Where the document was written, when an output directory is configured
    pub path: Option<PathBuf>,
}
