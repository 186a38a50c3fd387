//! Document assembly engine
//!
//! Pages are appended to the output document by a single worker running on tokio's blocking
//! pool, fed through a bounded, ordered command channel. The worker processes one command at a
//! time in submission order, so the assembly state needs no locking. It owns exactly one
//! [`Assembler`] per document: created on [`AssemblyCommand::Init`], consumed on
//! [`AssemblyCommand::Finalize`] and dropped on any error or when the command channel closes.
//!
//! Results flow back on an unbounded event channel:
//! - [`AssemblyEvent::PageAdded`] after every appended page
//! - [`AssemblyEvent::Done`] with the finished bytes, or
//! - [`AssemblyEvent::Failed`] with the error; the worker exits after either terminal event

mod epub;
pub mod markup;
mod pdf;
pub mod svg;

pub use epub::EpubAssembler;
pub use pdf::PdfAssembler;

use crate::cipher::CipherKey;
use crate::config::AssemblyConfig;
use crate::error::AssemblyError;
use crate::types::{DocumentId, OutputFormat, PageContent, PageIndex, TocNode};
use tokio::sync::mpsc;

/// Everything an assembler needs to know before the first page arrives
#[derive(Clone, Debug)]
pub struct AssemblyInit {
    /// Source document (EPUB identifier)
    pub document_id: DocumentId,
    /// Document title
    pub title: String,
    /// Author, when known
    pub author: Option<String>,
    /// Table of contents (text container only)
    pub toc: Option<Vec<TocNode>>,
    /// First page of the downloaded range, used to map TOC entries onto page documents
    pub range_start: PageIndex,
    /// Page decryption key (image container only)
    pub key: Option<CipherKey>,
}

/// A task for the assembly worker
#[derive(Debug)]
pub enum AssemblyCommand {
    /// Create the assembly state for a new document
    Init(Box<AssemblyInit>),
    /// Append the next page
    AddPage(PageContent),
    /// Serialize the document and emit it
    Finalize,
}

/// Output of the assembly worker
#[derive(Debug)]
pub enum AssemblyEvent {
    /// A page was appended
    PageAdded {
        /// Page number in the source document
        index: PageIndex,
        /// Pages appended so far
        pages_done: u32,
    },
    /// The finished document
    Done(Vec<u8>),
    /// Assembly failed; all assembly state has been released
    Failed(AssemblyError),
}

/// A document being built, one page at a time
pub trait Assembler: Send {
    /// Append one page
    fn add_page(&mut self, page: PageContent) -> Result<(), AssemblyError>;

    /// Close the document and return its bytes
    fn finalize(self: Box<Self>) -> Result<Vec<u8>, AssemblyError>;
}

/// Create the assembler for `format`
pub fn new_assembler(
    format: OutputFormat,
    init: AssemblyInit,
    config: &AssemblyConfig,
) -> Result<Box<dyn Assembler>, AssemblyError> {
    match format {
        OutputFormat::TextContainer => Ok(Box::new(EpubAssembler::new(init, config)?)),
        OutputFormat::ImageContainer => Ok(Box::new(PdfAssembler::new(init, config)?)),
    }
}

/// Sending side of the assembly command channel
#[derive(Clone, Debug)]
pub struct AssemblyQueue {
    commands: mpsc::Sender<AssemblyCommand>,
}

impl AssemblyQueue {
    /// Enqueue `init`
    pub async fn init(&self, init: AssemblyInit) -> Result<(), AssemblyError> {
        self.send(AssemblyCommand::Init(Box::new(init))).await
    }

    /// Enqueue a page; waits while the queue is full
    pub async fn add_page(&self, page: PageContent) -> Result<(), AssemblyError> {
        self.send(AssemblyCommand::AddPage(page)).await
    }

    /// Enqueue finalize
    pub async fn finalize(&self) -> Result<(), AssemblyError> {
        self.send(AssemblyCommand::Finalize).await
    }

    async fn send(&self, command: AssemblyCommand) -> Result<(), AssemblyError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AssemblyError::Aborted("assembly worker has stopped".to_string()))
    }
}

/// Start an assembly worker for one document
///
/// Dropping every [`AssemblyQueue`] clone makes the worker discard its state and exit.
pub fn spawn_engine(
    format: OutputFormat,
    config: AssemblyConfig,
) -> (AssemblyQueue, mpsc::UnboundedReceiver<AssemblyEvent>) {
    let (command_tx, command_rx) = mpsc::channel(config.queue_capacity.max(1));
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    tokio::task::spawn_blocking(move || run_worker(format, config, command_rx, event_tx));

    (
        AssemblyQueue {
            commands: command_tx,
        },
        event_rx,
    )
}

fn run_worker(
    format: OutputFormat,
    config: AssemblyConfig,
    mut commands: mpsc::Receiver<AssemblyCommand>,
    events: mpsc::UnboundedSender<AssemblyEvent>,
) {
    let mut worker = Worker {
        format,
        config,
        state: None,
        pages_done: 0,
        payload_bytes: 0,
    };

    while let Some(command) = commands.blocking_recv() {
        match worker.handle(command) {
            Ok(Step::Continue(event)) => {
                if let Some(event) = event {
                    let _ = events.send(event);
                }
            }
            Ok(Step::Finished(bytes)) => {
                commands.close();
                tracing::debug!(size = bytes.len(), "document assembled");
                let _ = events.send(AssemblyEvent::Done(bytes));
                return;
            }
            Err(e) => {
                commands.close();
                tracing::error!(error = %e, "document assembly failed");
                worker.state = None;
                let _ = events.send(AssemblyEvent::Failed(e));
                return;
            }
        }
    }

    if worker.state.is_some() {
        tracing::debug!(
            pages = worker.pages_done,
            "assembly queue closed before finalize, discarding document"
        );
    }
}

enum Step {
    Continue(Option<AssemblyEvent>),
    Finished(Vec<u8>),
}

struct Worker {
    format: OutputFormat,
    config: AssemblyConfig,
    state: Option<Box<dyn Assembler>>,
    pages_done: u32,
    payload_bytes: u64,
}

impl Worker {
    fn handle(&mut self, command: AssemblyCommand) -> Result<Step, AssemblyError> {
        match command {
            AssemblyCommand::Init(init) => {
                if self.state.is_some() {
                    return Err(AssemblyError::AlreadyInitialized);
                }
                self.state = Some(new_assembler(self.format, *init, &self.config)?);
                Ok(Step::Continue(None))
            }
            AssemblyCommand::AddPage(page) => {
                let index = page.index;
                self.charge(page.size_bytes())?;
                let assembler = self.state.as_mut().ok_or(AssemblyError::NotInitialized)?;
                assembler.add_page(page)?;
                self.pages_done += 1;
                tracing::debug!(page = index, pages_done = self.pages_done, "page added");
                Ok(Step::Continue(Some(AssemblyEvent::PageAdded {
                    index,
                    pages_done: self.pages_done,
                })))
            }
            AssemblyCommand::Finalize => {
                let assembler = self.state.take().ok_or(AssemblyError::NotInitialized)?;
                Ok(Step::Finished(assembler.finalize()?))
            }
        }
    }

    fn charge(&mut self, bytes: usize) -> Result<(), AssemblyError> {
        let attempted = self.payload_bytes.saturating_add(bytes as u64);
        if let Some(limit) = self.config.max_document_bytes {
            if attempted > limit {
                return Err(AssemblyError::BudgetExceeded { limit, attempted });
            }
        }
        self.payload_bytes = attempted;
        Ok(())
    }
}
