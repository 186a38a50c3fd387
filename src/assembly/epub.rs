//! Flowable-text container (EPUB 3)

use super::markup::{self, PackageInfo};
use super::{Assembler, AssemblyInit};
use crate::config::{AssemblyConfig, EpubCompression};
use crate::error::AssemblyError;
use crate::types::{PageContent, PageIndex, TocNode};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const MIMETYPE: &[u8] = b"application/epub+zip";

/// Builds an EPUB in memory, writing each page document as it arrives
///
/// The `mimetype` entry is written first and uncompressed when the assembler is created;
/// navigation, package and container documents are written on finalize.
pub struct EpubAssembler {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: FileOptions,
    identifier: String,
    title: String,
    author: String,
    language: String,
    toc: Option<Vec<TocNode>>,
    range_start: PageIndex,
    pages: usize,
}

impl EpubAssembler {
    /// Start a new EPUB
    pub fn new(init: AssemblyInit, config: &AssemblyConfig) -> Result<Self, AssemblyError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(
            "mimetype",
            FileOptions::default().compression_method(CompressionMethod::Stored),
        )?;
        zip.write_all(MIMETYPE)?;

        let method = match config.epub_compression {
            EpubCompression::Stored => CompressionMethod::Stored,
            EpubCompression::Deflated => CompressionMethod::Deflated,
        };

        Ok(Self {
            zip,
            options: FileOptions::default().compression_method(method),
            identifier: init.document_id.to_string(),
            title: init.title,
            author: init
                .author
                .unwrap_or_else(|| config.unknown_author.clone()),
            language: config.epub_language.clone(),
            toc: init.toc,
            range_start: init.range_start,
            pages: 0,
        })
    }

    fn write_entry(&mut self, name: &str, contents: &str) -> Result<(), AssemblyError> {
        self.zip.start_file(name, self.options)?;
        self.zip.write_all(contents.as_bytes())?;
        Ok(())
    }
}

impl Assembler for EpubAssembler {
    fn add_page(&mut self, page: PageContent) -> Result<(), AssemblyError> {
        let doc = markup::page_xhtml(&self.title, self.pages, &page.payload);
        let name = format!("EPUB/{}", markup::page_filename(self.pages));
        self.write_entry(&name, &doc)?;
        self.pages += 1;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<Vec<u8>, AssemblyError> {
        let nav = self
            .toc
            .as_deref()
            .and_then(|toc| markup::nav_xhtml(toc, self.range_start, self.pages));
        if let Some(nav) = &nav {
            self.write_entry("EPUB/nav.xhtml", nav)?;
        }

        let modified = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let opf = markup::content_opf(&PackageInfo {
            title: &self.title,
            author: &self.author,
            identifier: &self.identifier,
            language: &self.language,
            modified: &modified,
            page_count: self.pages,
            has_nav: nav.is_some(),
        });
        self.write_entry("EPUB/content.opf", &opf)?;
        self.write_entry("META-INF/container.xml", markup::CONTAINER_XML)?;

        let cursor = self.zip.finish()?;
        Ok(cursor.into_inner())
    }
}
