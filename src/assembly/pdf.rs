//! Paginated-image container (PDF)

use super::svg::{self, PageSize};
use super::{Assembler, AssemblyInit};
use crate::cipher::{self, CipherKey};
use crate::config::AssemblyConfig;
use crate::error::AssemblyError;
use crate::types::{PageContent, PageImage};
use pdf_writer::{Content, Finish, Name, Pdf, Rect, Ref, TextStr};
use std::collections::HashMap;
use std::sync::Arc;
use svg2pdf::usvg;

const PAGE_XOBJECT: Name<'static> = Name(b"P1");

/// Builds a PDF incrementally: every page is decrypted, converted and written out on arrival
///
/// Each page becomes its own physical page sized from the page's markup, with the converted
/// vector content stretched over the whole page. Remote `<image>` references resolve to the
/// images downloaded with the page; unresolved ones are dropped by the renderer.
pub struct PdfAssembler {
    pdf: Pdf,
    alloc: Ref,
    catalog_id: Ref,
    page_tree_id: Ref,
    page_ids: Vec<Ref>,
    key: CipherKey,
    default_size: PageSize,
    options: usvg::Options<'static>,
    title: String,
    author: Option<String>,
}

impl PdfAssembler {
    /// Start a new PDF; fails without a decryption key
    pub fn new(init: AssemblyInit, config: &AssemblyConfig) -> Result<Self, AssemblyError> {
        let key = init.key.ok_or(AssemblyError::MissingKey)?;

        let mut options = usvg::Options::default();
        if config.load_system_fonts {
            options.fontdb_mut().load_system_fonts();
        }

        let mut alloc = Ref::new(1);
        let catalog_id = alloc.bump();
        let page_tree_id = alloc.bump();

        Ok(Self {
            pdf: Pdf::new(),
            alloc,
            catalog_id,
            page_tree_id,
            page_ids: Vec::new(),
            key,
            default_size: PageSize::new(config.default_page_width, config.default_page_height),
            options,
            title: init.title,
            author: init.author,
        })
    }
}

/// Resolver serving `images` by href, falling back to usvg's own resolution
fn prefetched_images(images: Vec<PageImage>) -> usvg::ImageHrefResolver<'static> {
    let images: HashMap<String, (ImageKindFn, Arc<Vec<u8>>)> = images
        .into_iter()
        .filter_map(|image| match image_kind(&image.bytes) {
            Some(kind) => Some((image.href, (kind, Arc::new(image.bytes)))),
            None => {
                tracing::warn!(href = %image.href, "unsupported image format, leaving it out");
                None
            }
        })
        .collect();
    let fallback = usvg::ImageHrefResolver::default_string_resolver();

    usvg::ImageHrefResolver {
        resolve_data: usvg::ImageHrefResolver::default_data_resolver(),
        resolve_string: Box::new(move |href: &str, options: &usvg::Options<'_>| {
            match images.get(href) {
                Some((kind, data)) => Some(kind(Arc::clone(data))),
                None => fallback(href, options),
            }
        }),
    }
}

type ImageKindFn = fn(Arc<Vec<u8>>) -> usvg::ImageKind;

/// Raster kind of `bytes`, told apart by signature
fn image_kind(bytes: &[u8]) -> Option<ImageKindFn> {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => Some(usvg::ImageKind::PNG),
        [0xFF, 0xD8, 0xFF, ..] => Some(usvg::ImageKind::JPEG),
        [b'G', b'I', b'F', b'8', ..] => Some(usvg::ImageKind::GIF),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => {
            Some(usvg::ImageKind::WEBP)
        }
        _ => None,
    }
}

impl Assembler for PdfAssembler {
    fn add_page(&mut self, page: PageContent) -> Result<(), AssemblyError> {
        let markup = cipher::decrypt_with(&page.payload, &self.key);
        let size = svg::page_size(&markup, self.default_size);

        let parsed = if page.images.is_empty() {
            usvg::Tree::from_str(&markup, &self.options)
        } else {
            let options = usvg::Options {
                image_href_resolver: prefetched_images(page.images),
                fontdb: self.options.fontdb.clone(),
                ..usvg::Options::default()
            };
            usvg::Tree::from_str(&markup, &options)
        };
        let tree = parsed.map_err(|e| AssemblyError::Render {
            page: page.index,
            reason: format!("undecodable page markup: {e}"),
        })?;
        let (chunk, root) = svg2pdf::to_chunk(&tree, svg2pdf::ConversionOptions::default())
            .map_err(|e| AssemblyError::Render {
                page: page.index,
                reason: e.to_string(),
            })?;

        let mut renumbered = HashMap::new();
        let alloc = &mut self.alloc;
        let chunk = chunk.renumber(|old| *renumbered.entry(old).or_insert_with(|| alloc.bump()));
        let xobject_id = *renumbered.get(&root).ok_or_else(|| AssemblyError::Render {
            page: page.index,
            reason: "converted page has no root object".to_string(),
        })?;

        let page_id = self.alloc.bump();
        let content_id = self.alloc.bump();

        let mut pdf_page = self.pdf.page(page_id);
        pdf_page
            .media_box(Rect::new(0.0, 0.0, size.width, size.height))
            .parent(self.page_tree_id)
            .contents(content_id);
        pdf_page
            .resources()
            .x_objects()
            .pair(PAGE_XOBJECT, xobject_id);
        pdf_page.finish();

        // The converted XObject spans the unit square
        let mut content = Content::new();
        content
            .save_state()
            .transform([size.width, 0.0, 0.0, size.height, 0.0, 0.0])
            .x_object(PAGE_XOBJECT)
            .restore_state();
        self.pdf.stream(content_id, &content.finish());
        self.pdf.extend(&chunk);

        self.page_ids.push(page_id);
        tracing::debug!(
            page = page.index,
            width = size.width,
            height = size.height,
            "page rendered"
        );
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Vec<u8>, AssemblyError> {
        let mut this = *self;
        this.pdf.catalog(this.catalog_id).pages(this.page_tree_id);
        this.pdf
            .pages(this.page_tree_id)
            .kids(this.page_ids.iter().copied())
            .count(this.page_ids.len() as i32);

        let info_id = this.alloc.bump();
        let mut info = this.pdf.document_info(info_id);
        info.title(TextStr(&this.title));
        if let Some(author) = &this.author {
            info.author(TextStr(author));
        }
        info.producer(TextStr(concat!("folio-dl ", env!("CARGO_PKG_VERSION"))));
        info.finish();

        Ok(this.pdf.finish())
    }
}
