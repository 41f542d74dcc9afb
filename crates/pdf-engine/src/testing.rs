//! Test doubles.
//!
//! [`FixturePdf`] produces structurally valid documents with a page tree,
//! `/MediaBox` sizes, `/Link` annotations and named destinations. Page
//! contents are empty.
//!
//! [`ScriptedEngine`] is an in-memory [`PdfEngine`] whose failures, links
//! and render latency are scripted per page, and which records how many
//! renders ran at once.

use crate::{
    DestinationRef, LinkAnnotation, PageSize, PdfEngine, PdfEngineError, RenderRequest, RgbaImage,
};
use image::Rgba;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum FixtureLink {
    Uri { rect: [i64; 4], uri: String },
    GoTo { rect: [i64; 4], page_index: usize },
    Named { rect: [i64; 4], name: String },
}

#[derive(Debug, Clone)]
struct FixturePage {
    width: i64,
    height: i64,
    links: Vec<FixtureLink>,
}

#[derive(Debug, Clone, Default)]
pub struct FixturePdf {
    pages: Vec<FixturePage>,
    named_destinations: Vec<(String, usize)>,
}

impl FixturePdf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a page of the given size in points.
    pub fn page(mut self, width: i64, height: i64) -> Self {
        self.pages.push(FixturePage { width, height, links: Vec::new() });
        self
    }

    /// Appends `count` US Letter pages.
    pub fn letter_pages(mut self, count: usize) -> Self {
        for _ in 0..count {
            self = self.page(612, 792);
        }
        self
    }

    /// Adds a URI link to the most recently added page.
    pub fn uri_link(self, rect: [i64; 4], uri: &str) -> Self {
        self.with_link(FixtureLink::Uri { rect, uri: uri.to_owned() })
    }

    /// Adds a GoTo link (explicit destination) to the most recently added page.
    pub fn goto_link(self, rect: [i64; 4], page_index: usize) -> Self {
        self.with_link(FixtureLink::GoTo { rect, page_index })
    }

    /// Adds a link to a named destination on the most recently added page.
    pub fn named_link(self, rect: [i64; 4], name: &str) -> Self {
        self.with_link(FixtureLink::Named { rect, name: name.to_owned() })
    }

    /// Registers a named destination in the catalog's `/Dests` dictionary.
    pub fn named_destination(mut self, name: &str, page_index: usize) -> Self {
        self.named_destinations.push((name.to_owned(), page_index));
        self
    }

    fn with_link(mut self, link: FixtureLink) -> Self {
        let page = self.pages.last_mut().expect("add a page before adding links");
        page.links.push(link);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id: ObjectId = doc.new_object_id();
        let page_ids: Vec<ObjectId> = self.pages.iter().map(|_| doc.new_object_id()).collect();

        for (page, page_id) in self.pages.iter().zip(&page_ids) {
            let mut annots: Vec<Object> = Vec::new();

            for link in &page.links {
                let annot = match link {
                    FixtureLink::Uri { rect, uri } => dictionary! {
                        "Type" => "Annot",
                        "Subtype" => "Link",
                        "Rect" => rect_object(rect),
                        "A" => dictionary! {
                            "S" => "URI",
                            "URI" => Object::String(uri.as_bytes().to_vec(), StringFormat::Literal),
                        },
                    },
                    FixtureLink::GoTo { rect, page_index } => dictionary! {
                        "Type" => "Annot",
                        "Subtype" => "Link",
                        "Rect" => rect_object(rect),
                        "A" => dictionary! {
                            "S" => "GoTo",
                            "D" => vec![Object::Reference(page_ids[*page_index]), "Fit".into()],
                        },
                    },
                    FixtureLink::Named { rect, name } => dictionary! {
                        "Type" => "Annot",
                        "Subtype" => "Link",
                        "Rect" => rect_object(rect),
                        "Dest" => Object::String(name.as_bytes().to_vec(), StringFormat::Literal),
                    },
                };
                annots.push(Object::Reference(doc.add_object(annot)));
            }

            let mut page_dict = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => rect_object(&[0, 0, page.width, page.height]),
            };
            if !annots.is_empty() {
                page_dict.set("Annots", annots);
            }

            doc.objects.insert(*page_id, Object::Dictionary(page_dict));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
                "Count" => self.pages.len() as i64,
            }),
        );

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        };

        if !self.named_destinations.is_empty() {
            let mut dests = Dictionary::new();
            for (name, page_index) in &self.named_destinations {
                dests.set(
                    name.as_str(),
                    vec![Object::Reference(page_ids[*page_index]), "Fit".into()],
                );
            }
            catalog.set("Dests", dests);
        }

        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("in-memory save should succeed");
        bytes
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_bytes())
    }
}

fn rect_object(rect: &[i64; 4]) -> Vec<Object> {
    rect.iter().map(|v| Object::Integer(*v)).collect()
}

/// Scripted in-memory engine.
///
/// Page indices are zero-based, as everywhere on the engine side.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    sizes: Vec<PageSize>,
    failing_renders: HashSet<u32>,
    panicking_renders: HashSet<u32>,
    failing_annotations: HashSet<u32>,
    links: HashMap<u32, Vec<LinkAnnotation>>,
    destinations: Vec<(DestinationRef, u32)>,
    render_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    rendered: Mutex<Vec<RenderRequest>>,
}

impl ScriptedEngine {
    /// `page_count` US Letter pages.
    pub fn new(page_count: u32) -> Self {
        Self::with_sizes(vec![PageSize::LETTER; page_count as usize])
    }

    pub fn with_sizes(sizes: Vec<PageSize>) -> Self {
        Self { sizes, ..Self::default() }
    }

    pub fn page_size_at(mut self, page_index: u32, size: PageSize) -> Self {
        self.sizes[page_index as usize] = size;
        self
    }

    /// Every render of `page_index` fails with a backend error.
    pub fn failing_render(mut self, page_index: u32) -> Self {
        self.failing_renders.insert(page_index);
        self
    }

    /// Every render of `page_index` panics.
    pub fn panicking_render(mut self, page_index: u32) -> Self {
        self.panicking_renders.insert(page_index);
        self
    }

    /// Annotation extraction for `page_index` fails.
    pub fn failing_annotations(mut self, page_index: u32) -> Self {
        self.failing_annotations.insert(page_index);
        self
    }

    pub fn link(mut self, link: LinkAnnotation) -> Self {
        self.links.entry(link.page_index).or_default().push(link);
        self
    }

    pub fn destination(mut self, destination: DestinationRef, page_index: u32) -> Self {
        self.destinations.push((destination, page_index));
        self
    }

    /// Each render sleeps this long, so concurrent renders overlap.
    pub fn render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    /// Highest number of renders observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every render request received, in arrival order.
    pub fn render_requests(&self) -> Vec<RenderRequest> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn render_count(&self) -> usize {
        self.rendered.lock().unwrap().len()
    }
}

impl PdfEngine for ScriptedEngine {
    fn page_count(&self) -> u32 {
        self.sizes.len() as u32
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError> {
        self.sizes
            .get(page_index as usize)
            .copied()
            .ok_or(PdfEngineError::PageOutOfRange { page: page_index, page_count: self.page_count() })
    }

    fn render_page(&self, request: RenderRequest) -> Result<RgbaImage, PdfEngineError> {
        let size = self.page_size(request.page_index)?;
        self.rendered.lock().unwrap().push(request);

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.render_delay.is_zero() {
            std::thread::sleep(self.render_delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking_renders.contains(&request.page_index) {
            panic!("scripted panic on page index {}", request.page_index);
        }
        if self.failing_renders.contains(&request.page_index) {
            return Err(PdfEngineError::Backend(format!(
                "scripted failure on page index {}",
                request.page_index
            )));
        }

        let width = (size.width_pt * request.scale).ceil().max(1.0) as u32;
        let height = (size.height_pt * request.scale).ceil().max(1.0) as u32;
        let shade = (request.page_index % 200) as u8;
        Ok(RgbaImage::from_pixel(width, height, Rgba([shade, shade, shade, 255])))
    }

    fn link_annotations(&self, page_index: u32) -> Result<Vec<LinkAnnotation>, PdfEngineError> {
        self.page_size(page_index)?;
        if self.failing_annotations.contains(&page_index) {
            return Err(PdfEngineError::MalformedAnnotations {
                page: page_index,
                reason: "scripted failure".to_owned(),
            });
        }
        Ok(self.links.get(&page_index).cloned().unwrap_or_default())
    }

    fn resolve_destination(&self, destination: &DestinationRef) -> Result<u32, PdfEngineError> {
        self.destinations
            .iter()
            .find(|(known, _)| known == destination)
            .map(|(_, page_index)| *page_index)
            .ok_or_else(|| PdfEngineError::UnresolvedDestination(destination.to_string()))
    }
}
