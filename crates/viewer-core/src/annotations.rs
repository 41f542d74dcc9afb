//! Link annotations of the whole document, extracted once at load.

use crate::error::ViewerError;
use pageview_engine::{LinkAnnotation, PdfEngine};

/// Per-page link annotations in document space.
///
/// A page whose annotations could not be read degrades to an empty list and
/// is remembered in [`failed_pages`](Self::failed_pages).
#[derive(Debug, Clone, Default)]
pub struct AnnotationIndex {
    /// Index `page - 1`
    pages: Vec<Vec<LinkAnnotation>>,
    failed: Vec<u32>,
}

impl AnnotationIndex {
    /// An index with no links on any of `page_count` pages.
    pub fn empty(page_count: u32) -> Self {
        Self {
            pages: vec![Vec::new(); page_count as usize],
            failed: Vec::new(),
        }
    }

    pub fn extract(engine: &dyn PdfEngine) -> Self {
        let page_count = engine.page_count();
        let mut index = Self::empty(page_count);

        for page_index in 0..page_count {
            let page = page_index + 1;
            match engine.link_annotations(page_index) {
                Ok(links) => index.pages[page_index as usize] = links,
                Err(source) => {
                    let err = ViewerError::Annotation { page, source };
                    tracing::warn!(page, error = %err, "page annotations degraded to empty");
                    index.failed.push(page);
                }
            }
        }

        tracing::debug!(
            pages = page_count,
            links = index.total_links(),
            failed = index.failed.len(),
            "annotations extracted"
        );
        index
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Links on one-based `page`; empty for pages out of range.
    pub fn links(&self, page: u32) -> &[LinkAnnotation] {
        page.checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .map_or(&[], Vec::as_slice)
    }

    pub fn total_links(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    /// One-based pages whose annotations failed to load, ascending.
    pub fn failed_pages(&self) -> &[u32] {
        &self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageview_engine::testing::ScriptedEngine;
    use pageview_engine::{LinkTarget, PdfRect};

    fn url_link(page_index: u32, url: &str) -> LinkAnnotation {
        LinkAnnotation {
            page_index,
            rect: PdfRect::new(10.0, 10.0, 50.0, 30.0),
            target: LinkTarget::External { url: url.to_owned() },
        }
    }

    #[test]
    fn links_are_grouped_by_page() {
        let engine = ScriptedEngine::new(3)
            .link(url_link(0, "https://a.example"))
            .link(url_link(2, "https://b.example"))
            .link(url_link(2, "https://c.example"));

        let index = AnnotationIndex::extract(&engine);

        assert_eq!(index.page_count(), 3);
        assert_eq!(index.links(1).len(), 1);
        assert!(index.links(2).is_empty());
        assert_eq!(index.links(3).len(), 2);
        assert_eq!(index.total_links(), 3);
        assert!(index.failed_pages().is_empty());
    }

    #[test]
    fn failing_page_degrades_to_empty() {
        let engine = ScriptedEngine::new(3)
            .link(url_link(0, "https://a.example"))
            .link(url_link(1, "https://b.example"))
            .failing_annotations(1);

        let index = AnnotationIndex::extract(&engine);

        assert!(index.links(2).is_empty());
        assert_eq!(index.links(1).len(), 1);
        assert_eq!(index.failed_pages(), &[2]);
    }

    #[test]
    fn out_of_range_pages_have_no_links() {
        let index = AnnotationIndex::empty(2);
        assert!(index.links(0).is_empty());
        assert!(index.links(3).is_empty());
    }
}
