use crate::mapper::CoordinateMapper;
use pageview_engine::{LinkAnnotation, LinkTarget};
use pageview_render::ScreenRect;

/// A clickable region of the displayed page.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRegion {
    pub rect: ScreenRect,
    pub target: LinkTarget,
}

/// Clickable regions of the current page.
///
/// Never patched: every change of page, zoom, rotation, display box or
/// annotations replaces the whole set.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    page: u32,
    regions: Vec<OverlayRegion>,
}

impl Overlay {
    /// One-based page the regions belong to, 0 when empty.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn regions(&self) -> &[OverlayRegion] {
        &self.regions
    }

    pub fn rebuild(&mut self, page: u32, links: &[LinkAnnotation], mapper: Option<&CoordinateMapper>) {
        self.page = page;
        self.regions = match mapper {
            Some(mapper) => build_overlay(links, mapper),
            None => Vec::new(),
        };
        tracing::trace!(page, regions = self.regions.len(), "overlay rebuilt");
    }

    pub fn clear(&mut self) {
        self.page = 0;
        self.regions.clear();
    }

    /// Topmost region containing the point. Later regions are drawn over
    /// earlier ones.
    pub fn link_at(&self, x: f32, y: f32) -> Option<&OverlayRegion> {
        self.regions.iter().rev().find(|region| region.rect.contains(x, y))
    }
}

pub fn build_overlay(links: &[LinkAnnotation], mapper: &CoordinateMapper) -> Vec<OverlayRegion> {
    links
        .iter()
        .map(|link| OverlayRegion {
            rect: mapper.to_screen(&link.rect),
            target: link.target.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::DisplayBox;
    use crate::viewport::Rotation;
    use pageview_engine::{DestinationRef, PageSize, PdfRect};

    fn link(rect: PdfRect, target: LinkTarget) -> LinkAnnotation {
        LinkAnnotation {
            page_index: 0,
            rect,
            target,
        }
    }

    fn mapper() -> CoordinateMapper {
        // One point per pixel.
        CoordinateMapper::new(PageSize::LETTER, DisplayBox::new(612.0, 792.0), Rotation::Deg0).unwrap()
    }

    #[test]
    fn rebuild_replaces_previous_regions() {
        let mut overlay = Overlay::default();
        let url = LinkTarget::External {
            url: "https://example.com".to_owned(),
        };
        let links = vec![
            link(PdfRect::new(0.0, 0.0, 10.0, 10.0), url.clone()),
            link(PdfRect::new(20.0, 20.0, 30.0, 30.0), url),
        ];

        overlay.rebuild(1, &links, Some(&mapper()));
        assert_eq!(overlay.regions().len(), 2);

        overlay.rebuild(2, &links[..1], Some(&mapper()));
        assert_eq!(overlay.page(), 2);
        assert_eq!(overlay.regions().len(), 1);

        overlay.rebuild(3, &links, None);
        assert!(overlay.regions().is_empty());
    }

    #[test]
    fn link_at_prefers_the_topmost_region() {
        let mut overlay = Overlay::default();
        let below = LinkTarget::External {
            url: "https://below.example".to_owned(),
        };
        let above = LinkTarget::Internal {
            destination: DestinationRef::PageIndex { index: 1 },
        };
        let links = vec![
            link(PdfRect::new(0.0, 692.0, 200.0, 792.0), below.clone()),
            link(PdfRect::new(50.0, 742.0, 100.0, 792.0), above.clone()),
        ];
        overlay.rebuild(1, &links, Some(&mapper()));

        assert_eq!(overlay.link_at(60.0, 10.0).map(|r| &r.target), Some(&above));
        assert_eq!(overlay.link_at(150.0, 80.0).map(|r| &r.target), Some(&below));
        assert!(overlay.link_at(400.0, 400.0).is_none());
    }

    #[test]
    fn clear_empties_the_overlay() {
        let mut overlay = Overlay::default();
        let links = vec![link(
            PdfRect::new(0.0, 0.0, 10.0, 10.0),
            LinkTarget::External { url: "x".to_owned() },
        )];
        overlay.rebuild(1, &links, Some(&mapper()));

        overlay.clear();

        assert_eq!(overlay.page(), 0);
        assert!(overlay.link_at(5.0, 787.0).is_none());
    }
}
