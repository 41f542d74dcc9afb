//! Link annotation extraction and destination resolution.

use crate::PdfEngineError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;

/// Rectangle in document space (origin bottom-left), normalized so that
/// `x1 <= x2` and `y1 <= y2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PdfRect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl PdfRect {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1: x1.min(x2), y1: y1.min(y2), x2: x1.max(x2), y2: y1.max(y2) }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// Opaque handle the engine can resolve to a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DestinationRef {
    /// Explicit destination pointing at a page object.
    PageObject { id: u32, generation: u16 },
    /// Explicit destination carrying a zero-based page index.
    PageIndex { index: u32 },
    /// Named destination looked up in `/Dests` or the `/Names` tree.
    Named { name: String },
}

impl std::fmt::Display for DestinationRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PageObject { id, generation } => write!(f, "{id} {generation} R"),
            Self::PageIndex { index } => write!(f, "page index {index}"),
            Self::Named { name } => write!(f, "named '{name}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkTarget {
    External { url: String },
    Internal { destination: DestinationRef },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkAnnotation {
    /// Zero-based index of the page carrying the annotation.
    pub page_index: u32,
    pub rect: PdfRect,
    pub target: LinkTarget,
}

pub(crate) fn deref<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

fn number(document: &Document, object: &Object) -> Option<f32> {
    match deref(document, object)? {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

pub(crate) fn rect_from_array(document: &Document, array: &[Object]) -> Option<PdfRect> {
    if array.len() != 4 {
        return None;
    }

    let x1 = number(document, &array[0])?;
    let y1 = number(document, &array[1])?;
    let x2 = number(document, &array[2])?;
    let y2 = number(document, &array[3])?;

    Some(PdfRect::new(x1, y1, x2, y2))
}

fn decode_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn text_value(document: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    match deref(document, dict.get(key).ok()?)? {
        Object::String(bytes, _) => Some(decode_text(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

fn destination_ref(document: &Document, object: &Object) -> Option<DestinationRef> {
    match deref(document, object)? {
        Object::Array(array) => match array.first()? {
            Object::Reference((id, generation)) => {
                Some(DestinationRef::PageObject { id: *id, generation: *generation })
            }
            Object::Integer(index) if *index >= 0 => {
                Some(DestinationRef::PageIndex { index: *index as u32 })
            }
            _ => None,
        },
        Object::String(bytes, _) => Some(DestinationRef::Named { name: decode_text(bytes) }),
        Object::Name(name) => {
            Some(DestinationRef::Named { name: String::from_utf8_lossy(name).into_owned() })
        }
        Object::Dictionary(dict) => destination_ref(document, dict.get(b"D").ok()?),
        _ => None,
    }
}

/// Decides the link target once: `/A` actions first, then `/Dest`.
fn link_target(document: &Document, annot: &Dictionary) -> Option<LinkTarget> {
    if let Some(action) = annot
        .get(b"A")
        .ok()
        .and_then(|obj| deref(document, obj))
        .and_then(|obj| obj.as_dict().ok())
    {
        return match action.get(b"S") {
            Ok(Object::Name(kind)) if kind.as_slice() == b"URI" => {
                let url = text_value(document, action, b"URI")?;
                (!url.is_empty()).then_some(LinkTarget::External { url })
            }
            Ok(Object::Name(kind)) if kind.as_slice() == b"GoTo" => {
                let destination = destination_ref(document, action.get(b"D").ok()?)?;
                Some(LinkTarget::Internal { destination })
            }
            _ => None,
        };
    }

    let destination = destination_ref(document, annot.get(b"Dest").ok()?)?;
    Some(LinkTarget::Internal { destination })
}

pub(crate) fn extract_links(
    document: &Document,
    page_id: ObjectId,
    page_index: u32,
) -> Result<Vec<LinkAnnotation>, PdfEngineError> {
    let malformed = |reason: String| PdfEngineError::MalformedAnnotations { page: page_index, reason };

    let page = document.get_dictionary(page_id)?;

    let annots = match page.get(b"Annots") {
        Ok(obj) => obj,
        Err(_) => return Ok(Vec::new()),
    };

    let annots = deref(document, annots)
        .ok_or_else(|| malformed("unresolvable /Annots reference".to_owned()))?
        .as_array()
        .map_err(|e| malformed(format!("/Annots is not an array: {e}")))?;

    let mut links = Vec::new();

    for entry in annots {
        let Some(annot) = deref(document, entry).and_then(|obj| obj.as_dict().ok()) else {
            continue;
        };

        match annot.get(b"Subtype") {
            Ok(Object::Name(subtype)) if subtype.as_slice() == b"Link" => {}
            _ => continue,
        }

        let Some(rect) = annot
            .get(b"Rect")
            .ok()
            .and_then(|obj| deref(document, obj))
            .and_then(|obj| obj.as_array().ok())
            .and_then(|array| rect_from_array(document, array))
        else {
            continue;
        };

        let Some(target) = link_target(document, annot) else {
            tracing::trace!(page = page_index, "skipping link without a supported target");
            continue;
        };

        links.push(LinkAnnotation { page_index, rect, target });
    }

    Ok(links)
}

fn catalog(document: &Document) -> Option<&Dictionary> {
    deref(document, document.trailer.get(b"Root").ok()?)?.as_dict().ok()
}

/// Looks a name up in a `/Names` tree, descending through `/Kids`.
fn lookup_name_tree<'a>(
    document: &'a Document,
    node: &'a Dictionary,
    name: &str,
    depth: usize,
) -> Option<&'a Object> {
    if depth > 32 {
        return None;
    }

    if let Some(pairs) = node
        .get(b"Names")
        .ok()
        .and_then(|obj| deref(document, obj))
        .and_then(|obj| obj.as_array().ok())
    {
        for pair in pairs.chunks_exact(2) {
            let key = match deref(document, &pair[0]) {
                Some(Object::String(bytes, _)) => decode_text(bytes),
                _ => continue,
            };
            if key == name {
                return deref(document, &pair[1]);
            }
        }
    }

    let kids = node
        .get(b"Kids")
        .ok()
        .and_then(|obj| deref(document, obj))
        .and_then(|obj| obj.as_array().ok())?;

    kids.iter()
        .filter_map(|kid| deref(document, kid).and_then(|obj| obj.as_dict().ok()))
        .find_map(|kid| lookup_name_tree(document, kid, name, depth + 1))
}

fn named_destination<'a>(document: &'a Document, name: &str) -> Option<&'a Object> {
    let catalog = catalog(document)?;

    let from_tree = catalog
        .get(b"Names")
        .ok()
        .and_then(|obj| deref(document, obj))
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|names| names.get(b"Dests").ok())
        .and_then(|obj| deref(document, obj))
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|tree| lookup_name_tree(document, tree, name, 0));

    from_tree.or_else(|| {
        catalog
            .get(b"Dests")
            .ok()
            .and_then(|obj| deref(document, obj))
            .and_then(|obj| obj.as_dict().ok())
            .and_then(|dests| dests.get(name.as_bytes()).ok())
            .and_then(|obj| deref(document, obj))
    })
}

pub(crate) fn resolve_destination(
    document: &Document,
    page_ids: &[ObjectId],
    destination: &DestinationRef,
) -> Result<u32, PdfEngineError> {
    let unresolved = || PdfEngineError::UnresolvedDestination(destination.to_string());

    match destination {
        DestinationRef::PageObject { id, generation } => page_ids
            .iter()
            .position(|page_id| *page_id == (*id, *generation))
            .map(|index| index as u32)
            .ok_or_else(unresolved),
        DestinationRef::PageIndex { index } => {
            if (*index as usize) < page_ids.len() {
                Ok(*index)
            } else {
                Err(unresolved())
            }
        }
        DestinationRef::Named { name } => {
            let target = named_destination(document, name).ok_or_else(unresolved)?;
            match destination_ref(document, target) {
                Some(explicit @ DestinationRef::PageObject { .. })
                | Some(explicit @ DestinationRef::PageIndex { .. }) => {
                    resolve_destination(document, page_ids, &explicit)
                }
                _ => Err(unresolved()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixturePdf;
    use crate::{LopdfEngine, OpenSource, PdfEngine};

    fn open(fixture: FixturePdf) -> LopdfEngine {
        LopdfEngine::open(OpenSource::Bytes(fixture.to_bytes())).expect("fixture should open")
    }

    #[test]
    fn rect_is_normalized() {
        let rect = PdfRect::new(300.0, 750.0, 100.0, 700.0);
        assert_eq!(rect, PdfRect { x1: 100.0, y1: 700.0, x2: 300.0, y2: 750.0 });
        assert_eq!(rect.width(), 200.0);
        assert_eq!(rect.height(), 50.0);
    }

    #[test]
    fn extracts_uri_links() {
        let engine = open(
            FixturePdf::new().page(612, 792).uri_link([100, 700, 300, 750], "https://example.com"),
        );

        let links = engine.link_annotations(0).expect("links should parse");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].page_index, 0);
        assert_eq!(links[0].rect, PdfRect::new(100.0, 700.0, 300.0, 750.0));
        assert_eq!(links[0].target, LinkTarget::External { url: "https://example.com".into() });
    }

    #[test]
    fn goto_links_resolve_to_page_index() {
        let engine = open(
            FixturePdf::new()
                .page(612, 792)
                .goto_link([10, 10, 50, 50], 2)
                .page(612, 792)
                .page(612, 792),
        );

        let links = engine.link_annotations(0).unwrap();
        let LinkTarget::Internal { destination } = &links[0].target else {
            panic!("expected internal link, got {:?}", links[0].target);
        };

        assert!(matches!(destination, DestinationRef::PageObject { .. }));
        assert_eq!(engine.resolve_destination(destination).unwrap(), 2);
    }

    #[test]
    fn named_destinations_resolve_through_catalog() {
        let engine = open(
            FixturePdf::new()
                .page(612, 792)
                .named_link([0, 0, 20, 20], "chapter-2")
                .page(612, 792)
                .named_destination("chapter-2", 1),
        );

        let links = engine.link_annotations(0).unwrap();
        let LinkTarget::Internal { destination } = &links[0].target else {
            panic!("expected internal link");
        };

        assert_eq!(destination, &DestinationRef::Named { name: "chapter-2".into() });
        assert_eq!(engine.resolve_destination(destination).unwrap(), 1);
    }

    #[test]
    fn unknown_named_destination_is_an_error() {
        let engine = open(FixturePdf::new().page(612, 792));
        let err = engine
            .resolve_destination(&DestinationRef::Named { name: "nowhere".into() })
            .expect_err("should not resolve");

        assert!(matches!(err, PdfEngineError::UnresolvedDestination(_)));
    }

    #[test]
    fn page_index_destination_is_range_checked() {
        let engine = open(FixturePdf::new().page(612, 792).page(612, 792));

        assert_eq!(engine.resolve_destination(&DestinationRef::PageIndex { index: 1 }).unwrap(), 1);
        assert!(engine.resolve_destination(&DestinationRef::PageIndex { index: 2 }).is_err());
    }

    #[test]
    fn pages_without_annots_have_no_links() {
        let engine = open(FixturePdf::new().page(612, 792));
        assert!(engine.link_annotations(0).unwrap().is_empty());
    }

    #[test]
    fn decodes_utf16_text() {
        let bytes = [0xFE, 0xFF, 0x00, 0x68, 0x00, 0x69];
        assert_eq!(decode_text(&bytes), "hi");
        assert_eq!(decode_text(b"plain"), "plain");
    }
}
