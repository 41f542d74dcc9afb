//! Document space to screen space
//!
//! Document space has its origin at the bottom-left of the page and is
//! measured in points. Screen space has its origin at the top-left of the
//! displayed page box and is measured in logical pixels.
//!
//! The display box is the page as it appears on screen, after rotation.
//! For a quarter turn the unrotated box is its transpose. Mapping first
//! scales the rect into the unrotated box (flipping the y axis), then turns
//! the result clockwise by the display rotation.

use crate::viewport::Rotation;
use pageview_engine::{PageSize, PdfRect};
use pageview_render::ScreenRect;

/// On-screen size of the displayed page, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayBox {
    pub width: f32,
    pub height: f32,
}

impl DisplayBox {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0)
    }
}

/// Maps rects between one page's document space and its display box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    page: PageSize,
    rotation: Rotation,
    /// Unrotated display width
    width: f32,
    /// Unrotated display height
    height: f32,
    scale_x: f32,
    scale_y: f32,
}

impl CoordinateMapper {
    /// Returns `None` if the page or the display box is degenerate.
    pub fn new(page: PageSize, display: DisplayBox, rotation: Rotation) -> Option<Self> {
        if page.is_degenerate() || display.is_degenerate() {
            return None;
        }

        let (width, height) = if rotation.is_quarter_turn() {
            (display.height, display.width)
        } else {
            (display.width, display.height)
        };

        Some(Self {
            page,
            rotation,
            width,
            height,
            scale_x: width / page.width_pt,
            scale_y: height / page.height_pt,
        })
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// On-screen display box this mapper targets.
    pub fn display_box(&self) -> DisplayBox {
        if self.rotation.is_quarter_turn() {
            DisplayBox::new(self.height, self.width)
        } else {
            DisplayBox::new(self.width, self.height)
        }
    }

    pub fn to_screen(&self, rect: &PdfRect) -> ScreenRect {
        let left = rect.x1 * self.scale_x;
        let top = (self.page.height_pt - rect.y2) * self.scale_y;
        let width = rect.width() * self.scale_x;
        let height = rect.height() * self.scale_y;

        let (w0, h0) = (self.width, self.height);
        match self.rotation {
            Rotation::Deg0 => ScreenRect::new(left, top, width, height),
            Rotation::Deg90 => ScreenRect::new(h0 - top - height, left, height, width),
            Rotation::Deg180 => ScreenRect::new(w0 - left - width, h0 - top - height, width, height),
            Rotation::Deg270 => ScreenRect::new(top, w0 - left - width, height, width),
        }
    }

    /// Inverse of [`to_screen`](Self::to_screen).
    pub fn to_document(&self, rect: &ScreenRect) -> PdfRect {
        let (w0, h0) = (self.width, self.height);
        let (left, top, width, height) = match self.rotation {
            Rotation::Deg0 => (rect.left, rect.top, rect.width, rect.height),
            Rotation::Deg90 => (rect.top, h0 - rect.left - rect.width, rect.height, rect.width),
            Rotation::Deg180 => (
                w0 - rect.left - rect.width,
                h0 - rect.top - rect.height,
                rect.width,
                rect.height,
            ),
            Rotation::Deg270 => (w0 - rect.top - rect.height, rect.left, rect.height, rect.width),
        };

        let x1 = left / self.scale_x;
        let x2 = (left + width) / self.scale_x;
        let y2 = self.page.height_pt - top / self.scale_y;
        let y1 = y2 - height / self.scale_y;
        PdfRect::new(x1, y1, x2, y2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROTATIONS: [Rotation; 4] =
        [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270];

    fn assert_close(actual: f32, expected: f32) {
        assert!((actual - expected).abs() < 0.05, "expected {expected}, got {actual}");
    }

    fn letter_mapper(rotation: Rotation) -> CoordinateMapper {
        let display = if rotation.is_quarter_turn() {
            DisplayBox::new(1100.0, 850.0)
        } else {
            DisplayBox::new(850.0, 1100.0)
        };
        CoordinateMapper::new(PageSize::LETTER, display, rotation).unwrap()
    }

    #[test]
    fn maps_letter_page_link() {
        let mapper = letter_mapper(Rotation::Deg0);
        let rect = mapper.to_screen(&PdfRect::new(100.0, 700.0, 300.0, 750.0));

        assert_close(rect.left, 138.9);
        assert_close(rect.top, 58.3);
        assert_close(rect.width, 277.8);
        assert_close(rect.height, 69.4);
    }

    #[test]
    fn round_trip_recovers_rect_under_every_rotation() {
        let original = PdfRect::new(100.0, 700.0, 300.0, 750.0);

        for rotation in ROTATIONS {
            let mapper = letter_mapper(rotation);
            let back = mapper.to_document(&mapper.to_screen(&original));

            assert_close(back.x1, original.x1);
            assert_close(back.y1, original.y1);
            assert_close(back.x2, original.x2);
            assert_close(back.y2, original.y2);
        }
    }

    #[test]
    fn quarter_turn_moves_top_left_corner_to_top_right() {
        // A link in the top-left corner of the page ends up in the
        // top-right corner after a clockwise quarter turn.
        let mapper = letter_mapper(Rotation::Deg90);
        let rect = mapper.to_screen(&PdfRect::new(0.0, 742.0, 100.0, 792.0));

        let display = mapper.display_box();
        assert_close(rect.right(), display.width);
        assert_close(rect.top, 0.0);
        // Width and height trade places.
        assert_close(rect.width, 50.0 * 1100.0 / 792.0);
        assert_close(rect.height, 100.0 * 850.0 / 612.0);
    }

    #[test]
    fn half_turn_mirrors_both_axes() {
        let upright = letter_mapper(Rotation::Deg0);
        let flipped = letter_mapper(Rotation::Deg180);
        let link = PdfRect::new(100.0, 700.0, 300.0, 750.0);

        let a = upright.to_screen(&link);
        let b = flipped.to_screen(&link);

        assert_close(b.left, 850.0 - a.right());
        assert_close(b.top, 1100.0 - a.bottom());
        assert_close(b.width, a.width);
    }

    #[test]
    fn mapped_rects_stay_inside_the_display_box() {
        let page_edge = PdfRect::new(0.0, 0.0, 612.0, 792.0);

        for rotation in ROTATIONS {
            let mapper = letter_mapper(rotation);
            let rect = mapper.to_screen(&page_edge);
            let display = mapper.display_box();

            assert_close(rect.left, 0.0);
            assert_close(rect.top, 0.0);
            assert_close(rect.width, display.width);
            assert_close(rect.height, display.height);
        }
    }

    #[test]
    fn degenerate_inputs_have_no_mapper() {
        let display = DisplayBox::new(850.0, 1100.0);
        assert!(CoordinateMapper::new(PageSize::new(0.0, 792.0), display, Rotation::Deg0).is_none());

        let flat = DisplayBox::new(850.0, 0.0);
        assert!(CoordinateMapper::new(PageSize::LETTER, flat, Rotation::Deg0).is_none());

        let nan = DisplayBox::new(f32::NAN, 10.0);
        assert!(CoordinateMapper::new(PageSize::LETTER, nan, Rotation::Deg90).is_none());
    }
}
