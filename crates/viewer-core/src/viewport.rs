use pageview_render::ContainerSize;
use serde::Serialize;

pub const MIN_ZOOM: u16 = 25;
pub const MAX_ZOOM: u16 = 300;
pub const DEFAULT_ZOOM: u16 = 100;
pub const ZOOM_STEP: u16 = 10;

/// Clockwise display rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(into = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Accepts any multiple of 90, including negative ones.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        Some(match degrees.rem_euclid(360) {
            0 => Self::Deg0,
            90 => Self::Deg90,
            180 => Self::Deg180,
            _ => Self::Deg270,
        })
    }

    pub fn next(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg90,
            Self::Deg90 => Self::Deg180,
            Self::Deg180 => Self::Deg270,
            Self::Deg270 => Self::Deg0,
        }
    }

    /// True for 90 and 270, where width and height trade places.
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

impl From<Rotation> for u16 {
    fn from(value: Rotation) -> Self {
        value.degrees()
    }
}

/// What a transition changed. The viewer reacts to it; the state itself
/// never touches caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportChange {
    None,
    Page { from: u32, to: u32 },
    Zoom { from: u16, to: u16 },
    Rotation { from: Rotation, to: Rotation },
    Container,
}

impl ViewportChange {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Page, zoom, rotation and container of the single-page view.
///
/// `current_page` is one-based; it is 0 only for a document without pages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewportState {
    pub current_page: u32,
    pub page_count: u32,
    pub zoom_percent: u16,
    pub rotation: Rotation,
    #[serde(skip)]
    pub container: ContainerSize,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ViewportState {
    pub fn new(page_count: u32) -> Self {
        Self {
            current_page: page_count.min(1),
            page_count,
            zoom_percent: DEFAULT_ZOOM,
            rotation: Rotation::Deg0,
            container: ContainerSize::default(),
        }
    }

    pub fn with_zoom(mut self, percent: u16) -> Self {
        self.zoom_percent = clamp_zoom(percent);
        self
    }

    pub fn with_container(mut self, width: f32, height: f32) -> Self {
        self.container = ContainerSize::new(width, height);
        self
    }

    /// No-op unless `page` is within `1..=page_count`.
    pub fn goto_page(&mut self, page: u32) -> ViewportChange {
        if page == 0 || page > self.page_count || page == self.current_page {
            return ViewportChange::None;
        }
        let from = self.current_page;
        self.current_page = page;
        ViewportChange::Page { from, to: page }
    }

    pub fn next_page(&mut self) -> ViewportChange {
        self.goto_page(self.current_page.saturating_add(1))
    }

    pub fn previous_page(&mut self) -> ViewportChange {
        self.goto_page(self.current_page.saturating_sub(1))
    }

    pub fn first_page(&mut self) -> ViewportChange {
        self.goto_page(1)
    }

    pub fn last_page(&mut self) -> ViewportChange {
        self.goto_page(self.page_count)
    }

    pub fn zoom_in(&mut self) -> ViewportChange {
        self.set_zoom(self.zoom_percent.saturating_add(ZOOM_STEP))
    }

    pub fn zoom_out(&mut self) -> ViewportChange {
        self.set_zoom(self.zoom_percent.saturating_sub(ZOOM_STEP))
    }

    /// Clamped to `[MIN_ZOOM, MAX_ZOOM]`.
    pub fn set_zoom(&mut self, percent: u16) -> ViewportChange {
        let to = clamp_zoom(percent);
        if to == self.zoom_percent {
            return ViewportChange::None;
        }
        let from = self.zoom_percent;
        self.zoom_percent = to;
        ViewportChange::Zoom { from, to }
    }

    pub fn reset_zoom(&mut self) -> ViewportChange {
        self.set_zoom(DEFAULT_ZOOM)
    }

    pub fn rotate(&mut self) -> ViewportChange {
        let from = self.rotation;
        self.rotation = from.next();
        ViewportChange::Rotation { from, to: self.rotation }
    }

    pub fn set_rotation(&mut self, rotation: Rotation) -> ViewportChange {
        if rotation == self.rotation {
            return ViewportChange::None;
        }
        let from = self.rotation;
        self.rotation = rotation;
        ViewportChange::Rotation { from, to: rotation }
    }

    pub fn set_container_size(&mut self, width: f32, height: f32) -> ViewportChange {
        let container = ContainerSize::new(width, height);
        if container == self.container {
            return ViewportChange::None;
        }
        self.container = container;
        ViewportChange::Container
    }
}

pub fn clamp_zoom(percent: u16) -> u16 {
    percent.clamp(MIN_ZOOM, MAX_ZOOM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_on_first_page() {
        let state = ViewportState::new(3);
        assert_eq!(state.current_page, 1);
        assert_eq!(state.zoom_percent, 100);
        assert_eq!(state.rotation, Rotation::Deg0);

        assert_eq!(ViewportState::new(0).current_page, 0);
    }

    #[test]
    fn goto_page_ignores_out_of_range() {
        let mut state = ViewportState::new(5);

        assert_eq!(state.goto_page(0), ViewportChange::None);
        assert_eq!(state.goto_page(6), ViewportChange::None);
        assert_eq!(state.current_page, 1);

        assert_eq!(state.goto_page(4), ViewportChange::Page { from: 1, to: 4 });
        assert_eq!(state.goto_page(4), ViewportChange::None);
    }

    #[test]
    fn next_and_previous_stop_at_the_ends() {
        let mut state = ViewportState::new(2);

        assert!(state.previous_page().is_none());
        assert_eq!(state.next_page(), ViewportChange::Page { from: 1, to: 2 });
        assert!(state.next_page().is_none());
        assert_eq!(state.current_page, 2);

        assert_eq!(state.first_page(), ViewportChange::Page { from: 2, to: 1 });
        assert_eq!(state.last_page(), ViewportChange::Page { from: 1, to: 2 });
    }

    #[test]
    fn navigation_on_empty_document_is_inert() {
        let mut state = ViewportState::new(0);
        assert!(state.next_page().is_none());
        assert!(state.last_page().is_none());
        assert!(state.first_page().is_none());
        assert_eq!(state.current_page, 0);
    }

    #[test]
    fn zoom_steps_by_ten_within_bounds() {
        let mut state = ViewportState::new(1);

        assert_eq!(state.zoom_in(), ViewportChange::Zoom { from: 100, to: 110 });
        assert_eq!(state.zoom_out(), ViewportChange::Zoom { from: 110, to: 100 });

        state.set_zoom(295);
        assert_eq!(state.zoom_in(), ViewportChange::Zoom { from: 295, to: 300 });
        assert!(state.zoom_in().is_none());

        state.set_zoom(30);
        assert_eq!(state.zoom_out(), ViewportChange::Zoom { from: 30, to: 25 });
        assert!(state.zoom_out().is_none());
    }

    #[test]
    fn set_zoom_clamps_and_reset_returns_to_default() {
        let mut state = ViewportState::new(1);

        assert_eq!(state.set_zoom(1000), ViewportChange::Zoom { from: 100, to: 300 });
        assert_eq!(state.set_zoom(0), ViewportChange::Zoom { from: 300, to: 25 });
        assert_eq!(state.reset_zoom(), ViewportChange::Zoom { from: 25, to: 100 });
    }

    #[test]
    fn rotation_cycles_clockwise() {
        let mut state = ViewportState::new(1);
        let degrees: Vec<u16> = (0..5)
            .map(|_| {
                state.rotate();
                state.rotation.degrees()
            })
            .collect();

        assert_eq!(degrees, vec![90, 180, 270, 0, 90]);
    }

    #[test]
    fn rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(45), None);
        assert!(Rotation::Deg270.is_quarter_turn());
        assert!(!Rotation::Deg180.is_quarter_turn());
    }

    #[test]
    fn set_rotation_reports_only_real_changes() {
        let mut state = ViewportState::new(1);

        assert!(state.set_rotation(Rotation::Deg0).is_none());
        assert_eq!(
            state.set_rotation(Rotation::Deg270),
            ViewportChange::Rotation {
                from: Rotation::Deg0,
                to: Rotation::Deg270
            }
        );
    }

    #[test]
    fn container_change_is_reported_once() {
        let mut state = ViewportState::new(1);

        assert_eq!(state.set_container_size(800.0, 600.0), ViewportChange::Container);
        assert!(state.set_container_size(800.0, 600.0).is_none());
    }
}
