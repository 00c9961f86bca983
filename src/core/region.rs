//! Region trait: the capability contract for stackable content blocks.

use crate::core::frame_region::FramedRegion;
use crate::core::live_region::LiveRegion;

/// Tag selecting a Region variant. A closed set; new content kinds are new
/// variants, not new trait hierarchies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// The one Region currently receiving emulator output.
    Live,
    /// A frozen former Live Region.
    Scrollback,
    /// One command's output plus return-code metadata.
    Framed,
}

/// Interaction mode applied to mounted Regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
    /// Keystrokes flow to the pty.
    Default,
    /// Selection/cursor navigation inside Region content.
    Cursor,
}

impl Default for InteractionMode {
    fn default() -> Self {
        Self::Default
    }
}

/// Geometry pushed to a Region after a layout recompute.
///
/// The `*_changed` flags let a Region skip work for fields that kept their
/// previous value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionGeometry {
    /// Physical height allocated to the Region.
    pub height: i64,
    pub height_changed: bool,
    /// Scroll offset of the Region's content within its physical window.
    pub internal_offset: i64,
    pub internal_offset_changed: bool,
    /// Offset of the container's scroll position relative to this Region's
    /// physical top.
    pub physical_top: i64,
    pub physical_top_changed: bool,
    /// Current viewport height.
    pub container_height: i64,
    pub container_height_changed: bool,
}

/// A stackable content block managed by `VirtualScrollArea`.
///
/// Reported sizes are inputs to layout; geometry and visibility are pushed
/// back after each recompute. A Region must not mutate its live state while
/// unmounted: it holds serialized content only and rehydrates when
/// `set_visible(true)` arrives, which is guaranteed to precede any geometry
/// update for a newly mounted Region.
pub trait Region {
    fn kind(&self) -> RegionKind;

    /// Smallest physical height this Region can be given.
    fn min_height(&self) -> i64;

    /// Logical content height, independent of the physical viewport.
    fn virtual_height(&self, container_height: i64) -> i64;

    /// Always-visible chrome height layered on top of the content.
    fn reserve_height(&self, container_height: i64) -> i64;

    /// Apply new geometry. Called only when at least one field changed.
    fn set_dimensions_and_scroll(&mut self, geometry: &RegionGeometry);

    /// Mount or unmount this Region's live resources.
    fn set_visible(&mut self, visible: bool);

    /// Apply the surface's interaction mode (optional).
    fn set_mode(&mut self, _mode: InteractionMode) {}

    /// Remove `height` pixels of content from the top, for scrollback
    /// eviction. Returns false when this Region cannot be trimmed and must be
    /// deleted outright instead.
    fn trim_top(&mut self, _height: i64) -> bool {
        false
    }

    /// Downcast hooks for the orchestrator.
    fn as_live(&self) -> Option<&LiveRegion> {
        None
    }
    fn as_live_mut(&mut self) -> Option<&mut LiveRegion> {
        None
    }
    fn as_frame(&self) -> Option<&FramedRegion> {
        None
    }
    fn as_frame_mut(&mut self) -> Option<&mut FramedRegion> {
        None
    }
}

/// Shared handle to a Region. Identity is pointer identity, so the same
/// handle can live in the surface's document-order list and in the layout
/// engine at once.
pub type RegionRc = std::rc::Rc<std::cell::RefCell<Box<dyn Region>>>;

/// Wrap a concrete Region in a shared handle.
pub fn region_rc(region: impl Region + 'static) -> RegionRc {
    std::rc::Rc::new(std::cell::RefCell::new(Box::new(region)))
}

/// Pointer identity for Region handles.
pub fn region_ptr_eq(a: &RegionRc, b: &RegionRc) -> bool {
    std::rc::Rc::ptr_eq(a, b)
}
