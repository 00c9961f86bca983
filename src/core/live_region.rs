//! The Region receiving emulator output, and its frozen scrollback afterlife.

use crate::config::SurfaceMetrics;
use crate::core::region::{InteractionMode, Region, RegionGeometry, RegionKind};

/// Stable reference to a scrollback line, unaffected by top trimming.
///
/// Bookmarks are absolute line indices counted from the start of the
/// Region's life; `trimmed_lines` records how many of those indices have
/// since been evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineBookmark(pub u64);

/// The Live Region: scrollback lines absorbed from the emulator plus the
/// live screen grid while attached.
///
/// On every command boundary the surface either reuses an empty Live Region
/// in place or freezes a non-empty one — `detach()` turns it into plain
/// scrollback and a fresh Live Region takes over.
pub struct LiveRegion {
    metrics: SurfaceMetrics,
    lines: Vec<String>,
    /// Lines evicted from the top over this Region's lifetime.
    trimmed_lines: u64,
    /// Rows of the live screen grid; counts toward virtual height only while
    /// attached.
    screen_rows: i64,
    attached: bool,
    visible: bool,
    mode: InteractionMode,
    geometry: Option<RegionGeometry>,
}

impl LiveRegion {
    pub fn new(metrics: SurfaceMetrics) -> Self {
        Self {
            metrics,
            lines: Vec::new(),
            trimmed_lines: 0,
            screen_rows: 0,
            attached: true,
            visible: false,
            mode: InteractionMode::Default,
            geometry: None,
        }
    }

    /// Fold one render event's overflow into scrollback and adopt the new
    /// screen row count.
    pub fn absorb_scrollback(&mut self, scrollback_lines: Vec<String>, screen_rows: i64) {
        self.lines.extend(scrollback_lines);
        if self.attached {
            self.screen_rows = screen_rows;
        }
    }

    /// Drop the live screen contribution. Used when an empty Live Region is
    /// about to be moved to the tail of the region list.
    pub fn delete_screen(&mut self) {
        self.screen_rows = 0;
    }

    /// Whether any scrollback content has accumulated.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Freeze into plain scrollback; the screen grid no longer belongs to
    /// this Region.
    pub fn detach(&mut self) {
        self.attached = false;
        self.screen_rows = 0;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Bookmark the last absorbed line. With no lines yet, the bookmark marks
    /// the first line still to come.
    pub fn bookmark_last_line(&self) -> LineBookmark {
        let len = self.lines.len() as u64;
        LineBookmark(self.trimmed_lines + len.saturating_sub(1))
    }

    fn local_index_after(&self, bookmark: LineBookmark) -> usize {
        let absolute = bookmark.0.saturating_add(1);
        absolute.saturating_sub(self.trimmed_lines) as usize
    }

    /// Lines absorbed strictly after the bookmarked line. Lines already
    /// evicted past the bookmark are gone and not reported.
    pub fn lines_after(&self, bookmark: LineBookmark) -> Vec<String> {
        let start = self.local_index_after(bookmark).min(self.lines.len());
        self.lines[start..].to_vec()
    }

    /// Remove everything strictly after the bookmarked line.
    pub fn delete_lines_after(&mut self, bookmark: LineBookmark) {
        let start = self.local_index_after(bookmark).min(self.lines.len());
        self.lines.truncate(start);
    }

    /// Move all scrollback lines out, leaving the Region empty.
    pub fn take_lines(&mut self) -> Vec<String> {
        self.trimmed_lines += self.lines.len() as u64;
        std::mem::take(&mut self.lines)
    }

    /// Drop every scrollback line.
    pub fn clear_scrollback_lines(&mut self) {
        self.trimmed_lines += self.lines.len() as u64;
        self.lines.clear();
    }

    /// The absorbed scrollback lines, oldest first.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn last_geometry(&self) -> Option<RegionGeometry> {
        self.geometry
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

impl Region for LiveRegion {
    fn kind(&self) -> RegionKind {
        if self.attached {
            RegionKind::Live
        } else {
            RegionKind::Scrollback
        }
    }

    fn min_height(&self) -> i64 {
        0
    }

    fn virtual_height(&self, _container_height: i64) -> i64 {
        let rows = self.lines.len() as i64 + if self.attached { self.screen_rows } else { 0 };
        rows * self.metrics.line_height
    }

    fn reserve_height(&self, _container_height: i64) -> i64 {
        0
    }

    fn set_dimensions_and_scroll(&mut self, geometry: &RegionGeometry) {
        self.geometry = Some(*geometry);
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn set_mode(&mut self, mode: InteractionMode) {
        self.mode = mode;
    }

    fn trim_top(&mut self, height: i64) -> bool {
        if height <= 0 {
            return true;
        }
        let line_height = self.metrics.line_height.max(1);
        let rows = ((height + line_height - 1) / line_height) as usize;
        if rows >= self.lines.len() {
            return false;
        }
        self.lines.drain(..rows);
        self.trimmed_lines += rows as u64;
        true
    }

    fn as_live(&self) -> Option<&LiveRegion> {
        Some(self)
    }

    fn as_live_mut(&mut self) -> Option<&mut LiveRegion> {
        Some(self)
    }
}
