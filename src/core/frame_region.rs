//! Command frames: one command's output under a return-code stamped header.

use crate::config::SurfaceMetrics;
use crate::core::region::{InteractionMode, Region, RegionGeometry, RegionKind};

/// Header status glyph, derived from the return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameIcon {
    /// No return code yet.
    Running,
    /// Return code "0".
    Success,
    /// Any other return code.
    Failure,
}

/// Renderer family for a show-file preview hosted in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewerKind {
    Text,
    Image,
}

/// A downloaded file displayed inside a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePreview {
    pub filename: String,
    pub mime_type: String,
    pub previewer: PreviewerKind,
    pub bytes: Vec<u8>,
}

// Fixed placeholder footprint for image previews; the real raster size is a
// rendering-layer concern.
const IMAGE_PREVIEW_ROWS: i64 = 8;

/// A framed command block. The header (command line, return code, icon) is
/// the Region's reserve height and stays visible while any part of the frame
/// intersects the viewport.
pub struct FramedRegion {
    metrics: SurfaceMetrics,
    command_line: String,
    return_code: Option<String>,
    tag: String,
    content: Vec<String>,
    preview: Option<FilePreview>,
    visible: bool,
    mode: InteractionMode,
    geometry: Option<RegionGeometry>,
}

impl FramedRegion {
    /// An open frame: command started, no return code yet.
    pub fn open(metrics: SurfaceMetrics, command_line: String, tag: String) -> Self {
        Self {
            metrics,
            command_line,
            return_code: None,
            tag,
            content: Vec::new(),
            preview: None,
            visible: false,
            mode: InteractionMode::Default,
            geometry: None,
        }
    }

    /// A closed frame built retroactively from already-emitted lines.
    pub fn closed(
        metrics: SurfaceMetrics,
        command_line: String,
        tag: String,
        return_code: String,
        content: Vec<String>,
    ) -> Self {
        let mut frame = Self::open(metrics, command_line, tag);
        frame.content = content;
        frame.return_code = Some(return_code);
        frame
    }

    /// A frame hosting a downloaded-file preview. Text previews carry their
    /// decoded lines as frame content; image previews keep the raw bytes.
    pub fn preview(metrics: SurfaceMetrics, tag: String, preview: FilePreview) -> Self {
        let mut frame = Self::open(metrics, preview.filename.clone(), tag);
        if preview.previewer == PreviewerKind::Text {
            frame.content = String::from_utf8_lossy(&preview.bytes)
                .lines()
                .map(str::to_string)
                .collect();
        }
        frame.return_code = Some("0".to_string());
        frame.preview = Some(preview);
        frame
    }

    /// Bind accumulated output lines and stamp the return code on an open
    /// frame.
    pub fn close(&mut self, return_code: String, content: Vec<String>) {
        self.content = content;
        self.return_code = Some(return_code);
    }

    pub fn icon(&self) -> FrameIcon {
        match self.return_code.as_deref() {
            None => FrameIcon::Running,
            Some("0") => FrameIcon::Success,
            Some(_) => FrameIcon::Failure,
        }
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn return_code(&self) -> Option<&str> {
        self.return_code.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.return_code.is_none()
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn content(&self) -> &[String] {
        &self.content
    }

    pub fn file_preview(&self) -> Option<&FilePreview> {
        self.preview.as_ref()
    }

    pub fn last_geometry(&self) -> Option<RegionGeometry> {
        self.geometry
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }
}

impl Region for FramedRegion {
    fn kind(&self) -> RegionKind {
        RegionKind::Framed
    }

    fn min_height(&self) -> i64 {
        self.metrics.frame_header_height
    }

    fn virtual_height(&self, _container_height: i64) -> i64 {
        match &self.preview {
            Some(preview) if preview.previewer == PreviewerKind::Image => {
                IMAGE_PREVIEW_ROWS * self.metrics.line_height
            }
            _ => self.content.len() as i64 * self.metrics.line_height,
        }
    }

    fn reserve_height(&self, _container_height: i64) -> i64 {
        self.metrics.frame_header_height
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
        if self.preview.is_some() {
            // Previews have no line structure to trim.
            return false;
        }
        let line_height = self.metrics.line_height.max(1);
        let rows = ((height + line_height - 1) / line_height) as usize;
        if rows >= self.content.len() {
            return false;
        }
        self.content.drain(..rows);
        true
    }

    fn as_frame(&self) -> Option<&FramedRegion> {
        Some(self)
    }

    fn as_frame_mut(&mut self) -> Option<&mut FramedRegion> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{FilePreview, FrameIcon, FramedRegion, PreviewerKind};
    use crate::config::SurfaceMetrics;
    use crate::core::region::Region;
    use pretty_assertions::assert_eq;

    fn metrics() -> SurfaceMetrics {
        SurfaceMetrics {
            line_height: 10,
            frame_header_height: 24,
        }
    }

    #[test]
    fn icon_follows_return_code() {
        let mut frame = FramedRegion::open(metrics(), "make".into(), "1".into());
        assert_eq!(frame.icon(), FrameIcon::Running);
        assert!(frame.is_open());

        frame.close("0".into(), vec!["ok".into()]);
        assert_eq!(frame.icon(), FrameIcon::Success);

        let failed = FramedRegion::closed(metrics(), "make".into(), "2".into(), "1".into(), vec![]);
        assert_eq!(failed.icon(), FrameIcon::Failure);
    }

    #[test]
    fn header_is_reserve_and_minimum_height() {
        let frame = FramedRegion::open(metrics(), "make".into(), "1".into());
        assert_eq!(frame.reserve_height(500), 24);
        assert_eq!(frame.min_height(), 24);
        assert_eq!(frame.virtual_height(500), 0);
    }

    #[test]
    fn text_preview_decodes_into_content_lines() {
        let frame = FramedRegion::preview(
            metrics(),
            "3".into(),
            FilePreview {
                filename: "notes.txt".into(),
                mime_type: "text/plain".into(),
                previewer: PreviewerKind::Text,
                bytes: b"one\ntwo\n".to_vec(),
            },
        );
        assert_eq!(frame.content(), ["one".to_string(), "two".to_string()]);
        assert_eq!(frame.virtual_height(500), 2 * 10);
        assert_eq!(frame.icon(), FrameIcon::Success);
    }

    #[test]
    fn trim_top_drops_whole_lines_and_refuses_to_empty() {
        let mut frame = FramedRegion::closed(
            metrics(),
            "ls".into(),
            "4".into(),
            "0".into(),
            vec!["a".into(), "b".into(), "c".into()],
        );
        assert!(frame.trim_top(10));
        assert_eq!(frame.content(), ["b".to_string(), "c".to_string()]);
        assert!(!frame.trim_top(30));
    }
}
