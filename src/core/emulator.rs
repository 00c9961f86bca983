//! The character-grid emulator collaborator, as seen by the surface.

/// Current grid shape and cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulatorDimensions {
    pub columns: i64,
    pub rows: i64,
    pub cursor_x: i64,
    pub cursor_y: i64,
}

/// One batch of emulator output: the refreshed screen range plus any rows
/// that scrolled off the top since the last flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderEvent {
    pub columns: i64,
    pub rows: i64,
    pub refresh_start_row: i64,
    pub refresh_end_row: i64,
    pub scrollback_lines: Vec<String>,
}

/// External character-grid emulation. The surface consumes render batches
/// and issues cursor/row commands; everything else about emulation is the
/// implementor's business.
pub trait Emulator {
    /// Push every completed row above the cursor into the pending scrollback
    /// of the next render event.
    fn move_rows_above_cursor_to_scrollback(&mut self);

    /// Drain pending output. `None` when nothing changed since the last
    /// flush.
    fn flush_render_queue(&mut self) -> Option<RenderEvent>;

    /// Queue a full-screen refresh.
    fn refresh_screen(&mut self);

    fn dimensions(&self) -> EmulatorDimensions;

    /// Text of one screen row, top row is 0.
    fn line_text(&self, row: i64) -> Option<String>;

    /// Move the cursor to the start of a fresh line.
    fn new_line(&mut self);

    fn resize(&mut self, columns: i64, rows: i64);
}
