//! The terminal surface: owns the Region stack and turns protocol actions
//! into Region-list mutations.

use tracing::{debug, warn};

use crate::config::{ConfigError, NoFrameRules, SurfaceConfig};
use crate::control::framing::{encode_frame_contents, ControlAction, FramingStateMachine};
use crate::control::show_file::{previewer_for, resolve_mime_type, FileMetadata};
use crate::core::emulator::Emulator;
use crate::core::frame_region::{FilePreview, FramedRegion};
use crate::core::live_region::{LineBookmark, LiveRegion};
use crate::core::region::{region_ptr_eq, region_rc, InteractionMode, RegionRc};
use crate::runtime::stash::DetachedRefreshQueue;
use crate::runtime::virtual_area::VirtualScrollArea;

/// Frame lifecycle notices for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    Opened { tag: String },
    Closed { tag: String, return_code: String },
}

/// A no-frame command whose output start is remembered, in case a nonzero
/// return code forces a frame retroactively.
struct TrackedCommand {
    region: RegionRc,
    bookmark: LineBookmark,
    command_line: String,
}

pub struct TerminalSurface<E: Emulator> {
    emulator: E,
    area: VirtualScrollArea,
    /// Document order, oldest first. The live Region is always the tail.
    regions: Vec<RegionRc>,
    live: RegionRc,
    framing: FramingStateMachine,
    config: SurfaceConfig,
    tracked: Option<TrackedCommand>,
    refresh_queue: DetachedRefreshQueue,
    next_tag: u64,
    mode: InteractionMode,
    on_pty_data: Option<Box<dyn FnMut(&str)>>,
    on_resize_request: Option<Box<dyn FnMut(i64, i64)>>,
    on_frame_event: Option<Box<dyn FnMut(FrameEvent)>>,
}

impl<E: Emulator> TerminalSurface<E> {
    pub fn new(
        emulator: E,
        config: SurfaceConfig,
        cookie: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let rules = NoFrameRules::compile(&config.command_line_actions)?;
        let live = region_rc(LiveRegion::new(config.metrics));

        let mut surface = Self {
            emulator,
            area: VirtualScrollArea::new(),
            regions: Vec::new(),
            live: live.clone(),
            framing: FramingStateMachine::new(cookie, rules),
            config,
            tracked: None,
            refresh_queue: DetachedRefreshQueue::new(),
            next_tag: 1,
            mode: InteractionMode::Default,
            on_pty_data: None,
            on_resize_request: None,
            on_frame_event: None,
        };
        surface.regions.push(live.clone());
        surface.area.append_region(&live);
        Ok(surface)
    }

    // ------------------------------------------------------------------
    // Host wiring.

    /// Data the surface wants written to the pty (request-frame replies,
    /// forwarded keystrokes).
    pub fn set_pty_data_fn(&mut self, pty_data_fn: impl FnMut(&str) + 'static) {
        self.on_pty_data = Some(Box::new(pty_data_fn));
    }

    pub fn set_resize_request_fn(&mut self, resize_fn: impl FnMut(i64, i64) + 'static) {
        self.on_resize_request = Some(Box::new(resize_fn));
    }

    pub fn set_frame_event_fn(&mut self, frame_event_fn: impl FnMut(FrameEvent) + 'static) {
        self.on_frame_event = Some(Box::new(frame_event_fn));
    }

    /// The layout engine, for registering scroll observers and for direct
    /// scrolling.
    pub fn scroll_area(&mut self) -> &mut VirtualScrollArea {
        &mut self.area
    }

    pub fn emulator_mut(&mut self) -> &mut E {
        &mut self.emulator
    }

    // ------------------------------------------------------------------
    // Input plumbing.

    /// Forward keystrokes or pasted text to the pty.
    pub fn send_to_pty(&mut self, data: &str) {
        if let Some(pty_data_fn) = self.on_pty_data.as_mut() {
            pty_data_fn(data);
        }
    }

    /// Resize the character grid and ask the pty layer to follow.
    pub fn resize(&mut self, columns: i64, rows: i64) {
        self.emulator.resize(columns, rows);
        if let Some(resize_fn) = self.on_resize_request.as_mut() {
            resize_fn(columns, rows);
        }
        self.flush_render();
    }

    /// New viewport height. Unmounted Regions are queued for re-measurement
    /// instead of being re-sampled all at once.
    pub fn set_container_height(&mut self, container_height: i64) {
        self.area.set_container_height(container_height);
        for region in self.regions.clone() {
            if self.area.region_visible(&region) == Some(false) {
                self.refresh_queue.enqueue(&region);
            }
        }
    }

    /// Re-measure the next few queued Regions. Returns true while more
    /// remain, so the host can keep scheduling idle turns.
    pub fn pump_detached_refresh(&mut self) -> bool {
        let batch = self.refresh_queue.next_batch();
        if !batch.is_empty() {
            self.area.update_region_sizes(&batch);
        }
        !self.refresh_queue.is_empty()
    }

    /// Drain emulator output into the live Region.
    pub fn flush_render(&mut self) {
        if let Some(event) = self.emulator.flush_render_queue() {
            let absorbed = !event.scrollback_lines.is_empty();
            self.with_live(|live| live.absorb_scrollback(event.scrollback_lines, event.rows));
            self.area.update_region_size(&self.live);
            if absorbed {
                self.enforce_scrollback_length(self.config.scrollback_budget);
            }
        }
    }

    pub fn set_mode(&mut self, mode: InteractionMode) {
        self.mode = mode;
        for region in &self.regions {
            if self.area.region_visible(region) == Some(true) {
                region.borrow_mut().set_mode(mode);
            }
        }
    }

    // ------------------------------------------------------------------
    // Control channel.

    pub fn handle_control_start(&mut self, params: &[&str]) {
        self.framing.handle_start(params);
    }

    pub fn handle_control_data(&mut self, data: &str) {
        self.framing.handle_data(data);
    }

    pub fn handle_control_end(&mut self) {
        if let Some(action) = self.framing.handle_end() {
            self.execute_action(action);
        }
    }

    fn execute_action(&mut self, action: ControlAction) {
        match action {
            ControlAction::OpenFrame { command_line } => {
                if self.has_open_frame() {
                    return;
                }
                self.open_command_frame(command_line);
            }
            ControlAction::TrackCommand { command_line } => {
                if self.has_open_frame() {
                    return;
                }
                self.track_command(command_line);
            }
            ControlAction::CloseFrame { return_code } => {
                self.close_command_frame(&return_code);
                self.enforce_scrollback_length(self.config.scrollback_budget);
            }
            ControlAction::RequestFrame { tag } => self.handle_request_frame(&tag),
            ControlAction::ShowFile { metadata, bytes } => {
                self.handle_show_file(metadata, bytes);
                self.enforce_scrollback_length(self.config.scrollback_budget);
            }
        }
    }

    /// Whether a command frame is still waiting for its return code. While
    /// one is, new command starts are ignored: frames never nest.
    fn has_open_frame(&self) -> bool {
        self.regions.iter().any(|region| {
            region
                .borrow()
                .as_frame()
                .is_some_and(FramedRegion::is_open)
        })
    }

    // ------------------------------------------------------------------
    // Command framing.

    fn open_command_frame(&mut self, command_line: String) {
        let tag = self.take_tag();
        let frame = region_rc(FramedRegion::open(
            self.config.metrics,
            command_line,
            tag.clone(),
        ));
        self.splice_in_frame(frame);
        self.emit_frame_event(FrameEvent::Opened { tag });
    }

    fn track_command(&mut self, command_line: String) {
        self.move_cursor_to_fresh_line();
        self.emulator.move_rows_above_cursor_to_scrollback();
        self.flush_render();

        let bookmark = self
            .with_live(|live| live.bookmark_last_line())
            .unwrap_or(LineBookmark(0));
        self.tracked = Some(TrackedCommand {
            region: self.live.clone(),
            bookmark,
            command_line,
        });
    }

    /// Append a frame at the tail, moving the live Region after it. An empty
    /// live Region is reused in its new position; a non-empty one is frozen
    /// in place and a fresh live Region starts after the frame.
    fn splice_in_frame(&mut self, frame: RegionRc) {
        self.emulator.move_rows_above_cursor_to_scrollback();
        self.flush_render();
        self.with_live(|live| live.delete_screen());

        let reuse_live = self
            .with_live(|live| live.is_empty())
            .unwrap_or(false);
        if reuse_live {
            let live = self.live.clone();
            self.area.remove_region(&live);
            self.regions.retain(|region| !region_ptr_eq(region, &live));
        } else {
            self.freeze_live();
        }

        self.regions.push(frame.clone());
        self.area.append_region(&frame);

        if reuse_live {
            let live = self.live.clone();
            self.regions.push(live.clone());
            self.area.append_region(&live);
            self.emulator.refresh_screen();
            self.flush_render();
        } else {
            self.append_new_live();
        }
    }

    /// Freeze the live Region into scrollback where it stands.
    fn freeze_live(&mut self) {
        self.with_live(|live| {
            live.delete_screen();
            live.detach();
        });
        self.area.update_region_size(&self.live);
    }

    fn append_new_live(&mut self) {
        let live = region_rc(LiveRegion::new(self.config.metrics));
        live.borrow_mut().set_mode(self.mode);
        self.live = live.clone();
        self.regions.push(live.clone());
        self.area.append_region(&live);
        self.emulator.refresh_screen();
        self.flush_render();
    }

    /// Cut the live screen over to a clean state before freezing: when the
    /// cursor sits mid-line on non-empty text, nudge it to a fresh line so
    /// the partial line lands in scrollback intact.
    fn move_cursor_to_fresh_line(&mut self) {
        let dims = self.emulator.dimensions();
        if dims.cursor_x != 0 {
            let line = self.emulator.line_text(dims.cursor_y).unwrap_or_default();
            if !line.trim().is_empty() {
                self.emulator.new_line();
            }
        }
    }

    fn disconnect_live(&mut self) {
        self.move_cursor_to_fresh_line();
        self.emulator.move_rows_above_cursor_to_scrollback();
        self.flush_render();
        self.freeze_live();
    }

    fn close_command_frame(&mut self, return_code: &str) {
        // Newest frame still waiting for its return code.
        let open_frame: Option<RegionRc> = self
            .regions
            .iter()
            .rev()
            .find(|region| {
                region
                    .borrow()
                    .as_frame()
                    .is_some_and(FramedRegion::is_open)
            })
            .cloned();

        if let Some(frame) = open_frame {
            // The command ran framed from the start: fold the live output
            // into the frame and stamp it.
            let closing_live = self.live.clone();
            self.disconnect_live();

            let content = closing_live
                .borrow_mut()
                .as_live_mut()
                .map(LiveRegion::take_lines)
                .unwrap_or_default();

            let tag = {
                let mut frame_region = frame.borrow_mut();
                if let Some(frame_region) = frame_region.as_frame_mut() {
                    frame_region.close(return_code.to_string(), content);
                    frame_region.tag().to_string()
                } else {
                    String::new()
                }
            };

            self.area.remove_region(&closing_live);
            self.regions
                .retain(|region| !region_ptr_eq(region, &closing_live));
            self.refresh_queue.remove(&closing_live);
            self.area.update_region_size(&frame);

            self.append_new_live();
            self.emit_frame_event(FrameEvent::Closed {
                tag,
                return_code: return_code.to_string(),
            });
            return;
        }

        // No open frame: maybe a tracked no-frame command finished.
        let Some(tracked) = self.tracked.take() else {
            return;
        };
        if return_code == "0" {
            // Nothing to frame.
            return;
        }

        // Frame the failed command's output retroactively.
        self.disconnect_live();

        let content = tracked
            .region
            .borrow()
            .as_live()
            .map(|live| live.lines_after(tracked.bookmark))
            .unwrap_or_default();
        if let Some(live) = tracked.region.borrow_mut().as_live_mut() {
            live.delete_lines_after(tracked.bookmark);
        }
        self.area.update_region_size(&tracked.region);

        let tag = self.take_tag();
        let frame = region_rc(FramedRegion::closed(
            self.config.metrics,
            tracked.command_line,
            tag.clone(),
            return_code.to_string(),
            content,
        ));
        self.regions.push(frame.clone());
        self.area.append_region(&frame);

        self.append_new_live();
        self.emit_frame_event(FrameEvent::Closed {
            tag,
            return_code: return_code.to_string(),
        });
    }

    // ------------------------------------------------------------------
    // Request-frame and show-file.

    /// Contents of the frame with this tag, oldest line first.
    pub fn frame_contents(&self, tag: &str) -> Option<Vec<String>> {
        self.find_frame(tag).map(|frame| {
            frame
                .borrow()
                .as_frame()
                .map(|frame| frame.content().to_vec())
                .unwrap_or_default()
        })
    }

    fn handle_request_frame(&mut self, tag: &str) {
        let lines = self.frame_contents(tag).unwrap_or_else(|| {
            warn!(tag, "request for an unknown frame");
            Vec::new()
        });
        let encoded = encode_frame_contents(&lines);
        self.send_to_pty(&encoded);
    }

    fn handle_show_file(&mut self, metadata: FileMetadata, bytes: Vec<u8>) {
        let Some(mime_type) = resolve_mime_type(&metadata) else {
            debug!(filename = %metadata.filename, "show-file with undetectable mime type");
            return;
        };
        let Some(previewer) = previewer_for(&mime_type) else {
            return;
        };

        // A file arriving mid-command closes the command frame first, the
        // way a finished download reads in the scrollback.
        self.close_command_frame("0");

        let tag = self.take_tag();
        let frame = region_rc(FramedRegion::preview(
            self.config.metrics,
            tag.clone(),
            FilePreview {
                filename: metadata.filename,
                mime_type,
                previewer,
                bytes,
            },
        ));
        self.splice_in_frame(frame);
        self.emit_frame_event(FrameEvent::Opened { tag });
    }

    // ------------------------------------------------------------------
    // Frame management.

    fn find_frame(&self, tag: &str) -> Option<RegionRc> {
        self.regions
            .iter()
            .find(|region| {
                region
                    .borrow()
                    .as_frame()
                    .is_some_and(|frame| frame.tag() == tag)
            })
            .cloned()
    }

    /// Remove a frame on the user's request.
    pub fn delete_frame(&mut self, tag: &str) {
        let Some(frame) = self.find_frame(tag) else {
            warn!(tag, "delete request for an unknown frame");
            return;
        };
        self.delete_region(&frame);
    }

    /// Scroll by whole lines; negative scrolls up.
    pub fn scroll_by_lines(&mut self, lines: i64) {
        let offset = self.area.scroll_offset();
        self.area
            .scroll_to(offset + lines * self.config.metrics.line_height);
    }

    pub fn page_up(&mut self) {
        let step = self.page_step();
        let offset = self.area.scroll_offset();
        self.area.scroll_to(offset - step);
    }

    pub fn page_down(&mut self) {
        let step = self.page_step();
        let offset = self.area.scroll_offset();
        self.area.scroll_to(offset + step);
    }

    /// One viewport minus a line of overlap.
    fn page_step(&self) -> i64 {
        (self.area.container_height() - self.config.metrics.line_height).max(0)
    }

    pub fn go_to_previous_frame(&mut self) {
        let offset = self.area.scroll_offset();
        let mut top = 0;
        for height in self.area.region_heights() {
            if offset <= top + height {
                self.area.scroll_to(top);
                break;
            }
            top += height;
        }
    }

    pub fn go_to_next_frame(&mut self) {
        let offset = self.area.scroll_offset();
        let mut top = 0;
        for height in self.area.region_heights() {
            if offset < top + height {
                self.area.scroll_to(top + height);
                break;
            }
            top += height;
        }
    }

    // ------------------------------------------------------------------
    // Scrollback eviction.

    /// Drop all scrollback, keeping only the live screen.
    pub fn clear_scrollback(&mut self) {
        self.enforce_scrollback_length(0);
    }

    /// Keep total virtual height within the budget. A hysteresis band of
    /// 1.1x the budget avoids evicting on every appended line; once over the
    /// hard limit, whole Regions go oldest first until the remainder fits,
    /// with at most one partial top-trim at the end.
    fn enforce_scrollback_length(&mut self, budget: i64) {
        let mut total = self.area.total_virtual_height();
        let hard_limit = budget * 11 / 10;
        if total < hard_limit {
            return;
        }

        for region in self.regions.clone() {
            let is_live = region_ptr_eq(&region, &self.live);
            let region_height = self.area.region_virtual_height(&region).unwrap_or(0);
            let remaining = total - region_height;

            if !is_live && remaining > budget {
                // Plenty of scrollback left after this one: drop it whole.
                self.delete_region(&region);
                total = remaining;
            } else {
                self.trim_region_top(&region, total - budget);
                break;
            }
        }
    }

    fn trim_region_top(&mut self, region: &RegionRc, overflow: i64) {
        if overflow <= 0 {
            return;
        }
        let trimmed = region.borrow_mut().trim_top(overflow);
        if trimmed {
            self.area.update_region_size(region);
            return;
        }
        if region_ptr_eq(region, &self.live) {
            // The live Region itself never leaves the stack; shed all of its
            // scrollback instead.
            self.with_live(|live| live.clear_scrollback_lines());
            self.area.update_region_size(region);
        } else {
            self.delete_region(region);
        }
    }

    fn delete_region(&mut self, region: &RegionRc) {
        self.area.remove_region(region);
        self.regions
            .retain(|candidate| !region_ptr_eq(candidate, region));
        self.refresh_queue.remove(region);
        if self
            .tracked
            .as_ref()
            .is_some_and(|tracked| region_ptr_eq(&tracked.region, region))
        {
            self.tracked = None;
        }
    }

    // ------------------------------------------------------------------
    // Small helpers.

    fn take_tag(&mut self) -> String {
        let tag = self.next_tag.to_string();
        self.next_tag += 1;
        tag
    }

    fn emit_frame_event(&mut self, event: FrameEvent) {
        if let Some(frame_event_fn) = self.on_frame_event.as_mut() {
            frame_event_fn(event);
        }
    }

    fn with_live<R>(&self, body: impl FnOnce(&mut LiveRegion) -> R) -> Option<R> {
        let mut region = self.live.borrow_mut();
        region.as_live_mut().map(body)
    }

    /// All Regions in document order, oldest first. The live Region is
    /// always the tail.
    pub fn region_handles(&self) -> &[RegionRc] {
        &self.regions
    }
}
