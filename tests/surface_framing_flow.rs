use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use frameterm::{
    CommandLineAction, Emulator, EmulatorDimensions, FrameEvent, FrameIcon, MatchKind,
    RegionKind, RenderEvent, SurfaceConfig, SurfaceMetrics, TerminalSurface,
};

const COOKIE: &str = "c00kie";

#[derive(Default)]
struct EmulatorState {
    columns: i64,
    rows: i64,
    cursor_x: i64,
    cursor_y: i64,
    screen: Vec<String>,
    pending_scrollback: Vec<String>,
    dirty: bool,
    new_line_calls: usize,
}

/// Scripted character-grid emulator. Printed lines sit on the screen until
/// the surface moves them above the cursor into scrollback.
#[derive(Clone, Default)]
struct HarnessEmulator {
    state: Rc<RefCell<EmulatorState>>,
}

impl HarnessEmulator {
    fn new(columns: i64) -> Self {
        let emulator = Self::default();
        emulator.state.borrow_mut().columns = columns;
        emulator
    }

    /// Print a full line; the cursor moves to the start of the next row.
    fn print_line(&self, text: &str) {
        let mut state = self.state.borrow_mut();
        state.screen.push(text.to_string());
        state.cursor_y = state.screen.len() as i64;
        state.cursor_x = 0;
        state.dirty = true;
    }

    /// Leave the cursor mid-way through a partial line.
    fn print_partial(&self, text: &str) {
        let mut state = self.state.borrow_mut();
        state.cursor_y = state.screen.len() as i64;
        state.cursor_x = text.len() as i64;
        state.screen.push(text.to_string());
        state.dirty = true;
    }

    /// Rows scrolling off the top outside any command boundary.
    fn scroll_out(&self, lines: &[&str]) {
        let mut state = self.state.borrow_mut();
        state
            .pending_scrollback
            .extend(lines.iter().map(|line| line.to_string()));
        state.dirty = true;
    }

    fn new_line_calls(&self) -> usize {
        self.state.borrow().new_line_calls
    }
}

impl Emulator for HarnessEmulator {
    fn move_rows_above_cursor_to_scrollback(&mut self) {
        let mut state = self.state.borrow_mut();
        let rows: Vec<String> = state.screen.drain(..).collect();
        state.pending_scrollback.extend(rows);
        state.cursor_y = 0;
        state.cursor_x = 0;
        state.dirty = true;
    }

    fn flush_render_queue(&mut self) -> Option<RenderEvent> {
        let mut state = self.state.borrow_mut();
        if !state.dirty && state.pending_scrollback.is_empty() {
            return None;
        }
        state.dirty = false;
        Some(RenderEvent {
            columns: state.columns,
            rows: state.rows,
            refresh_start_row: 0,
            refresh_end_row: state.rows,
            scrollback_lines: std::mem::take(&mut state.pending_scrollback),
        })
    }

    fn refresh_screen(&mut self) {
        self.state.borrow_mut().dirty = true;
    }

    fn dimensions(&self) -> EmulatorDimensions {
        let state = self.state.borrow();
        EmulatorDimensions {
            columns: state.columns,
            rows: state.rows,
            cursor_x: state.cursor_x,
            cursor_y: state.cursor_y,
        }
    }

    fn line_text(&self, row: i64) -> Option<String> {
        self.state.borrow().screen.get(row as usize).cloned()
    }

    fn new_line(&mut self) {
        let mut state = self.state.borrow_mut();
        state.new_line_calls += 1;
        state.cursor_y += 1;
        state.cursor_x = 0;
    }

    fn resize(&mut self, columns: i64, rows: i64) {
        let mut state = self.state.borrow_mut();
        state.columns = columns;
        state.rows = rows;
        state.dirty = true;
    }
}

struct Harness {
    surface: TerminalSurface<HarnessEmulator>,
    emulator: HarnessEmulator,
    frame_events: Rc<RefCell<Vec<FrameEvent>>>,
    pty_output: Rc<RefCell<String>>,
}

fn harness(scrollback_budget: i64) -> Harness {
    let emulator = HarnessEmulator::new(80);
    let config = SurfaceConfig {
        scrollback_budget,
        metrics: SurfaceMetrics {
            line_height: 10,
            frame_header_height: 20,
        },
        command_line_actions: vec![CommandLineAction {
            pattern: "cd".to_string(),
            match_kind: MatchKind::Name,
            frame: false,
        }],
    };
    let mut surface =
        TerminalSurface::new(emulator.clone(), config, COOKIE).expect("build surface");
    surface.scroll_area().set_container_height(500);

    let frame_events: Rc<RefCell<Vec<FrameEvent>>> = Rc::new(RefCell::new(Vec::new()));
    let events = frame_events.clone();
    surface.set_frame_event_fn(move |event| events.borrow_mut().push(event));

    let pty_output: Rc<RefCell<String>> = Rc::new(RefCell::new(String::new()));
    let output = pty_output.clone();
    surface.set_pty_data_fn(move |data| output.borrow_mut().push_str(data));

    Harness {
        surface,
        emulator,
        frame_events,
        pty_output,
    }
}

impl Harness {
    fn control(&mut self, params: &[&str], data: &str) {
        self.surface.handle_control_start(params);
        if !data.is_empty() {
            self.surface.handle_control_data(data);
        }
        self.surface.handle_control_end();
    }

    fn region_kinds(&self) -> Vec<RegionKind> {
        self.surface
            .region_handles()
            .iter()
            .map(|region| region.borrow().kind())
            .collect()
    }

    fn newest_frame_summary(&self) -> Option<(String, Option<String>, Vec<String>)> {
        self.surface
            .region_handles()
            .iter()
            .rev()
            .find_map(|region| {
                let region = region.borrow();
                region.as_frame().map(|frame| {
                    (
                        frame.command_line().to_string(),
                        frame.return_code().map(str::to_string),
                        frame.content().to_vec(),
                    )
                })
            })
    }
}

#[test]
fn framed_command_runs_from_open_to_stamped_close() {
    let mut harness = harness(1_000_000);

    harness.emulator.print_line("$ make all");
    harness.control(&[COOKIE, "2"], "make all");

    // Prompt froze into scrollback, frame opened, fresh live Region follows.
    assert_eq!(
        harness.region_kinds(),
        vec![RegionKind::Scrollback, RegionKind::Framed, RegionKind::Live]
    );

    harness.emulator.print_line("compiling...");
    harness.emulator.print_line("done");
    harness.control(&[COOKIE, "3"], "0");

    let (command_line, return_code, content) =
        harness.newest_frame_summary().expect("closed frame");
    assert_eq!(command_line, "make all");
    assert_eq!(return_code.as_deref(), Some("0"));
    assert_eq!(content, vec!["compiling...".to_string(), "done".to_string()]);

    assert_eq!(
        *harness.frame_events.borrow(),
        vec![
            FrameEvent::Opened {
                tag: "1".to_string(),
            },
            FrameEvent::Closed {
                tag: "1".to_string(),
                return_code: "0".to_string(),
            },
        ]
    );
    assert_eq!(harness.surface.frame_contents("1"), Some(content));
}

#[test]
fn failed_no_frame_command_is_framed_retroactively() {
    let mut harness = harness(1_000_000);

    harness.emulator.print_line("$ cd /missing");
    harness.control(&[COOKIE, "2"], "cd /missing");
    assert!(harness.frame_events.borrow().is_empty());

    harness.emulator.print_line("cd: no such directory");
    harness.control(&[COOKIE, "3"], "1");

    let (command_line, return_code, content) =
        harness.newest_frame_summary().expect("retroactive frame");
    assert_eq!(command_line, "cd /missing");
    assert_eq!(return_code.as_deref(), Some("1"));
    assert_eq!(content, vec!["cd: no such directory".to_string()]);

    // The prompt line itself stays in scrollback, outside the frame.
    let scrollback_lines: Vec<String> = harness
        .surface
        .region_handles()
        .iter()
        .flat_map(|region| {
            let region = region.borrow();
            region
                .as_live()
                .filter(|live| !live.is_attached())
                .map(|live| live.lines().to_vec())
                .unwrap_or_default()
        })
        .collect();
    assert_eq!(scrollback_lines, vec!["$ cd /missing".to_string()]);
}

#[test]
fn successful_no_frame_command_leaves_no_frame() {
    let mut harness = harness(1_000_000);

    harness.emulator.print_line("$ cd /tmp");
    harness.control(&[COOKIE, "2"], "cd /tmp");
    harness.control(&[COOKIE, "3"], "0");

    assert_eq!(harness.newest_frame_summary(), None);
    assert_eq!(harness.region_kinds(), vec![RegionKind::Live]);
    assert!(harness.frame_events.borrow().is_empty());
}

#[test]
fn wrong_cookie_sequences_leave_the_surface_untouched() {
    let mut harness = harness(1_000_000);

    harness.control(&["intruder", "2"], "make all");
    harness.control(&["intruder", "3"], "1");

    assert_eq!(harness.region_kinds(), vec![RegionKind::Live]);
    assert!(harness.frame_events.borrow().is_empty());
}

#[test]
fn command_starts_inside_an_open_frame_are_ignored() {
    let mut harness = harness(1_000_000);

    harness.emulator.print_line("$ make all");
    harness.control(&[COOKIE, "2"], "make all");
    assert_eq!(harness.frame_events.borrow().len(), 1);

    // A nested start marker while the frame is still open: dropped.
    harness.control(&[COOKIE, "2"], "make nested");
    assert_eq!(harness.frame_events.borrow().len(), 1);
    assert_eq!(
        harness
            .region_kinds()
            .iter()
            .filter(|kind| **kind == RegionKind::Framed)
            .count(),
        1
    );
}

#[test]
fn request_frame_re_emits_contents_down_the_pty() {
    let mut harness = harness(1_000_000);

    harness.emulator.print_line("$ make all");
    harness.control(&[COOKIE, "2"], "make all");
    harness.emulator.print_line("done");
    harness.control(&[COOKIE, "3"], "0");

    harness.control(&[COOKIE, "4"], "1");
    let output = harness.pty_output.borrow().clone();
    // One base64 line for "done" plus the terminator.
    assert_eq!(output, "#ZG9uZQo=\n#;0\n");
}

#[test]
fn request_for_an_unknown_frame_sends_just_the_terminator() {
    let mut harness = harness(1_000_000);
    harness.control(&[COOKIE, "4"], "99");
    assert_eq!(*harness.pty_output.borrow(), "#;0\n".to_string());
}

#[test]
fn show_file_splices_a_preview_frame() {
    let mut harness = harness(1_000_000);

    let metadata = r#"{"filename":"notes.txt","mimeType":"text/plain"}"#;
    let body = {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        STANDARD.encode("alpha\nbeta\n")
    };
    let payload = format!("{metadata}{body}");
    harness.control(&[COOKIE, "5", &metadata.len().to_string()], &payload);

    let (title, return_code, content) =
        harness.newest_frame_summary().expect("preview frame");
    assert_eq!(title, "notes.txt");
    assert_eq!(return_code.as_deref(), Some("0"));
    assert_eq!(content, vec!["alpha".to_string(), "beta".to_string()]);

    let newest_frame = harness
        .surface
        .region_handles()
        .iter()
        .rev()
        .find(|region| region.borrow().as_frame().is_some())
        .cloned()
        .expect("frame handle");
    let region = newest_frame.borrow();
    let frame = region.as_frame().expect("frame");
    assert_eq!(frame.icon(), FrameIcon::Success);
}

#[test]
fn unknown_mime_show_file_is_dropped() {
    let mut harness = harness(1_000_000);

    let metadata = r#"{"filename":"blob.xyz"}"#;
    let payload = format!("{metadata}AAAA");
    harness.control(&[COOKIE, "5", &metadata.len().to_string()], &payload);

    assert_eq!(harness.newest_frame_summary(), None);
    assert!(harness.frame_events.borrow().is_empty());
}

#[test]
fn show_file_size_splitting_a_character_is_dropped() {
    let mut harness = harness(1_000_000);

    // Byte 14 lands inside the two-byte "é"; the sequence must be dropped,
    // not panic the surface.
    let payload = format!("{}AAAA", r#"{"filename":"é.txt"}"#);
    harness.control(&[COOKIE, "5", "14"], &payload);

    assert_eq!(harness.newest_frame_summary(), None);
    assert_eq!(harness.region_kinds(), vec![RegionKind::Live]);
    assert!(harness.frame_events.borrow().is_empty());
}

#[test]
fn detached_refresh_drains_in_small_batches() {
    let mut harness = harness(1_000_000);

    for i in 1..=4 {
        harness.emulator.print_line(&format!("$ make {i}"));
        harness.control(&[COOKIE, "2"], &format!("make {i}"));
        for line in 0..30 {
            harness.emulator.print_line(&format!("out {line}"));
        }
        harness.control(&[COOKIE, "3"], "0");
    }

    // Shrinking the viewport queues every unmounted Region for
    // re-measurement instead of re-sampling them all at once.
    harness.surface.set_container_height(400);

    let mut pump_calls = 0;
    loop {
        pump_calls += 1;
        if !harness.surface.pump_detached_refresh() {
            break;
        }
    }
    assert_eq!(pump_calls, 2);

    // Four 10px prompt lines plus four frames of 300px content under a
    // 20px header; the layout holds once the queue drains.
    assert_eq!(harness.surface.scroll_area().total_virtual_height(), 1320);
    assert!(!harness.surface.pump_detached_refresh());
}

#[test]
fn mid_line_cursor_is_nudged_before_tracking() {
    let mut harness = harness(1_000_000);

    harness.emulator.print_partial("$ cd /tmp");
    harness.control(&[COOKIE, "2"], "cd /tmp");
    assert_eq!(harness.emulator.new_line_calls(), 1);
}

#[test]
fn scrollback_over_budget_is_trimmed_back() {
    let mut harness = harness(100);

    let lines: Vec<String> = (0..30).map(|i| format!("line {i}")).collect();
    let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    harness.emulator.scroll_out(&line_refs);
    harness.surface.flush_render();

    // 30 lines x 10px is far past the 110px hard limit; the live Region is
    // trimmed back to exactly the 100px budget.
    assert_eq!(harness.surface.scroll_area().total_virtual_height(), 100);
}

#[test]
fn clear_scrollback_keeps_only_the_live_screen() {
    let mut harness = harness(1_000_000);

    harness.emulator.print_line("$ make all");
    harness.control(&[COOKIE, "2"], "make all");
    harness.emulator.print_line("done");
    harness.control(&[COOKIE, "3"], "0");

    harness.surface.clear_scrollback();
    assert_eq!(harness.surface.scroll_area().total_virtual_height(), 0);
    assert_eq!(harness.region_kinds(), vec![RegionKind::Live]);
}
