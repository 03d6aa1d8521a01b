//! Headless collaborators - a display that records what it would draw,
//! and a status listener that logs.

use tracing::{debug, error, info, warn};
use xpra_core::{ConnectionState, Display, DrawImage, DrawUpdate, StatusListener, XpraError};

/// Counts and logs draw updates instead of rendering them.
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    width: u32,
    height: u32,
    frames: u64,
    bytes: u64,
    /// Accumulated viewport pan.
    offset: (i64, i64),
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn offset(&self) -> (i64, i64) {
        self.offset
    }
}

impl Display for HeadlessDisplay {
    fn render_mode(&self) -> Result<String, XpraError> {
        Ok("headless".into())
    }

    fn resize(&mut self, width: u32, height: u32) {
        info!("display resized to {width}x{height}");
        self.width = width;
        self.height = height;
    }

    fn render_enqueue(&mut self, image: DrawImage) {
        let u = &image.update;
        if u.x.saturating_add(i64::from(u.width)) > i64::from(self.width)
            || u.y.saturating_add(i64::from(u.height)) > i64::from(self.height)
        {
            warn!(
                "draw {} at {},{} {}x{} exceeds {}x{}",
                u.sequence, u.x, u.y, u.width, u.height, self.width, self.height
            );
        }
        self.frames += 1;
        self.bytes += image.data.len() as u64;
        debug!(
            "draw {}: {} {}x{} at {},{} ({} bytes)",
            u.sequence,
            u.coding,
            u.width,
            u.height,
            u.x,
            u.y,
            image.data.len()
        );
    }

    fn clear(&mut self) {
        if self.frames > 0 {
            info!("display cleared after {} draws, {} bytes", self.frames, self.bytes);
        }
        self.frames = 0;
        self.bytes = 0;
        self.offset = (0, 0);
    }

    fn set_default_cursor(&mut self) {}

    fn viewport_change(&mut self, dx: i32, dy: i32) {
        self.offset.0 += i64::from(dx);
        self.offset.1 += i64::from(dy);
        debug!("viewport offset {:?}", self.offset);
    }
}

// ── Status ───────────────────────────────────────────────────────

/// Logs every engine notification.
#[derive(Debug, Default)]
pub struct LogStatus;

impl StatusListener for LogStatus {
    fn on_state_change(&mut self, state: ConnectionState, old: ConnectionState, message: Option<&str>) {
        let message = message.unwrap_or("");
        match state {
            ConnectionState::Failed | ConnectionState::Fatal => {
                error!("[{old} -> {state}] {message}");
            }
            _ => info!("[{old} -> {state}] {message}"),
        }
    }

    fn on_fb_resize(&mut self, width: u32, height: u32) {
        info!("remote framebuffer is {width}x{height}");
    }

    fn on_update_complete(&mut self, update: &DrawUpdate) {
        debug!("update {} complete", update.sequence);
    }

    fn on_bell(&mut self, wid: i64) {
        info!("bell from window {wid}");
    }

    fn on_clipboard(&mut self, text: &str) {
        info!("clipboard: {} chars", text.chars().count());
    }
}
