//! Local input → outgoing commands.

use tracing::{debug, warn};

use super::Engine;
use crate::keymap::Modifiers;
use crate::message::{self, Command};
use crate::state::ConnectionState;
use crate::window::PRIMARY_WINDOW;

/// Pointer bookkeeping across events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerState {
    /// Running button mask. Presses OR the event mask in, releases XOR it.
    pub button_mask: u32,
    /// A viewport drag is in progress.
    pub dragging: bool,
    /// Last pointer position seen during the drag.
    pub anchor: (i32, i32),
}

impl Engine {
    /// Encode a key press or release. Returns whether a command was emitted.
    pub fn key_event(&mut self, keysym: u32, down: bool, modifiers: Modifiers) -> bool {
        if !self.input_allowed("key") {
            return false;
        }
        let Some(key) = self.keymap.lookup(keysym) else {
            warn!("ignoring unmapped keysym {keysym:#x}");
            return false;
        };
        debug!("key '{}' {}", key.name, if down { "down" } else { "up" });
        let args = message::key_action(PRIMARY_WINDOW, key, down, modifiers);
        self.enqueue(Command::KeyAction, args);
        self.flush_if_ready();
        true
    }

    /// Encode a button press or release at window-local `(x, y)`.
    ///
    /// With viewport dragging enabled, a press starts a drag and the next
    /// button event ends it with a full redraw request; neither reaches the
    /// server as a button event.
    pub fn mouse_button(&mut self, x: i32, y: i32, down: bool, mask: u32) -> bool {
        if down {
            self.pointer.button_mask |= mask;
        } else {
            self.pointer.button_mask ^= mask;
        }

        if self.config.viewport_drag {
            if down && !self.pointer.dragging {
                self.pointer.dragging = true;
                self.pointer.anchor = (x, y);
                return false;
            }
            self.pointer.dragging = false;
            if self.state() == ConnectionState::Normal {
                self.send(Command::BufferRefresh, message::buffer_refresh(PRIMARY_WINDOW));
            }
            return false;
        }

        if !self.input_allowed("button") {
            return false;
        }
        let Some(button) = message::button_number(mask) else {
            debug!("button event without a button");
            return false;
        };
        let Some(pos) = self.pointer_position(x, y) else {
            return false;
        };
        self.enqueue(
            Command::ButtonAction,
            message::button_action(PRIMARY_WINDOW, button, down, pos),
        );
        self.flush_if_ready();
        true
    }

    /// Encode pointer motion. Motion is queued and never flushed eagerly.
    pub fn mouse_move(&mut self, x: i32, y: i32) -> bool {
        if self.pointer.dragging {
            let (ax, ay) = self.pointer.anchor;
            self.pointer.anchor = (x, y);
            self.display
                .viewport_change(ax.saturating_sub(x), ay.saturating_sub(y));
            return false;
        }
        if !self.input_allowed("motion") {
            return false;
        }
        let Some(pos) = self.pointer_position(x, y) else {
            return false;
        };
        self.enqueue(
            Command::PointerPosition,
            message::pointer_position(PRIMARY_WINDOW, pos),
        );
        true
    }

    /// Send every queued frame. Returns how many were sent.
    pub fn flush(&mut self) -> usize {
        if self.state() != ConnectionState::Normal || self.outgoing.is_empty() {
            return 0;
        }
        let sent = self.outgoing.len();
        for frame in self.outgoing.drain(..) {
            self.transport.send(frame);
        }
        self.stats.frames_sent += sent as u64;
        debug!("flushed {sent} frames");
        sent
    }

    fn flush_if_ready(&mut self) {
        if self.state() == ConnectionState::Normal && !self.pointer.dragging {
            self.flush();
        }
    }

    fn input_allowed(&self, what: &str) -> bool {
        if self.config.view_only {
            return false;
        }
        let state = self.state();
        if state != ConnectionState::Normal {
            debug!("dropping {what} event in state '{state}'");
            return false;
        }
        true
    }

    fn pointer_position(&self, x: i32, y: i32) -> Option<(i64, i64)> {
        let pos = self.windows.absolute(
            PRIMARY_WINDOW,
            self.display.abs_x(x),
            self.display.abs_y(y),
        );
        if pos.is_none() {
            warn!("pointer event before window {PRIMARY_WINDOW} is known");
        }
        pos
    }
}
