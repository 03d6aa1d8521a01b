//! Scripted input → engine input calls.
//!
//! The headless client reads input events as text lines, one event per
//! line:
//!
//! ```text
//! key <keysym|char> <down|up> [shift] [control] [alt]
//! button <x> <y> <down|up> <mask>
//! move <x> <y>
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use tracing::{debug, info};
use xpra_core::{Engine, InputGrab, Modifiers};

/// One parsed input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Key {
        keysym: u32,
        down: bool,
        modifiers: Modifiers,
    },
    Button {
        x: i32,
        y: i32,
        down: bool,
        mask: u32,
    },
    Move {
        x: i32,
        y: i32,
    },
}

fn parse_down(word: Option<&str>) -> Result<bool, String> {
    match word {
        Some("down") => Ok(true),
        Some("up") => Ok(false),
        other => Err(format!("expected down|up, got {other:?}")),
    }
}

fn parse_num<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T, String> {
    word.and_then(|w| w.parse().ok())
        .ok_or_else(|| format!("missing or invalid {what}"))
}

/// A single character stands for its code point; anything else must be
/// a number (decimal or `0x` hex).
fn parse_keysym(word: Option<&str>) -> Result<u32, String> {
    let word = word.ok_or("missing keysym")?;
    let mut chars = word.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(u32::from(c));
    }
    let parsed = match word.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => word.parse(),
    };
    parsed.map_err(|e| format!("invalid keysym {word:?}: {e}"))
}

/// Parse one script line. `Ok(None)` for blanks and comments.
pub fn parse_line(line: &str) -> Result<Option<InputAction>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let action = match words.next() {
        Some("key") => {
            let keysym = parse_keysym(words.next())?;
            let down = parse_down(words.next())?;
            let mut modifiers = Modifiers::NONE;
            for word in words {
                match word {
                    "shift" => modifiers.shift = true,
                    "control" | "ctrl" => modifiers.control = true,
                    "alt" => modifiers.alt = true,
                    other => return Err(format!("unknown modifier {other:?}")),
                }
            }
            InputAction::Key {
                keysym,
                down,
                modifiers,
            }
        }
        Some("button") => InputAction::Button {
            x: parse_num(words.next(), "x")?,
            y: parse_num(words.next(), "y")?,
            down: parse_down(words.next())?,
            mask: parse_num(words.next(), "mask")?,
        },
        Some("move") => InputAction::Move {
            x: parse_num(words.next(), "x")?,
            y: parse_num(words.next(), "y")?,
        },
        Some(other) => return Err(format!("unknown input event {other:?}")),
        None => return Ok(None),
    };
    Ok(Some(action))
}

/// Feed an action to the engine. Returns whether a command was emitted.
pub fn apply(engine: &mut Engine, action: InputAction) -> bool {
    let emitted = match action {
        InputAction::Key {
            keysym,
            down,
            modifiers,
        } => engine.key_event(keysym, down, modifiers),
        InputAction::Button { x, y, down, mask } => engine.mouse_button(x, y, down, mask),
        InputAction::Move { x, y } => engine.mouse_move(x, y),
    };
    debug!("{action:?} emitted={emitted}");
    emitted
}

// ── Grab ─────────────────────────────────────────────────────────

/// Tracks whether the session currently holds input focus.
#[derive(Debug, Default)]
pub struct InputCapture {
    grabbed: bool,
}

impl InputCapture {
    pub fn is_grabbed(&self) -> bool {
        self.grabbed
    }
}

impl InputGrab for InputCapture {
    fn grab(&mut self) {
        if !self.grabbed {
            info!("input grabbed");
        }
        self.grabbed = true;
    }

    fn ungrab(&mut self) {
        if self.grabbed {
            info!("input released");
        }
        self.grabbed = false;
    }
}
