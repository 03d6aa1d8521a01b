//! Static keysym table used by the keyboard encoder and advertised to
//! the server in `hello` as `xkbmap_keycodes`.

use std::collections::BTreeMap;

/// One row of the keymap: what the server is told about a keysym.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    /// Key value sent in `key-action`.
    pub keyval: u32,
    /// Symbolic X11 key name.
    pub name: String,
    /// Hardware keycode.
    pub keycode: u32,
    pub group: u32,
    pub level: u32,
}

impl KeyEntry {
    fn new(keyval: u32, name: impl Into<String>, keycode: u32) -> Self {
        Self {
            keyval,
            name: name.into(),
            keycode,
            group: 0,
            level: 0,
        }
    }
}

/// Keysym → [`KeyEntry`] lookup.
#[derive(Debug, Clone)]
pub struct Keymap {
    entries: BTreeMap<u32, KeyEntry>,
}

/// Printable ASCII whose X11 names are not the character itself.
const NAMED_ASCII: &[(u32, &str)] = &[
    (32, "space"),
    (33, "exclam"),
    (35, "numbersign"),
    (36, "dollar"),
    (37, "percent"),
    (38, "ampersand"),
    (40, "parenleft"),
    (41, "parenright"),
    (42, "asterisk"),
    (43, "plus"),
    (45, "minus"),
    (61, "equal"),
    (94, "asciicircum"),
    (95, "underscore"),
    (96, "grave"),
    (126, "asciitilde"),
];

/// Function and modifier keys, keyval == keysym == keycode.
const SPECIAL_KEYS: &[(u32, &str)] = &[
    (0xff08, "BackSpace"),
    (0xff09, "Tab"),
    (0xff0d, "Return"),
    (0xffe1, "Shift_L"),
    (0xffe2, "Shift_R"),
    (0xffe3, "Control_L"),
    (0xffe4, "Control_R"),
    (0xffe9, "Alt_L"),
    (0xffea, "Alt_R"),
];

impl Default for Keymap {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        for sym in 32u32..127 {
            let name = NAMED_ASCII
                .iter()
                .find(|(code, _)| *code == sym)
                .map(|(_, name)| (*name).to_string())
                .or_else(|| char::from_u32(sym).map(String::from))
                .unwrap_or_default();
            entries.insert(sym, KeyEntry::new(sym, name, sym));
        }
        // Server-side layout quirks.
        entries.insert(64, KeyEntry::new(34, "at", 34));
        entries.insert(126, KeyEntry::new(126, "asciitilde", 49));
        for &(sym, name) in SPECIAL_KEYS {
            entries.insert(sym, KeyEntry::new(sym, name, sym));
        }
        Self { entries }
    }
}

impl Keymap {
    pub fn lookup(&self, keysym: u32) -> Option<&KeyEntry> {
        self.entries.get(&keysym)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows in keysym order, shaped `(keyval, name, keycode, group, level)`.
    pub fn xkbmap_keycodes(&self) -> Vec<(u32, &str, u32, u32, u32)> {
        self.entries
            .values()
            .map(|e| (e.keyval, e.name.as_str(), e.keycode, e.group, e.level))
            .collect()
    }
}

// ── Modifiers ────────────────────────────────────────────────────

/// Modifier state attached to a key event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        control: false,
        alt: false,
    };

    /// Active modifier names in wire order: shift, control, alt.
    pub fn names(&self) -> Vec<&'static str> {
        [
            (self.shift, "shift"),
            (self.control, "control"),
            (self.alt, "alt"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}
