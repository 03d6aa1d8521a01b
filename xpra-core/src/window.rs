//! Remote window records.
//!
//! Only geometry matters to the engine: window origin + local offset
//! gives the absolute pointer position sent to the server.

use std::collections::BTreeMap;

use crate::value::Value;

/// The only window id the engine currently tracks.
pub const PRIMARY_WINDOW: i64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct WindowRecord {
    pub id: i64,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    /// Opaque property mapping from `new-window`.
    pub properties: Value,
    /// Placement hint echoed back in `map-window`.
    pub placement: Value,
}

#[derive(Debug, Default)]
pub struct WindowTable {
    windows: BTreeMap<i64, WindowRecord>,
}

impl WindowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, returning the previous one.
    pub fn insert(&mut self, record: WindowRecord) -> Option<WindowRecord> {
        self.windows.insert(record.id, record)
    }

    pub fn get(&self, id: i64) -> Option<&WindowRecord> {
        self.windows.get(&id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut WindowRecord> {
        self.windows.get_mut(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.windows.contains_key(&id)
    }

    pub fn remove(&mut self, id: i64) -> Option<WindowRecord> {
        self.windows.remove(&id)
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Translate a window-local position to absolute coordinates.
    pub fn absolute(&self, id: i64, x: i32, y: i32) -> Option<(i64, i64)> {
        self.get(id)
            .map(|w| (w.x.saturating_add(i64::from(x)), w.y.saturating_add(i64::from(y))))
    }
}
