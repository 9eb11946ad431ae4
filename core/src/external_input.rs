use crate::cell_id::CellId;
use crate::puzzle::{normalize_glyph, WordDescriptor};

/// One cell write produced by an external input value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    pub cell: CellId,
    pub position: usize,
    pub glyph: String,
}

/// Maps `value` onto the cells of `word`.
///
/// Only the first `min(value chars, word.length)` cells are produced; cells past
/// the end of `value` are never touched.
pub fn plan_external_input(word: &WordDescriptor, value: &str) -> Vec<CellWrite> {
    value
        .chars()
        .take(word.length)
        .enumerate()
        .filter_map(|(position, ch)| {
            let cell = word.cell_at(position)?;
            let glyph = if ch == ' ' {
                String::new()
            } else {
                normalize_glyph(&ch.to_string())
            };
            Some(CellWrite {
                cell,
                position,
                glyph,
            })
        })
        .collect()
}

/// Clamps a composed value to the word length and uppercases it, the way the
/// native widget stores it.
pub fn compose_native_value(word: &WordDescriptor, value: &str) -> String {
    value
        .chars()
        .take(word.length)
        .flat_map(char::to_uppercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKey {
    Backspace,
    Escape,
    Commit,
    Passthrough,
}

pub fn map_overlay_key(key: &str) -> OverlayKey {
    match key {
        "Backspace" | "Delete" => OverlayKey::Backspace,
        "Escape" | "Esc" => OverlayKey::Escape,
        "Enter" => OverlayKey::Commit,
        _ => OverlayKey::Passthrough,
    }
}
