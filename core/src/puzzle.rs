use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::cell_id::{CellId, MAX_CELL_COORD};

pub const SCORE_BASE: f64 = 1000.0;
pub const SCORE_FILL_WEIGHT: f64 = 500.0;
pub const SCORE_HINT_PENALTY: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Across,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordDescriptor {
    pub index: usize,
    pub direction: Direction,
    pub answer: String,
    pub clue: String,
    pub origin_row: u32,
    pub origin_col: u32,
    pub length: usize,
}

impl WordDescriptor {
    pub fn cell_at(&self, position: usize) -> Option<CellId> {
        if position >= self.length {
            return None;
        }
        let offset = u32::try_from(position).ok()?;
        let (x, y) = match self.direction {
            Direction::Across => (self.origin_col.checked_add(offset)?, self.origin_row),
            Direction::Down => (self.origin_col, self.origin_row.checked_add(offset)?),
        };
        CellId::new(x, y).ok()
    }

    pub fn cells(&self) -> Vec<CellId> {
        (0..self.length).filter_map(|pos| self.cell_at(pos)).collect()
    }

    pub fn lead_cell(&self) -> Option<CellId> {
        self.cell_at(0)
    }

    pub fn position_of(&self, cell: CellId) -> Option<usize> {
        self.cells().iter().position(|candidate| *candidate == cell)
    }

    /// Answer letter expected at `position`, uppercased.
    pub fn expected_letter(&self, position: usize) -> Option<char> {
        self.answer
            .chars()
            .nth(position)
            .map(|ch| ch.to_ascii_uppercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("grid must be between 1x1 and {max}x{max}, got {width}x{height}")]
    InvalidGrid { width: u32, height: u32, max: u32 },
    #[error("word {index} leaves the {width}x{height} grid")]
    WordOutOfBounds { index: usize, width: u32, height: u32 },
    #[error("word {index} answer has {found} letters but declares length {declared}")]
    LengthMismatch {
        index: usize,
        declared: usize,
        found: usize,
    },
    #[error("word {found} listed at position {expected}")]
    IndexMismatch { expected: usize, found: usize },
}

/// Static shape of a loaded puzzle: grid size plus every answer slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuzzleLayout {
    width: u32,
    height: u32,
    words: Vec<WordDescriptor>,
    cells: Vec<CellId>,
}

impl PuzzleLayout {
    pub fn new(width: u32, height: u32, words: Vec<WordDescriptor>) -> Result<Self, LayoutError> {
        let max = MAX_CELL_COORD + 1;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(LayoutError::InvalidGrid { width, height, max });
        }
        let mut cells = BTreeSet::new();
        for (idx, word) in words.iter().enumerate() {
            if word.index != idx {
                return Err(LayoutError::IndexMismatch {
                    expected: idx,
                    found: word.index,
                });
            }
            let found = word.answer.chars().count();
            if found != word.length {
                return Err(LayoutError::LengthMismatch {
                    index: idx,
                    declared: word.length,
                    found,
                });
            }
            let word_cells = word.cells();
            if word_cells.len() != word.length
                || word_cells.iter().any(|cell| !cell.within(width, height))
            {
                return Err(LayoutError::WordOutOfBounds {
                    index: idx,
                    width,
                    height,
                });
            }
            cells.extend(word_cells);
        }
        Ok(Self {
            width,
            height,
            words,
            cells: cells.into_iter().collect(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn words(&self) -> &[WordDescriptor] {
        &self.words
    }

    pub fn word(&self, index: usize) -> Option<&WordDescriptor> {
        self.words.get(index)
    }

    /// Distinct cells covered by at least one word, in id order.
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    pub fn total_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn contains(&self, cell: CellId) -> bool {
        self.cells.binary_search(&cell).is_ok()
    }

    /// Expected letter for a cell, taken from the first word that covers it.
    pub fn solution_at(&self, cell: CellId) -> Option<char> {
        self.words.iter().find_map(|word| {
            word.position_of(cell)
                .and_then(|pos| word.expected_letter(pos))
        })
    }
}

/// Live fill state of the grid as seen by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleState {
    pub grid_state: BTreeMap<CellId, String>,
    pub filled_cells: usize,
    pub total_cells: usize,
    pub hints_used: u32,
    pub start_time: f64,
}

impl PuzzleState {
    pub fn new(layout: &PuzzleLayout, start_time: f64) -> Self {
        Self {
            grid_state: BTreeMap::new(),
            filled_cells: 0,
            total_cells: layout.total_cells(),
            hints_used: 0,
            start_time,
        }
    }

    pub fn glyph(&self, cell: CellId) -> &str {
        self.grid_state.get(&cell).map(String::as_str).unwrap_or("")
    }

    /// Stores `glyph` for `cell`; returns whether the stored value changed.
    pub fn set_glyph(&mut self, cell: CellId, glyph: &str) -> bool {
        let glyph = normalize_glyph(glyph);
        if self.glyph(cell) == glyph {
            return false;
        }
        if glyph.is_empty() {
            self.grid_state.remove(&cell);
        } else {
            self.grid_state.insert(cell, glyph);
        }
        true
    }

    pub fn recount(&mut self, layout: &PuzzleLayout) {
        self.total_cells = layout.total_cells();
        self.filled_cells = layout
            .cells()
            .iter()
            .filter(|cell| !self.glyph(**cell).is_empty())
            .count()
            .min(self.total_cells);
    }

    pub fn progress_percent(&self) -> u32 {
        progress_percent(self.filled_cells, self.total_cells)
    }

    pub fn is_solved(&self, layout: &PuzzleLayout) -> bool {
        if layout.total_cells() == 0 {
            return false;
        }
        layout.cells().iter().all(|cell| {
            let glyph = self.glyph(*cell);
            match layout.solution_at(*cell) {
                Some(expected) => glyph.chars().eq(std::iter::once(expected)),
                None => false,
            }
        })
    }

    pub fn word_fill(&self, word: &WordDescriptor) -> String {
        word.cells()
            .iter()
            .map(|cell| self.glyph(*cell).chars().next().unwrap_or(' '))
            .collect::<String>()
            .trim_end()
            .to_string()
    }
}

/// Uppercases and keeps only the first visible character of `raw`.
pub fn normalize_glyph(raw: &str) -> String {
    raw.chars()
        .find(|ch| !ch.is_whitespace() && *ch != '\u{a0}')
        .map(|ch| ch.to_uppercase().collect())
        .unwrap_or_default()
}

pub fn progress_percent(filled: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let filled = filled.min(total);
    (100.0 * filled as f64 / total as f64).round() as u32
}

pub fn compute_score(filled: usize, total: usize, hints_used: u32) -> u32 {
    let ratio = if total == 0 {
        0.0
    } else {
        filled.min(total) as f64 / total as f64
    };
    let raw = SCORE_BASE + SCORE_FILL_WEIGHT * ratio - SCORE_HINT_PENALTY * hints_used as f64;
    raw.max(0.0).round() as u32
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub total_attempts: u32,
    pub correct_attempts: u32,
    pub per_word_error_count: HashMap<usize, u32>,
}

impl ValidationStats {
    /// Records one commit of `word`; returns the consecutive error count after it.
    pub fn record(&mut self, word: usize, correct: bool) -> u32 {
        self.total_attempts = self.total_attempts.saturating_add(1);
        if correct {
            self.correct_attempts = self.correct_attempts.saturating_add(1);
            self.per_word_error_count.remove(&word);
            return 0;
        }
        let count = self.per_word_error_count.entry(word).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn reset_word(&mut self, word: usize) {
        self.per_word_error_count.remove(&word);
    }

    pub fn accuracy(&self) -> f64 {
        if self.total_attempts == 0 {
            return 1.0;
        }
        self.correct_attempts as f64 / self.total_attempts as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_clamps_at_zero() {
        assert_eq!(compute_score(10, 10, 0), 1500);
        assert_eq!(compute_score(5, 10, 2), 1150);
        assert_eq!(compute_score(0, 10, 40), 0);
    }

    #[test]
    fn progress_rounds_and_handles_empty_grid() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(0, 0), 0);
    }

    #[test]
    fn glyph_normalization() {
        assert_eq!(normalize_glyph("a"), "A");
        assert_eq!(normalize_glyph("\u{a0}"), "");
        assert_eq!(normalize_glyph(" bc"), "B");
    }

    #[test]
    fn stats_track_consecutive_errors() {
        let mut stats = ValidationStats::default();
        assert_eq!(stats.record(2, false), 1);
        assert_eq!(stats.record(2, false), 2);
        assert_eq!(stats.record(1, false), 1);
        assert_eq!(stats.record(2, true), 0);
        assert_eq!(stats.record(2, false), 1);
        assert_eq!(stats.total_attempts, 5);
        assert_eq!(stats.correct_attempts, 1);
    }
}
