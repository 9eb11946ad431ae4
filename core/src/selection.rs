/// `Unselected -> Selected(word) -> Committing -> Unselected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordSelection {
    #[default]
    Unselected,
    Selected { word: usize, cursor: usize },
    Committing { word: usize },
}

impl WordSelection {
    pub fn word(&self) -> Option<usize> {
        match *self {
            WordSelection::Unselected => None,
            WordSelection::Selected { word, .. } | WordSelection::Committing { word } => Some(word),
        }
    }

    pub fn cursor(&self) -> Option<usize> {
        match *self {
            WordSelection::Selected { cursor, .. } => Some(cursor),
            _ => None,
        }
    }

    pub fn select(&mut self, word: usize, cursor: usize) {
        *self = WordSelection::Selected { word, cursor };
    }

    /// Moves a selected word into `Committing`. Returns the word being committed.
    ///
    /// Committing a word the engine accepted without a prior selection is
    /// allowed; `fallback` names that word.
    pub fn begin_commit(&mut self, fallback: Option<usize>) -> Option<usize> {
        let word = match *self {
            WordSelection::Selected { word, .. } => Some(word),
            WordSelection::Committing { word } => Some(word),
            WordSelection::Unselected => fallback,
        }?;
        *self = WordSelection::Committing { word };
        Some(word)
    }

    pub fn finish_commit(&mut self) {
        if matches!(self, WordSelection::Committing { .. }) {
            *self = WordSelection::Unselected;
        }
    }

    pub fn deselect(&mut self) {
        *self = WordSelection::Unselected;
    }

    pub fn set_cursor(&mut self, position: usize, length: usize) {
        if let WordSelection::Selected { cursor, .. } = self {
            *cursor = position.min(length.saturating_sub(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_cycle_returns_to_unselected() {
        let mut selection = WordSelection::default();
        selection.select(3, 0);
        assert_eq!(selection.word(), Some(3));
        assert_eq!(selection.begin_commit(None), Some(3));
        assert_eq!(selection, WordSelection::Committing { word: 3 });
        assert_eq!(selection.cursor(), None);
        selection.finish_commit();
        assert_eq!(selection, WordSelection::Unselected);
    }

    #[test]
    fn commit_without_selection_uses_fallback() {
        let mut selection = WordSelection::Unselected;
        assert_eq!(selection.begin_commit(None), None);
        assert_eq!(selection, WordSelection::Unselected);
        assert_eq!(selection.begin_commit(Some(1)), Some(1));
    }

    #[test]
    fn cursor_stays_inside_word() {
        let mut selection = WordSelection::Unselected;
        selection.select(0, 0);
        selection.set_cursor(9, 4);
        assert_eq!(selection.cursor(), Some(3));
        selection.set_cursor(2, 4);
        assert_eq!(selection.cursor(), Some(2));
    }
}
