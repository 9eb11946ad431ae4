use crate::cell_id::CellId;
use crate::config::BridgeConfig;
use crate::engine::{CellPulse, EngineError, EngineEvent, EntryPoint, LegacyEngine};
use crate::external_input::{compose_native_value, plan_external_input};
use crate::protocol::{
    AgentMsg, CellUpdateData, CompleteData, DimensionsData, ExternalInputMode, GridUpdatedData,
    HintUsedData, HostMsg, IframeReadyData, LetterValidatedData, LoadStateData, ProgressData,
    SuggestHintData, WordRevealedData, WordSelectedData,
};
use crate::puzzle::{
    compute_score, normalize_glyph, PuzzleLayout, PuzzleState, ValidationStats, WordDescriptor,
};
use crate::render_mode::RenderMode;
use crate::selection::WordSelection;

/// Work the session hands back to its runtime after each call.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    Emit(AgentMsg),
    /// Grid geometry may have shifted; sizing should run again.
    Relayout,
    ExternalInput(Option<ExternalInputMode>),
    /// Lead cell of the active word, `None` when nothing is selected.
    FocusWord(Option<CellId>),
}

/// Bridge state for one embedded document.
///
/// Every operation mutates the session synchronously and queues
/// [`SessionEffect`]s; the caller drains them with [`BridgeSession::take_effects`]
/// once it no longer holds the session borrowed.
pub struct BridgeSession<E> {
    engine: E,
    config: BridgeConfig,
    render_mode: RenderMode,
    layout: PuzzleLayout,
    state: PuzzleState,
    stats: ValidationStats,
    selection: WordSelection,
    composed: String,
    multiplayer: bool,
    external_input: Option<ExternalInputMode>,
    completed: bool,
    effects: Vec<SessionEffect>,
}

impl<E: LegacyEngine> BridgeSession<E> {
    pub fn new(
        engine: E,
        config: BridgeConfig,
        render_mode: RenderMode,
    ) -> Result<Self, EngineError> {
        let layout = engine.read_layout()?;
        let mut state = PuzzleState::new(&layout, engine.now_ms());
        for cell in layout.cells() {
            state.set_glyph(*cell, &engine.read_cell(*cell));
        }
        state.recount(&layout);
        let completed = state.is_solved(&layout);
        let multiplayer = config.multiplayer;
        Ok(Self {
            engine,
            config,
            render_mode,
            layout,
            state,
            stats: ValidationStats::default(),
            selection: WordSelection::default(),
            composed: String::new(),
            multiplayer,
            external_input: None,
            completed,
            effects: Vec::new(),
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn layout(&self) -> &PuzzleLayout {
        &self.layout
    }

    pub fn state(&self) -> &PuzzleState {
        &self.state
    }

    pub fn stats(&self) -> &ValidationStats {
        &self.stats
    }

    pub fn selection(&self) -> WordSelection {
        self.selection
    }

    pub fn multiplayer(&self) -> bool {
        self.multiplayer
    }

    pub fn external_input(&self) -> Option<ExternalInputMode> {
        self.external_input
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn take_effects(&mut self) -> Vec<SessionEffect> {
        std::mem::take(&mut self.effects)
    }

    /// Lead cell of the active word.
    pub fn active_lead_cell(&self) -> Option<CellId> {
        self.selection
            .word()
            .and_then(|index| self.layout.word(index))
            .and_then(WordDescriptor::lead_cell)
    }

    pub fn ready(&mut self) {
        let data = IframeReadyData {
            width: self.layout.width(),
            height: self.layout.height(),
            words: self.layout.words().to_vec(),
            render_mode: self.render_mode,
            multiplayer: self.multiplayer,
        };
        self.emit(AgentMsg::IframeReady(data));
    }

    pub fn report_dimensions(&mut self, dimensions: DimensionsData) {
        self.emit(AgentMsg::Dimensions(dimensions));
    }

    pub fn handle_engine_event(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::Returned { entry, word } => match entry {
                EntryPoint::SelectWord => {
                    let current = self.engine.current_word();
                    self.select_word(current);
                }
                EntryPoint::AcceptWord => self.commit_word(*word),
                EntryPoint::RevealHint => self.hint_revealed(*word),
                EntryPoint::CheckAnswer => self.answers_checked(),
            },
            EngineEvent::NativeInput { value } => {
                self.apply_typed(value, false);
            }
            EngineEvent::Resized => self.effects.push(SessionEffect::Relayout),
        }
    }

    pub fn handle_host_message(&mut self, message: HostMsg) {
        match message {
            HostMsg::GetState => self.emit_progress(),
            HostMsg::LoadState(data) => self.load_state(data),
            HostMsg::EnableExternalInput(data) => self.enable_external_input(data.mode),
            HostMsg::ApplyInput(data) => {
                self.apply_external_input(&data.value, data.word_index);
            }
            HostMsg::ClearWord => self.clear_word(),
            HostMsg::Backspace => self.backspace(),
            HostMsg::DisableExternalInput => self.disable_external_input(),
            HostMsg::CheckPuzzle => self.check_puzzle(),
            HostMsg::RevealLetter(data) => self.reveal_letter(data.word_index),
            HostMsg::RevealWord(data) => self.reveal_word(data.word_index),
            HostMsg::ApplyCellUpdate(data) => {
                self.apply_remote_cell_update(data.cell_id, &data.value);
            }
            HostMsg::SetMultiplayer(data) => self.set_multiplayer(data.enabled),
        }
    }

    /// Runs after the engine's own select-word handler.
    pub fn select_word(&mut self, word: Option<usize>) {
        self.composed.clear();
        match word.and_then(|index| self.layout.word(index).cloned()) {
            Some(word) => {
                let cursor = word
                    .cells()
                    .iter()
                    .position(|cell| self.state.glyph(*cell).is_empty())
                    .unwrap_or(0);
                self.selection.select(word.index, cursor);
                let data = WordSelectedData {
                    word_index: word.index,
                    direction: word.direction,
                    clue: word.clue.clone(),
                    length: word.length,
                    current_fill: self.state.word_fill(&word),
                };
                self.emit(AgentMsg::WordSelected(data));
                self.effects.push(SessionEffect::FocusWord(word.lead_cell()));
            }
            None => {
                self.selection.deselect();
                self.effects.push(SessionEffect::FocusWord(None));
            }
        }
        self.emit_progress();
        self.effects.push(SessionEffect::Relayout);
    }

    pub fn deselect(&mut self) {
        self.selection.deselect();
        self.composed.clear();
        self.effects.push(SessionEffect::FocusWord(None));
    }

    /// Writes `value` into `word` (the active word when `None`). Returns how
    /// many cells were written.
    pub fn apply_external_input(&mut self, value: &str, word: Option<usize>) -> usize {
        let Some(index) = word.or(self.selection.word()) else {
            return 0;
        };
        if self.layout.word(index).is_none() {
            return 0;
        }
        if self.engine.current_word() != Some(index) {
            self.engine.select_word(index);
        }
        if self.selection.word() != Some(index) {
            self.selection.select(index, 0);
            self.composed.clear();
            let lead = self.active_lead_cell();
            self.effects.push(SessionEffect::FocusWord(lead));
        }
        self.apply_composed(index, value, true)
    }

    /// Typing in the floating overlay; echoed to the native widget.
    pub fn apply_overlay_input(&mut self, value: &str) -> usize {
        self.apply_typed(value, true)
    }

    /// Local typing into the active word. `value` is the whole composed word;
    /// letters dropped from its end are blanked in the grid.
    fn apply_typed(&mut self, value: &str, sync_native: bool) -> usize {
        let Some(index) = self.selection.word() else {
            return 0;
        };
        let Some(word) = self.layout.word(index).cloned() else {
            return 0;
        };
        let previous_len = self.composed.chars().count();
        let written = self.apply_composed(index, value, sync_native);
        let kept = self.composed.chars().count();
        for position in kept..previous_len.min(word.length) {
            if let Some(cell) = word.cell_at(position) {
                if self.write_cell(cell, "") {
                    self.broadcast(cell);
                }
            }
        }
        self.state.recount(&self.layout);
        written
    }

    fn apply_composed(&mut self, index: usize, value: &str, sync_native: bool) -> usize {
        let Some(word) = self.layout.word(index).cloned() else {
            return 0;
        };
        let previous: Vec<char> = self.composed.chars().collect();
        let writes = plan_external_input(&word, value);
        for write in &writes {
            if self.write_cell(write.cell, &write.glyph) {
                self.broadcast(write.cell);
            }
            if let Some(letter) = write.glyph.chars().next() {
                if previous.get(write.position) != Some(&letter) {
                    self.validate_letter(&word, write.position, letter);
                }
            }
        }
        self.composed = compose_native_value(&word, value);
        if sync_native {
            self.engine.set_native_input(&self.composed);
        }
        self.selection
            .set_cursor(self.composed.chars().count(), word.length);
        self.state.recount(&self.layout);
        writes.len()
    }

    /// Blanks the last composed cell, or the cell at the cursor when nothing
    /// has been composed yet.
    pub fn backspace(&mut self) {
        let Some(index) = self.selection.word() else {
            return;
        };
        let Some(word) = self.layout.word(index).cloned() else {
            return;
        };
        let mut composed: Vec<char> = self.composed.chars().collect();
        let position = if composed.pop().is_some() {
            composed.len()
        } else {
            let Some(cursor) = self.selection.cursor() else {
                return;
            };
            let at_cursor = word
                .cell_at(cursor)
                .map(|cell| self.state.glyph(cell).is_empty())
                .unwrap_or(true);
            if at_cursor && cursor > 0 {
                cursor - 1
            } else {
                cursor
            }
        };
        if let Some(cell) = word.cell_at(position) {
            if self.write_cell(cell, "") {
                self.broadcast(cell);
            }
        }
        self.composed = composed.into_iter().collect();
        self.engine.set_native_input(self.composed.trim_end());
        self.selection.set_cursor(position, word.length);
        self.state.recount(&self.layout);
    }

    pub fn clear_word(&mut self) {
        let Some(index) = self.selection.word() else {
            return;
        };
        let Some(word) = self.layout.word(index).cloned() else {
            return;
        };
        for cell in word.cells() {
            if self.write_cell(cell, "") {
                self.broadcast(cell);
            }
        }
        self.composed.clear();
        self.engine.set_native_input("");
        self.selection.set_cursor(0, word.length);
        self.state.recount(&self.layout);
    }

    /// Runs after the engine accepted a word. `fallback` is the word that was
    /// selected when the accept handler was entered.
    pub fn commit_word(&mut self, fallback: Option<usize>) {
        if let Some(index) = self.selection.begin_commit(fallback) {
            if let Some(word) = self.layout.word(index).cloned() {
                self.validate_commit(&word);
            }
            self.selection.finish_commit();
        }
        self.composed.clear();
        self.state.recount(&self.layout);
        self.emit_progress();
        self.maybe_complete();
        self.effects.push(SessionEffect::Relayout);
    }

    fn validate_commit(&mut self, word: &WordDescriptor) {
        let mut all_correct = true;
        for (position, cell) in word.cells().into_iter().enumerate() {
            let glyph = self.engine.read_cell(cell);
            self.write_cell(cell, &glyph);
            self.broadcast(cell);
            let correct = self.state.glyph(cell).chars().next() == word.expected_letter(position);
            self.engine.pulse(
                cell,
                if correct {
                    CellPulse::Correct
                } else {
                    CellPulse::Incorrect
                },
            );
            all_correct &= correct;
        }
        let errors = self.stats.record(word.index, all_correct);
        if !all_correct && errors >= self.config.hint_threshold.max(1) {
            let data = SuggestHintData {
                word_index: word.index,
                consecutive_errors: errors,
                accuracy: self.stats.accuracy(),
            };
            self.emit(AgentMsg::SuggestHint(data));
            self.stats.reset_word(word.index);
        }
    }

    fn hint_revealed(&mut self, word: Option<usize>) {
        let index = word.or(self.engine.current_word());
        if let Some(cells) = index
            .and_then(|index| self.layout.word(index))
            .map(WordDescriptor::cells)
        {
            self.sync_cells(&cells);
        }
        self.state.hints_used = self.state.hints_used.saturating_add(1);
        self.state.recount(&self.layout);
        let data = HintUsedData {
            word_index: index,
            cell_id: None,
            hints_used: self.state.hints_used,
        };
        self.emit(AgentMsg::HintUsed(data));
        self.emit_progress();
        self.maybe_complete();
    }

    fn answers_checked(&mut self) {
        let cells = self.layout.cells().to_vec();
        self.sync_cells(&cells);
        for cell in cells {
            let glyph = self.state.glyph(cell);
            if glyph.is_empty() {
                continue;
            }
            if glyph.chars().next() != self.layout.solution_at(cell) {
                self.engine.pulse(cell, CellPulse::Incorrect);
            }
        }
        self.state.recount(&self.layout);
        self.emit_progress();
        self.maybe_complete();
    }

    pub fn check_puzzle(&mut self) {
        self.engine.invoke_original(EntryPoint::CheckAnswer);
        self.answers_checked();
    }

    pub fn reveal_letter(&mut self, word: Option<usize>) {
        let Some(index) = word.or(self.selection.word()) else {
            return;
        };
        let Some(word) = self.layout.word(index).cloned() else {
            return;
        };
        let cells = word.cells();
        let cursor = self
            .selection
            .cursor()
            .filter(|_| self.selection.word() == Some(index));
        let is_wrong = |pos: usize| {
            cells
                .get(pos)
                .is_some_and(|cell| self.state.glyph(*cell).chars().next() != word.expected_letter(pos))
        };
        // Empty cell first, then the cursor if it is wrong, then any wrong cell.
        // A fully correct word has nothing to reveal.
        let position = cells
            .iter()
            .position(|cell| self.state.glyph(*cell).is_empty())
            .or(cursor.filter(|pos| is_wrong(*pos)))
            .or_else(|| (0..cells.len()).find(|pos| is_wrong(*pos)));
        let Some(position) = position else {
            return;
        };
        let (Some(cell), Some(letter)) = (word.cell_at(position), word.expected_letter(position))
        else {
            return;
        };
        if self.write_cell(cell, &letter.to_string()) {
            self.broadcast(cell);
        }
        self.sync_native_with(&word);
        self.state.hints_used = self.state.hints_used.saturating_add(1);
        self.state.recount(&self.layout);
        let data = HintUsedData {
            word_index: Some(index),
            cell_id: Some(cell),
            hints_used: self.state.hints_used,
        };
        self.emit(AgentMsg::HintUsed(data));
        self.emit_progress();
        self.maybe_complete();
    }

    pub fn reveal_word(&mut self, word: Option<usize>) {
        let Some(index) = word.or(self.selection.word()) else {
            return;
        };
        let Some(word) = self.layout.word(index).cloned() else {
            return;
        };
        for (position, cell) in word.cells().into_iter().enumerate() {
            let Some(letter) = word.expected_letter(position) else {
                continue;
            };
            if self.write_cell(cell, &letter.to_string()) {
                self.broadcast(cell);
            }
        }
        self.sync_native_with(&word);
        self.state.hints_used = self.state.hints_used.saturating_add(1);
        self.state.recount(&self.layout);
        let data = WordRevealedData {
            word_index: index,
            answer: word.answer.to_uppercase(),
            hints_used: self.state.hints_used,
        };
        self.emit(AgentMsg::WordRevealed(data));
        self.emit_progress();
        self.maybe_complete();
    }

    /// Applies a peer's cell write. Never re-broadcast. Returns whether the
    /// grid changed.
    pub fn apply_remote_cell_update(&mut self, cell: CellId, value: &str) -> bool {
        if !self.layout.contains(cell) {
            return false;
        }
        let changed = self.write_cell(cell, value);
        if changed {
            self.engine.pulse(cell, CellPulse::Remote);
            self.state.recount(&self.layout);
            self.emit_grid_updated();
            self.maybe_complete();
        }
        changed
    }

    pub fn load_state(&mut self, data: LoadStateData) {
        for cell in self.layout.cells().to_vec() {
            let glyph = data.grid_state.get(&cell).map(String::as_str).unwrap_or("");
            self.write_cell(cell, glyph);
        }
        if let Some(hints) = data.hints_used {
            self.state.hints_used = hints;
        }
        if let Some(start) = data.start_time {
            self.state.start_time = start;
        }
        self.state.recount(&self.layout);
        // A restored finished grid must not announce completion again.
        self.completed = self.completed || self.state.is_solved(&self.layout);
        self.emit_grid_updated();
        self.emit_progress();
    }

    pub fn set_multiplayer(&mut self, enabled: bool) {
        self.multiplayer = enabled;
    }

    pub fn enable_external_input(&mut self, mode: ExternalInputMode) {
        self.external_input = Some(mode);
        self.effects.push(SessionEffect::ExternalInput(Some(mode)));
        let lead = self.active_lead_cell();
        self.effects.push(SessionEffect::FocusWord(lead));
    }

    pub fn disable_external_input(&mut self) {
        if self.external_input.take().is_some() {
            self.effects.push(SessionEffect::ExternalInput(None));
        }
    }

    pub fn progress_data(&self) -> ProgressData {
        ProgressData {
            grid_state: self.state.grid_state.clone(),
            progress: self.state.progress_percent(),
            filled_cells: self.state.filled_cells,
            total_cells: self.state.total_cells,
            hints_used: self.state.hints_used,
        }
    }

    pub fn emit_progress(&mut self) {
        let data = self.progress_data();
        self.emit(AgentMsg::Progress(data));
    }

    fn emit_grid_updated(&mut self) {
        let data = GridUpdatedData {
            grid_state: self.state.grid_state.clone(),
            filled_cells: self.state.filled_cells,
            total_cells: self.state.total_cells,
        };
        self.emit(AgentMsg::GridUpdated(data));
    }

    fn maybe_complete(&mut self) {
        if self.completed || !self.state.is_solved(&self.layout) {
            return;
        }
        self.completed = true;
        let elapsed = (self.engine.now_ms() - self.state.start_time).max(0.0);
        let data = CompleteData {
            completion_time: elapsed.round(),
            score: compute_score(
                self.state.filled_cells,
                self.state.total_cells,
                self.state.hints_used,
            ),
            hints_used: self.state.hints_used,
        };
        self.emit(AgentMsg::Complete(data));
    }

    fn validate_letter(&mut self, word: &WordDescriptor, position: usize, letter: char) {
        let is_correct = word.expected_letter(position) == Some(letter);
        if let Some(cell) = word.cell_at(position) {
            self.engine.pulse(
                cell,
                if is_correct {
                    CellPulse::Correct
                } else {
                    CellPulse::Incorrect
                },
            );
        }
        let data = LetterValidatedData {
            word_index: word.index,
            position,
            letter: letter.to_string(),
            is_correct,
        };
        self.emit(AgentMsg::LetterValidated(data));
    }

    /// Stores and renders one glyph; returns whether the stored value changed.
    fn write_cell(&mut self, cell: CellId, glyph: &str) -> bool {
        let glyph = normalize_glyph(glyph);
        let changed = self.state.set_glyph(cell, &glyph);
        self.engine.write_cell(cell, &glyph);
        changed
    }

    /// Pulls cell values the engine wrote on its own.
    fn sync_cells(&mut self, cells: &[CellId]) {
        for cell in cells {
            let glyph = self.engine.read_cell(*cell);
            if self.state.set_glyph(*cell, &glyph) {
                self.broadcast(*cell);
            }
        }
    }

    fn sync_native_with(&mut self, word: &WordDescriptor) {
        if self.selection.word() == Some(word.index) {
            self.composed = self.state.word_fill(word);
            self.engine.set_native_input(&self.composed);
        }
    }

    fn broadcast(&mut self, cell: CellId) {
        if !self.multiplayer {
            return;
        }
        let data = CellUpdateData {
            cell_id: cell,
            value: self.state.glyph(cell).to_string(),
        };
        self.emit(AgentMsg::CellUpdate(data));
    }

    fn emit(&mut self, message: AgentMsg) {
        self.effects.push(SessionEffect::Emit(message));
    }
}
