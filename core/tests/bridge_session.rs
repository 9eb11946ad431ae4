use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crossbridge_core::protocol::{ApplyInputData, CellUpdateData, LoadStateData};
use crossbridge_core::puzzle::progress_percent;
use crossbridge_core::{
    AgentMsg, BridgeConfig, BridgeSession, CellId, CellPulse, Direction, EngineError,
    EngineEvent, EntryPoint, HostMsg, LegacyEngine, PuzzleLayout, RenderMode, SessionEffect,
    WordDescriptor,
};

struct FakeEngine {
    words: Vec<WordDescriptor>,
    cells: RefCell<BTreeMap<CellId, String>>,
    native: RefCell<String>,
    current: Cell<Option<usize>>,
    pulses: RefCell<Vec<(CellId, CellPulse)>>,
    invoked: RefCell<Vec<EntryPoint>>,
    clock: Cell<f64>,
}

impl FakeEngine {
    fn new() -> Self {
        Self {
            words: vec![
                word(0, Direction::Across, "CAT", 0, 0),
                word(1, Direction::Down, "COW", 0, 0),
            ],
            cells: RefCell::new(BTreeMap::new()),
            native: RefCell::new(String::new()),
            current: Cell::new(None),
            pulses: RefCell::new(Vec::new()),
            invoked: RefCell::new(Vec::new()),
            clock: Cell::new(1_000.0),
        }
    }

    fn with_cell(self, x: u32, y: u32, glyph: &str) -> Self {
        self.cells.borrow_mut().insert(cell(x, y), glyph.to_string());
        self
    }

    fn set(&self, x: u32, y: u32, glyph: &str) {
        self.cells.borrow_mut().insert(cell(x, y), glyph.to_string());
    }

    fn get(&self, x: u32, y: u32) -> String {
        self.read_cell(cell(x, y))
    }
}

impl LegacyEngine for FakeEngine {
    fn read_layout(&self) -> Result<PuzzleLayout, EngineError> {
        Ok(PuzzleLayout::new(3, 3, self.words.clone())?)
    }

    fn read_cell(&self, cell: CellId) -> String {
        self.cells.borrow().get(&cell).cloned().unwrap_or_default()
    }

    fn write_cell(&self, cell: CellId, glyph: &str) {
        self.cells.borrow_mut().insert(cell, glyph.to_string());
    }

    fn native_input(&self) -> String {
        self.native.borrow().clone()
    }

    fn set_native_input(&self, value: &str) {
        *self.native.borrow_mut() = value.to_string();
    }

    fn current_word(&self) -> Option<usize> {
        self.current.get()
    }

    fn select_word(&self, index: usize) {
        self.invoked.borrow_mut().push(EntryPoint::SelectWord);
        self.current.set(Some(index));
    }

    fn invoke_original(&self, entry: EntryPoint) {
        self.invoked.borrow_mut().push(entry);
    }

    fn pulse(&self, cell: CellId, pulse: CellPulse) {
        self.pulses.borrow_mut().push((cell, pulse));
    }

    fn now_ms(&self) -> f64 {
        self.clock.get()
    }
}

fn word(index: usize, direction: Direction, answer: &str, row: u32, col: u32) -> WordDescriptor {
    WordDescriptor {
        index,
        direction,
        answer: answer.to_string(),
        clue: format!("clue {index}"),
        origin_row: row,
        origin_col: col,
        length: answer.len(),
    }
}

fn cell(x: u32, y: u32) -> CellId {
    CellId::new(x, y).unwrap()
}

fn session_with(engine: FakeEngine, config: BridgeConfig) -> BridgeSession<FakeEngine> {
    BridgeSession::new(engine, config, RenderMode::Premium).unwrap()
}

fn session() -> BridgeSession<FakeEngine> {
    session_with(FakeEngine::new(), BridgeConfig::default())
}

fn multiplayer_session(engine: FakeEngine) -> BridgeSession<FakeEngine> {
    let config = BridgeConfig {
        multiplayer: true,
        ..BridgeConfig::default()
    };
    session_with(engine, config)
}

fn messages(session: &mut BridgeSession<FakeEngine>) -> Vec<AgentMsg> {
    session
        .take_effects()
        .into_iter()
        .filter_map(|effect| match effect {
            SessionEffect::Emit(message) => Some(message),
            _ => None,
        })
        .collect()
}

fn select(session: &mut BridgeSession<FakeEngine>, index: usize) {
    session.engine().current.set(Some(index));
    session.handle_engine_event(&EngineEvent::Returned {
        entry: EntryPoint::SelectWord,
        word: None,
    });
}

/// What the legacy page does when the player types into `#wordentry`.
fn type_native(session: &mut BridgeSession<FakeEngine>, value: &str) {
    session.engine().set_native_input(value);
    session.handle_engine_event(&EngineEvent::NativeInput {
        value: value.to_string(),
    });
}

fn cell_updates(session: &mut BridgeSession<FakeEngine>) -> Vec<(CellId, String)> {
    messages(session)
        .into_iter()
        .filter_map(|message| match message {
            AgentMsg::CellUpdate(data) => Some((data.cell_id, data.value)),
            _ => None,
        })
        .collect()
}

#[test]
fn typing_correct_word_validates_each_letter_and_advances() {
    let mut session = session();
    select(&mut session, 0);
    let selected = messages(&mut session);
    assert!(selected.iter().any(|message| matches!(
        message,
        AgentMsg::WordSelected(data) if data.word_index == 0 && data.length == 3
    )));

    let mut cursors = Vec::new();
    let mut validated = Vec::new();
    for value in ["c", "ca", "cat"] {
        type_native(&mut session, value);
        cursors.push(session.selection().cursor());
        for message in messages(&mut session) {
            if let AgentMsg::LetterValidated(data) = message {
                validated.push(data);
            }
        }
    }

    assert_eq!(validated.len(), 3);
    for (position, data) in validated.iter().enumerate() {
        assert_eq!(data.word_index, 0);
        assert_eq!(data.position, position);
        assert!(data.is_correct);
    }
    assert_eq!(validated[2].letter, "T");
    assert_eq!(cursors, vec![Some(1), Some(2), Some(2)]);
    assert_eq!(session.engine().get(0, 0), "C");
    assert_eq!(session.engine().get(2, 0), "T");
    assert_eq!(session.state().filled_cells, 3);
}

#[test]
fn wrong_letter_is_flagged() {
    let mut session = session();
    select(&mut session, 1);
    messages(&mut session);
    type_native(&mut session, "c");
    type_native(&mut session, "cx");
    let flags: Vec<bool> = messages(&mut session)
        .into_iter()
        .filter_map(|message| match message {
            AgentMsg::LetterValidated(data) => Some(data.is_correct),
            _ => None,
        })
        .collect();
    assert_eq!(flags, vec![true, false]);
    let pulses = session.engine().pulses.borrow().clone();
    assert_eq!(pulses.last(), Some(&(cell(0, 1), CellPulse::Incorrect)));
}

#[test]
fn repeated_wrong_commits_suggest_hint_then_restart_count() {
    let mut session = session();
    let engine_commit = |session: &mut BridgeSession<FakeEngine>| {
        session.engine().set(0, 0, "C");
        session.engine().set(1, 0, "A");
        session.engine().set(2, 0, "X");
        session.handle_engine_event(&EngineEvent::Returned {
            entry: EntryPoint::AcceptWord,
            word: Some(0),
        });
        messages(session)
            .into_iter()
            .filter_map(|message| match message {
                AgentMsg::SuggestHint(data) => Some(data),
                _ => None,
            })
            .collect::<Vec<_>>()
    };

    assert!(engine_commit(&mut session).is_empty());
    assert!(engine_commit(&mut session).is_empty());
    let third = engine_commit(&mut session);
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].word_index, 0);
    assert_eq!(third[0].consecutive_errors, 3);
    assert_eq!(third[0].accuracy, 0.0);
    assert!(engine_commit(&mut session).is_empty());
    assert_eq!(session.stats().total_attempts, 4);
}

#[test]
fn commit_pulses_each_cell_and_returns_to_unselected() {
    let mut session = session();
    select(&mut session, 0);
    session.take_effects();
    session.engine().set(0, 0, "c");
    session.engine().set(1, 0, "a");
    session.engine().set(2, 0, "b");
    session.engine().pulses.borrow_mut().clear();
    session.handle_engine_event(&EngineEvent::Returned {
        entry: EntryPoint::AcceptWord,
        word: Some(0),
    });
    let pulses = session.engine().pulses.borrow().clone();
    assert_eq!(
        pulses,
        vec![
            (cell(0, 0), CellPulse::Correct),
            (cell(1, 0), CellPulse::Correct),
            (cell(2, 0), CellPulse::Incorrect),
        ]
    );
    assert_eq!(session.selection().word(), None);
    assert_eq!(session.state().glyph(cell(0, 0)), "C");
    let progress = messages(&mut session)
        .into_iter()
        .find_map(|message| match message {
            AgentMsg::Progress(data) => Some(data),
            _ => None,
        })
        .unwrap();
    assert_eq!(progress.filled_cells, 3);
    assert_eq!(progress.total_cells, 5);
    assert_eq!(progress.progress, 60);
}

#[test]
fn completion_is_emitted_once_with_score() {
    let mut session = session();
    session.engine().clock.set(61_000.0);
    session.reveal_word(Some(0));
    session.reveal_word(Some(1));
    let completes: Vec<_> = messages(&mut session)
        .into_iter()
        .filter_map(|message| match message {
            AgentMsg::Complete(data) => Some(data),
            _ => None,
        })
        .collect();
    assert_eq!(completes.len(), 1);
    assert_eq!(completes[0].hints_used, 2);
    assert_eq!(completes[0].score, 1400);
    assert_eq!(completes[0].completion_time, 60_000.0);
    assert!(session.is_completed());

    session.handle_host_message(HostMsg::CheckPuzzle);
    assert!(!messages(&mut session)
        .iter()
        .any(|message| matches!(message, AgentMsg::Complete(_))));
}

#[test]
fn remote_cell_update_is_idempotent_and_never_rebroadcast() {
    let mut session = multiplayer_session(FakeEngine::new());
    let update = CellUpdateData {
        cell_id: cell(1, 0),
        value: "a".to_string(),
    };

    session.handle_host_message(HostMsg::ApplyCellUpdate(update.clone()));
    let first = messages(&mut session);
    assert_eq!(first.len(), 1);
    assert!(matches!(&first[0], AgentMsg::GridUpdated(data) if data.filled_cells == 1));
    let after_first = session.state().clone();

    session.handle_host_message(HostMsg::ApplyCellUpdate(update));
    assert!(messages(&mut session).is_empty());
    assert_eq!(session.state(), &after_first);
    assert_eq!(session.engine().get(1, 0), "A");
    assert_eq!(
        session.engine().pulses.borrow().as_slice(),
        &[(cell(1, 0), CellPulse::Remote)]
    );
}

#[test]
fn remote_update_outside_puzzle_is_ignored() {
    let mut session = session();
    assert!(!session.apply_remote_cell_update(cell(2, 2), "Q"));
    assert!(session.take_effects().is_empty());
}

#[test]
fn external_input_never_writes_past_value_or_word() {
    let engine = FakeEngine::new().with_cell(2, 0, "Z");
    let mut session = session_with(engine, BridgeConfig::default());

    assert_eq!(session.apply_external_input("ca", Some(0)), 2);
    assert_eq!(session.engine().get(0, 0), "C");
    assert_eq!(session.engine().get(1, 0), "A");
    assert_eq!(session.engine().get(2, 0), "Z");
    assert_eq!(session.state().glyph(cell(2, 0)), "Z");
    assert_eq!(session.engine().native_input(), "CA");

    let written = session.apply_external_input("CATS", None);
    assert!(written <= 3);
    assert_eq!(session.engine().get(2, 0), "T");
    // The down word shares only the origin cell.
    assert_eq!(session.engine().get(0, 1), "");
    assert_eq!(session.engine().native_input(), "CAT");
}

#[test]
fn external_input_validates_only_new_letters() {
    let mut session = session();
    session.handle_host_message(HostMsg::ApplyInput(ApplyInputData {
        value: "C".to_string(),
        word_index: Some(0),
    }));
    session.handle_host_message(HostMsg::ApplyInput(ApplyInputData {
        value: "CA".to_string(),
        word_index: Some(0),
    }));
    let positions: Vec<usize> = messages(&mut session)
        .into_iter()
        .filter_map(|message| match message {
            AgentMsg::LetterValidated(data) => Some(data.position),
            _ => None,
        })
        .collect();
    assert_eq!(positions, vec![0, 1]);
    assert_eq!(session.selection().cursor(), Some(2));
}

#[test]
fn multiplayer_broadcasts_edits_including_blanks() {
    let mut session = multiplayer_session(FakeEngine::new());
    session.apply_external_input("CA", Some(0));
    session.handle_host_message(HostMsg::Backspace);
    let updates: Vec<(CellId, String)> = messages(&mut session)
        .into_iter()
        .filter_map(|message| match message {
            AgentMsg::CellUpdate(data) => Some((data.cell_id, data.value)),
            _ => None,
        })
        .collect();
    assert_eq!(
        updates,
        vec![
            (cell(0, 0), "C".to_string()),
            (cell(1, 0), "A".to_string()),
            (cell(1, 0), String::new()),
        ]
    );
    assert_eq!(session.engine().native_input(), "C");
}

#[test]
fn broadcasting_follows_set_multiplayer() {
    let mut session = session();
    session.apply_external_input("C", Some(0));
    assert!(!messages(&mut session)
        .iter()
        .any(|message| matches!(message, AgentMsg::CellUpdate(_))));

    session.handle_host_message(HostMsg::SetMultiplayer(
        crossbridge_core::protocol::SetMultiplayerData { enabled: true },
    ));
    session.handle_host_message(HostMsg::ClearWord);
    let cleared: Vec<_> = messages(&mut session)
        .into_iter()
        .filter(|message| matches!(message, AgentMsg::CellUpdate(_)))
        .collect();
    assert_eq!(cleared.len(), 1);
    assert_eq!(session.engine().get(0, 0), "");
}

#[test]
fn load_state_writes_silently_then_reports() {
    let mut session = multiplayer_session(FakeEngine::new());
    let mut grid = BTreeMap::new();
    grid.insert(cell(0, 0), "c".to_string());
    grid.insert(cell(0, 1), "o".to_string());
    session.handle_host_message(HostMsg::LoadState(LoadStateData {
        grid_state: grid,
        hints_used: Some(4),
        start_time: Some(10.0),
    }));
    let emitted = messages(&mut session);
    assert_eq!(emitted.len(), 2);
    assert!(matches!(&emitted[0], AgentMsg::GridUpdated(data) if data.filled_cells == 2));
    assert!(matches!(&emitted[1], AgentMsg::Progress(data) if data.hints_used == 4));
    assert_eq!(session.engine().get(0, 1), "O");
    assert_eq!(session.state().start_time, 10.0);
}

#[test]
fn progress_counts_stay_consistent() {
    let mut session = session();
    for value in ["C", "CA", "CAT"] {
        session.apply_external_input(value, Some(0));
        session.handle_host_message(HostMsg::GetState);
        for message in messages(&mut session) {
            if let AgentMsg::Progress(data) = message {
                assert!(data.filled_cells <= data.total_cells);
                assert_eq!(
                    data.progress,
                    progress_percent(data.filled_cells, data.total_cells)
                );
            }
        }
    }
    assert_eq!(session.state().filled_cells, 3);
}

#[test]
fn check_puzzle_runs_original_and_flags_wrong_cells() {
    let engine = FakeEngine::new().with_cell(1, 0, "Q");
    let mut session = session_with(engine, BridgeConfig::default());
    session.handle_host_message(HostMsg::CheckPuzzle);
    assert_eq!(
        session.engine().invoked.borrow().as_slice(),
        &[EntryPoint::CheckAnswer]
    );
    assert_eq!(
        session.engine().pulses.borrow().as_slice(),
        &[(cell(1, 0), CellPulse::Incorrect)]
    );
    assert!(messages(&mut session)
        .iter()
        .any(|message| matches!(message, AgentMsg::Progress(_))));
}

#[test]
fn reveal_letter_fills_first_empty_cell() {
    let engine = FakeEngine::new().with_cell(0, 0, "C");
    let mut session = session_with(engine, BridgeConfig::default());
    session.reveal_letter(Some(0));
    assert_eq!(session.engine().get(1, 0), "A");
    assert_eq!(session.engine().get(2, 0), "");
    let hint = messages(&mut session)
        .into_iter()
        .find_map(|message| match message {
            AgentMsg::HintUsed(data) => Some(data),
            _ => None,
        })
        .unwrap();
    assert_eq!(hint.hints_used, 1);
    assert_eq!(hint.cell_id, Some(cell(1, 0)));
}

#[test]
fn reveal_without_selection_is_a_no_op() {
    let mut session = session();
    session.reveal_letter(None);
    session.reveal_word(None);
    assert!(session.take_effects().is_empty());
    assert_eq!(session.state().hints_used, 0);
}

#[test]
fn ready_message_describes_the_puzzle() {
    let mut session = multiplayer_session(FakeEngine::new());
    session.ready();
    let emitted = messages(&mut session);
    let AgentMsg::IframeReady(data) = &emitted[0] else {
        panic!("expected iframe_ready, got {emitted:?}");
    };
    assert_eq!((data.width, data.height), (3, 3));
    assert_eq!(data.words.len(), 2);
    assert_eq!(data.render_mode, RenderMode::Premium);
    assert!(data.multiplayer);
}

#[test]
fn external_input_mode_toggles_effects() {
    let mut session = session();
    select(&mut session, 0);
    session.take_effects();
    session.handle_host_message(HostMsg::EnableExternalInput(Default::default()));
    let effects = session.take_effects();
    assert!(effects.contains(&SessionEffect::ExternalInput(Some(Default::default()))));
    assert!(effects.contains(&SessionEffect::FocusWord(Some(cell(0, 0)))));

    session.handle_host_message(HostMsg::DisableExternalInput);
    assert_eq!(session.take_effects(), vec![SessionEffect::ExternalInput(None)]);
    session.handle_host_message(HostMsg::DisableExternalInput);
    assert!(session.take_effects().is_empty());
}

#[test]
fn deleting_in_native_widget_blanks_and_broadcasts() {
    let mut session = multiplayer_session(FakeEngine::new());
    select(&mut session, 0);
    session.take_effects();
    type_native(&mut session, "CA");
    type_native(&mut session, "C");
    assert_eq!(
        cell_updates(&mut session),
        vec![
            (cell(0, 0), "C".to_string()),
            (cell(1, 0), "A".to_string()),
            (cell(1, 0), String::new()),
        ]
    );
    assert_eq!(session.engine().get(1, 0), "");
    assert_eq!(session.state().filled_cells, 1);
    assert_eq!(session.selection().cursor(), Some(1));
}

#[test]
fn overlay_typing_echoes_to_native_widget() {
    let mut session = session();
    select(&mut session, 0);
    assert_eq!(session.apply_overlay_input("cat"), 3);
    assert_eq!(session.engine().native_input(), "CAT");
    session.apply_overlay_input("ca");
    assert_eq!(session.engine().native_input(), "CA");
    assert_eq!(session.engine().get(2, 0), "");
}

#[test]
fn apply_input_for_another_word_moves_engine_selection() {
    let mut session = session();
    select(&mut session, 0);
    session.take_effects();
    session.handle_host_message(HostMsg::ApplyInput(ApplyInputData {
        value: "COW".to_string(),
        word_index: Some(1),
    }));
    assert_eq!(session.engine().current_word(), Some(1));
    assert_eq!(session.engine().current_word(), session.selection().word());
    assert_eq!(
        session.engine().invoked.borrow().as_slice(),
        &[EntryPoint::SelectWord]
    );
    assert_eq!(session.engine().native_input(), "COW");
    assert_eq!(session.engine().get(0, 2), "W");

    // Same word again: the engine is already there.
    session.apply_external_input("COW", Some(1));
    assert_eq!(session.engine().invoked.borrow().len(), 1);
}

#[test]
fn engine_hint_is_synced_counted_and_broadcast() {
    let mut session = multiplayer_session(FakeEngine::new());
    select(&mut session, 0);
    session.take_effects();
    // CheatClick fills a letter on its own.
    session.engine().set(1, 0, "A");
    session.handle_engine_event(&EngineEvent::Returned {
        entry: EntryPoint::RevealHint,
        word: Some(0),
    });
    let emitted = messages(&mut session);
    assert!(emitted.contains(&AgentMsg::CellUpdate(CellUpdateData {
        cell_id: cell(1, 0),
        value: "A".to_string(),
    })));
    let hint = emitted
        .iter()
        .find_map(|message| match message {
            AgentMsg::HintUsed(data) => Some(data.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(hint.word_index, Some(0));
    assert_eq!(hint.hints_used, 1);
    assert_eq!(session.state().glyph(cell(1, 0)), "A");
    assert!(emitted
        .iter()
        .any(|message| matches!(message, AgentMsg::Progress(data) if data.filled_cells == 1)));
}

#[test]
fn reveal_letter_in_full_word_targets_the_wrong_cell() {
    let engine = FakeEngine::new()
        .with_cell(0, 0, "C")
        .with_cell(1, 0, "X")
        .with_cell(2, 0, "T");
    let mut session = session_with(engine, BridgeConfig::default());
    select(&mut session, 0);
    assert_eq!(session.selection().cursor(), Some(0));
    session.take_effects();

    session.reveal_letter(None);
    assert_eq!(session.engine().get(1, 0), "A");
    let hint = messages(&mut session)
        .into_iter()
        .find_map(|message| match message {
            AgentMsg::HintUsed(data) => Some(data),
            _ => None,
        })
        .unwrap();
    assert_eq!(hint.cell_id, Some(cell(1, 0)));
    assert_eq!(hint.hints_used, 1);

    // Nothing left to reveal in this word.
    session.reveal_letter(None);
    assert_eq!(session.state().hints_used, 1);
    assert!(session.take_effects().is_empty());
}
