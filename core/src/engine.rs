use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::cell_id::CellId;
use crate::puzzle::{LayoutError, PuzzleLayout};

/// Global entry points of the legacy engine the bridge decorates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    CheckAnswer,
    AcceptWord,
    RevealHint,
    SelectWord,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 4] = [
        EntryPoint::CheckAnswer,
        EntryPoint::AcceptWord,
        EntryPoint::RevealHint,
        EntryPoint::SelectWord,
    ];

    /// Name of the global function in the legacy document.
    pub fn global_name(self) -> &'static str {
        match self {
            EntryPoint::CheckAnswer => "CheckClick",
            EntryPoint::AcceptWord => "OKClick",
            EntryPoint::RevealHint => "CheatClick",
            EntryPoint::SelectWord => "SelectThisWord",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellPulse {
    Correct,
    Incorrect,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("legacy global `{0}` is not defined yet")]
    MissingGlobal(&'static str),
    #[error("legacy global `{name}` has an unexpected value")]
    BadGlobal { name: &'static str },
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// What the bridge needs from the legacy puzzle engine.
///
/// The engine owns the grid; the bridge only reads and writes it through
/// this seam so the session logic stays independent of the DOM.
pub trait LegacyEngine {
    fn read_layout(&self) -> Result<PuzzleLayout, EngineError>;
    fn read_cell(&self, cell: CellId) -> String;
    fn write_cell(&self, cell: CellId, glyph: &str);
    fn native_input(&self) -> String;
    fn set_native_input(&self, value: &str);
    fn current_word(&self) -> Option<usize>;
    /// Selects `index` through the undecorated select-word entry point, so the
    /// engine's own selection follows the bridge's.
    fn select_word(&self, index: usize);
    /// Runs the undecorated entry point.
    fn invoke_original(&self, entry: EntryPoint);
    fn pulse(&self, cell: CellId, pulse: CellPulse);
    fn now_ms(&self) -> f64;
}

/// Something happened inside the legacy engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A decorated entry point returned. `word` is the selection captured
    /// before the original ran.
    Returned {
        entry: EntryPoint,
        word: Option<usize>,
    },
    /// The native widget's value changed through typing.
    NativeInput { value: String },
    Resized,
}

/// Originals of decorated entry points, so they can be invoked directly and
/// restored on teardown.
pub struct HandlerRegistry<H> {
    originals: RefCell<Vec<(EntryPoint, H)>>,
}

impl<H: Clone> HandlerRegistry<H> {
    pub fn new() -> Self {
        Self {
            originals: RefCell::new(Vec::new()),
        }
    }

    /// Returns false when `entry` is already registered; a second wrap would
    /// capture our own decorator as the "original".
    pub fn register(&self, entry: EntryPoint, original: H) -> bool {
        let mut originals = self.originals.borrow_mut();
        if originals.iter().any(|(existing, _)| *existing == entry) {
            return false;
        }
        originals.push((entry, original));
        true
    }

    pub fn original(&self, entry: EntryPoint) -> Option<H> {
        self.originals
            .borrow()
            .iter()
            .find(|(existing, _)| *existing == entry)
            .map(|(_, handler)| handler.clone())
    }

    pub fn take_all(&self) -> Vec<(EntryPoint, H)> {
        std::mem::take(&mut *self.originals.borrow_mut())
    }
}

impl<H: Clone> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventBus<E> {
    subscribers: RefCell<Vec<(u64, Rc<dyn Fn(&E)>)>>,
    next_id: Cell<u64>,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscribers: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    pub fn subscribe(&self, handler: Rc<dyn Fn(&E)>) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id.saturating_add(1));
        self.subscribers.borrow_mut().push((id, handler));
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers
            .borrow_mut()
            .retain(|(subscriber, _)| *subscriber != id);
    }

    pub fn dispatch(&self, event: &E) {
        let handlers: Vec<Rc<dyn Fn(&E)>> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
