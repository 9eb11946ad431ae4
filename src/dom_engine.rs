use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use gloo::timers::callback::Timeout;
use js_sys::{Array, Function, Reflect};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, HtmlInputElement, Window};

use crossbridge_core::engine::HandlerRegistry;
use crossbridge_core::host_layout::{GRID_ELEMENT_ID, NATIVE_INPUT_ID};
use crossbridge_core::{
    CellId, CellPulse, Direction, EngineError, EntryPoint, LegacyEngine, PuzzleLayout,
    WordDescriptor,
};

use crate::wire::{js_err, now_ms};

const PULSE_CLASSES: [&str; 3] = ["cb-pulse-correct", "cb-pulse-incorrect", "cb-remote"];

fn pulse_class(pulse: CellPulse) -> &'static str {
    match pulse {
        CellPulse::Correct => PULSE_CLASSES[0],
        CellPulse::Incorrect => PULSE_CLASSES[1],
        CellPulse::Remote => PULSE_CLASSES[2],
    }
}

fn global(window: &Window, name: &'static str) -> Result<JsValue, EngineError> {
    let value = Reflect::get(window, &JsValue::from_str(name))
        .map_err(|_| EngineError::MissingGlobal(name))?;
    if value.is_undefined() || value.is_null() {
        return Err(EngineError::MissingGlobal(name));
    }
    Ok(value)
}

fn global_number(window: &Window, name: &'static str) -> Result<f64, EngineError> {
    global(window, name)?
        .as_f64()
        .ok_or(EngineError::BadGlobal { name })
}

fn global_array(window: &Window, name: &'static str) -> Result<Array, EngineError> {
    global(window, name)?
        .dyn_into::<Array>()
        .map_err(|_| EngineError::BadGlobal { name })
}

fn item_u32(array: &Array, index: u32, name: &'static str) -> Result<u32, EngineError> {
    let value = array.get(index);
    let number = value
        .as_f64()
        .or_else(|| value.as_string().and_then(|text| text.trim().parse().ok()))
        .ok_or(EngineError::BadGlobal { name })?;
    if number < 0.0 || !number.is_finite() {
        return Err(EngineError::BadGlobal { name });
    }
    Ok(number as u32)
}

fn item_string(array: &Array, index: u32) -> String {
    array.get(index).as_string().unwrap_or_default()
}

/// Word the legacy engine has selected, if any. `CurrentWord` is -1 when idle.
pub fn current_word(window: &Window) -> Option<usize> {
    let value = Reflect::get(window, &JsValue::from_str("CurrentWord")).ok()?;
    let index = value.as_f64()?;
    if index < 0.0 || !index.is_finite() {
        return None;
    }
    Some(index as usize)
}

/// Reads the puzzle shape from the legacy globals.
pub fn read_layout(window: &Window) -> Result<PuzzleLayout, EngineError> {
    let width = global_number(window, "CrosswordWidth")? as u32;
    let height = global_number(window, "CrosswordHeight")? as u32;
    let last_across = global_number(window, "LastHorizontalWord")?;
    let answers = global_array(window, "Word")?;
    // A `Words` count past the answer list would only read holes.
    let count = (global_number(window, "Words")? as u32).min(answers.length());
    let clues = global_array(window, "Clue")?;
    let xs = global_array(window, "WordX")?;
    let ys = global_array(window, "WordY")?;
    let lengths = global_array(window, "WordLength")?;

    let mut words = Vec::with_capacity(count as usize);
    for index in 0..count {
        let direction = if (index as f64) <= last_across {
            Direction::Across
        } else {
            Direction::Down
        };
        words.push(WordDescriptor {
            index: index as usize,
            direction,
            answer: item_string(&answers, index).to_uppercase(),
            clue: item_string(&clues, index),
            origin_row: item_u32(&ys, index, "WordY")?,
            origin_col: item_u32(&xs, index, "WordX")?,
            length: item_u32(&lengths, index, "WordLength")? as usize,
        });
    }
    Ok(PuzzleLayout::new(width, height, words)?)
}

/// [`LegacyEngine`] over the live legacy document.
pub struct DomEngine {
    window: Window,
    document: Document,
    registry: Rc<HandlerRegistry<Function>>,
    pulse_ms: u32,
    remote_highlight_ms: u32,
    pulses: RefCell<HashMap<CellId, Timeout>>,
}

impl DomEngine {
    pub fn new(
        window: Window,
        registry: Rc<HandlerRegistry<Function>>,
        pulse_ms: u32,
        remote_highlight_ms: u32,
    ) -> Result<Self, EngineError> {
        let document = window
            .document()
            .ok_or(EngineError::MissingGlobal("document"))?;
        if document.get_element_by_id(GRID_ELEMENT_ID).is_none() {
            return Err(EngineError::MissingGlobal("#crossword"));
        }
        Ok(Self {
            window,
            document,
            registry,
            pulse_ms,
            remote_highlight_ms,
            pulses: RefCell::new(HashMap::new()),
        })
    }

    pub fn cell_element(&self, cell: CellId) -> Option<Element> {
        self.document.get_element_by_id(&cell.encode())
    }

    pub fn native_input_element(&self) -> Option<HtmlInputElement> {
        self.document
            .get_element_by_id(NATIVE_INPUT_ID)?
            .dyn_into::<HtmlInputElement>()
            .ok()
    }
}

impl LegacyEngine for DomEngine {
    fn read_layout(&self) -> Result<PuzzleLayout, EngineError> {
        read_layout(&self.window)
    }

    fn read_cell(&self, cell: CellId) -> String {
        self.cell_element(cell)
            .and_then(|element| element.text_content())
            .unwrap_or_default()
    }

    fn write_cell(&self, cell: CellId, glyph: &str) {
        let Some(element) = self.cell_element(cell) else {
            return;
        };
        let text = if glyph.is_empty() { "\u{a0}" } else { glyph };
        if element.text_content().as_deref() != Some(text) {
            element.set_text_content(Some(text));
        }
    }

    fn native_input(&self) -> String {
        self.native_input_element()
            .map(|input| input.value())
            .unwrap_or_default()
    }

    fn set_native_input(&self, value: &str) {
        if let Some(input) = self.native_input_element() {
            input.set_value(value);
        }
    }

    fn current_word(&self) -> Option<usize> {
        current_word(&self.window)
    }

    fn select_word(&self, index: usize) {
        let Some(original) = self.registry.original(EntryPoint::SelectWord) else {
            return;
        };
        if let Err(err) = original.call1(&self.window, &JsValue::from_f64(index as f64)) {
            gloo::console::warn!(
                "bridge: original handler threw",
                EntryPoint::SelectWord.global_name(),
                js_err(err)
            );
        }
    }

    fn invoke_original(&self, entry: EntryPoint) {
        let Some(original) = self.registry.original(entry) else {
            return;
        };
        if let Err(err) = original.call0(&self.window) {
            gloo::console::warn!("bridge: original handler threw", entry.global_name(), js_err(err));
        }
    }

    fn pulse(&self, cell: CellId, pulse: CellPulse) {
        let Some(element) = self.cell_element(cell) else {
            return;
        };
        let classes = element.class_list();
        for class in PULSE_CLASSES {
            let _ = classes.remove_1(class);
        }
        let class = pulse_class(pulse);
        let _ = classes.add_1(class);
        let duration = match pulse {
            CellPulse::Remote => self.remote_highlight_ms,
            _ => self.pulse_ms,
        };
        let timeout = Timeout::new(duration, move || {
            let _ = element.class_list().remove_1(class);
        });
        // Replacing a pending timeout cancels it; the new pulse owns the cell.
        self.pulses.borrow_mut().insert(cell, timeout);
    }

    fn now_ms(&self) -> f64 {
        now_ms()
    }
}
