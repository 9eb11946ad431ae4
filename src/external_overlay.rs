use std::rc::Rc;

use gloo::events::{EventListener, EventListenerOptions};
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlInputElement, KeyboardEvent, Window};

use crossbridge_core::external_input::{map_overlay_key, OverlayKey};

const OVERLAY_CLASS: &str = "cb-overlay";
const NATIVE_HIDDEN_CLASS: &str = "cb-native-hidden";

pub fn set_native_hidden(native: &Element, hidden: bool) {
    let classes = native.class_list();
    let _ = if hidden {
        classes.add_1(NATIVE_HIDDEN_CLASS)
    } else {
        classes.remove_1(NATIVE_HIDDEN_CLASS)
    };
}

/// Floating input placed over the active word's lead cell.
pub struct ExternalOverlay {
    window: Window,
    input: HtmlInputElement,
    _listeners: Vec<EventListener>,
}

impl ExternalOverlay {
    pub fn new(
        window: &Window,
        document: &Document,
        on_input: Rc<dyn Fn(String)>,
        on_key: Rc<dyn Fn(OverlayKey)>,
    ) -> Option<Self> {
        let input = document
            .create_element("input")
            .ok()?
            .dyn_into::<HtmlInputElement>()
            .ok()?;
        input.set_type("text");
        input.set_class_name(OVERLAY_CLASS);
        let _ = input.set_attribute("autocomplete", "off");
        let _ = input.set_attribute("autocapitalize", "characters");
        let _ = input.set_attribute("spellcheck", "false");
        document.body()?.append_child(&input).ok()?;

        let input_listener = {
            let field = input.clone();
            EventListener::new(&input, "input", move |_event| {
                on_input(field.value());
            })
        };
        let key_listener = EventListener::new_with_options(
            &input,
            "keydown",
            EventListenerOptions::enable_prevent_default(),
            move |event| {
                let Some(event) = event.dyn_ref::<KeyboardEvent>() else {
                    return;
                };
                let key = map_overlay_key(&event.key());
                if key == OverlayKey::Passthrough {
                    return;
                }
                event.prevent_default();
                on_key(key);
            },
        );

        Some(Self {
            window: window.clone(),
            input,
            _listeners: vec![input_listener, key_listener],
        })
    }

    pub fn set_value(&self, value: &str) {
        if self.input.value() != value {
            self.input.set_value(value);
        }
    }

    /// Moves over `cell`; `None` hides the overlay until the next selection.
    pub fn place(&self, cell: Option<&Element>) {
        let style = self.input.style();
        let Some(cell) = cell else {
            let _ = style.set_property("display", "none");
            return;
        };
        let rect = cell.get_bounding_client_rect();
        let scroll_x = self.window.scroll_x().unwrap_or(0.0);
        let scroll_y = self.window.scroll_y().unwrap_or(0.0);
        let _ = style.set_property("display", "block");
        let _ = style.set_property("left", &format!("{}px", rect.left() + scroll_x));
        let _ = style.set_property("top", &format!("{}px", rect.top() + scroll_y));
        let _ = style.set_property("width", &format!("{}px", rect.width()));
        let _ = style.set_property("height", &format!("{}px", rect.height()));
        let _ = self.input.focus();
    }
}

impl Drop for ExternalOverlay {
    fn drop(&mut self) {
        self.input.remove();
    }
}
