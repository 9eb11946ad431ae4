use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use gloo::events::EventListener;
use gloo::timers::callback::Interval;
use js_sys::{Array, Function, Reflect};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{MessageEvent, Window};

use crossbridge_core::engine::{EventBus, HandlerRegistry};
use crossbridge_core::external_input::OverlayKey;
use crossbridge_core::host_layout::NATIVE_INPUT_ID;
use crossbridge_core::protocol::DimensionsData;
use crossbridge_core::{
    is_valid_origin, AgentMsg, BridgeConfig, BridgeSession, EngineEvent, EntryPoint,
    ExternalInputMode, HostMsg, LegacyEngine, SessionEffect,
};

use crate::boot::read_boot_config;
use crate::dom_engine::{current_word, DomEngine};
use crate::external_overlay::{set_native_hidden, ExternalOverlay};
use crate::grid_layout::GridLayout;
use crate::render_mode_store::load_render_mode;
use crate::wire::{decode_message, js_err, post_message, same_object};

type Decorator = Closure<dyn FnMut(JsValue, JsValue) -> Result<JsValue, JsValue>>;

thread_local! {
    static AGENT: RefCell<Option<AgentRuntime>> = RefCell::new(None);
}

/// Everything one agent start owns. Dropping it undoes the install.
struct AgentRuntime {
    init_timer: Option<Interval>,
    installed: Option<Rc<Installed>>,
    pagehide: Option<EventListener>,
}

struct Installed {
    window: Window,
    config: BridgeConfig,
    own_origin: String,
    session: RefCell<BridgeSession<DomEngine>>,
    pending: RefCell<VecDeque<EngineEvent>>,
    bus: Rc<EventBus<EngineEvent>>,
    subscription: Cell<Option<u64>>,
    registry: Rc<HandlerRegistry<Function>>,
    decorators: RefCell<Vec<Decorator>>,
    listeners: RefCell<Vec<EventListener>>,
    layout: Rc<GridLayout>,
    overlay: RefCell<Option<ExternalOverlay>>,
    last_height: Cell<f64>,
}

/// Starts the agent in the current document, replacing a previous runtime.
pub fn start() {
    stop();
    let config = read_boot_config();
    let Some(window) = web_sys::window() else {
        return;
    };

    let pagehide = EventListener::new(&window, "pagehide", |_event| stop());
    let runtime = AgentRuntime {
        init_timer: None,
        installed: None,
        pagehide: Some(pagehide),
    };
    AGENT.with(|slot| *slot.borrow_mut() = Some(runtime));

    if try_install(&window, &config) {
        return;
    }
    gloo::console::log!("bridge: legacy globals not ready, retrying");
    let attempts = Rc::new(Cell::new(0u32));
    let limit = config.init_retry_limit;
    let timer = Interval::new(config.init_retry_interval_ms, move || {
        attempts.set(attempts.get() + 1);
        let installed = try_install(&window, &config);
        if installed || attempts.get() >= limit {
            if !installed {
                gloo::console::warn!(
                    "bridge: legacy engine never initialized, puzzle left unsynchronized"
                );
            }
            AGENT.with(|slot| {
                if let Some(runtime) = slot.borrow_mut().as_mut() {
                    runtime.init_timer.take();
                }
            });
        }
    });
    AGENT.with(|slot| {
        if let Some(runtime) = slot.borrow_mut().as_mut() {
            runtime.init_timer = Some(timer);
        }
    });
}

/// Tears down the running agent, restoring the legacy globals.
pub fn stop() {
    let runtime = AGENT.with(|slot| slot.borrow_mut().take());
    if let Some(mut runtime) = runtime {
        runtime.init_timer.take();
        runtime.pagehide.take();
        if let Some(installed) = runtime.installed.take() {
            installed.teardown();
        }
    }
}

pub fn is_running() -> bool {
    AGENT.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|runtime| runtime.installed.is_some())
            .unwrap_or(false)
    })
}

fn try_install(window: &Window, config: &BridgeConfig) -> bool {
    let registry = Rc::new(HandlerRegistry::new());
    let engine = match DomEngine::new(
        window.clone(),
        registry.clone(),
        config.pulse_ms,
        config.remote_highlight_ms,
    ) {
        Ok(engine) => engine,
        Err(_) => return false,
    };
    let resolved = load_render_mode();
    let session = match BridgeSession::new(engine, config.clone(), resolved.mode) {
        Ok(session) => session,
        Err(_) => return false,
    };
    let Some(document) = window.document() else {
        return false;
    };
    let layout = Rc::new(GridLayout::new(
        window.clone(),
        document,
        session.layout().width(),
        resolved.mode,
        config,
    ));
    let own_origin = window.location().origin().unwrap_or_default();
    let installed = Rc::new(Installed {
        window: window.clone(),
        config: config.clone(),
        own_origin,
        session: RefCell::new(session),
        pending: RefCell::new(VecDeque::new()),
        bus: Rc::new(EventBus::new()),
        subscription: Cell::new(None),
        registry,
        decorators: RefCell::new(Vec::new()),
        listeners: RefCell::new(Vec::new()),
        layout,
        overlay: RefCell::new(None),
        last_height: Cell::new(-1.0),
    });
    if let Err(err) = installed.install() {
        gloo::console::warn!("bridge: install failed", err);
        installed.teardown();
        return false;
    }
    AGENT.with(|slot| {
        if let Some(runtime) = slot.borrow_mut().as_mut() {
            runtime.installed = Some(installed.clone());
        }
    });
    gloo::console::log!("bridge: installed", resolved.mode.as_str());
    installed.run(|session| session.ready());
    installed.layout.settle();
    installed.report_dimensions();
    true
}

impl Installed {
    fn install(self: &Rc<Self>) -> Result<(), String> {
        let weak = Rc::downgrade(self);
        let id = self.bus.subscribe(Rc::new(move |event: &EngineEvent| {
            if let Some(installed) = weak.upgrade() {
                installed.dispatch_engine_event(event);
            }
        }));
        self.subscription.set(Some(id));

        for entry in EntryPoint::ALL {
            self.decorate(entry)?;
        }

        let mut listeners = Vec::new();
        let weak = Rc::downgrade(self);
        listeners.push(EventListener::new(&self.window, "message", move |event| {
            let Some(installed) = weak.upgrade() else {
                return;
            };
            if let Some(event) = event.dyn_ref::<MessageEvent>() {
                installed.on_host_message(event);
            }
        }));

        let bus = Rc::downgrade(&self.bus);
        listeners.push(EventListener::new(&self.window, "resize", move |_event| {
            if let Some(bus) = bus.upgrade() {
                bus.dispatch(&EngineEvent::Resized);
            }
        }));

        if let Some(native) = self
            .window
            .document()
            .and_then(|document| document.get_element_by_id(NATIVE_INPUT_ID))
        {
            let bus = Rc::downgrade(&self.bus);
            let field = native.clone();
            listeners.push(EventListener::new(&native, "input", move |_event| {
                let Some(bus) = bus.upgrade() else {
                    return;
                };
                let value = field
                    .dyn_ref::<web_sys::HtmlInputElement>()
                    .map(|input| input.value())
                    .unwrap_or_default();
                bus.dispatch(&EngineEvent::NativeInput { value });
            }));
        }
        *self.listeners.borrow_mut() = listeners;
        Ok(())
    }

    /// Swaps a legacy global for a wrapper that runs the original and then
    /// reports through the bus.
    fn decorate(self: &Rc<Self>, entry: EntryPoint) -> Result<(), String> {
        let name = JsValue::from_str(entry.global_name());
        let original = Reflect::get(&self.window, &name)
            .map_err(js_err)?
            .dyn_into::<Function>()
            .map_err(|_| format!("{} is not a function", entry.global_name()))?;
        if !self.registry.register(entry, original.clone()) {
            return Ok(());
        }
        let window = self.window.clone();
        let bus = Rc::downgrade(&self.bus);
        let decorator: Decorator = Closure::wrap(Box::new(move |first: JsValue, second: JsValue| {
            let word = current_word(&window);
            let args = Array::new();
            for arg in [first, second] {
                if arg.is_undefined() {
                    break;
                }
                args.push(&arg);
            }
            let result = original.apply(&window, &args)?;
            if let Some(bus) = bus.upgrade() {
                bus.dispatch(&EngineEvent::Returned { entry, word });
            }
            Ok(result)
        }));
        Reflect::set(&self.window, &name, decorator.as_ref()).map_err(js_err)?;
        self.decorators.borrow_mut().push(decorator);
        Ok(())
    }

    fn teardown(&self) {
        for (entry, original) in self.registry.take_all() {
            let _ = Reflect::set(
                &self.window,
                &JsValue::from_str(entry.global_name()),
                &original,
            );
        }
        if let Some(id) = self.subscription.take() {
            self.bus.unsubscribe(id);
        }
        self.listeners.borrow_mut().clear();
        self.overlay.borrow_mut().take();
        self.layout.teardown();
        if let Some(native) = self
            .window
            .document()
            .and_then(|document| document.get_element_by_id(NATIVE_INPUT_ID))
        {
            set_native_hidden(&native, false);
        }
        // Globals point at the originals again, so the wrappers can go.
        self.decorators.borrow_mut().clear();
    }

    /// Runs `action` against the session, then performs the queued effects
    /// with the session released.
    fn run<F>(self: &Rc<Self>, action: F)
    where
        F: FnOnce(&mut BridgeSession<DomEngine>),
    {
        let effects = {
            let Ok(mut session) = self.session.try_borrow_mut() else {
                gloo::console::warn!("bridge: session busy, dropping reentrant call");
                return;
            };
            action(&mut session);
            let mut effects = session.take_effects();
            loop {
                let next = self.pending.borrow_mut().pop_front();
                let Some(event) = next else {
                    break;
                };
                session.handle_engine_event(&event);
                effects.extend(session.take_effects());
            }
            effects
        };
        for effect in effects {
            self.apply_effect(effect);
        }
    }

    fn dispatch_engine_event(self: &Rc<Self>, event: &EngineEvent) {
        if self.session.try_borrow_mut().is_err() {
            // Raised by an original the session itself invoked.
            self.pending.borrow_mut().push_back(event.clone());
            return;
        }
        self.run(|session| session.handle_engine_event(event));
    }

    fn apply_effect(self: &Rc<Self>, effect: SessionEffect) {
        match effect {
            SessionEffect::Emit(message) => self.post(&message),
            SessionEffect::Relayout => {
                self.layout.apply();
                self.report_dimensions();
            }
            SessionEffect::ExternalInput(mode) => self.set_external_input(mode),
            SessionEffect::FocusWord(cell) => {
                let overlay = self.overlay.borrow();
                if let Some(overlay) = overlay.as_ref() {
                    let element = self.session.try_borrow().ok().and_then(|session| {
                        cell.and_then(|cell| session.engine().cell_element(cell))
                    });
                    overlay.place(element.as_ref());
                }
            }
        }
    }

    fn post(&self, message: &AgentMsg) {
        let Ok(parent) = self.window.parent() else {
            return;
        };
        let Some(parent) = parent else {
            return;
        };
        if let Err(err) = post_message(
            &parent,
            message,
            self.config.puzzle_id.as_deref(),
            &self.config.host_origin,
        ) {
            gloo::console::warn!("bridge: post failed", err.to_string());
        }
    }

    fn report_dimensions(self: &Rc<Self>) {
        let height = self.layout.content_height();
        if (height - self.last_height.get()).abs() < 1.0 {
            return;
        }
        self.last_height.set(height);
        let width = self.layout.content_width();
        self.run(|session| session.report_dimensions(DimensionsData { height, width }));
    }

    fn set_external_input(self: &Rc<Self>, mode: Option<ExternalInputMode>) {
        let native = self
            .window
            .document()
            .and_then(|document| document.get_element_by_id(NATIVE_INPUT_ID));
        if let Some(native) = native.as_ref() {
            set_native_hidden(native, mode.is_some());
        }
        if mode != Some(ExternalInputMode::Overlay) {
            self.overlay.borrow_mut().take();
            return;
        }
        if self.overlay.borrow().is_some() {
            return;
        }
        let Some(document) = self.window.document() else {
            return;
        };
        let on_input = {
            let weak = Rc::downgrade(self);
            Rc::new(move |value: String| {
                if let Some(installed) = weak.upgrade() {
                    installed.run(|session| {
                        session.apply_overlay_input(&value);
                    });
                }
            }) as Rc<dyn Fn(String)>
        };
        let on_key = {
            let weak: Weak<Installed> = Rc::downgrade(self);
            Rc::new(move |key: OverlayKey| {
                if let Some(installed) = weak.upgrade() {
                    installed.on_overlay_key(key);
                }
            }) as Rc<dyn Fn(OverlayKey)>
        };
        let overlay = ExternalOverlay::new(&self.window, &document, on_input, on_key);
        if overlay.is_none() {
            gloo::console::warn!("bridge: overlay unavailable, using hidden input");
        }
        *self.overlay.borrow_mut() = overlay;
    }

    fn on_overlay_key(self: &Rc<Self>, key: OverlayKey) {
        match key {
            OverlayKey::Backspace => self.run(|session| session.backspace()),
            OverlayKey::Escape => self.run(|session| session.deselect()),
            OverlayKey::Commit => {
                // Through the decorated global so the commit is observed.
                let name = JsValue::from_str(EntryPoint::AcceptWord.global_name());
                let accept = Reflect::get(&self.window, &name)
                    .ok()
                    .and_then(|value| value.dyn_into::<Function>().ok());
                if let Some(accept) = accept {
                    if let Err(err) = accept.call0(&self.window) {
                        gloo::console::warn!("bridge: accept failed", js_err(err));
                    }
                }
            }
            OverlayKey::Passthrough => {}
        }
        let composed = self
            .session
            .try_borrow()
            .ok()
            .map(|session| session.engine().native_input())
            .unwrap_or_default();
        if let Some(overlay) = self.overlay.borrow().as_ref() {
            overlay.set_value(&composed);
        }
    }

    fn on_host_message(self: &Rc<Self>, event: &MessageEvent) {
        if !is_valid_origin(&event.origin(), &self.own_origin, &self.config.allowed_origins) {
            return;
        }
        if let (Some(source), Ok(Some(parent))) = (event.source(), self.window.parent()) {
            if !same_object(&source, &parent) {
                return;
            }
        }
        let envelope = match decode_message::<HostMsg>(&event.data()) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return,
            Err(err) => {
                gloo::console::warn!("bridge: rejected host message", err.to_string());
                return;
            }
        };
        if let (Some(expected), Some(actual)) =
            (self.config.puzzle_id.as_deref(), envelope.puzzle_id.as_deref())
        {
            if expected != actual {
                return;
            }
        }
        self.run(|session| session.handle_host_message(envelope.message));
    }
}
