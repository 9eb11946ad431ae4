use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use gloo::events::EventListener;
use gloo::timers::callback::Timeout;
use js_sys::Array;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    Document, Element, HtmlIFrameElement, HtmlScriptElement, HtmlStyleElement, MessageEvent,
    MutationObserver, MutationObserverInit, ResizeObserver, Window,
};

use crossbridge_core::host_layout::{
    fingerprint_ids, matches_legacy_engine, measure_content_height, theme_stylesheet,
    FingerprintProbe, ThemeVars, Throttle, UNBOUNDED_HEIGHT_THRESHOLD,
};
use crossbridge_core::protocol::{CellUpdateData, DimensionsData};
use crossbridge_core::{is_valid_origin, AgentMsg, CellId, HostConfig, HostMsg};

use crate::boot::write_boot_config;
use crate::grid_layout::height_sample;
use crate::wire::{decode_message, js_err, now_ms, post_message, same_object};

const THEME_STYLE_ID: &str = "crossbridge-theme";
const AGENT_SCRIPT_ID: &str = "crossbridge-agent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PuzzleSource {
    Url(String),
    /// Full HTML of the legacy document.
    Inline(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStatus {
    /// Whether the agent reported ready; `false` means the puzzle runs bare.
    pub bridged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("container is not attached to a document")]
    Detached,
    #[error("iframe setup failed: {0}")]
    Frame(String),
    #[error("embedded document is not reachable")]
    Unreachable,
    #[error("agent injection failed: {0}")]
    Inject(String),
    #[error("bridge did not report ready within {0} ms")]
    BridgeTimeout(u32),
    #[error("send failed: {0}")]
    Send(String),
}

#[derive(Clone, Default)]
pub struct HostHooks {
    pub on_load: Option<Rc<dyn Fn(LoadStatus)>>,
    pub on_error: Option<Rc<dyn Fn(HostError)>>,
    pub on_dimensions_update: Option<Rc<dyn Fn(DimensionsData)>>,
    pub on_puzzle_event: Option<Rc<dyn Fn(AgentMsg)>>,
}

type MutationCallback = Closure<dyn FnMut(Array, MutationObserver)>;
type ResizeCallback = Closure<dyn FnMut(Array, ResizeObserver)>;

struct Inner {
    window: Window,
    document: Document,
    iframe: HtmlIFrameElement,
    config: HostConfig,
    hooks: HostHooks,
    own_origin: String,
    bridge_ready: Cell<bool>,
    load_reported: Cell<bool>,
    unmounted: Cell<bool>,
    listeners: RefCell<Vec<EventListener>>,
    ready_timer: RefCell<Option<Timeout>>,
    theme_timer: RefCell<Option<Timeout>>,
    dimension_throttle: RefCell<Throttle>,
    pending_dimensions: Cell<Option<DimensionsData>>,
    dimension_timer: RefCell<Option<Timeout>>,
    resize_throttle: RefCell<Throttle>,
    resize_timer: RefCell<Option<Timeout>>,
    theme_observer: RefCell<Option<(MutationObserver, MutationCallback)>>,
    resize_observer: RefCell<Option<(ResizeObserver, ResizeCallback)>>,
}

/// Owns one puzzle iframe and its bridge. Dropping the controller unmounts it.
pub struct HostController {
    inner: Rc<Inner>,
}

impl HostController {
    pub fn mount(
        container: &Element,
        source: PuzzleSource,
        config: HostConfig,
        hooks: HostHooks,
    ) -> Result<Self, HostError> {
        let window = web_sys::window().ok_or(HostError::Detached)?;
        let document = container.owner_document().ok_or(HostError::Detached)?;
        let iframe = document
            .create_element("iframe")
            .map_err(|err| HostError::Frame(js_err(err)))?
            .dyn_into::<HtmlIFrameElement>()
            .map_err(|_| HostError::Frame("not an iframe".to_string()))?;
        iframe.set_title("Crossword puzzle");
        let _ = iframe.set_attribute(
            "style",
            "display:block;width:100%;border:0;overflow:hidden;",
        );
        iframe.set_attribute("scrolling", "no").ok();
        match &source {
            PuzzleSource::Url(url) => iframe.set_src(url),
            PuzzleSource::Inline(html) => iframe.set_srcdoc(html),
        }

        let own_origin = window.location().origin().unwrap_or_default();
        let inner = Rc::new(Inner {
            window,
            document,
            iframe,
            dimension_throttle: RefCell::new(Throttle::new(config.dimension_throttle_ms)),
            resize_throttle: RefCell::new(Throttle::new(config.resize_throttle_ms)),
            config,
            hooks,
            own_origin,
            bridge_ready: Cell::new(false),
            load_reported: Cell::new(false),
            unmounted: Cell::new(false),
            listeners: RefCell::new(Vec::new()),
            ready_timer: RefCell::new(None),
            theme_timer: RefCell::new(None),
            pending_dimensions: Cell::new(None),
            dimension_timer: RefCell::new(None),
            resize_timer: RefCell::new(None),
            theme_observer: RefCell::new(None),
            resize_observer: RefCell::new(None),
        });

        let weak = Rc::downgrade(&inner);
        let load = EventListener::new(&inner.iframe, "load", move |_event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_frame_load();
            }
        });
        let weak = Rc::downgrade(&inner);
        let message = EventListener::new(&inner.window, "message", move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Some(event) = event.dyn_ref::<MessageEvent>() {
                inner.on_message(event);
            }
        });
        inner.listeners.borrow_mut().extend([load, message]);

        container
            .append_child(&inner.iframe)
            .map_err(|err| HostError::Frame(js_err(err)))?;
        inner.observe_theme();
        inner.observe_container(container);
        Ok(Self { inner })
    }

    pub fn iframe(&self) -> &HtmlIFrameElement {
        &self.inner.iframe
    }

    pub fn is_bridged(&self) -> bool {
        self.inner.bridge_ready.get()
    }

    pub fn send(&self, message: &HostMsg) -> Result<(), HostError> {
        self.inner.send(message)
    }

    pub fn request_state(&self) -> Result<(), HostError> {
        self.send(&HostMsg::GetState)
    }

    /// Forwards a peer's cell write into the embedded puzzle.
    pub fn apply_remote_cell_update(&self, cell: CellId, value: &str) -> Result<(), HostError> {
        self.send(&HostMsg::ApplyCellUpdate(CellUpdateData {
            cell_id: cell,
            value: value.to_string(),
        }))
    }

    pub fn sync_theme(&self) {
        self.inner.sync_theme();
    }

    pub fn unmount(&self) {
        self.inner.unmount();
    }
}

impl Drop for HostController {
    fn drop(&mut self) {
        self.inner.unmount();
    }
}

fn report_error(hooks: &HostHooks, error: HostError) {
    gloo::console::warn!("host:", error.to_string());
    if let Some(on_error) = hooks.on_error.as_ref() {
        on_error(error);
    }
}

impl Inner {
    fn content_window(&self) -> Option<Window> {
        self.iframe.content_window()
    }

    fn send(&self, message: &HostMsg) -> Result<(), HostError> {
        if self.unmounted.get() {
            return Err(HostError::Unreachable);
        }
        let target = self.content_window().ok_or(HostError::Unreachable)?;
        post_message(
            &target,
            message,
            self.config.puzzle_id.as_deref(),
            &self.config.target_origin,
        )
        .map_err(|err| HostError::Send(err.to_string()))
    }

    fn report_load(&self) {
        if self.load_reported.replace(true) {
            return;
        }
        if let Some(on_load) = self.hooks.on_load.as_ref() {
            on_load(LoadStatus {
                bridged: self.bridge_ready.get(),
            });
        }
    }

    fn on_frame_load(self: &Rc<Self>) {
        if self.unmounted.get() {
            return;
        }
        self.bridge_ready.set(false);
        self.load_reported.set(false);
        let Some(document) = self.iframe.content_document() else {
            report_error(&self.hooks, HostError::Unreachable);
            self.report_load();
            return;
        };
        if !matches_legacy_engine(&fingerprint(&document)) {
            gloo::console::log!("host: document is not a legacy crossword, running bare");
            self.report_load();
            return;
        }
        if let Err(err) = self.inject(&document) {
            report_error(&self.hooks, err);
            self.report_load();
            return;
        }
        self.measure();

        let weak = Rc::downgrade(self);
        let timeout_ms = self.config.bridge_ready_timeout_ms;
        let timer = Timeout::new(timeout_ms, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.ready_timer.borrow_mut().take();
            if inner.bridge_ready.get() {
                return;
            }
            report_error(&inner.hooks, HostError::BridgeTimeout(timeout_ms));
            inner.report_load();
        });
        *self.ready_timer.borrow_mut() = Some(timer);
    }

    fn inject(&self, document: &Document) -> Result<(), HostError> {
        let target = self.content_window().ok_or(HostError::Unreachable)?;
        if self.theme_vars().is_empty() {
            gloo::console::log!("host: no theme variables on host page");
        }
        self.write_theme(document);
        write_boot_config(&target, &self.config.agent_boot_config())
            .map_err(|err| HostError::Inject(err.to_string()))?;

        if document.get_element_by_id(AGENT_SCRIPT_ID).is_some() {
            return Ok(());
        }
        let script = document
            .create_element("script")
            .map_err(|err| HostError::Inject(js_err(err)))?
            .dyn_into::<HtmlScriptElement>()
            .map_err(|_| HostError::Inject("not a script element".to_string()))?;
        script.set_id(AGENT_SCRIPT_ID);
        script.set_type("module");
        let url = serde_json::to_string(&self.config.agent_url)
            .map_err(|err| HostError::Inject(err.to_string()))?;
        script
            .set_text(&format!(
                "import init, {{ start_bridge_agent }} from {url};\nawait init();\nstart_bridge_agent();"
            ))
            .map_err(|err| HostError::Inject(js_err(err)))?;
        let parent = document
            .head()
            .map(|head| head.unchecked_into::<Element>())
            .or_else(|| document.body().map(|body| body.unchecked_into::<Element>()))
            .ok_or_else(|| HostError::Inject("document has no head or body".to_string()))?;
        parent
            .append_child(&script)
            .map_err(|err| HostError::Inject(js_err(err)))?;
        Ok(())
    }

    fn theme_vars(&self) -> ThemeVars {
        let Some(root) = self.document.document_element() else {
            return ThemeVars::default();
        };
        let Ok(Some(style)) = self.window.get_computed_style(&root) else {
            return ThemeVars::default();
        };
        let read = |name: &str| {
            style
                .get_property_value(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let names = &self.config.theme_vars;
        ThemeVars {
            background: read(&names.background),
            foreground: read(&names.foreground),
            accent: read(&names.accent),
        }
    }

    fn write_theme(&self, document: &Document) {
        let css = theme_stylesheet(&self.theme_vars());
        let style = match document.get_element_by_id(THEME_STYLE_ID) {
            Some(existing) => existing.dyn_into::<HtmlStyleElement>().ok(),
            None => {
                let created = document
                    .create_element("style")
                    .ok()
                    .and_then(|element| element.dyn_into::<HtmlStyleElement>().ok());
                if let (Some(style), Some(head)) = (created.as_ref(), document.head()) {
                    style.set_id(THEME_STYLE_ID);
                    let _ = head.append_child(style);
                }
                created
            }
        };
        if let Some(style) = style {
            if style.text_content().as_deref() != Some(css.as_str()) {
                style.set_text_content(Some(&css));
            }
        }
    }

    fn sync_theme(&self) {
        if self.unmounted.get() {
            return;
        }
        if let Some(document) = self.iframe.content_document() {
            self.write_theme(&document);
        }
    }

    fn observe_theme(self: &Rc<Self>) {
        let Some(root) = self.document.document_element() else {
            return;
        };
        let weak = Rc::downgrade(self);
        let callback: MutationCallback =
            Closure::wrap(Box::new(move |_records: Array, _observer: MutationObserver| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let debounced = Rc::downgrade(&inner);
                let timer = Timeout::new(inner.config.theme_debounce_ms, move || {
                    if let Some(inner) = debounced.upgrade() {
                        inner.theme_timer.borrow_mut().take();
                        inner.sync_theme();
                    }
                });
                *inner.theme_timer.borrow_mut() = Some(timer);
            }));
        let Ok(observer) = MutationObserver::new(callback.as_ref().unchecked_ref()) else {
            return;
        };
        let options = MutationObserverInit::new();
        options.set_attributes(true);
        options.set_attribute_filter(&Array::of2(
            &JsValue::from_str("style"),
            &JsValue::from_str("class"),
        ));
        if observer.observe_with_options(&root, &options).is_ok() {
            *self.theme_observer.borrow_mut() = Some((observer, callback));
        }
    }

    fn observe_container(self: &Rc<Self>, container: &Element) {
        let weak = Rc::downgrade(self);
        let callback: ResizeCallback =
            Closure::wrap(Box::new(move |_entries: Array, _observer: ResizeObserver| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_container_resize();
                }
            }));
        let Ok(observer) = ResizeObserver::new(callback.as_ref().unchecked_ref()) else {
            return;
        };
        observer.observe(container);
        *self.resize_observer.borrow_mut() = Some((observer, callback));
    }

    fn on_container_resize(self: &Rc<Self>) {
        let now = now_ms();
        if self.resize_throttle.borrow_mut().allow(now) {
            self.measure();
            return;
        }
        if self.resize_timer.borrow().is_some() {
            return;
        }
        let wait = self.resize_throttle.borrow().remaining(now).ceil() as u32;
        let weak = Rc::downgrade(self);
        let timer = Timeout::new(wait, move || {
            if let Some(inner) = weak.upgrade() {
                inner.resize_timer.borrow_mut().take();
                inner.resize_throttle.borrow_mut().allow(now_ms());
                inner.measure();
            }
        });
        *self.resize_timer.borrow_mut() = Some(timer);
    }

    /// Measures the embedded document directly; only possible same-origin.
    fn measure(&self) {
        let (Some(window), Some(document)) =
            (self.content_window(), self.iframe.content_document())
        else {
            return;
        };
        let height = measure_content_height(&height_sample(&window, &document), None);
        if height > 0.0 {
            self.apply_dimensions(DimensionsData { height, width: 0.0 });
        }
    }

    fn capped_height(&self, height: f64) -> f64 {
        match self.config.max_height_px {
            Some(cap) if cap <= UNBOUNDED_HEIGHT_THRESHOLD => height.min(cap),
            _ => height,
        }
    }

    fn apply_dimensions(&self, dimensions: DimensionsData) {
        if self.unmounted.get() {
            return;
        }
        let height = self.capped_height(dimensions.height.max(0.0)).ceil();
        let _ = self
            .iframe
            .style()
            .set_property("height", &format!("{height}px"));
        if let Some(on_dimensions) = self.hooks.on_dimensions_update.as_ref() {
            on_dimensions(DimensionsData {
                height,
                width: dimensions.width,
            });
        }
    }

    fn on_dimensions(self: &Rc<Self>, dimensions: DimensionsData) {
        let now = now_ms();
        if self.dimension_throttle.borrow_mut().allow(now) {
            self.apply_dimensions(dimensions);
            return;
        }
        // Trailing edge: the newest measurement wins.
        self.pending_dimensions.set(Some(dimensions));
        if self.dimension_timer.borrow().is_some() {
            return;
        }
        let wait = self.dimension_throttle.borrow().remaining(now).ceil() as u32;
        let weak: Weak<Inner> = Rc::downgrade(self);
        let timer = Timeout::new(wait, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.dimension_timer.borrow_mut().take();
            if let Some(pending) = inner.pending_dimensions.take() {
                inner.dimension_throttle.borrow_mut().allow(now_ms());
                inner.apply_dimensions(pending);
            }
        });
        *self.dimension_timer.borrow_mut() = Some(timer);
    }

    fn on_message(self: &Rc<Self>, event: &MessageEvent) {
        if self.unmounted.get() {
            return;
        }
        let Some(frame_window) = self.content_window() else {
            return;
        };
        let Some(source) = event.source() else {
            return;
        };
        if !same_object(&source, &frame_window) {
            return;
        }
        if !is_valid_origin(&event.origin(), &self.own_origin, &self.config.allowed_origins) {
            gloo::console::warn!("host: message from disallowed origin", event.origin());
            return;
        }
        let envelope = match decode_message::<AgentMsg>(&event.data()) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return,
            Err(err) => {
                gloo::console::warn!("host: rejected agent message", err.to_string());
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
        match envelope.message {
            AgentMsg::Dimensions(dimensions) => self.on_dimensions(dimensions),
            message => {
                if matches!(message, AgentMsg::IframeReady(_)) {
                    self.bridge_ready.set(true);
                    self.ready_timer.borrow_mut().take();
                    self.report_load();
                }
                if let Some(on_event) = self.hooks.on_puzzle_event.as_ref() {
                    on_event(message);
                }
            }
        }
    }

    fn unmount(&self) {
        if self.unmounted.replace(true) {
            return;
        }
        if let Some((observer, _callback)) = self.theme_observer.borrow_mut().take() {
            observer.disconnect();
        }
        if let Some((observer, _callback)) = self.resize_observer.borrow_mut().take() {
            observer.disconnect();
        }
        self.ready_timer.borrow_mut().take();
        self.theme_timer.borrow_mut().take();
        self.dimension_timer.borrow_mut().take();
        self.resize_timer.borrow_mut().take();
        self.listeners.borrow_mut().clear();
        self.iframe.remove();
    }
}

fn fingerprint(document: &Document) -> FingerprintProbe {
    let element_ids = fingerprint_ids()
        .filter(|id| document.get_element_by_id(id).is_some())
        .map(str::to_string)
        .collect();
    let scripts = document.get_elements_by_tag_name("script");
    let mut script_text = String::new();
    for index in 0..scripts.length() {
        if let Some(text) = scripts.item(index).and_then(|script| script.text_content()) {
            script_text.push_str(&text);
            script_text.push('\n');
        }
    }
    FingerprintProbe {
        element_ids,
        script_text,
    }
}
