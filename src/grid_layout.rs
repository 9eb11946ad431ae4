use std::cell::{Cell, RefCell};
use std::rc::Rc;

use gloo::timers::callback::Interval;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlStyleElement, Window};

use crossbridge_core::host_layout::{
    measure_content_height, HeightSample, ANSWER_BOX_ID, GRID_ELEMENT_ID,
};
use crossbridge_core::sizing::{
    compute_sizing, sizing_stylesheet, DistortionMonitor, FallbackDecision, LayoutProbe,
};
use crossbridge_core::{BridgeConfig, RenderMode};

use crate::render_mode_store::persist_render_mode;

const STYLE_ELEMENT_ID: &str = "crossbridge-sizing";

/// Applies cell geometry to the legacy grid and watches for distortion.
pub struct GridLayout {
    window: Window,
    document: Document,
    cols: u32,
    mode: RenderMode,
    config: BridgeConfig,
    monitor: DistortionMonitor,
    settle: RefCell<Option<Interval>>,
}

impl GridLayout {
    pub fn new(
        window: Window,
        document: Document,
        cols: u32,
        mode: RenderMode,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            window,
            document,
            cols,
            mode,
            monitor: DistortionMonitor::new(config.distortion),
            config: config.clone(),
            settle: RefCell::new(None),
        }
    }

    fn grid(&self) -> Option<Element> {
        self.document.get_element_by_id(GRID_ELEMENT_ID)
    }

    fn table(&self, grid: &Element) -> Option<Element> {
        if grid.tag_name().eq_ignore_ascii_case("table") {
            return Some(grid.clone());
        }
        grid.query_selector("table").ok().flatten()
    }

    fn container_width(&self, grid: &Element) -> f64 {
        let parent = grid
            .parent_element()
            .map(|parent| parent.client_width() as f64)
            .unwrap_or(0.0);
        if parent > 0.0 {
            return parent;
        }
        self.window
            .inner_width()
            .ok()
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0)
    }

    fn style_element(&self) -> Option<HtmlStyleElement> {
        if let Some(existing) = self.document.get_element_by_id(STYLE_ELEMENT_ID) {
            return existing.dyn_into::<HtmlStyleElement>().ok();
        }
        let style = self
            .document
            .create_element("style")
            .ok()?
            .dyn_into::<HtmlStyleElement>()
            .ok()?;
        style.set_id(STYLE_ELEMENT_ID);
        self.document.head()?.append_child(&style).ok()?;
        Some(style)
    }

    fn probe(&self, grid: &Element) -> Option<LayoutProbe> {
        let cell = grid.query_selector("td").ok().flatten()?;
        let rect = cell.get_bounding_client_rect();
        let fixed_table_layout = self
            .table(grid)
            .and_then(|table| self.window.get_computed_style(&table).ok().flatten())
            .and_then(|style| style.get_property_value("table-layout").ok())
            .map(|value| value.trim() == "fixed")
            .unwrap_or(false);
        Some(LayoutProbe {
            cell_width: rect.width(),
            cell_height: rect.height(),
            fixed_table_layout,
        })
    }

    /// One sizing pass. Returns whether the grid had a visible size.
    pub fn apply(&self) -> bool {
        if self.monitor.has_fallen_back() {
            // Reload pending; stop touching the grid.
            return true;
        }
        let Some(grid) = self.grid() else {
            return false;
        };
        if self.mode == RenderMode::Premium {
            let params = compute_sizing(self.container_width(&grid), self.cols, &self.config.sizing);
            if let Some(style) = self.style_element() {
                let css = sizing_stylesheet(GRID_ELEMENT_ID, &params, self.cols);
                if style.text_content().as_deref() != Some(css.as_str()) {
                    style.set_text_content(Some(&css));
                }
            }
        }
        let Some(probe) = self.probe(&grid) else {
            return false;
        };
        if !probe.visible() {
            return false;
        }
        self.check_distortion(&probe);
        true
    }

    fn check_distortion(&self, probe: &LayoutProbe) {
        match self.monitor.check(probe, self.mode) {
            FallbackDecision::Keep => {}
            FallbackDecision::DowngradeAndReload(distortion) => {
                gloo::console::warn!(
                    "layout: grid distorted, falling back to classic",
                    format!("{distortion:?}")
                );
                if let Err(err) = persist_render_mode(RenderMode::Classic) {
                    gloo::console::warn!("layout: fallback persist failed", err);
                    return;
                }
                if let Err(err) = self.window.location().reload() {
                    gloo::console::warn!("layout: reload failed", crate::wire::js_err(err));
                }
            }
            FallbackDecision::AlreadyFellBack(_) => {}
        }
    }

    /// Re-applies sizing on an interval until the grid is visible or the retry
    /// ceiling is reached.
    pub fn settle(self: &Rc<Self>) {
        if self.apply() {
            self.settle.borrow_mut().take();
            return;
        }
        let limit = self.config.sizing_retry_limit;
        let attempts = Rc::new(Cell::new(0u32));
        let weak = Rc::downgrade(self);
        let interval = Interval::new(self.config.sizing_retry_interval_ms, move || {
            let Some(layout) = weak.upgrade() else {
                return;
            };
            attempts.set(attempts.get() + 1);
            let visible = layout.apply();
            if visible || attempts.get() >= limit {
                if !visible {
                    gloo::console::log!("layout: grid never became visible");
                }
                layout.settle.borrow_mut().take();
            }
        });
        *self.settle.borrow_mut() = Some(interval);
    }

    /// Height of the puzzle content, uncapped; the host applies its own cap.
    pub fn content_height(&self) -> f64 {
        measure_content_height(&height_sample(&self.window, &self.document), None)
    }

    pub fn content_width(&self) -> f64 {
        self.document
            .document_element()
            .map(|root| root.scroll_width() as f64)
            .unwrap_or(0.0)
    }

    pub fn teardown(&self) {
        self.settle.borrow_mut().take();
        if let Some(style) = self.document.get_element_by_id(STYLE_ELEMENT_ID) {
            style.remove();
        }
    }
}

/// Measurements of a legacy document: the outermost ancestor of the answer
/// box (or the grid) below `<body>`, plus the body's own extents as a fallback.
pub fn height_sample(window: &Window, document: &Document) -> HeightSample {
    let anchor = document
        .get_element_by_id(ANSWER_BOX_ID)
        .or_else(|| document.get_element_by_id(GRID_ELEMENT_ID));
    let container = anchor.map(|anchor| {
        let mut root = anchor;
        while let Some(parent) = root.parent_element() {
            if parent.tag_name().eq_ignore_ascii_case("body") {
                break;
            }
            root = parent;
        }
        root
    });
    let mut sample = HeightSample::default();
    if let Some(container) = container {
        sample.container_height = Some(container.get_bounding_client_rect().height());
        if let Ok(Some(style)) = window.get_computed_style(&container) {
            sample.margin_top = css_px(&style.get_property_value("margin-top").unwrap_or_default());
            sample.margin_bottom =
                css_px(&style.get_property_value("margin-bottom").unwrap_or_default());
        }
    }
    if let Some(body) = document.body() {
        sample.scroll_height = body.scroll_height() as f64;
        sample.offset_height = body.offset_height() as f64;
    }
    sample
}

fn css_px(value: &str) -> f64 {
    value.trim().trim_end_matches("px").parse().unwrap_or(0.0)
}
