use serde::{Deserialize, Serialize};

pub const UNBOUNDED_HEIGHT_THRESHOLD: f64 = 10_000.0;

pub const GRID_ELEMENT_ID: &str = "crossword";
pub const NATIVE_INPUT_ID: &str = "wordentry";
pub const ANSWER_BOX_ID: &str = "answerbox";

const SECONDARY_FINGERPRINT_IDS: &[&str] = &[NATIVE_INPUT_ID, ANSWER_BOX_ID];
const SCRIPT_MARKERS: &[&str] = &["CrosswordWidth", "SelectThisWord"];

/// What the host could see of a freshly loaded document.
#[derive(Debug, Clone, Default)]
pub struct FingerprintProbe {
    pub element_ids: Vec<String>,
    pub script_text: String,
}

impl FingerprintProbe {
    fn has_id(&self, id: &str) -> bool {
        self.element_ids.iter().any(|present| present == id)
    }
}

/// Ids the host should look up before calling [`matches_legacy_engine`].
pub fn fingerprint_ids() -> impl Iterator<Item = &'static str> {
    std::iter::once(GRID_ELEMENT_ID).chain(SECONDARY_FINGERPRINT_IDS.iter().copied())
}

pub fn matches_legacy_engine(probe: &FingerprintProbe) -> bool {
    if !probe.has_id(GRID_ELEMENT_ID) {
        return false;
    }
    SECONDARY_FINGERPRINT_IDS.iter().any(|id| probe.has_id(id))
        || SCRIPT_MARKERS
            .iter()
            .any(|marker| probe.script_text.contains(marker))
}

/// Host theme colours carried across the iframe boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThemeVars {
    pub background: Option<String>,
    pub foreground: Option<String>,
    pub accent: Option<String>,
}

impl ThemeVars {
    pub fn is_empty(&self) -> bool {
        self.background.is_none() && self.foreground.is_none() && self.accent.is_none()
    }
}

fn css_value(raw: &Option<String>) -> Option<&str> {
    let value = raw.as_deref()?.trim();
    if value.is_empty() || value.contains(&['{', '}', ';', '<'][..]) {
        return None;
    }
    Some(value)
}

/// Stylesheet injected into the embedded document: theme variables plus the
/// overrides the bridge relies on.
pub fn theme_stylesheet(theme: &ThemeVars) -> String {
    let mut vars = String::new();
    if let Some(value) = css_value(&theme.background) {
        vars.push_str(&format!("--cb-background:{value};"));
    }
    if let Some(value) = css_value(&theme.foreground) {
        vars.push_str(&format!("--cb-foreground:{value};"));
    }
    if let Some(value) = css_value(&theme.accent) {
        vars.push_str(&format!("--cb-accent:{value};"));
    }
    format!(
        ":root{{{vars}}}\
body{{background:var(--cb-background,inherit);color:var(--cb-foreground,inherit);margin:0;}}\
#{GRID_ELEMENT_ID} td.cb-selected{{outline:2px solid var(--cb-accent,#3b82f6);}}\
#{GRID_ELEMENT_ID} td.cb-pulse-correct{{background:rgba(34,197,94,.35);transition:background .2s;}}\
#{GRID_ELEMENT_ID} td.cb-pulse-incorrect{{background:rgba(239,68,68,.35);transition:background .2s;}}\
#{GRID_ELEMENT_ID} td.cb-remote{{box-shadow:inset 0 0 0 2px var(--cb-accent,#f59e0b);}}\
.cb-native-hidden{{position:absolute!important;opacity:0!important;width:1px!important;height:1px!important;pointer-events:none!important;}}\
.cb-overlay{{position:absolute;z-index:10;background:transparent;border:0;outline:none;caret-color:var(--cb-accent,#3b82f6);color:transparent;text-transform:uppercase;}}"
    )
}

/// Raw measurements of the embedded document, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HeightSample {
    /// Bounding box height of the primary puzzle container, if found.
    pub container_height: Option<f64>,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub scroll_height: f64,
    pub offset_height: f64,
}

pub fn measure_content_height(sample: &HeightSample, max_height: Option<f64>) -> f64 {
    let measured = match sample.container_height {
        Some(height) if height > 0.0 => {
            height + sample.margin_top.max(0.0) + sample.margin_bottom.max(0.0)
        }
        _ => sample.scroll_height.max(sample.offset_height),
    };
    let measured = measured.max(0.0).ceil();
    match max_height {
        Some(cap) if cap <= UNBOUNDED_HEIGHT_THRESHOLD => measured.min(cap),
        _ => measured,
    }
}

/// Leading-edge throttle over caller supplied timestamps.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    interval_ms: f64,
    last_ms: Option<f64>,
}

impl Throttle {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms: interval_ms as f64,
            last_ms: None,
        }
    }

    pub fn allow(&mut self, now_ms: f64) -> bool {
        match self.last_ms {
            Some(last) if now_ms - last < self.interval_ms => false,
            _ => {
                self.last_ms = Some(now_ms);
                true
            }
        }
    }

    /// Milliseconds until the next call would be allowed.
    pub fn remaining(&self, now_ms: f64) -> f64 {
        match self.last_ms {
            Some(last) => (self.interval_ms - (now_ms - last)).max(0.0),
            None => 0.0,
        }
    }
}
