use std::cell::Cell;

use serde::{Deserialize, Serialize};

use crate::render_mode::RenderMode;

pub const DEFAULT_MIN_CELL_PX: f64 = 16.0;
pub const DEFAULT_MAX_CELL_PX: f64 = 48.0;
pub const DEFAULT_GRID_GAP_PX: f64 = 1.0;
pub const DEFAULT_FONT_RATIO: f64 = 0.6;
pub const DEFAULT_MAX_ASPECT_DEVIATION: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SizingConfig {
    pub min_cell_px: f64,
    pub max_cell_px: f64,
    pub grid_gap_px: f64,
    pub font_ratio: f64,
    pub horizontal_padding_px: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            min_cell_px: DEFAULT_MIN_CELL_PX,
            max_cell_px: DEFAULT_MAX_CELL_PX,
            grid_gap_px: DEFAULT_GRID_GAP_PX,
            font_ratio: DEFAULT_FONT_RATIO,
            horizontal_padding_px: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizingParameters {
    pub cell_size_px: f64,
    pub font_size_px: f64,
    pub grid_gap_px: f64,
}

impl SizingParameters {
    /// Total table width that keeps every cell square.
    pub fn locked_table_width(&self, cols: u32) -> f64 {
        let cols = cols.max(1) as f64;
        cols * self.cell_size_px + (cols - 1.0) * self.grid_gap_px
    }
}

pub fn compute_sizing(container_width: f64, cols: u32, config: &SizingConfig) -> SizingParameters {
    let min_cell = config.min_cell_px.max(1.0);
    let max_cell = config.max_cell_px.max(min_cell);
    let gap = config.grid_gap_px.max(0.0);
    let cols_f = cols.max(1) as f64;
    let usable = container_width - 2.0 * config.horizontal_padding_px - (cols_f - 1.0) * gap;
    let raw = if usable.is_finite() && usable > 0.0 {
        (usable / cols_f).floor()
    } else {
        min_cell
    };
    let cell_size_px = raw.clamp(min_cell, max_cell);
    SizingParameters {
        cell_size_px,
        font_size_px: (cell_size_px * config.font_ratio).round().max(1.0),
        grid_gap_px: gap,
    }
}

/// Stylesheet that locks the legacy table to `params`. Covers both a
/// `table#crossword` and a table nested inside `#crossword`.
pub fn sizing_stylesheet(grid_id: &str, params: &SizingParameters, cols: u32) -> String {
    let width = params.locked_table_width(cols);
    let cell = params.cell_size_px;
    format!(
        "table#{grid_id},#{grid_id} table{{table-layout:fixed;width:{width}px;border-spacing:{gap}px;}}\
#{grid_id} td{{width:{cell}px;height:{cell}px;min-width:{cell}px;max-width:{cell}px;\
font-size:{font}px;line-height:{cell}px;padding:0;box-sizing:border-box;text-align:center;overflow:hidden;}}",
        gap = params.grid_gap_px,
        font = params.font_size_px,
    )
}

/// Snapshot of how the browser actually laid the grid out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutProbe {
    pub cell_width: f64,
    pub cell_height: f64,
    pub fixed_table_layout: bool,
}

impl LayoutProbe {
    pub fn visible(&self) -> bool {
        self.cell_width > 0.0 && self.cell_height > 0.0
    }

    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.visible() {
            Some(self.cell_width / self.cell_height)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DistortionConfig {
    pub enabled: bool,
    pub max_aspect_deviation: f64,
    pub require_fixed_layout: bool,
}

impl Default for DistortionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_aspect_deviation: DEFAULT_MAX_ASPECT_DEVIATION,
            require_fixed_layout: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distortion {
    AspectRatio { ratio: f64 },
    IncompatibleLayout,
}

pub fn detect_distortion(probe: &LayoutProbe, config: &DistortionConfig) -> Option<Distortion> {
    if !config.enabled {
        return None;
    }
    let ratio = probe.aspect_ratio()?;
    if (ratio - 1.0).abs() > config.max_aspect_deviation {
        return Some(Distortion::AspectRatio { ratio });
    }
    if config.require_fixed_layout && !probe.fixed_table_layout {
        return Some(Distortion::IncompatibleLayout);
    }
    None
}

/// Latches once; every later `try_fire` returns false.
#[derive(Debug, Default)]
pub struct FallbackGuard {
    fired: Cell<bool>,
}

impl FallbackGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_fire(&self) -> bool {
        !self.fired.replace(true)
    }

    pub fn has_fired(&self) -> bool {
        self.fired.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FallbackDecision {
    Keep,
    /// Commit to classic mode and reload once.
    DowngradeAndReload(Distortion),
    /// Distorted again after the reload budget was spent.
    AlreadyFellBack(Distortion),
}

/// Distortion checks for one document lifetime.
#[derive(Debug)]
pub struct DistortionMonitor {
    config: DistortionConfig,
    guard: FallbackGuard,
}

impl DistortionMonitor {
    pub fn new(config: DistortionConfig) -> Self {
        Self {
            config,
            guard: FallbackGuard::new(),
        }
    }

    pub fn check(&self, probe: &LayoutProbe, mode: RenderMode) -> FallbackDecision {
        if mode == RenderMode::Classic {
            return FallbackDecision::Keep;
        }
        let Some(distortion) = detect_distortion(probe, &self.config) else {
            return FallbackDecision::Keep;
        };
        if self.guard.try_fire() {
            FallbackDecision::DowngradeAndReload(distortion)
        } else {
            FallbackDecision::AlreadyFellBack(distortion)
        }
    }

    pub fn has_fallen_back(&self) -> bool {
        self.guard.has_fired()
    }
}
