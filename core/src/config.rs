use serde::{Deserialize, Serialize};

use crate::sizing::{DistortionConfig, SizingConfig};

pub const DEFAULT_INIT_RETRY_INTERVAL_MS: u32 = 100;
pub const DEFAULT_INIT_RETRY_LIMIT: u32 = 50;
pub const DEFAULT_SIZING_RETRY_INTERVAL_MS: u32 = 120;
pub const DEFAULT_SIZING_RETRY_LIMIT: u32 = 25;
pub const DEFAULT_HINT_THRESHOLD: u32 = 3;
pub const DEFAULT_PULSE_MS: u32 = 600;
pub const DEFAULT_REMOTE_HIGHLIGHT_MS: u32 = 900;

pub const DEFAULT_MAX_HEIGHT_PX: f64 = 2_400.0;
pub const DEFAULT_DIMENSION_THROTTLE_MS: u32 = 100;
pub const DEFAULT_RESIZE_THROTTLE_MS: u32 = 150;
pub const DEFAULT_THEME_DEBOUNCE_MS: u32 = 120;
pub const DEFAULT_BRIDGE_READY_TIMEOUT_MS: u32 = 4_000;
pub const DEFAULT_AGENT_URL: &str = "/crossbridge/crossbridge.js";

/// Settings for the agent running inside the embedded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    pub puzzle_id: Option<String>,
    pub multiplayer: bool,
    /// Origins allowed to command the agent besides its own.
    pub allowed_origins: Vec<String>,
    /// `postMessage` target for messages to the host.
    pub host_origin: String,
    pub sizing: SizingConfig,
    pub distortion: DistortionConfig,
    pub init_retry_interval_ms: u32,
    pub init_retry_limit: u32,
    pub sizing_retry_interval_ms: u32,
    pub sizing_retry_limit: u32,
    pub hint_threshold: u32,
    pub pulse_ms: u32,
    pub remote_highlight_ms: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            puzzle_id: None,
            multiplayer: false,
            allowed_origins: Vec::new(),
            host_origin: "*".to_string(),
            sizing: SizingConfig::default(),
            distortion: DistortionConfig::default(),
            init_retry_interval_ms: DEFAULT_INIT_RETRY_INTERVAL_MS,
            init_retry_limit: DEFAULT_INIT_RETRY_LIMIT,
            sizing_retry_interval_ms: DEFAULT_SIZING_RETRY_INTERVAL_MS,
            sizing_retry_limit: DEFAULT_SIZING_RETRY_LIMIT,
            hint_threshold: DEFAULT_HINT_THRESHOLD,
            pulse_ms: DEFAULT_PULSE_MS,
            remote_highlight_ms: DEFAULT_REMOTE_HIGHLIGHT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThemeVarNames {
    pub background: String,
    pub foreground: String,
    pub accent: String,
}

impl Default for ThemeVarNames {
    fn default() -> Self {
        Self {
            background: "--background".to_string(),
            foreground: "--foreground".to_string(),
            accent: "--accent".to_string(),
        }
    }
}

/// Settings for the hosting page's controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
    pub puzzle_id: Option<String>,
    pub multiplayer: bool,
    pub agent_url: String,
    /// Origins the host accepts agent messages from besides its own.
    pub allowed_origins: Vec<String>,
    /// `postMessage` target for commands to the embedded document.
    pub target_origin: String,
    /// `None` or anything above the unbounded threshold disables the cap.
    pub max_height_px: Option<f64>,
    pub dimension_throttle_ms: u32,
    pub resize_throttle_ms: u32,
    pub theme_debounce_ms: u32,
    pub bridge_ready_timeout_ms: u32,
    pub theme_vars: ThemeVarNames,
    /// Forwarded to the agent as part of its boot config.
    pub bridge: BridgeConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            puzzle_id: None,
            multiplayer: false,
            agent_url: option_env!("CROSSBRIDGE_AGENT_URL")
                .unwrap_or(DEFAULT_AGENT_URL)
                .to_string(),
            allowed_origins: Vec::new(),
            target_origin: "*".to_string(),
            max_height_px: Some(DEFAULT_MAX_HEIGHT_PX),
            dimension_throttle_ms: DEFAULT_DIMENSION_THROTTLE_MS,
            resize_throttle_ms: DEFAULT_RESIZE_THROTTLE_MS,
            theme_debounce_ms: DEFAULT_THEME_DEBOUNCE_MS,
            bridge_ready_timeout_ms: DEFAULT_BRIDGE_READY_TIMEOUT_MS,
            theme_vars: ThemeVarNames::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

impl HostConfig {
    /// Boot config handed to the agent: the host's puzzle id and multiplayer
    /// flag win over whatever `bridge` carries.
    pub fn agent_boot_config(&self) -> BridgeConfig {
        let mut bridge = self.bridge.clone();
        if self.puzzle_id.is_some() {
            bridge.puzzle_id = self.puzzle_id.clone();
        }
        bridge.multiplayer = bridge.multiplayer || self.multiplayer;
        bridge
    }
}
