use js_sys::Reflect;
use wasm_bindgen::JsValue;

use crossbridge_core::BridgeConfig;

use crate::wire::{js_err, js_to_json, json_to_js, WireError};

/// Global the host sets on the embedded window before loading the agent.
pub const BOOT_GLOBAL: &str = "__CROSSBRIDGE_BOOT";

fn boot_value(target: &JsValue) -> Option<JsValue> {
    let value = Reflect::get(target, &JsValue::from_str(BOOT_GLOBAL)).ok()?;
    if value.is_null() || value.is_undefined() {
        return None;
    }
    Some(value)
}

/// Boot config of the current window, falling back to defaults field by field.
pub fn read_boot_config() -> BridgeConfig {
    let Some(window) = web_sys::window() else {
        return BridgeConfig::default();
    };
    let Some(value) = boot_value(&window) else {
        return BridgeConfig::default();
    };
    match js_to_json(&value).and_then(|json| {
        serde_json::from_value::<BridgeConfig>(json).map_err(|err| WireError::Json(err.to_string()))
    }) {
        Ok(config) => config,
        Err(err) => {
            gloo::console::warn!("bridge: boot config ignored", err.to_string());
            BridgeConfig::default()
        }
    }
}

pub fn write_boot_config(target: &JsValue, config: &BridgeConfig) -> Result<(), WireError> {
    let json = serde_json::to_value(config).map_err(|err| WireError::Json(err.to_string()))?;
    let value = json_to_js(&json)?;
    Reflect::set(target, &JsValue::from_str(BOOT_GLOBAL), &value)
        .map_err(|err| WireError::Js(js_err(err)))?;
    Ok(())
}
