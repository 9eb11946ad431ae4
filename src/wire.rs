use serde_json::Value;
use wasm_bindgen::JsValue;
use web_sys::Window;

use crossbridge_core::protocol::{decode_envelope, encode_envelope, Envelope, Message, ProtocolError};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("json: {0}")]
    Json(String),
    #[error("js: {0}")]
    Js(String),
}

pub fn js_err(error: JsValue) -> String {
    if let Some(value) = error.as_string() {
        return value;
    }
    if let Ok(json) = js_sys::JSON::stringify(&error) {
        if let Some(value) = json.as_string() {
            return value;
        }
    }
    "js error".to_string()
}

pub fn now_ms() -> f64 {
    js_sys::Date::now()
}

pub fn json_to_js(value: &Value) -> Result<JsValue, WireError> {
    let text = serde_json::to_string(value).map_err(|err| WireError::Json(err.to_string()))?;
    js_sys::JSON::parse(&text).map_err(|err| WireError::Js(js_err(err)))
}

/// Structured-clone payloads and JSON strings are both accepted.
pub fn js_to_json(value: &JsValue) -> Result<Value, WireError> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    let text = match value.as_string() {
        Some(text) => text,
        None => js_sys::JSON::stringify(value)
            .map_err(|err| WireError::Js(js_err(err)))?
            .as_string()
            .ok_or_else(|| WireError::Js("value is not serializable".to_string()))?,
    };
    serde_json::from_str(&text).map_err(|err| WireError::Json(err.to_string()))
}

pub fn encode_message<M: Message>(message: &M, puzzle_id: Option<&str>) -> Result<JsValue, WireError> {
    let raw = encode_envelope(message, puzzle_id, now_ms())?;
    json_to_js(&raw)
}

pub fn decode_message<M: Message>(data: &JsValue) -> Result<Option<Envelope<M>>, WireError> {
    let raw = js_to_json(data)?;
    Ok(decode_envelope::<M>(&raw)?)
}

pub fn post_message<M: Message>(
    target: &Window,
    message: &M,
    puzzle_id: Option<&str>,
    target_origin: &str,
) -> Result<(), WireError> {
    let payload = encode_message(message, puzzle_id)?;
    target
        .post_message(&payload, target_origin)
        .map_err(|err| WireError::Js(js_err(err)))
}

/// `true` when both values are the same JS object.
pub fn same_object(left: &JsValue, right: &JsValue) -> bool {
    js_sys::Object::is(left, right)
}
