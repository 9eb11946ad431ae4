use wasm_bindgen::JsCast;
use web_sys::{HtmlDocument, UrlSearchParams};

use crossbridge_core::render_mode::{
    render_mode_cookie, resolve_render_mode, ResolvedMode, RENDER_MODE_KEY,
    RENDER_MODE_QUERY_PARAM,
};
use crossbridge_core::RenderMode;

use crate::wire::js_err;

fn query_mode() -> Option<String> {
    let window = web_sys::window()?;
    let search = window.location().search().ok()?;
    let params = UrlSearchParams::new_with_str(&search).ok()?;
    params.get(RENDER_MODE_QUERY_PARAM)
}

fn stored_mode() -> Option<String> {
    let window = web_sys::window()?;
    let storage = window.local_storage().ok()??;
    storage.get_item(RENDER_MODE_KEY).ok()?
}

fn html_document() -> Option<HtmlDocument> {
    web_sys::window()?.document()?.dyn_into::<HtmlDocument>().ok()
}

fn cookie_header() -> Option<String> {
    html_document()?.cookie().ok()
}

/// Resolves the render mode for this load and writes back a query override.
pub fn load_render_mode() -> ResolvedMode {
    let query = query_mode();
    let stored = stored_mode();
    let cookies = cookie_header();
    let resolved = resolve_render_mode(query.as_deref(), stored.as_deref(), cookies.as_deref());
    if resolved.needs_persist() {
        if let Err(err) = persist_render_mode(resolved.mode) {
            gloo::console::warn!("layout: render mode persist failed", err);
        }
    }
    resolved
}

pub fn persist_render_mode(mode: RenderMode) -> Result<(), String> {
    let window = web_sys::window().ok_or("missing window")?;
    let storage_result = match window.local_storage() {
        Ok(Some(storage)) => storage.set_item(RENDER_MODE_KEY, mode.as_str()).map_err(js_err),
        Ok(None) => Err("storage unavailable".to_string()),
        Err(err) => Err(js_err(err)),
    };
    let cookie_result = match html_document() {
        Some(document) => document.set_cookie(&render_mode_cookie(mode)).map_err(js_err),
        None => Err("cookies unavailable".to_string()),
    };
    // Either store is enough for the next load to pick the mode up.
    storage_result.or(cookie_result)
}
