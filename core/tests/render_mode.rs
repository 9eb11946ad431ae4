use crossbridge_core::render_mode::{
    render_mode_cookie, render_mode_from_cookies, resolve_render_mode, ModeSource,
};
use crossbridge_core::RenderMode;

#[test]
fn query_wins_and_asks_to_persist() {
    let resolved = resolve_render_mode(Some("Classic"), Some("premium"), None);
    assert_eq!(resolved.mode, RenderMode::Classic);
    assert_eq!(resolved.source, ModeSource::Query);
    assert!(resolved.needs_persist());
}

#[test]
fn falls_through_storage_cookie_default() {
    let stored = resolve_render_mode(Some("bogus"), Some("classic"), None);
    assert_eq!(stored.source, ModeSource::Storage);
    assert!(!stored.needs_persist());

    let cookie = resolve_render_mode(
        None,
        None,
        Some("theme=dark; crossbridge.render_mode=classic"),
    );
    assert_eq!(cookie.mode, RenderMode::Classic);
    assert_eq!(cookie.source, ModeSource::Cookie);

    let fallback = resolve_render_mode(None, Some(""), Some("theme=dark"));
    assert_eq!(fallback.mode, RenderMode::Premium);
    assert_eq!(fallback.source, ModeSource::Default);
}

#[test]
fn cookie_lasts_a_year() {
    let cookie = render_mode_cookie(RenderMode::Classic);
    assert_eq!(
        cookie,
        "crossbridge.render_mode=classic; Max-Age=31536000; Path=/; SameSite=Lax"
    );
    assert_eq!(render_mode_from_cookies(&cookie), Some(RenderMode::Classic));
}
