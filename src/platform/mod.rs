//! Platform abstraction layer
//!
//! Handles browser/native differences for:
//! - Wall clock in milliseconds
//! - Seeding
//! - Page unload (browser only)

use crate::model::SessionId;

/// Milliseconds on the clock the turn timers run against
#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> f64 {
    js_sys::Date::now()
}

#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or_default()
}

/// Fresh seed from the OS (or `crypto.getRandomValues` on the web)
pub fn entropy_seed() -> u64 {
    rand::random()
}

/// Session id from a `?join=<id>` query string, if there is one
pub fn join_param(query: &str) -> Option<SessionId> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "join")
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .map(SessionId::from)
}

/// Query string of the current page
#[cfg(target_arch = "wasm32")]
pub fn location_query() -> Option<String> {
    web_sys::window()?.location().search().ok()
}

/// Run `f` when the page is being closed or reloaded
#[cfg(target_arch = "wasm32")]
pub fn on_page_unload(mut f: impl FnMut() + 'static) {
    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::Closure;

    let Some(window) = web_sys::window() else {
        return;
    };
    let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| f());
    let _ = window.add_event_listener_with_callback("beforeunload", closure.as_ref().unchecked_ref());
    closure.forget();
}
