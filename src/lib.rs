//! Browser half of crossbridge.
//!
//! Built once, loaded twice: the host page uses [`PuzzleFrame`] (or
//! [`HostController`] directly) to embed a legacy crossword, and the embedded
//! document imports the same module and calls [`start_bridge_agent`].

use wasm_bindgen::prelude::*;

pub mod boot;
pub mod bridge_agent;
pub mod dom_engine;
pub mod external_overlay;
pub mod grid_layout;
pub mod host_controller;
pub mod puzzle_frame;
pub mod render_mode_store;
pub mod wire;

pub use host_controller::{HostController, HostError, HostHooks, LoadStatus, PuzzleSource};
pub use puzzle_frame::{PuzzleFrame, PuzzleFrameHandle, PuzzleFrameProps};

#[wasm_bindgen]
pub fn start_bridge_agent() {
    bridge_agent::start();
}

#[wasm_bindgen]
pub fn stop_bridge_agent() {
    bridge_agent::stop();
}

#[wasm_bindgen]
pub fn bridge_agent_running() -> bool {
    bridge_agent::is_running()
}
