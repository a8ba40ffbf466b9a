//! arstage for the browser
//!
//! Binds the arstage core to WebXR, renders with WebGL2 and exposes the
//! `ArStage` class to JavaScript.

mod backend;
mod fetch;
mod renderer;
mod stage;

use std::sync::Once;
use wasm_bindgen::prelude::*;

pub use backend::{HitTestSource, WebXrBackend};
pub use fetch::HttpAssetSource;
pub use renderer::WebGlRenderer;
pub use stage::ArStage;

static LOGGING: Once = Once::new();

/// WASM entry point
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
}

/// Install the console subscriber once; later stages reuse it.
pub(crate) fn init_logging(level: &str) {
    LOGGING.call_once(|| {
        let level = level.parse().unwrap_or(tracing::Level::WARN);
        tracing_wasm::set_as_global_default_with_config(
            tracing_wasm::WASMLayerConfigBuilder::new()
                .set_max_level(level)
                .build(),
        );
    });
}
