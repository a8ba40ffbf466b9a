//! JavaScript-facing stage object
//!
//! `ArStage` wraps an `ActionManager` in `Rc<RefCell<..>>` so async tasks
//! and the XR frame loop can share it. Borrows never live across an await:
//! async work clones what it needs, awaits, then borrows again to apply the
//! result.

use arstage_core::environment::load_environment;
use arstage_core::{
    ActionManager, FrameInfo, FrameStats, ModelMode, ModelSource, RenderMode, SessionProvider,
    StageConfig,
};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};
use web_sys::{XrFrame, XrSession};

use crate::backend::WebXrBackend;
use crate::fetch::HttpAssetSource;
use crate::init_logging;
use crate::renderer::WebGlRenderer;

type FrameCallback = Closure<dyn FnMut(f64, XrFrame)>;

struct Stage {
    actions: ActionManager<WebXrBackend, HttpAssetSource>,
    renderer: WebGlRenderer,
}

#[wasm_bindgen]
pub struct ArStage {
    inner: Rc<RefCell<Stage>>,
    stats: Rc<RefCell<FrameStats>>,
    frame_loop: Rc<RefCell<Option<FrameCallback>>>,
}

#[wasm_bindgen]
impl ArStage {
    /// Create the stage. `config_json` is an optional partial configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<ArStage, JsValue> {
        let config = match config_json {
            Some(json) => StageConfig::from_json(&json).map_err(|e| JsValue::from_str(&e.to_string()))?,
            None => StageConfig::default(),
        };
        init_logging(&config.log_level);

        let renderer = WebGlRenderer::new(&config.canvas_container)?;
        let mut actions = ActionManager::new(WebXrBackend::new(), HttpAssetSource, config);

        let stats = Rc::new(RefCell::new(FrameStats::default()));
        let recorder = stats.clone();
        actions.add_render_callback(Box::new(move |info: &FrameInfo| recorder.borrow_mut().record(info)));

        let stage = ArStage {
            inner: Rc::new(RefCell::new(Stage {
                actions,
                renderer,
            })),
            stats,
            frame_loop: Rc::new(RefCell::new(None)),
        };
        stage.spawn_environment_load();
        stage.spawn_test_model_load();
        info!("AR stage created");
        Ok(stage)
    }

    /// Resolves to whether immersive AR sessions can be requested
    #[wasm_bindgen(js_name = isAvailable)]
    pub fn is_available(&self) -> js_sys::Promise {
        let backend = self.inner.borrow().actions.backend().clone();
        future_to_promise(async move {
            let available = SessionProvider::check_availability(&backend).await;
            Ok(JsValue::from_bool(available))
        })
    }

    /// Resolves to whether a session was started
    #[wasm_bindgen(js_name = startSession)]
    pub fn start_session(&self) -> js_sys::Promise {
        let inner = self.inner.clone();
        let frame_loop = self.frame_loop.clone();
        future_to_promise(async move {
            let (backend, init) = {
                let mut stage = inner.borrow_mut();
                let init = stage.actions.begin_session_request();
                (stage.actions.backend().clone(), init)
            };
            let result = SessionProvider::negotiate(&backend, &init).await;

            let session = {
                let mut stage = inner.borrow_mut();
                if !stage.actions.finish_session_request(result) {
                    return Ok(JsValue::FALSE);
                }
                let Some(session) = stage.actions.session().cloned() else {
                    return Ok(JsValue::FALSE);
                };
                if let Err(e) = stage.renderer.attach_session(&session) {
                    stage.actions.end_session();
                    return Err(e);
                }
                session
            };
            start_frame_loop(&inner, &frame_loop, &session);
            Ok(JsValue::TRUE)
        })
    }

    #[wasm_bindgen(js_name = endSession)]
    pub fn end_session(&self) {
        self.inner.borrow_mut().actions.end_session();
    }

    #[wasm_bindgen(js_name = switchRenderMode)]
    pub fn switch_render_mode(&self, mode: &str) -> Result<(), JsValue> {
        let mode: RenderMode = mode.parse().map_err(|e| JsValue::from_str(&format!("{e}")))?;
        self.inner.borrow_mut().actions.switch_render_mode(mode);
        Ok(())
    }

    #[wasm_bindgen(js_name = renderMode)]
    pub fn render_mode(&self) -> String {
        self.inner.borrow().actions.render_mode().to_string()
    }

    #[wasm_bindgen(js_name = switchModelMode)]
    pub fn switch_model_mode(&self, mode: &str) -> Result<(), JsValue> {
        let mode: ModelMode = mode.parse().map_err(|e| JsValue::from_str(&format!("{e}")))?;
        self.inner.borrow_mut().actions.switch_model_mode(mode);
        Ok(())
    }

    #[wasm_bindgen(js_name = modelMode)]
    pub fn model_mode(&self) -> String {
        self.inner.borrow().actions.model_mode().to_string()
    }

    /// Select `"testcube"` or a model URL. Resolves to true once the model
    /// is current, or false when a later selection replaced this one first.
    #[wasm_bindgen(js_name = selectModel)]
    pub fn select_model(&self, value: String) -> js_sys::Promise {
        let source = ModelSource::parse(&value);
        let inner = self.inner.clone();
        let (loader, ticket) = {
            let mut stage = inner.borrow_mut();
            if source == ModelSource::TestAsset && stage.actions.use_test_model() {
                return js_sys::Promise::resolve(&JsValue::TRUE);
            }
            let ticket = stage.actions.begin_selection();
            (stage.actions.loader().clone(), ticket)
        };

        future_to_promise(async move {
            let result = loader.load_model(&source).await;
            let mut stage = inner.borrow_mut();
            let Stage { actions, renderer } = &mut *stage;
            match actions.finish_selection(ticket, source.slot(), result, renderer) {
                Ok(installed) => Ok(JsValue::from_bool(installed)),
                Err(e) => {
                    warn!(model = %value, error = %e, "Model selection failed");
                    Err(JsValue::from_str(&e.to_string()))
                }
            }
        })
    }

    #[wasm_bindgen(js_name = isLoading)]
    pub fn is_loading(&self) -> bool {
        self.inner.borrow().actions.is_loading()
    }

    /// Rotate the world by a horizontal drag distance in pixels
    #[wasm_bindgen(js_name = rotateWorld)]
    pub fn rotate_world(&self, delta_px: f64) -> bool {
        self.inner.borrow_mut().actions.rotate_world(delta_px)
    }

    /// Set the film-mode field of view; returns the clamped value
    #[wasm_bindgen(js_name = setZoom)]
    pub fn set_zoom(&self, fov: f32) -> f32 {
        self.inner.borrow_mut().actions.set_zoom(fov)
    }

    pub fn zoom(&self) -> f32 {
        self.inner.borrow().actions.zoom()
    }

    pub fn fps(&self) -> f64 {
        self.stats.borrow().fps()
    }
}

impl ArStage {
    fn spawn_environment_load(&self) {
        let inner = self.inner.clone();
        let url = inner.borrow().actions.config().hdri_url.clone();
        spawn_local(async move {
            match load_environment(&HttpAssetSource, &url).await {
                Ok(environment) => inner.borrow_mut().actions.apply_environment(environment),
                Err(e) => warn!(url = %url, error = %e, "Environment unavailable, using flat lighting"),
            }
        });
    }

    fn spawn_test_model_load(&self) {
        let inner = self.inner.clone();
        let loader = inner.borrow().actions.loader().clone();
        spawn_local(async move {
            match loader.load_model(&ModelSource::TestAsset).await {
                Ok(model) => {
                    let mut stage = inner.borrow_mut();
                    let Stage { actions, renderer } = &mut *stage;
                    actions.preload_test_model(model, renderer);
                }
                Err(e) => warn!(error = %e, "Test model unavailable"),
            }
        });
    }
}

/// Drive `session` with a self-rescheduling animation-frame callback. The
/// loop ends when the stage no longer holds this session.
fn start_frame_loop(
    inner: &Rc<RefCell<Stage>>,
    frame_loop: &Rc<RefCell<Option<FrameCallback>>>,
    session: &XrSession,
) {
    let stage = inner.clone();
    let handle = frame_loop.clone();
    let callback = Closure::<dyn FnMut(f64, XrFrame)>::new(move |time: f64, frame: XrFrame| {
        let session = frame.session();
        {
            let mut stage = stage.borrow_mut();
            let Stage { actions, renderer } = &mut *stage;
            if actions.session() != Some(&session) {
                debug!("Session no longer current, frame loop stopped");
                return;
            }
            actions.on_frame(time, Some(&frame), renderer);
        }
        if let Some(callback) = handle.borrow().as_ref() {
            session.request_animation_frame(callback.as_ref().unchecked_ref());
        }
    });
    session.request_animation_frame(callback.as_ref().unchecked_ref());
    *frame_loop.borrow_mut() = Some(callback);
    info!("XR frame loop started");
}
