//! WebXR implementation of the session port
//!
//! Hit testing and DOM overlay are not in the stable web-sys surface, so
//! those calls go through `js_sys::Reflect`.

use arstage_core::session::{ReferenceSpaceKind, SessionInit, XrBackend};
use arstage_core::{RigidTransform, XrError};
use js_sys::{Array, Function, Object, Promise, Reflect};
use tracing::{debug, warn};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    DomPointInit, XrFrame, XrPose, XrReferenceSpace, XrReferenceSpaceType, XrRigidTransform,
    XrSession, XrSessionInit, XrSessionMode, XrSystem,
};

/// Handle returned by `XRSession.requestHitTestSource`
#[derive(Debug, Clone)]
pub struct HitTestSource(JsValue);

#[derive(Debug, Clone)]
pub struct WebXrBackend {
    xr: Option<XrSystem>,
}

impl Default for WebXrBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl WebXrBackend {
    pub fn new() -> Self {
        let xr = web_sys::window()
            .and_then(|window| Reflect::get(&window.navigator(), &"xr".into()).ok())
            .filter(|xr| !xr.is_undefined() && !xr.is_null())
            .map(|xr| xr.unchecked_into::<XrSystem>());
        if xr.is_none() {
            debug!("navigator.xr is not available");
        }
        Self { xr }
    }

    fn system(&self) -> Result<&XrSystem, XrError> {
        self.xr.as_ref().ok_or(XrError::Unsupported)
    }
}

impl XrBackend for WebXrBackend {
    type Session = XrSession;
    type Space = XrReferenceSpace;
    type HitTestSource = HitTestSource;
    type Frame = XrFrame;

    async fn is_session_supported(&self) -> Result<bool, XrError> {
        let promise = self.system()?.is_session_supported(XrSessionMode::ImmersiveAr);
        let supported = JsFuture::from(promise)
            .await
            .map_err(|e| XrError::SessionRequest(describe(&e)))?;
        Ok(supported.as_bool().unwrap_or(false))
    }

    async fn request_session(&self, init: &SessionInit) -> Result<XrSession, XrError> {
        let options = session_init(init).map_err(|e| XrError::SessionRequest(describe(&e)))?;
        let promise = self
            .system()?
            .request_session_with_options(XrSessionMode::ImmersiveAr, &options);
        let session = JsFuture::from(promise)
            .await
            .map_err(|e| XrError::SessionRequest(describe(&e)))?;
        Ok(session.unchecked_into())
    }

    fn supports_hit_test(&self, session: &XrSession) -> bool {
        Reflect::get(session, &"requestHitTestSource".into())
            .map(|f| f.is_function())
            .unwrap_or(false)
    }

    async fn request_reference_space(
        &self,
        session: &XrSession,
        kind: ReferenceSpaceKind,
    ) -> Result<XrReferenceSpace, XrError> {
        let kind = match kind {
            ReferenceSpaceKind::Viewer => XrReferenceSpaceType::Viewer,
            ReferenceSpaceKind::LocalFloor => XrReferenceSpaceType::LocalFloor,
        };
        let space = JsFuture::from(session.request_reference_space(kind))
            .await
            .map_err(|e| XrError::ReferenceSpace(describe(&e)))?;
        Ok(space.unchecked_into())
    }

    async fn request_hit_test_source(
        &self,
        session: &XrSession,
        space: &XrReferenceSpace,
    ) -> Result<HitTestSource, XrError> {
        let request: Function = Reflect::get(session, &"requestHitTestSource".into())
            .ok()
            .and_then(|f| f.dyn_into().ok())
            .ok_or(XrError::HitTestUnsupported)?;
        let options = Object::new();
        Reflect::set(&options, &"space".into(), space)
            .map_err(|e| XrError::HitTestSource(describe(&e)))?;
        let promise: Promise = request
            .call1(session, &options)
            .and_then(|p| p.dyn_into::<Promise>())
            .map_err(|e| XrError::HitTestSource(describe(&e)))?;
        let source = JsFuture::from(promise)
            .await
            .map_err(|e| XrError::HitTestSource(describe(&e)))?;
        Ok(HitTestSource(source))
    }

    fn end_session(&self, session: &XrSession) {
        let promise = session.end();
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(e) = JsFuture::from(promise).await {
                debug!(error = %describe(&e), "Session end rejected");
            }
        });
    }

    fn offset_space(&self, space: &XrReferenceSpace, offset: &RigidTransform) -> Option<XrReferenceSpace> {
        match rigid_transform(offset) {
            Ok(transform) => Some(space.get_offset_reference_space(&transform)),
            Err(e) => {
                warn!(error = %describe(&e), "Could not build offset transform");
                None
            }
        }
    }

    fn hit_test(
        &self,
        frame: &XrFrame,
        source: &HitTestSource,
        space: &XrReferenceSpace,
    ) -> Option<RigidTransform> {
        let results: Array = call_method(frame, "getHitTestResults", &source.0)?
            .dyn_into()
            .ok()?;
        let first = results.get(0);
        if first.is_undefined() {
            return None;
        }
        let pose = call_method(&first, "getPose", space)?;
        if pose.is_null() || pose.is_undefined() {
            return None;
        }
        let pose: XrPose = pose.unchecked_into();
        Some(from_xr_transform(&pose.transform()))
    }
}

fn call_method(target: &JsValue, name: &str, arg: &JsValue) -> Option<JsValue> {
    let method: Function = Reflect::get(target, &name.into()).ok()?.dyn_into().ok()?;
    method.call1(target, arg).ok()
}

fn session_init(init: &SessionInit) -> Result<XrSessionInit, JsValue> {
    let options = Object::new();
    let required: Array = init.required_features.iter().map(JsValue::from).collect();
    let optional: Array = init.optional_features.iter().map(JsValue::from).collect();
    Reflect::set(&options, &"requiredFeatures".into(), &required)?;
    Reflect::set(&options, &"optionalFeatures".into(), &optional)?;

    if let Some(root_id) = &init.dom_overlay_root {
        let root = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id(root_id));
        match root {
            Some(root) => {
                let overlay = Object::new();
                Reflect::set(&overlay, &"root".into(), &root)?;
                Reflect::set(&options, &"domOverlay".into(), &overlay)?;
            }
            None => debug!(id = %root_id, "DOM overlay root not found, continuing without it"),
        }
    }
    Ok(options.unchecked_into())
}

fn dom_point(components: [f64; 4]) -> Result<DomPointInit, JsValue> {
    let point = Object::new();
    for (key, value) in ["x", "y", "z", "w"].into_iter().zip(components) {
        Reflect::set(&point, &key.into(), &value.into())?;
    }
    Ok(point.unchecked_into())
}

fn rigid_transform(transform: &RigidTransform) -> Result<XrRigidTransform, JsValue> {
    let position = dom_point(transform.position_components())?;
    let orientation = dom_point(transform.orientation_components())?;
    XrRigidTransform::new_with_position_and_orientation(&position, &orientation)
}

fn from_xr_transform(transform: &XrRigidTransform) -> RigidTransform {
    let p = transform.position();
    let o = transform.orientation();
    RigidTransform::from_components([p.x(), p.y(), p.z()], [o.x(), o.y(), o.z(), o.w()])
}

pub(crate) fn describe(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|e| String::from(e.message()))
        })
        .unwrap_or_else(|| format!("{value:?}"))
}
