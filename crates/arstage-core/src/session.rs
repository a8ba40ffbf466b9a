//! AR session negotiation behind a platform port
//!
//! `XrBackend` is the seam to the platform's XR runtime. The browser build
//! implements it over WebXR; tests use an in-memory backend.

use tracing::{debug, info, warn};

use crate::error::XrError;
use crate::transform::RigidTransform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSpaceKind {
    /// Follows the device
    Viewer,
    /// World-fixed, origin on the floor
    LocalFloor,
}

/// Features requested when opening an immersive AR session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInit {
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
    /// Element id shown on top of the camera feed, if the page has one
    pub dom_overlay_root: Option<String>,
}

impl SessionInit {
    pub fn immersive_ar(dom_overlay_root: Option<String>) -> Self {
        Self {
            required_features: vec!["local-floor".to_string(), "hit-test".to_string()],
            optional_features: vec!["dom-overlay".to_string()],
            dom_overlay_root,
        }
    }
}

/// Platform XR runtime
#[allow(async_fn_in_trait)]
pub trait XrBackend {
    type Session;
    type Space: Clone;
    type HitTestSource;
    type Frame;

    async fn is_session_supported(&self) -> Result<bool, XrError>;

    async fn request_session(&self, init: &SessionInit) -> Result<Self::Session, XrError>;

    fn supports_hit_test(&self, session: &Self::Session) -> bool;

    async fn request_reference_space(
        &self,
        session: &Self::Session,
        kind: ReferenceSpaceKind,
    ) -> Result<Self::Space, XrError>;

    async fn request_hit_test_source(
        &self,
        session: &Self::Session,
        space: &Self::Space,
    ) -> Result<Self::HitTestSource, XrError>;

    fn end_session(&self, session: &Self::Session);

    /// New space whose origin is `offset` expressed in `space`, or `None`
    /// when the platform could not build it
    fn offset_space(&self, space: &Self::Space, offset: &RigidTransform) -> Option<Self::Space>;

    /// Pose of the first hit result for this frame, relative to `space`
    fn hit_test(
        &self,
        frame: &Self::Frame,
        source: &Self::HitTestSource,
        space: &Self::Space,
    ) -> Option<RigidTransform>;
}

/// Everything acquired for a running session
pub struct ActiveSession<B: XrBackend> {
    pub session: B::Session,
    pub viewer_space: B::Space,
    pub tracking_space: B::Space,
    pub hit_test_source: B::HitTestSource,
}

/// Owns the active session and its hit-test source
pub struct SessionProvider<B: XrBackend> {
    backend: B,
    init: SessionInit,
    active: Option<ActiveSession<B>>,
}

impl<B: XrBackend> SessionProvider<B> {
    pub fn new(backend: B, init: SessionInit) -> Self {
        Self {
            backend,
            init,
            active: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether immersive AR can be requested. Platform errors count as "no".
    pub async fn is_session_available(&self) -> bool {
        Self::check_availability(&self.backend).await
    }

    pub async fn check_availability(backend: &B) -> bool {
        match backend.is_session_supported().await {
            Ok(supported) => supported,
            Err(e) => {
                debug!(error = %e, "Session support query failed");
                false
            }
        }
    }

    /// Open a session and acquire its spaces and hit-test source.
    /// Returns whether a session is now active.
    pub async fn request_session(&mut self) -> bool {
        let init = self.begin_request();
        let result = Self::negotiate(&self.backend, &init).await;
        self.finish_request(result)
    }

    /// First step of `request_session`: end any running session and hand
    /// out the init options. Hosts that cannot hold `&mut self` across an
    /// await drive `negotiate` themselves between this and `finish_request`.
    pub fn begin_request(&mut self) -> SessionInit {
        self.end_session();
        self.init.clone()
    }

    /// Talk to the platform. A session that was granted is ended again if
    /// a later step fails.
    pub async fn negotiate(backend: &B, init: &SessionInit) -> Result<ActiveSession<B>, XrError> {
        if !Self::check_availability(backend).await {
            return Err(XrError::Unsupported);
        }
        let session = backend.request_session(init).await?;
        match Self::acquire(backend, &session).await {
            Ok((viewer_space, tracking_space, hit_test_source)) => Ok(ActiveSession {
                session,
                viewer_space,
                tracking_space,
                hit_test_source,
            }),
            Err(e) => {
                backend.end_session(&session);
                Err(e)
            }
        }
    }

    async fn acquire(
        backend: &B,
        session: &B::Session,
    ) -> Result<(B::Space, B::Space, B::HitTestSource), XrError> {
        let tracking = backend
            .request_reference_space(session, ReferenceSpaceKind::LocalFloor)
            .await?;
        let viewer = backend
            .request_reference_space(session, ReferenceSpaceKind::Viewer)
            .await?;
        if !backend.supports_hit_test(session) {
            return Err(XrError::HitTestUnsupported);
        }
        let source = backend.request_hit_test_source(session, &viewer).await?;
        Ok((viewer, tracking, source))
    }

    /// Install the outcome of `negotiate`
    pub fn finish_request(&mut self, result: Result<ActiveSession<B>, XrError>) -> bool {
        match result {
            Ok(active) => {
                // a concurrent request may have completed first
                self.end_session();
                self.active = Some(active);
                info!("AR session started");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to start AR session");
                false
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn session(&self) -> Option<&B::Session> {
        self.active.as_ref().map(|a| &a.session)
    }

    pub fn hit_test_source(&self) -> Option<&B::HitTestSource> {
        self.active.as_ref().map(|a| &a.hit_test_source)
    }

    pub fn viewer_space(&self) -> Option<&B::Space> {
        self.active.as_ref().map(|a| &a.viewer_space)
    }

    pub fn tracking_space(&self) -> Option<&B::Space> {
        self.active.as_ref().map(|a| &a.tracking_space)
    }

    pub fn end_session(&mut self) {
        if let Some(active) = self.active.take() {
            self.backend.end_session(&active.session);
            info!("AR session ended");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailStep, MockBackend};
    use pollster::block_on;

    fn provider(backend: &MockBackend) -> SessionProvider<MockBackend> {
        SessionProvider::new(backend.clone(), SessionInit::immersive_ar(Some("react-ui".into())))
    }

    #[test]
    fn test_session_init_features() {
        let init = SessionInit::immersive_ar(None);
        assert!(init.required_features.contains(&"hit-test".to_string()));
        assert!(init.required_features.contains(&"local-floor".to_string()));
        assert!(init.optional_features.contains(&"dom-overlay".to_string()));
    }

    #[test]
    fn test_unsupported_platform() {
        let backend = MockBackend::unsupported();
        let mut provider = provider(&backend);
        assert!(!block_on(provider.is_session_available()));
        assert!(!block_on(provider.request_session()));
        assert!(!provider.is_active());
        assert_eq!(backend.sessions_requested(), 0);
    }

    #[test]
    fn test_successful_request() {
        let backend = MockBackend::new();
        let mut provider = provider(&backend);
        assert!(block_on(provider.is_session_available()));
        assert!(block_on(provider.request_session()));
        assert!(provider.session().is_some());
        assert!(provider.hit_test_source().is_some());
        assert!(provider.tracking_space().is_some());
        assert_eq!(backend.last_overlay_root().as_deref(), Some("react-ui"));
    }

    #[test]
    fn test_failed_step_ends_granted_session() {
        for step in [FailStep::ReferenceSpace, FailStep::HitTestSource, FailStep::NoHitTest] {
            let backend = MockBackend::new().failing_at(step);
            let mut provider = provider(&backend);
            assert!(!block_on(provider.request_session()), "{step:?}");
            assert!(provider.hit_test_source().is_none());
            assert_eq!(backend.live_sessions(), 0, "{step:?}");
        }
    }

    #[test]
    fn test_rejected_session_request() {
        let backend = MockBackend::new().failing_at(FailStep::Session);
        let mut provider = provider(&backend);
        assert!(!block_on(provider.request_session()));
        assert_eq!(backend.sessions_requested(), 1);
        assert_eq!(backend.live_sessions(), 0);
    }

    #[test]
    fn test_new_request_ends_previous_session() {
        let backend = MockBackend::new();
        let mut provider = provider(&backend);
        assert!(block_on(provider.request_session()));
        assert!(block_on(provider.request_session()));
        assert_eq!(backend.sessions_requested(), 2);
        assert_eq!(backend.live_sessions(), 1);

        provider.end_session();
        assert_eq!(backend.live_sessions(), 0);
        assert!(!provider.is_active());
    }
}
