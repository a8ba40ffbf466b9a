//! In-memory doubles for the platform seams, used by unit tests

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::engine::SceneRenderer;
use crate::error::{FetchError, XrError};
use crate::loader::AssetSource;
use crate::mode::RenderMode;
use crate::scene::{ResourceId, ResourceSink};
use crate::scene_manager::SceneManager;
use crate::session::{ReferenceSpaceKind, SessionInit, XrBackend};
use crate::transform::RigidTransform;

/// Negotiation step a `MockBackend` should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailStep {
    Session,
    ReferenceSpace,
    NoHitTest,
    HitTestSource,
}

#[derive(Debug, Default)]
struct MockState {
    unsupported: bool,
    fail: Option<FailStep>,
    next_session: u32,
    live: BTreeSet<u32>,
    sessions_requested: u32,
    offsets_created: u32,
    offsets_fail: bool,
    overlay_root: Option<String>,
}

/// XR runtime that grants sessions on demand and reports whatever hit the
/// frame carries
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Rc<RefCell<MockState>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockSession {
    pub id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockSpace {
    pub kind: ReferenceSpaceKind,
    pub origin: RigidTransform,
}

#[derive(Debug)]
pub struct MockHitSource;

#[derive(Debug, Default)]
pub struct MockFrame {
    pub hit: Option<RigidTransform>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsupported() -> Self {
        let backend = Self::default();
        backend.state.borrow_mut().unsupported = true;
        backend
    }

    pub fn failing_at(self, step: FailStep) -> Self {
        self.state.borrow_mut().fail = Some(step);
        self
    }

    /// Make every later offset-space request fail
    pub fn fail_offsets(&self) {
        self.state.borrow_mut().offsets_fail = true;
    }

    pub fn sessions_requested(&self) -> u32 {
        self.state.borrow().sessions_requested
    }

    pub fn live_sessions(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn offsets_created(&self) -> u32 {
        self.state.borrow().offsets_created
    }

    pub fn last_overlay_root(&self) -> Option<String> {
        self.state.borrow().overlay_root.clone()
    }

    fn fails_at(&self, step: FailStep) -> bool {
        self.state.borrow().fail == Some(step)
    }
}

impl XrBackend for MockBackend {
    type Session = MockSession;
    type Space = MockSpace;
    type HitTestSource = MockHitSource;
    type Frame = MockFrame;

    async fn is_session_supported(&self) -> Result<bool, XrError> {
        Ok(!self.state.borrow().unsupported)
    }

    async fn request_session(&self, init: &SessionInit) -> Result<MockSession, XrError> {
        let mut state = self.state.borrow_mut();
        state.sessions_requested += 1;
        if state.fail == Some(FailStep::Session) {
            return Err(XrError::SessionRequest("denied".to_string()));
        }
        state.next_session += 1;
        let id = state.next_session;
        state.live.insert(id);
        state.overlay_root = init.dom_overlay_root.clone();
        Ok(MockSession { id })
    }

    fn supports_hit_test(&self, _session: &MockSession) -> bool {
        !self.fails_at(FailStep::NoHitTest)
    }

    async fn request_reference_space(
        &self,
        _session: &MockSession,
        kind: ReferenceSpaceKind,
    ) -> Result<MockSpace, XrError> {
        if self.fails_at(FailStep::ReferenceSpace) {
            return Err(XrError::ReferenceSpace("not tracked".to_string()));
        }
        Ok(MockSpace {
            kind,
            origin: RigidTransform::IDENTITY,
        })
    }

    async fn request_hit_test_source(
        &self,
        _session: &MockSession,
        _space: &MockSpace,
    ) -> Result<MockHitSource, XrError> {
        if self.fails_at(FailStep::HitTestSource) {
            return Err(XrError::HitTestSource("busy".to_string()));
        }
        Ok(MockHitSource)
    }

    fn end_session(&self, session: &MockSession) {
        self.state.borrow_mut().live.remove(&session.id);
    }

    fn offset_space(&self, space: &MockSpace, offset: &RigidTransform) -> Option<MockSpace> {
        let mut state = self.state.borrow_mut();
        if state.offsets_fail {
            return None;
        }
        state.offsets_created += 1;
        Some(MockSpace {
            kind: space.kind,
            origin: space.origin.then(offset),
        })
    }

    fn hit_test(
        &self,
        frame: &MockFrame,
        _source: &MockHitSource,
        _space: &MockSpace,
    ) -> Option<RigidTransform> {
        frame.hit
    }
}

/// Counts draws instead of drawing
#[derive(Debug, Default)]
pub struct MockRenderer {
    pub frames: u32,
    pub last_mode: Option<RenderMode>,
    /// Reported as the frame's viewport shape
    pub aspect: Option<f32>,
}

impl SceneRenderer<MockBackend> for MockRenderer {
    fn viewport_aspect(&self, _frame: &MockFrame) -> Option<f32> {
        self.aspect
    }

    fn render(
        &mut self,
        _frame: &MockFrame,
        _space: Option<&MockSpace>,
        _scene: &SceneManager,
        mode: RenderMode,
    ) {
        self.frames += 1;
        self.last_mode = Some(mode);
    }
}

/// Remembers every released id
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub geometries: BTreeSet<ResourceId>,
    pub materials: BTreeSet<ResourceId>,
    pub textures: BTreeSet<ResourceId>,
}

impl ResourceSink for RecordingSink {
    fn release_geometry(&mut self, id: ResourceId) {
        self.geometries.insert(id);
    }

    fn release_material(&mut self, id: ResourceId) {
        self.materials.insert(id);
    }

    fn release_texture(&mut self, id: ResourceId) {
        self.textures.insert(id);
    }
}

/// Serves fixed byte blobs by URL
#[derive(Debug, Clone, Default)]
pub struct MockAssets {
    files: HashMap<String, Vec<u8>>,
}

impl MockAssets {
    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), bytes);
        self
    }
}

impl AssetSource for MockAssets {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError(format!("404 Not Found: {url}")))
    }
}

pub mod fixtures {
    use serde_json::json;

    /// Binary glTF of an axis-aligned cube with the given half extent.
    /// With `animated`, adds a one-second "Move" translation clip and a
    /// one-second "Grow" scale clip on the cube node.
    pub fn cube_glb(half_extent: f32, animated: bool) -> Vec<u8> {
        let h = half_extent;
        let positions: [[f32; 3]; 8] = [
            [-h, -h, -h],
            [h, -h, -h],
            [h, h, -h],
            [-h, h, -h],
            [-h, -h, h],
            [h, -h, h],
            [h, h, h],
            [-h, h, h],
        ];
        let indices: [u16; 36] = [
            0, 2, 1, 0, 3, 2, // back
            4, 5, 6, 4, 6, 7, // front
            0, 1, 5, 0, 5, 4, // bottom
            3, 7, 6, 3, 6, 2, // top
            0, 4, 7, 0, 7, 3, // left
            1, 2, 6, 1, 6, 5, // right
        ];

        let mut bin = Vec::new();
        for p in positions.iter().flatten() {
            bin.extend_from_slice(&p.to_le_bytes());
        }
        for i in indices {
            bin.extend_from_slice(&i.to_le_bytes());
        }
        let geometry_len = bin.len();

        let mut gltf = json!({
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "name": "Cube", "mesh": 0 }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] }],
            "accessors": [
                {
                    "bufferView": 0, "componentType": 5126, "count": 8, "type": "VEC3",
                    "min": [-h, -h, -h], "max": [h, h, h]
                },
                { "bufferView": 1, "componentType": 5123, "count": 36, "type": "SCALAR" }
            ],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 96 },
                { "buffer": 0, "byteOffset": 96, "byteLength": 72 }
            ]
        });

        if animated {
            let keys: [f32; 2] = [0.0, 1.0];
            let moves: [f32; 6] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
            let scales: [f32; 6] = [1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
            for v in keys.iter().chain(&moves).chain(&scales) {
                bin.extend_from_slice(&v.to_le_bytes());
            }
            let accessors = gltf["accessors"].as_array_mut().expect("accessors");
            accessors.push(json!({
                "bufferView": 2, "componentType": 5126, "count": 2, "type": "SCALAR",
                "min": [0.0], "max": [1.0]
            }));
            accessors.push(json!({ "bufferView": 3, "componentType": 5126, "count": 2, "type": "VEC3" }));
            accessors.push(json!({ "bufferView": 4, "componentType": 5126, "count": 2, "type": "VEC3" }));
            let views = gltf["bufferViews"].as_array_mut().expect("views");
            views.push(json!({ "buffer": 0, "byteOffset": geometry_len, "byteLength": 8 }));
            views.push(json!({ "buffer": 0, "byteOffset": geometry_len + 8, "byteLength": 24 }));
            views.push(json!({ "buffer": 0, "byteOffset": geometry_len + 32, "byteLength": 24 }));
            gltf["animations"] = json!([
                {
                    "name": "Move",
                    "channels": [{ "sampler": 0, "target": { "node": 0, "path": "translation" } }],
                    "samplers": [{ "input": 2, "output": 3, "interpolation": "LINEAR" }]
                },
                {
                    "name": "Grow",
                    "channels": [{ "sampler": 0, "target": { "node": 0, "path": "scale" } }],
                    "samplers": [{ "input": 2, "output": 4, "interpolation": "LINEAR" }]
                }
            ]);
        }

        gltf["buffers"] = json!([{ "byteLength": bin.len() }]);
        glb(&gltf, bin)
    }

    fn glb(gltf: &serde_json::Value, mut bin: Vec<u8>) -> Vec<u8> {
        let mut json = serde_json::to_vec(gltf).expect("serialize glTF");
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let total = 12 + 8 + json.len() + 8 + bin.len();

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);
        out
    }

    /// Uncompressed Radiance HDR where every pixel is red > green > blue
    pub fn flat_hdr(width: u32, height: u32) -> Vec<u8> {
        let mut out = format!(
            "#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y {height} +X {width}\n"
        )
        .into_bytes();
        for _ in 0..width * height {
            out.extend_from_slice(&[200, 100, 50, 128]);
        }
        out
    }
}
