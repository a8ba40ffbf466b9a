//! Owned scene graph with explicit GPU resource release
//!
//! Geometry, materials and textures are shared between nodes through `Rc`
//! and identified by a process-unique `ResourceId`. Removing a subtree from
//! the scene walks it and hands every id to a `ResourceSink`, which is how
//! the renderer learns it can free the matching GPU objects.

use glam::{Mat4, Quat, Vec3};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a geometry, material or texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Receiver of resources that are no longer referenced by the scene
///
/// The same texture may be reported more than once when several material
/// slots share it; implementations must tolerate repeated ids.
pub trait ResourceSink {
    fn release_geometry(&mut self, id: ResourceId);
    fn release_material(&mut self, id: ResourceId);
    fn release_texture(&mut self, id: ResourceId);
}

/// How indices group into primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    #[default]
    Triangles,
    /// Each index pair is one segment
    Lines,
}

/// Mesh data, one entry per vertex in each attribute
#[derive(Debug)]
pub struct Geometry {
    id: ResourceId,
    pub topology: Topology,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl Geometry {
    /// Missing normals default to +Z and missing texture coordinates to zero.
    /// Without indices the positions are drawn as a plain triangle list.
    pub fn new(
        positions: Vec<[f32; 3]>,
        normals: Option<Vec<[f32; 3]>>,
        uvs: Option<Vec<[f32; 2]>>,
        indices: Option<Vec<u32>>,
    ) -> Self {
        let count = positions.len();
        let normals = normals
            .filter(|n| n.len() == count)
            .unwrap_or_else(|| vec![[0.0, 0.0, 1.0]; count]);
        let uvs = uvs
            .filter(|u| u.len() == count)
            .unwrap_or_else(|| vec![[0.0, 0.0]; count]);
        let indices = indices.unwrap_or_else(|| (0..count as u32).collect());
        Self {
            id: ResourceId::next(),
            topology: Topology::Triangles,
            positions,
            normals,
            uvs,
            indices,
        }
    }

    /// Unindexed line segments, two positions per segment
    pub fn lines(positions: Vec<[f32; 3]>) -> Self {
        Self {
            topology: Topology::Lines,
            ..Self::new(positions, None, None, None)
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Interleaved `position, normal, uv` layout, 8 floats per vertex
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.positions.len() * 8);
        for ((p, n), uv) in self.positions.iter().zip(&self.normals).zip(&self.uvs) {
            out.extend_from_slice(p);
            out.extend_from_slice(n);
            out.extend_from_slice(uv);
        }
        out
    }
}

/// Decoded RGBA8 image
#[derive(Debug)]
pub struct Texture {
    id: ResourceId,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Texture {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            id: ResourceId::next(),
            width,
            height,
            rgba,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask(f32),
    Blend,
}

/// Metallic-roughness material with its optional texture maps
#[derive(Debug)]
pub struct Material {
    id: ResourceId,
    pub name: Option<String>,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
    pub map: Option<Rc<Texture>>,
    pub normal_map: Option<Rc<Texture>>,
    pub roughness_map: Option<Rc<Texture>>,
    pub metalness_map: Option<Rc<Texture>>,
    pub env_map: Option<Rc<Texture>>,
}

impl Default for Material {
    fn default() -> Self {
        Self::new([1.0, 1.0, 1.0, 1.0])
    }
}

impl Material {
    pub fn new(base_color: [f32; 4]) -> Self {
        Self {
            id: ResourceId::next(),
            name: None,
            base_color,
            metallic: 1.0,
            roughness: 1.0,
            alpha_mode: AlphaMode::Opaque,
            double_sided: false,
            map: None,
            normal_map: None,
            roughness_map: None,
            metalness_map: None,
            env_map: None,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// All populated texture slots
    pub fn texture_maps(&self) -> impl Iterator<Item = &Rc<Texture>> {
        [
            &self.map,
            &self.normal_map,
            &self.roughness_map,
            &self.metalness_map,
            &self.env_map,
        ]
        .into_iter()
        .flatten()
    }

    pub fn dispose(&self, sink: &mut dyn ResourceSink) {
        for texture in self.texture_maps() {
            sink.release_texture(texture.id());
        }
        sink.release_material(self.id);
    }
}

#[derive(Debug, Clone)]
pub struct Primitive {
    pub geometry: Rc<Geometry>,
    pub material: Rc<Material>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    Mesh(Vec<Primitive>),
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Sphere enclosing the box: centered on it, radius half the diagonal
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        (self.center(), (self.max - self.min).length() * 0.5)
    }
}

/// A node in the scene graph
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub visible: bool,
    pub children: Vec<Node>,
}

impl Node {
    pub fn group(name: impl Into<String>) -> Self {
        Self::with_kind(name, NodeKind::Group)
    }

    pub fn mesh(name: impl Into<String>, primitives: Vec<Primitive>) -> Self {
        Self::with_kind(name, NodeKind::Mesh(primitives))
    }

    fn with_kind(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            visible: true,
            children: Vec::new(),
        }
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Depth-first search by name, including this node
    pub fn find(&self, name: &str) -> Option<&Node> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Descendant reached by following child indices from this node
    pub fn descendant(&self, path: &[usize]) -> Option<&Node> {
        path.iter()
            .try_fold(self, |node, &index| node.children.get(index))
    }

    pub fn descendant_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let mut node = self;
        for &index in path {
            node = node.children.get_mut(index)?;
        }
        Some(node)
    }

    /// Number of nodes in this subtree, including this one
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Node::node_count).sum::<usize>()
    }

    /// Visit every node with its accumulated transform, starting from `parent`
    pub fn visit(&self, parent: Mat4, f: &mut dyn FnMut(&Node, Mat4)) {
        let world = parent * self.local_matrix();
        f(self, world);
        for child in &self.children {
            child.visit(world, f);
        }
    }

    /// Like `visit`, but skips hidden subtrees
    pub fn visit_visible(&self, parent: Mat4, f: &mut dyn FnMut(&Node, Mat4)) {
        if !self.visible {
            return;
        }
        let world = parent * self.local_matrix();
        f(self, world);
        for child in &self.children {
            child.visit_visible(world, f);
        }
    }

    /// Bounds of all vertices in this subtree, including this node's own
    /// transform. `None` when the subtree has no geometry.
    pub fn bounding_box(&self) -> Option<Aabb> {
        let mut bounds = Aabb::empty();
        self.visit(Mat4::IDENTITY, &mut |node, world| {
            if let NodeKind::Mesh(primitives) = &node.kind {
                for primitive in primitives {
                    for p in &primitive.geometry.positions {
                        bounds.expand(world.transform_point3(Vec3::from(*p)));
                    }
                }
            }
        });
        (!bounds.is_empty()).then_some(bounds)
    }

    /// Report every geometry, material and texture in this subtree
    pub fn dispose(&self, sink: &mut dyn ResourceSink) {
        if let NodeKind::Mesh(primitives) = &self.kind {
            for primitive in primitives {
                sink.release_geometry(primitive.geometry.id());
                primitive.material.dispose(sink);
            }
        }
        for child in &self.children {
            child.dispose(sink);
        }
    }
}
