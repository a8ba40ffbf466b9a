//! Concentric floor rings that show where a hit test landed

use glam::{EulerRot, Quat, Vec3};
use std::f32::consts::{FRAC_PI_2, TAU};
use std::rc::Rc;

use crate::scene::{AlphaMode, Geometry, Material, Node, Primitive, ResourceSink};
use crate::transform::RigidTransform;

pub const GUIDE_NODE_NAME: &str = "ar-staging/guidecircle";

const RING_RADII: [f32; 3] = [0.15, 0.1, 0.05];
const RING_SEGMENTS: u32 = 32;
/// Each inner disc sits this much closer to the viewer than the previous one
const RING_SPACING: f32 = 0.01;
const RING_OPACITY: f32 = 0.1;

/// Placement guide; hidden until a hit result arrives
#[derive(Debug, Clone)]
pub struct GuideCircle {
    node: Node,
}

impl Default for GuideCircle {
    fn default() -> Self {
        Self::new()
    }
}

impl GuideCircle {
    pub fn new() -> Self {
        let mut material = Material::new([1.0, 1.0, 1.0, RING_OPACITY]);
        material.alpha_mode = AlphaMode::Blend;
        material.double_sided = true;
        let material = Rc::new(material);

        let mut node = Node::group(GUIDE_NODE_NAME);
        for (index, radius) in RING_RADII.into_iter().enumerate() {
            let mut ring = Node::mesh(
                format!("{GUIDE_NODE_NAME}/ring{index}"),
                vec![Primitive {
                    geometry: Rc::new(disc_geometry(radius, RING_SEGMENTS)),
                    material: material.clone(),
                }],
            );
            ring.translation.z = index as f32 * RING_SPACING;
            node.children.push(ring);
        }
        node.visible = false;
        Self { node }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn show(&mut self) {
        self.node.visible = true;
    }

    pub fn hide(&mut self) {
        self.node.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.node.visible
    }

    pub fn position(&self) -> Vec3 {
        self.node.translation
    }

    pub fn rotation(&self) -> Quat {
        self.node.rotation
    }

    pub fn update_position(&mut self, position: Vec3) {
        self.node.translation = position;
    }

    /// Keep only the heading of `orientation` and lay the rings flat on the floor
    pub fn update_rotation(&mut self, orientation: Quat) {
        let (yaw, _, roll) = orientation.to_euler(EulerRot::YXZ);
        self.node.rotation = Quat::from_euler(EulerRot::YXZ, yaw, -FRAC_PI_2, roll);
    }

    pub fn update_pose(&mut self, pose: &RigidTransform) {
        self.update_position(pose.position);
        self.update_rotation(pose.orientation);
    }

    pub fn dispose(&self, sink: &mut dyn ResourceSink) {
        self.node.dispose(sink);
    }
}

/// Triangle fan in the XY plane facing +Z
fn disc_geometry(radius: f32, segments: u32) -> Geometry {
    let mut positions = vec![[0.0, 0.0, 0.0]];
    let mut uvs = vec![[0.5, 0.5]];
    for i in 0..=segments {
        let theta = i as f32 / segments as f32 * TAU;
        let (sin, cos) = theta.sin_cos();
        positions.push([radius * cos, radius * sin, 0.0]);
        uvs.push([(cos + 1.0) * 0.5, (sin + 1.0) * 0.5]);
    }
    let normals = vec![[0.0, 0.0, 1.0]; positions.len()];
    let indices = (1..=segments).flat_map(|i| [0, i, i + 1]).collect();
    Geometry::new(positions, Some(normals), Some(uvs), Some(indices))
}
