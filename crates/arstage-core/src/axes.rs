//! World-origin axes helper: red X, green Y, blue Z

use std::rc::Rc;

use crate::scene::{Geometry, Material, Node, Primitive};

pub const AXES_NODE_NAME: &str = "ar-staging/axes";

const AXES: [(&str, [f32; 3], [f32; 4]); 3] = [
    ("x", [1.0, 0.0, 0.0], [1.0, 0.0, 0.0, 1.0]),
    ("y", [0.0, 1.0, 0.0], [0.0, 1.0, 0.0, 1.0]),
    ("z", [0.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0]),
];

/// One line segment of `length` along each positive axis from the origin
pub fn axes_helper(length: f32) -> Node {
    let mut node = Node::group(AXES_NODE_NAME);
    for (axis, direction, color) in AXES {
        let end = direction.map(|c| c * length);
        let mut material = Material::new(color);
        material.metallic = 0.0;
        node.children.push(Node::mesh(
            format!("{AXES_NODE_NAME}/{axis}"),
            vec![Primitive {
                geometry: Rc::new(Geometry::lines(vec![[0.0; 3], end])),
                material: Rc::new(material),
            }],
        ));
    }
    node
}
