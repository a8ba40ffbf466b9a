//! GLB loading, scale normalization and animation extraction

use glam::{Quat, Vec3};
use serde::Serialize;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::animation::{AnimationClip, AnimationMixer, Channel, ChannelValues, Interpolation};
use crate::config::StageConfig;
use crate::error::{FetchError, LoadError};
use crate::scene::{AlphaMode, Geometry, Material, Node, NodeKind, Primitive, Texture};
use crate::scene_manager::ModelSlot;

/// Byte source for models and environment maps
#[allow(async_fn_in_trait)]
pub trait AssetSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// What the user asked to display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// The bundled test asset
    TestAsset,
    Url(String),
}

impl ModelSource {
    /// Selection value that stands for the bundled test asset
    pub const TEST_ASSET_KEY: &'static str = "testcube";

    pub fn parse(value: &str) -> Self {
        if value == Self::TEST_ASSET_KEY {
            Self::TestAsset
        } else {
            Self::Url(value.to_string())
        }
    }

    pub fn slot(&self) -> ModelSlot {
        match self {
            Self::TestAsset => ModelSlot::TestAsset,
            Self::Url(_) => ModelSlot::User,
        }
    }
}

/// A decoded model: hidden, normalized root plus its animations
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub root: Node,
    pub mixer: Option<AnimationMixer>,
}

impl LoadedModel {
    pub fn bounding_radius(&self) -> Option<f32> {
        self.root.bounding_box().map(|b| b.bounding_sphere().1)
    }

    pub fn summary(&self) -> ModelSummary {
        let mut meshes = 0;
        let mut primitives = 0;
        let mut vertices = 0;
        self.root.visit(glam::Mat4::IDENTITY, &mut |node, _| {
            if let NodeKind::Mesh(prims) = &node.kind {
                meshes += 1;
                primitives += prims.len();
                vertices += prims.iter().map(|p| p.geometry.vertex_count()).sum::<usize>();
            }
        });
        let clips = self
            .mixer
            .iter()
            .flat_map(|m| m.clips())
            .map(|c| ClipSummary {
                name: c.name.clone(),
                duration: c.duration,
                channels: c.channels.len(),
            })
            .collect();
        ModelSummary {
            name: self.root.name.clone(),
            nodes: self.root.node_count(),
            meshes,
            primitives,
            vertices,
            scale: self.root.scale.x,
            radius: self.bounding_radius().unwrap_or(0.0),
            clips,
        }
    }
}

/// Human-readable description of a loaded model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub nodes: usize,
    pub meshes: usize,
    pub primitives: usize,
    pub vertices: usize,
    /// Uniform scale applied during normalization
    pub scale: f32,
    /// Bounding-sphere radius after normalization
    pub radius: f32,
    pub clips: Vec<ClipSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipSummary {
    pub name: Option<String>,
    pub duration: f32,
    pub channels: usize,
}

/// Fetches and decodes models through an `AssetSource`
#[derive(Debug, Clone)]
pub struct ModelLoader<S> {
    source: S,
    test_model_url: String,
    target_radius: f32,
}

impl<S: AssetSource> ModelLoader<S> {
    pub fn new(source: S, config: &StageConfig) -> Self {
        Self {
            source,
            test_model_url: config.test_model_url.clone(),
            target_radius: config.target_radius,
        }
    }

    pub async fn load_model(&self, source: &ModelSource) -> Result<LoadedModel, LoadError> {
        let url = match source {
            ModelSource::TestAsset => self.test_model_url.as_str(),
            ModelSource::Url(url) => url.as_str(),
        };
        debug!(url, "Fetching model");
        let bytes = self
            .source
            .fetch(url)
            .await
            .map_err(|e| LoadError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        let model = decode_glb(&bytes, source.slot(), self.target_radius)?;
        info!(
            url,
            nodes = model.root.node_count(),
            clips = model.mixer.as_ref().map_or(0, |m| m.clips().len()),
            "Loaded model"
        );
        Ok(model)
    }
}

/// Decode a binary glTF into a hidden model scaled to `target_radius`
pub fn decode_glb(bytes: &[u8], slot: ModelSlot, target_radius: f32) -> Result<LoadedModel, LoadError> {
    let (document, buffers, images) = gltf::import_slice(bytes)?;
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(LoadError::EmptyScene)?;

    let textures: Vec<Option<Rc<Texture>>> = images.iter().map(convert_image).collect();
    let materials: Vec<Rc<Material>> = document
        .materials()
        .map(|m| Rc::new(convert_material(&m, &textures)))
        .collect();

    let mut builder = NodeBuilder {
        buffers: &buffers,
        materials: &materials,
        fallback_material: None,
        paths: HashMap::new(),
    };

    let mut root = Node::group(slot.node_name());
    for (index, node) in scene.nodes().enumerate() {
        root.children.push(builder.build(&node, vec![index]));
    }
    root.visible = false;
    normalize_scale(&mut root, target_radius);

    let clips: Vec<AnimationClip> = document
        .animations()
        .map(|a| convert_animation(&a, &buffers, &builder.paths))
        .filter(|c| !c.channels.is_empty())
        .collect();
    let mixer = (!clips.is_empty()).then(|| AnimationMixer::new(clips, &root));

    Ok(LoadedModel { root, mixer })
}

/// Scale `root` so its bounding sphere has radius `target_radius`.
///
/// The factor multiplies the current scale, so normalizing an already
/// normalized model leaves it unchanged. Returns the applied factor, or
/// `None` when the model has no extent to measure.
pub fn normalize_scale(root: &mut Node, target_radius: f32) -> Option<f32> {
    let radius = root.bounding_box()?.bounding_sphere().1;
    if radius <= f32::EPSILON {
        warn!(name = %root.name, "Model has zero extent, skipping rescale");
        return None;
    }
    let factor = target_radius / radius;
    root.scale *= factor;
    debug!(name = %root.name, radius, factor, "Normalized model scale");
    Some(factor)
}

struct NodeBuilder<'a> {
    buffers: &'a [gltf::buffer::Data],
    materials: &'a [Rc<Material>],
    fallback_material: Option<Rc<Material>>,
    /// glTF node index -> child path from the model root
    paths: HashMap<usize, Vec<usize>>,
}

impl NodeBuilder<'_> {
    fn build(&mut self, node: &gltf::Node, path: Vec<usize>) -> Node {
        let name = node
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("node{}", node.index()));

        let mut out = match node.mesh() {
            Some(mesh) => Node::mesh(name, self.primitives(&mesh)),
            None => Node::group(name),
        };
        let (translation, rotation, scale) = node.transform().decomposed();
        out.translation = Vec3::from(translation);
        out.rotation = Quat::from_array(rotation);
        out.scale = Vec3::from(scale);

        for (index, child) in node.children().enumerate() {
            let mut child_path = path.clone();
            child_path.push(index);
            out.children.push(self.build(&child, child_path));
        }
        self.paths.insert(node.index(), path);
        out
    }

    fn primitives(&mut self, mesh: &gltf::Mesh) -> Vec<Primitive> {
        let mut out = Vec::new();
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                debug!(mode = ?primitive.mode(), "Skipping non-triangle primitive");
                continue;
            }
            let buffers = self.buffers;
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
            let Some(positions) = reader.read_positions() else {
                warn!("Primitive has no positions, skipping");
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let normals = reader.read_normals().map(|n| n.collect());
            let uvs = reader.read_tex_coords(0).map(|t| t.into_f32().collect());
            let indices = reader.read_indices().map(|i| i.into_u32().collect());
            let geometry = Rc::new(Geometry::new(positions, normals, uvs, indices));

            let material = match primitive.material().index().and_then(|i| self.materials.get(i)) {
                Some(material) => material.clone(),
                None => self
                    .fallback_material
                    .get_or_insert_with(|| Rc::new(Material::default()))
                    .clone(),
            };
            out.push(Primitive { geometry, material });
        }
        out
    }
}

fn convert_image(image: &gltf::image::Data) -> Option<Rc<Texture>> {
    use gltf::image::Format;

    let rgba = match image.format {
        Format::R8G8B8A8 => image.pixels.clone(),
        Format::R8G8B8 => image
            .pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8G8 => image
            .pixels
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        Format::R8 => image.pixels.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        other => {
            warn!(format = ?other, "Unsupported texture format, ignoring");
            return None;
        }
    };
    Some(Rc::new(Texture::new(image.width, image.height, rgba)))
}

fn convert_material(material: &gltf::Material, textures: &[Option<Rc<Texture>>]) -> Material {
    let lookup = |texture: gltf::Texture<'_>| textures.get(texture.source().index()).cloned().flatten();
    let pbr = material.pbr_metallic_roughness();

    let mut out = Material::new(pbr.base_color_factor());
    out.name = material.name().map(str::to_owned);
    out.metallic = pbr.metallic_factor();
    out.roughness = pbr.roughness_factor();
    out.double_sided = material.double_sided();
    out.alpha_mode = match material.alpha_mode() {
        gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
        gltf::material::AlphaMode::Mask => AlphaMode::Mask(material.alpha_cutoff().unwrap_or(0.5)),
        gltf::material::AlphaMode::Blend => AlphaMode::Blend,
    };
    out.map = pbr.base_color_texture().and_then(|info| lookup(info.texture()));
    out.normal_map = material.normal_texture().and_then(|info| lookup(info.texture()));
    // glTF packs roughness (G) and metalness (B) into one image
    let packed = pbr
        .metallic_roughness_texture()
        .and_then(|info| lookup(info.texture()));
    out.roughness_map = packed.clone();
    out.metalness_map = packed;
    out
}

fn convert_animation(
    animation: &gltf::Animation,
    buffers: &[gltf::buffer::Data],
    paths: &HashMap<usize, Vec<usize>>,
) -> AnimationClip {
    use gltf::animation::util::ReadOutputs;

    let mut channels = Vec::new();
    for channel in animation.channels() {
        let Some(target) = paths.get(&channel.target().node().index()) else {
            debug!("Animation targets a node outside the scene, skipping channel");
            continue;
        };
        let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
        let Some(inputs) = reader.read_inputs() else {
            continue;
        };
        let times: Vec<f32> = inputs.collect();

        let sampler = channel.sampler().interpolation();
        let cubic = sampler == gltf::animation::Interpolation::CubicSpline;
        let interpolation = match sampler {
            gltf::animation::Interpolation::Step => Interpolation::Step,
            _ => Interpolation::Linear,
        };

        let values = match reader.read_outputs() {
            Some(ReadOutputs::Translations(values)) => {
                ChannelValues::Translation(keyframes(values.map(Vec3::from), cubic))
            }
            Some(ReadOutputs::Rotations(values)) => {
                ChannelValues::Rotation(keyframes(values.into_f32().map(Quat::from_array), cubic))
            }
            Some(ReadOutputs::Scales(values)) => {
                ChannelValues::Scale(keyframes(values.map(Vec3::from), cubic))
            }
            Some(ReadOutputs::MorphTargetWeights(_)) | None => {
                debug!("Unsupported animation output, skipping channel");
                continue;
            }
        };

        channels.push(Channel {
            target: target.clone(),
            interpolation,
            times,
            values,
        });
    }
    AnimationClip::new(animation.name().map(str::to_owned), channels)
}

/// Cubic-spline outputs store (in-tangent, value, out-tangent) per key;
/// only the value is kept and sampled linearly.
fn keyframes<T>(values: impl Iterator<Item = T>, cubic: bool) -> Vec<T> {
    if cubic {
        values.skip(1).step_by(3).collect()
    } else {
        values.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_manager::{TEST_MODEL_NAME, USER_MODEL_NAME};
    use crate::testing::{fixtures, MockAssets};

    #[test]
    fn test_model_source_parse() {
        assert_eq!(ModelSource::parse("testcube"), ModelSource::TestAsset);
        assert_eq!(
            ModelSource::parse("/uploads/chair.glb"),
            ModelSource::Url("/uploads/chair.glb".to_string())
        );
        assert_eq!(ModelSource::TestAsset.slot(), ModelSlot::TestAsset);
    }

    #[test]
    fn test_decode_normalizes_and_hides() {
        let bytes = fixtures::cube_glb(1.5, false);
        let model = decode_glb(&bytes, ModelSlot::User, 0.2).unwrap();

        assert_eq!(model.root.name, USER_MODEL_NAME);
        assert!(!model.root.visible);
        assert!(model.mixer.is_none());
        let radius = model.bounding_radius().unwrap();
        assert!((radius - 0.2).abs() < 1e-4, "radius was {radius}");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let bytes = fixtures::cube_glb(3.0, false);
        let mut model = decode_glb(&bytes, ModelSlot::User, 0.2).unwrap();
        let scale = model.root.scale;
        let factor = normalize_scale(&mut model.root, 0.2).unwrap();
        assert!((factor - 1.0).abs() < 1e-4);
        assert!((model.root.scale - scale).length() < 1e-5);
    }

    #[test]
    fn test_empty_extent_skips_rescale() {
        let mut root = Node::group("empty");
        assert!(normalize_scale(&mut root, 0.2).is_none());
        assert_eq!(root.scale, Vec3::ONE);
    }

    #[test]
    fn test_decode_animations() {
        let bytes = fixtures::cube_glb(1.0, true);
        let model = decode_glb(&bytes, ModelSlot::TestAsset, 0.2).unwrap();
        let mixer = model.mixer.as_ref().unwrap();

        assert_eq!(mixer.clips().len(), 2);
        assert_eq!(mixer.actions().len(), 2);
        assert_eq!(mixer.clips()[0].name.as_deref(), Some("Move"));
        assert_eq!(mixer.clips()[0].duration, 1.0);
        assert_eq!(mixer.clips()[0].channels[0].target, vec![0]);
        assert!(mixer.actions().iter().all(|a| !a.is_running()));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = decode_glb(b"definitely not a glb", ModelSlot::User, 0.2);
        assert!(matches!(result, Err(LoadError::Decode(_))));
    }

    #[test]
    fn test_summary() {
        let bytes = fixtures::cube_glb(1.0, true);
        let model = decode_glb(&bytes, ModelSlot::TestAsset, 0.2).unwrap();
        let summary = model.summary();
        assert_eq!(summary.name, TEST_MODEL_NAME);
        assert_eq!(summary.nodes, 2);
        assert_eq!(summary.meshes, 1);
        assert_eq!(summary.vertices, 8);
        assert_eq!(summary.clips.len(), 2);
        assert!((summary.radius - 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_load_test_asset() {
        let config = StageConfig::default();
        let assets = MockAssets::default().with(&config.test_model_url, fixtures::cube_glb(1.0, false));
        let loader = ModelLoader::new(assets, &config);

        let model = pollster::block_on(loader.load_model(&ModelSource::TestAsset)).unwrap();
        assert_eq!(model.root.name, TEST_MODEL_NAME);
        assert!(!model.root.visible);
        assert!((model.bounding_radius().unwrap() - 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_load_missing_url() {
        let loader = ModelLoader::new(MockAssets::default(), &StageConfig::default());
        let result = pollster::block_on(loader.load_model(&ModelSource::Url("/nope.glb".into())));
        match result {
            Err(LoadError::Fetch { url, .. }) => assert_eq!(url, "/nope.glb"),
            other => panic!("expected fetch error, got {other:?}"),
        }
    }
}
