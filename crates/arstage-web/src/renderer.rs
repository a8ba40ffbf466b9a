//! WebGL2 renderer drawing the scene into the XR session's base layer

use arstage_core::scene::{AlphaMode, Geometry, Material, NodeKind, Texture, Topology};
use arstage_core::{RenderMode, ResourceId, ResourceSink, SceneManager, SceneRenderer};
use glam::{Mat4, Vec3};
use js_sys::{Object, Reflect};
use std::collections::HashMap;
use tracing::{debug, trace, warn};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    HtmlCanvasElement, WebGl2RenderingContext as Gl, WebGlBuffer, WebGlProgram, WebGlShader,
    WebGlTexture, WebGlUniformLocation, WebGlVertexArrayObject, XrFrame, XrReferenceSpace,
    XrRenderStateInit, XrSession, XrView, XrWebGlLayer,
};

use crate::backend::{describe, WebXrBackend};

const VERTEX_SHADER: &str = r#"#version 300 es
precision highp float;

layout(location = 0) in vec3 a_position;
layout(location = 1) in vec3 a_normal;
layout(location = 2) in vec2 a_uv;

uniform mat4 u_model;
uniform mat4 u_view;
uniform mat4 u_projection;
uniform mat4 u_normalMatrix;

out vec3 v_normal;
out vec2 v_uv;

void main() {
    v_normal = normalize((u_normalMatrix * vec4(a_normal, 0.0)).xyz);
    v_uv = a_uv;
    gl_Position = u_projection * u_view * u_model * vec4(a_position, 1.0);
}
"#;

const FRAGMENT_SHADER: &str = r#"#version 300 es
precision highp float;

in vec3 v_normal;
in vec2 v_uv;

uniform vec4 u_baseColor;
uniform vec3 u_ambient;
uniform vec3 u_lightDirection;
uniform bool u_hasMap;
uniform sampler2D u_map;
uniform float u_alphaCutoff;

out vec4 fragColor;

void main() {
    vec4 color = u_baseColor;
    if (u_hasMap) {
        color *= texture(u_map, v_uv);
    }
    if (color.a < u_alphaCutoff) {
        discard;
    }
    float diffuse = max(dot(normalize(v_normal), -u_lightDirection), 0.0);
    fragColor = vec4(color.rgb * (u_ambient + vec3(diffuse)), color.a);
}
"#;

const UNIFORMS: [&str; 10] = [
    "u_model",
    "u_view",
    "u_projection",
    "u_normalMatrix",
    "u_baseColor",
    "u_ambient",
    "u_lightDirection",
    "u_hasMap",
    "u_map",
    "u_alphaCutoff",
];

/// Ambient term used until an environment map arrives
const DEFAULT_AMBIENT: Vec3 = Vec3::splat(0.6);
const LIGHT_DIRECTION: Vec3 = Vec3::new(-0.3, -1.0, -0.5);

struct GpuGeometry {
    vao: WebGlVertexArrayObject,
    vertices: WebGlBuffer,
    indices: WebGlBuffer,
    index_count: i32,
}

pub struct WebGlRenderer {
    gl: Gl,
    program: WebGlProgram,
    uniforms: HashMap<&'static str, WebGlUniformLocation>,
    geometries: HashMap<ResourceId, GpuGeometry>,
    textures: HashMap<ResourceId, WebGlTexture>,
}

impl WebGlRenderer {
    /// Create an XR-compatible canvas inside `container_id` (or the body)
    pub fn new(container_id: &str) -> Result<Self, JsValue> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| JsValue::from_str("No document"))?;
        let canvas: HtmlCanvasElement = document.create_element("canvas")?.dyn_into()?;
        match document.get_element_by_id(container_id) {
            Some(container) => container.append_child(&canvas)?,
            None => document
                .body()
                .ok_or_else(|| JsValue::from_str("No body"))?
                .append_child(&canvas)?,
        };

        let options = Object::new();
        Reflect::set(&options, &"xrCompatible".into(), &JsValue::TRUE)?;
        Reflect::set(&options, &"alpha".into(), &JsValue::TRUE)?;
        Reflect::set(&options, &"antialias".into(), &JsValue::TRUE)?;
        let gl: Gl = canvas
            .get_context_with_context_options("webgl2", &options)?
            .ok_or_else(|| JsValue::from_str("WebGL2 is not available"))?
            .dyn_into()?;

        Self::with_context(gl)
    }

    pub fn with_context(gl: Gl) -> Result<Self, JsValue> {
        let vertex = compile_shader(&gl, Gl::VERTEX_SHADER, VERTEX_SHADER)?;
        let fragment = compile_shader(&gl, Gl::FRAGMENT_SHADER, FRAGMENT_SHADER)?;
        let program = link_program(&gl, &vertex, &fragment)?;

        let uniforms = UNIFORMS
            .into_iter()
            .filter_map(|name| gl.get_uniform_location(&program, name).map(|loc| (name, loc)))
            .collect();

        gl.enable(Gl::DEPTH_TEST);
        gl.blend_func(Gl::SRC_ALPHA, Gl::ONE_MINUS_SRC_ALPHA);
        debug!("WebGL2 renderer ready");

        Ok(Self {
            gl,
            program,
            uniforms,
            geometries: HashMap::new(),
            textures: HashMap::new(),
        })
    }

    /// Make this context the session's output layer
    pub fn attach_session(&self, session: &XrSession) -> Result<(), JsValue> {
        let layer = XrWebGlLayer::new_with_web_gl2_rendering_context(session, &self.gl)?;
        let state = Object::new();
        Reflect::set(&state, &"baseLayer".into(), &layer)?;
        session.update_render_state_with_state(state.unchecked_ref::<XrRenderStateInit>());
        debug!("Attached WebGL layer to session");
        Ok(())
    }

    fn uniform(&self, name: &str) -> Option<&WebGlUniformLocation> {
        self.uniforms.get(name)
    }

    fn set_matrix(&self, name: &str, matrix: &Mat4) {
        self.gl
            .uniform_matrix4fv_with_f32_array(self.uniform(name), false, &matrix.to_cols_array());
    }

    fn draw_scene(&mut self, scene: &SceneManager, projection: Mat4, view: Mat4, ambient: Vec3) {
        self.gl.use_program(Some(&self.program));
        self.set_matrix("u_projection", &projection);
        self.set_matrix("u_view", &view);
        self.gl
            .uniform3fv_with_f32_array(self.uniform("u_ambient"), &ambient.to_array());
        self.gl.uniform3fv_with_f32_array(
            self.uniform("u_lightDirection"),
            &LIGHT_DIRECTION.normalize().to_array(),
        );
        self.gl.uniform1i(self.uniform("u_map"), 0);

        for object in scene.objects() {
            object.visit_visible(Mat4::IDENTITY, &mut |node, world| {
                if let NodeKind::Mesh(primitives) = &node.kind {
                    for primitive in primitives {
                        self.draw_primitive(&primitive.geometry, &primitive.material, &world);
                    }
                }
            });
        }
    }

    fn draw_primitive(&mut self, geometry: &Geometry, material: &Material, world: &Mat4) {
        if !self.geometries.contains_key(&geometry.id()) {
            match self.upload_geometry(geometry) {
                Ok(gpu) => {
                    self.geometries.insert(geometry.id(), gpu);
                }
                Err(e) => {
                    warn!(error = %describe(&e), "Geometry upload failed");
                    return;
                }
            }
        }
        let texture = material.map.as_ref().and_then(|t| self.texture(t));

        let gl = &self.gl;
        self.set_matrix("u_model", world);
        self.set_matrix("u_normalMatrix", &world.inverse().transpose());
        gl.uniform4fv_with_f32_array(self.uniform("u_baseColor"), &material.base_color);
        let cutoff = match material.alpha_mode {
            AlphaMode::Mask(cutoff) => cutoff,
            _ => 0.0,
        };
        gl.uniform1f(self.uniform("u_alphaCutoff"), cutoff);
        gl.uniform1i(self.uniform("u_hasMap"), texture.is_some() as i32);
        gl.active_texture(Gl::TEXTURE0);
        gl.bind_texture(Gl::TEXTURE_2D, texture.as_ref());

        if material.double_sided {
            gl.disable(Gl::CULL_FACE);
        } else {
            gl.enable(Gl::CULL_FACE);
        }
        let blend = material.alpha_mode == AlphaMode::Blend;
        if blend {
            gl.enable(Gl::BLEND);
            gl.depth_mask(false);
        }

        if let Some(gpu) = self.geometries.get(&geometry.id()) {
            gl.bind_vertex_array(Some(&gpu.vao));
            let primitive_mode = match geometry.topology {
                Topology::Triangles => Gl::TRIANGLES,
                Topology::Lines => Gl::LINES,
            };
            gl.draw_elements_with_i32(primitive_mode, gpu.index_count, Gl::UNSIGNED_INT, 0);
            gl.bind_vertex_array(None);
        }

        if blend {
            gl.disable(Gl::BLEND);
            gl.depth_mask(true);
        }
    }

    fn upload_geometry(&self, geometry: &Geometry) -> Result<GpuGeometry, JsValue> {
        let gl = &self.gl;
        let vao = gl
            .create_vertex_array()
            .ok_or_else(|| JsValue::from_str("Failed to create vertex array"))?;
        let vertices = gl
            .create_buffer()
            .ok_or_else(|| JsValue::from_str("Failed to create vertex buffer"))?;
        let indices = gl
            .create_buffer()
            .ok_or_else(|| JsValue::from_str("Failed to create index buffer"))?;

        gl.bind_vertex_array(Some(&vao));
        gl.bind_buffer(Gl::ARRAY_BUFFER, Some(&vertices));
        let interleaved = geometry.interleaved();
        gl.buffer_data_with_u8_array(Gl::ARRAY_BUFFER, bytemuck::cast_slice(&interleaved), Gl::STATIC_DRAW);

        const STRIDE: i32 = 8 * 4;
        for (location, size, offset) in [(0, 3, 0), (1, 3, 12), (2, 2, 24)] {
            gl.enable_vertex_attrib_array(location);
            gl.vertex_attrib_pointer_with_i32(location, size, Gl::FLOAT, false, STRIDE, offset);
        }

        gl.bind_buffer(Gl::ELEMENT_ARRAY_BUFFER, Some(&indices));
        gl.buffer_data_with_u8_array(
            Gl::ELEMENT_ARRAY_BUFFER,
            bytemuck::cast_slice(&geometry.indices),
            Gl::STATIC_DRAW,
        );
        gl.bind_vertex_array(None);
        trace!(id = geometry.id().get(), vertices = geometry.vertex_count(), "Uploaded geometry");

        Ok(GpuGeometry {
            vao,
            vertices,
            indices,
            index_count: geometry.indices.len() as i32,
        })
    }

    fn texture(&mut self, texture: &Texture) -> Option<WebGlTexture> {
        if let Some(existing) = self.textures.get(&texture.id()) {
            return Some(existing.clone());
        }
        match self.upload_texture(texture) {
            Ok(uploaded) => {
                self.textures.insert(texture.id(), uploaded.clone());
                Some(uploaded)
            }
            Err(e) => {
                warn!(error = %describe(&e), "Texture upload failed");
                None
            }
        }
    }

    fn upload_texture(&self, texture: &Texture) -> Result<WebGlTexture, JsValue> {
        let gl = &self.gl;
        let handle = gl
            .create_texture()
            .ok_or_else(|| JsValue::from_str("Failed to create texture"))?;
        gl.bind_texture(Gl::TEXTURE_2D, Some(&handle));
        gl.tex_image_2d_with_i32_and_i32_and_i32_and_format_and_type_and_opt_u8_array(
            Gl::TEXTURE_2D,
            0,
            Gl::RGBA as i32,
            texture.width as i32,
            texture.height as i32,
            0,
            Gl::RGBA,
            Gl::UNSIGNED_BYTE,
            Some(&texture.rgba),
        )?;
        gl.generate_mipmap(Gl::TEXTURE_2D);
        Ok(handle)
    }
}

impl SceneRenderer<WebXrBackend> for WebGlRenderer {
    fn viewport_aspect(&self, frame: &XrFrame) -> Option<f32> {
        let layer = frame.session().render_state().base_layer()?;
        let height = layer.framebuffer_height();
        (height > 0).then(|| layer.framebuffer_width() as f32 / height as f32)
    }

    fn render(
        &mut self,
        frame: &XrFrame,
        space: Option<&XrReferenceSpace>,
        scene: &SceneManager,
        mode: RenderMode,
    ) {
        let Some(space) = space else {
            return;
        };
        let Some(layer) = frame.session().render_state().base_layer() else {
            return;
        };
        let Some(pose) = frame.get_viewer_pose(space) else {
            return;
        };

        self.gl
            .bind_framebuffer(Gl::FRAMEBUFFER, layer.framebuffer().as_ref());
        self.gl.clear_color(0.0, 0.0, 0.0, 0.0);
        self.gl.clear(Gl::COLOR_BUFFER_BIT | Gl::DEPTH_BUFFER_BIT);

        let ambient = scene
            .environment()
            .map(|env| env.average_radiance())
            .unwrap_or(DEFAULT_AMBIENT);

        for view in pose.views().iter() {
            let view: XrView = view.unchecked_into();
            let Some(viewport) = layer.get_viewport(&view) else {
                continue;
            };
            self.gl
                .viewport(viewport.x(), viewport.y(), viewport.width(), viewport.height());

            let projection = match mode {
                RenderMode::Film => scene.camera().projection_matrix(),
                RenderMode::Hit | RenderMode::Anchor => Mat4::from_cols_slice(&view.projection_matrix()),
            };
            let view_matrix = Mat4::from_cols_slice(&view.transform().inverse().matrix());
            self.draw_scene(scene, projection, view_matrix, ambient);
        }
    }
}

impl ResourceSink for WebGlRenderer {
    fn release_geometry(&mut self, id: ResourceId) {
        if let Some(gpu) = self.geometries.remove(&id) {
            self.gl.delete_vertex_array(Some(&gpu.vao));
            self.gl.delete_buffer(Some(&gpu.vertices));
            self.gl.delete_buffer(Some(&gpu.indices));
            trace!(id = id.get(), "Released geometry");
        }
    }

    fn release_material(&mut self, id: ResourceId) {
        // materials are uniforms only
        trace!(id = id.get(), "Released material");
    }

    fn release_texture(&mut self, id: ResourceId) {
        if let Some(texture) = self.textures.remove(&id) {
            self.gl.delete_texture(Some(&texture));
            trace!(id = id.get(), "Released texture");
        }
    }
}

fn compile_shader(gl: &Gl, kind: u32, source: &str) -> Result<WebGlShader, JsValue> {
    let shader = gl
        .create_shader(kind)
        .ok_or_else(|| JsValue::from_str("Failed to create shader"))?;
    gl.shader_source(&shader, source);
    gl.compile_shader(&shader);

    if gl
        .get_shader_parameter(&shader, Gl::COMPILE_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        Ok(shader)
    } else {
        let log = gl
            .get_shader_info_log(&shader)
            .unwrap_or_else(|| "Unknown error".to_string());
        Err(JsValue::from_str(&format!("Failed to compile shader: {log}")))
    }
}

fn link_program(gl: &Gl, vertex: &WebGlShader, fragment: &WebGlShader) -> Result<WebGlProgram, JsValue> {
    let program = gl
        .create_program()
        .ok_or_else(|| JsValue::from_str("Failed to create program"))?;
    gl.attach_shader(&program, vertex);
    gl.attach_shader(&program, fragment);
    gl.link_program(&program);

    if gl
        .get_program_parameter(&program, Gl::LINK_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        Ok(program)
    } else {
        let log = gl
            .get_program_info_log(&program)
            .unwrap_or_else(|| "Unknown error".to_string());
        Err(JsValue::from_str(&format!("Failed to link program: {log}")))
    }
}
