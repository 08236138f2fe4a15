//! Paints a [`RenderPlan`] with wgpu, text through glyphon.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glyphon::{
    Attrs, Buffer, Cache, Family, FontSystem, Metrics, Resolution, Shaping, SwashCache, TextArea, TextAtlas,
    TextBounds, TextRenderer, Viewport,
};
use wgpu::MultisampleState;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::error::{ChartError, Result};
use crate::plan::{Align, Color, Rect, RenderPlan, Shape};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct CanvasUniform {
    size: [f32; 2],
    _pad: [f32; 2],
}

const _: [(); 16] = [(); std::mem::size_of::<CanvasUniform>()];

/// Linear colour for an sRGB render target.
fn linear(c: Color) -> [f32; 4] {
    let ch = |v: u8| {
        let s = v as f32 / 255.0;
        if s <= 0.04045 {
            s / 12.92
        } else {
            ((s + 0.055) / 1.055).powf(2.4)
        }
    };
    [ch(c.r), ch(c.g), ch(c.b), c.a as f32 / 255.0]
}

struct Tess {
    out: Vec<Vertex>,
    scale: f32,
}

impl Tess {
    fn quad(&mut self, p: [[f32; 2]; 4], color: [f32; 4]) {
        for k in [0, 1, 2, 0, 2, 3] {
            self.out.push(Vertex { position: p[k], color });
        }
    }

    fn rect(&mut self, r: Rect, color: [f32; 4]) {
        let s = self.scale;
        let (x0, y0) = (r.x as f32 * s, r.y as f32 * s);
        let (x1, y1) = ((r.x + r.w) as f32 * s, (r.y + r.h) as f32 * s);
        self.quad([[x0, y0], [x1, y0], [x1, y1], [x0, y1]], color);
    }

    /// One logical pixel wide.
    fn segment(&mut self, a: [f64; 2], b: [f64; 2], color: [f32; 4]) {
        let s = self.scale;
        let (ax, ay) = (a[0] as f32 * s, a[1] as f32 * s);
        let (bx, by) = (b[0] as f32 * s, b[1] as f32 * s);
        let (dx, dy) = (bx - ax, by - ay);
        let len = (dx * dx + dy * dy).sqrt();
        if !len.is_finite() || len < 1e-4 {
            return;
        }
        let half = 0.5 * s;
        let (nx, ny) = (-dy / len * half, dx / len * half);
        self.quad(
            [[ax + nx, ay + ny], [bx + nx, by + ny], [bx - nx, by - ny], [ax - nx, ay - ny]],
            color,
        );
    }

    fn polyline(&mut self, points: &[[f64; 2]], color: [f32; 4], dash: Option<[f64; 2]>) {
        let Some([on, off]) = dash.filter(|[on, off]| *on > 0.0 && *off > 0.0) else {
            for w in points.windows(2) {
                self.segment(w[0], w[1], color);
            }
            return;
        };
        // the pattern phase carries over from one segment to the next
        let period = on + off;
        let mut phase = 0.0;
        for w in points.windows(2) {
            let (a, b) = (w[0], w[1]);
            let len = ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2)).sqrt();
            if !len.is_finite() || len == 0.0 {
                continue;
            }
            let at = |d: f64| [a[0] + (b[0] - a[0]) * d / len, a[1] + (b[1] - a[1]) * d / len];
            let mut d = 0.0;
            while d < len {
                let in_on = phase < on;
                let step = if in_on { on - phase } else { period - phase };
                let end = (d + step).min(len);
                if in_on {
                    self.segment(at(d), at(end), color);
                }
                phase = (phase + end - d) % period;
                d = end;
            }
        }
    }

    fn area(&mut self, points: &[[f64; 2]], base: f64, color: [f32; 4]) {
        let s = self.scale;
        let base = base as f32 * s;
        for w in points.windows(2) {
            let (x0, y0) = (w[0][0] as f32 * s, w[0][1] as f32 * s);
            let (x1, y1) = (w[1][0] as f32 * s, w[1][1] as f32 * s);
            self.quad([[x0, y0], [x1, y1], [x1, base], [x0, base]], color);
        }
    }

    fn hatch(&mut self, r: Rect, spacing: f64, color: [f32; 4]) {
        if !(spacing > 0.0) || r.w <= 0.0 || r.h <= 0.0 {
            return;
        }
        let (right, bottom) = (r.x + r.w, r.y + r.h);
        // lines x + y = c
        let mut c = r.x + r.y + spacing;
        while c < right + bottom {
            let x_lo = r.x.max(c - bottom);
            let x_hi = right.min(c - r.y);
            if x_lo < x_hi {
                self.segment([x_lo, c - x_lo], [x_hi, c - x_hi], color);
            }
            c += spacing;
        }
    }
}

/// Triangle list for every non-text shape, in physical pixels.
pub fn tessellate(plan: &RenderPlan, scale: f32) -> Vec<Vertex> {
    let mut t = Tess { out: Vec::new(), scale };
    for shape in &plan.shapes {
        match shape {
            Shape::Fill { rect, color } => t.rect(*rect, linear(*color)),
            Shape::Stroke { rect, color } => {
                let c = linear(*color);
                let Rect { x, y, w, h } = *rect;
                t.rect(Rect::new(x, y, w, 1.0), c);
                t.rect(Rect::new(x, y + h - 1.0, w, 1.0), c);
                t.rect(Rect::new(x, y, 1.0, h), c);
                t.rect(Rect::new(x + w - 1.0, y, 1.0, h), c);
            }
            Shape::Line { points, color, dash } => t.polyline(points, linear(*color), *dash),
            Shape::Area { points, base, color } => t.area(points, *base, linear(*color)),
            Shape::Hatch { rect, color, spacing } => t.hatch(*rect, *spacing, linear(*color)),
            Shape::Text { .. } => {}
        }
    }
    t.out
}

fn font_system(fonts: &[Vec<u8>]) -> FontSystem {
    let mut fs = FontSystem::new();

    #[cfg(not(target_arch = "wasm32"))]
    fs.db_mut().load_system_fonts();

    for data in fonts {
        fs.db_mut().load_font_data(data.clone());
    }
    // the web has no system fonts; make the first supplied face the sans-serif one
    if !fonts.is_empty() {
        let family = fs
            .db()
            .faces()
            .find_map(|f| f.families.first().map(|(name, _)| name.clone()));
        if let Some(family) = family {
            fs.db_mut().set_sans_serif_family(family);
        }
    }
    fs
}

pub struct Painter {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    pipeline: wgpu::RenderPipeline,
    canvas_buffer: wgpu::Buffer,
    canvas_bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,
    font_system: FontSystem,
    swash_cache: SwashCache,
    text_atlas: TextAtlas,
    text_renderer: TextRenderer,
    viewport: Viewport,
}

impl Painter {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat, fonts: &[Vec<u8>]) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Chart Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        let canvas_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Canvas Uniform"),
            size: std::mem::size_of::<CanvasUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("canvas_bind_group_layout"),
        });

        let canvas_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: canvas_buffer.as_entire_binding(),
            }],
            label: Some("canvas_bind_group"),
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Chart Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            cache: None,
            label: Some("Chart Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                compilation_options: Default::default(),
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 0,
                            format: wgpu::VertexFormat::Float32x2,
                        },
                        wgpu::VertexAttribute {
                            offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                            shader_location: 1,
                            format: wgpu::VertexFormat::Float32x4,
                        },
                    ],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                compilation_options: Default::default(),
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
                unclipped_depth: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview_mask: None,
        });

        let vertex_buffer = Self::vertex_buffer(&device, 4096);

        let font_system = font_system(fonts);
        let swash_cache = SwashCache::new();
        let cache = Cache::new(&device);
        let mut text_atlas = TextAtlas::new(&device, &queue, &cache, format);
        let text_renderer = TextRenderer::new(&mut text_atlas, &device, MultisampleState::default(), None);
        let viewport = Viewport::new(&device, &cache);

        Painter {
            device,
            queue,
            format,
            pipeline,
            canvas_buffer,
            canvas_bind_group,
            vertex_buffer,
            font_system,
            swash_cache,
            text_atlas,
            text_renderer,
            viewport,
        }
    }

    fn vertex_buffer(device: &wgpu::Device, vertices: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Chart Vertex Buffer"),
            size: (vertices * std::mem::size_of::<Vertex>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Shapes and measures every text of the plan. Buffers come back in
    /// plan order together with their physical top left corner.
    fn shape_texts(&mut self, plan: &RenderPlan, scale: f32) -> Vec<(Buffer, f32, f32, glyphon::Color)> {
        let mut out = Vec::new();
        for shape in &plan.shapes {
            let Shape::Text { x, y, text, color, align, size } = shape else {
                continue;
            };
            let px = size * scale;
            let mut buffer = Buffer::new(&mut self.font_system, Metrics::new(px, (px * 1.2).ceil()));
            buffer.set_size(&mut self.font_system, None, None);
            buffer.set_text(
                &mut self.font_system,
                text,
                &Attrs::new().family(Family::SansSerif),
                Shaping::Advanced,
                None,
            );
            buffer.shape_until_scroll(&mut self.font_system, false);
            let w = buffer.layout_runs().map(|r| r.line_w).fold(0.0, f32::max);
            let left = *x as f32 * scale
                - match align {
                    Align::Left => 0.0,
                    Align::Center => w / 2.0,
                    Align::Right => w,
                };
            let c = glyphon::Color::rgba(color.r, color.g, color.b, color.a);
            out.push((buffer, left, *y as f32 * scale, c));
        }
        out
    }

    /// Draws `plan` into `target`, a `width` by `height` physical pixel view
    /// in this painter's format.
    pub fn paint(&mut self, plan: &RenderPlan, target: &wgpu::TextureView, width: u32, height: u32, scale: f32) -> Result<()> {
        let (width, height) = (width.max(1), height.max(1));
        let uniform = CanvasUniform {
            size: [width as f32, height as f32],
            _pad: [0.0; 2],
        };
        self.queue.write_buffer(&self.canvas_buffer, 0, bytemuck::bytes_of(&uniform));

        let vertices = tessellate(plan, scale);
        let needed = (vertices.len() * std::mem::size_of::<Vertex>()) as wgpu::BufferAddress;
        if needed > self.vertex_buffer.size() {
            self.vertex_buffer = Self::vertex_buffer(&self.device, vertices.len().next_power_of_two());
        }
        if !vertices.is_empty() {
            self.queue.write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(&vertices));
        }

        let texts = self.shape_texts(plan, scale);
        let bounds = TextBounds {
            left: 0,
            top: 0,
            right: width as i32,
            bottom: height as i32,
        };
        self.viewport.update(&self.queue, Resolution { width, height });
        self.text_renderer
            .prepare(
                &self.device,
                &self.queue,
                &mut self.font_system,
                &mut self.text_atlas,
                &self.viewport,
                texts.iter().map(|(buffer, left, top, color)| TextArea {
                    custom_glyphs: &[],
                    buffer,
                    left: *left,
                    top: *top,
                    scale: 1.0,
                    bounds,
                    default_color: *color,
                }),
                &mut self.swash_cache,
            )
            .map_err(|e| ChartError::Render(e.to_string()))?;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Chart Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Chart Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    depth_slice: None,
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });

            if !vertices.is_empty() {
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &self.canvas_bind_group, &[]);
                pass.set_vertex_buffer(0, self.vertex_buffer.slice(..needed));
                pass.draw(0..vertices.len() as u32, 0..1);
            }

            // text goes on top
            self.text_renderer
                .render(&self.text_atlas, &self.viewport, &mut pass)
                .map_err(|e| ChartError::Render(e.to_string()))?;
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.text_atlas.trim();
        Ok(())
    }

    /// Renders `plan` offscreen and returns it as PNG bytes.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn snapshot(&mut self, plan: &RenderPlan, scale: f32) -> Result<Vec<u8>> {
        let width = ((plan.width * scale as f64).round() as u32).max(1);
        let height = ((plan.height * scale as f64).round() as u32).max(1);
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Snapshot Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.paint(plan, &view, width, height, scale)?;

        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let bytes_per_row = (width * 4).div_ceil(align) * align;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Snapshot Readback"),
            size: (bytes_per_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Snapshot Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            size,
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| ChartError::Render(e.to_string()))?;
        rx.recv()
            .map_err(|e| ChartError::Render(e.to_string()))?
            .map_err(|e| ChartError::Render(e.to_string()))?;

        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(bytes_per_row as usize).take(height as usize) {
                rgba.extend_from_slice(&row[..(width * 4) as usize]);
            }
        }
        buffer.unmap();
        if matches!(self.format, wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb) {
            for px in rgba.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }
        crate::export::encode_png(width, height, rgba)
    }
}

/// A window surface and the painter drawing into it.
pub struct Surface {
    pub window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    painter: Painter,
}

impl Surface {
    pub async fn new(window: Arc<Window>, fonts: &[Vec<u8>]) -> Result<Self> {
        // the canvas can report 0x0 during the first layout on the web
        let initial = window.inner_size();
        let size = if initial.width == 0 || initial.height == 0 {
            PhysicalSize::new(1, 1)
        } else {
            initial
        };

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| ChartError::Render(e.to_string()))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| ChartError::Render(e.to_string()))?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                label: None,
                ..Default::default()
            })
            .await
            .map_err(|e| ChartError::Render(e.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        // vertex colours are linear, so the target has to be sRGB
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| ChartError::Render("surface has no formats".to_string()))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: caps.present_modes.first().copied().unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let painter = Painter::new(device, queue, format, fonts);
        Ok(Surface {
            window,
            surface,
            config,
            size,
            painter,
        })
    }

    pub fn scale(&self) -> f32 {
        self.window.scale_factor() as f32
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.painter.device, &self.config);
        }
    }

    pub fn render(&mut self, plan: &RenderPlan) -> std::result::Result<(), wgpu::SurfaceError> {
        if self.config.width == 0 || self.config.height == 0 {
            return Ok(());
        }
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let scale = self.scale();
        if let Err(e) = self.painter.paint(plan, &view, self.config.width, self.config.height, scale) {
            log::warn!("paint failed: {e}");
        }
        output.present();
        Ok(())
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn snapshot(&mut self, plan: &RenderPlan) -> Result<Vec<u8>> {
        let scale = self.scale();
        self.painter.snapshot(plan, scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Layout;

    fn plan(shapes: Vec<Shape>) -> RenderPlan {
        RenderPlan {
            width: 200.0,
            height: 100.0,
            layout: Layout::strip(200.0, 100.0),
            shapes,
        }
    }

    fn line(points: Vec<[f64; 2]>, dash: Option<[f64; 2]>) -> Shape {
        Shape::Line {
            points,
            color: Color::BLACK,
            dash,
        }
    }

    #[test]
    fn fill_is_two_scaled_triangles() {
        let p = plan(vec![Shape::Fill {
            rect: Rect::new(10.0, 20.0, 30.0, 40.0),
            color: Color::WHITE,
        }]);
        let v = tessellate(&p, 2.0);
        assert_eq!(v.len(), 6);
        assert_eq!(v[0].position, [20.0, 40.0]);
        assert_eq!(v[2].position, [80.0, 120.0]);
        assert_eq!(v[0].color, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn text_produces_no_triangles() {
        let p = plan(vec![Shape::Text {
            x: 0.0,
            y: 0.0,
            text: "1.5".into(),
            color: Color::TEXT,
            align: Align::Left,
            size: 14.0,
        }]);
        assert!(tessellate(&p, 1.0).is_empty());
    }

    #[test]
    fn stroke_is_four_edges() {
        let p = plan(vec![Shape::Stroke {
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            color: Color::GREY,
        }]);
        assert_eq!(tessellate(&p, 1.0).len(), 24);
    }

    #[test]
    fn dashes_follow_the_pattern() {
        let p = plan(vec![line(vec![[0.0, 5.0], [20.0, 5.0]], Some([4.0, 4.0]))]);
        let v = tessellate(&p, 1.0);
        // 0-4, 8-12, 16-20
        assert_eq!(v.len(), 18);
        let xs: Vec<f32> = v.iter().map(|v| v.position[0]).collect();
        assert!(xs.iter().all(|&x| !(4.5..7.5).contains(&x) && !(12.5..15.5).contains(&x)));
    }

    #[test]
    fn dash_phase_carries_across_corners() {
        // 6 px then 6 px: the first dash ends 2 px into the second segment
        let p = plan(vec![line(vec![[0.0, 0.0], [6.0, 0.0], [6.0, 6.0]], Some([8.0, 4.0]))]);
        let v = tessellate(&p, 1.0);
        assert_eq!(v.len(), 12);
        let ys: Vec<f32> = v[6..].iter().map(|v| v.position[1]).collect();
        assert!(ys.iter().all(|&y| y <= 2.0 + 1e-4));
    }

    #[test]
    fn degenerate_dash_is_solid() {
        let solid = tessellate(&plan(vec![line(vec![[0.0, 0.0], [10.0, 0.0]], None)]), 1.0);
        let zero = tessellate(&plan(vec![line(vec![[0.0, 0.0], [10.0, 0.0]], Some([0.0, 3.0]))]), 1.0);
        assert_eq!(solid, zero);
    }

    #[test]
    fn zero_length_segments_are_skipped() {
        let p = plan(vec![line(vec![[5.0, 5.0], [5.0, 5.0], [9.0, 5.0]], None)]);
        assert_eq!(tessellate(&p, 1.0).len(), 6);
    }

    #[test]
    fn area_reaches_the_base() {
        let p = plan(vec![Shape::Area {
            points: vec![[0.0, 10.0], [10.0, 20.0], [20.0, 5.0]],
            base: 50.0,
            color: Color::GREEN.with_alpha(0.5),
        }]);
        let v = tessellate(&p, 1.0);
        assert_eq!(v.len(), 12);
        assert!(v.iter().any(|v| v.position == [20.0, 50.0]));
        assert!((v[0].color[3] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn hatch_stays_inside_its_rect() {
        let rect = Rect::new(10.0, 10.0, 40.0, 20.0);
        let p = plan(vec![Shape::Hatch {
            rect,
            color: Color::LIGHT_GREY,
            spacing: 6.0,
        }]);
        let v = tessellate(&p, 1.0);
        assert!(!v.is_empty());
        for v in &v {
            let [x, y] = v.position;
            assert!(x >= 9.0 && x <= 51.0 && y >= 9.0 && y <= 31.0, "{x},{y}");
        }
        assert!(tessellate(&plan(vec![Shape::Hatch { rect, color: Color::GREY, spacing: 0.0 }]), 1.0).is_empty());
    }

    #[test]
    fn srgb_to_linear() {
        assert_eq!(linear(Color::BLACK), [0.0, 0.0, 0.0, 1.0]);
        let grey = linear(Color::GREY)[0];
        assert!((grey - 0.2158).abs() < 1e-3);
    }
}
