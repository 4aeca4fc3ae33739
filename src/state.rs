// The pipeline state vector: everything bound for the next draw, with a
// dirty bit per state group.

use crate::cmd::*;
use crate::cso::*;
use crate::dev::{DeviceInfo, Gen};
use crate::format::Format;
use crate::layout::Target;
use crate::surface::{Buffer, ViewSurface, ZsSurface};
use crate::winsys::Bo;

pub const MAX_VIEWPORTS: usize = 16;
pub const MAX_DRAW_BUFFERS: usize = 8;
pub const MAX_VERTEX_BUFFERS: usize = 33;
pub const MAX_SAMPLERS: usize = 16;
pub const MAX_SAMPLER_VIEWS: usize = 16;
pub const MAX_CONST_BUFFERS: usize = 13;
pub const MAX_SO_BUFFERS: usize = 4;
pub const MAX_SO_BINDINGS: usize = 64;

// binding table layout
pub const WM_DRAW_SURFACE_BASE: usize = 0;
pub const WM_CONST_SURFACE_BASE: usize = MAX_DRAW_BUFFERS;
pub const WM_TEXTURE_SURFACE_BASE: usize = WM_CONST_SURFACE_BASE + MAX_CONST_BUFFERS;
pub const VS_CONST_SURFACE_BASE: usize = 0;
pub const VS_TEXTURE_SURFACE_BASE: usize = MAX_CONST_BUFFERS;
pub const GS_SO_SURFACE_BASE: usize = 0;
pub const MAX_SURFACES: usize = WM_TEXTURE_SURFACE_BASE + MAX_SAMPLER_VIEWS;

bitflags::bitflags! {
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct Dirty: u32 {
		const VB = 1 << 0;
		const VE = 1 << 1;
		const IB = 1 << 2;
		const VS = 1 << 3;
		const GS = 1 << 4;
		const FS = 1 << 5;
		const RASTERIZER = 1 << 6;
		const BLEND = 1 << 7;
		const DSA = 1 << 8;
		const SAMPLER_VS = 1 << 9;
		const SAMPLER_GS = 1 << 10;
		const SAMPLER_FS = 1 << 11;
		const VIEW_VS = 1 << 12;
		const VIEW_GS = 1 << 13;
		const VIEW_FS = 1 << 14;
		const CBUF = 1 << 15;
		const VIEWPORT = 1 << 16;
		const SCISSOR = 1 << 17;
		const FB = 1 << 18;
		const SO = 1 << 19;
		const STENCIL_REF = 1 << 20;
		const BLEND_COLOR = 1 << 21;
		const SAMPLE_MASK = 1 << 22;
		const CLIP = 1 << 23;
		const POLY_STIPPLE = 1 << 24;
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
	Vs,
	Gs,
	Fs,
}

impl Stage {
	pub const ALL: [Stage; 3] = [Stage::Vs, Stage::Gs, Stage::Fs];

	pub fn index(self) -> usize {
		self as usize
	}

	pub fn sampler_dirty(self) -> Dirty {
		match self {
			Stage::Vs => Dirty::SAMPLER_VS,
			Stage::Gs => Dirty::SAMPLER_GS,
			Stage::Fs => Dirty::SAMPLER_FS,
		}
	}

	pub fn view_dirty(self) -> Dirty {
		match self {
			Stage::Vs => Dirty::VIEW_VS,
			Stage::Gs => Dirty::VIEW_GS,
			Stage::Fs => Dirty::VIEW_FS,
		}
	}
}

/// A compiled shader: kernel parameters plus the packed dwords of its
/// stage state.  The kernel itself lives at `kernel_offset` in the
/// instruction buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Shader {
	pub stage: Stage,
	pub kernel: Kernel,
	pub kernel_offset: u32,
	pub cso: ShaderCso,
	/// GS state of the stream output kernel a GEN6 VS carries.
	pub gs_cso: Option<ShaderCso>,
	pub routing: Routing,
	pub so_info: Option<SoInfo>,
}

impl Shader {
	pub fn new(dev: &DeviceInfo, stage: Stage, kernel: Kernel, kernel_offset: u32) -> Shader {
		let cso = match (stage, dev.gen) {
			(Stage::Vs, _) => init_vs_cso(dev, &kernel),
			(Stage::Gs, Gen::Gen6) => init_gs_cso_gen6(dev, &kernel, false),
			(Stage::Gs, _) => init_gs_cso_gen7(dev, &kernel),
			(Stage::Fs, Gen::Gen6) => init_fs_cso_gen6(dev, &kernel),
			(Stage::Fs, _) => init_fs_cso_gen7(dev, &kernel),
		};
		let gs_cso = if stage == Stage::Vs && dev.is_gen6() && kernel.vs_gen6_so {
			Some(init_gs_cso_gen6(dev, &kernel, true))
		} else {
			None
		};
		Shader {
			stage: stage,
			kernel: kernel,
			kernel_offset: kernel_offset,
			cso: cso,
			gs_cso: gs_cso,
			routing: Routing::default(),
			so_info: None,
		}
	}

	pub fn with_routing(mut self, routing: Routing) -> Shader {
		self.routing = routing;
		self
	}

	pub fn with_so_info(mut self, so_info: SoInfo) -> Shader {
		self.so_info = Some(so_info);
		self
	}

	/// Stream output outputs, none when the shader has no stream output.
	pub fn so_outputs(&self) -> &[SoOutput] {
		self.so_info.as_ref().map_or(&[], |so| &so.outputs[..])
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexBuffer {
	pub buffer: Buffer,
	pub offset: u32,
	pub stride: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexBuffer {
	pub buffer: Option<Buffer>,
	pub offset: u32,
	pub index_size: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimType {
	Points,
	Lines,
	LineLoop,
	LineStrip,
	Triangles,
	TriangleStrip,
	TriangleFan,
	Quads,
	QuadStrip,
	Polygon,
	LinesAdjacency,
	LineStripAdjacency,
	TrianglesAdjacency,
	TriangleStripAdjacency,
}

impl PrimType {
	pub fn hw_topology(self) -> u32 {
		use self::PrimType::*;
		match self {
			Points => PRIM_POINTLIST,
			Lines => PRIM_LINELIST,
			LineLoop => PRIM_LINELOOP,
			LineStrip => PRIM_LINESTRIP,
			Triangles => PRIM_TRILIST,
			TriangleStrip => PRIM_TRISTRIP,
			TriangleFan => PRIM_TRIFAN,
			Quads => PRIM_QUADLIST,
			QuadStrip => PRIM_QUADSTRIP,
			Polygon => PRIM_POLYGON,
			LinesAdjacency => PRIM_LINELIST_ADJ,
			LineStripAdjacency => PRIM_LINESTRIP_ADJ,
			TrianglesAdjacency => PRIM_TRILIST_ADJ,
			TriangleStripAdjacency => PRIM_TRISTRIP_ADJ,
		}
	}

	/// Points, lines or triangles.
	pub fn reduced(self) -> PrimType {
		use self::PrimType::*;
		match self {
			Points => Points,
			Lines | LineLoop | LineStrip | LinesAdjacency | LineStripAdjacency => Lines,
			_ => Triangles,
		}
	}

	pub fn vertices_per_prim(self) -> u32 {
		match self.reduced() {
			PrimType::Points => 1,
			PrimType::Lines => 2,
			_ => 3,
		}
	}

	/// Points, lines or triangles `count` vertices decompose into.
	pub fn reduced_prims_for_vertices(self, count: u32) -> u32 {
		use self::PrimType::*;
		let strip = |min: u32| if count >= min { count - (min - 1) } else { 0 };
		match self {
			Points => count,
			Lines => count / 2,
			LineLoop => if count >= 2 { count } else { 0 },
			LineStrip => strip(2),
			Triangles => count / 3,
			TriangleStrip | TriangleFan | Polygon => strip(3),
			Quads => count / 4 * 2,
			QuadStrip => if count >= 4 { (count - 2) / 2 * 2 } else { 0 },
			LinesAdjacency => count / 4,
			LineStripAdjacency => strip(4),
			TrianglesAdjacency => count / 6,
			TriangleStripAdjacency => if count >= 6 { (count - 4) / 2 } else { 0 },
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawInfo {
	pub indexed: bool,
	pub mode: PrimType,
	/// Overrides the topology derived from `mode`.
	pub topology: Option<u32>,
	pub start: u32,
	pub count: u32,
	pub start_instance: u32,
	pub instance_count: u32,
	pub index_bias: i32,
	pub primitive_restart: bool,
	pub restart_index: u32,
}

impl Default for DrawInfo {
	fn default() -> DrawInfo {
		DrawInfo {
			indexed: false,
			mode: PrimType::Triangles,
			topology: None,
			start: 0,
			count: 0,
			start_instance: 0,
			instance_count: 1,
			index_bias: 0,
			primitive_restart: false,
			restart_index: 0,
		}
	}
}

impl DrawInfo {
	pub fn topology(&self) -> u32 {
		self.topology.unwrap_or_else(|| self.mode.hw_topology())
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerView {
	pub surface: ViewSurface,
	pub target: Target,
	pub format: Format,
	pub first_level: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstBuffer {
	pub resource: Option<Buffer>,
	pub surface: Option<ViewSurface>,
	pub user_buffer: Vec<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CbufState {
	pub cso: Vec<ConstBuffer>,
	pub enabled_mask: u32,
}

/// A bound color buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderTarget {
	pub surface: ViewSurface,
	pub format: Format,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Framebuffer {
	pub width: u32,
	pub height: u32,
	pub cbufs: Vec<Option<RenderTarget>>,
	pub zs: Option<ZsSurface>,
	pub zs_format: Option<Format>,
	/// Clear value of the bound depth slice.
	pub depth_clear_value: u32,
	pub null_rt: ViewSurface,
	pub null_zs: ZsSurface,
	pub num_samples: u32,
}

impl Framebuffer {
	pub fn new(dev: &DeviceInfo) -> Framebuffer {
		Framebuffer {
			width: 1,
			height: 1,
			cbufs: Vec::new(),
			zs: None,
			zs_format: None,
			depth_clear_value: 0,
			null_rt: ViewSurface::null(dev, 1, 1, 1, 0),
			null_zs: ZsSurface::null(dev),
			num_samples: 1,
		}
	}

	pub fn zs_or_null(&self) -> &ZsSurface {
		self.zs.as_ref().unwrap_or(&self.null_zs)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoTarget {
	pub buffer: Buffer,
	pub offset: u32,
	pub size: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SoState {
	pub targets: Vec<Option<SoTarget>>,
	pub enabled: bool,
	/// Targets that keep appending to what earlier draws wrote.
	pub append_bitmask: u32,
}

impl SoState {
	/// A bound target without its append bit starts over at offset 0.
	pub fn resets_offsets(&self) -> bool {
		self.targets.iter().enumerate()
			.any(|(i, t)| t.is_some() && self.append_bitmask & (1 << i) == 0)
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StencilRef {
	pub ref_value: [u8; 2],
}

/// Everything bound for the next draw.
pub struct StateVector {
	pub vb: Vec<Option<VertexBuffer>>,
	pub ve: VertexElements,
	pub ib: IndexBuffer,
	pub vs: Option<Shader>,
	pub gs: Option<Shader>,
	pub fs: Option<Shader>,
	pub rasterizer: Rasterizer,
	pub blend: Blend,
	pub dsa: Dsa,
	pub samplers: [Vec<Option<Sampler>>; 3],
	pub views: [Vec<Option<SamplerView>>; 3],
	pub cbuf: [CbufState; 3],
	pub viewports: Vec<Viewport>,
	pub scissor: Scissor,
	pub fb: Framebuffer,
	pub so: SoState,
	pub sample_mask: u32,
	pub stencil_ref: StencilRef,
	pub blend_color: [f32; 4],
	pub clip: [[f32; 4]; 8],
	pub poly_stipple: [u32; 32],
	pub draw: DrawInfo,
	/// Instruction buffer holding every kernel.
	pub shader_bo: Option<Bo>,
	pub dirty: Dirty,
}

impl StateVector {
	pub fn new(dev: &DeviceInfo) -> StateVector {
		StateVector {
			vb: Vec::new(),
			ve: VertexElements::default(),
			ib: IndexBuffer::default(),
			vs: None,
			gs: None,
			fs: None,
			rasterizer: Rasterizer::new(dev, &RasterizerDesc::default()),
			blend: Blend::new(dev, &BlendDesc::default()),
			dsa: Dsa::new(dev, &DsaDesc::default()),
			samplers: [Vec::new(), Vec::new(), Vec::new()],
			views: [Vec::new(), Vec::new(), Vec::new()],
			cbuf: [CbufState::default(), CbufState::default(), CbufState::default()],
			viewports: vec![Viewport::new(dev, &ViewportDesc {
				scale: [0.5, 0.5, 0.5],
				translate: [0.5, 0.5, 0.5],
			})],
			scissor: Scissor::null(),
			fb: Framebuffer::new(dev),
			so: SoState::default(),
			sample_mask: !0,
			stencil_ref: StencilRef::default(),
			blend_color: [0.0; 4],
			clip: [[0.0; 4]; 8],
			poly_stipple: [0; 32],
			draw: DrawInfo::default(),
			shader_bo: None,
			dirty: Dirty::all(),
		}
	}

	pub fn shader(&self, stage: Stage) -> Option<&Shader> {
		match stage {
			Stage::Vs => self.vs.as_ref(),
			Stage::Gs => self.gs.as_ref(),
			Stage::Fs => self.fs.as_ref(),
		}
	}

	/// The last stage before the rasterizer.
	pub fn last_vertex_shader(&self) -> Option<&Shader> {
		self.gs.as_ref().or(self.vs.as_ref())
	}

	pub fn bind_vertex_buffers(&mut self, start_slot: usize, buffers: &[Option<VertexBuffer>]) {
		let end = start_slot + buffers.len();
		assert!(end <= MAX_VERTEX_BUFFERS, "vertex buffer slot {} out of range", end);
		if self.vb.len() < end {
			self.vb.resize(end, None);
		}
		self.vb[start_slot..end].copy_from_slice(buffers);
		while let Some(None) = self.vb.last() {
			self.vb.pop();
		}
		self.dirty |= Dirty::VB;
	}

	pub fn bind_vertex_elements(&mut self, ve: VertexElements) {
		self.ve = ve;
		self.dirty |= Dirty::VE;
	}

	pub fn bind_index_buffer(&mut self, ib: IndexBuffer) {
		self.ib = ib;
		self.dirty |= Dirty::IB;
	}

	pub fn bind_shader(&mut self, stage: Stage, shader: Option<Shader>) {
		if let Some(ref s) = shader {
			assert_eq!(s.stage, stage, "shader bound to the wrong stage");
		}
		match stage {
			Stage::Vs => {
				self.vs = shader;
				self.dirty |= Dirty::VS;
			}
			Stage::Gs => {
				self.gs = shader;
				self.dirty |= Dirty::GS;
			}
			Stage::Fs => {
				self.fs = shader;
				self.dirty |= Dirty::FS;
			}
		}
	}

	pub fn bind_rasterizer(&mut self, rasterizer: Rasterizer) {
		self.rasterizer = rasterizer;
		self.dirty |= Dirty::RASTERIZER;
	}

	pub fn bind_blend(&mut self, blend: Blend) {
		self.blend = blend;
		self.dirty |= Dirty::BLEND;
	}

	pub fn bind_dsa(&mut self, dsa: Dsa) {
		self.dsa = dsa;
		self.dirty |= Dirty::DSA;
	}

	pub fn bind_samplers(&mut self, stage: Stage, samplers: Vec<Option<Sampler>>) {
		assert!(samplers.len() <= MAX_SAMPLERS);
		self.samplers[stage.index()] = samplers;
		self.dirty |= stage.sampler_dirty();
	}

	pub fn set_sampler_views(&mut self, stage: Stage, views: Vec<Option<SamplerView>>) {
		assert!(views.len() <= MAX_SAMPLER_VIEWS);
		self.views[stage.index()] = views;
		self.dirty |= stage.view_dirty();
	}

	pub fn set_constant_buffer(&mut self, stage: Stage, index: usize, cbuf: Option<ConstBuffer>) {
		assert!(index < MAX_CONST_BUFFERS);
		let state = &mut self.cbuf[stage.index()];
		if state.cso.len() <= index {
			state.cso.resize(index + 1, ConstBuffer {
				resource: None,
				surface: None,
				user_buffer: Vec::new(),
			});
		}
		match cbuf {
			Some(cbuf) => {
				state.cso[index] = cbuf;
				state.enabled_mask |= 1 << index;
			}
			None => {
				state.cso[index] = ConstBuffer {
					resource: None,
					surface: None,
					user_buffer: Vec::new(),
				};
				state.enabled_mask &= !(1 << index);
			}
		}
		self.dirty |= Dirty::CBUF;
	}

	pub fn set_viewports(&mut self, viewports: Vec<Viewport>) {
		assert!(!viewports.is_empty() && viewports.len() <= MAX_VIEWPORTS);
		self.viewports = viewports;
		self.dirty |= Dirty::VIEWPORT;
	}

	pub fn set_scissors(&mut self, start_slot: usize, states: &[ScissorDesc]) {
		assert!(start_slot + states.len() <= MAX_VIEWPORTS);
		self.scissor.set(start_slot, states);
		self.dirty |= Dirty::SCISSOR;
	}

	pub fn set_framebuffer(&mut self, dev: &DeviceInfo, width: u32, height: u32,
		cbufs: Vec<Option<RenderTarget>>, zs: Option<(ZsSurface, Format)>, num_samples: u32) {
		assert!(cbufs.len() <= MAX_DRAW_BUFFERS);
		self.fb.width = width;
		self.fb.height = height;
		self.fb.cbufs = cbufs;
		match zs {
			Some((zs, format)) => {
				self.fb.zs = Some(zs);
				self.fb.zs_format = Some(format);
			}
			None => {
				self.fb.zs = None;
				self.fb.zs_format = None;
			}
		}
		self.fb.null_rt = ViewSurface::null(dev, width.max(1), height.max(1), 1, 0);
		self.fb.num_samples = num_samples.max(1);
		self.dirty |= Dirty::FB;
	}

	pub fn set_stream_output_targets(&mut self, targets: Vec<Option<SoTarget>>, append_bitmask: u32) {
		assert!(targets.len() <= MAX_SO_BUFFERS);
		self.so.enabled = !targets.is_empty();
		self.so.targets = targets;
		self.so.append_bitmask = append_bitmask;
		self.dirty |= Dirty::SO;
	}

	pub fn set_sample_mask(&mut self, mask: u32) {
		self.sample_mask = mask;
		self.dirty |= Dirty::SAMPLE_MASK;
	}

	pub fn set_stencil_ref(&mut self, stencil_ref: StencilRef) {
		self.stencil_ref = stencil_ref;
		self.dirty |= Dirty::STENCIL_REF;
	}

	pub fn set_blend_color(&mut self, color: [f32; 4]) {
		self.blend_color = color;
		self.dirty |= Dirty::BLEND_COLOR;
	}

	pub fn set_clip_planes(&mut self, ucp: [[f32; 4]; 8]) {
		self.clip = ucp;
		self.dirty |= Dirty::CLIP;
	}

	pub fn set_polygon_stipple(&mut self, pattern: [u32; 32]) {
		self.poly_stipple = pattern;
		self.dirty |= Dirty::POLY_STIPPLE;
	}

	/// Draw parameters are not state; they never raise a dirty bit.
	pub fn set_draw(&mut self, draw: DrawInfo) {
		self.draw = draw;
	}

	pub fn set_shader_bo(&mut self, bo: Bo) {
		self.shader_bo = Some(bo);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn setters_raise_dirty_bits() {
		let snb = DeviceInfo::snb(1);
		let mut vec = StateVector::new(&snb);
		assert_eq!(vec.dirty, Dirty::all());
		vec.dirty = Dirty::empty();

		vec.bind_blend(Blend::new(&snb, &BlendDesc::default()));
		vec.set_sample_mask(0x1);
		assert_eq!(vec.dirty, Dirty::BLEND | Dirty::SAMPLE_MASK);

		vec.dirty = Dirty::empty();
		vec.bind_samplers(Stage::Fs, vec![None]);
		vec.set_sampler_views(Stage::Vs, vec![]);
		assert_eq!(vec.dirty, Dirty::SAMPLER_FS | Dirty::VIEW_VS);

		vec.dirty = Dirty::empty();
		vec.set_draw(DrawInfo { count: 3, ..DrawInfo::default() });
		assert_eq!(vec.dirty, Dirty::empty());
	}

	#[test]
	fn constant_buffer_mask() {
		let snb = DeviceInfo::snb(1);
		let mut vec = StateVector::new(&snb);
		vec.set_constant_buffer(Stage::Fs, 2, Some(ConstBuffer {
			resource: None,
			surface: None,
			user_buffer: vec![1, 2, 3, 4],
		}));
		assert_eq!(vec.cbuf[Stage::Fs.index()].enabled_mask, 1 << 2);
		assert_eq!(vec.cbuf[Stage::Fs.index()].cso.len(), 3);
		vec.set_constant_buffer(Stage::Fs, 2, None);
		assert_eq!(vec.cbuf[Stage::Fs.index()].enabled_mask, 0);
	}

	#[test]
	fn reduced_primitives() {
		assert_eq!(PrimType::TriangleFan.reduced(), PrimType::Triangles);
		assert_eq!(PrimType::LineStripAdjacency.vertices_per_prim(), 2);
		assert_eq!(PrimType::Quads.hw_topology(), PRIM_QUADLIST);
	}

	#[test]
	fn primitives_from_vertex_counts() {
		assert_eq!(PrimType::Triangles.reduced_prims_for_vertices(7), 2);
		assert_eq!(PrimType::TriangleStrip.reduced_prims_for_vertices(5), 3);
		assert_eq!(PrimType::TriangleFan.reduced_prims_for_vertices(2), 0);
		assert_eq!(PrimType::LineLoop.reduced_prims_for_vertices(4), 4);
		assert_eq!(PrimType::Quads.reduced_prims_for_vertices(8), 4);
		assert_eq!(PrimType::QuadStrip.reduced_prims_for_vertices(6), 4);
		assert_eq!(PrimType::TriangleStripAdjacency.reduced_prims_for_vertices(8), 2);
	}

	#[test]
	fn unappended_target_resets_offsets() {
		let snb = DeviceInfo::snb(1);
		let mut vec = StateVector::new(&snb);
		let target = SoTarget { buffer: Buffer { bo: Bo { handle: 1, size: 1024 }, size: 1024 }, offset: 0, size: 1024 };
		vec.set_stream_output_targets(vec![Some(target), None], 0x1);
		assert!(!vec.so.resets_offsets());
		vec.set_stream_output_targets(vec![Some(target), Some(target)], 0x1);
		assert!(vec.so.resets_offsets());
		vec.set_stream_output_targets(Vec::new(), 0);
		assert!(!vec.so.resets_offsets());
	}
}
