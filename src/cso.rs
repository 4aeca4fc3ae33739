// Constant state objects: pipe-level descriptions packed into the dwords
// the encoders copy into commands and indirect state.

use crate::cmd::*;
use crate::dev::{DeviceInfo, Gen};
use crate::format::{Format, HW_R32_FLOAT, HW_R32_UINT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
	One,
	SrcColor,
	SrcAlpha,
	DstAlpha,
	DstColor,
	SrcAlphaSaturate,
	ConstColor,
	ConstAlpha,
	Src1Color,
	Src1Alpha,
	Zero,
	InvSrcColor,
	InvSrcAlpha,
	InvDstAlpha,
	InvDstColor,
	InvConstColor,
	InvConstAlpha,
	InvSrc1Color,
	InvSrc1Alpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFunc {
	Add,
	Subtract,
	ReverseSubtract,
	Min,
	Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicOp {
	Clear,
	Nor,
	AndInverted,
	CopyInverted,
	AndReverse,
	Invert,
	Xor,
	Nand,
	And,
	Equiv,
	Noop,
	OrInverted,
	Copy,
	OrReverse,
	Or,
	Set,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareFunc {
	Never,
	Less,
	Equal,
	LEqual,
	Greater,
	NotEqual,
	GEqual,
	Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StencilOp {
	Keep,
	Zero,
	Replace,
	Incr,
	Decr,
	IncrWrap,
	DecrWrap,
	Invert,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TexFilter {
	Nearest,
	Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MipFilter {
	None,
	Nearest,
	Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wrap {
	Repeat,
	Clamp,
	ClampToEdge,
	ClampToBorder,
	MirrorRepeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Face {
	None,
	Front,
	Back,
	FrontAndBack,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolygonMode {
	Fill,
	Line,
	Point,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpriteCoord {
	UpperLeft,
	LowerLeft,
}

// BLENDFACTOR
const BLENDFACTOR_ONE: u32 = 0x01;
const BLENDFACTOR_DST_ALPHA: u32 = 0x04;
const BLENDFACTOR_SRC_ALPHA_SATURATE: u32 = 0x06;
const BLENDFACTOR_ZERO: u32 = 0x11;
const BLENDFACTOR_INV_DST_ALPHA: u32 = 0x14;

// SAMPLER_STATE
pub const MAPFILTER_NEAREST: u32 = 0;
pub const MAPFILTER_LINEAR: u32 = 1;
pub const MAPFILTER_ANISOTROPIC: u32 = 2;
const MIPFILTER_NONE: u32 = 0;
const MIPFILTER_NEAREST: u32 = 1;
const MIPFILTER_LINEAR: u32 = 3;
pub const TEXCOORDMODE_WRAP: u32 = 0;
pub const TEXCOORDMODE_MIRROR: u32 = 1;
pub const TEXCOORDMODE_CLAMP: u32 = 2;
pub const TEXCOORDMODE_CUBE: u32 = 3;
pub const TEXCOORDMODE_CLAMP_BORDER: u32 = 4;
const ANISORATIO_2: u32 = 0;
const ANISORATIO_16: u32 = 7;
const SAMPLER_DW3_MIN_ROUND: u32 = 1 << 18 | 1 << 16 | 1 << 14;
const SAMPLER_DW3_MAG_ROUND: u32 = 1 << 17 | 1 << 15 | 1 << 13;

// 3DSTATE_VS / 3DSTATE_GS / 3DSTATE_WM / 3DSTATE_PS
pub const THREADDISP_SPF: u32 = 1 << 31;
pub const THREADDISP_SAMPLER_COUNT_SHIFT: u32 = 27;
const VS_DW4_URB_GRF_START_SHIFT: u32 = 20;
const VS_DW4_URB_READ_LEN_SHIFT: u32 = 11;
pub const VS_DW5_STATISTICS: u32 = 1 << 10;
const VS_DW5_VS_ENABLE: u32 = 1 << 0;
const GS_DW4_URB_READ_LEN_SHIFT: u32 = 11;
pub const GS_DW5_STATISTICS: u32 = 1 << 10;
const GS_DW5_SO_STATISTICS: u32 = 1 << 9;
const GS_DW5_RENDER_ENABLE: u32 = 1 << 8;
const GS_DW6_DISCARD_ADJACENCY: u32 = 1 << 29;
const GS_DW6_SVBI_PAYLOAD_ENABLE: u32 = 1 << 28;
const GS_DW6_SVBI_POST_INC_ENABLE: u32 = 1 << 27;
const GS_DW6_SVBI_POST_INC_VAL_SHIFT: u32 = 16;
const GS_DW6_GS_ENABLE: u32 = 1 << 15;
const GEN7_GS_DW5_GS_ENABLE: u32 = 1 << 0;
pub const WM_DW4_STATISTICS: u32 = 1 << 31;
pub const WM_DW4_DEPTH_CLEAR: u32 = 1 << 30;
pub const WM_DW4_DEPTH_RESOLVE: u32 = 1 << 28;
pub const WM_DW4_HIZ_RESOLVE: u32 = 1 << 27;
const WM_DW4_URB_GRF_START0_SHIFT: u32 = 16;
pub const WM_DW5_MAX_THREADS_SHIFT: u32 = 25;
pub const WM_DW5_PS_KILL: u32 = 1 << 22;
const WM_DW5_PS_COMPUTE_DEPTH: u32 = 1 << 21;
const WM_DW5_PS_USE_DEPTH: u32 = 1 << 20;
pub const WM_DW5_PS_ENABLE: u32 = 1 << 19;
const WM_DW5_AA_LINE_CAP_1_0: u32 = 1 << 16;
const WM_DW5_AA_LINE_WIDTH_2_0: u32 = 2 << 14;
const WM_DW5_POLY_STIPPLE_ENABLE: u32 = 1 << 13;
const WM_DW5_LINE_STIPPLE_ENABLE: u32 = 1 << 11;
const WM_DW5_PS_USE_W: u32 = 1 << 8;
pub const WM_DW5_DUAL_SOURCE_BLEND: u32 = 1 << 7;
const WM_DW5_8_PIXEL_DISPATCH: u32 = 1 << 0;
const WM_DW6_SF_ATTR_COUNT_SHIFT: u32 = 20;
const WM_DW6_BARYCENTRIC_INTERP_SHIFT: u32 = 10;
const WM_DW6_POINT_RASTRULE_UPPER_RIGHT: u32 = 1 << 9;
const WM_DW6_MSRASTMODE_ON_PATTERN: u32 = 3 << 1;
const WM_DW6_MSDISPMODE_PERPIXEL: u32 = 1 << 0;
pub const GEN7_WM_DW1_STATISTICS: u32 = 1 << 31;
pub const GEN7_WM_DW1_DEPTH_CLEAR: u32 = 1 << 30;
pub const GEN7_WM_DW1_PS_ENABLE: u32 = 1 << 29;
pub const GEN7_WM_DW1_DEPTH_RESOLVE: u32 = 1 << 28;
pub const GEN7_WM_DW1_HIZ_RESOLVE: u32 = 1 << 27;
pub const GEN7_WM_DW1_PS_KILL: u32 = 1 << 25;
const GEN7_WM_DW1_PSCDEPTH_ON: u32 = 1 << 23;
const GEN7_WM_DW1_PS_USE_DEPTH: u32 = 1 << 20;
const GEN7_WM_DW1_PS_USE_W: u32 = 1 << 19;
const GEN7_WM_DW1_BARYCENTRIC_INTERP_SHIFT: u32 = 11;
const GEN7_WM_DW1_AA_LINE_CAP_1_0: u32 = 1 << 8;
const GEN7_WM_DW1_AA_LINE_WIDTH_2_0: u32 = 2 << 6;
const GEN7_WM_DW1_POLY_STIPPLE_ENABLE: u32 = 1 << 4;
const GEN7_WM_DW1_LINE_STIPPLE_ENABLE: u32 = 1 << 3;
const GEN7_WM_DW1_POINT_RASTRULE_UPPER_RIGHT: u32 = 1 << 2;
const GEN7_WM_DW1_MSRASTMODE_ON_PATTERN: u32 = 3 << 0;
const GEN7_WM_DW2_MSDISPMODE_PERPIXEL: u32 = 1 << 31;
pub const GEN7_PS_DW4_MAX_THREADS_SHIFT: u32 = 24;
pub const GEN75_PS_DW4_MAX_THREADS_SHIFT: u32 = 23;
const GEN7_PS_DW4_PUSH_CONSTANT_ENABLE: u32 = 1 << 11;
const GEN7_PS_DW4_ATTR_ENABLE: u32 = 1 << 10;
pub const GEN7_PS_DW4_DUAL_SOURCE_BLEND: u32 = 1 << 7;
pub const GEN7_PS_DW4_8_PIXEL_DISPATCH: u32 = 1 << 0;
const GEN7_PS_DW5_URB_GRF_START0_SHIFT: u32 = 16;

// 3DSTATE_CLIP
const CLIP_DW1_STATISTICS: u32 = 1 << 10;
const GEN7_CLIP_DW1_FRONTWINDING_CCW: u32 = 1 << 20;
const GEN7_CLIP_DW1_EARLY_CULL_ENABLE: u32 = 1 << 18;
const GEN7_CLIP_DW1_CULLMODE_SHIFT: u32 = 16;
const CLIP_DW2_CLIP_ENABLE: u32 = 1 << 31;
const CLIP_DW2_APIMODE_D3D: u32 = 1 << 30;
const CLIP_DW2_XY_TEST_ENABLE: u32 = 1 << 28;
const CLIP_DW2_Z_TEST_ENABLE: u32 = 1 << 27;
pub const CLIP_DW2_GB_TEST_ENABLE: u32 = 1 << 26;
const CLIP_DW2_UCP_CLIP_ENABLES_SHIFT: u32 = 16;
pub const CLIP_DW2_NONPERSPECTIVE_BARYCENTRIC_ENABLE: u32 = 1 << 8;
const CLIP_DW2_TRI_PROVOKE_SHIFT: u32 = 4;
const CLIP_DW2_LINE_PROVOKE_SHIFT: u32 = 2;
const CLIP_DW2_TRIFAN_PROVOKE_SHIFT: u32 = 0;
const CLIP_DW3_MIN_POINT_WIDTH_SHIFT: u32 = 17;
const CLIP_DW3_MAX_POINT_WIDTH_SHIFT: u32 = 6;
pub const CLIP_DW3_RTAINDEX_FORCED_ZERO: u32 = 1 << 5;

// 3DSTATE_SF raster dwords, shared by GEN6 and GEN7
pub const SF_DW1_DEPTH_FORMAT_SHIFT: u32 = 12;
const SF_DW1_STATISTICS: u32 = 1 << 10;
const SF_DW1_DEPTH_OFFSET_SOLID: u32 = 1 << 9;
const SF_DW1_DEPTH_OFFSET_WIREFRAME: u32 = 1 << 8;
const SF_DW1_DEPTH_OFFSET_POINT: u32 = 1 << 7;
const SF_DW1_FRONTFACE_SHIFT: u32 = 5;
const SF_DW1_BACKFACE_SHIFT: u32 = 3;
const SF_DW1_VIEWPORT_ENABLE: u32 = 1 << 1;
const SF_DW1_FRONTWINDING_CCW: u32 = 1 << 0;
const SF_DW2_AA_LINE_ENABLE: u32 = 1 << 31;
const SF_DW2_CULLMODE_SHIFT: u32 = 29;
const SF_DW2_LINE_WIDTH_SHIFT: u32 = 18;
const SF_DW2_AA_LINE_CAP_1_0: u32 = 1 << 16;
const GEN75_SF_DW2_LINE_STIPPLE_ENABLE: u32 = 1 << 14;
const SF_DW2_SCISSOR_ENABLE: u32 = 1 << 11;
pub const SF_DW2_MSRASTMODE_ON_PATTERN: u32 = 3 << 8;
const SF_DW3_LAST_PIXEL_ENABLE: u32 = 1 << 31;
const SF_DW3_TRI_PROVOKE_SHIFT: u32 = 29;
const SF_DW3_LINE_PROVOKE_SHIFT: u32 = 27;
const SF_DW3_TRIFAN_PROVOKE_SHIFT: u32 = 25;
const SF_DW3_TRUE_AA_LINE_DISTANCE: u32 = 1 << 14;
const SF_DW3_USE_POINT_WIDTH: u32 = 1 << 11;

// VERTEX_ELEMENT_STATE
pub const VE_DW0_VB_INDEX_SHIFT: u32 = 26;
pub const VE_DW0_VALID: u32 = 1 << 25;
pub const VE_DW0_FORMAT_SHIFT: u32 = 16;
pub const VE_DW0_EDGE_FLAG_ENABLE: u32 = 1 << 15;
pub const VE_DW0_VB_OFFSET_SHIFT: u32 = 0;
pub const VE_DW1_COMP0_SHIFT: u32 = 28;
pub const VE_DW1_COMP1_SHIFT: u32 = 24;
pub const VE_DW1_COMP2_SHIFT: u32 = 20;
pub const VE_DW1_COMP3_SHIFT: u32 = 16;

fn translate_blend_factor(f: BlendFactor) -> u32 {
	use self::BlendFactor::*;
	match f {
		One => 0x01,
		SrcColor => 0x02,
		SrcAlpha => 0x03,
		DstAlpha => 0x04,
		DstColor => 0x05,
		SrcAlphaSaturate => 0x06,
		ConstColor => 0x07,
		ConstAlpha => 0x08,
		Src1Color => 0x09,
		Src1Alpha => 0x0a,
		Zero => 0x11,
		InvSrcColor => 0x12,
		InvSrcAlpha => 0x13,
		InvDstAlpha => 0x14,
		InvDstColor => 0x15,
		InvConstColor => 0x17,
		InvConstAlpha => 0x18,
		InvSrc1Color => 0x19,
		InvSrc1Alpha => 0x1a,
	}
}

fn translate_blend_func(f: BlendFunc) -> u32 {
	match f {
		BlendFunc::Add => 0,
		BlendFunc::Subtract => 1,
		BlendFunc::ReverseSubtract => 2,
		BlendFunc::Min => 3,
		BlendFunc::Max => 4,
	}
}

fn translate_logicop(op: LogicOp) -> u32 {
	use self::LogicOp::*;
	match op {
		Clear => 0x0,
		Nor => 0x1,
		AndInverted => 0x2,
		CopyInverted => 0x3,
		AndReverse => 0x4,
		Invert => 0x5,
		Xor => 0x6,
		Nand => 0x7,
		And => 0x8,
		Equiv => 0x9,
		Noop => 0xa,
		OrInverted => 0xb,
		Copy => 0xc,
		OrReverse => 0xd,
		Or => 0xe,
		Set => 0xf,
	}
}

fn translate_stencil_op(op: StencilOp) -> u32 {
	match op {
		StencilOp::Keep => 0,
		StencilOp::Zero => 1,
		StencilOp::Replace => 2,
		StencilOp::Incr => 3,
		StencilOp::Decr => 4,
		StencilOp::IncrWrap => 5,
		StencilOp::DecrWrap => 6,
		StencilOp::Invert => 7,
	}
}

pub fn translate_dsa_func(func: CompareFunc) -> u32 {
	match func {
		CompareFunc::Never => COMPAREFUNCTION_NEVER,
		CompareFunc::Less => COMPAREFUNCTION_LESS,
		CompareFunc::Equal => COMPAREFUNCTION_EQUAL,
		CompareFunc::LEqual => COMPAREFUNCTION_LEQUAL,
		CompareFunc::Greater => COMPAREFUNCTION_GREATER,
		CompareFunc::NotEqual => COMPAREFUNCTION_NOTEQUAL,
		CompareFunc::GEqual => COMPAREFUNCTION_GEQUAL,
		CompareFunc::Always => COMPAREFUNCTION_ALWAYS,
	}
}

// the sampler compares the other way around
fn translate_shadow_func(func: CompareFunc) -> u32 {
	match func {
		CompareFunc::Never => COMPAREFUNCTION_ALWAYS,
		CompareFunc::Less => COMPAREFUNCTION_LEQUAL,
		CompareFunc::Equal => COMPAREFUNCTION_NOTEQUAL,
		CompareFunc::LEqual => COMPAREFUNCTION_LESS,
		CompareFunc::Greater => COMPAREFUNCTION_GEQUAL,
		CompareFunc::NotEqual => COMPAREFUNCTION_EQUAL,
		CompareFunc::GEqual => COMPAREFUNCTION_GREATER,
		CompareFunc::Always => COMPAREFUNCTION_NEVER,
	}
}

fn translate_wrap(wrap: Wrap, clamp_to_edge: bool) -> u32 {
	let wrap = match wrap {
		Wrap::Clamp if clamp_to_edge => Wrap::ClampToEdge,
		Wrap::Clamp => Wrap::ClampToBorder,
		w => w,
	};
	match wrap {
		Wrap::Repeat => TEXCOORDMODE_WRAP,
		Wrap::ClampToEdge => TEXCOORDMODE_CLAMP,
		Wrap::ClampToBorder => TEXCOORDMODE_CLAMP_BORDER,
		Wrap::MirrorRepeat => TEXCOORDMODE_MIRROR,
		Wrap::Clamp => unreachable!(),
	}
}

fn translate_filter(f: TexFilter) -> u32 {
	match f {
		TexFilter::Nearest => MAPFILTER_NEAREST,
		TexFilter::Linear => MAPFILTER_LINEAR,
	}
}

fn translate_mipfilter(f: MipFilter) -> u32 {
	match f {
		MipFilter::None => MIPFILTER_NONE,
		MipFilter::Nearest => MIPFILTER_NEAREST,
		MipFilter::Linear => MIPFILTER_LINEAR,
	}
}

fn translate_cull_face(face: Face) -> u32 {
	match face {
		Face::FrontAndBack => 0,
		Face::None => 1,
		Face::Front => 2,
		Face::Back => 3,
	}
}

fn translate_fill(mode: PolygonMode) -> u32 {
	match mode {
		PolygonMode::Fill => 0,
		PolygonMode::Line => 1,
		PolygonMode::Point => 2,
	}
}

fn float_to_ubyte(f: f32) -> u8 {
	(f.max(0.0).min(1.0) * 255.0).round() as u8
}

/// IEEE half-float bits, rounding to nearest and flushing denormals.
pub fn float_to_half(f: f32) -> u16 {
	let bits = f.to_bits();
	let sign = ((bits >> 16) & 0x8000) as u16;
	let exp = ((bits >> 23) & 0xff) as i32;
	let mant = bits & 0x7f_ffff;
	if exp == 0xff {
		return sign | 0x7c00 | if mant != 0 { 0x200 } else { 0 };
	}
	let e = exp - 127 + 15;
	if e >= 0x1f {
		sign | 0x7c00
	} else if e <= 0 {
		sign
	} else {
		let mut h = (e as u32) << 10 | mant >> 13;
		if mant & 0x1000 != 0 && (mant & 0x2fff) != 0 {
			h += 1;
		}
		sign | h as u16
	}
}

/// Kernel parameters reported by the shader compiler.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Kernel {
	pub input_count: u32,
	pub output_count: u32,
	pub urb_data_start_reg: u32,
	pub sampler_count: u32,
	pub input_edgeflag: bool,
	pub input_vertexid: bool,
	pub input_instanceid: bool,
	/// Bytes of push constants taken from constant buffer 0.
	pub pcb_cbuf0_size: u32,
	/// Bytes of push constants taken by user clip planes.
	pub vs_pcb_ucp_size: u32,
	/// The VS carries the GEN6 stream output GS kernel.
	pub vs_gen6_so: bool,
	pub vs_gen6_so_start_reg: u32,
	pub vs_gen6_so_point_offset: u32,
	pub vs_gen6_so_line_offset: u32,
	pub vs_gen6_so_tri_offset: u32,
	pub gs_discard_adjacency: bool,
	pub gs_gen6_svbi_post_inc: u32,
	pub fs_input_z: bool,
	pub fs_input_w: bool,
	pub fs_output_z: bool,
	pub fs_use_kill: bool,
	pub fs_barycentric_interps: u32,
	pub fs_dispatch_16_offset: u32,
}

/// How FS inputs are fetched from the VUE.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Routing {
	pub source_skip: u32,
	pub source_len: u32,
	pub swizzle_enable: bool,
	pub swizzles: [u16; 16],
	pub point_sprite_enable: u32,
	pub const_interp_enable: u32,
}

/// Barycentric interpolation modes, as reported in `fs_barycentric_interps`.
pub const BARYCENTRIC_NONPERSPECTIVE_MASK: u32 = 0x38;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SoOutput {
	pub register_index: u32,
	pub start_component: u32,
	pub num_components: u32,
	pub output_buffer: u32,
	/// In dwords.
	pub dst_offset: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SoInfo {
	pub outputs: Vec<SoOutput>,
	/// Vertex stride of every buffer, in dwords.
	pub stride: [u32; 4],
}

/// Stage-specific dwords of 3DSTATE_VS, 3DSTATE_GS or 3DSTATE_WM/PS.
pub type ShaderCso = [u32; 4];

fn vue_read_len(count: u32) -> u32 {
	((count + 1) / 2).max(1)
}

pub fn init_vs_cso(dev: &DeviceInfo, k: &Kernel) -> ShaderCso {
	let max_threads = match dev.gen {
		Gen::Gen6 => if dev.gt == 2 { 60 } else { 24 },
		Gen::Gen7 => if dev.gt == 2 { 128 } else { 36 },
		Gen::Gen75 => if dev.gt >= 2 { 280 } else { 70 },
	};
	let dw4 = k.urb_data_start_reg << VS_DW4_URB_GRF_START_SHIFT |
		vue_read_len(k.input_count) << VS_DW4_URB_READ_LEN_SHIFT;
	let mut dw5 = VS_DW5_STATISTICS | VS_DW5_VS_ENABLE;
	if dev.gen >= Gen::Gen75 {
		dw5 |= (max_threads - 1) << 23;
	} else {
		dw5 |= (max_threads - 1) << 25;
	}
	[0, dw4, dw5, 0]
}

/// GEN6 GS state, either for a real geometry shader or for the stream
/// output kernel carried by a vertex shader.
pub fn init_gs_cso_gen6(dev: &DeviceInfo, k: &Kernel, is_vs: bool) -> ShaderCso {
	let (start_grf, read_len) = if is_vs {
		(k.vs_gen6_so_start_reg, k.output_count)
	} else {
		(k.urb_data_start_reg, k.input_count)
	};
	let max_threads = if dev.gt == 2 { 28 } else { 21 };
	let dw4 = vue_read_len(read_len) << GS_DW4_URB_READ_LEN_SHIFT | start_grf;
	let dw5 = (max_threads - 1) << 25 |
		GS_DW5_STATISTICS |
		GS_DW5_SO_STATISTICS |
		GS_DW5_RENDER_ENABLE;
	let mut dw6 = GS_DW6_GS_ENABLE;
	if k.gs_discard_adjacency {
		dw6 |= GS_DW6_DISCARD_ADJACENCY;
	}
	if k.vs_gen6_so {
		dw6 |= GS_DW6_SVBI_PAYLOAD_ENABLE;
		if k.gs_gen6_svbi_post_inc != 0 {
			dw6 |= GS_DW6_SVBI_POST_INC_ENABLE |
				k.gs_gen6_svbi_post_inc << GS_DW6_SVBI_POST_INC_VAL_SHIFT;
		}
	}
	[THREADDISP_SPF, dw4, dw5, dw6]
}

pub fn init_gs_cso_gen7(dev: &DeviceInfo, k: &Kernel) -> ShaderCso {
	let (max_threads, shift) = match dev.gen {
		Gen::Gen75 => (if dev.gt >= 2 { 256 } else { 70 }, 24),
		_ => (if dev.gt == 2 { 128 } else { 36 }, 25),
	};
	let dw4 = vue_read_len(k.input_count) << GS_DW4_URB_READ_LEN_SHIFT | k.urb_data_start_reg;
	let dw5 = (max_threads - 1) << shift | GS_DW5_STATISTICS | GEN7_GS_DW5_GS_ENABLE;
	[0, dw4, dw5, 0]
}

pub fn init_fs_cso_gen6(dev: &DeviceInfo, k: &Kernel) -> ShaderCso {
	let max_threads = if dev.gt == 2 { 80 } else { 40 };
	assert_eq!(k.fs_dispatch_16_offset, 0, "16-pixel dispatch is not supported");

	let dw4 = k.urb_data_start_reg << WM_DW4_URB_GRF_START0_SHIFT;
	let mut dw5 = (max_threads - 1) << WM_DW5_MAX_THREADS_SHIFT;
	if k.fs_use_kill {
		dw5 |= WM_DW5_PS_KILL;
	}
	if k.fs_output_z {
		dw5 |= WM_DW5_PS_COMPUTE_DEPTH;
	}
	if k.fs_input_z {
		dw5 |= WM_DW5_PS_USE_DEPTH;
	}
	if k.fs_input_w {
		dw5 |= WM_DW5_PS_USE_W;
	}
	dw5 |= WM_DW5_PS_ENABLE | WM_DW5_8_PIXEL_DISPATCH;
	let dw6 = k.input_count << WM_DW6_SF_ATTR_COUNT_SHIFT |
		k.fs_barycentric_interps << WM_DW6_BARYCENTRIC_INTERP_SHIFT;
	[0, dw4, dw5, dw6]
}

/// 3DSTATE_PS dwords 2, 4 and 5, plus the bits the FS contributes to
/// 3DSTATE_WM dword 1.
pub fn init_fs_cso_gen7(dev: &DeviceInfo, k: &Kernel) -> ShaderCso {
	let mut dw4 = GEN7_PS_DW4_8_PIXEL_DISPATCH;
	if dev.gen >= Gen::Gen75 {
		let max_threads = match dev.gt { 3 => 408, 2 => 204, _ => 102 };
		dw4 |= (max_threads - 1) << GEN75_PS_DW4_MAX_THREADS_SHIFT;
	} else {
		let max_threads = if dev.gt == 2 { 172 } else { 48 };
		dw4 |= (max_threads - 1) << GEN7_PS_DW4_MAX_THREADS_SHIFT;
	}
	if k.pcb_cbuf0_size != 0 {
		dw4 |= GEN7_PS_DW4_PUSH_CONSTANT_ENABLE;
	}
	if k.input_count != 0 {
		dw4 |= GEN7_PS_DW4_ATTR_ENABLE;
	}
	let dw5 = k.urb_data_start_reg << GEN7_PS_DW5_URB_GRF_START0_SHIFT;

	let mut wm = GEN7_WM_DW1_PS_ENABLE |
		k.fs_barycentric_interps << GEN7_WM_DW1_BARYCENTRIC_INTERP_SHIFT;
	if k.fs_use_kill {
		wm |= GEN7_WM_DW1_PS_KILL;
	}
	if k.fs_output_z {
		wm |= GEN7_WM_DW1_PSCDEPTH_ON;
	}
	if k.fs_input_z {
		wm |= GEN7_WM_DW1_PS_USE_DEPTH;
	}
	if k.fs_input_w {
		wm |= GEN7_WM_DW1_PS_USE_W;
	}
	[0, dw4, dw5, wm]
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexElementDesc {
	pub src_offset: u32,
	pub vertex_buffer_index: usize,
	pub instance_divisor: u32,
	pub src_format: Format,
}

/// Vertex elements, with the vertex buffers they read renumbered so that
/// every (buffer, divisor) pair gets its own hardware slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexElements {
	pub cso: Vec<[u32; 2]>,
	pub vb_mapping: Vec<usize>,
	pub instance_divisors: Vec<u32>,
	/// Format of each element, for the edge flag conversion.
	pub formats: Vec<u32>,
}

impl VertexElements {
	pub fn new(dev: &DeviceInfo, states: &[VertexElementDesc]) -> VertexElements {
		let _ = dev;
		let mut ve = VertexElements::default();
		for state in states {
			let hw_idx = match ve.vb_mapping.iter().zip(&ve.instance_divisors)
				.position(|(&m, &d)| m == state.vertex_buffer_index && d == state.instance_divisor) {
				Some(idx) => idx,
				None => {
					ve.vb_mapping.push(state.vertex_buffer_index);
					ve.instance_divisors.push(state.instance_divisor);
					ve.vb_mapping.len() - 1
				}
			};

			let mut comp = [VFCOMP_STORE_SRC; 4];
			let n = state.src_format.components();
			if n < 2 {
				comp[1] = VFCOMP_STORE_0;
			}
			if n < 3 {
				comp[2] = VFCOMP_STORE_0;
			}
			if n < 4 {
				comp[3] = if state.src_format.is_pure_integer() { VFCOMP_STORE_1_INT } else { VFCOMP_STORE_1_FP };
			}
			let format = state.src_format.vertex_format().unwrap_or(HW_R32_FLOAT);

			ve.cso.push([
				(hw_idx as u32) << VE_DW0_VB_INDEX_SHIFT |
					VE_DW0_VALID |
					format << VE_DW0_FORMAT_SHIFT |
					state.src_offset << VE_DW0_VB_OFFSET_SHIFT,
				comp[0] << VE_DW1_COMP0_SHIFT |
					comp[1] << VE_DW1_COMP1_SHIFT |
					comp[2] << VE_DW1_COMP2_SHIFT |
					comp[3] << VE_DW1_COMP3_SHIFT,
			]);
			ve.formats.push(format);
		}
		ve
	}

	pub fn count(&self) -> usize {
		self.cso.len()
	}

	pub fn vb_count(&self) -> usize {
		self.vb_mapping.len()
	}

	/// The edge flag element is fetched as an integer.
	pub fn edgeflag_cso(&self) -> [u32; 2] {
		let last = self.count() - 1;
		let mut dw = self.cso[last];
		let format = self.formats[last];
		let format = if format == HW_R32_FLOAT { HW_R32_UINT } else { format };
		dw[0] = (dw[0] & !(0x1ff << VE_DW0_FORMAT_SHIFT)) | format << VE_DW0_FORMAT_SHIFT | VE_DW0_EDGE_FLAG_ENABLE;
		dw[1] = VFCOMP_STORE_SRC << VE_DW1_COMP0_SHIFT |
			VFCOMP_NOSTORE << VE_DW1_COMP1_SHIFT |
			VFCOMP_NOSTORE << VE_DW1_COMP2_SHIFT |
			VFCOMP_NOSTORE << VE_DW1_COMP3_SHIFT;
		dw
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterizerDesc {
	pub flatshade_first: bool,
	pub front_ccw: bool,
	pub cull_face: Face,
	pub fill_front: PolygonMode,
	pub fill_back: PolygonMode,
	pub offset_point: bool,
	pub offset_line: bool,
	pub offset_tri: bool,
	pub offset_units: f32,
	pub offset_scale: f32,
	pub offset_clamp: f32,
	pub scissor: bool,
	pub poly_stipple_enable: bool,
	pub line_stipple_enable: bool,
	pub line_stipple_factor: u32,
	pub line_stipple_pattern: u32,
	pub line_smooth: bool,
	pub line_last_pixel: bool,
	pub line_width: f32,
	pub point_size: f32,
	pub point_size_per_vertex: bool,
	pub sprite_coord_mode: SpriteCoord,
	pub multisample: bool,
	pub bottom_edge_rule: bool,
	pub depth_clip: bool,
	pub clip_halfz: bool,
	pub clip_plane_enable: u32,
	/// Sample positions are at pixel centers rather than the upper left
	/// corner.
	pub half_pixel_center: bool,
	pub rasterizer_discard: bool,
}

impl Default for RasterizerDesc {
	fn default() -> RasterizerDesc {
		RasterizerDesc {
			flatshade_first: false,
			front_ccw: false,
			cull_face: Face::None,
			fill_front: PolygonMode::Fill,
			fill_back: PolygonMode::Fill,
			offset_point: false,
			offset_line: false,
			offset_tri: false,
			offset_units: 0.0,
			offset_scale: 0.0,
			offset_clamp: 0.0,
			scissor: false,
			poly_stipple_enable: false,
			line_stipple_enable: false,
			line_stipple_factor: 0,
			line_stipple_pattern: 0,
			line_smooth: false,
			line_last_pixel: false,
			line_width: 1.0,
			point_size: 1.0,
			point_size_per_vertex: false,
			sprite_coord_mode: SpriteCoord::UpperLeft,
			multisample: false,
			bottom_edge_rule: false,
			depth_clip: true,
			clip_halfz: false,
			clip_plane_enable: 0,
			half_pixel_center: true,
			rasterizer_discard: false,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipCso {
	pub payload: [u32; 3],
	pub can_enable_guardband: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SfCso {
	pub payload: [u32; 6],
	pub dw_msaa: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WmCso {
	pub payload: [u32; 2],
	pub dw_msaa_rast: u32,
	pub dw_msaa_disp: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rasterizer {
	pub state: RasterizerDesc,
	pub clip: ClipCso,
	pub sf: SfCso,
	pub wm: WmCso,
}

impl Rasterizer {
	pub fn new(dev: &DeviceInfo, state: &RasterizerDesc) -> Rasterizer {
		Rasterizer {
			state: *state,
			clip: init_rasterizer_clip(dev, state),
			sf: init_rasterizer_sf(dev, state),
			wm: if dev.gen >= Gen::Gen7 {
				init_rasterizer_wm_gen7(state)
			} else {
				init_rasterizer_wm_gen6(state)
			},
		}
	}
}

fn provoking_vertex(flatshade_first: bool) -> (u32, u32, u32) {
	// (tri, line, trifan)
	if flatshade_first { (0, 0, 1) } else { (2, 1, 2) }
}

fn init_rasterizer_clip(dev: &DeviceInfo, state: &RasterizerDesc) -> ClipCso {
	let mut dw1 = CLIP_DW1_STATISTICS;
	if dev.gen >= Gen::Gen7 {
		dw1 |= GEN7_CLIP_DW1_EARLY_CULL_ENABLE |
			translate_cull_face(state.cull_face) << GEN7_CLIP_DW1_CULLMODE_SHIFT;
		if state.front_ccw {
			dw1 |= GEN7_CLIP_DW1_FRONTWINDING_CCW;
		}
	}

	let mut dw2 = CLIP_DW2_CLIP_ENABLE |
		CLIP_DW2_XY_TEST_ENABLE |
		state.clip_plane_enable << CLIP_DW2_UCP_CLIP_ENABLES_SHIFT;
	if state.clip_halfz {
		dw2 |= CLIP_DW2_APIMODE_D3D;
	}
	if state.depth_clip {
		dw2 |= CLIP_DW2_Z_TEST_ENABLE;
	}
	let (tri, line, trifan) = provoking_vertex(state.flatshade_first);
	dw2 |= tri << CLIP_DW2_TRI_PROVOKE_SHIFT |
		line << CLIP_DW2_LINE_PROVOKE_SHIFT |
		trifan << CLIP_DW2_TRIFAN_PROVOKE_SHIFT;

	let dw3 = 0x1 << CLIP_DW3_MIN_POINT_WIDTH_SHIFT |
		0x7ff << CLIP_DW3_MAX_POINT_WIDTH_SHIFT;

	// wide points and lines may be clipped away by the guardband test
	let can_enable_guardband = !(state.point_size_per_vertex || state.point_size > 1.0 ||
		state.line_smooth || state.line_width > 1.0);

	ClipCso {
		payload: [dw1, dw2, dw3],
		can_enable_guardband: can_enable_guardband,
	}
}

fn init_rasterizer_sf(dev: &DeviceInfo, state: &RasterizerDesc) -> SfCso {
	let mut dw1 = SF_DW1_STATISTICS | SF_DW1_VIEWPORT_ENABLE;
	if state.offset_tri {
		dw1 |= SF_DW1_DEPTH_OFFSET_SOLID;
	}
	if state.offset_line {
		dw1 |= SF_DW1_DEPTH_OFFSET_WIREFRAME;
	}
	if state.offset_point {
		dw1 |= SF_DW1_DEPTH_OFFSET_POINT;
	}
	dw1 |= translate_fill(state.fill_front) << SF_DW1_FRONTFACE_SHIFT |
		translate_fill(state.fill_back) << SF_DW1_BACKFACE_SHIFT;
	if state.front_ccw {
		dw1 |= SF_DW1_FRONTWINDING_CCW;
	}

	let mut dw2 = translate_cull_face(state.cull_face) << SF_DW2_CULLMODE_SHIFT;
	if state.line_smooth {
		dw2 |= SF_DW2_AA_LINE_ENABLE | SF_DW2_AA_LINE_CAP_1_0;
	}
	let smooth = if state.line_smooth { 1.0 } else { 0.0 };
	let mut line_width = (((state.line_width + smooth) * 128.0 + 0.5) as i32).max(0).min(1023) as u32;
	// a width of exactly one pixel is drawn as the thinnest line
	if line_width == 128 && !state.line_smooth {
		line_width = 0;
	}
	dw2 |= line_width << SF_DW2_LINE_WIDTH_SHIFT;
	if dev.gen >= Gen::Gen75 && state.line_stipple_enable {
		dw2 |= GEN75_SF_DW2_LINE_STIPPLE_ENABLE;
	}
	if state.scissor {
		dw2 |= SF_DW2_SCISSOR_ENABLE;
	}

	let mut dw3 = SF_DW3_TRUE_AA_LINE_DISTANCE;
	if state.line_last_pixel {
		dw3 |= SF_DW3_LAST_PIXEL_ENABLE;
	}
	let (tri, line, trifan) = provoking_vertex(state.flatshade_first);
	dw3 |= tri << SF_DW3_TRI_PROVOKE_SHIFT |
		line << SF_DW3_LINE_PROVOKE_SHIFT |
		trifan << SF_DW3_TRIFAN_PROVOKE_SHIFT;
	if !state.point_size_per_vertex {
		dw3 |= SF_DW3_USE_POINT_WIDTH;
	}
	let point_width = ((state.point_size * 8.0 + 0.5) as i32).max(1).min(2047) as u32;
	dw3 |= point_width;

	let dw_msaa = if state.multisample {
		let mut dw = SF_DW2_MSRASTMODE_ON_PATTERN;
		if line_width == 0 {
			dw |= 128 << SF_DW2_LINE_WIDTH_SHIFT;
		}
		dw
	} else {
		0
	};

	SfCso {
		payload: [
			dw1,
			dw2,
			dw3,
			(state.offset_units * 2.0).to_bits(),
			state.offset_scale.to_bits(),
			state.offset_clamp.to_bits(),
		],
		dw_msaa: dw_msaa,
	}
}

fn init_rasterizer_wm_gen6(state: &RasterizerDesc) -> WmCso {
	let mut dw5 = WM_DW5_AA_LINE_WIDTH_2_0;
	if state.line_smooth {
		dw5 |= WM_DW5_AA_LINE_CAP_1_0;
	}
	if state.poly_stipple_enable {
		dw5 |= WM_DW5_POLY_STIPPLE_ENABLE;
	}
	if state.line_stipple_enable {
		dw5 |= WM_DW5_LINE_STIPPLE_ENABLE;
	}
	let mut dw6 = 0;
	if state.bottom_edge_rule {
		dw6 |= WM_DW6_POINT_RASTRULE_UPPER_RIGHT;
	}
	WmCso {
		payload: [dw5, dw6],
		dw_msaa_rast: if state.multisample { WM_DW6_MSRASTMODE_ON_PATTERN } else { 0 },
		dw_msaa_disp: WM_DW6_MSDISPMODE_PERPIXEL,
	}
}

fn init_rasterizer_wm_gen7(state: &RasterizerDesc) -> WmCso {
	let mut dw1 = GEN7_WM_DW1_AA_LINE_WIDTH_2_0;
	if state.line_smooth {
		dw1 |= GEN7_WM_DW1_AA_LINE_CAP_1_0;
	}
	if state.poly_stipple_enable {
		dw1 |= GEN7_WM_DW1_POLY_STIPPLE_ENABLE;
	}
	if state.line_stipple_enable {
		dw1 |= GEN7_WM_DW1_LINE_STIPPLE_ENABLE;
	}
	if state.bottom_edge_rule {
		dw1 |= GEN7_WM_DW1_POINT_RASTRULE_UPPER_RIGHT;
	}
	WmCso {
		payload: [dw1, 0],
		dw_msaa_rast: if state.multisample { GEN7_WM_DW1_MSRASTMODE_ON_PATTERN } else { 0 },
		dw_msaa_disp: GEN7_WM_DW2_MSDISPMODE_PERPIXEL,
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportDesc {
	pub scale: [f32; 3],
	pub translate: [f32; 3],
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
	pub m00: f32,
	pub m11: f32,
	pub m22: f32,
	pub m30: f32,
	pub m31: f32,
	pub m32: f32,
	// guardband in NDC space
	pub min_gbx: f32,
	pub max_gbx: f32,
	pub min_gby: f32,
	pub max_gby: f32,
	// viewport in screen space
	pub min_x: f32,
	pub max_x: f32,
	pub min_y: f32,
	pub max_y: f32,
	pub min_z: f32,
	pub max_z: f32,
}

/// An 8K-wide guardband centered on the viewport, kept inside the
/// coordinate range the hardware supports.
fn guardband(dev: &DeviceInfo, center_x: i32, center_y: i32) -> (i32, i32, i32, i32) {
	let max_extent = if dev.gen >= Gen::Gen7 { 32768 } else { 16384 };
	let half_len = 8192 / 2;
	let clamp = |c: i32| {
		if c - half_len < -max_extent {
			-max_extent + half_len
		} else if c + half_len > max_extent - 1 {
			max_extent - half_len
		} else {
			c
		}
	};
	let (cx, cy) = (clamp(center_x), clamp(center_y));
	(cx - half_len, cx + half_len, cy - half_len, cy + half_len)
}

impl Viewport {
	pub fn new(dev: &DeviceInfo, state: &ViewportDesc) -> Viewport {
		let scale_x = state.scale[0].abs();
		let scale_y = state.scale[1].abs();
		let scale_z = state.scale[2].abs();
		let (min_gbx, max_gbx, min_gby, max_gby) =
			guardband(dev, state.translate[0] as i32, state.translate[1] as i32);

		Viewport {
			m00: state.scale[0],
			m11: state.scale[1],
			m22: state.scale[2],
			m30: state.translate[0],
			m31: state.translate[1],
			m32: state.translate[2],
			min_gbx: (min_gbx as f32 - state.translate[0]) / scale_x,
			max_gbx: (max_gbx as f32 - state.translate[0]) / scale_x,
			min_gby: (min_gby as f32 - state.translate[1]) / scale_y,
			max_gby: (max_gby as f32 - state.translate[1]) / scale_y,
			min_x: -scale_x + state.translate[0],
			max_x: scale_x + state.translate[0],
			min_y: -scale_y + state.translate[1],
			max_y: scale_y + state.translate[1],
			min_z: -scale_z + state.translate[2],
			max_z: scale_z + state.translate[2],
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorDesc {
	pub minx: u32,
	pub miny: u32,
	pub maxx: u32,
	pub maxy: u32,
}

/// SCISSOR_RECT words for every viewport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scissor {
	pub payload: [u32; 32],
}

impl Scissor {
	/// Scissors that reject everything.
	pub fn null() -> Scissor {
		let mut payload = [0; 32];
		for pair in payload.chunks_mut(2) {
			pair[0] = 1 << 16 | 1;
			pair[1] = 0;
		}
		Scissor { payload: payload }
	}

	pub fn set(&mut self, start_slot: usize, states: &[ScissorDesc]) {
		for (i, s) in states.iter().enumerate() {
			// empty rects become min > max
			let (min_x, min_y, max_x, max_y) = if s.minx < s.maxx && s.miny < s.maxy {
				(s.minx, s.miny, s.maxx - 1, s.maxy - 1)
			} else {
				(1, 1, 0, 0)
			};
			let slot = start_slot + i;
			self.payload[slot * 2] = (min_y & 0xffff) << 16 | (min_x & 0xffff);
			self.payload[slot * 2 + 1] = (max_y & 0xffff) << 16 | (max_x & 0xffff);
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RtBlendDesc {
	pub blend_enable: bool,
	pub rgb_func: BlendFunc,
	pub rgb_src_factor: BlendFactor,
	pub rgb_dst_factor: BlendFactor,
	pub alpha_func: BlendFunc,
	pub alpha_src_factor: BlendFactor,
	pub alpha_dst_factor: BlendFactor,
	/// RGBA bits, red in bit 0.
	pub colormask: u32,
}

impl Default for RtBlendDesc {
	fn default() -> RtBlendDesc {
		RtBlendDesc {
			blend_enable: false,
			rgb_func: BlendFunc::Add,
			rgb_src_factor: BlendFactor::One,
			rgb_dst_factor: BlendFactor::Zero,
			alpha_func: BlendFunc::Add,
			alpha_src_factor: BlendFactor::One,
			alpha_dst_factor: BlendFactor::Zero,
			colormask: 0xf,
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BlendDesc {
	pub independent_blend_enable: bool,
	pub logicop_enable: bool,
	pub logicop_func: Option<LogicOp>,
	pub dither: bool,
	pub alpha_to_coverage: bool,
	pub alpha_to_one: bool,
	pub rt: [RtBlendDesc; 8],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlendCso {
	pub payload: [u32; 2],
	pub dw_blend: u32,
	pub dw_blend_dst_alpha_forced_one: u32,
	pub dw_alpha_mod: u32,
	pub dw_logicop: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Blend {
	pub independent_blend_enable: bool,
	pub alpha_to_coverage: bool,
	pub dual_blend: bool,
	pub cso: [BlendCso; 8],
}

fn dst_alpha_forced_one(factor: u32) -> u32 {
	match factor {
		BLENDFACTOR_DST_ALPHA => BLENDFACTOR_ONE,
		BLENDFACTOR_INV_DST_ALPHA | BLENDFACTOR_SRC_ALPHA_SATURATE => BLENDFACTOR_ZERO,
		f => f,
	}
}

fn rt_blend_enable(rt: &RtBlendDesc, forced_one: bool) -> u32 {
	if !rt.blend_enable {
		return 0;
	}
	let fix = |f: BlendFactor| {
		let f = translate_blend_factor(f);
		if forced_one { dst_alpha_forced_one(f) } else { f }
	};
	let rgb_src = fix(rt.rgb_src_factor);
	let rgb_dst = fix(rt.rgb_dst_factor);
	let a_src = fix(rt.alpha_src_factor);
	let a_dst = fix(rt.alpha_dst_factor);

	let mut dw = 1 << 31 |
		translate_blend_func(rt.alpha_func) << 26 |
		a_src << 20 |
		a_dst << 15 |
		translate_blend_func(rt.rgb_func) << 11 |
		rgb_src << 5 |
		rgb_dst;
	if rt.rgb_func != rt.alpha_func || rgb_src != a_src || rgb_dst != a_dst {
		dw |= 1 << 30;
	}
	dw
}

fn uses_src1(f: BlendFactor) -> bool {
	match f {
		BlendFactor::Src1Color | BlendFactor::Src1Alpha |
		BlendFactor::InvSrc1Color | BlendFactor::InvSrc1Alpha => true,
		_ => false,
	}
}

impl Blend {
	pub fn new(dev: &DeviceInfo, state: &BlendDesc) -> Blend {
		let num_cso = if state.independent_blend_enable { 8 } else { 1 };
		let mut blend = Blend {
			independent_blend_enable: state.independent_blend_enable,
			alpha_to_coverage: state.alpha_to_coverage,
			dual_blend: false,
			cso: [BlendCso::default(); 8],
		};

		for (rt, cso) in state.rt.iter().zip(blend.cso.iter_mut()).take(num_cso) {
			// pre- and post-blend clamping, clamp to the RT format range
			cso.payload[0] = 0;
			cso.payload[1] = 2 << 2 | 0x3;
			if rt.colormask & 0x8 == 0 {
				cso.payload[1] |= 1 << 27;
			}
			if rt.colormask & 0x1 == 0 {
				cso.payload[1] |= 1 << 26;
			}
			if rt.colormask & 0x2 == 0 {
				cso.payload[1] |= 1 << 25;
			}
			if rt.colormask & 0x4 == 0 {
				cso.payload[1] |= 1 << 24;
			}
			if state.dither {
				cso.payload[1] |= 1 << 12;
			}

			let dual_blend;
			if state.logicop_enable {
				let func = state.logicop_func.unwrap_or(LogicOp::Copy);
				cso.dw_logicop = 1 << 22 | translate_logicop(func) << 18;
				cso.dw_blend = 0;
				cso.dw_blend_dst_alpha_forced_one = 0;
				dual_blend = false;
			} else {
				cso.dw_logicop = 0;
				cso.dw_blend = rt_blend_enable(rt, false);
				cso.dw_blend_dst_alpha_forced_one = rt_blend_enable(rt, true);
				dual_blend = rt.blend_enable && (uses_src1(rt.rgb_src_factor) ||
					uses_src1(rt.rgb_dst_factor) || uses_src1(rt.alpha_src_factor) ||
					uses_src1(rt.alpha_dst_factor));
			}

			cso.dw_alpha_mod = 0;
			if state.alpha_to_coverage {
				cso.dw_alpha_mod |= 1 << 31;
				if dev.gen >= Gen::Gen7 {
					cso.dw_alpha_mod |= 1 << 29;
				}
			}
			if state.alpha_to_one && !dual_blend {
				cso.dw_alpha_mod |= 1 << 30;
			}
			if dual_blend {
				blend.dual_blend = true;
			}
		}
		blend
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StencilDesc {
	pub enabled: bool,
	pub func: CompareFunc,
	pub fail_op: StencilOp,
	pub zfail_op: StencilOp,
	pub zpass_op: StencilOp,
	pub valuemask: u8,
	pub writemask: u8,
}

impl Default for StencilDesc {
	fn default() -> StencilDesc {
		StencilDesc {
			enabled: false,
			func: CompareFunc::Always,
			fail_op: StencilOp::Keep,
			zfail_op: StencilOp::Keep,
			zpass_op: StencilOp::Keep,
			valuemask: 0xff,
			writemask: 0xff,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DsaDesc {
	pub depth_enabled: bool,
	pub depth_writemask: bool,
	pub depth_func: CompareFunc,
	pub stencil: [StencilDesc; 2],
	pub alpha_enabled: bool,
	pub alpha_func: CompareFunc,
	pub alpha_ref_value: f32,
}

impl Default for DsaDesc {
	fn default() -> DsaDesc {
		DsaDesc {
			depth_enabled: false,
			depth_writemask: false,
			depth_func: CompareFunc::Always,
			stencil: [StencilDesc::default(); 2],
			alpha_enabled: false,
			alpha_func: CompareFunc::Always,
			alpha_ref_value: 0.0,
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dsa {
	pub payload: [u32; 3],
	pub dw_alpha: u32,
	pub alpha_ref: u8,
}

impl Dsa {
	pub fn new(dev: &DeviceInfo, state: &DsaDesc) -> Dsa {
		let _ = dev;
		let s0 = &state.stencil[0];
		let s1 = &state.stencil[1];
		let mut dw = [0u32; 3];

		if s0.enabled {
			dw[0] = 1 << 31 |
				translate_dsa_func(s0.func) << 28 |
				translate_stencil_op(s0.fail_op) << 25 |
				translate_stencil_op(s0.zfail_op) << 22 |
				translate_stencil_op(s0.zpass_op) << 19;
			if s0.writemask != 0 {
				dw[0] |= 1 << 18;
			}
			dw[1] = (s0.valuemask as u32) << 24 | (s0.writemask as u32) << 16;

			if s1.enabled {
				dw[0] |= 1 << 15 |
					translate_dsa_func(s1.func) << 12 |
					translate_stencil_op(s1.fail_op) << 9 |
					translate_stencil_op(s1.zfail_op) << 6 |
					translate_stencil_op(s1.zpass_op) << 3;
				if s1.writemask != 0 {
					dw[0] |= 1 << 18;
				}
				dw[1] |= (s1.valuemask as u32) << 8 | s1.writemask as u32;
			}
		}

		dw[2] = (state.depth_enabled as u32) << 31 | (state.depth_writemask as u32) << 26;
		dw[2] |= if state.depth_enabled {
			translate_dsa_func(state.depth_func) << 27
		} else {
			COMPAREFUNCTION_ALWAYS << 27
		};

		Dsa {
			payload: dw,
			dw_alpha: if state.alpha_enabled {
				1 << 16 | translate_dsa_func(state.alpha_func) << 13
			} else {
				0
			},
			alpha_ref: float_to_ubyte(state.alpha_ref_value),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
	pub wrap_s: Wrap,
	pub wrap_t: Wrap,
	pub wrap_r: Wrap,
	pub min_img_filter: TexFilter,
	pub min_mip_filter: MipFilter,
	pub mag_img_filter: TexFilter,
	pub compare_func: Option<CompareFunc>,
	pub normalized_coords: bool,
	pub max_anisotropy: u32,
	pub seamless_cube_map: bool,
	pub lod_bias: f32,
	pub min_lod: f32,
	pub max_lod: f32,
	pub border_color: [f32; 4],
}

impl Default for SamplerDesc {
	fn default() -> SamplerDesc {
		SamplerDesc {
			wrap_s: Wrap::Repeat,
			wrap_t: Wrap::Repeat,
			wrap_r: Wrap::Repeat,
			min_img_filter: TexFilter::Nearest,
			min_mip_filter: MipFilter::None,
			mag_img_filter: TexFilter::Nearest,
			compare_func: None,
			normalized_coords: true,
			max_anisotropy: 0,
			seamless_cube_map: false,
			lod_bias: 0.0,
			min_lod: 0.0,
			max_lod: 1000.0,
			border_color: [0.0; 4],
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sampler {
	/// SAMPLER_STATE dwords 0, 1 and 3, then the border color.
	pub payload: [u32; 15],
	pub dw_filter: u32,
	pub dw_filter_aniso: u32,
	pub dw_wrap: u32,
	pub dw_wrap_1d: u32,
	pub dw_wrap_cube: u32,
	pub anisotropic: bool,
	pub saturate_s: bool,
	pub saturate_t: bool,
	pub saturate_r: bool,
}

/// The twelve-dword GEN6 border color, every format the sampler may need.
fn border_color_gen6(color: &[f32; 4]) -> [u32; 12] {
	let mut dw = [0u32; 12];
	let [r, g, b, a] = *color;
	dw[1] = r.to_bits();
	dw[2] = g.to_bits();
	dw[3] = b.to_bits();
	dw[4] = a.to_bits();
	dw[5] = float_to_half(r) as u32 | (float_to_half(g) as u32) << 16;
	dw[6] = float_to_half(b) as u32 | (float_to_half(a) as u32) << 16;

	let snorm: Vec<f32> = color.iter().map(|c| c.max(-1.0).min(1.0)).collect();
	let s16 = |c: f32| (c * 32767.0).round() as i16 as u16 as u32;
	let s8 = |c: f32| (c * 127.0).round() as i8 as u8 as u32;
	dw[9] = s16(snorm[0]) | s16(snorm[1]) << 16;
	dw[10] = s16(snorm[2]) | s16(snorm[3]) << 16;
	dw[11] = s8(snorm[0]) | s8(snorm[1]) << 8 | s8(snorm[2]) << 16 | s8(snorm[3]) << 24;

	let unorm: Vec<f32> = color.iter().map(|c| c.max(0.0).min(1.0)).collect();
	let u8_ = |c: f32| (c * 255.0).round() as u32;
	let u16_ = |c: f32| (c * 65535.0).round() as u32;
	dw[0] = u8_(unorm[0]) | u8_(unorm[1]) << 8 | u8_(unorm[2]) << 16 | u8_(unorm[3]) << 24;
	dw[7] = u16_(unorm[0]) | u16_(unorm[1]) << 16;
	dw[8] = u16_(unorm[2]) | u16_(unorm[3]) << 16;
	dw
}

impl Sampler {
	pub fn new(dev: &DeviceInfo, state: &SamplerDesc) -> Sampler {
		let mut sampler = Sampler::default();

		let mut mip_filter = translate_mipfilter(state.min_mip_filter);
		let min_filter = translate_filter(state.min_img_filter);
		let mut mag_filter = translate_filter(state.mag_img_filter);

		sampler.anisotropic = state.max_anisotropy > 0;
		let max_aniso = if state.max_anisotropy >= 2 && state.max_anisotropy <= 16 {
			state.max_anisotropy / 2 - 1
		} else if state.max_anisotropy > 16 {
			ANISORATIO_16
		} else {
			ANISORATIO_2
		};

		let (scale, lod_mask, max_lod_clamp) = if dev.gen >= Gen::Gen7 {
			(256.0, 0x1fff, 14.0)
		} else {
			(64.0, 0x7ff, 13.0)
		};
		let lod_bias = ((state.lod_bias.max(-16.0).min(15.9) * scale) as i32 as u32) & lod_mask;
		let max_lod = (state.max_lod.max(0.0).min(max_lod_clamp) * scale) as u32;
		let mut min_lod = (state.min_lod.max(0.0).min(max_lod_clamp) * scale) as u32;

		// without mipmapping the min/mag switch happens at min_lod
		if state.min_mip_filter == MipFilter::None && min_lod != 0 {
			min_lod = 0;
			mag_filter = min_filter;
		}

		let clamp_is_to_edge = state.min_img_filter == TexFilter::Nearest;
		if !clamp_is_to_edge {
			sampler.saturate_s = state.wrap_s == Wrap::Clamp;
			sampler.saturate_t = state.wrap_t == Wrap::Clamp;
			sampler.saturate_r = state.wrap_r == Wrap::Clamp;
		}
		let wrap_s = translate_wrap(state.wrap_s, clamp_is_to_edge);
		let wrap_t = translate_wrap(state.wrap_t, clamp_is_to_edge);
		let wrap_r = translate_wrap(state.wrap_r, clamp_is_to_edge);
		let wrap_cube = if state.seamless_cube_map &&
			(state.min_img_filter != TexFilter::Nearest || state.mag_img_filter != TexFilter::Nearest) {
			TEXCOORDMODE_CUBE
		} else {
			TEXCOORDMODE_CLAMP
		};

		if !state.normalized_coords {
			for w in &[wrap_s, wrap_t, wrap_r] {
				assert!(*w == TEXCOORDMODE_CLAMP || *w == TEXCOORDMODE_CLAMP_BORDER,
					"unnormalized coordinates need clamping");
			}
			mip_filter = MIPFILTER_NONE;
		}

		sampler.dw_wrap = wrap_s << 6 | wrap_t << 3 | wrap_r;
		sampler.dw_wrap_1d = wrap_s << 6 | TEXCOORDMODE_WRAP << 3 | TEXCOORDMODE_WRAP;
		sampler.dw_wrap_cube = wrap_cube << 6 | wrap_cube << 3 | wrap_cube;

		let mut dw3 = max_aniso << 19;
		if min_filter != MAPFILTER_NEAREST {
			dw3 |= SAMPLER_DW3_MIN_ROUND;
		}
		if mag_filter != MAPFILTER_NEAREST {
			dw3 |= SAMPLER_DW3_MAG_ROUND;
		}

		if dev.gen >= Gen::Gen7 {
			let dw0 = 1 << 28 | mip_filter << 20 | lod_bias << 1;
			sampler.dw_filter = mag_filter << 17 | min_filter << 14;
			sampler.dw_filter_aniso = MAPFILTER_ANISOTROPIC << 17 | MAPFILTER_ANISOTROPIC << 14 | 1;
			let mut dw1 = min_lod << 20 | max_lod << 8;
			if let Some(func) = state.compare_func {
				dw1 |= translate_shadow_func(func) << 1;
			}
			if !state.normalized_coords {
				dw3 |= 1 << 10;
			}
			sampler.payload[0] = dw0;
			sampler.payload[1] = dw1;
			sampler.payload[2] = dw3;
			for (dst, c) in sampler.payload[3..7].iter_mut().zip(&state.border_color) {
				*dst = c.to_bits();
			}
		} else {
			let mut dw0 = 1 << 28 | mip_filter << 20 | lod_bias << 3;
			if let Some(func) = state.compare_func {
				dw0 |= translate_shadow_func(func);
			}
			sampler.dw_filter = ((min_filter != mag_filter) as u32) << 27 |
				mag_filter << 17 |
				min_filter << 14;
			sampler.dw_filter_aniso = MAPFILTER_ANISOTROPIC << 17 | MAPFILTER_ANISOTROPIC << 14;
			let dw1 = min_lod << 22 | max_lod << 12;
			if !state.normalized_coords {
				dw3 |= 1;
			}
			sampler.payload[0] = dw0;
			sampler.payload[1] = dw1;
			sampler.payload[2] = dw3;
			sampler.payload[3..15].copy_from_slice(&border_color_gen6(&state.border_color));
		}
		sampler
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn blend_dst_alpha_forced_one() {
		let snb = DeviceInfo::snb(2);
		let mut desc = BlendDesc::default();
		desc.rt[0] = RtBlendDesc {
			blend_enable: true,
			rgb_src_factor: BlendFactor::DstAlpha,
			rgb_dst_factor: BlendFactor::InvDstAlpha,
			alpha_src_factor: BlendFactor::DstAlpha,
			alpha_dst_factor: BlendFactor::InvDstAlpha,
			..RtBlendDesc::default()
		};
		let blend = Blend::new(&snb, &desc);
		let cso = &blend.cso[0];
		assert_eq!(cso.dw_blend, 1 << 31 | 0x04 << 20 | 0x14 << 15 | 0x04 << 5 | 0x14);
		assert_eq!(cso.dw_blend_dst_alpha_forced_one, 1 << 31 | 0x01 << 20 | 0x11 << 15 | 0x01 << 5 | 0x11);
		assert_eq!(cso.payload[1], 0xb);
		assert!(!blend.dual_blend);
		assert_eq!(blend.cso[1], BlendCso::default());
	}

	#[test]
	fn dual_source_blend_disables_alpha_to_one() {
		let ivb = DeviceInfo::ivb(1);
		let mut desc = BlendDesc::default();
		desc.alpha_to_one = true;
		desc.alpha_to_coverage = true;
		desc.rt[0].blend_enable = true;
		desc.rt[0].rgb_dst_factor = BlendFactor::InvSrc1Alpha;
		let blend = Blend::new(&ivb, &desc);
		assert!(blend.dual_blend);
		assert_eq!(blend.cso[0].dw_alpha_mod, 1 << 31 | 1 << 29);
	}

	#[test]
	fn scissor_rects() {
		let mut scissor = Scissor::null();
		assert_eq!(&scissor.payload[..2], &[0x0001_0001, 0]);
		scissor.set(1, &[
			ScissorDesc { minx: 10, miny: 20, maxx: 30, maxy: 40 },
			ScissorDesc { minx: 5, miny: 5, maxx: 5, maxy: 9 },
		]);
		assert_eq!(&scissor.payload[2..6], &[20 << 16 | 10, 39 << 16 | 29, 1 << 16 | 1, 0]);
	}

	#[test]
	fn guardband_is_clamped() {
		let snb = DeviceInfo::snb(1);
		let vp = Viewport::new(&snb, &ViewportDesc {
			scale: [320.0, -240.0, 0.5],
			translate: [16000.0, 240.0, 0.5],
		});
		assert_eq!(vp.max_gbx, (16384.0 - 16000.0) / 320.0);
		assert_eq!(vp.min_gby, (240.0 - 4096.0 - 240.0) / 240.0);
		assert_eq!((vp.min_z, vp.max_z), (0.0, 1.0));
	}

	#[test]
	fn sampler_lod_and_wrap() {
		let snb = DeviceInfo::snb(1);
		let ivb = DeviceInfo::ivb(1);
		let desc = SamplerDesc {
			wrap_s: Wrap::Clamp,
			wrap_t: Wrap::ClampToEdge,
			min_img_filter: TexFilter::Linear,
			mag_img_filter: TexFilter::Linear,
			min_mip_filter: MipFilter::Linear,
			max_lod: 4.0,
			..SamplerDesc::default()
		};
		let s6 = Sampler::new(&snb, &desc);
		assert!(s6.saturate_s && !s6.saturate_t);
		assert_eq!(s6.dw_wrap, TEXCOORDMODE_CLAMP_BORDER << 6 | TEXCOORDMODE_CLAMP << 3);
		assert_eq!(s6.payload[1], (4 * 64) << 12);
		let s7 = Sampler::new(&ivb, &desc);
		assert_eq!(s7.payload[1], (4 * 256) << 8);
		assert_eq!(s7.payload[0], 1 << 28 | MIPFILTER_LINEAR << 20);
	}

	#[test]
	fn half_floats() {
		assert_eq!(float_to_half(1.0), 0x3c00);
		assert_eq!(float_to_half(-2.0), 0xc000);
		assert_eq!(float_to_half(0.0), 0);
		assert_eq!(float_to_half(65536.0), 0x7c00);
	}

	#[test]
	fn vertex_elements_share_buffers() {
		let snb = DeviceInfo::snb(1);
		let ve = VertexElements::new(&snb, &[
			VertexElementDesc { src_offset: 0, vertex_buffer_index: 3, instance_divisor: 0, src_format: Format::R32G32_FLOAT },
			VertexElementDesc { src_offset: 8, vertex_buffer_index: 3, instance_divisor: 0, src_format: Format::R32_FLOAT },
			VertexElementDesc { src_offset: 0, vertex_buffer_index: 3, instance_divisor: 1, src_format: Format::R8G8B8A8_UINT },
		]);
		assert_eq!(ve.vb_mapping, vec![3, 3]);
		assert_eq!(ve.instance_divisors, vec![0, 1]);
		assert_eq!(ve.cso[1][1], VFCOMP_STORE_SRC << 28 | VFCOMP_STORE_0 << 24 | VFCOMP_STORE_0 << 20 | VFCOMP_STORE_1_FP << 16);
		assert_eq!(ve.cso[2][0] >> VE_DW0_VB_INDEX_SHIFT, 1);
		let edge = ve.edgeflag_cso();
		assert!(edge[0] & VE_DW0_EDGE_FLAG_ENABLE != 0);
	}
}
