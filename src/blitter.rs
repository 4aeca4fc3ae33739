// HiZ operations drawn as a single RECTLIST, outside of the state vector.

use crate::cmd::*;
use crate::cso::*;
use crate::dev::DeviceInfo;
use crate::format::{Format, HW_R32G32B32A32_FLOAT, HW_R32G32_FLOAT};
use crate::state::{DrawInfo, StencilRef};
use crate::surface::ZsSurface;

/// What the WM does to the depth buffer during the rectlist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RectlistOp {
	/// Fast depth clear through HiZ.
	ClearZs,
	/// Write the HiZ buffer contents back to the depth buffer.
	ResolveZ,
	/// Rebuild the HiZ buffer from the depth buffer.
	ResolveHiz,
}

impl RectlistOp {
	/// The 3DSTATE_WM dword 4 bit on GEN6.
	pub fn gen6_hiz_op(self) -> u32 {
		match self {
			RectlistOp::ClearZs => WM_DW4_DEPTH_CLEAR,
			RectlistOp::ResolveZ => WM_DW4_DEPTH_RESOLVE,
			RectlistOp::ResolveHiz => WM_DW4_HIZ_RESOLVE,
		}
	}

	/// The 3DSTATE_WM dword 1 bit on GEN7.
	pub fn gen7_hiz_op(self) -> u32 {
		match self {
			RectlistOp::ClearZs => GEN7_WM_DW1_DEPTH_CLEAR,
			RectlistOp::ResolveZ => GEN7_WM_DW1_DEPTH_RESOLVE,
			RectlistOp::ResolveHiz => GEN7_WM_DW1_HIZ_RESOLVE,
		}
	}
}

bitflags::bitflags! {
	/// States and buffers a rectlist binds.
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct BlitterUses: u32 {
		const DSA = 1 << 0;
		const CC = 1 << 1;
		const VIEWPORT = 1 << 2;
		const FB_DEPTH = 1 << 3;
		const FB_STENCIL = 1 << 4;
	}
}

bitflags::bitflags! {
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct ClearFlags: u32 {
		const DEPTH = 1 << 0;
		const STENCIL = 1 << 1;
	}
}

/// Everything `Pipeline::emit_rectlist` needs to draw one HiZ operation.
#[derive(Clone, Debug, PartialEq)]
pub struct Blitter {
	pub op: RectlistOp,
	pub uses: BlitterUses,
	/// Corners of the rectangle: bottom right, bottom left, top left.
	pub vertices: [[f32; 2]; 3],
	pub ve: VertexElements,
	pub draw: DrawInfo,

	pub dsa: Dsa,
	pub stencil_ref: StencilRef,
	pub alpha_ref: u8,
	pub blend_color: [f32; 4],
	pub viewport: Viewport,

	pub width: u32,
	pub height: u32,
	pub num_samples: u32,
	pub zs: ZsSurface,
	pub zs_format: Option<Format>,
	pub depth_clear_value: u32,
}

/// A vertex header element, then the position at offset 0 of buffer 0.
fn rectlist_vertex_elements() -> VertexElements {
	let header = [
		VE_DW0_VALID | HW_R32G32B32A32_FLOAT << VE_DW0_FORMAT_SHIFT,
		VFCOMP_STORE_0 << VE_DW1_COMP0_SHIFT |
			VFCOMP_STORE_0 << VE_DW1_COMP1_SHIFT |
			VFCOMP_STORE_0 << VE_DW1_COMP2_SHIFT |
			VFCOMP_STORE_0 << VE_DW1_COMP3_SHIFT,
	];
	let position = [
		VE_DW0_VALID | HW_R32G32_FLOAT << VE_DW0_FORMAT_SHIFT,
		VFCOMP_STORE_SRC << VE_DW1_COMP0_SHIFT |
			VFCOMP_STORE_SRC << VE_DW1_COMP1_SHIFT |
			VFCOMP_STORE_0 << VE_DW1_COMP2_SHIFT |
			VFCOMP_STORE_1_FP << VE_DW1_COMP3_SHIFT,
	];
	VertexElements {
		cso: vec![header, position],
		vb_mapping: vec![0],
		instance_divisors: vec![0],
		formats: vec![HW_R32G32B32A32_FLOAT, HW_R32G32_FLOAT],
	}
}

/// HiZ operations work on 8x4 pixel blocks, in samples.
fn hiz_align(width: u32, height: u32, num_samples: u32) -> (u32, u32) {
	let (align_w, align_h) = match num_samples {
		2 => (4, 4),
		4 => (4, 2),
		8 => (2, 2),
		_ => (8, 4),
	};
	((width + align_w - 1) / align_w * align_w, (height + align_h - 1) / align_h * align_h)
}

/// `depth` in [0, 1] as stored in a `format` depth buffer.
pub fn pack_depth(format: Format, depth: f64) -> u32 {
	let depth = depth.max(0.0).min(1.0);
	match format {
		Format::Z16_UNORM => (depth * 0xffff as f64).round() as u32,
		Format::Z24X8_UNORM | Format::Z24_UNORM_S8_UINT => (depth * 0xffffff as f64).round() as u32,
		Format::Z32_FLOAT | Format::Z32_FLOAT_S8X24_UINT => (depth as f32).to_bits(),
		_ => 0,
	}
}

impl Blitter {
	/// Bytes per vertex in the vertex buffer.
	pub const VERTEX_STRIDE: u32 = 8;

	fn new(dev: &DeviceInfo, op: RectlistOp, uses: BlitterUses, dsa: &DsaDesc, zs: ZsSurface,
		format: Format, width: u32, height: u32, num_samples: u32) -> Blitter {
		let (width, height) = hiz_align(width, height, num_samples);
		let (w, h) = (width as f32, height as f32);
		let draw = DrawInfo {
			count: 3,
			instance_count: 1,
			..DrawInfo::default()
		};

		Blitter {
			op: op,
			uses: uses,
			vertices: [[w, h], [0.0, h], [0.0, 0.0]],
			ve: rectlist_vertex_elements(),
			draw: draw,
			dsa: Dsa::new(dev, dsa),
			stencil_ref: StencilRef::default(),
			alpha_ref: 0,
			blend_color: [0.0; 4],
			viewport: Viewport::new(dev, &ViewportDesc {
				scale: [1.0, 1.0, 1.0],
				translate: [0.0, 0.0, 0.0],
			}),
			width: width,
			height: height,
			num_samples: num_samples,
			zs: zs,
			zs_format: Some(format),
			depth_clear_value: 0,
		}
	}

	/// Clear depth to `depth` and stencil to `stencil`, as `flags` selects.
	pub fn clear_zs(dev: &DeviceInfo, zs: ZsSurface, format: Format, width: u32, height: u32,
		num_samples: u32, flags: ClearFlags, depth: f64, stencil: u8) -> Blitter {
		let mut dsa = DsaDesc::default();
		let mut uses = BlitterUses::DSA;
		if flags.contains(ClearFlags::DEPTH) {
			dsa.depth_writemask = true;
			uses |= BlitterUses::VIEWPORT | BlitterUses::FB_DEPTH;
		}
		if flags.contains(ClearFlags::STENCIL) {
			dsa.stencil[0] = StencilDesc {
				enabled: true,
				func: CompareFunc::Always,
				fail_op: StencilOp::Keep,
				zfail_op: StencilOp::Keep,
				zpass_op: StencilOp::Replace,
				valuemask: 0xff,
				writemask: 0xff,
			};
			uses |= BlitterUses::CC | BlitterUses::FB_STENCIL;
		}

		let mut blitter = Blitter::new(dev, RectlistOp::ClearZs, uses, &dsa, zs, format, width, height, num_samples);
		blitter.depth_clear_value = pack_depth(format, depth);
		blitter.stencil_ref.ref_value[0] = stencil;
		blitter
	}

	pub fn resolve_z(dev: &DeviceInfo, zs: ZsSurface, format: Format, width: u32, height: u32,
		num_samples: u32) -> Blitter {
		let dsa = DsaDesc {
			depth_enabled: true,
			depth_writemask: true,
			depth_func: CompareFunc::Never,
			..DsaDesc::default()
		};
		Blitter::new(dev, RectlistOp::ResolveZ, BlitterUses::DSA | BlitterUses::FB_DEPTH, &dsa,
			zs, format, width, height, num_samples)
	}

	pub fn resolve_hiz(dev: &DeviceInfo, zs: ZsSurface, format: Format, width: u32, height: u32,
		num_samples: u32) -> Blitter {
		let dsa = DsaDesc {
			depth_enabled: true,
			depth_writemask: true,
			depth_func: CompareFunc::Always,
			..DsaDesc::default()
		};
		Blitter::new(dev, RectlistOp::ResolveHiz, BlitterUses::DSA | BlitterUses::FB_DEPTH, &dsa,
			zs, format, width, height, num_samples)
	}

	/// The rectangle corners as vertex buffer words.
	pub fn vertex_words(&self) -> Vec<u32> {
		self.vertices.iter().flat_map(|v| v.iter().map(|f| f.to_bits())).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn depth_packing() {
		assert_eq!(pack_depth(Format::Z16_UNORM, 1.0), 0xffff);
		assert_eq!(pack_depth(Format::Z24X8_UNORM, 0.5), 0x800000);
		assert_eq!(pack_depth(Format::Z32_FLOAT, 0.25), 0.25f32.to_bits());
		assert_eq!(pack_depth(Format::Z24_UNORM_S8_UINT, 2.0), 0xffffff);
	}

	#[test]
	fn clear_aligns_to_hiz_blocks() {
		let ivb = DeviceInfo::ivb(1);
		let blitter = Blitter::clear_zs(&ivb, ZsSurface::null(&ivb), Format::Z24X8_UNORM, 17, 9, 1,
			ClearFlags::DEPTH, 1.0, 0);
		assert_eq!((blitter.width, blitter.height), (24, 12));
		assert_eq!(blitter.vertices, [[24.0, 12.0], [0.0, 12.0], [0.0, 0.0]]);
		assert_eq!(blitter.uses, BlitterUses::DSA | BlitterUses::VIEWPORT | BlitterUses::FB_DEPTH);
		assert_eq!(blitter.depth_clear_value, 0xffffff);
		assert_eq!(blitter.vertex_words().len(), 6);
		assert_eq!(blitter.ve.count(), 2);
		assert_eq!(blitter.draw.count, 3);
	}

	#[test]
	fn stencil_clear_binds_color_calc() {
		let snb = DeviceInfo::snb(2);
		let blitter = Blitter::clear_zs(&snb, ZsSurface::null(&snb), Format::Z24_UNORM_S8_UINT, 64, 64, 4,
			ClearFlags::STENCIL, 0.0, 0x80);
		assert!(blitter.uses.contains(BlitterUses::CC | BlitterUses::FB_STENCIL));
		assert!(!blitter.uses.contains(BlitterUses::FB_DEPTH));
		assert_eq!(blitter.stencil_ref.ref_value[0], 0x80);
	}

	#[test]
	fn resolves_pick_wm_bits() {
		let hsw = DeviceInfo::hsw(2);
		let z = Blitter::resolve_z(&hsw, ZsSurface::null(&hsw), Format::Z32_FLOAT, 32, 32, 1);
		let hiz = Blitter::resolve_hiz(&hsw, ZsSurface::null(&hsw), Format::Z32_FLOAT, 32, 32, 1);
		assert_eq!(z.op.gen7_hiz_op(), GEN7_WM_DW1_DEPTH_RESOLVE);
		assert_eq!(hiz.op.gen6_hiz_op(), WM_DW4_HIZ_RESOLVE);
		assert_eq!(z.uses, BlitterUses::DSA | BlitterUses::FB_DEPTH);
	}
}
