// GEN7 and GEN7.5 encoders for the commands whose layout differs from GEN6.

use crate::cmd::*;
use crate::cp::Cp;
use crate::cso::*;
use crate::dev::{DeviceInfo, Gen};
use crate::format::Format;
use crate::gpe_gen6::{fill_3dstate_sf_raster, fill_3dstate_sf_sbe, vertex_start};
use crate::state::{DrawInfo, IndexBuffer, Shader, SoTarget};
use crate::winsys::*;

const URB_DW1_OFFSET_SHIFT: u32 = 25;
const URB_DW1_ENTRY_SIZE_SHIFT: u32 = 16;

const PCB_ALLOC_DW1_OFFSET_SHIFT: u32 = 16;

const GEN75_VF_DW0_CUT_INDEX_ENABLE: u32 = 1 << 8;

const SO_DW1_SO_ENABLE: u32 = 1 << 31;
const SO_DW1_RENDER_DISABLE: u32 = 1 << 30;
const SO_DW1_REORDER_TRAILING: u32 = 1 << 26;
const SO_DW1_STATISTICS: u32 = 1 << 25;
const SO_DW1_BUFFER_ENABLE_SHIFT: u32 = 8;

const SO_DECL_OUTPUT_SLOT_SHIFT: u32 = 12;
const SO_DECL_HOLE_FLAG: u32 = 1 << 11;
const SO_DECL_REG_INDEX_SHIFT: u32 = 4;
const SO_DECL_COMPONENT_MASK_SHIFT: u32 = 0;
const SO_DECL_MAX_ENTRIES: usize = 128;

const SO_BUF_DW1_INDEX_SHIFT: u32 = 29;

const CLEAR_PARAMS_DW2_VALID: u32 = 1 << 0;

const PRIM_DW1_ACCESS_RANDOM: u32 = 1 << 8;

/// Hardware stages that own URB space and push constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HwStage {
	Vs,
	Hs,
	Ds,
	Gs,
	Ps,
}

/// Carve `size` bytes at `offset` of the URB into entries of `entry_size`
/// bytes for `stage`.  `offset` must be 8 KB aligned.
pub fn emit_3dstate_urb(dev: &DeviceInfo, cp: &mut Cp, stage: HwStage, offset: u32, size: u32, entry_size: u32) {
	let row_size = 64;
	assert!(offset % 8192 == 0, "misaligned URB offset {}", offset);

	let mut alloc_size = ((entry_size + row_size - 1) / row_size).max(1);
	if stage == HwStage::Vs && alloc_size == 5 {
		alloc_size = 6;
	}
	let mut num_entries = (size / row_size / alloc_size) & !7;

	let opcode = match stage {
		HwStage::Vs => {
			let (min, max) = match dev.gen {
				Gen::Gen75 if dev.gt >= 2 => (64, 1664),
				Gen::Gen75 => (32, 640),
				_ => (32, if dev.gt == 2 { 704 } else { 512 }),
			};
			assert!(num_entries >= min, "too few VS URB entries: {}", num_entries);
			num_entries = num_entries.min(max);
			Gen7Opcode::_3DSTATE_URB_VS
		}
		HwStage::Hs => {
			num_entries = num_entries.min(if dev.gt == 2 { 64 } else { 32 });
			Gen7Opcode::_3DSTATE_URB_HS
		}
		HwStage::Ds => {
			assert!(num_entries == 0 || num_entries >= 138, "too few DS URB entries: {}", num_entries);
			Gen7Opcode::_3DSTATE_URB_DS
		}
		HwStage::Gs => {
			let max = match dev.gen {
				Gen::Gen75 => if dev.gt >= 2 { 640 } else { 256 },
				_ => if dev.gt == 2 { 320 } else { 192 },
			};
			num_entries = num_entries.min(max);
			Gen7Opcode::_3DSTATE_URB_GS
		}
		HwStage::Ps => panic!("the PS has no URB entries"),
	};

	cp.begin(2);
	cp.write(opcode.header(2));
	cp.write((offset / 8192) << URB_DW1_OFFSET_SHIFT |
		(alloc_size - 1) << URB_DW1_ENTRY_SIZE_SHIFT |
		num_entries);
	cp.end();
}

/// Reserve `size` bytes of push constant space at `offset` for `stage`.
/// Both are rounded to the 1 KB granularity of the hardware.
pub fn emit_3dstate_push_constant_alloc(_dev: &DeviceInfo, cp: &mut Cp, stage: HwStage, offset: u32, size: u32) {
	let opcode = match stage {
		HwStage::Vs => Gen7Opcode::_3DSTATE_PUSH_CONSTANT_ALLOC_VS,
		HwStage::Hs => Gen7Opcode::_3DSTATE_PUSH_CONSTANT_ALLOC_HS,
		HwStage::Ds => Gen7Opcode::_3DSTATE_PUSH_CONSTANT_ALLOC_DS,
		HwStage::Gs => Gen7Opcode::_3DSTATE_PUSH_CONSTANT_ALLOC_GS,
		HwStage::Ps => Gen7Opcode::_3DSTATE_PUSH_CONSTANT_ALLOC_PS,
	};

	let end = (offset + size) / 1024;
	assert!(end <= 16, "push constants end past 16 KB");
	let mut start = (offset + 1023) / 1024;
	assert!(start <= 15, "push constants start past 15 KB");
	if start > end {
		assert_eq!(size, 0);
		start = end;
	}
	let len = end - start;
	assert!(len <= 15, "push constants larger than 15 KB");

	cp.begin(2);
	cp.write(opcode.header(2));
	cp.write(start << PCB_ALLOC_DW1_OFFSET_SHIFT | len);
	cp.end();
}

/// GEN7.5 moved the cut index out of 3DSTATE_INDEX_BUFFER.
pub fn emit_3dstate_vf(dev: &DeviceInfo, cp: &mut Cp, enable_cut_index: bool, cut_index: u32) {
	assert!(dev.gen >= Gen::Gen75);
	cp.begin(2);
	cp.write(Opcode::_3DSTATE_VF.header(2) |
		if enable_cut_index { GEN75_VF_DW0_CUT_INDEX_ENABLE } else { 0 });
	cp.write(cut_index);
	cp.end();
}

pub fn emit_3dstate_gs(_dev: &DeviceInfo, cp: &mut Cp, gs: Option<&Shader>, num_samplers: usize) {
	cp.begin(7);
	cp.write(Opcode::_3DSTATE_GS.header(7));
	match gs {
		Some(gs) => {
			cp.write(gs.kernel_offset);
			cp.write(gs.cso[0] | ((num_samplers as u32 + 3) / 4) << THREADDISP_SAMPLER_COUNT_SHIFT);
			cp.write(0);
			cp.write(gs.cso[1]);
			cp.write(gs.cso[2]);
			cp.write(0);
		}
		None => {
			cp.write(0);
			cp.write(0);
			cp.write(0);
			cp.write(0);
			cp.write(GS_DW5_STATISTICS);
			cp.write(0);
		}
	}
	cp.end();
}

fn emit_zeroed(cp: &mut Cp, header: u32, len: usize) {
	cp.begin(len);
	cp.write(header);
	for _ in 1..len {
		cp.write(0);
	}
	cp.end();
}

/// Tessellation stays disabled.
pub fn emit_3dstate_hs(_dev: &DeviceInfo, cp: &mut Cp) {
	emit_zeroed(cp, Gen7Opcode::_3DSTATE_HS.header(7), 7);
}

pub fn emit_3dstate_te(_dev: &DeviceInfo, cp: &mut Cp) {
	emit_zeroed(cp, Gen7Opcode::_3DSTATE_TE.header(4), 4);
}

pub fn emit_3dstate_ds(_dev: &DeviceInfo, cp: &mut Cp) {
	emit_zeroed(cp, Gen7Opcode::_3DSTATE_DS.header(6), 6);
}

/// Stream 0 only.  An empty `buffer_mask` disables stream output.
pub fn emit_3dstate_streamout(_dev: &DeviceInfo, cp: &mut Cp, buffer_mask: u32, vertex_attrib_count: u32,
	rasterizer_discard: bool) {
	let mut dw1 = if rasterizer_discard { SO_DW1_RENDER_DISABLE } else { 0 };
	let mut dw2 = 0;
	if buffer_mask != 0 {
		let read_len = ((vertex_attrib_count + 1) / 2).max(1);
		dw1 |= SO_DW1_SO_ENABLE |
			SO_DW1_STATISTICS |
			SO_DW1_REORDER_TRAILING |
			buffer_mask << SO_DW1_BUFFER_ENABLE_SHIFT;
		dw2 = read_len - 1;
	}

	cp.begin(3);
	cp.write(Gen7Opcode::_3DSTATE_STREAMOUT.header(3));
	cp.write(dw1);
	cp.write(dw2);
	cp.end();
}

/// Stream 0 declarations of `so_info`, with hole entries skipping the
/// dwords between outputs of the same buffer.
fn so_decls(so_info: &SoInfo) -> (u32, Vec<u32>) {
	let mut buffer_offsets = [0u32; 4];
	let mut buffer_selects = 0;
	let mut decls = Vec::new();

	for output in &so_info.outputs {
		let buf = output.output_buffer;
		let offset = &mut buffer_offsets[buf as usize];
		assert!(*offset <= output.dst_offset, "stream outputs out of order");

		while *offset < output.dst_offset {
			let num_dwords = (output.dst_offset - *offset).min(4);
			decls.push(buf << SO_DECL_OUTPUT_SLOT_SHIFT |
				SO_DECL_HOLE_FLAG |
				((1 << num_dwords) - 1) << SO_DECL_COMPONENT_MASK_SHIFT);
			*offset += num_dwords;
		}

		let mask = ((1 << output.num_components) - 1) << output.start_component;
		decls.push(buf << SO_DECL_OUTPUT_SLOT_SHIFT |
			output.register_index << SO_DECL_REG_INDEX_SHIFT |
			mask << SO_DECL_COMPONENT_MASK_SHIFT);
		buffer_selects |= 1 << buf;
		*offset += output.num_components;
	}
	assert!(decls.len() <= SO_DECL_MAX_ENTRIES, "too many stream output declarations");
	(buffer_selects, decls)
}

pub fn emit_3dstate_so_decl_list(_dev: &DeviceInfo, cp: &mut Cp, so_info: Option<&SoInfo>) {
	let (buffer_selects, decls) = so_info.map_or((0, Vec::new()), so_decls);
	let len = 2 * SO_DECL_MAX_ENTRIES + 3;

	cp.begin(len);
	cp.write(Gen7Opcode::_3DSTATE_SO_DECL_LIST.header(len));
	cp.write(buffer_selects);
	cp.write(decls.len() as u32);
	for i in 0..SO_DECL_MAX_ENTRIES {
		cp.write(decls.get(i).cloned().unwrap_or(0));
		cp.write(0);
	}
	cp.end();
}

/// `base` and `stride` are in bytes.
pub fn emit_3dstate_so_buffer(_dev: &DeviceInfo, cp: &mut Cp, index: u32, base: u32, stride: u32,
	so_target: Option<&SoTarget>) {
	cp.begin(4);
	cp.write(Gen7Opcode::_3DSTATE_SO_BUFFER.header(4));
	match so_target {
		Some(so) => {
			assert!(stride % 4 == 0 && base % 4 == 0 && so.offset % 4 == 0);
			let start = (base + so.offset) & !3;
			let end = (start + so.size) & !3;
			cp.write(index << SO_BUF_DW1_INDEX_SHIFT | stride);
			cp.write_bo(start, so.buffer.bo, DOMAIN_RENDER, DOMAIN_RENDER);
			cp.write_bo(end, so.buffer.bo, DOMAIN_RENDER, DOMAIN_RENDER);
		}
		None => {
			cp.write(index << SO_BUF_DW1_INDEX_SHIFT);
			cp.write(0);
			cp.write(0);
		}
	}
	cp.end();
}

pub fn emit_3dstate_sf(dev: &DeviceInfo, cp: &mut Cp, rasterizer: Option<&Rasterizer>, zs_format: Option<Format>) {
	let payload = fill_3dstate_sf_raster(dev, rasterizer, 1, zs_format);
	cp.begin(7);
	cp.write(Opcode::_3DSTATE_SF.header(7));
	for &dw in &payload {
		cp.write(dw);
	}
	cp.end();
}

pub fn emit_3dstate_sbe(dev: &DeviceInfo, cp: &mut Cp, rasterizer: Option<&Rasterizer>, fs: Option<&Shader>) {
	let payload = fill_3dstate_sf_sbe(dev, rasterizer, fs);
	cp.begin(14);
	cp.write(Gen7Opcode::_3DSTATE_SBE.header(14));
	for &dw in &payload {
		cp.write(dw);
	}
	cp.end();
}

/// `hiz_op` is one of the GEN7_WM_DW1 depth clear/resolve bits, and only
/// valid without a rasterizer.
pub fn emit_3dstate_wm(_dev: &DeviceInfo, cp: &mut Cp, fs: Option<&Shader>, rasterizer: Option<&Rasterizer>,
	cc_may_kill: bool, hiz_op: u32) {
	let (mut dw1, dw2) = match rasterizer {
		Some(rast) => {
			assert_eq!(hiz_op, 0, "HiZ operations run without a rasterizer");
			(rast.wm.payload[0] | GEN7_WM_DW1_STATISTICS, rast.wm.payload[1])
		}
		None => (hiz_op, 0),
	};
	if let Some(fs) = fs {
		dw1 |= fs.cso[3];
	}
	if cc_may_kill {
		dw1 |= GEN7_WM_DW1_PS_ENABLE | GEN7_WM_DW1_PS_KILL;
	}

	cp.begin(3);
	cp.write(Opcode::_3DSTATE_WM.header(3));
	cp.write(dw1);
	cp.write(dw2);
	cp.end();
}

pub fn emit_3dstate_ps(dev: &DeviceInfo, cp: &mut Cp, fs: Option<&Shader>, num_samplers: usize, dual_blend: bool) {
	cp.begin(8);
	cp.write(Gen7Opcode::_3DSTATE_PS.header(8));

	let fs = match fs {
		Some(fs) => fs,
		None => {
			let dw4 = GEN7_PS_DW4_8_PIXEL_DISPATCH | if dev.gen >= Gen::Gen75 {
				let max_threads = match dev.gt { 3 => 408, 2 => 204, _ => 102 };
				(max_threads - 1) << GEN75_PS_DW4_MAX_THREADS_SHIFT
			} else {
				let max_threads = if dev.gt == 2 { 172 } else { 48 };
				(max_threads - 1) << GEN7_PS_DW4_MAX_THREADS_SHIFT
			};
			for dw in [0, 0, 0, dw4, 0, 0, 0] {
				cp.write(dw);
			}
			cp.end();
			return;
		}
	};

	let mut dw4 = fs.cso[1];
	if dual_blend {
		dw4 |= GEN7_PS_DW4_DUAL_SOURCE_BLEND;
	}
	cp.write(fs.kernel_offset);
	cp.write(fs.cso[0] | ((num_samplers as u32 + 3) / 4) << THREADDISP_SAMPLER_COUNT_SHIFT);
	cp.write(0);
	cp.write(dw4);
	cp.write(fs.cso[2]);
	cp.write(0);
	cp.write(0);
	cp.end();
}

/// Up to four constant buffers, allocated contiguously from the first.
/// Sizes are in bytes.
fn emit_3dstate_constant(cp: &mut Cp, header: u32, bufs: &[u32], sizes: &[u32]) {
	assert!(bufs.len() <= 4 && sizes.len() == bufs.len());
	let mut payload = [0u32; 6];
	let mut total_read_length = 0;
	let count = sizes.iter().take_while(|&&size| size != 0).count();
	assert!(sizes[count..].iter().all(|&size| size == 0), "gap in constant buffers");
	for i in 0..count {
		let read_len = (sizes[i] + 31) / 32;
		assert!(bufs[i] % 32 == 0);
		payload[i / 2] |= read_len << if i % 2 == 1 { 16 } else { 0 };
		payload[2 + i] = bufs[i];
		total_read_length += read_len;
	}
	assert!(total_read_length <= 64, "push constants too large");

	cp.begin(7);
	cp.write(header);
	for &dw in &payload {
		cp.write(dw);
	}
	cp.end();
}

pub fn emit_3dstate_constant_vs(_dev: &DeviceInfo, cp: &mut Cp, bufs: &[u32], sizes: &[u32]) {
	emit_3dstate_constant(cp, Opcode::_3DSTATE_CONSTANT_VS.header(7), bufs, sizes);
}

pub fn emit_3dstate_constant_hs(_dev: &DeviceInfo, cp: &mut Cp, bufs: &[u32], sizes: &[u32]) {
	emit_3dstate_constant(cp, Gen7Opcode::_3DSTATE_CONSTANT_HS.header(7), bufs, sizes);
}

pub fn emit_3dstate_constant_ds(_dev: &DeviceInfo, cp: &mut Cp, bufs: &[u32], sizes: &[u32]) {
	emit_3dstate_constant(cp, Gen7Opcode::_3DSTATE_CONSTANT_DS.header(7), bufs, sizes);
}

pub fn emit_3dstate_constant_gs(_dev: &DeviceInfo, cp: &mut Cp, bufs: &[u32], sizes: &[u32]) {
	emit_3dstate_constant(cp, Opcode::_3DSTATE_CONSTANT_GS.header(7), bufs, sizes);
}

pub fn emit_3dstate_constant_ps(_dev: &DeviceInfo, cp: &mut Cp, bufs: &[u32], sizes: &[u32]) {
	emit_3dstate_constant(cp, Opcode::_3DSTATE_CONSTANT_PS.header(7), bufs, sizes);
}

pub fn emit_3dstate_sample_mask(_dev: &DeviceInfo, cp: &mut Cp, sample_mask: u32, num_samples: u32) {
	let valid_mask = ((1u32 << num_samples) - 1) | 1;
	cp.begin(2);
	cp.write(Opcode::_3DSTATE_SAMPLE_MASK.header(2));
	cp.write(sample_mask & valid_mask);
	cp.end();
}

fn emit_3dstate_pointer(cp: &mut Cp, header: u32, pointer: u32) {
	cp.begin(2);
	cp.write(header);
	cp.write(pointer);
	cp.end();
}

pub fn emit_3dstate_viewport_state_pointers_sf_clip(_dev: &DeviceInfo, cp: &mut Cp, sf_clip_viewport: u32) {
	emit_3dstate_pointer(cp, Gen7Opcode::_3DSTATE_VIEWPORT_STATE_POINTERS_SF_CLIP.header(2), sf_clip_viewport);
}

pub fn emit_3dstate_viewport_state_pointers_cc(_dev: &DeviceInfo, cp: &mut Cp, cc_viewport: u32) {
	emit_3dstate_pointer(cp, Gen7Opcode::_3DSTATE_VIEWPORT_STATE_POINTERS_CC.header(2), cc_viewport);
}

pub fn emit_3dstate_cc_state_pointers(_dev: &DeviceInfo, cp: &mut Cp, color_calc_state: u32) {
	emit_3dstate_pointer(cp, Opcode::_3DSTATE_CC_STATE_POINTERS.header(2), color_calc_state);
}

pub fn emit_3dstate_depth_stencil_state_pointers(_dev: &DeviceInfo, cp: &mut Cp, depth_stencil_state: u32) {
	emit_3dstate_pointer(cp, Gen7Opcode::_3DSTATE_DEPTH_STENCIL_STATE_POINTERS.header(2), depth_stencil_state);
}

pub fn emit_3dstate_blend_state_pointers(_dev: &DeviceInfo, cp: &mut Cp, blend_state: u32) {
	emit_3dstate_pointer(cp, Gen7Opcode::_3DSTATE_BLEND_STATE_POINTERS.header(2), blend_state);
}

pub fn emit_3dstate_binding_table_pointers(_dev: &DeviceInfo, cp: &mut Cp, stage: HwStage, binding_table: u32) {
	let opcode = match stage {
		HwStage::Vs => Gen7Opcode::_3DSTATE_BINDING_TABLE_POINTERS_VS,
		HwStage::Hs => Gen7Opcode::_3DSTATE_BINDING_TABLE_POINTERS_HS,
		HwStage::Ds => Gen7Opcode::_3DSTATE_BINDING_TABLE_POINTERS_DS,
		HwStage::Gs => Gen7Opcode::_3DSTATE_BINDING_TABLE_POINTERS_GS,
		HwStage::Ps => Gen7Opcode::_3DSTATE_BINDING_TABLE_POINTERS_PS,
	};
	emit_3dstate_pointer(cp, opcode.header(2), binding_table);
}

pub fn emit_3dstate_sampler_state_pointers(_dev: &DeviceInfo, cp: &mut Cp, stage: HwStage, sampler_state: u32) {
	let opcode = match stage {
		HwStage::Vs => Gen7Opcode::_3DSTATE_SAMPLER_STATE_POINTERS_VS,
		HwStage::Hs => Gen7Opcode::_3DSTATE_SAMPLER_STATE_POINTERS_HS,
		HwStage::Ds => Gen7Opcode::_3DSTATE_SAMPLER_STATE_POINTERS_DS,
		HwStage::Gs => Gen7Opcode::_3DSTATE_SAMPLER_STATE_POINTERS_GS,
		HwStage::Ps => Gen7Opcode::_3DSTATE_SAMPLER_STATE_POINTERS_PS,
	};
	emit_3dstate_pointer(cp, opcode.header(2), sampler_state);
}

pub fn emit_3dstate_clear_params(_dev: &DeviceInfo, cp: &mut Cp, clear_val: u32) {
	cp.begin(3);
	cp.write(Gen7Opcode::_3DSTATE_CLEAR_PARAMS.header(3));
	cp.write(clear_val);
	cp.write(CLEAR_PARAMS_DW2_VALID);
	cp.end();
}

pub fn emit_3dprimitive(_dev: &DeviceInfo, cp: &mut Cp, draw: &DrawInfo, ib: &IndexBuffer, rectlist: bool) {
	let prim = if rectlist { PRIM_RECTLIST } else { draw.topology() };
	let access = if draw.indexed { PRIM_DW1_ACCESS_RANDOM } else { 0 };

	cp.begin(7);
	cp.write(Opcode::_3DPRIMITIVE.header(7));
	cp.write(access | prim);
	cp.write(draw.count);
	cp.write(vertex_start(draw, ib));
	cp.write(draw.instance_count);
	cp.write(draw.start_instance);
	cp.write(draw.index_bias as u32);
	cp.end();
}

/// SF and clip viewports interleaved, 16 dwords per viewport.
pub fn emit_sf_clip_viewport(_dev: &DeviceInfo, cp: &mut Cp, viewports: &[Viewport]) -> u32 {
	assert!(!viewports.is_empty() && viewports.len() <= 16);
	let (offset, dw) = cp.steal(16 * viewports.len(), 16);
	for (vp, dw) in viewports.iter().zip(dw.chunks_mut(16)) {
		dw[0] = vp.m00.to_bits();
		dw[1] = vp.m11.to_bits();
		dw[2] = vp.m22.to_bits();
		dw[3] = vp.m30.to_bits();
		dw[4] = vp.m31.to_bits();
		dw[5] = vp.m32.to_bits();
		dw[8] = vp.min_gbx.to_bits();
		dw[9] = vp.max_gbx.to_bits();
		dw[10] = vp.min_gby.to_bits();
		dw[11] = vp.max_gby.to_bits();
	}
	offset
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cso::ViewportDesc;
	use crate::surface::Buffer;
	use crate::winsys::SoftWinsys;
	use pretty_assertions::assert_eq;

	fn new_cp() -> Cp {
		Cp::new(Box::new(SoftWinsys::new(1 << 30)), 4096).unwrap()
	}

	#[test]
	fn urb_vs_entries() {
		let ivb = DeviceInfo::ivb(1);
		let mut cp = new_cp();
		emit_3dstate_urb(&ivb, &mut cp, HwStage::Vs, 16384, 65536, 128);
		assert_eq!(cp.commands(), &[0x7830_0000, 2 << 25 | 1 << 16 | 512]);

		// five rows are rounded up to six
		let mut cp = new_cp();
		emit_3dstate_urb(&ivb, &mut cp, HwStage::Vs, 0, 65536, 5 * 64);
		assert_eq!(cp.commands()[1], 5 << 16 | 168);
	}

	#[test]
	fn urb_gs_is_capped() {
		let hsw = DeviceInfo::hsw(1);
		let mut cp = new_cp();
		emit_3dstate_urb(&hsw, &mut cp, HwStage::Gs, 0, 128 * 1024, 64);
		assert_eq!(cp.commands()[1], 256);
	}

	#[test]
	fn push_constant_alloc_rounding() {
		let ivb = DeviceInfo::ivb(1);
		let mut cp = new_cp();
		emit_3dstate_push_constant_alloc(&ivb, &mut cp, HwStage::Vs, 0, 8192);
		emit_3dstate_push_constant_alloc(&ivb, &mut cp, HwStage::Ps, 8192, 8192);
		emit_3dstate_push_constant_alloc(&ivb, &mut cp, HwStage::Gs, 15 * 1024, 0);
		assert_eq!(cp.commands(), &[
			0x7912_0000, 8,
			0x7916_0000, 8 << 16 | 8,
			0x7915_0000, 15 << 16,
		]);
	}

	#[test]
	fn null_gs_and_ps() {
		let ivb = DeviceInfo::ivb(2);
		let mut cp = new_cp();
		emit_3dstate_gs(&ivb, &mut cp, None, 0);
		emit_3dstate_ps(&ivb, &mut cp, None, 0, false);
		assert_eq!(cp.commands(), &[
			0x7811_0005, 0, 0, 0, 0, GS_DW5_STATISTICS, 0,
			0x7820_0006, 0, 0, 0, GEN7_PS_DW4_8_PIXEL_DISPATCH | 171 << 24, 0, 0, 0,
		]);
	}

	#[test]
	fn streamout_enable() {
		let ivb = DeviceInfo::ivb(1);
		let mut cp = new_cp();
		emit_3dstate_streamout(&ivb, &mut cp, 0, 0, true);
		emit_3dstate_streamout(&ivb, &mut cp, 0x3, 5, false);
		assert_eq!(cp.commands(), &[
			0x781e_0001, SO_DW1_RENDER_DISABLE, 0,
			0x781e_0001, SO_DW1_SO_ENABLE | SO_DW1_STATISTICS | SO_DW1_REORDER_TRAILING | 3 << 8, 2,
		]);
	}

	#[test]
	fn so_decl_list_holes() {
		let ivb = DeviceInfo::ivb(1);
		let mut cp = new_cp();
		let so_info = SoInfo {
			outputs: vec![
				SoOutput { register_index: 1, start_component: 0, num_components: 4, output_buffer: 0, dst_offset: 0 },
				SoOutput { register_index: 2, start_component: 1, num_components: 2, output_buffer: 0, dst_offset: 5 },
				SoOutput { register_index: 3, start_component: 0, num_components: 1, output_buffer: 2, dst_offset: 0 },
			],
			stride: [7, 0, 1, 0],
		};
		emit_3dstate_so_decl_list(&ivb, &mut cp, Some(&so_info));
		let dw = cp.commands();
		assert_eq!(dw.len(), 259);
		assert_eq!(dw[0], 0x7917_0000 | 257);
		assert_eq!(dw[1], 0b101);
		assert_eq!(dw[2], 4);
		let decls: Vec<u32> = dw[3..11].iter().step_by(2).cloned().collect();
		assert_eq!(decls, vec![
			1 << 4 | 0xf,
			SO_DECL_HOLE_FLAG | 0x1,
			2 << 4 | 0x6,
			2 << 12 | 3 << 4 | 0x1,
		]);
		assert!(dw[11..].iter().all(|&d| d == 0));
	}

	#[test]
	fn so_buffer() {
		let ivb = DeviceInfo::ivb(1);
		let mut cp = new_cp();
		let target = SoTarget {
			buffer: Buffer { bo: Bo { handle: 6, size: 4096 }, size: 4096 },
			offset: 64,
			size: 1024,
		};
		emit_3dstate_so_buffer(&ivb, &mut cp, 1, 0, 16, Some(&target));
		emit_3dstate_so_buffer(&ivb, &mut cp, 2, 0, 0, None);
		assert_eq!(cp.commands(), &[
			0x7918_0002, 1 << 29 | 16, 64, 1088,
			0x7918_0002, 2 << 29, 0, 0,
		]);
		assert_eq!(cp.relocs().len(), 2);
		assert_eq!(cp.relocs()[0].write_domain, DOMAIN_RENDER);
	}

	#[test]
	fn constant_read_lengths() {
		let ivb = DeviceInfo::ivb(1);
		let mut cp = new_cp();
		emit_3dstate_constant_vs(&ivb, &mut cp, &[0x100, 0x200], &[64, 96]);
		assert_eq!(cp.commands(), &[0x7815_0005, 3 << 16 | 2, 0, 0x100, 0x200, 0, 0]);
	}

	#[test]
	fn sample_mask_is_limited_to_samples() {
		let ivb = DeviceInfo::ivb(1);
		let mut cp = new_cp();
		emit_3dstate_sample_mask(&ivb, &mut cp, 0xffff, 4);
		emit_3dstate_sample_mask(&ivb, &mut cp, 0xffff, 1);
		assert_eq!(cp.commands(), &[0x7818_0000, 0xf, 0x7818_0000, 0x1]);
	}

	#[test]
	fn wm_hiz_op_without_rasterizer() {
		let ivb = DeviceInfo::ivb(1);
		let mut cp = new_cp();
		emit_3dstate_wm(&ivb, &mut cp, None, None, false, GEN7_WM_DW1_DEPTH_CLEAR);
		assert_eq!(cp.commands(), &[0x7814_0001, GEN7_WM_DW1_DEPTH_CLEAR, 0]);
	}

	#[test]
	fn primitive_has_seven_dwords() {
		let ivb = DeviceInfo::ivb(1);
		let mut cp = new_cp();
		let draw = DrawInfo { count: 4, ..DrawInfo::default() };
		emit_3dprimitive(&ivb, &mut cp, &draw, &IndexBuffer::default(), true);
		assert_eq!(cp.commands(), &[0x7b00_0005, PRIM_RECTLIST, 4, 0, 1, 0, 0]);
	}

	#[test]
	fn sf_clip_viewport_layout() {
		let ivb = DeviceInfo::ivb(1);
		let mut cp = new_cp();
		let vp = Viewport::new(&ivb, &ViewportDesc { scale: [8.0, -8.0, 0.5], translate: [8.0, 8.0, 0.5] });
		let offset = emit_sf_clip_viewport(&ivb, &mut cp, &[vp]);
		assert_eq!(offset % 64, 0);
		assert_eq!(cp.state_word(offset, 1), (-8.0f32).to_bits());
		assert_eq!(cp.state_word(offset, 9), vp.max_gbx.to_bits());
		assert_eq!(cp.state_word(offset, 6), 0);
	}

	#[test]
	fn vf_cut_index() {
		let hsw = DeviceInfo::hsw(2);
		let mut cp = new_cp();
		emit_3dstate_vf(&hsw, &mut cp, true, 0xffff);
		assert_eq!(cp.commands(), &[0x780c_0000 | GEN75_VF_DW0_CUT_INDEX_ENABLE, 0xffff]);
	}
}
