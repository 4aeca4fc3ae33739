// GEN6 command and indirect state encoders.  GEN7 keeps using the ones
// whose wire format did not change.

use crate::cmd::*;
use crate::cp::Cp;
use crate::cso::*;
use crate::dev::{DeviceInfo, Gen};
use crate::format::Format;
use crate::layout::Target;
use crate::state::{DrawInfo, Framebuffer, IndexBuffer, SamplerView, Shader, SoTarget, StencilRef, VertexBuffer};
use crate::surface::{ViewSurface, ZsSurface};
use crate::winsys::*;

// 3DSTATE_URB
const URB_DW1_VS_ENTRY_SIZE_SHIFT: u32 = 16;
const URB_DW1_VS_ENTRY_COUNT_SHIFT: u32 = 0;
const URB_DW2_GS_ENTRY_COUNT_SHIFT: u32 = 8;
const URB_DW2_GS_ENTRY_SIZE_SHIFT: u32 = 0;

// VERTEX_BUFFER_STATE
const VB_DW0_INDEX_SHIFT: u32 = 26;
const VB_DW0_ACCESS_INSTANCEDATA: u32 = 1 << 20;
const GEN7_VB_DW0_ADDR_MODIFIED: u32 = 1 << 14;
const VB_DW0_NULL: u32 = 1 << 13;
const VB_DW0_PITCH_SHIFT: u32 = 0;

// 3DSTATE_INDEX_BUFFER
const IB_DW0_CUT_INDEX_ENABLE: u32 = 1 << 10;
const IB_DW0_FORMAT_BYTE: u32 = 0 << 8;
const IB_DW0_FORMAT_WORD: u32 = 1 << 8;
const IB_DW0_FORMAT_DWORD: u32 = 2 << 8;

// pointer commands
const PTR_DW0_VS_CHANGED: u32 = 1 << 8;
const PTR_DW0_GS_CHANGED: u32 = 1 << 9;
const PTR_DW0_PS_CHANGED: u32 = 1 << 12;
const PTR_VP_DW0_CLIP_CHANGED: u32 = 1 << 10;
const PTR_VP_DW0_SF_CHANGED: u32 = 1 << 11;
const PTR_VP_DW0_CC_CHANGED: u32 = 1 << 12;

const GS_DW4_URB_READ_LEN_SHIFT: u32 = 11;
const SBE_DW1_ATTR_COUNT_SHIFT: u32 = 22;
const SBE_DW1_ATTR_SWIZZLE_ENABLE: u32 = 1 << 21;
const SBE_DW1_POINT_SPRITE_TEXCOORD_LOWERLEFT: u32 = 1 << 20;
const SBE_DW1_URB_READ_LEN_SHIFT: u32 = 11;
const SBE_DW1_URB_READ_OFFSET_SHIFT: u32 = 4;

const SVBI_DW1_INDEX_SHIFT: u32 = 29;
const SVBI_DW1_LOAD_INTERNAL_VERTEX_COUNT: u32 = 1 << 0;

const MULTISAMPLE_DW1_PIXLOC_CENTER: u32 = 0;
const MULTISAMPLE_DW1_PIXLOC_UL_CORNER: u32 = 1 << 4;
const MULTISAMPLE_DW1_NUMSAMPLES_1: u32 = 0;
const MULTISAMPLE_DW1_NUMSAMPLES_4: u32 = 2 << 1;
const GEN7_MULTISAMPLE_DW1_NUMSAMPLES_8: u32 = 3 << 1;

const CLEAR_PARAMS_DW0_VALID: u32 = 1 << 15;

const PRIM_DW0_TYPE_SHIFT: u32 = 10;
const PRIM_DW0_ACCESS_RANDOM: u32 = 1 << 15;

const CC_DW0_ALPHATEST_UNORM8: u32 = 0;

pub const PIPE_CONTROL_NOTIFY_ENABLE: u32 = 1 << 8;

pub const PIPELINE_SELECT_3D: u32 = 0;

/// Buffer objects STATE_BASE_ADDRESS points at.  A size of zero leaves the
/// upper bound disabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BaseAddress {
	pub general: Bo,
	pub surface: Bo,
	pub dynamic: Bo,
	pub indirect: Bo,
	pub instruction: Bo,
	pub general_size: u32,
	pub dynamic_size: u32,
	pub indirect_size: u32,
	pub instruction_size: u32,
}

impl BaseAddress {
	/// Every state relative to `state_bo`, kernels relative to `instruction`.
	pub fn new(state_bo: Bo, instruction: Bo) -> BaseAddress {
		BaseAddress {
			general: state_bo,
			surface: state_bo,
			dynamic: state_bo,
			indirect: state_bo,
			instruction: instruction,
			general_size: 0,
			dynamic_size: 0,
			indirect_size: 0,
			instruction_size: 0,
		}
	}
}

pub fn emit_mi_store_data_imm(dev: &DeviceInfo, cp: &mut Cp, bo: Bo, offset: u32, val: u64, store_qword: bool) {
	let len = if store_qword { 5 } else { 4 };
	let flags = if dev.gen == Gen::Gen6 { MI_GLOBAL_GTT } else { 0 };
	assert!(offset % if store_qword { 8 } else { 4 } == 0);
	cp.begin(len);
	cp.write(MiOpcode::STORE_DATA_IMM.header(len) | flags);
	cp.write(0);
	cp.write_bo(offset, bo, DOMAIN_INSTRUCTION, DOMAIN_INSTRUCTION);
	cp.write(val as u32);
	if store_qword {
		cp.write((val >> 32) as u32);
	} else {
		assert_eq!(val >> 32, 0, "dword store of a 64-bit value");
	}
	cp.end();
}

pub fn emit_mi_load_register_imm(_dev: &DeviceInfo, cp: &mut Cp, reg: u32, val: u32) {
	assert!(reg % 4 == 0);
	cp.begin(3);
	cp.write(MiOpcode::LOAD_REGISTER_IMM.header(3));
	cp.write(reg);
	cp.write(val);
	cp.end();
}

pub fn emit_mi_store_register_mem(dev: &DeviceInfo, cp: &mut Cp, bo: Bo, offset: u32, reg: u32) {
	let flags = if dev.gen == Gen::Gen6 { MI_GLOBAL_GTT } else { 0 };
	assert!(reg % 4 == 0 && offset % 4 == 0);
	cp.begin(3);
	cp.write(MiOpcode::STORE_REGISTER_MEM.header(3) | flags);
	cp.write(reg);
	cp.write_bo(offset, bo, DOMAIN_INSTRUCTION, DOMAIN_INSTRUCTION);
	cp.end();
}

pub fn emit_state_base_address(_dev: &DeviceInfo, cp: &mut Cp, base: &BaseAddress) {
	assert_eq!((base.general_size | base.dynamic_size | base.indirect_size | base.instruction_size) & 0xfff, 0,
		"base address bounds must be page aligned");
	let dynamic_domains = DOMAIN_RENDER | DOMAIN_INSTRUCTION;

	cp.begin(10);
	cp.write(Opcode::STATE_BASE_ADDRESS.header(10));
	cp.write_bo(1, base.general, DOMAIN_RENDER, 0);
	cp.write_bo(1, base.surface, DOMAIN_SAMPLER, 0);
	cp.write_bo(1, base.dynamic, dynamic_domains, 0);
	cp.write_bo(1, base.indirect, 0, 0);
	cp.write_bo(1, base.instruction, DOMAIN_INSTRUCTION, 0);

	// upper bounds
	if base.general_size != 0 {
		cp.write_bo(base.general_size | 1, base.general, DOMAIN_RENDER, 0);
	} else {
		cp.write(1);
	}
	if base.dynamic_size != 0 {
		cp.write_bo(base.dynamic_size | 1, base.dynamic, dynamic_domains, 0);
	} else {
		cp.write(0xfffff000 + 1);
	}
	if base.indirect_size != 0 {
		cp.write_bo(base.indirect_size | 1, base.indirect, 0, 0);
	} else {
		cp.write(0xfffff000 + 1);
	}
	if base.instruction_size != 0 {
		cp.write_bo(base.instruction_size | 1, base.instruction, DOMAIN_INSTRUCTION, 0);
	} else {
		cp.write(1);
	}
	cp.end();
}

pub fn emit_state_sip(_dev: &DeviceInfo, cp: &mut Cp, sip: u32) {
	cp.begin(2);
	cp.write(Opcode::STATE_SIP.header(2));
	cp.write(sip);
	cp.end();
}

pub fn emit_3dstate_vf_statistics(_dev: &DeviceInfo, cp: &mut Cp, enable: bool) {
	cp.begin(1);
	cp.write((Opcode::VF_STATISTICS as u32) << 16 | enable as u32);
	cp.end();
}

pub fn emit_pipeline_select(_dev: &DeviceInfo, cp: &mut Cp, pipeline: u32) {
	assert!(pipeline <= 2);
	cp.begin(1);
	cp.write((Opcode::PIPELINE_SELECT as u32) << 16 | pipeline);
	cp.end();
}

pub fn emit_3dstate_binding_table_pointers(_dev: &DeviceInfo, cp: &mut Cp, vs: u32, gs: u32, ps: u32) {
	cp.begin(4);
	cp.write(Opcode::_3DSTATE_BINDING_TABLE_POINTERS.header(4) |
		PTR_DW0_VS_CHANGED | PTR_DW0_GS_CHANGED | PTR_DW0_PS_CHANGED);
	cp.write(vs);
	cp.write(gs);
	cp.write(ps);
	cp.end();
}

pub fn emit_3dstate_sampler_state_pointers(_dev: &DeviceInfo, cp: &mut Cp, vs: u32, gs: u32, ps: u32) {
	cp.begin(4);
	cp.write(Opcode::_3DSTATE_SAMPLER_STATE_POINTERS.header(4) |
		PTR_DW0_VS_CHANGED | PTR_DW0_GS_CHANGED | PTR_DW0_PS_CHANGED);
	cp.write(vs);
	cp.write(gs);
	cp.write(ps);
	cp.end();
}

/// Split the URB between VS and GS.  Sizes are in bytes.
pub fn emit_3dstate_urb(_dev: &DeviceInfo, cp: &mut Cp, vs_total_size: u32, gs_total_size: u32,
	vs_entry_size: u32, gs_entry_size: u32) {
	let row_size = 128;
	let vs_alloc_size = ((vs_entry_size + row_size - 1) / row_size).max(1);
	let gs_alloc_size = ((gs_entry_size + row_size - 1) / row_size).max(1);
	assert!(vs_alloc_size <= 5 && gs_alloc_size <= 5, "URB entries too large");

	let vs_num_entries = ((vs_total_size / row_size / vs_alloc_size) & !3).min(256);
	assert!(vs_num_entries >= 24, "too few VS URB entries: {}", vs_num_entries);
	let gs_num_entries = ((gs_total_size / row_size / gs_alloc_size) & !3).min(256);

	cp.begin(3);
	cp.write(Opcode::_3DSTATE_URB.header(3));
	cp.write((vs_alloc_size - 1) << URB_DW1_VS_ENTRY_SIZE_SHIFT |
		vs_num_entries << URB_DW1_VS_ENTRY_COUNT_SHIFT);
	cp.write(gs_num_entries << URB_DW2_GS_ENTRY_COUNT_SHIFT |
		(gs_alloc_size - 1) << URB_DW2_GS_ENTRY_SIZE_SHIFT);
	cp.end();
}

/// One VERTEX_BUFFER_STATE per hardware slot of `ve`.  Emits nothing when
/// no slot is used.
pub fn emit_3dstate_vertex_buffers(dev: &DeviceInfo, cp: &mut Cp, ve: &VertexElements, vb: &[Option<VertexBuffer>]) {
	let count = ve.vb_count();
	assert!(count <= 33);
	if count == 0 {
		return;
	}

	let len = 1 + 4 * count;
	cp.begin(len);
	cp.write(Opcode::_3DSTATE_VERTEX_BUFFERS.header(len));
	for hw_idx in 0..count {
		let divisor = ve.instance_divisors[hw_idx];
		let cso = vb.get(ve.vb_mapping[hw_idx]).and_then(|v| v.as_ref());

		let mut dw = (hw_idx as u32) << VB_DW0_INDEX_SHIFT;
		if divisor != 0 {
			dw |= VB_DW0_ACCESS_INSTANCEDATA;
		}
		if dev.gen >= Gen::Gen7 {
			dw |= GEN7_VB_DW0_ADDR_MODIFIED;
		}

		match cso {
			Some(cso) if cso.stride <= 2048 => {
				let end = cso.buffer.size - 1;
				cp.write(dw | cso.stride << VB_DW0_PITCH_SHIFT);
				cp.write_bo(cso.offset, cso.buffer.bo, DOMAIN_VERTEX, 0);
				cp.write_bo(end, cso.buffer.bo, DOMAIN_VERTEX, 0);
				cp.write(divisor);
			}
			_ => {
				cp.write(dw | VB_DW0_NULL);
				cp.write(0);
				cp.write(0);
				cp.write(divisor);
			}
		}
	}
	cp.end();
}

fn ve_with_components(comp: [u32; 4]) -> [u32; 2] {
	[
		VE_DW0_VALID,
		comp[0] << VE_DW1_COMP0_SHIFT |
			comp[1] << VE_DW1_COMP1_SHIFT |
			comp[2] << VE_DW1_COMP2_SHIFT |
			comp[3] << VE_DW1_COMP3_SHIFT,
	]
}

pub fn emit_3dstate_vertex_elements(_dev: &DeviceInfo, cp: &mut Cp, ve: &VertexElements,
	last_velement_edgeflag: bool, prepend_generated_ids: bool) {
	let count = ve.count() + prepend_generated_ids as usize;
	assert!(count <= 34);

	if count == 0 {
		let dummy = ve_with_components([VFCOMP_STORE_0, VFCOMP_STORE_0, VFCOMP_STORE_0, VFCOMP_STORE_1_FP]);
		cp.begin(3);
		cp.write(Opcode::_3DSTATE_VERTEX_ELEMENTS.header(3));
		cp.write(dummy[0]);
		cp.write(dummy[1]);
		cp.end();
		return;
	}

	let len = 2 * count + 1;
	cp.begin(len);
	cp.write(Opcode::_3DSTATE_VERTEX_ELEMENTS.header(len));
	if prepend_generated_ids {
		let ids = ve_with_components([VFCOMP_STORE_VID, VFCOMP_STORE_IID, VFCOMP_NOSTORE, VFCOMP_NOSTORE]);
		cp.write(ids[0]);
		cp.write(ids[1]);
	}
	for (i, cso) in ve.cso.iter().enumerate() {
		let dw = if last_velement_edgeflag && i == ve.count() - 1 {
			ve.edgeflag_cso()
		} else {
			*cso
		};
		cp.write(dw[0]);
		cp.write(dw[1]);
	}
	cp.end();
}

/// Emits nothing without an index buffer.
pub fn emit_3dstate_index_buffer(dev: &DeviceInfo, cp: &mut Cp, ib: &IndexBuffer, enable_cut_index: bool) {
	let buf = match ib.buffer {
		Some(buf) => buf,
		None => return,
	};
	if dev.gen >= Gen::Gen75 {
		assert!(!enable_cut_index, "GEN7.5 sets the cut index in 3DSTATE_VF");
	}

	let format = match ib.index_size {
		4 => IB_DW0_FORMAT_DWORD,
		2 => IB_DW0_FORMAT_WORD,
		1 => IB_DW0_FORMAT_BYTE,
		n => panic!("unknown index size {}", n),
	};
	let end = buf.size - buf.size % ib.index_size - 1;

	cp.begin(3);
	cp.write(Opcode::_3DSTATE_INDEX_BUFFER.header(3) |
		if enable_cut_index { IB_DW0_CUT_INDEX_ENABLE } else { 0 } |
		format);
	cp.write_bo(0, buf.bo, DOMAIN_VERTEX, 0);
	cp.write_bo(end, buf.bo, DOMAIN_VERTEX, 0);
	cp.end();
}

pub fn emit_3dstate_viewport_state_pointers(_dev: &DeviceInfo, cp: &mut Cp, clip: u32, sf: u32, cc: u32) {
	cp.begin(4);
	cp.write(Opcode::_3DSTATE_VIEWPORT_STATE_POINTERS.header(4) |
		PTR_VP_DW0_CLIP_CHANGED | PTR_VP_DW0_SF_CHANGED | PTR_VP_DW0_CC_CHANGED);
	cp.write(clip);
	cp.write(sf);
	cp.write(cc);
	cp.end();
}

pub fn emit_3dstate_cc_state_pointers(_dev: &DeviceInfo, cp: &mut Cp, blend: u32, dsa: u32, cc: u32) {
	cp.begin(4);
	cp.write(Opcode::_3DSTATE_CC_STATE_POINTERS.header(4));
	cp.write(blend | 1);
	cp.write(dsa | 1);
	cp.write(cc | 1);
	cp.end();
}

pub fn emit_3dstate_scissor_state_pointers(_dev: &DeviceInfo, cp: &mut Cp, scissor_rect: u32) {
	cp.begin(2);
	cp.write(Opcode::_3DSTATE_SCISSOR_STATE_POINTERS.header(2));
	cp.write(scissor_rect);
	cp.end();
}

fn sampler_count_bits(num_samplers: usize) -> u32 {
	((num_samplers as u32 + 3) / 4) << THREADDISP_SAMPLER_COUNT_SHIFT
}

pub fn emit_3dstate_vs(_dev: &DeviceInfo, cp: &mut Cp, vs: Option<&Shader>, num_samplers: usize) {
	cp.begin(6);
	cp.write(Opcode::_3DSTATE_VS.header(6));
	match vs {
		Some(vs) => {
			cp.write(vs.kernel_offset);
			cp.write(vs.cso[0] | sampler_count_bits(num_samplers));
			cp.write(0);
			cp.write(vs.cso[1]);
			cp.write(vs.cso[2]);
		}
		None => {
			for _ in 0..5 {
				cp.write(0);
			}
		}
	}
	cp.end();
}

/// GEN6 GS.  Without a geometry shader, a VS with stream output runs its
/// SO kernel here, entered at the offset for the primitive type.
pub fn emit_3dstate_gs(_dev: &DeviceInfo, cp: &mut Cp, gs: Option<&Shader>, vs: Option<&Shader>, verts_per_prim: u32) {
	let (dw1, cso) = match (gs, vs.and_then(|vs| vs.gs_cso.map(|cso| (vs, cso)))) {
		(Some(gs), _) => (gs.kernel_offset, gs.cso),
		(None, Some((vs, cso))) => {
			let entry = match verts_per_prim {
				1 => vs.kernel.vs_gen6_so_point_offset,
				2 => vs.kernel.vs_gen6_so_line_offset,
				_ => vs.kernel.vs_gen6_so_tri_offset,
			};
			(vs.kernel_offset + entry, cso)
		}
		(None, None) => (0, [0, 1 << GS_DW4_URB_READ_LEN_SHIFT, GS_DW5_STATISTICS, 0]),
	};

	cp.begin(7);
	cp.write(Opcode::_3DSTATE_GS.header(7));
	cp.write(dw1);
	cp.write(cso[0]);
	cp.write(0);
	cp.write(cso[1]);
	cp.write(cso[2]);
	cp.write(cso[3]);
	cp.end();
}

pub fn emit_3dstate_clip(_dev: &DeviceInfo, cp: &mut Cp, rasterizer: Option<&Rasterizer>, fs: Option<&Shader>,
	enable_guardband: bool, num_viewports: usize) {
	let dw = match rasterizer {
		Some(rast) => {
			let [dw1, mut dw2, mut dw3] = rast.clip.payload;
			if enable_guardband && rast.clip.can_enable_guardband {
				dw2 |= CLIP_DW2_GB_TEST_ENABLE;
			}
			let interps = fs.map_or(0, |fs| fs.kernel.fs_barycentric_interps);
			if interps & BARYCENTRIC_NONPERSPECTIVE_MASK != 0 {
				dw2 |= CLIP_DW2_NONPERSPECTIVE_BARYCENTRIC_ENABLE;
			}
			dw3 |= CLIP_DW3_RTAINDEX_FORCED_ZERO | (num_viewports as u32 - 1);
			[dw1, dw2, dw3]
		}
		None => [0; 3],
	};

	cp.begin(4);
	cp.write(Opcode::_3DSTATE_CLIP.header(4));
	cp.write(dw[0]);
	cp.write(dw[1]);
	cp.write(dw[2]);
	cp.end();
}

/// The rasterization dwords of 3DSTATE_SF.  GEN7 also carries the depth
/// buffer format here.
pub fn fill_3dstate_sf_raster(dev: &DeviceInfo, rasterizer: Option<&Rasterizer>, num_samples: u32,
	depth_format: Option<Format>) -> [u32; 6] {
	let mut payload = match rasterizer {
		Some(rast) => {
			let mut payload = rast.sf.payload;
			if num_samples > 1 {
				payload[1] |= rast.sf.dw_msaa;
			}
			payload
		}
		None => {
			let mut payload = [0; 6];
			if num_samples > 1 {
				payload[1] = SF_DW2_MSRASTMODE_ON_PATTERN;
			}
			payload
		}
	};

	if dev.gen >= Gen::Gen7 {
		let format = match depth_format {
			Some(Format::Z16_UNORM) => ZFORMAT_D16_UNORM,
			Some(Format::Z24X8_UNORM) | Some(Format::Z24_UNORM_S8_UINT) => ZFORMAT_D24_UNORM_X8_UINT,
			_ => ZFORMAT_D32_FLOAT,
		};
		payload[0] |= format << SF_DW1_DEPTH_FORMAT_SHIFT;
	}
	payload
}

/// The attribute setup dwords shared by GEN6 3DSTATE_SF and GEN7
/// 3DSTATE_SBE.
pub fn fill_3dstate_sf_sbe(_dev: &DeviceInfo, rasterizer: Option<&Rasterizer>, fs: Option<&Shader>) -> [u32; 13] {
	let mut dw = [0u32; 13];
	let fs = match fs {
		Some(fs) => fs,
		None => {
			dw[0] = 1 << SBE_DW1_URB_READ_LEN_SHIFT;
			return dw;
		}
	};

	let output_count = fs.kernel.input_count;
	assert!(output_count <= 32);
	let routing = &fs.routing;
	assert!(routing.source_skip % 2 == 0, "odd VUE read offset");
	let vue_offset = routing.source_skip / 2;
	let vue_len = ((routing.source_len + 1) / 2).max(1);

	dw[0] = output_count << SBE_DW1_ATTR_COUNT_SHIFT |
		vue_len << SBE_DW1_URB_READ_LEN_SHIFT |
		vue_offset << SBE_DW1_URB_READ_OFFSET_SHIFT;
	if routing.swizzle_enable {
		dw[0] |= SBE_DW1_ATTR_SWIZZLE_ENABLE;
	}
	if let Some(rast) = rasterizer {
		if rast.state.sprite_coord_mode == SpriteCoord::LowerLeft {
			dw[0] |= SBE_DW1_POINT_SPRITE_TEXCOORD_LOWERLEFT;
		}
	}

	for (i, pair) in routing.swizzles.chunks(2).enumerate() {
		dw[1 + i] = pair[0] as u32 | (pair[1] as u32) << 16;
	}
	dw[9] = routing.point_sprite_enable;
	dw[10] = routing.const_interp_enable;
	dw
}

pub fn emit_3dstate_sf(dev: &DeviceInfo, cp: &mut Cp, rasterizer: Option<&Rasterizer>, fs: Option<&Shader>) {
	let raster = fill_3dstate_sf_raster(dev, rasterizer, 1, None);
	let sbe = fill_3dstate_sf_sbe(dev, rasterizer, fs);

	cp.begin(20);
	cp.write(Opcode::_3DSTATE_SF.header(20));
	cp.write(sbe[0]);
	for &dw in &raster {
		cp.write(dw);
	}
	for &dw in &sbe[1..] {
		cp.write(dw);
	}
	cp.end();
}

/// `hiz_op` is one of the WM_DW4 depth clear/resolve bits, and only
/// valid without a fragment shader.
pub fn emit_3dstate_wm(dev: &DeviceInfo, cp: &mut Cp, fs: Option<&Shader>, num_samplers: usize,
	rasterizer: Option<&Rasterizer>, dual_blend: bool, cc_may_kill: bool, hiz_op: u32) {
	cp.begin(9);
	cp.write(Opcode::_3DSTATE_WM.header(9));

	let fs = match fs {
		Some(fs) => fs,
		None => {
			let max_threads = if dev.gt == 2 { 80 } else { 40 };
			cp.write(0);
			cp.write(0);
			cp.write(0);
			cp.write(hiz_op);
			cp.write((max_threads - 1) << WM_DW5_MAX_THREADS_SHIFT);
			cp.write(0);
			cp.write(0);
			cp.write(0);
			cp.end();
			return;
		}
	};
	assert_eq!(hiz_op, 0, "HiZ operations run without a fragment shader");

	let dw2 = fs.cso[0] | sampler_count_bits(num_samplers);
	let dw4 = fs.cso[1] | WM_DW4_STATISTICS;
	let mut dw5 = fs.cso[2];
	let mut dw6 = fs.cso[3];
	if cc_may_kill {
		dw5 |= WM_DW5_PS_KILL | WM_DW5_PS_ENABLE;
	}
	if dual_blend {
		dw5 |= WM_DW5_DUAL_SOURCE_BLEND;
	}
	if let Some(rast) = rasterizer {
		// single-sampled dispatch, so the MSAA modes never apply
		dw5 |= rast.wm.payload[0];
		dw6 |= rast.wm.payload[1];
	}

	cp.write(fs.kernel_offset);
	cp.write(dw2);
	cp.write(0);
	cp.write(dw4);
	cp.write(dw5);
	cp.write(dw6);
	cp.write(0);
	cp.write(0);
	cp.end();
}

/// Enabled-buffer mask and the four buffer dwords.  Sizes are in bytes.
fn fill_3dstate_constant(bufs: &[u32], sizes: &[u32], max_read_length: u32) -> (u32, [u32; 4]) {
	assert!(bufs.len() <= 4 && sizes.len() == bufs.len());
	let mut enabled = 0;
	let mut dw = [0u32; 4];
	let mut total_read_length = 0;
	for (i, (&buf, &size)) in bufs.iter().zip(sizes).enumerate() {
		if size == 0 {
			continue;
		}
		let read_len = (size + 31) / 32 - 1;
		assert!(buf % 32 == 0 && read_len < 32);
		enabled |= 1 << i;
		dw[i] = buf | read_len;
		total_read_length += read_len + 1;
	}
	assert!(total_read_length <= max_read_length, "push constants too large");
	(enabled, dw)
}

fn emit_3dstate_constant(cp: &mut Cp, opcode: Opcode, bufs: &[u32], sizes: &[u32], max_read_length: u32) {
	let (enabled, dw) = fill_3dstate_constant(bufs, sizes, max_read_length);
	cp.begin(5);
	cp.write(opcode.header(5) | enabled << 12);
	for &d in &dw {
		cp.write(d);
	}
	cp.end();
}

pub fn emit_3dstate_constant_vs(_dev: &DeviceInfo, cp: &mut Cp, bufs: &[u32], sizes: &[u32]) {
	emit_3dstate_constant(cp, Opcode::_3DSTATE_CONSTANT_VS, bufs, sizes, 32);
}

pub fn emit_3dstate_constant_gs(_dev: &DeviceInfo, cp: &mut Cp, bufs: &[u32], sizes: &[u32]) {
	emit_3dstate_constant(cp, Opcode::_3DSTATE_CONSTANT_GS, bufs, sizes, 64);
}

pub fn emit_3dstate_constant_ps(_dev: &DeviceInfo, cp: &mut Cp, bufs: &[u32], sizes: &[u32]) {
	emit_3dstate_constant(cp, Opcode::_3DSTATE_CONSTANT_PS, bufs, sizes, 64);
}

pub fn emit_3dstate_sample_mask(_dev: &DeviceInfo, cp: &mut Cp, sample_mask: u32) {
	cp.begin(2);
	cp.write(Opcode::_3DSTATE_SAMPLE_MASK.header(2));
	cp.write(sample_mask & 0xf);
	cp.end();
}

pub fn emit_3dstate_drawing_rectangle(dev: &DeviceInfo, cp: &mut Cp, x: u32, y: u32, width: u32, height: u32) {
	let rect_limit = if dev.gen >= Gen::Gen7 {
		16383
	} else {
		assert!(y % 2 == 0);
		8191
	};
	let xmax = (x + width - 1).min(rect_limit);
	let ymax = (y + height - 1).min(rect_limit);
	let x = x.min(rect_limit);
	let y = y.min(rect_limit);

	cp.begin(4);
	cp.write(Opcode::_3DSTATE_DRAWING_RECTANGLE.header(4));
	cp.write(y << 16 | x);
	cp.write(ymax << 16 | xmax);
	cp.write(0);
	cp.end();
}

fn write_opt_bo(cp: &mut Cp, delta: u32, bo: Option<Bo>, read_domains: u32, write_domain: u32) {
	match bo {
		Some(bo) => cp.write_bo(delta, bo, read_domains, write_domain),
		None => cp.write(delta),
	}
}

pub fn emit_3dstate_depth_buffer(dev: &DeviceInfo, cp: &mut Cp, zs: &ZsSurface) {
	let header = if dev.gen >= Gen::Gen7 {
		Gen7Opcode::_3DSTATE_DEPTH_BUFFER.header(7)
	} else {
		Opcode::_3DSTATE_DEPTH_BUFFER.header(7)
	};
	cp.begin(7);
	cp.write(header);
	cp.write(zs.payload[0]);
	write_opt_bo(cp, zs.payload[1], zs.bo, DOMAIN_RENDER, DOMAIN_RENDER);
	for &dw in &zs.payload[2..6] {
		cp.write(dw);
	}
	cp.end();
}

pub fn emit_3dstate_poly_stipple_offset(_dev: &DeviceInfo, cp: &mut Cp, x_offset: u32, y_offset: u32) {
	assert!(x_offset <= 31 && y_offset <= 31);
	cp.begin(2);
	cp.write(Opcode::_3DSTATE_POLY_STIPPLE_OFFSET.header(2));
	cp.write(x_offset << 8 | y_offset);
	cp.end();
}

pub fn emit_3dstate_poly_stipple_pattern(_dev: &DeviceInfo, cp: &mut Cp, pattern: &[u32; 32]) {
	cp.begin(33);
	cp.write(Opcode::_3DSTATE_POLY_STIPPLE_PATTERN.header(33));
	for &row in pattern.iter() {
		cp.write(row);
	}
	cp.end();
}

pub fn emit_3dstate_line_stipple(dev: &DeviceInfo, cp: &mut Cp, pattern: u32, factor: u32) {
	assert!(pattern & 0xffff == pattern);
	assert!(factor >= 1 && factor <= 256);
	cp.begin(3);
	cp.write(Opcode::_3DSTATE_LINE_STIPPLE.header(3));
	cp.write(pattern);
	if dev.gen >= Gen::Gen7 {
		let inverse = (65536.0f32 / factor as f32) as u32;
		cp.write(inverse << 15 | factor);
	} else {
		let inverse = (8192.0f32 / factor as f32) as u32;
		cp.write(inverse << 16 | factor);
	}
	cp.end();
}

pub fn emit_3dstate_aa_line_parameters(_dev: &DeviceInfo, cp: &mut Cp) {
	cp.begin(3);
	cp.write(Opcode::_3DSTATE_AA_LINE_PARAMETERS.header(3));
	cp.write(0);
	cp.write(0);
	cp.end();
}

pub fn emit_3dstate_gs_svb_index(_dev: &DeviceInfo, cp: &mut Cp, index: u32, svbi: u32, max_svbi: u32,
	load_vertex_count: bool) {
	assert!(index < 4);
	let mut dw1 = index << SVBI_DW1_INDEX_SHIFT;
	if load_vertex_count {
		dw1 |= SVBI_DW1_LOAD_INTERNAL_VERTEX_COUNT;
	}
	cp.begin(4);
	cp.write(Opcode::_3DSTATE_GS_SVB_INDEX.header(4));
	cp.write(dw1);
	cp.write(svbi);
	cp.write(max_svbi);
	cp.end();
}

pub fn emit_3dstate_multisample(dev: &DeviceInfo, cp: &mut Cp, num_samples: u32, packed_sample_pos: &[u32],
	pixel_location_center: bool) {
	let len = if dev.gen >= Gen::Gen7 { 4 } else { 3 };
	let mut dw1 = if pixel_location_center {
		MULTISAMPLE_DW1_PIXLOC_CENTER
	} else {
		MULTISAMPLE_DW1_PIXLOC_UL_CORNER
	};
	let (dw2, dw3) = match num_samples {
		0 | 1 => {
			dw1 |= MULTISAMPLE_DW1_NUMSAMPLES_1;
			(0, 0)
		}
		4 => {
			dw1 |= MULTISAMPLE_DW1_NUMSAMPLES_4;
			(packed_sample_pos[0], 0)
		}
		8 => {
			assert!(dev.gen >= Gen::Gen7, "8x MSAA needs GEN7");
			dw1 |= GEN7_MULTISAMPLE_DW1_NUMSAMPLES_8;
			(packed_sample_pos[0], packed_sample_pos[1])
		}
		n => panic!("unsupported sample count {}", n),
	};

	cp.begin(len);
	cp.write(Opcode::_3DSTATE_MULTISAMPLE.header(len));
	cp.write(dw1);
	cp.write(dw2);
	if dev.gen >= Gen::Gen7 {
		cp.write(dw3);
	}
	cp.end();
}

pub fn emit_3dstate_stencil_buffer(dev: &DeviceInfo, cp: &mut Cp, zs: &ZsSurface) {
	let header = if dev.gen >= Gen::Gen7 {
		Gen7Opcode::_3DSTATE_STENCIL_BUFFER.header(3)
	} else {
		Opcode::_3DSTATE_STENCIL_BUFFER.header(3)
	};
	cp.begin(3);
	cp.write(header);
	cp.write(zs.payload[6]);
	write_opt_bo(cp, zs.payload[7], zs.separate_s8_bo, DOMAIN_RENDER, DOMAIN_RENDER);
	cp.end();
}

pub fn emit_3dstate_hier_depth_buffer(dev: &DeviceInfo, cp: &mut Cp, zs: &ZsSurface) {
	let header = if dev.gen >= Gen::Gen7 {
		Gen7Opcode::_3DSTATE_HIER_DEPTH_BUFFER.header(3)
	} else {
		Opcode::_3DSTATE_HIER_DEPTH_BUFFER.header(3)
	};
	cp.begin(3);
	cp.write(header);
	cp.write(zs.payload[8]);
	write_opt_bo(cp, zs.payload[9], zs.hiz_bo, DOMAIN_RENDER, DOMAIN_RENDER);
	cp.end();
}

pub fn emit_3dstate_clear_params(_dev: &DeviceInfo, cp: &mut Cp, clear_val: u32) {
	cp.begin(2);
	cp.write(Opcode::_3DSTATE_CLEAR_PARAMS.header(2) | CLEAR_PARAMS_DW0_VALID);
	cp.write(clear_val);
	cp.end();
}

/// PIPE_CONTROL, with its post-sync write going to `bo` when given.
pub fn emit_pipe_control(dev: &DeviceInfo, cp: &mut Cp, dw1: u32, bo: Option<Bo>, offset: u32, write_qword: bool) {
	let len = if write_qword { 5 } else { 4 };
	assert!(offset % if write_qword { 8 } else { 4 } == 0);

	if dw1 & PIPE_CONTROL_CS_STALL != 0 {
		let mut bit_test = PIPE_CONTROL_RENDER_CACHE_FLUSH |
			PIPE_CONTROL_DEPTH_CACHE_FLUSH |
			PIPE_CONTROL_PIXEL_SCOREBOARD_STALL |
			PIPE_CONTROL_DEPTH_STALL |
			PIPE_CONTROL_WRITE_MASK;
		if dev.gen == Gen::Gen6 {
			bit_test |= PIPE_CONTROL_NOTIFY_ENABLE;
		}
		assert!(dw1 & bit_test != 0, "CS stall needs another bit set: {:#x}", dw1);
	}
	if dw1 & PIPE_CONTROL_DEPTH_STALL != 0 {
		assert!(dw1 & (PIPE_CONTROL_RENDER_CACHE_FLUSH | PIPE_CONTROL_DEPTH_CACHE_FLUSH) == 0,
			"depth stall with a cache flush: {:#x}", dw1);
	}

	let offset = if dev.gen == Gen::Gen6 && bo.is_some() {
		offset | PIPE_CONTROL_GEN6_GLOBAL_GTT
	} else {
		offset
	};

	cp.begin(len);
	cp.write(Opcode::PIPE_CONTROL.header(len));
	cp.write(dw1);
	write_opt_bo(cp, offset, bo, DOMAIN_INSTRUCTION, DOMAIN_INSTRUCTION);
	cp.write(0);
	if write_qword {
		cp.write(0);
	}
	cp.end();
}

/// First vertex of an indexed draw, counting the index buffer offset.
pub fn vertex_start(draw: &DrawInfo, ib: &IndexBuffer) -> u32 {
	if draw.indexed && ib.index_size != 0 {
		draw.start + ib.offset / ib.index_size
	} else {
		draw.start
	}
}

pub fn emit_3dprimitive(_dev: &DeviceInfo, cp: &mut Cp, draw: &DrawInfo, ib: &IndexBuffer, rectlist: bool) {
	let prim = if rectlist { PRIM_RECTLIST } else { draw.topology() };
	let access = if draw.indexed { PRIM_DW0_ACCESS_RANDOM } else { 0 };

	cp.begin(6);
	cp.write(Opcode::_3DPRIMITIVE.header(6) | prim << PRIM_DW0_TYPE_SHIFT | access);
	cp.write(draw.count);
	cp.write(vertex_start(draw, ib));
	cp.write(draw.instance_count);
	cp.write(draw.start_instance);
	cp.write(draw.index_bias as u32);
	cp.end();
}

pub fn emit_sf_viewport(_dev: &DeviceInfo, cp: &mut Cp, viewports: &[Viewport]) -> u32 {
	assert!(!viewports.is_empty() && viewports.len() <= 16);
	let (offset, dw) = cp.steal(8 * viewports.len(), 8);
	for (vp, dw) in viewports.iter().zip(dw.chunks_mut(8)) {
		dw[0] = vp.m00.to_bits();
		dw[1] = vp.m11.to_bits();
		dw[2] = vp.m22.to_bits();
		dw[3] = vp.m30.to_bits();
		dw[4] = vp.m31.to_bits();
		dw[5] = vp.m32.to_bits();
	}
	offset
}

pub fn emit_clip_viewport(_dev: &DeviceInfo, cp: &mut Cp, viewports: &[Viewport]) -> u32 {
	assert!(!viewports.is_empty() && viewports.len() <= 16);
	let (offset, dw) = cp.steal(4 * viewports.len(), 8);
	for (vp, dw) in viewports.iter().zip(dw.chunks_mut(4)) {
		dw[0] = vp.min_gbx.to_bits();
		dw[1] = vp.max_gbx.to_bits();
		dw[2] = vp.min_gby.to_bits();
		dw[3] = vp.max_gby.to_bits();
	}
	offset
}

pub fn emit_cc_viewport(_dev: &DeviceInfo, cp: &mut Cp, viewports: &[Viewport]) -> u32 {
	assert!(!viewports.is_empty() && viewports.len() <= 16);
	let (offset, dw) = cp.steal(2 * viewports.len(), 8);
	for (vp, dw) in viewports.iter().zip(dw.chunks_mut(2)) {
		dw[0] = vp.min_z.to_bits();
		dw[1] = vp.max_z.to_bits();
	}
	offset
}

pub fn emit_color_calc_state(_dev: &DeviceInfo, cp: &mut Cp, stencil_ref: &StencilRef, alpha_ref: u8,
	blend_color: &[f32; 4]) -> u32 {
	let (offset, dw) = cp.steal(6, 16);
	dw[0] = (stencil_ref.ref_value[0] as u32) << 24 |
		(stencil_ref.ref_value[1] as u32) << 16 |
		CC_DW0_ALPHATEST_UNORM8;
	dw[1] = alpha_ref as u32;
	for (d, c) in dw[2..6].iter_mut().zip(blend_color) {
		*d = c.to_bits();
	}
	offset
}

/// One BLEND_STATE entry per color buffer.  Returns 0, emitting nothing,
/// when there is neither a color buffer nor an alpha test.
pub fn emit_blend_state(_dev: &DeviceInfo, cp: &mut Cp, blend: &Blend, fb: &Framebuffer, dsa: &Dsa) -> u32 {
	let mut num_targets = fb.cbufs.len();
	assert!(num_targets <= 8);
	if num_targets == 0 {
		if dsa.dw_alpha == 0 {
			return 0;
		}
		num_targets = 1;
	}

	let (offset, dw) = cp.steal(2 * num_targets, 16);
	for (i, dw) in dw.chunks_mut(2).enumerate() {
		let idx = if blend.independent_blend_enable { i } else { 0 };
		let cso = &blend.cso[idx];
		let format = fb.cbufs.get(idx).and_then(|rt| rt.as_ref()).map(|rt| rt.format);

		let (unorm, pure_integer, dst_alpha_forced_one) = match format {
			Some(format) => (format.is_unorm(), format.is_pure_integer(), format == Format::B8G8R8X8_UNORM),
			None => (true, false, false),
		};

		dw[0] = cso.payload[0];
		dw[1] = cso.payload[1];
		if !pure_integer {
			dw[0] |= if dst_alpha_forced_one { cso.dw_blend_dst_alpha_forced_one } else { cso.dw_blend };
		}
		if unorm {
			dw[1] |= cso.dw_logicop;
		}
		if fb.num_samples > 1 {
			dw[1] |= cso.dw_alpha_mod;
		}
		if !pure_integer {
			dw[1] |= dsa.dw_alpha;
		}
	}
	offset
}

pub fn emit_depth_stencil_state(_dev: &DeviceInfo, cp: &mut Cp, dsa: &Dsa) -> u32 {
	cp.state_write(16, &dsa.payload)
}

pub fn emit_scissor_rect(_dev: &DeviceInfo, cp: &mut Cp, scissor: &Scissor, num_viewports: usize) -> u32 {
	assert!(num_viewports >= 1 && num_viewports <= 16);
	cp.state_write(8, &scissor.payload[..2 * num_viewports])
}

/// Returns 0, emitting nothing, for an empty table.
pub fn emit_binding_table_state(_dev: &DeviceInfo, cp: &mut Cp, surface_states: &[u32]) -> u32 {
	assert!(surface_states.len() <= 256);
	if surface_states.is_empty() {
		return 0;
	}
	cp.state_write(8, surface_states)
}

pub fn emit_surface_state(dev: &DeviceInfo, cp: &mut Cp, surf: &ViewSurface, for_render: bool) -> u32 {
	let (read_domains, write_domain) = if for_render {
		(DOMAIN_RENDER, DOMAIN_RENDER)
	} else {
		(DOMAIN_SAMPLER, 0)
	};
	let len = ViewSurface::len(dev);
	let offset = cp.state_write(8, &surf.payload[..len]);
	if let Some(bo) = surf.bo {
		cp.state_reloc(offset, 1, surf.payload[1], bo, read_domains, write_domain);
	}
	offset
}

/// SURFACE_STATE of one stream output, as a buffer of float vectors
/// strided like the output buffer.
pub fn emit_so_surface_state(dev: &DeviceInfo, cp: &mut Cp, so: &SoTarget, so_info: &SoInfo, so_index: usize) -> u32 {
	let output = &so_info.outputs[so_index];
	let bo_offset = so.offset + output.dst_offset * 4;
	let struct_size = so_info.stride[output.output_buffer as usize] * 4;
	let elem_format = match output.num_components {
		1 => Format::R32_FLOAT,
		2 => Format::R32G32_FLOAT,
		3 => Format::R32G32B32_FLOAT,
		4 => Format::R32G32B32A32_FLOAT,
		n => panic!("unexpected stream output of {} components", n),
	};

	let surf = match ViewSurface::for_buffer(dev, &so.buffer, bo_offset, so.size, struct_size,
		elem_format, false, true) {
		Ok(surf) => surf,
		Err(e) => {
			error!("stream output {} disabled: {}", so_index, e);
			ViewSurface::null(dev, 1, 1, 1, 0)
		}
	};
	emit_surface_state(dev, cp, &surf, false)
}

/// SAMPLER_STATE for `samplers`, each paired with its view and the offset
/// of its border color.  Returns 0, emitting nothing, without samplers.
pub fn emit_sampler_state(dev: &DeviceInfo, cp: &mut Cp, samplers: &[Option<Sampler>],
	views: &[Option<SamplerView>], border_colors: &[u32]) -> u32 {
	let count = samplers.len();
	assert!(count <= 16);
	if count == 0 {
		return 0;
	}

	let (offset, dw) = cp.steal(4 * count, 8);
	for (i, dw) in dw.chunks_mut(4).enumerate() {
		let (sampler, view) = match (&samplers[i], views.get(i).and_then(|v| v.as_ref())) {
			(Some(sampler), Some(view)) => (sampler, view),
			_ => {
				// disabled
				dw[0] = 1 << 31;
				continue;
			}
		};

		let filter = if sampler.anisotropic { sampler.dw_filter_aniso } else { sampler.dw_filter };
		let (dw_filter, dw_wrap) = match view.target {
			Target::Tex1D => (filter, sampler.dw_wrap_1d),
			Target::Tex3D => (sampler.dw_filter, sampler.dw_wrap),
			Target::Cube => (filter, sampler.dw_wrap_cube),
			_ => (filter, sampler.dw_wrap),
		};

		let border_color = border_colors[i];
		assert!(border_color & 0x1f == 0, "misaligned border color");

		dw[0] = sampler.payload[0] | dw_filter;
		dw[1] = sampler.payload[1];
		dw[2] = border_color;
		dw[3] = sampler.payload[2];
		if dev.gen >= Gen::Gen7 {
			dw[3] |= dw_wrap;
		} else {
			dw[0] |= view.first_level << 22;
			dw[1] |= dw_wrap;
		}
	}
	offset
}

pub fn emit_sampler_border_color_state(dev: &DeviceInfo, cp: &mut Cp, sampler: &Sampler) -> u32 {
	let len = if dev.gen >= Gen::Gen7 { 4 } else { 12 };
	cp.state_write(8, &sampler.payload[3..3 + len])
}

/// Reserve a push constant buffer of `size` bytes.  Returns its offset and
/// the words to fill; padding past `size` stays zero.
pub fn emit_push_constant_buffer<'a>(_dev: &DeviceInfo, cp: &'a mut Cp, size: u32) -> (u32, &'a mut [u32]) {
	let len = ((size + 31) & !31) / 4;
	cp.steal(len as usize, 8)
}

/// One vertex buffer at hardware slot 0, pointing back into the batch
/// buffer at `[vb_begin, vb_end]`.
pub fn emit_user_vertex_buffers(_dev: &DeviceInfo, cp: &mut Cp, vb_begin: u32, vb_end: u32, stride: u32) {
	let bo = cp.bo();
	cp.begin(5);
	cp.write(Opcode::_3DSTATE_VERTEX_BUFFERS.header(5));
	cp.write(stride << VB_DW0_PITCH_SHIFT);
	cp.write_bo(vb_begin, bo, DOMAIN_VERTEX, 0);
	cp.write_bo(vb_end, bo, DOMAIN_VERTEX, 0);
	cp.write(0);
	cp.end();
}

/// Copy vertices into the state area.  Returns their byte offset.
pub fn emit_user_vertex_buffer(_dev: &DeviceInfo, cp: &mut Cp, vertices: &[u32]) -> u32 {
	cp.state_write(2, vertices)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cso::{BlendDesc, DsaDesc, RasterizerDesc, ViewportDesc};
	use crate::state::RenderTarget;
	use crate::surface::Buffer;
	use crate::winsys::SoftWinsys;
	use pretty_assertions::assert_eq;

	fn new_cp() -> Cp {
		Cp::new(Box::new(SoftWinsys::new(1 << 30)), 4096).unwrap()
	}

	fn buffer(handle: u32, size: u32) -> Buffer {
		Buffer {
			bo: Bo { handle: handle, size: size as u64 },
			size: size,
		}
	}

	#[test]
	fn pipe_control_gen6_uses_global_gtt() {
		let snb = DeviceInfo::snb(2);
		let mut cp = new_cp();
		let bo = Bo { handle: 77, size: 4096 };
		emit_pipe_control(&snb, &mut cp, PIPE_CONTROL_WRITE_TIMESTAMP, Some(bo), 16, true);
		assert_eq!(cp.commands(), &[0x7a00_0003, PIPE_CONTROL_WRITE_TIMESTAMP, 16 | 4, 0, 0]);
		assert_eq!(cp.relocs()[0].pos, 2);
		assert_eq!(cp.relocs()[0].bo, bo);

		let ivb = DeviceInfo::ivb(1);
		let mut cp = new_cp();
		emit_pipe_control(&ivb, &mut cp, PIPE_CONTROL_CS_STALL | PIPE_CONTROL_PIXEL_SCOREBOARD_STALL,
			None, 0, false);
		assert_eq!(cp.commands().len(), 4);
		assert!(cp.relocs().is_empty());
	}

	#[test]
	#[should_panic]
	fn pipe_control_lone_cs_stall() {
		let ivb = DeviceInfo::ivb(1);
		let mut cp = new_cp();
		emit_pipe_control(&ivb, &mut cp, PIPE_CONTROL_CS_STALL, None, 0, false);
	}

	#[test]
	fn urb_entries() {
		let snb = DeviceInfo::snb(1);
		let mut cp = new_cp();
		// 32 KB split evenly, 4-row VS entries, no GS
		emit_3dstate_urb(&snb, &mut cp, 16 * 1024, 16 * 1024, 4 * 128, 0);
		assert_eq!(cp.commands(), &[0x7805_0001, 3 << 16 | 32, 128 << 8]);
	}

	#[test]
	fn vertex_buffers_and_null_slots() {
		let ivb = DeviceInfo::ivb(1);
		let mut cp = new_cp();
		let ve = VertexElements::new(&ivb, &[
			VertexElementDesc {
				src_offset: 0,
				vertex_buffer_index: 0,
				instance_divisor: 0,
				src_format: Format::R32G32B32A32_FLOAT,
			},
			VertexElementDesc {
				src_offset: 0,
				vertex_buffer_index: 1,
				instance_divisor: 1,
				src_format: Format::R32_FLOAT,
			},
		]);
		let vb = vec![Some(VertexBuffer { buffer: buffer(5, 256), offset: 16, stride: 16 }), None];
		emit_3dstate_vertex_buffers(&ivb, &mut cp, &ve, &vb);
		assert_eq!(cp.commands(), &[
			0x7808_0007,
			GEN7_VB_DW0_ADDR_MODIFIED | 16, 16, 255, 0,
			1 << 26 | VB_DW0_ACCESS_INSTANCEDATA | GEN7_VB_DW0_ADDR_MODIFIED | VB_DW0_NULL, 0, 0, 1,
		]);
		assert_eq!(cp.relocs().len(), 2);
		assert_eq!(cp.relocs()[1].delta, 255);
		assert_eq!(cp.relocs()[1].read_domains, DOMAIN_VERTEX);
	}

	#[test]
	fn vertex_elements_dummy_and_ids() {
		let snb = DeviceInfo::snb(1);
		let mut cp = new_cp();
		let ve = VertexElements::default();
		emit_3dstate_vertex_elements(&snb, &mut cp, &ve, false, false);
		assert_eq!(cp.commands(), &[
			0x7809_0001,
			VE_DW0_VALID,
			VFCOMP_STORE_0 << 28 | VFCOMP_STORE_0 << 24 | VFCOMP_STORE_0 << 20 | VFCOMP_STORE_1_FP << 16,
		]);

		let mut cp = new_cp();
		emit_3dstate_vertex_elements(&snb, &mut cp, &ve, false, true);
		assert_eq!(cp.commands()[2], VFCOMP_STORE_VID << 28 | VFCOMP_STORE_IID << 24);
	}

	#[test]
	fn index_buffer_end_is_index_aligned() {
		let snb = DeviceInfo::snb(1);
		let mut cp = new_cp();
		let ib = IndexBuffer { buffer: Some(buffer(9, 1023)), offset: 0, index_size: 2 };
		emit_3dstate_index_buffer(&snb, &mut cp, &ib, true);
		assert_eq!(cp.commands(), &[0x780a_0001 | IB_DW0_CUT_INDEX_ENABLE | IB_DW0_FORMAT_WORD, 0, 1021]);

		let mut cp = new_cp();
		emit_3dstate_index_buffer(&snb, &mut cp, &IndexBuffer::default(), false);
		assert!(cp.commands().is_empty());
	}

	#[test]
	fn null_stage_commands() {
		let snb = DeviceInfo::snb(2);
		let mut cp = new_cp();
		emit_3dstate_vs(&snb, &mut cp, None, 0);
		emit_3dstate_gs(&snb, &mut cp, None, None, 3);
		emit_3dstate_clip(&snb, &mut cp, None, None, false, 1);
		emit_3dstate_wm(&snb, &mut cp, None, 0, None, false, false, WM_DW4_DEPTH_CLEAR);
		assert_eq!(cp.commands(), &[
			0x7810_0004, 0, 0, 0, 0, 0,
			0x7811_0005, 0, 0, 0, 1 << 11, GS_DW5_STATISTICS, 0,
			0x7812_0002, 0, 0, 0,
			0x7814_0007, 0, 0, 0, WM_DW4_DEPTH_CLEAR, 79 << 25, 0, 0, 0,
		]);
	}

	#[test]
	fn clip_uses_viewport_count() {
		let snb = DeviceInfo::snb(1);
		let rast = Rasterizer::new(&snb, &RasterizerDesc::default());
		let mut cp = new_cp();
		emit_3dstate_clip(&snb, &mut cp, Some(&rast), None, true, 4);
		let dw = cp.commands();
		assert_eq!(dw[3] & 0xf, 3);
		assert!(dw[3] & CLIP_DW3_RTAINDEX_FORCED_ZERO != 0);
		assert_eq!(dw[2] & CLIP_DW2_GB_TEST_ENABLE != 0, rast.clip.can_enable_guardband);
	}

	#[test]
	fn sf_without_fs_reads_one_row() {
		let snb = DeviceInfo::snb(1);
		let rast = Rasterizer::new(&snb, &RasterizerDesc::default());
		let mut cp = new_cp();
		emit_3dstate_sf(&snb, &mut cp, Some(&rast), None);
		let dw = cp.commands();
		assert_eq!(dw.len(), 20);
		assert_eq!(dw[1], 1 << 11);
		assert_eq!(&dw[2..8], &rast.sf.payload[..]);
		assert!(dw[8..].iter().all(|&d| d == 0));
	}

	#[test]
	fn gen7_sf_raster_carries_depth_format() {
		let ivb = DeviceInfo::ivb(1);
		let raster = fill_3dstate_sf_raster(&ivb, None, 4, Some(Format::Z24_UNORM_S8_UINT));
		assert_eq!(raster[0], ZFORMAT_D24_UNORM_X8_UINT << 12);
		assert_eq!(raster[1], SF_DW2_MSRASTMODE_ON_PATTERN);
		let raster = fill_3dstate_sf_raster(&ivb, None, 1, None);
		assert_eq!(raster[0], ZFORMAT_D32_FLOAT << 12);
	}

	#[test]
	fn constant_buffers() {
		let snb = DeviceInfo::snb(1);
		let mut cp = new_cp();
		emit_3dstate_constant_ps(&snb, &mut cp, &[0x40, 0], &[64, 0]);
		assert_eq!(cp.commands(), &[0x7817_0003 | 1 << 12, 0x40 | 1, 0, 0, 0]);
	}

	#[test]
	fn drawing_rectangle_is_clamped() {
		let snb = DeviceInfo::snb(1);
		let mut cp = new_cp();
		emit_3dstate_drawing_rectangle(&snb, &mut cp, 0, 0, 10000, 64);
		assert_eq!(cp.commands(), &[0x7900_0002, 0, 63 << 16 | 8191, 0]);
	}

	#[test]
	fn line_stipple_inverse() {
		let mut cp = new_cp();
		emit_3dstate_line_stipple(&DeviceInfo::snb(1), &mut cp, 0xf0f0, 2);
		emit_3dstate_line_stipple(&DeviceInfo::ivb(1), &mut cp, 0xf0f0, 2);
		assert_eq!(cp.commands()[2], 4096 << 16 | 2);
		assert_eq!(cp.commands()[5], 32768 << 15 | 2);
	}

	#[test]
	fn multisample_lengths() {
		let mut cp = new_cp();
		emit_3dstate_multisample(&DeviceInfo::snb(1), &mut cp, 4, &[0x1234_5678], false);
		assert_eq!(cp.commands(), &[0x790d_0001, MULTISAMPLE_DW1_PIXLOC_UL_CORNER | MULTISAMPLE_DW1_NUMSAMPLES_4, 0x1234_5678]);

		let mut cp = new_cp();
		emit_3dstate_multisample(&DeviceInfo::ivb(1), &mut cp, 8, &[1, 2], true);
		assert_eq!(cp.commands(), &[0x790d_0002, GEN7_MULTISAMPLE_DW1_NUMSAMPLES_8, 1, 2]);
	}

	#[test]
	fn depth_buffer_opcode_per_gen() {
		let mut cp = new_cp();
		let snb = DeviceInfo::snb(1);
		emit_3dstate_depth_buffer(&snb, &mut cp, &ZsSurface::null(&snb));
		let ivb = DeviceInfo::ivb(1);
		emit_3dstate_depth_buffer(&ivb, &mut cp, &ZsSurface::null(&ivb));
		assert_eq!(cp.commands()[0], 0x7905_0005);
		assert_eq!(cp.commands()[7], 0x7805_0005);
		assert!(cp.relocs().is_empty());
	}

	#[test]
	fn primitive_start_includes_index_offset() {
		let snb = DeviceInfo::snb(1);
		let mut cp = new_cp();
		let draw = DrawInfo {
			indexed: true,
			start: 3,
			count: 6,
			index_bias: -1,
			..DrawInfo::default()
		};
		let ib = IndexBuffer { buffer: Some(buffer(3, 64)), offset: 8, index_size: 2 };
		emit_3dprimitive(&snb, &mut cp, &draw, &ib, false);
		assert_eq!(cp.commands(), &[
			0x7b00_0004 | PRIM_TRILIST << 10 | PRIM_DW0_ACCESS_RANDOM,
			6, 3 + 4, 1, 0, 0xffff_ffff,
		]);
	}

	#[test]
	fn store_data_imm_qword() {
		let snb = DeviceInfo::snb(1);
		let mut cp = new_cp();
		let bo = Bo { handle: 4, size: 4096 };
		emit_mi_store_data_imm(&snb, &mut cp, bo, 8, 0x1_0000_0002, true);
		assert_eq!(cp.commands(), &[0x1000_0003 | MI_GLOBAL_GTT, 0, 8, 2, 1]);
		emit_mi_store_register_mem(&DeviceInfo::ivb(1), &mut cp, bo, 0, REG_PS_DEPTH_COUNT);
		assert_eq!(&cp.commands()[5..], &[0x1200_0001, REG_PS_DEPTH_COUNT, 0]);
	}

	#[test]
	fn viewport_states() {
		let snb = DeviceInfo::snb(1);
		let mut cp = new_cp();
		let vp = Viewport::new(&snb, &ViewportDesc { scale: [2.0, 3.0, 0.5], translate: [2.0, 3.0, 0.5] });
		let sf = emit_sf_viewport(&snb, &mut cp, &[vp, vp]);
		assert_eq!(sf % 32, 0);
		assert_eq!(cp.state_word(sf, 0), 2.0f32.to_bits());
		assert_eq!(cp.state_word(sf, 9), 3.0f32.to_bits());
		let cc = emit_cc_viewport(&snb, &mut cp, &[vp]);
		assert_eq!(cp.state_word(cc, 1), vp.max_z.to_bits());
	}

	#[test]
	fn blend_state_per_format() {
		let snb = DeviceInfo::snb(1);
		let mut cp = new_cp();
		let mut fb = Framebuffer::new(&snb);
		let blend = Blend::new(&snb, &BlendDesc::default());
		let dsa = Dsa::new(&snb, &DsaDesc::default());
		assert_eq!(emit_blend_state(&snb, &mut cp, &blend, &fb, &dsa), 0);
		assert_eq!(cp.stolen(), 0);

		fb.cbufs = vec![
			Some(RenderTarget { surface: fb.null_rt, format: Format::R8G8B8A8_UINT }),
			None,
		];
		let offset = emit_blend_state(&snb, &mut cp, &blend, &fb, &dsa);
		assert_eq!(offset % 64, 0);
		// pure integer targets never blend
		assert_eq!(cp.state_word(offset, 0), blend.cso[0].payload[0]);
		assert_eq!(cp.state_word(offset, 2), blend.cso[0].payload[0]);

		fb.cbufs[0] = Some(RenderTarget { surface: fb.null_rt, format: Format::B8G8R8A8_UNORM });
		let offset = emit_blend_state(&snb, &mut cp, &blend, &fb, &dsa);
		assert_eq!(cp.state_word(offset, 2), blend.cso[0].payload[0] | blend.cso[0].dw_blend);
		assert_eq!(cp.state_word(offset, 3), blend.cso[0].payload[1] | blend.cso[0].dw_logicop);
	}

	#[test]
	fn surface_state_relocation() {
		let snb = DeviceInfo::snb(1);
		let mut cp = new_cp();
		let buf = buffer(12, 4096);
		let surf = ViewSurface::for_buffer(&snb, &buf, 64, 1024, 16, Format::R32G32B32A32_FLOAT, false, false).unwrap();
		let offset = emit_surface_state(&snb, &mut cp, &surf, false);
		assert_eq!(cp.stolen(), 8);
		assert_eq!(cp.state_word(offset, 1), 64);
		let reloc = cp.relocs()[0];
		assert_eq!(reloc.pos, offset as usize / 4 + 1);
		assert_eq!((reloc.read_domains, reloc.write_domain), (DOMAIN_SAMPLER, 0));
	}

	#[test]
	fn sampler_state_disabled_slots() {
		let snb = DeviceInfo::snb(1);
		let mut cp = new_cp();
		let offset = emit_sampler_state(&snb, &mut cp, &[None, None], &[], &[0, 0]);
		assert_eq!(cp.state_word(offset, 0), 1 << 31);
		assert_eq!(cp.state_word(offset, 4), 1 << 31);
		assert_eq!(emit_sampler_state(&snb, &mut cp, &[], &[], &[]), 0);
	}

	#[test]
	fn push_constants_are_padded() {
		let snb = DeviceInfo::snb(1);
		let mut cp = new_cp();
		let (offset, dw) = emit_push_constant_buffer(&snb, &mut cp, 20);
		assert_eq!(dw.len(), 8);
		dw[0] = 1;
		assert_eq!(offset % 32, 0);
	}
}
