// GEN7 and GEN7.5 draws.  Indirect state and most of the fixed function
// commands are shared with pipeline_gen6.

use crate::blitter::{Blitter, BlitterUses};
use crate::cmd::*;
use crate::dev::Gen;
use crate::gpe_gen6;
use crate::gpe_gen7::{self, HwStage};
use crate::pipeline::{Pipeline, Session, StateSlot};
use crate::pipeline_gen6;
use crate::state::*;

/// Push constant space of the VS and the PS, and the URB space it takes.
const PCB_ALLOC_SIZE: u32 = 8192;
const URB_PCB_RESERVED: u32 = 16384;

/// CS stall before multisample or depth changes, once per draw.  GEN7.5
/// does not need it.
fn wa_cs_stall(p: &mut Pipeline, change_multisample: bool, change_depth: bool) {
	if p.dev.gen != Gen::Gen7 || p.state.has_wa {
		return;
	}
	p.state.has_wa = true;

	let mut dw1 = PIPE_CONTROL_CS_STALL;
	if change_multisample {
		dw1 |= PIPE_CONTROL_DEPTH_CACHE_FLUSH;
	}
	let bo = if change_depth {
		dw1 |= PIPE_CONTROL_WRITE_IMM;
		Some(p.workaround_bo)
	} else {
		None
	};
	gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp, dw1, bo, 0, false);
}

/// Depth stall with a post-sync write before VS state changes.
fn wa_vs_depth_stall(p: &mut Pipeline) {
	if p.dev.gen != Gen::Gen7 {
		return;
	}
	let bo = p.workaround_bo;
	gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp,
		PIPE_CONTROL_DEPTH_STALL | PIPE_CONTROL_WRITE_IMM, Some(bo), 0, false);
}

/// Depth stall before WM state changes.  A new depth buffer also needs
/// the depth cache flushed.
fn wa_wm_depth_stall(p: &mut Pipeline, change_depth_buffer: bool) {
	if p.dev.gen != Gen::Gen7 {
		return;
	}
	gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp, PIPE_CONTROL_DEPTH_STALL, None, 0, false);
	if !change_depth_buffer {
		return;
	}
	gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp, PIPE_CONTROL_DEPTH_CACHE_FLUSH, None, 0, false);
	gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp, PIPE_CONTROL_DEPTH_STALL, None, 0, false);
}

fn wa_ps_max_threads_stall(p: &mut Pipeline) {
	if p.dev.gen != Gen::Gen7 || p.state.has_wa {
		return;
	}
	gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp, PIPE_CONTROL_PIXEL_SCOREBOARD_STALL, None, 0, false);
}

fn emit_push_constant_alloc(p: &mut Pipeline) {
	gpe_gen7::emit_3dstate_push_constant_alloc(&p.dev, &mut p.cp, HwStage::Vs, 0, PCB_ALLOC_SIZE);
	gpe_gen7::emit_3dstate_push_constant_alloc(&p.dev, &mut p.cp, HwStage::Ps, PCB_ALLOC_SIZE, PCB_ALLOC_SIZE);
	wa_cs_stall(p, true, true);
}

fn emit_pcb_alloc(p: &mut Pipeline, session: &Session) {
	if session.hw_ctx_changed {
		emit_push_constant_alloc(p);
	}
}

fn emit_pointers_1(p: &mut Pipeline, session: &Session) {
	if session.viewport_changed {
		let cc = p.shadow.get(StateSlot::CcViewport);
		gpe_gen7::emit_3dstate_viewport_state_pointers_cc(&p.dev, &mut p.cp, cc);
		let sf_clip = p.shadow.get(StateSlot::SfClipViewport);
		gpe_gen7::emit_3dstate_viewport_state_pointers_sf_clip(&p.dev, &mut p.cp, sf_clip);
	}
}

/// The URB past the push constants goes to the VS.
fn emit_urb_for(p: &mut Pipeline, vs_entry_size: u32) {
	let offset = URB_PCB_RESERVED;
	let urb_size = p.dev.urb_size;
	gpe_gen7::emit_3dstate_urb(&p.dev, &mut p.cp, HwStage::Vs, offset, urb_size - offset, vs_entry_size);
	for &stage in &[HwStage::Gs, HwStage::Hs, HwStage::Ds] {
		gpe_gen7::emit_3dstate_urb(&p.dev, &mut p.cp, stage, offset, 0, 0);
	}
}

fn emit_urb(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	if !session.dirty(Dirty::VE | Dirty::VS) {
		return;
	}
	let vs_entries = vec.vs.as_ref().map_or(0, |vs| vs.kernel.output_count).max(vec.ve.count() as u32);
	wa_vs_depth_stall(p);
	emit_urb_for(p, vs_entries * 16);
}

fn emit_pointers_2(p: &mut Pipeline, session: &Session) {
	if session.blend_changed {
		let blend = p.shadow.get(StateSlot::Blend);
		gpe_gen7::emit_3dstate_blend_state_pointers(&p.dev, &mut p.cp, blend);
	}
	if session.cc_changed {
		let cc = p.shadow.get(StateSlot::ColorCalc);
		gpe_gen7::emit_3dstate_cc_state_pointers(&p.dev, &mut p.cp, cc);
	}
	if session.dsa_changed {
		let dsa = p.shadow.get(StateSlot::DepthStencil);
		gpe_gen7::emit_3dstate_depth_stencil_state_pointers(&p.dev, &mut p.cp, dsa);
	}
}

fn emit_wm_multisample(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	if !session.dirty(Dirty::SAMPLE_MASK | Dirty::FB) {
		return;
	}
	let num_samples = vec.fb.num_samples;
	wa_cs_stall(p, true, true);

	let positions = p.packed_sample_position(num_samples);
	gpe_gen6::emit_3dstate_multisample(&p.dev, &mut p.cp, num_samples, &positions,
		vec.rasterizer.state.half_pixel_center);
	let mask = if num_samples > 1 { vec.sample_mask } else { 0x1 };
	gpe_gen7::emit_3dstate_sample_mask(&p.dev, &mut p.cp, mask, num_samples);
}

/// No geometry shader on GEN7, only its binding table.
fn emit_gs(p: &mut Pipeline, session: &Session) {
	if session.hw_ctx_changed {
		gpe_gen7::emit_3dstate_constant_gs(&p.dev, &mut p.cp, &[], &[]);
		gpe_gen7::emit_3dstate_gs(&p.dev, &mut p.cp, None, 0);
	}
	if session.binding_table_changed[Stage::Gs.index()] {
		let bt = p.shadow.get(StateSlot::BindingTable(Stage::Gs));
		gpe_gen7::emit_3dstate_binding_table_pointers(&p.dev, &mut p.cp, HwStage::Gs, bt);
	}
}

/// Tessellation stays disabled.
fn emit_tessellation(p: &mut Pipeline, session: &Session) {
	if !session.hw_ctx_changed {
		return;
	}
	gpe_gen7::emit_3dstate_constant_hs(&p.dev, &mut p.cp, &[], &[]);
	gpe_gen7::emit_3dstate_hs(&p.dev, &mut p.cp);
	gpe_gen7::emit_3dstate_binding_table_pointers(&p.dev, &mut p.cp, HwStage::Hs, 0);

	gpe_gen7::emit_3dstate_te(&p.dev, &mut p.cp);

	gpe_gen7::emit_3dstate_constant_ds(&p.dev, &mut p.cp, &[], &[]);
	gpe_gen7::emit_3dstate_ds(&p.dev, &mut p.cp);
	gpe_gen7::emit_3dstate_binding_table_pointers(&p.dev, &mut p.cp, HwStage::Ds, 0);
}

fn emit_vs(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	let i = Stage::Vs.index();
	let emit_bt = session.binding_table_changed[i];
	let emit_sampler = session.sampler_changed[i];
	let emit_const = session.pcb_changed[i];
	let emit_vs = session.dirty(Dirty::VS | Dirty::SAMPLER_VS) || session.kernel_bo_changed;

	if emit_bt || emit_sampler || emit_const || emit_vs {
		wa_vs_depth_stall(p);
	}
	if emit_bt {
		let bt = p.shadow.get(StateSlot::BindingTable(Stage::Vs));
		gpe_gen7::emit_3dstate_binding_table_pointers(&p.dev, &mut p.cp, HwStage::Vs, bt);
	}
	if emit_sampler {
		let sampler = p.shadow.get(StateSlot::Sampler(Stage::Vs));
		gpe_gen7::emit_3dstate_sampler_state_pointers(&p.dev, &mut p.cp, HwStage::Vs, sampler);
	}
	if emit_const {
		let buf = p.shadow.get(StateSlot::PushConstant(Stage::Vs));
		let size = p.shadow.pcb_size[i];
		gpe_gen7::emit_3dstate_constant_vs(&p.dev, &mut p.cp, &[buf], &[size]);
	}
	if emit_vs {
		let num_samplers = vec.samplers[i].len();
		gpe_gen6::emit_3dstate_vs(&p.dev, &mut p.cp, vec.vs.as_ref(), num_samplers);
	}
}

/// Stream output from the last vertex shader.
fn emit_sol(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	let (shader, dirty_sh) = match vec.gs {
		Some(ref gs) => (Some(gs), session.dirty(Dirty::GS)),
		None => (vec.vs.as_ref(), session.dirty(Dirty::VS)),
	};
	let so_info = shader.and_then(|sh| sh.so_info.as_ref());

	pipeline_gen6::update_max_svbi(p, vec, session);

	let enabled = vec.so.enabled;
	if (session.dirty(Dirty::SO) || dirty_sh || session.batch_bo_changed) && enabled {
		let count = vec.so.targets.len().min(MAX_SO_BUFFERS);
		for i in 0..MAX_SO_BUFFERS {
			let target = if i < count { vec.so.targets[i].as_ref() } else { None };
			let stride = so_info.map_or(0, |info| info.stride[i] * 4);
			gpe_gen7::emit_3dstate_so_buffer(&p.dev, &mut p.cp, i as u32, 0, stride, target);
		}
	}

	if dirty_sh && enabled {
		gpe_gen7::emit_3dstate_so_decl_list(&p.dev, &mut p.cp, so_info);
	}

	if session.dirty(Dirty::SO | Dirty::RASTERIZER) || dirty_sh {
		let buffer_mask = if enabled && so_info.is_some() {
			(1 << vec.so.targets.len().min(MAX_SO_BUFFERS)) - 1
		} else {
			0
		};
		let output_count = shader.map_or(0, |sh| sh.kernel.output_count);
		gpe_gen7::emit_3dstate_streamout(&p.dev, &mut p.cp, buffer_mask, output_count,
			vec.rasterizer.state.rasterizer_discard);
	}
}

fn emit_sf(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	if session.dirty(Dirty::RASTERIZER | Dirty::FS) {
		gpe_gen7::emit_3dstate_sbe(&p.dev, &mut p.cp, Some(&vec.rasterizer), vec.fs.as_ref());
	}
	if session.dirty(Dirty::RASTERIZER | Dirty::FB) {
		wa_cs_stall(p, true, true);
		gpe_gen7::emit_3dstate_sf(&p.dev, &mut p.cp, Some(&vec.rasterizer), vec.fb.zs_format);
	}
}

fn emit_wm(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	let i = Stage::Fs.index();

	if session.dirty(Dirty::FS | Dirty::BLEND | Dirty::DSA | Dirty::RASTERIZER) {
		let cc_may_kill = vec.dsa.dw_alpha != 0 || vec.blend.alpha_to_coverage;
		gpe_gen7::emit_3dstate_wm(&p.dev, &mut p.cp, vec.fs.as_ref(), Some(&vec.rasterizer), cc_may_kill, 0);
	}

	if session.binding_table_changed[i] {
		let bt = p.shadow.get(StateSlot::BindingTable(Stage::Fs));
		gpe_gen7::emit_3dstate_binding_table_pointers(&p.dev, &mut p.cp, HwStage::Ps, bt);
	}
	if session.sampler_changed[i] {
		let sampler = p.shadow.get(StateSlot::Sampler(Stage::Fs));
		gpe_gen7::emit_3dstate_sampler_state_pointers(&p.dev, &mut p.cp, HwStage::Ps, sampler);
	}
	if session.pcb_changed[i] {
		let buf = p.shadow.get(StateSlot::PushConstant(Stage::Fs));
		let size = p.shadow.pcb_size[i];
		gpe_gen7::emit_3dstate_constant_ps(&p.dev, &mut p.cp, &[buf], &[size]);
	}

	let emit_ps = session.dirty(Dirty::FS | Dirty::SAMPLER_FS | Dirty::BLEND);
	if emit_ps || session.kernel_bo_changed {
		if session.hw_ctx_changed {
			wa_ps_max_threads_stall(p);
		}
		let num_samplers = vec.samplers[i].len();
		gpe_gen7::emit_3dstate_ps(&p.dev, &mut p.cp, vec.fs.as_ref(), num_samplers, vec.blend.dual_blend);
	}

	if session.scissor_changed {
		let rect = p.shadow.get(StateSlot::ScissorRect);
		gpe_gen6::emit_3dstate_scissor_state_pointers(&p.dev, &mut p.cp, rect);
	}

	let change_depth_buffer = session.dirty(Dirty::FB | Dirty::DSA) || session.state_bo_changed;
	if emit_ps || change_depth_buffer || session.pcb_changed[i] || session.viewport_changed ||
		session.binding_table_changed[i] || session.sampler_changed[i] ||
		session.cc_changed || session.blend_changed || session.dsa_changed {
		wa_wm_depth_stall(p, change_depth_buffer);
	}

	if session.dirty(Dirty::FB) || session.batch_bo_changed {
		pipeline_gen6::emit_depth_buffers(p, vec);
	}
}

fn emit_primitive(p: &mut Pipeline, vec: &StateVector) {
	gpe_gen7::emit_3dprimitive(&p.dev, &mut p.cp, &vec.draw, &vec.ib, false);
	p.state.has_wa = false;
}

fn emit_commands(p: &mut Pipeline, vec: &StateVector, session: &mut Session) {
	pipeline_gen6::emit_select(p, session);
	pipeline_gen6::emit_sip(p, session);
	pipeline_gen6::emit_vf_statistics(p, session);
	emit_pcb_alloc(p, session);
	pipeline_gen6::emit_base_address(p, vec, session);
	emit_pointers_1(p, session);
	emit_urb(p, vec, session);
	emit_pointers_2(p, session);
	emit_wm_multisample(p, vec, session);
	emit_gs(p, session);
	emit_tessellation(p, session);
	emit_vs(p, vec, session);
	emit_sol(p, vec, session);
	pipeline_gen6::emit_clip(p, vec, session);
	emit_sf(p, vec, session);
	emit_wm(p, vec, session);
	pipeline_gen6::emit_wm_raster(p, vec, session);
	pipeline_gen6::emit_sf_rect(p, vec, session);
	pipeline_gen6::emit_vf(p, vec, session);
	emit_primitive(p, vec);
}

pub(crate) fn emit_draw(p: &mut Pipeline, vec: &StateVector) {
	pipeline_gen6::draw(p, vec, emit_commands);
}

pub(crate) fn emit_rectlist(p: &mut Pipeline, blitter: &Blitter) {
	let states = pipeline_gen6::build_rectlist_states(p, blitter);

	let num_samples = blitter.num_samples;
	wa_cs_stall(p, true, true);
	let positions = p.packed_sample_position(num_samples);
	gpe_gen6::emit_3dstate_multisample(&p.dev, &mut p.cp, num_samples, &positions, true);
	gpe_gen7::emit_3dstate_sample_mask(&p.dev, &mut p.cp, (1 << num_samples) - 1, num_samples);

	pipeline_gen6::emit_rectlist_vf(p, blitter, &states);

	emit_push_constant_alloc(p);
	wa_vs_depth_stall(p);
	emit_urb_for(p, blitter.ve.count() as u32 * 16);

	if blitter.uses.contains(BlitterUses::DSA) {
		gpe_gen7::emit_3dstate_depth_stencil_state_pointers(&p.dev, &mut p.cp, states.dsa);
	}
	if blitter.uses.contains(BlitterUses::CC) {
		gpe_gen7::emit_3dstate_cc_state_pointers(&p.dev, &mut p.cp, states.cc);
	}

	// VS through SF
	gpe_gen7::emit_3dstate_constant_vs(&p.dev, &mut p.cp, &[], &[]);
	gpe_gen6::emit_3dstate_vs(&p.dev, &mut p.cp, None, 0);
	gpe_gen7::emit_3dstate_constant_hs(&p.dev, &mut p.cp, &[], &[]);
	gpe_gen7::emit_3dstate_hs(&p.dev, &mut p.cp);
	gpe_gen7::emit_3dstate_te(&p.dev, &mut p.cp);
	gpe_gen7::emit_3dstate_constant_ds(&p.dev, &mut p.cp, &[], &[]);
	gpe_gen7::emit_3dstate_ds(&p.dev, &mut p.cp);
	gpe_gen7::emit_3dstate_constant_gs(&p.dev, &mut p.cp, &[], &[]);
	gpe_gen7::emit_3dstate_gs(&p.dev, &mut p.cp, None, 0);
	gpe_gen7::emit_3dstate_streamout(&p.dev, &mut p.cp, 0, 0, false);
	gpe_gen6::emit_3dstate_clip(&p.dev, &mut p.cp, None, None, false, 1);
	wa_cs_stall(p, true, true);
	gpe_gen7::emit_3dstate_sf(&p.dev, &mut p.cp, None, blitter.zs_format);
	gpe_gen7::emit_3dstate_sbe(&p.dev, &mut p.cp, None, None);

	let hiz_op = blitter.op.gen7_hiz_op();
	gpe_gen7::emit_3dstate_wm(&p.dev, &mut p.cp, None, None, false, hiz_op);
	gpe_gen7::emit_3dstate_constant_ps(&p.dev, &mut p.cp, &[], &[]);
	wa_ps_max_threads_stall(p);
	gpe_gen7::emit_3dstate_ps(&p.dev, &mut p.cp, None, 0, false);

	if blitter.uses.contains(BlitterUses::VIEWPORT) {
		gpe_gen7::emit_3dstate_viewport_state_pointers_cc(&p.dev, &mut p.cp, states.cc_viewport);
	}

	wa_wm_depth_stall(p, true);
	pipeline_gen6::emit_rectlist_depth_buffers(p, blitter);

	gpe_gen6::emit_3dstate_drawing_rectangle(&p.dev, &mut p.cp, 0, 0, blitter.width, blitter.height);
	gpe_gen7::emit_3dprimitive(&p.dev, &mut p.cp, &blitter.draw, &IndexBuffer::default(), true);
	p.state.has_wa = false;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cp::Cp;
	use crate::dev::DeviceInfo;
	use crate::winsys::SoftWinsys;
	use pretty_assertions::assert_eq;

	fn new_pipeline(dev: &DeviceInfo) -> Pipeline {
		let cp = Cp::new(Box::new(SoftWinsys::new(1 << 30)), 8192).unwrap();
		Pipeline::new(dev, cp).unwrap()
	}

	#[test]
	fn cs_stall_once_per_draw() {
		let mut p = new_pipeline(&DeviceInfo::ivb(1));
		wa_cs_stall(&mut p, true, true);
		wa_cs_stall(&mut p, true, true);
		let words = p.cp().commands();
		assert_eq!(words.len(), 4);
		assert_eq!(words[1], PIPE_CONTROL_CS_STALL | PIPE_CONTROL_DEPTH_CACHE_FLUSH | PIPE_CONTROL_WRITE_IMM);

		wa_ps_max_threads_stall(&mut p);
		assert_eq!(p.cp().used(), 4);
	}

	#[test]
	fn haswell_skips_workarounds() {
		let mut p = new_pipeline(&DeviceInfo::hsw(2));
		wa_cs_stall(&mut p, true, true);
		wa_vs_depth_stall(&mut p);
		wa_wm_depth_stall(&mut p, true);
		wa_ps_max_threads_stall(&mut p);
		assert_eq!(p.cp().used(), 0);
		assert!(!p.state.has_wa);
	}

	#[test]
	fn wm_depth_stall_flushes_for_new_depth_buffer() {
		let mut p = new_pipeline(&DeviceInfo::ivb(1));
		wa_wm_depth_stall(&mut p, false);
		assert_eq!(p.cp().used(), 4);
		wa_wm_depth_stall(&mut p, true);
		let words = p.cp().commands();
		assert_eq!(words.len(), 16);
		assert_eq!(words[9], PIPE_CONTROL_DEPTH_CACHE_FLUSH);
	}

	#[test]
	fn urb_after_push_constants() {
		let ivb = DeviceInfo::ivb(1);
		let mut p = new_pipeline(&ivb);
		emit_urb_for(&mut p, 64);
		// one command per stage
		assert_eq!(p.cp().used(), 4 * 2);
		let words = p.cp().commands();
		assert_eq!(words[1] >> 25, URB_PCB_RESERVED / 8192);
	}
}
