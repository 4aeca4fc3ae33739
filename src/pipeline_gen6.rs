// GEN6 draws, plus the pieces GEN7 shares: indirect state upload, the
// common commands, flushes and queries.

use crate::blitter::{Blitter, BlitterUses};
use crate::cmd::*;
use crate::dev::Gen;
use crate::gpe;
use crate::gpe_gen6::{self, BaseAddress, PIPELINE_SELECT_3D};
use crate::gpe_gen7;
use crate::pipeline::{Pipeline, Query, Session, StateSlot};
use crate::state::*;
use crate::winsys::Bo;

/// Sent before any depth stall or cache flush on GEN6, once per draw.  A
/// CS stall comes first, then a post-sync write unless the caller does one.
pub(crate) fn wa_post_sync(p: &mut Pipeline, caller_post_sync: bool) {
	assert_eq!(p.dev.gen, Gen::Gen6);
	if p.state.has_wa {
		return;
	}
	p.state.has_wa = true;

	gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp,
		PIPE_CONTROL_CS_STALL | PIPE_CONTROL_PIXEL_SCOREBOARD_STALL, None, 0, false);
	if caller_post_sync {
		return;
	}
	let bo = p.workaround_bo;
	gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp, PIPE_CONTROL_WRITE_IMM, Some(bo), 0, false);
}

/// Depth caches are flushed before 3DSTATE_MULTISAMPLE.
fn wa_multisample_flush(p: &mut Pipeline) {
	wa_post_sync(p, false);
	gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp,
		PIPE_CONTROL_DEPTH_CACHE_FLUSH | PIPE_CONTROL_CS_STALL, None, 0, false);
}

/// Stall, flush, stall before the depth buffer commands.
fn wa_depth_flush(p: &mut Pipeline) {
	wa_post_sync(p, false);
	for &dw1 in &[PIPE_CONTROL_DEPTH_STALL, PIPE_CONTROL_DEPTH_CACHE_FLUSH, PIPE_CONTROL_DEPTH_STALL] {
		gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp, dw1, None, 0, false);
	}
}

/// Pixel scoreboard stall before the WM thread count changes.  The
/// post-sync workaround already covers it.
fn wa_max_threads_stall(p: &mut Pipeline) {
	if p.state.has_wa {
		return;
	}
	gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp, PIPE_CONTROL_PIXEL_SCOREBOARD_STALL, None, 0, false);
}

/// Keeps the VS from holding on to 3DSTATE_CONSTANT_VS.
fn wa_vs_const_flush(p: &mut Pipeline) {
	wa_post_sync(p, false);
	gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp,
		PIPE_CONTROL_DEPTH_STALL | PIPE_CONTROL_INSTRUCTION_CACHE_INVALIDATE | PIPE_CONTROL_STATE_CACHE_INVALIDATE,
		None, 0, false);
}

fn post_sync_if_gen6(p: &mut Pipeline) {
	if p.dev.gen == Gen::Gen6 {
		wa_post_sync(p, false);
	}
}

pub(crate) fn emit_select(p: &mut Pipeline, session: &Session) {
	if session.hw_ctx_changed {
		post_sync_if_gen6(p);
		gpe_gen6::emit_pipeline_select(&p.dev, &mut p.cp, PIPELINE_SELECT_3D);
	}
}

pub(crate) fn emit_sip(p: &mut Pipeline, session: &Session) {
	if session.hw_ctx_changed {
		post_sync_if_gen6(p);
		gpe_gen6::emit_state_sip(&p.dev, &mut p.cp, 0);
	}
}

pub(crate) fn emit_vf_statistics(p: &mut Pipeline, session: &Session) {
	if session.hw_ctx_changed {
		gpe_gen6::emit_3dstate_vf_statistics(&p.dev, &mut p.cp, false);
	}
}

/// STATE_BASE_ADDRESS, after which every pointer command is re-emitted.
pub(crate) fn emit_base_address(p: &mut Pipeline, vec: &StateVector, session: &mut Session) {
	if !(session.state_bo_changed || session.kernel_bo_changed || session.batch_bo_changed) {
		return;
	}
	post_sync_if_gen6(p);
	let state_bo = p.cp.bo();
	let base = BaseAddress::new(state_bo, vec.shader_bo.unwrap_or(state_bo));
	gpe_gen6::emit_state_base_address(&p.dev, &mut p.cp, &base);
	session.base_address_changed();
}

/// The guard band is only safe while the viewports cover the framebuffer.
pub(crate) fn emit_clip(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	if !session.dirty(Dirty::RASTERIZER | Dirty::FS | Dirty::VIEWPORT | Dirty::FB) {
		return;
	}
	let fb_width = vec.fb.width as f32;
	let fb_height = vec.fb.height as f32;
	let enable_guardband = vec.viewports.iter().all(|vp| {
		vp.min_x <= 0.0 && vp.max_x >= fb_width && vp.min_y <= 0.0 && vp.max_y >= fb_height
	});
	gpe_gen6::emit_3dstate_clip(&p.dev, &mut p.cp, Some(&vec.rasterizer), vec.fs.as_ref(), enable_guardband, 1);
}

pub(crate) fn emit_wm_raster(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	let rast = &vec.rasterizer.state;
	if session.dirty(Dirty::RASTERIZER | Dirty::POLY_STIPPLE) && rast.poly_stipple_enable {
		post_sync_if_gen6(p);
		gpe_gen6::emit_3dstate_poly_stipple_pattern(&p.dev, &mut p.cp, &vec.poly_stipple);
		gpe_gen6::emit_3dstate_poly_stipple_offset(&p.dev, &mut p.cp, 0, 0);
	}
	if session.dirty(Dirty::RASTERIZER) && rast.line_stipple_enable {
		post_sync_if_gen6(p);
		gpe_gen6::emit_3dstate_line_stipple(&p.dev, &mut p.cp,
			rast.line_stipple_pattern, rast.line_stipple_factor + 1);
	}
	if session.dirty(Dirty::RASTERIZER) && rast.line_smooth {
		post_sync_if_gen6(p);
		gpe_gen6::emit_3dstate_aa_line_parameters(&p.dev, &mut p.cp);
	}
}

pub(crate) fn emit_sf_rect(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	if session.dirty(Dirty::FB) {
		post_sync_if_gen6(p);
		gpe_gen6::emit_3dstate_drawing_rectangle(&p.dev, &mut p.cp, 0, 0, vec.fb.width, vec.fb.height);
	}
}

/// Index buffer, vertex buffers and vertex elements.
pub(crate) fn emit_vf(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	if p.dev.gen >= Gen::Gen75 {
		if session.dirty(Dirty::IB) || session.batch_bo_changed {
			gpe_gen6::emit_3dstate_index_buffer(&p.dev, &mut p.cp, &vec.ib, false);
		}
		if session.primitive_restart_changed {
			gpe_gen7::emit_3dstate_vf(&p.dev, &mut p.cp, vec.draw.primitive_restart, vec.draw.restart_index);
		}
	} else if session.dirty(Dirty::IB) || session.primitive_restart_changed || session.batch_bo_changed {
		gpe_gen6::emit_3dstate_index_buffer(&p.dev, &mut p.cp, &vec.ib, vec.draw.primitive_restart);
	}

	if session.dirty(Dirty::VB | Dirty::VE) || session.batch_bo_changed {
		gpe_gen6::emit_3dstate_vertex_buffers(&p.dev, &mut p.cp, &vec.ve, &vec.vb);
	}

	if session.dirty(Dirty::VE | Dirty::VS) {
		let (edgeflag, prepend_ids) = match vec.vs {
			Some(ref vs) => {
				if vs.kernel.input_edgeflag {
					assert_eq!(vs.kernel.input_count as usize, vec.ve.count(), "edge flag is not the last input");
				}
				(vs.kernel.input_edgeflag, vs.kernel.input_instanceid || vs.kernel.input_vertexid)
			}
			None => (false, false),
		};
		gpe_gen6::emit_3dstate_vertex_elements(&p.dev, &mut p.cp, &vec.ve, edgeflag, prepend_ids);
	}
}

/// Recompute how many vertices fit the bound stream output buffers.
/// Returns whether the limit changed.
pub(crate) fn update_max_svbi(p: &mut Pipeline, vec: &StateVector, session: &Session) -> bool {
	if !session.dirty(Dirty::VS | Dirty::GS | Dirty::SO) {
		return false;
	}

	let mut max_svbi = 0xffffffff;
	if let Some(so_info) = vec.last_vertex_shader().and_then(|sh| sh.so_info.as_ref()) {
		for output in &so_info.outputs {
			let buffer = output.output_buffer as usize;
			let target = match vec.so.targets.get(buffer).and_then(|t| t.as_ref()) {
				Some(target) => target,
				None => {
					max_svbi = 0;
					break;
				}
			};
			let struct_size = so_info.stride[buffer] * 4;
			if struct_size == 0 {
				continue;
			}
			let elem_size = output.num_components * 4;
			let buf_size = target.size.saturating_sub(output.dst_offset * 4);
			let mut count = buf_size / struct_size;
			if buf_size % struct_size >= elem_size {
				count += 1;
			}
			max_svbi = max_svbi.min(count);
		}
	}

	if p.state.so_max_vertices != max_svbi {
		p.state.so_max_vertices = max_svbi;
		true
	} else {
		false
	}
}

fn emit_gs_svbi(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	// a reset index is reprogrammed even when the limit stays
	if !update_max_svbi(p, vec, session) && !session.dirty(Dirty::SO) {
		return;
	}
	wa_post_sync(p, false);
	let (num, max) = (p.state.so_num_vertices, p.state.so_max_vertices);
	gpe_gen6::emit_3dstate_gs_svb_index(&p.dev, &mut p.cp, 0, num, max, false);
	if session.hw_ctx_changed {
		// disabled buffers must not overflow
		for index in 1..4 {
			gpe_gen6::emit_3dstate_gs_svb_index(&p.dev, &mut p.cp, index, 0, 0xffffffff, false);
		}
	}
}

/// VS and GS split the URB, GS half of it while active.
fn emit_urb(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	if !session.dirty(Dirty::VE | Dirty::VS | Dirty::GS) {
		return;
	}
	let vs_so = vec.vs.as_ref().map_or(false, |vs| vs.kernel.vs_gen6_so);
	let gs_active = vec.gs.is_some() || vs_so;

	// VF and VS share VUE handles
	let vs_entries = vec.vs.as_ref().map_or(0, |vs| vs.kernel.output_count).max(vec.ve.count() as u32);
	let gs_entries = match vec.gs {
		Some(ref gs) => gs.kernel.output_count,
		None if gs_active => vs_entries,
		None => 0,
	};

	let (vs_total, gs_total) = if gs_active {
		(p.dev.urb_size / 2, p.dev.urb_size / 2)
	} else {
		(p.dev.urb_size, 0)
	};
	gpe_gen6::emit_3dstate_urb(&p.dev, &mut p.cp, vs_total, gs_total, vs_entries * 16, gs_entries * 16);

	// the VS taking over GS URB space needs a flush in between
	if p.state.gs_active && !gs_active {
		emit_flush(p);
	}
	p.state.gs_active = gs_active;
}

fn emit_pointers_1(p: &mut Pipeline, session: &Session) {
	if session.viewport_changed {
		let clip = p.shadow.get(StateSlot::ClipViewport);
		let sf = p.shadow.get(StateSlot::SfViewport);
		let cc = p.shadow.get(StateSlot::CcViewport);
		gpe_gen6::emit_3dstate_viewport_state_pointers(&p.dev, &mut p.cp, clip, sf, cc);
	}
}

fn emit_pointers_2(p: &mut Pipeline, session: &Session) {
	if session.blend_changed || session.dsa_changed || session.cc_changed {
		let blend = p.shadow.get(StateSlot::Blend);
		let dsa = p.shadow.get(StateSlot::DepthStencil);
		let cc = p.shadow.get(StateSlot::ColorCalc);
		gpe_gen6::emit_3dstate_cc_state_pointers(&p.dev, &mut p.cp, blend, dsa, cc);
	}
	if session.sampler_changed.iter().any(|&c| c) {
		let vs = p.shadow.get(StateSlot::Sampler(Stage::Vs));
		let ps = p.shadow.get(StateSlot::Sampler(Stage::Fs));
		gpe_gen6::emit_3dstate_sampler_state_pointers(&p.dev, &mut p.cp, vs, 0, ps);
	}
}

fn emit_pointers_3(p: &mut Pipeline, session: &Session) {
	if session.scissor_changed {
		let rect = p.shadow.get(StateSlot::ScissorRect);
		gpe_gen6::emit_3dstate_scissor_state_pointers(&p.dev, &mut p.cp, rect);
	}
	if session.binding_table_changed.iter().any(|&c| c) {
		let vs = p.shadow.get(StateSlot::BindingTable(Stage::Vs));
		let gs = p.shadow.get(StateSlot::BindingTable(Stage::Gs));
		let ps = p.shadow.get(StateSlot::BindingTable(Stage::Fs));
		gpe_gen6::emit_3dstate_binding_table_pointers(&p.dev, &mut p.cp, vs, gs, ps);
	}
}

fn emit_wm_multisample(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	if !session.dirty(Dirty::SAMPLE_MASK | Dirty::FB) {
		return;
	}
	let num_samples = vec.fb.num_samples;
	wa_post_sync(p, false);
	wa_multisample_flush(p);

	let positions = p.packed_sample_position(num_samples);
	gpe_gen6::emit_3dstate_multisample(&p.dev, &mut p.cp, num_samples, &positions,
		vec.rasterizer.state.half_pixel_center);
	let mask = if num_samples > 1 { vec.sample_mask } else { 0x1 };
	gpe_gen6::emit_3dstate_sample_mask(&p.dev, &mut p.cp, mask);
}

fn push_constant(p: &Pipeline, stage: Stage) -> ([u32; 1], [u32; 1]) {
	([p.shadow.get(StateSlot::PushConstant(stage))], [p.shadow.pcb_size[stage.index()]])
}

fn emit_vs(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	let emit_vs = session.dirty(Dirty::VS | Dirty::SAMPLER_VS) || session.kernel_bo_changed;
	let emit_const = session.pcb_changed[Stage::Vs.index()];

	if emit_vs {
		wa_post_sync(p, false);
	}
	if emit_const {
		let (bufs, sizes) = push_constant(p, Stage::Vs);
		gpe_gen6::emit_3dstate_constant_vs(&p.dev, &mut p.cp, &bufs, &sizes);
	}
	if emit_vs {
		let num_samplers = vec.samplers[Stage::Vs.index()].len();
		gpe_gen6::emit_3dstate_vs(&p.dev, &mut p.cp, vec.vs.as_ref(), num_samplers);
	}
	if emit_const {
		wa_vs_const_flush(p);
	}
}

fn emit_gs(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	if session.pcb_changed[Stage::Gs.index()] {
		gpe_gen6::emit_3dstate_constant_gs(&p.dev, &mut p.cp, &[], &[]);
	}
	if session.dirty(Dirty::GS | Dirty::VS) || session.prim_changed || session.kernel_bo_changed {
		let verts_per_prim = session.reduced_prim.vertices_per_prim();
		gpe_gen6::emit_3dstate_gs(&p.dev, &mut p.cp, vec.gs.as_ref(), vec.vs.as_ref(), verts_per_prim);
	}
}

fn emit_sf(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	if session.dirty(Dirty::RASTERIZER | Dirty::FS) {
		gpe_gen6::emit_3dstate_sf(&p.dev, &mut p.cp, Some(&vec.rasterizer), vec.fs.as_ref());
	}
}

fn emit_wm(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	if session.pcb_changed[Stage::Fs.index()] {
		let (bufs, sizes) = push_constant(p, Stage::Fs);
		gpe_gen6::emit_3dstate_constant_ps(&p.dev, &mut p.cp, &bufs, &sizes);
	}

	if session.dirty(Dirty::FS | Dirty::SAMPLER_FS | Dirty::BLEND | Dirty::DSA | Dirty::RASTERIZER) ||
		session.kernel_bo_changed {
		let num_samplers = vec.samplers[Stage::Fs.index()].len();
		let cc_may_kill = vec.dsa.dw_alpha != 0 || vec.blend.alpha_to_coverage;
		if session.hw_ctx_changed {
			wa_max_threads_stall(p);
		}
		gpe_gen6::emit_3dstate_wm(&p.dev, &mut p.cp, vec.fs.as_ref(), num_samplers,
			Some(&vec.rasterizer), vec.blend.dual_blend, cc_may_kill, 0);
	}
}

/// Depth, HiZ and stencil buffers with their clear value.
pub(crate) fn emit_depth_buffers(p: &mut Pipeline, vec: &StateVector) {
	let zs = vec.fb.zs_or_null();
	let clear_value = if vec.fb.zs.is_some() { vec.fb.depth_clear_value } else { 0 };

	gpe_gen6::emit_3dstate_depth_buffer(&p.dev, &mut p.cp, zs);
	gpe_gen6::emit_3dstate_hier_depth_buffer(&p.dev, &mut p.cp, zs);
	gpe_gen6::emit_3dstate_stencil_buffer(&p.dev, &mut p.cp, zs);
	if p.dev.gen >= Gen::Gen7 {
		gpe_gen7::emit_3dstate_clear_params(&p.dev, &mut p.cp, clear_value);
	} else {
		gpe_gen6::emit_3dstate_clear_params(&p.dev, &mut p.cp, clear_value);
	}
}

fn emit_wm_depth(p: &mut Pipeline, vec: &StateVector, session: &Session) {
	if session.dirty(Dirty::FB) || session.batch_bo_changed {
		wa_post_sync(p, false);
		wa_depth_flush(p);
		emit_depth_buffers(p, vec);
	}
}

fn emit_primitive(p: &mut Pipeline, vec: &StateVector) {
	gpe_gen6::emit_3dprimitive(&p.dev, &mut p.cp, &vec.draw, &vec.ib, false);
	p.state.has_wa = false;
}

/// Every GEN6 command of a draw, in the order classic i965 emits them.
fn emit_commands(p: &mut Pipeline, vec: &StateVector, session: &mut Session) {
	emit_select(p, session);
	emit_gs_svbi(p, vec, session);
	emit_sip(p, session);
	emit_vf_statistics(p, session);
	emit_base_address(p, vec, session);
	emit_pointers_1(p, session);
	emit_urb(p, vec, session);
	emit_pointers_2(p, session);
	emit_wm_multisample(p, vec, session);
	emit_vs(p, vec, session);
	emit_gs(p, vec, session);
	emit_clip(p, vec, session);
	emit_sf(p, vec, session);
	emit_wm(p, vec, session);
	emit_pointers_3(p, session);
	emit_wm_depth(p, vec, session);
	emit_wm_raster(p, vec, session);
	emit_sf_rect(p, vec, session);
	emit_vf(p, vec, session);
	emit_primitive(p, vec);
}

fn build_viewports(p: &mut Pipeline, vec: &StateVector, session: &mut Session) {
	if !session.dirty(Dirty::VIEWPORT) {
		return;
	}
	if p.dev.gen >= Gen::Gen7 {
		let sf_clip = gpe_gen7::emit_sf_clip_viewport(&p.dev, &mut p.cp, &vec.viewports);
		p.shadow.set(StateSlot::SfClipViewport, sf_clip);
	} else {
		let clip = gpe_gen6::emit_clip_viewport(&p.dev, &mut p.cp, &vec.viewports);
		p.shadow.set(StateSlot::ClipViewport, clip);
		let sf = gpe_gen6::emit_sf_viewport(&p.dev, &mut p.cp, &vec.viewports);
		p.shadow.set(StateSlot::SfViewport, sf);
	}
	let cc = gpe_gen6::emit_cc_viewport(&p.dev, &mut p.cp, &vec.viewports);
	p.shadow.set(StateSlot::CcViewport, cc);
	session.viewport_changed = true;
}

fn build_cc(p: &mut Pipeline, vec: &StateVector, session: &mut Session) {
	if session.dirty(Dirty::BLEND | Dirty::FB | Dirty::DSA) {
		let blend = gpe_gen6::emit_blend_state(&p.dev, &mut p.cp, &vec.blend, &vec.fb, &vec.dsa);
		p.shadow.set(StateSlot::Blend, blend);
		session.blend_changed = true;
	}
	if session.dirty(Dirty::DSA | Dirty::STENCIL_REF | Dirty::BLEND_COLOR) {
		let cc = gpe_gen6::emit_color_calc_state(&p.dev, &mut p.cp, &vec.stencil_ref,
			vec.dsa.alpha_ref, &vec.blend_color);
		p.shadow.set(StateSlot::ColorCalc, cc);
		session.cc_changed = true;
	}
	if session.dirty(Dirty::DSA) {
		let dsa = gpe_gen6::emit_depth_stencil_state(&p.dev, &mut p.cp, &vec.dsa);
		p.shadow.set(StateSlot::DepthStencil, dsa);
		session.dsa_changed = true;
	}
}

fn build_scissors(p: &mut Pipeline, vec: &StateVector, session: &mut Session) {
	if session.dirty(Dirty::SCISSOR | Dirty::VIEWPORT) {
		// one scissor per viewport
		let rect = gpe_gen6::emit_scissor_rect(&p.dev, &mut p.cp, &vec.scissor, vec.viewports.len());
		p.shadow.set(StateSlot::ScissorRect, rect);
		session.scissor_changed = true;
	}
}

/// Copy the first `size` bytes of `user_buffer` into `dst`, zero-padded.
fn fill_constants(dst: &mut [u32], user_buffer: &[u32], size: u32) {
	let len = size as usize / 4;
	for (i, d) in dst[..len].iter_mut().enumerate() {
		*d = user_buffer.get(i).cloned().unwrap_or(0);
	}
}

fn build_pcb(p: &mut Pipeline, vec: &StateVector, session: &mut Session, stage: Stage) {
	let dirty = match stage {
		Stage::Vs => Dirty::VS | Dirty::CBUF | Dirty::CLIP,
		Stage::Gs => return,
		Stage::Fs => Dirty::FS | Dirty::CBUF,
	};
	if !session.dirty(dirty) {
		return;
	}

	let i = stage.index();
	let total = gpe::push_constant_size(vec, stage);
	if total == 0 {
		p.shadow.set(StateSlot::PushConstant(stage), 0);
		if p.shadow.pcb_size[i] != 0 {
			p.shadow.pcb_size[i] = 0;
			session.pcb_changed[i] = true;
		}
		return;
	}

	let shader = match vec.shader(stage) {
		Some(shader) => shader,
		None => return,
	};
	let cbuf0_size = shader.kernel.pcb_cbuf0_size;
	let ucp_size = if stage == Stage::Vs { shader.kernel.vs_pcb_ucp_size } else { 0 };
	let user_buffer: &[u32] = vec.cbuf[i].cso.get(0).map_or(&[], |cbuf| &cbuf.user_buffer);

	let (offset, pcb) = gpe_gen6::emit_push_constant_buffer(&p.dev, &mut p.cp, total);
	fill_constants(pcb, user_buffer, cbuf0_size);
	if ucp_size > 0 {
		let planes: Vec<u32> = vec.clip.iter().flat_map(|plane| plane.iter().map(|f| f.to_bits())).collect();
		let start = cbuf0_size as usize / 4;
		fill_constants(&mut pcb[start..], &planes, ucp_size);
	}

	p.shadow.set(StateSlot::PushConstant(stage), offset);
	p.shadow.pcb_size[i] = total;
	session.pcb_changed[i] = true;
}

fn build_rt_surfaces(p: &mut Pipeline, vec: &StateVector, session: &mut Session) {
	if !session.dirty(Dirty::FB) {
		return;
	}
	let fs = Stage::Fs.index();
	let mut count = 0;
	for (i, cbuf) in vec.fb.cbufs.iter().enumerate() {
		let surface = cbuf.as_ref().map_or(&vec.fb.null_rt, |rt| &rt.surface);
		p.shadow.surfaces[fs][WM_DRAW_SURFACE_BASE + i] = gpe_gen6::emit_surface_state(&p.dev, &mut p.cp, surface, true);
		count += 1;
	}
	// always at least one render target
	if count == 0 {
		p.shadow.surfaces[fs][WM_DRAW_SURFACE_BASE] = gpe_gen6::emit_surface_state(&p.dev, &mut p.cp, &vec.fb.null_rt, true);
		count = 1;
	}
	for s in &mut p.shadow.surfaces[fs][WM_DRAW_SURFACE_BASE + count..WM_DRAW_SURFACE_BASE + MAX_DRAW_BUFFERS] {
		*s = 0;
	}
	session.binding_table_changed[fs] = true;
}

/// GEN6 streams out from the GS, through its binding table.
fn build_so_surfaces(p: &mut Pipeline, vec: &StateVector, session: &mut Session) {
	if p.dev.gen != Gen::Gen6 || !session.dirty(Dirty::VS | Dirty::GS | Dirty::SO) {
		return;
	}
	let gs = Stage::Gs.index();
	let mut count = 0;
	if let Some(so_info) = vec.last_vertex_shader().and_then(|sh| sh.so_info.as_ref()) {
		for (i, output) in so_info.outputs.iter().enumerate() {
			let target = vec.so.targets.get(output.output_buffer as usize).and_then(|t| t.as_ref());
			p.shadow.surfaces[gs][GS_SO_SURFACE_BASE + i] = match target {
				Some(target) => gpe_gen6::emit_so_surface_state(&p.dev, &mut p.cp, target, so_info, i),
				None => 0,
			};
			count += 1;
		}
	}
	for s in &mut p.shadow.surfaces[gs][GS_SO_SURFACE_BASE + count..GS_SO_SURFACE_BASE + MAX_SO_BINDINGS] {
		*s = 0;
	}
	session.binding_table_changed[gs] = true;
}

fn build_view_surfaces(p: &mut Pipeline, vec: &StateVector, session: &mut Session, stage: Stage) {
	let base = match stage {
		Stage::Vs => VS_TEXTURE_SURFACE_BASE,
		Stage::Gs => return,
		Stage::Fs => WM_TEXTURE_SURFACE_BASE,
	};
	if !session.dirty(stage.view_dirty()) {
		return;
	}
	let i = stage.index();
	let views = &vec.views[i];
	for (j, view) in views.iter().enumerate() {
		p.shadow.surfaces[i][base + j] = match *view {
			Some(ref view) => gpe_gen6::emit_surface_state(&p.dev, &mut p.cp, &view.surface, false),
			None => 0,
		};
	}
	for s in &mut p.shadow.surfaces[i][base + views.len()..base + MAX_SAMPLER_VIEWS] {
		*s = 0;
	}
	session.binding_table_changed[i] = true;
}

fn build_const_surfaces(p: &mut Pipeline, vec: &StateVector, session: &mut Session, stage: Stage) {
	let base = match stage {
		Stage::Vs => VS_CONST_SURFACE_BASE,
		Stage::Gs => return,
		Stage::Fs => WM_CONST_SURFACE_BASE,
	};
	if !session.dirty(Dirty::CBUF) {
		return;
	}
	let i = stage.index();
	let cbuf = &vec.cbuf[i];

	// a lone user buffer 0 is pushed instead
	let pushed = cbuf.enabled_mask == 0x1 && cbuf.cso.get(0).map_or(true, |c| c.resource.is_none());
	let count = if pushed { 0 } else { (32 - cbuf.enabled_mask.leading_zeros()) as usize };
	for j in 0..count {
		let surface = cbuf.cso.get(j).filter(|c| c.resource.is_some()).and_then(|c| c.surface.as_ref());
		p.shadow.surfaces[i][base + j] = match surface {
			Some(surface) => gpe_gen6::emit_surface_state(&p.dev, &mut p.cp, surface, false),
			None => 0,
		};
	}
	for s in &mut p.shadow.surfaces[i][base + count..base + MAX_CONST_BUFFERS] {
		*s = 0;
	}
	if !pushed {
		session.binding_table_changed[i] = true;
	}
}

fn build_samplers(p: &mut Pipeline, vec: &StateVector, session: &mut Session, stage: Stage) {
	if stage == Stage::Gs || !session.dirty(stage.sampler_dirty() | stage.view_dirty()) {
		return;
	}
	let i = stage.index();
	let samplers = &vec.samplers[i];
	let views = &vec.views[i];

	if session.dirty(stage.sampler_dirty()) || p.shadow.border_colors[i].len() < samplers.len() {
		let mut border_colors = Vec::with_capacity(samplers.len());
		for sampler in samplers {
			border_colors.push(match *sampler {
				Some(ref sampler) => gpe_gen6::emit_sampler_border_color_state(&p.dev, &mut p.cp, sampler),
				None => 0,
			});
		}
		p.shadow.border_colors[i] = border_colors;
	}

	let count = samplers.len().min(views.len());
	let offset = gpe_gen6::emit_sampler_state(&p.dev, &mut p.cp, &samplers[..count], &views[..count],
		&p.shadow.border_colors[i]);
	p.shadow.set(StateSlot::Sampler(stage), offset);
	session.sampler_changed[i] = true;
}

/// Must run after every SURFACE_STATE of the draw is written.
fn build_binding_table(p: &mut Pipeline, vec: &StateVector, session: &mut Session, stage: Stage) {
	let i = stage.index();
	if !session.binding_table_changed[i] {
		return;
	}
	let (num_surfaces, table_len) = gpe::binding_table_layout(p.dev.gen, vec, stage);
	session.num_surfaces[i] = num_surfaces;
	let table_len = if num_surfaces > 0 { table_len } else { 0 };

	let offset = gpe_gen6::emit_binding_table_state(&p.dev, &mut p.cp, &p.shadow.surfaces[i][..table_len]);
	p.shadow.set(StateSlot::BindingTable(stage), offset);
	p.shadow.binding_table_size[i] = table_len;
}

/// Upload the indirect state of a draw.  SURFACE_STATEs go out together to
/// keep the padding between them small.
fn build_states(p: &mut Pipeline, vec: &StateVector, session: &mut Session) {
	build_viewports(p, vec, session);
	build_cc(p, vec, session);
	build_scissors(p, vec, session);
	for &stage in &Stage::ALL {
		build_pcb(p, vec, session, stage);
	}

	build_rt_surfaces(p, vec, session);
	build_so_surfaces(p, vec, session);
	for &stage in &Stage::ALL {
		build_view_surfaces(p, vec, session, stage);
		build_const_surfaces(p, vec, session, stage);
	}

	for &stage in &Stage::ALL {
		build_samplers(p, vec, session, stage);
		build_binding_table(p, vec, session, stage);
	}
}

/// States then commands, each re-emitted in full when the buffer they
/// live in changed.
pub(crate) fn draw<F>(p: &mut Pipeline, vec: &StateVector, emit_commands: F)
	where F: FnOnce(&mut Pipeline, &StateVector, &mut Session) {
	let mut session = Session::new(p, vec);
	if vec.dirty.contains(Dirty::SO) && vec.so.resets_offsets() {
		p.state.so_num_vertices = 0;
	}

	session.dirty = if session.state_bo_changed { Dirty::all() } else { vec.dirty };
	build_states(p, vec, &mut session);

	session.dirty = if session.hw_ctx_changed { Dirty::all() } else { vec.dirty };
	emit_commands(p, vec, &mut session);

	p.state.reduced_prim = Some(session.reduced_prim);
	p.state.primitive_restart = vec.draw.primitive_restart;
	p.state.kernel_bo = vec.shader_bo;
	if vec.so.enabled {
		count_so_vertices(p, vec);
	}
}

/// Advance the stream output index by the primitives that fit the bound
/// buffers.  Returns the generated and the written primitive counts.
pub(crate) fn count_so_vertices(p: &mut Pipeline, vec: &StateVector) -> (u32, u32) {
	let draw = &vec.draw;
	let verts_per_prim = draw.mode.vertices_per_prim();
	let generated = draw.mode.reduced_prims_for_vertices(draw.count).saturating_mul(draw.instance_count);
	let max_emit = p.state.so_max_vertices.saturating_sub(p.state.so_num_vertices) / verts_per_prim;
	let emitted = generated.min(max_emit);
	p.state.so_num_vertices += emitted * verts_per_prim;
	(generated, emitted)
}

pub(crate) fn emit_draw(p: &mut Pipeline, vec: &StateVector) {
	draw(p, vec, emit_commands);
}

/// Flush the render and depth caches, invalidate the read-only ones.
pub(crate) fn emit_flush(p: &mut Pipeline) {
	post_sync_if_gen6(p);
	gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp,
		PIPE_CONTROL_INSTRUCTION_CACHE_INVALIDATE |
		PIPE_CONTROL_RENDER_CACHE_FLUSH |
		PIPE_CONTROL_DEPTH_CACHE_FLUSH |
		PIPE_CONTROL_VF_CACHE_INVALIDATE |
		PIPE_CONTROL_TEXTURE_CACHE_INVALIDATE |
		PIPE_CONTROL_CS_STALL,
		None, 0, false);
}

/// Counters of a statistics write, 0 for the qwords written as zero.
fn statistics_regs(gen: Gen) -> [u32; 11] {
	let gen7 = gen >= Gen::Gen7;
	[
		REG_IA_VERTICES_COUNT,
		REG_IA_PRIMITIVES_COUNT,
		REG_VS_INVOCATION_COUNT,
		REG_GS_INVOCATION_COUNT,
		REG_GS_PRIMITIVES_COUNT,
		REG_CL_INVOCATION_COUNT,
		REG_CL_PRIMITIVES_COUNT,
		REG_PS_INVOCATION_COUNT,
		if gen7 { REG_HS_INVOCATION_COUNT } else { 0 },
		if gen7 { REG_DS_INVOCATION_COUNT } else { 0 },
		0,
	]
}

pub(crate) fn emit_query(p: &mut Pipeline, query: Query, bo: Bo, offset: u32) {
	match query {
		Query::DepthCount => {
			post_sync_if_gen6(p);
			gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp,
				PIPE_CONTROL_DEPTH_STALL | PIPE_CONTROL_WRITE_PS_DEPTH_COUNT, Some(bo), offset, true);
		}
		Query::Timestamp => {
			if p.dev.gen == Gen::Gen6 {
				wa_post_sync(p, true);
			}
			gpe_gen6::emit_pipe_control(&p.dev, &mut p.cp, PIPE_CONTROL_WRITE_TIMESTAMP, Some(bo), offset, true);
		}
		Query::Statistics => {
			emit_flush(p);
			let mut offset = offset;
			for &reg in statistics_regs(p.dev.gen).iter() {
				if reg != 0 {
					gpe_gen6::emit_mi_store_register_mem(&p.dev, &mut p.cp, bo, offset, reg);
					gpe_gen6::emit_mi_store_register_mem(&p.dev, &mut p.cp, bo, offset + 4, reg + 4);
				} else {
					gpe_gen6::emit_mi_store_data_imm(&p.dev, &mut p.cp, bo, offset, 0, true);
				}
				offset += 8;
			}
		}
	}
}

/// Indirect state of a rectlist, kept apart from the draw shadow.
pub(crate) struct RectlistStates {
	pub dsa: u32,
	pub cc: u32,
	pub cc_viewport: u32,
	pub vb_begin: u32,
	pub vb_end: u32,
}

pub(crate) fn build_rectlist_states(p: &mut Pipeline, blitter: &Blitter) -> RectlistStates {
	let mut states = RectlistStates { dsa: 0, cc: 0, cc_viewport: 0, vb_begin: 0, vb_end: 0 };
	if blitter.uses.contains(BlitterUses::DSA) {
		states.dsa = gpe_gen6::emit_depth_stencil_state(&p.dev, &mut p.cp, &blitter.dsa);
	}
	if blitter.uses.contains(BlitterUses::CC) {
		states.cc = gpe_gen6::emit_color_calc_state(&p.dev, &mut p.cp, &blitter.stencil_ref,
			blitter.alpha_ref, &blitter.blend_color);
	}
	if blitter.uses.contains(BlitterUses::VIEWPORT) {
		states.cc_viewport = gpe_gen6::emit_cc_viewport(&p.dev, &mut p.cp, std::slice::from_ref(&blitter.viewport));
	}

	let vertices = blitter.vertex_words();
	states.vb_begin = gpe_gen6::emit_user_vertex_buffer(&p.dev, &mut p.cp, &vertices);
	states.vb_end = states.vb_begin + vertices.len() as u32 * 4 - 1;
	states
}

/// Vertex buffer and elements of a rectlist.
pub(crate) fn emit_rectlist_vf(p: &mut Pipeline, blitter: &Blitter, states: &RectlistStates) {
	let state_bo = p.cp.bo();
	gpe_gen6::emit_state_base_address(&p.dev, &mut p.cp, &BaseAddress::new(state_bo, state_bo));
	gpe_gen6::emit_user_vertex_buffers(&p.dev, &mut p.cp, states.vb_begin, states.vb_end, Blitter::VERTEX_STRIDE);
	gpe_gen6::emit_3dstate_vertex_elements(&p.dev, &mut p.cp, &blitter.ve, false, false);
}

/// Depth buffers of a rectlist, as far as the operation touches them.
pub(crate) fn emit_rectlist_depth_buffers(p: &mut Pipeline, blitter: &Blitter) {
	let zs = &blitter.zs;
	if blitter.uses.intersects(BlitterUses::FB_DEPTH | BlitterUses::FB_STENCIL) {
		gpe_gen6::emit_3dstate_depth_buffer(&p.dev, &mut p.cp, zs);
	}
	if blitter.uses.contains(BlitterUses::FB_DEPTH) {
		gpe_gen6::emit_3dstate_hier_depth_buffer(&p.dev, &mut p.cp, zs);
	}
	if blitter.uses.contains(BlitterUses::FB_STENCIL) {
		gpe_gen6::emit_3dstate_stencil_buffer(&p.dev, &mut p.cp, zs);
	}
	if p.dev.gen >= Gen::Gen7 {
		gpe_gen7::emit_3dstate_clear_params(&p.dev, &mut p.cp, blitter.depth_clear_value);
	} else {
		gpe_gen6::emit_3dstate_clear_params(&p.dev, &mut p.cp, blitter.depth_clear_value);
	}
}

/// A HiZ operation on a rectangle, with every stage but WM disabled.
pub(crate) fn emit_rectlist(p: &mut Pipeline, blitter: &Blitter) {
	let states = build_rectlist_states(p, blitter);

	wa_post_sync(p, false);

	let num_samples = blitter.num_samples;
	wa_multisample_flush(p);
	let positions = p.packed_sample_position(num_samples);
	gpe_gen6::emit_3dstate_multisample(&p.dev, &mut p.cp, num_samples, &positions, true);
	gpe_gen6::emit_3dstate_sample_mask(&p.dev, &mut p.cp, (1 << num_samples) - 1);

	emit_rectlist_vf(p, blitter, &states);

	let urb_size = p.dev.urb_size;
	gpe_gen6::emit_3dstate_urb(&p.dev, &mut p.cp, urb_size, 0, blitter.ve.count() as u32 * 16, 0);
	if p.state.gs_active {
		emit_flush(p);
		p.state.gs_active = false;
	}

	if blitter.uses.intersects(BlitterUses::DSA | BlitterUses::CC) {
		gpe_gen6::emit_3dstate_cc_state_pointers(&p.dev, &mut p.cp, 0, states.dsa, states.cc);
	}

	// VS through SF
	gpe_gen6::emit_3dstate_constant_vs(&p.dev, &mut p.cp, &[], &[]);
	gpe_gen6::emit_3dstate_vs(&p.dev, &mut p.cp, None, 0);
	wa_vs_const_flush(p);
	gpe_gen6::emit_3dstate_constant_gs(&p.dev, &mut p.cp, &[], &[]);
	gpe_gen6::emit_3dstate_gs(&p.dev, &mut p.cp, None, None, 0);
	gpe_gen6::emit_3dstate_clip(&p.dev, &mut p.cp, None, None, false, 1);
	gpe_gen6::emit_3dstate_sf(&p.dev, &mut p.cp, None, None);

	gpe_gen6::emit_3dstate_constant_ps(&p.dev, &mut p.cp, &[], &[]);
	wa_max_threads_stall(p);
	let hiz_op = blitter.op.gen6_hiz_op();
	gpe_gen6::emit_3dstate_wm(&p.dev, &mut p.cp, None, 0, None, false, false, hiz_op);

	if blitter.uses.contains(BlitterUses::VIEWPORT) {
		gpe_gen6::emit_3dstate_viewport_state_pointers(&p.dev, &mut p.cp, 0, 0, states.cc_viewport);
	}

	wa_depth_flush(p);
	emit_rectlist_depth_buffers(p, blitter);

	gpe_gen6::emit_3dstate_drawing_rectangle(&p.dev, &mut p.cp, 0, 0, blitter.width, blitter.height);
	gpe_gen6::emit_3dprimitive(&p.dev, &mut p.cp, &blitter.draw, &IndexBuffer::default(), true);
	p.state.has_wa = false;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cp::Cp;
	use crate::dev::DeviceInfo;
	use crate::winsys::SoftWinsys;
	use pretty_assertions::assert_eq;

	fn new_pipeline() -> Pipeline {
		let cp = Cp::new(Box::new(SoftWinsys::new(1 << 30)), 8192).unwrap();
		Pipeline::new(&DeviceInfo::snb(2), cp).unwrap()
	}

	fn opcodes(p: &Pipeline) -> Vec<u32> {
		let mut ops = Vec::new();
		let words = p.cp().commands();
		let mut pos = 0;
		while pos < words.len() {
			let header = words[pos];
			ops.push(header >> 16);
			pos += (header & 0xff) as usize + 2;
		}
		ops
	}

	#[test]
	fn post_sync_once_per_draw() {
		let mut p = new_pipeline();
		wa_post_sync(&mut p, false);
		wa_post_sync(&mut p, false);
		assert_eq!(p.cp().used(), 8);
		assert_eq!(p.cp().relocs().len(), 1);
		assert_eq!(p.cp().relocs()[0].bo, p.workaround_bo);

		// the scoreboard stall is implied now
		wa_max_threads_stall(&mut p);
		assert_eq!(p.cp().used(), 8);
	}

	#[test]
	fn depth_flush_sequence() {
		let mut p = new_pipeline();
		p.state.has_wa = true;
		wa_depth_flush(&mut p);
		let words = p.cp().commands();
		assert_eq!(words.len(), 12);
		assert_eq!(words[1], PIPE_CONTROL_DEPTH_STALL);
		assert_eq!(words[5], PIPE_CONTROL_DEPTH_CACHE_FLUSH);
		assert_eq!(words[9], PIPE_CONTROL_DEPTH_STALL);
	}

	#[test]
	fn timestamp_skips_post_sync_write() {
		let mut p = new_pipeline();
		let bo = Bo { handle: 99, size: 4096 };
		emit_query(&mut p, Query::Timestamp, bo, 16);
		// CS stall, then the timestamp write
		assert_eq!(p.cp().used(), 4 + 5);
		assert_eq!(opcodes(&p), vec![0x7a00, 0x7a00]);
		assert_eq!(p.cp().relocs().len(), 1);
	}

	#[test]
	fn statistics_write_zero_for_missing_counters() {
		let mut p = new_pipeline();
		let bo = Bo { handle: 99, size: 4096 };
		p.state.has_wa = true;
		emit_query(&mut p, Query::Statistics, bo, 88);
		// flush, 8 counters stored as two halves, 3 zeroed qwords
		assert_eq!(p.cp().used(), 4 + 8 * 2 * 3 + 3 * 5);
		let last = p.cp().relocs().last().unwrap();
		assert_eq!(last.delta, 88 + 10 * 8);
	}

	#[test]
	fn svbi_limit_from_so_targets() {
		let mut p = new_pipeline();
		let snb = DeviceInfo::snb(2);
		let mut vec = StateVector::new(&snb);
		let session = Session::new(&p, &vec);
		assert!(update_max_svbi(&mut p, &vec, &session));
		assert_eq!(p.state.so_max_vertices, 0xffffffff);
		assert!(!update_max_svbi(&mut p, &vec, &session));

		vec.dirty = Dirty::empty();
		p.state.so_max_vertices = 7;
		let session = Session::new(&p, &vec);
		let session = Session { dirty: Dirty::empty(), ..session };
		assert!(!update_max_svbi(&mut p, &vec, &session));
		assert_eq!(p.state.so_max_vertices, 7);
	}

	#[test]
	fn so_vertices_stop_at_the_limit() {
		let mut p = new_pipeline();
		let mut vec = StateVector::new(&DeviceInfo::snb(2));
		vec.set_draw(DrawInfo { mode: PrimType::Lines, count: 9, instance_count: 2, ..DrawInfo::default() });
		p.state.so_max_vertices = 13;
		p.state.so_num_vertices = 2;
		assert_eq!(count_so_vertices(&mut p, &vec), (8, 5));
		assert_eq!(p.state.so_num_vertices, 12);
		assert_eq!(count_so_vertices(&mut p, &vec), (8, 0));
		assert_eq!(p.state.so_num_vertices, 12);
	}
}
