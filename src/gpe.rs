// Size estimates of everything the encoders in gpe_gen6 and gpe_gen7
// write, used to flush before a draw instead of running out of space in
// the middle of one.

use crate::dev::{DeviceInfo, Gen};
use crate::state::*;

/// Hardware commands, by the size class they fall in.  Variable-length
/// commands take their element count as argument to `command_size`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
	StateBaseAddress,
	StateSip,
	PipelineSelect,
	VfStatistics,
	BindingTablePointers,
	SamplerStatePointers,
	ViewportStatePointers,
	CcStatePointers,
	ScissorStatePointers,
	/// The GEN7 single-pointer commands.
	Pointers,
	Urb,
	PushConstantAlloc,
	VertexBuffers,
	VertexElements,
	IndexBuffer,
	Vf,
	Vs,
	Gs,
	Hs,
	Te,
	Ds,
	Clip,
	Sf,
	Sbe,
	Wm,
	Ps,
	Constant,
	SampleMask,
	DrawingRectangle,
	DepthBuffer,
	StencilBuffer,
	HierDepthBuffer,
	ClearParams,
	PolyStippleOffset,
	PolyStipplePattern,
	LineStipple,
	AaLineParameters,
	GsSvbIndex,
	Multisample,
	Streamout,
	SoDeclList,
	SoBuffer,
	PipeControl,
	Primitive,
	MiStoreDataImm,
	MiLoadRegisterImm,
	MiStoreRegisterMem,
}

/// Indirect state blocks.  `state_size` takes the number of elements
/// (viewports, render targets, samplers, binding table entries or push
/// constant bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
	SfViewport,
	ClipViewport,
	CcViewport,
	SfClipViewport,
	ColorCalc,
	Blend,
	DepthStencil,
	ScissorRect,
	BindingTable,
	Surface,
	Sampler,
	SamplerBorderColor,
	PushConstantBuffer,
}

impl State {
	/// Alignment of the block in the batch, in words.
	pub fn alignment(self) -> usize {
		match self {
			State::SfClipViewport | State::ColorCalc | State::Blend | State::DepthStencil => 16,
			_ => 8,
		}
	}
}

/// What the pipeline is about to emit.
#[derive(Clone, Copy)]
pub enum Action<'a> {
	Draw(&'a StateVector),
	Flush,
	WriteTimestamp,
	WriteDepthCount,
	WriteStatistics,
	Rectlist,
}

/// Words of a rectlist: its indirect states plus its commands.
const RECTLIST_SIZE: usize = 64 + 256;

/// PIPE_CONTROLs a draw may need for workarounds on either generation.
const MAX_DRAW_PIPE_CONTROLS: usize = 8;

/// Per-generation sizes.  Every size is an upper bound of what the
/// matching encoder writes.
pub trait Gpe {
	fn gen(&self) -> Gen;

	fn command_size(&self, cmd: Command, count: usize) -> usize;

	fn state_size(&self, state: State, count: usize) -> usize;

	/// Command words of a draw with every piece of state changed.
	fn max_draw_command_size(&self) -> usize;

	/// PIPE_CONTROLs of a flush.
	fn flush_pipe_controls(&self) -> usize;

	/// PIPE_CONTROLs of a timestamp or depth count write.
	fn query_pipe_controls(&self, action: &Action) -> usize;

	/// Counter registers and padding qwords of a statistics write.
	fn statistics_layout(&self) -> (usize, usize);
}

pub struct Gen6Gpe;

pub struct Gen7Gpe {
	gen: Gen,
}

static GEN6: Gen6Gpe = Gen6Gpe;
static GEN7: Gen7Gpe = Gen7Gpe { gen: Gen::Gen7 };
static GEN75: Gen7Gpe = Gen7Gpe { gen: Gen::Gen75 };

/// The size tables of `dev`.
pub fn for_device(dev: &DeviceInfo) -> &'static dyn Gpe {
	match dev.gen {
		Gen::Gen6 => &GEN6,
		Gen::Gen7 => &GEN7,
		Gen::Gen75 => &GEN75,
	}
}

pub fn command_size(dev: &DeviceInfo, cmd: Command, count: usize) -> usize {
	for_device(dev).command_size(cmd, count)
}

pub fn state_size(dev: &DeviceInfo, state: State, count: usize) -> usize {
	for_device(dev).state_size(state, count)
}

impl Gpe for Gen6Gpe {
	fn gen(&self) -> Gen {
		Gen::Gen6
	}

	fn command_size(&self, cmd: Command, count: usize) -> usize {
		use self::Command::*;
		match cmd {
			StateBaseAddress => 10,
			StateSip => 2,
			PipelineSelect => 1,
			VfStatistics => 1,
			BindingTablePointers => 4,
			SamplerStatePointers => 4,
			ViewportStatePointers => 4,
			CcStatePointers => 4,
			ScissorStatePointers => 2,
			Urb => 3,
			VertexBuffers => 1 + 4 * count,
			VertexElements => 1 + 2 * count.max(1),
			IndexBuffer => 3,
			Vs => 6,
			Gs => 7,
			Clip => 4,
			Sf => 20,
			Wm => 9,
			Constant => 5,
			SampleMask => 2,
			DrawingRectangle => 4,
			DepthBuffer => 7,
			StencilBuffer => 3,
			HierDepthBuffer => 3,
			ClearParams => 2,
			PolyStippleOffset => 2,
			PolyStipplePattern => 33,
			LineStipple => 3,
			AaLineParameters => 3,
			GsSvbIndex => 4,
			Multisample => 3,
			PipeControl => 5,
			Primitive => 6,
			MiStoreDataImm => 5,
			MiLoadRegisterImm => 3,
			MiStoreRegisterMem => 3,
			Pointers | PushConstantAlloc | Vf | Hs | Te | Ds | Sbe | Ps | Streamout | SoDeclList | SoBuffer =>
				panic!("{:?} does not exist on GEN6", cmd),
		}
	}

	fn state_size(&self, state: State, count: usize) -> usize {
		use self::State::*;
		match state {
			SfViewport => 8 * count,
			ClipViewport => 4 * count,
			CcViewport => 2 * count,
			SfClipViewport => panic!("SF_CLIP_VIEWPORT does not exist on GEN6"),
			ColorCalc => 6,
			Blend => 2 * count.max(1),
			DepthStencil => 3,
			ScissorRect => 2 * count,
			BindingTable => count,
			Surface => 6,
			Sampler => 4 * count,
			SamplerBorderColor => 12,
			PushConstantBuffer => ((count + 31) & !31) / 4,
		}
	}

	fn max_draw_command_size(&self) -> usize {
		use self::Command::*;
		let mut size = self.command_size(Constant, 0) * 3 +
			self.command_size(GsSvbIndex, 0) * 4 +
			self.command_size(PipeControl, 0) * MAX_DRAW_PIPE_CONTROLS;

		for &cmd in &[
			StateBaseAddress, StateSip, VfStatistics, PipelineSelect,
			BindingTablePointers, SamplerStatePointers, Urb, IndexBuffer,
			ViewportStatePointers, CcStatePointers, ScissorStatePointers,
			Vs, Gs, Clip, Sf, Wm, SampleMask, DrawingRectangle, DepthBuffer,
			PolyStippleOffset, PolyStipplePattern, LineStipple, AaLineParameters,
			Multisample, StencilBuffer, HierDepthBuffer, ClearParams, Primitive,
		] {
			size += self.command_size(cmd, 0);
		}
		size += self.command_size(VertexBuffers, MAX_VERTEX_BUFFERS);
		size += self.command_size(VertexElements, MAX_VERTEX_BUFFERS + 1);
		size
	}

	fn flush_pipe_controls(&self) -> usize {
		// the post-sync workaround comes first
		3
	}

	fn query_pipe_controls(&self, action: &Action) -> usize {
		match *action {
			Action::WriteTimestamp => 2,
			Action::WriteDepthCount => 3,
			_ => 0,
		}
	}

	fn statistics_layout(&self) -> (usize, usize) {
		(8, 3)
	}
}

impl Gpe for Gen7Gpe {
	fn gen(&self) -> Gen {
		self.gen
	}

	fn command_size(&self, cmd: Command, count: usize) -> usize {
		use self::Command::*;
		match cmd {
			Pointers => 2,
			CcStatePointers => 2,
			Urb => 2,
			PushConstantAlloc => 2,
			Vf => 2,
			Hs => 7,
			Te => 4,
			Ds => 6,
			Sf => 7,
			Sbe => 14,
			Wm => 3,
			Ps => 8,
			Constant => 7,
			ClearParams => 3,
			Multisample => 4,
			Streamout => 3,
			SoDeclList => 3 + 2 * 128,
			SoBuffer => 4,
			Primitive => 7,
			BindingTablePointers | SamplerStatePointers | ViewportStatePointers | GsSvbIndex =>
				panic!("{:?} does not exist on GEN7", cmd),
			_ => GEN6.command_size(cmd, count),
		}
	}

	fn state_size(&self, state: State, count: usize) -> usize {
		use self::State::*;
		match state {
			SfClipViewport => 16 * count,
			SfViewport | ClipViewport => panic!("{:?} does not exist on GEN7", state),
			Surface => 8,
			SamplerBorderColor => 4,
			_ => GEN6.state_size(state, count),
		}
	}

	fn max_draw_command_size(&self) -> usize {
		use self::Command::*;
		let mut size = self.command_size(Urb, 0) * 4 +
			self.command_size(PushConstantAlloc, 0) * 5 +
			self.command_size(Constant, 0) * 5 +
			self.command_size(Pointers, 0) * 14 +
			self.command_size(SoBuffer, 0) * 4 +
			self.command_size(PipeControl, 0) * MAX_DRAW_PIPE_CONTROLS;

		for &cmd in &[
			StateBaseAddress, StateSip, VfStatistics, PipelineSelect,
			ClearParams, DepthBuffer, StencilBuffer, HierDepthBuffer,
			IndexBuffer, Vf, Vs, Gs, Clip, Sf, Wm, SampleMask,
			Hs, Te, Ds, Streamout, Sbe, Ps, DrawingRectangle,
			PolyStippleOffset, PolyStipplePattern, LineStipple, AaLineParameters,
			Multisample, SoDeclList, Primitive,
		] {
			size += self.command_size(cmd, 0);
		}
		size += self.command_size(VertexBuffers, MAX_VERTEX_BUFFERS);
		size += self.command_size(VertexElements, MAX_VERTEX_BUFFERS + 1);
		size
	}

	fn flush_pipe_controls(&self) -> usize {
		1
	}

	fn query_pipe_controls(&self, action: &Action) -> usize {
		match *action {
			Action::WriteTimestamp | Action::WriteDepthCount => 1,
			_ => 0,
		}
	}

	fn statistics_layout(&self) -> (usize, usize) {
		(10, 1)
	}
}

/// Words of a block of `len` words, allowing for the padding its
/// alignment may cost.
fn padded(gpe: &dyn Gpe, state: State, count: usize) -> usize {
	gpe.state_size(state, count) + state.alignment() - 1
}

fn bit_count(mask: u32) -> usize {
	mask.count_ones() as usize
}

fn last_bit(mask: u32) -> usize {
	(32 - mask.leading_zeros()) as usize
}

/// SURFACE_STATEs a draw of `vec` may point `stage` at, and the length of
/// its binding table.
pub fn binding_table_layout(gen: Gen, vec: &StateVector, stage: Stage) -> (usize, usize) {
	let i = stage.index();
	let num_views = vec.views[i].len();
	let cbuf_mask = vec.cbuf[i].enabled_mask;

	match stage {
		Stage::Vs => {
			let table_len = if num_views > 0 {
				VS_TEXTURE_SURFACE_BASE + num_views
			} else {
				VS_CONST_SURFACE_BASE + last_bit(cbuf_mask)
			};
			(num_views + bit_count(cbuf_mask), table_len)
		}
		Stage::Gs => {
			// stream output goes through the GS binding table on GEN6 only
			let so_outputs = if gen == Gen::Gen6 {
				vec.last_vertex_shader().map_or(0, |sh| sh.so_outputs().len())
			} else {
				0
			};
			(so_outputs, GS_SO_SURFACE_BASE + so_outputs)
		}
		Stage::Fs => {
			let num_rts = vec.fb.cbufs.len().max(1);
			let table_len = if num_views > 0 {
				WM_TEXTURE_SURFACE_BASE + num_views
			} else if cbuf_mask != 0 {
				WM_CONST_SURFACE_BASE + last_bit(cbuf_mask)
			} else {
				WM_DRAW_SURFACE_BASE + num_rts
			};
			(num_rts + num_views + bit_count(cbuf_mask), table_len)
		}
	}
}

/// Bytes of the push constant buffer of `stage`.
pub fn push_constant_size(vec: &StateVector, stage: Stage) -> u32 {
	match stage {
		Stage::Vs => vec.vs.as_ref().map_or(0, |vs| vs.kernel.pcb_cbuf0_size + vs.kernel.vs_pcb_ucp_size),
		Stage::Gs => 0,
		Stage::Fs => vec.fs.as_ref().map_or(0, |fs| fs.kernel.pcb_cbuf0_size),
	}
}

/// Upper bound of the indirect state words a draw of `vec` writes when
/// every state is re-emitted.
pub fn estimate_state_size(gpe: &dyn Gpe, vec: &StateVector) -> usize {
	let mut size = padded(gpe, State::Blend, MAX_DRAW_BUFFERS) +
		padded(gpe, State::DepthStencil, 1) +
		padded(gpe, State::ColorCalc, 1);

	size += if gpe.gen() >= Gen::Gen7 {
		padded(gpe, State::SfClipViewport, MAX_VIEWPORTS)
	} else {
		padded(gpe, State::SfViewport, MAX_VIEWPORTS) + padded(gpe, State::ClipViewport, MAX_VIEWPORTS)
	};
	size += padded(gpe, State::CcViewport, MAX_VIEWPORTS) + padded(gpe, State::ScissorRect, MAX_VIEWPORTS);

	for &stage in &Stage::ALL {
		let num_samplers = vec.samplers[stage.index()].len();
		let (num_surfaces, table_len) = binding_table_layout(gpe.gen(), vec, stage);
		let pcb_size = push_constant_size(vec, stage);

		if num_samplers > 0 {
			size += padded(gpe, State::Sampler, num_samplers) +
				padded(gpe, State::SamplerBorderColor, 1) * num_samplers;
		}
		if num_surfaces > 0 {
			size += padded(gpe, State::BindingTable, table_len) +
				padded(gpe, State::Surface, 1) * num_surfaces;
		}
		if pcb_size > 0 {
			size += padded(gpe, State::PushConstantBuffer, pcb_size as usize);
		}
	}

	size
}

/// Upper bound of the words `action` writes.  `max_draw_commands` is the
/// memoized `Gpe::max_draw_command_size`.
pub fn estimate_size(gpe: &dyn Gpe, max_draw_commands: usize, action: &Action) -> usize {
	let pipe_control = gpe.command_size(Command::PipeControl, 0);
	match *action {
		Action::Draw(vec) => max_draw_commands + estimate_state_size(gpe, vec),
		Action::Flush => pipe_control * gpe.flush_pipe_controls(),
		Action::WriteTimestamp | Action::WriteDepthCount => pipe_control * gpe.query_pipe_controls(action),
		Action::WriteStatistics => {
			let (num_regs, num_pads) = gpe.statistics_layout();
			pipe_control * gpe.flush_pipe_controls() +
				gpe.command_size(Command::MiStoreRegisterMem, 0) * 2 * num_regs +
				gpe.command_size(Command::MiStoreDataImm, 0) * num_pads
		}
		Action::Rectlist => RECTLIST_SIZE,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cp::Cp;
	use crate::gpe_gen6;
	use crate::gpe_gen7;
	use crate::winsys::{Bo, SoftWinsys};
	use pretty_assertions::assert_eq;

	fn new_cp() -> Cp {
		Cp::new(Box::new(SoftWinsys::new(1 << 30)), 4096).unwrap()
	}

	/// Words `f` writes to the front of a fresh buffer.
	fn emitted(f: impl FnOnce(&mut Cp)) -> usize {
		let mut cp = new_cp();
		f(&mut cp);
		cp.used()
	}

	#[test]
	fn gen6_sizes_match_encoders() {
		let snb = DeviceInfo::snb(2);
		let bo = Bo { handle: 7, size: 4096 };
		let sizes = [
			(Command::StateSip, emitted(|cp| gpe_gen6::emit_state_sip(&snb, cp, 0))),
			(Command::Urb, emitted(|cp| gpe_gen6::emit_3dstate_urb(&snb, cp, 32768, 0, 64, 0))),
			(Command::Vs, emitted(|cp| gpe_gen6::emit_3dstate_vs(&snb, cp, None, 0))),
			(Command::Gs, emitted(|cp| gpe_gen6::emit_3dstate_gs(&snb, cp, None, None, 3))),
			(Command::Sf, emitted(|cp| gpe_gen6::emit_3dstate_sf(&snb, cp, None, None))),
			(Command::Wm, emitted(|cp| gpe_gen6::emit_3dstate_wm(&snb, cp, None, 0, None, false, false, 0))),
			(Command::Constant, emitted(|cp| gpe_gen6::emit_3dstate_constant_ps(&snb, cp, &[], &[]))),
			(Command::Multisample, emitted(|cp| gpe_gen6::emit_3dstate_multisample(&snb, cp, 1, &[0x88], true))),
			(Command::PipeControl, emitted(|cp| gpe_gen6::emit_pipe_control(&snb, cp, 0, Some(bo), 0, true))),
			(Command::MiStoreDataImm, emitted(|cp| gpe_gen6::emit_mi_store_data_imm(&snb, cp, bo, 0, 0, true))),
			(Command::MiStoreRegisterMem, emitted(|cp| gpe_gen6::emit_mi_store_register_mem(&snb, cp, bo, 0, 0x2358))),
		];
		for &(cmd, words) in &sizes {
			assert_eq!((cmd, command_size(&snb, cmd, 0)), (cmd, words));
		}
	}

	#[test]
	fn gen7_sizes_match_encoders() {
		let ivb = DeviceInfo::ivb(1);
		let sizes = [
			(Command::Urb, emitted(|cp| gpe_gen7::emit_3dstate_urb(&ivb, cp, gpe_gen7::HwStage::Gs, 16384, 0, 0))),
			(Command::Hs, emitted(|cp| gpe_gen7::emit_3dstate_hs(&ivb, cp))),
			(Command::Sf, emitted(|cp| gpe_gen7::emit_3dstate_sf(&ivb, cp, None, None))),
			(Command::Sbe, emitted(|cp| gpe_gen7::emit_3dstate_sbe(&ivb, cp, None, None))),
			(Command::Ps, emitted(|cp| gpe_gen7::emit_3dstate_ps(&ivb, cp, None, 0, false))),
			(Command::Constant, emitted(|cp| gpe_gen7::emit_3dstate_constant_gs(&ivb, cp, &[], &[]))),
			(Command::SoDeclList, emitted(|cp| gpe_gen7::emit_3dstate_so_decl_list(&ivb, cp, None))),
			(Command::Multisample, emitted(|cp| gpe_gen6::emit_3dstate_multisample(&ivb, cp, 1, &[0x88], true))),
			(Command::ClearParams, emitted(|cp| gpe_gen7::emit_3dstate_clear_params(&ivb, cp, 0))),
			(Command::Pointers, emitted(|cp| gpe_gen7::emit_3dstate_blend_state_pointers(&ivb, cp, 64))),
			(Command::StateBaseAddress, emitted(|cp| {
				let bo = cp.bo();
				gpe_gen6::emit_state_base_address(&ivb, cp, &gpe_gen6::BaseAddress::new(bo, bo))
			})),
		];
		for &(cmd, words) in &sizes {
			assert_eq!((cmd, command_size(&ivb, cmd, 0)), (cmd, words));
		}
	}

	#[test]
	fn variable_length_commands() {
		let snb = DeviceInfo::snb(1);
		assert_eq!(command_size(&snb, Command::VertexBuffers, 2), 9);
		// an empty element list still writes a dummy element
		assert_eq!(command_size(&snb, Command::VertexElements, 0), 3);
		assert_eq!(command_size(&snb, Command::VertexElements, 34), 69);
	}

	#[test]
	#[should_panic]
	fn gen6_has_no_sbe() {
		command_size(&DeviceInfo::snb(1), Command::Sbe, 0);
	}

	#[test]
	fn state_sizes_per_gen() {
		let snb = DeviceInfo::snb(1);
		let hsw = DeviceInfo::hsw(2);
		assert_eq!(state_size(&snb, State::Surface, 1), 6);
		assert_eq!(state_size(&hsw, State::Surface, 1), 8);
		assert_eq!(state_size(&snb, State::SamplerBorderColor, 1), 12);
		assert_eq!(state_size(&hsw, State::SamplerBorderColor, 1), 4);
		assert_eq!(state_size(&hsw, State::SfClipViewport, 2), 32);
		assert_eq!(state_size(&snb, State::PushConstantBuffer, 36), 16);
		assert_eq!(State::Blend.alignment(), 16);
		assert_eq!(State::Sampler.alignment(), 8);
	}

	#[test]
	fn draw_command_bounds() {
		let gen6 = for_device(&DeviceInfo::snb(1)).max_draw_command_size();
		let gen7 = for_device(&DeviceInfo::ivb(1)).max_draw_command_size();
		assert!(gen6 > 133 + 69);
		// SO_DECL_LIST alone is 259 words
		assert!(gen7 > gen6 + 259 - 20);
		assert_eq!(for_device(&DeviceInfo::hsw(1)).max_draw_command_size(), gen7);
	}

	#[test]
	fn query_estimates() {
		let snb = for_device(&DeviceInfo::snb(1));
		let ivb = for_device(&DeviceInfo::ivb(1));
		assert_eq!(estimate_size(snb, 0, &Action::Flush), 15);
		assert_eq!(estimate_size(ivb, 0, &Action::Flush), 5);
		assert_eq!(estimate_size(snb, 0, &Action::WriteTimestamp), 10);
		assert_eq!(estimate_size(ivb, 0, &Action::WriteDepthCount), 5);
		assert_eq!(estimate_size(snb, 0, &Action::WriteStatistics), 15 + 3 * 2 * 8 + 5 * 3);
		assert_eq!(estimate_size(ivb, 0, &Action::WriteStatistics), 5 + 3 * 2 * 10 + 5);
		assert_eq!(estimate_size(ivb, 0, &Action::Rectlist), 320);
	}

	#[test]
	fn state_estimate_grows_with_bindings() {
		let snb = DeviceInfo::snb(1);
		let gpe = for_device(&snb);
		let mut vec = StateVector::new(&snb);
		let base = estimate_state_size(gpe, &vec);

		vec.bind_samplers(Stage::Fs, vec![None, None]);
		let with_samplers = estimate_state_size(gpe, &vec);
		assert_eq!(with_samplers - base, (8 + 7) + 2 * (12 + 7));

		let draw = estimate_size(gpe, gpe.max_draw_command_size(), &Action::Draw(&vec));
		assert_eq!(draw, gpe.max_draw_command_size() + with_samplers);
	}
}
