use std::cell::OnceCell;
use std::collections::HashMap;
use crate::blitter::Blitter;
use crate::cp::Cp;
use crate::dev::{DeviceInfo, Gen};
use crate::error::Result;
use crate::gpe::{self, Action, Gpe};
use crate::pipeline_gen6;
use crate::pipeline_gen7;
use crate::state::*;
use crate::winsys::Bo;

bitflags::bitflags! {
	/// Cached state that can no longer be trusted.
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct Invalidate: u32 {
		/// The hardware context was lost.  Every command is re-emitted.
		const HW = 1 << 0;
		const BATCH_BO = 1 << 1;
		const STATE_BO = 1 << 2;
		const KERNEL_BO = 1 << 3;
	}
}

/// Indirect state blocks whose offsets the pipeline remembers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateSlot {
	SfViewport,
	ClipViewport,
	CcViewport,
	SfClipViewport,
	ScissorRect,
	Blend,
	ColorCalc,
	DepthStencil,
	Sampler(Stage),
	BindingTable(Stage),
	PushConstant(Stage),
}

/// Surfaces a binding table may point at.
const MAX_TABLE_SURFACES: usize = if MAX_SURFACES > MAX_SO_BINDINGS { MAX_SURFACES } else { MAX_SO_BINDINGS };

/// Offsets of the indirect state last written, tagged with the batch they
/// live in.
pub struct Shadow {
	serial: u64,
	slots: HashMap<StateSlot, (u32, u64)>,
	/// SURFACE_STATE offsets per stage, indexed by binding table entry.
	pub(crate) surfaces: [Vec<u32>; 3],
	pub(crate) border_colors: [Vec<u32>; 3],
	/// Bytes of each stage's push constant buffer.
	pub(crate) pcb_size: [u32; 3],
	pub(crate) binding_table_size: [usize; 3],
}

impl Shadow {
	pub fn new(serial: u64) -> Shadow {
		Shadow {
			serial: serial,
			slots: HashMap::new(),
			surfaces: [vec![0; MAX_TABLE_SURFACES], vec![0; MAX_TABLE_SURFACES], vec![0; MAX_TABLE_SURFACES]],
			border_colors: [Vec::new(), Vec::new(), Vec::new()],
			pcb_size: [0; 3],
			binding_table_size: [0; 3],
		}
	}

	/// Forget the surfaces of the previous batch.  Slots stay around, so
	/// reading one that was not rewritten since is caught by `get`.
	pub fn begin_batch(&mut self, serial: u64) {
		self.serial = serial;
		for surfaces in self.surfaces.iter_mut() {
			for s in surfaces.iter_mut() {
				*s = 0;
			}
		}
		for border_colors in self.border_colors.iter_mut() {
			border_colors.clear();
		}
		self.binding_table_size = [0; 3];
	}

	pub fn serial(&self) -> u64 {
		self.serial
	}

	pub fn set(&mut self, slot: StateSlot, offset: u32) {
		self.slots.insert(slot, (offset, self.serial));
	}

	/// Offset of `slot` in the current batch, 0 if it was never written.
	/// Panics when the block belongs to an earlier batch.
	pub fn get(&self, slot: StateSlot) -> u32 {
		match self.slots.get(&slot) {
			Some(&(offset, serial)) => {
				assert_eq!(serial, self.serial, "{:?} was written in batch {}", slot, serial);
				offset
			}
			None => 0,
		}
	}
}

/// Scalars mirroring what the hardware last saw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Mirror {
	/// A post-sync workaround PIPE_CONTROL (GEN6) or CS stall (GEN7) was
	/// emitted since the last 3DPRIMITIVE.
	pub has_wa: bool,
	pub gs_active: bool,
	/// Vertices written to stream output since the offsets were reset.
	pub so_num_vertices: u32,
	pub so_max_vertices: u32,
	/// Instruction base of the last STATE_BASE_ADDRESS.
	pub kernel_bo: Option<Bo>,
	pub reduced_prim: Option<PrimType>,
	pub primitive_restart: bool,
}

/// What changed since the last draw.  Lives for a single draw.
pub struct Session {
	pub dirty: Dirty,
	pub hw_ctx_changed: bool,
	pub batch_bo_changed: bool,
	pub state_bo_changed: bool,
	pub kernel_bo_changed: bool,
	pub prim_changed: bool,
	pub primitive_restart_changed: bool,
	pub reduced_prim: PrimType,

	pub viewport_changed: bool,
	pub blend_changed: bool,
	pub cc_changed: bool,
	pub dsa_changed: bool,
	pub scissor_changed: bool,
	pub sampler_changed: [bool; 3],
	pub binding_table_changed: [bool; 3],
	pub pcb_changed: [bool; 3],
	pub num_surfaces: [usize; 3],
}

impl Session {
	pub(crate) fn new(p: &Pipeline, vec: &StateVector) -> Session {
		let flags = p.invalidate_flags;
		let reduced_prim = vec.draw.mode.reduced();
		let hw_ctx_changed = flags.contains(Invalidate::HW);

		let mut session = Session {
			dirty: vec.dirty,
			hw_ctx_changed: hw_ctx_changed,
			batch_bo_changed: true,
			state_bo_changed: true,
			kernel_bo_changed: true,
			prim_changed: true,
			primitive_restart_changed: true,
			reduced_prim: reduced_prim,
			viewport_changed: false,
			blend_changed: false,
			cc_changed: false,
			dsa_changed: false,
			scissor_changed: false,
			sampler_changed: [false; 3],
			binding_table_changed: [false; 3],
			pcb_changed: [false; 3],
			num_surfaces: [0; 3],
		};
		if !hw_ctx_changed {
			session.batch_bo_changed = flags.contains(Invalidate::BATCH_BO);
			session.state_bo_changed = flags.contains(Invalidate::STATE_BO);
			session.kernel_bo_changed = flags.contains(Invalidate::KERNEL_BO) ||
				p.state.kernel_bo != vec.shader_bo;
			session.prim_changed = p.state.reduced_prim != Some(reduced_prim);
			session.primitive_restart_changed = p.state.primitive_restart != vec.draw.primitive_restart;
		}
		session
	}

	pub fn dirty(&self, flags: Dirty) -> bool {
		self.dirty.intersects(flags)
	}

	/// Every pointer command is re-emitted after STATE_BASE_ADDRESS.
	pub(crate) fn base_address_changed(&mut self) {
		self.viewport_changed = true;
		self.blend_changed = true;
		self.cc_changed = true;
		self.dsa_changed = true;
		self.scissor_changed = true;
		self.sampler_changed = [true; 3];
		self.binding_table_changed = [true; 3];
		self.pcb_changed = [true; 3];
	}
}

/// The counters `emit_write_statistics` stores, one qword each.
pub const STATISTICS_COUNT: usize = 11;

/// Sample positions in 1/16 pixel, sample 0 first.
const SAMPLE_POSITION_1X: [(u8, u8); 1] = [(8, 8)];
const SAMPLE_POSITION_4X: [(u8, u8); 4] = [(6, 2), (14, 6), (2, 10), (10, 14)];
const SAMPLE_POSITION_8X: [(u8, u8); 8] = [
	(7, 9), (9, 13), (11, 3), (13, 11),
	(1, 7), (5, 1), (15, 5), (3, 15),
];

/// Four positions per word, 4 bits each of x and y, sample 0 in the low
/// byte.
fn pack_sample_positions(positions: &[(u8, u8)]) -> [u32; 2] {
	let mut packed = [0; 2];
	for (i, &(x, y)) in positions.iter().enumerate() {
		packed[i / 4] |= ((x as u32) << 4 | y as u32) << (8 * (i % 4));
	}
	packed
}

/// Queries that write to a buffer object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Query {
	DepthCount,
	Timestamp,
	Statistics,
}

/// The 3D pipeline of one context: turns state vectors into commands in its
/// batch buffer.
pub struct Pipeline {
	pub(crate) dev: DeviceInfo,
	pub(crate) cp: Cp,
	gpe: &'static dyn Gpe,
	max_draw_commands: OnceCell<usize>,
	pub(crate) shadow: Shadow,
	pub(crate) state: Mirror,
	invalidate_flags: Invalidate,
	pub(crate) workaround_bo: Bo,
	last_serial: u64,
	packed_sample_position: [[u32; 2]; 3],
}

impl Pipeline {
	pub fn new(dev: &DeviceInfo, mut cp: Cp) -> Result<Pipeline> {
		let workaround_bo = cp.winsys_mut().alloc("PIPE_CONTROL workaround", 4096)?;
		let serial = cp.serial();
		Ok(Pipeline {
			dev: dev.clone(),
			cp: cp,
			gpe: gpe::for_device(dev),
			max_draw_commands: OnceCell::new(),
			shadow: Shadow::new(serial),
			state: Mirror {
				has_wa: false,
				gs_active: false,
				so_num_vertices: 0,
				so_max_vertices: 0,
				kernel_bo: None,
				reduced_prim: None,
				primitive_restart: false,
			},
			invalidate_flags: Invalidate::HW,
			workaround_bo: workaround_bo,
			last_serial: serial,
			packed_sample_position: [
				pack_sample_positions(&SAMPLE_POSITION_1X),
				pack_sample_positions(&SAMPLE_POSITION_4X),
				pack_sample_positions(&SAMPLE_POSITION_8X),
			],
		})
	}

	pub fn dev(&self) -> &DeviceInfo {
		&self.dev
	}

	pub fn cp(&self) -> &Cp {
		&self.cp
	}

	pub fn cp_mut(&mut self) -> &mut Cp {
		&mut self.cp
	}

	pub fn shadow(&self) -> &Shadow {
		&self.shadow
	}

	/// Vertices stream output has written since its offsets were reset.
	pub fn so_num_vertices(&self) -> u32 {
		self.state.so_num_vertices
	}

	pub fn invalidate_flags(&self) -> Invalidate {
		self.invalidate_flags
	}

	pub fn invalidate(&mut self, flags: Invalidate) {
		self.invalidate_flags |= flags;
	}

	/// Words of a draw with every piece of state changed, computed once.
	pub fn max_draw_command_size(&self) -> usize {
		*self.max_draw_commands.get_or_init(|| self.gpe.max_draw_command_size())
	}

	/// Upper bound of the words `action` adds to the batch.
	pub fn estimate_size(&self, action: Action) -> usize {
		gpe::estimate_size(self.gpe, self.max_draw_command_size(), &action)
	}

	/// Packed positions for 3DSTATE_MULTISAMPLE at `num_samples`.
	pub(crate) fn packed_sample_position(&self, num_samples: u32) -> [u32; 2] {
		let idx = if num_samples > 4 { 2 } else if num_samples > 1 { 1 } else { 0 };
		self.packed_sample_position[idx]
	}

	/// Position of `sample_index` inside the pixel, in pixels.
	pub fn get_sample_position(&self, sample_count: u32, sample_index: usize) -> (f32, f32) {
		let positions: &[(u8, u8)] = match sample_count {
			1 => &SAMPLE_POSITION_1X,
			4 => &SAMPLE_POSITION_4X,
			8 => &SAMPLE_POSITION_8X,
			n => {
				warn!("no sample positions for {} samples", n);
				return (0.5, 0.5);
			}
		};
		let (x, y) = positions[sample_index];
		(x as f32 / 16.0, y as f32 / 16.0)
	}

	/// Notice a flush of the batch buffer since we last wrote to it.
	fn handle_batch_change(&mut self) {
		let serial = self.cp.serial();
		if serial == self.last_serial {
			return;
		}
		self.invalidate_flags |= Invalidate::BATCH_BO | Invalidate::STATE_BO;
		self.state.has_wa = false;
		self.shadow.begin_batch(serial);
		self.last_serial = serial;
	}

	fn submit(&mut self, reason: &str) -> bool {
		self.cp.flush(reason).is_ok()
	}

	/// Make room for `max_len` words, then run `emit` until everything it
	/// references fits the aperture.  A rewound attempt is retried once on
	/// an empty batch.
	fn emit_checked<F>(&mut self, max_len: usize, mut emit: F) -> bool
		where F: FnMut(&mut Pipeline) {
		if max_len > self.cp.space() && !self.submit("out of space") {
			return false;
		}
		assert!(max_len <= self.cp.space(), "{} words do not fit an empty batch", max_len);

		loop {
			self.handle_batch_change();
			let checkpoint = self.cp.checkpoint();
			let mirror = self.state;
			let space = self.cp.space();

			emit(self);
			assert!(space - self.cp.space() <= max_len, "size estimate of {} words exceeded", max_len);

			if self.cp.check_aperture() {
				return true;
			}

			self.cp.rewind(checkpoint);
			self.state = mirror;
			if self.cp.is_empty() {
				warn!("out of aperture with an empty batch");
				// offsets written by the discarded attempt are gone
				self.invalidate_flags |= Invalidate::STATE_BO;
				return false;
			}
			info!("out of aperture, flushing batch {}", self.cp.serial());
			if !self.submit("out of aperture") {
				return false;
			}
		}
	}

	/// Emit everything `vec` needs plus 3DPRIMITIVE.  Returns false when
	/// the draw cannot be emitted at all; `vec` keeps its dirty bits then.
	pub fn emit_draw(&mut self, vec: &mut StateVector) -> bool {
		// GEN6 may flush in the middle of a draw for the URB workaround
		let max_len = self.estimate_size(Action::Draw(vec)) + self.estimate_size(Action::Flush) * 2;
		let gen = self.dev.gen;
		let emitted = {
			let vec = &*vec;
			self.emit_checked(max_len, |p| match gen {
				Gen::Gen6 => pipeline_gen6::emit_draw(p, vec),
				Gen::Gen7 | Gen::Gen75 => pipeline_gen7::emit_draw(p, vec),
			})
		};
		if emitted {
			self.invalidate_flags = Invalidate::empty();
			vec.dirty = Dirty::empty();
		}
		emitted
	}

	/// Flush the render caches and invalidate the read caches.
	pub fn emit_flush(&mut self) {
		self.handle_batch_change();
		let max_len = self.estimate_size(Action::Flush);
		if max_len > self.cp.space() {
			if !self.submit("out of space") {
				error!("flush emitted after a failed submission");
			}
			self.handle_batch_change();
		}
		pipeline_gen6::emit_flush(self);
	}

	fn emit_query(&mut self, query: Query, action: Action, bo: Bo, offset: u32) {
		self.handle_batch_change();
		let max_len = self.estimate_size(action);
		if max_len > self.cp.space() {
			if !self.submit("out of space") {
				error!("{:?} query emitted after a failed submission", query);
			}
			self.handle_batch_change();
		}
		pipeline_gen6::emit_query(self, query, bo, offset);
	}

	/// Write the GPU timestamp to qword `index` of `bo`.
	pub fn emit_write_timestamp(&mut self, bo: Bo, index: usize) {
		self.emit_query(Query::Timestamp, Action::WriteTimestamp, bo, (index * 8) as u32);
	}

	/// Write the PS depth count to qword `index` of `bo`.
	pub fn emit_write_depth_count(&mut self, bo: Bo, index: usize) {
		self.emit_query(Query::DepthCount, Action::WriteDepthCount, bo, (index * 8) as u32);
	}

	/// Write the pipeline statistics counters to block `index` of `bo`, a
	/// block being `STATISTICS_COUNT` qwords.
	pub fn emit_write_statistics(&mut self, bo: Bo, index: usize) {
		let offset = (index * STATISTICS_COUNT * 8) as u32;
		self.emit_query(Query::Statistics, Action::WriteStatistics, bo, offset);
	}

	/// Draw the rectangle `blitter` describes, bypassing the state vector.
	/// The next draw re-emits every command.
	pub fn emit_rectlist(&mut self, blitter: &Blitter) -> bool {
		let max_len = self.estimate_size(Action::Rectlist);
		let gen = self.dev.gen;
		let emitted = self.emit_checked(max_len, |p| match gen {
			Gen::Gen6 => pipeline_gen6::emit_rectlist(p, blitter),
			Gen::Gen7 | Gen::Gen75 => pipeline_gen7::emit_rectlist(p, blitter),
		});
		self.invalidate(Invalidate::HW);
		emitted
	}
}

impl Drop for Pipeline {
	fn drop(&mut self) {
		let bo = self.workaround_bo;
		self.cp.winsys_mut().free(bo);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::winsys::SoftWinsys;
	use pretty_assertions::assert_eq;

	fn new_pipeline(dev: &DeviceInfo) -> Pipeline {
		let cp = Cp::new(Box::new(SoftWinsys::new(1 << 30)), 8192).unwrap();
		Pipeline::new(dev, cp).unwrap()
	}

	#[test]
	fn packed_positions() {
		assert_eq!(pack_sample_positions(&SAMPLE_POSITION_1X), [0x88, 0]);
		assert_eq!(pack_sample_positions(&SAMPLE_POSITION_4X), [0xae2ae662, 0]);
		assert_eq!(pack_sample_positions(&SAMPLE_POSITION_8X), [0xdbb39d79, 0x3ff55117]);
	}

	#[test]
	fn sample_positions() {
		let p = new_pipeline(&DeviceInfo::ivb(1));
		assert_eq!(p.get_sample_position(1, 0), (0.5, 0.5));
		assert_eq!(p.get_sample_position(4, 1), (0.875, 0.375));
		assert_eq!(p.get_sample_position(8, 7), (0.1875, 0.9375));
		assert_eq!(p.get_sample_position(2, 0), (0.5, 0.5));
		assert_eq!(p.packed_sample_position(8), [0xdbb39d79, 0x3ff55117]);
		assert_eq!(p.packed_sample_position(4)[0], 0xae2ae662);
	}

	#[test]
	#[should_panic]
	fn sample_index_out_of_range() {
		new_pipeline(&DeviceInfo::snb(1)).get_sample_position(4, 4);
	}

	#[test]
	fn shadow_slots() {
		let mut shadow = Shadow::new(3);
		assert_eq!(shadow.get(StateSlot::Blend), 0);
		shadow.set(StateSlot::Blend, 0x1c0);
		shadow.set(StateSlot::Sampler(Stage::Fs), 0x200);
		assert_eq!(shadow.get(StateSlot::Blend), 0x1c0);
		assert_eq!(shadow.get(StateSlot::Sampler(Stage::Fs)), 0x200);
		assert_eq!(shadow.get(StateSlot::Sampler(Stage::Vs)), 0);

		shadow.surfaces[2][0] = 0x40;
		shadow.begin_batch(4);
		assert_eq!(shadow.serial(), 4);
		assert_eq!(shadow.surfaces[2][0], 0);
		shadow.set(StateSlot::Blend, 0x80);
		assert_eq!(shadow.get(StateSlot::Blend), 0x80);
	}

	#[test]
	#[should_panic(expected = "written in batch")]
	fn stale_shadow_slot() {
		let mut shadow = Shadow::new(0);
		shadow.set(StateSlot::DepthStencil, 0x100);
		shadow.begin_batch(1);
		shadow.get(StateSlot::DepthStencil);
	}

	#[test]
	fn new_pipeline_invalidates_hw() {
		let mut p = new_pipeline(&DeviceInfo::snb(1));
		assert_eq!(p.invalidate_flags(), Invalidate::HW);
		p.invalidate(Invalidate::KERNEL_BO);
		assert_eq!(p.invalidate_flags(), Invalidate::HW | Invalidate::KERNEL_BO);
	}

	#[test]
	fn session_from_hw_context_change() {
		let snb = DeviceInfo::snb(1);
		let mut p = new_pipeline(&snb);
		let mut vec = StateVector::new(&snb);
		vec.dirty = Dirty::BLEND;

		let session = Session::new(&p, &vec);
		assert!(session.hw_ctx_changed && session.state_bo_changed && session.prim_changed);
		assert_eq!(session.dirty, Dirty::BLEND);

		p.invalidate_flags = Invalidate::STATE_BO;
		p.state.reduced_prim = Some(PrimType::Triangles);
		let session = Session::new(&p, &vec);
		assert!(!session.hw_ctx_changed && !session.batch_bo_changed);
		assert!(session.state_bo_changed && !session.prim_changed);
		assert!(session.dirty(Dirty::BLEND | Dirty::FB) && !session.dirty(Dirty::FB));
	}

	#[test]
	fn estimates_are_memoized() {
		let p = new_pipeline(&DeviceInfo::hsw(2));
		let size = p.max_draw_command_size();
		assert_eq!(p.max_draw_command_size(), size);
		assert_eq!(p.estimate_size(Action::Flush), 5);
		assert_eq!(p.estimate_size(Action::Rectlist), 320);
	}

	#[test]
	fn flush_waits_for_a_batch_change() {
		let mut p = new_pipeline(&DeviceInfo::ivb(1));
		p.emit_flush();
		assert_eq!(p.cp().used(), 4);
		p.cp_mut().flush("test").unwrap();
		p.state.has_wa = true;
		p.emit_flush();
		assert!(!p.state.has_wa);
		assert!(p.invalidate_flags().contains(Invalidate::BATCH_BO | Invalidate::STATE_BO));
	}
}
