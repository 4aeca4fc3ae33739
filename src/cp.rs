use std::collections::HashMap;
use std::collections::HashSet;
use crate::cmd::MiOpcode;
use crate::decode;
use crate::error::Result;
use crate::winsys::{Batch, Bo, Reloc, Winsys};

/// Words kept free behind the commands for MI_BATCH_BUFFER_END and the
/// MI_NOOP that pads the batch to a qword.
const RESERVED: usize = 2;

/// Position of the command buffer, as returned by `Cp::checkpoint`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
	serial: u64,
	used: usize,
	stolen: usize,
	relocs: usize,
}

/// The in-flight batch buffer.  Commands grow from the front, indirect
/// state is stolen from the back, so state offsets are relative to the
/// batch buffer object itself.
pub struct Cp {
	ws: Box<dyn Winsys>,
	bo: Bo,
	words: Vec<u32>,
	used: usize,
	stolen: usize,
	cmd_end: Option<usize>,
	relocs: Vec<Reloc>,
	labels: HashMap<usize, String>,
	serial: u64,
}

impl Cp {
	/// Create a command buffer of `size` words backed by a buffer object
	/// from `ws`.
	pub fn new(mut ws: Box<dyn Winsys>, size: usize) -> Result<Cp> {
		assert!(size >= 64 && size % 16 == 0, "bad batch size {}", size);
		let bo = ws.alloc("batch buffer", size as u64 * 4)?;
		Ok(Cp {
			ws: ws,
			bo: bo,
			words: vec![0; size],
			used: 0,
			stolen: 0,
			cmd_end: None,
			relocs: Vec::new(),
			labels: HashMap::new(),
			serial: 0,
		})
	}

	pub fn bo(&self) -> Bo {
		self.bo
	}

	pub fn size(&self) -> usize {
		self.words.len()
	}

	/// Incremented every time the batch is flushed.
	pub fn serial(&self) -> u64 {
		self.serial
	}

	pub fn used(&self) -> usize {
		self.used
	}

	pub fn stolen(&self) -> usize {
		self.stolen
	}

	/// Words available to commands and indirect state together.
	pub fn space(&self) -> usize {
		let front = self.cmd_end.unwrap_or(self.used);
		(self.words.len() - self.stolen).saturating_sub(front + RESERVED)
	}

	pub fn is_empty(&self) -> bool {
		self.used == 0 && self.stolen == 0
	}

	/// Command words written since the last flush.
	pub fn commands(&self) -> &[u32] {
		&self.words[..self.used]
	}

	/// The whole buffer, indirect state included.
	pub fn buffer(&self) -> &[u32] {
		&self.words
	}

	pub fn relocs(&self) -> &[Reloc] {
		&self.relocs
	}

	pub fn winsys(&self) -> &dyn Winsys {
		&*self.ws
	}

	pub fn winsys_mut(&mut self) -> &mut dyn Winsys {
		&mut *self.ws
	}

	pub fn begin(&mut self, n: usize) {
		assert!(self.cmd_end.is_none(), "begin() inside an unfinished command");
		assert!(n <= self.space(), "command of {} words does not fit in {} words", n, self.space());
		self.cmd_end = Some(self.used + n);
	}

	pub fn write(&mut self, data: u32) {
		assert!(self.cmd_end.map_or(false, |end| self.used < end), "write outside of the declared command");
		self.words[self.used] = data;
		self.used += 1;
	}

	/// Write `delta` and have it relocated against `bo`.
	pub fn write_bo(&mut self, delta: u32, bo: Bo, read_domains: u32, write_domain: u32) {
		self.relocs.push(Reloc {
			pos: self.used,
			bo: bo,
			delta: delta,
			read_domains: read_domains,
			write_domain: write_domain,
		});
		self.write(delta);
	}

	pub fn end(&mut self) {
		match self.cmd_end.take() {
			Some(end) => assert_eq!(end, self.used, "command size does not match begin()"),
			None => panic!("end() without begin()"),
		}
	}

	pub fn write_label(&mut self, label: &str) {
		self.labels.insert(self.used, label.to_owned());
	}

	/// Reserve `len` words of indirect state, aligned to `align` words, at
	/// the back of the buffer.  Returns the byte offset of the block and
	/// the block itself, zero-filled.
	pub fn steal(&mut self, len: usize, align: usize) -> (u32, &mut [u32]) {
		assert!(align.is_power_of_two());
		let top = self.words.len() - self.stolen;
		let front = self.cmd_end.unwrap_or(self.used) + RESERVED;
		assert!(top >= front + len, "indirect state of {} words does not fit", len);
		let pos = (top - len) & !(align - 1);
		assert!(pos >= front, "indirect state of {} words does not fit", len);
		self.stolen = self.words.len() - pos;
		((pos * 4) as u32, &mut self.words[pos..pos + len])
	}

	/// Steal a block and copy `data` into it.
	pub fn state_write(&mut self, align: usize, data: &[u32]) -> u32 {
		let (offset, dw) = self.steal(data.len(), align);
		dw.copy_from_slice(data);
		offset
	}

	/// Relocate word `index` of the state block at byte `offset`.
	pub fn state_reloc(&mut self, offset: u32, index: usize, delta: u32, bo: Bo, read_domains: u32, write_domain: u32) {
		let pos = offset as usize / 4 + index;
		assert!(pos >= self.words.len() - self.stolen && pos < self.words.len(), "reloc outside of stolen state");
		self.words[pos] = delta;
		self.relocs.push(Reloc {
			pos: pos,
			bo: bo,
			delta: delta,
			read_domains: read_domains,
			write_domain: write_domain,
		});
	}

	/// Read back a word of stolen state.
	pub fn state_word(&self, offset: u32, index: usize) -> u32 {
		self.words[offset as usize / 4 + index]
	}

	pub fn checkpoint(&self) -> Checkpoint {
		assert!(self.cmd_end.is_none(), "checkpoint inside an unfinished command");
		Checkpoint {
			serial: self.serial,
			used: self.used,
			stolen: self.stolen,
			relocs: self.relocs.len(),
		}
	}

	/// Discard everything written since `cp`.  The buffer is left
	/// word-for-word as it was when the checkpoint was taken.
	pub fn rewind(&mut self, cp: Checkpoint) {
		assert_eq!(cp.serial, self.serial, "rewinding across a flush");
		assert!(cp.used <= self.used && cp.stolen <= self.stolen);
		let size = self.words.len();
		for w in &mut self.words[cp.used..self.used] {
			*w = 0;
		}
		for w in &mut self.words[size - self.stolen..size - cp.stolen] {
			*w = 0;
		}
		self.used = cp.used;
		self.stolen = cp.stolen;
		self.cmd_end = None;
		self.relocs.truncate(cp.relocs);
		self.labels.retain(|&pos, _| pos < cp.used);
	}

	/// Every buffer object the batch would reference, itself included.
	pub fn referenced_bos(&self) -> Vec<Bo> {
		let mut seen = HashSet::new();
		seen.insert(self.bo.handle);
		let mut bos = vec![self.bo];
		for reloc in &self.relocs {
			if seen.insert(reloc.bo.handle) {
				bos.push(reloc.bo);
			}
		}
		bos
	}

	pub fn check_aperture(&self) -> bool {
		self.ws.check_aperture(&self.referenced_bos())
	}

	/// Terminate and submit the batch, then start over on a fresh buffer
	/// object.  The buffer is reset even when the submission fails.
	pub fn flush(&mut self, reason: &str) -> Result<()> {
		assert!(self.cmd_end.is_none(), "flush inside an unfinished command");
		if self.is_empty() {
			return Ok(());
		}

		self.words[self.used] = MiOpcode::BATCH_BUFFER_END.header(1);
		self.used += 1;
		if self.used % 2 != 0 {
			self.words[self.used] = MiOpcode::NOOP.header(1);
			self.used += 1;
		}

		debug!("flushing batch {} ({}): {} command words, {} state words, {} relocs",
			self.serial, reason, self.used, self.stolen, self.relocs.len());

		let submitted = self.ws.submit(&Batch {
			bo: self.bo,
			words: &self.words,
			used: self.used,
			relocs: &self.relocs,
		});
		if let Err(ref e) = submitted {
			error!("batch {} was not submitted: {}", self.serial, e);
		}

		match self.ws.alloc("batch buffer", self.bo.size) {
			Ok(bo) => {
				let old = std::mem::replace(&mut self.bo, bo);
				self.ws.free(old);
			}
			Err(e) => warn!("reusing batch buffer {}: {}", self.bo.handle, e),
		}

		for w in self.words.iter_mut() {
			*w = 0;
		}
		self.used = 0;
		self.stolen = 0;
		self.relocs.clear();
		self.labels.clear();
		self.serial += 1;

		submitted
	}

	/// Print the command words with their labels and decoded names.
	pub fn dump(&self) {
		decode::print_batch(&self.words[..self.used], &self.labels);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::winsys::SoftWinsys;
	use pretty_assertions::assert_eq;

	fn new_cp(aperture: u64) -> (Cp, std::rc::Rc<std::cell::RefCell<Vec<crate::winsys::Submission>>>) {
		let ws = SoftWinsys::new(aperture);
		let subs = ws.submissions();
		(Cp::new(Box::new(ws), 256).unwrap(), subs)
	}

	#[test]
	fn commands_and_state_share_the_buffer() {
		let (mut cp, _) = new_cp(1 << 20);
		assert_eq!(cp.space(), 254);

		cp.begin(2);
		cp.write(0x1234_0000);
		cp.write(7);
		cp.end();

		let offset = cp.state_write(8, &[1, 2, 3]);
		assert_eq!(offset, (256 - 8) * 4);
		assert_eq!(cp.stolen(), 8);
		assert_eq!(cp.space(), 256 - 2 - 8 - 2);
		assert_eq!(cp.commands(), &[0x1234_0000, 7]);
		assert_eq!(cp.state_word(offset, 2), 3);
	}

	#[test]
	#[should_panic]
	fn short_command_panics() {
		let (mut cp, _) = new_cp(1 << 20);
		cp.begin(3);
		cp.write(0);
		cp.end();
	}

	#[test]
	fn rewind_restores_words() {
		let (mut cp, _) = new_cp(1 << 20);
		cp.begin(1);
		cp.write(0xaaaa_aaaa);
		cp.end();
		let before = cp.buffer().to_vec();
		let mark = cp.checkpoint();

		let extra = cp.state_write(16, &[5; 20]);
		let bo = Bo { handle: 99, size: 4096 };
		cp.state_reloc(extra, 1, 64, bo, 0, 0);
		cp.begin(2);
		cp.write(1);
		cp.write_bo(8, bo, 0, 0);
		cp.end();
		assert_eq!(cp.relocs().len(), 2);

		cp.rewind(mark);
		assert_eq!(cp.buffer(), &before[..]);
		assert_eq!(cp.used(), 1);
		assert_eq!(cp.stolen(), 0);
		assert!(cp.relocs().is_empty());
	}

	#[test]
	fn flush_submits_and_resets() {
		let (mut cp, subs) = new_cp(1 << 20);
		cp.flush("nothing").unwrap();
		assert!(subs.borrow().is_empty());
		assert_eq!(cp.serial(), 0);

		let first = cp.bo();
		cp.begin(1);
		cp.write(0);
		cp.end();
		cp.flush("test").unwrap();

		let subs = subs.borrow();
		assert_eq!(subs.len(), 1);
		assert_eq!(subs[0].bo, first);
		assert_eq!(subs[0].commands, vec![0, 0x0500_0000]);
		assert!(cp.is_empty());
		assert_eq!(cp.serial(), 1);
		assert!(cp.bo() != first);
	}

	#[test]
	fn referenced_bos_are_unique() {
		let (mut cp, _) = new_cp(1 << 20);
		let bo = Bo { handle: 42, size: 4096 };
		cp.begin(2);
		cp.write_bo(0, bo, 0, 0);
		cp.write_bo(4, bo, 0, 0);
		cp.end();
		assert_eq!(cp.referenced_bos(), vec![cp.bo(), bo]);
	}
}
