use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use crate::error::{Error, Result};

/// A GPU buffer object, as seen by the command builder.  Lifetime of the
/// underlying memory is the winsys' business.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Bo {
	pub handle: u32,
	pub size: u64,
}

pub const DOMAIN_CPU: u32 = 0x1;
pub const DOMAIN_RENDER: u32 = 0x2;
pub const DOMAIN_SAMPLER: u32 = 0x4;
pub const DOMAIN_COMMAND: u32 = 0x8;
pub const DOMAIN_INSTRUCTION: u32 = 0x10;
pub const DOMAIN_VERTEX: u32 = 0x20;

/// A relocation: the word at `pos` holds `delta` plus the final address of `bo`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reloc {
	pub pos: usize,
	pub bo: Bo,
	pub delta: u32,
	pub read_domains: u32,
	pub write_domain: u32,
}

/// A finished batch handed to the winsys.  `words` is the whole buffer
/// object (commands at the front, indirect state at the back); the first
/// `used` words are commands.
pub struct Batch<'a> {
	pub bo: Bo,
	pub words: &'a [u32],
	pub used: usize,
	pub relocs: &'a [Reloc],
}

pub trait Winsys {
	fn alloc(&mut self, name: &str, size: u64) -> Result<Bo>;
	fn free(&mut self, bo: Bo);
	/// Whether all of `bos` can be made resident at once.
	fn check_aperture(&self, bos: &[Bo]) -> bool;
	fn submit(&mut self, batch: &Batch) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
	pub bo: Bo,
	pub commands: Vec<u32>,
	pub words: Vec<u32>,
	pub relocs: Vec<Reloc>,
}

/// In-memory winsys.  Submissions are recorded and never executed.
pub struct SoftWinsys {
	next_handle: u32,
	aperture: u64,
	live: HashSet<u32>,
	submissions: Rc<RefCell<Vec<Submission>>>,
}

impl SoftWinsys {
	pub fn new(aperture: u64) -> SoftWinsys {
		SoftWinsys {
			next_handle: 1,
			aperture: aperture,
			live: HashSet::new(),
			submissions: Rc::new(RefCell::new(Vec::new())),
		}
	}

	/// Shared view of every batch submitted so far.
	pub fn submissions(&self) -> Rc<RefCell<Vec<Submission>>> {
		self.submissions.clone()
	}

	pub fn live_count(&self) -> usize {
		self.live.len()
	}
}

impl Winsys for SoftWinsys {
	fn alloc(&mut self, name: &str, size: u64) -> Result<Bo> {
		if size == 0 {
			return Err(Error::Alloc { name: name.to_owned(), size: size });
		}
		let bo = Bo { handle: self.next_handle, size: size };
		self.next_handle += 1;
		self.live.insert(bo.handle);
		trace!("allocated {} bo {} ({} bytes)", name, bo.handle, size);
		Ok(bo)
	}

	fn free(&mut self, bo: Bo) {
		self.live.remove(&bo.handle);
	}

	fn check_aperture(&self, bos: &[Bo]) -> bool {
		let mut seen = HashSet::new();
		let total: u64 = bos.iter()
			.filter(|bo| seen.insert(bo.handle))
			.map(|bo| bo.size)
			.sum();
		total <= self.aperture
	}

	fn submit(&mut self, batch: &Batch) -> Result<()> {
		if !self.live.contains(&batch.bo.handle) {
			return Err(Error::Submit(format!("batch bo {} is not alive", batch.bo.handle)));
		}
		self.submissions.borrow_mut().push(Submission {
			bo: batch.bo,
			commands: batch.words[..batch.used].to_vec(),
			words: batch.words.to_vec(),
			relocs: batch.relocs.to_vec(),
		});
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn aperture_counts_each_bo_once() {
		let mut ws = SoftWinsys::new(4096);
		let a = ws.alloc("a", 2048).unwrap();
		let b = ws.alloc("b", 2048).unwrap();
		let c = ws.alloc("c", 1).unwrap();
		assert!(ws.check_aperture(&[a, b, a, b]));
		assert!(!ws.check_aperture(&[a, b, c]));
		ws.free(c);
		assert_eq!(ws.live_count(), 2);
	}
}
