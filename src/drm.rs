// Winsys on an i915 DRM device node.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use crate::drm_i915_ioctl::*;
use crate::error::{Error, Result};
use crate::layout::Tiling;
use crate::winsys::{Batch, Bo, Winsys};

pub struct DrmWinsys {
	file: File,
	aperture: u64,
	names: HashMap<u32, String>,
}

fn to_bytes(words: &[u32]) -> Vec<u8> {
	words.iter().flat_map(|w| w.to_ne_bytes()).collect()
}

impl DrmWinsys {
	pub fn open(path: &str) -> Result<DrmWinsys> {
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		let mut aperture = DrmI915GemGetAperture::default();
		unsafe { drm_ioctl_i915_gem_get_aperture(file.as_raw_fd(), &mut aperture) }?;
		info!("{}: {} MB aperture, {} MB available", path,
			aperture.aper_size >> 20, aperture.aper_available_size >> 20);

		Ok(DrmWinsys {
			file: file,
			aperture: aperture.aper_size,
			names: HashMap::new(),
		})
	}

	fn fd(&self) -> i32 {
		self.file.as_raw_fd()
	}

	fn getparam(&self, param: i32) -> Result<i32> {
		let mut value = 0;
		let mut gp = DrmI915Getparam::new(param, &mut value);
		unsafe { drm_ioctl_i915_getparam(self.fd(), &mut gp) }?;
		Ok(value)
	}

	pub fn chipset_id(&self) -> Result<u16> {
		Ok(self.getparam(I915_PARAM_CHIPSET_ID)? as u16)
	}

	pub fn has_llc(&self) -> Result<bool> {
		Ok(self.getparam(I915_PARAM_HAS_LLC)? != 0)
	}

	pub fn aperture_size(&self) -> u64 {
		self.aperture
	}

	pub fn write_bo(&self, bo: Bo, offset: u64, data: &[u8]) -> Result<()> {
		let pwrite = DrmI915GemPwrite::new(bo.handle, offset, data);
		unsafe { drm_ioctl_i915_gem_pwrite(self.fd(), &pwrite) }?;
		Ok(())
	}

	pub fn read_bo(&self, bo: Bo, offset: u64, data: &mut [u8]) -> Result<()> {
		let pread = DrmI915GemPread::new(bo.handle, offset, data);
		unsafe { drm_ioctl_i915_gem_pread(self.fd(), &pread) }?;
		Ok(())
	}

	pub fn set_tiling(&self, bo: Bo, tiling: Tiling, stride: u32) -> Result<()> {
		let mut args = DrmI915GemSetTiling {
			handle: bo.handle,
			tiling_mode: match tiling {
				Tiling::None => I915_TILING_NONE,
				Tiling::X => I915_TILING_X,
				Tiling::Y => I915_TILING_Y,
			},
			stride: stride,
			swizzle_mode: 0,
		};
		unsafe { drm_ioctl_i915_gem_set_tiling(self.fd(), &mut args) }?;
		Ok(())
	}

	/// Block until the GPU is done with `bo`.
	pub fn wait(&self, bo: Bo) -> Result<()> {
		let mut args = DrmI915GemWait {
			bo_handle: bo.handle,
			flags: 0,
			timeout_ns: -1,
		};
		unsafe { drm_ioctl_i915_gem_wait(self.fd(), &mut args) }?;
		Ok(())
	}
}

impl Winsys for DrmWinsys {
	fn alloc(&mut self, name: &str, size: u64) -> Result<Bo> {
		let mut create = DrmI915GemCreate { size: size, handle: 0, pad: 0 };
		let r = unsafe { drm_ioctl_i915_gem_create(self.fd(), &mut create) };
		if r.is_err() || create.handle == 0 {
			return Err(Error::Alloc { name: name.to_owned(), size: size });
		}
		self.names.insert(create.handle, name.to_owned());
		debug!("created {} bo {} ({} bytes)", name, create.handle, create.size);
		Ok(Bo { handle: create.handle, size: create.size })
	}

	fn free(&mut self, bo: Bo) {
		let close = DrmGemClose { handle: bo.handle, pad: 0 };
		if let Err(e) = unsafe { drm_ioctl_gem_close(self.fd(), &close) } {
			warn!("failed to close bo {}: {}", bo.handle, e);
		}
		self.names.remove(&bo.handle);
	}

	/// The kernel evicts past roughly three quarters of the aperture.
	fn check_aperture(&self, bos: &[Bo]) -> bool {
		let mut seen = std::collections::HashSet::new();
		let total: u64 = bos.iter()
			.filter(|bo| seen.insert(bo.handle))
			.map(|bo| bo.size)
			.sum();
		total <= self.aperture * 3 / 4
	}

	fn submit(&mut self, batch: &Batch) -> Result<()> {
		self.write_bo(batch.bo, 0, &to_bytes(batch.words))?;

		let relocs: Vec<DrmI915GemRelocationEntry> = batch.relocs.iter().map(|r| DrmI915GemRelocationEntry {
			target_handle: r.bo.handle,
			delta: r.delta,
			offset: r.pos as u64 * 4,
			presumed_offset: 0,
			read_domains: r.read_domains,
			write_domain: r.write_domain,
		}).collect();

		// every target first, the batch last
		let mut objects = Vec::new();
		for r in batch.relocs {
			if r.bo.handle != batch.bo.handle && !objects.iter().any(|o: &DrmI915GemExecObject2| o.handle == r.bo.handle) {
				objects.push(DrmI915GemExecObject2::new(r.bo.handle));
			}
		}
		objects.push(DrmI915GemExecObject2::new(batch.bo.handle).with_relocs(&relocs));

		let execbuf = DrmI915GemExecbuffer2::new(&objects, (batch.used * 4) as u32);
		unsafe { drm_ioctl_i915_gem_execbuffer2(self.fd(), &execbuf) }.map_err(|e| match e {
			nix::errno::Errno::ENOSPC => Error::OutOfAperture,
			e => Error::Submit(format!("execbuffer2 on {} objects: {}", objects.len(), e)),
		})?;
		debug!("submitted {} words with {} relocations", batch.used, relocs.len());
		Ok(())
	}
}

impl Drop for DrmWinsys {
	fn drop(&mut self) {
		for (handle, name) in self.names.drain() {
			debug!("closing leaked {} bo {}", name, handle);
			let close = DrmGemClose { handle: handle, pad: 0 };
			let _ = unsafe { drm_ioctl_gem_close(self.file.as_raw_fd(), &close) };
		}
	}
}
