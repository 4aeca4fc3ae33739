// i915 GEM ioctls, called directly instead of through libdrm_intel.

use std::marker::PhantomData;

const DRM_IOCTL_BASE: u8 = b'd'; // 0x64
const DRM_COMMAND_BASE: u8 = b'@'; // 0x40

const DRM_GEM_CLOSE: u8 = 0x09;
const DRM_I915_GETPARAM: u8 = 0x06;
const DRM_I915_GEM_CREATE: u8 = 0x1b;
const DRM_I915_GEM_PREAD: u8 = 0x1c;
const DRM_I915_GEM_PWRITE: u8 = 0x1d;
const DRM_I915_GEM_SET_TILING: u8 = 0x21;
const DRM_I915_GEM_GET_APERTURE: u8 = 0x23;
const DRM_I915_GEM_EXECBUFFER2: u8 = 0x29;
const DRM_I915_GEM_WAIT: u8 = 0x2c;

pub const I915_PARAM_CHIPSET_ID: i32 = 4;
pub const I915_PARAM_HAS_LLC: i32 = 17;

pub const I915_EXEC_RENDER: u64 = 1 << 0;

pub const I915_TILING_NONE: u32 = 0;
pub const I915_TILING_X: u32 = 1;
pub const I915_TILING_Y: u32 = 2;

ioctl_write_ptr!(drm_ioctl_gem_close, DRM_IOCTL_BASE, DRM_GEM_CLOSE, DrmGemClose);
ioctl_readwrite!(drm_ioctl_i915_getparam, DRM_IOCTL_BASE, DRM_COMMAND_BASE + DRM_I915_GETPARAM, DrmI915Getparam);
ioctl_readwrite!(drm_ioctl_i915_gem_create, DRM_IOCTL_BASE, DRM_COMMAND_BASE + DRM_I915_GEM_CREATE, DrmI915GemCreate);
ioctl_write_ptr!(drm_ioctl_i915_gem_pread, DRM_IOCTL_BASE, DRM_COMMAND_BASE + DRM_I915_GEM_PREAD, DrmI915GemPread);
ioctl_write_ptr!(drm_ioctl_i915_gem_pwrite, DRM_IOCTL_BASE, DRM_COMMAND_BASE + DRM_I915_GEM_PWRITE, DrmI915GemPwrite);
ioctl_readwrite!(drm_ioctl_i915_gem_set_tiling, DRM_IOCTL_BASE, DRM_COMMAND_BASE + DRM_I915_GEM_SET_TILING, DrmI915GemSetTiling);
ioctl_read!(drm_ioctl_i915_gem_get_aperture, DRM_IOCTL_BASE, DRM_COMMAND_BASE + DRM_I915_GEM_GET_APERTURE, DrmI915GemGetAperture);
ioctl_write_ptr!(drm_ioctl_i915_gem_execbuffer2, DRM_IOCTL_BASE, DRM_COMMAND_BASE + DRM_I915_GEM_EXECBUFFER2, DrmI915GemExecbuffer2);
ioctl_readwrite!(drm_ioctl_i915_gem_wait, DRM_IOCTL_BASE, DRM_COMMAND_BASE + DRM_I915_GEM_WAIT, DrmI915GemWait);

#[repr(C)]
#[derive(Default)]
pub struct DrmGemClose {
	pub handle: u32,
	pub pad: u32,
}

#[repr(C)]
pub struct DrmI915Getparam<'a> {
	pub param: i32,
	value: u64,
	phantom: PhantomData<&'a mut i32>,
}

impl<'a> DrmI915Getparam<'a> {
	pub fn new(param: i32, value: &'a mut i32) -> Self {
		DrmI915Getparam {
			param: param,
			value: value as *mut i32 as u64,
			phantom: PhantomData,
		}
	}
}

#[repr(C)]
#[derive(Default)]
pub struct DrmI915GemCreate {
	pub size: u64,
	pub handle: u32,
	pub pad: u32,
}

#[repr(C)]
pub struct DrmI915GemPread<'a> {
	pub handle: u32,
	pub pad: u32,
	pub offset: u64,
	pub size: u64,
	data_ptr: u64,
	phantom: PhantomData<&'a mut [u8]>,
}

impl<'a> DrmI915GemPread<'a> {
	pub fn new(handle: u32, offset: u64, data: &'a mut [u8]) -> Self {
		DrmI915GemPread {
			handle: handle,
			pad: 0,
			offset: offset,
			size: data.len() as u64,
			data_ptr: data.as_mut_ptr() as u64,
			phantom: PhantomData,
		}
	}
}

#[repr(C)]
pub struct DrmI915GemPwrite<'a> {
	pub handle: u32,
	pub pad: u32,
	pub offset: u64,
	pub size: u64,
	data_ptr: u64,
	phantom: PhantomData<&'a [u8]>,
}

impl<'a> DrmI915GemPwrite<'a> {
	pub fn new(handle: u32, offset: u64, data: &'a [u8]) -> Self {
		DrmI915GemPwrite {
			handle: handle,
			pad: 0,
			offset: offset,
			size: data.len() as u64,
			data_ptr: data.as_ptr() as u64,
			phantom: PhantomData,
		}
	}
}

#[repr(C)]
#[derive(Default)]
pub struct DrmI915GemSetTiling {
	pub handle: u32,
	pub tiling_mode: u32,
	pub stride: u32,
	pub swizzle_mode: u32,
}

#[repr(C)]
#[derive(Default)]
pub struct DrmI915GemGetAperture {
	pub aper_size: u64,
	pub aper_available_size: u64,
}

#[repr(C)]
#[derive(Default)]
pub struct DrmI915GemWait {
	pub bo_handle: u32,
	pub flags: u32,
	pub timeout_ns: i64,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct DrmI915GemRelocationEntry {
	pub target_handle: u32,
	pub delta: u32,
	/// Byte offset of the patched word in its object.
	pub offset: u64,
	pub presumed_offset: u64,
	pub read_domains: u32,
	pub write_domain: u32,
}

#[repr(C)]
#[derive(Default)]
pub struct DrmI915GemExecObject2 {
	pub handle: u32,
	pub relocation_count: u32,
	pub relocs_ptr: u64,
	pub alignment: u64,
	pub offset: u64,
	pub flags: u64,
	pub rsvd1: u64,
	pub rsvd2: u64,
}

impl DrmI915GemExecObject2 {
	pub fn new(handle: u32) -> Self {
		DrmI915GemExecObject2 { handle: handle, ..Default::default() }
	}

	/// Attach `relocs`, which must outlive the execbuffer call.
	pub fn with_relocs(mut self, relocs: &[DrmI915GemRelocationEntry]) -> Self {
		self.relocation_count = relocs.len() as u32;
		self.relocs_ptr = if relocs.is_empty() { 0 } else { relocs.as_ptr() as u64 };
		self
	}
}

#[repr(C)]
pub struct DrmI915GemExecbuffer2<'a> {
	buffers_ptr: u64,
	buffer_count: u32,
	pub batch_start_offset: u32,
	pub batch_len: u32,
	pub dr1: u32,
	pub dr4: u32,
	pub num_cliprects: u32,
	pub cliprects_ptr: u64,
	pub flags: u64,
	pub rsvd1: u64,
	pub rsvd2: u64,
	phantom: PhantomData<&'a [DrmI915GemExecObject2]>,
}

impl<'a> DrmI915GemExecbuffer2<'a> {
	/// The batch is the last of `objects`.
	pub fn new(objects: &'a [DrmI915GemExecObject2], batch_len: u32) -> Self {
		DrmI915GemExecbuffer2 {
			buffers_ptr: objects.as_ptr() as u64,
			buffer_count: objects.len() as u32,
			batch_start_offset: 0,
			batch_len: batch_len,
			dr1: 0,
			dr4: 0,
			num_cliprects: 0,
			cliprects_ptr: 0,
			flags: I915_EXEC_RENDER,
			rsvd1: 0,
			rsvd2: 0,
			phantom: PhantomData,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::mem::size_of;
	use pretty_assertions::assert_eq;

	#[test]
	fn struct_sizes_match_the_kernel() {
		assert_eq!(size_of::<DrmI915Getparam>(), 16);
		assert_eq!(size_of::<DrmI915GemCreate>(), 16);
		assert_eq!(size_of::<DrmI915GemPwrite>(), 32);
		assert_eq!(size_of::<DrmI915GemRelocationEntry>(), 32);
		assert_eq!(size_of::<DrmI915GemExecObject2>(), 56);
		assert_eq!(size_of::<DrmI915GemExecbuffer2>(), 64);
		assert_eq!(size_of::<DrmI915GemWait>(), 16);
	}
}
