use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("i/o error: {0}")]
	Io(#[from] io::Error),
	#[error("ioctl failed: {0}")]
	Ioctl(#[from] nix::Error),
	#[error("unknown PCI device id {0:#06x}")]
	UnknownDevice(u16),
	#[error("failed to allocate buffer object \"{name}\" of {size} bytes")]
	Alloc { name: String, size: u64 },
	#[error("batch submission failed: {0}")]
	Submit(String),
	#[error("referenced buffers do not fit in the aperture")]
	OutOfAperture,
	#[error("invalid argument: {0}")]
	Invalid(String),
}

pub type Result<T> = std::result::Result<T, Error>;
