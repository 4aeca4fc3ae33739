use crate::error::{Error, Result};
use crate::pci_ids;

/// Hardware generations this crate emits commands for.  Ordered, so that
/// `dev.gen >= Gen::Gen7` reads like the hardware documentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Gen {
	Gen6,
	Gen7,
	Gen75,
}

impl Gen {
	pub fn parse(s: &str) -> Option<Gen> {
		match s {
			"6" => Some(Gen::Gen6),
			"7" => Some(Gen::Gen7),
			"7.5" | "75" => Some(Gen::Gen75),
			_ => None,
		}
	}
}

/// Immutable description of the target GPU.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
	pub devid: u16,
	pub name: &'static str,
	pub gen: Gen,
	pub gt: u32,
	pub has_llc: bool,
	pub urb_size: u32,
	pub max_vs_threads: u32,
	pub max_gs_threads: u32,
	pub max_wm_threads: u32,
}

impl DeviceInfo {
	pub fn from_pci_id(devid: u16) -> Result<DeviceInfo> {
		let (name, gen, gt) = pci_ids::pci_id_lookup(devid)
			.ok_or(Error::UnknownDevice(devid))?;
		let mut dev = DeviceInfo::new(gen, gt);
		dev.devid = devid;
		dev.name = name;
		Ok(dev)
	}

	pub fn new(gen: Gen, gt: u32) -> DeviceInfo {
		match gen {
			Gen::Gen6 => DeviceInfo::snb(gt),
			Gen::Gen7 => DeviceInfo::ivb(gt),
			Gen::Gen75 => DeviceInfo::hsw(gt),
		}
	}

	pub fn snb(gt: u32) -> DeviceInfo {
		let gt2 = gt >= 2;
		DeviceInfo {
			devid: 0,
			name: "Sandybridge",
			gen: Gen::Gen6,
			gt: if gt2 { 2 } else { 1 },
			has_llc: true,
			urb_size: if gt2 { 64 * 1024 } else { 32 * 1024 },
			max_vs_threads: if gt2 { 60 } else { 24 },
			max_gs_threads: if gt2 { 60 } else { 21 },
			max_wm_threads: if gt2 { 80 } else { 40 },
		}
	}

	pub fn ivb(gt: u32) -> DeviceInfo {
		let gt2 = gt >= 2;
		DeviceInfo {
			devid: 0,
			name: "Ivybridge",
			gen: Gen::Gen7,
			gt: if gt2 { 2 } else { 1 },
			has_llc: true,
			urb_size: if gt2 { 256 * 1024 } else { 128 * 1024 },
			max_vs_threads: if gt2 { 128 } else { 36 },
			max_gs_threads: if gt2 { 128 } else { 36 },
			max_wm_threads: if gt2 { 172 } else { 48 },
		}
	}

	pub fn hsw(gt: u32) -> DeviceInfo {
		let gt = gt.max(1).min(3);
		let (urb_size, vs, gs, wm) = match gt {
			3 => (512 * 1024, 280, 256, 408),
			2 => (256 * 1024, 280, 256, 204),
			_ => (128 * 1024, 70, 70, 102),
		};
		DeviceInfo {
			devid: 0,
			name: "Haswell",
			gen: Gen::Gen75,
			gt: gt,
			has_llc: true,
			urb_size: urb_size,
			max_vs_threads: vs,
			max_gs_threads: gs,
			max_wm_threads: wm,
		}
	}

	pub fn is_gen6(&self) -> bool {
		self.gen == Gen::Gen6
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn device_constants() {
		let snb = DeviceInfo::from_pci_id(0x0126).unwrap();
		assert_eq!(snb.gen, Gen::Gen6);
		assert_eq!(snb.urb_size, 64 * 1024);
		assert_eq!(snb.max_wm_threads, 80);

		let ivb = DeviceInfo::ivb(1);
		assert_eq!(ivb.urb_size, 128 * 1024);
		assert_eq!(ivb.max_vs_threads, 36);

		let hsw = DeviceInfo::from_pci_id(0x0422).unwrap();
		assert_eq!((hsw.gen, hsw.gt, hsw.urb_size), (Gen::Gen75, 3, 512 * 1024));
		assert!(Gen::Gen75 > Gen::Gen7 && Gen::Gen7 > Gen::Gen6);
	}

	#[test]
	fn unknown_device() {
		match DeviceInfo::from_pci_id(0x1234) {
			Err(Error::UnknownDevice(0x1234)) => (),
			other => panic!("unexpected {:?}", other),
		}
	}
}
