use crate::dev::Gen;

const PCI_IDS: &[(u16, &str, Gen, u32)] = &[
	(0x0102, "Sandybridge Desktop GT1", Gen::Gen6, 1),
	(0x0106, "Sandybridge Mobile GT1", Gen::Gen6, 1),
	(0x010a, "Sandybridge Server", Gen::Gen6, 1),
	(0x0112, "Sandybridge Desktop GT2", Gen::Gen6, 2),
	(0x0116, "Sandybridge Mobile GT2", Gen::Gen6, 2),
	(0x0122, "Sandybridge Desktop GT2+", Gen::Gen6, 2),
	(0x0126, "Sandybridge Mobile GT2+", Gen::Gen6, 2),
	(0x0152, "Ivybridge Desktop GT1", Gen::Gen7, 1),
	(0x0156, "Ivybridge Mobile GT1", Gen::Gen7, 1),
	(0x015a, "Ivybridge Server GT1", Gen::Gen7, 1),
	(0x0162, "Ivybridge Desktop GT2", Gen::Gen7, 2),
	(0x0166, "Ivybridge Mobile GT2", Gen::Gen7, 2),
	(0x016a, "Ivybridge Server GT2", Gen::Gen7, 2),
	(0x0402, "Haswell Desktop GT1", Gen::Gen75, 1),
	(0x0406, "Haswell Mobile GT1", Gen::Gen75, 1),
	(0x0a06, "Haswell ULT GT1", Gen::Gen75, 1),
	(0x0412, "Haswell Desktop GT2", Gen::Gen75, 2),
	(0x0416, "Haswell Mobile GT2", Gen::Gen75, 2),
	(0x0a16, "Haswell ULT GT2", Gen::Gen75, 2),
	(0x0422, "Haswell Desktop GT3", Gen::Gen75, 3),
	(0x0426, "Haswell Mobile GT3", Gen::Gen75, 3),
	(0x0a26, "Haswell ULT GT3", Gen::Gen75, 3),
	(0x0d22, "Haswell CRW GT3", Gen::Gen75, 3),
];

/// Name, generation and GT tier of a supported device.
pub fn pci_id_lookup(devid: u16) -> Option<(&'static str, Gen, u32)> {
	PCI_IDS.iter()
		.find(|&&(id, _, _, _)| id == devid)
		.map(|&(_, name, gen, gt)| (name, gen, gt))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lookup_known_and_unknown() {
		assert_eq!(pci_id_lookup(0x0116), Some(("Sandybridge Mobile GT2", Gen::Gen6, 2)));
		assert_eq!(pci_id_lookup(0x0d22).map(|(_, gen, gt)| (gen, gt)), Some((Gen::Gen75, 3)));
		assert_eq!(pci_id_lookup(0x9a49), None);
	}
}
