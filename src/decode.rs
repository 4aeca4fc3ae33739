// Batch buffer splitting and printing, for dumps and tests.

use std::collections::HashMap;
use num::FromPrimitive;
use crate::cmd::{Gen7Opcode, MiOpcode, Opcode};

const TYPE_MI: u32 = 0x0;
const TYPE_3D: u32 = 0x3;

pub struct Packet {
	/// Position of the header in the batch, in words.
	pub pos: usize,
	pub header: u32,
	pub words: Vec<u32>,
}

fn packet_len(header: u32) -> usize {
	match header >> 29 {
		TYPE_MI => {
			let opcode = (header >> 23) & 0x3f;
			if opcode == MiOpcode::NOOP as u32 || opcode == MiOpcode::BATCH_BUFFER_END as u32 {
				1
			} else {
				(header & 0x3f) as usize + 2
			}
		}
		TYPE_3D => (header & 0xff) as usize + 2,
		_ => 1,
	}
}

/// Cut `stream` into commands.  A command running past the end keeps the
/// words that are there.
pub fn split(stream: &[u32]) -> Vec<Packet> {
	let mut packets = Vec::new();
	let mut pos = 0;
	while pos < stream.len() {
		let header = stream[pos];
		let end = (pos + packet_len(header)).min(stream.len());
		packets.push(Packet { pos: pos, header: header, words: stream[pos + 1..end].to_vec() });
		pos = end;
	}
	packets
}

/// Name of the command `header` starts.  Opcodes GEN7 reassigned print
/// both names.
pub fn command_name(header: u32) -> String {
	match header >> 29 {
		TYPE_MI => match MiOpcode::from_u32((header >> 23) & 0x3f) {
			Some(op) => format!("MI_{:?}", op),
			None => format!("MI_UNKNOWN({:#x})", (header >> 23) & 0x3f),
		},
		TYPE_3D => {
			let opcode = header >> 16;
			let gen6: Option<Opcode> = FromPrimitive::from_u32(opcode);
			let gen7: Option<Gen7Opcode> = FromPrimitive::from_u32(opcode);
			let trim = |s: String| s.trim_start_matches('_').to_owned();
			match (gen6, gen7) {
				(Some(a), Some(b)) => format!("{}|{}", trim(format!("{:?}", a)), trim(format!("{:?}", b))),
				(Some(a), None) => trim(format!("{:?}", a)),
				(None, Some(b)) => trim(format!("{:?}", b)),
				(None, None) => format!("UNKNOWN({:#06x})", opcode),
			}
		}
		t => format!("TYPE{}", t),
	}
}

/// Print every command with its label, if one was written in front of it.
pub fn print_batch(stream: &[u32], labels: &HashMap<usize, String>) {
	for packet in split(stream) {
		if let Some(label) = labels.get(&packet.pos) {
			println!("# {}", label);
		}
		println!("{:08x} {}", packet.header, command_name(packet.header));
		for word in packet.words {
			println!("  {:08x}", word);
		}
	}
}

pub fn split_and_print(stream: &[u32]) {
	print_batch(stream, &HashMap::new());
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cp::Cp;
	use crate::dev::DeviceInfo;
	use crate::gpe_gen6;
	use crate::winsys::SoftWinsys;
	use pretty_assertions::assert_eq;

	#[test]
	fn split_encoded_commands() {
		let snb = DeviceInfo::snb(1);
		let mut cp = Cp::new(Box::new(SoftWinsys::new(1 << 30)), 4096).unwrap();
		gpe_gen6::emit_pipe_control(&snb, &mut cp, crate::cmd::PIPE_CONTROL_DEPTH_STALL, None, 0, false);
		gpe_gen6::emit_3dstate_sample_mask(&snb, &mut cp, 1);
		gpe_gen6::emit_state_sip(&snb, &mut cp, 0);

		let packets = split(cp.commands());
		let names: Vec<String> = packets.iter().map(|p| command_name(p.header)).collect();
		assert_eq!(names, vec!["PIPE_CONTROL", "3DSTATE_SAMPLE_MASK", "STATE_SIP"]);
		assert_eq!(packets[1].pos, 4);
		assert_eq!(packets[1].words, vec![1]);
	}

	#[test]
	fn names() {
		assert_eq!(command_name(MiOpcode::BATCH_BUFFER_END.header(1)), "MI_BATCH_BUFFER_END");
		assert_eq!(command_name(Opcode::_3DSTATE_URB.header(3)), "3DSTATE_URB|3DSTATE_DEPTH_BUFFER");
		assert_eq!(command_name(Gen7Opcode::_3DSTATE_PS.header(8)), "3DSTATE_PS");
		assert_eq!(command_name(0x7fff_0000), "UNKNOWN(0x7fff)");
	}

	#[test]
	fn truncated_command() {
		let packets = split(&[Opcode::PIPE_CONTROL.header(4), 0]);
		assert_eq!(packets.len(), 1);
		assert_eq!(packets[0].words, vec![0]);
	}
}
