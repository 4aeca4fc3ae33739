// Command opcodes and hardware field values shared by the encoders.

/// 3D and media commands, keyed by bits 31:16 of the header.  Values are
/// the GEN6 assignments; GEN7 moved or added the ones in `Gen7Opcode`.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Opcode {
	STATE_BASE_ADDRESS = 0x6101,
	STATE_SIP = 0x6102,
	VF_STATISTICS = 0x680b,
	PIPELINE_SELECT = 0x6904,
	_3DSTATE_BINDING_TABLE_POINTERS = 0x7801,
	_3DSTATE_SAMPLER_STATE_POINTERS = 0x7802,
	_3DSTATE_URB = 0x7805,
	_3DSTATE_VERTEX_BUFFERS = 0x7808,
	_3DSTATE_VERTEX_ELEMENTS = 0x7809,
	_3DSTATE_INDEX_BUFFER = 0x780a,
	_3DSTATE_VF = 0x780c,
	_3DSTATE_VIEWPORT_STATE_POINTERS = 0x780d,
	_3DSTATE_CC_STATE_POINTERS = 0x780e,
	_3DSTATE_SCISSOR_STATE_POINTERS = 0x780f,
	_3DSTATE_VS = 0x7810,
	_3DSTATE_GS = 0x7811,
	_3DSTATE_CLIP = 0x7812,
	_3DSTATE_SF = 0x7813,
	_3DSTATE_WM = 0x7814,
	_3DSTATE_CONSTANT_VS = 0x7815,
	_3DSTATE_CONSTANT_GS = 0x7816,
	_3DSTATE_CONSTANT_PS = 0x7817,
	_3DSTATE_SAMPLE_MASK = 0x7818,
	_3DSTATE_DRAWING_RECTANGLE = 0x7900,
	_3DSTATE_DEPTH_BUFFER = 0x7905,
	_3DSTATE_POLY_STIPPLE_OFFSET = 0x7906,
	_3DSTATE_POLY_STIPPLE_PATTERN = 0x7907,
	_3DSTATE_LINE_STIPPLE = 0x7908,
	_3DSTATE_AA_LINE_PARAMETERS = 0x790a,
	_3DSTATE_GS_SVB_INDEX = 0x790b,
	_3DSTATE_MULTISAMPLE = 0x790d,
	_3DSTATE_STENCIL_BUFFER = 0x790e,
	_3DSTATE_HIER_DEPTH_BUFFER = 0x790f,
	_3DSTATE_CLEAR_PARAMS = 0x7910,
	PIPE_CONTROL = 0x7a00,
	_3DPRIMITIVE = 0x7b00,
}

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Gen7Opcode {
	_3DSTATE_CLEAR_PARAMS = 0x7804,
	_3DSTATE_DEPTH_BUFFER = 0x7805,
	_3DSTATE_STENCIL_BUFFER = 0x7806,
	_3DSTATE_HIER_DEPTH_BUFFER = 0x7807,
	_3DSTATE_CONSTANT_HS = 0x7819,
	_3DSTATE_CONSTANT_DS = 0x781a,
	_3DSTATE_HS = 0x781b,
	_3DSTATE_TE = 0x781c,
	_3DSTATE_DS = 0x781d,
	_3DSTATE_STREAMOUT = 0x781e,
	_3DSTATE_SBE = 0x781f,
	_3DSTATE_PS = 0x7820,
	_3DSTATE_VIEWPORT_STATE_POINTERS_SF_CLIP = 0x7821,
	_3DSTATE_VIEWPORT_STATE_POINTERS_CC = 0x7823,
	_3DSTATE_BLEND_STATE_POINTERS = 0x7824,
	_3DSTATE_DEPTH_STENCIL_STATE_POINTERS = 0x7825,
	_3DSTATE_BINDING_TABLE_POINTERS_VS = 0x7826,
	_3DSTATE_BINDING_TABLE_POINTERS_HS = 0x7827,
	_3DSTATE_BINDING_TABLE_POINTERS_DS = 0x7828,
	_3DSTATE_BINDING_TABLE_POINTERS_GS = 0x7829,
	_3DSTATE_BINDING_TABLE_POINTERS_PS = 0x782a,
	_3DSTATE_SAMPLER_STATE_POINTERS_VS = 0x782b,
	_3DSTATE_SAMPLER_STATE_POINTERS_HS = 0x782c,
	_3DSTATE_SAMPLER_STATE_POINTERS_DS = 0x782d,
	_3DSTATE_SAMPLER_STATE_POINTERS_GS = 0x782e,
	_3DSTATE_SAMPLER_STATE_POINTERS_PS = 0x782f,
	_3DSTATE_URB_VS = 0x7830,
	_3DSTATE_URB_HS = 0x7831,
	_3DSTATE_URB_DS = 0x7832,
	_3DSTATE_URB_GS = 0x7833,
	_3DSTATE_PUSH_CONSTANT_ALLOC_VS = 0x7912,
	_3DSTATE_PUSH_CONSTANT_ALLOC_HS = 0x7913,
	_3DSTATE_PUSH_CONSTANT_ALLOC_DS = 0x7914,
	_3DSTATE_PUSH_CONSTANT_ALLOC_GS = 0x7915,
	_3DSTATE_PUSH_CONSTANT_ALLOC_PS = 0x7916,
	_3DSTATE_SO_DECL_LIST = 0x7917,
	_3DSTATE_SO_BUFFER = 0x7918,
}

/// Memory interface commands, keyed by bits 28:23 of the header.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
pub enum MiOpcode {
	NOOP = 0x00,
	BATCH_BUFFER_END = 0x0a,
	STORE_DATA_IMM = 0x20,
	LOAD_REGISTER_IMM = 0x22,
	STORE_REGISTER_MEM = 0x24,
}

impl Opcode {
	pub fn header(self, len: usize) -> u32 {
		(self as u32) << 16 | (len as u32 - 2)
	}
}

impl Gen7Opcode {
	pub fn header(self, len: usize) -> u32 {
		(self as u32) << 16 | (len as u32 - 2)
	}
}

impl MiOpcode {
	pub fn header(self, len: usize) -> u32 {
		if len < 2 {
			(self as u32) << 23
		} else {
			(self as u32) << 23 | (len as u32 - 2)
		}
	}
}

pub const MI_GLOBAL_GTT: u32 = 1 << 22;

// PIPE_CONTROL DW1
pub const PIPE_CONTROL_DEPTH_CACHE_FLUSH: u32 = 1 << 0;
pub const PIPE_CONTROL_PIXEL_SCOREBOARD_STALL: u32 = 1 << 1;
pub const PIPE_CONTROL_STATE_CACHE_INVALIDATE: u32 = 1 << 2;
pub const PIPE_CONTROL_CONSTANT_CACHE_INVALIDATE: u32 = 1 << 3;
pub const PIPE_CONTROL_VF_CACHE_INVALIDATE: u32 = 1 << 4;
pub const PIPE_CONTROL_TEXTURE_CACHE_INVALIDATE: u32 = 1 << 10;
pub const PIPE_CONTROL_INSTRUCTION_CACHE_INVALIDATE: u32 = 1 << 11;
pub const PIPE_CONTROL_RENDER_CACHE_FLUSH: u32 = 1 << 12;
pub const PIPE_CONTROL_DEPTH_STALL: u32 = 1 << 13;
pub const PIPE_CONTROL_WRITE_IMM: u32 = 1 << 14;
pub const PIPE_CONTROL_WRITE_PS_DEPTH_COUNT: u32 = 2 << 14;
pub const PIPE_CONTROL_WRITE_TIMESTAMP: u32 = 3 << 14;
pub const PIPE_CONTROL_WRITE_MASK: u32 = 3 << 14;
pub const PIPE_CONTROL_CS_STALL: u32 = 1 << 20;
pub const PIPE_CONTROL_GLOBAL_GTT_WRITE: u32 = 1 << 24;
// GEN6 carries the GTT selector in the address dword
pub const PIPE_CONTROL_GEN6_GLOBAL_GTT: u32 = 1 << 2;

// 3DPRIMITIVE topologies
pub const PRIM_POINTLIST: u32 = 0x01;
pub const PRIM_LINELIST: u32 = 0x02;
pub const PRIM_LINESTRIP: u32 = 0x03;
pub const PRIM_TRILIST: u32 = 0x04;
pub const PRIM_TRISTRIP: u32 = 0x05;
pub const PRIM_TRIFAN: u32 = 0x06;
pub const PRIM_QUADLIST: u32 = 0x07;
pub const PRIM_QUADSTRIP: u32 = 0x08;
pub const PRIM_LINELIST_ADJ: u32 = 0x09;
pub const PRIM_LINESTRIP_ADJ: u32 = 0x0a;
pub const PRIM_TRILIST_ADJ: u32 = 0x0b;
pub const PRIM_TRISTRIP_ADJ: u32 = 0x0c;
pub const PRIM_POLYGON: u32 = 0x0e;
pub const PRIM_RECTLIST: u32 = 0x0f;
pub const PRIM_LINELOOP: u32 = 0x10;

// vertex element component control
pub const VFCOMP_NOSTORE: u32 = 0;
pub const VFCOMP_STORE_SRC: u32 = 1;
pub const VFCOMP_STORE_0: u32 = 2;
pub const VFCOMP_STORE_1_FP: u32 = 3;
pub const VFCOMP_STORE_1_INT: u32 = 4;
pub const VFCOMP_STORE_VID: u32 = 5;
pub const VFCOMP_STORE_IID: u32 = 6;

// SURFACE_STATE surface types
pub const SURFTYPE_1D: u32 = 0;
pub const SURFTYPE_2D: u32 = 1;
pub const SURFTYPE_3D: u32 = 2;
pub const SURFTYPE_CUBE: u32 = 3;
pub const SURFTYPE_BUFFER: u32 = 4;
pub const SURFTYPE_NULL: u32 = 7;

// 3DSTATE_DEPTH_BUFFER formats
pub const ZFORMAT_D32_FLOAT_S8X24_UINT: u32 = 0;
pub const ZFORMAT_D32_FLOAT: u32 = 1;
pub const ZFORMAT_D24_UNORM_S8_UINT: u32 = 2;
pub const ZFORMAT_D24_UNORM_X8_UINT: u32 = 3;
pub const ZFORMAT_D16_UNORM: u32 = 5;

// COMPAREFUNCTION
pub const COMPAREFUNCTION_ALWAYS: u32 = 0;
pub const COMPAREFUNCTION_NEVER: u32 = 1;
pub const COMPAREFUNCTION_LESS: u32 = 2;
pub const COMPAREFUNCTION_EQUAL: u32 = 3;
pub const COMPAREFUNCTION_LEQUAL: u32 = 4;
pub const COMPAREFUNCTION_GREATER: u32 = 5;
pub const COMPAREFUNCTION_NOTEQUAL: u32 = 6;
pub const COMPAREFUNCTION_GEQUAL: u32 = 7;

// PS_DEPTH_COUNT and the pipeline statistics registers
pub const REG_PS_DEPTH_COUNT: u32 = 0x2350;
pub const REG_TIMESTAMP: u32 = 0x2358;
pub const REG_IA_VERTICES_COUNT: u32 = 0x2310;
pub const REG_IA_PRIMITIVES_COUNT: u32 = 0x2318;
pub const REG_VS_INVOCATION_COUNT: u32 = 0x2320;
pub const REG_GS_INVOCATION_COUNT: u32 = 0x2328;
pub const REG_GS_PRIMITIVES_COUNT: u32 = 0x2330;
pub const REG_CL_INVOCATION_COUNT: u32 = 0x2338;
pub const REG_CL_PRIMITIVES_COUNT: u32 = 0x2340;
pub const REG_PS_INVOCATION_COUNT: u32 = 0x2348;
pub const REG_HS_INVOCATION_COUNT: u32 = 0x2300;
pub const REG_DS_INVOCATION_COUNT: u32 = 0x2308;

#[cfg(test)]
mod tests {
	use super::*;
	use num::FromPrimitive;

	#[test]
	fn headers() {
		assert_eq!(Opcode::_3DSTATE_VS.header(6), 0x7810_0004);
		assert_eq!(Opcode::PIPE_CONTROL.header(5), 0x7a00_0003);
		assert_eq!(Gen7Opcode::_3DSTATE_PS.header(8), 0x7820_0006);
		assert_eq!(MiOpcode::BATCH_BUFFER_END.header(1), 0x0500_0000);
		assert_eq!(MiOpcode::STORE_REGISTER_MEM.header(3), 0x1200_0001);
	}

	#[test]
	fn opcode_lookup() {
		assert_eq!(Opcode::from_u32(0x7b00), Some(Opcode::_3DPRIMITIVE));
		assert_eq!(Gen7Opcode::from_u32(0x7918), Some(Gen7Opcode::_3DSTATE_SO_BUFFER));
		assert_eq!(MiOpcode::from_u32(0x22), Some(MiOpcode::LOAD_REGISTER_IMM));
		assert_eq!(Opcode::from_u32(0x1234), None);
	}
}
