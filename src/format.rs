// Pixel formats known to the surface builders and the layout planner, and
// their hardware surface format numbers.

use crate::dev::{DeviceInfo, Gen};

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
	B8G8R8A8_UNORM,
	B8G8R8X8_UNORM,
	R8G8B8A8_UNORM,
	R8G8B8X8_UNORM,
	B5G6R5_UNORM,
	R10G10B10A2_UNORM,
	A8_UNORM,
	R8_UNORM,
	R8G8_UNORM,
	R16_UNORM,
	R16_FLOAT,
	R16G16B16A16_FLOAT,
	R32_FLOAT,
	R32G32_FLOAT,
	R32G32B32_FLOAT,
	R32G32B32A32_FLOAT,
	R8_UINT,
	R16_UINT,
	R32_UINT,
	R32_SINT,
	R8G8B8A8_UINT,
	R32G32B32A32_UINT,
	DXT1_RGBA,
	DXT3_RGBA,
	DXT5_RGBA,
	ETC1_RGB8,
	Z16_UNORM,
	Z24X8_UNORM,
	Z24_UNORM_S8_UINT,
	Z32_FLOAT,
	Z32_FLOAT_S8X24_UINT,
	S8_UINT,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
	Unorm,
	Float,
	Uint,
	Sint,
	Compressed,
	Depth,
	Stencil,
	DepthStencil,
}

// hardware SURFACE_FORMAT values
pub const HW_R32G32B32A32_FLOAT: u32 = 0x000;
pub const HW_R32G32B32A32_UINT: u32 = 0x002;
pub const HW_R32G32B32_FLOAT: u32 = 0x040;
pub const HW_R16G16B16A16_FLOAT: u32 = 0x084;
pub const HW_R32G32_FLOAT: u32 = 0x085;
pub const HW_R32_FLOAT_X8X24_TYPELESS: u32 = 0x088;
pub const HW_B8G8R8A8_UNORM: u32 = 0x0c0;
pub const HW_R10G10B10A2_UNORM: u32 = 0x0c2;
pub const HW_R8G8B8A8_UNORM: u32 = 0x0c7;
pub const HW_R8G8B8A8_UINT: u32 = 0x0cb;
pub const HW_R32_SINT: u32 = 0x0d6;
pub const HW_R32_UINT: u32 = 0x0d7;
pub const HW_R32_FLOAT: u32 = 0x0d8;
pub const HW_R24_UNORM_X8_TYPELESS: u32 = 0x0d9;
pub const HW_B8G8R8X8_UNORM: u32 = 0x0e9;
pub const HW_R8G8B8X8_UNORM: u32 = 0x0eb;
pub const HW_B5G6R5_UNORM: u32 = 0x100;
pub const HW_R8G8_UNORM: u32 = 0x106;
pub const HW_R16_UNORM: u32 = 0x10a;
pub const HW_R16_UINT: u32 = 0x10d;
pub const HW_R16_FLOAT: u32 = 0x10e;
pub const HW_R8_UNORM: u32 = 0x140;
pub const HW_R8_UINT: u32 = 0x143;
pub const HW_A8_UNORM: u32 = 0x144;
pub const HW_BC1_UNORM: u32 = 0x186;
pub const HW_BC2_UNORM: u32 = 0x187;
pub const HW_BC3_UNORM: u32 = 0x188;
pub const HW_ETC1_RGB8: u32 = 0x1a9;

/// What a format is going to be bound as, for support queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bind {
	RenderTarget,
	SamplerView,
	VertexBuffer,
	DepthStencil,
}

const FORMATS: &[(Format, &str)] = &[
	(Format::B8G8R8A8_UNORM, "B8G8R8A8_UNORM"),
	(Format::B8G8R8X8_UNORM, "B8G8R8X8_UNORM"),
	(Format::R8G8B8A8_UNORM, "R8G8B8A8_UNORM"),
	(Format::R8G8B8X8_UNORM, "R8G8B8X8_UNORM"),
	(Format::B5G6R5_UNORM, "B5G6R5_UNORM"),
	(Format::R10G10B10A2_UNORM, "R10G10B10A2_UNORM"),
	(Format::A8_UNORM, "A8_UNORM"),
	(Format::R8_UNORM, "R8_UNORM"),
	(Format::R8G8_UNORM, "R8G8_UNORM"),
	(Format::R16_UNORM, "R16_UNORM"),
	(Format::R16_FLOAT, "R16_FLOAT"),
	(Format::R16G16B16A16_FLOAT, "R16G16B16A16_FLOAT"),
	(Format::R32_FLOAT, "R32_FLOAT"),
	(Format::R32G32_FLOAT, "R32G32_FLOAT"),
	(Format::R32G32B32_FLOAT, "R32G32B32_FLOAT"),
	(Format::R32G32B32A32_FLOAT, "R32G32B32A32_FLOAT"),
	(Format::R8_UINT, "R8_UINT"),
	(Format::R16_UINT, "R16_UINT"),
	(Format::R32_UINT, "R32_UINT"),
	(Format::R32_SINT, "R32_SINT"),
	(Format::R8G8B8A8_UINT, "R8G8B8A8_UINT"),
	(Format::R32G32B32A32_UINT, "R32G32B32A32_UINT"),
	(Format::DXT1_RGBA, "DXT1_RGBA"),
	(Format::DXT3_RGBA, "DXT3_RGBA"),
	(Format::DXT5_RGBA, "DXT5_RGBA"),
	(Format::ETC1_RGB8, "ETC1_RGB8"),
	(Format::Z16_UNORM, "Z16_UNORM"),
	(Format::Z24X8_UNORM, "Z24X8_UNORM"),
	(Format::Z24_UNORM_S8_UINT, "Z24_UNORM_S8_UINT"),
	(Format::Z32_FLOAT, "Z32_FLOAT"),
	(Format::Z32_FLOAT_S8X24_UINT, "Z32_FLOAT_S8X24_UINT"),
	(Format::S8_UINT, "S8_UINT"),
];

impl Format {
	pub fn parse(s: &str) -> Option<Format> {
		let upper = s.to_ascii_uppercase();
		FORMATS.iter()
			.find(|&&(_, name)| name == upper)
			.map(|&(format, _)| format)
	}

	pub fn name(self) -> &'static str {
		FORMATS.iter()
			.find(|&&(format, _)| format == self)
			.map(|&(_, name)| name)
			.unwrap_or("?")
	}

	pub fn kind(self) -> Kind {
		use self::Format::*;
		match self {
			R16_FLOAT | R16G16B16A16_FLOAT | R32_FLOAT | R32G32_FLOAT |
			R32G32B32_FLOAT | R32G32B32A32_FLOAT => Kind::Float,
			R8_UINT | R16_UINT | R32_UINT | R8G8B8A8_UINT | R32G32B32A32_UINT => Kind::Uint,
			R32_SINT => Kind::Sint,
			DXT1_RGBA | DXT3_RGBA | DXT5_RGBA | ETC1_RGB8 => Kind::Compressed,
			Z16_UNORM | Z24X8_UNORM | Z32_FLOAT => Kind::Depth,
			Z24_UNORM_S8_UINT | Z32_FLOAT_S8X24_UINT => Kind::DepthStencil,
			S8_UINT => Kind::Stencil,
			_ => Kind::Unorm,
		}
	}

	/// Size in bytes of one block (one pixel for uncompressed formats).
	pub fn block_size(self) -> u32 {
		use self::Format::*;
		match self {
			A8_UNORM | R8_UNORM | R8_UINT | S8_UINT => 1,
			B5G6R5_UNORM | R8G8_UNORM | R16_UNORM | R16_FLOAT | R16_UINT | Z16_UNORM => 2,
			R16G16B16A16_FLOAT | R32G32_FLOAT | Z32_FLOAT_S8X24_UINT => 8,
			R32G32B32_FLOAT => 12,
			R32G32B32A32_FLOAT | R32G32B32A32_UINT => 16,
			DXT1_RGBA | ETC1_RGB8 => 8,
			DXT3_RGBA | DXT5_RGBA => 16,
			_ => 4,
		}
	}

	/// Block width and height in pixels.
	pub fn block_dim(self) -> (u32, u32) {
		if self.is_compressed() {
			(4, 4)
		} else {
			(1, 1)
		}
	}

	pub fn components(self) -> u32 {
		use self::Format::*;
		match self {
			A8_UNORM | R8_UNORM | R16_UNORM | R16_FLOAT | R32_FLOAT |
			R8_UINT | R16_UINT | R32_UINT | R32_SINT => 1,
			R8G8_UNORM | R32G32_FLOAT => 2,
			B5G6R5_UNORM | R32G32B32_FLOAT | ETC1_RGB8 => 3,
			Z16_UNORM | Z24X8_UNORM | Z32_FLOAT | S8_UINT => 1,
			Z24_UNORM_S8_UINT | Z32_FLOAT_S8X24_UINT => 2,
			_ => 4,
		}
	}

	pub fn is_compressed(self) -> bool {
		self.kind() == Kind::Compressed
	}

	pub fn is_pure_integer(self) -> bool {
		match self.kind() {
			Kind::Uint | Kind::Sint => true,
			_ => false,
		}
	}

	pub fn is_unorm(self) -> bool {
		self.kind() == Kind::Unorm
	}

	pub fn is_depth_or_stencil(self) -> bool {
		match self.kind() {
			Kind::Depth | Kind::Stencil | Kind::DepthStencil => true,
			_ => false,
		}
	}

	pub fn has_depth(self) -> bool {
		match self.kind() {
			Kind::Depth | Kind::DepthStencil => true,
			_ => false,
		}
	}

	pub fn has_stencil(self) -> bool {
		match self.kind() {
			Kind::Stencil | Kind::DepthStencil => true,
			_ => false,
		}
	}

	/// Hardware format of a color format, `None` for depth and stencil.
	pub fn color_format(self) -> Option<u32> {
		use self::Format::*;
		let hw = match self {
			B8G8R8A8_UNORM => HW_B8G8R8A8_UNORM,
			B8G8R8X8_UNORM => HW_B8G8R8X8_UNORM,
			R8G8B8A8_UNORM => HW_R8G8B8A8_UNORM,
			R8G8B8X8_UNORM => HW_R8G8B8X8_UNORM,
			B5G6R5_UNORM => HW_B5G6R5_UNORM,
			R10G10B10A2_UNORM => HW_R10G10B10A2_UNORM,
			A8_UNORM => HW_A8_UNORM,
			R8_UNORM => HW_R8_UNORM,
			R8G8_UNORM => HW_R8G8_UNORM,
			R16_UNORM => HW_R16_UNORM,
			R16_FLOAT => HW_R16_FLOAT,
			R16G16B16A16_FLOAT => HW_R16G16B16A16_FLOAT,
			R32_FLOAT => HW_R32_FLOAT,
			R32G32_FLOAT => HW_R32G32_FLOAT,
			R32G32B32_FLOAT => HW_R32G32B32_FLOAT,
			R32G32B32A32_FLOAT => HW_R32G32B32A32_FLOAT,
			R8_UINT => HW_R8_UINT,
			R16_UINT => HW_R16_UINT,
			R32_UINT => HW_R32_UINT,
			R32_SINT => HW_R32_SINT,
			R8G8B8A8_UINT => HW_R8G8B8A8_UINT,
			R32G32B32A32_UINT => HW_R32G32B32A32_UINT,
			DXT1_RGBA => HW_BC1_UNORM,
			DXT3_RGBA => HW_BC2_UNORM,
			DXT5_RGBA => HW_BC3_UNORM,
			ETC1_RGB8 => HW_ETC1_RGB8,
			_ => return None,
		};
		Some(hw)
	}

	/// Hardware format used when rendering to this format.
	pub fn render_format(self) -> Option<u32> {
		match self {
			Format::B8G8R8X8_UNORM => Some(HW_B8G8R8A8_UNORM),
			_ => self.color_format(),
		}
	}

	/// Hardware format used when sampling from this format.  Depth and
	/// stencil formats are sampled through their color equivalents.
	pub fn texture_format(self) -> Option<u32> {
		match self {
			Format::Z16_UNORM => Some(HW_R16_UNORM),
			Format::Z32_FLOAT => Some(HW_R32_FLOAT),
			Format::Z24X8_UNORM | Format::Z24_UNORM_S8_UINT => Some(HW_R24_UNORM_X8_TYPELESS),
			Format::Z32_FLOAT_S8X24_UINT => Some(HW_R32_FLOAT_X8X24_TYPELESS),
			Format::S8_UINT => Some(HW_R8_UINT),
			_ => self.color_format(),
		}
	}

	pub fn vertex_format(self) -> Option<u32> {
		self.color_format()
	}

	/// Whether the device can use the format for `bind`.
	pub fn is_supported(self, dev: &DeviceInfo, bind: Bind) -> bool {
		use self::Format::*;
		match bind {
			Bind::DepthStencil => match self {
				Z16_UNORM | Z24X8_UNORM | Z32_FLOAT | Z24_UNORM_S8_UINT | Z32_FLOAT_S8X24_UINT => true,
				_ => false,
			},
			Bind::RenderTarget => match self {
				R32G32B32_FLOAT | A8_UNORM => false,
				_ => self.render_format().is_some() && !self.is_compressed(),
			},
			Bind::SamplerView => match self {
				ETC1_RGB8 => dev.gen >= Gen::Gen7,
				_ => self.texture_format().is_some(),
			},
			Bind::VertexBuffer => !self.is_compressed() && self.vertex_format().is_some() &&
				!self.is_depth_or_stencil(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn block_layout() {
		assert_eq!(Format::R8G8B8A8_UNORM.block_size(), 4);
		assert_eq!(Format::DXT1_RGBA.block_dim(), (4, 4));
		assert_eq!(Format::DXT5_RGBA.block_size(), 16);
		assert_eq!(Format::Z32_FLOAT_S8X24_UINT.block_size(), 8);
		assert_eq!(Format::S8_UINT.block_size(), 1);
	}

	#[test]
	fn translation() {
		assert_eq!(Format::R32G32B32A32_FLOAT.color_format(), Some(0));
		assert_eq!(Format::B8G8R8X8_UNORM.render_format(), Some(HW_B8G8R8A8_UNORM));
		assert_eq!(Format::Z24_UNORM_S8_UINT.color_format(), None);
		assert_eq!(Format::Z24_UNORM_S8_UINT.texture_format(), Some(HW_R24_UNORM_X8_TYPELESS));
		assert_eq!(Format::parse("r8g8b8a8_unorm"), Some(Format::R8G8B8A8_UNORM));
		assert_eq!(Format::Z16_UNORM.name(), "Z16_UNORM");
	}

	#[test]
	fn support() {
		let snb = DeviceInfo::snb(2);
		let ivb = DeviceInfo::ivb(2);
		assert!(!Format::ETC1_RGB8.is_supported(&snb, Bind::SamplerView));
		assert!(Format::ETC1_RGB8.is_supported(&ivb, Bind::SamplerView));
		assert!(!Format::S8_UINT.is_supported(&ivb, Bind::DepthStencil));
		assert!(Format::R32G32B32_FLOAT.is_supported(&snb, Bind::VertexBuffer));
		assert!(!Format::R32G32B32_FLOAT.is_supported(&snb, Bind::RenderTarget));
	}
}
