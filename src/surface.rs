// Resources and the SURFACE_STATE / depth buffer words that describe them.

use crate::cmd::*;
use crate::dev::{DeviceInfo, Gen};
use crate::error::{Error, Result};
use crate::format::{Format, HW_B8G8R8A8_UNORM};
use crate::layout::{Layout, Target, TextureInfo, Tiling};
use crate::winsys::{Bo, Winsys};

const SURFACE_DW0_RENDER_CACHE_RW: u32 = 1 << 8;
const SURFACE_DW0_CUBE_FACE_ENABLES: u32 = 0x3f;
const GEN6_SURFACE_DW0_CUBE_MAP_CORNER_MODE: u32 = 1 << 9;
const GEN6_SURFACE_DW5_VALIGN_4: u32 = 1 << 24;
const GEN7_SURFACE_DW0_VALIGN_4: u32 = 1 << 16;
const GEN7_SURFACE_DW0_HALIGN_8: u32 = 1 << 15;
const GEN7_SURFACE_DW0_TILING_SHIFT: u32 = 13;
const GEN75_SURFACE_DW7_SCS: u32 = 4 << 25 | 5 << 22 | 6 << 19 | 7 << 16;
const GEN75_STENCIL_DW1_STENCIL_BUFFER_ENABLE: u32 = 1 << 31;

/// A buffer resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Buffer {
	pub bo: Bo,
	pub size: u32,
}

impl Buffer {
	pub fn new(ws: &mut dyn Winsys, name: &str, size: u32) -> Result<Buffer> {
		Ok(Buffer {
			bo: ws.alloc(name, size as u64)?,
			size: size,
		})
	}
}

/// A texture, its layout and the buffer objects that back it.
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
	pub info: TextureInfo,
	pub layout: Layout,
	pub bo: Bo,
	pub separate_s8: Option<Box<Texture>>,
	pub hiz_bo: Option<Bo>,
}

impl Texture {
	pub fn new(dev: &DeviceInfo, ws: &mut dyn Winsys, info: &TextureInfo) -> Result<Texture> {
		let layout = Layout::new(dev, info);
		let bo_size = layout.bo_size();
		if bo_size == 0 || bo_size > u32::MAX as u64 {
			return Err(Error::Alloc { name: "texture".to_owned(), size: bo_size });
		}
		let bo = ws.alloc("texture", bo_size)?;

		let separate_s8 = if layout.separate_stencil {
			let mut s8_info = info.clone();
			s8_info.format = Format::S8_UINT;
			s8_info.no_hiz = true;
			Some(Box::new(Texture::new(dev, ws, &s8_info)?))
		} else {
			None
		};

		let hiz_bo = match layout.aux {
			crate::layout::Aux::Hiz if layout.aux_size() > 0 => Some(ws.alloc("hiz", layout.aux_size())?),
			_ => None,
		};

		debug!("texture {:?} {}x{}x{} on bo {}: {:?} tiling, stride {}",
			info.format, info.width0, info.height0, info.depth0, bo.handle, layout.tiling, layout.bo_stride);

		Ok(Texture {
			info: info.clone(),
			layout: layout,
			bo: bo,
			separate_s8: separate_s8,
			hiz_bo: hiz_bo,
		})
	}

	pub fn can_enable_hiz(&self, level: u32, first_layer: u32, num_layers: u32) -> bool {
		let _ = (first_layer, num_layers);
		self.hiz_bo.is_some() && self.layout.is_aux_enabled(level)
	}

	pub fn release(self, ws: &mut dyn Winsys) {
		ws.free(self.bo);
		if let Some(hiz) = self.hiz_bo {
			ws.free(hiz);
		}
		if let Some(s8) = self.separate_s8 {
			s8.release(ws);
		}
	}
}

/// SURFACE_STATE words, with the address in dword 1 relative to `bo`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewSurface {
	pub payload: [u32; 8],
	pub bo: Option<Bo>,
	pub is_rt: bool,
}

fn translate_texture(target: Target) -> u32 {
	match target {
		Target::Buffer => SURFTYPE_BUFFER,
		Target::Tex1D | Target::Tex1DArray => SURFTYPE_1D,
		Target::Tex2D | Target::Rect | Target::Tex2DArray => SURFTYPE_2D,
		Target::Tex3D => SURFTYPE_3D,
		Target::Cube | Target::CubeArray => SURFTYPE_CUBE,
	}
}

fn translate_tiling_gen6(tiling: Tiling) -> u32 {
	match tiling {
		Tiling::None => 0,
		Tiling::X => 2,
		Tiling::Y => 3,
	}
}

fn minify(v: u32, level: u32) -> u32 {
	(v >> level).max(1)
}

fn surface_format(format: Format, is_rt: bool) -> Result<u32> {
	let hw = if is_rt { format.render_format() } else { format.texture_format() };
	hw.ok_or_else(|| Error::Invalid(format!("{} cannot be used as a surface", format.name())))
}

fn buffer_entries(size: u32, struct_size: u32, elem_format: Format) -> Result<u32> {
	let elem_size = elem_format.block_size();
	let mut num_entries = size / struct_size;
	if size % struct_size >= elem_size {
		num_entries += 1;
	}
	if num_entries < 1 || num_entries > 1 << 27 {
		return Err(Error::Invalid(format!("buffer surface with {} entries", num_entries)));
	}
	Ok(num_entries)
}

impl ViewSurface {
	pub fn null(dev: &DeviceInfo, width: u32, height: u32, depth: u32, level: u32) -> ViewSurface {
		let mut dw = [0u32; 8];
		if dev.gen >= Gen::Gen7 {
			dw[0] = SURFTYPE_NULL << 29 | HW_B8G8R8A8_UNORM << 18 | 2 << GEN7_SURFACE_DW0_TILING_SHIFT;
			dw[2] = (height - 1) << 16 | (width - 1);
			dw[3] = (depth - 1) << 21;
			dw[5] = level;
		} else {
			dw[0] = SURFTYPE_NULL << 29 | HW_B8G8R8A8_UNORM << 18;
			dw[2] = (height - 1) << 19 | (width - 1) << 6 | level << 2;
			dw[3] = (depth - 1) << 21 | translate_tiling_gen6(Tiling::X);
		}
		ViewSurface {
			payload: dw,
			bo: None,
			is_rt: false,
		}
	}

	pub fn for_buffer(dev: &DeviceInfo, buf: &Buffer, offset: u32, size: u32, struct_size: u32,
		elem_format: Format, is_rt: bool, render_cache_rw: bool) -> Result<ViewSurface> {
		let fmt = elem_format.color_format()
			.ok_or_else(|| Error::Invalid(format!("{} cannot back a buffer surface", elem_format.name())))?;
		let n = buffer_entries(size, struct_size, elem_format)? - 1;
		let pitch = struct_size - 1;
		if is_rt && offset % elem_format.block_size() != 0 {
			return Err(Error::Invalid(format!("misaligned render target offset {}", offset)));
		}

		let mut dw = [0u32; 8];
		dw[0] = SURFTYPE_BUFFER << 29 | fmt << 18;
		if render_cache_rw {
			dw[0] |= SURFACE_DW0_RENDER_CACHE_RW;
		}
		dw[1] = offset;
		if dev.gen >= Gen::Gen7 {
			let width = n & 0x7f;
			let height = (n >> 7) & 0x3fff;
			let depth = (n >> 21) & 0x3f;
			dw[2] = height << 16 | width;
			dw[3] = depth << 21 | pitch;
			if dev.gen >= Gen::Gen75 {
				dw[7] = GEN75_SURFACE_DW7_SCS;
			}
		} else {
			let width = n & 0x7f;
			let height = (n >> 7) & 0x1fff;
			let depth = (n >> 20) & 0x7f;
			dw[2] = height << 19 | width << 6;
			dw[3] = depth << 21 | pitch << 3;
		}
		Ok(ViewSurface {
			payload: dw,
			bo: Some(buf.bo),
			is_rt: is_rt,
		})
	}

	/// A view of `tex`.  With `offset_to_layer` the surface starts at the
	/// tile containing the first layer, for hardware that cannot address
	/// layers of some render targets.
	pub fn for_texture(dev: &DeviceInfo, tex: &Texture, format: Format, first_level: u32,
		num_levels: u32, first_layer: u32, num_layers: u32, is_rt: bool,
		offset_to_layer: bool) -> Result<ViewSurface> {
		let format = if format == Format::Z32_FLOAT_S8X24_UINT && tex.separate_s8.is_some() {
			Format::Z32_FLOAT
		} else {
			format
		};
		let hw_format = surface_format(format, is_rt)?;
		let mut surface_type = translate_texture(tex.info.target);
		if surface_type == SURFTYPE_BUFFER {
			return Err(Error::Invalid("buffer textures need a buffer view".to_owned()));
		}

		let mut width = tex.info.width0;
		let mut height = tex.info.height0;
		let mut depth = if tex.info.target == Target::Tex3D { tex.info.depth0 } else { num_layers };
		let pitch = tex.layout.bo_stride;
		if surface_type == SURFTYPE_CUBE {
			if is_rt {
				surface_type = SURFTYPE_2D;
			} else {
				depth = num_layers / 6;
			}
		}

		let (max_2d, max_array) = if dev.gen >= Gen::Gen7 { (16384, 2048) } else { (8192, 512) };
		let ok = match surface_type {
			SURFTYPE_1D => width <= max_2d && height == 1 && depth <= max_array,
			SURFTYPE_2D => width <= max_2d && height <= max_2d && depth <= max_array,
			SURFTYPE_3D => width <= 2048 && height <= 2048 && depth <= 2048,
			_ => width <= max_2d && width == height,
		};
		if !ok || depth == 0 || pitch == 0 {
			return Err(Error::Invalid(format!("surface of {}x{}x{} is out of range", width, height, depth)));
		}

		let mut first_level = first_level;
		let mut first_layer = first_layer;
		let mut lod = if is_rt { first_level } else { num_levels - 1 };
		let (layer_offset, x_offset, y_offset) = if offset_to_layer {
			let (offset, x, y) = tex.layout.slice_offset(first_level, first_layer);
			width = minify(width, first_level);
			height = minify(height, first_level);
			first_level = 0;
			first_layer = 0;
			lod = 0;
			depth = 1;
			(offset, x / 4, y / 2)
		} else {
			(0, 0, 0)
		};

		let mut dw = [0u32; 8];
		if dev.gen >= Gen::Gen7 {
			dw[0] = surface_type << 29 | hw_format << 18;
			if tex.layout.align_j == 4 {
				dw[0] |= GEN7_SURFACE_DW0_VALIGN_4;
			}
			if tex.layout.align_i == 8 {
				dw[0] |= GEN7_SURFACE_DW0_HALIGN_8;
			}
			dw[0] |= translate_tiling_gen6(tex.layout.tiling) << GEN7_SURFACE_DW0_TILING_SHIFT;
			if is_rt {
				dw[0] |= SURFACE_DW0_RENDER_CACHE_RW;
			}
			if surface_type == SURFTYPE_CUBE && !is_rt {
				dw[0] |= SURFACE_DW0_CUBE_FACE_ENABLES;
			}
			dw[1] = layer_offset;
			dw[2] = (height - 1) << 16 | (width - 1);
			dw[3] = (depth - 1) << 21 | (pitch - 1);
			dw[4] = first_layer << 18 | (num_layers - 1) << 7;
			if tex.info.nr_samples > 1 {
				// 4x, laid out as MSS unless the samples are interleaved
				dw[4] |= 2 << 3;
				if tex.layout.interleaved_samples {
					dw[4] |= 1 << 6;
				}
			}
			dw[5] = x_offset << 25 | y_offset << 20 | first_level << 4 | lod;
			if dev.gen >= Gen::Gen75 {
				dw[7] = GEN75_SURFACE_DW7_SCS;
			}
		} else {
			dw[0] = surface_type << 29 | hw_format << 18;
			if surface_type == SURFTYPE_CUBE && !is_rt {
				dw[0] |= GEN6_SURFACE_DW0_CUBE_MAP_CORNER_MODE | SURFACE_DW0_CUBE_FACE_ENABLES;
			}
			if is_rt {
				dw[0] |= SURFACE_DW0_RENDER_CACHE_RW;
			}
			dw[1] = layer_offset;
			dw[2] = (height - 1) << 19 | (width - 1) << 6 | lod << 2;
			dw[3] = (depth - 1) << 21 | (pitch - 1) << 3 | translate_tiling_gen6(tex.layout.tiling);
			dw[4] = first_level << 28 | first_layer << 17 | (num_layers - 1) << 8;
			if tex.info.nr_samples > 1 {
				dw[4] |= 2 << 4;
			}
			dw[5] = x_offset << 25 | y_offset << 20;
			if tex.layout.align_j == 4 {
				dw[5] |= GEN6_SURFACE_DW5_VALIGN_4;
			}
		}
		Ok(ViewSurface {
			payload: dw,
			bo: Some(tex.bo),
			is_rt: is_rt,
		})
	}

	/// SURFACE_STATE length in dwords.
	pub fn len(dev: &DeviceInfo) -> usize {
		if dev.gen >= Gen::Gen7 { 8 } else { 6 }
	}
}

/// 3DSTATE_DEPTH_BUFFER dwords 1 to 6, then 3DSTATE_STENCIL_BUFFER and
/// 3DSTATE_HIER_DEPTH_BUFFER dwords 1 and 2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZsSurface {
	pub payload: [u32; 10],
	pub bo: Option<Bo>,
	pub separate_s8_bo: Option<Bo>,
	pub hiz_bo: Option<Bo>,
}

struct ZsInfo {
	surface_type: u32,
	format: u32,
	zs: Option<(Bo, u32, u32)>,
	stencil: Option<(Bo, u32, u32)>,
	hiz: Option<(Bo, u32)>,
	width: u32,
	height: u32,
	depth: u32,
	lod: u32,
	first_layer: u32,
	num_layers: u32,
	x_offset: u32,
	y_offset: u32,
}

impl ZsInfo {
	fn null() -> ZsInfo {
		ZsInfo {
			surface_type: SURFTYPE_NULL,
			format: ZFORMAT_D32_FLOAT,
			zs: None,
			stencil: None,
			hiz: None,
			width: 1,
			height: 1,
			depth: 1,
			lod: 0,
			first_layer: 0,
			num_layers: 1,
			x_offset: 0,
			y_offset: 0,
		}
	}

	fn new(dev: &DeviceInfo, tex: &Texture, format: Format, level: u32, first_layer: u32,
		num_layers: u32, offset_to_layer: bool) -> Result<ZsInfo> {
		let mut surface_type = translate_texture(tex.info.target);
		if surface_type == SURFTYPE_CUBE {
			surface_type = SURFTYPE_2D;
		}
		let can_hiz = tex.can_enable_hiz(level, first_layer, num_layers);
		let separate_stencil = dev.gen >= Gen::Gen7 || can_hiz;

		let zformat = match format {
			Format::Z16_UNORM => ZFORMAT_D16_UNORM,
			Format::Z32_FLOAT => ZFORMAT_D32_FLOAT,
			Format::Z24X8_UNORM | Format::Z24_UNORM_S8_UINT if separate_stencil => ZFORMAT_D24_UNORM_X8_UINT,
			Format::Z24X8_UNORM | Format::Z24_UNORM_S8_UINT => ZFORMAT_D24_UNORM_S8_UINT,
			Format::Z32_FLOAT_S8X24_UINT if separate_stencil => ZFORMAT_D32_FLOAT,
			Format::Z32_FLOAT_S8X24_UINT => ZFORMAT_D32_FLOAT_S8X24_UINT,
			Format::S8_UINT if separate_stencil => ZFORMAT_D32_FLOAT,
			_ => return Err(Error::Invalid(format!("{} is not a depth/stencil format", format.name()))),
		};

		let mut offsets = [(0, 0); 3];
		let zs = if format != Format::S8_UINT {
			let (offset, x, y) = if offset_to_layer {
				tex.layout.slice_offset(level, first_layer)
			} else {
				(0, 0, 0)
			};
			offsets[0] = (x, y);
			Some((tex.bo, tex.layout.bo_stride, offset))
		} else {
			None
		};

		let s8_tex = match tex.separate_s8 {
			Some(ref s8) => Some(&**s8),
			None if format == Format::S8_UINT => Some(tex),
			None => None,
		};
		let stencil = s8_tex.map(|s8| {
			let (offset, x, y) = if offset_to_layer {
				s8.layout.slice_offset(level, first_layer)
			} else {
				(0, 0, 0)
			};
			offsets[1] = (x, y);
			// W-tiled stencil is programmed with twice the pitch
			(s8.bo, s8.layout.bo_stride * 2, offset)
		});

		let hiz = match tex.hiz_bo {
			Some(bo) if can_hiz => Some((bo, tex.layout.aux_stride)),
			_ => None,
		};

		let mut info = ZsInfo {
			surface_type: surface_type,
			format: zformat,
			zs: zs,
			stencil: stencil,
			hiz: hiz,
			width: tex.info.width0,
			height: tex.info.height0,
			depth: if tex.info.target == Target::Tex3D { tex.info.depth0 } else { num_layers },
			lod: level,
			first_layer: first_layer,
			num_layers: num_layers,
			x_offset: 0,
			y_offset: 0,
		};

		if offset_to_layer {
			info.width = minify(info.width, level);
			info.height = minify(info.height, level);
			info.depth = if info.surface_type == SURFTYPE_3D { minify(info.depth, level) } else { 1 };
			info.lod = 0;
			info.first_layer = 0;
			info.num_layers = 1;
			let (x, y) = if info.zs.is_some() { offsets[0] } else { offsets[1] };
			info.x_offset = x;
			info.y_offset = y;
			if dev.gen >= Gen::Gen7 {
				info.x_offset &= !7;
				info.y_offset &= !7;
			}
			info.width += info.x_offset;
			info.height += info.y_offset;
			if info.surface_type == SURFTYPE_1D && info.height > 1 {
				info.surface_type = SURFTYPE_2D;
			}
		}
		Ok(info)
	}
}

impl ZsSurface {
	pub fn null(dev: &DeviceInfo) -> ZsSurface {
		ZsSurface::from_info(dev, &ZsInfo::null())
	}

	pub fn new(dev: &DeviceInfo, tex: &Texture, format: Format, level: u32, first_layer: u32,
		num_layers: u32, offset_to_layer: bool) -> Result<ZsSurface> {
		let info = ZsInfo::new(dev, tex, format, level, first_layer, num_layers, offset_to_layer)?;
		let (max_2d, max_array) = if dev.gen >= Gen::Gen7 { (16384, 2048) } else { (8192, 512) };
		let ok = match info.surface_type {
			SURFTYPE_3D => info.width <= 2048 && info.height <= 2048 && info.depth <= 2048,
			_ => info.width <= max_2d && info.height <= max_2d && info.depth <= max_array &&
				info.num_layers <= max_array,
		};
		if !ok {
			return Err(Error::Invalid(format!("depth buffer of {}x{}x{} is out of range",
				info.width, info.height, info.depth)));
		}
		if let Some((_, stride, _)) = info.zs {
			if tex.layout.tiling != Tiling::Y || stride == 0 || stride % 128 != 0 {
				return Err(Error::Invalid(format!("depth buffer needs Y tiling, got {:?} with stride {}",
					tex.layout.tiling, stride)));
			}
		}
		Ok(ZsSurface::from_info(dev, &info))
	}

	fn from_info(dev: &DeviceInfo, info: &ZsInfo) -> ZsSurface {
		let mut dw = [0u32; 10];
		dw[0] = info.surface_type << 29 | info.format << 18;
		if let Some((_, stride, offset)) = info.zs {
			dw[0] |= stride - 1;
			dw[1] = offset;
		}

		if dev.gen >= Gen::Gen7 {
			if info.zs.is_some() {
				dw[0] |= 1 << 28;
			}
			if info.stencil.is_some() {
				dw[0] |= 1 << 27;
			}
			if info.hiz.is_some() {
				dw[0] |= 1 << 22;
			}
			dw[2] = (info.height - 1) << 18 | (info.width - 1) << 4 | info.lod;
			dw[3] = (info.depth - 1) << 21 | info.first_layer << 10;
			dw[4] = info.y_offset << 16 | info.x_offset;
			dw[5] = (info.num_layers - 1) << 21;
		} else {
			// tiled, Y-major
			dw[0] |= 1 << 27 | 1 << 26;
			if info.hiz.is_some() {
				dw[0] |= 1 << 22 | 1 << 21;
			}
			dw[2] = (info.height - 1) << 19 | (info.width - 1) << 6 | info.lod << 2;
			dw[3] = (info.depth - 1) << 21 | info.first_layer << 10 | (info.num_layers - 1) << 1;
			dw[4] = info.y_offset << 16 | info.x_offset;
		}

		if let Some((_, stride, offset)) = info.stencil {
			dw[6] = stride - 1;
			if dev.gen >= Gen::Gen75 {
				dw[6] |= GEN75_STENCIL_DW1_STENCIL_BUFFER_ENABLE;
			}
			dw[7] = offset;
		}
		if let Some((_, stride)) = info.hiz {
			dw[8] = stride - 1;
			dw[9] = 0;
		}

		ZsSurface {
			payload: dw,
			bo: info.zs.map(|z| z.0),
			separate_s8_bo: info.stencil.map(|s| s.0),
			hiz_bo: info.hiz.map(|h| h.0),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::layout::BindFlags;
	use crate::winsys::SoftWinsys;
	use pretty_assertions::assert_eq;

	#[test]
	fn null_surfaces() {
		let snb = DeviceInfo::snb(1);
		let surf = ViewSurface::null(&snb, 64, 32, 1, 0);
		assert_eq!(surf.payload[0], 7 << 29 | 0xc0 << 18);
		assert_eq!(surf.payload[2], 31 << 19 | 63 << 6);
		assert_eq!(surf.payload[3], 2);
		assert!(surf.bo.is_none());

		let zs = ZsSurface::null(&DeviceInfo::ivb(1));
		assert_eq!(zs.payload[0], 7 << 29 | 1 << 18);
		assert_eq!(zs.payload[2], 0);
		assert!(zs.bo.is_none() && zs.separate_s8_bo.is_none());
	}

	#[test]
	fn buffer_entries_split_across_fields() {
		let snb = DeviceInfo::snb(1);
		let mut ws = SoftWinsys::new(1 << 30);
		let buf = Buffer::new(&mut ws, "vb", 1 << 20).unwrap();
		// 200 structs of 16 bytes and a partial one holding a full element
		let surf = ViewSurface::for_buffer(&snb, &buf, 0, 200 * 16 + 4, 16, Format::R32_FLOAT, false, false).unwrap();
		let n = 200;
		assert_eq!(surf.payload[2], (n >> 7) << 19 | (n & 0x7f) << 6);
		assert_eq!(surf.payload[3], 15 << 3);
		assert_eq!(surf.bo, Some(buf.bo));
	}

	#[test]
	fn gen7_depth_with_separate_stencil() {
		let ivb = DeviceInfo::ivb(1);
		let mut ws = SoftWinsys::new(1 << 30);
		let info = TextureInfo::new_2d(Format::Z24_UNORM_S8_UINT, 64, 64, BindFlags::DEPTH_STENCIL);
		let tex = Texture::new(&ivb, &mut ws, &info).unwrap();
		assert!(tex.separate_s8.is_some());
		let zs = ZsSurface::new(&ivb, &tex, Format::Z24_UNORM_S8_UINT, 0, 0, 1, false).unwrap();
		assert_eq!((zs.payload[0] >> 18) & 0x7, ZFORMAT_D24_UNORM_X8_UINT);
		assert!(zs.payload[0] & 1 << 27 != 0);
		assert_eq!(zs.payload[2], 63 << 18 | 63 << 4);
		assert_eq!(zs.separate_s8_bo, tex.separate_s8.as_ref().map(|s| s.bo));
	}
}
