// Texture memory layout: tiling, alignments, placement of every level and
// slice, the size of the buffer object and of the auxiliary HiZ/MCS buffer.

use crate::dev::{DeviceInfo, Gen};
use crate::format::Format;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
	Buffer,
	Tex1D,
	Tex2D,
	Tex3D,
	Cube,
	Rect,
	Tex1DArray,
	Tex2DArray,
	CubeArray,
}

bitflags::bitflags! {
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct BindFlags: u32 {
		const SAMPLER_VIEW = 1 << 0;
		const RENDER_TARGET = 1 << 1;
		const DEPTH_STENCIL = 1 << 2;
		const SCANOUT = 1 << 3;
		const CURSOR = 1 << 4;
		const LINEAR = 1 << 5;
		const TRANSFER_READ = 1 << 6;
		const TRANSFER_WRITE = 1 << 7;
	}
}

bitflags::bitflags! {
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct Tilings: u32 {
		const NONE = 1 << 0;
		const X = 1 << 1;
		const Y = 1 << 2;
		const W = 1 << 3;
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tiling {
	None,
	X,
	Y,
}

impl Tiling {
	fn flag(self) -> Tilings {
		match self {
			Tiling::None => Tilings::NONE,
			Tiling::X => Tilings::X,
			Tiling::Y => Tilings::Y,
		}
	}

	/// Tile size in bytes by rows.
	pub fn tile_size(self) -> (u32, u32) {
		match self {
			Tiling::None => (1, 1),
			Tiling::X => (512, 8),
			Tiling::Y => (128, 32),
		}
	}
}

/// How levels and slices are packed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Walk {
	/// Slices of a level are stacked, levels are placed like mipmaps.
	Lod,
	/// Levels of a slice are placed like mipmaps, slices are stacked
	/// `layer_height` apart.
	Layer,
	/// Slices of a level are laid out side by side, wrapping at 2^level.
	Walk3D,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aux {
	None,
	Hiz,
	Mcs,
}

/// The resource a layout is requested for.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureInfo {
	pub target: Target,
	pub format: Format,
	pub width0: u32,
	pub height0: u32,
	pub depth0: u32,
	pub array_size: u32,
	pub last_level: u32,
	pub nr_samples: u32,
	pub bind: BindFlags,
	/// Staging resources never get HiZ.
	pub staging: bool,
	pub no_hiz: bool,
}

impl TextureInfo {
	pub fn new_2d(format: Format, width: u32, height: u32, bind: BindFlags) -> TextureInfo {
		TextureInfo {
			target: Target::Tex2D,
			format: format,
			width0: width,
			height0: height,
			depth0: 1,
			array_size: 1,
			last_level: 0,
			nr_samples: 1,
			bind: bind,
			staging: false,
			no_hiz: false,
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Lod {
	pub x: u32,
	pub y: u32,
	pub slice_width: u32,
	pub slice_height: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Layout {
	pub aux: Aux,
	pub width0: u32,
	pub height0: u32,
	pub format: Format,
	pub separate_stencil: bool,
	pub block_width: u32,
	pub block_height: u32,
	pub block_size: u32,
	pub walk: Walk,
	pub interleaved_samples: bool,
	pub valid_tilings: Tilings,
	pub tiling: Tiling,
	pub align_i: u32,
	pub align_j: u32,
	pub lods: Vec<Lod>,
	pub layer_height: u32,
	pub bo_stride: u32,
	pub bo_height: u32,
	pub aux_enables: u32,
	pub aux_offsets: Vec<u32>,
	pub aux_stride: u32,
	pub aux_height: u32,
}

struct Params<'a> {
	dev: &'a DeviceInfo,
	info: &'a TextureInfo,
	compressed: bool,
	h0: u32,
	h1: u32,
	max_x: u32,
	max_y: u32,
}

/// Usually only the first 256MB of the GTT is mappable.
const MAPPABLE_GTT_SIZE: u32 = 256 * 1024 * 1024;

fn align(v: u32, a: u32) -> u32 {
	(v + a - 1) & !(a - 1)
}

fn minify(v: u32, level: u32) -> u32 {
	(v >> level).max(1)
}

impl Layout {
	/// Plan the layout of `info` on `dev`.
	pub fn new(dev: &DeviceInfo, info: &TextureInfo) -> Layout {
		let transfer_only = (info.bind - (BindFlags::TRANSFER_READ | BindFlags::TRANSFER_WRITE)).is_empty();
		if transfer_only && info.last_level == 0 && info.nr_samples <= 1 {
			return Layout::new_for_transfer(info);
		}

		let mut layout = Layout::empty(info);
		let mut params = Params {
			dev: dev,
			info: info,
			compressed: false,
			h0: 0,
			h1: 0,
			max_x: 0,
			max_y: 0,
		};

		// order matters: each step reads what the previous ones decided
		if layout.want_hiz(&params) {
			layout.aux = Aux::Hiz;
		}
		layout.init_size_and_format(&mut params);
		layout.init_walk(&params);
		layout.init_tiling(&params);
		if layout.aux == Aux::None && layout.want_mcs(&params) {
			layout.aux = Aux::Mcs;
		}
		layout.init_alignments(&params);
		layout.init_lods(&mut params);
		layout.init_layer_height(&mut params);

		layout.pad_extent(&mut params);
		layout.calculate_bo_size(&params);

		match layout.aux {
			Aux::Hiz => layout.calculate_hiz_size(&params),
			Aux::Mcs => layout.calculate_mcs_size(&params),
			Aux::None => (),
		}

		debug!("{}x{}x{} {} layout: {:?} tiling, {:?} walk, stride {}, height {}, aux {:?}",
			info.width0, info.height0, info.depth0, info.format.name(),
			layout.tiling, layout.walk, layout.bo_stride, layout.bo_height, layout.aux);

		layout
	}

	fn empty(info: &TextureInfo) -> Layout {
		Layout {
			aux: Aux::None,
			width0: info.width0,
			height0: info.height0,
			format: info.format,
			separate_stencil: false,
			block_width: 1,
			block_height: 1,
			block_size: 1,
			walk: Walk::Lod,
			interleaved_samples: false,
			valid_tilings: Tilings::NONE,
			tiling: Tiling::None,
			align_i: 1,
			align_j: 1,
			lods: vec![Lod::default(); info.last_level as usize + 1],
			layer_height: 0,
			bo_stride: 0,
			bo_height: 0,
			aux_enables: 0,
			aux_offsets: vec![0; info.last_level as usize + 1],
			aux_stride: 0,
			aux_height: 0,
		}
	}

	/// Packed linear layout for resources that are never bound to the GPU.
	fn new_for_transfer(info: &TextureInfo) -> Layout {
		let num_layers = if info.target == Target::Tex3D { info.depth0 } else { info.array_size };
		let mut layout = Layout::empty(info);
		let (bw, bh) = info.format.block_dim();

		layout.block_width = bw;
		layout.block_height = bh;
		layout.block_size = info.format.block_size();
		layout.walk = Walk::Lod;
		layout.valid_tilings = Tilings::NONE;
		layout.tiling = Tiling::None;
		layout.align_i = bw;
		layout.align_j = bh;

		let layer_width = align(info.width0, layout.align_i);
		let layer_height = align(info.height0, layout.align_j);
		layout.lods[0].slice_width = layer_width;
		layout.lods[0].slice_height = layer_height;

		layout.bo_stride = align(layer_width / bw * layout.block_size, 64);
		layout.bo_height = layer_height / bh * num_layers;
		layout
	}

	fn want_hiz(&self, params: &Params) -> bool {
		let info = params.info;
		if info.no_hiz || !info.bind.contains(BindFlags::DEPTH_STENCIL) {
			return false;
		}
		if !info.format.has_depth() || info.staging {
			return false;
		}
		// GEN6 enables HiZ and separate stencil together, and HiZ may be off
		// for some levels
		!(params.dev.gen == Gen::Gen6 &&
			info.format == Format::Z32_FLOAT_S8X24_UINT &&
			info.last_level > 0)
	}

	fn want_mcs(&self, params: &Params) -> bool {
		let info = params.info;
		if params.dev.gen < Gen::Gen7 {
			return false;
		}
		if info.target != Target::Tex2D || !info.bind.contains(BindFlags::RENDER_TARGET) {
			return false;
		}

		if info.nr_samples > 1 {
			!self.interleaved_samples && info.format.kind() != crate::format::Kind::Sint
		} else {
			// fast clears of tiled single-level 32/64/128bpp render targets
			self.tiling != Tiling::None && info.last_level == 0 && info.array_size == 1 &&
				match self.block_size {
					4 | 8 | 16 => true,
					_ => false,
				}
		}
	}

	fn init_size_and_format(&mut self, params: &mut Params) {
		let info = params.info;
		let separate_stencil = info.bind.contains(BindFlags::DEPTH_STENCIL) &&
			(params.dev.gen >= Gen::Gen7 || self.aux == Aux::Hiz);

		let format = match info.format {
			Format::ETC1_RGB8 => Format::R8G8B8X8_UNORM,
			Format::Z24_UNORM_S8_UINT if separate_stencil => {
				self.separate_stencil = true;
				Format::Z24X8_UNORM
			}
			Format::Z32_FLOAT_S8X24_UINT if separate_stencil => {
				self.separate_stencil = true;
				Format::Z32_FLOAT
			}
			f => f,
		};

		let (bw, bh) = format.block_dim();
		self.format = format;
		self.block_width = bw;
		self.block_height = bh;
		self.block_size = format.block_size();
		params.compressed = format.is_compressed();
	}

	fn init_walk(&mut self, params: &Params) {
		let info = params.info;
		if params.dev.gen >= Gen::Gen7 {
			// depth buffers are IMS with full array spacing, render targets
			// are UMS/CMS
			if info.bind.contains(BindFlags::DEPTH_STENCIL) {
				self.walk = if info.target == Target::Tex3D { Walk::Walk3D } else { Walk::Layer };
				self.interleaved_samples = true;
			} else {
				if info.nr_samples > 1 {
					assert_eq!(info.last_level, 0, "multisampled textures cannot be mipmapped");
				}
				self.walk = if info.target == Target::Tex3D {
					Walk::Walk3D
				} else if info.last_level > 0 {
					Walk::Layer
				} else {
					Walk::Lod
				};
				self.interleaved_samples = false;
			}
		} else {
			// separate stencil has no mipmaps and QPitch = h0
			self.walk = if info.target == Target::Tex3D {
				Walk::Walk3D
			} else if self.format == Format::S8_UINT {
				Walk::Lod
			} else {
				Walk::Layer
			};
			self.interleaved_samples = true;
		}
	}

	fn valid_tilings(&self, params: &Params) -> Tilings {
		let info = params.info;
		let mut valid = Tilings::all();

		// display engine cannot scan out Y tiles
		if info.bind.contains(BindFlags::SCANOUT) {
			valid &= Tilings::X;
		}
		if info.bind.intersects(BindFlags::CURSOR | BindFlags::LINEAR) {
			valid &= Tilings::NONE;
		}

		// depth buffers are always Y-tiled, separate stencil W-tiled
		if info.bind.contains(BindFlags::DEPTH_STENCIL) {
			if self.format == Format::S8_UINT {
				valid &= Tilings::W;
			} else {
				valid &= Tilings::Y;
			}
		}

		if info.bind.contains(BindFlags::RENDER_TARGET) {
			// 128bpp render targets must be X-tiled or linear
			if self.block_size == 16 {
				valid -= Tilings::Y;
			}
			// Y-tiled render targets need VALIGN_4, which 96bpp lacks
			if params.dev.gen >= Gen::Gen7 && self.block_size == 12 {
				valid -= Tilings::Y;
			}
		}

		assert!(!valid.is_empty(), "conflicting bind flags {:?}", info.bind);
		valid
	}

	fn init_tiling(&mut self, params: &Params) {
		let info = params.info;
		let mut valid = self.valid_tilings(params);

		// W tiles are handled as linear
		if valid.contains(Tilings::W) {
			valid = (valid - Tilings::W) | Tilings::NONE;
		}
		self.valid_tilings = valid;

		if info.bind.intersects(BindFlags::RENDER_TARGET | BindFlags::SAMPLER_VIEW) {
			// small textures are not worth tiling
			if self.width0 < 64 && !(valid - Tilings::X).is_empty() {
				valid -= Tilings::X;
			}
			if (self.width0 < 16 || self.height0 < 16) && !(valid - Tilings::Y).is_empty() {
				valid -= Tilings::Y;
			}
		} else if valid.contains(Tilings::NONE) {
			// not sure where it is bound to
			valid &= Tilings::NONE;
		}

		self.tiling = if valid.contains(Tilings::Y) {
			Tiling::Y
		} else if valid.contains(Tilings::X) {
			Tiling::X
		} else {
			Tiling::None
		};
	}

	fn init_alignments(&mut self, params: &Params) {
		let info = params.info;

		if params.compressed {
			self.align_i = self.block_width;
			self.align_j = self.block_height;
		} else if info.bind.contains(BindFlags::DEPTH_STENCIL) {
			let (i, j) = if params.dev.gen >= Gen::Gen7 {
				match self.format {
					Format::Z16_UNORM => (8, 4),
					Format::S8_UINT => (8, 8),
					_ => (4, 4),
				}
			} else {
				match self.format {
					Format::S8_UINT => (4, 2),
					_ => (4, 4),
				}
			};
			self.align_i = i;
			self.align_j = j;
		} else {
			let valign_4 = info.nr_samples > 1 ||
				(params.dev.gen >= Gen::Gen7 && self.tiling == Tiling::Y &&
				info.bind.contains(BindFlags::RENDER_TARGET));
			if valign_4 {
				assert!(self.block_size != 12, "VALIGN_4 is not supported for 96bpp");
			}
			self.align_i = 4;
			self.align_j = if valign_4 { 4 } else { 2 };
		}

		assert!(self.align_i % self.block_width == 0 && self.align_j % self.block_height == 0);
		assert!(self.align_i.is_power_of_two() && self.align_j.is_power_of_two());
	}

	fn slice_size(&self, params: &Params, level: u32) -> (u32, u32) {
		let mut w = align(minify(self.width0, level), self.block_width);
		let mut h = align(minify(self.height0, level), self.block_height);

		// interleaved samples widen and heighten every pixel
		if self.interleaved_samples {
			match params.info.nr_samples {
				0 | 1 => (),
				2 => w = align(w, 2) * 2,
				4 => {
					w = align(w, 2) * 2;
					h = align(h, 2) * 2;
				}
				8 => {
					w = align(w, 2) * 4;
					h = align(h, 2) * 2;
				}
				16 => {
					w = align(w, 2) * 4;
					h = align(h, 2) * 4;
				}
				n => panic!("unsupported sample count {}", n),
			}
		}

		(align(w, self.align_i), align(h, self.align_j))
	}

	fn num_layers(&self, params: &Params) -> u32 {
		let info = params.info;
		// samples of the same index are stored in a layer
		if info.nr_samples > 1 && !self.interleaved_samples {
			info.array_size * info.nr_samples
		} else {
			info.array_size
		}
	}

	fn init_lods(&mut self, params: &mut Params) {
		let info = params.info;
		let mut cur_x = 0;
		let mut cur_y = 0;

		for lv in 0..=info.last_level {
			let (mut lod_w, mut lod_h) = self.slice_size(params, lv);
			let lod = Lod {
				x: cur_x,
				y: cur_y,
				slice_width: lod_w,
				slice_height: lod_h,
			};
			self.lods[lv as usize] = lod;

			match self.walk {
				Walk::Lod => {
					lod_h *= self.num_layers(params);
					if lv == 1 {
						cur_x += lod_w;
					} else {
						cur_y += lod_h;
					}
					// every level starts on a tile
					if info.last_level > 0 {
						assert_eq!(self.format, Format::S8_UINT);
						cur_x = align(cur_x, 64);
						cur_y = align(cur_y, 64);
					}
				}
				Walk::Layer => {
					// MIPLAYOUT_BELOW
					if lv == 1 {
						cur_x += lod_w;
					} else {
						cur_y += lod_h;
					}
				}
				Walk::Walk3D => {
					let num_slices = minify(info.depth0, lv);
					let per_row = 1 << lv;
					let num_rows = (num_slices + per_row - 1) / per_row;
					lod_w *= per_row;
					lod_h *= num_rows;
					cur_y += lod_h;
				}
			}

			params.max_x = params.max_x.max(lod.x + lod_w);
			params.max_y = params.max_y.max(lod.y + lod_h);
		}

		if self.walk == Walk::Layer {
			params.h0 = self.lods[0].slice_height;
			params.h1 = if info.last_level > 0 {
				self.lods[1].slice_height
			} else {
				self.slice_size(params, 1).1
			};
		}
	}

	fn init_layer_height(&mut self, params: &mut Params) {
		if self.walk != Walk::Layer {
			return;
		}
		let num_layers = self.num_layers(params);
		if num_layers <= 1 {
			return;
		}

		// QPitch in texel rows, so compressed formats are not divided by 4
		let tail = if params.dev.gen >= Gen::Gen7 { 12 } else { 11 };
		self.layer_height = params.h0 + params.h1 + tail * self.align_j;

		// GEN6 MSAA QPitch erratum
		if params.dev.gen == Gen::Gen6 && params.info.nr_samples > 1 && self.height0 % 4 == 1 {
			self.layer_height += 4;
		}

		params.max_y += self.layer_height * (num_layers - 1);
	}

	fn pad_extent(&self, params: &mut Params) {
		let info = params.info;
		let mut align_w = 1;
		let mut align_h = 1;
		let mut pad_h = 0;

		if info.bind.contains(BindFlags::SAMPLER_VIEW) {
			align_w = align_w.max(self.align_i);
			align_h = align_h.max(self.align_j);
			// cube maps need two extra rows
			if info.target == Target::Cube {
				pad_h += 2;
			}
			// compressed formats pad to an even row of blocks
			if params.compressed {
				align_h = align_h.max(self.align_j * 2);
			}
		}

		// odd number of rows needs a final row below
		if info.bind.contains(BindFlags::RENDER_TARGET) {
			align_h = align_h.max(2);
		}

		// depth clears and resolves work on 8x4 blocks
		if self.aux == Aux::Hiz && info.last_level == 0 && info.array_size == 1 && info.depth0 == 1 {
			align_w = align_w.max(8);
			align_h = align_h.max(4);
		}

		params.max_x = align(params.max_x, align_w);
		params.max_y = align(params.max_y + pad_h, align_h);
	}

	/// May fall back to linear tiling.
	fn calculate_bo_size(&mut self, params: &Params) {
		assert!(params.max_x % self.block_width == 0 && params.max_y % self.block_height == 0);
		assert!(self.layer_height % self.block_height == 0);

		self.bo_stride = params.max_x / self.block_width * self.block_size;
		self.bo_height = params.max_y / self.block_height;

		loop {
			let mut h = self.bo_height;

			// linear sampler surfaces need 64 more bytes at the bottom
			if params.dev.gen >= Gen::Gen75 &&
				params.info.bind.contains(BindFlags::SAMPLER_VIEW) &&
				self.tiling == Tiling::None {
				h += (64 + self.bo_stride - 1) / self.bo_stride;
			}

			let (align_w, align_h) = match self.tiling {
				Tiling::X => (512, 8),
				Tiling::Y => (128, 32),
				// W tiles for separate stencil
				Tiling::None if self.format == Format::S8_UINT => (64, 64),
				Tiling::None => (64, 2),
			};

			let w = align(self.bo_stride, align_w);
			h = align(h, align_h);

			if self.tiling != Tiling::None && MAPPABLE_GTT_SIZE / w / 4 < h {
				if self.valid_tilings.contains(Tilings::NONE) {
					info!("{}x{} texture does not fit the mappable aperture, using linear tiling",
						self.width0, self.height0);
					self.tiling = Tiling::None;
					// MCS for non-MSAA render targets needs tiling
					if self.aux == Aux::Mcs && params.info.nr_samples <= 1 {
						self.aux = Aux::None;
					}
					continue;
				} else {
					warn!("cannot force texture to be linear");
				}
			}

			self.bo_stride = w;
			self.bo_height = h;
			break;
		}
	}

	fn calculate_hiz_size(&mut self, params: &Params) {
		let info = params.info;
		let dev = params.dev;
		const HZ_ALIGN_J: u32 = 8;

		assert!(self.walk == Walk::Layer || self.walk == Walk::Walk3D);

		// GEN6 HiZ has no LOD field, so each level gets its own tiles
		let hz_walk = if dev.gen >= Gen::Gen7 { self.walk } else { Walk::Lod };

		// 8x8 aligned, two rows packed into one memory row
		let (hz_width, hz_height) = match hz_walk {
			Walk::Lod => {
				let mut lod_tx = vec![0; self.lods.len()];
				let mut lod_ty = vec![0; self.lods.len()];
				let mut hz_width = 0;
				let mut hz_height = 0;
				let mut cur_tx = 0;
				let mut cur_ty = 0;

				for (lv, lod) in self.lods.iter().enumerate() {
					lod_tx[lv] = cur_tx;
					lod_ty[lv] = cur_ty;

					let tw = align(lod.slice_width, 16);
					let th = align(lod.slice_height, HZ_ALIGN_J) * info.array_size / 2;
					// in Y tiles
					let tw = align(tw, 128) / 128;
					let th = align(th, 32) / 32;

					hz_width = hz_width.max(cur_tx + tw);
					hz_height = hz_height.max(cur_ty + th);

					if lv == 1 {
						cur_tx += tw;
					} else {
						cur_ty += th;
					}
				}

				for lv in 0..self.lods.len() {
					self.aux_offsets[lv] = (lod_ty[lv] * hz_width + lod_tx[lv]) * 4096;
				}
				(hz_width * 128, hz_height * 32)
			}
			Walk::Layer => {
				let h0 = align(params.h0, HZ_ALIGN_J);
				let h1 = align(params.h1, HZ_ALIGN_J);
				let tail = (if dev.gen >= Gen::Gen7 { 12 } else { 11 }) * HZ_ALIGN_J;
				let hz_qpitch = h0 + h1 + tail;

				let mut hz_height = hz_qpitch * info.array_size / 2;
				if dev.gen >= Gen::Gen7 {
					hz_height = align(hz_height, 8);
				}
				(align(self.lods[0].slice_width, 16), hz_height)
			}
			Walk::Walk3D => {
				// slices are packed vertically
				let hz_height: u32 = self.lods.iter().enumerate()
					.map(|(lv, lod)| align(lod.slice_height, HZ_ALIGN_J) * minify(info.depth0, lv as u32))
					.sum();
				(align(self.lods[0].slice_width, 16), hz_height / 2)
			}
		};

		// levels must be multiples of the 8x4 clear block, in samples
		let (clear_w, clear_h) = match info.nr_samples {
			2 => (4, 4),
			4 => (4, 2),
			8 => (2, 2),
			16 => (2, 1),
			_ => (8, 4),
		};
		for lv in 0..=info.last_level {
			if minify(self.width0, lv) % clear_w != 0 || minify(self.height0, lv) % clear_h != 0 {
				break;
			}
			self.aux_enables |= 1 << lv;
		}

		// padded for this in pad_extent()
		if info.last_level == 0 && info.array_size == 1 && info.depth0 == 1 {
			self.aux_enables |= 0x1;
		}

		self.aux_stride = align(hz_width, 128);
		self.aux_height = align(hz_height, 32);
	}

	fn calculate_mcs_size(&mut self, params: &Params) {
		let info = params.info;

		let (mcs_width, mcs_height, mcs_cpp) = if info.nr_samples > 1 {
			// the scaled-down clear rectangle is aligned to 2x2
			let (downscale_x, downscale_y, cpp) = match info.nr_samples {
				2 | 4 => (8, 2, 1),
				8 => (2, 2, 4),
				16 => (2, 1, 8),
				n => panic!("unsupported sample count {}", n),
			};
			(align(self.width0, downscale_x * 2), align(self.height0, downscale_y * 2), cpp)
		} else {
			// one bit per 128-byte block, an OWord covers 8x16 blocks
			let (downscale_x, downscale_y) = match self.tiling {
				Tiling::X => (64 / self.block_size * 8, 2 * 16),
				Tiling::Y => (32 / self.block_size * 8, 4 * 16),
				Tiling::None => panic!("MCS without tiling"),
			};
			// and the clear rectangle is aligned to 4x4 on Haswell
			(align(self.width0, downscale_x * 4) / downscale_x,
				align(self.height0, downscale_y * 4) / downscale_y,
				16)
		};

		self.aux_enables = (1 << (info.last_level + 1)) - 1;
		self.aux_stride = align(mcs_width * mcs_cpp, 128);
		self.aux_height = align(mcs_height, 32);
	}

	/// Switch to the tiling and stride of an imported buffer object.
	pub fn update_for_imported_bo(&mut self, tiling: Tiling, bo_stride: u32) -> bool {
		if !self.valid_tilings.contains(tiling.flag()) {
			return false;
		}
		let (tile_w, _) = tiling.tile_size();
		if bo_stride % tile_w != 0 {
			return false;
		}
		self.tiling = tiling;
		self.bo_stride = bo_stride;
		true
	}

	/// Position of a slice, in texels.
	pub fn slice_pos(&self, level: u32, slice: u32) -> (u32, u32) {
		let lod = &self.lods[level as usize];
		match self.walk {
			Walk::Lod => (lod.x, lod.y + lod.slice_height * slice),
			Walk::Layer => (lod.x, lod.y + self.layer_height * slice),
			Walk::Walk3D => {
				// slices are packed horizontally with wrapping
				let sx = slice & ((1 << level) - 1);
				let sy = slice >> level;
				let x = lod.x + lod.slice_width * sx;
				let y = lod.y + lod.slice_height * sy;
				assert!(y + lod.slice_height <= self.bo_height * self.block_height);
				(x, y)
			}
		}
	}

	/// Texel position to byte column and row.
	pub fn pos_to_mem(&self, x: u32, y: u32) -> (u32, u32) {
		assert!(x % self.block_width == 0 && y % self.block_height == 0);
		(x / self.block_width * self.block_size, y / self.block_height)
	}

	pub fn mem_to_linear(&self, mem_x: u32, mem_y: u32) -> u32 {
		mem_y * self.bo_stride + mem_x
	}

	/// Byte offset of a tile-aligned position in a tiled buffer.
	pub fn mem_to_raw(&self, mem_x: u32, mem_y: u32) -> u32 {
		let (tile_w, tile_h) = match self.tiling {
			Tiling::None if self.format == Format::S8_UINT => (64, 64),
			t => t.tile_size(),
		};
		assert!(mem_x % tile_w == 0 && mem_y % tile_h == 0);
		mem_y * self.bo_stride + mem_x * tile_h
	}

	/// Bytes between two slices of `level`, when slices are evenly spaced.
	pub fn slice_stride(&self, level: u32) -> u32 {
		let h = match self.walk {
			Walk::Lod => self.lods[level as usize].slice_height,
			Walk::Layer => self.layer_height,
			Walk::Walk3D if level == 0 => self.lods[0].slice_height,
			Walk::Walk3D => panic!("no single stride to walk across slices of level {}", level),
		};
		h / self.block_height * self.bo_stride
	}

	/// Byte offset of a level and slice, with the remaining texel offset
	/// inside the tile.
	pub fn slice_offset(&self, level: u32, slice: u32) -> (u32, u32, u32) {
		let (x, y) = self.slice_pos(level, slice);
		let (mem_x, mem_y) = self.pos_to_mem(x, y);
		let (tile_w, tile_h) = self.tiling.tile_size();
		let tile_x = mem_x - mem_x % tile_w;
		let tile_y = mem_y - mem_y % tile_h;
		let offset = if self.tiling == Tiling::None {
			self.mem_to_linear(tile_x, tile_y)
		} else {
			self.mem_to_raw(tile_x, tile_y)
		};
		let x_offset = (mem_x - tile_x) / self.block_size * self.block_width;
		let y_offset = (mem_y - tile_y) * self.block_height;
		(offset, x_offset, y_offset)
	}

	pub fn bo_size(&self) -> u64 {
		self.bo_stride as u64 * self.bo_height as u64
	}

	pub fn aux_size(&self) -> u64 {
		self.aux_stride as u64 * self.aux_height as u64
	}

	pub fn is_aux_enabled(&self, level: u32) -> bool {
		self.aux != Aux::None && self.aux_enables & (1 << level) != 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn small_sampler_texture_is_y_tiled() {
		let dev = DeviceInfo::ivb(2);
		let info = TextureInfo::new_2d(Format::R8G8B8A8_UNORM, 17, 17, BindFlags::SAMPLER_VIEW);
		let layout = Layout::new(&dev, &info);
		assert_eq!(layout.tiling, Tiling::Y);
		assert_eq!(layout.walk, Walk::Lod);
		assert_eq!(layout.bo_stride % 128, 0);
		assert_eq!(layout.bo_height % 32, 0);
		assert_eq!(layout.aux, Aux::None);
		assert_eq!(layout.lods[0].slice_width, 20);
		assert_eq!(layout.lods[0].slice_height, 18);
	}

	#[test]
	fn tiny_texture_stays_linear() {
		let dev = DeviceInfo::snb(2);
		let info = TextureInfo::new_2d(Format::R8G8B8A8_UNORM, 8, 8, BindFlags::SAMPLER_VIEW);
		let layout = Layout::new(&dev, &info);
		assert_eq!(layout.tiling, Tiling::None);
		assert_eq!(layout.bo_stride, 64);
		assert_eq!(layout.bo_height, 8);
	}

	#[test]
	fn transfer_layout_is_packed() {
		let dev = DeviceInfo::ivb(1);
		let mut info = TextureInfo::new_2d(Format::R8_UNORM, 100, 30, BindFlags::TRANSFER_READ);
		info.array_size = 3;
		let layout = Layout::new(&dev, &info);
		assert_eq!(layout.tiling, Tiling::None);
		assert_eq!(layout.bo_stride, 128);
		assert_eq!(layout.bo_height, 90);
	}

	#[test]
	fn depth_buffer_gets_hiz() {
		let dev = DeviceInfo::ivb(2);
		let info = TextureInfo::new_2d(Format::Z24_UNORM_S8_UINT, 64, 64, BindFlags::DEPTH_STENCIL);
		let layout = Layout::new(&dev, &info);
		assert_eq!(layout.tiling, Tiling::Y);
		assert!(layout.separate_stencil);
		assert_eq!(layout.format, Format::Z24X8_UNORM);
		assert_eq!(layout.aux, Aux::Hiz);
		assert!(layout.is_aux_enabled(0));
		assert_eq!(layout.aux_stride % 128, 0);
		assert_eq!(layout.aux_height % 32, 0);
	}

	#[test]
	fn gen6_stencil_without_hiz_is_not_separate() {
		let dev = DeviceInfo::snb(2);
		let mut info = TextureInfo::new_2d(Format::Z24_UNORM_S8_UINT, 64, 64, BindFlags::DEPTH_STENCIL);
		info.no_hiz = true;
		let layout = Layout::new(&dev, &info);
		assert!(!layout.separate_stencil);
		assert_eq!(layout.aux, Aux::None);
	}

	#[test]
	fn mipmapped_layers() {
		let dev = DeviceInfo::snb(2);
		let mut info = TextureInfo::new_2d(Format::B8G8R8A8_UNORM, 64, 64, BindFlags::SAMPLER_VIEW);
		info.target = Target::Tex2DArray;
		info.last_level = 2;
		info.array_size = 4;
		let layout = Layout::new(&dev, &info);
		assert_eq!(layout.walk, Walk::Layer);
		assert_eq!(layout.lods[1], Lod { x: 0, y: 64, slice_width: 32, slice_height: 32 });
		assert_eq!(layout.lods[2], Lod { x: 32, y: 64, slice_width: 16, slice_height: 16 });
		// h0 + h1 + 11 * align_j
		assert_eq!(layout.layer_height, 64 + 32 + 22);
		assert_eq!(layout.slice_pos(1, 2), (0, 64 + 2 * 118));
		assert_eq!(layout.slice_stride(0), 118 * layout.bo_stride);
	}

	#[test]
	fn slices_of_3d_textures_wrap() {
		let dev = DeviceInfo::ivb(2);
		let mut info = TextureInfo::new_2d(Format::R8G8B8A8_UNORM, 32, 32, BindFlags::SAMPLER_VIEW);
		info.target = Target::Tex3D;
		info.depth0 = 8;
		info.last_level = 1;
		let layout = Layout::new(&dev, &info);
		assert_eq!(layout.walk, Walk::Walk3D);
		assert_eq!(layout.slice_pos(0, 3), (0, 96));
		assert_eq!(layout.slice_pos(1, 3), (16, 256 + 16));
	}

	#[test]
	fn imported_bo_must_match_tiling() {
		let dev = DeviceInfo::ivb(2);
		let info = TextureInfo::new_2d(Format::B8G8R8A8_UNORM, 256, 256, BindFlags::RENDER_TARGET);
		let mut layout = Layout::new(&dev, &info);
		assert!(!layout.update_for_imported_bo(Tiling::X, 1000));
		assert!(layout.update_for_imported_bo(Tiling::X, 1024));
		assert_eq!(layout.bo_stride, 1024);
	}

	#[test]
	fn fast_clear_mcs_for_tiled_render_targets() {
		let dev = DeviceInfo::ivb(2);
		let info = TextureInfo::new_2d(Format::B8G8R8A8_UNORM, 256, 256, BindFlags::RENDER_TARGET);
		let layout = Layout::new(&dev, &info);
		assert_eq!(layout.tiling, Tiling::Y);
		assert_eq!(layout.aux, Aux::Mcs);
		assert_eq!(layout.aux_enables, 1);

		let snb = DeviceInfo::snb(2);
		assert_eq!(Layout::new(&snb, &info).aux, Aux::None);
	}
}
