#[macro_use]
extern crate log;

use std::env;
use std::process;
use getopts::{Matches, Options};

use ilo_pipeline::cso::*;
use ilo_pipeline::dev::{DeviceInfo, Gen};
use ilo_pipeline::drm::DrmWinsys;
use ilo_pipeline::error::{Error, Result};
use ilo_pipeline::format::{Format, Kind};
use ilo_pipeline::cp::Cp;
use ilo_pipeline::layout::{BindFlags, Layout, Target, TextureInfo};
use ilo_pipeline::pipeline::Pipeline;
use ilo_pipeline::state::*;
use ilo_pipeline::surface::{Buffer, Texture, ViewSurface};
use ilo_pipeline::winsys::{SoftWinsys, Winsys};

const BATCH_SIZE: usize = 8192;
const FB_WIDTH: u32 = 640;
const FB_HEIGHT: u32 = 480;

fn print_usage(program: &str, opts: Options) {
	let brief = format!("Usage: {} [options]", program);
	print!("{}", opts.usage(&brief));
}

fn parse_num<T: std::str::FromStr>(matches: &Matches, name: &str, default: T) -> Result<T> {
	match matches.opt_str(name) {
		Some(s) => s.parse().map_err(|_| Error::Invalid(format!("bad --{} value '{}'", name, s))),
		None => Ok(default),
	}
}

fn parse_pci_id(s: &str) -> Result<u16> {
	let r = match s.strip_prefix("0x") {
		Some(hex) => u16::from_str_radix(hex, 16),
		None => s.parse(),
	};
	r.map_err(|_| Error::Invalid(format!("bad PCI id '{}'", s)))
}

/// "WxH" or "WxHxD".
fn parse_extent(s: &str) -> Result<(u32, u32, u32)> {
	let dims: Vec<u32> = s.split('x')
		.map(|d| d.parse())
		.collect::<std::result::Result<_, _>>()
		.map_err(|_| Error::Invalid(format!("bad extent '{}'", s)))?;
	match dims[..] {
		[w, h] if w > 0 && h > 0 => Ok((w, h, 1)),
		[w, h, d] if w > 0 && h > 0 && d > 0 => Ok((w, h, d)),
		_ => Err(Error::Invalid(format!("bad extent '{}'", s))),
	}
}

fn device_from_opts(matches: &Matches) -> Result<DeviceInfo> {
	if let Some(id) = matches.opt_str("pci-id") {
		return DeviceInfo::from_pci_id(parse_pci_id(&id)?);
	}
	let gen = match matches.opt_str("gen") {
		Some(s) => Gen::parse(&s).ok_or_else(|| Error::Invalid(format!("unknown generation '{}'", s)))?,
		None => Gen::Gen7,
	};
	let gt = parse_num(matches, "gt", 2)?;
	Ok(DeviceInfo::new(gen, gt))
}

fn print_device(dev: &DeviceInfo) {
	println!("{} ({:?} GT{}), PCI id {:#06x}", dev.name, dev.gen, dev.gt, dev.devid);
	println!("  max VS/GS/WM threads = {}/{}/{}", dev.max_vs_threads, dev.max_gs_threads, dev.max_wm_threads);
	println!("  URB size = {} KB", dev.urb_size / 1024);
}

fn print_info(path: &str) -> Result<()> {
	let ws = DrmWinsys::open(path)?;
	let devid = ws.chipset_id()?;
	println!("Using device {}", path);
	println!("aperture = {} MB", ws.aperture_size() >> 20);
	println!("has LLC = {}", ws.has_llc()?);
	match DeviceInfo::from_pci_id(devid) {
		Ok(dev) => print_device(&dev),
		Err(_) => println!("PCI device id {:#06x} is not supported", devid),
	}
	Ok(())
}

/// A single triangle into a color buffer, with a pass-through VS and FS.
fn build_triangle(dev: &DeviceInfo, ws: &mut dyn Winsys) -> Result<StateVector> {
	let mut vec = StateVector::new(dev);

	let info = TextureInfo::new_2d(Format::B8G8R8A8_UNORM, FB_WIDTH, FB_HEIGHT,
		BindFlags::RENDER_TARGET | BindFlags::SAMPLER_VIEW);
	let rt = Texture::new(dev, ws, &info)?;
	let surface = ViewSurface::for_texture(dev, &rt, Format::B8G8R8A8_UNORM, 0, 1, 0, 1, true, false)?;
	let cbufs = vec![Some(RenderTarget { surface: surface, format: Format::B8G8R8A8_UNORM })];
	vec.set_framebuffer(dev, FB_WIDTH, FB_HEIGHT, cbufs, None, 1);

	let vertices = Buffer::new(ws, "vertices", 3 * 16)?;
	vec.bind_vertex_buffers(0, &[Some(VertexBuffer { buffer: vertices, offset: 0, stride: 16 })]);
	vec.bind_vertex_elements(VertexElements::new(dev, &[VertexElementDesc {
		src_offset: 0,
		vertex_buffer_index: 0,
		instance_divisor: 0,
		src_format: Format::R32G32B32A32_FLOAT,
	}]));

	let kernels = ws.alloc("kernels", 4096)?;
	vec.set_shader_bo(kernels);
	let vs = Kernel {
		input_count: 1,
		output_count: 2,
		urb_data_start_reg: 1,
		..Kernel::default()
	};
	let fs = Kernel {
		input_count: 1,
		urb_data_start_reg: 2,
		fs_barycentric_interps: 1,
		..Kernel::default()
	};
	vec.bind_shader(Stage::Vs, Some(Shader::new(dev, Stage::Vs, vs, 0)));
	vec.bind_shader(Stage::Fs, Some(Shader::new(dev, Stage::Fs, fs, 1024)));

	let (w, h) = (FB_WIDTH as f32, FB_HEIGHT as f32);
	vec.set_viewports(vec![Viewport::new(dev, &ViewportDesc {
		scale: [w / 2.0, -h / 2.0, 0.5],
		translate: [w / 2.0, h / 2.0, 0.5],
	})]);
	vec.set_draw(DrawInfo {
		count: 3,
		..DrawInfo::default()
	});
	Ok(vec)
}

fn run_draws(dev: &DeviceInfo, ws: Box<dyn Winsys>, draws: u32, dump: bool) -> Result<()> {
	let cp = Cp::new(ws, BATCH_SIZE)?;
	let mut p = Pipeline::new(dev, cp)?;
	let mut vec = build_triangle(dev, p.cp_mut().winsys_mut())?;

	for i in 0..draws {
		// something changes every draw, so each one re-emits a little state
		let t = i as f32 / draws.max(1) as f32;
		vec.set_blend_color([t, 0.0, 1.0 - t, 1.0]);
		if !p.emit_draw(&mut vec) {
			return Err(Error::Invalid(format!("draw {} does not fit an empty batch", i)));
		}
		debug!("draw {}: {} words used", i, p.cp().used());
	}
	p.emit_flush();

	info!("{} draws in {} words, {} relocations", draws, p.cp().used(), p.cp().relocs().len());
	if dump {
		p.cp().dump();
	}
	p.cp_mut().flush("end of frame")
}

fn layout_info(format: Format, w: u32, h: u32, d: u32) -> TextureInfo {
	let bind = match format.kind() {
		Kind::Depth | Kind::Stencil | Kind::DepthStencil => BindFlags::DEPTH_STENCIL,
		_ => BindFlags::SAMPLER_VIEW,
	};
	let mut info = TextureInfo::new_2d(format, w, h, bind);
	if d > 1 {
		info.target = Target::Tex3D;
		info.depth0 = d;
	}
	let max_dim = w.max(h).max(d);
	info.last_level = 31 - max_dim.leading_zeros();
	info
}

fn num_slices(info: &TextureInfo, level: u32) -> u32 {
	match info.target {
		Target::Tex3D => (info.depth0 >> level).max(1),
		_ => info.array_size,
	}
}

fn print_layout(info: &TextureInfo, layout: &Layout) {
	println!("{}x{}x{} {} with {} levels", info.width0, info.height0, info.depth0,
		info.format.name(), info.last_level + 1);
	println!("  tiling {:?}, walk {:?}, aux {:?}", layout.tiling, layout.walk, layout.aux);
	println!("  align {}x{}, block {}x{} of {} bytes", layout.align_i, layout.align_j,
		layout.block_width, layout.block_height, layout.block_size);
	println!("  bo {} bytes per row, {} rows, {} bytes", layout.bo_stride, layout.bo_height, layout.bo_size());
	if layout.aux_size() > 0 {
		println!("  aux {} bytes per row, {} rows", layout.aux_stride, layout.aux_height);
	}
	for (level, lod) in layout.lods.iter().enumerate() {
		println!("  level {:2}: at {:5},{:5} slice {}x{}, {} slices", level, lod.x, lod.y,
			lod.slice_width, lod.slice_height, num_slices(info, level as u32));
	}
}

const PALETTE: [[u8; 3]; 6] = [
	[0xe6, 0x19, 0x4b],
	[0x3c, 0xb4, 0x4b],
	[0x43, 0x63, 0xd8],
	[0xf5, 0x82, 0x31],
	[0x91, 0x1e, 0xb4],
	[0x46, 0xf0, 0xf0],
];

/// One pixel per block of the buffer, slices colored by level.
fn write_layout_image(path: &str, info: &TextureInfo, layout: &Layout) -> Result<()> {
	let width = layout.bo_stride / layout.block_size;
	let height = layout.bo_height;
	let mut pixels = vec![0u8; (width * height * 4) as usize];
	for (i, px) in pixels.chunks_mut(4).enumerate() {
		// checker the tiles
		let (tile_w, tile_h) = layout.tiling.tile_size();
		let tx = i as u32 % width * layout.block_size / tile_w;
		let ty = i as u32 / width / tile_h;
		let shade = if (tx + ty) % 2 == 0 { 0x20 } else { 0x30 };
		px.copy_from_slice(&[shade, shade, shade, 0xff]);
	}

	for (level, lod) in layout.lods.iter().enumerate() {
		let color = PALETTE[level % PALETTE.len()];
		for slice in 0..num_slices(info, level as u32) {
			let (x, y) = layout.slice_pos(level as u32, slice);
			let (x, y) = (x / layout.block_width, y / layout.block_height);
			let w = (lod.slice_width + layout.block_width - 1) / layout.block_width;
			let h = (lod.slice_height + layout.block_height - 1) / layout.block_height;
			for row in y..(y + h).min(height) {
				for col in x..(x + w).min(width) {
					let i = ((row * width + col) * 4) as usize;
					pixels[i..i + 3].copy_from_slice(&color);
				}
			}
		}
	}

	image::save_buffer(path, &pixels, width, height, image::ColorType::Rgba8)
		.map_err(|e| Error::Invalid(format!("cannot write {}: {}", path, e)))
}

fn run(matches: &Matches) -> Result<()> {
	if matches.opt_present("info") {
		let path = matches.opt_str("dev").unwrap_or_else(|| "/dev/dri/renderD128".to_owned());
		return print_info(&path);
	}

	if let Some(extent) = matches.opt_str("layout") {
		let dev = device_from_opts(matches)?;
		let (w, h, d) = parse_extent(&extent)?;
		let format = match matches.opt_str("format") {
			Some(s) => Format::parse(&s).ok_or_else(|| Error::Invalid(format!("unknown format '{}'", s)))?,
			None => Format::R8G8B8A8_UNORM,
		};
		let info = layout_info(format, w, h, d);
		let layout = Layout::new(&dev, &info);
		print_layout(&info, &layout);
		if let Some(path) = matches.opt_str("write-image") {
			write_layout_image(&path, &info, &layout)?;
			info!("wrote layout map to {}", path);
		}
		return Ok(());
	}

	let draws = parse_num(matches, "draws", 1)?;
	match matches.opt_str("dev") {
		Some(path) => {
			let ws = DrmWinsys::open(&path)?;
			let dev = DeviceInfo::from_pci_id(ws.chipset_id()?)?;
			println!("Using device {}: {}", path, dev.name);
			run_draws(&dev, Box::new(ws), draws, false)
		}
		None => {
			let dev = device_from_opts(matches)?;
			let aperture = parse_num(matches, "aperture", 256u64 << 20)?;
			print_device(&dev);
			let ws = SoftWinsys::new(aperture);
			let submissions = ws.submissions();
			run_draws(&dev, Box::new(ws), draws, true)?;
			println!("{} batches submitted", submissions.borrow().len());
			Ok(())
		}
	}
}

fn main() {
	pretty_env_logger::init();

	let args: Vec<String> = env::args().collect();
	let program = args[0].clone();

	let mut opts = Options::new();
	opts.optflag("h", "help", "print this help menu");
	opts.optopt("d", "dev", "submit through i915 on this device", "DEVICE");
	opts.optopt("g", "gen", "one of ‘6’, ‘7’ or ‘7.5’ when dumping", "GEN");
	opts.optopt("", "gt", "GT tier when dumping", "N");
	opts.optopt("", "pci-id", "look the device up by PCI id", "ID");
	opts.optflag("", "info", "display results of the i915 getparam and aperture ioctls");
	opts.optopt("", "draws", "number of draws to build", "N");
	opts.optopt("", "aperture", "aperture of the in-memory winsys", "BYTES");
	opts.optopt("", "layout", "print the layout of a texture, eg. ‘64x64’ or ‘32x32x8’", "WxH[xD]");
	opts.optopt("", "format", "texture format for --layout", "FORMAT");
	opts.optopt("o", "write-image", "write a map of the layout to a PNG file", "FILENAME");

	let matches = match opts.parse(&args[1..]) {
		Ok(m) => m,
		Err(f) => {
			eprintln!("{}", f);
			print_usage(&program, opts);
			process::exit(2);
		}
	};

	if matches.opt_present("help") {
		print_usage(&program, opts);
		return
	}

	if let Err(e) = run(&matches) {
		error!("{}", e);
		process::exit(1);
	}
}
