use ilo_pipeline::blitter::{Blitter, ClearFlags};
use ilo_pipeline::cmd::*;
use ilo_pipeline::cp::Cp;
use ilo_pipeline::cso::*;
use ilo_pipeline::decode::{command_name, split};
use ilo_pipeline::dev::DeviceInfo;
use ilo_pipeline::format::Format;
use ilo_pipeline::gpe::Action;
use ilo_pipeline::layout::{BindFlags, Layout, TextureInfo};
use ilo_pipeline::pipeline::{Invalidate, Pipeline, StateSlot};
use ilo_pipeline::state::*;
use ilo_pipeline::surface::{Buffer, Texture, ViewSurface, ZsSurface};
use ilo_pipeline::winsys::{SoftWinsys, Winsys};
use pretty_assertions::assert_eq;

const BATCH_SIZE: usize = 8192;

fn devices() -> Vec<DeviceInfo> {
	vec![DeviceInfo::snb(2), DeviceInfo::ivb(1), DeviceInfo::hsw(3)]
}

fn rt_info(width: u32, height: u32) -> TextureInfo {
	TextureInfo::new_2d(Format::B8G8R8A8_UNORM, width, height, BindFlags::RENDER_TARGET)
}

/// A triangle into a `width`x`height` color buffer.
fn triangle(dev: &DeviceInfo, ws: &mut dyn Winsys, width: u32, height: u32) -> StateVector {
	let mut vec = StateVector::new(dev);

	let rt = Texture::new(dev, ws, &rt_info(width, height)).unwrap();
	let surface = ViewSurface::for_texture(dev, &rt, Format::B8G8R8A8_UNORM, 0, 1, 0, 1, true, false).unwrap();
	vec.set_framebuffer(dev, width, height,
		vec![Some(RenderTarget { surface: surface, format: Format::B8G8R8A8_UNORM })], None, 1);

	let vertices = Buffer::new(ws, "vertices", 48).unwrap();
	vec.bind_vertex_buffers(0, &[Some(VertexBuffer { buffer: vertices, offset: 0, stride: 16 })]);
	vec.bind_vertex_elements(VertexElements::new(dev, &[VertexElementDesc {
		src_offset: 0,
		vertex_buffer_index: 0,
		instance_divisor: 0,
		src_format: Format::R32G32B32A32_FLOAT,
	}]));

	vec.set_shader_bo(ws.alloc("kernels", 4096).unwrap());
	let vs = Kernel { input_count: 1, output_count: 2, urb_data_start_reg: 1, ..Kernel::default() };
	let fs = Kernel { input_count: 1, urb_data_start_reg: 2, fs_barycentric_interps: 1, ..Kernel::default() };
	vec.bind_shader(Stage::Vs, Some(Shader::new(dev, Stage::Vs, vs, 0)));
	vec.bind_shader(Stage::Fs, Some(Shader::new(dev, Stage::Fs, fs, 1024)));

	vec.set_draw(DrawInfo { count: 3, ..DrawInfo::default() });
	vec
}

/// Stream the first VS output into a 1024 byte buffer, 16 bytes a vertex.
fn stream_output(dev: &DeviceInfo, ws: &mut dyn Winsys, vec: &mut StateVector) {
	let vs = Kernel { input_count: 1, output_count: 2, urb_data_start_reg: 1, ..Kernel::default() };
	let so_info = SoInfo {
		outputs: vec![SoOutput { num_components: 4, ..SoOutput::default() }],
		stride: [4, 0, 0, 0],
	};
	vec.bind_shader(Stage::Vs, Some(Shader::new(dev, Stage::Vs, vs, 0).with_so_info(so_info)));
	let buffer = Buffer::new(ws, "stream output", 1024).unwrap();
	vec.set_stream_output_targets(vec![Some(SoTarget { buffer: buffer, offset: 0, size: 1024 })], 0);
}

fn new_pipeline(dev: &DeviceInfo, ws: SoftWinsys) -> Pipeline {
	Pipeline::new(dev, Cp::new(Box::new(ws), BATCH_SIZE).unwrap()).unwrap()
}

fn names(words: &[u32]) -> Vec<String> {
	split(words).iter().map(|p| command_name(p.header)).collect()
}

#[test]
fn estimates_bound_what_is_emitted() {
	for dev in devices() {
		let mut p = new_pipeline(&dev, SoftWinsys::new(1 << 30));
		let mut vec = triangle(&dev, p.cp_mut().winsys_mut(), 64, 64);

		// a draw may flush twice on GEN6 for the URB workaround
		let estimate = p.estimate_size(Action::Draw(&vec)) + 2 * p.estimate_size(Action::Flush);
		let space = p.cp().space();
		assert!(p.emit_draw(&mut vec));
		assert!(space - p.cp().space() <= estimate, "draw on {}", dev.name);

		let space = p.cp().space();
		p.emit_flush();
		assert!(space - p.cp().space() <= p.estimate_size(Action::Flush), "flush on {}", dev.name);

		let bo = p.cp_mut().winsys_mut().alloc("queries", 4096).unwrap();
		let space = p.cp().space();
		p.emit_write_timestamp(bo, 0);
		assert!(space - p.cp().space() <= p.estimate_size(Action::WriteTimestamp));
		let space = p.cp().space();
		p.emit_write_depth_count(bo, 1);
		assert!(space - p.cp().space() <= p.estimate_size(Action::WriteDepthCount));
		let space = p.cp().space();
		p.emit_write_statistics(bo, 1);
		assert!(space - p.cp().space() <= p.estimate_size(Action::WriteStatistics));

		let blitter = Blitter::clear_zs(&dev, ZsSurface::null(&dev), Format::Z24X8_UNORM, 64, 64, 1,
			ClearFlags::DEPTH, 1.0, 0);
		let space = p.cp().space();
		assert!(p.emit_rectlist(&blitter));
		assert!(space - p.cp().space() <= p.estimate_size(Action::Rectlist), "rectlist on {}", dev.name);
	}
}

#[test]
fn unchanged_draw_is_a_bare_primitive() {
	for dev in devices() {
		let mut p = new_pipeline(&dev, SoftWinsys::new(1 << 30));
		let mut vec = triangle(&dev, p.cp_mut().winsys_mut(), 64, 64);
		assert!(p.emit_draw(&mut vec));

		let used = p.cp().used();
		let stolen = p.cp().stolen();
		assert!(p.emit_draw(&mut vec));
		assert_eq!(names(&p.cp().commands()[used..]), vec!["3DPRIMITIVE"]);
		assert_eq!(p.cp().stolen(), stolen);
	}
}

#[test]
fn draw_clears_dirty_bits() {
	let dev = DeviceInfo::ivb(2);
	let mut p = new_pipeline(&dev, SoftWinsys::new(1 << 30));
	let mut vec = triangle(&dev, p.cp_mut().winsys_mut(), 64, 64);
	assert_eq!(p.invalidate_flags(), Invalidate::HW);

	assert!(p.emit_draw(&mut vec));
	assert_eq!(vec.dirty, Dirty::empty());
	assert!(p.invalidate_flags().is_empty());
}

#[test]
fn blend_color_change_reemits_color_calc_only() {
	for dev in devices() {
		let mut p = new_pipeline(&dev, SoftWinsys::new(1 << 30));
		let mut vec = triangle(&dev, p.cp_mut().winsys_mut(), 64, 64);
		assert!(p.emit_draw(&mut vec));

		vec.set_blend_color([1.0, 0.5, 0.25, 1.0]);
		let used = p.cp().used();
		assert!(p.emit_draw(&mut vec));
		assert_eq!(names(&p.cp().commands()[used..]), vec!["3DSTATE_CC_STATE_POINTERS", "3DPRIMITIVE"]);
	}
}

#[test]
fn blend_rebind_reemits_blend_pointers() {
	for dev in devices() {
		let mut p = new_pipeline(&dev, SoftWinsys::new(1 << 30));
		let mut vec = triangle(&dev, p.cp_mut().winsys_mut(), 64, 64);
		assert!(p.emit_draw(&mut vec));
		let offset = p.shadow().get(StateSlot::Blend);

		vec.bind_blend(Blend::new(&dev, &BlendDesc::default()));
		assert!(vec.dirty.contains(Dirty::BLEND));
		let used = p.cp().used();
		let serial = p.cp().serial();
		assert!(p.emit_draw(&mut vec));
		assert_eq!(p.cp().serial(), serial);
		assert_ne!(p.shadow().get(StateSlot::Blend), offset, "{}", dev.name);

		let opcodes: Vec<u32> = split(&p.cp().commands()[used..]).iter().map(|pkt| pkt.header >> 16).collect();
		let pointers = if dev.is_gen6() {
			Opcode::_3DSTATE_CC_STATE_POINTERS as u32
		} else {
			Gen7Opcode::_3DSTATE_BLEND_STATE_POINTERS as u32
		};
		assert!(opcodes.contains(&pointers), "{}", dev.name);
		assert!(!opcodes.contains(&(Opcode::_3DSTATE_VS as u32)), "{}", dev.name);
		// 3DSTATE_PS carries dual source blending
		if !dev.is_gen6() {
			assert!(opcodes.contains(&(Gen7Opcode::_3DSTATE_PS as u32)), "{}", dev.name);
		}
		assert_eq!(opcodes.last(), Some(&(Opcode::_3DPRIMITIVE as u32)));
	}
}

fn post_sync_writes(words: &[u32]) -> usize {
	split(words).iter()
		.filter(|pkt| pkt.header >> 16 == Opcode::PIPE_CONTROL as u32)
		.filter(|pkt| pkt.words[0] & PIPE_CONTROL_WRITE_MASK == PIPE_CONTROL_WRITE_IMM)
		.count()
}

#[test]
fn one_post_sync_write_per_draw() {
	let dev = DeviceInfo::snb(2);
	let mut p = new_pipeline(&dev, SoftWinsys::new(1 << 30));
	let mut vec = triangle(&dev, p.cp_mut().winsys_mut(), 64, 64);
	assert!(p.emit_draw(&mut vec));
	assert_eq!(post_sync_writes(p.cp().commands()), 1);
}

#[test]
fn post_sync_write_repeats_for_every_primitive() {
	let dev = DeviceInfo::snb(2);
	let mut p = new_pipeline(&dev, SoftWinsys::new(1 << 30));
	let mut vec = triangle(&dev, p.cp_mut().winsys_mut(), 64, 64);
	assert!(p.emit_draw(&mut vec));
	let serial = p.cp().serial();
	let used = p.cp().used();

	// 3DSTATE_MULTISAMPLE needs the workaround again within the same batch
	vec.set_sample_mask(0x1);
	assert!(p.emit_draw(&mut vec));
	assert_eq!(p.cp().serial(), serial);
	assert_eq!(post_sync_writes(&p.cp().commands()[used..]), 1);
	assert_eq!(post_sync_writes(p.cp().commands()), 2);
}

#[test]
fn stream_output_appends_across_draws() {
	let dev = DeviceInfo::snb(2);
	let mut p = new_pipeline(&dev, SoftWinsys::new(1 << 30));
	let mut vec = triangle(&dev, p.cp_mut().winsys_mut(), 64, 64);
	stream_output(&dev, p.cp_mut().winsys_mut(), &mut vec);

	assert!(p.emit_draw(&mut vec));
	assert_eq!(p.so_num_vertices(), 3);
	assert!(p.emit_draw(&mut vec));
	assert_eq!(p.so_num_vertices(), 6);

	// the second triangle of a strip is one primitive more
	vec.set_draw(DrawInfo { mode: PrimType::TriangleStrip, count: 4, ..DrawInfo::default() });
	assert!(p.emit_draw(&mut vec));
	assert_eq!(p.so_num_vertices(), 12);
}

#[test]
fn stream_output_stops_at_the_end_of_the_buffer() {
	let dev = DeviceInfo::snb(2);
	let mut p = new_pipeline(&dev, SoftWinsys::new(1 << 30));
	let mut vec = triangle(&dev, p.cp_mut().winsys_mut(), 64, 64);
	stream_output(&dev, p.cp_mut().winsys_mut(), &mut vec);

	// 64 vertices fit, 21 whole triangles of them
	vec.set_draw(DrawInfo { count: 3, instance_count: 30, ..DrawInfo::default() });
	assert!(p.emit_draw(&mut vec));
	assert_eq!(p.so_num_vertices(), 63);
	assert!(p.emit_draw(&mut vec));
	assert_eq!(p.so_num_vertices(), 63);
}

#[test]
fn unappended_targets_restart_stream_output() {
	let dev = DeviceInfo::snb(2);
	let mut p = new_pipeline(&dev, SoftWinsys::new(1 << 30));
	let mut vec = triangle(&dev, p.cp_mut().winsys_mut(), 64, 64);
	stream_output(&dev, p.cp_mut().winsys_mut(), &mut vec);
	assert!(p.emit_draw(&mut vec));
	assert!(p.emit_draw(&mut vec));
	assert_eq!(p.so_num_vertices(), 6);

	let targets = vec.so.targets.clone();
	vec.set_stream_output_targets(targets.clone(), 0x1);
	assert!(p.emit_draw(&mut vec));
	assert_eq!(p.so_num_vertices(), 9);

	vec.set_stream_output_targets(targets, 0);
	let used = p.cp().used();
	assert!(p.emit_draw(&mut vec));
	assert_eq!(p.so_num_vertices(), 3);

	let packets = split(&p.cp().commands()[used..]);
	let svbi = packets.iter()
		.find(|pkt| pkt.header >> 16 == Opcode::_3DSTATE_GS_SVB_INDEX as u32)
		.unwrap();
	// index 0 restarts at vertex 0 with room for 64
	assert_eq!(svbi.words, vec![0, 0, 64]);
}

#[test]
fn kernel_bo_change_moves_the_instruction_base() {
	for dev in devices() {
		let mut p = new_pipeline(&dev, SoftWinsys::new(1 << 30));
		let mut vec = triangle(&dev, p.cp_mut().winsys_mut(), 64, 64);
		assert!(p.emit_draw(&mut vec));

		let kernels = p.cp_mut().winsys_mut().alloc("kernels", 4096).unwrap();
		vec.set_shader_bo(kernels);
		let used = p.cp().used();
		let relocs = p.cp().relocs().len();
		assert!(p.emit_draw(&mut vec));

		let emitted = names(&p.cp().commands()[used..]);
		assert!(emitted.iter().any(|n| n == "STATE_BASE_ADDRESS"), "{}", dev.name);
		assert!(p.cp().relocs()[relocs..].iter().any(|r| r.bo == kernels), "{}", dev.name);

		// the new base sticks
		let used = p.cp().used();
		assert!(p.emit_draw(&mut vec));
		assert_eq!(names(&p.cp().commands()[used..]), vec!["3DPRIMITIVE"]);
	}
}

#[test]
fn flush_lands_in_a_new_batch_when_the_old_one_is_full() {
	let dev = DeviceInfo::snb(2);
	let ws = SoftWinsys::new(1 << 30);
	let submissions = ws.submissions();
	let mut p = new_pipeline(&dev, ws);

	let bo = p.cp_mut().winsys_mut().alloc("queries", 4096).unwrap();
	let serial = p.cp().serial();
	let limit = p.estimate_size(Action::Flush).max(p.estimate_size(Action::WriteTimestamp));
	while p.cp().space() >= limit {
		p.emit_write_timestamp(bo, 0);
	}
	assert_eq!(p.cp().serial(), serial);
	p.emit_flush();

	assert_eq!(submissions.borrow().len(), 1);
	assert_eq!(p.cp().serial(), serial + 1);
	assert_eq!(names(p.cp().commands()).last().map(|n| n.as_str()), Some("PIPE_CONTROL"));
}

#[test]
fn batch_ends_with_a_flush() {
	let dev = DeviceInfo::hsw(2);
	let ws = SoftWinsys::new(1 << 30);
	let submissions = ws.submissions();
	let mut p = new_pipeline(&dev, ws);
	let mut vec = triangle(&dev, p.cp_mut().winsys_mut(), 64, 64);
	assert!(p.emit_draw(&mut vec));
	p.emit_flush();
	p.cp_mut().flush("test").unwrap();

	let submissions = submissions.borrow();
	assert_eq!(submissions.len(), 1);
	let names = names(&submissions[0].commands);
	let end = names.iter().position(|n| n == "MI_BATCH_BUFFER_END").unwrap();
	assert_eq!(names[end - 1], "PIPE_CONTROL");
	assert_eq!(names[end - 2], "3DPRIMITIVE");
}

#[test]
fn draw_that_cannot_fit_the_aperture_fails() {
	let dev = DeviceInfo::ivb(2);
	// the batch and the workaround bo fit, the color buffer does not
	let mut p = new_pipeline(&dev, SoftWinsys::new(64 * 1024));
	let mut vec = triangle(&dev, p.cp_mut().winsys_mut(), 512, 512);

	assert!(!p.emit_draw(&mut vec));
	assert_eq!(vec.dirty, Dirty::all());
	assert!(p.cp().is_empty());
	assert!(p.invalidate_flags().contains(Invalidate::STATE_BO));
}

#[test]
fn aperture_overflow_submits_and_retries() {
	let dev = DeviceInfo::ivb(2);
	let small = Layout::new(&dev, &rt_info(256, 256)).bo_size();
	let large = Layout::new(&dev, &rt_info(512, 512)).bo_size();
	// batch, workaround, both vertex buffers and kernels, the large color
	// buffer and half of the small one
	let aperture = (BATCH_SIZE * 4) as u64 + 4096 + 2 * (48 + 4096) + large + small / 2;

	let ws = SoftWinsys::new(aperture);
	let submissions = ws.submissions();
	let mut p = new_pipeline(&dev, ws);
	let mut first = triangle(&dev, p.cp_mut().winsys_mut(), 256, 256);
	let mut second = triangle(&dev, p.cp_mut().winsys_mut(), 512, 512);

	assert!(p.emit_draw(&mut first));
	let serial = p.cp().serial();
	assert!(p.emit_draw(&mut second));

	assert_eq!(submissions.borrow().len(), 1);
	assert_eq!(p.cp().serial(), serial + 1);
	// the new batch points the hardware at its own state
	assert!(names(p.cp().commands()).iter().any(|n| n == "STATE_BASE_ADDRESS"));
	assert_eq!(second.dirty, Dirty::empty());
}
