use ilo_pipeline::blitter::{Blitter, ClearFlags};
use ilo_pipeline::cp::Cp;
use ilo_pipeline::dev::DeviceInfo;
use ilo_pipeline::format::Format;
use ilo_pipeline::layout::{Aux, BindFlags, TextureInfo, Tiling};
use ilo_pipeline::pipeline::Pipeline;
use ilo_pipeline::surface::{Texture, ZsSurface};
use ilo_pipeline::winsys::SoftWinsys;
use pretty_assertions::assert_eq;

#[test]
fn sampler_texture_allocation() {
	let dev = DeviceInfo::ivb(2);
	let mut ws = SoftWinsys::new(1 << 30);
	let info = TextureInfo::new_2d(Format::R8G8B8A8_UNORM, 17, 17, BindFlags::SAMPLER_VIEW);
	let tex = Texture::new(&dev, &mut ws, &info).unwrap();

	assert_eq!(tex.layout.tiling, Tiling::Y);
	assert_eq!(tex.layout.bo_stride % 128, 0);
	assert_eq!(tex.layout.bo_height % 32, 0);
	assert_eq!(tex.layout.aux, Aux::None);
	assert_eq!(tex.bo.size, tex.layout.bo_size());
	assert!(tex.separate_s8.is_none());
	assert!(tex.hiz_bo.is_none());
	assert_eq!(ws.live_count(), 1);
}

#[test]
fn depth_stencil_texture_owns_three_bos() {
	let dev = DeviceInfo::ivb(2);
	let mut ws = SoftWinsys::new(1 << 30);
	let info = TextureInfo::new_2d(Format::Z24_UNORM_S8_UINT, 64, 64, BindFlags::DEPTH_STENCIL);
	let tex = Texture::new(&dev, &mut ws, &info).unwrap();

	assert!(tex.hiz_bo.is_some());
	let s8 = tex.separate_s8.as_ref().unwrap();
	assert_eq!(s8.info.format, Format::S8_UINT);
	assert!(tex.can_enable_hiz(0, 0, 1));
	assert_eq!(ws.live_count(), 3);

	tex.release(&mut ws);
	assert_eq!(ws.live_count(), 0);
}

#[test]
fn hiz_clear_references_depth_and_hiz() {
	let dev = DeviceInfo::ivb(2);
	let cp = Cp::new(Box::new(SoftWinsys::new(1 << 30)), 8192).unwrap();
	let mut p = Pipeline::new(&dev, cp).unwrap();

	let info = TextureInfo::new_2d(Format::Z24X8_UNORM, 64, 64, BindFlags::DEPTH_STENCIL);
	let tex = Texture::new(&dev, p.cp_mut().winsys_mut(), &info).unwrap();
	let zs = ZsSurface::new(&dev, &tex, Format::Z24X8_UNORM, 0, 0, 1, false).unwrap();
	assert_eq!(zs.bo, Some(tex.bo));
	assert_eq!(zs.hiz_bo, tex.hiz_bo);

	let blitter = Blitter::clear_zs(&dev, zs, Format::Z24X8_UNORM, 64, 64, 1, ClearFlags::DEPTH, 1.0, 0);
	assert!(p.emit_rectlist(&blitter));

	let targets: Vec<_> = p.cp().relocs().iter().map(|r| r.bo).collect();
	assert!(targets.contains(&tex.bo));
	assert!(targets.contains(&tex.hiz_bo.unwrap()));
}
