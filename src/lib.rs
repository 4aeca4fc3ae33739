//! Command-stream generation for the GEN6 and GEN7 Intel 3D pipeline.
//!
//! A `pipeline::Pipeline` turns a `state::StateVector` into batch buffer
//! words through the per-generation encoders in `gpe_gen6` and `gpe_gen7`,
//! and submits finished batches through a `winsys::Winsys`.

#[macro_use]
extern crate log;
#[macro_use]
extern crate num_derive;
#[macro_use]
extern crate nix;
extern crate num;

pub mod blitter;
pub mod cmd;
pub mod cp;
pub mod cso;
pub mod decode;
pub mod dev;
pub mod drm;
pub mod drm_i915_ioctl;
pub mod error;
pub mod format;
pub mod gpe;
pub mod gpe_gen6;
pub mod gpe_gen7;
pub mod layout;
pub mod pci_ids;
pub mod pipeline;
pub mod pipeline_gen6;
pub mod pipeline_gen7;
pub mod state;
pub mod surface;
pub mod winsys;
