//! Mid-end optimizer for a VM whose memory is an array of 32-byte cells.
//!
//! Functions arrive here already in SSA form. The centerpiece is
//! [`opt::indexed_memops`], which rewrites unit-stride address arithmetic in
//! loops into an explicit loop-carried pointer so that a later lowering stage
//! can fuse the pattern into the machine's indexed load/store instructions.

pub mod ir;
pub mod opt;
pub mod utils;
