//! Local media capture and display surfaces.

pub mod h264_file;
pub mod source;
pub mod surface;

pub use h264_file::*;
pub use source::*;
pub use surface::*;
