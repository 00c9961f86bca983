//! Content-block types and the collaborator traits they are built on.

pub mod emulator;
pub mod frame_region;
pub mod live_region;
pub mod region;
