//! Layout engine and the surface orchestrator built on top of it.

pub mod stash;
pub mod surface;
pub mod virtual_area;
