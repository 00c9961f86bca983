//! Core of a block-based terminal surface.
//!
//! Invariant: one logical thread — every layout recompute runs synchronously
//! to completion before the next mutation starts.
//!
//! # Public API Overview
//! - Compose variable-height [`Region`]s into one scrollable space with
//!   [`VirtualScrollArea`].
//! - Feed application-mode control sequences through [`FramingStateMachine`]
//!   to carve command output into return-code stamped frames.
//! - Drive both from a [`TerminalSurface`] owning an [`Emulator`]
//!   collaborator.
//! - Configure scrollback budget and no-frame rules via [`SurfaceConfig`].

pub mod config;

pub mod control;
pub mod core;
pub mod runtime;

/// Host-supplied configuration.
pub use crate::config::{
    CommandLineAction, ConfigError, MatchKind, NoFrameRules, SurfaceConfig, SurfaceMetrics,
};

/// Control-channel protocol.
pub use crate::control::framing::{ControlAction, FramingStateMachine};
pub use crate::control::show_file::FileMetadata;
pub use crate::control::ControlError;

/// Content blocks and collaborator traits.
pub use crate::core::emulator::{Emulator, EmulatorDimensions, RenderEvent};
pub use crate::core::frame_region::{FrameIcon, FramedRegion, PreviewerKind};
pub use crate::core::live_region::{LineBookmark, LiveRegion};
pub use crate::core::region::{
    region_rc, InteractionMode, Region, RegionGeometry, RegionKind, RegionRc,
};

/// Layout and orchestration.
pub use crate::runtime::surface::{FrameEvent, TerminalSurface};
pub use crate::runtime::virtual_area::{ScrollbarState, VirtualScrollArea};
