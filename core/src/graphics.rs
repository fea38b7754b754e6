//! Small value types shared by the picture/window/cast intrinsics (spec
//! §4.9) and the [`Renderer`](crate::traits::Renderer) contract. The core
//! never touches pixel buffers itself; these are just the vocabulary the
//! intrinsic layer and the renderer agree on.

use strum_macros::{Display, EnumString};

/// How a filled primitive's interior is painted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum FillMode {
    #[default]
    None,
    Hatch,
    Solid,
}

/// The raster-operation combining a source pixel with its destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum RopMode {
    #[default]
    Copy,
    Xor,
    Merge,
    Not,
    Mask,
}

/// An RGB triple used both for solid fills and for color-key transparency
/// ("Cast" pixels matching this color are skipped when blitting).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Opaque handles the intrinsic layer hands to the `Renderer`. The runtime
/// never interprets these beyond equality/uniqueness; they're allocated by
/// `Engine` in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PictureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CastId(pub u32);

/// Fixed logical desktop dimensions reported via `win_info(0|1)` (spec §6).
pub const VIRTUAL_DESKTOP_WIDTH: i64 = 1280;
pub const VIRTUAL_DESKTOP_HEIGHT: i64 = 720;

/// Constant title-bar + border offset added to a window's nominal position
/// (spec §6).
pub const WINDOW_FRAME_OFFSET_X: i64 = 4;
pub const WINDOW_FRAME_OFFSET_Y: i64 = 23;
