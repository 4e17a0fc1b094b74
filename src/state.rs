//! The inheritable per-scope configuration record

use std::collections::HashMap;
use std::path::PathBuf;

use image::Rgba;

use crate::definitions::Definition;
use crate::geometry::{PointF, Rect, Size};
use crate::sequence::FilenameSequence;

/// Atlas-wide alpha post-processing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alpha {
    #[default]
    Keep,
    Clear,
    Bleed,
    Premultiply,
    Colorkey,
}

/// How a sprite's transparent border is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trim {
    #[default]
    None,
    Trim,
    Crop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PivotX {
    Left,
    #[default]
    Center,
    Right,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PivotY {
    Top,
    #[default]
    Middle,
    Bottom,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pivot {
    pub x: PivotX,
    pub y: PivotY,
}

/// How extruded edge pixels are sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapMode {
    #[default]
    Clamp,
    Mirror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extrude {
    pub count: i32,
    pub mode: WrapMode,
}

/// The configuration accumulated at one nesting level.
///
/// Opening a scope clones the parent record, so every setting made outside
/// is visible inside and overriding it never touches the parent. The scope
/// stack holds these by value; records never alias each other.
#[derive(Debug, Clone)]
pub struct State {
    pub definition: Definition,
    pub level: i32,
    pub indent: String,

    pub texture: PathBuf,
    pub width: i32,
    pub height: i32,
    pub max_width: i32,
    pub max_height: i32,
    pub power_of_two: bool,
    pub square: bool,
    pub align_width: i32,
    pub allow_rotate: bool,
    pub shape_padding: i32,
    pub border_padding: i32,
    pub deduplicate: bool,
    pub alpha: Alpha,
    pub alpha_colorkey: Rgba<u8>,

    pub path: PathBuf,
    pub sheet: FilenameSequence,
    pub colorkey: Rgba<u8>,
    pub tags: HashMap<String, String>,

    pub grid: Size,
    pub grid_offset: Size,
    pub grid_spacing: Size,
    pub span: Size,

    pub sprite: String,
    pub rect: Rect,
    pub pivot: Pivot,
    pub pivot_point: PointF,
    pub trim: Trim,
    pub trim_margin: i32,
    pub trim_threshold: i32,
    pub extrude: Extrude,
    pub common_divisor: Size,
}

impl Default for State {
    fn default() -> Self {
        State {
            definition: Definition::None,
            level: 0,
            indent: String::new(),

            texture: PathBuf::new(),
            width: 0,
            height: 0,
            max_width: 0,
            max_height: 0,
            power_of_two: false,
            square: false,
            align_width: 0,
            allow_rotate: false,
            shape_padding: 0,
            border_padding: 0,
            deduplicate: false,
            alpha: Alpha::Keep,
            alpha_colorkey: Rgba([0, 0, 0, 0]),

            path: PathBuf::new(),
            sheet: FilenameSequence::default(),
            colorkey: Rgba([0, 0, 0, 0]),
            tags: HashMap::new(),

            grid: Size::default(),
            grid_offset: Size::default(),
            grid_spacing: Size::default(),
            span: Size::new(1, 1),

            sprite: String::new(),
            rect: Rect::default(),
            pivot: Pivot::default(),
            pivot_point: PointF::default(),
            trim: Trim::None,
            trim_margin: 0,
            trim_threshold: 1,
            extrude: Extrude::default(),
            common_divisor: Size::new(1, 1),
        }
    }
}
