//! Data models shared between parsing, packing and compositing

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;

use crate::geometry::{PointF, Rect, Size};
use crate::sequence::FilenameSequence;
use crate::state::{Alpha, Extrude, Pivot, Trim};

/// A decoded source bitmap, cached by canonical path and shared read-only
/// between every sprite cut from it.
#[derive(Debug)]
pub struct Sheet {
    pub filename: PathBuf,
    pub image: RgbaImage,
}

impl Sheet {
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.image.width() as i32, self.image.height() as i32)
    }
}

/// An output atlas descriptor. Created lazily on first reference and cached
/// by canonical path, so every scope naming the same path contributes to the
/// same atlas. Attributes freeze at creation time.
#[derive(Debug, Clone)]
pub struct Texture {
    pub filename: FilenameSequence,
    pub width: i32,
    pub height: i32,
    pub max_width: i32,
    pub max_height: i32,
    pub power_of_two: bool,
    pub square: bool,
    pub align_width: i32,
    pub allow_rotate: bool,
    pub border_padding: i32,
    pub shape_padding: i32,
    pub deduplicate: bool,
    pub alpha: Alpha,
    pub colorkey: image::Rgba<u8>,
}

/// One extracted sprite.
///
/// The parser fills everything up to `tags`; the packing stage fills the
/// remaining placement fields before compositing.
#[derive(Debug, Clone)]
pub struct Sprite {
    pub id: String,
    pub texture_index: usize,
    pub source: Arc<Sheet>,
    pub source_rect: Rect,
    pub pivot: Pivot,
    pub pivot_point: PointF,
    pub trim: Trim,
    pub trim_margin: i32,
    pub trim_threshold: i32,
    pub extrude: Extrude,
    pub common_divisor: Size,
    pub tags: HashMap<String, String>,

    // filled by the packing stage
    pub trimmed_source_rect: Rect,
    pub trimmed_rect: Rect,
    pub rotated: bool,
    pub vertices: Vec<PointF>,
    pub page_index: usize,
}

impl Sprite {
    /// The vertex outline of a plain rectangular sprite.
    pub fn rect_vertices(size: Size) -> Vec<PointF> {
        let (w, h) = (size.x as f32, size.y as f32);
        vec![
            PointF::new(0.0, 0.0),
            PointF::new(w, 0.0),
            PointF::new(w, h),
            PointF::new(0.0, h),
        ]
    }
}

/// Everything a parse run produced, ready for packing and compositing.
#[derive(Debug, Default)]
pub struct Document {
    pub sprites: Vec<Sprite>,
    pub textures: Vec<Texture>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_bounds() {
        let sheet = Sheet {
            filename: PathBuf::from("a.png"),
            image: RgbaImage::new(32, 16),
        };
        assert_eq!(sheet.bounds(), Rect::new(0, 0, 32, 16));
    }

    #[test]
    fn test_rect_vertices() {
        let vertices = Sprite::rect_vertices(Size::new(4, 2));
        assert_eq!(vertices.len(), 4);
        assert_eq!(vertices[0], PointF::new(0.0, 0.0));
        assert_eq!(vertices[2], PointF::new(4.0, 2.0));
    }
}
