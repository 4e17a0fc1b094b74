//! Sprite trimming and placement onto texture pages
//!
//! A deliberately simple shelf packer: sprites are sorted tallest first and
//! placed into horizontal shelves, overflowing onto further pages of the
//! texture's filename sequence when a page fills up. Before placement each
//! sprite is trimmed to its used bounds, optionally rotated, rounded up to
//! the common divisor and deduplicated against identical pixel content.

use std::collections::HashMap;

use thiserror::Error;

use crate::analysis::used_bounds;
use crate::geometry::{ceil_to, PointF, Rect, Size};
use crate::models::{Sprite, Texture};
use crate::state::{PivotX, PivotY, Trim};

/// Page cap applied when neither width nor max-width constrains a texture.
const DEFAULT_MAX_SIZE: i32 = 4096;

/// Error type for packing failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PackError {
    /// More pages were needed than the texture's filename sequence provides
    #[error("sprites of texture '{0}' exceed its page count")]
    PageCountExceeded(String),
    /// A single sprite is larger than the page limits
    #[error("sprite '{id}' does not fit into texture '{texture}'")]
    SpriteTooLarge { id: String, texture: String },
}

/// One output page of a texture, with final dimensions and the sprites
/// placed on it.
#[derive(Debug, Clone)]
pub struct Page {
    pub texture_index: usize,
    pub filename: String,
    pub width: i32,
    pub height: i32,
    pub sprite_indices: Vec<usize>,
}

/// A shelf in the shelf packing algorithm
#[derive(Debug)]
struct Shelf {
    y: i32,
    height: i32,
    width_used: i32,
}

/// Trim every sprite and place it onto a page of its texture.
///
/// Fills the placement fields of each sprite (`trimmed_source_rect`,
/// `trimmed_rect`, `rotated`, `vertices`, `page_index`) and returns the
/// pages ready for compositing. Textures nothing was assigned to produce no
/// pages.
pub fn pack_sprites(
    sprites: &mut [Sprite],
    textures: &[Texture],
) -> Result<Vec<Page>, PackError> {
    for sprite in sprites.iter_mut() {
        trim_sprite(sprite);
        resolve_pivot(sprite);
    }

    let mut pages = Vec::new();
    for (texture_index, texture) in textures.iter().enumerate() {
        let indices: Vec<usize> = sprites
            .iter()
            .enumerate()
            .filter(|(_, sprite)| sprite.texture_index == texture_index)
            .map(|(index, _)| index)
            .collect();
        pages.extend(pack_texture(texture_index, texture, &indices, sprites)?);
    }
    Ok(pages)
}

/// Compute the trimmed source rectangle from the trim mode, threshold and
/// margin. `crop` also replaces the source rectangle, so the sprite forgets
/// its transparent border entirely.
fn trim_sprite(sprite: &mut Sprite) {
    if sprite.trim == Trim::None {
        sprite.trimmed_source_rect = sprite.source_rect;
        return;
    }

    let threshold = sprite.trim_threshold.clamp(1, 255) as u8;
    let bounds = used_bounds(&sprite.source.image, sprite.source_rect, threshold);
    sprite.trimmed_source_rect = if bounds.is_empty() {
        Rect::new(sprite.source_rect.x, sprite.source_rect.y, 0, 0)
    } else if sprite.trim_margin > 0 {
        bounds
            .expand(sprite.trim_margin)
            .intersect(&sprite.source_rect)
    } else {
        bounds
    };

    if sprite.trim == Trim::Crop {
        sprite.source_rect = sprite.trimmed_source_rect;
    }
}

/// Resolve the pivot to a point relative to the sprite's source rectangle.
fn resolve_pivot(sprite: &mut Sprite) {
    let w = sprite.source_rect.w as f32;
    let h = sprite.source_rect.h as f32;
    let x = match sprite.pivot.x {
        PivotX::Left => 0.0,
        PivotX::Center => w / 2.0,
        PivotX::Right => w,
        PivotX::Custom => sprite.pivot_point.x,
    };
    let y = match sprite.pivot.y {
        PivotY::Top => 0.0,
        PivotY::Middle => h / 2.0,
        PivotY::Bottom => h,
        PivotY::Custom => sprite.pivot_point.y,
    };
    sprite.pivot_point = PointF::new(x, y);
}

/// The on-page footprint: trimmed size, rotated when chosen, rounded up to
/// the common divisor.
fn placed_size(sprite: &Sprite) -> Size {
    let mut w = sprite.trimmed_source_rect.w;
    let mut h = sprite.trimmed_source_rect.h;
    if sprite.rotated {
        std::mem::swap(&mut w, &mut h);
    }
    Size::new(
        ceil_to(w, sprite.common_divisor.x.max(1)),
        ceil_to(h, sprite.common_divisor.y.max(1)),
    )
}

/// Identity of a sprite's pixel content, used for deduplication.
fn pixel_key(sprite: &Sprite) -> Vec<u8> {
    let rect = sprite.trimmed_source_rect;
    let mut key = Vec::with_capacity((rect.w * rect.h) as usize * 4 + 8);
    key.extend_from_slice(&rect.w.to_le_bytes());
    key.extend_from_slice(&rect.h.to_le_bytes());
    for y in rect.y..rect.y1() {
        for x in rect.x..rect.x1() {
            key.extend_from_slice(&sprite.source.image.get_pixel(x as u32, y as u32).0);
        }
    }
    key
}

fn pack_texture(
    texture_index: usize,
    texture: &Texture,
    indices: &[usize],
    sprites: &mut [Sprite],
) -> Result<Vec<Page>, PackError> {
    if indices.is_empty() {
        return Ok(Vec::new());
    }

    let border = texture.border_padding;
    let spacing = texture.shape_padding;
    let max_width = if texture.width > 0 {
        texture.width
    } else if texture.max_width > 0 {
        texture.max_width
    } else {
        DEFAULT_MAX_SIZE
    };
    let max_height = if texture.height > 0 {
        texture.height
    } else if texture.max_height > 0 {
        texture.max_height
    } else {
        DEFAULT_MAX_SIZE
    };
    let usable_width = max_width - 2 * border;
    let usable_height = max_height - 2 * border;

    for &index in indices {
        let sprite = &mut sprites[index];
        sprite.rotated = texture.allow_rotate
            && sprite.trimmed_source_rect.h > sprite.trimmed_source_rect.w;
        sprite.vertices = Sprite::rect_vertices(Size::new(
            sprite.trimmed_source_rect.w,
            sprite.trimmed_source_rect.h,
        ));
    }

    // Tallest first gives the shelves their classic staircase fill.
    let mut order = indices.to_vec();
    order.sort_by_key(|&index| std::cmp::Reverse(placed_size(&sprites[index]).y));

    let mut page_shelves: Vec<Vec<Shelf>> = Vec::new();
    let mut page_sprites: Vec<Vec<usize>> = Vec::new();
    let mut seen: HashMap<Vec<u8>, (usize, Rect, bool)> = HashMap::new();

    for &index in &order {
        if sprites[index].trimmed_source_rect.is_empty() {
            continue;
        }

        if texture.deduplicate {
            let key = pixel_key(&sprites[index]);
            if let Some(&(page, rect, rotated)) = seen.get(&key) {
                sprites[index].page_index = page;
                sprites[index].trimmed_rect = rect;
                sprites[index].rotated = rotated;
                page_sprites[page].push(index);
                continue;
            }
        }

        let size = placed_size(&sprites[index]);
        let padded_w = size.x + spacing;
        let padded_h = size.y + spacing;

        let mut placement = None;
        for (page, shelves) in page_shelves.iter_mut().enumerate() {
            if let Some(position) =
                try_place_in_shelves(shelves, padded_w, padded_h, usable_width, usable_height)
            {
                placement = Some((page, position));
                break;
            }
        }
        if placement.is_none() {
            let mut shelves = Vec::new();
            if let Some(position) =
                try_place_in_shelves(&mut shelves, padded_w, padded_h, usable_width, usable_height)
            {
                page_shelves.push(shelves);
                page_sprites.push(Vec::new());
                placement = Some((page_shelves.len() - 1, position));
            }
        }

        let Some((page, (x, y))) = placement else {
            return Err(PackError::SpriteTooLarge {
                id: sprites[index].id.clone(),
                texture: texture.filename.nth_filename(0),
            });
        };

        let sprite = &mut sprites[index];
        sprite.page_index = page;
        sprite.trimmed_rect = Rect::new(
            x + border,
            y + border,
            sprite.trimmed_source_rect.w,
            sprite.trimmed_source_rect.h,
        );
        page_sprites[page].push(index);

        if texture.deduplicate {
            seen.insert(
                pixel_key(&sprites[index]),
                (page, sprites[index].trimmed_rect, sprites[index].rotated),
            );
        }
    }

    if page_shelves.len() as i64 > texture.filename.count() as i64 {
        return Err(PackError::PageCountExceeded(
            texture.filename.nth_filename(0),
        ));
    }

    let mut pages = Vec::new();
    for (page, shelves) in page_shelves.iter().enumerate() {
        let (content_w, content_h) = content_size(shelves, spacing);

        let mut width = if texture.width > 0 {
            texture.width
        } else {
            content_w + 2 * border
        };
        let mut height = if texture.height > 0 {
            texture.height
        } else {
            content_h + 2 * border
        };
        if texture.align_width > 0 {
            width = ceil_to(width, texture.align_width);
        }
        if texture.power_of_two {
            width = next_power_of_two(width);
            height = next_power_of_two(height);
        }
        if texture.square {
            let side = width.max(height);
            width = side;
            height = side;
        }

        pages.push(Page {
            texture_index,
            filename: texture.filename.nth_filename(page as i32),
            width,
            height,
            sprite_indices: page_sprites[page].clone(),
        });
    }
    Ok(pages)
}

/// Try to place a footprint in the given shelves
fn try_place_in_shelves(
    shelves: &mut Vec<Shelf>,
    padded_w: i32,
    padded_h: i32,
    max_width: i32,
    max_height: i32,
) -> Option<(i32, i32)> {
    for shelf in shelves.iter_mut() {
        if padded_h <= shelf.height && shelf.width_used + padded_w <= max_width {
            let x = shelf.width_used;
            let y = shelf.y;
            shelf.width_used += padded_w;
            return Some((x, y));
        }
    }

    let new_shelf_y = shelves.last().map_or(0, |shelf| shelf.y + shelf.height);
    if new_shelf_y + padded_h <= max_height && padded_w <= max_width {
        shelves.push(Shelf {
            y: new_shelf_y,
            height: padded_h,
            width_used: padded_w,
        });
        return Some((0, new_shelf_y));
    }
    None
}

/// Content extent of a page; the trailing shape padding does not count.
fn content_size(shelves: &[Shelf], spacing: i32) -> (i32, i32) {
    let max_width = shelves.iter().map(|shelf| shelf.width_used).max().unwrap_or(0);
    let total_height = shelves.last().map_or(0, |shelf| shelf.y + shelf.height);

    let width = if spacing > 0 && max_width > spacing {
        max_width - spacing
    } else {
        max_width.max(1)
    };
    let height = if spacing > 0 && total_height > spacing {
        total_height - spacing
    } else {
        total_height.max(1)
    };
    (width, height)
}

/// Get the next power of two >= n
fn next_power_of_two(n: i32) -> i32 {
    let mut p = 1;
    while p < n {
        p *= 2;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sheet;
    use crate::sequence::FilenameSequence;
    use crate::state::{Alpha, Extrude, Pivot, PivotX, PivotY};
    use image::{Rgba, RgbaImage};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    const OPAQUE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn make_sheet(width: u32, height: u32, opaque: &[Rect]) -> Arc<Sheet> {
        let mut image = RgbaImage::new(width, height);
        for rect in opaque {
            for y in rect.y..rect.y1() {
                for x in rect.x..rect.x1() {
                    image.put_pixel(x as u32, y as u32, OPAQUE);
                }
            }
        }
        Arc::new(Sheet {
            filename: PathBuf::from("test.png"),
            image,
        })
    }

    fn make_sprite(id: &str, sheet: &Arc<Sheet>, source_rect: Rect) -> Sprite {
        Sprite {
            id: id.to_string(),
            texture_index: 0,
            source: sheet.clone(),
            source_rect,
            pivot: Pivot::default(),
            pivot_point: PointF::default(),
            trim: Trim::None,
            trim_margin: 0,
            trim_threshold: 1,
            extrude: Extrude::default(),
            common_divisor: Size::new(1, 1),
            tags: HashMap::new(),
            trimmed_source_rect: Rect::default(),
            trimmed_rect: Rect::default(),
            rotated: false,
            vertices: Vec::new(),
            page_index: 0,
        }
    }

    fn make_texture(name: &str) -> Texture {
        Texture {
            filename: FilenameSequence::new(name),
            width: 0,
            height: 0,
            max_width: 0,
            max_height: 0,
            power_of_two: false,
            square: false,
            align_width: 0,
            allow_rotate: false,
            border_padding: 0,
            shape_padding: 0,
            deduplicate: false,
            alpha: Alpha::Keep,
            colorkey: Rgba([0, 0, 0, 0]),
        }
    }

    fn overlap(a: Rect, b: Rect) -> bool {
        !a.intersect(&b).is_empty()
    }

    #[test]
    fn test_trim_none_keeps_source_rect() {
        let sheet = make_sheet(8, 8, &[Rect::new(2, 2, 2, 2)]);
        let mut sprites = vec![make_sprite("a", &sheet, Rect::new(0, 0, 8, 8))];
        pack_sprites(&mut sprites, &[make_texture("t.png")]).unwrap();
        assert_eq!(sprites[0].trimmed_source_rect, Rect::new(0, 0, 8, 8));
    }

    #[test]
    fn test_trim_shrinks_to_used_bounds() {
        let sheet = make_sheet(8, 8, &[Rect::new(2, 3, 2, 2)]);
        let mut sprites = vec![make_sprite("a", &sheet, Rect::new(0, 0, 8, 8))];
        sprites[0].trim = Trim::Trim;
        pack_sprites(&mut sprites, &[make_texture("t.png")]).unwrap();
        assert_eq!(sprites[0].trimmed_source_rect, Rect::new(2, 3, 2, 2));
        // trim keeps the full source rect
        assert_eq!(sprites[0].source_rect, Rect::new(0, 0, 8, 8));
    }

    #[test]
    fn test_trim_margin_expands_within_source() {
        let sheet = make_sheet(8, 8, &[Rect::new(2, 2, 2, 2)]);
        let mut sprites = vec![make_sprite("a", &sheet, Rect::new(0, 0, 8, 8))];
        sprites[0].trim = Trim::Trim;
        sprites[0].trim_margin = 3;
        pack_sprites(&mut sprites, &[make_texture("t.png")]).unwrap();
        // margin of 3 around (2,2,2,2) clips at the sheet edges
        assert_eq!(sprites[0].trimmed_source_rect, Rect::new(0, 0, 7, 7));
    }

    #[test]
    fn test_crop_replaces_source_rect() {
        let sheet = make_sheet(8, 8, &[Rect::new(2, 3, 2, 2)]);
        let mut sprites = vec![make_sprite("a", &sheet, Rect::new(0, 0, 8, 8))];
        sprites[0].trim = Trim::Crop;
        pack_sprites(&mut sprites, &[make_texture("t.png")]).unwrap();
        assert_eq!(sprites[0].source_rect, Rect::new(2, 3, 2, 2));
    }

    #[test]
    fn test_pivot_resolution() {
        let sheet = make_sheet(8, 4, &[Rect::new(0, 0, 8, 4)]);
        let mut sprites = vec![
            make_sprite("center", &sheet, Rect::new(0, 0, 8, 4)),
            make_sprite("corner", &sheet, Rect::new(0, 0, 8, 4)),
            make_sprite("custom", &sheet, Rect::new(0, 0, 8, 4)),
        ];
        sprites[1].pivot = Pivot {
            x: PivotX::Right,
            y: PivotY::Bottom,
        };
        sprites[2].pivot = Pivot {
            x: PivotX::Custom,
            y: PivotY::Custom,
        };
        sprites[2].pivot_point = PointF::new(1.5, 2.5);

        pack_sprites(&mut sprites, &[make_texture("t.png")]).unwrap();
        assert_eq!(sprites[0].pivot_point, PointF::new(4.0, 2.0));
        assert_eq!(sprites[1].pivot_point, PointF::new(8.0, 4.0));
        assert_eq!(sprites[2].pivot_point, PointF::new(1.5, 2.5));
    }

    #[test]
    fn test_sprites_do_not_overlap() {
        let sheet = make_sheet(16, 16, &[Rect::new(0, 0, 16, 16)]);
        let mut sprites = vec![
            make_sprite("a", &sheet, Rect::new(0, 0, 8, 8)),
            make_sprite("b", &sheet, Rect::new(8, 0, 8, 8)),
            make_sprite("c", &sheet, Rect::new(0, 8, 8, 8)),
        ];
        let pages = pack_sprites(&mut sprites, &[make_texture("t.png")]).unwrap();
        assert_eq!(pages.len(), 1);

        for i in 0..sprites.len() {
            for j in (i + 1)..sprites.len() {
                assert!(
                    !overlap(sprites[i].trimmed_rect, sprites[j].trimmed_rect),
                    "sprites {i} and {j} overlap"
                );
            }
        }
    }

    #[test]
    fn test_power_of_two_dimensions() {
        let sheet = make_sheet(16, 16, &[Rect::new(0, 0, 16, 16)]);
        let mut sprites = vec![make_sprite("a", &sheet, Rect::new(0, 0, 10, 10))];
        let mut texture = make_texture("t.png");
        texture.power_of_two = true;
        let pages = pack_sprites(&mut sprites, &[texture]).unwrap();
        assert_eq!((pages[0].width, pages[0].height), (16, 16));
    }

    #[test]
    fn test_square_dimensions() {
        let sheet = make_sheet(16, 16, &[Rect::new(0, 0, 16, 16)]);
        let mut sprites = vec![make_sprite("a", &sheet, Rect::new(0, 0, 12, 6))];
        let mut texture = make_texture("t.png");
        texture.square = true;
        let pages = pack_sprites(&mut sprites, &[texture]).unwrap();
        assert_eq!(pages[0].width, pages[0].height);
    }

    #[test]
    fn test_fixed_width_is_kept() {
        let sheet = make_sheet(16, 16, &[Rect::new(0, 0, 16, 16)]);
        let mut sprites = vec![make_sprite("a", &sheet, Rect::new(0, 0, 8, 8))];
        let mut texture = make_texture("t.png");
        texture.width = 64;
        texture.height = 32;
        let pages = pack_sprites(&mut sprites, &[texture]).unwrap();
        assert_eq!((pages[0].width, pages[0].height), (64, 32));
    }

    #[test]
    fn test_overflow_onto_sequence_pages() {
        let sheet = make_sheet(16, 16, &[Rect::new(0, 0, 16, 16)]);
        let mut sprites = vec![
            make_sprite("a", &sheet, Rect::new(0, 0, 16, 16)),
            make_sprite("b", &sheet, Rect::new(0, 0, 16, 16)),
        ];
        let mut texture = make_texture("t-{0-}.png");
        texture.max_width = 16;
        texture.max_height = 16;
        let pages = pack_sprites(&mut sprites, &[texture]).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].filename, "t-0.png");
        assert_eq!(pages[1].filename, "t-1.png");
    }

    #[test]
    fn test_overflow_on_plain_filename_is_an_error() {
        let sheet = make_sheet(16, 16, &[Rect::new(0, 0, 16, 16)]);
        let mut sprites = vec![
            make_sprite("a", &sheet, Rect::new(0, 0, 16, 16)),
            make_sprite("b", &sheet, Rect::new(0, 0, 16, 16)),
        ];
        let mut texture = make_texture("t.png");
        texture.max_width = 16;
        texture.max_height = 16;
        let err = pack_sprites(&mut sprites, &[texture]).unwrap_err();
        assert_eq!(err, PackError::PageCountExceeded("t.png".to_string()));
    }

    #[test]
    fn test_sprite_larger_than_page_is_an_error() {
        let sheet = make_sheet(32, 32, &[Rect::new(0, 0, 32, 32)]);
        let mut sprites = vec![make_sprite("big", &sheet, Rect::new(0, 0, 32, 32))];
        let mut texture = make_texture("t-{0-}.png");
        texture.max_width = 16;
        texture.max_height = 16;
        let err = pack_sprites(&mut sprites, &[texture]).unwrap_err();
        assert!(matches!(err, PackError::SpriteTooLarge { .. }));
    }

    #[test]
    fn test_rotation_of_tall_sprites() {
        let sheet = make_sheet(8, 16, &[Rect::new(0, 0, 8, 16)]);
        let mut sprites = vec![make_sprite("tall", &sheet, Rect::new(0, 0, 8, 16))];
        let mut texture = make_texture("t.png");
        texture.allow_rotate = true;
        pack_sprites(&mut sprites, &[texture]).unwrap();
        assert!(sprites[0].rotated);
        // the placement rect keeps source orientation
        assert_eq!(sprites[0].trimmed_rect.w, 8);
        assert_eq!(sprites[0].trimmed_rect.h, 16);
    }

    #[test]
    fn test_deduplicate_shares_placement() {
        let sheet = make_sheet(16, 8, &[Rect::new(0, 0, 16, 8)]);
        let mut sprites = vec![
            make_sprite("a", &sheet, Rect::new(0, 0, 8, 8)),
            make_sprite("b", &sheet, Rect::new(8, 0, 8, 8)),
        ];
        let mut texture = make_texture("t.png");
        texture.deduplicate = true;
        pack_sprites(&mut sprites, &[texture]).unwrap();
        assert_eq!(sprites[0].trimmed_rect, sprites[1].trimmed_rect);
    }

    #[test]
    fn test_common_divisor_rounds_footprint() {
        let sheet = make_sheet(16, 16, &[Rect::new(0, 0, 16, 16)]);
        let mut sprites = vec![
            make_sprite("a", &sheet, Rect::new(0, 0, 5, 5)),
            make_sprite("b", &sheet, Rect::new(0, 0, 5, 5)),
        ];
        sprites[0].common_divisor = Size::new(8, 8);
        sprites[1].common_divisor = Size::new(8, 8);
        let pages = pack_sprites(&mut sprites, &[make_texture("t.png")]).unwrap();
        // two 5x5 sprites in 8x8 frames side by side
        assert_eq!(pages[0].width, 16);
        let xs: Vec<_> = sprites.iter().map(|s| s.trimmed_rect.x).collect();
        assert!(xs.contains(&0) && xs.contains(&8));
    }

    #[test]
    fn test_shape_padding_separates_sprites() {
        let sheet = make_sheet(16, 16, &[Rect::new(0, 0, 16, 16)]);
        let mut sprites = vec![
            make_sprite("a", &sheet, Rect::new(0, 0, 8, 8)),
            make_sprite("b", &sheet, Rect::new(8, 0, 8, 8)),
        ];
        let mut texture = make_texture("t.png");
        texture.shape_padding = 2;
        pack_sprites(&mut sprites, &[texture]).unwrap();
        let mut xs: Vec<_> = sprites.iter().map(|s| s.trimmed_rect.x).collect();
        xs.sort();
        assert_eq!(xs, vec![0, 10]);
    }

    #[test]
    fn test_border_padding_offsets_placement() {
        let sheet = make_sheet(8, 8, &[Rect::new(0, 0, 8, 8)]);
        let mut sprites = vec![make_sprite("a", &sheet, Rect::new(0, 0, 8, 8))];
        let mut texture = make_texture("t.png");
        texture.border_padding = 3;
        let pages = pack_sprites(&mut sprites, &[texture]).unwrap();
        assert_eq!(sprites[0].trimmed_rect, Rect::new(3, 3, 8, 8));
        assert_eq!((pages[0].width, pages[0].height), (14, 14));
    }

    #[test]
    fn test_texture_without_sprites_produces_no_pages() {
        let pages = pack_sprites(&mut [], &[make_texture("t.png")]).unwrap();
        assert!(pages.is_empty());
    }

    #[test]
    fn test_next_power_of_two() {
        assert_eq!(next_power_of_two(0), 1);
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(3), 4);
        assert_eq!(next_power_of_two(16), 16);
        assert_eq!(next_power_of_two(17), 32);
    }
}
