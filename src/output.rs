//! Compositing packed sprites into atlas pages and PNG output
//!
//! Every page starts as a fully transparent buffer. Sprites are copied from
//! their source sheets at the trimmed source rectangle, transposed 90
//! degrees clockwise when the packer chose rotation and masked by their
//! vertex outline when it is not a plain rectangle. Extrusion then
//! replicates edge pixels outward, and a single atlas-wide alpha
//! post-process finishes the page.

use std::collections::VecDeque;
use std::io;
use std::path::Path;

use image::{Rgba, RgbaImage};
use thiserror::Error;

use crate::geometry::{PointF, Rect};
use crate::models::{Sprite, Texture};
use crate::pack::Page;
use crate::state::{Alpha, WrapMode};

/// Error type for a failed per-sprite copy.
///
/// In strict mode it aborts the batch; in lenient mode the sprite is logged
/// and omitted while the rest of the page completes.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("copying sprite '{id}' failed: rectangle {rect:?} out of range")]
pub struct CompositeError {
    pub id: String,
    pub rect: Rect,
}

/// Error type for file output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Composite one page of a texture.
///
/// Returns `None` instead of a blank allocation when not a single sprite
/// was copied.
pub fn composite_page(
    page: &Page,
    sprites: &[Sprite],
    texture: &Texture,
    strict: bool,
) -> Result<Option<RgbaImage>, CompositeError> {
    if page.width <= 0 || page.height <= 0 {
        return Ok(None);
    }
    let mut target = RgbaImage::new(page.width as u32, page.height as u32);

    let mut copied_sprite = false;
    for &index in &page.sprite_indices {
        match copy_sprite(&mut target, &sprites[index]) {
            Ok(()) => copied_sprite = true,
            Err(e) if strict => return Err(e),
            Err(e) => eprintln!("warning: {e}, sprite omitted"),
        }
    }
    if !copied_sprite {
        return Ok(None);
    }

    process_alpha(&mut target, texture);
    Ok(Some(target))
}

fn image_bounds(image: &RgbaImage) -> Rect {
    Rect::new(0, 0, image.width() as i32, image.height() as i32)
}

/// True when the vertex outline is exactly the trimmed rectangle.
fn has_rect_vertices(sprite: &Sprite) -> bool {
    let (w, h) = (
        sprite.trimmed_rect.w as f32,
        sprite.trimmed_rect.h as f32,
    );
    let v = &sprite.vertices;
    v.len() == 4
        && v[0] == PointF::new(0.0, 0.0)
        && v[1] == PointF::new(w, 0.0)
        && v[2] == PointF::new(w, h)
        && v[3] == PointF::new(0.0, h)
}

fn copy_sprite(target: &mut RgbaImage, sprite: &Sprite) -> Result<(), CompositeError> {
    let src = sprite.trimmed_source_rect;
    if src.is_empty() {
        return Ok(());
    }

    let out_of_range = |rect: Rect| CompositeError {
        id: sprite.id.clone(),
        rect,
    };

    if src.intersect(&image_bounds(&sprite.source.image)) != src {
        return Err(out_of_range(src));
    }
    let footprint = if sprite.rotated {
        Rect::new(sprite.trimmed_rect.x, sprite.trimmed_rect.y, src.h, src.w)
    } else {
        Rect::new(sprite.trimmed_rect.x, sprite.trimmed_rect.y, src.w, src.h)
    };
    if footprint.intersect(&image_bounds(target)) != footprint {
        return Err(out_of_range(footprint));
    }

    let dx = sprite.trimmed_rect.x;
    let dy = sprite.trimmed_rect.y;
    let vertices = (!has_rect_vertices(sprite)).then_some(sprite.vertices.as_slice());
    if sprite.rotated {
        copy_rect_rotated_cw(&sprite.source.image, src, target, dx, dy, vertices);
    } else {
        copy_rect(&sprite.source.image, src, target, dx, dy, vertices);
    }

    if sprite.extrude.count > 0 {
        // only extrude where the trimmed rect still touches the untrimmed one
        let left = sprite.source_rect.x == src.x;
        let top = sprite.source_rect.y == src.y;
        let right = sprite.source_rect.x1() == src.x1();
        let bottom = sprite.source_rect.y1() == src.y1();
        if left || top || right || bottom {
            let mut rect = sprite.trimmed_rect;
            if sprite.rotated {
                std::mem::swap(&mut rect.w, &mut rect.h);
            }
            extrude_rect(
                target,
                rect,
                sprite.extrude.count,
                sprite.extrude.mode,
                left,
                top,
                right,
                bottom,
            );
        }
    }
    Ok(())
}

/// Copy `source_rect` to (`dx`, `dy`), optionally masked by a vertex
/// outline in sprite-local coordinates.
pub fn copy_rect(
    source: &RgbaImage,
    source_rect: Rect,
    target: &mut RgbaImage,
    dx: i32,
    dy: i32,
    vertices: Option<&[PointF]>,
) {
    for sy in 0..source_rect.h {
        for sx in 0..source_rect.w {
            if let Some(outline) = vertices {
                if !point_in_polygon(sx as f32 + 0.5, sy as f32 + 0.5, outline) {
                    continue;
                }
            }
            let pixel = *source
                .get_pixel((source_rect.x + sx) as u32, (source_rect.y + sy) as u32);
            target.put_pixel((dx + sx) as u32, (dy + sy) as u32, pixel);
        }
    }
}

/// Like [`copy_rect`] but transposing the pixels 90 degrees clockwise.
pub fn copy_rect_rotated_cw(
    source: &RgbaImage,
    source_rect: Rect,
    target: &mut RgbaImage,
    dx: i32,
    dy: i32,
    vertices: Option<&[PointF]>,
) {
    for sy in 0..source_rect.h {
        for sx in 0..source_rect.w {
            if let Some(outline) = vertices {
                if !point_in_polygon(sx as f32 + 0.5, sy as f32 + 0.5, outline) {
                    continue;
                }
            }
            let pixel = *source
                .get_pixel((source_rect.x + sx) as u32, (source_rect.y + sy) as u32);
            let tx = dx + (source_rect.h - 1 - sy);
            let ty = dy + sx;
            target.put_pixel(tx as u32, ty as u32, pixel);
        }
    }
}

/// Even-odd test against a closed polygon; the point is a pixel center.
fn point_in_polygon(x: f32, y: f32, vertices: &[PointF]) -> bool {
    let mut inside = false;
    let mut j = vertices.len().wrapping_sub(1);
    for i in 0..vertices.len() {
        let (a, b) = (vertices[i], vertices[j]);
        if (a.y > y) != (b.y > y) && x < (b.x - a.x) * (y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Replicate the edges of `rect` outward by `count` pixels on the flagged
/// sides, sampling with the given wrap mode.
pub fn extrude_rect(
    target: &mut RgbaImage,
    rect: Rect,
    count: i32,
    mode: WrapMode,
    left: bool,
    top: bool,
    right: bool,
    bottom: bool,
) {
    if rect.is_empty() {
        return;
    }
    let x_begin = rect.x - if left { count } else { 0 };
    let x_end = rect.x1() + if right { count } else { 0 };
    let y_begin = rect.y - if top { count } else { 0 };
    let y_end = rect.y1() + if bottom { count } else { 0 };
    let bounds = image_bounds(target);

    for y in y_begin..y_end {
        for x in x_begin..x_end {
            if rect.contains(x, y) || !bounds.contains(x, y) {
                continue;
            }
            let sx = wrap_coordinate(x, rect.x, rect.x1(), mode);
            let sy = wrap_coordinate(y, rect.y, rect.y1(), mode);
            let pixel = *target.get_pixel(sx as u32, sy as u32);
            target.put_pixel(x as u32, y as u32, pixel);
        }
    }
}

fn wrap_coordinate(v: i32, begin: i32, end: i32, mode: WrapMode) -> i32 {
    match mode {
        WrapMode::Clamp => v.clamp(begin, end - 1),
        WrapMode::Mirror => {
            if v < begin {
                (begin + (begin - v) - 1).min(end - 1)
            } else if v >= end {
                (end - 1 - (v - end)).max(begin)
            } else {
                v
            }
        }
    }
}

fn process_alpha(target: &mut RgbaImage, texture: &Texture) {
    match texture.alpha {
        Alpha::Keep => {}
        Alpha::Clear => clear_alpha(target),
        Alpha::Bleed => bleed_alpha(target),
        Alpha::Premultiply => premultiply_alpha(target),
        Alpha::Colorkey => make_opaque(target, texture.colorkey),
    }
}

/// Zero the alpha channel of every pixel.
pub fn clear_alpha(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        pixel[3] = 0;
    }
}

/// Flood the color of non-transparent pixels into transparent neighbours,
/// so texture filtering never samples undefined color next to a sprite.
/// Alpha values are left untouched.
pub fn bleed_alpha(image: &mut RgbaImage) {
    let w = image.width() as i32;
    let h = image.height() as i32;
    let index = |x: i32, y: i32| (y * w + x) as usize;

    let mut colored = vec![false; (w * h) as usize];
    let mut frontier = VecDeque::new();
    for y in 0..h {
        for x in 0..w {
            if image.get_pixel(x as u32, y as u32)[3] != 0 {
                colored[index(x, y)] = true;
                frontier.push_back((x, y));
            }
        }
    }
    if frontier.is_empty() {
        return;
    }

    while let Some((x, y)) = frontier.pop_front() {
        let color = *image.get_pixel(x as u32, y as u32);
        for (nx, ny) in [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)] {
            if nx < 0 || ny < 0 || nx >= w || ny >= h || colored[index(nx, ny)] {
                continue;
            }
            colored[index(nx, ny)] = true;
            image.put_pixel(nx as u32, ny as u32, Rgba([color[0], color[1], color[2], 0]));
            frontier.push_back((nx, ny));
        }
    }
}

/// Multiply the color channels by the alpha channel.
pub fn premultiply_alpha(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let a = pixel[3] as u32;
        for c in 0..3 {
            pixel[c] = ((pixel[c] as u32 * a + 127) / 255) as u8;
        }
    }
}

/// Force full opacity, filling untouched pixels with the colorkey color.
pub fn make_opaque(image: &mut RgbaImage, colorkey: Rgba<u8>) {
    for pixel in image.pixels_mut() {
        if pixel[3] == 0 {
            *pixel = colorkey;
        }
        pixel[3] = 255;
    }
}

/// Save an RGBA image to a PNG file, creating parent directories.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    image.save(path)?;
    Ok(())
}
