//! Scope-close handlers: sprite finalization and deduction
//!
//! When a sheet scope closes without having declared a single sprite, the
//! sprites are deduced from the sheet itself. Exactly one strategy runs:
//! a filename sequence becomes one sprite per file, an active grid slices
//! the sheet into cells, and otherwise every connected island of
//! non-transparent pixels becomes a sprite. With autocomplete enabled every
//! deduced decision is also rendered back as definition text.

use std::path::PathBuf;
use std::sync::Arc;

use image::Rgba;

use crate::analysis::{
    find_islands, guess_colorkey, is_fully_transparent, is_opaque, replace_color, used_bounds,
};
use crate::definitions::Definition;
use crate::geometry::{ceil_to, floor_to, Rect, Size};
use crate::models::{Sheet, Sprite, Texture};
use crate::sequence::FilenameSequence;
use crate::state::State;

use super::{normalize_path, ParseError, Parser};

impl Parser {
    pub(super) fn scope_ends(&mut self, state: &mut State) -> Result<(), ParseError> {
        match state.definition {
            Definition::Texture => self.texture_ends(state),
            Definition::Sheet => self.sheet_ends(state),
            Definition::Sprite => self.sprite_ends(state),
            _ => Ok(()),
        }
    }

    fn texture_ends(&mut self, state: &mut State) -> Result<(), ParseError> {
        self.get_texture(state);
        Ok(())
    }

    fn sheet_ends(&mut self, state: &mut State) -> Result<(), ParseError> {
        if self.sprites_in_current_sheet == 0 {
            if state.sheet.is_sequence() {
                self.deduce_sequence_sprites(state)?;
            } else if !state.grid.is_empty() {
                self.deduce_grid_sprites(state)?;
            } else {
                self.deduce_unaligned_sprites(state)?;
            }
        }
        self.sprites_in_current_sheet = 0;
        Ok(())
    }

    fn sprite_ends(&mut self, state: &mut State) -> Result<(), ParseError> {
        self.check(!state.sheet.is_empty(), "sprite not on sheet")?;

        // without an explicit rect, an active grid places sprites
        // sequentially from the cursor
        if state.rect.is_empty() && !state.grid.is_empty() {
            state.rect = Rect::new(
                self.current_offset.x,
                self.current_offset.y,
                state.grid.x * state.span.x,
                state.grid.y * state.span.y,
            );
            self.current_offset.x += state.grid.x * state.span.x;
        }

        let id = if !state.sprite.is_empty() {
            state.sprite.clone()
        } else {
            format!("sprite_{}", self.sprites.len())
        };
        let texture_index = self.get_texture(state);
        let source = self.get_current_sheet(state)?;
        let source_rect = if !state.rect.is_empty() {
            state.rect
        } else {
            source.bounds()
        };

        self.sprites.push(Sprite {
            id,
            texture_index,
            source,
            source_rect,
            pivot: state.pivot,
            pivot_point: state.pivot_point,
            trim: state.trim,
            trim_margin: state.trim_margin,
            trim_threshold: state.trim_threshold,
            extrude: state.extrude,
            common_divisor: state.common_divisor,
            tags: state.tags.clone(),
            trimmed_source_rect: Rect::default(),
            trimmed_rect: Rect::default(),
            rotated: false,
            vertices: Vec::new(),
            page_index: 0,
        });

        if state.sheet.is_sequence() {
            self.current_sequence_index += 1;
        }
        self.sprites_in_current_sheet += 1;
        Ok(())
    }

    /// One sprite per file of the sequence. An unbounded sequence is fixed
    /// first by probing the filesystem for the terminating gap.
    fn deduce_sequence_sprites(&mut self, state: &mut State) -> Result<(), ParseError> {
        if state.sheet.is_infinite_sequence() {
            let mut index = 0;
            while self.sheet_location(state, index).exists() {
                index += 1;
            }
            state.sheet.set_count(index);
        }

        for index in 0..state.sheet.count() {
            let sheet = self.get_sheet(state, index)?;
            state.rect = sheet.bounds();

            if self.options.autocomplete {
                let line = format!("{}sprite\n", state.indent);
                self.autocomplete_output.push_str(&line);
            }
            self.sprite_ends(state)?;
        }
        Ok(())
    }

    /// Row-major grid cells covering the sheet's used bounds; fully
    /// transparent cells are skipped.
    fn deduce_grid_sprites(&mut self, state: &mut State) -> Result<(), ParseError> {
        let sheet = self.get_current_sheet(state)?;
        let bounds = used_bounds(&sheet.image, sheet.bounds(), 1);

        let stride = Size::new(
            state.grid.x + state.grid_spacing.x,
            state.grid.y + state.grid_spacing.y,
        );

        let x0 = floor_to(bounds.x, stride.x) / stride.x;
        let y0 = floor_to(bounds.y, stride.y) / stride.y;
        let x1 = ceil_to(bounds.x1(), stride.x).min(sheet.image.width() as i32) / stride.x;
        let y1 = ceil_to(bounds.y1(), stride.y).min(sheet.image.height() as i32) / stride.y;

        for y in y0..y1 {
            let mut output_offset = false;
            let mut skipped = 0;
            for x in x0..x1 {
                state.rect = Rect::new(
                    state.grid_offset.x + x * stride.x,
                    state.grid_offset.y + y * stride.y,
                    state.grid.x,
                    state.grid.y,
                );

                if is_fully_transparent(&sheet.image, state.rect) {
                    skipped += 1;
                    continue;
                }

                if self.options.autocomplete {
                    if !std::mem::replace(&mut output_offset, true) && (x0 != 0 || y != 0) {
                        let line = format!("{}offset {} {}\n", state.indent, x0, y);
                        self.autocomplete_output.push_str(&line);
                    }

                    if skipped > 0 {
                        let line = if skipped > 1 {
                            format!("{}skip {}\n", state.indent, skipped)
                        } else {
                            format!("{}skip\n", state.indent)
                        };
                        self.autocomplete_output.push_str(&line);
                        skipped = 0;
                    }

                    let line = format!("{}sprite\n", state.indent);
                    self.autocomplete_output.push_str(&line);
                }

                self.sprite_ends(state)?;
            }
        }
        Ok(())
    }

    /// One sprite per island of connected non-transparent pixels.
    fn deduce_unaligned_sprites(&mut self, state: &mut State) -> Result<(), ParseError> {
        let sheet = self.get_current_sheet(state)?;
        for rect in find_islands(&sheet.image, sheet.bounds()) {
            if self.options.autocomplete {
                let mut text = format!("{}sprite\n", state.indent);
                if rect != sheet.bounds() {
                    text.push_str(&format!(
                        "{}{}rect {} {} {} {}\n",
                        state.indent,
                        self.indent_unit(),
                        rect.x,
                        rect.y,
                        rect.w,
                        rect.h
                    ));
                }
                self.autocomplete_output.push_str(&text);
            }
            state.rect = rect;
            self.sprite_ends(state)?;
        }
        Ok(())
    }

    /// The texture for the scope's path, created on first reference.
    fn get_texture(&mut self, state: &State) -> usize {
        let key = normalize_path(&state.texture);
        if let Some(&index) = self.texture_indices.get(&key) {
            return index;
        }

        let index = self.textures.len();
        self.textures.push(Texture {
            filename: FilenameSequence::new(state.texture.to_string_lossy()),
            width: state.width,
            height: state.height,
            max_width: state.max_width,
            max_height: state.max_height,
            power_of_two: state.power_of_two,
            square: state.square,
            align_width: state.align_width,
            allow_rotate: state.allow_rotate,
            border_padding: state.border_padding,
            shape_padding: state.shape_padding,
            deduplicate: state.deduplicate,
            alpha: state.alpha,
            colorkey: state.alpha_colorkey,
        });
        self.texture_indices.insert(key, index);
        index
    }

    fn sheet_location(&self, state: &State, index: i32) -> PathBuf {
        self.options
            .base_dir
            .join(&state.path)
            .join(state.sheet.nth_filename(index))
    }

    /// The decoded sheet for the given sequence index, at most one decode
    /// per path. A sheet without any transparency gets a colorkey applied,
    /// explicit or guessed, to synthesize it.
    fn get_sheet(&mut self, state: &State, index: i32) -> Result<Arc<Sheet>, ParseError> {
        let location = self.sheet_location(state, index);
        let key = normalize_path(&location);
        if let Some(sheet) = self.sheets.get(&key) {
            return Ok(sheet.clone());
        }

        let mut image = image::open(&location)
            .map_err(|e| {
                self.error(format!("loading sheet '{}' failed: {e}", location.display()))
            })?
            .to_rgba8();

        let bounds = Rect::new(0, 0, image.width() as i32, image.height() as i32);
        if is_opaque(&image, bounds) {
            let colorkey = if state.colorkey[3] != 0 {
                state.colorkey
            } else {
                guess_colorkey(&image)
            };
            replace_color(&mut image, colorkey, Rgba([0, 0, 0, 0]));
        }

        let sheet = Arc::new(Sheet {
            filename: location,
            image,
        });
        self.sheets.insert(key, sheet.clone());
        Ok(sheet)
    }

    fn get_current_sheet(&mut self, state: &State) -> Result<Arc<Sheet>, ParseError> {
        self.get_sheet(state, self.current_sequence_index)
    }
}
