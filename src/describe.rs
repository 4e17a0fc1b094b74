//! JSON description of a finished run
//!
//! Lists every page with its final dimensions and every sprite placed on
//! it, so game code can look placements up by identifier.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use crate::geometry::Rect;
use crate::models::Sprite;
use crate::output::OutputError;
use crate::pack::Page;

#[derive(Debug, Serialize)]
pub struct Description {
    pub textures: Vec<TextureMeta>,
}

#[derive(Debug, Serialize)]
pub struct TextureMeta {
    pub filename: String,
    pub width: i32,
    pub height: i32,
    pub sprites: Vec<SpriteMeta>,
}

#[derive(Debug, Serialize)]
pub struct SpriteMeta {
    pub id: String,
    pub rect: Rect,
    pub rotated: bool,
    pub source: String,
    pub source_rect: Rect,
    pub pivot: [f32; 2],
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

/// Collect the metadata of every page.
pub fn build_description(pages: &[Page], sprites: &[Sprite]) -> Description {
    Description {
        textures: pages
            .iter()
            .map(|page| TextureMeta {
                filename: page.filename.clone(),
                width: page.width,
                height: page.height,
                sprites: page
                    .sprite_indices
                    .iter()
                    .map(|&index| {
                        let sprite = &sprites[index];
                        SpriteMeta {
                            id: sprite.id.clone(),
                            rect: sprite.trimmed_rect,
                            rotated: sprite.rotated,
                            source: sprite.source.filename.display().to_string(),
                            source_rect: sprite.source_rect,
                            pivot: [sprite.pivot_point.x, sprite.pivot_point.y],
                            tags: sprite.tags.clone(),
                        }
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// Write the description as pretty JSON, creating parent directories.
pub fn write_description(description: &Description, path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(description)?;
    std::fs::write(path, json)?;
    Ok(())
}
