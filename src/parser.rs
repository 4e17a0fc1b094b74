//! The definition interpreter
//!
//! Processes the description line by line, maintaining a stack of
//! configuration records keyed by indentation depth. Opening a scope clones
//! the record on top of the stack; closing a texture, sheet or sprite scope
//! triggers its scope-close handler, which is where sprites actually come
//! into existence (see the `deduce` submodule).

mod deduce;

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use image::Rgba;
use thiserror::Error;

use crate::color::parse_color;
use crate::definitions::Definition;
use crate::geometry::{Point, Rect, Size};
use crate::models::{Document, Sheet, Sprite, Texture};
use crate::state::{Alpha, Pivot, PivotX, PivotY, State, Trim, WrapMode};
use crate::tokenizer::{join_expressions, parse_integer, split_arguments};

/// Name used for atlases no `texture` directive ever named.
const DEFAULT_TEXTURE_NAME: &str = "pixpack-{0-}.png";

const DEFAULT_INDENT_UNIT: &str = "  ";

/// Error type for parsing failures.
///
/// Every error is fatal and carries the 1-based source line it was raised
/// on; nothing of a failed parse is kept.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
}

/// Settings for one parse run.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Record the source annotated with every deduced directive.
    pub autocomplete: bool,
    /// Directory that sheet paths are resolved against.
    pub base_dir: PathBuf,
}

/// The interpreter. One instance per parse run; the texture and sheet
/// caches it owns guarantee at most one decoded copy per path.
#[derive(Debug)]
pub struct Parser {
    options: ParseOptions,
    line_number: usize,

    textures: Vec<Texture>,
    texture_indices: HashMap<PathBuf, usize>,
    sheets: HashMap<PathBuf, Arc<Sheet>>,
    sprites: Vec<Sprite>,

    sprites_in_current_sheet: usize,
    current_offset: Point,
    current_sequence_index: i32,

    autocomplete_output: String,
    indent_unit: Option<String>,
}

impl Parser {
    pub fn new(options: ParseOptions) -> Self {
        Parser {
            options,
            line_number: 0,
            textures: Vec::new(),
            texture_indices: HashMap::new(),
            sheets: HashMap::new(),
            sprites: Vec::new(),
            sprites_in_current_sheet: 0,
            current_offset: Point::default(),
            current_sequence_index: 0,
            autocomplete_output: String::new(),
            indent_unit: None,
        }
    }

    /// Interpret a whole description.
    pub fn parse(&mut self, input: &str) -> Result<(), ParseError> {
        self.autocomplete_output.clear();
        self.sprites_in_current_sheet = 0;
        self.current_offset = Point::default();
        self.current_sequence_index = 0;

        let mut scope_stack = vec![State {
            level: -1,
            texture: PathBuf::from(DEFAULT_TEXTURE_NAME),
            ..State::default()
        }];

        // Blank and comment lines are structurally inert but buffered, so
        // autocomplete output preserves the original spacing.
        let mut autocomplete_space = String::new();

        for (index, raw) in input.lines().enumerate() {
            self.line_number = index + 1;

            let line = raw.trim_start();
            if line.is_empty() || line.starts_with('#') {
                if self.options.autocomplete {
                    autocomplete_space.push_str(raw);
                    autocomplete_space.push('\n');
                }
                continue;
            }

            let mut arguments = split_arguments(line);
            join_expressions(line, &mut arguments);
            let definition = Definition::from_keyword(arguments[0]);
            if definition == Definition::None {
                return Err(self.error(format!("invalid definition '{}'", arguments[0])));
            }

            let level = (raw.len() - line.len()) as i32;
            self.pop_scope_stack(&mut scope_stack, level)?;

            let top = scope_stack.len() - 1;
            if level > scope_stack[top].level || definition.has_implicit_scope() {
                let child = scope_stack[top].clone();
                scope_stack.push(child);
            }

            let top = scope_stack.len() - 1;
            scope_stack[top].definition = definition;
            scope_stack[top].level = level;
            scope_stack[top].indent = raw[..raw.len() - line.len()].to_string();
            if self.indent_unit.is_none() && !scope_stack[top].indent.is_empty() {
                self.indent_unit = Some(scope_stack[top].indent.clone());
            }

            self.apply_definition(&mut scope_stack[top], definition, &arguments[1..])?;

            if self.options.autocomplete {
                self.autocomplete_output.push_str(&autocomplete_space);
                autocomplete_space.clear();
                self.autocomplete_output.push_str(raw);
                self.autocomplete_output.push('\n');
            }
        }

        if self.options.autocomplete {
            self.autocomplete_output.push_str(&autocomplete_space);
        }
        self.pop_scope_stack(&mut scope_stack, -1)?;
        Ok(())
    }

    /// The source annotated with deduced directives, valid after a parse
    /// run with `autocomplete` enabled.
    pub fn autocomplete_output(&self) -> &str {
        &self.autocomplete_output
    }

    pub fn sprites(&self) -> &[Sprite] {
        &self.sprites
    }

    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }

    pub fn into_document(self) -> Document {
        Document {
            sprites: self.sprites,
            textures: self.textures,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.line_number,
        }
    }

    fn check(&self, condition: bool, message: &str) -> Result<(), ParseError> {
        if condition {
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn indent_unit(&self) -> &str {
        self.indent_unit.as_deref().unwrap_or(DEFAULT_INDENT_UNIT)
    }

    /// Close and discard scopes until the top of the stack is shallower
    /// than `level`.
    ///
    /// Implicit scopes (texture/sheet/sprite) whose level the new line
    /// reaches run their close handler against the record on top of the
    /// stack, which carries the innermost accumulated configuration. When a
    /// discarded scope is a texture scope, its texture path moves to the
    /// immediate parent so later siblings keep targeting the same atlas.
    fn pop_scope_stack(
        &mut self,
        scope_stack: &mut Vec<State>,
        level: i32,
    ) -> Result<(), ParseError> {
        let mut i = scope_stack.len() - 1;
        loop {
            let definition = scope_stack[i].definition;
            let scope_level = scope_stack[i].level;

            if definition.has_implicit_scope() && level <= scope_level {
                let top = scope_stack.len() - 1;
                scope_stack[top].definition = definition;

                // Deduced directives belong one level inside the scope.
                if i == top {
                    let unit = self.indent_unit().to_string();
                    scope_stack[top].indent.push_str(&unit);
                }

                self.scope_ends(&mut scope_stack[top])?;
            } else if level >= scope_level {
                if i + 1 < scope_stack.len()
                    && scope_stack[i + 1].definition == Definition::Texture
                {
                    scope_stack[i].texture = scope_stack[i + 1].texture.clone();
                }
                scope_stack.truncate(i + 1);
                return Ok(());
            }

            debug_assert!(i > 0, "the sentinel scope terminates the pop phase");
            i -= 1;
        }
    }

    fn apply_definition(
        &mut self,
        state: &mut State,
        definition: Definition,
        arguments: &[&str],
    ) -> Result<(), ParseError> {
        let mut args = Args {
            arguments,
            index: 0,
            line: self.line_number,
        };

        match definition {
            // just for opening scopes, useful for additive definitions
            Definition::Begin => {}

            Definition::Texture => state.texture = args.path()?,
            Definition::Width => state.width = args.uint()?,
            Definition::Height => state.height = args.uint()?,
            Definition::MaxWidth => state.max_width = args.uint()?,
            Definition::MaxHeight => state.max_height = args.uint()?,
            Definition::PowerOfTwo => state.power_of_two = args.boolean(true)?,
            Definition::Square => state.square = args.boolean(true)?,
            Definition::AlignWidth => state.align_width = args.uint()?,
            Definition::AllowRotate => state.allow_rotate = args.boolean(true)?,

            Definition::Padding => {
                state.shape_padding = if args.left() { args.uint()? } else { 1 };
                state.border_padding = if args.left() {
                    args.uint()?
                } else {
                    state.shape_padding
                };
            }

            Definition::Deduplicate => state.deduplicate = args.boolean(true)?,

            Definition::Alpha => {
                let word = args.string()?;
                state.alpha = match word {
                    "keep" => Alpha::Keep,
                    "clear" => Alpha::Clear,
                    "bleed" => Alpha::Bleed,
                    "premultiply" => Alpha::Premultiply,
                    "colorkey" => Alpha::Colorkey,
                    _ => return Err(args.error(format!("invalid alpha value '{word}'"))),
                };
                if state.alpha == Alpha::Colorkey {
                    state.alpha_colorkey = args.color()?;
                }
            }

            Definition::Path => state.path = args.path()?,

            Definition::Sheet => {
                state.sheet =
                    crate::sequence::FilenameSequence::new(args.path()?.to_string_lossy());
                self.current_offset = Point::default();
                self.current_sequence_index = 0;
            }

            Definition::Colorkey => state.colorkey = args.color()?,

            Definition::Tag => {
                let key = args.string()?.to_string();
                let value = if args.left() { args.string()? } else { "" };
                state.tags.insert(key, value.to_string());
            }

            Definition::Grid => state.grid = args.size(true)?,
            Definition::GridOffset => state.grid_offset = args.size(true)?,
            Definition::GridSpacing => state.grid_spacing = args.size(true)?,

            Definition::Offset => {
                self.check(!state.grid.is_empty(), "offset is only valid in grid")?;
                self.current_offset.x = (args.float()? * state.grid.x as f32) as i32;
                self.current_offset.y = (args.float()? * state.grid.y as f32) as i32;
            }

            Definition::Skip => {
                self.check(!state.grid.is_empty(), "skip is only valid in grid")?;
                let cells = if args.left() { args.uint()? } else { 1 };
                self.current_offset.x += cells * state.grid.x;
            }

            Definition::Span => {
                state.span = args.size(false)?;
                if state.span.x <= 0 || state.span.y <= 0 {
                    return Err(args.error("invalid span"));
                }
            }

            Definition::Sprite => {
                if args.left() {
                    state.sprite = args.string()?.to_string();
                }
            }

            Definition::Rect => state.rect = args.rect()?,

            Definition::Pivot => {
                if args.is_number_following() {
                    state.pivot = Pivot {
                        x: PivotX::Custom,
                        y: PivotY::Custom,
                    };
                    state.pivot_point.x = args.float()?;
                    state.pivot_point.y = args.float()?;
                } else {
                    let mut parsed = 0;
                    while parsed < 2 && (parsed == 0 || args.left()) {
                        let word = args.string()?;
                        match word {
                            "left" => state.pivot.x = PivotX::Left,
                            "center" => state.pivot.x = PivotX::Center,
                            "right" => state.pivot.x = PivotX::Right,
                            "top" => state.pivot.y = PivotY::Top,
                            "middle" => state.pivot.y = PivotY::Middle,
                            "bottom" => state.pivot.y = PivotY::Bottom,
                            _ => {
                                return Err(args.error(format!("invalid pivot value '{word}'")))
                            }
                        }
                        parsed += 1;
                    }
                }
            }

            Definition::Trim => {
                if !args.left() {
                    state.trim = Trim::Trim;
                } else {
                    let word = args.string()?;
                    state.trim = match word {
                        "none" => Trim::None,
                        "trim" => Trim::Trim,
                        "crop" => Trim::Crop,
                        _ => return Err(args.error(format!("invalid trim value '{word}'"))),
                    };
                }
            }

            Definition::TrimMargin => state.trim_margin = args.uint()?,

            Definition::TrimThreshold => {
                state.trim_threshold = args.uint()?;
                if state.trim_threshold < 1 || state.trim_threshold > 255 {
                    return Err(args.error("invalid threshold"));
                }
            }

            Definition::Extrude => {
                state.extrude.count = if args.left() { args.uint()? } else { 1 };
                if args.left() {
                    let word = args.string()?;
                    state.extrude.mode = match word {
                        "clamp" => WrapMode::Clamp,
                        "mirror" => WrapMode::Mirror,
                        _ => return Err(args.error(format!("invalid extrude mode '{word}'"))),
                    };
                }
            }

            Definition::CommonDivisor => {
                state.common_divisor = args.size(true)?;
                if state.common_divisor.x < 1 || state.common_divisor.y < 1 {
                    return Err(args.error("invalid divisor"));
                }
            }

            Definition::None => {}
        }

        args.finish()
    }
}

/// Cursor over a directive's argument list, enforcing its grammar.
struct Args<'a> {
    arguments: &'a [&'a str],
    index: usize,
    line: usize,
}

impl<'a> Args<'a> {
    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.line,
        }
    }

    fn left(&self) -> bool {
        self.index < self.arguments.len()
    }

    fn string(&mut self) -> Result<&'a str, ParseError> {
        if !self.left() {
            return Err(self.error("invalid argument count"));
        }
        let argument = self.arguments[self.index];
        self.index += 1;
        Ok(argument)
    }

    fn path(&mut self) -> Result<PathBuf, ParseError> {
        Ok(PathBuf::from(self.string()?))
    }

    fn is_number_following(&self) -> bool {
        self.left()
            && self.arguments[self.index]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
    }

    fn uint(&mut self) -> Result<i32, ParseError> {
        let argument = self.string()?;
        match parse_integer(argument) {
            Some(value) if value >= 0 => Ok(value),
            _ => Err(self.error("invalid number")),
        }
    }

    fn boolean(&mut self, default_to_true: bool) -> Result<bool, ParseError> {
        if default_to_true && !self.left() {
            return Ok(true);
        }
        let argument = self.string()?;
        match argument {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(self.error(format!("invalid boolean value '{argument}'"))),
        }
    }

    fn float(&mut self) -> Result<f32, ParseError> {
        let argument = self.string()?;
        argument
            .trim()
            .parse::<f32>()
            .map_err(|_| self.error("invalid number"))
    }

    fn size(&mut self, default_to_square: bool) -> Result<Size, ParseError> {
        let x = self.uint()?;
        let y = if self.left() || !default_to_square {
            self.uint()?
        } else {
            x
        };
        Ok(Size::new(x, y))
    }

    fn rect(&mut self) -> Result<Rect, ParseError> {
        Ok(Rect::new(
            self.uint()?,
            self.uint()?,
            self.uint()?,
            self.uint()?,
        ))
    }

    fn color(&mut self) -> Result<Rgba<u8>, ParseError> {
        let argument = self.string()?;
        parse_color(argument).map_err(|e| self.error(e.to_string()))
    }

    fn finish(&self) -> Result<(), ParseError> {
        if self.left() {
            return Err(self.error("invalid argument count"));
        }
        Ok(())
    }
}

/// Lexically normalize a path so equivalent spellings share one cache slot.
/// Purely textual; never touches the filesystem, as output textures may not
/// exist yet.
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(Component::ParentDir);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Parser, ParseError> {
        let mut parser = Parser::new(ParseOptions::default());
        parser.parse(input)?;
        Ok(parser)
    }

    #[test]
    fn test_unknown_keyword_reports_line_number() {
        let err = parse("texture \"a.png\"\n\n# comment\n\nfoo 1 2\n").unwrap_err();
        assert!(err.to_string().contains("line 5"), "got: {err}");
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn test_texture_attributes_from_scope() {
        let parser = parse(concat!(
            "texture \"out.png\"\n",
            "  width 128\n",
            "  max-height 256\n",
            "  power-of-two\n",
            "  allow-rotate true\n",
            "  deduplicate false\n",
        ))
        .unwrap();

        let textures = parser.textures();
        assert_eq!(textures.len(), 1);
        let texture = &textures[0];
        assert_eq!(texture.filename.nth_filename(0), "out.png");
        assert_eq!(texture.width, 128);
        assert_eq!(texture.max_height, 256);
        assert!(texture.power_of_two);
        assert!(texture.allow_rotate);
        assert!(!texture.deduplicate);
    }

    #[test]
    fn test_padding_defaults_border_to_shape() {
        let parser = parse("texture \"out.png\"\n  padding 2\n").unwrap();
        let texture = &parser.textures()[0];
        assert_eq!(texture.shape_padding, 2);
        assert_eq!(texture.border_padding, 2);

        let parser = parse("texture \"out.png\"\n  padding\n").unwrap();
        let texture = &parser.textures()[0];
        assert_eq!(texture.shape_padding, 1);
        assert_eq!(texture.border_padding, 1);

        let parser = parse("texture \"out.png\"\n  padding 2 5\n").unwrap();
        let texture = &parser.textures()[0];
        assert_eq!(texture.shape_padding, 2);
        assert_eq!(texture.border_padding, 5);
    }

    #[test]
    fn test_alpha_colorkey_stores_color() {
        let parser = parse("texture \"out.png\"\n  alpha colorkey #FF00FFFF\n").unwrap();
        let texture = &parser.textures()[0];
        assert_eq!(texture.alpha, Alpha::Colorkey);
        assert_eq!(texture.colorkey, Rgba([255, 0, 255, 255]));
    }

    #[test]
    fn test_alpha_rejects_unknown_mode() {
        let err = parse("alpha shiny\n").unwrap_err();
        assert!(err.message.contains("invalid alpha value 'shiny'"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_invalid_argument_count() {
        assert!(parse("width\n").unwrap_err().message.contains("invalid argument count"));
        assert!(parse("width 1 2\n").unwrap_err().message.contains("invalid argument count"));
    }

    #[test]
    fn test_offset_and_skip_require_grid() {
        assert!(parse("offset 1 1\n")
            .unwrap_err()
            .message
            .contains("offset is only valid in grid"));
        assert!(parse("skip\n")
            .unwrap_err()
            .message
            .contains("skip is only valid in grid"));
    }

    #[test]
    fn test_span_rejects_zero() {
        assert!(parse("span 0 2\n").unwrap_err().message.contains("invalid span"));
        assert!(parse("grid 8\nspan 2 2\n").is_ok());
    }

    #[test]
    fn test_trim_threshold_range() {
        assert!(parse("trim-threshold 0\n").unwrap_err().message.contains("invalid threshold"));
        assert!(parse("trim-threshold 256\n").unwrap_err().message.contains("invalid threshold"));
        assert!(parse("trim-threshold 255\n").is_ok());
    }

    #[test]
    fn test_invalid_boolean() {
        let err = parse("square yes\n").unwrap_err();
        assert!(err.message.contains("invalid boolean value 'yes'"));
    }

    #[test]
    fn test_color_requires_html_notation() {
        let err = parse("colorkey FF00FF\n").unwrap_err();
        assert!(err.message.contains("color in HTML notation expected"));
    }

    #[test]
    fn test_expression_arguments_evaluate() {
        let parser = parse("texture \"out.png\"\n  width 100 + 28\n").unwrap();
        assert_eq!(parser.textures()[0].width, 128);
    }

    #[test]
    fn test_sprite_without_sheet_is_an_error() {
        let err = parse("sprite hero\n").unwrap_err();
        assert!(err.message.contains("sprite not on sheet"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("a/./b/../c.png")),
            PathBuf::from("a/c.png")
        );
        assert_eq!(normalize_path(Path::new("./x.png")), PathBuf::from("x.png"));
    }
}
