//! The closed keyword vocabulary of the definition language

/// One recognized directive keyword.
///
/// `None` stands for unrecognized input and is rejected by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Definition {
    #[default]
    None,
    Texture,
    Width,
    Height,
    MaxWidth,
    MaxHeight,
    PowerOfTwo,
    Square,
    AlignWidth,
    AllowRotate,
    Padding,
    Deduplicate,
    Alpha,
    Begin,
    Path,
    Sheet,
    Colorkey,
    Tag,
    Grid,
    GridOffset,
    GridSpacing,
    Offset,
    Sprite,
    Skip,
    Span,
    Rect,
    Pivot,
    Trim,
    TrimThreshold,
    TrimMargin,
    Extrude,
    CommonDivisor,
}

impl Definition {
    /// Resolve a keyword, including the `in`/`out` aliases.
    pub fn from_keyword(keyword: &str) -> Definition {
        match keyword {
            "texture" => Definition::Texture,
            "width" => Definition::Width,
            "height" => Definition::Height,
            "max-width" => Definition::MaxWidth,
            "max-height" => Definition::MaxHeight,
            "power-of-two" => Definition::PowerOfTwo,
            "square" => Definition::Square,
            "align-width" => Definition::AlignWidth,
            "allow-rotate" => Definition::AllowRotate,
            "padding" => Definition::Padding,
            "deduplicate" => Definition::Deduplicate,
            "alpha" => Definition::Alpha,
            "begin" => Definition::Begin,
            "path" => Definition::Path,
            "sheet" => Definition::Sheet,
            "colorkey" => Definition::Colorkey,
            "tag" => Definition::Tag,
            "grid" => Definition::Grid,
            "grid-offset" => Definition::GridOffset,
            "grid-spacing" => Definition::GridSpacing,
            "offset" => Definition::Offset,
            "sprite" => Definition::Sprite,
            "skip" => Definition::Skip,
            "span" => Definition::Span,
            "rect" => Definition::Rect,
            "pivot" => Definition::Pivot,
            "trim" => Definition::Trim,
            "trim-threshold" => Definition::TrimThreshold,
            "trim-margin" => Definition::TrimMargin,
            "extrude" => Definition::Extrude,
            "common-divisor" => Definition::CommonDivisor,

            // aliases
            "in" => Definition::Sheet,
            "out" => Definition::Texture,

            _ => Definition::None,
        }
    }

    /// texture/sheet/sprite open a nested scope even without an
    /// indentation increase, so siblings can be listed at one level.
    pub fn has_implicit_scope(self) -> bool {
        matches!(
            self,
            Definition::Texture | Definition::Sheet | Definition::Sprite
        )
    }
}
