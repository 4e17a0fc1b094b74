//! Filename sequences
//!
//! A sheet or texture filename may contain an index placeholder:
//! `run-{0-3}.png` names four files, `run-{0-}.png` an unbounded series.
//! The placeholder's first index sets the zero padding, so `page-{000-}.png`
//! produces `page-000.png`, `page-001.png`, ...

/// A filename pattern with an optional index placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilenameSequence {
    filename: String,
    prefix: String,
    suffix: String,
    first: i32,
    pad_width: usize,
    count: Option<i32>,
    is_sequence: bool,
}

impl FilenameSequence {
    pub fn new(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let mut sequence = FilenameSequence {
            filename,
            ..FilenameSequence::default()
        };

        if let Some((open, close)) = find_placeholder(&sequence.filename) {
            let inner = &sequence.filename[open + 1..close];
            if let Some(parsed) = parse_placeholder(inner) {
                sequence.prefix = sequence.filename[..open].to_string();
                sequence.suffix = sequence.filename[close + 1..].to_string();
                sequence.first = parsed.first;
                sequence.pad_width = parsed.pad_width;
                sequence.count = parsed.count;
                sequence.is_sequence = true;
            }
        }
        sequence
    }

    pub fn is_empty(&self) -> bool {
        self.filename.is_empty()
    }

    pub fn is_sequence(&self) -> bool {
        self.is_sequence
    }

    /// A sequence whose count has not been bounded yet.
    pub fn is_infinite_sequence(&self) -> bool {
        self.is_sequence && self.count.is_none()
    }

    /// Number of filenames in the series; a plain filename counts as one.
    pub fn count(&self) -> i32 {
        if !self.is_sequence {
            return 1;
        }
        self.count.unwrap_or(i32::MAX)
    }

    /// Bound an unbounded sequence, typically after probing the filesystem.
    pub fn set_count(&mut self, count: i32) {
        self.count = Some(count);
    }

    /// The filename at `index`; a plain filename ignores the index.
    pub fn nth_filename(&self, index: i32) -> String {
        if !self.is_sequence {
            return self.filename.clone();
        }
        format!(
            "{}{:0width$}{}",
            self.prefix,
            self.first + index,
            self.suffix,
            width = self.pad_width
        )
    }
}

struct Placeholder {
    first: i32,
    pad_width: usize,
    count: Option<i32>,
}

fn find_placeholder(filename: &str) -> Option<(usize, usize)> {
    let open = filename.find('{')?;
    let close = filename[open..].find('}')? + open;
    Some((open, close))
}

/// Parse the text between braces: `first` digits, `-`, optional `last`.
fn parse_placeholder(inner: &str) -> Option<Placeholder> {
    let (first_digits, rest) = inner.split_at(
        inner
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(inner.len()),
    );
    if first_digits.is_empty() {
        return None;
    }
    let first: i32 = first_digits.parse().ok()?;

    let rest = rest.strip_prefix('-')?;
    let count = if rest.is_empty() {
        None
    } else {
        let last: i32 = rest.parse().ok()?;
        if last < first {
            return None;
        }
        Some(last - first + 1)
    };

    Some(Placeholder {
        first,
        pad_width: first_digits.len(),
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_filename() {
        let sequence = FilenameSequence::new("sheet.png");
        assert!(!sequence.is_sequence());
        assert!(!sequence.is_infinite_sequence());
        assert_eq!(sequence.count(), 1);
        assert_eq!(sequence.nth_filename(0), "sheet.png");
        assert_eq!(sequence.nth_filename(7), "sheet.png");
    }

    #[test]
    fn test_infinite_sequence() {
        let sequence = FilenameSequence::new("seq-{0-}.png");
        assert!(sequence.is_sequence());
        assert!(sequence.is_infinite_sequence());
        assert_eq!(sequence.nth_filename(0), "seq-0.png");
        assert_eq!(sequence.nth_filename(2), "seq-2.png");
    }

    #[test]
    fn test_bounded_sequence() {
        let sequence = FilenameSequence::new("run-{1-4}.png");
        assert!(sequence.is_sequence());
        assert!(!sequence.is_infinite_sequence());
        assert_eq!(sequence.count(), 4);
        assert_eq!(sequence.nth_filename(0), "run-1.png");
        assert_eq!(sequence.nth_filename(3), "run-4.png");
    }

    #[test]
    fn test_zero_padding_from_first_index() {
        let sequence = FilenameSequence::new("page-{000-}.png");
        assert_eq!(sequence.nth_filename(0), "page-000.png");
        assert_eq!(sequence.nth_filename(12), "page-012.png");
        assert_eq!(sequence.nth_filename(1000), "page-1000.png");
    }

    #[test]
    fn test_set_count_bounds_infinite_sequence() {
        let mut sequence = FilenameSequence::new("seq-{0-}.png");
        sequence.set_count(3);
        assert!(!sequence.is_infinite_sequence());
        assert_eq!(sequence.count(), 3);
    }

    #[test]
    fn test_malformed_placeholder_is_plain() {
        for filename in ["curly{}.png", "curly{a-b}.png", "curly{5}.png", "curly{3-1}.png"] {
            let sequence = FilenameSequence::new(filename);
            assert!(!sequence.is_sequence(), "{filename} should not be a sequence");
            assert_eq!(sequence.nth_filename(1), filename);
        }
    }

    #[test]
    fn test_empty() {
        assert!(FilenameSequence::default().is_empty());
        assert!(!FilenameSequence::new("a.png").is_empty());
    }
}
