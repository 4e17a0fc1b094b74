//! Line splitting for the definition language
//!
//! A directive line consists of a keyword followed by whitespace separated
//! arguments. Single or double quoted spans form one argument with the
//! quotes stripped; an unterminated quote runs to the end of the line.
//! Adjacent arguments joined by `+` or `-` are merged back into a single
//! arithmetic expression so that `3 + 1` and `3+1` read the same.

/// Number of leading whitespace characters, used as the indentation level.
pub fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Split a line into arguments, honoring quoted spans.
///
/// The returned slices borrow from `line`, which lets
/// [`join_expressions`] re-merge neighbouring arguments losslessly.
pub fn split_arguments(line: &str) -> Vec<&str> {
    let mut arguments = Vec::new();
    let mut rest = line;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        let first = rest.as_bytes()[0];
        if first == b'"' || first == b'\'' {
            let end = rest[1..].find(first as char).map_or(rest.len(), |i| i + 1);
            arguments.push(&rest[1..end]);
            rest = &rest[(end + 1).min(rest.len())..];
        } else {
            let end = rest
                .find(char::is_whitespace)
                .unwrap_or(rest.len());
            arguments.push(&rest[..end]);
            rest = &rest[end..];
        }
    }
    arguments
}

/// Merge arguments that continue an arithmetic expression.
///
/// An argument ending in `+`/`-`, or followed by one starting with `+`/`-`,
/// is joined with its successor into one slice of the original line.
pub fn join_expressions<'a>(line: &'a str, arguments: &mut Vec<&'a str>) {
    let base = line.as_ptr() as usize;
    let mut i = 0;
    while i + 1 < arguments.len() {
        if arguments[i].ends_with(['+', '-']) || arguments[i + 1].starts_with(['+', '-']) {
            let start = arguments[i].as_ptr() as usize - base;
            let end = arguments[i + 1].as_ptr() as usize - base + arguments[i + 1].len();
            arguments[i] = &line[start..end];
            arguments.remove(i + 1);
        } else {
            i += 1;
        }
    }
}

/// Evaluate an integer argument, which may be a `+`/`-` expression.
///
/// Returns `None` when the argument is not a well formed chain of integer
/// terms, e.g. on stray characters or a trailing operator.
pub fn parse_integer(argument: &str) -> Option<i32> {
    let mut total: i64 = 0;
    let mut sign: i64 = 1;
    let mut expect_term = true;
    let mut rest = argument.trim();
    if rest.is_empty() {
        return None;
    }

    while !rest.is_empty() {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if expect_term {
            let digits = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            if digits == 0 {
                return None;
            }
            let term: i64 = rest[..digits].parse().ok()?;
            total += sign * term;
            rest = &rest[digits..];
            expect_term = false;
        } else {
            sign = match rest.as_bytes()[0] {
                b'+' => 1,
                b'-' => -1,
                _ => return None,
            };
            rest = &rest[1..];
            expect_term = true;
        }
    }
    if expect_term {
        return None;
    }
    i32::try_from(total).ok()
}
