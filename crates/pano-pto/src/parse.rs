//! Token scanning for script lines.
//!
//! A line is a record letter followed by whitespace separated `<name><value>` tokens.
//! Values may be quoted (`n"my image.jpg"`), and a variable value `=N` links to image `N`.

use std::str::FromStr;

use log::warn;
use pano_core::{Real, Rect2D};

/// Raw value of the first token of `line` that starts with `name`.
///
/// Only tokens after whitespace are considered, so the record letter never matches. A
/// quoted value runs to the closing quote, anything else to the next whitespace.
pub fn pt_param<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let bytes = line.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        if !bytes[i - 1].is_ascii_whitespace() || bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if let Some(rest) = line[i..].strip_prefix(name) {
            return Some(match rest.strip_prefix('"') {
                Some(quoted) => quoted.find('"').map_or(quoted, |end| &quoted[..end]),
                None => rest.find(char::is_whitespace).map_or(rest, |end| &rest[..end]),
            });
        }
        // skip the token; whitespace inside quotes does not end it
        let mut quoted = false;
        while i < bytes.len() && (quoted || !bytes[i].is_ascii_whitespace()) {
            if bytes[i] == b'"' {
                quoted = !quoted;
            }
            i += 1;
        }
    }
    None
}

/// Parsed value of token `name`; unparsable values are logged and ignored.
pub fn param<T: FromStr>(line: &str, name: &str) -> Option<T> {
    let raw = pt_param(line, name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring malformed field `{name}{raw}`");
            None
        }
    }
}

pub fn string_param(line: &str, name: &str) -> Option<String> {
    pt_param(line, name).map(str::to_owned)
}

/// An image variable as written on an `i` or `o` line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VarField {
    Value(Real),
    /// Shared with the image of this script index.
    Link(usize),
}

pub fn var_param(line: &str, code: &str) -> Option<VarField> {
    let raw = pt_param(line, code)?;
    let field = match raw.strip_prefix('=') {
        Some(link) => link.parse().ok().map(VarField::Link),
        None => raw.parse().ok().map(VarField::Value),
    };
    if field.is_none() {
        warn!("ignoring malformed variable `{code}{raw}`");
    }
    field
}

/// Rectangle written as `left,right,top,bottom`.
pub fn parse_rect(raw: &str) -> Option<Rect2D> {
    let values: Vec<i32> = raw.split(',').map(|v| v.trim().parse()).collect::<Result<_, _>>().ok()?;
    match values[..] {
        [left, right, top, bottom] => Some(Rect2D::new(left, top, right, bottom)),
        _ => {
            warn!("could not parse rectangle `{raw}`");
            None
        }
    }
}

pub fn format_rect(r: &Rect2D) -> String {
    format!("{},{},{},{}", r.left, r.right, r.top, r.bottom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_letter_and_prefixes() {
        let line = "i w4000 h3000 f0 v=0 Eev12.5 Er1 n\"dir with space/img 1.jpg\" y-3.25";
        assert_eq!(pt_param(line, "i"), None);
        assert_eq!(pt_param(line, "w"), Some("4000"));
        assert_eq!(pt_param(line, "E"), Some("ev12.5"));
        assert_eq!(pt_param(line, "Er"), Some("1"));
        assert_eq!(pt_param(line, "n"), Some("dir with space/img 1.jpg"));
        assert_eq!(param::<Real>(line, "y"), Some(-3.25));
        assert_eq!(pt_param(line, "x"), None);
    }

    #[test]
    fn quoted_values_are_skipped_whole() {
        let line = "i Vf\"flat x1.tif\" n\"a b0\" x7";
        assert_eq!(pt_param(line, "x"), Some("7"));
        assert_eq!(pt_param(line, "b"), None);
        assert_eq!(pt_param(line, "Vf"), Some("flat x1.tif"));
    }

    #[test]
    fn variables_and_links() {
        let line = "i v50 a=2 b0.01 c=x";
        assert_eq!(var_param(line, "v"), Some(VarField::Value(50.0)));
        assert_eq!(var_param(line, "a"), Some(VarField::Link(2)));
        assert_eq!(var_param(line, "b"), Some(VarField::Value(0.01)));
        assert_eq!(var_param(line, "c"), None);
        assert_eq!(param::<u32>("p w12x", "w"), None);
    }

    #[test]
    fn rectangles_use_left_right_top_bottom() {
        let r = parse_rect("10,390,20,280").unwrap();
        assert_eq!(r, Rect2D::new(10, 20, 390, 280));
        assert_eq!(format_rect(&r), "10,390,20,280");
        assert_eq!(parse_rect("1,2,3"), None);
        assert_eq!(parse_rect("1,2,a,4"), None);
    }
}
