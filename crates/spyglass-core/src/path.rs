// ── Path codec ──
//
// Hierarchical selectors travel as `/`-joined segments in which `!`
// escapes both itself and `/`. This is a wire contract shared with
// every client: object-name property values embedded in a URI use the
// same escaping so that a `/` inside a value does not truncate the
// path. Empty segments are significant: `a//b` is three segments with
// an empty middle, distinct from `a/b`.

use crate::error::ProtocolError;

const ESCAPE: char = '!';
const SEPARATOR: char = '/';

/// Split a wire-form path into unescaped segments.
pub fn split_path(raw: &str) -> Result<Vec<String>, ProtocolError> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => {
                    return Err(ProtocolError::InvalidRequest(format!(
                        "dangling escape at end of path '{raw}'"
                    )))
                }
            },
            SEPARATOR => {
                segments.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    segments.push(current);
    Ok(segments)
}

/// Join segments back into wire form, escaping `!` and `/`.
pub fn join_path(segments: &[String]) -> String {
    segments
        .iter()
        .map(|s| escape_segment(s))
        .collect::<Vec<_>>()
        .join("/")
}

/// Escape a single segment for embedding in a wire-form path.
pub fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c == ESCAPE || c == SEPARATOR {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn split_plain() {
        assert_eq!(split_path("a/b/c").unwrap(), segs(&["a", "b", "c"]));
        assert_eq!(split_path("a").unwrap(), segs(&["a"]));
    }

    #[test]
    fn empty_segments_are_preserved() {
        assert_eq!(split_path("a//b").unwrap(), segs(&["a", "", "b"]));
        assert_ne!(split_path("a//b").unwrap(), split_path("a/b").unwrap());
    }

    #[test]
    fn escaped_separator_stays_in_segment() {
        assert_eq!(split_path("a!/b/c").unwrap(), segs(&["a/b", "c"]));
    }

    #[test]
    fn escaped_escape_is_literal() {
        assert_eq!(split_path("a!!b").unwrap(), segs(&["a!b"]));
        assert_eq!(split_path("a!!!/b").unwrap(), segs(&["a!/b"]));
    }

    #[test]
    fn dangling_escape_is_invalid() {
        assert!(split_path("abc!").is_err());
    }

    #[test]
    fn join_escapes_and_roundtrips() {
        let original = segs(&["plain", "with/slash", "with!bang", "", "a!/b"]);
        let wire = join_path(&original);
        assert_eq!(split_path(&wire).unwrap(), original);
    }

    #[test]
    fn join_of_split_is_identity_for_escape_free_input() {
        // Property 2: join(split(s)) == s unless s contains unescaped
        // sequences that split normalizes.
        for s in ["a/b/c", "x", "one/two"] {
            assert_eq!(join_path(&split_path(s).unwrap()), s);
        }
    }
}
