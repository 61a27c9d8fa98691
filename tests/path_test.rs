//! Integration tests for the path language
//!
//! Covers parsing of dotted, indexed and quoted segments, rejection of
//! malformed input, the parse cache, and the parse/serialize round trip.

use formguard::path::{cache_len, parse_cached, set_cache_capacity, Path, Segment};
use formguard::PathError;
use proptest::prelude::*;

fn key(s: &str) -> Segment {
    Segment::Key(s.to_string())
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_parse_dotted_path() {
    let path = Path::parse("a.b.c").unwrap();
    assert_eq!(path.segments(), &[key("a"), key("b"), key("c")]);
}

#[test]
fn test_parse_index_then_key() {
    let path = Path::parse("a[0].b").unwrap();
    assert_eq!(path.segments(), &[key("a"), Segment::Index(0), key("b")]);
}

#[test]
fn test_parse_quoted_keys() {
    assert_eq!(Path::parse("['x y']").unwrap().segments(), &[key("x y")]);
    assert_eq!(Path::parse("[\"x y\"]").unwrap().segments(), &[key("x y")]);
    assert_eq!(
        Path::parse(r"['it\'s']").unwrap().segments(),
        &[key("it's")]
    );
    assert_eq!(Path::parse("['0']").unwrap().segments(), &[key("0")]);
}

#[test]
fn test_parse_empty_path_is_root() {
    assert!(Path::parse("").unwrap().is_root());
    assert!(Path::parse("   ").unwrap().is_root());
}

#[test]
fn test_parse_tolerates_whitespace_between_segments() {
    let path = Path::parse(" a . b [ 1 ] ").unwrap();
    assert_eq!(path.segments(), &[key("a"), key("b"), Segment::Index(1)]);
}

#[test]
fn test_parse_rejects_malformed_input() {
    for input in ["a.", "a..b", "[a]", "a[0", "a['0", ".a", "a b", "a[]", "a]", "['a'b]"] {
        assert!(
            Path::parse(input).is_err(),
            "expected {input:?} to be rejected"
        );
    }
}

#[test]
fn test_parse_error_reports_position() {
    assert_eq!(
        Path::parse("[a]"),
        Err(PathError::UnexpectedChar {
            position: 1,
            found: 'a'
        })
    );
    assert_eq!(Path::parse("a[0"), Err(PathError::Unterminated));
}

// ============================================================================
// Serialization
// ============================================================================

#[test]
fn test_serialize_mixed_segments() {
    let path: Path = vec![key("users"), Segment::Index(3), key("first name"), key("age")].into();
    assert_eq!(path.to_string(), "users[3]['first name'].age");
}

#[test]
fn test_serialize_escapes_quotes_and_backslashes() {
    let path: Path = vec![key(r"it's a \ test")].into();
    assert_eq!(path.to_string(), r"['it\'s a \\ test']");
    assert_eq!(Path::parse(&path.to_string()).unwrap(), path);
}

#[test]
fn test_starts_with() {
    let parent = Path::parse("a[0]").unwrap();
    assert!(Path::parse("a[0].b").unwrap().starts_with(&parent));
    assert!(parent.starts_with(&parent));
    assert!(!Path::parse("a[1].b").unwrap().starts_with(&parent));
    assert!(parent.starts_with(&Path::root()));
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_parse_cached_matches_parse_and_is_bounded() {
    set_cache_capacity(2);
    for text in ["a", "b", "c", "d"] {
        assert_eq!(parse_cached(text).unwrap(), Path::parse(text).unwrap());
        assert!(cache_len() <= 2);
    }
    assert!(parse_cached("a.").is_err());
}

// ============================================================================
// Round trip
// ============================================================================

fn segment() -> impl Strategy<Value = Segment> {
    prop_oneof![
        (0usize..100_000).prop_map(Segment::Index),
        "[a-zA-Z_$][a-zA-Z0-9_$]{0,8}".prop_map(Segment::Key),
        ".{0,10}".prop_map(Segment::Key),
    ]
}

proptest! {
    #[test]
    fn test_parse_serialize_round_trip(segments in prop::collection::vec(segment(), 0..6)) {
        let path = Path::from(segments);
        let text = path.to_string();
        prop_assert_eq!(Path::parse(&text), Ok(path));
    }
}
