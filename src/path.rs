//! Path language: dotted and bracketed addresses into a value tree.
//!
//! A path is a sequence of segments, each either a string key or an array
//! index. Keys that are valid identifiers are written after a dot
//! (`user.name`), indices in brackets (`items[0]`), and any other key in
//! quoted brackets (`['first name']`).
//!
//! # Example
//!
//! ```
//! use formguard::path::{Path, Segment};
//!
//! let path = Path::parse("friends[0]['nick name']").unwrap();
//! assert_eq!(
//!     path.segments(),
//!     &[Segment::from("friends"), Segment::Index(0), Segment::from("nick name")]
//! );
//! assert_eq!(path.to_string(), "friends[0]['nick name']");
//! ```

use crate::error::PathError;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

/// One step in a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(untagged)]
pub enum Segment {
    Index(usize),
    Key(String),
}

impl Segment {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Segment::Key(key) => Some(key),
            Segment::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Segment::Index(index) => Some(*index),
            Segment::Key(_) => None,
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.to_owned())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

/// An ordered sequence of segments. The empty path denotes the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Segment>);

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a path string. Malformed input is an error, distinct from the
    /// valid empty path (`""` or whitespace only).
    pub fn parse(text: &str) -> Result<Self, PathError> {
        Scanner::new(text).run().map(Path)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    pub fn push(&mut self, segment: impl Into<Segment>) {
        self.0.push(segment.into());
    }

    pub fn pop(&mut self) -> Option<Segment> {
        self.0.pop()
    }

    /// A new path with `segment` appended. `self` is left untouched.
    pub fn child(&self, segment: impl Into<Segment>) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(segment.into());
        Self(segments)
    }

    /// Whether `self` equals `prefix` or lies below it.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.0.iter()
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl FromIterator<Segment> for Path {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Path::parse(text)
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.0 {
            match segment {
                Segment::Index(index) => write!(f, "[{index}]")?,
                Segment::Key(key) if is_identifier(key) => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
                Segment::Key(key) => {
                    f.write_str("['")?;
                    for c in key.chars() {
                        if c == '\\' || c == '\'' {
                            f.write_str("\\")?;
                        }
                        write!(f, "{c}")?;
                    }
                    f.write_str("']")?;
                }
            }
            first = false;
        }
        Ok(())
    }
}

/// Whether `segment` can be written bare after a dot.
pub fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c == '$' || c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '$' || c == '_' || c.is_alphanumeric())
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Dot,
    OpenBracket,
    SingleQuote,
    DoubleQuote,
    CloseQuote,
    CloseBracket,
}

struct Scanner {
    chars: Vec<char>,
    segments: Vec<Segment>,
    segment: String,
    state: State,
    escape: bool,
}

impl Scanner {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            segments: Vec::new(),
            segment: String::new(),
            state: State::Start,
            escape: false,
        }
    }

    fn quoted(&self) -> bool {
        matches!(self.state, State::SingleQuote | State::DoubleQuote)
    }

    fn push_identifier(&mut self, position: usize) -> Result<(), PathError> {
        if !is_identifier(&self.segment) {
            return Err(PathError::InvalidIdentifier {
                position,
                segment: std::mem::take(&mut self.segment),
            });
        }
        self.segments
            .push(Segment::Key(std::mem::take(&mut self.segment)));
        Ok(())
    }

    fn run(mut self) -> Result<Vec<Segment>, PathError> {
        let mut i = 0;
        while i < self.chars.len() {
            let c = self.chars[i];
            let unexpected = PathError::UnexpectedChar {
                position: i,
                found: c,
            };

            match c {
                '\\' => {
                    if !self.quoted() {
                        return Err(unexpected);
                    }
                    if self.escape {
                        self.segment.push('\\');
                    }
                    self.escape = !self.escape;
                    i += 1;
                    continue;
                }

                ' ' | '\t' | '\r' | '\n' if !self.quoted() => {
                    let mut next = i + 1;
                    while next < self.chars.len() && is_space(self.chars[next]) {
                        next += 1;
                    }
                    let following = self.chars.get(next).copied();
                    let dangling = match self.state {
                        State::OpenBracket => following != Some(']'),
                        State::Start | State::Dot => {
                            !matches!(following, None | Some('.') | Some('['))
                        }
                        _ => false,
                    };
                    if dangling && !self.segment.is_empty() {
                        return Err(match following {
                            Some(found) => PathError::UnexpectedChar {
                                position: next,
                                found,
                            },
                            None => PathError::Unterminated,
                        });
                    }
                    self.escape = false;
                    i = next;
                    continue;
                }

                '.' if !self.quoted() => match self.state {
                    State::CloseBracket => self.state = State::Dot,
                    State::Start | State::Dot => {
                        self.push_identifier(i)?;
                        self.state = State::Dot;
                    }
                    _ => return Err(unexpected),
                },

                '[' if !self.quoted() => match self.state {
                    State::Dot => {
                        self.push_identifier(i)?;
                        self.state = State::OpenBracket;
                    }
                    State::CloseBracket => self.state = State::OpenBracket,
                    State::Start => {
                        if !self.segment.is_empty() {
                            self.push_identifier(i)?;
                        }
                        self.state = State::OpenBracket;
                    }
                    _ => return Err(unexpected),
                },

                ']' if !self.quoted() => match self.state {
                    State::OpenBracket => {
                        if self.segment.is_empty() {
                            return Err(PathError::EmptyBrackets { position: i });
                        }
                        let digits = std::mem::take(&mut self.segment);
                        let index = digits
                            .parse::<usize>()
                            .map_err(|_| PathError::IndexOverflow { digits })?;
                        self.segments.push(Segment::Index(index));
                        self.state = State::CloseBracket;
                    }
                    State::CloseQuote => {
                        self.segments
                            .push(Segment::Key(std::mem::take(&mut self.segment)));
                        self.state = State::CloseBracket;
                    }
                    _ => return Err(unexpected),
                },

                '\'' if !(self.escape || self.state == State::DoubleQuote) => match self.state {
                    State::SingleQuote => self.state = State::CloseQuote,
                    State::OpenBracket if self.segment.is_empty() => {
                        self.state = State::SingleQuote
                    }
                    _ => return Err(unexpected),
                },

                '"' if !(self.escape || self.state == State::SingleQuote) => match self.state {
                    State::DoubleQuote => self.state = State::CloseQuote,
                    State::OpenBracket if self.segment.is_empty() => {
                        self.state = State::DoubleQuote
                    }
                    _ => return Err(unexpected),
                },

                _ => {
                    let stray = match self.state {
                        State::CloseQuote | State::CloseBracket => true,
                        State::OpenBracket => !c.is_ascii_digit(),
                        _ => false,
                    };
                    if stray {
                        return Err(unexpected);
                    }
                    self.segment.push(c);
                }
            }

            self.escape = false;
            i += 1;
        }

        match self.state {
            State::Start => {
                if !self.segment.is_empty() {
                    self.push_identifier(self.chars.len())?;
                }
            }
            State::Dot => self.push_identifier(self.chars.len())?,
            State::CloseBracket => {}
            _ => return Err(PathError::Unterminated),
        }

        Ok(self.segments)
    }
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

// ---------------------------------------------------------------------------
// Parse cache
// ---------------------------------------------------------------------------

/// Memoizes path strings. When full, the cache is cleared wholesale rather
/// than evicting entries one by one.
///
/// Lookups always return an owned copy, so callers may mutate the result.
#[derive(Debug)]
pub struct PathCache {
    entries: HashMap<String, Path>,
    capacity: usize,
}

impl PathCache {
    pub const DEFAULT_CAPACITY: usize = 500;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn parse(&mut self, text: &str) -> Result<Path, PathError> {
        if let Some(cached) = self.entries.get(text) {
            return Ok(cached.clone());
        }
        let path = Path::parse(text)?;
        if self.entries.len() >= self.capacity {
            tracing::trace!(capacity = self.capacity, "path cache full, clearing");
            self.entries.clear();
        }
        self.entries.insert(text.to_owned(), path.clone());
        Ok(path)
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        if self.entries.len() > self.capacity {
            self.entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new()
    }
}

// Single-threaded engine: one cache per thread acts as the process-wide cache.
thread_local! {
    static PATH_CACHE: RefCell<PathCache> = RefCell::new(PathCache::new());
}

/// Parse through the thread-wide cache.
pub fn parse_cached(text: &str) -> Result<Path, PathError> {
    PATH_CACHE.with(|cache| cache.borrow_mut().parse(text))
}

/// Resize the thread-wide cache.
pub fn set_cache_capacity(capacity: usize) {
    PATH_CACHE.with(|cache| cache.borrow_mut().set_capacity(capacity))
}

/// Number of entries in the thread-wide cache.
pub fn cache_len() -> usize {
    PATH_CACHE.with(|cache| cache.borrow().len())
}

// ===========================================================================
// Tests
// ===========================================================================
