//! Adaptive enumeration of search codes.
//!
//! BuscaCursos truncates every search at a fixed number of results, so a
//! short prefix such as `II` may hide sections. The iterator starts with every
//! two-letter prefix and, when told a prefix saturated the cap, emits that
//! prefix's one-symbol-longer children before moving on.

use tracing::warn;

const BASE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const CHILD_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const DEFAULT_MIN_DEPTH: usize = 2;
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Longest code either depth may ask for. Course codes are at most this long,
/// and a base level this wide is already far past any practical sweep.
pub const DEPTH_LIMIT: usize = 8;

/// A run of codes sharing `prefix`, followed by `width` symbols of `alphabet`.
#[derive(Debug)]
struct Frame {
    prefix: String,
    alphabet: &'static [u8],
    width: u32,
    next: usize,
    total: usize,
}

impl Frame {
    fn new(prefix: String, alphabet: &'static [u8], width: u32) -> Self {
        Self {
            prefix,
            alphabet,
            width,
            next: 0,
            total: alphabet.len().checked_pow(width).unwrap_or(usize::MAX),
        }
    }

    /// The code at `index`, enumerating the suffix like a base-N counter.
    fn code_at(&self, mut index: usize) -> String {
        let base = self.alphabet.len();
        let mut suffix = vec![0u8; self.width as usize];
        for slot in suffix.iter_mut().rev() {
            *slot = self.alphabet[index % base];
            index /= base;
        }

        let mut code = String::with_capacity(self.prefix.len() + suffix.len());
        code.push_str(&self.prefix);
        code.extend(suffix.into_iter().map(char::from));
        code
    }
}

/// A stack of frames: the base level at the bottom, expansions on top.
///
/// Codes already produced are never produced again, and expanding a code
/// does not restart the enumeration around it.
#[derive(Debug)]
pub struct CodeIterator {
    frames: Vec<Frame>,
    last: Option<String>,
    max_depth: usize,
}

impl Default for CodeIterator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeIterator {
    pub fn new() -> Self {
        Self::with_depths(DEFAULT_MIN_DEPTH, DEFAULT_MAX_DEPTH)
    }

    /// `min_depth` is the length of the base codes, `max_depth` the longest
    /// code an expansion may produce. Both are clamped to `1..=DEPTH_LIMIT`.
    pub fn with_depths(min_depth: usize, max_depth: usize) -> Self {
        let min_depth = min_depth.clamp(1, DEPTH_LIMIT);
        let max_depth = max_depth.clamp(min_depth, DEPTH_LIMIT);
        let width = u32::try_from(min_depth).unwrap_or(u32::MAX);

        Self {
            frames: vec![Frame::new(String::new(), BASE_ALPHABET, width)],
            last: None,
            max_depth,
        }
    }

    /// Enumerate only the codes below `prefix`, as if `prefix` had just
    /// saturated the cap. Empty if `prefix` is already `max_depth` long.
    pub fn below(prefix: &str, max_depth: usize) -> Self {
        let mut codes = Self {
            frames: Vec::new(),
            last: Some(prefix.to_owned()),
            max_depth: max_depth.min(DEPTH_LIMIT),
        };
        codes.add_depth();
        codes
    }

    /// Emit the children of the most recently produced code next.
    ///
    /// Returns `false` if there is nothing to expand: no code was produced
    /// since the last expansion, or the code is already `max_depth` long.
    pub fn add_depth(&mut self) -> bool {
        let Some(code) = self.last.take() else {
            return false;
        };

        if code.len() >= self.max_depth {
            warn!(
                code = %code,
                max_depth = self.max_depth,
                "Code is at maximum depth, results may be truncated"
            );
            return false;
        }

        self.frames.push(Frame::new(code, CHILD_ALPHABET, 1));
        true
    }

    /// Number of pending expansion levels above the base level.
    pub fn expansion_depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }
}

impl Iterator for CodeIterator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let frame = self.frames.last_mut()?;
            if frame.next < frame.total {
                let code = frame.code_at(frame.next);
                frame.next += 1;
                self.last = Some(code.clone());
                return Some(code);
            }
            self.frames.pop();
        }
    }
}
