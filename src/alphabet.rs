//! Ordered character sets that prefixes are built from.
//!
//! The alphabet defines both the seed prefixes of a run and the sibling walk
//! used when a capped response may have hidden words (see [`Alphabet::next_prefix`]).

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowercase ASCII letters.
pub const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

/// Digits followed by lowercase letters.
pub const ALNUM: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

/// Space and punctuation followed by digits and lowercase letters.
pub const EXTENDED: &str = " +-\\.0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlphabetError {
    #[error("alphabet must contain at least one character")]
    Empty,
    #[error("alphabet contains duplicate character {0:?}")]
    Duplicate(char),
}

/// Named alphabets matching the known endpoint generations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AlphabetPreset {
    /// a-z
    Lower,
    /// 0-9 then a-z
    #[default]
    Alnum,
    /// space, + - \ . then 0-9 then a-z
    Extended,
}

impl AlphabetPreset {
    pub fn chars(self) -> &'static str {
        match self {
            AlphabetPreset::Lower => LOWER,
            AlphabetPreset::Alnum => ALNUM,
            AlphabetPreset::Extended => EXTENDED,
        }
    }

    pub fn alphabet(self) -> Alphabet {
        // Presets are distinct, non-empty literals.
        Alphabet {
            chars: self.chars().chars().collect(),
        }
    }
}

/// An ordered sequence of distinct characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    chars: Vec<char>,
}

impl Alphabet {
    /// Build an alphabet from characters in their intended order.
    pub fn new(chars: &str) -> Result<Self, AlphabetError> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for c in chars.chars() {
            if !seen.insert(c) {
                return Err(AlphabetError::Duplicate(c));
            }
            ordered.push(c);
        }
        if ordered.is_empty() {
            return Err(AlphabetError::Empty);
        }
        Ok(Self { chars: ordered })
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn min(&self) -> char {
        self.chars[0]
    }

    pub fn contains(&self, c: char) -> bool {
        self.position(c).is_some()
    }

    fn position(&self, c: char) -> Option<usize> {
        self.chars.iter().position(|&x| x == c)
    }

    /// The character following `c`, or `None` if `c` is the last character
    /// or not part of the alphabet.
    pub fn successor(&self, c: char) -> Option<char> {
        let idx = self.position(c)?;
        self.chars.get(idx + 1).copied()
    }

    /// The next sibling prefix after `prefix`.
    ///
    /// Replaces the last character with its successor. When the last character
    /// has no successor, the alphabet's first character is appended instead,
    /// so `"z"` becomes `"z0"` under [`ALNUM`]. Returns `None` only for an
    /// empty prefix.
    pub fn next_prefix(&self, prefix: &str) -> Option<String> {
        let last = prefix.chars().last()?;
        match self.successor(last) {
            Some(next) => {
                let mut out: String = prefix[..prefix.len() - last.len_utf8()].to_string();
                out.push(next);
                Some(out)
            }
            None => {
                let mut out = prefix.to_string();
                out.push(self.min());
                Some(out)
            }
        }
    }

    /// All prefixes of length `1..=depth`, shortest first, in alphabet order.
    pub fn seeds(&self, depth: usize) -> Vec<String> {
        let mut all = Vec::new();
        let mut level: Vec<String> = vec![String::new()];
        for _ in 0..depth {
            let mut next = Vec::with_capacity(level.len() * self.chars.len());
            for stem in &level {
                for &c in &self.chars {
                    let mut p = stem.clone();
                    p.push(c);
                    next.push(p);
                }
            }
            all.extend(next.iter().cloned());
            level = next;
        }
        all
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.chars {
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}
