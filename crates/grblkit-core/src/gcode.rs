//! G-code line model
//!
//! A [`Line`] is the unit handed to the controller: an ordered sequence of
//! [`Word`]s rendered in the compact form Grbl expects (3-decimal floats,
//! trailing zeros trimmed).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A word is a letter-number pair. Examples would be `G0` or `X-2.5`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Word {
    /// The word letter, e.g. `G`, `M`, `X`, `F`.
    pub letter: char,
    /// The numeric value.
    pub value: f64,
}

impl Word {
    pub fn new(letter: char, value: f64) -> Word {
        Word { letter, value }
    }
}

fn format_value(v: f64) -> String {
    let s = format!("{v:.3}");
    match s.strip_suffix(".000") {
        Some(t) => t.to_string(),
        None => s.trim_end_matches('0').to_string(),
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter, format_value(self.value))
    }
}

/// A line is a set of words sent to the controller as a single unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Line(Vec<Word>);

impl Line {
    pub fn new() -> Line {
        Line(Vec::new())
    }

    pub fn push(&mut self, word: Word) {
        self.0.push(word);
    }

    pub fn words(&self) -> &[Word] {
        &self.0
    }

    /// The modal word of the line, if it opens with one.
    pub fn modal(&self) -> Option<Word> {
        match self.0.first() {
            Some(w) if w.letter == 'G' || w.letter == 'M' => Some(*w),
            _ => None,
        }
    }

    pub fn has_word(&self, letter: char) -> bool {
        self.0.iter().any(|w| w.letter == letter)
    }

    pub fn value(&self, letter: char) -> Option<f64> {
        self.0.iter().find(|w| w.letter == letter).map(|w| w.value)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for w in &self.0 {
            write!(f, "{w}")?;
        }
        Ok(())
    }
}

impl From<Vec<Word>> for Line {
    fn from(words: Vec<Word>) -> Line {
        Line(words)
    }
}

impl FromIterator<Word> for Line {
    fn from_iter<I: IntoIterator<Item = Word>>(iter: I) -> Line {
        Line(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(words: &[(char, f64)]) -> Line {
        words.iter().map(|&(l, v)| Word::new(l, v)).collect()
    }

    #[test]
    fn test_word_formatting() {
        assert_eq!(Word::new('G', 0.0).to_string(), "G0");
        assert_eq!(Word::new('X', -2.5).to_string(), "X-2.5");
        assert_eq!(Word::new('F', 100.0).to_string(), "F100");
        assert_eq!(Word::new('Z', 0.05).to_string(), "Z0.05");
        assert_eq!(Word::new('Y', 1.23456).to_string(), "Y1.235");
    }

    #[test]
    fn test_line_rendering() {
        let l = line(&[('G', 1.0), ('X', 10.0), ('Y', -0.5), ('F', 500.0)]);
        assert_eq!(l.to_string(), "G1X10Y-0.5F500");
    }

    #[test]
    fn test_modal() {
        assert_eq!(line(&[('G', 1.0), ('X', 2.0)]).modal(), Some(Word::new('G', 1.0)));
        assert_eq!(line(&[('X', 2.0)]).modal(), None);
        assert_eq!(Line::new().modal(), None);
    }

    #[test]
    fn test_word_lookup() {
        let l = line(&[('G', 0.0), ('X', 3.0)]);
        assert!(l.has_word('X'));
        assert!(!l.has_word('Y'));
        assert_eq!(l.value('X'), Some(3.0));
        assert_eq!(l.value('Y'), None);
    }
}
