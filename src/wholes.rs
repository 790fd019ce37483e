//! Exact durations measured in whole notes.
//!
//! Everything the populator adds, subtracts or compares is a
//! [`Wholes`] rational, so that sums of tuplet members or apportioned
//! harmonies never drift.

use num_rational::Rational64;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// A duration or position, in whole notes.
pub type Wholes = Rational64;

pub fn wholes(numer: i64, denom: i64) -> Wholes {
    Rational64::new(numer, denom)
}

pub fn zero() -> Wholes {
    Wholes::zero()
}

/// Convert a MusicXML `<duration>` (in divisions per quarter note) to whole notes.
///
/// `divisions` must be positive; callers substitute 1 for a missing value.
pub fn divisions_to_wholes(duration: i64, divisions: i64) -> Wholes {
    Rational64::new(duration, divisions.max(1) * 4)
}

/// Most augmentation dots a note type takes.
pub const MAX_DOTS: u8 = 8;

/// Graphic note type, from `<type>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NoteType {
    Maxima,
    Long,
    Breve,
    Whole,
    Half,
    Quarter,
    Eighth,
    N16th,
    N32nd,
    N64th,
    N128th,
    N256th,
    N512th,
    N1024th,
}

impl NoteType {
    pub fn from_musicxml(s: &str) -> Option<Self> {
        let t = match s.trim() {
            "maxima" => NoteType::Maxima,
            "long" => NoteType::Long,
            "breve" => NoteType::Breve,
            "whole" => NoteType::Whole,
            "half" => NoteType::Half,
            "quarter" => NoteType::Quarter,
            "eighth" => NoteType::Eighth,
            "16th" => NoteType::N16th,
            "32nd" => NoteType::N32nd,
            "64th" => NoteType::N64th,
            "128th" => NoteType::N128th,
            "256th" => NoteType::N256th,
            "512th" => NoteType::N512th,
            "1024th" => NoteType::N1024th,
            _ => return None,
        };
        Some(t)
    }

    /// Undotted length of this note type.
    pub fn wholes(self) -> Wholes {
        match self {
            NoteType::Maxima => wholes(8, 1),
            NoteType::Long => wholes(4, 1),
            NoteType::Breve => wholes(2, 1),
            NoteType::Whole => wholes(1, 1),
            NoteType::Half => wholes(1, 2),
            NoteType::Quarter => wholes(1, 4),
            NoteType::Eighth => wholes(1, 8),
            NoteType::N16th => wholes(1, 16),
            NoteType::N32nd => wholes(1, 32),
            NoteType::N64th => wholes(1, 64),
            NoteType::N128th => wholes(1, 128),
            NoteType::N256th => wholes(1, 256),
            NoteType::N512th => wholes(1, 512),
            NoteType::N1024th => wholes(1, 1024),
        }
    }

    /// Length including `dots` augmentation dots: `base × (2 − 1/2^dots)`.
    /// Dots beyond [`MAX_DOTS`] are ignored.
    pub fn dotted_wholes(self, dots: u8) -> Wholes {
        let base = self.wholes();
        let mut total = base;
        let mut increment = base;
        for _ in 0..dots.min(MAX_DOTS) {
            increment /= Wholes::from_integer(2);
            total += increment;
        }
        total
    }
}

/// An actual/normal tuplet ratio: `actual` notes in the time of `normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupletFactor {
    pub actual: i64,
    pub normal: i64,
}

impl TupletFactor {
    pub const IDENTITY: TupletFactor = TupletFactor { actual: 1, normal: 1 };

    pub fn new(actual: i64, normal: i64) -> Self {
        Self {
            actual: actual.max(1),
            normal: normal.max(1),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.actual == self.normal
    }

    /// The multiplier turning a display duration into a sounding one.
    pub fn ratio(&self) -> Wholes {
        Rational64::new(self.normal, self.actual)
    }

    pub fn compose(self, inner: TupletFactor) -> TupletFactor {
        TupletFactor::new(self.actual * inner.actual, self.normal * inner.normal)
    }

    /// The factor `f` such that `outer.compose(f)` equals `self`.
    pub fn relative_to(self, outer: TupletFactor) -> TupletFactor {
        let r = Rational64::new(self.actual * outer.normal, self.normal * outer.actual);
        TupletFactor::new(*r.numer(), *r.denom())
    }
}

impl Default for TupletFactor {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divisions_convert_to_wholes() {
        assert_eq!(divisions_to_wholes(4, 4), wholes(1, 4));
        assert_eq!(divisions_to_wholes(96, 24), wholes(1, 1));
        assert_eq!(divisions_to_wholes(3, 2), wholes(3, 8));
        // non-positive divisions are treated as 1
        assert_eq!(divisions_to_wholes(1, 0), wholes(1, 4));
    }

    #[test]
    fn excess_dots_are_ignored() {
        assert_eq!(NoteType::Maxima.dotted_wholes(MAX_DOTS), wholes(4088, 256));
        assert_eq!(NoteType::N1024th.dotted_wholes(u8::MAX), NoteType::N1024th.dotted_wholes(MAX_DOTS));
    }

    #[test]
    fn dotted_durations() {
        assert_eq!(NoteType::Quarter.dotted_wholes(0), wholes(1, 4));
        assert_eq!(NoteType::Quarter.dotted_wholes(1), wholes(3, 8));
        assert_eq!(NoteType::Half.dotted_wholes(2), wholes(7, 8));
        assert_eq!(NoteType::from_musicxml("16th"), Some(NoteType::N16th));
        assert_eq!(NoteType::from_musicxml("sixteenth"), None);
    }

    #[test]
    fn tuplet_factors_compose() {
        let triplet = TupletFactor::new(3, 2);
        let quintuplet = TupletFactor::new(5, 4);
        let nested = quintuplet.compose(triplet);
        assert_eq!(nested, TupletFactor::new(15, 8));
        assert_eq!(nested.relative_to(quintuplet), triplet);
        assert_eq!(nested.ratio(), wholes(8, 15));
        assert!(TupletFactor::default().is_identity());
    }
}
