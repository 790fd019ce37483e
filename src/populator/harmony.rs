//! Harmony and figured-bass apportioning.
//!
//! Harmonies (and figured basses) wait until the next note is finalized;
//! that note is their anchor. One pending element inherits the anchor's
//! duration. Several share it according to their offsets, and the last
//! one absorbs whatever is left so the sum is exact.

use num_traits::Zero;

use crate::msr::{FiguredBass, Harmony};
use crate::wholes::{self, TupletFactor, Wholes};

/// Something that can be apportioned a share of an anchor note.
pub trait Apportionable {
    /// Offset from the anchor, in divisions as written
    fn offset_divisions(&self) -> i64;
    /// Offset from the anchor, in whole notes
    fn offset_wholes(&self) -> Wholes;
    fn set_share(&mut self, sounding: Wholes, factor: TupletFactor, position: Wholes);
}

impl Apportionable for Harmony {
    fn offset_divisions(&self) -> i64 {
        self.offset_divisions
    }

    fn offset_wholes(&self) -> Wholes {
        self.offset
    }

    fn set_share(&mut self, sounding: Wholes, factor: TupletFactor, position: Wholes) {
        self.sounding_wholes = sounding;
        self.tuplet_factor = factor;
        self.position_in_measure = position;
    }
}

impl Apportionable for FiguredBass {
    fn offset_divisions(&self) -> i64 {
        self.offset_divisions
    }

    fn offset_wholes(&self) -> Wholes {
        self.offset
    }

    fn set_share(&mut self, sounding: Wholes, factor: TupletFactor, position: Wholes) {
        self.sounding_wholes = sounding;
        self.tuplet_factor = factor;
        self.position_in_measure = position;
    }
}

/// What the elements are apportioned against.
#[derive(Debug, Clone, Copy)]
pub struct Anchor {
    pub sounding_wholes: Wholes,
    /// The anchor's `<duration>`, in divisions
    pub duration_divisions: Option<i64>,
    pub tuplet_factor: TupletFactor,
    pub position: Wholes,
}

/// Split `anchor` between `offsets` (already sorted), returning one duration each.
///
/// Every duration is non-negative and the durations sum to
/// `anchor.sounding_wholes` exactly.
pub fn apportion(anchor: &Anchor, offsets: &[(i64, Wholes)]) -> Vec<Wholes> {
    let total = anchor.sounding_wholes;
    if offsets.len() <= 1 {
        return offsets.iter().map(|_| total).collect();
    }

    let mut durations = Vec::with_capacity(offsets.len());
    let mut sum = wholes::zero();
    for pair in offsets.windows(2) {
        let (this_div, this_wholes) = pair[0];
        let (next_div, next_wholes) = pair[1];
        let share = match anchor.duration_divisions.filter(|d| *d > 0) {
            Some(divisions) => total * Wholes::new(next_div - this_div, divisions),
            None => next_wholes - this_wholes,
        };
        let room = total - sum;
        let share = share.max(Wholes::zero()).min(room);
        sum += share;
        durations.push(share);
    }
    durations.push(total - sum);
    durations
}

/// Pending harmonies or figured basses, waiting for their anchor.
#[derive(Debug)]
pub struct HarmonyAccumulator<T> {
    pending: Vec<T>,
}

impl<T> Default for HarmonyAccumulator<T> {
    fn default() -> Self {
        Self { pending: Vec::new() }
    }
}

impl<T: Apportionable> HarmonyAccumulator<T> {
    pub fn push(&mut self, element: T) {
        self.pending.push(element);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Give every pending element its share of `anchor` and hand them back
    /// in offset order.
    pub fn flush_onto(&mut self, anchor: &Anchor) -> Vec<T> {
        let mut elements = std::mem::take(&mut self.pending);
        // stable: equal offsets keep document order
        elements.sort_by(|a, b| a.offset_wholes().cmp(&b.offset_wholes()));

        let offsets: Vec<(i64, Wholes)> = elements
            .iter()
            .map(|e| (e.offset_divisions(), e.offset_wholes()))
            .collect();
        let durations = apportion(anchor, &offsets);

        let mut position = anchor.position;
        for (element, duration) in elements.iter_mut().zip(durations) {
            element.set_share(duration, anchor.tuplet_factor, position);
            position += duration;
        }
        elements
    }

    /// Hand back elements that never met an anchor, with zero duration at `position`.
    pub fn flush_unanchored(&mut self, position: Wholes) -> Vec<T> {
        let mut elements = std::mem::take(&mut self.pending);
        for element in &mut elements {
            element.set_share(wholes::zero(), TupletFactor::IDENTITY, position);
        }
        elements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wholes::wholes;

    fn harmony(offset_divisions: i64, divisions: i64) -> Harmony {
        Harmony {
            root: None,
            kind: "major".to_string(),
            kind_text: None,
            bass: None,
            inversion: None,
            degrees: Vec::new(),
            offset: wholes::divisions_to_wholes(offset_divisions, divisions),
            offset_divisions,
            sounding_wholes: wholes::zero(),
            tuplet_factor: TupletFactor::IDENTITY,
            position_in_measure: wholes::zero(),
            staff: 1,
            voice: 1,
            line: 0,
        }
    }

    fn anchor(sounding: Wholes, divisions: Option<i64>) -> Anchor {
        Anchor {
            sounding_wholes: sounding,
            duration_divisions: divisions,
            tuplet_factor: TupletFactor::IDENTITY,
            position: wholes(1, 4),
        }
    }

    #[test]
    fn single_harmony_inherits_the_anchor() {
        let mut acc = HarmonyAccumulator::default();
        acc.push(harmony(12, 24));
        let out = acc.flush_onto(&anchor(wholes(1, 1), Some(96)));
        assert_eq!(out[0].sounding_wholes, wholes(1, 1));
        assert_eq!(out[0].position_in_measure, wholes(1, 4));
        assert!(acc.is_empty());
    }

    #[test]
    fn two_harmonies_split_a_whole_note() {
        // divisions = 24: the anchor's <duration>96</duration> is a whole note
        let mut acc = HarmonyAccumulator::default();
        acc.push(harmony(48, 24));
        acc.push(harmony(0, 24));
        let out = acc.flush_onto(&anchor(wholes(1, 1), Some(96)));
        assert_eq!(out[0].offset_divisions, 0);
        assert_eq!(out[0].sounding_wholes, wholes(1, 2));
        assert_eq!(out[1].sounding_wholes, wholes(1, 2));
        assert_eq!(out[1].position_in_measure, wholes(3, 4));
    }

    #[test]
    fn shares_always_sum_to_the_anchor() {
        let a = anchor(wholes(3, 8), Some(6));
        // offsets past the anchor's end get clamped
        let offsets = [(0, wholes(0, 1)), (4, wholes(1, 4)), (20, wholes(5, 4))];
        let durations = apportion(&a, &offsets);
        assert_eq!(durations.iter().fold(wholes(0, 1), |acc, d| acc + *d), wholes(3, 8));
        assert!(durations.iter().all(|d| *d >= wholes(0, 1)));
        assert_eq!(durations[0], wholes(1, 4));
        assert_eq!(durations[1], wholes(1, 8));
        assert_eq!(durations[2], wholes(0, 1));
    }

    #[test]
    fn without_divisions_offsets_are_used_directly() {
        let a = anchor(wholes(1, 2), None);
        let durations = apportion(&a, &[(0, wholes(0, 1)), (1, wholes(1, 8))]);
        assert_eq!(durations, vec![wholes(1, 8), wholes(3, 8)]);
    }

    #[test]
    fn unanchored_harmonies_get_zero_duration() {
        let mut acc = HarmonyAccumulator::default();
        acc.push(harmony(0, 1));
        let out = acc.flush_unanchored(wholes(3, 4));
        assert_eq!(out[0].sounding_wholes, wholes(0, 1));
        assert_eq!(out[0].position_in_measure, wholes(3, 4));
    }
}
