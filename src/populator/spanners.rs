//! Spanner matching and the pending-decoration queues.
//!
//! Decorations met before their note is finalized wait in one FIFO per
//! kind. Spanners are matched as the queues drain: every start/stop pair
//! that meets gets one shared [`SpannerId`].

use std::collections::BTreeMap;

use crate::msr::{
    Articulation, Beam, Coda, Dynamic, Fermata, LineSpanner, NoteId, OctaveShift, Ornament,
    Pedal, Placement, RehearsalMark, Scordatura, Segno, SlashMark, Slur, SpannerId, Tempo,
    Technical, Tie, Wedge, Words, BarLine,
};

// ═══════════════════════════════════════════════════════════════════════
// Pending queues
// ═══════════════════════════════════════════════════════════════════════

/// Note-level decorations waiting for the next finalized note, and
/// part-level elements waiting for the current part measure.
#[derive(Debug, Default)]
pub struct PendingQueues {
    pub ties: Vec<Tie>,
    pub articulations: Vec<Articulation>,
    pub ornaments: Vec<Ornament>,
    pub technicals: Vec<Technical>,
    pub fermatas: Vec<Fermata>,
    pub segnos: Vec<Segno>,
    pub codas: Vec<Coda>,
    pub dynamics: Vec<Dynamic>,
    pub words: Vec<Words>,
    pub wedges: Vec<Wedge>,
    pub beams: Vec<Beam>,
    pub slurs: Vec<Slur>,
    pub ligatures: Vec<LineSpanner>,
    pub pedals: Vec<Pedal>,
    pub slashes: Vec<SlashMark>,
    pub glissandos: Vec<LineSpanner>,
    pub slides: Vec<LineSpanner>,
    pub wavy_lines: Vec<LineSpanner>,
    pub octave_shifts: Vec<OctaveShift>,
    pub scordaturas: Vec<Scordatura>,

    pub rehearsal_marks: Vec<RehearsalMark>,
    pub tempos: Vec<Tempo>,
    pub line_breaks: usize,
    pub page_breaks: usize,
    pub bar_lines: Vec<BarLine>,
}

impl PendingQueues {
    /// Whether any note-level decoration is waiting.
    pub fn has_note_level(&self) -> bool {
        self.note_level_len() > 0
    }

    pub fn note_level_len(&self) -> usize {
        self.ties.len()
            + self.articulations.len()
            + self.ornaments.len()
            + self.technicals.len()
            + self.fermatas.len()
            + self.segnos.len()
            + self.codas.len()
            + self.dynamics.len()
            + self.words.len()
            + self.wedges.len()
            + self.beams.len()
            + self.slurs.len()
            + self.ligatures.len()
            + self.pedals.len()
            + self.slashes.len()
            + self.glissandos.len()
            + self.slides.len()
            + self.wavy_lines.len()
            + self.octave_shifts.len()
            + self.scordaturas.len()
    }

    pub fn clear_note_level(&mut self) {
        let part_level = PendingQueues {
            rehearsal_marks: std::mem::take(&mut self.rehearsal_marks),
            tempos: std::mem::take(&mut self.tempos),
            line_breaks: self.line_breaks,
            page_breaks: self.page_breaks,
            bar_lines: std::mem::take(&mut self.bar_lines),
            ..PendingQueues::default()
        };
        *self = part_level;
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Spanner matching
// ═══════════════════════════════════════════════════════════════════════

/// Spanner families matched by number (ligatures: by placement).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpannerFamily {
    Wedge,
    Glissando,
    Slide,
    OctaveShift,
    WavyLine,
    Ligature,
}

#[derive(Debug, Clone, Copy)]
struct OpenSlur {
    number: Option<u32>,
    placement: Option<Placement>,
    note: NoteId,
    index: usize,
    spanner: SpannerId,
    phrasing: bool,
}

/// Result of stopping a slur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlurStop {
    pub spanner: SpannerId,
    /// The stopped slur had been turned into a phrasing slur
    pub phrasing: bool,
    /// The enclosing slur's start, now a phrasing slur
    pub reclassified_outer: Option<(NoteId, usize)>,
}

/// Outcome of starting a spanner whose slot was already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Displaced {
    pub spanner: SpannerId,
}

#[derive(Debug, Default)]
pub struct SpannerState {
    next_spanner: u32,
    slurs: Vec<OpenSlur>,
    open: BTreeMap<(SpannerFamily, u32), SpannerId>,
}

const MAX_OPEN_SLURS: usize = 2;

impl SpannerState {
    fn next_id(&mut self) -> SpannerId {
        self.next_spanner += 1;
        SpannerId(self.next_spanner)
    }

    /// Open a slur whose start sits at `note.slurs[index]`.
    ///
    /// Returns the new id, and the displaced outermost slur when two were
    /// already open.
    pub fn start_slur(
        &mut self,
        number: Option<u32>,
        placement: Option<Placement>,
        note: NoteId,
        index: usize,
    ) -> (SpannerId, Option<Displaced>) {
        let displaced = if self.slurs.len() >= MAX_OPEN_SLURS {
            let outer = self.slurs.remove(0);
            Some(Displaced { spanner: outer.spanner })
        } else {
            None
        };
        let spanner = self.next_id();
        self.slurs.push(OpenSlur {
            number,
            placement,
            note,
            index,
            spanner,
            phrasing: false,
        });
        (spanner, displaced)
    }

    /// Match a slur stop: explicit number first, then placement, then the
    /// innermost open slur. `None` when no slur is open.
    pub fn stop_slur(&mut self, number: Option<u32>, placement: Option<Placement>) -> Option<SlurStop> {
        let pos = match (number, placement) {
            (Some(n), _) => self.slurs.iter().rposition(|s| s.number.unwrap_or(1) == n),
            (None, Some(p)) => self
                .slurs
                .iter()
                .rposition(|s| s.placement == Some(p))
                .or_else(|| self.slurs.len().checked_sub(1)),
            (None, None) => self.slurs.len().checked_sub(1),
        }?;

        let reclassified_outer = if self.slurs.len() == MAX_OPEN_SLURS && pos == 1 {
            let outer = &mut self.slurs[0];
            if outer.phrasing {
                None
            } else {
                outer.phrasing = true;
                Some((outer.note, outer.index))
            }
        } else {
            None
        };
        let stopped = self.slurs.remove(pos);
        Some(SlurStop {
            spanner: stopped.spanner,
            phrasing: stopped.phrasing,
            reclassified_outer,
        })
    }

    /// The id a slur continuation belongs to.
    pub fn continue_slur(&self, number: Option<u32>) -> Option<SpannerId> {
        match number {
            Some(n) => self.slurs.iter().rev().find(|s| s.number.unwrap_or(1) == n),
            None => self.slurs.last(),
        }
        .map(|s| s.spanner)
    }

    /// Open a numbered spanner. A spanner already open under the same key
    /// is displaced.
    pub fn start(&mut self, family: SpannerFamily, key: u32) -> (SpannerId, Option<Displaced>) {
        let spanner = self.next_id();
        let displaced = self
            .open
            .insert((family, key), spanner)
            .map(|spanner| Displaced { spanner });
        (spanner, displaced)
    }

    /// Close a numbered spanner; `None` for an unmatched stop.
    pub fn stop(&mut self, family: SpannerFamily, key: u32) -> Option<SpannerId> {
        self.open.remove(&(family, key))
    }

    pub fn current(&self, family: SpannerFamily, key: u32) -> Option<SpannerId> {
        self.open.get(&(family, key)).copied()
    }

    /// Key used for ligatures: one open ligature per placement.
    pub fn placement_key(placement: Option<Placement>) -> u32 {
        match placement {
            None => 0,
            Some(Placement::Above) => 1,
            Some(Placement::Below) => 2,
        }
    }

    pub fn reset(&mut self) {
        self.slurs.clear();
        self.open.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_slur_stop_turns_outer_into_phrasing() {
        let mut state = SpannerState::default();
        let (outer, _) = state.start_slur(Some(1), None, NoteId(0), 0);
        let (inner, _) = state.start_slur(Some(2), None, NoteId(1), 0);

        let stop = state.stop_slur(Some(2), None).unwrap();
        assert_eq!(stop.spanner, inner);
        assert_eq!(stop.reclassified_outer, Some((NoteId(0), 0)));

        let stop = state.stop_slur(Some(1), None).unwrap();
        assert_eq!(stop.spanner, outer);
        assert!(stop.phrasing);
        assert_eq!(stop.reclassified_outer, None);
    }

    #[test]
    fn slur_stop_matching_order() {
        let mut state = SpannerState::default();
        let (above, _) = state.start_slur(None, Some(Placement::Above), NoteId(0), 0);
        let (below, _) = state.start_slur(None, Some(Placement::Below), NoteId(0), 1);
        assert_eq!(state.stop_slur(None, Some(Placement::Above)).map(|s| s.spanner), Some(above));
        assert_eq!(state.stop_slur(None, None).map(|s| s.spanner), Some(below));
        assert_eq!(state.stop_slur(None, None), None);
    }

    #[test]
    fn third_slur_displaces_the_outermost() {
        let mut state = SpannerState::default();
        let (first, _) = state.start_slur(Some(1), None, NoteId(0), 0);
        state.start_slur(Some(2), None, NoteId(1), 0);
        let (_, displaced) = state.start_slur(Some(3), None, NoteId(2), 0);
        assert_eq!(displaced, Some(Displaced { spanner: first }));
        assert_eq!(state.stop_slur(Some(1), None), None);
    }

    #[test]
    fn numbered_spanners_pair_by_family_and_number() {
        let mut state = SpannerState::default();
        let (wedge, _) = state.start(SpannerFamily::Wedge, 1);
        let (gliss, _) = state.start(SpannerFamily::Glissando, 1);
        assert_eq!(state.current(SpannerFamily::Wedge, 1), Some(wedge));
        assert_eq!(state.stop(SpannerFamily::Wedge, 1), Some(wedge));
        assert_eq!(state.stop(SpannerFamily::Wedge, 1), None);
        assert_eq!(state.stop(SpannerFamily::Glissando, 1), Some(gliss));
    }

    #[test]
    fn clearing_note_level_keeps_part_level() {
        let mut queues = PendingQueues::default();
        queues.rehearsal_marks.push(RehearsalMark { text: "A".into(), line: 1 });
        queues.segnos.push(Segno { staff: 1, line: 1 });
        assert!(queues.has_note_level());
        queues.clear_note_level();
        assert!(!queues.has_note_level());
        assert_eq!(queues.rehearsal_marks.len(), 1);
    }
}
