//! The known-events collection.
//!
//! Built by the skeleton pass before population starts, it answers "does a
//! chord / tuplet / grace-notes group / staff change begin or end at note N?"
//! and "does a multiple measure rest / measure repeat begin or end at measure
//! M?" without any local lookahead. Notes are keyed by their sequential
//! number, assigned in document order by both passes.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::wholes::TupletFactor;

/// Sequential number of a `<note>` in the document, starting at 1.
pub type NoteSequentialNumber = u32;

/// Data shared by every note-keyed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteEventHeader {
    /// Registration order across the whole collection
    pub event_sequential_number: u32,
    pub note_sequential_number: NoteSequentialNumber,
    pub staff: u32,
    pub voice: u32,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BeginOrEnd {
    Begin,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChordEvent {
    pub header: NoteEventHeader,
    pub kind: BeginOrEnd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraceEvent {
    pub header: NoteEventHeader,
    pub kind: BeginOrEnd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TupletEvent {
    pub header: NoteEventHeader,
    pub kind: BeginOrEnd,
    pub tuplet_number: u32,
    pub factor: TupletFactor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffChangeEvent {
    pub header: NoteEventHeader,
    pub take_off_staff: u32,
    pub landing_staff: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasureRestEvent {
    pub event_sequential_number: u32,
    pub kind: BeginOrEnd,
    pub measure_number: String,
    /// Number of measures in the run
    pub count: u32,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasureRepeatEvent {
    pub event_sequential_number: u32,
    pub kind: BeginOrEnd,
    pub measure_number: String,
    /// Number of measures repeated
    pub measures: u32,
    pub slashes: u32,
    pub line: u32,
}

/// The events attached to one note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteEvents {
    pub chord_begin: bool,
    pub chord_end: bool,
    pub grace_begin: bool,
    pub grace_end: bool,
    /// Outermost first
    pub tuplet_begins: Vec<TupletEvent>,
    /// Innermost first
    pub tuplet_ends: Vec<TupletEvent>,
    /// The staff change taking off at this note
    pub staff_change: Option<StaffChangeEvent>,
}

/// All events known for one part.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KnownEvents {
    current_event_sequential_number: u32,

    chord_begins: BTreeMap<NoteSequentialNumber, ChordEvent>,
    chord_ends: BTreeMap<NoteSequentialNumber, ChordEvent>,

    grace_begins: BTreeMap<NoteSequentialNumber, GraceEvent>,
    grace_ends: BTreeMap<NoteSequentialNumber, GraceEvent>,

    // several tuplets may begin or end on the same note
    tuplet_begins: BTreeMap<NoteSequentialNumber, Vec<TupletEvent>>,
    tuplet_ends: BTreeMap<NoteSequentialNumber, Vec<TupletEvent>>,

    staff_change_take_offs: BTreeMap<NoteSequentialNumber, StaffChangeEvent>,

    measure_rest_begins: BTreeMap<String, MeasureRestEvent>,
    measure_rest_ends: BTreeMap<String, MeasureRestEvent>,

    measure_repeat_begins: BTreeMap<String, MeasureRepeatEvent>,
    measure_repeat_ends: BTreeMap<String, MeasureRepeatEvent>,
}

impl KnownEvents {
    pub fn new() -> Self {
        Self::default()
    }

    fn header(
        &mut self,
        note: NoteSequentialNumber,
        staff: u32,
        voice: u32,
        line: u32,
    ) -> NoteEventHeader {
        self.current_event_sequential_number += 1;
        NoteEventHeader {
            event_sequential_number: self.current_event_sequential_number,
            note_sequential_number: note,
            staff,
            voice,
            line,
        }
    }

    /// Total number of events registered so far.
    pub fn len(&self) -> usize {
        self.current_event_sequential_number as usize
    }

    pub fn is_empty(&self) -> bool {
        self.current_event_sequential_number == 0
    }

    // ─── Registration ────────────────────────────────────────────────

    pub fn register_chord_begin(&mut self, note: NoteSequentialNumber, staff: u32, voice: u32, line: u32) {
        let header = self.header(note, staff, voice, line);
        self.chord_begins.insert(note, ChordEvent { header, kind: BeginOrEnd::Begin });
    }

    pub fn register_chord_end(&mut self, note: NoteSequentialNumber, staff: u32, voice: u32, line: u32) {
        let header = self.header(note, staff, voice, line);
        self.chord_ends.insert(note, ChordEvent { header, kind: BeginOrEnd::End });
    }

    pub fn register_grace_begin(&mut self, note: NoteSequentialNumber, staff: u32, voice: u32, line: u32) {
        let header = self.header(note, staff, voice, line);
        self.grace_begins.insert(note, GraceEvent { header, kind: BeginOrEnd::Begin });
    }

    pub fn register_grace_end(&mut self, note: NoteSequentialNumber, staff: u32, voice: u32, line: u32) {
        let header = self.header(note, staff, voice, line);
        self.grace_ends.insert(note, GraceEvent { header, kind: BeginOrEnd::End });
    }

    /// Tuplet begins at one note are kept outermost first, in registration order.
    #[allow(clippy::too_many_arguments)]
    pub fn register_tuplet_begin(
        &mut self,
        note: NoteSequentialNumber,
        staff: u32,
        voice: u32,
        line: u32,
        tuplet_number: u32,
        factor: TupletFactor,
    ) {
        let header = self.header(note, staff, voice, line);
        self.tuplet_begins.entry(note).or_default().push(TupletEvent {
            header,
            kind: BeginOrEnd::Begin,
            tuplet_number,
            factor,
        });
    }

    /// Tuplet ends at one note are kept innermost first, in registration order.
    #[allow(clippy::too_many_arguments)]
    pub fn register_tuplet_end(
        &mut self,
        note: NoteSequentialNumber,
        staff: u32,
        voice: u32,
        line: u32,
        tuplet_number: u32,
        factor: TupletFactor,
    ) {
        let header = self.header(note, staff, voice, line);
        self.tuplet_ends.entry(note).or_default().push(TupletEvent {
            header,
            kind: BeginOrEnd::End,
            tuplet_number,
            factor,
        });
    }

    pub fn register_staff_change_take_off(
        &mut self,
        note: NoteSequentialNumber,
        voice: u32,
        line: u32,
        take_off_staff: u32,
        landing_staff: u32,
    ) {
        let header = self.header(note, landing_staff, voice, line);
        self.staff_change_take_offs.insert(
            note,
            StaffChangeEvent {
                header,
                take_off_staff,
                landing_staff,
            },
        );
    }

    pub fn register_measure_rest_begin(&mut self, measure_number: &str, count: u32, line: u32) {
        self.current_event_sequential_number += 1;
        self.measure_rest_begins.insert(
            measure_number.to_string(),
            MeasureRestEvent {
                event_sequential_number: self.current_event_sequential_number,
                kind: BeginOrEnd::Begin,
                measure_number: measure_number.to_string(),
                count,
                line,
            },
        );
    }

    pub fn register_measure_rest_end(&mut self, measure_number: &str, count: u32, line: u32) {
        self.current_event_sequential_number += 1;
        self.measure_rest_ends.insert(
            measure_number.to_string(),
            MeasureRestEvent {
                event_sequential_number: self.current_event_sequential_number,
                kind: BeginOrEnd::End,
                measure_number: measure_number.to_string(),
                count,
                line,
            },
        );
    }

    pub fn register_measure_repeat_begin(&mut self, measure_number: &str, measures: u32, slashes: u32, line: u32) {
        self.current_event_sequential_number += 1;
        self.measure_repeat_begins.insert(
            measure_number.to_string(),
            MeasureRepeatEvent {
                event_sequential_number: self.current_event_sequential_number,
                kind: BeginOrEnd::Begin,
                measure_number: measure_number.to_string(),
                measures,
                slashes,
                line,
            },
        );
    }

    pub fn register_measure_repeat_end(&mut self, measure_number: &str, measures: u32, slashes: u32, line: u32) {
        self.current_event_sequential_number += 1;
        self.measure_repeat_ends.insert(
            measure_number.to_string(),
            MeasureRepeatEvent {
                event_sequential_number: self.current_event_sequential_number,
                kind: BeginOrEnd::End,
                measure_number: measure_number.to_string(),
                measures,
                slashes,
                line,
            },
        );
    }

    // ─── Lookup ──────────────────────────────────────────────────────

    pub fn fetch_chord_begin_at(&self, note: NoteSequentialNumber) -> Option<&ChordEvent> {
        self.chord_begins.get(&note)
    }

    pub fn fetch_chord_end_at(&self, note: NoteSequentialNumber) -> Option<&ChordEvent> {
        self.chord_ends.get(&note)
    }

    pub fn fetch_grace_begin_at(&self, note: NoteSequentialNumber) -> Option<&GraceEvent> {
        self.grace_begins.get(&note)
    }

    pub fn fetch_grace_end_at(&self, note: NoteSequentialNumber) -> Option<&GraceEvent> {
        self.grace_ends.get(&note)
    }

    pub fn fetch_tuplet_begins_at(&self, note: NoteSequentialNumber) -> &[TupletEvent] {
        self.tuplet_begins.get(&note).map_or(&[], Vec::as_slice)
    }

    pub fn fetch_tuplet_ends_at(&self, note: NoteSequentialNumber) -> &[TupletEvent] {
        self.tuplet_ends.get(&note).map_or(&[], Vec::as_slice)
    }

    pub fn fetch_staff_change_take_off_at(&self, note: NoteSequentialNumber) -> Option<&StaffChangeEvent> {
        self.staff_change_take_offs.get(&note)
    }

    pub fn fetch_measure_rest_begin_at(&self, measure_number: &str) -> Option<&MeasureRestEvent> {
        self.measure_rest_begins.get(measure_number)
    }

    pub fn fetch_measure_rest_end_at(&self, measure_number: &str) -> Option<&MeasureRestEvent> {
        self.measure_rest_ends.get(measure_number)
    }

    pub fn fetch_measure_repeat_begin_at(&self, measure_number: &str) -> Option<&MeasureRepeatEvent> {
        self.measure_repeat_begins.get(measure_number)
    }

    pub fn fetch_measure_repeat_end_at(&self, measure_number: &str) -> Option<&MeasureRepeatEvent> {
        self.measure_repeat_ends.get(measure_number)
    }

    /// Everything known about note `note`, copied out so the caller can
    /// mutate the score while acting on it.
    pub fn note_events(&self, note: NoteSequentialNumber) -> NoteEvents {
        NoteEvents {
            chord_begin: self.chord_begins.contains_key(&note),
            chord_end: self.chord_ends.contains_key(&note),
            grace_begin: self.grace_begins.contains_key(&note),
            grace_end: self.grace_ends.contains_key(&note),
            tuplet_begins: self.fetch_tuplet_begins_at(note).to_vec(),
            tuplet_ends: self.fetch_tuplet_ends_at(note).to_vec(),
            staff_change: self.fetch_staff_change_take_off_at(note).cloned(),
        }
    }

    pub fn chord_begins(&self) -> impl Iterator<Item = &ChordEvent> {
        self.chord_begins.values()
    }

    pub fn chord_ends(&self) -> impl Iterator<Item = &ChordEvent> {
        self.chord_ends.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuplet_events_keep_registration_order_per_note() {
        let mut events = KnownEvents::new();
        events.register_tuplet_begin(5, 1, 1, 10, 1, TupletFactor::new(5, 4));
        events.register_tuplet_begin(5, 1, 1, 10, 2, TupletFactor::new(3, 2));
        events.register_tuplet_end(9, 1, 1, 14, 2, TupletFactor::new(3, 2));

        let begins: Vec<u32> = events.fetch_tuplet_begins_at(5).iter().map(|e| e.tuplet_number).collect();
        assert_eq!(begins, vec![1, 2]);
        assert_eq!(events.fetch_tuplet_ends_at(9).len(), 1);
        assert!(events.fetch_tuplet_ends_at(5).is_empty());
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn event_sequential_numbers_increase_across_kinds() {
        let mut events = KnownEvents::new();
        events.register_chord_begin(1, 1, 1, 3);
        events.register_grace_begin(4, 1, 1, 8);
        events.register_measure_rest_begin("7", 4, 20);

        assert_eq!(events.fetch_chord_begin_at(1).unwrap().header.event_sequential_number, 1);
        assert_eq!(events.fetch_grace_begin_at(4).unwrap().header.event_sequential_number, 2);
        assert_eq!(events.fetch_measure_rest_begin_at("7").unwrap().event_sequential_number, 3);
        assert!(events.fetch_chord_end_at(1).is_none());
    }

    #[test]
    fn staff_changes_carry_both_staves() {
        let mut events = KnownEvents::new();
        events.register_staff_change_take_off(12, 1, 40, 1, 2);
        let e = events.fetch_staff_change_take_off_at(12).unwrap();
        assert_eq!((e.take_off_staff, e.landing_staff), (1, 2));
        assert_eq!(e.header.staff, 2);
    }
}
