//! MSR — the semantic score model produced by the populator.
//!
//! Notes, chords, tuplets, grace-notes groups and double tremolos live in
//! arenas owned by the [`Score`]; every container (voice measure, chord,
//! tuplet, grace group) refers to its members by typed index. An entity is
//! appended to exactly one container.

pub mod elements;
pub mod note;

use serde::Serialize;

use crate::wholes::{self, TupletFactor, Wholes};

pub use elements::*;
pub use note::*;

// ═══════════════════════════════════════════════════════════════════════
// Arena
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NoteId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChordId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TupletId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GraceNotesGroupId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DoubleTremoloId(pub usize);

/// Storage for every note-level entity of a score.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Arena {
    pub notes: Vec<Note>,
    pub chords: Vec<Chord>,
    pub tuplets: Vec<Tuplet>,
    pub grace_notes_groups: Vec<GraceNotesGroup>,
    pub double_tremolos: Vec<DoubleTremolo>,
}

impl Arena {
    pub fn add_note(&mut self, note: Note) -> NoteId {
        self.notes.push(note);
        NoteId(self.notes.len() - 1)
    }

    pub fn add_chord(&mut self, chord: Chord) -> ChordId {
        self.chords.push(chord);
        ChordId(self.chords.len() - 1)
    }

    pub fn add_tuplet(&mut self, tuplet: Tuplet) -> TupletId {
        self.tuplets.push(tuplet);
        TupletId(self.tuplets.len() - 1)
    }

    pub fn add_grace_notes_group(&mut self, group: GraceNotesGroup) -> GraceNotesGroupId {
        self.grace_notes_groups.push(group);
        GraceNotesGroupId(self.grace_notes_groups.len() - 1)
    }

    pub fn add_double_tremolo(&mut self, tremolo: DoubleTremolo) -> DoubleTremoloId {
        self.double_tremolos.push(tremolo);
        DoubleTremoloId(self.double_tremolos.len() - 1)
    }

    pub fn note(&self, id: NoteId) -> &Note {
        &self.notes[id.0]
    }

    pub fn note_mut(&mut self, id: NoteId) -> &mut Note {
        &mut self.notes[id.0]
    }

    pub fn chord(&self, id: ChordId) -> &Chord {
        &self.chords[id.0]
    }

    pub fn chord_mut(&mut self, id: ChordId) -> &mut Chord {
        &mut self.chords[id.0]
    }

    pub fn tuplet(&self, id: TupletId) -> &Tuplet {
        &self.tuplets[id.0]
    }

    pub fn tuplet_mut(&mut self, id: TupletId) -> &mut Tuplet {
        &mut self.tuplets[id.0]
    }

    pub fn grace_notes_group(&self, id: GraceNotesGroupId) -> &GraceNotesGroup {
        &self.grace_notes_groups[id.0]
    }

    pub fn grace_notes_group_mut(&mut self, id: GraceNotesGroupId) -> &mut GraceNotesGroup {
        &mut self.grace_notes_groups[id.0]
    }

    pub fn double_tremolo(&self, id: DoubleTremoloId) -> &DoubleTremolo {
        &self.double_tremolos[id.0]
    }

    /// Notes of a tuplet in order, descending into chords and nested tuplets.
    pub fn tuplet_notes(&self, id: TupletId) -> Vec<NoteId> {
        let mut result = Vec::new();
        for member in &self.tuplet(id).members {
            match *member {
                TupletMember::Note(n) => result.push(n),
                TupletMember::Chord(c) => result.extend(self.chord(c).notes.iter().copied()),
                TupletMember::Tuplet(t) => result.extend(self.tuplet_notes(t)),
            }
        }
        result
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Score / Part / Staff / Voice
// ═══════════════════════════════════════════════════════════════════════

/// A complete populated score.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Score {
    /// Title of the piece (work title, else movement title)
    pub title: Option<String>,
    /// Composer name
    pub composer: Option<String>,
    /// MusicXML version (e.g., "3.1", "4.0")
    pub version: Option<String>,
    /// Musical parts (instruments)
    pub parts: Vec<Part>,
    /// Every note, chord, tuplet, grace group and double tremolo
    pub arena: Arena,
}

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part(&self, id: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.id == id)
    }

    /// Get the number of measures in the first part.
    pub fn measure_count(&self) -> usize {
        self.parts.first().map_or(0, |p| p.measures.len())
    }
}

/// A musical part (one instrument).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Part {
    /// Part identifier (e.g., "P1")
    pub id: String,
    /// Part name (e.g., "Piano")
    pub name: String,
    /// Abbreviated name (e.g., "Pno.")
    pub abbreviation: Option<String>,
    /// Staves, ordered by number
    pub staves: Vec<Staff>,
    /// Part-level contents, one entry per measure
    pub measures: Vec<PartMeasure>,
    pub repeats: Vec<Repeat>,
    pub multiple_measure_rests: Vec<MultipleMeasureRest>,
    pub measure_repeats: Vec<MeasureRepeat>,
}

/// Part-level contents of one measure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PartMeasure {
    /// Measure number as written (e.g., "1", "X1", "12a")
    pub number: String,
    pub divisions: Option<i64>,
    pub clefs: Vec<Clef>,
    pub key: Option<Key>,
    pub time: Option<TimeSignature>,
    pub transpose: Option<Transpose>,
    pub barlines: Vec<BarLine>,
    pub tempos: Vec<Tempo>,
    pub rehearsal_marks: Vec<RehearsalMark>,
    /// Whether a new system starts here
    pub line_break: bool,
    /// Whether a new page starts here
    pub page_break: bool,
    pub harmonies: Vec<Harmony>,
    pub figured_basses: Vec<FiguredBass>,
}

impl Part {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn staff(&self, number: u32) -> Option<&Staff> {
        self.staves.iter().find(|s| s.number == number)
    }

    pub fn staff_mut(&mut self, number: u32) -> Option<&mut Staff> {
        self.staves.iter_mut().find(|s| s.number == number)
    }

    /// Create the staff if needed; staves stay sorted by number.
    pub fn ensure_staff(&mut self, number: u32) -> &mut Staff {
        let idx = match self.staves.iter().position(|s| s.number == number) {
            Some(idx) => idx,
            None => {
                let idx = self.staves.partition_point(|s| s.number < number);
                self.staves.insert(idx, Staff { number, voices: Vec::new() });
                idx
            }
        };
        &mut self.staves[idx]
    }

    /// Create the voice under `staff` if needed.
    pub fn ensure_voice(&mut self, staff: u32, voice: u32) -> &mut Voice {
        let staff = self.ensure_staff(staff);
        let idx = match staff.voices.iter().position(|v| v.number == voice) {
            Some(idx) => idx,
            None => {
                let idx = staff.voices.partition_point(|v| v.number < voice);
                staff.voices.insert(idx, Voice::new(voice, staff.number));
                idx
            }
        };
        &mut staff.voices[idx]
    }

    pub fn voice(&self, staff: u32, voice: u32) -> Option<&Voice> {
        self.staff(staff)?.voices.iter().find(|v| v.number == voice)
    }

    pub fn voice_mut(&mut self, staff: u32, voice: u32) -> Option<&mut Voice> {
        self.staff_mut(staff)?.voices.iter_mut().find(|v| v.number == voice)
    }

    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.staves.iter().flat_map(|s| s.voices.iter())
    }

    pub fn voices_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.staves.iter_mut().flat_map(|s| s.voices.iter_mut())
    }

    /// Open a new measure in the part and in every voice.
    pub fn create_measure(&mut self, number: &str) {
        self.measures.push(PartMeasure {
            number: number.to_string(),
            ..PartMeasure::default()
        });
        for voice in self.voices_mut() {
            voice.create_measure(number);
        }
    }

    pub fn current_measure(&self) -> Option<&PartMeasure> {
        self.measures.last()
    }

    pub fn current_measure_mut(&mut self) -> Option<&mut PartMeasure> {
        self.measures.last_mut()
    }

    pub fn measure(&self, number: &str) -> Option<&PartMeasure> {
        self.measures.iter().find(|m| m.number == number)
    }

    pub fn first_measure_number(&self) -> Option<&str> {
        self.measures.first().map(|m| m.number.as_str())
    }

    pub fn append_harmony_to_part(&mut self, mut harmony: Harmony, position_in_measure: Wholes) {
        harmony.position_in_measure = position_in_measure;
        if let Some(m) = self.current_measure_mut() {
            m.harmonies.push(harmony);
        }
    }

    pub fn append_figured_bass_to_part(&mut self, mut figured_bass: FiguredBass, position_in_measure: Wholes) {
        figured_bass.position_in_measure = position_in_measure;
        if let Some(m) = self.current_measure_mut() {
            m.figured_basses.push(figured_bass);
        }
    }

    pub fn append_bar_line_to_part(&mut self, barline: BarLine) {
        if let Some(m) = self.current_measure_mut() {
            m.barlines.push(barline);
        }
    }

    pub fn bar_line_mut(&mut self, id: BarLineId) -> Option<&mut BarLine> {
        self.measures
            .iter_mut()
            .rev()
            .flat_map(|m| m.barlines.iter_mut())
            .find(|b| b.id == id)
    }

    pub fn cascade_handle_repeat_start_in_part(&mut self, start_measure: &str) {
        self.repeats.push(Repeat {
            start_measure: start_measure.to_string(),
            end_measure: None,
            times: 2,
            implicit_start: false,
            endings: Vec::new(),
        });
    }

    /// Close the repeat that started at `start_measure`, opening it first
    /// when no start barline was met.
    pub fn cascade_handle_repeat_end_in_part(&mut self, start_measure: &str, end_measure: &str, times: u32) {
        let open = self
            .repeats
            .iter_mut()
            .rev()
            .find(|r| r.end_measure.is_none() && r.start_measure == start_measure);
        match open {
            Some(repeat) => {
                repeat.end_measure = Some(end_measure.to_string());
                repeat.times = times;
            }
            None => self.repeats.push(Repeat {
                start_measure: start_measure.to_string(),
                end_measure: Some(end_measure.to_string()),
                times,
                implicit_start: true,
                endings: Vec::new(),
            }),
        }
    }

    /// Attach an ending to the most recent repeat, creating one if the part has none.
    pub fn append_repeat_ending(&mut self, ending: RepeatEnding) {
        if self.repeats.is_empty() {
            let start = self.first_measure_number().unwrap_or("1").to_string();
            self.repeats.push(Repeat {
                start_measure: start,
                end_measure: None,
                times: 2,
                implicit_start: true,
                endings: Vec::new(),
            });
        }
        if let Some(repeat) = self.repeats.last_mut() {
            repeat.endings.push(ending);
        }
    }
}

/// A staff and the voices living under it.
#[derive(Debug, Clone, Serialize)]
pub struct Staff {
    pub number: u32,
    pub voices: Vec<Voice>,
}

/// A voice: its measures and their ordered elements.
#[derive(Debug, Clone, Serialize)]
pub struct Voice {
    pub number: u32,
    /// The staff the voice lives under
    pub staff_number: u32,
    pub measures: Vec<VoiceMeasure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceMeasure {
    pub number: String,
    pub elements: Vec<VoiceElement>,
    /// Sounding length of what the voice has drawn so far in this measure
    pub position: Wholes,
}

/// One element of a voice's stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum VoiceElement {
    Note(NoteId),
    Chord(ChordId),
    Tuplet(TupletId),
    DoubleTremolo(DoubleTremoloId),
    /// A grace group left without an anchoring note
    GraceNotesGroup(GraceNotesGroupId),
    /// Invisible filler keeping the voice in sync with the part cursor
    Padding { duration: Wholes },
    StaffChange(VoiceStaffChange),
}

impl Voice {
    pub fn new(number: u32, staff_number: u32) -> Self {
        Self {
            number,
            staff_number,
            measures: Vec::new(),
        }
    }

    pub fn create_measure(&mut self, number: &str) {
        self.measures.push(VoiceMeasure {
            number: number.to_string(),
            elements: Vec::new(),
            position: wholes::zero(),
        });
    }

    pub fn current_measure(&self) -> Option<&VoiceMeasure> {
        self.measures.last()
    }

    fn current_measure_mut(&mut self) -> &mut VoiceMeasure {
        if self.measures.is_empty() {
            self.create_measure("");
        }
        let last = self.measures.len() - 1;
        &mut self.measures[last]
    }

    /// Position reached in the current measure.
    pub fn position(&self) -> Wholes {
        self.current_measure().map_or_else(wholes::zero, |m| m.position)
    }

    pub fn advance_position(&mut self, duration: Wholes) {
        self.current_measure_mut().position += duration;
    }

    pub fn append_note(&mut self, note: NoteId) {
        self.current_measure_mut().elements.push(VoiceElement::Note(note));
    }

    pub fn append_chord(&mut self, chord: ChordId) {
        self.current_measure_mut().elements.push(VoiceElement::Chord(chord));
    }

    pub fn append_tuplet(&mut self, tuplet: TupletId) {
        self.current_measure_mut().elements.push(VoiceElement::Tuplet(tuplet));
    }

    pub fn append_double_tremolo(&mut self, tremolo: DoubleTremoloId) {
        self.current_measure_mut()
            .elements
            .push(VoiceElement::DoubleTremolo(tremolo));
    }

    pub fn append_grace_notes_group(&mut self, group: GraceNotesGroupId) {
        self.current_measure_mut()
            .elements
            .push(VoiceElement::GraceNotesGroup(group));
    }

    pub fn append_voice_staff_change(&mut self, change: VoiceStaffChange) {
        self.current_measure_mut()
            .elements
            .push(VoiceElement::StaffChange(change));
    }

    /// Append a padding element and move the voice position past it.
    pub fn append_padding(&mut self, duration: Wholes) {
        let measure = self.current_measure_mut();
        measure.elements.push(VoiceElement::Padding { duration });
        measure.position += duration;
    }

    /// Every element of every measure, in order.
    pub fn elements(&self) -> impl Iterator<Item = &VoiceElement> {
        self.measures.iter().flat_map(|m| m.elements.iter())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Chords, tuplets, grace groups, double tremolos
// ═══════════════════════════════════════════════════════════════════════

/// Notes sounding together.
#[derive(Debug, Clone, Serialize)]
pub struct Chord {
    pub notes: Vec<NoteId>,
    /// Whether the shared attributes below have been copied from the first note
    pub populated_from_first_note: bool,
    pub sounding_wholes: Wholes,
    pub display_wholes: Wholes,
    pub note_type: Option<crate::wholes::NoteType>,
    pub dots: u8,
    pub staff: u32,
    pub voice: u32,
    pub is_grace: bool,
    pub position_in_measure: Wholes,
    pub measure_number: String,
    pub line: u32,
}

impl Chord {
    pub fn new(line: u32, measure_number: &str, is_grace: bool) -> Self {
        Self {
            notes: Vec::new(),
            populated_from_first_note: false,
            sounding_wholes: wholes::zero(),
            display_wholes: wholes::zero(),
            note_type: None,
            dots: 0,
            staff: 1,
            voice: 1,
            is_grace,
            position_in_measure: wholes::zero(),
            measure_number: measure_number.to_string(),
            line,
        }
    }

    pub fn append_note(&mut self, id: NoteId, note: &Note) {
        if !self.populated_from_first_note {
            self.sounding_wholes = note.sounding_wholes;
            self.display_wholes = note.display_wholes;
            self.note_type = note.note_type;
            self.dots = note.dots;
            self.staff = note.staff;
            self.voice = note.voice;
            self.position_in_measure = note.position_in_measure;
            self.populated_from_first_note = true;
        }
        self.notes.push(id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TupletMember {
    Note(NoteId),
    Chord(ChordId),
    Tuplet(TupletId),
}

/// A group of notes played in the time of a different number of notes.
#[derive(Debug, Clone, Serialize)]
pub struct Tuplet {
    pub number: u32,
    pub factor: TupletFactor,
    pub members: Vec<TupletMember>,
    /// Sum of the members' sounding durations
    pub sounding_wholes: Wholes,
    pub position_in_measure: Wholes,
    pub staff: u32,
    pub voice: u32,
    pub measure_number: String,
    pub line: u32,
}

impl Tuplet {
    pub fn new(number: u32, factor: TupletFactor, line: u32, measure_number: &str) -> Self {
        Self {
            number,
            factor,
            members: Vec::new(),
            sounding_wholes: wholes::zero(),
            position_in_measure: wholes::zero(),
            staff: 1,
            voice: 1,
            measure_number: measure_number.to_string(),
            line,
        }
    }

    pub fn append_note(&mut self, id: NoteId, sounding: Wholes) {
        self.members.push(TupletMember::Note(id));
        self.sounding_wholes += sounding;
    }

    /// The chord's duration is folded in when the chord ends.
    pub fn append_chord(&mut self, id: ChordId) {
        self.members.push(TupletMember::Chord(id));
    }

    /// The nested tuplet's duration is folded in when it ends.
    pub fn append_tuplet(&mut self, id: TupletId) {
        self.members.push(TupletMember::Tuplet(id));
    }

    pub fn add_sounding_wholes(&mut self, duration: Wholes) {
        self.sounding_wholes += duration;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GraceMember {
    Note(NoteId),
    Chord(ChordId),
    Tuplet(TupletId),
}

/// How a grace-notes group ended up attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GraceAttachment {
    Pending,
    /// Played before this note
    Before(NoteId),
    /// Played after this note
    After(NoteId),
    /// No anchoring note; appended to the voice on its own
    Standalone,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraceNotesGroup {
    pub members: Vec<GraceMember>,
    pub slashed: bool,
    pub attachment: GraceAttachment,
    pub staff: u32,
    pub voice: u32,
    pub measure_number: String,
    pub line: u32,
}

impl GraceNotesGroup {
    pub fn new(slashed: bool, staff: u32, voice: u32, line: u32, measure_number: &str) -> Self {
        Self {
            members: Vec::new(),
            slashed,
            attachment: GraceAttachment::Pending,
            staff,
            voice,
            measure_number: measure_number.to_string(),
            line,
        }
    }

    pub fn append_note(&mut self, id: NoteId) {
        self.members.push(GraceMember::Note(id));
    }

    pub fn append_chord(&mut self, id: ChordId) {
        self.members.push(GraceMember::Chord(id));
    }

    pub fn append_tuplet(&mut self, id: TupletId) {
        self.members.push(GraceMember::Tuplet(id));
    }
}

/// Two notes alternating rapidly, sharing one written duration.
#[derive(Debug, Clone, Serialize)]
pub struct DoubleTremolo {
    pub first: NoteId,
    pub second: NoteId,
    /// Number of tremolo beams
    pub marks: u8,
    pub sounding_wholes: Wholes,
    pub line: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wholes::wholes;

    #[test]
    fn staves_and_voices_stay_sorted() {
        let mut part = Part::new("P1", "Piano");
        part.ensure_voice(2, 5);
        part.ensure_voice(1, 2);
        part.ensure_voice(1, 1);
        part.ensure_voice(1, 2);

        let staves: Vec<u32> = part.staves.iter().map(|s| s.number).collect();
        assert_eq!(staves, vec![1, 2]);
        let voices: Vec<(u32, u32)> = part.voices().map(|v| (v.staff_number, v.number)).collect();
        assert_eq!(voices, vec![(1, 1), (1, 2), (2, 5)]);
        assert!(part.voice(2, 1).is_none());
    }

    #[test]
    fn measures_cascade_to_voices() {
        let mut part = Part::new("P1", "Flute");
        part.ensure_voice(1, 1);
        part.create_measure("1");
        part.create_measure("2");

        let voice = part.voice(1, 1).unwrap();
        assert_eq!(voice.measures.len(), 2);
        assert_eq!(voice.measures[1].number, "2");
    }

    #[test]
    fn padding_advances_the_voice() {
        let mut voice = Voice::new(1, 1);
        voice.create_measure("1");
        voice.append_padding(wholes(1, 4));
        voice.advance_position(wholes(1, 2));
        assert_eq!(voice.position(), wholes(3, 4));
        assert_eq!(voice.elements().count(), 1);
    }

    #[test]
    fn repeat_end_without_start_is_implicit() {
        let mut part = Part::new("P1", "Violin");
        part.create_measure("1");
        part.cascade_handle_repeat_end_in_part("1", "4", 2);
        assert_eq!(part.repeats.len(), 1);
        assert!(part.repeats[0].implicit_start);

        part.cascade_handle_repeat_start_in_part("5");
        part.cascade_handle_repeat_end_in_part("5", "8", 3);
        assert_eq!(part.repeats[1].end_measure.as_deref(), Some("8"));
        assert_eq!(part.repeats[1].times, 3);
        assert!(!part.repeats[1].implicit_start);
    }
}
