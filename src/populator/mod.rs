//! Population pass — the second walk over the MXSR tree.
//!
//! Starting from the skeleton (parts, staves, voices and known events), the
//! populator browses the tree once more and fills each voice with notes,
//! chords, tuplets, grace-notes groups and two-note tremolos, and each part
//! with its attributes, barlines, repeats, harmonies, figured basses and
//! part-level directions.
//!
//! Elements that carry several children worth of data (`<note>`,
//! `<direction>`, `<barline>`) are gathered into an accumulator while they
//! are open, and flushed when they close. Pending decorations are queued
//! and drained onto the next note.

pub mod barline;
pub mod directions;
pub mod grouping;
pub mod harmony;
pub mod note;
pub mod routing;
pub mod spanners;

use std::collections::BTreeMap;

use crate::error::{Diagnostic, DiagnosticCategory, Diagnostics, PopulateError};
use crate::events::{KnownEvents, NoteEvents, NoteSequentialNumber};
use crate::msr::{
    Clef, ClefSign, Figure, FiguredBass, GraceAttachment, Harmony, HarmonyDegree, HarmonyRoot, Key,
    MeasureRepeat, MultipleMeasureRest, NoteId, Part, Score, TimeSignature, Transpose, Voice,
};
use crate::mxsr::{browse, ElementKind, MxsrElement, Visit, Visitor};
use crate::options::PopulateOptions;
use crate::skeleton::Skeleton;
use crate::wholes::{self, TupletFactor, Wholes};

use self::barline::{classify, BarLineAccumulator, BarLineOutcome, RepeatEffect, RepeatTracker};
use self::directions::DirectionAccumulator;
use self::grouping::GroupingState;
use self::harmony::HarmonyAccumulator;
use self::note::NoteAccumulator;
use self::routing::{RoutingState, VoiceKey};
use self::spanners::{PendingQueues, SpannerState};

/// Populate the skeleton from the MXSR tree it was built from.
///
/// Returns the finished score and the recoverable problems met on the way.
pub fn populate(
    skeleton: Skeleton,
    root: &MxsrElement,
    options: &PopulateOptions,
) -> Result<(Score, Diagnostics), PopulateError> {
    let mut populator = SkeletonPopulator::new(skeleton, options);
    browse(root, &mut populator)?;
    log::debug!(
        "populated {} part(s), {} note(s), {} diagnostic(s)",
        populator.score.parts.len(),
        populator.score.arena.notes.len(),
        populator.diagnostics.len()
    );
    Ok((populator.score, populator.diagnostics))
}

pub(crate) fn structural_error(part: &str, measure: &str, line: u32, message: impl Into<String>) -> PopulateError {
    PopulateError::Structural {
        line,
        part: part.to_string(),
        measure: measure.to_string(),
        message: message.into(),
    }
}

/// The voice `key` of part `part_index`, borrowed from the parts alone.
pub(crate) fn voice_in(parts: &mut [Part], part_index: usize, key: VoiceKey) -> Option<&mut Voice> {
    parts.get_mut(part_index)?.voice_mut(key.staff, key.voice)
}

/// The element currently being gathered, if any.
#[derive(Debug)]
enum Block {
    None,
    Note(Box<NoteAccumulator>),
    Direction(DirectionAccumulator),
    Barline(BarLineAccumulator),
}

pub struct SkeletonPopulator<'a> {
    options: &'a PopulateOptions,
    score: Score,
    events: BTreeMap<String, KnownEvents>,
    diagnostics: Diagnostics,

    part_index: Option<usize>,
    part_id: String,
    measure_number: String,
    divisions: Option<i64>,
    divisions_warned: bool,
    note_sequential_number: NoteSequentialNumber,

    routing: RoutingState,
    grouping: GroupingState,
    spanners: SpannerState,
    pending: PendingQueues,
    harmonies: HarmonyAccumulator<Harmony>,
    figured_basses: HarmonyAccumulator<FiguredBass>,
    repeats: RepeatTracker,
    block: Block,

    /// Last non-grace note of the current measure, any voice
    last_note_in_measure: Option<NoteId>,
    /// Last non-grace note per voice
    last_regular_notes: BTreeMap<VoiceKey, NoteId>,
    /// Two-note tremolo start waiting for its stop: voice, note, beams
    pending_double_tremolo: Option<(VoiceKey, NoteId, u8)>,
}

impl<'a> SkeletonPopulator<'a> {
    pub fn new(skeleton: Skeleton, options: &'a PopulateOptions) -> Self {
        Self {
            options,
            score: skeleton.score,
            events: skeleton.events,
            diagnostics: Diagnostics::new(),
            part_index: None,
            part_id: String::new(),
            measure_number: String::new(),
            divisions: None,
            divisions_warned: false,
            note_sequential_number: 0,
            routing: RoutingState::default(),
            grouping: GroupingState::default(),
            spanners: SpannerState::default(),
            pending: PendingQueues::default(),
            harmonies: HarmonyAccumulator::default(),
            figured_basses: HarmonyAccumulator::default(),
            repeats: RepeatTracker::default(),
            block: Block::None,
            last_note_in_measure: None,
            last_regular_notes: BTreeMap::new(),
            pending_double_tremolo: None,
        }
    }

    // ─── Helpers ─────────────────────────────────────────────────────

    fn diagnostic(&mut self, category: DiagnosticCategory, line: u32, message: String) {
        self.diagnostics.push(Diagnostic {
            category,
            line,
            part: self.part_id.clone(),
            measure: self.measure_number.clone(),
            message,
        });
    }

    pub(crate) fn warn(&mut self, line: u32, message: impl Into<String>) {
        self.diagnostic(DiagnosticCategory::Semantic, line, message.into());
    }

    pub(crate) fn warn_data_consistency(&mut self, line: u32, message: impl Into<String>) {
        self.diagnostic(DiagnosticCategory::DataConsistency, line, message.into());
    }

    pub(crate) fn structural(&self, line: u32, message: impl Into<String>) -> PopulateError {
        structural_error(&self.part_id, &self.measure_number, line, message)
    }

    pub(crate) fn current_part_index(&self, line: u32) -> Result<usize, PopulateError> {
        self.part_index
            .ok_or_else(|| self.structural(line, "content found outside of any <part>"))
    }

    /// Current `<divisions>`; 1 when none was given, with a single warning.
    pub(crate) fn divisions(&mut self, line: u32) -> i64 {
        match self.divisions {
            Some(d) => d,
            None => {
                if !self.divisions_warned {
                    self.divisions_warned = true;
                    self.warn(line, "no <divisions> before the first duration, assuming 1");
                }
                1
            }
        }
    }

    fn to_wholes(&mut self, duration: i64, line: u32) -> Wholes {
        let divisions = self.divisions(line);
        wholes::divisions_to_wholes(duration, divisions)
    }

    pub(crate) fn note_events(&self, note: NoteSequentialNumber) -> NoteEvents {
        self.events
            .get(&self.part_id)
            .map(|e| e.note_events(note))
            .unwrap_or_default()
    }

    /// Move tempos, rehearsal marks, breaks and barlines into the current measure.
    pub(crate) fn drain_part_level_queues(&mut self) {
        let Some(index) = self.part_index else {
            return;
        };
        let q = &mut self.pending;
        let Some(measure) = self.score.parts[index].current_measure_mut() else {
            return;
        };
        measure.tempos.append(&mut q.tempos);
        measure.rehearsal_marks.append(&mut q.rehearsal_marks);
        measure.barlines.append(&mut q.bar_lines);
        if q.line_breaks > 0 {
            measure.line_break = true;
            q.line_breaks = 0;
        }
        if q.page_breaks > 0 {
            measure.page_break = true;
            q.page_breaks = 0;
        }
    }

    /// The voice a direction-like element belongs to.
    fn recipient_voice(&self, index: usize, staff: Option<u32>, voice: Option<u32>) -> Option<VoiceKey> {
        let part = &self.score.parts[index];
        match voice {
            Some(voice) => RoutingState::resolve(part, staff.unwrap_or(1), voice),
            None => self.routing.recipient_on_staff(part, staff),
        }
    }

    // ─── Parts and measures ──────────────────────────────────────────

    fn enter_part(&mut self, element: &MxsrElement) -> Result<(), PopulateError> {
        let id = element.attribute("id").unwrap_or("");
        self.part_id = id.to_string();
        self.measure_number.clear();
        let index = self
            .score
            .parts
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| self.structural(element.line, format!("part '{id}' is missing from the skeleton")))?;
        self.part_index = Some(index);

        self.divisions = None;
        self.divisions_warned = false;
        self.routing = RoutingState::default();
        self.grouping = GroupingState::default();
        self.spanners.reset();
        self.repeats.reset();
        self.pending = PendingQueues::default();
        self.last_note_in_measure = None;
        self.last_regular_notes.clear();
        self.pending_double_tremolo = None;
        log::debug!("populating part {id}");
        Ok(())
    }

    fn enter_measure(&mut self, element: &MxsrElement) -> Result<(), PopulateError> {
        let index = self.current_part_index(element.line)?;
        let number = element.attribute("number").unwrap_or("").to_string();
        self.measure_number = number.clone();
        self.routing.reset_for_measure();
        self.last_note_in_measure = None;

        let events = self.events.get(&self.part_id);
        let rest_begin = events.and_then(|e| e.fetch_measure_rest_begin_at(&number)).cloned();
        let rest_end = events.and_then(|e| e.fetch_measure_rest_end_at(&number)).is_some();
        let repeat_begin = events.and_then(|e| e.fetch_measure_repeat_begin_at(&number)).cloned();
        let repeat_end = events.and_then(|e| e.fetch_measure_repeat_end_at(&number)).is_some();

        let part = &mut self.score.parts[index];
        part.create_measure(&number);
        if let Some(divisions) = self.divisions {
            if let Some(measure) = part.current_measure_mut() {
                measure.divisions = Some(divisions);
            }
        }

        if let Some(begin) = rest_begin {
            part.multiple_measure_rests.push(MultipleMeasureRest {
                start_measure: number.clone(),
                end_measure: None,
                count: begin.count,
            });
        }
        if rest_end {
            if let Some(rest) = part.multiple_measure_rests.iter_mut().rev().find(|r| r.end_measure.is_none()) {
                rest.end_measure = Some(number.clone());
            }
        }
        if let Some(begin) = repeat_begin {
            part.measure_repeats.push(MeasureRepeat {
                start_measure: number.clone(),
                end_measure: None,
                measures: begin.measures,
                slashes: begin.slashes,
            });
        }
        if repeat_end {
            let open = part.measure_repeats.iter_mut().rev().find(|r| r.end_measure.is_none());
            let closed = match open {
                Some(repeat) => {
                    repeat.end_measure = Some(number);
                    true
                }
                None => false,
            };
            if !closed {
                self.warn(element.line, "measure repeat stop with no start");
            }
        }
        Ok(())
    }

    /// Flush what the measure left pending.
    fn finalize_measure(&mut self, line: u32) -> Result<(), PopulateError> {
        let index = self.current_part_index(line)?;

        if let Some((key, note, _)) = self.pending_double_tremolo.take() {
            self.warn(line, "double tremolo start with no stop in its measure");
            self.reroute_orphan_tremolo_note(index, key, note);
        }

        for (key, target) in self.routing.take_forwarded() {
            if let Some(voice) = voice_in(&mut self.score.parts, index, key) {
                let lag = target - voice.position();
                if lag > wholes::zero() {
                    voice.append_padding(lag);
                }
            }
        }

        for (key, group) in self.grouping.take_unattached_grace_groups() {
            let previous = self
                .last_regular_notes
                .get(&key)
                .copied()
                .filter(|id| self.score.arena.note(*id).measure_number == self.measure_number);
            match previous {
                Some(note) => {
                    self.score.arena.note_mut(note).grace_notes_group_after = Some(group);
                    self.score.arena.grace_notes_group_mut(group).attachment = GraceAttachment::After(note);
                }
                None => {
                    if let Some(voice) = voice_in(&mut self.score.parts, index, key) {
                        voice.append_grace_notes_group(group);
                    }
                    self.score.arena.grace_notes_group_mut(group).attachment = GraceAttachment::Standalone;
                    self.warn(line, "grace notes with no note to attach to in their voice");
                }
            }
        }

        let position = self.routing.cursor;
        let harmonies = self.harmonies.flush_unanchored(position);
        let figured_basses = self.figured_basses.flush_unanchored(position);
        for harmony in harmonies {
            self.warn(harmony.line, "harmony with no following note, given zero duration");
            self.score.parts[index].append_harmony_to_part(harmony, position);
        }
        for figured_bass in figured_basses {
            self.warn(figured_bass.line, "figured bass with no following note, given zero duration");
            self.score.parts[index].append_figured_bass_to_part(figured_bass, position);
        }

        if self.pending.has_note_level() {
            if let Some(note) = self.last_note_in_measure {
                self.finalize_note(note);
            }
        }
        self.drain_part_level_queues();
        Ok(())
    }

    fn finalize_part(&mut self, line: u32) -> Result<(), PopulateError> {
        let index = self.current_part_index(line)?;
        if let Some((key, note, _)) = self.pending_double_tremolo.take() {
            self.warn(line, "double tremolo start with no stop");
            self.reroute_orphan_tremolo_note(index, key, note);
        }
        if self.grouping.close_chord(&mut self.score.arena).is_some() {
            self.warn(line, "chord still open at the end of the part");
        }
        for key in self.grouping.voices_with_open_tuplets() {
            while self.grouping.close_tuplet(key, &mut self.score.arena).is_some() {
                self.warn(line, format!("tuplet still open at the end of the part in voice {}", key.voice));
            }
        }
        if self.pending.has_note_level() {
            let count = self.pending.note_level_len();
            self.warn(line, format!("{count} decoration(s) with no note to attach to, dropped"));
            self.pending.clear_note_level();
        }
        self.drain_part_level_queues();
        self.part_index = None;
        Ok(())
    }

    // ─── Attributes ──────────────────────────────────────────────────

    fn with_current_measure(&mut self, f: impl FnOnce(&mut crate::msr::PartMeasure)) {
        if let Some(index) = self.part_index {
            if let Some(measure) = self.score.parts[index].current_measure_mut() {
                f(measure);
            }
        }
    }

    fn handle_divisions(&mut self, element: &MxsrElement) {
        match element.text_i64().filter(|d| *d > 0) {
            Some(divisions) => {
                self.divisions = Some(divisions);
                self.with_current_measure(|m| m.divisions = Some(divisions));
            }
            None => self.warn(element.line, "<divisions> is not a positive integer, ignored"),
        }
    }

    fn handle_clef(&mut self, element: &MxsrElement) {
        let text = element.child_text("sign").unwrap_or("");
        let sign = match ClefSign::from_musicxml(text) {
            Some(sign) => sign,
            None => {
                self.warn(element.line, format!("clef sign '{text}' is unknown"));
                ClefSign::None
            }
        };
        let clef = Clef {
            sign,
            line: element.child_i64("line").map(|l| l as i32),
            octave_change: element.child_i64("clef-octave-change").map(|o| o as i32),
            staff: element.attribute_i64("number").unwrap_or(1).max(1) as u32,
            line_number: element.line,
        };
        self.with_current_measure(|m| m.clefs.push(clef));
    }

    fn handle_key(&mut self, element: &MxsrElement) {
        let key = Key {
            fifths: element.child_i64("fifths").unwrap_or(0) as i32,
            mode: element.child_text("mode").map(String::from),
            staff: element.attribute_i64("number").map(|n| n.max(1) as u32),
        };
        self.with_current_measure(|m| m.key = Some(key));
    }

    fn handle_time(&mut self, element: &MxsrElement) {
        let join = |name: &str| {
            element
                .children_named(name)
                .filter_map(|c| c.text())
                .collect::<Vec<_>>()
                .join("+")
        };
        let time = TimeSignature {
            beats: join("beats"),
            beat_type: join("beat-type"),
            senza_misura: element.has_child("senza-misura"),
            symbol: element.attribute("symbol").map(String::from),
        };
        self.with_current_measure(|m| m.time = Some(time));
    }

    fn handle_transpose(&mut self, element: &MxsrElement) {
        let transpose = Transpose {
            diatonic: element.child_i64("diatonic").unwrap_or(0) as i32,
            chromatic: element.child_i64("chromatic").unwrap_or(0) as i32,
            octave_change: element.child_i64("octave-change").map(|o| o as i32),
        };
        self.with_current_measure(|m| m.transpose = Some(transpose));
    }

    // ─── Cursor ──────────────────────────────────────────────────────

    fn handle_backup(&mut self, element: &MxsrElement) {
        let duration = element.child_i64("duration").unwrap_or(0).max(0);
        let duration = self.to_wholes(duration, element.line);
        if !self.routing.backup(duration) {
            self.warn(element.line, "<backup> goes before the start of the measure, clamped");
        }
    }

    fn handle_forward(&mut self, element: &MxsrElement) -> Result<(), PopulateError> {
        let index = self.current_part_index(element.line)?;
        let duration = element.child_i64("duration").unwrap_or(0).max(0);
        let duration = self.to_wholes(duration, element.line);
        let staff = element.child_i64("staff").map(|s| s.max(1) as u32);
        let voice = element.child_i64("voice").map(|v| v.max(1) as u32);
        match self.recipient_voice(index, staff, voice) {
            Some(key) => self.routing.forward(key, duration),
            None => {
                self.warn(element.line, "<forward> with no voice to pad");
                self.routing.cursor += duration;
            }
        }
        Ok(())
    }

    // ─── Harmonies and figured basses ────────────────────────────────

    fn handle_harmony(&mut self, element: &MxsrElement) -> Result<(), PopulateError> {
        let index = self.current_part_index(element.line)?;
        if self.options.ignore.harmonies {
            return Ok(());
        }
        let root_of = |node: Option<&MxsrElement>, step: &str, alter: &str| {
            node.map(|n| HarmonyRoot {
                step: n.child_text(step).unwrap_or("C").to_string(),
                alter: n.child_f64(alter),
            })
        };
        let kind = element.child("kind");
        let offset_divisions = element.child_i64("offset").unwrap_or(0);
        let offset = self.to_wholes(offset_divisions, element.line);
        let staff = element.child_i64("staff").map(|s| s.max(1) as u32);
        let voice = self.recipient_voice(index, staff, None);

        let harmony = Harmony {
            root: root_of(element.child("root"), "root-step", "root-alter"),
            kind: kind.and_then(|k| k.text()).unwrap_or("none").to_string(),
            kind_text: kind.and_then(|k| k.attribute("text")).map(String::from),
            bass: root_of(element.child("bass"), "bass-step", "bass-alter"),
            inversion: element.child_i64("inversion").map(|i| i as i32),
            degrees: element
                .children_named("degree")
                .map(|d| HarmonyDegree {
                    value: d.child_i64("degree-value").unwrap_or(0) as i32,
                    alter: d.child_i64("degree-alter").unwrap_or(0) as i32,
                    kind: d.child_text("degree-type").unwrap_or("add").to_string(),
                })
                .collect(),
            offset,
            offset_divisions,
            sounding_wholes: wholes::zero(),
            tuplet_factor: TupletFactor::IDENTITY,
            position_in_measure: wholes::zero(),
            staff: staff.or(voice.map(|k| k.staff)).unwrap_or(1),
            voice: voice.map_or(1, |k| k.voice),
            line: element.line,
        };
        self.harmonies.push(harmony);
        Ok(())
    }

    fn handle_figured_bass(&mut self, element: &MxsrElement) -> Result<(), PopulateError> {
        let index = self.current_part_index(element.line)?;
        if self.options.ignore.figured_basses {
            return Ok(());
        }
        let offset_divisions = element.child_i64("offset").unwrap_or(0);
        let offset = self.to_wholes(offset_divisions, element.line);
        let voice = self.recipient_voice(index, None, None);

        let figured_bass = FiguredBass {
            figures: element
                .children_named("figure")
                .map(|f| Figure {
                    prefix: f.child_text("prefix").map(String::from),
                    number: f.child_text("figure-number").map(String::from),
                    suffix: f.child_text("suffix").map(String::from),
                })
                .collect(),
            parentheses: element.attribute("parentheses") == Some("yes"),
            offset,
            offset_divisions,
            sounding_wholes: wholes::zero(),
            tuplet_factor: TupletFactor::IDENTITY,
            position_in_measure: wholes::zero(),
            staff: voice.map_or(1, |k| k.staff),
            voice: voice.map_or(1, |k| k.voice),
            line: element.line,
        };
        self.figured_basses.push(figured_bass);
        Ok(())
    }

    // ─── Barlines ────────────────────────────────────────────────────

    fn finalize_barline(&mut self, acc: BarLineAccumulator) -> Result<(), PopulateError> {
        let index = self.current_part_index(acc.line)?;
        let first_measure = self.score.parts[index]
            .first_measure_number()
            .unwrap_or(self.measure_number.as_str())
            .to_string();

        match classify(&acc, &mut self.repeats, &self.measure_number, &first_measure) {
            BarLineOutcome::Append { barline, effects, warnings } => {
                for warning in warnings {
                    self.warn(acc.line, warning);
                }
                log::trace!("barline {:?} in measure {}", barline.category, self.measure_number);
                self.pending.bar_lines.push(barline);
                for effect in effects {
                    self.apply_repeat_effect(index, effect);
                }
                Ok(())
            }
            BarLineOutcome::Dropped { warning } => {
                self.warn(acc.line, warning);
                Ok(())
            }
            BarLineOutcome::Fatal { message } => Err(self.structural(acc.line, message)),
        }
    }

    fn apply_repeat_effect(&mut self, index: usize, effect: RepeatEffect) {
        let part = &mut self.score.parts[index];
        match effect {
            RepeatEffect::RepeatStart { measure } => part.cascade_handle_repeat_start_in_part(&measure),
            RepeatEffect::RepeatEnd { start_measure, end_measure, times } => {
                part.cascade_handle_repeat_end_in_part(&start_measure, &end_measure, times)
            }
            RepeatEffect::ReclassifyStart { barline, category } => {
                let queued = self.pending.bar_lines.iter_mut().find(|b| b.id == barline);
                match queued {
                    Some(b) => b.category = category,
                    None => {
                        if let Some(b) = part.bar_line_mut(barline) {
                            b.category = category;
                        }
                    }
                }
            }
            RepeatEffect::Ending(ending) => part.append_repeat_ending(ending),
        }
    }

    // ─── Dispatch ────────────────────────────────────────────────────

    fn enter_top_level(&mut self, element: &MxsrElement) -> Result<Visit, PopulateError> {
        let visit = match element.kind {
            ElementKind::ScorePartwise | ElementKind::MeasureStyle => Visit::Children,
            ElementKind::Part => {
                self.enter_part(element)?;
                Visit::Children
            }
            ElementKind::Measure => {
                self.enter_measure(element)?;
                Visit::Children
            }
            ElementKind::Attributes => {
                self.current_part_index(element.line)?;
                Visit::Children
            }
            ElementKind::Divisions => {
                self.handle_divisions(element);
                Visit::SkipChildren
            }
            ElementKind::Staves => {
                let index = self.current_part_index(element.line)?;
                let staves = element.text_i64().unwrap_or(1).max(1) as u32;
                for staff in 1..=staves {
                    self.score.parts[index].ensure_staff(staff);
                }
                Visit::SkipChildren
            }
            ElementKind::Clef => {
                self.handle_clef(element);
                Visit::SkipChildren
            }
            ElementKind::Key => {
                self.handle_key(element);
                Visit::SkipChildren
            }
            ElementKind::Time => {
                self.handle_time(element);
                Visit::SkipChildren
            }
            ElementKind::Transpose => {
                self.handle_transpose(element);
                Visit::SkipChildren
            }
            ElementKind::Slash => {
                self.handle_slash_style(element);
                Visit::SkipChildren
            }
            ElementKind::Note => {
                self.note_sequential_number += 1;
                self.block = Block::Note(Box::new(NoteAccumulator::new(self.note_sequential_number, element.line)));
                Visit::Children
            }
            ElementKind::Direction => {
                self.block = Block::Direction(DirectionAccumulator::new(element));
                Visit::Children
            }
            ElementKind::Barline => {
                self.block = Block::Barline(BarLineAccumulator::new(element));
                Visit::Children
            }
            ElementKind::Backup => {
                self.handle_backup(element);
                Visit::SkipChildren
            }
            ElementKind::Forward => {
                self.handle_forward(element)?;
                Visit::SkipChildren
            }
            ElementKind::Harmony => {
                self.handle_harmony(element)?;
                Visit::SkipChildren
            }
            ElementKind::FiguredBass => {
                self.handle_figured_bass(element)?;
                Visit::SkipChildren
            }
            ElementKind::Print => {
                self.handle_print(element);
                Visit::SkipChildren
            }
            // header elements were read by the skeleton, others are not converted
            _ => Visit::SkipChildren,
        };
        Ok(visit)
    }
}

impl Visitor for SkeletonPopulator<'_> {
    type Error = PopulateError;

    fn enter(&mut self, element: &MxsrElement) -> Result<Visit, PopulateError> {
        match &mut self.block {
            Block::Note(acc) => return Ok(acc.enter(element)),
            Block::Direction(acc) => return Ok(acc.enter(element)),
            Block::Barline(acc) => return Ok(acc.enter(element)),
            Block::None => {}
        }
        self.enter_top_level(element)
    }

    fn exit(&mut self, element: &MxsrElement) -> Result<(), PopulateError> {
        match element.kind {
            ElementKind::Note => {
                if let Block::Note(acc) = std::mem::replace(&mut self.block, Block::None) {
                    self.finalize_note_element(*acc)?;
                }
            }
            ElementKind::Direction => {
                if let Block::Direction(acc) = std::mem::replace(&mut self.block, Block::None) {
                    self.finalize_direction(acc);
                }
            }
            ElementKind::Barline => {
                if let Block::Barline(acc) = std::mem::replace(&mut self.block, Block::None) {
                    self.finalize_barline(acc)?;
                }
            }
            ElementKind::Measure if matches!(self.block, Block::None) => self.finalize_measure(element.line)?,
            ElementKind::Part if matches!(self.block, Block::None) => self.finalize_part(element.line)?,
            _ => {}
        }
        Ok(())
    }
}
