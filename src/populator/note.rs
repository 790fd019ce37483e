//! Note gathering and the note finalizer.
//!
//! A [`NoteAccumulator`] collects what the `<note>` element's children say.
//! When the element closes, the populator resolves the note's voice, lets
//! the grouping engine open chords, tuplets and grace groups, builds the
//! [`Note`], drains the pending decorations onto it and routes it.

use crate::error::PopulateError;
use crate::msr::{
    Arpeggiato, Articulation, ArticulationKind, Beam, BeamKind, DisplayPosition, DoubleTremolo,
    Dynamic, DynamicKind, Fermata, GraceAttachment, LineSpanner, Note, NoteContext, NoteId,
    NoteKind, OctaveShiftKind, Ornament, OrnamentKind, Pitch, Placement, Slur, SlurKind,
    SpannerEvent, StemDirection, Syllabic, Syllable, Technical, TechnicalKind, Tie, TieKind,
    VoiceStaffChange, WedgeKind,
};
use crate::mxsr::{ElementKind, MxsrElement, Visit};
use crate::wholes::{self, NoteType, TupletFactor, Wholes, MAX_DOTS};

use super::harmony::Anchor;
use super::routing::{RoutingState, VoiceKey};
use super::spanners::SpannerFamily;
use super::{structural_error, voice_in, SkeletonPopulator};

/// One end of a two-note tremolo, with its number of beams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TremoloEnd {
    Start(u8),
    Stop(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LyricMarkup {
    pub number: String,
    pub syllabic: Option<Syllabic>,
    pub text: String,
    pub extend: bool,
    pub line: u32,
}

/// Everything a `<note>` element says, gathered child by child.
#[derive(Debug, Clone)]
pub struct NoteAccumulator {
    pub sequential_number: u32,
    pub line: u32,
    pub kind: NoteKind,
    pub pitch: Option<Pitch>,
    pub display: Option<DisplayPosition>,
    pub is_measure_rest: bool,
    pub is_grace: bool,
    pub grace_slashed: bool,
    pub is_cue: bool,
    pub is_chord_member: bool,
    /// `<duration>`, in divisions
    pub duration: Option<i64>,
    pub staff: Option<u32>,
    pub voice: Option<u32>,
    pub note_type: Option<NoteType>,
    pub dots: u8,
    pub accidental: Option<String>,
    pub stem: Option<StemDirection>,
    pub notehead: Option<String>,
    pub time_modification: Option<TupletFactor>,
    /// From `<tie>`, used when no `<tied>` is present
    pub sound_ties: Vec<Tie>,
    pub ties: Vec<Tie>,
    pub beams: Vec<Beam>,
    pub slurs: Vec<Slur>,
    pub glissandos: Vec<LineSpanner>,
    pub slides: Vec<LineSpanner>,
    pub wavy_lines: Vec<LineSpanner>,
    pub articulations: Vec<Articulation>,
    pub ornaments: Vec<Ornament>,
    pub technicals: Vec<Technical>,
    pub fermatas: Vec<Fermata>,
    pub dynamics: Vec<Dynamic>,
    pub single_tremolo: Option<u8>,
    pub double_tremolo: Option<TremoloEnd>,
    pub arpeggiato: Option<Arpeggiato>,
    pub lyrics: Vec<LyricMarkup>,
    /// Semantic problems found while gathering: (line, message)
    pub warnings: Vec<(u32, String)>,
}

impl NoteAccumulator {
    pub fn new(sequential_number: u32, line: u32) -> Self {
        Self {
            sequential_number,
            line,
            kind: NoteKind::Regular,
            pitch: None,
            display: None,
            is_measure_rest: false,
            is_grace: false,
            grace_slashed: false,
            is_cue: false,
            is_chord_member: false,
            duration: None,
            staff: None,
            voice: None,
            note_type: None,
            dots: 0,
            accidental: None,
            stem: None,
            notehead: None,
            time_modification: None,
            sound_ties: Vec::new(),
            ties: Vec::new(),
            beams: Vec::new(),
            slurs: Vec::new(),
            glissandos: Vec::new(),
            slides: Vec::new(),
            wavy_lines: Vec::new(),
            articulations: Vec::new(),
            ornaments: Vec::new(),
            technicals: Vec::new(),
            fermatas: Vec::new(),
            dynamics: Vec::new(),
            single_tremolo: None,
            double_tremolo: None,
            arpeggiato: None,
            lyrics: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn enter(&mut self, element: &MxsrElement) -> Visit {
        let line = element.line;
        match element.kind {
            ElementKind::Pitch => {
                self.pitch = Some(Pitch {
                    step: element.child_text("step").unwrap_or("C").to_string(),
                    octave: element.child_i64("octave").unwrap_or(4) as i32,
                    alter: element.child_f64("alter"),
                });
                Visit::SkipChildren
            }
            ElementKind::Unpitched => {
                self.kind = NoteKind::Unpitched;
                self.display = display_position(element);
                Visit::SkipChildren
            }
            ElementKind::Rest => {
                self.kind = NoteKind::Rest;
                self.is_measure_rest = element.attribute("measure") == Some("yes");
                self.display = display_position(element);
                Visit::SkipChildren
            }
            ElementKind::Duration => {
                self.duration = element.text_i64();
                Visit::SkipChildren
            }
            ElementKind::Voice => {
                self.voice = element.text_i64().map(|v| v.max(1) as u32);
                Visit::SkipChildren
            }
            ElementKind::Staff => {
                self.staff = element.text_i64().map(|s| s.max(1) as u32);
                Visit::SkipChildren
            }
            ElementKind::Type => {
                let text = element.text().unwrap_or("");
                self.note_type = NoteType::from_musicxml(text);
                if self.note_type.is_none() {
                    self.warnings.push((line, format!("note type '{text}' is unknown")));
                }
                Visit::SkipChildren
            }
            ElementKind::Dot => {
                if self.dots == MAX_DOTS {
                    self.warnings.push((line, format!("more than {MAX_DOTS} dots, extra ones ignored")));
                } else {
                    self.dots += 1;
                }
                Visit::SkipChildren
            }
            ElementKind::Grace => {
                self.is_grace = true;
                self.grace_slashed = element.attribute("slash") == Some("yes");
                Visit::SkipChildren
            }
            ElementKind::Cue => {
                self.is_cue = true;
                Visit::SkipChildren
            }
            ElementKind::Chord => {
                self.is_chord_member = true;
                Visit::SkipChildren
            }
            ElementKind::Accidental => {
                self.accidental = element.text().map(String::from);
                Visit::SkipChildren
            }
            ElementKind::TimeModification => {
                self.time_modification = Some(TupletFactor::new(
                    element.child_i64("actual-notes").unwrap_or(1),
                    element.child_i64("normal-notes").unwrap_or(1),
                ));
                Visit::SkipChildren
            }
            ElementKind::Stem => {
                let text = element.text().unwrap_or("");
                let stem = StemDirection::from_musicxml(text);
                if stem == StemDirection::Unknown {
                    self.warnings.push((line, format!("stem '{text}' is unknown")));
                }
                self.stem = Some(stem);
                Visit::SkipChildren
            }
            ElementKind::Notehead => {
                self.notehead = element.text().map(String::from);
                Visit::SkipChildren
            }
            ElementKind::Beam => {
                let text = element.text().unwrap_or("");
                let kind = BeamKind::from_musicxml(text);
                if kind == BeamKind::Unknown {
                    self.warnings.push((line, format!("beam value '{text}' is unknown")));
                }
                self.beams.push(Beam {
                    number: element.attribute_i64("number").unwrap_or(1).max(1) as u32,
                    kind,
                    line,
                });
                Visit::SkipChildren
            }
            ElementKind::Tie => {
                if let Some(kind) = element.attribute("type").and_then(TieKind::from_musicxml) {
                    self.sound_ties.push(Tie { kind, placement: None, line });
                }
                Visit::SkipChildren
            }
            ElementKind::Lyric => {
                self.lyrics.push(LyricMarkup {
                    number: element.attribute("number").unwrap_or("1").to_string(),
                    syllabic: element.child_text("syllabic").and_then(Syllabic::from_musicxml),
                    text: element
                        .children_named("text")
                        .filter_map(|t| t.text())
                        .collect::<Vec<_>>()
                        .join(""),
                    extend: element.has_child("extend"),
                    line,
                });
                Visit::SkipChildren
            }
            ElementKind::Tied => {
                match element.attribute("type").and_then(TieKind::from_musicxml) {
                    Some(kind) => self.ties.push(Tie {
                        kind,
                        placement: Placement::from_musicxml(element.attribute("placement")),
                        line,
                    }),
                    None => self.warnings.push((line, "tied without a known type".to_string())),
                }
                Visit::SkipChildren
            }
            ElementKind::Slur => {
                match element.attribute("type").and_then(SpannerEvent::from_musicxml) {
                    Some(event) => self.slurs.push(Slur {
                        number: element.attribute_i64("number").map(|n| n.max(1) as u32),
                        event,
                        kind: match element.attribute("line-type") {
                            Some("dashed") => SlurKind::Dashed,
                            Some("dotted") => SlurKind::Dotted,
                            _ => SlurKind::Regular,
                        },
                        placement: Placement::from_musicxml(element.attribute("placement")),
                        spanner: None,
                        line,
                    }),
                    None => self.warnings.push((line, "slur without a known type".to_string())),
                }
                Visit::SkipChildren
            }
            ElementKind::Glissando => {
                match line_spanner(element, None) {
                    Some(spanner) => self.glissandos.push(spanner),
                    None => self.warnings.push((line, "glissando without a known type".to_string())),
                }
                Visit::SkipChildren
            }
            ElementKind::Slide => {
                match line_spanner(element, None) {
                    Some(spanner) => self.slides.push(spanner),
                    None => self.warnings.push((line, "slide without a known type".to_string())),
                }
                Visit::SkipChildren
            }
            ElementKind::Ornaments => {
                self.gather_ornaments(element);
                Visit::SkipChildren
            }
            ElementKind::Technical => {
                for child in &element.children {
                    let kind = TechnicalKind::from_musicxml(&child.name);
                    if kind == TechnicalKind::Unknown {
                        self.warnings.push((child.line, format!("technical '{}' is unknown", child.name)));
                    }
                    self.technicals.push(Technical {
                        kind,
                        value: child.text().map(String::from),
                        placement: Placement::from_musicxml(child.attribute("placement")),
                        line: child.line,
                    });
                }
                Visit::SkipChildren
            }
            ElementKind::Articulations => {
                for child in &element.children {
                    let kind = ArticulationKind::from_musicxml(&child.name);
                    if kind == ArticulationKind::Unknown {
                        self.warnings.push((child.line, format!("articulation '{}' is unknown", child.name)));
                    }
                    self.articulations.push(Articulation {
                        kind,
                        placement: Placement::from_musicxml(child.attribute("placement")),
                        line: child.line,
                    });
                }
                Visit::SkipChildren
            }
            ElementKind::Dynamics => {
                let placement = Placement::from_musicxml(element.attribute("placement"));
                self.dynamics.extend(dynamics_of(element, placement));
                Visit::SkipChildren
            }
            ElementKind::Fermata => {
                self.fermatas.push(Fermata {
                    inverted: element.attribute("type") == Some("inverted"),
                    shape: element.text().map(String::from),
                    line,
                });
                Visit::SkipChildren
            }
            ElementKind::Arpeggiate => {
                self.arpeggiato = Some(Arpeggiato {
                    direction: element.attribute("direction").map(String::from),
                    non_arpeggiato: false,
                    line,
                });
                Visit::SkipChildren
            }
            ElementKind::NonArpeggiate => {
                self.arpeggiato = Some(Arpeggiato {
                    direction: None,
                    non_arpeggiato: true,
                    line,
                });
                Visit::SkipChildren
            }
            // <notations>, <tuplet> (tuplets come from the known events) and friends
            _ => Visit::Children,
        }
    }

    fn gather_ornaments(&mut self, element: &MxsrElement) {
        for child in &element.children {
            let placement = Placement::from_musicxml(child.attribute("placement"));
            match child.name.as_str() {
                "tremolo" => {
                    let marks = child.text_i64().unwrap_or(3).clamp(0, 8) as u8;
                    match child.attribute("type") {
                        Some("start") => self.double_tremolo = Some(TremoloEnd::Start(marks)),
                        Some("stop") => self.double_tremolo = Some(TremoloEnd::Stop(marks)),
                        _ => self.single_tremolo = Some(marks),
                    }
                }
                "wavy-line" => match line_spanner(child, placement) {
                    Some(spanner) => self.wavy_lines.push(spanner),
                    None => self.warnings.push((child.line, "wavy line without a known type".to_string())),
                },
                "accidental-mark" => self.ornaments.push(Ornament {
                    kind: OrnamentKind::AccidentalMark,
                    placement,
                    accidental: child.text().map(String::from),
                    line: child.line,
                }),
                name => {
                    let kind = OrnamentKind::from_musicxml(name);
                    if kind == OrnamentKind::Unknown {
                        self.warnings.push((child.line, format!("ornament '{name}' is unknown")));
                    }
                    self.ornaments.push(Ornament {
                        kind,
                        placement,
                        accidental: None,
                        line: child.line,
                    });
                }
            }
        }
    }
}

fn display_position(element: &MxsrElement) -> Option<DisplayPosition> {
    Some(DisplayPosition {
        step: element.child_text("display-step")?.to_string(),
        octave: element.child_i64("display-octave").unwrap_or(4) as i32,
    })
}

/// Build a start/continue/stop line spanner from its `type` attribute.
pub(super) fn line_spanner(element: &MxsrElement, placement: Option<Placement>) -> Option<LineSpanner> {
    let event = SpannerEvent::from_musicxml(element.attribute("type")?)?;
    Some(LineSpanner {
        number: element.attribute_i64("number").unwrap_or(1).max(1) as u32,
        event,
        placement: placement.or_else(|| Placement::from_musicxml(element.attribute("placement"))),
        line_type: element.attribute("line-type").map(String::from),
        text: element.text().map(String::from),
        spanner: None,
        line: element.line,
    })
}

/// The marks inside a `<dynamics>` element.
pub(super) fn dynamics_of(element: &MxsrElement, placement: Option<Placement>) -> Vec<Dynamic> {
    element
        .children
        .iter()
        .map(|mark| Dynamic {
            kind: DynamicKind::from_musicxml(&mark.name, mark.text()),
            placement,
            line: mark.line,
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Finalization
// ═══════════════════════════════════════════════════════════════════════

impl SkeletonPopulator<'_> {
    /// Handle a closed `<note>`: resolve, group, build, decorate and route it.
    pub(super) fn finalize_note_element(&mut self, mut acc: NoteAccumulator) -> Result<(), PopulateError> {
        let part_index = self.current_part_index(acc.line)?;
        let seq = acc.sequential_number;
        let line = acc.line;
        for (line, message) in std::mem::take(&mut acc.warnings) {
            self.warn(line, message);
        }

        let markup_staff = acc.staff.unwrap_or(1);
        let voice_number = acc.voice.unwrap_or(1);
        let key = RoutingState::resolve(&self.score.parts[part_index], markup_staff, voice_number)
            .ok_or_else(|| {
                structural_error(
                    &self.part_id,
                    &self.measure_number,
                    line,
                    format!("voice {voice_number} is not known in staff {markup_staff}"),
                )
            })?;

        let is_chord_member = acc.is_chord_member && self.grouping.has_open_chord();
        if acc.is_chord_member && !is_chord_member {
            self.warn(line, "chord note with no chord to join, treated as a new note");
        }
        let position = self.routing.start_note(key, markup_staff, is_chord_member);
        let measure_number = self.measure_number.clone();
        let events = self.note_events(seq);

        let Some(voice) = voice_in(&mut self.score.parts, part_index, key) else {
            return Err(structural_error(&self.part_id, &measure_number, line, "voice vanished from its staff"));
        };

        if let Some(change) = &events.staff_change {
            log::debug!(
                "voice {} moves from staff {} to staff {} at line {line}",
                key.voice,
                change.take_off_staff,
                change.landing_staff
            );
            voice.append_voice_staff_change(VoiceStaffChange {
                from_staff: change.take_off_staff,
                to_staff: change.landing_staff,
                line,
            });
        }

        if !is_chord_member && !acc.is_grace && !self.grouping.has_open_tuplets(key) {
            let lag = position - voice.position();
            if lag > wholes::zero() {
                voice.append_padding(lag);
            }
        }

        // Groups opening at this note, outermost first.
        let grace_slashed = acc.is_grace.then_some(acc.grace_slashed);
        for event in &events.tuplet_begins {
            self.grouping.open_tuplet(
                key,
                event,
                position,
                grace_slashed,
                &measure_number,
                &mut self.score.arena,
                voice,
            );
        }
        if events.grace_begin && acc.is_grace {
            self.grouping
                .open_grace_group(key, acc.grace_slashed, line, &measure_number, &mut self.score.arena);
        }
        if events.chord_begin {
            self.grouping
                .open_chord(key, acc.is_grace, line, &measure_number, &mut self.score.arena, voice);
        }

        let (sounding, display, factor) = self.note_durations(&acc, key);
        let mut note = Note::new(seq, line, &measure_number);
        note.kind = acc.kind;
        note.pitch = acc.pitch.take();
        note.display = acc.display.take();
        note.is_grace = acc.is_grace;
        note.grace_slashed = acc.grace_slashed;
        note.is_cue = acc.is_cue;
        note.is_measure_rest = acc.is_measure_rest;
        note.sounding_wholes = sounding;
        note.display_wholes = display;
        note.duration_divisions = acc.duration;
        note.note_type = acc.note_type;
        note.dots = acc.dots;
        note.tuplet_factor = factor;
        note.staff = markup_staff;
        note.voice = voice_number;
        note.position_in_measure = position;
        note.accidental = acc.accidental.take();
        note.stem = acc.stem;
        note.notehead = acc.notehead.take();
        note.single_tremolo = acc.single_tremolo;
        note.arpeggiato = acc.arpeggiato.take();
        let id = self.score.arena.add_note(note);

        if !acc.is_grace {
            if let Some(group) = self.grouping.take_awaiting_grace_group(key) {
                self.score.arena.note_mut(id).grace_notes_group_before = Some(group);
                self.score.arena.grace_notes_group_mut(group).attachment = GraceAttachment::Before(id);
            }
        }

        self.attach_lyrics(id, std::mem::take(&mut acc.lyrics));
        self.enqueue_note_decorations(&mut acc);
        self.finalize_note(id);
        self.route_finalized_note(part_index, key, id, &acc)?;

        if !acc.is_grace && !is_chord_member {
            self.flush_harmonies_onto(part_index, key, id);
            self.routing.advance(sounding);
            self.grouping.advance_tuplet_offset(key, sounding);
            if let Some(voice) = voice_in(&mut self.score.parts, part_index, key) {
                voice.advance_position(sounding);
            }
        }
        if !acc.is_grace {
            self.last_note_in_measure = Some(id);
            self.last_regular_notes.insert(key, id);
        }

        // Groups closing at this note, innermost first.
        if events.chord_end && self.grouping.close_chord(&mut self.score.arena).is_none() {
            return Err(self.structural(line, "chord end with no open chord"));
        }
        if events.grace_end {
            self.grouping.close_grace_group();
        }
        for _ in &events.tuplet_ends {
            if self.grouping.close_tuplet(key, &mut self.score.arena).is_none() {
                return Err(self.structural(line, "tuplet end with no open tuplet"));
            }
        }

        self.drain_part_level_queues();
        Ok(())
    }

    /// Sounding duration, display duration and tuplet factor of a note.
    ///
    /// The type-derived duration wins over `<duration>` when they disagree.
    fn note_durations(&mut self, acc: &NoteAccumulator, key: VoiceKey) -> (Wholes, Wholes, TupletFactor) {
        let factor = self
            .grouping
            .tuplet_factor(key, &self.score.arena)
            .or(acc.time_modification)
            .unwrap_or(TupletFactor::IDENTITY);
        let from_duration = acc.duration.map(|d| wholes::divisions_to_wholes(d, self.divisions(acc.line)));

        let display = acc.note_type.map(|t| t.dotted_wholes(acc.dots));
        if acc.is_grace {
            let display = display.or(from_duration).unwrap_or_else(wholes::zero);
            return (wholes::zero(), display, factor);
        }

        match display {
            Some(display) => {
                let sounding = display * factor.ratio();
                if let Some(from_duration) = from_duration {
                    if from_duration != sounding {
                        self.warn_data_consistency(
                            acc.line,
                            format!(
                                "<duration> gives {from_duration} whole notes but <type> gives {sounding}; using {sounding}"
                            ),
                        );
                    }
                }
                (sounding, display, factor)
            }
            None => {
                let sounding = from_duration.unwrap_or_else(wholes::zero);
                (sounding, sounding, factor)
            }
        }
    }

    fn attach_lyrics(&mut self, id: NoteId, lyrics: Vec<LyricMarkup>) {
        if self.options.ignore.lyrics {
            return;
        }
        for lyric in lyrics {
            let syllabic = match lyric.syllabic {
                Some(s) => s,
                None => {
                    self.warn(lyric.line, "lyric without <syllabic>, assuming single");
                    Syllabic::Single
                }
            };
            self.score.arena.note_mut(id).lyrics.push(Syllable {
                number: lyric.number,
                syllabic,
                text: lyric.text,
                extend: lyric.extend,
                line: lyric.line,
            });
        }
    }

    /// Queue the note's own decorations behind those already pending.
    fn enqueue_note_decorations(&mut self, acc: &mut NoteAccumulator) {
        let options = self.options;
        let ignore = &options.ignore;
        let q = &mut self.pending;
        if !ignore.ties {
            if acc.ties.is_empty() {
                q.ties.append(&mut acc.sound_ties);
            } else {
                q.ties.append(&mut acc.ties);
            }
        }
        if !ignore.articulations {
            q.articulations.append(&mut acc.articulations);
        }
        if !ignore.ornaments {
            q.ornaments.append(&mut acc.ornaments);
        }
        q.technicals.append(&mut acc.technicals);
        q.fermatas.append(&mut acc.fermatas);
        if !ignore.dynamics {
            q.dynamics.append(&mut acc.dynamics);
        }
        q.beams.append(&mut acc.beams);
        if !ignore.slurs {
            q.slurs.append(&mut acc.slurs);
        }
        q.glissandos.append(&mut acc.glissandos);
        q.slides.append(&mut acc.slides);
        q.wavy_lines.append(&mut acc.wavy_lines);
    }

    /// Drain the note-level queues onto note `id`, matching spanners.
    ///
    /// On a rest, the kinds selected by the delay-rests options stay queued
    /// for the next non-rest note.
    pub(super) fn finalize_note(&mut self, id: NoteId) {
        let options = self.options;
        let delay = &options.delay_rests;
        let is_rest = self.score.arena.note(id).is_rest();
        let keep = |flag: bool| is_rest && flag;

        let q = &mut self.pending;
        let note = &mut self.score.arena.notes[id.0];
        note.ties.append(&mut q.ties);
        note.articulations.append(&mut q.articulations);
        note.ornaments.append(&mut q.ornaments);
        note.technicals.append(&mut q.technicals);
        note.fermatas.append(&mut q.fermatas);
        note.segnos.append(&mut q.segnos);
        note.codas.append(&mut q.codas);
        note.scordaturas.append(&mut q.scordaturas);
        if !keep(delay.dynamics) {
            note.dynamics.append(&mut q.dynamics);
        }
        if !keep(delay.words) {
            note.words.append(&mut q.words);
        }
        if !keep(delay.beams) {
            note.beams.append(&mut q.beams);
        }
        if !keep(delay.pedals) {
            note.pedals.append(&mut q.pedals);
        }
        if !keep(delay.slashes) {
            note.slashes.append(&mut q.slashes);
        }

        if !keep(delay.slurs) {
            for slur in std::mem::take(&mut self.pending.slurs) {
                self.attach_slur(id, slur);
            }
        }
        if !keep(delay.ligatures) {
            for mut ligature in std::mem::take(&mut self.pending.ligatures) {
                let key = super::spanners::SpannerState::placement_key(ligature.placement);
                if self.match_spanner(SpannerFamily::Ligature, key, ligature.event, ligature.line, &mut ligature.spanner) {
                    self.score.arena.note_mut(id).ligatures.push(ligature);
                }
            }
        }
        if !keep(delay.wedges) {
            for mut wedge in std::mem::take(&mut self.pending.wedges) {
                let event = match wedge.kind {
                    WedgeKind::Crescendo | WedgeKind::Diminuendo => Some(SpannerEvent::Start),
                    WedgeKind::Continue => Some(SpannerEvent::Continue),
                    WedgeKind::Stop => Some(SpannerEvent::Stop),
                    WedgeKind::Unknown => None,
                };
                let keep_it = match event {
                    Some(event) => self.match_spanner(SpannerFamily::Wedge, wedge.number, event, wedge.line, &mut wedge.spanner),
                    None => true,
                };
                if keep_it {
                    self.score.arena.note_mut(id).wedges.push(wedge);
                }
            }
        }
        for mut gliss in std::mem::take(&mut self.pending.glissandos) {
            if self.match_spanner(SpannerFamily::Glissando, gliss.number, gliss.event, gliss.line, &mut gliss.spanner) {
                self.score.arena.note_mut(id).glissandos.push(gliss);
            }
        }
        for mut slide in std::mem::take(&mut self.pending.slides) {
            if self.match_spanner(SpannerFamily::Slide, slide.number, slide.event, slide.line, &mut slide.spanner) {
                self.score.arena.note_mut(id).slides.push(slide);
            }
        }
        for mut wavy in std::mem::take(&mut self.pending.wavy_lines) {
            if self.match_spanner(SpannerFamily::WavyLine, wavy.number, wavy.event, wavy.line, &mut wavy.spanner) {
                self.score.arena.note_mut(id).wavy_lines.push(wavy);
            }
        }
        for mut shift in std::mem::take(&mut self.pending.octave_shifts) {
            let event = match shift.kind {
                OctaveShiftKind::Up | OctaveShiftKind::Down => Some(SpannerEvent::Start),
                OctaveShiftKind::Continue => Some(SpannerEvent::Continue),
                OctaveShiftKind::Stop => Some(SpannerEvent::Stop),
                OctaveShiftKind::Unknown => None,
            };
            let keep_it = match event {
                Some(event) => self.match_spanner(SpannerFamily::OctaveShift, shift.number, event, shift.line, &mut shift.spanner),
                None => true,
            };
            if keep_it {
                self.score.arena.note_mut(id).octave_shifts.push(shift);
            }
        }
    }

    fn attach_slur(&mut self, id: NoteId, mut slur: Slur) {
        match slur.event {
            SpannerEvent::Start => {
                let index = self.score.arena.note(id).slurs.len();
                let (spanner, displaced) = self.spanners.start_slur(slur.number, slur.placement, id, index);
                if displaced.is_some() {
                    self.warn(slur.line, "more than two slurs open at once, the outermost is no longer matched");
                }
                slur.spanner = Some(spanner);
            }
            SpannerEvent::Continue => slur.spanner = self.spanners.continue_slur(slur.number),
            SpannerEvent::Stop => match self.spanners.stop_slur(slur.number, slur.placement) {
                Some(stop) => {
                    slur.spanner = Some(stop.spanner);
                    if stop.phrasing && slur.kind == SlurKind::Regular {
                        slur.kind = SlurKind::Phrasing;
                    }
                    if let Some((outer_note, index)) = stop.reclassified_outer {
                        if let Some(outer) = self.score.arena.note_mut(outer_note).slurs.get_mut(index) {
                            if outer.kind == SlurKind::Regular {
                                outer.kind = SlurKind::Phrasing;
                            }
                        }
                    }
                }
                None => {
                    self.warn(slur.line, "slur stop with no open slur, dropped");
                    return;
                }
            },
        }
        self.score.arena.note_mut(id).slurs.push(slur);
    }

    /// Pair a numbered spanner event; returns false when it must be dropped.
    fn match_spanner(
        &mut self,
        family: SpannerFamily,
        key: u32,
        event: SpannerEvent,
        line: u32,
        spanner: &mut Option<crate::msr::SpannerId>,
    ) -> bool {
        match event {
            SpannerEvent::Start => {
                let (id, displaced) = self.spanners.start(family, key);
                if displaced.is_some() {
                    self.warn(line, format!("{family:?} {key} restarted before its stop"));
                }
                *spanner = Some(id);
                true
            }
            SpannerEvent::Continue => {
                *spanner = self.spanners.current(family, key);
                true
            }
            SpannerEvent::Stop => match self.spanners.stop(family, key) {
                Some(id) => {
                    *spanner = Some(id);
                    true
                }
                None => {
                    self.warn(line, format!("{family:?} {key} stop with no matching start, dropped"));
                    false
                }
            },
        }
    }

    /// Append the note to its destination, two-note tremolos included.
    fn route_finalized_note(
        &mut self,
        part_index: usize,
        key: VoiceKey,
        id: NoteId,
        acc: &NoteAccumulator,
    ) -> Result<(), PopulateError> {
        let Some(voice) = voice_in(&mut self.score.parts, part_index, key) else {
            return Err(structural_error(&self.part_id, &self.measure_number, acc.line, "voice vanished from its staff"));
        };
        let plain = !acc.is_grace && !self.grouping.has_open_chord();

        match acc.double_tremolo {
            Some(TremoloEnd::Start(marks)) if plain => {
                self.score.arena.note_mut(id).context = NoteContext::InDoubleTremolo;
                if let Some((_, first, _)) = self.pending_double_tremolo.replace((key, id, marks)) {
                    self.warn(acc.line, "double tremolo start with another one pending");
                    self.reroute_orphan_tremolo_note(part_index, key, first);
                }
                Ok(())
            }
            Some(TremoloEnd::Stop(_)) if plain => match self.pending_double_tremolo.take() {
                Some((first_key, first, marks)) if first_key == key => {
                    let sounding = self.score.arena.note(first).sounding_wholes
                        + self.score.arena.note(id).sounding_wholes;
                    let tremolo = self.score.arena.add_double_tremolo(DoubleTremolo {
                        first,
                        second: id,
                        marks,
                        sounding_wholes: sounding,
                        line: acc.line,
                    });
                    for note in [first, id] {
                        let note = self.score.arena.note_mut(note);
                        note.double_tremolo = Some(tremolo);
                        note.context = NoteContext::InDoubleTremolo;
                    }
                    voice.append_double_tremolo(tremolo);
                    Ok(())
                }
                other => {
                    self.pending_double_tremolo = other;
                    self.grouping.route_note(key, id, &mut self.score.arena, voice);
                    self.warn(acc.line, "double tremolo stop with no start");
                    Ok(())
                }
            },
            _ => {
                self.grouping.route_note(key, id, &mut self.score.arena, voice);
                Ok(())
            }
        }
    }

    /// A tremolo start that never met its stop becomes a plain note.
    pub(super) fn reroute_orphan_tremolo_note(&mut self, part_index: usize, key: VoiceKey, id: NoteId) {
        if let Some(voice) = voice_in(&mut self.score.parts, part_index, key) {
            self.grouping.route_note(key, id, &mut self.score.arena, voice);
        }
    }

    /// Give the pending harmonies and figured basses their share of note `id`.
    fn flush_harmonies_onto(&mut self, part_index: usize, key: VoiceKey, id: NoteId) {
        if self.harmonies.is_empty() && self.figured_basses.is_empty() {
            return;
        }
        let note = self.score.arena.note(id);
        let position = self
            .grouping
            .tuplet_anchor_position(key, &self.score.arena)
            .unwrap_or(note.position_in_measure);
        let anchor = Anchor {
            sounding_wholes: note.sounding_wholes,
            duration_divisions: note.duration_divisions,
            tuplet_factor: note.tuplet_factor,
            position,
        };

        let part = &mut self.score.parts[part_index];
        for harmony in self.harmonies.flush_onto(&anchor) {
            let position = harmony.position_in_measure;
            part.append_harmony_to_part(harmony, position);
        }
        for figured_bass in self.figured_basses.flush_onto(&anchor) {
            let position = figured_bass.position_in_measure;
            part.append_figured_bass_to_part(figured_bass, position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mxsr::{browse, parse_mxsr, Visitor};

    /// Feeds every element below `<note>` to an accumulator.
    struct Gather(NoteAccumulator);

    impl Visitor for Gather {
        type Error = ();

        fn enter(&mut self, element: &MxsrElement) -> Result<Visit, ()> {
            if element.kind == ElementKind::Note {
                return Ok(Visit::Children);
            }
            Ok(self.0.enter(element))
        }

        fn exit(&mut self, _element: &MxsrElement) -> Result<(), ()> {
            Ok(())
        }
    }

    fn gather(note_xml: &str) -> NoteAccumulator {
        let xml = format!("<score-partwise><part id=\"P1\"><measure number=\"1\">{note_xml}</measure></part></score-partwise>");
        let root = parse_mxsr(&xml).unwrap();
        let note = &root.children[0].children[0].children[0];
        let mut gather = Gather(NoteAccumulator::new(1, note.line));
        browse(note, &mut gather).unwrap();
        gather.0
    }

    #[test]
    fn gathers_pitch_duration_and_notations() {
        let acc = gather(
            r#"<note>
  <pitch><step>F</step><alter>1</alter><octave>5</octave></pitch>
  <duration>3</duration><voice>2</voice><type>quarter</type><dot/>
  <staff>2</staff><beam number="1">begin</beam>
  <notations>
    <tied type="start"/>
    <slur type="start" number="2" placement="above"/>
    <articulations><staccato/><tenuto/></articulations>
    <ornaments><tremolo type="single">2</tremolo><trill-mark/></ornaments>
  </notations>
  <lyric number="1"><text>la</text></lyric>
</note>"#,
        );
        let pitch = acc.pitch.as_ref().unwrap();
        assert_eq!((pitch.step.as_str(), pitch.alter, pitch.octave), ("F", Some(1.0), 5));
        assert_eq!(acc.duration, Some(3));
        assert_eq!((acc.staff, acc.voice), (Some(2), Some(2)));
        assert_eq!(acc.note_type, Some(NoteType::Quarter));
        assert_eq!(acc.dots, 1);
        assert_eq!(acc.beams[0].kind, BeamKind::Begin);
        assert_eq!(acc.ties[0].kind, TieKind::Start);
        assert_eq!(acc.slurs[0].number, Some(2));
        assert_eq!(acc.slurs[0].placement, Some(Placement::Above));
        assert_eq!(acc.articulations.len(), 2);
        assert_eq!(acc.single_tremolo, Some(2));
        assert_eq!(acc.ornaments[0].kind, OrnamentKind::TrillMark);
        assert_eq!(acc.lyrics[0].syllabic, None);
        assert!(acc.warnings.is_empty());
    }

    #[test]
    fn gathers_rests_graces_and_unknowns() {
        let acc = gather(r#"<note><rest measure="yes"><display-step>B</display-step><display-octave>4</display-octave></rest><duration>4</duration></note>"#);
        assert_eq!(acc.kind, NoteKind::Rest);
        assert!(acc.is_measure_rest);
        assert_eq!(acc.display.as_ref().map(|d| d.step.as_str()), Some("B"));

        let acc = gather(r#"<note><grace slash="yes"/><pitch><step>D</step><octave>5</octave></pitch><type>eighth</type><stem>sideways</stem></note>"#);
        assert!(acc.is_grace && acc.grace_slashed);
        assert_eq!(acc.stem, Some(StemDirection::Unknown));
        assert_eq!(acc.warnings.len(), 1);
    }

    #[test]
    fn dots_beyond_the_limit_are_dropped() {
        let dots = "<dot/>".repeat(70);
        let acc = gather(&format!(
            "<note><pitch><step>C</step><octave>4</octave></pitch><type>whole</type>{dots}</note>"
        ));
        assert_eq!(acc.dots, MAX_DOTS);
        assert_eq!(acc.warnings.len(), 1);
        assert_eq!(NoteType::Whole.dotted_wholes(acc.dots), wholes::wholes(511, 256));
    }

    #[test]
    fn two_note_tremolo_ends() {
        let acc = gather(r#"<note><pitch><step>C</step><octave>4</octave></pitch><notations><ornaments><tremolo type="start">3</tremolo></ornaments></notations></note>"#);
        assert_eq!(acc.double_tremolo, Some(TremoloEnd::Start(3)));
        assert_eq!(acc.single_tremolo, None);
    }
}
