//! Skeleton pass — the first walk over the MXSR tree.
//!
//! Builds everything the populator relies on before it sees its first
//! note: score identification, the part list, each part's staves and
//! voices, and each part's [`KnownEvents`] (chord, grace, tuplet, staff
//! change, measure rest and measure repeat boundaries).
//!
//! Note sequential numbers are assigned in document order across the whole
//! score, starting at 1, exactly as the populator assigns them.

use std::collections::BTreeMap;

use crate::error::PopulateError;
use crate::events::{KnownEvents, NoteSequentialNumber};
use crate::msr::{Part, Score};
use crate::mxsr::{ElementKind, MxsrElement};
use crate::wholes::TupletFactor;

/// The score skeleton and, per part id, the events found in that part.
#[derive(Debug, Default)]
pub struct Skeleton {
    pub score: Score,
    pub events: BTreeMap<String, KnownEvents>,
}

/// Build the skeleton from a `<score-partwise>` root.
pub fn build_skeleton(root: &MxsrElement) -> Result<Skeleton, PopulateError> {
    let mut skeleton = Skeleton::default();
    skeleton.score.version = root.attribute("version").map(String::from);

    let mut credit_title = None;
    let mut credit_composer = None;
    let mut next_note_number: NoteSequentialNumber = 0;

    for child in &root.children {
        match child.kind {
            ElementKind::Work => {
                if let Some(title) = child.child_text("work-title") {
                    skeleton.score.title = Some(title.to_string());
                }
            }
            ElementKind::MovementTitle => {
                // Only a fallback when no <work-title> was seen.
                if skeleton.score.title.is_none() {
                    skeleton.score.title = child.text().map(String::from);
                }
            }
            ElementKind::Identification => build_identification(child, &mut skeleton.score),
            ElementKind::PartList => build_part_list(child, &mut skeleton.score),
            ElementKind::Part => {
                let events = build_part(child, &mut skeleton.score, &mut next_note_number)?;
                let id = child.attribute("id").unwrap_or("").to_string();
                skeleton.events.insert(id, events);
            }
            _ if child.name == "credit" => {
                let (kind, text) = read_credit(child);
                match kind.as_deref() {
                    Some("title") if credit_title.is_none() => credit_title = text,
                    Some("composer") if credit_composer.is_none() => credit_composer = text,
                    _ => {}
                }
            }
            _ => {}
        }
    }

    // <credit> values stand in for a missing <work-title> / <creator>.
    if skeleton.score.title.is_none() {
        skeleton.score.title = credit_title;
    }
    if skeleton.score.composer.is_none() {
        skeleton.score.composer = credit_composer;
    }

    log::debug!(
        "skeleton: {} part(s), {} note(s)",
        skeleton.score.parts.len(),
        next_note_number
    );
    Ok(skeleton)
}

// ─── Identification ──────────────────────────────────────────────────

fn build_identification(node: &MxsrElement, score: &mut Score) {
    for creator in node.children_named("creator") {
        if creator.attribute("type") == Some("composer") && score.composer.is_none() {
            score.composer = creator.text().map(String::from);
        }
    }
}

fn read_credit(node: &MxsrElement) -> (Option<String>, Option<String>) {
    let kind = node.child_text("credit-type").map(String::from);
    let lines: Vec<&str> = node
        .children_named("credit-words")
        .filter_map(|w| w.text())
        .collect();
    let text = if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    };
    (kind, text)
}

// ─── Part List ───────────────────────────────────────────────────────

fn build_part_list(node: &MxsrElement, score: &mut Score) {
    for score_part in node.children.iter().filter(|c| c.kind == ElementKind::ScorePart) {
        let id = score_part.attribute("id").unwrap_or("");
        let name = score_part.child_text("part-name").unwrap_or("");
        let mut part = Part::new(id, name);
        part.abbreviation = score_part.child_text("part-abbreviation").map(String::from);
        part.ensure_staff(1);
        score.parts.push(part);
    }
}

// ─── Part ────────────────────────────────────────────────────────────

/// What the skeleton needs to know about one `<note>`.
#[derive(Debug, Clone)]
struct NoteFacts {
    sequential_number: NoteSequentialNumber,
    line: u32,
    staff: u32,
    voice: u32,
    is_chord_member: bool,
    is_grace: bool,
    measure_index: usize,
    /// `<backup>` elements met in the measure before this note
    backups_before: u32,
    time_modification: Option<TupletFactor>,
    tuplets: Vec<TupletMarkup>,
}

#[derive(Debug, Clone)]
struct TupletMarkup {
    is_start: bool,
    number: u32,
    explicit_factor: Option<TupletFactor>,
    line: u32,
}

fn build_part(
    node: &MxsrElement,
    score: &mut Score,
    next_note_number: &mut NoteSequentialNumber,
) -> Result<KnownEvents, PopulateError> {
    let id = node.attribute("id").unwrap_or("");
    let part = score
        .parts
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| PopulateError::Structural {
            line: node.line,
            part: id.to_string(),
            measure: String::new(),
            message: format!("part '{id}' is not declared in <part-list>"),
        })?;

    let mut events = KnownEvents::new();
    let mut notes: Vec<NoteFacts> = Vec::new();
    let measure_numbers: Vec<&str> = node
        .children
        .iter()
        .filter(|c| c.kind == ElementKind::Measure)
        .map(|m| m.attribute("number").unwrap_or(""))
        .collect();

    for (measure_index, measure) in node
        .children
        .iter()
        .filter(|c| c.kind == ElementKind::Measure)
        .enumerate()
    {
        let number = measure.attribute("number").unwrap_or("");
        let mut backups = 0;
        for child in &measure.children {
            match child.kind {
                ElementKind::Attributes => {
                    if let Some(staves) = child.child_i64("staves") {
                        for staff in 1..=staves.max(1) as u32 {
                            part.ensure_staff(staff);
                        }
                    }
                    for style in child.children_named("measure-style") {
                        register_measure_style(style, number, measure_index, &measure_numbers, &mut events);
                    }
                }
                ElementKind::Note => {
                    *next_note_number += 1;
                    let facts = note_facts(child, *next_note_number, measure_index, backups);
                    register_voice(part, &notes, &facts, &mut events);
                    notes.push(facts);
                }
                ElementKind::Backup => backups += 1,
                ElementKind::Forward => {
                    // A forward may be the only thing a voice ever contributes.
                    if let Some(voice) = child.child_i64("voice") {
                        let staff = child.child_i64("staff").unwrap_or(1).max(1) as u32;
                        let voice = voice.max(1) as u32;
                        let known = part.voices().any(|v| v.number == voice);
                        if !known || (part.voice(staff, voice).is_none() && backed_up_since(&notes, voice, measure_index, backups)) {
                            part.ensure_voice(staff, voice);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    if part.voices().next().is_none() {
        part.ensure_voice(1, 1);
    }

    register_chords_and_graces(&notes, &mut events);
    register_tuplets(&notes, &mut events);

    log::debug!("part {}: {} note(s), {} known event(s)", part.id, notes.len(), events.len());
    Ok(events)
}

fn note_facts(
    note: &MxsrElement,
    sequential_number: NoteSequentialNumber,
    measure_index: usize,
    backups_before: u32,
) -> NoteFacts {
    let time_modification = note.child("time-modification").map(|tm| {
        TupletFactor::new(
            tm.child_i64("actual-notes").unwrap_or(1),
            tm.child_i64("normal-notes").unwrap_or(1),
        )
    });

    let mut tuplets = Vec::new();
    for notations in note.children_named("notations") {
        for tuplet in notations.children_named("tuplet") {
            let is_start = match tuplet.attribute("type") {
                Some("start") => true,
                Some("stop") => false,
                _ => continue,
            };
            let explicit_factor = match (
                tuplet.child("tuplet-actual").and_then(|a| a.child_i64("tuplet-number")),
                tuplet.child("tuplet-normal").and_then(|n| n.child_i64("tuplet-number")),
            ) {
                (Some(actual), Some(normal)) => Some(TupletFactor::new(actual, normal)),
                _ => None,
            };
            tuplets.push(TupletMarkup {
                is_start,
                number: tuplet.attribute_i64("number").unwrap_or(1).max(1) as u32,
                explicit_factor,
                line: tuplet.line,
            });
        }
    }

    NoteFacts {
        sequential_number,
        line: note.line,
        staff: note.child_i64("staff").unwrap_or(1).max(1) as u32,
        voice: note.child_i64("voice").unwrap_or(1).max(1) as u32,
        is_chord_member: note.has_child("chord"),
        is_grace: note.has_child("grace"),
        measure_index,
        backups_before,
        time_modification,
        tuplets,
    }
}

/// Last non-chord-member note of voice number `voice`, if any.
fn previous_note(notes: &[NoteFacts], voice: u32) -> Option<&NoteFacts> {
    notes.iter().rev().find(|n| n.voice == voice && !n.is_chord_member)
}

/// Whether a `<backup>` came after the last note of voice number `voice`
/// in the same measure.
fn backed_up_since(notes: &[NoteFacts], voice: u32, measure_index: usize, backups: u32) -> bool {
    previous_note(notes, voice).is_some_and(|n| n.measure_index == measure_index && n.backups_before < backups)
}

/// Create the note's voice under its home staff, and register a staff
/// change when the voice's previous note sat on another staff.
///
/// A voice number reused on another staff after a `<backup>` is a voice
/// of that staff, not a staff change. Once a number lives under several
/// staves, notes go to the voice of their own staff.
fn register_voice(part: &mut Part, notes: &[NoteFacts], facts: &NoteFacts, events: &mut KnownEvents) {
    let homes = part.voices().filter(|v| v.number == facts.voice).count();
    if homes == 0 {
        part.ensure_voice(facts.staff, facts.voice);
        return;
    }
    if facts.is_chord_member {
        return;
    }
    let own_staff = part.voice(facts.staff, facts.voice).is_some();
    if own_staff && homes > 1 {
        return;
    }
    if !own_staff && backed_up_since(notes, facts.voice, facts.measure_index, facts.backups_before) {
        log::debug!(
            "voice {} reused on staff {} after a backup at line {}",
            facts.voice,
            facts.staff,
            facts.line
        );
        part.ensure_voice(facts.staff, facts.voice);
        return;
    }
    if let Some(previous) = previous_note(notes, facts.voice) {
        if previous.staff != facts.staff {
            events.register_staff_change_take_off(
                facts.sequential_number,
                facts.voice,
                facts.line,
                previous.staff,
                facts.staff,
            );
        }
    }
}

fn register_measure_style(
    style: &MxsrElement,
    number: &str,
    measure_index: usize,
    measure_numbers: &[&str],
    events: &mut KnownEvents,
) {
    if let Some(rest) = style.child("multiple-rest") {
        let count = rest.text_i64().unwrap_or(1).max(1) as u32;
        let last = (measure_index + count as usize - 1).min(measure_numbers.len().saturating_sub(1));
        events.register_measure_rest_begin(number, count, rest.line);
        events.register_measure_rest_end(measure_numbers.get(last).copied().unwrap_or(number), count, rest.line);
    }
    if let Some(repeat) = style.child("measure-repeat") {
        let measures = repeat.text_i64().unwrap_or(1).max(1) as u32;
        let slashes = repeat.attribute_i64("slashes").unwrap_or(1).max(1) as u32;
        match repeat.attribute("type") {
            Some("start") => events.register_measure_repeat_begin(number, measures, slashes, repeat.line),
            Some("stop") => events.register_measure_repeat_end(number, measures, slashes, repeat.line),
            _ => {}
        }
    }
}

/// Index of the first and last note of the chord containing `notes[i]`.
fn chord_span(notes: &[NoteFacts], i: usize) -> (usize, usize) {
    let mut first = i;
    while first > 0 && notes[first].is_chord_member {
        first -= 1;
    }
    let mut last = i;
    while last + 1 < notes.len() && notes[last + 1].is_chord_member {
        last += 1;
    }
    (first, last)
}

fn register_chords_and_graces(notes: &[NoteFacts], events: &mut KnownEvents) {
    for (i, note) in notes.iter().enumerate() {
        let next = notes.get(i + 1);
        let next_is_chord_member = next.is_some_and(|n| n.is_chord_member);

        if !note.is_chord_member && next_is_chord_member {
            events.register_chord_begin(note.sequential_number, note.staff, note.voice, note.line);
        }
        if note.is_chord_member && !next_is_chord_member {
            events.register_chord_end(note.sequential_number, note.staff, note.voice, note.line);
        }

        if note.is_grace {
            let previous = i.checked_sub(1).map(|p| &notes[p]);
            let continues_run = |other: Option<&NoteFacts>| {
                other.is_some_and(|o| o.is_grace && o.voice == note.voice)
            };
            if !continues_run(previous) {
                events.register_grace_begin(note.sequential_number, note.staff, note.voice, note.line);
            }
            if !continues_run(next) {
                events.register_grace_end(note.sequential_number, note.staff, note.voice, note.line);
            }
        }
    }
}

fn register_tuplets(notes: &[NoteFacts], events: &mut KnownEvents) {
    // Per voice: open (number, cumulative factor) pairs, outermost first.
    let mut stacks: BTreeMap<u32, Vec<(u32, TupletFactor)>> = BTreeMap::new();

    for (i, note) in notes.iter().enumerate() {
        if note.tuplets.is_empty() {
            continue;
        }
        let (chord_first, chord_last) = chord_span(notes, i);

        let mut starts: Vec<&TupletMarkup> = note.tuplets.iter().filter(|t| t.is_start).collect();
        starts.sort_by_key(|t| t.number);
        let mut stops: Vec<&TupletMarkup> = note.tuplets.iter().filter(|t| !t.is_start).collect();
        stops.sort_by_key(|t| std::cmp::Reverse(t.number));

        let stack = stacks.entry(note.voice).or_default();
        let anchor = &notes[chord_first];
        for (k, start) in starts.iter().enumerate() {
            let outer = stack.last().map_or(TupletFactor::IDENTITY, |&(_, f)| f);
            let factor = match start.explicit_factor {
                Some(f) => f,
                None => {
                    let total = note.time_modification.unwrap_or(TupletFactor::IDENTITY);
                    // Several starts on one note share the time modification:
                    // only the innermost carries what is left of it.
                    if k + 1 == starts.len() {
                        total.relative_to(outer)
                    } else {
                        TupletFactor::IDENTITY
                    }
                }
            };
            stack.push((start.number, outer.compose(factor)));
            events.register_tuplet_begin(
                anchor.sequential_number,
                anchor.staff,
                anchor.voice,
                start.line,
                start.number,
                factor,
            );
        }

        let anchor = &notes[chord_last];
        for stop in stops {
            let factor = match stack.iter().rposition(|&(n, _)| n == stop.number) {
                Some(pos) => {
                    let outer = pos.checked_sub(1).map_or(TupletFactor::IDENTITY, |p| stack[p].1);
                    let own = stack[pos].1.relative_to(outer);
                    stack.truncate(pos);
                    own
                }
                None => TupletFactor::IDENTITY,
            };
            events.register_tuplet_end(
                anchor.sequential_number,
                anchor.staff,
                anchor.voice,
                stop.line,
                stop.number,
                factor,
            );
        }
    }
}
