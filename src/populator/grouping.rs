//! Chord, tuplet and grace-notes group assembly.
//!
//! Three cooperating state machines, driven by the begin/end signals the
//! populator fetches from the known events. Tuplets nest through an
//! explicit per-voice stack (innermost last); at most one chord and one
//! grace-notes group are open at a time. A tuplet of grace notes lives in
//! the grace-notes group, not in the voice.

use std::collections::BTreeMap;

use crate::events::TupletEvent;
use crate::msr::{
    Arena, Chord, ChordId, GraceNotesGroup, GraceNotesGroupId, NoteContext, NoteId, Tuplet,
    TupletId, Voice,
};
use crate::wholes::{self, TupletFactor, Wholes};

use super::routing::VoiceKey;

/// Where the open chord was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChordContainer {
    Voice,
    Tuplet(TupletId),
    GraceNotesGroup(GraceNotesGroupId),
}

#[derive(Debug, Default)]
pub struct GroupingState {
    tuplet_stacks: BTreeMap<VoiceKey, Vec<TupletId>>,
    /// Offset reached inside the outermost open tuplet, per voice
    outer_tuplet_offsets: BTreeMap<VoiceKey, Wholes>,
    current_chord: Option<(ChordId, ChordContainer)>,
    open_grace_group: Option<(VoiceKey, GraceNotesGroupId)>,
    /// Closed groups waiting for the note they decorate
    awaiting_grace_groups: Vec<(VoiceKey, GraceNotesGroupId)>,
    /// Voices whose outermost open tuplet sits in a grace-notes group
    grace_tuplets: BTreeMap<VoiceKey, GraceNotesGroupId>,
}

impl GroupingState {
    pub fn innermost_tuplet(&self, key: VoiceKey) -> Option<TupletId> {
        self.tuplet_stacks.get(&key).and_then(|s| s.last().copied())
    }

    pub fn has_open_tuplets(&self, key: VoiceKey) -> bool {
        self.innermost_tuplet(key).is_some()
    }

    /// The voice's open tuplet factors composed, outermost first, if any.
    pub fn tuplet_factor(&self, key: VoiceKey, arena: &Arena) -> Option<TupletFactor> {
        let stack = self.tuplet_stacks.get(&key).filter(|s| !s.is_empty())?;
        Some(
            stack
                .iter()
                .fold(TupletFactor::IDENTITY, |acc, &t| acc.compose(arena.tuplet(t).factor)),
        )
    }

    /// Anchor position of a note inside the voice's tuplets: outermost
    /// tuplet position plus the offset reached inside it.
    pub fn tuplet_anchor_position(&self, key: VoiceKey, arena: &Arena) -> Option<Wholes> {
        let outermost = *self.tuplet_stacks.get(&key)?.first()?;
        let offset = self
            .outer_tuplet_offsets
            .get(&key)
            .copied()
            .unwrap_or_else(wholes::zero);
        Some(arena.tuplet(outermost).position_in_measure + offset)
    }

    pub fn advance_tuplet_offset(&mut self, key: VoiceKey, sounding: Wholes) {
        if self.has_open_tuplets(key) {
            *self
                .outer_tuplet_offsets
                .entry(key)
                .or_insert_with(wholes::zero) += sounding;
        }
    }

    // ─── Tuplets ─────────────────────────────────────────────────────

    /// Open a tuplet and append it to the innermost container: the open
    /// tuplet, else the grace-notes group when `grace_slashed` is set,
    /// else the voice.
    #[allow(clippy::too_many_arguments)]
    pub fn open_tuplet(
        &mut self,
        key: VoiceKey,
        event: &TupletEvent,
        position: Wholes,
        grace_slashed: Option<bool>,
        measure_number: &str,
        arena: &mut Arena,
        voice: &mut Voice,
    ) -> TupletId {
        let mut tuplet = Tuplet::new(event.tuplet_number, event.factor, event.header.line, measure_number);
        tuplet.position_in_measure = position;
        tuplet.staff = event.header.staff;
        tuplet.voice = key.voice;
        let id = arena.add_tuplet(tuplet);

        match (self.innermost_tuplet(key), grace_slashed) {
            (Some(outer), _) => arena.tuplet_mut(outer).append_tuplet(id),
            (None, Some(slashed)) => {
                let group = self.open_grace_group(key, slashed, event.header.line, measure_number, arena);
                arena.grace_notes_group_mut(group).append_tuplet(id);
                self.grace_tuplets.insert(key, group);
                self.outer_tuplet_offsets.insert(key, wholes::zero());
            }
            (None, None) => {
                voice.append_tuplet(id);
                self.outer_tuplet_offsets.insert(key, wholes::zero());
            }
        }
        self.tuplet_stacks.entry(key).or_default().push(id);
        log::trace!("tuplet {} opened in voice {}", event.tuplet_number, key.voice);
        id
    }

    /// Close the innermost tuplet, folding its duration into its parent.
    /// Returns `None` when the voice has no open tuplet.
    pub fn close_tuplet(&mut self, key: VoiceKey, arena: &mut Arena) -> Option<TupletId> {
        let stack = self.tuplet_stacks.get_mut(&key)?;
        let id = stack.pop()?;
        if let Some(&parent) = stack.last() {
            let sounding = arena.tuplet(id).sounding_wholes;
            arena.tuplet_mut(parent).add_sounding_wholes(sounding);
        }
        if stack.is_empty() {
            self.outer_tuplet_offsets.remove(&key);
            self.grace_tuplets.remove(&key);
        }
        log::trace!("tuplet {} closed in voice {}", arena.tuplet(id).number, key.voice);
        Some(id)
    }

    /// Every voice that still has open tuplets.
    pub fn voices_with_open_tuplets(&self) -> Vec<VoiceKey> {
        self.tuplet_stacks
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(k, _)| *k)
            .collect()
    }

    // ─── Grace notes groups ──────────────────────────────────────────

    /// Whether the voice's open tuplets sit in a grace-notes group.
    pub fn in_grace_tuplet(&self, key: VoiceKey) -> bool {
        self.grace_tuplets.contains_key(&key)
    }

    pub fn open_grace_group(
        &mut self,
        key: VoiceKey,
        slashed: bool,
        line: u32,
        measure_number: &str,
        arena: &mut Arena,
    ) -> GraceNotesGroupId {
        if let Some((_, id)) = self.open_grace_group {
            return id;
        }
        let group = GraceNotesGroup::new(slashed, key.staff, key.voice, line, measure_number);
        let id = arena.add_grace_notes_group(group);
        self.open_grace_group = Some((key, id));
        id
    }

    /// Stop collecting grace notes; the group now waits for its anchor.
    pub fn close_grace_group(&mut self) {
        if let Some(entry) = self.open_grace_group.take() {
            self.awaiting_grace_groups.push(entry);
        }
    }

    /// The closed group waiting in `key`, if any.
    pub fn take_awaiting_grace_group(&mut self, key: VoiceKey) -> Option<GraceNotesGroupId> {
        let pos = self.awaiting_grace_groups.iter().position(|(k, _)| *k == key)?;
        Some(self.awaiting_grace_groups.remove(pos).1)
    }

    /// All groups still unattached, open ones included.
    pub fn take_unattached_grace_groups(&mut self) -> Vec<(VoiceKey, GraceNotesGroupId)> {
        self.close_grace_group();
        std::mem::take(&mut self.awaiting_grace_groups)
    }

    // ─── Chords ──────────────────────────────────────────────────────

    /// Open a chord and append it to the innermost container for its kind.
    pub fn open_chord(
        &mut self,
        key: VoiceKey,
        is_grace: bool,
        line: u32,
        measure_number: &str,
        arena: &mut Arena,
        voice: &mut Voice,
    ) -> ChordId {
        let id = arena.add_chord(Chord::new(line, measure_number, is_grace));
        let container = if is_grace && !self.in_grace_tuplet(key) {
            let group = self.open_grace_group(key, false, line, measure_number, arena);
            arena.grace_notes_group_mut(group).append_chord(id);
            ChordContainer::GraceNotesGroup(group)
        } else if let Some(tuplet) = self.innermost_tuplet(key) {
            arena.tuplet_mut(tuplet).append_chord(id);
            ChordContainer::Tuplet(tuplet)
        } else {
            voice.append_chord(id);
            ChordContainer::Voice
        };
        self.current_chord = Some((id, container));
        log::trace!("chord opened at line {line}");
        id
    }

    /// Close the open chord, folding its duration into its tuplet.
    pub fn close_chord(&mut self, arena: &mut Arena) -> Option<ChordId> {
        let (id, container) = self.current_chord.take()?;
        if let ChordContainer::Tuplet(tuplet) = container {
            let sounding = arena.chord(id).sounding_wholes;
            arena.tuplet_mut(tuplet).add_sounding_wholes(sounding);
        }
        Some(id)
    }

    pub fn has_open_chord(&self) -> bool {
        self.current_chord.is_some()
    }

    // ─── Notes ───────────────────────────────────────────────────────

    /// Append a finalized note to the open chord, else the grace group
    /// (grace notes outside a grace tuplet), else the innermost tuplet,
    /// else the voice.
    pub fn route_note(&mut self, key: VoiceKey, id: NoteId, arena: &mut Arena, voice: &mut Voice) -> NoteContext {
        let is_grace = arena.note(id).is_grace;
        let context = if let Some((chord, container)) = self.current_chord {
            arena.chords[chord.0].append_note(id, &arena.notes[id.0]);
            match container {
                ChordContainer::Voice => NoteContext::InChord,
                ChordContainer::Tuplet(_) => NoteContext::InChordInTuplet,
                ChordContainer::GraceNotesGroup(_) => NoteContext::InChordInGraceNotesGroup,
            }
        } else if is_grace && !self.in_grace_tuplet(key) {
            let (line, measure) = {
                let note = arena.note(id);
                (note.line, note.measure_number.clone())
            };
            let slashed = arena.note(id).grace_slashed;
            let group = self.open_grace_group(key, slashed, line, &measure, arena);
            arena.grace_notes_group_mut(group).append_note(id);
            NoteContext::InGraceNotesGroup
        } else if let Some(tuplet) = self.innermost_tuplet(key) {
            let sounding = arena.note(id).sounding_wholes;
            arena.tuplet_mut(tuplet).append_note(id, sounding);
            NoteContext::InTuplet
        } else {
            voice.append_note(id);
            NoteContext::InMeasure
        };
        arena.note_mut(id).context = context;
        context
    }
}
