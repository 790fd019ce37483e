//! Cursor and recipient-voice routing.
//!
//! The part cursor is the draw position in the current measure. Notes
//! advance it, `<backup>` and `<forward>` move it explicitly. Voices lag
//! behind the cursor when the markup skips over them; the populator pads
//! them back in sync.

use crate::msr::Part;
use crate::wholes::{self, Wholes};

/// A voice, addressed by its home staff and its number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoiceKey {
    pub staff: u32,
    pub voice: u32,
}

#[derive(Debug)]
pub struct RoutingState {
    /// Part-level draw position in the current measure
    pub cursor: Wholes,
    /// Staff of the last note, reset by `<backup>` and at measure start
    current_staff: Option<u32>,
    current_voice: Option<VoiceKey>,
    /// Position of the last note that was not a chord follower
    note_position: Wholes,
    forwarded: Vec<(VoiceKey, Wholes)>,
}

impl Default for RoutingState {
    fn default() -> Self {
        Self {
            cursor: wholes::zero(),
            current_staff: None,
            current_voice: None,
            note_position: wholes::zero(),
            forwarded: Vec::new(),
        }
    }
}

impl RoutingState {
    pub fn reset_for_measure(&mut self) {
        self.cursor = wholes::zero();
        self.current_staff = None;
        self.note_position = wholes::zero();
        self.forwarded.clear();
    }

    /// The voice the last note went to, until a `<backup>` leaves the
    /// recipient unknown for the next note to re-anchor.
    pub fn current_recipient_voice(&self) -> Option<VoiceKey> {
        self.current_staff.and(self.current_voice)
    }

    /// Recipient of an element that names no voice of its own: the current
    /// recipient when it still sits on `staff`, else the first voice of
    /// `staff`.
    pub fn recipient_on_staff(&self, part: &Part, staff: Option<u32>) -> Option<VoiceKey> {
        let current = self.current_recipient_voice();
        match staff {
            None => current,
            Some(staff) if current.is_some() && self.current_staff == Some(staff) => current,
            Some(staff) => part
                .staff(staff)
                .and_then(|s| s.voices.first())
                .map(|v| VoiceKey { staff, voice: v.number })
                .or(current),
        }
    }

    /// Find the voice numbered `voice`, living under its home staff.
    ///
    /// `staff` is the staff from the markup. It only breaks ties when the
    /// same voice number exists under several staves.
    pub fn resolve(part: &Part, staff: u32, voice: u32) -> Option<VoiceKey> {
        if part.voice(staff, voice).is_some() {
            return Some(VoiceKey { staff, voice });
        }
        part.voices()
            .find(|v| v.number == voice)
            .map(|v| VoiceKey { staff: v.staff_number, voice })
    }

    /// Record a note arriving in `key` on `staff`; returns its position in the measure.
    pub fn start_note(&mut self, key: VoiceKey, staff: u32, is_chord_member: bool) -> Wholes {
        self.current_voice = Some(key);
        self.current_staff = Some(staff);
        if !is_chord_member {
            self.note_position = self.cursor;
        }
        self.note_position
    }

    /// Move the cursor past a note that started at the last note position.
    pub fn advance(&mut self, sounding: Wholes) {
        self.cursor = self.note_position + sounding;
    }

    /// Returns false when the backup had to be clamped at the measure start.
    pub fn backup(&mut self, duration: Wholes) -> bool {
        self.current_staff = None;
        let target = self.cursor - duration;
        if target < wholes::zero() {
            self.cursor = wholes::zero();
            false
        } else {
            self.cursor = target;
            true
        }
    }

    pub fn forward(&mut self, key: VoiceKey, duration: Wholes) {
        self.cursor += duration;
        self.forwarded.push((key, self.cursor));
    }

    /// Voices skipped over by `<forward>`, with the position each must reach.
    pub fn take_forwarded(&mut self) -> Vec<(VoiceKey, Wholes)> {
        std::mem::take(&mut self.forwarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wholes::wholes;

    #[test]
    fn chord_followers_share_the_note_position() {
        let key = VoiceKey { staff: 1, voice: 1 };
        let mut routing = RoutingState::default();
        assert_eq!(routing.start_note(key, 1, false), wholes(0, 1));
        routing.advance(wholes(1, 4));
        assert_eq!(routing.start_note(key, 1, true), wholes(0, 1));
        routing.advance(wholes(1, 4));
        assert_eq!(routing.cursor, wholes(1, 4));
        assert_eq!(routing.start_note(key, 1, false), wholes(1, 4));
    }

    #[test]
    fn backup_clamps_at_zero() {
        let mut routing = RoutingState::default();
        routing.cursor = wholes(1, 2);
        assert!(routing.backup(wholes(1, 4)));
        assert!(!routing.backup(wholes(1, 1)));
        assert_eq!(routing.cursor, wholes(0, 1));
    }

    #[test]
    fn backup_leaves_the_recipient_unknown() {
        let mut part = Part::new("P1", "Piano");
        part.ensure_voice(1, 1);
        part.ensure_voice(2, 5);
        let key = VoiceKey { staff: 1, voice: 1 };
        let mut routing = RoutingState::default();
        routing.start_note(key, 1, false);
        assert_eq!(routing.current_recipient_voice(), Some(key));
        assert_eq!(routing.recipient_on_staff(&part, Some(1)), Some(key));
        assert_eq!(routing.recipient_on_staff(&part, Some(2)), Some(VoiceKey { staff: 2, voice: 5 }));

        routing.backup(wholes(1, 1));
        assert_eq!(routing.current_recipient_voice(), None);
        assert_eq!(routing.recipient_on_staff(&part, None), None);
        assert_eq!(routing.recipient_on_staff(&part, Some(1)), Some(key));
    }

    #[test]
    fn forward_records_target_positions() {
        let key = VoiceKey { staff: 1, voice: 2 };
        let mut routing = RoutingState::default();
        routing.forward(key, wholes(1, 4));
        routing.forward(key, wholes(1, 4));
        assert_eq!(routing.take_forwarded(), vec![(key, wholes(1, 4)), (key, wholes(1, 2))]);
        assert!(routing.take_forwarded().is_empty());
    }

    #[test]
    fn resolve_uses_the_home_staff() {
        let mut part = Part::new("P1", "Piano");
        part.ensure_voice(1, 1);
        part.ensure_voice(2, 2);
        assert_eq!(RoutingState::resolve(&part, 2, 1), Some(VoiceKey { staff: 1, voice: 1 }));
        assert_eq!(RoutingState::resolve(&part, 2, 2), Some(VoiceKey { staff: 2, voice: 2 }));
        assert_eq!(RoutingState::resolve(&part, 1, 9), None);
    }
}
