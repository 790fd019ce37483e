//! Part-level MSR elements: attributes, barlines, repeats, harmonies,
//! figured basses, tempos and measure-level runs.

use serde::Serialize;

use crate::wholes::{NoteType, TupletFactor, Wholes};

// ─── Attributes ─────────────────────────────────────────────────────────

/// Clef sign. Unknown signs map to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClefSign {
    G,
    F,
    C,
    Percussion,
    Tab,
    Jianpu,
    None,
}

impl ClefSign {
    pub fn from_musicxml(s: &str) -> Option<Self> {
        let sign = match s.trim() {
            "G" => ClefSign::G,
            "F" => ClefSign::F,
            "C" => ClefSign::C,
            "percussion" => ClefSign::Percussion,
            "TAB" => ClefSign::Tab,
            "jianpu" => ClefSign::Jianpu,
            "none" => ClefSign::None,
            _ => return None,
        };
        Some(sign)
    }
}

/// Clef definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clef {
    pub sign: ClefSign,
    /// Staff line (e.g., 2 for treble, 4 for bass)
    pub line: Option<i32>,
    /// Octave change (e.g., -1 for tenor voice)
    pub octave_change: Option<i32>,
    /// Staff number this clef applies to
    pub staff: u32,
    pub line_number: u32,
}

/// Key signature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Key {
    /// Number of sharps (positive) or flats (negative)
    pub fifths: i32,
    /// Mode: "major" or "minor"
    pub mode: Option<String>,
    /// Staff number when the key applies to one staff only
    pub staff: Option<u32>,
}

/// Time signature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSignature {
    /// Beats per measure, as written (e.g., "3", "3+2")
    pub beats: String,
    /// Beat unit (e.g., 4 = quarter note)
    pub beat_type: String,
    pub senza_misura: bool,
    pub symbol: Option<String>,
}

/// Transposition info for transposing instruments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transpose {
    /// Diatonic steps
    pub diatonic: i32,
    /// Chromatic semitones
    pub chromatic: i32,
    pub octave_change: Option<i32>,
}

// ─── Barlines ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BarLineId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BarLineLocation {
    Left,
    Middle,
    Right,
}

impl BarLineLocation {
    /// MusicXML default is "right".
    pub fn from_musicxml(s: Option<&str>) -> Option<Self> {
        match s.map(str::trim) {
            None | Some("right") => Some(BarLineLocation::Right),
            Some("left") => Some(BarLineLocation::Left),
            Some("middle") => Some(BarLineLocation::Middle),
            Some(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BarStyle {
    Regular,
    Dotted,
    Dashed,
    Heavy,
    LightLight,
    LightHeavy,
    HeavyLight,
    HeavyHeavy,
    Tick,
    Short,
    None,
    Unknown,
}

impl BarStyle {
    pub fn from_musicxml(s: &str) -> Self {
        match s.trim() {
            "regular" => BarStyle::Regular,
            "dotted" => BarStyle::Dotted,
            "dashed" => BarStyle::Dashed,
            "heavy" => BarStyle::Heavy,
            "light-light" => BarStyle::LightLight,
            "light-heavy" => BarStyle::LightHeavy,
            "heavy-light" => BarStyle::HeavyLight,
            "heavy-heavy" => BarStyle::HeavyHeavy,
            "tick" => BarStyle::Tick,
            "short" => BarStyle::Short,
            "none" => BarStyle::None,
            _ => BarStyle::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepeatDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndingType {
    Start,
    Stop,
    Discontinue,
}

impl EndingType {
    pub fn from_musicxml(s: &str) -> Option<Self> {
        match s.trim() {
            "start" => Some(EndingType::Start),
            "stop" => Some(EndingType::Stop),
            "discontinue" => Some(EndingType::Discontinue),
            _ => None,
        }
    }
}

/// What a barline means once classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BarLineCategory {
    Standalone,
    RepeatStart,
    RepeatEnd,
    HookedEndingStart,
    HookedEndingEnd,
    HooklessEndingStart,
    HooklessEndingEnd,
}

/// A barline (may include repeat signs and volta brackets).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarLine {
    pub id: BarLineId,
    pub location: BarLineLocation,
    pub style: Option<BarStyle>,
    pub repeat_direction: Option<RepeatDirection>,
    /// Number of times a backward repeat is played
    pub repeat_times: Option<u32>,
    /// Ending number(s), e.g., "1", "2", "1, 2"
    pub ending_number: Option<String>,
    pub ending_type: Option<EndingType>,
    pub ending_text: Option<String>,
    pub segno: bool,
    pub coda: bool,
    pub fermata: bool,
    pub category: BarLineCategory,
    pub measure_number: String,
    pub line: u32,
}

/// A repeated section of a part.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Repeat {
    pub start_measure: String,
    pub end_measure: Option<String>,
    /// How many times the section is played (default 2)
    pub times: u32,
    /// No forward repeat was written; the repeat runs from the part start
    pub implicit_start: bool,
    pub endings: Vec<RepeatEnding>,
}

/// A volta bracket (1st/2nd ending).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatEnding {
    pub number: String,
    pub hooked: bool,
    pub start_measure: String,
    pub end_measure: String,
}

/// `<multiple-rest>` run: `count` measures of rest from `start_measure`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultipleMeasureRest {
    pub start_measure: String,
    pub end_measure: Option<String>,
    pub count: u32,
}

/// `<measure-repeat>` run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureRepeat {
    pub start_measure: String,
    pub end_measure: Option<String>,
    /// Number of measures in the repeated pattern
    pub measures: u32,
    pub slashes: u32,
}

// ─── Staff changes ──────────────────────────────────────────────────────

/// Marker placed in a voice's stream where its notes move to another staff.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceStaffChange {
    pub from_staff: u32,
    pub to_staff: u32,
    pub line: u32,
}

// ─── Harmonies and figured basses ───────────────────────────────────────

/// Root or bass note of a harmony.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarmonyRoot {
    /// Note name: A–G
    pub step: String,
    /// Alteration: -1 = flat, 1 = sharp
    pub alter: Option<f64>,
}

/// An added, altered or subtracted chord degree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarmonyDegree {
    pub value: i32,
    pub alter: i32,
    /// "add", "alter" or "subtract"
    pub kind: String,
}

/// A chord symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Harmony {
    /// Root note (None for function-only harmonies)
    pub root: Option<HarmonyRoot>,
    /// Chord quality: "major", "minor", "dominant", "diminished", etc.
    pub kind: String,
    /// Text to print instead of the kind
    pub kind_text: Option<String>,
    /// Bass note (for slash chords)
    pub bass: Option<HarmonyRoot>,
    pub inversion: Option<i32>,
    pub degrees: Vec<HarmonyDegree>,
    /// Offset from the anchor note, in whole notes
    pub offset: Wholes,
    /// Offset as written, in divisions
    pub offset_divisions: i64,
    pub sounding_wholes: Wholes,
    pub tuplet_factor: TupletFactor,
    pub position_in_measure: Wholes,
    pub staff: u32,
    pub voice: u32,
    pub line: u32,
}

/// One figure of a figured bass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub prefix: Option<String>,
    pub number: Option<String>,
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiguredBass {
    pub figures: Vec<Figure>,
    pub parentheses: bool,
    pub offset: Wholes,
    pub offset_divisions: i64,
    pub sounding_wholes: Wholes,
    pub tuplet_factor: TupletFactor,
    pub position_in_measure: Wholes,
    pub staff: u32,
    pub voice: u32,
    pub line: u32,
}

// ─── Part-level directions ──────────────────────────────────────────────

/// Metronome marking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tempo {
    pub beat_unit: Option<NoteType>,
    pub beat_unit_dots: u8,
    /// Beats per minute as written (may be text such as "c. 60")
    pub per_minute: Option<String>,
    pub parentheses: bool,
    pub staff: u32,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RehearsalMark {
    pub text: String,
    pub line: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barline_location_defaults_to_right() {
        assert_eq!(BarLineLocation::from_musicxml(None), Some(BarLineLocation::Right));
        assert_eq!(BarLineLocation::from_musicxml(Some("left")), Some(BarLineLocation::Left));
        assert_eq!(BarLineLocation::from_musicxml(Some("top")), None);
    }

    #[test]
    fn unknown_enumerated_values() {
        assert_eq!(BarStyle::from_musicxml("light-heavy"), BarStyle::LightHeavy);
        assert_eq!(BarStyle::from_musicxml("zigzag"), BarStyle::Unknown);
        assert_eq!(ClefSign::from_musicxml("TAB"), Some(ClefSign::Tab));
        assert_eq!(ClefSign::from_musicxml("X"), None);
        assert_eq!(EndingType::from_musicxml("discontinue"), Some(EndingType::Discontinue));
    }
}
