//! Notes and the decorations attached to them.

use serde::Serialize;

use crate::wholes::{self, NoteType, TupletFactor, Wholes};

use super::{DoubleTremoloId, GraceNotesGroupId};

// ═══════════════════════════════════════════════════════════════════════
// Note
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoteKind {
    Regular,
    Rest,
    Unpitched,
}

/// Where a note was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoteContext {
    InMeasure,
    InChord,
    InTuplet,
    InChordInTuplet,
    InGraceNotesGroup,
    InChordInGraceNotesGroup,
    InDoubleTremolo,
}

/// Pitch of a note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pitch {
    /// Note name: A, B, C, D, E, F, G
    pub step: String,
    /// Octave number (middle C = C4)
    pub octave: i32,
    /// Chromatic alteration: -1.0 = flat, 1.0 = sharp, 0.0 = natural
    pub alter: Option<f64>,
}

/// Display position of a rest or unpitched note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayPosition {
    pub step: String,
    pub octave: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StemDirection {
    Up,
    Down,
    Double,
    None,
    Unknown,
}

impl StemDirection {
    pub fn from_musicxml(s: &str) -> Self {
        match s.trim() {
            "up" => StemDirection::Up,
            "down" => StemDirection::Down,
            "double" => StemDirection::Double,
            "none" => StemDirection::None,
            _ => StemDirection::Unknown,
        }
    }
}

/// A single note or rest, fully resolved.
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    /// Document-order number, shared with the known-events collection
    pub sequential_number: u32,
    pub line: u32,
    pub measure_number: String,
    pub kind: NoteKind,
    pub context: NoteContext,
    /// Pitch (None for rests and unpitched notes)
    pub pitch: Option<Pitch>,
    pub display: Option<DisplayPosition>,
    pub is_grace: bool,
    pub grace_slashed: bool,
    pub is_cue: bool,
    /// Whole-measure rest (`<rest measure="yes"/>`)
    pub is_measure_rest: bool,
    pub sounding_wholes: Wholes,
    pub display_wholes: Wholes,
    /// `<duration>` as written, in divisions
    pub duration_divisions: Option<i64>,
    pub note_type: Option<NoteType>,
    pub dots: u8,
    pub tuplet_factor: TupletFactor,
    /// Staff number from the markup
    pub staff: u32,
    pub voice: u32,
    pub position_in_measure: Wholes,
    /// Accidental: "sharp", "flat", "natural", "double-sharp", "flat-flat"
    pub accidental: Option<String>,
    pub stem: Option<StemDirection>,
    pub notehead: Option<String>,

    pub ties: Vec<Tie>,
    pub articulations: Vec<Articulation>,
    pub ornaments: Vec<Ornament>,
    pub technicals: Vec<Technical>,
    pub fermatas: Vec<Fermata>,
    pub single_tremolo: Option<u8>,
    pub arpeggiato: Option<Arpeggiato>,
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
    pub segnos: Vec<Segno>,
    pub codas: Vec<Coda>,
    pub scordaturas: Vec<Scordatura>,
    pub lyrics: Vec<Syllable>,

    pub grace_notes_group_before: Option<GraceNotesGroupId>,
    pub grace_notes_group_after: Option<GraceNotesGroupId>,
    pub double_tremolo: Option<DoubleTremoloId>,
}

impl Note {
    pub fn new(sequential_number: u32, line: u32, measure_number: &str) -> Self {
        Self {
            sequential_number,
            line,
            measure_number: measure_number.to_string(),
            kind: NoteKind::Regular,
            context: NoteContext::InMeasure,
            pitch: None,
            display: None,
            is_grace: false,
            grace_slashed: false,
            is_cue: false,
            is_measure_rest: false,
            sounding_wholes: wholes::zero(),
            display_wholes: wholes::zero(),
            duration_divisions: None,
            note_type: None,
            dots: 0,
            tuplet_factor: TupletFactor::IDENTITY,
            staff: 1,
            voice: 1,
            position_in_measure: wholes::zero(),
            accidental: None,
            stem: None,
            notehead: None,
            ties: Vec::new(),
            articulations: Vec::new(),
            ornaments: Vec::new(),
            technicals: Vec::new(),
            fermatas: Vec::new(),
            single_tremolo: None,
            arpeggiato: None,
            dynamics: Vec::new(),
            words: Vec::new(),
            wedges: Vec::new(),
            beams: Vec::new(),
            slurs: Vec::new(),
            ligatures: Vec::new(),
            pedals: Vec::new(),
            slashes: Vec::new(),
            glissandos: Vec::new(),
            slides: Vec::new(),
            wavy_lines: Vec::new(),
            octave_shifts: Vec::new(),
            segnos: Vec::new(),
            codas: Vec::new(),
            scordaturas: Vec::new(),
            lyrics: Vec::new(),
            grace_notes_group_before: None,
            grace_notes_group_after: None,
            double_tremolo: None,
        }
    }

    pub fn is_rest(&self) -> bool {
        self.kind == NoteKind::Rest
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Decorations
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Placement {
    Above,
    Below,
}

impl Placement {
    pub fn from_musicxml(s: Option<&str>) -> Option<Self> {
        match s.map(str::trim) {
            Some("above") => Some(Placement::Above),
            Some("below") => Some(Placement::Below),
            _ => None,
        }
    }
}

/// Shared by the start and stop of one matched spanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SpannerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpannerEvent {
    Start,
    Continue,
    Stop,
}

impl SpannerEvent {
    pub fn from_musicxml(s: &str) -> Option<Self> {
        match s.trim() {
            "start" => Some(SpannerEvent::Start),
            "continue" => Some(SpannerEvent::Continue),
            "stop" => Some(SpannerEvent::Stop),
            _ => None,
        }
    }
}

// ─── Ties ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TieKind {
    Start,
    Continue,
    Stop,
    LetRing,
}

impl TieKind {
    pub fn from_musicxml(s: &str) -> Option<Self> {
        match s.trim() {
            "start" => Some(TieKind::Start),
            "continue" => Some(TieKind::Continue),
            "stop" => Some(TieKind::Stop),
            "let-ring" => Some(TieKind::LetRing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tie {
    pub kind: TieKind,
    pub placement: Option<Placement>,
    pub line: u32,
}

// ─── Articulations, ornaments, technicals ───────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArticulationKind {
    Accent,
    StrongAccent,
    Staccato,
    Staccatissimo,
    Tenuto,
    DetachedLegato,
    Spiccato,
    Stress,
    Unstress,
    SoftAccent,
    BreathMark,
    Caesura,
    Scoop,
    Plop,
    Doit,
    Falloff,
    Arpeggiato,
    NonArpeggiato,
    Unknown,
}

impl ArticulationKind {
    pub fn from_musicxml(s: &str) -> Self {
        match s {
            "accent" => ArticulationKind::Accent,
            "strong-accent" => ArticulationKind::StrongAccent,
            "staccato" => ArticulationKind::Staccato,
            "staccatissimo" => ArticulationKind::Staccatissimo,
            "tenuto" => ArticulationKind::Tenuto,
            "detached-legato" => ArticulationKind::DetachedLegato,
            "spiccato" => ArticulationKind::Spiccato,
            "stress" => ArticulationKind::Stress,
            "unstress" => ArticulationKind::Unstress,
            "soft-accent" => ArticulationKind::SoftAccent,
            "breath-mark" => ArticulationKind::BreathMark,
            "caesura" => ArticulationKind::Caesura,
            "scoop" => ArticulationKind::Scoop,
            "plop" => ArticulationKind::Plop,
            "doit" => ArticulationKind::Doit,
            "falloff" => ArticulationKind::Falloff,
            "arpeggiate" => ArticulationKind::Arpeggiato,
            "non-arpeggiate" => ArticulationKind::NonArpeggiato,
            _ => ArticulationKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Articulation {
    pub kind: ArticulationKind,
    pub placement: Option<Placement>,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrnamentKind {
    TrillMark,
    Turn,
    InvertedTurn,
    DelayedTurn,
    DelayedInvertedTurn,
    VerticalTurn,
    Mordent,
    InvertedMordent,
    Schleifer,
    Shake,
    Haydn,
    AccidentalMark,
    Unknown,
}

impl OrnamentKind {
    pub fn from_musicxml(s: &str) -> Self {
        match s {
            "trill-mark" => OrnamentKind::TrillMark,
            "turn" => OrnamentKind::Turn,
            "inverted-turn" => OrnamentKind::InvertedTurn,
            "delayed-turn" => OrnamentKind::DelayedTurn,
            "delayed-inverted-turn" => OrnamentKind::DelayedInvertedTurn,
            "vertical-turn" => OrnamentKind::VerticalTurn,
            "mordent" => OrnamentKind::Mordent,
            "inverted-mordent" => OrnamentKind::InvertedMordent,
            "schleifer" => OrnamentKind::Schleifer,
            "shake" => OrnamentKind::Shake,
            "haydn" => OrnamentKind::Haydn,
            "accidental-mark" => OrnamentKind::AccidentalMark,
            _ => OrnamentKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ornament {
    pub kind: OrnamentKind,
    pub placement: Option<Placement>,
    /// Accidental text for `accidental-mark`
    pub accidental: Option<String>,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TechnicalKind {
    UpBow,
    DownBow,
    Harmonic,
    OpenString,
    ThumbPosition,
    Fingering,
    Pluck,
    DoubleTongue,
    TripleTongue,
    Stopped,
    SnapPizzicato,
    Fret,
    String,
    HammerOn,
    PullOff,
    Bend,
    Tap,
    Heel,
    Toe,
    Fingernails,
    Unknown,
}

impl TechnicalKind {
    pub fn from_musicxml(s: &str) -> Self {
        match s {
            "up-bow" => TechnicalKind::UpBow,
            "down-bow" => TechnicalKind::DownBow,
            "harmonic" => TechnicalKind::Harmonic,
            "open-string" => TechnicalKind::OpenString,
            "thumb-position" => TechnicalKind::ThumbPosition,
            "fingering" => TechnicalKind::Fingering,
            "pluck" => TechnicalKind::Pluck,
            "double-tongue" => TechnicalKind::DoubleTongue,
            "triple-tongue" => TechnicalKind::TripleTongue,
            "stopped" => TechnicalKind::Stopped,
            "snap-pizzicato" => TechnicalKind::SnapPizzicato,
            "fret" => TechnicalKind::Fret,
            "string" => TechnicalKind::String,
            "hammer-on" => TechnicalKind::HammerOn,
            "pull-off" => TechnicalKind::PullOff,
            "bend" => TechnicalKind::Bend,
            "tap" => TechnicalKind::Tap,
            "heel" => TechnicalKind::Heel,
            "toe" => TechnicalKind::Toe,
            "fingernails" => TechnicalKind::Fingernails,
            _ => TechnicalKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Technical {
    pub kind: TechnicalKind,
    /// Text content (fingering number, fret, string…)
    pub value: Option<String>,
    pub placement: Option<Placement>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fermata {
    pub inverted: bool,
    /// Shape as written: "normal", "angled", "square"…
    pub shape: Option<String>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Arpeggiato {
    /// Direction for `<arpeggiate>`; None for `<non-arpeggiate>`
    pub direction: Option<String>,
    pub non_arpeggiato: bool,
    pub line: u32,
}

// ─── Dynamics and words ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DynamicKind {
    F,
    FF,
    FFF,
    FFFF,
    FFFFF,
    FFFFFF,
    P,
    PP,
    PPP,
    PPPP,
    PPPPP,
    PPPPPP,
    MF,
    MP,
    FP,
    FZ,
    PF,
    RF,
    RFZ,
    SF,
    SFP,
    SFPP,
    SFZ,
    SFFZ,
    SFZP,
    N,
    /// `<other-dynamics>` text
    Other(String),
}

impl DynamicKind {
    pub fn from_musicxml(tag: &str, text: Option<&str>) -> Self {
        match tag {
            "f" => DynamicKind::F,
            "ff" => DynamicKind::FF,
            "fff" => DynamicKind::FFF,
            "ffff" => DynamicKind::FFFF,
            "fffff" => DynamicKind::FFFFF,
            "ffffff" => DynamicKind::FFFFFF,
            "p" => DynamicKind::P,
            "pp" => DynamicKind::PP,
            "ppp" => DynamicKind::PPP,
            "pppp" => DynamicKind::PPPP,
            "ppppp" => DynamicKind::PPPPP,
            "pppppp" => DynamicKind::PPPPPP,
            "mf" => DynamicKind::MF,
            "mp" => DynamicKind::MP,
            "fp" => DynamicKind::FP,
            "fz" => DynamicKind::FZ,
            "pf" => DynamicKind::PF,
            "rf" => DynamicKind::RF,
            "rfz" => DynamicKind::RFZ,
            "sf" => DynamicKind::SF,
            "sfp" => DynamicKind::SFP,
            "sfpp" => DynamicKind::SFPP,
            "sfz" => DynamicKind::SFZ,
            "sffz" => DynamicKind::SFFZ,
            "sfzp" => DynamicKind::SFZP,
            "n" => DynamicKind::N,
            _ => DynamicKind::Other(text.unwrap_or(tag).to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dynamic {
    pub kind: DynamicKind,
    pub placement: Option<Placement>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Words {
    pub text: String,
    pub placement: Option<Placement>,
    pub font_style: Option<String>,
    pub font_weight: Option<String>,
    pub line: u32,
}

// ─── Spanners ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlurKind {
    Regular,
    Phrasing,
    Dashed,
    Dotted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slur {
    /// Number as written; MusicXML's default is 1
    pub number: Option<u32>,
    pub event: SpannerEvent,
    pub kind: SlurKind,
    pub placement: Option<Placement>,
    pub spanner: Option<SpannerId>,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WedgeKind {
    Crescendo,
    Diminuendo,
    Stop,
    Continue,
    Unknown,
}

impl WedgeKind {
    pub fn from_musicxml(s: &str) -> Self {
        match s.trim() {
            "crescendo" => WedgeKind::Crescendo,
            "diminuendo" => WedgeKind::Diminuendo,
            "stop" => WedgeKind::Stop,
            "continue" => WedgeKind::Continue,
            _ => WedgeKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wedge {
    pub kind: WedgeKind,
    pub number: u32,
    pub niente: bool,
    pub placement: Option<Placement>,
    pub spanner: Option<SpannerId>,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OctaveShiftKind {
    Up,
    Down,
    Stop,
    Continue,
    Unknown,
}

impl OctaveShiftKind {
    pub fn from_musicxml(s: &str) -> Self {
        match s.trim() {
            "up" => OctaveShiftKind::Up,
            "down" => OctaveShiftKind::Down,
            "stop" => OctaveShiftKind::Stop,
            "continue" => OctaveShiftKind::Continue,
            _ => OctaveShiftKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OctaveShift {
    pub kind: OctaveShiftKind,
    /// 8, 15 or 22
    pub size: u32,
    pub number: u32,
    pub spanner: Option<SpannerId>,
    pub line: u32,
}

/// Ligatures, glissandos, slides and wavy lines share this shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSpanner {
    pub number: u32,
    pub event: SpannerEvent,
    pub placement: Option<Placement>,
    /// "solid", "dashed", "dotted", "wavy"
    pub line_type: Option<String>,
    pub text: Option<String>,
    pub spanner: Option<SpannerId>,
    pub line: u32,
}

// ─── Beams, pedals, slashes ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BeamKind {
    Begin,
    Continue,
    End,
    ForwardHook,
    BackwardHook,
    Unknown,
}

impl BeamKind {
    pub fn from_musicxml(s: &str) -> Self {
        match s.trim() {
            "begin" => BeamKind::Begin,
            "continue" => BeamKind::Continue,
            "end" => BeamKind::End,
            "forward hook" => BeamKind::ForwardHook,
            "backward hook" => BeamKind::BackwardHook,
            _ => BeamKind::Unknown,
        }
    }
}

/// Beam grouping information.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Beam {
    /// Beam level (1 = eighth-note beam, 2 = sixteenth-note beam, etc.)
    pub number: u32,
    pub kind: BeamKind,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PedalKind {
    Start,
    Stop,
    Change,
    Continue,
    Sostenuto,
    Resume,
    Discontinue,
    Unknown,
}

impl PedalKind {
    pub fn from_musicxml(s: &str) -> Self {
        match s.trim() {
            "start" => PedalKind::Start,
            "stop" => PedalKind::Stop,
            "change" => PedalKind::Change,
            "continue" => PedalKind::Continue,
            "sostenuto" => PedalKind::Sostenuto,
            "resume" => PedalKind::Resume,
            "discontinue" => PedalKind::Discontinue,
            _ => PedalKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pedal {
    pub kind: PedalKind,
    /// Whether a bracket line is drawn
    pub with_line: bool,
    pub line: u32,
}

/// Slash notation from `<measure-style><slash>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlashMark {
    pub event: SpannerEvent,
    pub use_stems: bool,
    pub slash_type: Option<NoteType>,
    pub line: u32,
}

// ─── Navigation and tuning ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segno {
    pub staff: u32,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coda {
    pub staff: u32,
    pub line: u32,
}

/// Tuning of one string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accord {
    pub string: u32,
    pub step: String,
    pub alter: Option<f64>,
    pub octave: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scordatura {
    pub accords: Vec<Accord>,
    pub line: u32,
}

// ─── Lyrics ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Syllabic {
    Single,
    Begin,
    Middle,
    End,
}

impl Syllabic {
    pub fn from_musicxml(s: &str) -> Option<Self> {
        match s.trim() {
            "single" => Some(Syllabic::Single),
            "begin" => Some(Syllabic::Begin),
            "middle" => Some(Syllabic::Middle),
            "end" => Some(Syllabic::End),
            _ => None,
        }
    }
}

/// One lyric syllable attached to a note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Syllable {
    /// Verse number as written (e.g., "1")
    pub number: String,
    pub syllabic: Syllabic,
    pub text: String,
    /// Melisma extension line follows
    pub extend: bool,
    pub line: u32,
}
