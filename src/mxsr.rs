//! MXSR — the MusicXML element tree, visited in document order.
//!
//! The tree is built once from MusicXML text with `roxmltree` and then
//! browsed depth-first; visitors receive an `enter` and an `exit`
//! notification per element. Each element is classified into the closed
//! [`ElementKind`] set so that visitors can match exhaustively instead of
//! comparing tag strings.

use roxmltree::{Document, Node};

use crate::error::PopulateError;

/// Parse a MusicXML XML string into an MXSR tree rooted at `<score-partwise>`.
pub fn parse_mxsr(xml: &str) -> Result<MxsrElement, PopulateError> {
    // MusicXML files include a DOCTYPE declaration, so we must allow DTDs
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(xml, options)
        .map_err(|e| PopulateError::Xml(e.to_string()))?;
    let root = doc.root_element();

    // Verify this is a score-partwise document
    if root.tag_name().name() != "score-partwise" {
        return Err(PopulateError::UnsupportedRoot(
            root.tag_name().name().to_string(),
        ));
    }

    let lines = LineStarts::new(xml);
    Ok(build_element(&lines, &root))
}

/// Byte offsets at which input lines start, for offset-to-line lookups.
struct LineStarts(Vec<usize>);

impl LineStarts {
    fn new(text: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self(starts)
    }

    /// 1-based line holding byte `offset`.
    fn line_of(&self, offset: usize) -> u32 {
        self.0.partition_point(|&start| start <= offset) as u32
    }
}

fn build_element(lines: &LineStarts, node: &Node) -> MxsrElement {
    let name = node.tag_name().name().to_string();
    let line = lines.line_of(node.range().start);
    let attributes = node
        .attributes()
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect();
    let text = node
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from);
    let children = node
        .children()
        .filter(|n| n.is_element())
        .map(|n| build_element(lines, &n))
        .collect();

    MxsrElement {
        kind: ElementKind::from_tag(&name),
        name,
        attributes,
        text,
        line,
        children,
    }
}

// ─── Elements ────────────────────────────────────────────────────────

/// One MusicXML element with its attributes, text and children.
#[derive(Debug, Clone, PartialEq)]
pub struct MxsrElement {
    pub kind: ElementKind,
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    /// 1-based input line of the start tag
    pub line: u32,
    pub children: Vec<MxsrElement>,
}

impl MxsrElement {
    /// Create a bare element, mostly useful for tests and synthetic input.
    pub fn new(name: &str) -> Self {
        Self {
            kind: ElementKind::from_tag(name),
            name: name.to_string(),
            attributes: Vec::new(),
            text: None,
            line: 0,
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attribute_i64(&self, name: &str) -> Option<i64> {
        self.attribute(name)?.trim().parse().ok()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn text_i64(&self) -> Option<i64> {
        let t = self.text()?;
        t.parse::<i64>()
            .ok()
            .or_else(|| t.parse::<f64>().ok().map(|v| v.round() as i64))
    }

    pub fn text_f64(&self) -> Option<f64> {
        self.text()?.parse().ok()
    }

    pub fn child(&self, name: &str) -> Option<&MxsrElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MxsrElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)?.text()
    }

    pub fn child_i64(&self, name: &str) -> Option<i64> {
        self.child(name)?.text_i64()
    }

    pub fn child_f64(&self, name: &str) -> Option<f64> {
        self.child(name)?.text_f64()
    }
}

/// The MusicXML element categories the skeleton builder and the populator
/// react to. Everything else is [`ElementKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    // score header
    ScorePartwise,
    Work,
    MovementTitle,
    Identification,
    PartList,
    ScorePart,

    // part structure
    Part,
    Measure,
    Attributes,
    Divisions,
    Staves,
    Key,
    Time,
    Clef,
    Transpose,
    MeasureStyle,
    MultipleRest,
    MeasureRepeat,
    Slash,

    // notes
    Note,
    Grace,
    Cue,
    Chord,
    Pitch,
    Unpitched,
    Rest,
    Duration,
    Tie,
    Voice,
    Type,
    Dot,
    Accidental,
    TimeModification,
    Stem,
    Notehead,
    Staff,
    Beam,
    Lyric,

    // notations
    Notations,
    Tied,
    Slur,
    Tuplet,
    Glissando,
    Slide,
    Ornaments,
    Technical,
    Articulations,
    Dynamics,
    Fermata,
    Arpeggiate,
    NonArpeggiate,

    // cursor
    Backup,
    Forward,

    // directions
    Direction,
    DirectionType,
    Words,
    Wedge,
    OctaveShift,
    Metronome,
    Pedal,
    Segno,
    Coda,
    Rehearsal,
    Scordatura,
    Bracket,
    Offset,

    // harmonies and figured basses
    Harmony,
    FiguredBass,

    // barlines
    Barline,
    BarStyle,
    Repeat,
    Ending,

    Print,
    Other,
}

impl ElementKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "score-partwise" => ElementKind::ScorePartwise,
            "work" => ElementKind::Work,
            "movement-title" => ElementKind::MovementTitle,
            "identification" => ElementKind::Identification,
            "part-list" => ElementKind::PartList,
            "score-part" => ElementKind::ScorePart,

            "part" => ElementKind::Part,
            "measure" => ElementKind::Measure,
            "attributes" => ElementKind::Attributes,
            "divisions" => ElementKind::Divisions,
            "staves" => ElementKind::Staves,
            "key" => ElementKind::Key,
            "time" => ElementKind::Time,
            "clef" => ElementKind::Clef,
            "transpose" => ElementKind::Transpose,
            "measure-style" => ElementKind::MeasureStyle,
            "multiple-rest" => ElementKind::MultipleRest,
            "measure-repeat" => ElementKind::MeasureRepeat,
            "slash" => ElementKind::Slash,

            "note" => ElementKind::Note,
            "grace" => ElementKind::Grace,
            "cue" => ElementKind::Cue,
            "chord" => ElementKind::Chord,
            "pitch" => ElementKind::Pitch,
            "unpitched" => ElementKind::Unpitched,
            "rest" => ElementKind::Rest,
            "duration" => ElementKind::Duration,
            "tie" => ElementKind::Tie,
            "voice" => ElementKind::Voice,
            "type" => ElementKind::Type,
            "dot" => ElementKind::Dot,
            "accidental" => ElementKind::Accidental,
            "time-modification" => ElementKind::TimeModification,
            "stem" => ElementKind::Stem,
            "notehead" => ElementKind::Notehead,
            "staff" => ElementKind::Staff,
            "beam" => ElementKind::Beam,
            "lyric" => ElementKind::Lyric,

            "notations" => ElementKind::Notations,
            "tied" => ElementKind::Tied,
            "slur" => ElementKind::Slur,
            "tuplet" => ElementKind::Tuplet,
            "glissando" => ElementKind::Glissando,
            "slide" => ElementKind::Slide,
            "ornaments" => ElementKind::Ornaments,
            "technical" => ElementKind::Technical,
            "articulations" => ElementKind::Articulations,
            "dynamics" => ElementKind::Dynamics,
            "fermata" => ElementKind::Fermata,
            "arpeggiate" => ElementKind::Arpeggiate,
            "non-arpeggiate" => ElementKind::NonArpeggiate,

            "backup" => ElementKind::Backup,
            "forward" => ElementKind::Forward,

            "direction" => ElementKind::Direction,
            "direction-type" => ElementKind::DirectionType,
            "words" => ElementKind::Words,
            "wedge" => ElementKind::Wedge,
            "octave-shift" => ElementKind::OctaveShift,
            "metronome" => ElementKind::Metronome,
            "pedal" => ElementKind::Pedal,
            "segno" => ElementKind::Segno,
            "coda" => ElementKind::Coda,
            "rehearsal" => ElementKind::Rehearsal,
            "scordatura" => ElementKind::Scordatura,
            "bracket" => ElementKind::Bracket,
            "offset" => ElementKind::Offset,

            "harmony" => ElementKind::Harmony,
            "figured-bass" => ElementKind::FiguredBass,

            "barline" => ElementKind::Barline,
            "bar-style" => ElementKind::BarStyle,
            "repeat" => ElementKind::Repeat,
            "ending" => ElementKind::Ending,

            "print" => ElementKind::Print,
            _ => ElementKind::Other,
        }
    }
}

// ─── Traversal ───────────────────────────────────────────────────────

/// Whether `browse` should descend into an entered element's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Children,
    SkipChildren,
}

/// Receives enter/exit notifications during a depth-first traversal.
pub trait Visitor {
    type Error;

    fn enter(&mut self, element: &MxsrElement) -> Result<Visit, Self::Error>;

    fn exit(&mut self, element: &MxsrElement) -> Result<(), Self::Error>;
}

/// Browse `element` and its descendants in document order.
///
/// `exit` is always called for an entered element, even when its children
/// were skipped. The first error aborts the traversal.
pub fn browse<V: Visitor>(element: &MxsrElement, visitor: &mut V) -> Result<(), V::Error> {
    if visitor.enter(element)? == Visit::Children {
        for child in &element.children {
            browse(child, visitor)?;
        }
    }
    visitor.exit(element)
}
