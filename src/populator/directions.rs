//! Directions, prints and measure-style slashes.
//!
//! A `<direction>` is gathered whole, then its items are queued: tempos and
//! rehearsal marks at part level, everything else at note level, to be
//! attached to the next note.

use crate::msr::{
    Accord, Coda, Dynamic, LineSpanner, OctaveShift, OctaveShiftKind, Pedal, PedalKind, Placement,
    RehearsalMark, Scordatura, Segno, SlashMark, SpannerEvent, Tempo, Wedge, WedgeKind, Words,
};
use crate::mxsr::{ElementKind, MxsrElement, Visit};
use crate::wholes::NoteType;

use super::note::{dynamics_of, line_spanner};
use super::SkeletonPopulator;

/// One thing a direction says.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectionItem {
    Words(Words),
    Dynamic(Dynamic),
    Wedge(Wedge),
    OctaveShift(OctaveShift),
    Tempo(Tempo),
    Pedal(Pedal),
    Segno { line: u32 },
    Coda { line: u32 },
    Rehearsal(RehearsalMark),
    Scordatura(Scordatura),
    Ligature(LineSpanner),
}

/// Everything a `<direction>` element says.
#[derive(Debug, Clone)]
pub struct DirectionAccumulator {
    pub line: u32,
    pub placement: Option<Placement>,
    pub staff: Option<u32>,
    pub items: Vec<DirectionItem>,
    pub warnings: Vec<(u32, String)>,
}

impl DirectionAccumulator {
    pub fn new(element: &MxsrElement) -> Self {
        Self {
            line: element.line,
            placement: Placement::from_musicxml(element.attribute("placement")),
            staff: None,
            items: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn enter(&mut self, element: &MxsrElement) -> Visit {
        let line = element.line;
        match element.kind {
            ElementKind::Words => {
                if let Some(text) = element.text() {
                    self.items.push(DirectionItem::Words(Words {
                        text: text.to_string(),
                        placement: self.placement,
                        font_style: element.attribute("font-style").map(String::from),
                        font_weight: element.attribute("font-weight").map(String::from),
                        line,
                    }));
                }
            }
            ElementKind::Dynamics => {
                let placement = Placement::from_musicxml(element.attribute("placement")).or(self.placement);
                self.items
                    .extend(dynamics_of(element, placement).into_iter().map(DirectionItem::Dynamic));
            }
            ElementKind::Wedge => {
                let text = element.attribute("type").unwrap_or("");
                let kind = WedgeKind::from_musicxml(text);
                if kind == WedgeKind::Unknown {
                    self.warnings.push((line, format!("wedge type '{text}' is unknown")));
                }
                self.items.push(DirectionItem::Wedge(Wedge {
                    kind,
                    number: element.attribute_i64("number").unwrap_or(1).max(1) as u32,
                    niente: element.attribute("niente") == Some("yes"),
                    placement: self.placement,
                    spanner: None,
                    line,
                }));
            }
            ElementKind::OctaveShift => {
                let text = element.attribute("type").unwrap_or("");
                let kind = OctaveShiftKind::from_musicxml(text);
                if kind == OctaveShiftKind::Unknown {
                    self.warnings.push((line, format!("octave shift type '{text}' is unknown")));
                }
                self.items.push(DirectionItem::OctaveShift(OctaveShift {
                    kind,
                    size: element.attribute_i64("size").unwrap_or(8).max(0) as u32,
                    number: element.attribute_i64("number").unwrap_or(1).max(1) as u32,
                    spanner: None,
                    line,
                }));
            }
            ElementKind::Metronome => {
                let beat_unit = element.child_text("beat-unit").and_then(NoteType::from_musicxml);
                if beat_unit.is_none() {
                    self.warnings.push((line, "metronome without a known beat unit".to_string()));
                }
                self.items.push(DirectionItem::Tempo(Tempo {
                    beat_unit,
                    beat_unit_dots: element.children_named("beat-unit-dot").count().min(u8::MAX as usize) as u8,
                    per_minute: element.child_text("per-minute").map(String::from),
                    parentheses: element.attribute("parentheses") == Some("yes"),
                    staff: 1,
                    line,
                }));
            }
            ElementKind::Pedal => {
                let text = element.attribute("type").unwrap_or("");
                let kind = PedalKind::from_musicxml(text);
                if kind == PedalKind::Unknown {
                    self.warnings.push((line, format!("pedal type '{text}' is unknown")));
                }
                self.items.push(DirectionItem::Pedal(Pedal {
                    kind,
                    with_line: element.attribute("line") == Some("yes"),
                    line,
                }));
            }
            ElementKind::Segno => self.items.push(DirectionItem::Segno { line }),
            ElementKind::Coda => self.items.push(DirectionItem::Coda { line }),
            ElementKind::Rehearsal => self.items.push(DirectionItem::Rehearsal(RehearsalMark {
                text: element.text().unwrap_or("").to_string(),
                line,
            })),
            ElementKind::Scordatura => {
                let accords = element
                    .children_named("accord")
                    .map(|accord| Accord {
                        string: accord.attribute_i64("string").unwrap_or(1).max(1) as u32,
                        step: accord.child_text("tuning-step").unwrap_or("C").to_string(),
                        alter: accord.child_f64("tuning-alter"),
                        octave: accord.child_i64("tuning-octave").unwrap_or(4) as i32,
                    })
                    .collect();
                self.items.push(DirectionItem::Scordatura(Scordatura { accords, line }));
            }
            ElementKind::Bracket => match line_spanner(element, self.placement) {
                Some(spanner) => self.items.push(DirectionItem::Ligature(spanner)),
                None => self.warnings.push((line, "bracket without a known type".to_string())),
            },
            ElementKind::Staff => self.staff = element.text_i64().map(|s| s.max(1) as u32),
            ElementKind::DirectionType => return Visit::Children,
            _ => {}
        }
        Visit::SkipChildren
    }
}

impl SkeletonPopulator<'_> {
    /// Queue what a closed `<direction>` said.
    pub(super) fn finalize_direction(&mut self, mut acc: DirectionAccumulator) {
        for (line, message) in std::mem::take(&mut acc.warnings) {
            self.warn(line, message);
        }
        let staff = acc.staff.unwrap_or(1);
        let options = self.options;
        let q = &mut self.pending;
        for item in acc.items {
            match item {
                DirectionItem::Words(words) if !options.ignore.words => q.words.push(words),
                DirectionItem::Dynamic(dynamic) if !options.ignore.dynamics => q.dynamics.push(dynamic),
                DirectionItem::Wedge(wedge) if !options.ignore.wedges => q.wedges.push(wedge),
                DirectionItem::Words(_) | DirectionItem::Dynamic(_) | DirectionItem::Wedge(_) => {}
                DirectionItem::OctaveShift(shift) => q.octave_shifts.push(shift),
                DirectionItem::Tempo(mut tempo) => {
                    tempo.staff = staff;
                    q.tempos.push(tempo);
                }
                DirectionItem::Pedal(pedal) => q.pedals.push(pedal),
                DirectionItem::Segno { line } => q.segnos.push(Segno { staff, line }),
                DirectionItem::Coda { line } => q.codas.push(Coda { staff, line }),
                DirectionItem::Rehearsal(mark) => q.rehearsal_marks.push(mark),
                DirectionItem::Scordatura(scordatura) => q.scordaturas.push(scordatura),
                DirectionItem::Ligature(ligature) => q.ligatures.push(ligature),
            }
        }
    }

    /// `<print>`: line and page breaks for the current measure.
    pub(super) fn handle_print(&mut self, element: &MxsrElement) {
        if element.attribute("new-system") == Some("yes") {
            self.pending.line_breaks += 1;
        }
        if element.attribute("new-page") == Some("yes") {
            self.pending.page_breaks += 1;
        }
        self.drain_part_level_queues();
    }

    /// `<measure-style><slash>`: queued for the next note like a direction.
    pub(super) fn handle_slash_style(&mut self, element: &MxsrElement) {
        let Some(event) = element.attribute("type").and_then(SpannerEvent::from_musicxml) else {
            self.warn(element.line, "slash without a known type");
            return;
        };
        self.pending.slashes.push(SlashMark {
            event,
            use_stems: element.attribute("use-stems") == Some("yes"),
            slash_type: element.child_text("slash-type").and_then(NoteType::from_musicxml),
            line: element.line,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msr::DynamicKind;
    use crate::mxsr::{browse, parse_mxsr, Visitor};

    struct Gather(Option<DirectionAccumulator>);

    impl Visitor for Gather {
        type Error = ();

        fn enter(&mut self, element: &MxsrElement) -> Result<Visit, ()> {
            match (&mut self.0, element.kind) {
                (None, ElementKind::Direction) => {
                    self.0 = Some(DirectionAccumulator::new(element));
                    Ok(Visit::Children)
                }
                (Some(acc), _) => Ok(acc.enter(element)),
                (None, _) => Ok(Visit::Children),
            }
        }

        fn exit(&mut self, _element: &MxsrElement) -> Result<(), ()> {
            Ok(())
        }
    }

    fn gather(direction_xml: &str) -> DirectionAccumulator {
        let xml = format!("<score-partwise><part id=\"P1\"><measure number=\"1\">{direction_xml}</measure></part></score-partwise>");
        let root = parse_mxsr(&xml).unwrap();
        let mut gather = Gather(None);
        browse(&root, &mut gather).unwrap();
        gather.0.unwrap()
    }

    #[test]
    fn gathers_words_dynamics_and_staff() {
        let acc = gather(
            r#"<direction placement="below">
  <direction-type><words font-style="italic">dolce</words></direction-type>
  <direction-type><dynamics><mf/></dynamics></direction-type>
  <staff>2</staff>
</direction>"#,
        );
        assert_eq!(acc.staff, Some(2));
        assert_eq!(acc.items.len(), 2);
        match &acc.items[0] {
            DirectionItem::Words(w) => {
                assert_eq!(w.text, "dolce");
                assert_eq!(w.placement, Some(Placement::Below));
                assert_eq!(w.font_style.as_deref(), Some("italic"));
            }
            other => panic!("expected words, got {other:?}"),
        }
        match &acc.items[1] {
            DirectionItem::Dynamic(d) => assert_eq!(d.kind, DynamicKind::MF),
            other => panic!("expected a dynamic, got {other:?}"),
        }
    }

    #[test]
    fn gathers_metronome_and_spanners() {
        let acc = gather(
            r#"<direction>
  <direction-type><metronome parentheses="yes"><beat-unit>quarter</beat-unit><beat-unit-dot/><per-minute>60</per-minute></metronome></direction-type>
  <direction-type><wedge type="crescendo" number="2"/></direction-type>
  <direction-type><bracket type="start" line-type="solid"/></direction-type>
  <direction-type><octave-shift type="sideways"/></direction-type>
</direction>"#,
        );
        match &acc.items[0] {
            DirectionItem::Tempo(t) => {
                assert_eq!(t.beat_unit, Some(NoteType::Quarter));
                assert_eq!(t.beat_unit_dots, 1);
                assert_eq!(t.per_minute.as_deref(), Some("60"));
                assert!(t.parentheses);
            }
            other => panic!("expected a tempo, got {other:?}"),
        }
        match &acc.items[1] {
            DirectionItem::Wedge(w) => assert_eq!((w.kind, w.number), (WedgeKind::Crescendo, 2)),
            other => panic!("expected a wedge, got {other:?}"),
        }
        assert!(matches!(&acc.items[2], DirectionItem::Ligature(l) if l.event == SpannerEvent::Start));
        assert_eq!(acc.warnings.len(), 1);
    }
}
