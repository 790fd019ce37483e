//! Integration tests — populate small inline MusicXML documents end to end.

use msrlib::wholes::wholes;
use msrlib::{
    populate_musicxml, BarLineCategory, ChordId, Conversion, GraceAttachment, GraceMember, GraceNotesGroupId,
    NoteContext, NoteId, PopulateOptions, TupletId, VoiceElement,
};
use pretty_assertions::assert_eq;

fn single_part(measures: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 4.0 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">
<score-partwise version="4.0">
  <work><work-title>Scenario</work-title></work>
  <part-list><score-part id="P1"><part-name>Piano</part-name></score-part></part-list>
  <part id="P1">
{measures}
  </part>
</score-partwise>"#
    )
}

fn convert(measures: &str) -> Conversion {
    populate_musicxml(&single_part(measures), &PopulateOptions::default()).expect("conversion failed")
}

fn voice_elements(conversion: &Conversion, staff: u32, voice: u32, measure: usize) -> Vec<VoiceElement> {
    conversion.score.parts[0]
        .voice(staff, voice)
        .expect("voice exists")
        .measures[measure]
        .elements
        .clone()
}

// ─── Tuplets ────────────────────────────────────────────────────────

#[test]
fn triplet_groups_its_three_notes() {
    let conversion = convert(
        r#"<measure number="1">
  <attributes><divisions>3</divisions></attributes>
  <note><pitch><step>C</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice><type>eighth</type>
    <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>
    <notations><tuplet type="start"/></notations></note>
  <note><pitch><step>D</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice><type>eighth</type>
    <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification></note>
  <note><pitch><step>E</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice><type>eighth</type>
    <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>
    <notations><tuplet type="stop"/></notations></note>
</measure>"#,
    );
    assert!(conversion.diagnostics.is_empty(), "{:?}", conversion.diagnostics);

    let arena = &conversion.score.arena;
    assert_eq!(voice_elements(&conversion, 1, 1, 0), vec![VoiceElement::Tuplet(TupletId(0))]);
    assert_eq!(arena.tuplet_notes(TupletId(0)), vec![NoteId(0), NoteId(1), NoteId(2)]);
    assert_eq!(arena.tuplet(TupletId(0)).sounding_wholes, wholes(1, 4));

    let positions: Vec<_> = arena.notes.iter().map(|n| n.position_in_measure).collect();
    assert_eq!(positions, vec![wholes(0, 1), wholes(1, 12), wholes(1, 6)]);
    assert!(arena.notes.iter().all(|n| n.context == NoteContext::InTuplet));
    assert!(arena.notes.iter().all(|n| n.sounding_wholes == wholes(1, 12)));
    assert_eq!(conversion.score.parts[0].voice(1, 1).unwrap().position(), wholes(1, 4));
}

#[test]
fn nested_tuplets_compose_their_factors() {
    let eighth = |step: &str, notations: &str| {
        format!(
            r#"<note><pitch><step>{step}</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice><type>eighth</type>
    <time-modification><actual-notes>9</actual-notes><normal-notes>4</normal-notes></time-modification>{notations}</note>"#
        )
    };
    let quarter = |step: &str, notations: &str| {
        format!(
            r#"<note><pitch><step>{step}</step><octave>4</octave></pitch><duration>6</duration><voice>1</voice><type>quarter</type>
    <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>{notations}</note>"#
        )
    };
    let triplet = |number: u32, kind: &str| {
        format!(
            r#"<tuplet type="{kind}" number="{number}"><tuplet-actual><tuplet-number>3</tuplet-number></tuplet-actual><tuplet-normal><tuplet-number>2</tuplet-number></tuplet-normal></tuplet>"#
        )
    };
    let measure = format!(
        r#"<measure number="1"><attributes><divisions>9</divisions></attributes>
{}
{}
{}
{}
{}
</measure>"#,
        eighth("C", &format!("<notations>{}{}</notations>", triplet(1, "start"), triplet(2, "start"))),
        eighth("D", ""),
        eighth("E", r#"<notations><tuplet type="stop" number="2"/></notations>"#),
        quarter("F", ""),
        quarter("G", r#"<notations><tuplet type="stop" number="1"/></notations>"#),
    );
    let conversion = convert(&measure);
    assert!(conversion.diagnostics.is_empty(), "{:?}", conversion.diagnostics);

    let arena = &conversion.score.arena;
    let outer = TupletId(0);
    let inner = TupletId(1);
    assert_eq!(voice_elements(&conversion, 1, 1, 0), vec![VoiceElement::Tuplet(outer)]);
    assert_eq!(arena.tuplet(inner).sounding_wholes, wholes(1, 6));
    assert_eq!(arena.tuplet(outer).sounding_wholes, wholes(1, 2));
    assert_eq!(arena.tuplet_notes(outer).len(), 5);
    assert_eq!(arena.note(NoteId(0)).sounding_wholes, wholes(1, 18));
    assert_eq!(arena.note(NoteId(3)).sounding_wholes, wholes(1, 6));
    assert_eq!(arena.note(NoteId(3)).position_in_measure, wholes(1, 6));
    assert_eq!(arena.note(NoteId(4)).position_in_measure, wholes(1, 3));
}

// ─── Chords ─────────────────────────────────────────────────────────

#[test]
fn tuplet_stays_open_across_a_backup() {
    let triplet_quarter = |step: &str, notations: &str| {
        format!(
            r#"<note><pitch><step>{step}</step><octave>5</octave></pitch><duration>2</duration><voice>1</voice><staff>1</staff><type>quarter</type>
    <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>{notations}</note>"#
        )
    };
    let conversion = convert(&format!(
        r#"<measure number="1">
  <attributes><divisions>3</divisions><staves>2</staves></attributes>
  {}
  {}
  <backup><duration>4</duration></backup>
  <note><pitch><step>C</step><octave>3</octave></pitch><duration>4</duration><voice>5</voice><staff>2</staff></note>
  {}
</measure>"#,
        triplet_quarter("C", r#"<notations><tuplet type="start"/></notations>"#),
        triplet_quarter("D", ""),
        triplet_quarter("E", r#"<notations><tuplet type="stop"/></notations>"#),
    ));
    assert!(conversion.diagnostics.is_empty(), "{:?}", conversion.diagnostics);

    let arena = &conversion.score.arena;
    assert_eq!(voice_elements(&conversion, 1, 1, 0), vec![VoiceElement::Tuplet(TupletId(0))]);
    assert_eq!(arena.tuplet_notes(TupletId(0)), vec![NoteId(0), NoteId(1), NoteId(3)]);
    assert_eq!(arena.tuplet(TupletId(0)).sounding_wholes, wholes(1, 2));
    assert_eq!(voice_elements(&conversion, 2, 5, 0), vec![VoiceElement::Note(NoteId(2))]);
    assert_eq!(arena.note(NoteId(3)).position_in_measure, wholes(1, 3));
    assert_eq!(conversion.score.parts[0].voice(1, 1).unwrap().position(), wholes(1, 2));
}

#[test]
fn chord_members_share_one_position() {
    let conversion = convert(
        r#"<measure number="1">
  <attributes><divisions>1</divisions></attributes>
  <note><pitch><step>C</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice><type>quarter</type></note>
  <note><chord/><pitch><step>E</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice><type>quarter</type></note>
  <note><chord/><pitch><step>G</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice><type>quarter</type></note>
  <note><pitch><step>D</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice><type>quarter</type></note>
</measure>"#,
    );
    let arena = &conversion.score.arena;
    assert_eq!(
        voice_elements(&conversion, 1, 1, 0),
        vec![VoiceElement::Chord(ChordId(0)), VoiceElement::Note(NoteId(3))]
    );
    assert_eq!(arena.chord(ChordId(0)).notes, vec![NoteId(0), NoteId(1), NoteId(2)]);
    assert_eq!(arena.chord(ChordId(0)).sounding_wholes, wholes(1, 4));
    for id in 0..3 {
        assert_eq!(arena.note(NoteId(id)).context, NoteContext::InChord);
        assert_eq!(arena.note(NoteId(id)).position_in_measure, wholes(0, 1));
    }
    assert_eq!(arena.note(NoteId(3)).position_in_measure, wholes(1, 4));
}

// ─── Harmonies ──────────────────────────────────────────────────────

#[test]
fn two_harmonies_share_a_whole_note() {
    let conversion = convert(
        r#"<measure number="1">
  <attributes><divisions>24</divisions></attributes>
  <harmony><root><root-step>C</root-step></root><kind>major</kind></harmony>
  <harmony><root><root-step>G</root-step></root><kind>dominant</kind><offset>48</offset></harmony>
  <note><pitch><step>C</step><octave>4</octave></pitch><duration>96</duration><voice>1</voice><type>whole</type></note>
</measure>"#,
    );
    assert!(conversion.diagnostics.is_empty(), "{:?}", conversion.diagnostics);
    let harmonies = &conversion.score.parts[0].measures[0].harmonies;
    let summary: Vec<_> = harmonies
        .iter()
        .map(|h| {
            (
                h.root.as_ref().map(|r| r.step.clone()),
                h.sounding_wholes,
                h.position_in_measure,
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (Some("C".to_string()), wholes(1, 2), wholes(0, 1)),
            (Some("G".to_string()), wholes(1, 2), wholes(1, 2)),
        ]
    );
}

#[test]
fn trailing_harmony_gets_zero_duration() {
    let conversion = convert(
        r#"<measure number="1">
  <attributes><divisions>1</divisions></attributes>
  <note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration><voice>1</voice><type>whole</type></note>
  <harmony><root><root-step>F</root-step></root><kind>major</kind></harmony>
</measure>"#,
    );
    let harmony = &conversion.score.parts[0].measures[0].harmonies[0];
    assert_eq!(harmony.sounding_wholes, wholes(0, 1));
    assert_eq!(harmony.position_in_measure, wholes(1, 1));
    assert_eq!(conversion.diagnostics.len(), 1);
}

// ─── Barlines and repeats ───────────────────────────────────────────

#[test]
fn hooked_ending_closes_an_implicit_repeat() {
    let whole = r#"<note><rest/><duration>4</duration><voice>1</voice><type>whole</type></note>"#;
    let conversion = convert(&format!(
        r#"<measure number="1"><attributes><divisions>1</divisions></attributes>{whole}</measure>
<measure number="2">
  <barline location="left"><ending number="1" type="start">1.</ending></barline>
  {whole}
  <barline location="right"><bar-style>light-heavy</bar-style><ending number="1" type="stop"/><repeat direction="backward"/></barline>
</measure>"#
    ));
    assert!(conversion.diagnostics.is_empty(), "{:?}", conversion.diagnostics);

    let part = &conversion.score.parts[0];
    let categories: Vec<_> = part.measures[1].barlines.iter().map(|b| b.category).collect();
    assert_eq!(
        categories,
        vec![BarLineCategory::HookedEndingStart, BarLineCategory::HookedEndingEnd]
    );
    assert_eq!(part.repeats.len(), 1);
    let repeat = &part.repeats[0];
    assert!(repeat.implicit_start);
    assert_eq!(repeat.start_measure, "1");
    assert_eq!(repeat.end_measure.as_deref(), Some("2"));
    assert_eq!(repeat.times, 2);
    assert_eq!(repeat.endings.len(), 1);
    assert!(repeat.endings[0].hooked);
    assert_eq!(repeat.endings[0].number, "1");
}

// ─── Cursor and padding ─────────────────────────────────────────────

#[test]
fn forward_pads_the_skipped_voice_at_measure_end() {
    let conversion = convert(
        r#"<measure number="1">
  <attributes><divisions>1</divisions></attributes>
  <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><voice>1</voice><type>whole</type></note>
  <backup><duration>4</duration></backup>
  <forward><duration>1</duration><voice>2</voice></forward>
</measure>"#,
    );
    assert!(conversion.diagnostics.is_empty(), "{:?}", conversion.diagnostics);
    assert_eq!(
        voice_elements(&conversion, 1, 2, 0),
        vec![VoiceElement::Padding { duration: wholes(1, 4) }]
    );
}

#[test]
fn lagging_voice_is_padded_before_its_note() {
    let conversion = convert(
        r#"<measure number="1">
  <attributes><divisions>1</divisions></attributes>
  <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><voice>1</voice><type>whole</type></note>
  <backup><duration>4</duration></backup>
  <forward><duration>2</duration><voice>2</voice></forward>
  <note><pitch><step>E</step><octave>4</octave></pitch><duration>2</duration><voice>2</voice><type>half</type></note>
</measure>"#,
    );
    assert_eq!(
        voice_elements(&conversion, 1, 2, 0),
        vec![VoiceElement::Padding { duration: wholes(1, 2) }, VoiceElement::Note(NoteId(1))]
    );
    assert_eq!(conversion.score.arena.note(NoteId(1)).position_in_measure, wholes(1, 2));
    assert_eq!(conversion.score.parts[0].voice(1, 2).unwrap().position(), wholes(1, 1));
}

// ─── Grace notes ────────────────────────────────────────────────────

#[test]
fn grace_notes_attach_before_the_next_note() {
    let conversion = convert(
        r#"<measure number="1">
  <attributes><divisions>1</divisions></attributes>
  <note><grace slash="yes"/><pitch><step>B</step><octave>4</octave></pitch><voice>1</voice><type>eighth</type></note>
  <note><grace/><pitch><step>D</step><octave>5</octave></pitch><voice>1</voice><type>eighth</type></note>
  <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><voice>1</voice><type>whole</type></note>
</measure>"#,
    );
    assert!(conversion.diagnostics.is_empty(), "{:?}", conversion.diagnostics);

    let arena = &conversion.score.arena;
    let group = GraceNotesGroupId(0);
    assert_eq!(arena.note(NoteId(2)).grace_notes_group_before, Some(group));
    assert_eq!(arena.grace_notes_group(group).attachment, GraceAttachment::Before(NoteId(2)));
    assert_eq!(arena.grace_notes_group(group).members.len(), 2);
    assert!(arena.grace_notes_group(group).slashed);
    assert_eq!(arena.note(NoteId(0)).sounding_wholes, wholes(0, 1));
    assert_eq!(voice_elements(&conversion, 1, 1, 0), vec![VoiceElement::Note(NoteId(2))]);
    assert_eq!(arena.note(NoteId(2)).position_in_measure, wholes(0, 1));
}

#[test]
fn trailing_grace_notes_attach_after_the_previous_note() {
    let conversion = convert(
        r#"<measure number="1">
  <attributes><divisions>1</divisions></attributes>
  <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><voice>1</voice><type>whole</type></note>
  <note><grace/><pitch><step>D</step><octave>5</octave></pitch><voice>1</voice><type>16th</type></note>
</measure>"#,
    );
    let arena = &conversion.score.arena;
    let group = GraceNotesGroupId(0);
    assert_eq!(arena.note(NoteId(0)).grace_notes_group_after, Some(group));
    assert_eq!(arena.grace_notes_group(group).attachment, GraceAttachment::After(NoteId(0)));
}

#[test]
fn grace_tuplet_sits_in_its_grace_group() {
    let grace = |step: &str, notations: &str| {
        format!(
            r#"<note><grace/><pitch><step>{step}</step><octave>5</octave></pitch><voice>1</voice><type>16th</type>
    <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>{notations}</note>"#
        )
    };
    let conversion = convert(&format!(
        r#"<measure number="1">
  <attributes><divisions>1</divisions></attributes>
  {}
  {}
  {}
  <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><voice>1</voice><type>whole</type></note>
</measure>"#,
        grace("D", r#"<notations><tuplet type="start"/></notations>"#),
        grace("E", ""),
        grace("F", r#"<notations><tuplet type="stop"/></notations>"#),
    ));
    assert!(conversion.diagnostics.is_empty(), "{:?}", conversion.diagnostics);

    let arena = &conversion.score.arena;
    let group = GraceNotesGroupId(0);
    assert_eq!(voice_elements(&conversion, 1, 1, 0), vec![VoiceElement::Note(NoteId(3))]);
    assert_eq!(arena.grace_notes_group(group).members, vec![GraceMember::Tuplet(TupletId(0))]);
    assert_eq!(arena.grace_notes_group(group).attachment, GraceAttachment::Before(NoteId(3)));
    assert_eq!(arena.tuplet_notes(TupletId(0)), vec![NoteId(0), NoteId(1), NoteId(2)]);
    assert_eq!(arena.note(NoteId(3)).position_in_measure, wholes(0, 1));
}

// ─── Voices and staves ──────────────────────────────────────────────

#[test]
fn voice_number_reused_on_another_staff_after_backup() {
    let conversion = convert(
        r#"<measure number="1">
  <attributes><divisions>1</divisions><staves>2</staves></attributes>
  <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><voice>1</voice><staff>1</staff><type>whole</type></note>
  <backup><duration>4</duration></backup>
  <note><pitch><step>C</step><octave>3</octave></pitch><duration>4</duration><voice>1</voice><staff>2</staff><type>whole</type></note>
</measure>"#,
    );
    assert!(conversion.diagnostics.is_empty(), "{:?}", conversion.diagnostics);

    let part = &conversion.score.parts[0];
    assert_eq!(voice_elements(&conversion, 1, 1, 0), vec![VoiceElement::Note(NoteId(0))]);
    assert_eq!(voice_elements(&conversion, 2, 1, 0), vec![VoiceElement::Note(NoteId(1))]);
    assert_eq!(part.voice(1, 1).unwrap().position(), wholes(1, 1));
    assert_eq!(part.voice(2, 1).unwrap().position(), wholes(1, 1));
    assert_eq!(conversion.score.arena.note(NoteId(1)).position_in_measure, wholes(0, 1));
}

#[test]
fn harmony_after_backup_goes_to_its_own_staff() {
    let conversion = convert(
        r#"<measure number="1">
  <attributes><divisions>1</divisions><staves>2</staves></attributes>
  <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><voice>1</voice><staff>1</staff><type>whole</type></note>
  <backup><duration>4</duration></backup>
  <harmony><root><root-step>F</root-step></root><kind>major</kind><staff>2</staff></harmony>
  <note><pitch><step>F</step><octave>3</octave></pitch><duration>4</duration><voice>5</voice><staff>2</staff><type>whole</type></note>
</measure>"#,
    );
    assert!(conversion.diagnostics.is_empty(), "{:?}", conversion.diagnostics);

    let harmony = &conversion.score.parts[0].measures[0].harmonies[0];
    assert_eq!((harmony.staff, harmony.voice), (2, 5));
    assert_eq!(harmony.position_in_measure, wholes(0, 1));
    assert_eq!(harmony.sounding_wholes, wholes(1, 1));
}
