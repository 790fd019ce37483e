//! Barline classification and repeat bookkeeping.
//!
//! A `<barline>`'s children are gathered into a [`BarLineAccumulator`];
//! when the element closes, [`classify`] decides its category and the
//! repeat effects it has on the part. The classifier itself never touches
//! the score.

use crate::msr::{
    BarLine, BarLineCategory, BarLineId, BarLineLocation, BarStyle, EndingType, RepeatDirection,
    RepeatEnding,
};
use crate::mxsr::{ElementKind, MxsrElement, Visit};

/// Raw barline attributes gathered while the element's children are visited.
#[derive(Debug, Clone, Default)]
pub struct BarLineAccumulator {
    pub line: u32,
    /// `None` when the location attribute holds an unknown value
    pub location: Option<BarLineLocation>,
    pub location_text: Option<String>,
    pub style: Option<BarStyle>,
    pub style_text: Option<String>,
    pub repeat_direction: Option<RepeatDirection>,
    pub repeat_times: Option<u32>,
    pub ending_number: Option<String>,
    pub ending_type: Option<EndingType>,
    pub ending_text: Option<String>,
    pub segno: bool,
    pub coda: bool,
    pub fermata: bool,
}

impl BarLineAccumulator {
    pub fn new(element: &MxsrElement) -> Self {
        let location_text = element.attribute("location").map(String::from);
        Self {
            line: element.line,
            location: BarLineLocation::from_musicxml(location_text.as_deref()),
            location_text,
            ..Self::default()
        }
    }

    pub fn enter(&mut self, element: &MxsrElement) -> Visit {
        match element.kind {
            ElementKind::BarStyle => {
                if let Some(text) = element.text() {
                    self.style = Some(BarStyle::from_musicxml(text));
                    self.style_text = Some(text.to_string());
                }
            }
            ElementKind::Repeat => {
                self.repeat_direction = match element.attribute("direction") {
                    Some("forward") => Some(RepeatDirection::Forward),
                    Some("backward") => Some(RepeatDirection::Backward),
                    _ => None,
                };
                self.repeat_times = element.attribute_i64("times").map(|t| t.max(1) as u32);
            }
            ElementKind::Ending => {
                self.ending_number = element.attribute("number").map(String::from);
                self.ending_type = element.attribute("type").and_then(EndingType::from_musicxml);
                self.ending_text = element.text().map(String::from);
            }
            ElementKind::Segno => self.segno = true,
            ElementKind::Coda => self.coda = true,
            ElementKind::Fermata => self.fermata = true,
            _ => {}
        }
        Visit::SkipChildren
    }

    fn has_decoration(&self) -> bool {
        self.style.is_some() || self.segno || self.coda || self.fermata
    }
}

// ─── Classification ─────────────────────────────────────────────────

/// The ending-start barline waiting for its end.
#[derive(Debug, Clone, PartialEq)]
struct OpenEnding {
    barline: BarLineId,
    number: String,
    start_measure: String,
}

/// Repeat state carried across barlines of one part.
#[derive(Debug, Default)]
pub struct RepeatTracker {
    pending_repeat_start: Option<String>,
    open_ending: Option<OpenEnding>,
    next_barline: u32,
}

/// A change the classified barline makes to the part.
#[derive(Debug, Clone, PartialEq)]
pub enum RepeatEffect {
    RepeatStart { measure: String },
    RepeatEnd { start_measure: String, end_measure: String, times: u32 },
    /// The ending-start barline takes its final category.
    ReclassifyStart { barline: BarLineId, category: BarLineCategory },
    Ending(RepeatEnding),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BarLineOutcome {
    Append {
        barline: BarLine,
        effects: Vec<RepeatEffect>,
        warnings: Vec<String>,
    },
    Dropped { warning: String },
    Fatal { message: String },
}

impl RepeatTracker {
    pub fn reset(&mut self) {
        self.pending_repeat_start = None;
        self.open_ending = None;
    }

    fn next_id(&mut self) -> BarLineId {
        self.next_barline += 1;
        BarLineId(self.next_barline)
    }
}

/// Classify a closed `<barline>` in measure `measure` of a part whose first
/// measure is `first_measure`.
pub fn classify(
    acc: &BarLineAccumulator,
    tracker: &mut RepeatTracker,
    measure: &str,
    first_measure: &str,
) -> BarLineOutcome {
    let location = match acc.location {
        Some(location) => location,
        None => {
            return BarLineOutcome::Dropped {
                warning: format!(
                    "barline location '{}' is unknown",
                    acc.location_text.as_deref().unwrap_or("")
                ),
            }
        }
    };

    let mut warnings = Vec::new();
    if acc.style == Some(BarStyle::Unknown) {
        warnings.push(format!(
            "bar style '{}' is unknown",
            acc.style_text.as_deref().unwrap_or("")
        ));
    }

    let mut effects = Vec::new();
    let id = tracker.next_id();
    let category = match location {
        BarLineLocation::Left => {
            let ending_start = acc.ending_type == Some(EndingType::Start);
            let repeat_forward = acc.repeat_direction == Some(RepeatDirection::Forward);
            if repeat_forward {
                tracker.pending_repeat_start = Some(measure.to_string());
                effects.push(RepeatEffect::RepeatStart {
                    measure: measure.to_string(),
                });
            }
            if ending_start {
                if let Some(previous) = &tracker.open_ending {
                    warnings.push(format!(
                        "ending '{}' started in measure {} was never closed",
                        previous.number, previous.start_measure
                    ));
                }
                tracker.open_ending = Some(OpenEnding {
                    barline: id,
                    number: acc.ending_number.clone().unwrap_or_default(),
                    start_measure: measure.to_string(),
                });
                // provisional until the ending's end is seen
                BarLineCategory::HookedEndingStart
            } else if repeat_forward {
                BarLineCategory::RepeatStart
            } else {
                return BarLineOutcome::Fatal {
                    message: "left barline is neither a repeat start nor an ending start".to_string(),
                };
            }
        }
        BarLineLocation::Right | BarLineLocation::Middle => {
            let repeat_backward = acc.repeat_direction == Some(RepeatDirection::Backward);
            let ending_end = match acc.ending_type {
                Some(EndingType::Stop) => Some(true),
                Some(EndingType::Discontinue) => Some(false),
                _ => None,
            };

            let mut category = None;
            if let Some(hooked) = ending_end {
                match tracker.open_ending.take() {
                    Some(open) => {
                        let (start_category, end_category) = if hooked {
                            (BarLineCategory::HookedEndingStart, BarLineCategory::HookedEndingEnd)
                        } else {
                            (BarLineCategory::HooklessEndingStart, BarLineCategory::HooklessEndingEnd)
                        };
                        effects.push(RepeatEffect::ReclassifyStart {
                            barline: open.barline,
                            category: start_category,
                        });
                        category = Some(end_category);
                        if repeat_backward {
                            effects.push(repeat_end(acc, tracker, measure, first_measure));
                        }
                        effects.push(RepeatEffect::Ending(RepeatEnding {
                            number: acc.ending_number.clone().unwrap_or(open.number),
                            hooked,
                            start_measure: open.start_measure,
                            end_measure: measure.to_string(),
                        }));
                    }
                    None => warnings.push("ending end with no open ending".to_string()),
                }
            }

            match category {
                Some(category) => category,
                None if repeat_backward => {
                    effects.push(repeat_end(acc, tracker, measure, first_measure));
                    BarLineCategory::RepeatEnd
                }
                None if acc.has_decoration() => BarLineCategory::Standalone,
                None => {
                    return BarLineOutcome::Dropped {
                        warning: "barline carries no style, repeat or ending".to_string(),
                    }
                }
            }
        }
    };

    BarLineOutcome::Append {
        barline: BarLine {
            id,
            location,
            style: acc.style,
            repeat_direction: acc.repeat_direction,
            repeat_times: acc.repeat_times,
            ending_number: acc.ending_number.clone(),
            ending_type: acc.ending_type,
            ending_text: acc.ending_text.clone(),
            segno: acc.segno,
            coda: acc.coda,
            fermata: acc.fermata,
            category,
            measure_number: measure.to_string(),
            line: acc.line,
        },
        effects,
        warnings,
    }
}

fn repeat_end(acc: &BarLineAccumulator, tracker: &mut RepeatTracker, measure: &str, first_measure: &str) -> RepeatEffect {
    let start_measure = tracker
        .pending_repeat_start
        .take()
        .unwrap_or_else(|| first_measure.to_string());
    RepeatEffect::RepeatEnd {
        start_measure,
        end_measure: measure.to_string(),
        times: acc.repeat_times.unwrap_or(2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn barline(location: BarLineLocation) -> BarLineAccumulator {
        BarLineAccumulator {
            location: Some(location),
            ..BarLineAccumulator::default()
        }
    }

    fn category(outcome: &BarLineOutcome) -> Option<BarLineCategory> {
        match outcome {
            BarLineOutcome::Append { barline, .. } => Some(barline.category),
            _ => None,
        }
    }

    #[test]
    fn hooked_ending_pair() {
        let mut tracker = RepeatTracker::default();
        let mut start = barline(BarLineLocation::Left);
        start.ending_type = Some(EndingType::Start);
        start.ending_number = Some("1".into());
        let outcome = classify(&start, &mut tracker, "4", "1");
        assert_eq!(category(&outcome), Some(BarLineCategory::HookedEndingStart));

        let mut stop = barline(BarLineLocation::Right);
        stop.ending_type = Some(EndingType::Stop);
        stop.ending_number = Some("1".into());
        stop.repeat_direction = Some(RepeatDirection::Backward);
        match classify(&stop, &mut tracker, "5", "1") {
            BarLineOutcome::Append { barline, effects, .. } => {
                assert_eq!(barline.category, BarLineCategory::HookedEndingEnd);
                assert_eq!(
                    effects,
                    vec![
                        RepeatEffect::ReclassifyStart {
                            barline: BarLineId(1),
                            category: BarLineCategory::HookedEndingStart,
                        },
                        RepeatEffect::RepeatEnd {
                            start_measure: "1".into(),
                            end_measure: "5".into(),
                            times: 2,
                        },
                        RepeatEffect::Ending(RepeatEnding {
                            number: "1".into(),
                            hooked: true,
                            start_measure: "4".into(),
                            end_measure: "5".into(),
                        }),
                    ]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn hookless_ending_reclassifies_its_start() {
        let mut tracker = RepeatTracker::default();
        let mut start = barline(BarLineLocation::Left);
        start.ending_type = Some(EndingType::Start);
        classify(&start, &mut tracker, "6", "1");

        let mut end = barline(BarLineLocation::Right);
        end.ending_type = Some(EndingType::Discontinue);
        match classify(&end, &mut tracker, "6", "1") {
            BarLineOutcome::Append { barline, effects, .. } => {
                assert_eq!(barline.category, BarLineCategory::HooklessEndingEnd);
                assert!(effects.contains(&RepeatEffect::ReclassifyStart {
                    barline: BarLineId(1),
                    category: BarLineCategory::HooklessEndingStart,
                }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn repeat_start_then_end() {
        let mut tracker = RepeatTracker::default();
        let mut start = barline(BarLineLocation::Left);
        start.repeat_direction = Some(RepeatDirection::Forward);
        assert_eq!(
            category(&classify(&start, &mut tracker, "3", "1")),
            Some(BarLineCategory::RepeatStart)
        );

        let mut end = barline(BarLineLocation::Right);
        end.repeat_direction = Some(RepeatDirection::Backward);
        end.repeat_times = Some(3);
        match classify(&end, &mut tracker, "8", "1") {
            BarLineOutcome::Append { effects, .. } => assert_eq!(
                effects,
                vec![RepeatEffect::RepeatEnd {
                    start_measure: "3".into(),
                    end_measure: "8".into(),
                    times: 3,
                }]
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn standalone_dropped_and_fatal() {
        let mut tracker = RepeatTracker::default();
        let mut styled = barline(BarLineLocation::Right);
        styled.style = Some(BarStyle::LightHeavy);
        assert_eq!(
            category(&classify(&styled, &mut tracker, "9", "1")),
            Some(BarLineCategory::Standalone)
        );

        let bare = barline(BarLineLocation::Middle);
        assert!(matches!(classify(&bare, &mut tracker, "9", "1"), BarLineOutcome::Dropped { .. }));

        let mut left = barline(BarLineLocation::Left);
        left.style = Some(BarStyle::HeavyLight);
        assert!(matches!(classify(&left, &mut tracker, "9", "1"), BarLineOutcome::Fatal { .. }));
    }

    #[test]
    fn unknown_style_warns_but_stays_standalone() {
        let mut tracker = RepeatTracker::default();
        let mut odd = barline(BarLineLocation::Right);
        odd.style = Some(BarStyle::Unknown);
        odd.style_text = Some("wiggly".into());
        match classify(&odd, &mut tracker, "2", "1") {
            BarLineOutcome::Append { barline, warnings, .. } => {
                assert_eq!(barline.category, BarLineCategory::Standalone);
                assert_eq!(warnings.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
