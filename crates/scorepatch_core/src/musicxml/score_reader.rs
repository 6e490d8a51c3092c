//! Score reading: MusicXML to alignment input.
//!
//! Produces the ordered event list, metadata and unsupported-feature list
//! for one input document, deterministically. Timing comes from the
//! document model; feature detection walks the raw XML, since the model
//! does not retain ornaments, tuplet ratios or cue markers.

use std::path::Path;

use crate::models::{FeatureKind, ScoreEvent, ScoreMetadata, UnsupportedFeature};

use super::document::{ElementKind, Measure, Part, ScoreDocument};
use super::{ScoreError, ScoreResult};

/// Everything the pipeline needs from one notation document.
#[derive(Debug, Clone)]
pub struct ParsedScore {
    pub events: Vec<ScoreEvent>,
    pub metadata: ScoreMetadata,
    pub unsupported_features: Vec<UnsupportedFeature>,
    /// Parser-level warnings (missing tempo or time signature).
    pub warnings: Vec<String>,
}

/// Read and parse a MusicXML file.
pub fn read_score(path: &Path) -> ScoreResult<ParsedScore> {
    if !path.exists() {
        return Err(ScoreError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| ScoreError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    parse_score(&content)
}

/// Parse MusicXML text into alignment input.
pub fn parse_score(xml: &str) -> ScoreResult<ParsedScore> {
    let document = ScoreDocument::parse(xml)?;
    let part = &document.parts[0];

    let raw = roxmltree::Document::parse(xml)
        .map_err(|e| ScoreError::Malformed(format!("XML parse error: {}", e)))?;

    let mut warnings: Vec<String> = Vec::new();

    // Tempo from the first sound element carrying one, anywhere in the
    // document.
    let tempo_bpm = raw
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "sound")
        .find_map(|n| n.attribute("tempo"))
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|t| *t > 0.0);
    if tempo_bpm.is_none() {
        warnings.push(
            "E_TEMPO_MISSING: No tempo found in MusicXML, using default 120 BPM".to_string(),
        );
    }

    let time_sig_declared = part.measures.iter().any(|m| m.declared_time.is_some());
    if !time_sig_declared {
        warnings.push(
            "E_TIMESIG_MISSING: No time signature found in MusicXML, using default 4/4"
                .to_string(),
        );
    }
    let time_signature = part
        .measures
        .iter()
        .find_map(|m| m.declared_time)
        .unwrap_or((4, 4));

    let mut unsupported: Vec<UnsupportedFeature> = Vec::new();

    // Time signature changes after the first invalidate the beat grid.
    let mut time_signature_changes: Vec<(u32, (u32, u32))> = Vec::new();
    let mut seen_time = false;
    for measure in &part.measures {
        if let Some(sig) = measure.declared_time {
            if seen_time {
                time_signature_changes.push((measure.number, sig));
                unsupported.push(UnsupportedFeature {
                    feature: FeatureKind::TimeSigChange,
                    measure: measure.number,
                    description: format!(
                        "Time signature change to {}/{} detected",
                        sig.0, sig.1
                    ),
                });
            }
            seen_time = true;
        }
    }

    // Key signature changes after the first.
    let mut seen_key = false;
    for measure in &part.measures {
        if let Some(fifths) = measure.key_fifths {
            if seen_key {
                unsupported.push(UnsupportedFeature {
                    feature: FeatureKind::KeySigChange,
                    measure: measure.number,
                    description: format!("Key signature change to {} sharps detected", fifths),
                });
            }
            seen_key = true;
        }
    }

    // Per-measure feature detection on the raw XML.
    if let Some(part_node) = raw
        .root_element()
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "part")
    {
        for measure_node in part_node
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "measure")
        {
            let measure_num = measure_node
                .attribute("number")
                .and_then(|n| n.parse::<u32>().ok())
                .unwrap_or(0);
            detect_unsupported_in_measure(&measure_node, measure_num, &mut unsupported);
        }
    }

    // Multi-voice measures are aligned as written but flagged.
    for measure in &part.measures {
        let voices = measure.voices();
        if voices.len() > 1 {
            unsupported.push(UnsupportedFeature {
                feature: FeatureKind::MultiVoice,
                measure: measure.number,
                description: format!("{} voices detected - using voice 1 only", voices.len()),
            });
        }
    }

    let has_pickup = part.measures.first().map(Measure::is_pickup).unwrap_or(false);
    let pickup_beats = if has_pickup {
        part.measures[0].content_length()
    } else {
        0.0
    };

    let events = extract_events(part);

    // Smallest notated duration for tolerance scaling; whole note when the
    // score is empty.
    let smallest_notated_duration = events
        .iter()
        .filter(|e| !e.is_logical_merged)
        .map(|e| e.duration)
        .fold(4.0, f64::min);

    let metadata = ScoreMetadata {
        total_measures: part.measures.len() as u32,
        tempo_bpm,
        time_signature,
        time_signature_changes,
        has_pickup,
        pickup_beats,
        smallest_notated_duration,
        title: document.work_title.clone(),
        part_name: part.name.clone(),
    };

    tracing::debug!(
        events = events.len(),
        measures = metadata.total_measures,
        unsupported = unsupported.len(),
        "score parsed"
    );

    Ok(ParsedScore {
        events,
        metadata,
        unsupported_features: unsupported,
        warnings,
    })
}

/// Extract note events, synthesizing one merged logical event per closed
/// tie chain.
fn extract_events(part: &Part) -> Vec<ScoreEvent> {
    let mut events: Vec<ScoreEvent> = Vec::new();
    // Open tie chains keyed by pitch.
    let mut tie_chains: std::collections::BTreeMap<u8, Vec<ScoreEvent>> =
        std::collections::BTreeMap::new();

    for measure in &part.measures {
        for element in &measure.elements {
            let ElementKind::Note(note) = &element.kind else {
                continue;
            };
            let Some(pitch_midi) = note.midi() else {
                tracing::warn!(
                    measure = measure.number,
                    step = %note.step,
                    "skipping note outside MIDI range"
                );
                continue;
            };

            let event = ScoreEvent {
                measure: measure.number,
                beat: element.offset + 1.0,
                pitch_midi,
                pitch_spelled: spell(note.step, note.alter, note.octave),
                duration: element.duration,
                logical_duration: element.duration,
                voice: element.voice,
                tie_start: note.tie_start,
                tie_end: note.tie_end,
                is_logical_merged: false,
            };
            events.push(event.clone());

            if note.tie_start || note.tie_end {
                tie_chains.entry(pitch_midi).or_default().push(event);

                // A stop without a start closes the chain.
                if note.tie_end && !note.tie_start {
                    if let Some(chain) = tie_chains.remove(&pitch_midi) {
                        if chain.len() > 1 {
                            let total: f64 = chain.iter().map(|e| e.duration).sum();
                            let head = &chain[0];
                            events.push(ScoreEvent {
                                measure: head.measure,
                                beat: head.beat,
                                pitch_midi,
                                pitch_spelled: head.pitch_spelled.clone(),
                                duration: head.duration,
                                logical_duration: total,
                                voice: head.voice,
                                tie_start: true,
                                tie_end: true,
                                is_logical_merged: true,
                            });
                        }
                    }
                }
            }
        }
    }

    events
}

fn detect_unsupported_in_measure(
    measure_node: &roxmltree::Node,
    measure_num: u32,
    features: &mut Vec<UnsupportedFeature>,
) {
    for note in measure_node
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "note")
    {
        let has = |name: &str| {
            note.children()
                .any(|n| n.is_element() && n.tag_name().name() == name)
        };

        if has("grace") {
            let spelled = note_spelling(&note);
            features.push(UnsupportedFeature {
                feature: FeatureKind::GraceNote,
                measure: measure_num,
                description: format!("Grace note {} - timing ambiguous", spelled),
            });
        }
        if has("time-modification") {
            features.push(UnsupportedFeature {
                feature: FeatureKind::Tuplet,
                measure: measure_num,
                description: "Tuplet detected - rhythm may be misaligned".to_string(),
            });
        }
        if has("cue") {
            features.push(UnsupportedFeature {
                feature: FeatureKind::CueNote,
                measure: measure_num,
                description: "Cue-sized note detected - may be ornamental".to_string(),
            });
        }
        for notations in note
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "notations")
        {
            if notations
                .descendants()
                .any(|n| n.is_element() && n.tag_name().name() == "fermata")
            {
                features.push(UnsupportedFeature {
                    feature: FeatureKind::Fermata,
                    measure: measure_num,
                    description: "Fermata detected - tempo variance possible".to_string(),
                });
            }
            if notations
                .descendants()
                .any(|n| n.is_element() && n.tag_name().name() == "tremolo")
            {
                features.push(UnsupportedFeature {
                    feature: FeatureKind::Tremolo,
                    measure: measure_num,
                    description: "Tremolo detected - duration unclear".to_string(),
                });
            }
        }
    }
}

fn note_spelling(note: &roxmltree::Node) -> String {
    let pitch = note
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "pitch");
    let Some(pitch) = pitch else {
        return "?".to_string();
    };
    let text = |name: &str| {
        pitch
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == name)
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string())
    };
    let step = text("step").unwrap_or_else(|| "?".to_string());
    let alter = text("alter")
        .and_then(|t| t.parse::<f64>().ok())
        .map(|a| a.round() as i8)
        .unwrap_or(0);
    let octave = text("octave").unwrap_or_default();
    format!("{}{}{}", step, accidental(alter), octave)
}

fn accidental(alter: i8) -> &'static str {
    match alter {
        2 => "##",
        1 => "#",
        -1 => "b",
        -2 => "bb",
        _ => "",
    }
}

fn spell(step: char, alter: i8, octave: i32) -> String {
    format!("{}{}{}", step, accidental(alter), octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="4.0">
  <part-list>
    <score-part id="P1"><part-name>Piano</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>2</divisions>
        <time><beats>4</beats><beat-type>4</beat-type></time>
      </attributes>
      <direction><sound tempo="120"/></direction>
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
      <note><pitch><step>D</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
      <note><pitch><step>E</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
      <note><pitch><step>F</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
    </measure>
  </part>
</score-partwise>"#;

    #[test]
    fn reads_events_and_metadata() {
        let parsed = parse_score(SIMPLE_XML).unwrap();
        assert_eq!(parsed.events.len(), 4);
        assert_eq!(parsed.metadata.total_measures, 1);
        assert_eq!(parsed.metadata.tempo_bpm, Some(120.0));
        assert_eq!(parsed.metadata.time_signature, (4, 4));
        assert_eq!(parsed.metadata.smallest_notated_duration, 1.0);
        assert!(parsed.warnings.is_empty());

        let first = &parsed.events[0];
        assert_eq!(first.measure, 1);
        assert_eq!(first.beat, 1.0);
        assert_eq!(first.pitch_midi, 60);
        assert_eq!(first.pitch_spelled, "C4");
        let last = &parsed.events[3];
        assert_eq!(last.beat, 4.0);
        assert_eq!(last.pitch_midi, 65);
    }

    #[test]
    fn missing_tempo_and_time_produce_warnings() {
        let xml = r#"<score-partwise version="4.0">
  <part-list><score-part id="P1"><part-name>X</part-name></score-part></part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions></attributes>
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration><voice>1</voice></note>
    </measure>
  </part>
</score-partwise>"#;
        let parsed = parse_score(xml).unwrap();
        assert_eq!(parsed.metadata.tempo_bpm, None);
        assert_eq!(parsed.metadata.time_signature, (4, 4));
        assert_eq!(parsed.warnings.len(), 2);
        assert!(parsed.warnings[0].starts_with("E_TEMPO_MISSING"));
        assert!(parsed.warnings[1].starts_with("E_TIMESIG_MISSING"));
    }

    #[test]
    fn tie_chain_produces_merged_event() {
        // Two tied half notes across a barline.
        let xml = r#"<score-partwise version="4.0">
  <part-list><score-part id="P1"><part-name>X</part-name></score-part></part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>2</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>E</step><octave>4</octave></pitch><duration>4</duration><voice>1</voice></note>
      <note><pitch><step>E</step><octave>4</octave></pitch><duration>4</duration><tie type="start"/><voice>1</voice></note>
    </measure>
    <measure number="2">
      <note><pitch><step>E</step><octave>4</octave></pitch><duration>4</duration><tie type="stop"/><voice>1</voice></note>
    </measure>
  </part>
</score-partwise>"#;
        let parsed = parse_score(xml).unwrap();
        // Three individual events plus one merged representative.
        assert_eq!(parsed.events.len(), 4);
        let merged: Vec<&ScoreEvent> = parsed
            .events
            .iter()
            .filter(|e| e.is_logical_merged)
            .collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].logical_duration, 4.0);
        assert_eq!(merged[0].measure, 1);
        assert_eq!(merged[0].beat, 3.0);
        assert!(merged[0].tie_start && merged[0].tie_end);
        // The untied first note is not part of the chain.
        assert_eq!(
            parsed.events.iter().filter(|e| e.is_tie_member()).count(),
            2
        );
    }

    #[test]
    fn pickup_measure_is_detected() {
        let xml = r#"<score-partwise version="4.0">
  <part-list><score-part id="P1"><part-name>X</part-name></score-part></part-list>
  <part id="P1">
    <measure number="0" implicit="yes">
      <attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>G</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice></note>
    </measure>
    <measure number="1">
      <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><voice>1</voice></note>
    </measure>
  </part>
</score-partwise>"#;
        let parsed = parse_score(xml).unwrap();
        assert!(parsed.metadata.has_pickup);
        assert_eq!(parsed.metadata.pickup_beats, 1.0);
        assert_eq!(parsed.events[0].measure, 0);
        assert_eq!(parsed.events[0].beat, 1.0);
    }

    #[test]
    fn grace_and_tuplet_are_flagged_unsupported() {
        let xml = r#"<score-partwise version="4.0">
  <part-list><score-part id="P1"><part-name>X</part-name></score-part></part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>6</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
      <note><grace/><pitch><step>D</step><octave>5</octave></pitch><voice>1</voice></note>
      <note>
        <pitch><step>C</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice>
        <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>
      </note>
      <note><pitch><step>D</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice>
        <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>
      </note>
      <note><pitch><step>E</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice>
        <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>
      </note>
      <note><pitch><step>F</step><octave>4</octave></pitch><duration>18</duration><voice>1</voice>
        <notations><fermata type="upright"/></notations>
      </note>
    </measure>
  </part>
</score-partwise>"#;
        let parsed = parse_score(xml).unwrap();
        let kinds: Vec<FeatureKind> = parsed
            .unsupported_features
            .iter()
            .map(|f| f.feature)
            .collect();
        assert!(kinds.contains(&FeatureKind::GraceNote));
        assert!(kinds.contains(&FeatureKind::Fermata));
        assert_eq!(
            kinds.iter().filter(|k| **k == FeatureKind::Tuplet).count(),
            3
        );
        let grace = parsed
            .unsupported_features
            .iter()
            .find(|f| f.feature == FeatureKind::GraceNote)
            .unwrap();
        assert!(grace.description.contains("D5"));
    }

    #[test]
    fn time_signature_change_is_flagged() {
        let xml = r#"<score-partwise version="4.0">
  <part-list><score-part id="P1"><part-name>X</part-name></score-part></part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration><voice>1</voice></note>
    </measure>
    <measure number="2">
      <attributes><time><beats>3</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>3</duration><voice>1</voice></note>
    </measure>
  </part>
</score-partwise>"#;
        let parsed = parse_score(xml).unwrap();
        assert_eq!(parsed.metadata.time_signature, (4, 4));
        assert_eq!(parsed.metadata.time_signature_changes, vec![(2, (3, 4))]);
        let change = parsed
            .unsupported_features
            .iter()
            .find(|f| f.feature == FeatureKind::TimeSigChange)
            .unwrap();
        assert_eq!(change.measure, 2);
    }

    #[test]
    fn multi_voice_measure_is_flagged() {
        let xml = r#"<score-partwise version="4.0">
  <part-list><score-part id="P1"><part-name>X</part-name></score-part></part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><voice>1</voice></note>
      <backup><duration>4</duration></backup>
      <note><pitch><step>C</step><octave>3</octave></pitch><duration>4</duration><voice>2</voice></note>
    </measure>
  </part>
</score-partwise>"#;
        let parsed = parse_score(xml).unwrap();
        let multi = parsed
            .unsupported_features
            .iter()
            .find(|f| f.feature == FeatureKind::MultiVoice)
            .unwrap();
        assert!(multi.description.starts_with("2 voices"));
        // Events still come from both voices.
        assert_eq!(parsed.events.len(), 2);
    }

    #[test]
    fn missing_file_reports_not_found() {
        let err = read_score(Path::new("/nonexistent/score.musicxml")).unwrap_err();
        assert_eq!(err.code(), "E_NOT_FOUND");
    }
}
