//! Mutable MusicXML document model.
//!
//! Parses `score-partwise` documents into an editable tree of parts,
//! measures and timed elements, and serializes back to MusicXML text.
//! Element positions are explicit beat offsets within their measure, so
//! removing or inserting content never shifts neighbors; the serializer
//! re-derives `<backup>`/`<forward>` plumbing from those offsets.
//!
//! Grace notes carry no duration and are dropped on parse (scores using
//! them are flagged unsupported upstream). Tuplet ratios and cue markers
//! are not preserved.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::pitch::{midi_to_spelling, spelling_to_midi};
use super::{ScoreError, ScoreResult};

/// Slack for matching element offsets, in beats.
pub const OFFSET_EPS: f64 = 0.01;

/// Slack for comparing durations, in beats.
pub const DURATION_EPS: f64 = 1e-3;

/// A pitched note inside a measure.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub step: char,
    pub alter: i8,
    pub octave: i32,
    pub tie_start: bool,
    pub tie_end: bool,
}

impl Note {
    /// MIDI number of this spelling, when in range.
    pub fn midi(&self) -> Option<u8> {
        spelling_to_midi(self.step, self.alter, self.octave)
    }

    /// Re-spell this note to the given MIDI number (sharp-preferring).
    pub fn set_midi(&mut self, midi: u8) {
        let (step, alter, octave) = midi_to_spelling(midi);
        self.step = step;
        self.alter = alter;
        self.octave = octave;
    }
}

/// What occupies a time slot: a note or a rest.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Note(Note),
    Rest,
}

/// A note or rest with its explicit position within the measure.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedElement {
    /// Offset from the start of the measure, in beats.
    pub offset: f64,
    /// Duration in beats, always positive.
    pub duration: f64,
    /// Voice number, 1-indexed.
    pub voice: u32,
    pub kind: ElementKind,
}

impl TimedElement {
    pub fn is_rest(&self) -> bool {
        matches!(self.kind, ElementKind::Rest)
    }

    /// The note payload, if this element is a note.
    pub fn note(&self) -> Option<&Note> {
        match &self.kind {
            ElementKind::Note(note) => Some(note),
            ElementKind::Rest => None,
        }
    }

    fn at_offset(&self, offset: f64) -> bool {
        (self.offset - offset).abs() <= OFFSET_EPS
    }
}

/// One measure of one part.
#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub number: u32,
    /// Marked `implicit="yes"` in the source (pickup convention).
    pub implicit: bool,
    /// Divisions per quarter note in effect for this measure.
    pub divisions: u32,
    /// Divisions declared in this measure's attributes, if any.
    pub declared_divisions: Option<u32>,
    /// Key signature declared here (circle-of-fifths count), if any.
    pub key_fifths: Option<i32>,
    /// Time signature declared here, if any.
    pub declared_time: Option<(u32, u32)>,
    /// Time signature in effect for this measure.
    pub time_signature: (u32, u32),
    /// Clef declared here as (sign, line), if any.
    pub clef: Option<(String, u32)>,
    /// Notes and rests ordered by (voice, offset).
    pub elements: Vec<TimedElement>,
}

impl Measure {
    /// Whether this is a pickup measure.
    pub fn is_pickup(&self) -> bool {
        self.number == 0 || self.implicit
    }

    /// Total length of the notated content in beats.
    pub fn content_length(&self) -> f64 {
        self.elements
            .iter()
            .map(|e| e.offset + e.duration)
            .fold(0.0, f64::max)
    }

    /// Maximum length this measure may hold, in beats.
    ///
    /// Normal measures are bounded by their time signature; a pickup is
    /// bounded by its own notated length.
    pub fn capacity_beats(&self) -> f64 {
        if self.is_pickup() {
            return self.content_length();
        }
        let (numerator, denominator) = self.time_signature;
        f64::from(numerator) * 4.0 / f64::from(denominator)
    }

    /// Distinct voice numbers present, ascending.
    pub fn voices(&self) -> Vec<u32> {
        let mut voices: Vec<u32> = self.elements.iter().map(|e| e.voice).collect();
        voices.sort_unstable();
        voices.dedup();
        voices
    }

    /// Smallest voice number not yet used in this measure.
    pub fn next_free_voice(&self) -> u32 {
        let used = self.voices();
        let mut candidate = 1;
        while used.contains(&candidate) {
            candidate += 1;
        }
        candidate
    }

    /// Whether a note with this pitch and duration already sits at the
    /// offset in any voice.
    pub fn has_note_any_voice(&self, offset: f64, pitch: u8, duration: f64) -> bool {
        self.elements.iter().any(|e| {
            e.at_offset(offset)
                && e.note().and_then(Note::midi) == Some(pitch)
                && (e.duration - duration).abs() <= DURATION_EPS
        })
    }

    /// Whether the voice already has a note at the offset.
    pub fn voice_has_note_at(&self, offset: f64, voice: u32) -> bool {
        self.elements
            .iter()
            .any(|e| e.voice == voice && e.at_offset(offset) && !e.is_rest())
    }

    /// Find a note by offset, optionally filtered by pitch, searching the
    /// given voice. Measures that carry no elements for that voice fall
    /// back to searching every voice, matching sources that never tagged
    /// voices explicitly.
    pub fn find_note(&self, offset: f64, pitch: Option<u8>, voice: u32) -> Option<usize> {
        let voice_exists = self.elements.iter().any(|e| e.voice == voice);
        self.elements.iter().position(|e| {
            (!voice_exists || e.voice == voice)
                && e.at_offset(offset)
                && match (&e.kind, pitch) {
                    (ElementKind::Note(note), Some(p)) => note.midi() == Some(p),
                    (ElementKind::Note(_), None) => true,
                    (ElementKind::Rest, _) => false,
                }
        })
    }

    /// Indices of rests at exactly this offset in the given voice,
    /// descending so removal by index stays valid.
    pub fn rests_at(&self, offset: f64, voice: u32) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.voice == voice && e.is_rest() && e.at_offset(offset))
            .map(|(i, _)| i)
            .collect();
        indices.reverse();
        indices
    }

    /// Whether any element of the voice starts inside the span
    /// `[start, end]`. Used to reject lengthenings that would overlap a
    /// later note or rest.
    pub fn has_element_inside(&self, start: f64, end: f64, voice: u32) -> bool {
        self.elements.iter().any(|e| {
            e.voice == voice
                && e.offset > start - DURATION_EPS
                && e.offset < end + DURATION_EPS
        })
    }

    /// Insert an element, keeping (voice, offset) order.
    pub fn insert_element(&mut self, element: TimedElement) {
        let index = self
            .elements
            .iter()
            .position(|e| {
                (e.voice, e.offset) > (element.voice, element.offset)
            })
            .unwrap_or(self.elements.len());
        self.elements.insert(index, element);
    }

    /// Remove and return the element at the index.
    pub fn remove_element(&mut self, index: usize) -> TimedElement {
        self.elements.remove(index)
    }
}

/// One part of the score.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub id: String,
    pub name: Option<String>,
    pub measures: Vec<Measure>,
}

impl Part {
    /// Look up a measure by its number.
    pub fn measure(&self, number: u32) -> Option<&Measure> {
        self.measures.iter().find(|m| m.number == number)
    }

    /// Look up a measure mutably by its number.
    pub fn measure_mut(&mut self, number: u32) -> Option<&mut Measure> {
        self.measures.iter_mut().find(|m| m.number == number)
    }
}

/// A parsed, editable notation document.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreDocument {
    pub work_title: Option<String>,
    pub parts: Vec<Part>,
}

impl ScoreDocument {
    /// Parse a MusicXML file from disk.
    pub fn parse_file(path: &Path) -> ScoreResult<Self> {
        if !path.exists() {
            return Err(ScoreError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ScoreError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse MusicXML text into a document.
    pub fn parse(xml: &str) -> ScoreResult<Self> {
        let doc = roxmltree::Document::parse(xml)
            .map_err(|e| ScoreError::Malformed(format!("XML parse error: {}", e)))?;

        let root = doc.root_element();
        if root.tag_name().name() != "score-partwise" {
            return Err(ScoreError::Malformed(
                "Root element must be <score-partwise>".to_string(),
            ));
        }

        let work_title = root
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "work")
            .and_then(|work| child_text(&work, "work-title"));

        // Part names from the part-list, keyed by part id.
        let mut part_names: Vec<(String, Option<String>)> = Vec::new();
        if let Some(part_list) = root
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "part-list")
        {
            for score_part in part_list
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "score-part")
            {
                let id = score_part.attribute("id").unwrap_or_default().to_string();
                let name = child_text(&score_part, "part-name");
                part_names.push((id, name));
            }
        }

        let mut parts: Vec<Part> = Vec::new();
        for part_node in root
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "part")
        {
            let id = part_node.attribute("id").unwrap_or_default().to_string();
            let name = part_names
                .iter()
                .find(|(pid, _)| *pid == id)
                .and_then(|(_, name)| name.clone());
            let measures = parse_measures(&part_node)?;
            parts.push(Part { id, name, measures });
        }

        if parts.is_empty() {
            return Err(ScoreError::NoParts);
        }

        Ok(Self { work_title, parts })
    }

    /// Serialize the document to MusicXML text.
    pub fn serialize(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<score-partwise version=\"4.0\">\n");

        if let Some(title) = &self.work_title {
            xml.push_str("  <work>\n");
            let _ = writeln!(xml, "    <work-title>{}</work-title>", escape_xml(title));
            xml.push_str("  </work>\n");
        }

        xml.push_str("  <part-list>\n");
        for part in &self.parts {
            let _ = writeln!(xml, "    <score-part id=\"{}\">", escape_xml(&part.id));
            let name = part.name.as_deref().unwrap_or("Part");
            let _ = writeln!(xml, "      <part-name>{}</part-name>", escape_xml(name));
            xml.push_str("    </score-part>\n");
        }
        xml.push_str("  </part-list>\n");

        for part in &self.parts {
            let _ = writeln!(xml, "  <part id=\"{}\">", escape_xml(&part.id));
            for measure in &part.measures {
                serialize_measure(&mut xml, measure);
            }
            xml.push_str("  </part>\n");
        }

        xml.push_str("</score-partwise>\n");
        xml
    }

    /// Serialize and parse again, proving the output survives a round
    /// trip.
    pub fn reparse(&self) -> ScoreResult<Self> {
        Self::parse(&self.serialize())
    }

    /// Write the serialized document to disk.
    pub fn write_file(&self, path: &Path) -> ScoreResult<()> {
        fs::write(path, self.serialize()).map_err(|source| ScoreError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn parse_measures(part_node: &roxmltree::Node) -> ScoreResult<Vec<Measure>> {
    let mut measures: Vec<Measure> = Vec::new();
    let mut divisions: u32 = 1;
    let mut time_signature: (u32, u32) = (4, 4);

    for measure_node in part_node
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "measure")
    {
        let number = measure_node
            .attribute("number")
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(0);
        let implicit = measure_node.attribute("implicit") == Some("yes");

        let mut declared_divisions: Option<u32> = None;
        let mut declared_time: Option<(u32, u32)> = None;
        let mut key_fifths: Option<i32> = None;
        let mut clef: Option<(String, u32)> = None;
        let mut elements: Vec<TimedElement> = Vec::new();

        // Cursor in beats; <backup> and <forward> move it, notes advance
        // it unless they are chord members.
        let mut cursor: f64 = 0.0;
        let mut last_note_start: Option<f64> = None;

        for child in measure_node.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "attributes" => {
                    if let Some(d) = child_text(&child, "divisions")
                        .and_then(|t| t.parse::<u32>().ok())
                        .filter(|d| *d > 0)
                    {
                        divisions = d;
                        declared_divisions = Some(d);
                    }
                    if let Some(key_node) = child_element(&child, "key") {
                        key_fifths = child_text(&key_node, "fifths")
                            .and_then(|t| t.parse::<i32>().ok());
                    }
                    if let Some(time_node) = child_element(&child, "time") {
                        let beats = child_text(&time_node, "beats")
                            .and_then(|t| t.parse::<u32>().ok());
                        let beat_type = child_text(&time_node, "beat-type")
                            .and_then(|t| t.parse::<u32>().ok());
                        if let (Some(beats), Some(beat_type)) = (beats, beat_type) {
                            time_signature = (beats, beat_type);
                            declared_time = Some((beats, beat_type));
                        }
                    }
                    if let Some(clef_node) = child_element(&child, "clef") {
                        let sign = child_text(&clef_node, "sign");
                        let line = child_text(&clef_node, "line")
                            .and_then(|t| t.parse::<u32>().ok());
                        if let (Some(sign), Some(line)) = (sign, line) {
                            clef = Some((sign, line));
                        }
                    }
                }
                "backup" => {
                    if let Some(d) = element_duration_beats(&child, divisions) {
                        cursor -= d;
                    }
                }
                "forward" => {
                    if let Some(d) = element_duration_beats(&child, divisions) {
                        cursor += d;
                    }
                }
                "note" => {
                    // Grace notes carry no duration and cannot be placed
                    // on the beat grid.
                    if child_element(&child, "grace").is_some() {
                        tracing::warn!(measure = number, "dropping grace note");
                        continue;
                    }
                    let Some(duration) = element_duration_beats(&child, divisions) else {
                        continue;
                    };
                    let is_chord = child_element(&child, "chord").is_some();
                    let offset = if is_chord {
                        last_note_start.unwrap_or(cursor)
                    } else {
                        cursor
                    };

                    let voice = child_text(&child, "voice")
                        .and_then(|t| t.parse::<u32>().ok())
                        .filter(|v| *v >= 1)
                        .unwrap_or(1);

                    let kind = if child_element(&child, "rest").is_some() {
                        ElementKind::Rest
                    } else if let Some(pitch_node) = child_element(&child, "pitch") {
                        let step = child_text(&pitch_node, "step")
                            .and_then(|t| t.chars().next())
                            .unwrap_or('C');
                        let alter = child_text(&pitch_node, "alter")
                            .and_then(|t| t.parse::<f64>().ok())
                            .map(|a| a.round() as i8)
                            .unwrap_or(0);
                        let octave = child_text(&pitch_node, "octave")
                            .and_then(|t| t.parse::<i32>().ok())
                            .unwrap_or(4);
                        let mut tie_start = false;
                        let mut tie_end = false;
                        for tie in child
                            .children()
                            .filter(|n| n.is_element() && n.tag_name().name() == "tie")
                        {
                            match tie.attribute("type") {
                                Some("start") => tie_start = true,
                                Some("stop") => tie_end = true,
                                _ => {}
                            }
                        }
                        ElementKind::Note(Note {
                            step,
                            alter,
                            octave,
                            tie_start,
                            tie_end,
                        })
                    } else {
                        // Unpitched content (percussion etc.) is out of
                        // scope; treat as a rest to keep timing intact.
                        ElementKind::Rest
                    };

                    elements.push(TimedElement {
                        offset,
                        duration,
                        voice,
                        kind,
                    });

                    if !is_chord {
                        last_note_start = Some(cursor);
                        cursor += duration;
                    }
                }
                _ => {}
            }
        }

        elements.sort_by(|a, b| {
            (a.voice, a.offset)
                .partial_cmp(&(b.voice, b.offset))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        measures.push(Measure {
            number,
            implicit,
            divisions,
            declared_divisions,
            key_fifths,
            declared_time,
            time_signature,
            clef,
            elements,
        });
    }

    Ok(measures)
}

fn serialize_measure(xml: &mut String, measure: &Measure) {
    if measure.implicit {
        let _ = writeln!(
            xml,
            "    <measure number=\"{}\" implicit=\"yes\">",
            measure.number
        );
    } else {
        let _ = writeln!(xml, "    <measure number=\"{}\">", measure.number);
    }

    let has_attributes = measure.declared_divisions.is_some()
        || measure.key_fifths.is_some()
        || measure.declared_time.is_some()
        || measure.clef.is_some();
    if has_attributes {
        xml.push_str("      <attributes>\n");
        if let Some(divisions) = measure.declared_divisions {
            let _ = writeln!(xml, "        <divisions>{}</divisions>", divisions);
        }
        if let Some(fifths) = measure.key_fifths {
            xml.push_str("        <key>\n");
            let _ = writeln!(xml, "          <fifths>{}</fifths>", fifths);
            xml.push_str("        </key>\n");
        }
        if let Some((beats, beat_type)) = measure.declared_time {
            xml.push_str("        <time>\n");
            let _ = writeln!(xml, "          <beats>{}</beats>", beats);
            let _ = writeln!(xml, "          <beat-type>{}</beat-type>", beat_type);
            xml.push_str("        </time>\n");
        }
        if let Some((sign, line)) = &measure.clef {
            xml.push_str("        <clef>\n");
            let _ = writeln!(xml, "          <sign>{}</sign>", escape_xml(sign));
            let _ = writeln!(xml, "          <line>{}</line>", line);
            xml.push_str("        </clef>\n");
        }
        xml.push_str("      </attributes>\n");
    }

    let divisions = measure.divisions;
    let voices = measure.voices();
    for (voice_index, voice) in voices.iter().enumerate() {
        let voice_elements: Vec<&TimedElement> = measure
            .elements
            .iter()
            .filter(|e| e.voice == *voice)
            .collect();

        let mut cursor: f64 = 0.0;
        let mut prev_offset: Option<f64> = None;
        for element in &voice_elements {
            let is_chord = !element.is_rest()
                && prev_offset
                    .map(|po| (element.offset - po).abs() <= OFFSET_EPS)
                    .unwrap_or(false);

            if !is_chord {
                if element.offset > cursor + OFFSET_EPS {
                    emit_move(xml, "forward", element.offset - cursor, divisions);
                    cursor = element.offset;
                } else if element.offset < cursor - OFFSET_EPS {
                    emit_move(xml, "backup", cursor - element.offset, divisions);
                    cursor = element.offset;
                }
            }

            serialize_element(xml, element, is_chord, divisions);

            if !is_chord {
                cursor = element.offset + element.duration;
            }
            prev_offset = Some(element.offset);
        }

        // Return to the start of the measure before the next voice.
        if voice_index + 1 < voices.len() && cursor > OFFSET_EPS {
            emit_move(xml, "backup", cursor, divisions);
        }
    }

    xml.push_str("    </measure>\n");
}

fn serialize_element(xml: &mut String, element: &TimedElement, is_chord: bool, divisions: u32) {
    xml.push_str("      <note>\n");
    if is_chord {
        xml.push_str("        <chord/>\n");
    }
    match &element.kind {
        ElementKind::Rest => xml.push_str("        <rest/>\n"),
        ElementKind::Note(note) => {
            xml.push_str("        <pitch>\n");
            let _ = writeln!(xml, "          <step>{}</step>", note.step);
            if note.alter != 0 {
                let _ = writeln!(xml, "          <alter>{}</alter>", note.alter);
            }
            let _ = writeln!(xml, "          <octave>{}</octave>", note.octave);
            xml.push_str("        </pitch>\n");
        }
    }
    let _ = writeln!(
        xml,
        "        <duration>{}</duration>",
        to_divisions(element.duration, divisions)
    );
    if let ElementKind::Note(note) = &element.kind {
        if note.tie_end {
            xml.push_str("        <tie type=\"stop\"/>\n");
        }
        if note.tie_start {
            xml.push_str("        <tie type=\"start\"/>\n");
        }
    }
    let _ = writeln!(xml, "        <voice>{}</voice>", element.voice);
    if let Some((note_type, dots)) = note_type_for(element.duration) {
        let _ = writeln!(xml, "        <type>{}</type>", note_type);
        for _ in 0..dots {
            xml.push_str("        <dot/>\n");
        }
    }
    if let ElementKind::Note(note) = &element.kind {
        if note.tie_start || note.tie_end {
            xml.push_str("        <notations>\n");
            if note.tie_end {
                xml.push_str("          <tied type=\"stop\"/>\n");
            }
            if note.tie_start {
                xml.push_str("          <tied type=\"start\"/>\n");
            }
            xml.push_str("        </notations>\n");
        }
    }
    xml.push_str("      </note>\n");
}

fn emit_move(xml: &mut String, tag: &str, beats: f64, divisions: u32) {
    let _ = writeln!(
        xml,
        "      <{tag}>\n        <duration>{}</duration>\n      </{tag}>",
        to_divisions(beats, divisions)
    );
}

/// Scale a beat duration to this measure's divisions, clamped to at least
/// one division.
fn to_divisions(beats: f64, divisions: u32) -> u32 {
    let scaled = (beats * f64::from(divisions)).round();
    if scaled < 1.0 {
        1
    } else {
        scaled as u32
    }
}

/// Note type and dot count for common beat durations; None for values with
/// no simple notation (the `<type>` element is optional).
fn note_type_for(beats: f64) -> Option<(&'static str, usize)> {
    const EPS: f64 = 1e-3;
    const TABLE: [(f64, &str, usize); 10] = [
        (4.0, "whole", 0),
        (3.0, "half", 1),
        (2.0, "half", 0),
        (1.5, "quarter", 1),
        (1.0, "quarter", 0),
        (0.75, "eighth", 1),
        (0.5, "eighth", 0),
        (0.375, "16th", 1),
        (0.25, "16th", 0),
        (0.125, "32nd", 0),
    ];
    TABLE
        .iter()
        .find(|(value, _, _)| (beats - value).abs() < EPS)
        .map(|(_, name, dots)| (*name, *dots))
}

fn child_element<'a>(node: &'a roxmltree::Node, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: &roxmltree::Node, name: &str) -> Option<String> {
    child_element(node, name)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn element_duration_beats(node: &roxmltree::Node, divisions: u32) -> Option<f64> {
    child_text(node, "duration")
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|d| *d > 0.0)
        .map(|d| d / f64::from(divisions))
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const SIMPLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="4.0">
  <work>
    <work-title>Test Piece</work-title>
  </work>
  <part-list>
    <score-part id="P1">
      <part-name>Piano</part-name>
    </score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>4</divisions>
        <key>
          <fifths>0</fifths>
        </key>
        <time>
          <beats>4</beats>
          <beat-type>4</beat-type>
        </time>
        <clef>
          <sign>G</sign>
          <line>2</line>
        </clef>
      </attributes>
      <note>
        <pitch>
          <step>C</step>
          <octave>4</octave>
        </pitch>
        <duration>4</duration>
        <voice>1</voice>
        <type>quarter</type>
      </note>
      <note>
        <pitch>
          <step>D</step>
          <octave>4</octave>
        </pitch>
        <duration>4</duration>
        <voice>1</voice>
        <type>quarter</type>
      </note>
      <note>
        <pitch>
          <step>E</step>
          <octave>4</octave>
        </pitch>
        <duration>4</duration>
        <voice>1</voice>
        <type>quarter</type>
      </note>
      <note>
        <pitch>
          <step>F</step>
          <octave>4</octave>
        </pitch>
        <duration>4</duration>
        <voice>1</voice>
        <type>quarter</type>
      </note>
    </measure>
  </part>
</score-partwise>"#;

    #[test]
    fn parses_simple_score() {
        let doc = ScoreDocument::parse(SIMPLE_XML).unwrap();
        assert_eq!(doc.work_title.as_deref(), Some("Test Piece"));
        assert_eq!(doc.parts.len(), 1);
        assert_eq!(doc.parts[0].name.as_deref(), Some("Piano"));

        let measure = doc.parts[0].measure(1).unwrap();
        assert_eq!(measure.divisions, 4);
        assert_eq!(measure.time_signature, (4, 4));
        assert_eq!(measure.elements.len(), 4);

        let first = &measure.elements[0];
        assert_eq!(first.offset, 0.0);
        assert_eq!(first.duration, 1.0);
        assert_eq!(first.note().unwrap().midi(), Some(60));

        let last = &measure.elements[3];
        assert_eq!(last.offset, 3.0);
        assert_eq!(last.note().unwrap().midi(), Some(65));
    }

    #[test]
    fn rejects_non_partwise_root() {
        let err = ScoreDocument::parse("<score-timewise/>").unwrap_err();
        assert!(matches!(err, ScoreError::Malformed(_)));
        assert_eq!(err.code(), "E_XML_PARSE");
    }

    #[test]
    fn rejects_empty_part_list() {
        let xml = r#"<score-partwise version="4.0"><part-list/></score-partwise>"#;
        let err = ScoreDocument::parse(xml).unwrap_err();
        assert!(matches!(err, ScoreError::NoParts));
    }

    #[test]
    fn roundtrip_preserves_structure() {
        let doc = ScoreDocument::parse(SIMPLE_XML).unwrap();
        let reparsed = doc.reparse().unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn backup_splits_voices() {
        let xml = r#"<score-partwise version="4.0">
  <part-list>
    <score-part id="P1"><part-name>X</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>2</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>C</step><octave>5</octave></pitch><duration>8</duration><voice>1</voice></note>
      <backup><duration>8</duration></backup>
      <note><pitch><step>C</step><octave>3</octave></pitch><duration>4</duration><voice>2</voice></note>
      <note><pitch><step>G</step><octave>3</octave></pitch><duration>4</duration><voice>2</voice></note>
    </measure>
  </part>
</score-partwise>"#;
        let doc = ScoreDocument::parse(xml).unwrap();
        let measure = doc.parts[0].measure(1).unwrap();
        assert_eq!(measure.voices(), vec![1, 2]);
        // Voice 2 restarts at offset zero after the backup.
        let voice2: Vec<&TimedElement> =
            measure.elements.iter().filter(|e| e.voice == 2).collect();
        assert_eq!(voice2[0].offset, 0.0);
        assert_eq!(voice2[1].offset, 2.0);

        // The round trip preserves both voices at their offsets.
        let reparsed = doc.reparse().unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn chord_notes_share_an_offset() {
        let xml = r#"<score-partwise version="4.0">
  <part-list>
    <score-part id="P1"><part-name>X</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
      <note><chord/><pitch><step>E</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
      <note><pitch><step>G</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
    </measure>
  </part>
</score-partwise>"#;
        let doc = ScoreDocument::parse(xml).unwrap();
        let measure = doc.parts[0].measure(1).unwrap();
        assert_eq!(measure.elements.len(), 3);
        assert_eq!(measure.elements[0].offset, 0.0);
        assert_eq!(measure.elements[1].offset, 0.0);
        assert_eq!(measure.elements[2].offset, 2.0);

        let reparsed = doc.reparse().unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn pickup_capacity_uses_notated_length() {
        let xml = r#"<score-partwise version="4.0">
  <part-list>
    <score-part id="P1"><part-name>X</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="0" implicit="yes">
      <attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>G</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice></note>
    </measure>
    <measure number="1">
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration><voice>1</voice></note>
    </measure>
  </part>
</score-partwise>"#;
        let doc = ScoreDocument::parse(xml).unwrap();
        let pickup = doc.parts[0].measure(0).unwrap();
        assert!(pickup.is_pickup());
        assert_eq!(pickup.capacity_beats(), 1.0);
        let full = doc.parts[0].measure(1).unwrap();
        assert_eq!(full.capacity_beats(), 4.0);
        // The whole note inherits the pickup's divisions.
        assert_eq!(full.elements[0].duration, 4.0);
    }

    #[test]
    fn measure_note_lookup_and_mutation() {
        let mut doc = ScoreDocument::parse(SIMPLE_XML).unwrap();
        let measure = doc.parts[0].measure_mut(1).unwrap();

        // Find D4 at beat offset 1.
        let index = measure.find_note(1.0, Some(62), 1).unwrap();
        assert_eq!(measure.elements[index].note().unwrap().midi(), Some(62));
        assert!(measure.find_note(1.0, Some(70), 1).is_none());

        // Replace it with a rest of the same duration.
        let removed = measure.remove_element(index);
        measure.insert_element(TimedElement {
            offset: removed.offset,
            duration: removed.duration,
            voice: removed.voice,
            kind: ElementKind::Rest,
        });
        assert_eq!(measure.elements.len(), 4);
        assert!((measure.content_length() - 4.0).abs() < 1e-9);

        // Serialized output keeps E4 on beat 3 (offset preserved).
        let reparsed = doc.reparse().unwrap();
        let measure = reparsed.parts[0].measure(1).unwrap();
        let e4 = measure.find_note(2.0, Some(64), 1).unwrap();
        assert_eq!(measure.elements[e4].offset, 2.0);
    }

    #[test]
    fn next_free_voice_skips_used_numbers() {
        let doc = ScoreDocument::parse(SIMPLE_XML).unwrap();
        let measure = doc.parts[0].measure(1).unwrap();
        assert_eq!(measure.voices(), vec![1]);
        assert_eq!(measure.next_free_voice(), 2);
    }

    #[test]
    fn ties_survive_the_roundtrip() {
        let xml = r#"<score-partwise version="4.0">
  <part-list>
    <score-part id="P1"><part-name>X</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>E</step><octave>4</octave></pitch><duration>2</duration><tie type="start"/><voice>1</voice></note>
      <note><pitch><step>E</step><octave>4</octave></pitch><duration>2</duration><tie type="stop"/><voice>1</voice></note>
    </measure>
  </part>
</score-partwise>"#;
        let doc = ScoreDocument::parse(xml).unwrap();
        let measure = doc.parts[0].measure(1).unwrap();
        assert!(measure.elements[0].note().unwrap().tie_start);
        assert!(measure.elements[1].note().unwrap().tie_end);

        let reparsed = doc.reparse().unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn grace_notes_are_dropped_without_shifting() {
        let xml = r#"<score-partwise version="4.0">
  <part-list>
    <score-part id="P1"><part-name>X</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
      <note><grace/><pitch><step>B</step><octave>4</octave></pitch><voice>1</voice></note>
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration><voice>1</voice></note>
    </measure>
  </part>
</score-partwise>"#;
        let doc = ScoreDocument::parse(xml).unwrap();
        let measure = doc.parts[0].measure(1).unwrap();
        assert_eq!(measure.elements.len(), 1);
        assert_eq!(measure.elements[0].offset, 0.0);
    }

    #[test]
    fn note_type_table_covers_common_values() {
        assert_eq!(note_type_for(1.0), Some(("quarter", 0)));
        assert_eq!(note_type_for(1.5), Some(("quarter", 1)));
        assert_eq!(note_type_for(4.0), Some(("whole", 0)));
        assert_eq!(note_type_for(0.33), None);
    }
}
