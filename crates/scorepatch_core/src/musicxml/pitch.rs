//! Pitch spelling helpers.
//!
//! Spellings are for display and serialization only; all comparisons in the
//! pipeline are by MIDI number. Re-spelling after a pitch edit prefers
//! sharps, matching common notation-software defaults.

/// Semitone offset of each natural step within an octave.
fn step_semitones(step: char) -> Option<i32> {
    match step {
        'C' => Some(0),
        'D' => Some(2),
        'E' => Some(4),
        'F' => Some(5),
        'G' => Some(7),
        'A' => Some(9),
        'B' => Some(11),
        _ => None,
    }
}

/// Convert a MIDI number to a sharp-preferring (step, alter, octave)
/// spelling. Octaves follow the MIDI convention where 60 is C4.
pub fn midi_to_spelling(midi: u8) -> (char, i8, i32) {
    const STEPS: [(char, i8); 12] = [
        ('C', 0),
        ('C', 1),
        ('D', 0),
        ('D', 1),
        ('E', 0),
        ('F', 0),
        ('F', 1),
        ('G', 0),
        ('G', 1),
        ('A', 0),
        ('A', 1),
        ('B', 0),
    ];
    let (step, alter) = STEPS[usize::from(midi % 12)];
    let octave = i32::from(midi / 12) - 1;
    (step, alter, octave)
}

/// Convert a notated (step, alter, octave) spelling to a MIDI number.
///
/// Returns None for unknown steps or values outside the MIDI range.
pub fn spelling_to_midi(step: char, alter: i8, octave: i32) -> Option<u8> {
    let semitones = step_semitones(step)?;
    let midi = (octave + 1) * 12 + semitones + i32::from(alter);
    u8::try_from(midi).ok().filter(|m| *m <= 127)
}

/// Display name for a MIDI number, e.g. "C#4".
pub fn spelled_name(midi: u8) -> String {
    let (step, alter, octave) = midi_to_spelling(midi);
    let accidental = match alter {
        1 => "#",
        -1 => "b",
        _ => "",
    };
    format!("{}{}{}", step, accidental, octave)
}
