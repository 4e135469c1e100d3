//! Frequency → nearest equal-tempered note.
//!
//! All notes are measured in semitones `n` from the reference A4:
//! `n = round(12 · log2(f / ref))`, nearest frequency `ref · 2^(n / 12)`.
//! Pitch class is `n mod 12` counted from A; the octave number turns over at
//! C, so `n = 0` is `A4`, `n = 3` is `C5` and `n = -10` is `B3`.

use std::fmt;

use thiserror::Error;

use crate::config::NoteConfig;

/// Pitch-class names, indexed by semitones above A.
pub const NOTE_NAMES: [&str; 12] = [
    "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
];

/// Octave number of the reference note.
const REFERENCE_OCTAVE: i32 = 4;

/// Semitones from A up to the next C, where the octave number increments.
const A_TO_C: i32 = 9;

// ---------------------------------------------------------------------------
// NoteError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NoteError {
    /// Only finite, positive frequencies have a nearest note.
    #[error("cannot map {0} Hz to a note: frequency must be positive and finite")]
    InvalidFrequency(f32),
}

// ---------------------------------------------------------------------------
// NoteResult
// ---------------------------------------------------------------------------

/// Nearest note to a measured frequency and how far off it is.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteResult {
    /// Scientific pitch name, e.g. `"A4"` or `"C#3"`.
    pub note_name: String,
    /// Signed semitone distance from the reference A4.
    pub semitones: i32,
    /// Equal-tempered frequency of the nearest note in Hz.
    pub nearest_frequency_hz: f32,
    /// `measured - nearest` in Hz: negative is flat, positive is sharp.
    pub deviation_hz: f32,
    /// `|deviation_hz| / nearest · 100`.
    pub deviation_percentage: f32,
    /// Signed deviation in cents (100 cents = 1 semitone).
    pub deviation_cents: f32,
}

impl NoteResult {
    pub fn is_sharp(&self) -> bool {
        self.deviation_hz > 0.0
    }

    pub fn is_flat(&self) -> bool {
        self.deviation_hz < 0.0
    }
}

impl fmt::Display for NoteResult {
    /// `A4 +1.234 Hz`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:+.3} Hz", self.note_name, self.deviation_hz)
    }
}

// ---------------------------------------------------------------------------
// TuningBand
// ---------------------------------------------------------------------------

/// Coarse "how in tune is it" classification for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningBand {
    InTune,
    Close,
    OutOfTune,
}

impl TuningBand {
    pub fn label(&self) -> &'static str {
        match self {
            TuningBand::InTune => "in tune",
            TuningBand::Close => "close",
            TuningBand::OutOfTune => "out of tune",
        }
    }
}

// ---------------------------------------------------------------------------
// NoteMapper
// ---------------------------------------------------------------------------

/// Maps frequencies onto the equal-tempered scale around a reference A4.
///
/// # Example
///
/// ```rust
/// use pitch_tuner::note::NoteMapper;
///
/// let mapper = NoteMapper::default();
/// let note = mapper.map(440.0).unwrap();
/// assert_eq!(note.note_name, "A4");
/// assert_eq!(note.deviation_hz, 0.0);
///
/// assert!(mapper.map(0.0).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct NoteMapper {
    reference_pitch: f32,
    in_tune_percentage: f32,
    out_of_tune_percentage: f32,
}

impl NoteMapper {
    pub fn from_config(config: &NoteConfig) -> Self {
        Self {
            reference_pitch: config.reference_pitch,
            in_tune_percentage: config.in_tune_percentage,
            out_of_tune_percentage: config.out_of_tune_percentage,
        }
    }

    /// Mapper with a custom A4 and the default tuning bands.
    pub fn with_reference(reference_pitch: f32) -> Self {
        Self::from_config(&NoteConfig {
            reference_pitch,
            ..NoteConfig::default()
        })
    }

    pub fn reference_pitch(&self) -> f32 {
        self.reference_pitch
    }

    /// Nearest note to `frequency_hz`.
    ///
    /// # Errors
    ///
    /// [`NoteError::InvalidFrequency`] for zero, negative or non-finite input.
    pub fn map(&self, frequency_hz: f32) -> Result<NoteResult, NoteError> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(NoteError::InvalidFrequency(frequency_hz));
        }

        let semitones = (12.0 * (frequency_hz / self.reference_pitch).log2()).round() as i32;
        let nearest = self.frequency_of(semitones);
        let deviation_hz = frequency_hz - nearest;

        Ok(NoteResult {
            note_name: note_name(semitones),
            semitones,
            nearest_frequency_hz: nearest,
            deviation_hz,
            deviation_percentage: deviation_hz.abs() / nearest * 100.0,
            deviation_cents: 1200.0 * (frequency_hz / nearest).log2(),
        })
    }

    /// Equal-tempered frequency `semitones` away from the reference.
    pub fn frequency_of(&self, semitones: i32) -> f32 {
        self.reference_pitch * 2.0_f32.powf(semitones as f32 / 12.0)
    }

    /// Band for a mapped note.
    pub fn classify(&self, note: &NoteResult) -> TuningBand {
        self.band_for_percentage(note.deviation_percentage)
    }

    /// Band for a raw deviation percentage.
    pub fn band_for_percentage(&self, percentage: f32) -> TuningBand {
        if percentage < self.in_tune_percentage {
            TuningBand::InTune
        } else if percentage < self.out_of_tune_percentage {
            TuningBand::Close
        } else {
            TuningBand::OutOfTune
        }
    }
}

impl Default for NoteMapper {
    fn default() -> Self {
        Self::from_config(&NoteConfig::default())
    }
}

/// Scientific pitch name of the note `semitones` away from A4.
///
/// ```
/// use pitch_tuner::note::note_name;
///
/// assert_eq!(note_name(0), "A4");
/// assert_eq!(note_name(3), "C5");
/// assert_eq!(note_name(-9), "C4");
/// assert_eq!(note_name(-10), "B3");
/// ```
pub fn note_name(semitones: i32) -> String {
    let pitch_class = semitones.rem_euclid(12) as usize;
    let octave = REFERENCE_OCTAVE + (semitones + A_TO_C).div_euclid(12);
    format!("{}{}", NOTE_NAMES[pitch_class], octave)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
