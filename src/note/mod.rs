//! Note mapping: nearest equal-tempered pitch, signed deviation and tuning
//! band for a detected frequency.

pub mod mapper;

pub use mapper::{note_name, NoteError, NoteMapper, NoteResult, TuningBand, NOTE_NAMES};
