//! Per-note detector stages, in the order the segmentation driver runs them
//!
//! Stage 1: trigger location (coarse "a note starts here")
//! Stage 2: onset refinement (walk back to the true start)
//! Stage 3: noise floor measurement ahead of the onset
//! Stage 4: end-of-note location
//! Stage 5: pitch estimation

pub mod end;
pub mod noise;
pub mod onset;
pub mod pitch;
pub mod trigger;

pub use end::{find_end, NoteEnd};
pub use noise::{measure_noise, noise_probe};
pub use onset::{find_nth_zero_crossing, find_onset};
pub use pitch::{estimate_pitch, PitchEstimate};
pub use trigger::{find_peak, find_trigger};
