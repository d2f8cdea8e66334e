//! Boid Orchestra - flocking sound agents driving a step sequencer
//!
//! Core modules:
//! - `sim`: Simulation core (flocking, integration, beat clock, spatial triggers)
//! - `audio`: Instrument dispatch boundary
//! - `snapshot`: Read-only render/UI view of a tick
//! - `settings`: Tunables and control-input clamping

pub mod audio;
pub mod settings;
pub mod sim;
pub mod snapshot;

pub use audio::{Instrument, LogInstrument, RecordingInstrument, SilentInstrument};
pub use settings::{Settings, SettingsError};
pub use sim::{Command, SimEvent, Simulation, TickInput, tick};
pub use snapshot::FrameSnapshot;

/// Simulation configuration constants
pub mod consts {
    /// Reference frame duration that motion constants are tuned against (60 Hz)
    pub const REFERENCE_FRAME_MS: f32 = 1000.0 / 60.0;
    /// Target cadence of the external frame loop
    pub const TARGET_TICK_RATE: u32 = 30;
    /// Longest frame gap integrated in one tick (ms); longer gaps are truncated
    pub const MAX_FRAME_MS: f32 = 100.0;

    /// Steps in one sequencer cycle
    pub const STEPS_PER_CYCLE: usize = 8;
    /// Steps fired per beat (the clock fires every half beat)
    pub const STEPS_PER_BEAT: f32 = 2.0;

    /// Default world extent
    pub const WORLD_WIDTH: f32 = 800.0;
    pub const WORLD_HEIGHT: f32 = 600.0;

    /// Seven-note scale (C major, 4th octave) shared by the melodic voices
    pub const SCALE_HZ: [f32; 7] = [261.63, 293.66, 329.63, 349.23, 392.0, 440.0, 493.88];
}

/// Wrap an angle into [-π, π)
#[inline]
pub fn normalize_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let a = (angle + PI).rem_euclid(TAU) - PI;
    // rem_euclid can round up to TAU itself
    if a >= PI { -PI } else { a }
}

/// Move `current` toward `target` by `factor` along the shortest arc
#[inline]
pub fn lerp_angle(current: f32, target: f32, factor: f32) -> f32 {
    let delta = normalize_angle(target - current);
    normalize_angle(current + delta * factor)
}

/// Linear range mapping with the input clamped to `[in_min, in_max]`
#[inline]
pub fn map_clamped(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let span = in_max - in_min;
    if span.abs() < f32::EPSILON {
        return out_min;
    }
    let t = ((value - in_min) / span).clamp(0.0, 1.0);
    out_min + (out_max - out_min) * t
}
