//! Deterministic simulation module
//!
//! All flocking, sequencing and spatial-trigger logic lives here. This module
//! must be pure and deterministic:
//! - Seeded RNG only
//! - Stable iteration order (by agent index)
//! - No rendering or audio-engine dependencies; sound leaves through
//!   [`crate::audio::Instrument`]

pub mod cluster;
pub mod flock;
pub mod sequencer;
pub mod state;
pub mod tick;
pub mod trip_line;
pub mod vector;

pub use cluster::{Cluster, ClusterTracker, detect_clusters};
pub use flock::{FlockEngine, FlockFrame, SteeringForces};
pub use sequencer::{BeatClock, ClockState, MelodicSchedule, Sequencer, StepTrigger};
pub use state::{Particle, Personality, Rgb, SoundAgent, TypeGroups, VoiceKind, VoiceToggles};
pub use tick::{Command, SimEvent, Simulation, TickInput, tick};
pub use trip_line::{LineOrientation, SegmentChange, TripLine};
