//! Beat clock and step sequencer
//!
//! The clock accumulates wall time while running and fires one step every
//! half beat. A step samples agent state and produces voice triggers:
//!
//! - step 0 rebuilds the melodic schedule and sounds the sustained chord
//! - each percussive voice plays the agent in column `step % columns`
//! - the melodic schedule bucket for the step is drained
//!
//! The sequencer only decides *what* plays. Dispatching to an instrument is
//! left to the caller.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state::{SoundAgent, TypeGroups, VoiceKind, VoiceToggles};
use crate::audio::VoiceTrigger;
use crate::consts::{SCALE_HZ, STEPS_PER_BEAT, STEPS_PER_CYCLE};
use crate::map_clamped;
use crate::settings::{MAX_BPM, MAX_SPEED_FACTOR, MIN_BPM, MIN_SPEED_FACTOR, clamp_or};

/// Agent speed that maps to full playback intensity
pub const SPEED_RANGE: f32 = 3.0;

/// Scale-degree offsets stacked on each melodic agent (root, third, fifth)
pub const ARPEGGIO_OFFSETS: [usize; 3] = [0, 2, 4];

/// Frequency of a scale degree; degrees past the table climb octaves
pub fn scale_frequency(degree: usize) -> f32 {
    let octave = (degree / SCALE_HZ.len()) as i32;
    SCALE_HZ[degree % SCALE_HZ.len()] * 2f32.powi(octave)
}

/// Whether the clock is advancing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClockState {
    #[default]
    Stopped,
    Running,
}

/// Tempo-driven step counter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatClock {
    bpm: f32,
    speed_factor: f32,
    accumulated_ms: f32,
    step_index: usize,
    state: ClockState,
    steps_fired: u64,
}

impl BeatClock {
    pub fn new(bpm: f32, speed_factor: f32) -> Self {
        Self {
            bpm: clamp_or(bpm, MIN_BPM, MAX_BPM, 120.0),
            speed_factor: clamp_or(speed_factor, MIN_SPEED_FACTOR, MAX_SPEED_FACTOR, 1.0),
            accumulated_ms: 0.0,
            step_index: 0,
            state: ClockState::Stopped,
            steps_fired: 0,
        }
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn speed_factor(&self) -> f32 {
        self.speed_factor
    }

    pub fn set_bpm(&mut self, bpm: f32) {
        self.bpm = clamp_or(bpm, MIN_BPM, MAX_BPM, self.bpm);
    }

    pub fn set_speed_factor(&mut self, factor: f32) {
        self.speed_factor = clamp_or(factor, MIN_SPEED_FACTOR, MAX_SPEED_FACTOR, self.speed_factor);
    }

    /// Length of one beat in milliseconds
    pub fn beat_length_ms(&self) -> f32 {
        60_000.0 / (self.bpm * self.speed_factor)
    }

    /// Time between steps in milliseconds
    pub fn step_interval_ms(&self) -> f32 {
        self.beat_length_ms() / STEPS_PER_BEAT
    }

    /// Index of the next step to fire
    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    pub fn steps_fired(&self) -> u64 {
        self.steps_fired
    }

    /// Flip between stopped and running; the accumulator restarts either way
    pub fn toggle(&mut self) -> ClockState {
        self.state = match self.state {
            ClockState::Stopped => ClockState::Running,
            ClockState::Running => ClockState::Stopped,
        };
        self.accumulated_ms = 0.0;
        self.state
    }

    /// Add elapsed time; returns the index of the step that fires, if any
    pub fn advance(&mut self, elapsed_ms: f32) -> Option<usize> {
        if !self.is_running() {
            return None;
        }
        self.accumulated_ms += elapsed_ms.max(0.0);
        if self.accumulated_ms <= self.step_interval_ms() {
            return None;
        }

        self.accumulated_ms = 0.0;
        let fired = self.step_index;
        self.step_index = (self.step_index + 1) % STEPS_PER_CYCLE;
        self.steps_fired += 1;
        Some(fired)
    }
}

/// One pending melodic note
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledNote {
    pub frequency: f32,
    /// Agent that contributed the note
    pub agent: usize,
}

/// Per-cycle arpeggio: step slot -> notes
#[derive(Debug, Clone, Default)]
pub struct MelodicSchedule {
    slots: [Vec<ScheduledNote>; STEPS_PER_CYCLE],
    rebuilds: u64,
}

impl MelodicSchedule {
    /// Re-deal every active melodic agent's triad into random slots
    pub fn rebuild<R: Rng + ?Sized>(&mut self, agents: &[SoundAgent], group: &[usize], rng: &mut R) {
        self.clear();
        for &i in group {
            let agent = &agents[i];
            if !agent.active {
                continue;
            }
            let base = agent.column % SCALE_HZ.len();
            for offset in ARPEGGIO_OFFSETS {
                let slot = rng.random_range(0..STEPS_PER_CYCLE);
                self.slots[slot].push(ScheduledNote {
                    frequency: scale_frequency(base + offset),
                    agent: i,
                });
            }
        }
        self.rebuilds += 1;
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
    }

    /// Remove and return the notes for `step`
    pub fn take(&mut self, step: usize) -> Vec<ScheduledNote> {
        std::mem::take(&mut self.slots[step % STEPS_PER_CYCLE])
    }

    pub fn slot(&self, step: usize) -> &[ScheduledNote] {
        &self.slots[step % STEPS_PER_CYCLE]
    }

    /// Notes still pending this cycle
    pub fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}

/// A voice the step wants played, tied to the agent that caused it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepTrigger {
    pub agent: usize,
    pub trigger: VoiceTrigger,
    /// Part of the cycle-start chord
    pub chord: bool,
}

/// Percussive one-shot shaped by agent speed; `None` for melodic voices
pub fn percussive_trigger(kind: VoiceKind, speed: f32) -> Option<VoiceTrigger> {
    match kind {
        VoiceKind::PercussiveShort => Some(VoiceTrigger {
            voice: kind,
            frequency: None,
            duration: 0.03,
            intensity: map_clamped(speed, 0.0, SPEED_RANGE, 0.05, 0.25),
        }),
        VoiceKind::PercussiveLong => Some(VoiceTrigger {
            voice: kind,
            frequency: Some(map_clamped(speed, 0.0, SPEED_RANGE, 50.0, 80.0)),
            duration: 0.3,
            intensity: map_clamped(speed, 0.0, SPEED_RANGE, 0.35, 0.6),
        }),
        VoiceKind::MelodicPoly | VoiceKind::MelodicSustained => None,
    }
}

/// Sustained chord note for a bass agent
pub fn chord_trigger(agent: &SoundAgent, beat_seconds: f32) -> VoiceTrigger {
    let speed = agent.speed();
    let base = SCALE_HZ[agent.column % SCALE_HZ.len()] / 2.0;
    VoiceTrigger {
        voice: VoiceKind::MelodicSustained,
        frequency: Some(base * map_clamped(speed, 0.0, SPEED_RANGE, 0.9, 1.1)),
        duration: beat_seconds * 2.0,
        intensity: map_clamped(speed, 0.0, SPEED_RANGE, 0.2, 0.4),
    }
}

/// Scheduled melodic note voiced by its source agent's current speed
pub fn scheduled_trigger(note: &ScheduledNote, speed: f32, beat_seconds: f32) -> VoiceTrigger {
    VoiceTrigger {
        voice: VoiceKind::MelodicPoly,
        frequency: Some(note.frequency),
        duration: beat_seconds * 0.5,
        intensity: map_clamped(speed, 0.0, SPEED_RANGE, 0.2, 0.4),
    }
}

/// Beat clock plus melodic schedule
#[derive(Debug, Clone)]
pub struct Sequencer {
    pub clock: BeatClock,
    pub schedule: MelodicSchedule,
}

impl Sequencer {
    pub fn new(bpm: f32, speed_factor: f32) -> Self {
        Self {
            clock: BeatClock::new(bpm, speed_factor),
            schedule: MelodicSchedule::default(),
        }
    }

    /// Run the logic of one step and collect what should play
    pub fn fire_step<R: Rng + ?Sized>(
        &mut self,
        step: usize,
        agents: &mut [SoundAgent],
        groups: &TypeGroups,
        toggles: &VoiceToggles,
        rng: &mut R,
    ) -> Vec<StepTrigger> {
        let beat_seconds = self.clock.beat_length_ms() / 1000.0;
        let mut out = Vec::new();

        for agent in agents.iter_mut() {
            agent.flash = false;
        }

        if step == 0 {
            if toggles.is_enabled(VoiceKind::MelodicPoly) {
                self.schedule.rebuild(agents, groups.get(VoiceKind::MelodicPoly), rng);
                log::debug!("Melodic schedule rebuilt: {} notes", self.schedule.len());
            } else {
                self.schedule.clear();
            }

            if toggles.is_enabled(VoiceKind::MelodicSustained) {
                for &i in groups.get(VoiceKind::MelodicSustained) {
                    if agents[i].active {
                        out.push(StepTrigger {
                            agent: i,
                            trigger: chord_trigger(&agents[i], beat_seconds),
                            chord: true,
                        });
                    }
                }
            }
        }

        for kind in [VoiceKind::PercussiveShort, VoiceKind::PercussiveLong] {
            if !toggles.is_enabled(kind) {
                continue;
            }
            let column = step % kind.column_count();
            let Some(i) = groups.agent_at(agents, kind, column) else {
                continue;
            };
            let agent = &mut agents[i];
            if !agent.active {
                continue;
            }
            if let Some(trigger) = percussive_trigger(kind, agent.speed()) {
                agent.flash = true;
                out.push(StepTrigger {
                    agent: i,
                    trigger,
                    chord: false,
                });
            }
        }

        if toggles.is_enabled(VoiceKind::MelodicPoly) {
            for note in self.schedule.take(step) {
                let agent = &mut agents[note.agent];
                // Deactivated since the schedule was dealt
                if !agent.active {
                    continue;
                }
                agent.flash = true;
                out.push(StepTrigger {
                    agent: note.agent,
                    trigger: scheduled_trigger(&note, agent.speed(), beat_seconds),
                    chord: false,
                });
            }
        }

        out
    }
}
