//! Simulation context and the per-tick pipeline
//!
//! One call to [`tick`] runs, in order:
//! 1. control commands from the input
//! 2. the beat clock, firing at most one sequencer step
//! 3. flocking forces per voice group
//! 4. integration of every agent of an enabled voice
//! 5. trip-line and cluster detection against the pre-integration positions
//!
//! Everything a renderer needs afterwards is readable from [`Simulation`].

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::Serialize;

use super::cluster::{Cluster, ClusterTracker, cluster_triggers, detect_clusters};
use super::flock::{FlockEngine, FlockFrame};
use super::sequencer::{ClockState, Sequencer};
use super::state::{Particle, Rgb, SoundAgent, TypeGroups, VoiceKind, VoiceToggles, spawn_population};
use super::trip_line::{LineOrientation, TripLine, segment_frequency};
use crate::audio::{Dispatcher, Instrument, SegmentVoiceId, VoiceTrigger};
use crate::consts::{MAX_FRAME_MS, REFERENCE_FRAME_MS};
use crate::settings::{MAX_FREQUENCY_RATIO, MIN_FREQUENCY_RATIO, Settings, clamp_or};

/// External control commands
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    TogglePlay,
    ToggleVoice(VoiceKind),
    SetVoiceEnabled(VoiceKind, bool),
    SetBpm(f32),
    SetSpeedFactor(f32),
    SetLineRatio(LineOrientation, f32),
    SetLineEnabled(LineOrientation, bool),
    SetLineSegments(LineOrientation, usize),
    SetFrequencyRatio(f32),
    /// Toggle the first enabled agent under a pointer position
    ToggleAgentAt(Vec2),
    ToggleAgent { kind: VoiceKind, column: usize },
}

/// Input for one tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    pub commands: Vec<Command>,
}

/// Discrete things that happened during a tick, for display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    PlayState { playing: bool },
    VoiceToggled { kind: VoiceKind, enabled: bool },
    AgentToggled { agent: usize, active: bool },
    Step { index: usize },
    /// A one-shot voice was requested; `agent` is `None` for cluster blooms
    Voice { agent: Option<usize>, trigger: VoiceTrigger },
    /// Particle-worthy trigger location
    Emission { pos: Vec2, color: Rgb },
    SegmentOn { line: LineOrientation, segment: usize, frequency: f32 },
    SegmentOff { line: LineOrientation, segment: usize },
    ClusterFormed { members: usize, kinds: Vec<VoiceKind>, center: Vec2 },
}

/// The whole simulation, owned by the caller
#[derive(Debug, Clone)]
pub struct Simulation<R: Rng = Pcg32> {
    pub settings: Settings,
    /// All agents; index order is stable for the life of the simulation
    pub agents: Vec<SoundAgent>,
    pub particles: Vec<Particle>,
    pub toggles: VoiceToggles,
    pub sequencer: Sequencer,
    pub lines: [TripLine; 2],
    /// Clusters found on the last tick
    pub clusters: Vec<Cluster>,
    /// Events of the last tick
    pub events: Vec<SimEvent>,
    pub time_ticks: u64,
    /// Accumulated (clamped) frame time in milliseconds
    pub elapsed_ms: f64,
    /// Step fired most recently
    pub last_step: Option<usize>,
    flock: FlockEngine,
    tracker: ClusterTracker,
    dispatcher: Dispatcher,
    rng: R,
}

impl Simulation<Pcg32> {
    /// Create a simulation with a seeded PCG random source
    pub fn new(settings: Settings, seed: u64) -> Self {
        Self::with_rng(settings, Pcg32::seed_from_u64(seed))
    }
}

impl<R: Rng> Simulation<R> {
    /// Create a simulation drawing all randomness from `rng`
    pub fn with_rng(settings: Settings, mut rng: R) -> Self {
        let settings = settings.sanitized();
        let agents = spawn_population(&mut rng, &settings.world);
        let flock = FlockEngine::new(rng.random());
        let lines = [
            TripLine::new(LineOrientation::Vertical, &settings.trip_lines.vertical),
            TripLine::new(LineOrientation::Horizontal, &settings.trip_lines.horizontal),
        ];
        let sequencer = Sequencer::new(settings.tempo.bpm, settings.tempo.speed_factor);

        log::info!(
            "Simulation ready: {} agents, {} active",
            agents.len(),
            agents.iter().filter(|a| a.active).count()
        );

        Self {
            settings,
            agents,
            particles: Vec::new(),
            toggles: VoiceToggles::default(),
            sequencer,
            lines,
            clusters: Vec::new(),
            events: Vec::new(),
            time_ticks: 0,
            elapsed_ms: 0.0,
            last_step: None,
            flock,
            tracker: ClusterTracker::default(),
            dispatcher: Dispatcher::new(),
            rng,
        }
    }

    pub fn world_extent(&self) -> Vec2 {
        Vec2::new(self.settings.world.width, self.settings.world.height)
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.clock.is_running()
    }

    pub fn line(&self, orientation: LineOrientation) -> &TripLine {
        &self.lines[line_slot(orientation)]
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Apply one control command
    pub fn apply(&mut self, command: Command, instrument: &mut dyn Instrument) {
        match command {
            Command::TogglePlay => {
                let playing = self.sequencer.clock.toggle() == ClockState::Running;
                log::info!("{}", if playing { "Playing" } else { "Stopped" });
                self.events.push(SimEvent::PlayState { playing });
            }
            Command::ToggleVoice(kind) => {
                let enabled = self.toggles.toggle(kind);
                self.voice_toggled(kind, enabled);
            }
            Command::SetVoiceEnabled(kind, enabled) => {
                if self.toggles.is_enabled(kind) != enabled {
                    self.toggles.set(kind, enabled);
                    self.voice_toggled(kind, enabled);
                }
            }
            Command::SetBpm(bpm) => self.sequencer.clock.set_bpm(bpm),
            Command::SetSpeedFactor(factor) => self.sequencer.clock.set_speed_factor(factor),
            Command::SetLineRatio(orientation, ratio) => {
                self.lines[line_slot(orientation)].set_ratio(ratio);
            }
            Command::SetLineEnabled(orientation, enabled) => {
                let line = &mut self.lines[line_slot(orientation)];
                line.enabled = enabled;
                if !enabled {
                    let released = line.release_all();
                    self.release_segments(orientation, released, instrument);
                }
            }
            Command::SetLineSegments(orientation, segments) => {
                let released = self.lines[line_slot(orientation)].set_segments(segments);
                self.release_segments(orientation, released, instrument);
            }
            Command::SetFrequencyRatio(ratio) => {
                let tl = &mut self.settings.trip_lines;
                tl.frequency_ratio =
                    clamp_or(ratio, MIN_FREQUENCY_RATIO, MAX_FREQUENCY_RATIO, tl.frequency_ratio);
            }
            Command::ToggleAgentAt(point) => {
                self.toggle_agent_at(point);
            }
            Command::ToggleAgent { kind, column } => {
                self.toggle_agent(kind, column);
            }
        }
    }

    /// Toggle the first enabled agent within hit radius of `point`
    pub fn toggle_agent_at(&mut self, point: Vec2) -> Option<usize> {
        let radius = self.settings.world.hit_radius();
        let hit = self
            .agents
            .iter()
            .position(|a| self.toggles.is_enabled(a.kind) && a.pos.distance(point) < radius)?;
        self.flip_agent(hit);
        Some(hit)
    }

    /// Toggle the agent at `(kind, column)`; returns its new state
    pub fn toggle_agent(&mut self, kind: VoiceKind, column: usize) -> Option<bool> {
        let i = self
            .agents
            .iter()
            .position(|a| a.kind == kind && a.column == column)?;
        self.flip_agent(i);
        Some(self.agents[i].active)
    }

    fn flip_agent(&mut self, i: usize) {
        let agent = &mut self.agents[i];
        agent.toggle();
        self.events.push(SimEvent::AgentToggled {
            agent: i,
            active: agent.active,
        });
    }

    fn voice_toggled(&mut self, kind: VoiceKind, enabled: bool) {
        log::info!("Voice {} {}", kind.as_str(), if enabled { "enabled" } else { "disabled" });
        self.events.push(SimEvent::VoiceToggled { kind, enabled });
    }

    /// Silence a whole line after its segments were switched off
    fn release_segments(
        &mut self,
        orientation: LineOrientation,
        segments: Vec<usize>,
        instrument: &mut dyn Instrument,
    ) {
        self.dispatcher.stop_line(instrument, orientation);
        for segment in segments {
            self.events.push(SimEvent::SegmentOff {
                line: orientation,
                segment,
            });
        }
    }

    fn emit(&mut self, pos: Vec2, color: Rgb, count: usize) {
        self.events.push(SimEvent::Emission { pos, color });
        let cfg = &self.settings.particles;
        if !cfg.enabled {
            return;
        }
        let room = cfg.max.saturating_sub(self.particles.len());
        for _ in 0..count.min(room) {
            self.particles.push(Particle::emit(&mut self.rng, pos, color));
        }
    }

    /// Run one sequencer step and dispatch its voices
    fn run_step(&mut self, step: usize, groups: &TypeGroups, instrument: &mut dyn Instrument) {
        self.events.push(SimEvent::Step { index: step });
        self.last_step = Some(step);

        let triggers =
            self.sequencer
                .fire_step(step, &mut self.agents, groups, &self.toggles, &mut self.rng);
        for t in triggers {
            self.dispatcher.trigger(instrument, t.trigger);
            self.events.push(SimEvent::Voice {
                agent: Some(t.agent),
                trigger: t.trigger,
            });
            let (pos, color) = (self.agents[t.agent].pos, self.agents[t.agent].base_color);
            let count = if t.chord {
                self.settings.particles.per_chord_note
            } else {
                self.settings.particles.per_trigger
            };
            self.emit(pos, color, count);
        }
    }

    /// Active agents of enabled voices
    fn participants(&self, groups: &TypeGroups) -> Vec<usize> {
        VoiceKind::ALL
            .into_iter()
            .filter(|&k| self.toggles.is_enabled(k))
            .flat_map(|k| groups.get(k).iter().copied())
            .filter(|&i| self.agents[i].active)
            .collect()
    }

    fn scan_trip_lines(&mut self, movers: &[(Vec2, Vec2)], instrument: &mut dyn Instrument) {
        let world = self.world_extent();
        let tl = &self.settings.trip_lines;

        for line in self.lines.iter_mut() {
            let changes = line.update(movers.iter().copied(), world, tl.dwell_band);
            for change in changes {
                let id = SegmentVoiceId {
                    line: line.orientation,
                    segment: change.segment,
                };
                if change.active {
                    let frequency = segment_frequency(
                        change.segment,
                        line.segments(),
                        tl.reference_frequency,
                        tl.frequency_ratio,
                    );
                    log::debug!("{:?} segment {} attack {frequency:.1} Hz", id.line, id.segment);
                    self.dispatcher.start(instrument, id, frequency, tl.intensity);
                    self.events.push(SimEvent::SegmentOn {
                        line: id.line,
                        segment: id.segment,
                        frequency,
                    });
                } else {
                    log::debug!("{:?} segment {} release", id.line, id.segment);
                    self.dispatcher.stop(instrument, id);
                    self.events.push(SimEvent::SegmentOff {
                        line: id.line,
                        segment: id.segment,
                    });
                }
            }
        }
    }

    fn scan_clusters(&mut self, candidates: &[usize], instrument: &mut dyn Instrument) {
        self.clusters = detect_clusters(&self.agents, candidates, &self.settings.clusters);
        let grown = self.tracker.observe(&self.clusters);
        let beat_seconds = self.sequencer.clock.beat_length_ms() / 1000.0;

        for ci in grown {
            let cluster = &self.clusters[ci];
            log::debug!(
                "Cluster of {} agents across {} voices",
                cluster.members.len(),
                cluster.kinds.len()
            );
            self.events.push(SimEvent::ClusterFormed {
                members: cluster.members.len(),
                kinds: cluster.kinds.clone(),
                center: cluster.center(),
            });
            if self.settings.clusters.voice && self.toggles.is_enabled(VoiceKind::MelodicPoly) {
                for trigger in cluster_triggers(cluster, beat_seconds) {
                    self.dispatcher.trigger(instrument, trigger);
                    self.events.push(SimEvent::Voice {
                        agent: None,
                        trigger,
                    });
                }
            }
        }
    }
}

#[inline]
fn line_slot(orientation: LineOrientation) -> usize {
    match orientation {
        LineOrientation::Vertical => 0,
        LineOrientation::Horizontal => 1,
    }
}

/// Clamp a raw frame time into `[0, MAX_FRAME_MS]`
#[inline]
pub fn frame_ms(elapsed_ms: f32) -> f32 {
    clamp_or(elapsed_ms, 0.0, MAX_FRAME_MS, 0.0)
}

/// Advance the simulation by one frame of `elapsed_ms` wall time
pub fn tick<R: Rng>(
    sim: &mut Simulation<R>,
    input: &TickInput,
    elapsed_ms: f32,
    instrument: &mut dyn Instrument,
) {
    sim.events.clear();
    for command in &input.commands {
        sim.apply(command.clone(), instrument);
    }

    let elapsed = frame_ms(elapsed_ms);
    let dt = elapsed / REFERENCE_FRAME_MS;
    sim.time_ticks += 1;
    sim.elapsed_ms += f64::from(elapsed);

    let groups = TypeGroups::partition(&sim.agents);

    // Beat clock
    if let Some(step) = sim.sequencer.clock.advance(elapsed) {
        sim.run_step(step, &groups, instrument);
    }

    // Flocking, one voice group at a time
    let frame = FlockFrame {
        tuning: &sim.settings.flock,
        world_center: sim.world_extent() * 0.5,
        elapsed_ms: sim.elapsed_ms,
    };
    for kind in VoiceKind::ALL {
        if sim.toggles.is_enabled(kind) {
            sim.flock
                .update_group(&mut sim.agents, groups.get(kind), &frame, &mut sim.rng);
        }
    }

    // Integration
    let previous: Vec<Vec2> = sim.agents.iter().map(|a| a.pos).collect();
    let world = sim.world_extent();
    for kind in VoiceKind::ALL {
        if !sim.toggles.is_enabled(kind) {
            continue;
        }
        for &i in groups.get(kind) {
            sim.agents[i].integrate(dt, world, &sim.settings.flock);
        }
    }

    for particle in sim.particles.iter_mut() {
        particle.update(dt);
    }
    sim.particles.retain(Particle::is_alive);

    // Spatial triggers
    let participants = sim.participants(&groups);
    let movers: Vec<(Vec2, Vec2)> = participants
        .iter()
        .map(|&i| (previous[i], sim.agents[i].pos))
        .collect();
    sim.scan_trip_lines(&movers, instrument);
    sim.scan_clusters(&participants, instrument);
}
