//! Instrument dispatch boundary
//!
//! The simulation never synthesizes sound itself. It calls into an
//! [`Instrument`] owned by the host: one-shot voices for sequencer steps and
//! cluster blooms, and start/stop pairs for trip-line segment tones. Calls are
//! fire-and-forget.
//!
//! [`Dispatcher`] sits between the simulation and the instrument. It skips
//! calls while the instrument is not ready (e.g. audio not yet unlocked by a
//! user gesture) and tracks which sustained voices are sounding so that a
//! start is never repeated and a stop is never sent for a voice that was not
//! started.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::sim::state::VoiceKind;
use crate::sim::trip_line::LineOrientation;

/// A one-shot note request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceTrigger {
    pub voice: VoiceKind,
    /// Pitch in Hz; `None` for unpitched voices
    pub frequency: Option<f32>,
    /// Note length in seconds
    pub duration: f32,
    /// Playback intensity in [0, 1]
    pub intensity: f32,
}

/// Identity of a sustained trip-line tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentVoiceId {
    pub line: LineOrientation,
    pub segment: usize,
}

/// Sound sink implemented by the host
pub trait Instrument {
    /// Whether the instrument can currently produce sound
    fn is_ready(&self) -> bool {
        true
    }

    fn trigger_voice(&mut self, trigger: &VoiceTrigger);

    fn start_sustained(&mut self, id: SegmentVoiceId, frequency: f32, intensity: f32);

    fn stop_sustained(&mut self, id: SegmentVoiceId);
}

/// Readiness gate and sustained-voice bookkeeping
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    started: HashSet<SegmentVoiceId>,
    skipped: u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send a one-shot voice; returns false when the instrument was not ready
    pub fn trigger(&mut self, instrument: &mut dyn Instrument, trigger: VoiceTrigger) -> bool {
        if !instrument.is_ready() {
            self.skipped += 1;
            return false;
        }
        let trigger = VoiceTrigger {
            intensity: trigger.intensity.clamp(0.0, 1.0),
            ..trigger
        };
        instrument.trigger_voice(&trigger);
        true
    }

    /// Start a sustained voice unless it is already sounding
    pub fn start(
        &mut self,
        instrument: &mut dyn Instrument,
        id: SegmentVoiceId,
        frequency: f32,
        intensity: f32,
    ) -> bool {
        if self.started.contains(&id) {
            return false;
        }
        if !instrument.is_ready() {
            self.skipped += 1;
            return false;
        }
        instrument.start_sustained(id, frequency, intensity.clamp(0.0, 1.0));
        self.started.insert(id);
        true
    }

    /// Stop a sustained voice if it was started
    pub fn stop(&mut self, instrument: &mut dyn Instrument, id: SegmentVoiceId) -> bool {
        if !self.started.remove(&id) {
            return false;
        }
        // A voice we started must be released even if readiness flipped since
        instrument.stop_sustained(id);
        true
    }

    /// Stop every sustained voice on one line
    pub fn stop_line(&mut self, instrument: &mut dyn Instrument, line: LineOrientation) {
        let mut ids: Vec<SegmentVoiceId> =
            self.started.iter().copied().filter(|id| id.line == line).collect();
        ids.sort_by_key(|id| id.segment);
        for id in ids {
            self.stop(instrument, id);
        }
    }

    pub fn is_started(&self, id: SegmentVoiceId) -> bool {
        self.started.contains(&id)
    }

    pub fn sounding(&self) -> usize {
        self.started.len()
    }

    /// Calls dropped because the instrument was not ready
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

/// Instrument that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentInstrument;

impl Instrument for SilentInstrument {
    fn trigger_voice(&mut self, _trigger: &VoiceTrigger) {}
    fn start_sustained(&mut self, _id: SegmentVoiceId, _frequency: f32, _intensity: f32) {}
    fn stop_sustained(&mut self, _id: SegmentVoiceId) {}
}

/// Instrument that logs each call and keeps running totals
#[derive(Debug, Default, Clone)]
pub struct LogInstrument {
    pub voices: u64,
    pub starts: u64,
    pub stops: u64,
}

impl Instrument for LogInstrument {
    fn trigger_voice(&mut self, trigger: &VoiceTrigger) {
        self.voices += 1;
        match trigger.frequency {
            Some(hz) => log::debug!(
                "{:?} {:.1} Hz for {:.2}s @ {:.2}",
                trigger.voice,
                hz,
                trigger.duration,
                trigger.intensity
            ),
            None => log::debug!(
                "{:?} for {:.2}s @ {:.2}",
                trigger.voice,
                trigger.duration,
                trigger.intensity
            ),
        }
    }

    fn start_sustained(&mut self, id: SegmentVoiceId, frequency: f32, intensity: f32) {
        self.starts += 1;
        log::debug!("{:?} segment {} on: {frequency:.1} Hz @ {intensity:.2}", id.line, id.segment);
    }

    fn stop_sustained(&mut self, id: SegmentVoiceId) {
        self.stops += 1;
        log::debug!("{:?} segment {} off", id.line, id.segment);
    }
}

/// One recorded instrument call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchCall {
    Voice(VoiceTrigger),
    Start {
        id: SegmentVoiceId,
        frequency: f32,
        intensity: f32,
    },
    Stop(SegmentVoiceId),
}

/// Instrument that records calls for inspection
#[derive(Debug, Clone)]
pub struct RecordingInstrument {
    pub calls: Vec<DispatchCall>,
    pub ready: bool,
}

impl Default for RecordingInstrument {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            ready: true,
        }
    }
}

impl RecordingInstrument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn voices(&self) -> impl Iterator<Item = &VoiceTrigger> {
        self.calls.iter().filter_map(|c| match c {
            DispatchCall::Voice(t) => Some(t),
            _ => None,
        })
    }

    pub fn voices_of(&self, kind: VoiceKind) -> usize {
        self.voices().filter(|t| t.voice == kind).count()
    }

    pub fn starts(&self) -> impl Iterator<Item = (SegmentVoiceId, f32)> + '_ {
        self.calls.iter().filter_map(|c| match *c {
            DispatchCall::Start { id, frequency, .. } => Some((id, frequency)),
            _ => None,
        })
    }

    pub fn stops(&self) -> impl Iterator<Item = SegmentVoiceId> + '_ {
        self.calls.iter().filter_map(|c| match *c {
            DispatchCall::Stop(id) => Some(id),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl Instrument for RecordingInstrument {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn trigger_voice(&mut self, trigger: &VoiceTrigger) {
        self.calls.push(DispatchCall::Voice(*trigger));
    }

    fn start_sustained(&mut self, id: SegmentVoiceId, frequency: f32, intensity: f32) {
        self.calls.push(DispatchCall::Start {
            id,
            frequency,
            intensity,
        });
    }

    fn stop_sustained(&mut self, id: SegmentVoiceId) {
        self.calls.push(DispatchCall::Stop(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(segment: usize) -> SegmentVoiceId {
        SegmentVoiceId {
            line: LineOrientation::Vertical,
            segment,
        }
    }

    #[test]
    fn test_no_duplicate_start_or_orphan_stop() {
        let mut inst = RecordingInstrument::new();
        let mut d = Dispatcher::new();

        assert!(!d.stop(&mut inst, seg(1)));
        assert!(d.start(&mut inst, seg(1), 220.0, 0.3));
        assert!(!d.start(&mut inst, seg(1), 220.0, 0.3));
        assert!(d.stop(&mut inst, seg(1)));
        assert!(!d.stop(&mut inst, seg(1)));

        assert_eq!(inst.starts().count(), 1);
        assert_eq!(inst.stops().count(), 1);
    }

    #[test]
    fn test_not_ready_skips_calls() {
        let mut inst = RecordingInstrument {
            ready: false,
            ..Default::default()
        };
        let mut d = Dispatcher::new();
        let trigger = VoiceTrigger {
            voice: VoiceKind::PercussiveShort,
            frequency: None,
            duration: 0.03,
            intensity: 0.2,
        };

        assert!(!d.trigger(&mut inst, trigger));
        assert!(!d.start(&mut inst, seg(0), 220.0, 0.3));
        // Never started, so no stop goes out either
        assert!(!d.stop(&mut inst, seg(0)));
        assert!(inst.calls.is_empty());
        assert_eq!(d.skipped(), 2);
    }

    #[test]
    fn test_intensity_is_clamped() {
        let mut inst = RecordingInstrument::new();
        let mut d = Dispatcher::new();
        d.trigger(
            &mut inst,
            VoiceTrigger {
                voice: VoiceKind::PercussiveLong,
                frequency: Some(60.0),
                duration: 0.3,
                intensity: 4.0,
            },
        );
        assert_eq!(inst.voices().next().map(|t| t.intensity), Some(1.0));
    }

    #[test]
    fn test_stop_line_releases_only_that_line() {
        let mut inst = RecordingInstrument::new();
        let mut d = Dispatcher::new();
        let horizontal = SegmentVoiceId {
            line: LineOrientation::Horizontal,
            segment: 2,
        };
        d.start(&mut inst, seg(3), 200.0, 0.3);
        d.start(&mut inst, seg(5), 250.0, 0.3);
        d.start(&mut inst, horizontal, 300.0, 0.3);

        d.stop_line(&mut inst, LineOrientation::Vertical);
        let stopped: Vec<_> = inst.stops().collect();
        assert_eq!(stopped, vec![seg(3), seg(5)]);
        assert!(d.is_started(horizontal));
        assert_eq!(d.sounding(), 1);
    }
}
