//! Per-sensor capture schedule

use contracts::{CaptureTriggerMode, SensorDefinition};

/// First frame on the grid `anchor + k * interval` that is `>= frame`
fn next_on_grid(anchor: u64, interval: u64, frame: u64) -> u64 {
    if frame <= anchor {
        return anchor;
    }
    let interval = interval.max(1);
    let periods = (frame - anchor).div_ceil(interval);
    anchor.saturating_add(periods.saturating_mul(interval))
}

/// Tracks when a registered sensor is due.
///
/// Scheduled sensors fire on `sequence_start + first_capture_frame + k * interval`.
/// Manual sensors fire only on frames where a capture was requested.
#[derive(Debug, Clone)]
pub(crate) struct SensorSchedule {
    definition: SensorDefinition,
    enabled: bool,
    anchor_frame: u64,
    next_capture_frame: Option<u64>,
    captures: u64,
}

impl SensorSchedule {
    pub fn new(definition: SensorDefinition, sequence_start: u64, current_frame: u64) -> Self {
        let mut schedule = Self {
            definition,
            enabled: true,
            anchor_frame: 0,
            next_capture_frame: None,
            captures: 0,
        };
        schedule.realign(sequence_start, current_frame);
        schedule
    }

    pub fn definition(&self) -> &SensorDefinition {
        &self.definition
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn captures(&self) -> u64 {
        self.captures
    }

    pub fn is_manual(&self) -> bool {
        self.definition.trigger_mode == CaptureTriggerMode::Manual
    }

    pub fn is_due(&self, frame: u64) -> bool {
        self.enabled && self.next_capture_frame == Some(frame)
    }

    /// Replace the definition, keeping the enabled flag
    pub fn redefine(&mut self, definition: SensorDefinition, sequence_start: u64, frame: u64) {
        self.definition = definition;
        self.realign(sequence_start, frame);
    }

    pub fn set_enabled(&mut self, enabled: bool, frame: u64) {
        if enabled && !self.enabled && !self.is_manual() {
            self.next_capture_frame = Some(next_on_grid(
                self.anchor_frame,
                u64::from(self.definition.capture_interval),
                frame,
            ));
        }
        self.enabled = enabled;
    }

    pub fn request_capture(&mut self, frame: u64) {
        self.next_capture_frame = Some(frame);
    }

    /// Restart the grid at a new sequence boundary
    pub fn realign(&mut self, sequence_start: u64, frame: u64) {
        self.anchor_frame = sequence_start.saturating_add(self.definition.first_capture_frame);
        self.next_capture_frame = if self.is_manual() {
            None
        } else {
            Some(next_on_grid(
                self.anchor_frame,
                u64::from(self.definition.capture_interval),
                frame,
            ))
        };
    }

    /// Bookkeeping at the end of `frame`. Returns whether the sensor was due.
    pub fn close_frame(&mut self, frame: u64) -> bool {
        let due = self.is_due(frame);
        if due {
            self.captures += 1;
        }
        if self.next_capture_frame.is_some_and(|next| next <= frame) {
            self.next_capture_frame = if self.is_manual() {
                None
            } else {
                Some(next_on_grid(
                    self.anchor_frame,
                    u64::from(self.definition.capture_interval),
                    frame.saturating_add(1),
                ))
            };
        }
        due
    }
}
