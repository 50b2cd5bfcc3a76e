//! Per-attachment visibility state machine
//!
//! Each attachment moves through a small state machine driven by whether
//! its owning trackable was detected this tick. Teardown is deferred by a
//! configurable grace period so brief tracking dropouts do not destroy and
//! recreate render resources.
//!
//! Timing: an attachment whose owner goes missing at tick `t` enters
//! `Disappearing` at `t` (and stops rendering), counts down through
//! `PendingTeardown`, and reaches `TornDown` at exactly `t + grace`.
//! Detection at any point before that resurrects it through `Appearing`.

use std::collections::HashMap;

use crate::scene::attachment::AttachmentId;
use crate::scene::trackable::TrackableId;

/// Lifecycle state of one attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibilityState {
    /// Never seen, or explicitly hidden.
    Invisible,
    /// Owner detected this tick; renders starting next tick.
    Appearing,
    Visible,
    /// Owner went missing this tick; no longer rendered.
    Disappearing,
    /// Counting down to resource release. The value is ticks remaining.
    PendingTeardown(u32),
    /// Resources released. Re-detection allocates fresh ones.
    TornDown,
}

impl VisibilityState {
    /// Whether the attachment is rendered in this state.
    pub fn renders(&self) -> bool {
        matches!(self, VisibilityState::Visible)
    }
}

type Key = (TrackableId, AttachmentId);

/// Tracks the visibility state of every attachment the engine has seen.
#[derive(Default)]
pub struct LifecycleTracker {
    states: HashMap<Key, VisibilityState>,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state; attachments never advanced are `Invisible`.
    pub fn state(&self, trackable: &TrackableId, attachment: &AttachmentId) -> VisibilityState {
        self.states
            .get(&(trackable.clone(), attachment.clone()))
            .copied()
            .unwrap_or(VisibilityState::Invisible)
    }

    /// Advance one attachment by one tick.
    ///
    /// `exempt` freezes the state machine: sticky attachments, attachments
    /// whose owner hosts a sticky one, and the transition-slot occupant
    /// never count down toward teardown. Returns `(previous, new)` so the
    /// driver can release resources on the edge into `TornDown`.
    pub fn advance(
        &mut self,
        trackable: &TrackableId,
        attachment: &AttachmentId,
        detected: bool,
        exempt: bool,
        grace: u32,
    ) -> (VisibilityState, VisibilityState) {
        let key = (trackable.clone(), attachment.clone());
        let previous = self
            .states
            .get(&key)
            .copied()
            .unwrap_or(VisibilityState::Invisible);

        let next = if detected {
            match previous {
                VisibilityState::Visible | VisibilityState::Appearing => VisibilityState::Visible,
                _ => VisibilityState::Appearing,
            }
        } else if exempt {
            previous
        } else {
            match previous {
                VisibilityState::Visible | VisibilityState::Appearing => {
                    VisibilityState::Disappearing
                }
                VisibilityState::Disappearing => {
                    if grace > 1 {
                        VisibilityState::PendingTeardown(grace - 1)
                    } else {
                        VisibilityState::TornDown
                    }
                }
                VisibilityState::PendingTeardown(remaining) => {
                    if remaining > 1 {
                        VisibilityState::PendingTeardown(remaining - 1)
                    } else {
                        VisibilityState::TornDown
                    }
                }
                VisibilityState::Invisible => VisibilityState::Invisible,
                VisibilityState::TornDown => VisibilityState::TornDown,
            }
        };

        if next != previous {
            log::debug!("{}/{}: {previous:?} -> {next:?}", trackable.0, attachment.0);
        }
        self.states.insert(key, next);
        (previous, next)
    }

    /// Force an attachment invisible, e.g. when its render resource is
    /// missing.
    pub fn force_invisible(&mut self, trackable: &TrackableId, attachment: &AttachmentId) {
        self.states
            .insert((trackable.clone(), attachment.clone()), VisibilityState::Invisible);
    }

    /// Move an attachment's state under a new key after reparenting.
    pub fn reassign(
        &mut self,
        from: (&TrackableId, &AttachmentId),
        to: (&TrackableId, &AttachmentId),
    ) {
        if let Some(state) = self.states.remove(&(from.0.clone(), from.1.clone())) {
            self.states.insert((to.0.clone(), to.1.clone()), state);
        }
    }

    pub fn remove(&mut self, trackable: &TrackableId, attachment: &AttachmentId) {
        self.states.remove(&(trackable.clone(), attachment.clone()));
    }
}
