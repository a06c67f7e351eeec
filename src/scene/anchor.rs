use crate::tracking::{AnchorId, Pose, TrackingFrame, TrackingState};

/// Exponential smoothing rate towards the tracked pose, per second.
pub const ANCHOR_SMOOTHING_SPEED: f32 = 12.0;

/// Tracking binding of an anchor node.
///
/// The node follows the anchor's pose and its subtree is only active while
/// the anchor reports [`TrackingState::Tracking`].
#[derive(Debug, Clone, Default)]
pub struct AnchorBinding {
    anchor: Option<AnchorId>,
    state: TrackingState,
    smoothed: bool,
    pose: Option<Pose>,
}

impl AnchorBinding {
    #[must_use]
    pub fn new(anchor: Option<AnchorId>) -> Self {
        Self {
            anchor,
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn anchor(&self) -> Option<AnchorId> {
        self.anchor
    }

    /// Rebinds to another anchor; the node stays inactive until the next
    /// frame reports it.
    pub fn set_anchor(&mut self, anchor: Option<AnchorId>) {
        self.anchor = anchor;
        self.state = TrackingState::Paused;
        self.pose = None;
    }

    #[inline]
    #[must_use]
    pub fn is_smoothed(&self) -> bool {
        self.smoothed
    }

    pub fn set_smoothed(&mut self, smoothed: bool) {
        self.smoothed = smoothed;
    }

    #[inline]
    #[must_use]
    pub fn tracking_state(&self) -> TrackingState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.anchor.is_some() && self.state.is_tracking()
    }

    /// Pose the node should take after this frame, if any.
    ///
    /// An anchor missing from the frame counts as stopped.
    pub fn update(&mut self, frame: &TrackingFrame, delta_seconds: f32) -> Option<Pose> {
        let id = self.anchor?;
        let Some(anchor) = frame.anchor(id) else {
            self.state = TrackingState::Stopped;
            return None;
        };
        self.state = anchor.state;
        if !anchor.state.is_tracking() {
            return None;
        }

        let pose = match self.pose {
            Some(current) if self.smoothed => {
                let t = 1.0 - (-ANCHOR_SMOOTHING_SPEED * delta_seconds.max(0.0)).exp();
                current.interpolate(&anchor.pose, t)
            }
            _ => anchor.pose,
        };
        self.pose = Some(pose);
        Some(pose)
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Quat, Vec3};

    use super::*;
    use crate::tracking::Anchor;

    fn frame_with(pose: Pose, state: TrackingState) -> TrackingFrame {
        TrackingFrame {
            timestamp_ns: 0,
            camera_pose: Pose::IDENTITY,
            camera_state: TrackingState::Tracking,
            projection: Mat4::IDENTITY,
            anchors: vec![Anchor {
                id: AnchorId(7),
                pose,
                state,
            }],
        }
    }

    #[test]
    fn smoothing_moves_part_of_the_way() {
        let mut binding = AnchorBinding::new(Some(AnchorId(7)));
        binding.set_smoothed(true);
        binding.update(&frame_with(Pose::IDENTITY, TrackingState::Tracking), 0.016);
        let target = Pose::new(Vec3::X, Quat::IDENTITY);
        let pose = binding
            .update(&frame_with(target, TrackingState::Tracking), 0.016)
            .unwrap();
        assert!(pose.translation.x > 0.0 && pose.translation.x < 1.0);
    }

    #[test]
    fn paused_anchor_stops_tracking() {
        let mut binding = AnchorBinding::new(Some(AnchorId(7)));
        assert!(binding.update(&frame_with(Pose::IDENTITY, TrackingState::Paused), 0.016).is_none());
        assert!(!binding.is_tracking());
    }
}
