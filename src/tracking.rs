//! AR tracking input
//!
//! The tracking session runs on its own thread and publishes one
//! [`TrackingFrame`] per camera update through a [`TrackingSender`]. The
//! render thread drains the channel once per frame and only looks at the
//! newest frame.

use glam::{Mat4, Quat, Vec3};

/// Tracking state reported for the camera and for every anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrackingState {
    Tracking,
    #[default]
    Paused,
    Stopped,
}

impl TrackingState {
    #[inline]
    #[must_use]
    pub fn is_tracking(self) -> bool {
        self == Self::Tracking
    }
}

/// Rigid transform in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    #[must_use]
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    #[must_use]
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.translation)
    }

    /// Moves a fraction `t` of the way towards `target`.
    #[must_use]
    pub fn interpolate(&self, target: &Pose, t: f32) -> Pose {
        Pose {
            translation: self.translation.lerp(target.translation, t),
            rotation: self.rotation.slerp(target.rotation, t),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Session-unique anchor identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub id: AnchorId,
    pub pose: Pose,
    pub state: TrackingState,
}

/// Everything the session knows at one camera timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingFrame {
    pub timestamp_ns: u64,
    pub camera_pose: Pose,
    pub camera_state: TrackingState,
    pub projection: Mat4,
    pub anchors: Vec<Anchor>,
}

impl TrackingFrame {
    #[must_use]
    pub fn anchor(&self, id: AnchorId) -> Option<&Anchor> {
        self.anchors.iter().find(|a| a.id == id)
    }
}

/// Producer side, cloneable and `Send`.
#[derive(Debug, Clone)]
pub struct TrackingSender {
    tx: flume::Sender<TrackingFrame>,
}

impl TrackingSender {
    /// Publishes a frame. Returns `false` once the receiving side is gone.
    pub fn send(&self, frame: TrackingFrame) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Render-thread side.
#[derive(Debug)]
pub struct TrackingReceiver {
    rx: flume::Receiver<TrackingFrame>,
}

impl TrackingReceiver {
    /// Drains everything queued and returns the newest frame.
    #[must_use]
    pub fn latest(&self) -> Option<TrackingFrame> {
        self.rx.try_iter().last()
    }
}

#[must_use]
pub fn channel() -> (TrackingSender, TrackingReceiver) {
    let (tx, rx) = flume::unbounded();
    (TrackingSender { tx }, TrackingReceiver { rx })
}
