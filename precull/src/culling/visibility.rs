//! The render-enable gate fed by the CPU culling path.

/// Per-instance render state. There are only the two states; instances
/// start Visible and may toggle every frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        self == Self::Visible
    }
}

/// Receiver for visibility transitions, implemented by the host renderer.
/// Only invoked on actual state changes.
pub trait VisibilitySink {
    fn set_visible(&mut self, index: usize, visible: bool);
}

/// Idempotent per-instance visibility toggle.
///
/// Render-state writes on the host side can be expensive, so the gate
/// caches the last applied state and swallows redundant sets.
pub struct VisibilityGate {
    states: Vec<Visibility>,
}

impl VisibilityGate {
    pub fn new(instance_count: usize) -> Self {
        Self {
            states: vec![Visibility::Visible; instance_count],
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, index: usize) -> Visibility {
        self.states[index]
    }

    /// Requests a state for one instance. A request matching the cached
    /// state is a no-op; otherwise the sink sees exactly one transition.
    pub fn set(&mut self, index: usize, visible: bool, sink: &mut dyn VisibilitySink) {
        let requested = if visible { Visibility::Visible } else { Visibility::Hidden };
        if self.states[index] == requested {
            return;
        }

        self.states[index] = requested;
        sink.set_visible(index, visible);
    }

    /// Applies a full frame of culling results. Must only be called after
    /// the producing job has joined.
    pub fn apply(&mut self, visibility: &[bool], sink: &mut dyn VisibilitySink) {
        assert_eq!(
            visibility.len(),
            self.states.len(),
            "visibility results do not match the gated instance count"
        );

        for (index, &visible) in visibility.iter().enumerate() {
            self.set(index, visible, sink);
        }
    }
}
