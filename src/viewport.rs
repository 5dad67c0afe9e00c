//! Keeps the input bar above an on-screen keyboard.
//!
//! While an input has focus, every viewport resize is compared with the
//! height recorded at focus time; a shrink larger than the noise threshold is
//! taken to be the keyboard and becomes the input bar offset. Blur always
//! drops the offset back to zero.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

pub const DEFAULT_THRESHOLD: f32 = 100.0;

/// How the layout layer applies the offset to the input bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutStrategy {
    #[default]
    CustomProperty,
    Translate,
    BottomPadding,
}

impl LayoutStrategy {
    /// CSS declaration applying `offset` pixels under this strategy.
    pub fn declaration(self, offset: f32) -> String {
        let px = offset.max(0.0).round();
        match self {
            LayoutStrategy::CustomProperty => format!("--keyboard-offset: {px}px"),
            LayoutStrategy::Translate => format!("transform: translateY(-{px}px)"),
            LayoutStrategy::BottomPadding => format!("padding-bottom: {px}px"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportState {
    Inactive,
    Active { baseline: f32, offset: f32 },
}

/// Result of a resize observed while an input has focus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reposition {
    /// Offset to apply to the input bar.
    pub offset: f32,
    /// Whether this resize changed the offset.
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct ViewportAdapter {
    state: ViewportState,
    threshold: f32,
    strategy: LayoutStrategy,
}

impl Default for ViewportAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, LayoutStrategy::default())
    }
}

impl ViewportAdapter {
    pub fn new(threshold: f32, strategy: LayoutStrategy) -> Self {
        Self {
            state: ViewportState::Inactive,
            threshold,
            strategy,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ViewportState::Active { .. })
    }

    /// Offset currently applied to the input bar.
    pub fn offset(&self) -> f32 {
        match self.state {
            ViewportState::Active { offset, .. } => offset,
            ViewportState::Inactive => 0.0,
        }
    }

    pub fn declaration(&self) -> String {
        self.strategy.declaration(self.offset())
    }

    /// An input gained focus; `viewport_height` becomes the baseline.
    pub fn focus(&mut self, viewport_height: f32) {
        if let ViewportState::Active { baseline, .. } = self.state {
            trace!(baseline, "focus while already active");
            return;
        }
        debug!(baseline = viewport_height, "viewport adapter active");
        self.state = ViewportState::Active {
            baseline: viewport_height,
            offset: 0.0,
        };
    }

    /// The visible viewport changed height. Returns `None` while no input
    /// has focus; otherwise the transcript should be scrolled to its end.
    pub fn resize(&mut self, viewport_height: f32) -> Option<Reposition> {
        let ViewportState::Active { baseline, offset } = &mut self.state else {
            return None;
        };

        let keyboard = *baseline - viewport_height;
        if keyboard > self.threshold {
            let changed = (*offset - keyboard).abs() > f32::EPSILON;
            *offset = keyboard;
            if changed {
                debug!(offset = keyboard, "keyboard offset applied");
            }
            return Some(Reposition {
                offset: keyboard,
                changed,
            });
        }

        trace!(keyboard, threshold = self.threshold, "resize below threshold");
        Some(Reposition {
            offset: *offset,
            changed: false,
        })
    }

    /// The input lost focus. The offset is zero afterwards no matter what
    /// was applied before.
    pub fn blur(&mut self) {
        if self.is_active() {
            debug!("viewport adapter inactive");
        }
        self.state = ViewportState::Inactive;
    }
}

/// Feeds window focus and size changes to a [`ViewportAdapter`].
///
/// The desktop window stands in for the input: window focus is input focus
/// and a window resize is a viewport resize. The baseline is always a
/// measured window height, never a configured one, and a disabled tracker
/// keeps the offset at zero.
#[derive(Debug, Clone)]
pub struct WindowKeyboard {
    adapter: ViewportAdapter,
    enabled: bool,
    focused: bool,
    height: Option<f32>,
}

impl WindowKeyboard {
    pub fn new(adapter: ViewportAdapter, enabled: bool) -> Self {
        if !enabled {
            debug!("keyboard adaptation disabled");
        }
        Self {
            adapter,
            enabled,
            focused: false,
            height: None,
        }
    }

    pub fn offset(&self) -> f32 {
        self.adapter.offset()
    }

    pub fn declaration(&self) -> String {
        self.adapter.declaration()
    }

    pub fn focus_changed(&mut self, focused: bool) {
        self.focused = focused;
        if !focused {
            self.adapter.blur();
            return;
        }
        if !self.enabled {
            return;
        }
        match self.height {
            Some(height) => self.adapter.focus(height),
            None => trace!("focus before the window was measured"),
        }
    }

    /// A measured window height. The first one only sets the baseline.
    pub fn resized(&mut self, height: f32) -> Option<Reposition> {
        let first = self.height.replace(height).is_none();
        if !self.enabled {
            return None;
        }
        if first {
            if self.focused {
                self.adapter.focus(height);
            }
            return None;
        }
        self.adapter.resize(height)
    }
}
