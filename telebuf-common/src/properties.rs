use serde::{Deserialize, Serialize};

use crate::ring_math;

/// Geometry of the ring: capacity plus the current index and the active window `[in_point, out_point]`.
///
/// All three indices stay in `[0, size)` while `size > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferProperties {
    size: usize,
    current_index: usize,
    in_point: usize,
    out_point: usize,
}

impl BufferProperties {
    pub fn new(size: usize) -> Self {
        BufferProperties {
            size,
            current_index: 0,
            in_point: 0,
            out_point: 0,
        }
    }

    /// Properties loaded from an external source; indices are clamped into the ring.
    pub fn from_parts(size: usize, current_index: usize, in_point: usize, out_point: usize) -> Self {
        let clamp = |i: usize| if size == 0 { 0 } else { i.min(size - 1) };
        BufferProperties {
            size,
            current_index: clamp(current_index),
            in_point: clamp(in_point),
            out_point: clamp(out_point),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn in_point(&self) -> usize {
        self.in_point
    }

    pub fn out_point(&self) -> usize {
        self.out_point
    }

    pub fn active_buffer_length(&self) -> usize {
        if self.size == 0 {
            0
        } else {
            ring_math::sub_length(self.in_point, self.out_point, self.size)
        }
    }

    pub fn is_inside_active_window(&self, index: usize) -> bool {
        ring_math::is_inside_bounds(index, self.in_point, self.out_point, self.size)
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    pub(crate) fn set_indices(&mut self, current_index: usize, in_point: usize, out_point: usize) {
        self.current_index = current_index;
        self.in_point = in_point;
        self.out_point = out_point;
    }

    pub(crate) fn set_current_index(&mut self, index: usize) -> bool {
        if index == self.current_index || index >= self.size {
            return false;
        }
        self.current_index = index;
        true
    }

    pub(crate) fn set_in_point(&mut self, index: usize) -> bool {
        if index == self.in_point || index >= self.size {
            return false;
        }
        self.in_point = index;
        true
    }

    pub(crate) fn set_out_point(&mut self, index: usize) -> bool {
        if index == self.out_point || index >= self.size {
            return false;
        }
        self.out_point = index;
        true
    }

    /// One forward step.
    ///
    /// With `extend_bounds` the out-point follows the current index and pushes the
    /// in-point ahead once the ring is full. Without it the index loops over the
    /// active window.
    pub(crate) fn step_forward(&mut self, extend_bounds: bool) {
        if extend_bounds {
            self.current_index = ring_math::increment(self.current_index, 1, self.size);
            self.out_point = self.current_index;
            if self.in_point == self.out_point {
                self.in_point = ring_math::increment(self.in_point, 1, self.size);
            }
        } else if !self.is_inside_active_window(self.current_index)
            || self.current_index == self.out_point
        {
            self.current_index = self.in_point;
        } else {
            self.current_index = ring_math::increment(self.current_index, 1, self.size);
        }
    }

    /// `steps` forward steps. Whole laps around the ring (recording) or the active window
    /// (playback) leave the geometry as it was, so only the remainder is walked.
    pub(crate) fn step_forward_by(&mut self, extend_bounds: bool, steps: usize) {
        let period = if extend_bounds {
            self.size
        } else {
            self.active_buffer_length()
        };
        for _ in 0..reduce_steps(steps, period) {
            self.step_forward(extend_bounds);
        }
    }

    pub(crate) fn step_backward_by(&mut self, steps: usize) {
        for _ in 0..reduce_steps(steps, self.active_buffer_length()) {
            self.step_backward();
        }
    }

    /// One backward step, looping over the active window.
    pub(crate) fn step_backward(&mut self) {
        if !self.is_inside_active_window(self.current_index) || self.current_index == self.in_point {
            self.current_index = self.out_point;
        } else {
            self.current_index = ring_math::decrement(self.current_index, 1, self.size);
        }
    }
}

/// The first lap may still move the bounds or jump into the window; after it the motion
/// repeats every `period` steps.
fn reduce_steps(steps: usize, period: usize) -> usize {
    if period == 0 || steps <= period {
        steps
    } else {
        period + (steps - period) % period
    }
}
