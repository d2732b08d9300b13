use crate::registry::Registry;

/// A pass over the active window of a shared buffer.
///
/// Before each `process` call the variables hold the values of the current slot; whatever
/// the processor leaves in them is written back to that slot.
pub trait BufferProcessor {
    /// Called once per pass, before the first `process`.
    fn initialize(&mut self, root: &Registry);

    /// Whether to walk from in-point to out-point (`true`) or the reverse.
    fn go_forward(&self) -> bool {
        true
    }

    /// `start` and `end` are the first and last indices of the walk.
    fn process(&mut self, start: usize, end: usize, current: usize);
}
