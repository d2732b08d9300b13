//! Index arithmetic over a fixed-capacity ring.
//!
//! Every wrap-around computation in the crate goes through this module.

/// Moves `index` forward by `step` slots in a ring of `size` slots.
pub fn increment(index: usize, step: usize, size: usize) -> usize {
    assert!(size > 0, "ring size must be greater than zero");
    (index + step % size) % size
}

/// Moves `index` backward by `step` slots in a ring of `size` slots.
pub fn decrement(index: usize, step: usize, size: usize) -> usize {
    assert!(size > 0, "ring size must be greater than zero");
    (index + size - step % size) % size
}

/// Number of slots in the inclusive interval `[from, to]`, wrapping past the end if `to < from`.
///
/// The result is always in `[1, size]`.
pub fn sub_length(from: usize, to: usize, size: usize) -> usize {
    assert!(size > 0, "ring size must be greater than zero");
    assert!(from < size, "from is out-of-bound, should be in [0, {size}[, but was: {from}");
    assert!(to < size, "to is out-of-bound, should be in [0, {size}[, but was: {to}");

    if to >= from {
        to - from + 1
    } else {
        to + size - from + 1
    }
}

/// Start of the interval of `length` slots that ends (inclusive) at `to`.
pub fn from_index(to: usize, length: usize, size: usize) -> usize {
    assert!(size > 0, "ring size must be greater than zero");
    assert!(length > 0 && length <= size, "length must be in ]0, {size}], but was: {length}");
    assert!(to < size, "to is out-of-bound, should be in [0, {size}[, but was: {to}");

    (to + size + 1 - length) % size
}

/// End (inclusive) of the interval of `length` slots that starts at `from`.
pub fn to_index(from: usize, length: usize, size: usize) -> usize {
    assert!(size > 0, "ring size must be greater than zero");
    assert!(length > 0 && length <= size, "length must be in ]0, {size}], but was: {length}");
    assert!(from < size, "from is out-of-bound, should be in [0, {size}[, but was: {from}");

    (from + length - 1) % size
}

/// Whether `query` lies in `[start, end]`; when `start > end` the interval wraps past the end.
pub fn is_inside_bounds(query: usize, start: usize, end: usize, size: usize) -> bool {
    if query >= size {
        false
    } else if start <= end {
        query >= start && query <= end
    } else {
        query <= end || query >= start
    }
}

/// Linear copy of `new_length` elements read forward from `from`, wrapping once.
///
/// When `new_length` exceeds the ring length the tail is padded with `T::default()`.
pub fn ring_array_copy<T: Copy + Default>(ring: &[T], from: usize, new_length: usize) -> Vec<T> {
    let length = new_length.min(ring.len());
    let mut copy = Vec::with_capacity(new_length);

    if from + length <= ring.len() {
        copy.extend_from_slice(&ring[from..from + length]);
    } else {
        let first = ring.len() - from;
        copy.extend_from_slice(&ring[from..]);
        copy.extend_from_slice(&ring[..length - first]);
    }

    copy.resize(new_length, T::default());
    copy
}

/// Sets `length` slots starting at `from` to `value`, wrapping once.
pub fn ring_array_fill<T: Copy>(ring: &mut [T], value: T, from: usize, length: usize) {
    let length = length.min(ring.len());

    if from + length <= ring.len() {
        ring[from..from + length].fill(value);
    } else {
        let wrapped = from + length - ring.len();
        ring[from..].fill(value);
        ring[..wrapped].fill(value);
    }
}
