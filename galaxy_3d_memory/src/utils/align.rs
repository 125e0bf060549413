/// Offset alignment helpers.
///
/// All functions are `const` so alignment constants can be checked at
/// compile time.

/// Round `value` up to the next multiple of `alignment`.
///
/// An alignment of 0 or 1 leaves the value unchanged. Non power-of-two
/// alignments are supported (e.g. 12-byte texels).
pub const fn align(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    let remainder = value % alignment;
    if remainder == 0 {
        value
    } else {
        value + (alignment - remainder)
    }
}

/// Apply each alignment constraint in sequence.
///
/// Each step only grows the value, so for power-of-two constraints the result
/// is aligned to the largest of them.
pub const fn align_all(value: u64, alignments: &[u64]) -> u64 {
    let mut result = value;
    let mut i = 0;
    while i < alignments.len() {
        result = align(result, alignments[i]);
        i += 1;
    }
    result
}

/// Smallest alignment satisfying both `a` and `b` (0 and 1 mean "none").
pub const fn lcm(a: u64, b: u64) -> u64 {
    let a = if a == 0 { 1 } else { a };
    let b = if b == 0 { 1 } else { b };
    let (mut x, mut y) = (a, b);
    while y != 0 {
        let t = x % y;
        x = y;
        y = t;
    }
    a / x * b
}

/// Variadic form of [`align`]: `align!(value, a1, a2, ...)`.
#[macro_export]
macro_rules! align {
    ($value:expr, $($alignment:expr),+ $(,)?) => {
        $crate::utils::align::align_all($value, &[$($alignment),+])
    };
}

const _: () = assert!(align(0, 256) == 0);
const _: () = assert!(align(1, 256) == 256);
const _: () = assert!(align(13, 0) == 13);
const _: () = assert!(align_all(100, &[4, 64]) == 128);
const _: () = assert!(lcm(256, 12) == 768);

#[cfg(test)]
#[path = "align_tests.rs"]
mod tests;
