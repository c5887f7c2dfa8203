//! Helpers that are not part of the queue proper.

/// Memcpy-like copy into a destination that other threads may be observing.
/// Goes through volatile stores so the compiler can neither elide nor fold
/// the writes across the validity handshake. Copies in aligned 64-bit
/// increments with a byte tail.
///
/// # Safety
/// `dest` and `src` must be valid for `length` bytes and must not overlap.
pub(crate) unsafe fn volatile_copy(dest: *mut u8, src: *const u8, mut length: usize) {
    let mut dest = dest;
    let mut src = src;

    if dest as usize & 0x7 == 0 && src as usize & 0x7 == 0 {
        while length >= 8 {
            (dest as *mut u64).write_volatile((src as *const u64).read());
            dest = dest.add(8);
            src = src.add(8);
            length -= 8;
        }
    }

    // Remaining or unaligned bytes.
    while length > 0 {
        dest.write_volatile(src.read());
        dest = dest.add(1);
        src = src.add(1);
        length -= 1;
    }
}

/// Integral base-2 log. Returns the log iff `input` is a power of two.
pub(crate) fn int_log2(input: u32) -> Option<u8> {
    if input.is_power_of_two() {
        Some(input.trailing_zeros() as u8)
    } else {
        None
    }
}
