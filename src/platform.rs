//! Platform queries.

/// Free heap in bytes.
///
/// The host has no meaningful limit, so memory-pressure shedding never
/// triggers there.
#[cfg(feature = "esp32")]
pub fn free_heap_bytes() -> usize {
    // SAFETY: reads an allocator counter, no preconditions.
    unsafe { esp_idf_sys::esp_get_free_heap_size() as usize }
}

/// Free heap in bytes.
///
/// The host has no meaningful limit, so memory-pressure shedding never
/// triggers there.
#[cfg(not(feature = "esp32"))]
pub fn free_heap_bytes() -> usize {
    usize::MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::MIN_FREE_HEAP_BYTES;

    #[test]
    fn test_host_heap_never_sheds() {
        assert!(free_heap_bytes() >= MIN_FREE_HEAP_BYTES);
    }
}
