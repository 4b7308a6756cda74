//! C ABI for the source symbol entry point
//!
//! Mirrors `include/srcsym.h`. Strings returned by
//! [`srcsym_extract_source_symbol`] are owned by the caller and must be
//! released with [`srcsym_string_free`].

#![allow(unsafe_code)]

use log::warn;
use std::ffi::{c_char, c_void, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::extractor::extract_source_symbol;

/// Source symbol of a captured stack, or null
///
/// # Safety
/// `addresses` must be null or point to `count` readable pointers.
#[no_mangle]
pub unsafe extern "C" fn srcsym_extract_source_symbol(
    addresses: *const *const c_void,
    count: usize,
) -> *mut c_char {
    if addresses.is_null() || count == 0 {
        return ptr::null_mut();
    }

    // SAFETY: caller guarantees `count` readable elements
    let addresses = unsafe { std::slice::from_raw_parts(addresses, count) };
    let addresses: Vec<usize> = addresses.iter().map(|&addr| addr as usize).collect();

    // Unwinding across the C boundary is undefined behavior
    let symbol = panic::catch_unwind(AssertUnwindSafe(|| extract_source_symbol(&addresses)))
        .unwrap_or_else(|_| {
            warn!("source symbol extraction panicked");
            None
        });

    symbol
        .and_then(|symbol| CString::new(symbol).ok())
        .map_or(ptr::null_mut(), CString::into_raw)
}

/// Free a string returned by [`srcsym_extract_source_symbol`]
///
/// # Safety
/// `symbol` must be null or a pointer returned by
/// `srcsym_extract_source_symbol` that has not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn srcsym_string_free(symbol: *mut c_char) {
    if !symbol.is_null() {
        // SAFETY: pointer came from CString::into_raw
        drop(unsafe { CString::from_raw(symbol) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_null_pointer_returns_null() {
        let symbol = unsafe { srcsym_extract_source_symbol(ptr::null(), 4) };
        assert!(symbol.is_null());
    }

    #[test]
    fn test_zero_count_returns_null() {
        let addresses = [ptr::null::<c_void>()];
        let symbol = unsafe { srcsym_extract_source_symbol(addresses.as_ptr(), 0) };
        assert!(symbol.is_null());
    }

    #[test]
    fn test_null_addresses_return_null() {
        let addresses = [ptr::null::<c_void>(); 3];
        let symbol = unsafe { srcsym_extract_source_symbol(addresses.as_ptr(), addresses.len()) };
        assert!(symbol.is_null());
    }

    #[test]
    fn test_free_null_is_noop() {
        unsafe { srcsym_string_free(ptr::null_mut()) };
    }

    #[test]
    fn test_returned_string_round_trips_through_free() {
        let owned = CString::new("app::main (src/main.rs:3)").expect("no NUL").into_raw();
        // SAFETY: produced by CString::into_raw above
        assert_eq!(unsafe { CStr::from_ptr(owned) }.to_str(), Ok("app::main (src/main.rs:3)"));
        unsafe { srcsym_string_free(owned) };
    }
}
