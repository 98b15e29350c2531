//! Fuzz test for the LMDB entry frame decoder
//!
//! Frames are read back from a memory-mapped file that may have been written
//! by another process version or truncated by a crash. Decoding arbitrary
//! bytes must return an error, never panic.
//!
//! Run with: cargo +nightly fuzz run entry_frame_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use pledge_storage::EntryFrame;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = EntryFrame::decode(data) {
        // Anything that decodes must re-encode to a frame that decodes the same.
        let encoded = frame.encode().expect("decoded frame re-encodes");
        let again = EntryFrame::decode(&encoded).expect("re-encoded frame decodes");
        assert_eq!(again, frame);
    }
});
