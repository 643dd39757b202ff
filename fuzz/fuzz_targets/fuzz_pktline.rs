//! Fuzz target for pkt-line parsing.
//!
//! The reader must never panic, and any data packet it accepts must
//! re-encode to a frame of the same length carrying the same payload.

#![no_main]

use gitway_git::{PktLine, PktLineReader};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let mut reader = PktLineReader::new(Cursor::new(data));
    let mut offset = 0usize;

    // Bounded so crafted input cannot spin forever.
    for _ in 0..100 {
        match reader.read() {
            Ok(Some(pkt)) => {
                let encoded = pkt.encode().expect("decoded packet must re-encode");
                assert!(offset + encoded.len() <= data.len());
                if let PktLine::Data(payload) = &pkt {
                    assert_eq!(&data[offset + 4..offset + encoded.len()], &payload[..]);
                }
                offset += encoded.len();
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }
});
