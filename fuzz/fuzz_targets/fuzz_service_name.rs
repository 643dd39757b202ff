//! Fuzz target for service name parsing and preamble framing.

#![no_main]

use gitway_git::{PktLineReader, Service};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let Ok(name) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(service) = Service::parse(name) {
        let preamble = service.preamble().expect("preamble always fits one frame");
        let mut reader = PktLineReader::new(Cursor::new(preamble));
        let line = reader.read().unwrap().unwrap();
        assert_eq!(
            line.as_str(),
            Some(format!("# service={}", service.service_name()).as_str())
        );
        assert!(reader.read().unwrap().unwrap().is_flush());
    }
});
