#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use std::path::Path;
use timeguard::store::{read_classification, read_observations, RawTimingReader, TraceReader};

fuzz_target!(|data: &[u8]| {
    let _ = read_classification(Cursor::new(data), Path::new("tgdata.txt"));
    let _ = read_observations(Cursor::new(data), Path::new("ttracedata.txt"));
    for _ in RawTimingReader::new(Cursor::new(data), "tdata.txt") {}
    for _ in TraceReader::new(Cursor::new(data), "ttdata.txt") {}
});
