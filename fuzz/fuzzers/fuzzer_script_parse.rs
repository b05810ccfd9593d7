#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate dnsmsg;

use dnsmsg::*;

fuzz_target!(|packet: &[u8]| {
    let mut pool = HeapKeyPool::default();
    let _ = reply_info_parse(packet, &mut pool);
});
