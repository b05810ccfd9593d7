#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate dnsmsg;

use dnsmsg::*;

fuzz_target!(|packet: &[u8]| {
    let mut pool = HeapKeyPool::default();
    let (qinfo, rep, _edns) = match reply_info_parse(packet, &mut pool) {
        Err(_) => return,
        Ok(parsed) => parsed,
    };
    let mut iov = Vec::new();
    let flags = rep.flags | DNS_FLAG_QR;
    if reply_info_serialize(&qinfo, &rep, 0, flags, &mut iov, 1024, 0) == 0 {
        return;
    }
    let bytes = segments_to_bytes(&iov);
    let mut pool = HeapKeyPool::default();
    let _ = reply_info_parse(&bytes, &mut pool);
});
