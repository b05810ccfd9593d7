extern crate dnsmsg;

use dnsmsg::*;

fn dname(parts: &[&str]) -> Vec<u8> {
    let mut v = Vec::new();
    for p in parts {
        v.push(p.len() as u8);
        v.extend_from_slice(p.as_bytes());
    }
    v.push(0);
    v
}

struct PacketBuilder {
    buf: Vec<u8>,
}

impl PacketBuilder {
    fn new(id: u16, flags: u16, qd: u16, an: u16, ns: u16, ar: u16) -> Self {
        let mut buf = Vec::new();
        for v in &[id, flags, qd, an, ns, ar] {
            buf.extend_from_slice(&v.to_be_bytes());
        }
        PacketBuilder { buf }
    }

    fn question(mut self, name: &[u8], qtype: u16, qclass: u16) -> Self {
        self.buf.extend_from_slice(name);
        self.buf.extend_from_slice(&qtype.to_be_bytes());
        self.buf.extend_from_slice(&qclass.to_be_bytes());
        self
    }

    fn rr(mut self, name: &[u8], rrtype: u16, rrclass: u16, ttl: u32, rdata: &[u8]) -> Self {
        self.buf.extend_from_slice(name);
        self.buf.extend_from_slice(&rrtype.to_be_bytes());
        self.buf.extend_from_slice(&rrclass.to_be_bytes());
        self.buf.extend_from_slice(&ttl.to_be_bytes());
        self.buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(rdata);
        self
    }

    fn build(self) -> Vec<u8> {
        self.buf
    }
}

fn rrsig_rdata(covered: u16, signer: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&covered.to_be_bytes());
    v.push(8);
    v.push(2);
    v.extend_from_slice(&300u32.to_be_bytes());
    v.extend_from_slice(&0x6000_0000u32.to_be_bytes());
    v.extend_from_slice(&0x5fff_0000u32.to_be_bytes());
    v.extend_from_slice(&0x1234u16.to_be_bytes());
    v.extend_from_slice(signer);
    v.extend_from_slice(b"not a real signature");
    v
}

fn parse(pkt: &[u8]) -> Result<(QueryInfo, ReplyInfo, EdnsData)> {
    let mut pool = HeapKeyPool::default();
    reply_info_parse(pkt, &mut pool)
}

fn assert_replies_equal(a: &ReplyInfo, b: &ReplyInfo) {
    assert_eq!(a.flags, b.flags);
    assert_eq!(a.qdcount, b.qdcount);
    assert_eq!(a.an_numrrsets, b.an_numrrsets);
    assert_eq!(a.ns_numrrsets, b.ns_numrrsets);
    assert_eq!(a.ar_numrrsets, b.ar_numrrsets);
    assert_eq!(a.rrset_count(), b.rrset_count());
    for (x, y) in a.rrsets.iter().zip(b.rrsets.iter()) {
        assert_eq!(x.key, y.key);
        assert_eq!(x.data, y.data);
    }
}

fn roundtrip(pkt: &[u8], now: u32) -> (QueryInfo, ReplyInfo, Vec<u8>) {
    let (qinfo, rep, _) = parse(pkt).unwrap();
    let bytes = {
        let mut iov = Vec::new();
        let used = reply_info_serialize(&qinfo, &rep, 0x9999, rep.flags, &mut iov, 128, now);
        assert!(used > 0);
        assert_eq!(used, iov.len());
        segments_to_bytes(&iov)
    };
    (qinfo, rep, bytes)
}

/// Reads back the RR types of each section of a wire packet.
fn section_types(pkt: &[u8]) -> (Vec<u16>, Vec<u16>, Vec<u16>) {
    let be16 = |at: usize| u16::from_be_bytes([pkt[at], pkt[at + 1]]);
    let (qd, an, ns, ar) = (be16(4), be16(6), be16(8), be16(10));
    let mut pos = DNS_HEADER_SIZE;
    for _ in 0..qd {
        pos = pkt_dname_len(pkt, pos).unwrap().end_offset + 4;
    }
    let walk = |count: u16, pos: &mut usize| {
        let mut types = Vec::new();
        for _ in 0..count {
            *pos = pkt_dname_len(pkt, *pos).unwrap().end_offset;
            types.push(be16(*pos));
            let rdlen = be16(*pos + 8) as usize;
            *pos += 10 + rdlen;
        }
        types
    };
    let a = walk(an, &mut pos);
    let n = walk(ns, &mut pos);
    let r = walk(ar, &mut pos);
    (a, n, r)
}

#[test]
fn test_round_trip_minimal() {
    let owner = dname(&["example", "com"]);
    let pkt = PacketBuilder::new(0x1234, 0x8180, 1, 1, 0, 0)
        .question(&owner, Type::A.into(), Class::IN.into())
        .rr(&owner, Type::A.into(), Class::IN.into(), 300, &[192, 0, 2, 1])
        .build();
    let (qinfo, rep, bytes) = roundtrip(&pkt, 0);
    assert_eq!(&bytes[0..2], &[0x99, 0x99]);
    let (qinfo2, rep2, _) = parse(&bytes).unwrap();
    assert_eq!(qinfo, qinfo2);
    assert_replies_equal(&rep, &rep2);
}

#[test]
fn test_answer_owner_gets_compressed() {
    let owner = dname(&["example", "com"]);
    let pkt = PacketBuilder::new(0, 0x8180, 1, 1, 0, 0)
        .question(&owner, Type::A.into(), Class::IN.into())
        .rr(&owner, Type::A.into(), Class::IN.into(), 300, &[192, 0, 2, 1])
        .build();
    let (_, _, bytes) = roundtrip(&pkt, 0);
    // the answer owner must be a pointer back to the question name
    let at = DNS_HEADER_SIZE + owner.len() + 4;
    assert_eq!(bytes[at], 0xc0);
    assert_eq!(bytes[at + 1], DNS_HEADER_SIZE as u8);
    assert!(bytes.len() < pkt.len());
}

#[test]
fn test_round_trip_all_sections_with_sigs() {
    let www = dname(&["www", "example", "com"]);
    let apex = dname(&["example", "com"]);
    let ns1 = dname(&["ns1", "example", "com"]);
    let ns2 = dname(&["ns2", "example", "com"]);
    let pkt = PacketBuilder::new(7, 0x8180, 1, 2, 1, 4)
        .question(&www, Type::A.into(), Class::IN.into())
        .rr(&www, Type::A.into(), Class::IN.into(), 300, &[192, 0, 2, 1])
        .rr(
            &www,
            Type::RRSIG.into(),
            Class::IN.into(),
            300,
            &rrsig_rdata(Type::A.into(), &apex),
        )
        .rr(&apex, Type::NS.into(), Class::IN.into(), 600, &ns1)
        .rr(&ns1, Type::A.into(), Class::IN.into(), 600, &[192, 0, 2, 53])
        .rr(
            &ns1,
            Type::RRSIG.into(),
            Class::IN.into(),
            600,
            &rrsig_rdata(Type::A.into(), &apex),
        )
        .rr(&ns2, Type::A.into(), Class::IN.into(), 600, &[192, 0, 2, 54])
        .rr(
            &ns2,
            Type::RRSIG.into(),
            Class::IN.into(),
            600,
            &rrsig_rdata(Type::A.into(), &apex),
        )
        .build();
    let (qinfo, rep, bytes) = roundtrip(&pkt, 0);
    let (qinfo2, rep2, _) = parse(&bytes).unwrap();
    assert_eq!(qinfo, qinfo2);
    assert_replies_equal(&rep, &rep2);

    // the additional section emits every plain record before any signature
    let (an, ns, ar) = section_types(&bytes);
    let a = u16::from(Type::A);
    let sig = u16::from(Type::RRSIG);
    assert_eq!(an, vec![a, sig]);
    assert_eq!(ns, vec![u16::from(Type::NS)]);
    assert_eq!(ar, vec![a, a, sig, sig]);
}

#[test]
fn test_serialize_rebases_ttls() {
    let owner = dname(&["example", "com"]);
    let pkt = PacketBuilder::new(0, 0x8180, 1, 1, 0, 0)
        .question(&owner, Type::A.into(), Class::IN.into())
        .rr(&owner, Type::A.into(), Class::IN.into(), 300, &[192, 0, 2, 1])
        .build();
    let (_, _, bytes) = roundtrip(&pkt, 100);
    let (_, rep2, _) = parse(&bytes).unwrap();
    assert_eq!(rep2.rrsets[0].data.ttl, 200);
    assert_eq!(rep2.rrsets[0].data.rr_ttl[0], 200);
}

#[test]
fn test_serialize_overflow_returns_zero() {
    let owner = dname(&["example", "com"]);
    let pkt = PacketBuilder::new(0, 0x8180, 1, 1, 0, 0)
        .question(&owner, Type::A.into(), Class::IN.into())
        .rr(&owner, Type::A.into(), Class::IN.into(), 300, &[192, 0, 2, 1])
        .build();
    let (qinfo, rep, _) = parse(&pkt).unwrap();
    let mut iov = Vec::new();
    assert_eq!(
        reply_info_serialize(&qinfo, &rep, 0, rep.flags, &mut iov, 2, 0),
        0
    );
}

#[test]
fn test_empty_reply_round_trips() {
    let owner = dname(&["example", "com"]);
    let pkt = PacketBuilder::new(3, 0x8180, 1, 0, 0, 0)
        .question(&owner, Type::A.into(), Class::IN.into())
        .build();
    let (qinfo, rep, bytes) = roundtrip(&pkt, 0);
    assert_eq!(rep.rrset_count(), 0);
    let (qinfo2, rep2, _) = parse(&bytes).unwrap();
    assert_eq!(qinfo, qinfo2);
    assert_replies_equal(&rep, &rep2);
}

#[test]
fn test_compression_shrinks_packet() {
    let www = dname(&["www", "example", "com"]);
    let apex = dname(&["example", "com"]);
    let ns1 = dname(&["ns1", "example", "com"]);
    let pkt = PacketBuilder::new(0, 0x8180, 1, 1, 1, 1)
        .question(&www, Type::A.into(), Class::IN.into())
        .rr(&www, Type::A.into(), Class::IN.into(), 300, &[192, 0, 2, 1])
        .rr(&apex, Type::NS.into(), Class::IN.into(), 600, &ns1)
        .rr(&ns1, Type::A.into(), Class::IN.into(), 600, &[192, 0, 2, 53])
        .build();
    let (_, rep, bytes) = roundtrip(&pkt, 0);
    assert!(bytes.len() < pkt.len());
    let (_, rep2, _) = parse(&bytes).unwrap();
    assert_replies_equal(&rep, &rep2);
}
