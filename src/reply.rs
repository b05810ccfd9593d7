use std::cmp::Ordering;

use byteorder::{BigEndian, ByteOrder};

use crate::constants::*;
use crate::dname;
use crate::errors::*;
use crate::msg_parse::*;
use crate::parse::parse_packet;
use crate::rdata::{rr_descriptor, Rdf};
use crate::wire::Cursor;

/// The question a message asked, in owned form. Doubles as the cache key
/// for a stored reply, which is why the CD bit takes part in hashing and
/// ordering: data obtained with checking disabled must not collide with
/// normally validated data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInfo {
    /// Expanded query name, or `None` when the message had no question.
    pub qname: Option<Vec<u8>>,
    pub qtype: u16,
    pub qclass: u16,
    pub has_cd: bool,
}

impl QueryInfo {
    /// Reads the question out of a query packet.
    pub fn from_query_packet(pkt: &[u8]) -> Result<QueryInfo> {
        // minimum size: header + root label + qtype + qclass
        if pkt.len() < DNS_HEADER_SIZE + 5 {
            return Err(MsgError::Truncated);
        }
        let flags = BigEndian::read_u16(&pkt[DNS_FLAGS_OFFSET..]);
        debug_assert_eq!(flags & DNS_FLAG_QR, 0);
        if BigEndian::read_u16(&pkt[4..]) != 1 {
            return Err(MsgError::InvalidPacket(
                "A query must carry exactly one question",
            ));
        }
        let info = dname::pkt_dname_len(pkt, DNS_QUESTION_OFFSET)?;
        let mut qname = Vec::with_capacity(info.expanded_len);
        dname::copy_uncompressed_name(&mut qname, pkt, DNS_QUESTION_OFFSET);
        let mut cursor = Cursor::new(pkt);
        cursor.set_position(info.end_offset)?;
        let qtype = cursor.read_u16()?;
        let qclass = cursor.read_u16()?;
        Ok(QueryInfo {
            qname: Some(qname),
            qtype,
            qclass,
            has_cd: flags & DNS_FLAG_CD != 0,
        })
    }

    /// Cache-key hash over qtype, qclass, the CD bit and the lowercased name.
    pub fn hash(&self) -> u32 {
        let mut h = 0xab;
        h = dname::hash_u16(h, self.qtype);
        h = dname::hash_u16(h, self.qclass);
        h = dname::hash_bytes(h, &[self.has_cd as u8]);
        match &self.qname {
            Some(name) => dname::dname_hash(name, h),
            None => dname::dname_hash(&[0], h),
        }
    }

    /// Total order for cache trees, most distinguishing field first.
    pub fn compare(&self, other: &QueryInfo) -> Ordering {
        self.qtype
            .cmp(&other.qtype)
            .then_with(|| match (&self.qname, &other.qname) {
                (Some(a), Some(b)) => dname::dname_compare(a, b),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
            })
            .then_with(|| self.has_cd.cmp(&other.has_cd))
            .then_with(|| self.qclass.cmp(&other.qclass))
    }
}

/// Identity of a materialized set: the expanded owner name with the type and
/// class appended, plus flags and the precomputed hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RrsetKey {
    /// Expanded owner name immediately followed by the 2-byte type and
    /// 2-byte class, both in network order.
    pub dname_tc: Vec<u8>,
    /// Length of the owner-name part of `dname_tc`.
    pub dname_len: usize,
    pub flags: u32,
    pub hash: u32,
}

impl RrsetKey {
    #[inline]
    pub fn dname(&self) -> &[u8] {
        &self.dname_tc[..self.dname_len]
    }

    #[inline]
    pub fn rrtype(&self) -> u16 {
        BigEndian::read_u16(&self.dname_tc[self.dname_len..])
    }

    #[inline]
    pub fn rrclass(&self) -> u16 {
        BigEndian::read_u16(&self.dname_tc[self.dname_len + 2..])
    }
}

/// Where long-lived set-key slots come from. A shared allocator may hand out
/// recycled slots; each obtained slot is owned by the parse until it is
/// either handed over to the cache or given back with `release`.
pub trait KeyPool {
    /// Returns a fresh slot, or `None` when allocation fails.
    fn obtain(&mut self) -> Option<Box<RrsetKey>>;
    fn release(&mut self, slot: Box<RrsetKey>);
}

/// Plain heap allocation, for callers without a shared slot cache.
#[derive(Debug, Default)]
pub struct HeapKeyPool;

impl KeyPool for HeapKeyPool {
    fn obtain(&mut self) -> Option<Box<RrsetKey>> {
        Some(Box::new(RrsetKey::default()))
    }

    fn release(&mut self, _slot: Box<RrsetKey>) {}
}

/// Owned, decompressed member data of one set: packed `(rdlen, rdata)`
/// blocks with parallel length and TTL arrays, data RRs first, then rrsigs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedRrsetData {
    /// Canonical TTL of the set: the minimum member TTL after clamping.
    pub ttl: u32,
    /// Number of data RRs.
    pub count: usize,
    /// Number of signatures.
    pub rrsig_count: usize,
    /// Per-member size of the packed block, including the 2-byte rdata length.
    pub rr_len: Vec<usize>,
    pub rr_ttl: Vec<u32>,
    pub rdata: Vec<u8>,
}

impl PackedRrsetData {
    #[inline]
    pub fn total(&self) -> usize {
        self.count + self.rrsig_count
    }

    /// Offset of member `i` in the packed block.
    pub fn rr_offset(&self, i: usize) -> usize {
        self.rr_len[..i].iter().sum()
    }

    /// The `(rdlen, rdata)` block of member `i`.
    pub fn rr(&self, i: usize) -> &[u8] {
        let off = self.rr_offset(i);
        &self.rdata[off..off + self.rr_len[i]]
    }
}

/// One materialized set: its cache key slot and its packed member data.
#[derive(Debug)]
pub struct RrsetEntry {
    pub key: Box<RrsetKey>,
    pub data: PackedRrsetData,
}

/// A fully owned reply, independent of the packet it was parsed from.
/// Sets appear in insertion order: answer sets first, then authority,
/// then additional.
#[derive(Debug, Default)]
pub struct ReplyInfo {
    pub flags: u16,
    pub qdcount: u16,
    pub an_numrrsets: usize,
    pub ns_numrrsets: usize,
    pub ar_numrrsets: usize,
    pub rrsets: Vec<RrsetEntry>,
}

impl ReplyInfo {
    #[inline]
    pub fn rrset_count(&self) -> usize {
        self.rrsets.len()
    }
}

/// Copies one RR into the packed block, decompressing embedded names as the
/// type descriptor dictates. The input was validated by the first pass, so
/// out-of-bounds access here is a bug and panics. Returns the clamped TTL.
fn rdata_copy(pkt: &[u8], out: &mut Vec<u8>, rr: &RrParse, rrtype: u16) -> u32 {
    let mut pos = rr.ttl_data;
    let mut ttl = BigEndian::read_u32(&pkt[pos..]);
    // RFC 2181 section 8: a TTL with the high bit set counts as zero
    if ttl & 0x8000_0000 != 0 {
        ttl = 0;
    }
    pos += 4;
    let start = out.len();
    out.extend_from_slice(&((rr.size - 2) as u16).to_be_bytes());
    let mut pkt_len = BigEndian::read_u16(&pkt[pos..]) as usize;
    pos += 2;
    let desc = rr_descriptor(rrtype);
    if pkt_len > 0 && !desc.is_empty() {
        for &rdf in desc {
            if pkt_len == 0 {
                break;
            }
            let len = match rdf {
                Rdf::Dname => {
                    let r = dname::copy_uncompressed_name(out, pkt, pos);
                    pkt_len -= r.final_offset - pos;
                    pos = r.final_offset;
                    0
                }
                Rdf::Str => pkt[pos] as usize + 1,
                Rdf::Fixed(n) => n,
            };
            if len > 0 {
                debug_assert!(len <= pkt_len);
                out.extend_from_slice(&pkt[pos..pos + len]);
                pos += len;
                pkt_len -= len;
            }
        }
    }
    out.extend_from_slice(&pkt[pos..pos + pkt_len]);
    debug_assert_eq!(out.len() - start, rr.size);
    ttl
}

/// Builds the packed data block for one set, walking the data RRs and then
/// the signatures, tracking the canonical TTL as it goes.
fn materialize_set(pkt: &[u8], arena: &ParseArena, set: &RrsetParse) -> PackedRrsetData {
    let total = set.rr_count + set.rrsig_count;
    let mut data = PackedRrsetData {
        ttl: MAX_TTL,
        count: set.rr_count,
        rrsig_count: set.rrsig_count,
        rr_len: Vec::with_capacity(total),
        rr_ttl: Vec::with_capacity(total),
        rdata: Vec::with_capacity(set.size),
    };
    let mut cur = set.rr_first;
    while let Some(h) = cur {
        let rr = &arena.rrs[h];
        let ttl = rdata_copy(pkt, &mut data.rdata, rr, set.rrtype);
        data.ttl = data.ttl.min(ttl);
        data.rr_ttl.push(ttl);
        data.rr_len.push(rr.size);
        cur = rr.next;
    }
    cur = set.rrsig_first;
    while let Some(h) = cur {
        let rr = &arena.rrs[h];
        let ttl = rdata_copy(pkt, &mut data.rdata, rr, Type::RRSIG.into());
        data.ttl = data.ttl.min(ttl);
        data.rr_ttl.push(ttl);
        data.rr_len.push(rr.size);
        cur = rr.next;
    }
    data
}

fn parse_create_qinfo(pkt: &[u8], msg: &MsgParse) -> QueryInfo {
    let qname = msg.qname.map(|off| {
        let mut v = Vec::with_capacity(msg.qname_len);
        dname::copy_uncompressed_name(&mut v, pkt, off);
        v
    });
    QueryInfo {
        qname,
        qtype: msg.qtype,
        qclass: msg.qclass,
        has_cd: msg.flags & DNS_FLAG_CD != 0,
    }
}

fn parse_create_repinfo(
    pkt: &[u8],
    msg: &MsgParse,
    arena: &ParseArena,
    pool: &mut dyn KeyPool,
) -> Result<ReplyInfo> {
    let mut rep = ReplyInfo {
        flags: msg.flags,
        qdcount: msg.qdcount,
        an_numrrsets: msg.an_rrsets,
        ns_numrrsets: msg.ns_rrsets,
        ar_numrrsets: msg.ar_rrsets,
        rrsets: Vec::with_capacity(msg.rrset_count),
    };
    let mut cur = msg.rrset_first;
    while let Some(h) = cur {
        let set = &arena.rrsets[h];
        let mut key = match pool.obtain() {
            Some(k) => k,
            None => {
                // give back what was already taken, then fail the parse
                reply_info_release(rep, pool);
                return Err(MsgError::AllocFailure);
            }
        };
        key.dname_tc.clear();
        key.dname_tc.reserve(set.dname_len + 4);
        dname::copy_uncompressed_name(&mut key.dname_tc, pkt, set.dname);
        key.dname_tc.extend_from_slice(&set.rrtype.to_be_bytes());
        key.dname_tc.extend_from_slice(&set.rrclass.to_be_bytes());
        debug_assert_eq!(key.dname_tc.len(), set.dname_len + 4);
        key.dname_len = set.dname_len;
        key.flags = set.flags;
        key.hash = set.hash;
        let data = materialize_set(pkt, arena, set);
        rep.rrsets.push(RrsetEntry { key, data });
        cur = set.all_next;
    }
    debug_assert_eq!(rep.rrsets.len(), msg.rrset_count);
    Ok(rep)
}

/// Tears a reply down, returning every obtained key slot to the pool.
pub fn reply_info_release(rep: ReplyInfo, pool: &mut dyn KeyPool) {
    for entry in rep.rrsets {
        pool.release(entry.key);
    }
}

/// Parses an untrusted packet all the way to an owned reply: groups RRs into
/// sets, extracts the EDNS OPT data, and materializes expanded names and
/// rdata. The scratch arena lives only for the duration of this call.
pub fn reply_info_parse(
    pkt: &[u8],
    pool: &mut dyn KeyPool,
) -> Result<(QueryInfo, ReplyInfo, EdnsData)> {
    let mut arena = ParseArena::new();
    let mut msg = MsgParse::new();
    parse_packet(pkt, &mut msg, &mut arena)?;
    let edns = parse_extract_edns(pkt, &mut msg, &mut arena)?;
    let qinfo = parse_create_qinfo(pkt, &msg);
    let rep = parse_create_repinfo(pkt, &msg, &arena, pool)?;
    Ok((qinfo, rep, edns))
}
