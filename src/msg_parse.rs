use byteorder::{BigEndian, ByteOrder};

use crate::arena::{Arena, Handle};
use crate::constants::*;
use crate::dname;
use crate::errors::*;

/// RRset flag: an NSEC member looks like it comes from a zone apex
/// (its type bitmap advertises SOA).
pub const RRSET_NSEC_AT_APEX: u32 = 0x1;

/// RRset flag: the message carrying the set had the Checking Disabled bit on.
/// Keeps unvalidated data apart from normally validated data in caches.
pub const RRSET_CD: u32 = 0x2;

pub type RrsetHandle = Handle<RrsetParse>;
pub type RrHandle = Handle<RrParse>;

/// Scratch storage for a single parse. Everything allocated here borrows
/// nothing and is dropped in one go when the parse returns.
#[derive(Debug, Default)]
pub struct ParseArena {
    pub rrsets: Arena<RrsetParse>,
    pub rrs: Arena<RrParse>,
}

impl ParseArena {
    pub fn new() -> Self {
        ParseArena::default()
    }

    pub fn free_all(&mut self) {
        self.rrsets.free_all();
        self.rrs.free_all();
    }
}

/// One resource record as seen in the packet.
#[derive(Debug)]
pub struct RrParse {
    /// Offset of `TTL|RDLEN|RDATA` in the source packet.
    pub ttl_data: usize,
    /// Bytes this RR will need once its rdata is fully expanded,
    /// including the 2-byte rdata length.
    pub size: usize,
    pub next: Option<RrHandle>,
}

/// A group of RRs sharing owner name, type, class and flags.
#[derive(Debug)]
pub struct RrsetParse {
    pub hash: u32,
    pub section: Section,
    /// Offset of the (possibly compressed) owner name in the source packet.
    pub dname: usize,
    /// Length of the owner name once expanded.
    pub dname_len: usize,
    pub rrtype: u16,
    pub rrclass: u16,
    pub flags: u32,
    pub rr_count: usize,
    /// Accumulated decompressed size of all members.
    pub size: usize,
    pub rr_first: Option<RrHandle>,
    pub rr_last: Option<RrHandle>,
    pub rrsig_count: usize,
    pub rrsig_first: Option<RrHandle>,
    pub rrsig_last: Option<RrHandle>,
    pub bucket_next: Option<RrsetHandle>,
    pub all_next: Option<RrsetHandle>,
}

/// Transient description of a whole message: header fields, question,
/// and the RRset index (hash table plus insertion-order list).
/// Never outlives the parse call it was built by.
#[derive(Debug)]
pub struct MsgParse {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
    /// Offset of the question name in the packet, if there is a question.
    pub qname: Option<usize>,
    pub qname_len: usize,
    pub qtype: u16,
    pub qclass: u16,
    pub an_rrsets: usize,
    pub ns_rrsets: usize,
    pub ar_rrsets: usize,
    pub rrset_count: usize,
    pub hashtable: [Option<RrsetHandle>; PARSE_TABLE_SIZE],
    pub rrset_first: Option<RrsetHandle>,
    pub rrset_last: Option<RrsetHandle>,
}

impl Default for MsgParse {
    fn default() -> Self {
        MsgParse {
            id: 0,
            flags: 0,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
            qname: None,
            qname_len: 0,
            qtype: 0,
            qclass: 0,
            an_rrsets: 0,
            ns_rrsets: 0,
            ar_rrsets: 0,
            rrset_count: 0,
            hashtable: [None; PARSE_TABLE_SIZE],
            rrset_first: None,
            rrset_last: None,
        }
    }
}

#[inline]
fn bucket_of(hash: u32) -> usize {
    hash as usize & (PARSE_TABLE_SIZE - 1)
}

impl MsgParse {
    pub fn new() -> Self {
        MsgParse::default()
    }

    /// Allocates a new RRset, prepends it to its hash bucket and appends it
    /// to the insertion-order list. Section counters are the caller's job.
    #[allow(clippy::too_many_arguments)]
    pub fn new_rrset(
        &mut self,
        arena: &mut ParseArena,
        dname: usize,
        dname_len: usize,
        rrtype: u16,
        rrclass: u16,
        hash: u32,
        flags: u32,
        section: Section,
    ) -> RrsetHandle {
        let b = bucket_of(hash);
        let h = arena.rrsets.alloc(RrsetParse {
            hash,
            section,
            dname,
            dname_len,
            rrtype,
            rrclass,
            flags,
            rr_count: 0,
            size: 0,
            rr_first: None,
            rr_last: None,
            rrsig_count: 0,
            rrsig_first: None,
            rrsig_last: None,
            bucket_next: self.hashtable[b],
            all_next: None,
        });
        self.hashtable[b] = Some(h);
        match self.rrset_last {
            Some(last) => arena.rrsets[last].all_next = Some(h),
            None => self.rrset_first = Some(h),
        }
        self.rrset_last = Some(h);
        h
    }

    /// Scans a bucket for a set matching hash, owner name, type, class and flags.
    #[allow(clippy::too_many_arguments)]
    pub fn hashtable_lookup(
        &self,
        arena: &ParseArena,
        pkt: &[u8],
        hash: u32,
        flags: u32,
        dname: usize,
        dname_len: usize,
        rrtype: u16,
        rrclass: u16,
    ) -> Option<RrsetHandle> {
        let mut cur = self.hashtable[bucket_of(hash)];
        while let Some(h) = cur {
            let p = &arena.rrsets[h];
            if p.hash == hash
                && p.dname_len == dname_len
                && p.rrtype == rrtype
                && p.rrclass == rrclass
                && p.flags == flags
                && dname::dname_pkt_compare(pkt, dname, p.dname) == std::cmp::Ordering::Equal
            {
                return Some(h);
            }
            cur = p.bucket_next;
        }
        None
    }

    /// Removes a set from its hash bucket; the insertion-order list is untouched.
    pub fn bucket_remove(&mut self, arena: &mut ParseArena, rrset: RrsetHandle) {
        let b = bucket_of(arena.rrsets[rrset].hash);
        let mut cur = self.hashtable[b];
        let mut prev: Option<RrsetHandle> = None;
        while let Some(h) = cur {
            if h == rrset {
                let next = arena.rrsets[h].bucket_next;
                match prev {
                    Some(p) => arena.rrsets[p].bucket_next = next,
                    None => self.hashtable[b] = next,
                }
                return;
            }
            prev = Some(h);
            cur = arena.rrsets[h].bucket_next;
        }
    }

    /// Prepends a set to the bucket matching its current hash.
    pub fn bucket_prepend(&mut self, arena: &mut ParseArena, rrset: RrsetHandle) {
        let b = bucket_of(arena.rrsets[rrset].hash);
        arena.rrsets[rrset].bucket_next = self.hashtable[b];
        self.hashtable[b] = Some(rrset);
    }

    pub fn section_count_inc(&mut self, section: Section) {
        match section {
            Section::Answer => self.an_rrsets += 1,
            Section::Authority => self.ns_rrsets += 1,
            Section::Additional => self.ar_rrsets += 1,
            Section::Question => debug_assert!(false, "rrsets never live in the question section"),
        }
    }

    /// Moves a set to a new section: unlinks it from the insertion-order list,
    /// re-appends it at the tail, and fixes both section counters. Only
    /// RRSIG-driven reassignments happen, so within a section the list stays
    /// in first-seen order. Moving a set into the answer section is a
    /// programmer error.
    pub fn change_section(&mut self, arena: &mut ParseArena, rrset: RrsetHandle, section: Section) {
        if section == arena.rrsets[rrset].section {
            return;
        }
        // remove from list
        let mut cur = self.rrset_first;
        let mut prev: Option<RrsetHandle> = None;
        while let Some(h) = cur {
            if h == rrset {
                let next = arena.rrsets[h].all_next;
                match prev {
                    Some(p) => arena.rrsets[p].all_next = next,
                    None => self.rrset_first = next,
                }
                if self.rrset_last == Some(rrset) {
                    self.rrset_last = prev;
                }
                break;
            }
            prev = Some(h);
            cur = arena.rrsets[h].all_next;
        }
        match arena.rrsets[rrset].section {
            Section::Answer => self.an_rrsets -= 1,
            Section::Authority => self.ns_rrsets -= 1,
            Section::Additional => self.ar_rrsets -= 1,
            Section::Question => debug_assert!(false, "rrsets never live in the question section"),
        }
        // insert at end of list
        arena.rrsets[rrset].all_next = None;
        match self.rrset_last {
            Some(last) => arena.rrsets[last].all_next = Some(rrset),
            None => self.rrset_first = Some(rrset),
        }
        self.rrset_last = Some(rrset);
        match section {
            Section::Authority => self.ns_rrsets += 1,
            Section::Additional => self.ar_rrsets += 1,
            _ => debug_assert!(false, "rrsets are never reassigned into this section"),
        }
        arena.rrsets[rrset].section = section;
    }
}

/// EDNS(0) data extracted from the OPT pseudo-RR.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EdnsData {
    pub present: bool,
    pub ext_rcode: u8,
    pub version: u8,
    /// Extended flags; the DO bit is the high bit.
    pub bits: u16,
    /// Requestor's maximum UDP payload size.
    pub udp_size: u16,
}

impl Default for EdnsData {
    fn default() -> Self {
        EdnsData {
            present: false,
            ext_rcode: 0,
            version: 0,
            bits: 0,
            udp_size: DNS_DEFAULT_UDP_SIZE,
        }
    }
}

/// Finds the OPT pseudo-RR, validates it, removes it from the message and
/// returns its header data. The class field cannot take part in hashing
/// (it encodes the UDP size), so the insertion-order list is scanned instead.
pub fn parse_extract_edns(
    pkt: &[u8],
    msg: &mut MsgParse,
    arena: &mut ParseArena,
) -> Result<EdnsData> {
    let mut found: Option<RrsetHandle> = None;
    let mut found_prev: Option<RrsetHandle> = None;
    let mut prev: Option<RrsetHandle> = None;
    let mut cur = msg.rrset_first;
    while let Some(h) = cur {
        if arena.rrsets[h].rrtype == u16::from(Type::OPT) {
            if found.is_some() {
                return Err(MsgError::InvalidPacket("Only one OPT record is allowed"));
            }
            found_prev = prev;
            found = Some(h);
        }
        prev = Some(h);
        cur = arena.rrsets[h].all_next;
    }
    let found = match found {
        None => return Ok(EdnsData::default()),
        Some(h) => h,
    };
    if arena.rrsets[found].section != Section::Additional {
        return Err(MsgError::InvalidPacket(
            "OPT RRs must be in the additional section",
        ));
    }
    let last_rr = match arena.rrsets[found].rr_last {
        Some(h) => h,
        None => return Err(MsgError::InvalidPacket("OPT RR without any record")),
    };

    // remove from the insertion-order list and the hash table
    let next = arena.rrsets[found].all_next;
    match found_prev {
        Some(p) => arena.rrsets[p].all_next = next,
        None => msg.rrset_first = next,
    }
    if msg.rrset_last == Some(found) {
        msg.rrset_last = found_prev;
    }
    msg.bucket_remove(arena, found);
    msg.arcount -= 1;
    msg.ar_rrsets -= 1;
    msg.rrset_count -= 1;

    // most lenient reading possible: ignore the owner name, use the last RR
    let ttl_data = arena.rrs[last_rr].ttl_data;
    Ok(EdnsData {
        present: true,
        ext_rcode: pkt[ttl_data],
        version: pkt[ttl_data + 1],
        bits: BigEndian::read_u16(&pkt[ttl_data + 2..]),
        udp_size: arena.rrsets[found].rrclass,
    })
}
