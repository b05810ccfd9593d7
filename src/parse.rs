use std::cmp::Ordering;

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, warn};

use crate::constants::*;
use crate::dname;
use crate::errors::*;
use crate::msg_parse::*;
use crate::rdata::{rr_descriptor, Rdf};
use crate::wire::Cursor;

/// Owner-name cache for the RR seen just before the current one.
/// `dname_first` is where the owner was first stored, `dname_last` where it
/// was seen most recently; a pointer to either location means equality
/// without expanding anything.
struct PrevRr {
    dname_first: usize,
    dname_last: usize,
    dname_len: usize,
    rrtype: u16,
    rrclass: u16,
    rrset: RrsetHandle,
}

/// Flags a set derives from the message header and a peek at the rdata.
/// The cursor is at the TTL position of the current RR.
fn pkt_rrset_flags(msg: &MsgParse, pkt: &[u8], ttl_off: usize, rrtype: u16) -> u32 {
    let mut f = if msg.flags & DNS_FLAG_CD != 0 {
        RRSET_CD
    } else {
        0
    };
    if rrtype == u16::from(Type::NSEC) && nsec_at_apex(pkt, ttl_off) {
        f |= RRSET_NSEC_AT_APEX;
    }
    f
}

/// Peeks into an NSEC rdata to see whether its first type-bitmap window
/// advertises SOA, which marks the set as coming from a zone apex.
/// Malformed rdata is reported by the regular size computation later on.
fn nsec_at_apex(pkt: &[u8], ttl_off: usize) -> bool {
    let mut cur = Cursor::new(pkt);
    if cur.set_position(ttl_off).is_err() || cur.remaining() < 7 {
        // ttl + len + root
        return false;
    }
    let _ = cur.skip(4);
    let rdatalen = match cur.read_u16() {
        Ok(v) => v as usize,
        Err(_) => return false,
    };
    if cur.remaining() < rdatalen {
        return false;
    }
    let rdata_end = cur.position() + rdatalen;
    // the next domain name field comes first and must be well-formed
    let name_end = match dname::pkt_dname_len(pkt, cur.position()) {
        Ok(info) => info.end_offset,
        Err(_) => return false,
    };
    if name_end < rdata_end {
        // need window number, bitmap length, first bitmap byte
        if name_end + 3 > rdata_end {
            return false;
        }
        let (win, blen, bits) = (pkt[name_end], pkt[name_end + 1], pkt[name_end + 2]);
        // window 0 always comes first; 0x02 in the first byte is SOA
        if win == 0 && blen >= 1 && bits & 0x02 != 0 {
            return true;
        }
    }
    false
}

/// Hash of a set identity: type, class, flags and the lowercased owner name.
/// Independent of how the owner name was compressed.
pub(crate) fn pkt_hash_rrset(
    pkt: &[u8],
    dname: usize,
    rrtype: u16,
    rrclass: u16,
    rrset_flags: u32,
) -> u32 {
    let mut h = 0xab;
    h = dname::hash_u16(h, rrtype);
    h = dname::hash_u16(h, rrclass);
    h = dname::hash_u32(h, rrset_flags);
    dname::dname_pkt_hash(pkt, dname, h)
}

/// The type a RRSIG whose `TTL|RDLEN|RDATA` starts at `ttl_off` covers,
/// if the record is large enough to hold one.
fn pkt_rrsig_covered(pkt: &[u8], ttl_off: usize) -> Option<u16> {
    // ttl + rdlen + smallest possible rrsig (root signer, no signature)
    if pkt.len().saturating_sub(ttl_off) < 4 + 2 + 19 {
        return None;
    }
    if BigEndian::read_u16(&pkt[ttl_off + 4..]) < 19 {
        return None;
    }
    Some(BigEndian::read_u16(&pkt[ttl_off + 6..]))
}

fn pkt_rrsig_covered_equals(pkt: &[u8], ttl_off: usize, rrtype: u16) -> bool {
    pkt_rrsig_covered(pkt, ttl_off) == Some(rrtype)
}

/// Whether a RRSIG-typed set holds a signature over `rrtype`; also reports
/// whether it holds signatures over anything else.
fn rrset_has_sigover(
    pkt: &[u8],
    arena: &ParseArena,
    sigset: RrsetHandle,
    rrtype: u16,
) -> (bool, bool) {
    debug_assert_eq!(arena.rrsets[sigset].rrtype, u16::from(Type::RRSIG));
    let (mut res, mut hasother) = (false, false);
    let mut cur = arena.rrsets[sigset].rr_first;
    while let Some(h) = cur {
        if pkt_rrsig_covered_equals(pkt, arena.rrs[h].ttl_data, rrtype) {
            res = true;
        } else {
            hasother = true;
        }
        cur = arena.rrs[h].next;
    }
    (res, hasother)
}

/// Moves (or, for qtype RRSIG/ANY, copies) the signatures covering
/// `dataset`'s type from a RRSIG-typed set onto the data set.
fn moveover_rrsigs(
    pkt: &[u8],
    arena: &mut ParseArena,
    sigset: RrsetHandle,
    dataset: RrsetHandle,
    duplicate: bool,
) {
    let datatype = arena.rrsets[dataset].rrtype;
    let mut cur = arena.rrsets[sigset].rr_first;
    let mut prev: Option<RrHandle> = None;
    while let Some(sig) = cur {
        let next = arena.rrs[sig].next;
        if pkt_rrsig_covered_equals(pkt, arena.rrs[sig].ttl_data, datatype) {
            let insert = if duplicate {
                // keep it visible under the RRSIG set as well
                let (ttl_data, size) = (arena.rrs[sig].ttl_data, arena.rrs[sig].size);
                arena.rrs.alloc(RrParse {
                    ttl_data,
                    size,
                    next: None,
                })
            } else {
                // remove from the signature set
                match prev {
                    Some(p) => arena.rrs[p].next = next,
                    None => arena.rrsets[sigset].rr_first = next,
                }
                if arena.rrsets[sigset].rr_last == Some(sig) {
                    arena.rrsets[sigset].rr_last = prev;
                }
                arena.rrsets[sigset].rr_count -= 1;
                let size = arena.rrs[sig].size;
                arena.rrsets[sigset].size -= size;
                arena.rrs[sig].next = None;
                sig
            };
            let size = arena.rrs[insert].size;
            match arena.rrsets[dataset].rrsig_last {
                Some(last) => arena.rrs[last].next = Some(insert),
                None => arena.rrsets[dataset].rrsig_first = Some(insert),
            }
            arena.rrsets[dataset].rrsig_last = Some(insert);
            arena.rrsets[dataset].rrsig_count += 1;
            arena.rrsets[dataset].size += size;
            if duplicate {
                prev = Some(sig);
            }
        } else {
            prev = Some(sig);
        }
        cur = next;
    }
}

/// Repurposes a RRSIG-typed set once a data RR of a covered type shows up.
/// With signatures over other types present, a fresh set is split off;
/// otherwise the set changes identity in place.
fn change_rrsig_rrset(
    pkt: &[u8],
    msg: &mut MsgParse,
    arena: &mut ParseArena,
    sigset: RrsetHandle,
    datatype: u16,
    rrset_flags: u32,
    hasother: bool,
    section: Section,
) -> RrsetHandle {
    debug_assert_eq!(arena.rrsets[sigset].rrtype, u16::from(Type::RRSIG));
    debug_assert_ne!(datatype, u16::from(Type::RRSIG));
    let (dname, dname_len, rrclass) = {
        let s = &arena.rrsets[sigset];
        (s.dname, s.dname_len, s.rrclass)
    };
    let hash = pkt_hash_rrset(pkt, dname, datatype, rrclass, rrset_flags);
    if hasother {
        // a new set holds the data type; covered signatures follow it
        let dataset = msg.new_rrset(
            arena, dname, dname_len, datatype, rrclass, hash, rrset_flags, section,
        );
        msg.section_count_inc(section);
        let duplicate = msg.qtype == u16::from(Type::RRSIG) || msg.qtype == u16::from(Type::ANY);
        moveover_rrsigs(pkt, arena, sigset, dataset, duplicate);
        return dataset;
    }
    // change the identity of the set in place
    msg.bucket_remove(arena, sigset);
    arena.rrsets[sigset].hash = hash;
    msg.bucket_prepend(arena, sigset);
    // use the section of the data item for the result
    msg.change_section(arena, sigset, section);
    let set = &mut arena.rrsets[sigset];
    set.rrtype = datatype;
    set.flags = rrset_flags;
    set.rrsig_count += set.rr_count;
    set.rr_count = 0;
    // former members become signatures, appended after any existing ones
    let (rr_first, rr_last) = (set.rr_first.take(), set.rr_last.take());
    if rr_first.is_some() {
        let old_last = set.rrsig_last;
        set.rrsig_last = rr_last;
        if set.rrsig_first.is_none() {
            set.rrsig_first = rr_first;
        }
        if let Some(last) = old_last {
            arena.rrs[last].next = rr_first;
        }
    }
    sigset
}

/// Finds the set the current RR belongs to, creating one if needed.
/// Fast when the RR repeats the previous owner and type; otherwise hashes
/// and looks the identity up, handling the cases where a RRSIG arrives
/// before or after the data it covers.
#[allow(clippy::too_many_arguments)]
fn find_rrset(
    pkt: &[u8],
    msg: &mut MsgParse,
    arena: &mut ParseArena,
    dname: usize,
    dname_len: usize,
    rrtype: u16,
    rrclass: u16,
    ttl_off: usize,
    section: Section,
    prev: &mut Option<PrevRr>,
) -> RrsetHandle {
    if let Some(p) = prev.as_mut() {
        // check if equal to the previous item; NSEC is kept out of the fast
        // path because its apex flag can differ between otherwise equal RRs
        if rrtype == p.rrtype
            && rrclass == p.rrclass
            && dname_len == p.dname_len
            && rrtype != u16::from(Type::NSEC)
            && dname::smart_compare(pkt, dname, p.dname_first, p.dname_last) == Ordering::Equal
        {
            p.dname_last = dname;
            return p.rrset;
        }
        // check if a rrsig covers the previous item
        if rrtype == u16::from(Type::RRSIG)
            && rrclass == p.rrclass
            && pkt_rrsig_covered_equals(pkt, ttl_off, p.rrtype)
            && dname::smart_compare(pkt, dname, p.dname_first, p.dname_last) == Ordering::Equal
        {
            p.dname_last = dname;
            return p.rrset;
        }
    }
    let mut rrset_flags = pkt_rrset_flags(msg, pkt, ttl_off, rrtype);

    // a rrsig may belong to a data set that was seen earlier
    if rrtype == u16::from(Type::RRSIG) {
        if let Some(covtype) = pkt_rrsig_covered(pkt, ttl_off) {
            let mut hash = pkt_hash_rrset(pkt, dname, covtype, rrclass, rrset_flags);
            let mut found =
                msg.hashtable_lookup(arena, pkt, hash, rrset_flags, dname, dname_len, covtype, rrclass);
            if found.is_none() && covtype == u16::from(Type::NSEC) {
                // the apex-ness of the data set may differ; retry with the bit toggled
                rrset_flags ^= RRSET_NSEC_AT_APEX;
                hash = pkt_hash_rrset(pkt, dname, covtype, rrclass, rrset_flags);
                found = msg.hashtable_lookup(
                    arena, pkt, hash, rrset_flags, dname, dname_len, covtype, rrclass,
                );
            }
            if let Some(f) = found {
                *prev = Some(PrevRr {
                    dname_first: arena.rrsets[f].dname,
                    dname_last: dname,
                    dname_len,
                    rrtype: covtype,
                    rrclass,
                    rrset: f,
                });
                return f;
            }
        }
    }
    // a data RR may match a RRSIG set that was seen earlier
    if rrtype != u16::from(Type::RRSIG) {
        let hash = pkt_hash_rrset(pkt, dname, Type::RRSIG.into(), rrclass, rrset_flags);
        if let Some(sigset) = msg.hashtable_lookup(
            arena,
            pkt,
            hash,
            rrset_flags,
            dname,
            dname_len,
            Type::RRSIG.into(),
            rrclass,
        ) {
            let (has, hasother) = rrset_has_sigover(pkt, arena, sigset, rrtype);
            if has {
                let dataset = change_rrsig_rrset(
                    pkt, msg, arena, sigset, rrtype, rrset_flags, hasother, section,
                );
                *prev = Some(PrevRr {
                    dname_first: arena.rrsets[dataset].dname,
                    dname_last: dname,
                    dname_len,
                    rrtype,
                    rrclass,
                    rrset: dataset,
                });
                return dataset;
            }
        }
    }

    let hash = pkt_hash_rrset(pkt, dname, rrtype, rrclass, rrset_flags);
    let found =
        msg.hashtable_lookup(arena, pkt, hash, rrset_flags, dname, dname_len, rrtype, rrclass);
    let (rrset, dname_first) = match found {
        Some(f) => (f, arena.rrsets[f].dname),
        None => {
            msg.section_count_inc(section);
            let h = msg.new_rrset(
                arena, dname, dname_len, rrtype, rrclass, hash, rrset_flags, section,
            );
            (h, dname)
        }
    };
    *prev = Some(PrevRr {
        dname_first,
        dname_last: dname,
        dname_len,
        rrtype,
        rrclass,
        rrset,
    });
    rrset
}

/// Skips the TTL, rdata length and rdata of the RR under the cursor.
fn skip_ttl_rdata(cursor: &mut Cursor<'_>) -> Result<()> {
    cursor.skip(4)?;
    let rdatalen = cursor.read_u16()? as usize;
    cursor.skip(rdatalen)
}

/// Byte-for-byte duplicate check of a candidate RRSIG against the
/// signatures already attached to the set.
fn sig_is_double(pkt: &[u8], arena: &ParseArena, rrset: RrsetHandle, ttl_data: usize) -> bool {
    if pkt.len().saturating_sub(ttl_data) < 6 {
        return false;
    }
    let rlen = BigEndian::read_u16(&pkt[ttl_data + 4..]) as usize;
    if pkt.len() - (ttl_data + 6) < rlen {
        return false;
    }
    let mut cur = arena.rrsets[rrset].rrsig_first;
    while let Some(h) = cur {
        let sig_ttl_data = arena.rrs[h].ttl_data;
        // compare the rdata as it sits in the packet; rrsigs are not allowed
        // to use compression, so identical bytes mean an identical record
        let siglen = BigEndian::read_u16(&pkt[sig_ttl_data + 4..]) as usize;
        if siglen == rlen
            && rlen > 0
            && pkt[sig_ttl_data + 6..sig_ttl_data + 6 + rlen] == pkt[ttl_data + 6..ttl_data + 6 + rlen]
        {
            return true;
        }
        cur = arena.rrs[h].next;
    }
    false
}

/// Computes how many bytes the RR under the cursor will need once its rdata
/// is fully expanded, walking the rdata field descriptor for the type.
/// Leaves the cursor right after the rdata.
fn calc_size(pkt: &[u8], cursor: &mut Cursor<'_>, rrtype: u16, rr: RrHandle, arena: &mut ParseArena) -> Result<()> {
    let mut size = 2; // the rdata length
    cursor.skip(4)?; // ttl
    let mut pkt_len = cursor.read_u16()? as usize;
    cursor.ensure_remaining(pkt_len)?;
    let desc = rr_descriptor(rrtype);
    if pkt_len > 0 && !desc.is_empty() {
        for &rdf in desc {
            if pkt_len == 0 {
                break;
            }
            let len = match rdf {
                Rdf::Dname => {
                    // every embedded domain name gets decompressed
                    let oldpos = cursor.position();
                    let info = dname::pkt_dname_len(pkt, oldpos)?;
                    let consumed = info.end_offset - oldpos;
                    if consumed > pkt_len {
                        return Err(MsgError::InvalidPacket("Name exceeds rdata"));
                    }
                    pkt_len -= consumed;
                    size += info.expanded_len;
                    cursor.set_position(info.end_offset)?;
                    0
                }
                Rdf::Str => {
                    if pkt_len < 1 {
                        return Err(MsgError::InvalidPacket("String exceeds rdata"));
                    }
                    cursor.peek_at(0)? as usize + 1
                }
                Rdf::Fixed(n) => n,
            };
            if len > 0 {
                if pkt_len < len {
                    return Err(MsgError::InvalidPacket("Field exceeds rdata"));
                }
                pkt_len -= len;
                cursor.skip(len)?;
                size += len;
            }
        }
    }
    // whatever rdata remains is opaque and kept as-is
    size += pkt_len;
    cursor.skip(pkt_len)?;
    arena.rrs[rr].size = size;
    Ok(())
}

/// Appends the RR under the cursor to `rrset` and skips past its rdata.
/// An RR that would merge into a set of a different section is dropped:
/// trust in record data depends on the section it arrived in, and the less
/// trustworthy part must not taint the existing set.
fn add_rr_to_rrset(
    pkt: &[u8],
    cursor: &mut Cursor<'_>,
    msg: &mut MsgParse,
    arena: &mut ParseArena,
    rrset: RrsetHandle,
    section: Section,
    rrtype: u16,
) -> Result<()> {
    let (set_section, set_type) = {
        let s = &arena.rrsets[rrset];
        (s.section, s.rrtype)
    };
    if set_section != section
        && rrtype != u16::from(Type::RRSIG)
        && set_type != u16::from(Type::RRSIG)
    {
        warn!("packet carries rrset data in multiple sections, dropped the later part");
        return skip_ttl_rdata(cursor);
    }
    if (msg.qtype == u16::from(Type::RRSIG) || msg.qtype == u16::from(Type::ANY))
        && rrtype == u16::from(Type::RRSIG)
        && sig_is_double(pkt, arena, rrset, cursor.position())
    {
        debug!("duplicate rrsig skipped");
        return skip_ttl_rdata(cursor);
    }

    let rr = arena.rrs.alloc(RrParse {
        ttl_data: cursor.position(),
        size: 0,
        next: None,
    });
    if rrtype == u16::from(Type::RRSIG) && set_type != u16::from(Type::RRSIG) {
        match arena.rrsets[rrset].rrsig_last {
            Some(last) => arena.rrs[last].next = Some(rr),
            None => arena.rrsets[rrset].rrsig_first = Some(rr),
        }
        arena.rrsets[rrset].rrsig_last = Some(rr);
        arena.rrsets[rrset].rrsig_count += 1;
    } else {
        match arena.rrsets[rrset].rr_last {
            Some(last) => arena.rrs[last].next = Some(rr),
            None => arena.rrsets[rrset].rr_first = Some(rr),
        }
        arena.rrsets[rrset].rr_last = Some(rr);
        arena.rrsets[rrset].rr_count += 1;
    }

    calc_size(pkt, cursor, rrtype, rr, arena)?;
    let size = arena.rrs[rr].size;
    arena.rrsets[rrset].size += size;
    Ok(())
}

/// Parses the question section, if there is one.
fn parse_query_section(pkt: &[u8], cursor: &mut Cursor<'_>, msg: &mut MsgParse) -> Result<()> {
    if msg.qdcount == 0 {
        return Ok(());
    }
    debug_assert_eq!(msg.qdcount, 1);
    let qname = cursor.position();
    let info = dname::pkt_dname_len(pkt, qname)?;
    cursor.set_position(info.end_offset)?;
    msg.qname = Some(qname);
    msg.qname_len = info.expanded_len;
    msg.qtype = cursor.read_u16()?;
    msg.qclass = cursor.read_u16()?;
    Ok(())
}

/// Parses one of the answer, authority and additional sections,
/// grouping RRs into sets as it goes.
fn parse_section(
    pkt: &[u8],
    cursor: &mut Cursor<'_>,
    msg: &mut MsgParse,
    arena: &mut ParseArena,
    section: Section,
    num_rrs: u16,
) -> Result<()> {
    if num_rrs == 0 {
        return Ok(());
    }
    let mut prev: Option<PrevRr> = None;
    for _ in 0..num_rrs {
        let dname = cursor.position();
        let info = dname::pkt_dname_len(pkt, dname)?;
        cursor.set_position(info.end_offset)?;
        cursor.ensure_remaining(DNS_RR_HEADER_SIZE)?; // type, class, ttl, rdlen
        let rrtype = cursor.read_u16()?;
        let rrclass = cursor.read_u16()?;
        let ttl_off = cursor.position();
        let rrset = find_rrset(
            pkt,
            msg,
            arena,
            dname,
            info.expanded_len,
            rrtype,
            rrclass,
            ttl_off,
            section,
            &mut prev,
        );
        add_rr_to_rrset(pkt, cursor, msg, arena, rrset, section, rrtype)?;
    }
    Ok(())
}

/// Parses and groups all records of an untrusted DNS packet into `msg`.
/// The packet is borrowed read-only; everything built lives in `arena`
/// and holds offsets into the packet, nothing else.
pub fn parse_packet(pkt: &[u8], msg: &mut MsgParse, arena: &mut ParseArena) -> Result<()> {
    let mut cursor = Cursor::new(pkt);
    cursor.ensure_remaining(DNS_HEADER_SIZE)?;
    msg.id = cursor.read_u16()?;
    msg.flags = cursor.read_u16()?;
    msg.qdcount = cursor.read_u16()?;
    msg.ancount = cursor.read_u16()?;
    msg.nscount = cursor.read_u16()?;
    msg.arcount = cursor.read_u16()?;
    if msg.qdcount > 1 {
        return Err(MsgError::InvalidPacket(
            "A DNS packet cannot contain more than one question",
        ));
    }
    let (ancount, nscount, arcount) = (msg.ancount, msg.nscount, msg.arcount);
    parse_query_section(pkt, &mut cursor, msg)?;
    parse_section(pkt, &mut cursor, msg, arena, Section::Answer, ancount)?;
    parse_section(pkt, &mut cursor, msg, arena, Section::Authority, nscount)?;
    parse_section(pkt, &mut cursor, msg, arena, Section::Additional, arcount)?;
    // spurious trailing bytes are ignored
    msg.rrset_count = msg.an_rrsets + msg.ns_rrsets + msg.ar_rrsets;
    Ok(())
}
