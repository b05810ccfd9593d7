use std::borrow::Cow;

use crate::compress::CompressTree;
use crate::constants::*;
use crate::dname::dname_count_labels;
use crate::reply::{QueryInfo, ReplyInfo, RrsetEntry, RrsetKey};

/// One slice of the scatter-gather output: record data borrowed straight
/// from the owned reply, or a small header baked for this packet.
pub type Segment<'a> = Cow<'a, [u8]>;

/// Emits the owner name of a set, compressed against names written earlier
/// when possible, and remembers it for later names to compress against.
/// For data RRs the 4 type and class bytes ride along with the name.
fn bake_owner_name<'a>(
    key: &'a RrsetKey,
    with_tc: bool,
    tree: &mut CompressTree<'a>,
    offset: &mut usize,
) -> Segment<'a> {
    let name = key.dname();
    let labs = dname_count_labels(name);
    let atset = *offset;
    let hit = tree.lookup(name, labs);
    let seg: Segment<'a> = match hit {
        Some(node) => {
            // copy the labels above the match, then point at the rest
            let labcopy = labs - tree.labs(node);
            let mut dat = Vec::with_capacity(key.dname_len + 4);
            let mut from = name;
            for _ in 0..labcopy {
                let lablen = from[0] as usize;
                dat.extend_from_slice(&from[..1 + lablen]);
                from = &from[1 + lablen..];
            }
            let ptr = 0xc000_u16 | tree.offset(node) as u16;
            dat.extend_from_slice(&ptr.to_be_bytes());
            if with_tc {
                dat.extend_from_slice(&key.dname_tc[key.dname_len..]);
            }
            Cow::Owned(dat)
        }
        None => {
            if with_tc {
                Cow::Borrowed(&key.dname_tc[..])
            } else {
                Cow::Borrowed(key.dname())
            }
        }
    };
    *offset += seg.len();
    tree.store(name, labs, atset, hit);
    seg
}

/// Appends the RRs (and/or signatures) of one set to the vector.
/// Returns how many records were written, or `None` when `max` slots
/// would not fit them.
#[allow(clippy::too_many_arguments)]
fn emit_rrset<'a>(
    entry: &'a RrsetEntry,
    do_data: bool,
    do_sig: bool,
    iov: &mut Vec<Segment<'a>>,
    max: usize,
    offset: &mut usize,
    tree: &mut CompressTree<'a>,
    now: u32,
) -> Option<u16> {
    let key = &entry.key;
    let data = &entry.data;
    let mut added = 0u16;
    if do_data {
        for i in 0..data.count {
            if max - iov.len() < 3 {
                return None;
            }
            let name = bake_owner_name(key, true, tree, offset);
            iov.push(name);
            let ttl = data.rr_ttl[i].saturating_sub(now);
            iov.push(Cow::Owned(ttl.to_be_bytes().to_vec()));
            *offset += 4;
            let block = data.rr(i);
            *offset += block.len();
            iov.push(Cow::Borrowed(block));
            added += 1;
        }
    }
    if do_sig {
        for i in data.count..data.total() {
            if max - iov.len() < 3 {
                return None;
            }
            let name = bake_owner_name(key, false, tree, offset);
            iov.push(name);
            // type, class and ttl of the signature record
            let mut hdr = Vec::with_capacity(8);
            hdr.extend_from_slice(&u16::from(Type::RRSIG).to_be_bytes());
            hdr.extend_from_slice(&key.rrclass().to_be_bytes());
            hdr.extend_from_slice(&data.rr_ttl[i].saturating_sub(now).to_be_bytes());
            iov.push(Cow::Owned(hdr));
            *offset += 8;
            let block = data.rr(i);
            *offset += block.len();
            iov.push(Cow::Borrowed(block));
            added += 1;
        }
    }
    Some(added)
}

/// Emits one message section. The additional section historically gets all
/// plain records before any signatures, so OPT-like bookkeeping RRs come
/// first; the other sections interleave each set's data with its signatures.
#[allow(clippy::too_many_arguments)]
fn insert_section<'a>(
    sets: &'a [RrsetEntry],
    addit: bool,
    iov: &mut Vec<Segment<'a>>,
    max: usize,
    offset: &mut usize,
    tree: &mut CompressTree<'a>,
    now: u32,
) -> Option<u16> {
    let mut num_rrs = 0;
    if !addit {
        for entry in sets {
            num_rrs += emit_rrset(entry, true, true, iov, max, offset, tree, now)?;
        }
    } else {
        for entry in sets {
            num_rrs += emit_rrset(entry, true, false, iov, max, offset, tree, now)?;
        }
        for entry in sets {
            num_rrs += emit_rrset(entry, false, true, iov, max, offset, tree, now)?;
        }
    }
    Some(num_rrs)
}

/// Rebuilds a wire packet from an owned reply as a scatter-gather vector of
/// at most `max` segments, rediscovering name compression as it goes.
/// TTLs are rebased to `now`. Returns the number of segments used, or 0 if
/// they did not fit.
pub fn reply_info_serialize<'a>(
    qinfo: &'a QueryInfo,
    rep: &'a ReplyInfo,
    id: u16,
    flags: u16,
    iov: &mut Vec<Segment<'a>>,
    max: usize,
    now: u32,
) -> usize {
    iov.clear();
    if max < 1 {
        return 0;
    }
    debug_assert!(flags & DNS_FLAG_QR != 0, "replies carry the QR bit");
    let mut tree = CompressTree::new();
    let mut offset = DNS_HEADER_SIZE;
    // the header is written last, once the section counts are known
    iov.push(Cow::Owned(Vec::new()));

    if rep.qdcount > 0 {
        let qname = match &qinfo.qname {
            Some(n) => n.as_slice(),
            None => return 0,
        };
        if max - iov.len() < 2 {
            return 0;
        }
        iov.push(Cow::Borrowed(qname));
        tree.store(qname, dname_count_labels(qname), offset, None);
        offset += qname.len();
        let mut qt = Vec::with_capacity(4);
        qt.extend_from_slice(&qinfo.qtype.to_be_bytes());
        qt.extend_from_slice(&qinfo.qclass.to_be_bytes());
        iov.push(Cow::Owned(qt));
        offset += 4;
    }

    let an_end = rep.an_numrrsets;
    let ns_end = an_end + rep.ns_numrrsets;
    debug_assert_eq!(ns_end + rep.ar_numrrsets, rep.rrsets.len());
    let an = match insert_section(&rep.rrsets[..an_end], false, iov, max, &mut offset, &mut tree, now)
    {
        Some(n) => n,
        None => return 0,
    };
    let ns = match insert_section(
        &rep.rrsets[an_end..ns_end],
        false,
        iov,
        max,
        &mut offset,
        &mut tree,
        now,
    ) {
        Some(n) => n,
        None => return 0,
    };
    let ar = match insert_section(
        &rep.rrsets[ns_end..],
        true,
        iov,
        max,
        &mut offset,
        &mut tree,
        now,
    ) {
        Some(n) => n,
        None => return 0,
    };

    let mut hdr = Vec::with_capacity(DNS_HEADER_SIZE);
    hdr.extend_from_slice(&id.to_be_bytes());
    hdr.extend_from_slice(&flags.to_be_bytes());
    hdr.extend_from_slice(&rep.qdcount.to_be_bytes());
    hdr.extend_from_slice(&an.to_be_bytes());
    hdr.extend_from_slice(&ns.to_be_bytes());
    hdr.extend_from_slice(&ar.to_be_bytes());
    iov[0] = Cow::Owned(hdr);
    iov.len()
}

/// Flattens a scatter-gather vector into one contiguous packet.
pub fn segments_to_bytes(iov: &[Segment<'_>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(iov.iter().map(|s| s.len()).sum());
    for seg in iov {
        out.extend_from_slice(seg);
    }
    out
}
