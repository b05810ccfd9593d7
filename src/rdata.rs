use crate::constants::Type;

/// One rdata field kind, as far as the parser needs to understand it.
///
/// Only the fields up to and including the last embedded name of a type are
/// described; whatever follows is carried as an opaque blob.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Rdf {
    /// Fixed-width field of 1, 2, 4, 6 or 16 bytes.
    Fixed(usize),
    /// Length-prefixed character string.
    Str,
    /// Embedded, possibly compressed domain name.
    Dname,
}

impl Rdf {
    /// Fixed size of the field, or `None` for strings and names.
    #[inline]
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Rdf::Fixed(n) => Some(n),
            _ => None,
        }
    }
}

const NAME_ONLY: &[Rdf] = &[Rdf::Dname];
const TWO_NAMES: &[Rdf] = &[Rdf::Dname, Rdf::Dname];
const U16_NAME: &[Rdf] = &[Rdf::Fixed(2), Rdf::Dname];
const PX: &[Rdf] = &[Rdf::Fixed(2), Rdf::Dname, Rdf::Dname];
const SRV: &[Rdf] = &[Rdf::Fixed(2), Rdf::Fixed(2), Rdf::Fixed(2), Rdf::Dname];
const NAPTR: &[Rdf] = &[
    Rdf::Fixed(2),
    Rdf::Fixed(2),
    Rdf::Str,
    Rdf::Str,
    Rdf::Str,
    Rdf::Dname,
];
// type covered, algorithm, labels, original TTL, expiration, inception,
// key tag, then the signer name; the signature itself is opaque.
const RRSIG: &[Rdf] = &[
    Rdf::Fixed(2),
    Rdf::Fixed(1),
    Rdf::Fixed(1),
    Rdf::Fixed(4),
    Rdf::Fixed(4),
    Rdf::Fixed(4),
    Rdf::Fixed(2),
    Rdf::Dname,
];

/// Ordered rdata field kinds for a RR type. Types without embedded names
/// return an empty descriptor and are treated as opaque blobs.
pub fn rr_descriptor(rr_type: u16) -> &'static [Rdf] {
    match rr_type {
        x if x == Type::NS.into()
            || x == Type::MD.into()
            || x == Type::MF.into()
            || x == Type::CNAME.into()
            || x == Type::MB.into()
            || x == Type::MG.into()
            || x == Type::MR.into()
            || x == Type::PTR.into()
            || x == Type::DNAME.into()
            || x == Type::NXT.into()
            || x == Type::TKEY.into()
            || x == Type::TSIG.into() =>
        {
            NAME_ONLY
        }
        x if x == Type::SOA.into() || x == Type::MINFO.into() || x == Type::RP.into() => TWO_NAMES,
        x if x == Type::MX.into()
            || x == Type::AFSDB.into()
            || x == Type::RT.into()
            || x == Type::KX.into() =>
        {
            U16_NAME
        }
        x if x == Type::PX.into() => PX,
        x if x == Type::SRV.into() => SRV,
        x if x == Type::NAPTR.into() => NAPTR,
        x if x == Type::SIG.into() || x == Type::RRSIG.into() => RRSIG,
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_carry_names() {
        assert_eq!(rr_descriptor(Type::CNAME.into()), NAME_ONLY);
        assert_eq!(rr_descriptor(Type::SOA.into()).len(), 2);
        assert_eq!(rr_descriptor(Type::A.into()), &[] as &[Rdf]);
        let last = *rr_descriptor(Type::RRSIG.into()).last().unwrap();
        assert_eq!(last, Rdf::Dname);
    }
}
