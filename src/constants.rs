#![allow(dead_code)]

use std::convert::From;

/// Size of the main DNS header, that includes flags and the size of each section.
pub const DNS_HEADER_SIZE: usize = 12;

/// Offset to the first (and usually only) record of the question section, from the start of the packet.
pub const DNS_QUESTION_OFFSET: usize = DNS_HEADER_SIZE;

/// Maximum length of an expanded host name, including the root label.
pub const DNS_MAX_HOSTNAME_LEN: usize = 255;

/// Maximum number of indirections followed in a compressed name.
pub const DNS_MAX_HOSTNAME_INDIRECTIONS: usize = 255;

/// Size of the type, class, TTL and rdata length fields of a RR.
pub const DNS_RR_HEADER_SIZE: usize = 10;

/// Offset to the TTL, from the location right after the RR name.
pub const DNS_RR_TTL_OFFSET: usize = 4;

/// Offset to the rdata length, from the location right after the RR name.
pub const DNS_RR_RDLEN_OFFSET: usize = 8;

/// Offset to the transaction ID, from the beginning of a DNS packet.
pub const DNS_TID_OFFSET: usize = 0;

/// Offset to the flags (including rcode and opcode), from the beginning of the DNS packet.
pub const DNS_FLAGS_OFFSET: usize = 2;

// DNS header flags
pub const DNS_FLAG_QR: u16 = 1 << 15;
pub const DNS_FLAG_AA: u16 = 1 << 10;
pub const DNS_FLAG_TC: u16 = 1 << 9;
pub const DNS_FLAG_RD: u16 = 1 << 8;
pub const DNS_FLAG_RA: u16 = 1 << 7;
pub const DNS_FLAG_AD: u16 = 1 << 5;
pub const DNS_FLAG_CD: u16 = 1 << 4;

/// The DO bit of the extended EDNS flags.
pub const DNS_EDNS_FLAG_DO: u16 = 1 << 15;

/// Largest packet offset a compression pointer can encode.
pub const DNS_MAX_COMPRESS_OFFSET: usize = 0x3fff;

/// Number of buckets of the per-message RRset hash table. Must be a power of two.
pub const PARSE_TABLE_SIZE: usize = 32;

/// Upper bound for TTLs; the canonical TTL of a set starts here and only shrinks.
pub const MAX_TTL: u32 = 0x7fff_ffff;

/// Default maximum payload size when no OPT record is present.
pub const DNS_DEFAULT_UDP_SIZE: u16 = 512;

/// DNS query class
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Class {
    IN = 1,
    CH = 3,
    HS = 4,
    NONE = 254,
    ANY = 255,
}

impl From<Class> for u16 {
    fn from(v: Class) -> u16 {
        v as u16
    }
}

/// DNS query type
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Type {
    A = 1,
    NS = 2,
    MD = 3,
    MF = 4,
    CNAME = 5,
    SOA = 6,
    MB = 7,
    MG = 8,
    MR = 9,
    NULL = 10,
    WKS = 11,
    PTR = 12,
    HINFO = 13,
    MINFO = 14,
    MX = 15,
    TXT = 16,
    RP = 17,
    AFSDB = 18,
    X25 = 19,
    ISDN = 20,
    RT = 21,
    SIG = 24,
    KEY = 25,
    PX = 26,
    AAAA = 28,
    NXT = 30,
    SRV = 33,
    NAPTR = 35,
    KX = 36,
    CERT = 37,
    DNAME = 39,
    OPT = 41,
    DS = 43,
    SSHFP = 44,
    RRSIG = 46,      // RFC 4034
    NSEC = 47,       // RFC 4034
    DNSKEY = 48,     // RFC 4034
    NSEC3 = 50,      // RFC 5155
    NSEC3PARAM = 51, // RFC 5155
    TLSA = 52,       // RFC 6698
    SPF = 99,
    TKEY = 249, // RFC 2930
    TSIG = 250,
    IXFR = 251,
    AXFR = 252,
    ANY = 255,
    CAA = 257, // RFC 6844
}

impl From<Type> for u16 {
    fn from(v: Type) -> u16 {
        v as u16
    }
}

/// DNS return codes
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Rcode {
    NOERROR = 0,
    FORMERR = 1,
    SERVFAIL = 2,
    NXDOMAIN = 3,
    NOTIMPL = 4,
    REFUSED = 5,
}

impl From<Rcode> for u8 {
    fn from(v: Rcode) -> u8 {
        v as u8
    }
}

/// DNS packet section
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Section {
    Question,
    Answer,
    Authority,
    Additional,
}

impl From<Section> for u8 {
    fn from(v: Section) -> u8 {
        v as u8
    }
}
