//! DNS message model
//!
//! Constants and in-memory representation of the subset of RFC 1035 the
//! resolver speaks: one question, and A/NS/CNAME/AAAA resource records.
//! Names and record data are [`Str`] views into the resolver's arena.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::arena::Arena;
use crate::strings::Str;

/// DNS packet constants
pub const DNS_HEADER_SIZE: usize = 12;
pub const DNS_MAX_PACKET_SIZE: usize = 512;
pub const DNS_PORT: u16 = 53;
pub const MAX_LABEL_LEN: usize = 63;
pub const MAX_NAME_LEN: usize = 255;

/// Top two bits of a length octet marking a compression pointer
pub const POINTER_MASK: u8 = 0xC0;

/// Internet class
pub const CLASS_IN: u16 = 1;

/// DNS flags
pub const FLAG_QR: u16 = 0x8000; // Query/Response
pub const FLAG_AA: u16 = 0x0400; // Authoritative Answer
pub const FLAG_TC: u16 = 0x0200; // Truncated
pub const FLAG_RD: u16 = 0x0100; // Recursion Desired
pub const FLAG_RA: u16 = 0x0080; // Recursion Available
const OPCODE_MASK: u16 = 0x7800;
const Z_MASK: u16 = 0x0070;
const RCODE_MASK: u16 = 0x000F;

/// a.root-servers.net
pub const ROOT_SERVER_A_V4: Ipv4Addr = Ipv4Addr::new(198, 41, 0, 4);
pub const ROOT_SERVER_A_V6: Ipv6Addr = Ipv6Addr::new(0x2001, 0x503, 0xba3e, 0, 0, 0, 0x2, 0x30);

/// e.root-servers.net
pub const ROOT_SERVER_E_V4: Ipv4Addr = Ipv4Addr::new(192, 203, 230, 10);
pub const ROOT_SERVER_E_V6: Ipv6Addr = Ipv6Addr::new(0x2001, 0x500, 0xa8, 0, 0, 0, 0, 0xe);

/// DNS record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    AAAA,
    Other(u16),
}

impl RecordType {
    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::AAAA => 28,
            RecordType::Other(code) => code,
        }
    }

    /// Address record type matching the family of `addr`
    pub fn for_address(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::AAAA,
        }
    }
}

impl From<u16> for RecordType {
    fn from(code: u16) -> Self {
        match code {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            28 => RecordType::AAAA,
            other => RecordType::Other(other),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::Other(code) => write!(f, "TYPE{}", code),
        }
    }
}

/// Response code from the low four header bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rcode(pub u8);

impl Rcode {
    pub const NOERROR: Rcode = Rcode(0);
    pub const NXDOMAIN: Rcode = Rcode(3);

    pub fn name(&self) -> &'static str {
        match self.0 {
            0 => "NOERROR",
            1 => "FORMERR",
            2 => "SERVFAIL",
            3 => "NXDOMAIN",
            4 => "NOTIMP",
            5 => "REFUSED",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// Fixed 12-byte message header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    pub fn is_response(&self) -> bool {
        self.flags & FLAG_QR != 0
    }

    pub fn opcode(&self) -> u8 {
        ((self.flags & OPCODE_MASK) >> 11) as u8
    }

    pub fn authoritative(&self) -> bool {
        self.flags & FLAG_AA != 0
    }

    pub fn truncated(&self) -> bool {
        self.flags & FLAG_TC != 0
    }

    pub fn recursion_desired(&self) -> bool {
        self.flags & FLAG_RD != 0
    }

    pub fn recursion_available(&self) -> bool {
        self.flags & FLAG_RA != 0
    }

    pub fn z(&self) -> u8 {
        ((self.flags & Z_MASK) >> 4) as u8
    }

    pub fn rcode(&self) -> Rcode {
        Rcode((self.flags & RCODE_MASK) as u8)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Question {
    pub name: Str,
    pub qtype: RecordType,
    pub qclass: u16,
}

/// One parsed resource record
///
/// For A/AAAA the rdata is the textual address, for NS/CNAME the decoded
/// target name; `rdlength` is the length of that text.
#[derive(Debug, Clone, Copy)]
pub struct ResourceRecord {
    pub name: Str,
    pub rtype: RecordType,
    pub class: u16,
    pub ttl: i32,
    pub rdlength: u16,
    pub rdata: Str,
}

impl ResourceRecord {
    /// Address carried by an A/AAAA record
    pub fn address(&self, arena: &Arena) -> Option<IpAddr> {
        match self.rtype {
            RecordType::A | RecordType::AAAA => {
                std::str::from_utf8(self.rdata.as_bytes(arena)).ok()?.parse().ok()
            }
            _ => None,
        }
    }

    /// Detach from the arena
    pub fn to_record(&self, arena: &Arena) -> Record {
        Record {
            rtype: self.rtype,
            name: self.name.to_string_lossy(arena),
            class: self.class,
            ttl: self.ttl,
            data: self.rdata.to_string_lossy(arena),
        }
    }
}

/// Section records bucketed by type, in wire order.
/// Records of other types are never stored.
#[derive(Debug, Clone, Default)]
pub struct RecordList {
    pub a: Vec<ResourceRecord>,
    pub ns: Vec<ResourceRecord>,
    pub cname: Vec<ResourceRecord>,
    pub aaaa: Vec<ResourceRecord>,
}

impl RecordList {
    /// Store `rr` in its bucket. Returns false if the type has none.
    pub fn push(&mut self, rr: ResourceRecord) -> bool {
        match self.bucket_mut(rr.rtype) {
            Some(bucket) => {
                bucket.push(rr);
                true
            }
            None => false,
        }
    }

    fn bucket_mut(&mut self, rtype: RecordType) -> Option<&mut Vec<ResourceRecord>> {
        match rtype {
            RecordType::A => Some(&mut self.a),
            RecordType::NS => Some(&mut self.ns),
            RecordType::CNAME => Some(&mut self.cname),
            RecordType::AAAA => Some(&mut self.aaaa),
            RecordType::Other(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.a.len() + self.ns.len() + self.cname.len() + self.aaaa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_address(&self) -> bool {
        !self.a.is_empty() || !self.aaaa.is_empty()
    }

    /// CNAMEs first, then NS, A, AAAA
    pub fn iter(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.cname
            .iter()
            .chain(self.ns.iter())
            .chain(self.a.iter())
            .chain(self.aaaa.iter())
    }

    /// Append every record of `other`
    pub fn extend(&mut self, other: RecordList) {
        self.a.extend(other.a);
        self.ns.extend(other.ns);
        self.cname.extend(other.cname);
        self.aaaa.extend(other.aaaa);
    }
}

/// Query or reply
#[derive(Debug, Clone)]
pub struct Message {
    pub header: Header,
    pub question: Question,
    pub answer: RecordList,
    pub authority: RecordList,
    pub additional: RecordList,
}

pub type Query = Message;
pub type Reply = Message;

impl Message {
    /// Iterative (RD clear) query for `name`
    pub fn query(id: u16, name: Str, qtype: RecordType) -> Query {
        Message {
            header: Header {
                id,
                flags: 0,
                qdcount: 1,
                ..Header::default()
            },
            question: Question {
                name,
                qtype,
                qclass: CLASS_IN,
            },
            answer: RecordList::default(),
            authority: RecordList::default(),
            additional: RecordList::default(),
        }
    }
}

/// Resource record detached from the arena, handed to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub rtype: RecordType,
    pub name: String,
    pub class: u16,
    pub ttl: i32,
    pub data: String,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.rtype, self.name, self.data)
    }
}
