//! DNS wire codec
//!
//! Serializes queries and parses replies. Replies are parsed straight out of
//! the arena: the datagram is received into an arena span, labels are views
//! into it, and decoded names/addresses are allocated next to it.
//!
//! Every read is bounds-checked against the datagram span, so a hostile
//! reply can only ever produce a [`WireError`].

use std::net::{Ipv4Addr, SocketAddr};

use tracing::{debug, warn};

use crate::arena::{Arena, Span};
use crate::dns::transport::Transport;
use crate::dns::wire::{
    Header, Message, Question, RecordList, RecordType, Reply, ResourceRecord, CLASS_IN,
    DNS_HEADER_SIZE, DNS_MAX_PACKET_SIZE, MAX_LABEL_LEN, MAX_NAME_LEN, POINTER_MASK,
};
use crate::error::{ExchangeError, WireError};
use crate::strings::{Str, StrList};

/// Upper bound on pointers followed while decoding one name
pub const MAX_POINTER_HOPS: usize = 64;

/// Serialize `query` into wire format
pub fn format_query(arena: &Arena, query: &Message) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::with_capacity(DNS_MAX_PACKET_SIZE);

    // Header
    let header = &query.header;
    buf.extend_from_slice(&header.id.to_be_bytes());
    buf.extend_from_slice(&header.flags.to_be_bytes());
    buf.extend_from_slice(&header.qdcount.to_be_bytes());
    buf.extend_from_slice(&header.ancount.to_be_bytes());
    buf.extend_from_slice(&header.nscount.to_be_bytes());
    buf.extend_from_slice(&header.arcount.to_be_bytes());
    debug_assert_eq!(buf.len(), DNS_HEADER_SIZE);

    // Question: empty labels (leading/trailing dots) are dropped
    let labels = StrList::split(arena, query.question.name, b'.');
    let mut name_len = 1;
    for label in labels.iter().filter(|label| !label.is_empty()) {
        if label.len() > MAX_LABEL_LEN {
            return Err(WireError::LabelTooLong(label.len()));
        }
        name_len += 1 + label.len();
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes(arena));
    }
    if name_len > MAX_NAME_LEN {
        return Err(WireError::NameTooLong(name_len));
    }
    buf.push(0); // root label

    buf.extend_from_slice(&query.question.qtype.to_u16().to_be_bytes());
    buf.extend_from_slice(&query.question.qclass.to_be_bytes());

    if buf.len() > DNS_MAX_PACKET_SIZE {
        return Err(WireError::MessageTooLarge(buf.len()));
    }

    Ok(buf)
}

/// Send `query` to `server`
pub fn send_query<T: Transport>(
    transport: &mut T,
    arena: &Arena,
    query: &Message,
    server: SocketAddr,
) -> Result<(), ExchangeError> {
    let bytes = format_query(arena, query)?;
    transport.send(server, &bytes)?;
    Ok(())
}

fn truncated(offset: usize, needed: usize) -> WireError {
    WireError::Truncated { offset, needed }
}

/// `len` bytes of `packet` at `offset`, checked against its end
fn slice(packet: Span, offset: usize, len: usize) -> Result<Span, WireError> {
    packet.sub(offset, len).ok_or(truncated(offset, len))
}

fn read_u8(arena: &Arena, packet: Span, offset: usize) -> Result<u8, WireError> {
    let span = slice(packet, offset, 1)?;
    Ok(arena.bytes(span).first().copied().unwrap_or_default())
}

fn read_array<const N: usize>(arena: &Arena, packet: Span, offset: usize) -> Result<[u8; N], WireError> {
    let span = slice(packet, offset, N)?;
    arena.bytes(span).try_into().map_err(|_| truncated(offset, N))
}

fn read_u16(arena: &Arena, packet: Span, offset: usize) -> Result<u16, WireError> {
    Ok(u16::from_be_bytes(read_array(arena, packet, offset)?))
}

fn read_i32(arena: &Arena, packet: Span, offset: usize) -> Result<i32, WireError> {
    Ok(i32::from_be_bytes(read_array(arena, packet, offset)?))
}

/// Decode the (possibly compressed) name at `offset` into dotted text.
///
/// Returns the name and the number of bytes it occupies at `offset`; a
/// pointer counts as its two bytes no matter where it leads.
pub fn parse_domain(arena: &mut Arena, packet: Span, offset: usize) -> Result<(Str, usize), WireError> {
    parse_name(arena, packet, offset, 0)
}

fn parse_name(
    arena: &mut Arena,
    packet: Span,
    start: usize,
    hops: usize,
) -> Result<(Str, usize), WireError> {
    let mut labels = StrList::new();
    let mut offset = start;

    loop {
        let len = read_u8(arena, packet, offset)?;

        match len & POINTER_MASK {
            0 => {
                offset += 1;
                if len == 0 {
                    break;
                }
                let label = slice(packet, offset, len as usize)?;
                labels.push(Str::new(label));
                offset += len as usize;
            }
            POINTER_MASK => {
                let pointer = (read_u16(arena, packet, offset)? & 0x3FFF) as usize;
                offset += 2;

                if pointer >= packet.len() {
                    return Err(WireError::PointerOutOfBounds {
                        pointer,
                        len: packet.len(),
                    });
                }
                if hops >= MAX_POINTER_HOPS {
                    return Err(WireError::PointerLoop);
                }

                let (suffix, _) = parse_name(arena, packet, pointer, hops + 1)?;
                if !suffix.is_empty() {
                    labels.push(suffix);
                }
                // A pointer always ends the name
                break;
            }
            _ => return Err(WireError::ReservedLabelType(len)),
        }
    }

    let text_len = labels.total_len() + labels.len().saturating_sub(1);
    if text_len > MAX_NAME_LEN {
        return Err(WireError::NameTooLong(text_len));
    }

    let name = labels.join(arena, b'.')?;
    Ok((name, offset - start))
}

/// Dotted-quad text of an A record
fn format_ipv4(octets: [u8; 4]) -> String {
    Ipv4Addr::from(octets).to_string()
}

/// Eight colon-separated groups of four lowercase hex digits, uncompressed
fn format_ipv6(octets: [u8; 16]) -> String {
    octets.chunks(2).map(hex::encode).collect::<Vec<_>>().join(":")
}

fn address_rdata<const N: usize>(
    arena: &mut Arena,
    rdata: Span,
    rtype: RecordType,
    format: fn([u8; N]) -> String,
) -> Result<Str, WireError> {
    let octets: [u8; N] = arena
        .bytes(rdata)
        .try_into()
        .map_err(|_| WireError::BadRdataLength {
            rtype,
            expected: N as u16,
            actual: rdata.len() as u16,
        })?;
    Ok(Str::from_bytes(arena, format(octets).as_bytes())?)
}

/// Parse the record at `offset`, storing it in its bucket of `rrs`.
///
/// Returns the number of wire bytes the record occupies. Records of types
/// other than A/NS/CNAME/AAAA are skipped over and not stored.
pub fn parse_resource_record(
    arena: &mut Arena,
    packet: Span,
    offset: usize,
    rrs: &mut RecordList,
) -> Result<usize, WireError> {
    let mut pos = offset;

    let (name, consumed) = parse_domain(arena, packet, pos)?;
    pos += consumed;

    let rtype = RecordType::from(read_u16(arena, packet, pos)?);
    let class = read_u16(arena, packet, pos + 2)?;
    if class != CLASS_IN {
        return Err(WireError::UnexpectedClass(class));
    }
    let ttl = read_i32(arena, packet, pos + 4)?;
    let rdlength = read_u16(arena, packet, pos + 8)?;
    pos += 10;

    let rdata_span = slice(packet, pos, rdlength as usize)?;

    let rdata = match rtype {
        RecordType::A => {
            if rdlength != 4 {
                return Err(WireError::BadRdataLength {
                    rtype,
                    expected: 4,
                    actual: rdlength,
                });
            }
            address_rdata::<4>(arena, rdata_span, rtype, format_ipv4)?
        }
        RecordType::AAAA => {
            if rdlength != 16 {
                return Err(WireError::BadRdataLength {
                    rtype,
                    expected: 16,
                    actual: rdlength,
                });
            }
            address_rdata::<16>(arena, rdata_span, rtype, format_ipv6)?
        }
        RecordType::NS | RecordType::CNAME => {
            let (target, used) = parse_domain(arena, packet, pos)?;
            if used > rdlength as usize {
                return Err(WireError::RdataOverrun { declared: rdlength });
            }
            target
        }
        RecordType::Other(code) => {
            debug!("Skipping record of type {}", code);
            return Ok(pos + rdlength as usize - offset);
        }
    };
    pos += rdlength as usize;

    rrs.push(ResourceRecord {
        name,
        rtype,
        class,
        ttl,
        rdlength: rdata.len() as u16,
        rdata,
    });

    Ok(pos - offset)
}

fn parse_header(arena: &Arena, packet: Span) -> Result<Header, WireError> {
    if packet.len() < DNS_HEADER_SIZE {
        return Err(truncated(0, DNS_HEADER_SIZE));
    }
    Ok(Header {
        id: read_u16(arena, packet, 0)?,
        flags: read_u16(arena, packet, 2)?,
        qdcount: read_u16(arena, packet, 4)?,
        ancount: read_u16(arena, packet, 6)?,
        nscount: read_u16(arena, packet, 8)?,
        arcount: read_u16(arena, packet, 10)?,
    })
}

/// Parse a complete message held in `packet`
pub fn parse_reply(arena: &mut Arena, packet: Span) -> Result<Reply, WireError> {
    let header = parse_header(arena, packet)?;
    let mut pos = DNS_HEADER_SIZE;

    if header.qdcount != 1 {
        return Err(WireError::QuestionCount(header.qdcount));
    }

    let (name, consumed) = parse_domain(arena, packet, pos)?;
    pos += consumed;
    let question = Question {
        name,
        qtype: RecordType::from(read_u16(arena, packet, pos)?),
        qclass: read_u16(arena, packet, pos + 2)?,
    };
    pos += 4;

    let mut answer = RecordList::default();
    for _ in 0..header.ancount {
        pos += parse_resource_record(arena, packet, pos, &mut answer)?;
    }

    let mut authority = RecordList::default();
    for _ in 0..header.nscount {
        pos += parse_resource_record(arena, packet, pos, &mut authority)?;
    }

    let mut additional = RecordList::default();
    for _ in 0..header.arcount {
        pos += parse_resource_record(arena, packet, pos, &mut additional)?;
    }

    if pos < packet.len() {
        debug!("Ignoring {} trailing bytes after last record", packet.len() - pos);
    }

    Ok(Reply {
        header,
        question,
        answer,
        authority,
        additional,
    })
}

/// Receive the pending reply from `server` into an arena buffer of exactly
/// the datagram's size, then parse it.
pub fn recv_reply<T: Transport>(
    transport: &mut T,
    arena: &mut Arena,
    server: SocketAddr,
) -> Result<Reply, ExchangeError> {
    let len = transport.peek_len(server)?;
    let packet = arena.alloc(len).map_err(WireError::from)?;

    let received = transport.recv(server, arena.bytes_mut(packet))?;
    if received != len {
        warn!("Datagram from {} shrank from {} to {} bytes", server, len, received);
    }
    let packet = packet.sub(0, received.min(len)).unwrap_or(packet);

    debug!("Received {} byte reply from {}", packet.len(), server);
    Ok(parse_reply(arena, packet)?)
}
