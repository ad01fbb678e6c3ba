// Scripted transports
// `QueueTransport` hands out canned datagrams in order; `MockNetwork` plays a
// set of authoritative servers, answering each query from a script keyed by
// server address and query name.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};

use crate::arena::Arena;
use crate::dns::codec;
use crate::dns::transport::Transport;
use crate::dns::wire::{RecordType, FLAG_AA, FLAG_QR};
use crate::error::TransportError;
use crate::tests::wire::{ReplyBuilder, TestRecord};

/// Replays queued datagrams; an empty queue behaves like a timeout
#[derive(Debug, Default)]
pub struct QueueTransport {
    replies: VecDeque<Vec<u8>>,
    pub sent: Vec<(SocketAddr, Vec<u8>)>,
    /// Size of every buffer handed to `recv`
    pub recv_buffer_lens: Vec<usize>,
}

impl QueueTransport {
    pub fn new(replies: Vec<Vec<u8>>) -> Self {
        Self {
            replies: replies.into(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, reply: Vec<u8>) {
        self.replies.push_back(reply);
    }
}

impl Transport for QueueTransport {
    fn send(&mut self, server: SocketAddr, datagram: &[u8]) -> Result<(), TransportError> {
        self.sent.push((server, datagram.to_vec()));
        Ok(())
    }

    fn peek_len(&mut self, server: SocketAddr) -> Result<usize, TransportError> {
        self.replies
            .front()
            .map(Vec::len)
            .ok_or(TransportError::Timeout { server })
    }

    fn recv(&mut self, server: SocketAddr, buf: &mut [u8]) -> Result<usize, TransportError> {
        let reply = self
            .replies
            .pop_front()
            .ok_or(TransportError::Timeout { server })?;
        self.recv_buffer_lens.push(buf.len());

        let len = reply.len().min(buf.len());
        buf[..len].copy_from_slice(&reply[..len]);
        Ok(len)
    }
}

/// How a scripted server answers one name
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub flags: u16,
    pub answers: Vec<TestRecord>,
    pub authority: Vec<TestRecord>,
    pub additional: Vec<TestRecord>,
    /// Added to the query id when echoing it back
    pub id_offset: u16,
}

impl ScriptedReply {
    /// Authoritative answer
    pub fn answer(answers: Vec<TestRecord>) -> Self {
        Self {
            flags: FLAG_QR | FLAG_AA,
            answers,
            authority: Vec::new(),
            additional: Vec::new(),
            id_offset: 0,
        }
    }

    /// Delegation with optional glue
    pub fn referral(authority: Vec<TestRecord>, additional: Vec<TestRecord>) -> Self {
        Self {
            flags: FLAG_QR,
            answers: Vec::new(),
            authority,
            additional,
            id_offset: 0,
        }
    }

    /// Error reply carrying `rcode`
    pub fn rcode(rcode: u8) -> Self {
        Self {
            flags: FLAG_QR | FLAG_AA | rcode as u16,
            ..Self::empty()
        }
    }

    /// Non-authoritative reply with no records at all
    pub fn empty() -> Self {
        Self::referral(Vec::new(), Vec::new())
    }

    pub fn with_id_offset(mut self, offset: u16) -> Self {
        self.id_offset = offset;
        self
    }
}

/// Scripted set of servers. Unscripted queries go unanswered.
#[derive(Debug, Default)]
pub struct MockNetwork {
    scripts: HashMap<(IpAddr, String), ScriptedReply>,
    inbox: QueueTransport,
    /// Every query received: server, name and type
    pub queries: Vec<(IpAddr, String, RecordType)>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer queries for `name` sent to `server` with `reply`
    pub fn script(&mut self, server: &str, name: &str, reply: ScriptedReply) -> &mut Self {
        let server: IpAddr = server.parse().expect("scripted server address");
        self.scripts
            .insert((server, name.to_ascii_lowercase()), reply);
        self
    }

    /// Names queried, in order
    pub fn queried_names(&self) -> Vec<String> {
        self.queries.iter().map(|(_, name, _)| name.clone()).collect()
    }

    /// Servers queried, in order
    pub fn queried_servers(&self) -> Vec<IpAddr> {
        self.queries.iter().map(|(server, _, _)| *server).collect()
    }
}

impl Transport for MockNetwork {
    fn send(&mut self, server: SocketAddr, datagram: &[u8]) -> Result<(), TransportError> {
        let mut arena = Arena::new(4096);
        let packet = arena.alloc_copy(datagram).expect("query fits scratch arena");
        let query = codec::parse_reply(&mut arena, packet).expect("resolver sent a valid query");

        let name = query.question.name.to_string_lossy(&arena);
        let qtype = query.question.qtype;
        self.queries.push((server.ip(), name.clone(), qtype));

        if let Some(script) = self.scripts.get(&(server.ip(), name.to_ascii_lowercase())) {
            let mut reply = ReplyBuilder::new(
                query.header.id.wrapping_add(script.id_offset),
                &name,
                qtype,
            )
            .flags(script.flags)
            .compress(true);

            for record in &script.answers {
                reply = reply.answer(record.clone());
            }
            for record in &script.authority {
                reply = reply.authority(record.clone());
            }
            for record in &script.additional {
                reply = reply.additional(record.clone());
            }
            self.inbox.push(reply.build());
        }
        Ok(())
    }

    fn peek_len(&mut self, server: SocketAddr) -> Result<usize, TransportError> {
        self.inbox.peek_len(server)
    }

    fn recv(&mut self, server: SocketAddr, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.inbox.recv(server, buf)
    }
}
