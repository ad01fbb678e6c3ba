//! Iterative resolution
//!
//! Walks the delegation tree from a root server: each reply either answers
//! authoritatively, or delegates to nameservers whose addresses come from glue
//! or from a nested resolution of the nameserver's own name.
//!
//! All per-step parsing happens in one arena. Every referral step runs under
//! its own checkpoint and is rewound once the next server's address is known;
//! the authoritative reply is left in place and copied out before the arena is
//! cleared.

use std::net::{IpAddr, SocketAddr};

use tracing::{debug, info, warn};

use crate::arena::Arena;
use crate::config::ResolverConfig;
use crate::dns::codec;
use crate::dns::transport::Transport;
use crate::dns::wire::{Message, Rcode, Record, RecordList, RecordType, Reply};
use crate::error::{ExchangeError, ResolveError};
use crate::strings::Str;

pub struct Resolver<T: Transport> {
    transport: T,
    arena: Arena,
    config: ResolverConfig,
    /// Nameserver hostnames whose resolution is in progress
    pending: Vec<Vec<u8>>,
}

impl<T: Transport> Resolver<T> {
    pub fn new(transport: T, config: ResolverConfig) -> Self {
        let arena = Arena::new(config.arena_capacity);
        Self {
            transport,
            arena,
            config,
            pending: Vec::new(),
        }
    }

    /// Resolve `domain` starting from the configured root server.
    ///
    /// Returns the answer section of the final authoritative reply, CNAMEs
    /// first. A trailing dot on `domain` is ignored.
    pub fn resolve(&mut self, domain: &str) -> Result<Vec<Record>, ResolveError> {
        if self.arena.is_released() {
            self.arena.init(self.config.arena_capacity);
        }
        self.arena.clear();
        self.pending.clear();

        let domain = domain.trim_end_matches('.');
        info!("🔍 Resolving {}", domain);

        let name = Str::from_bytes(&mut self.arena, domain.as_bytes())
            .map_err(|e| ResolveError::arena(domain, e))?;

        let result = self.resolve_name(name, 0).map(|answer| {
            answer
                .iter()
                .map(|rr| rr.to_record(&self.arena))
                .collect::<Vec<_>>()
        });

        debug!("Arena high-water mark {} bytes", self.arena.used());
        self.arena.clear();
        result
    }

    /// Free the arena's buffer; the next `resolve` allocates a new one
    pub fn release(&mut self) {
        self.arena.release();
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn resolve_name(&mut self, name: Str, depth: usize) -> Result<RecordList, ResolveError> {
        let domain = name.to_string_lossy(&self.arena);
        if depth > self.config.max_depth {
            return Err(ResolveError::DepthExceeded { domain, depth });
        }

        let mut server = self.config.root_server().ok_or(ResolveError::NoRootServer)?;

        for step in 0..self.config.max_referrals {
            let checkpoint = self.arena.checkpoint();
            let reply = self.query(name, server, &domain)?;

            if reply.header.authoritative() {
                info!(
                    "✅ {} answered {} authoritatively ({} records, step {})",
                    server,
                    domain,
                    reply.answer.len(),
                    step + 1
                );
                return self.finish(name, reply, depth);
            }

            if reply.authority.ns.is_empty() {
                return Err(ResolveError::NoDelegation { domain, server });
            }

            let next = match self.find_glue(&reply) {
                Some(addr) => addr,
                None => {
                    let nameserver = reply.authority.ns[0].rdata;
                    self.resolve_nameserver(nameserver, depth, &domain)?
                }
            };

            debug!("Referral for {}: {} -> {}", domain, server, next);
            self.arena.restore(checkpoint);
            server = next;
        }

        Err(ResolveError::ReferralLimitExceeded {
            domain,
            limit: self.config.max_referrals,
        })
    }

    /// One query/reply exchange with `server`
    fn query(&mut self, name: Str, server: IpAddr, domain: &str) -> Result<Reply, ResolveError> {
        let qtype = RecordType::for_address(&server);
        let id: u16 = rand::random();
        let query = Message::query(id, name, qtype);
        let addr = SocketAddr::new(server, self.config.port);

        debug!("DNS query: {} type {} to {} (id {:#06x})", domain, qtype, addr, id);

        codec::send_query(&mut self.transport, &self.arena, &query, addr).map_err(|e| match e {
            ExchangeError::Wire(source) => ResolveError::InvalidName {
                domain: domain.to_string(),
                source,
            },
            other => ResolveError::exchange(domain, server, other),
        })?;

        let reply = codec::recv_reply(&mut self.transport, &mut self.arena, addr)
            .map_err(|e| ResolveError::exchange(domain, server, e))?;

        debug!(
            "Reply from {}: flags {:#06x}, {} answer, {} authority, {} additional",
            server,
            reply.header.flags,
            reply.header.ancount,
            reply.header.nscount,
            reply.header.arcount
        );

        if reply.header.id != id {
            return Err(ResolveError::IdMismatch {
                domain: domain.to_string(),
                server,
                expected: id,
                got: reply.header.id,
            });
        }

        if !reply.header.is_response() {
            warn!("Reply from {} for {} has QR clear", server, domain);
        }
        if reply.header.truncated() {
            warn!("Reply from {} for {} is truncated, using what arrived", server, domain);
        }

        let rcode = reply.header.rcode();
        if rcode != Rcode::NOERROR {
            return Err(ResolveError::ServerFailure {
                domain: domain.to_string(),
                server,
                rcode,
            });
        }

        Ok(reply)
    }

    /// Final answer, chasing a CNAME-only answer when enabled
    fn finish(&mut self, name: Str, reply: Reply, depth: usize) -> Result<RecordList, ResolveError> {
        let mut answer = reply.answer;

        if self.config.follow_cname && !answer.has_address() {
            if let Some(target) = self.canonical_name(&answer, name) {
                debug!(
                    "{} is an alias for {}, restarting from the root",
                    name.to_string_lossy(&self.arena),
                    target.to_string_lossy(&self.arena)
                );
                let chased = self.resolve_name(target, depth + 1)?;
                answer.extend(chased);
            }
        }

        Ok(answer)
    }

    /// End of the CNAME chain starting at `name`
    fn canonical_name(&self, answer: &RecordList, name: Str) -> Option<Str> {
        let mut current = name;
        let mut target = None;

        // Each hop consumes one record, so a looping chain stops here too
        for _ in 0..answer.cname.len() {
            match answer
                .cname
                .iter()
                .find(|rr| rr.name.eq_ignore_case(&current, &self.arena))
            {
                Some(rr) => {
                    current = rr.rdata;
                    target = Some(rr.rdata);
                }
                None => break,
            }
        }

        target
    }

    /// Glue address of the first NS target that has one. Glue of the
    /// configured family is preferred for each target.
    fn find_glue(&self, reply: &Reply) -> Option<IpAddr> {
        let glue = &reply.additional;
        let (preferred, fallback) = if self.config.use_ipv6 {
            (&glue.aaaa, &glue.a)
        } else {
            (&glue.a, &glue.aaaa)
        };

        for ns in &reply.authority.ns {
            for bucket in [preferred, fallback] {
                let addr = bucket
                    .iter()
                    .filter(|rr| rr.name.eq_ignore_case(&ns.rdata, &self.arena))
                    .find_map(|rr| rr.address(&self.arena));

                if let Some(addr) = addr {
                    debug!("Glue for {}: {}", ns.rdata.to_string_lossy(&self.arena), addr);
                    return Some(addr);
                }
            }
        }

        None
    }

    /// Address of `nameserver`, resolved from the root
    fn resolve_nameserver(
        &mut self,
        nameserver: Str,
        depth: usize,
        domain: &str,
    ) -> Result<IpAddr, ResolveError> {
        let host = nameserver.to_string_lossy(&self.arena);

        if self.is_pending(nameserver.as_bytes(&self.arena)) {
            return Err(ResolveError::DelegationCycle {
                domain: domain.to_string(),
                nameserver: host,
            });
        }

        info!("No glue for {}, resolving it from the root", host);
        self.pending.push(nameserver.as_bytes(&self.arena).to_vec());

        let checkpoint = self.arena.checkpoint();
        let result = self.resolve_name(nameserver, depth + 1).map(|answer| {
            answer
                .a
                .iter()
                .chain(answer.aaaa.iter())
                .find_map(|rr| rr.address(&self.arena))
        });
        self.arena.restore(checkpoint);
        self.pending.pop();

        result?.ok_or(ResolveError::NameserverUnresolvable {
            domain: domain.to_string(),
            nameserver: host,
        })
    }

    /// Whether `host` is already being resolved further up the stack
    fn is_pending(&self, host: &[u8]) -> bool {
        self.pending.iter().any(|p| p.eq_ignore_ascii_case(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::wire::{FLAG_AA, FLAG_QR};
    use crate::tests::mock::QueueTransport;
    use crate::tests::wire::{ReplyBuilder, TestRecord};

    fn config() -> ResolverConfig {
        let mut config = ResolverConfig::default();
        config.arena_capacity = 16 * 1024;
        config
    }

    #[test]
    fn test_released_arena_is_reinitialized() {
        let mut resolver = Resolver::new(QueueTransport::new(vec![]), config());
        resolver.release();
        assert!(resolver.arena().is_released());

        // Fails on the (empty) transport, but only after the arena came back
        let err = resolver.resolve("example.com").unwrap_err();
        assert!(matches!(err, ResolveError::Transport { .. }));
        assert!(!resolver.arena().is_released());
        assert_eq!(resolver.arena().used(), 0);
    }

    #[test]
    fn test_query_encodes_trimmed_name() {
        let mut resolver = Resolver::new(QueueTransport::new(vec![]), config());
        let _ = resolver.resolve("example.com.");

        let (server, bytes) = &resolver.transport().sent[0];
        assert_eq!(*server, SocketAddr::new(resolver.config().root_server().unwrap(), 53));
        assert_eq!(&bytes[12..25], b"\x07example\x03com\x00");
        // Iterative query: RD clear
        assert_eq!(&bytes[2..4], &[0, 0]);
    }

    #[test]
    fn test_canonical_name_follows_chain() {
        let mut resolver = Resolver::new(QueueTransport::new(vec![]), config());
        let bytes = ReplyBuilder::new(1, "www.example.com", RecordType::A)
            .flags(FLAG_QR | FLAG_AA)
            .answer(TestRecord::cname("web.example.net", "edge.cdn.example"))
            .answer(TestRecord::cname("www.example.com", "web.example.net"))
            .build();

        let arena = &mut resolver.arena;
        let packet = arena.alloc_copy(&bytes).unwrap();
        let reply = codec::parse_reply(arena, packet).unwrap();
        let name = reply.question.name;

        let target = resolver.canonical_name(&reply.answer, name).unwrap();
        assert_eq!(target.to_string_lossy(resolver.arena()), "edge.cdn.example");
    }

    #[test]
    fn test_glue_prefers_configured_family() {
        let bytes = ReplyBuilder::new(1, "example.com", RecordType::A)
            .authority(TestRecord::ns("com", "a.gtld-servers.net"))
            .additional(TestRecord::aaaa(
                "a.gtld-servers.net",
                [0x20, 0x01, 0x05, 0x03, 0xa8, 0x3e, 0, 0, 0, 0, 0, 0, 0, 0x02, 0, 0x30],
            ))
            .additional(TestRecord::a("A.GTLD-SERVERS.NET", [192, 5, 6, 30]))
            .build();

        let mut v4 = Resolver::new(QueueTransport::new(vec![]), config());
        let packet = v4.arena.alloc_copy(&bytes).unwrap();
        let reply = codec::parse_reply(&mut v4.arena, packet).unwrap();
        assert_eq!(v4.find_glue(&reply), Some("192.5.6.30".parse().unwrap()));

        let mut v6 = Resolver::new(QueueTransport::new(vec![]), config().with_ipv6(true));
        let packet = v6.arena.alloc_copy(&bytes).unwrap();
        let reply = codec::parse_reply(&mut v6.arena, packet).unwrap();
        assert_eq!(v6.find_glue(&reply), Some("2001:503:a83e::2:30".parse().unwrap()));
    }

    #[test]
    fn test_pending_compares_raw_bytes() {
        let mut resolver = Resolver::new(QueueTransport::new(vec![]), config());
        resolver.pending.push(b"ns.\xff.test".to_vec());

        assert!(resolver.is_pending(b"NS.\xFF.TEST"));
        // Both would render as U+FFFD in text form
        assert!(!resolver.is_pending(b"ns.\xfe.test"));
        assert!(!resolver.is_pending(b"ns.test"));
    }

    #[test]
    fn test_unrelated_cname_is_not_followed() {
        let mut resolver = Resolver::new(QueueTransport::new(vec![]), config());
        let bytes = ReplyBuilder::new(1, "www.example.com", RecordType::A)
            .flags(FLAG_QR | FLAG_AA)
            .answer(TestRecord::cname("other.example.org", "elsewhere.test"))
            .build();

        let packet = resolver.arena.alloc_copy(&bytes).unwrap();
        let reply = codec::parse_reply(&mut resolver.arena, packet).unwrap();
        let name = reply.question.name;

        assert!(resolver.canonical_name(&reply.answer, name).is_none());
    }

    #[test]
    fn test_glue_uses_first_ns_with_match() {
        let bytes = ReplyBuilder::new(1, "example.com", RecordType::A)
            .authority(TestRecord::ns("example.com", "ns1.elsewhere.org"))
            .authority(TestRecord::ns("example.com", "ns2.example.com"))
            .additional(TestRecord::a("ns2.example.com", [10, 0, 0, 2]))
            .additional(TestRecord::a("unrelated.example.com", [10, 0, 0, 9]))
            .compress(true)
            .build();

        let mut resolver = Resolver::new(QueueTransport::new(vec![]), config());
        let packet = resolver.arena.alloc_copy(&bytes).unwrap();
        let reply = codec::parse_reply(&mut resolver.arena, packet).unwrap();
        assert_eq!(resolver.find_glue(&reply), Some("10.0.0.2".parse().unwrap()));
    }
}
