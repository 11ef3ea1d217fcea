//! One question, one server: send, wait, retransmit, and fold whatever
//! comes back into the cache.

use std::io::{self, ErrorKind};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::cache::ResolutionCache;
use crate::config::ResolverConfig;
use crate::observer::{QueryObserver, Section};
use crate::protocol::{Message, Query, QueryBuilder, Question, Rcode, RecordType, ResourceRecord};

/// What a single server made of a single question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Every record of the accepted response, OPT excluded.
    Answer(Vec<ResourceRecord>),
    /// The response matched but carried a non-zero rcode.
    ServerError(Rcode),
    /// Nothing usable arrived within the attempt budget.
    NoResponse,
}

enum Received {
    Response(Message),
    TimedOut,
}

/// Owns the UDP socket. Dropping the executor closes it.
pub struct QueryExecutor {
    socket: UdpSocket,
    cache: Arc<ResolutionCache>,
    observer: Arc<dyn QueryObserver>,
    port: u16,
    max_attempts: u32,
    timeout: Duration,
    udp_payload: u16,
    edns_payload: u16,
}

impl QueryExecutor {
    pub fn new(
        config: &ResolverConfig,
        cache: Arc<ResolutionCache>,
        observer: Arc<dyn QueryObserver>,
    ) -> io::Result<QueryExecutor> {
        let socket = UdpSocket::bind(config.bind)?;
        debug!(local = %socket.local_addr()?, "query socket bound");
        Ok(QueryExecutor {
            socket,
            cache,
            observer,
            port: config.port,
            max_attempts: config.max_attempts,
            timeout: config.timeout(),
            udp_payload: config.udp_payload,
            edns_payload: config.edns_payload,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Asks `server` about `question`.
    ///
    /// A timeout resends the same request (same transaction ID) until the
    /// attempt budget runs out. Packets from other sources, packets that
    /// are not responses and responses with a different ID are dropped
    /// without costing an attempt. The first truncated response switches
    /// to the EDNS payload size and resends with an OPT record; that
    /// happens at most once per call.
    pub fn individual_query(&self, question: &Question, server: IpAddr) -> QueryOutcome {
        let mut query = match QueryBuilder::new(question.clone()).build() {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, %question, "failed to build query");
                return QueryOutcome::NoResponse;
            }
        };
        let target = SocketAddr::new(server, self.port);
        let mut payload = self.udp_payload;
        let mut attempt = 0;

        while attempt < self.max_attempts {
            self.observer.query_to_send(server, question, query.id());
            debug!(%target, %question, id = query.id(), attempt, payload, "sending query");

            if let Err(e) = self.socket.send_to(query.as_bytes(), target) {
                warn!(%target, error = %e, "send failed");
                attempt += 1;
                continue;
            }

            match self.await_response(&query, target, payload) {
                Ok(Received::Response(response)) => {
                    if response.header.truncated && payload < self.edns_payload {
                        debug!(%target, id = query.id(), "truncated response, retrying with EDNS");
                        payload = self.edns_payload;
                        query = match query.with_edns(payload) {
                            Ok(query) => query,
                            Err(e) => {
                                warn!(error = %e, "failed to add OPT record");
                                return QueryOutcome::NoResponse;
                            }
                        };
                        continue;
                    }
                    return self.process_response(&response);
                }
                Ok(Received::TimedOut) => {
                    debug!(%target, id = query.id(), attempt, "timed out");
                    attempt += 1;
                }
                Err(e) => {
                    warn!(%target, error = %e, "receive failed");
                    attempt += 1;
                }
            }
        }

        debug!(%target, %question, "no response");
        QueryOutcome::NoResponse
    }

    /// Waits out one receive window for a response that belongs to `query`.
    fn await_response(&self, query: &Query, target: SocketAddr, payload: u16) -> io::Result<Received> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; payload as usize];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Received::TimedOut);
            }
            self.socket.set_read_timeout(Some(remaining))?;

            let (nbytes, from) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(Received::TimedOut)
                }
                Err(e) => return Err(e),
            };

            if from != target {
                trace!(%from, expected = %target, "ignoring packet from unexpected source");
                continue;
            }
            let response = match Message::decode(&buf[..nbytes]) {
                Ok(response) => response,
                Err(e) => {
                    debug!(%from, error = %e, "ignoring undecodable packet");
                    continue;
                }
            };
            if !response.header.response {
                trace!(%from, "ignoring packet without QR bit");
                continue;
            }
            if response.id() != query.id() {
                debug!(%from, got = response.id(), want = query.id(), "ignoring mismatched transaction id");
                continue;
            }
            return Ok(Received::Response(response));
        }
    }

    /// Reports the response to the observer and, unless its rcode is an
    /// error, caches and returns every record except OPT pseudo-records.
    pub fn process_response(&self, response: &Message) -> QueryOutcome {
        let header = &response.header;
        self.observer
            .response_header(header.id, header.authoritative, header.truncated, header.rcode());

        let rcode = header.rcode();
        if rcode.is_error() {
            debug!(id = header.id, %rcode, "server error");
            return QueryOutcome::ServerError(rcode);
        }

        let mut records = Vec::new();
        for (section, rrs) in [
            (Section::Answer, &response.answers),
            (Section::Authority, &response.authorities),
            (Section::Additional, &response.additionals),
        ] {
            self.observer.section(section, rrs.len());
            for rr in rrs {
                self.observer.record(rr, section);
                if rr.rtype() == RecordType::OPT {
                    continue;
                }
                self.cache.add_result(rr.clone());
                if !records.contains(rr) {
                    records.push(rr.clone());
                }
            }
        }
        trace!(id = header.id, records = records.len(), "response processed");
        QueryOutcome::Answer(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::protocol::{RData, RecordClass};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
    }

    impl QueryObserver for Recording {
        fn response_header(&self, id: u16, _aa: bool, _tc: bool, rcode: Rcode) {
            self.events.lock().unwrap().push(format!("header {} {:?}", id, rcode));
        }

        fn section(&self, section: Section, count: usize) {
            self.events.lock().unwrap().push(format!("{:?} {}", section, count));
        }

        fn record(&self, record: &ResourceRecord, _section: Section) {
            self.events.lock().unwrap().push(format!("record {}", record.rtype()));
        }
    }

    fn config() -> ResolverConfig {
        ResolverConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            ..ResolverConfig::default()
        }
    }

    fn response(rcode: u8) -> Message {
        let question = Question::a("example.com");
        let request = Message::decode(
            QueryBuilder::new(question.clone()).id(7).build().unwrap().as_bytes(),
        )
        .unwrap();
        let mut reply = Message::reply_to(&request);
        reply.header.rcode = rcode;
        reply.answers.push(ResourceRecord::new(
            question,
            60,
            RData::Address("192.0.2.1".parse().unwrap()),
        ));
        reply.authorities.push(ResourceRecord::new(
            Question::new("example.com", RecordType::NS, RecordClass::IN),
            60,
            RData::Name("ns.example.com".to_string()),
        ));
        reply.additionals.push(ResourceRecord::opt(1280));
        reply
    }

    #[test]
    fn processing_caches_everything_but_opt() {
        let cache = Arc::new(ResolutionCache::new());
        let executor = QueryExecutor::new(&config(), cache.clone(), Arc::new(NoopObserver)).unwrap();

        match executor.process_response(&response(0)) {
            QueryOutcome::Answer(records) => {
                assert_eq!(2, records.len());
                assert!(records.iter().all(|rr| rr.rtype() != RecordType::OPT));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(1, cache.cached_results(&Question::a("example.com")).len());
        assert_eq!(2, cache.entries().len());
    }

    #[test]
    fn error_rcode_leaves_cache_untouched() {
        let cache = Arc::new(ResolutionCache::new());
        let executor = QueryExecutor::new(&config(), cache.clone(), Arc::new(NoopObserver)).unwrap();

        assert_eq!(
            QueryOutcome::ServerError(Rcode::NxDomain),
            executor.process_response(&response(3))
        );
        assert!(cache.entries().is_empty());
    }

    #[test]
    fn observer_sees_header_sections_and_records() {
        let observer = Arc::new(Recording::default());
        let executor =
            QueryExecutor::new(&config(), Arc::new(ResolutionCache::new()), observer.clone()).unwrap();
        executor.process_response(&response(0));

        let events = observer.events.lock().unwrap().clone();
        assert_eq!(
            vec![
                "header 7 NoError",
                "Answer 1",
                "record A",
                "Authority 1",
                "record NS",
                "Additional 1",
                "record OPT",
            ],
            events
        );
    }
}
