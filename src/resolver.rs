//! Iterative resolution: walk the delegation tree from the best nameserver
//! the cache knows about until an answer, an alias or the hop limit.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, info, instrument, trace};

use crate::cache::ResolutionCache;
use crate::config::ResolverConfig;
use crate::error::{ResolveError, Result};
use crate::observer::{NoopObserver, QueryObserver};
use crate::protocol::{Question, RecordClass, RecordType, ResourceRecord};
use crate::query::{QueryExecutor, QueryOutcome};

/// How an iterative lookup ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Records of the requested type are cached.
    Answer(Vec<ResourceRecord>),
    /// Only CNAME records are cached for the name. Following them is left
    /// to [`Resolver::results_following_cnames`].
    Cname(Vec<ResourceRecord>),
    /// The hop limit ran out; whatever the cache holds for the question.
    Exhausted(Vec<ResourceRecord>),
}

impl Lookup {
    pub fn records(&self) -> &[ResourceRecord] {
        match self {
            Lookup::Answer(records) | Lookup::Cname(records) | Lookup::Exhausted(records) => records,
        }
    }

    pub fn into_records(self) -> Vec<ResourceRecord> {
        match self {
            Lookup::Answer(records) | Lookup::Cname(records) | Lookup::Exhausted(records) => records,
        }
    }
}

pub struct Resolver {
    cache: Arc<ResolutionCache>,
    executor: QueryExecutor,
    max_hops: usize,
    max_indirection: i32,
}

impl Resolver {
    /// A resolver with a private cache seeded with the configured root.
    pub fn new(config: &ResolverConfig) -> io::Result<Resolver> {
        let cache = Arc::new(ResolutionCache::with_root(&config.root_name, config.root_server));
        Resolver::with_cache(config, cache, Arc::new(NoopObserver))
    }

    /// A resolver sharing `cache` with others. Each resolver owns its own
    /// socket, so one per thread.
    pub fn with_cache(
        config: &ResolverConfig,
        cache: Arc<ResolutionCache>,
        observer: Arc<dyn QueryObserver>,
    ) -> io::Result<Resolver> {
        let executor = QueryExecutor::new(config, cache.clone(), observer)?;
        Ok(Resolver {
            cache,
            executor,
            max_hops: config.max_hops,
            max_indirection: config.max_indirection,
        })
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Resolves `question` with the configured indirection budget.
    pub fn resolve(&self, question: &Question) -> Result<Vec<ResourceRecord>> {
        let records = self.results_following_cnames(question, self.max_indirection)?;
        info!(%question, records = records.len(), "resolved");
        Ok(records)
    }

    /// Records answering `question`, with every CNAME on the way expanded.
    ///
    /// Each CNAME link costs one unit of `max_indirection`; a negative
    /// budget fails before any traffic is sent. A link reached with the
    /// budget spent is still collected when its answer is already cached,
    /// so an alias delivered together with its target always resolves.
    pub fn results_following_cnames(
        &self,
        question: &Question,
        max_indirection: i32,
    ) -> Result<Vec<ResourceRecord>> {
        self.follow_cnames(question, max_indirection, &mut Vec::new())
    }

    /// Iterative lookup of `question` without following aliases.
    pub fn iterative_query(&self, question: &Question) -> Lookup {
        self.iterate(question, &mut Vec::new())
    }

    fn follow_cnames(
        &self,
        question: &Question,
        max_indirection: i32,
        trail: &mut Vec<Question>,
    ) -> Result<Vec<ResourceRecord>> {
        if max_indirection < 0 {
            return Err(ResolveError::IndirectionLimit);
        }

        let mut results: Vec<ResourceRecord> = Vec::new();
        let mut pending = vec![(question.clone(), max_indirection)];

        while let Some((current, budget)) = pending.pop() {
            let direct = if budget < 0 {
                match self.classify(&current) {
                    Some(Lookup::Answer(records)) => records,
                    _ => return Err(ResolveError::IndirectionLimit),
                }
            } else {
                self.iterate(&current, trail).into_records()
            };

            if !answers(&direct, &current).is_empty() {
                merge(&mut results, direct);
                continue;
            }
            for record in direct {
                if record.rtype() == RecordType::CNAME {
                    if let Some(target) = record.target_name() {
                        trace!(alias = record.name(), target, budget, "following CNAME");
                        pending.push((current.with_name(target), budget - 1));
                    }
                }
                merge(&mut results, vec![record]);
            }
        }

        Ok(results)
    }

    #[instrument(level = "debug", skip(self, question, trail), fields(question = %question, depth = trail.len()))]
    fn iterate(&self, question: &Question, trail: &mut Vec<Question>) -> Lookup {
        for hop in 0..self.max_hops {
            if let Some(lookup) = self.classify(question) {
                return lookup;
            }

            let best = self.cache.best_nameservers(question);
            let mut known = self.reachable(self.cache.best_known_address_nameservers(&best));
            trace!(hop, best = best.len(), known = known.len(), "nameservers");

            if known.is_empty() {
                self.locate_nameserver(&best, trail);
                continue;
            }
            known.shuffle(&mut rand::thread_rng());
            // zero-TTL records are gone from the cache by the next hop
            let fresh = self.ask_nameservers(question, &known);
            if let Some(lookup) = fresh.and_then(|records| classify_records(&records, question)) {
                return lookup;
            }
        }

        self.classify(question).unwrap_or_else(|| {
            debug!(%question, "hop limit reached");
            Lookup::Exhausted(self.cache.cached_results(question))
        })
    }

    /// Resolves the address of the first of `nameservers` that can be
    /// resolved without error. Lookups already in progress further up the
    /// trail count as errors, as does nesting deeper than the hop limit.
    fn locate_nameserver(&self, nameservers: &[ResourceRecord], trail: &mut Vec<Question>) {
        for ns in nameservers {
            let Some(target) = ns.target_name() else {
                continue;
            };
            let question = Question::new(target, self.address_type(), RecordClass::IN);
            let located = if trail.contains(&question) || trail.len() >= self.max_hops {
                Err(ResolveError::DelegationDepth)
            } else {
                trail.push(question.clone());
                let located = self.follow_cnames(&question, self.max_indirection, trail);
                trail.pop();
                located
            };

            match located {
                Ok(_) => return,
                Err(e) => debug!(nameserver = target, error = %e, "nameserver address lookup failed"),
            }
        }
    }

    /// Queries `nameservers` in turn until one gives a usable response,
    /// and returns that response's records.
    fn ask_nameservers(
        &self,
        question: &Question,
        nameservers: &[ResourceRecord],
    ) -> Option<Vec<ResourceRecord>> {
        let local = self.executor.local_addr().ok();
        for ns in nameservers {
            let Some(target) = ns.target_name() else {
                continue;
            };
            let Some(server) = pick_address(&self.cache.known_addresses(target), local) else {
                continue;
            };

            match self.executor.individual_query(question, server) {
                QueryOutcome::Answer(records) => {
                    trace!(nameserver = target, %server, records = records.len(), "answered");
                    return Some(records);
                }
                QueryOutcome::ServerError(rcode) => {
                    debug!(nameserver = target, %server, %rcode, "rejecting nameserver");
                }
                QueryOutcome::NoResponse => {
                    debug!(nameserver = target, %server, "rejecting unresponsive nameserver");
                }
            }
        }
        None
    }

    /// Drops nameservers with no address the socket can reach.
    fn reachable(&self, nameservers: Vec<ResourceRecord>) -> Vec<ResourceRecord> {
        let local = self.executor.local_addr().ok();
        nameservers
            .into_iter()
            .filter(|ns| {
                ns.target_name().map_or(false, |target| {
                    pick_address(&self.cache.known_addresses(target), local).is_some()
                })
            })
            .collect()
    }

    /// A for an IPv4 socket, AAAA for IPv6.
    fn address_type(&self) -> RecordType {
        match self.executor.local_addr() {
            Ok(local) if local.is_ipv6() => RecordType::AAAA,
            _ => RecordType::A,
        }
    }

    /// Answer or alias already in the cache, if any.
    fn classify(&self, question: &Question) -> Option<Lookup> {
        let cached = match question.rtype() {
            RecordType::ANY => self.cache.records_named(question),
            RecordType::CNAME => self.cache.cached_results(question),
            _ => {
                let mut cached = self.cache.cached_results(question);
                cached.extend(self.cache.cached_results(&question.with_type(RecordType::CNAME)));
                cached
            }
        };
        classify_records(&cached, question)
    }
}

/// Records among `records` that answer `question`. ANY is answered by
/// every record owned by the name.
fn answers(records: &[ResourceRecord], question: &Question) -> Vec<ResourceRecord> {
    records
        .iter()
        .filter(|rr| {
            rr.name() == question.name()
                && rr.question().class() == question.class()
                && (question.rtype() == RecordType::ANY || rr.rtype() == question.rtype())
        })
        .cloned()
        .collect()
}

fn classify_records(records: &[ResourceRecord], question: &Question) -> Option<Lookup> {
    let direct = answers(records, question);
    if !direct.is_empty() {
        return Some(Lookup::Answer(direct));
    }
    if matches!(question.rtype(), RecordType::CNAME | RecordType::ANY) {
        return None;
    }
    let aliases = answers(records, &question.with_type(RecordType::CNAME));
    if aliases.is_empty() {
        None
    } else {
        Some(Lookup::Cname(aliases))
    }
}

fn merge(results: &mut Vec<ResourceRecord>, records: Vec<ResourceRecord>) {
    for record in records {
        if !results.contains(&record) {
            results.push(record);
        }
    }
}

/// An address of the same family as the local socket.
fn pick_address(addresses: &[IpAddr], local: Option<SocketAddr>) -> Option<IpAddr> {
    match local {
        Some(local) => addresses.iter().find(|addr| addr.is_ipv4() == local.is_ipv4()),
        None => addresses.first(),
    }
    .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RData;

    fn offline_config() -> ResolverConfig {
        ResolverConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            ..ResolverConfig::default()
        }
    }

    fn offline() -> Resolver {
        Resolver::with_cache(
            &offline_config(),
            Arc::new(ResolutionCache::new()),
            Arc::new(NoopObserver),
        )
        .unwrap()
    }

    fn cname(alias: &str, target: &str) -> ResourceRecord {
        ResourceRecord::new(
            Question::new(alias, RecordType::CNAME, RecordClass::IN),
            300,
            RData::Name(target.to_string()),
        )
    }

    fn a(name: &str, addr: &str) -> ResourceRecord {
        ResourceRecord::new(Question::a(name), 300, RData::Address(addr.parse().unwrap()))
    }

    #[test]
    fn negative_budget_fails_immediately() {
        let resolver = offline();
        assert!(matches!(
            resolver.results_following_cnames(&Question::a("example.com"), -1),
            Err(ResolveError::IndirectionLimit)
        ));
    }

    #[test]
    fn cached_answer_needs_no_nameserver() {
        let resolver = offline();
        resolver.cache().add_result(a("example.com", "192.0.2.1"));
        let lookup = resolver.iterative_query(&Question::a("example.com"));
        assert!(matches!(lookup, Lookup::Answer(ref records) if records.len() == 1));
    }

    #[test]
    fn cname_is_deferred_by_iterative_query() {
        let resolver = offline();
        resolver.cache().add_result(cname("www.example.com", "web.example.com"));
        let lookup = resolver.iterative_query(&Question::a("www.example.com"));
        assert_eq!(Lookup::Cname(vec![cname("www.example.com", "web.example.com")]), lookup);
    }

    #[test]
    fn cached_chain_is_expanded() {
        let resolver = offline();
        resolver.cache().add_result(cname("a.example.com", "b.example.com"));
        resolver.cache().add_result(cname("b.example.com", "c.example.com"));
        resolver.cache().add_result(a("c.example.com", "192.0.2.9"));

        let records = resolver
            .results_following_cnames(&Question::a("a.example.com"), 5)
            .unwrap();
        assert_eq!(3, records.len());
        assert!(records.contains(&a("c.example.com", "192.0.2.9")));
    }

    #[test]
    fn chain_longer_than_budget_is_an_error() {
        let resolver = offline();
        resolver.cache().add_result(cname("a.example.com", "b.example.com"));
        resolver.cache().add_result(cname("b.example.com", "c.example.com"));
        resolver.cache().add_result(a("c.example.com", "192.0.2.9"));

        assert!(resolver
            .results_following_cnames(&Question::a("a.example.com"), 1)
            .is_ok());
        assert!(matches!(
            resolver.results_following_cnames(&Question::a("a.example.com"), 0),
            Err(ResolveError::IndirectionLimit)
        ));
    }

    #[test]
    fn cname_loop_hits_the_budget() {
        let resolver = offline();
        resolver.cache().add_result(cname("a.example.com", "b.example.com"));
        resolver.cache().add_result(cname("b.example.com", "a.example.com"));
        assert!(matches!(
            resolver.results_following_cnames(&Question::a("a.example.com"), 10),
            Err(ResolveError::IndirectionLimit)
        ));
    }

    #[test]
    fn empty_cache_exhausts_without_traffic() {
        let resolver = offline();
        let lookup = resolver.iterative_query(&Question::a("example.com"));
        assert_eq!(Lookup::Exhausted(Vec::new()), lookup);
    }

    #[test]
    fn address_family_matches_socket() {
        let v4: IpAddr = "192.0.2.1".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        let local: SocketAddr = "0.0.0.0:0".parse().unwrap();
        assert_eq!(Some(v4), pick_address(&[v6, v4], Some(local)));
        assert_eq!(None, pick_address(&[v6], Some(local)));
        assert_eq!(None, pick_address(&[], Some(local)));
        assert_eq!(Some(v6), pick_address(&[v6, v4], None));
    }

    #[test]
    fn v6_only_glue_is_not_reachable_from_v4() {
        let resolver = offline();
        let ns = ResourceRecord::new(
            Question::new("example.com", RecordType::NS, RecordClass::IN),
            300,
            RData::Name("ns.example.net".to_string()),
        );
        resolver.cache().add_result(ResourceRecord::new(
            Question::new("ns.example.net", RecordType::AAAA, RecordClass::IN),
            300,
            RData::Address("2001:db8::53".parse().unwrap()),
        ));
        assert_eq!(1, resolver.cache().best_known_address_nameservers(&[ns.clone()]).len());
        assert!(resolver.reachable(vec![ns.clone()]).is_empty());

        resolver.cache().add_result(a("ns.example.net", "192.0.2.53"));
        assert_eq!(vec![ns.clone()], resolver.reachable(vec![ns]));
        assert_eq!(RecordType::A, resolver.address_type());
    }

    #[test]
    fn any_is_answered_by_every_type_of_the_name() {
        let resolver = offline();
        resolver.cache().add_result(a("example.com", "192.0.2.1"));
        resolver.cache().add_result(cname("www.example.com", "example.com"));
        let any = Question::new("example.com", RecordType::ANY, RecordClass::IN);
        assert_eq!(
            Lookup::Answer(vec![a("example.com", "192.0.2.1")]),
            resolver.iterative_query(&any)
        );
    }

    #[test]
    fn fresh_records_classify_without_the_cache() {
        let q = Question::a("www.example.com");
        let records = vec![cname("www.example.com", "web.example.com"), a("web.example.com", "192.0.2.4")];
        assert_eq!(
            Some(Lookup::Cname(vec![cname("www.example.com", "web.example.com")])),
            classify_records(&records, &q)
        );
        assert_eq!(
            Some(Lookup::Answer(vec![a("web.example.com", "192.0.2.4")])),
            classify_records(&records, &q.with_name("web.example.com"))
        );
        assert_eq!(None, classify_records(&records[1..], &q));
    }
}
