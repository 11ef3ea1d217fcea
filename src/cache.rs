//! Record cache shared by every resolution in a process.
//!
//! Records are keyed by the question they answer and, within a question,
//! by their data, so re-inserting an identical record refreshes its TTL.
//! Expired records are ignored on read and only removed by
//! [`ResolutionCache::purge_expired`].

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::protocol::{Question, RData, RecordClass, RecordType, ResourceRecord};

/// TTL given to the configured root nameserver; far enough out to never lapse.
const ROOT_TTL: u32 = u32::MAX;

type Store = HashMap<Question, HashMap<RData, ResourceRecord>>;

#[derive(Debug, Default)]
pub struct ResolutionCache {
    records: RwLock<Store>,
}

impl ResolutionCache {
    pub fn new() -> ResolutionCache {
        ResolutionCache::default()
    }

    /// A cache that already knows one root nameserver.
    pub fn with_root(name: &str, address: IpAddr) -> ResolutionCache {
        let cache = ResolutionCache::new();
        cache.set_root_nameserver(name, address);
        cache
    }

    /// Replaces whatever root delegation is cached with `name` at `address`.
    pub fn set_root_nameserver(&self, name: &str, address: IpAddr) {
        let root = Question::new("", RecordType::NS, RecordClass::IN);
        let rtype = match address {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::AAAA,
        };
        let glue = Question::new(name, rtype, RecordClass::IN);

        let mut store = self.records.write();
        store.remove(&root);
        store.remove(&glue);
        insert(
            &mut store,
            ResourceRecord::new(root, ROOT_TTL, RData::Name(glue.name().to_string())),
        );
        insert(&mut store, ResourceRecord::new(glue, ROOT_TTL, RData::Address(address)));
        debug!(root = name, %address, "root nameserver set");
    }

    /// Inserts a record, refreshing the TTL of an identical one.
    pub fn add_result(&self, record: ResourceRecord) {
        trace!(%record, "caching");
        insert(&mut self.records.write(), record);
    }

    /// Live records answering exactly `question`.
    pub fn cached_results(&self, question: &Question) -> Vec<ResourceRecord> {
        live(&self.records.read(), question, Instant::now())
    }

    /// Live NS records for the closest enclosing zone of `question` that
    /// has any. Every NS record of that zone is returned.
    pub fn best_nameservers(&self, question: &Question) -> Vec<ResourceRecord> {
        let store = self.records.read();
        let now = Instant::now();

        let mut zone = question.name();
        loop {
            let nameservers = live(&store, &Question::new(zone, RecordType::NS, question.class()), now);
            if !nameservers.is_empty() {
                return nameservers;
            }
            if zone.is_empty() {
                return Vec::new();
            }
            zone = zone.split_once('.').map_or("", |(_, parent)| parent);
        }
    }

    /// The subset of `nameservers` whose targets have a live address.
    pub fn best_known_address_nameservers(
        &self,
        nameservers: &[ResourceRecord],
    ) -> Vec<ResourceRecord> {
        let store = self.records.read();
        let now = Instant::now();
        nameservers
            .iter()
            .filter(|ns| {
                ns.target_name()
                    .map_or(false, |target| !addresses(&store, target, now).is_empty())
            })
            .cloned()
            .collect()
    }

    /// Live A and AAAA addresses for `name`, IPv4 first.
    pub fn known_addresses(&self, name: &str) -> Vec<IpAddr> {
        addresses(&self.records.read(), name, Instant::now())
    }

    /// Live records of any type owned by the name and class of `question`.
    pub fn records_named(&self, question: &Question) -> Vec<ResourceRecord> {
        let now = Instant::now();
        self.records
            .read()
            .iter()
            .filter(|(key, _)| key.name() == question.name() && key.class() == question.class())
            .flat_map(|(_, records)| records.values())
            .filter(|record| !record.is_expired(now))
            .cloned()
            .collect()
    }

    /// Every live record, ordered by name then type.
    pub fn entries(&self) -> Vec<ResourceRecord> {
        let now = Instant::now();
        let mut entries: Vec<ResourceRecord> = self
            .records
            .read()
            .values()
            .flat_map(|records| records.values())
            .filter(|record| !record.is_expired(now))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            (a.name(), a.rtype(), a.text_result()).cmp(&(b.name(), b.rtype(), b.text_result()))
        });
        entries
    }

    /// Drops expired records and returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.records.write();
        let mut removed = 0;
        store.retain(|_, records| {
            let before = records.len();
            records.retain(|_, record| !record.is_expired(now));
            removed += before - records.len();
            !records.is_empty()
        });
        removed
    }
}

fn insert(store: &mut Store, record: ResourceRecord) {
    store
        .entry(record.question().clone())
        .or_default()
        .insert(record.rdata().clone(), record);
}

fn live(store: &Store, question: &Question, now: Instant) -> Vec<ResourceRecord> {
    store
        .get(question)
        .map(|records| {
            records
                .values()
                .filter(|record| !record.is_expired(now))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn addresses(store: &Store, name: &str, now: Instant) -> Vec<IpAddr> {
    [RecordType::A, RecordType::AAAA]
        .into_iter()
        .flat_map(|rtype| live(store, &Question::new(name, rtype, RecordClass::IN), now))
        .filter_map(|record| record.address())
        .collect()
}
