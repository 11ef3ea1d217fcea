use std::net::IpAddr;

use crate::protocol::{Question, Rcode, ResourceRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Answer,
    Authority,
    Additional,
}

/// Receives notifications at fixed points of every query. Observers only
/// watch; nothing they do feeds back into resolution.
pub trait QueryObserver: Send + Sync {
    fn query_to_send(&self, _server: IpAddr, _question: &Question, _id: u16) {}

    fn response_header(&self, _id: u16, _authoritative: bool, _truncated: bool, _rcode: Rcode) {}

    fn section(&self, _section: Section, _count: usize) {}

    fn record(&self, _record: &ResourceRecord, _section: Section) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl QueryObserver for NoopObserver {}
