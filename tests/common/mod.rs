#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dnslookup::{Message, Question, RData, RecordClass, RecordType, ResolverConfig, ResourceRecord};

/// A nameserver on 127.0.0.1 that answers each request with whatever
/// packets the handler returns (possibly none).
pub struct ScriptedServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Message>>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ScriptedServer {
    pub fn start<F>(mut handler: F) -> ScriptedServer
    where
        F: FnMut(&Message) -> Vec<Vec<u8>> + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let requests = requests.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 4096];
                while !stop.load(Ordering::Relaxed) {
                    let Ok((nbytes, from)) = socket.recv_from(&mut buf) else {
                        continue;
                    };
                    let Ok(request) = Message::decode(&buf[..nbytes]) else {
                        continue;
                    };
                    let replies = handler(&request);
                    requests.lock().unwrap().push(request);
                    for reply in replies {
                        socket.send_to(&reply, from).unwrap();
                    }
                }
            })
        };

        ScriptedServer {
            addr,
            requests,
            stop,
            handle: Some(handle),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn requests(&self) -> Vec<Message> {
        self.requests.lock().unwrap().clone()
    }

    /// Resolver settings pointing at this server with short timeouts.
    pub fn config(&self) -> ResolverConfig {
        ResolverConfig {
            root_server: IpAddr::from([127, 0, 0, 1]),
            port: self.port(),
            timeout_ms: 200,
            bind: "127.0.0.1:0".parse().unwrap(),
            ..ResolverConfig::default()
        }
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

pub fn localhost() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

pub fn a(name: &str, addr: &str) -> ResourceRecord {
    ResourceRecord::new(Question::a(name), 300, RData::Address(addr.parse().unwrap()))
}

pub fn aaaa(name: &str, addr: &str) -> ResourceRecord {
    ResourceRecord::new(
        Question::new(name, RecordType::AAAA, RecordClass::IN),
        300,
        RData::Address(addr.parse().unwrap()),
    )
}

pub fn mx(name: &str, preference: u16, exchange: &str) -> ResourceRecord {
    ResourceRecord::new(
        Question::new(name, RecordType::MX, RecordClass::IN),
        300,
        RData::Mx {
            preference,
            exchange: exchange.to_string(),
        },
    )
}

/// `record` with a different TTL.
pub fn with_ttl(record: ResourceRecord, ttl: u32) -> ResourceRecord {
    ResourceRecord::new(record.question().clone(), ttl, record.rdata().clone())
}

pub fn ns(zone: &str, target: &str) -> ResourceRecord {
    ResourceRecord::new(
        Question::new(zone, RecordType::NS, RecordClass::IN),
        300,
        RData::Name(target.to_string()),
    )
}

pub fn cname(alias: &str, target: &str) -> ResourceRecord {
    ResourceRecord::new(
        Question::new(alias, RecordType::CNAME, RecordClass::IN),
        300,
        RData::Name(target.to_string()),
    )
}

/// An authoritative reply to `request` with the given answers.
pub fn answer(request: &Message, answers: Vec<ResourceRecord>) -> Vec<u8> {
    let mut reply = Message::reply_to(request);
    reply.header.authoritative = true;
    reply.answers = answers;
    reply.to_bytes().unwrap()
}

/// A referral: NS records in the authority section, glue in additional.
pub fn referral(request: &Message, nameservers: Vec<ResourceRecord>, glue: Vec<ResourceRecord>) -> Vec<u8> {
    let mut reply = Message::reply_to(request);
    reply.authorities = nameservers;
    reply.additionals = glue;
    reply.to_bytes().unwrap()
}

pub fn error_reply(request: &Message, rcode: u8) -> Vec<u8> {
    let mut reply = Message::reply_to(request);
    reply.header.rcode = rcode;
    reply.to_bytes().unwrap()
}
