use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{Cursor, Error as IoError, ErrorKind, Read, Result as IoResult};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::time::{Duration, Instant};

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};

use super::name::{self, encode_name, read_name};
use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    OPT,
    ANY,
    Unknown(u16),
}

impl RecordType {
    pub fn code(self) -> u16 {
        u16::from(self)
    }
}

impl From<u16> for RecordType {
    fn from(code: u16) -> Self {
        match code {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            41 => RecordType::OPT,
            255 => RecordType::ANY,
            other => RecordType::Unknown(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(rtype: RecordType) -> Self {
        match rtype {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::OPT => 41,
            RecordType::ANY => 255,
            RecordType::Unknown(code) => code,
        }
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        let rtype = match upper.as_str() {
            "A" => RecordType::A,
            "NS" => RecordType::NS,
            "CNAME" => RecordType::CNAME,
            "SOA" => RecordType::SOA,
            "PTR" => RecordType::PTR,
            "MX" => RecordType::MX,
            "TXT" => RecordType::TXT,
            "AAAA" => RecordType::AAAA,
            "OPT" => RecordType::OPT,
            "ANY" => RecordType::ANY,
            _ => match upper.strip_prefix("TYPE").map(str::parse::<u16>) {
                Some(Ok(code)) => RecordType::from(code),
                _ => return Err(format!("unknown record type: {}", s)),
            },
        };
        Ok(rtype)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordType::Unknown(code) => write!(f, "TYPE{}", code),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordClass {
    IN,
    CH,
    HS,
    Unknown(u16),
}

impl From<u16> for RecordClass {
    fn from(code: u16) -> Self {
        match code {
            1 => RecordClass::IN,
            3 => RecordClass::CH,
            4 => RecordClass::HS,
            other => RecordClass::Unknown(other),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(class: RecordClass) -> Self {
        match class {
            RecordClass::IN => 1,
            RecordClass::CH => 3,
            RecordClass::HS => 4,
            RecordClass::Unknown(code) => code,
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordClass::Unknown(code) => write!(f, "CLASS{}", code),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

/// A (name, type, class) triple. Used both as the unit of a query and as
/// the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    name: String,
    rtype: RecordType,
    class: RecordClass,
}

impl Question {
    pub fn new(name: &str, rtype: RecordType, class: RecordClass) -> Question {
        Question {
            name: name::normalize(name),
            rtype,
            class,
        }
    }

    /// Internet-class address question, the kind used to locate a nameserver.
    pub fn a(name: &str) -> Question {
        Question::new(name, RecordType::A, RecordClass::IN)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rtype(&self) -> RecordType {
        self.rtype
    }

    pub fn class(&self) -> RecordClass {
        self.class
    }

    /// Same name and class, different type.
    pub fn with_type(&self, rtype: RecordType) -> Question {
        Question {
            name: self.name.clone(),
            rtype,
            class: self.class,
        }
    }

    /// Same type and class, different name.
    pub fn with_name(&self, name: &str) -> Question {
        Question::new(name, self.rtype, self.class)
    }

    pub(crate) fn encode(&self, buffer: &mut Vec<u8>) -> IoResult<()> {
        encode_name(&self.name, buffer);
        buffer.write_u16::<NetworkEndian>(self.rtype.into())?;
        buffer.write_u16::<NetworkEndian>(self.class.into())?;
        Ok(())
    }

    pub(crate) fn parse(rdr: &mut Cursor<&[u8]>) -> Result<Question, DecodeError> {
        let name = read_name(rdr)?;
        Ok(Question {
            name,
            rtype: rdr.read_u16::<NetworkEndian>()?.into(),
            class: rdr.read_u16::<NetworkEndian>()?.into(),
        })
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}. {} {}", self.name, self.class, self.rtype)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RData {
    /// A and AAAA.
    Address(IpAddr),
    /// NS, CNAME and PTR.
    Name(String),
    Mx { preference: u16, exchange: String },
    /// Anything the resolver does not interpret, as lower-case hex.
    Opaque(String),
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RData::Address(addr) => fmt::Display::fmt(addr, f),
            RData::Name(name) => f.write_str(name),
            RData::Mx { exchange, .. } => f.write_str(exchange),
            RData::Opaque(hex) => f.write_str(hex),
        }
    }
}

/// A record together with the moment it entered the process. Two records
/// are equal when they answer the same question with the same data; the
/// TTL and timestamp do not take part in equality.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    question: Question,
    ttl: u32,
    rdata: RData,
    inserted: Instant,
}

impl ResourceRecord {
    pub fn new(question: Question, ttl: u32, rdata: RData) -> ResourceRecord {
        ResourceRecord {
            question,
            ttl,
            rdata,
            inserted: Instant::now(),
        }
    }

    /// Overrides the insertion timestamp.
    pub fn inserted_at(mut self, inserted: Instant) -> ResourceRecord {
        self.inserted = inserted;
        self
    }

    pub fn question(&self) -> &Question {
        &self.question
    }

    pub fn name(&self) -> &str {
        self.question.name()
    }

    pub fn rtype(&self) -> RecordType {
        self.question.rtype()
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn rdata(&self) -> &RData {
        &self.rdata
    }

    pub fn inserted(&self) -> Instant {
        self.inserted
    }

    pub fn text_result(&self) -> String {
        self.rdata.to_string()
    }

    pub fn address(&self) -> Option<IpAddr> {
        match self.rdata {
            RData::Address(addr) => Some(addr),
            _ => None,
        }
    }

    /// The name an NS, CNAME, PTR or MX record points at.
    pub fn target_name(&self) -> Option<&str> {
        match &self.rdata {
            RData::Name(name) => Some(name),
            RData::Mx { exchange, .. } => Some(exchange),
            _ => None,
        }
    }

    /// `None` when the expiry is too far out to represent.
    pub fn expires_at(&self) -> Option<Instant> {
        self.inserted
            .checked_add(Duration::from_secs(u64::from(self.ttl)))
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at() {
            Some(expiry) => now > expiry,
            None => false,
        }
    }

    pub fn remaining_ttl(&self, now: Instant) -> u32 {
        match self.expires_at() {
            Some(expiry) => expiry.saturating_duration_since(now).as_secs() as u32,
            None => self.ttl,
        }
    }

    /// OPT pseudo-record advertising `payload` bytes of UDP buffer.
    pub fn opt(payload: u16) -> ResourceRecord {
        ResourceRecord::new(
            Question::new("", RecordType::OPT, RecordClass::Unknown(payload)),
            0,
            RData::Opaque(String::new()),
        )
    }

    pub(crate) fn encode(&self, buffer: &mut Vec<u8>) -> IoResult<()> {
        self.question.encode(buffer)?;
        buffer.write_u32::<NetworkEndian>(self.ttl)?;

        let mut rdata = vec![];
        match &self.rdata {
            RData::Address(IpAddr::V4(addr)) => rdata.extend_from_slice(&addr.octets()),
            RData::Address(IpAddr::V6(addr)) => rdata.extend_from_slice(&addr.octets()),
            RData::Name(name) => encode_name(name, &mut rdata),
            RData::Mx {
                preference,
                exchange,
            } => {
                rdata.write_u16::<NetworkEndian>(*preference)?;
                encode_name(exchange, &mut rdata);
            }
            RData::Opaque(hex) => rdata.extend(
                HEXLOWER_PERMISSIVE
                    .decode(hex.as_bytes())
                    .map_err(|e| IoError::new(ErrorKind::InvalidData, e))?,
            ),
        }
        buffer.write_u16::<NetworkEndian>(rdata.len() as u16)?;
        buffer.extend_from_slice(&rdata);
        Ok(())
    }

    pub(crate) fn parse(rdr: &mut Cursor<&[u8]>) -> Result<ResourceRecord, DecodeError> {
        let question = Question::parse(rdr)?;
        let ttl = rdr.read_u32::<NetworkEndian>()?;
        let length = rdr.read_u16::<NetworkEndian>()? as usize;

        let start = rdr.position() as usize;
        let end = start + length;
        if end > rdr.get_ref().len() {
            return Err(DecodeError::UnexpectedEnd);
        }

        let bad_length = || DecodeError::BadRdataLength {
            rtype: question.rtype().to_string(),
            len: length,
        };
        let rdata = match question.rtype() {
            RecordType::A => {
                if length != 4 {
                    return Err(bad_length());
                }
                RData::Address(IpAddr::V4(Ipv4Addr::from(rdr.read_u32::<NetworkEndian>()?)))
            }
            RecordType::AAAA => {
                if length != 16 {
                    return Err(bad_length());
                }
                let mut rawaddr = [0u8; 16];
                rdr.read_exact(&mut rawaddr)?;
                RData::Address(IpAddr::V6(Ipv6Addr::from(rawaddr)))
            }
            RecordType::NS | RecordType::CNAME | RecordType::PTR => RData::Name(read_name(rdr)?),
            RecordType::MX => {
                let preference = rdr.read_u16::<NetworkEndian>()?;
                RData::Mx {
                    preference,
                    exchange: read_name(rdr)?,
                }
            }
            _ => {
                let mut raw = vec![0u8; length];
                rdr.read_exact(&mut raw)?;
                RData::Opaque(HEXLOWER.encode(&raw))
            }
        };

        if rdr.position() as usize > end {
            return Err(bad_length());
        }
        rdr.set_position(end as u64);

        Ok(ResourceRecord::new(question, ttl, rdata))
    }
}

impl PartialEq for ResourceRecord {
    fn eq(&self, other: &Self) -> bool {
        self.question == other.question && self.rdata == other.rdata
    }
}

impl Eq for ResourceRecord {}

impl Hash for ResourceRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.question.hash(state);
        self.rdata.hash(state);
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}. {} {} {} {}",
            self.question.name(),
            self.ttl,
            self.question.class(),
            self.question.rtype(),
            self.rdata
        )
    }
}
