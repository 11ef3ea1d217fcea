//! DNS message codec.
//!
//! Requests are assembled with [`QueryBuilder`] and sealed into a [`Query`]
//! whose wire form is produced exactly once. Responses are decoded into a
//! [`Message`] which is never mutated afterwards.

mod name;
mod record;

use std::fmt;
use std::io::{Cursor, Result as IoResult};

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};

use crate::error::DecodeError;

pub use self::record::{Question, RData, RecordClass, RecordType, ResourceRecord};

const QR: u16 = 0x8000;
const AA: u16 = 0x0400;
const TC: u16 = 0x0200;
const RD: u16 = 0x0100;
const RA: u16 = 0x0080;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rcode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Other(u8),
}

impl Rcode {
    pub fn is_error(self) -> bool {
        self != Rcode::NoError
    }
}

impl From<u8> for Rcode {
    fn from(code: u8) -> Self {
        match code & 0x0F {
            0 => Rcode::NoError,
            1 => Rcode::FormErr,
            2 => Rcode::ServFail,
            3 => Rcode::NxDomain,
            4 => Rcode::NotImp,
            5 => Rcode::Refused,
            other => Rcode::Other(other),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(rcode: Rcode) -> Self {
        match rcode {
            Rcode::NoError => 0,
            Rcode::FormErr => 1,
            Rcode::ServFail => 2,
            Rcode::NxDomain => 3,
            Rcode::NotImp => 4,
            Rcode::Refused => 5,
            Rcode::Other(code) => code & 0x0F,
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({:?})", u8::from(*self), self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub id: u16,
    pub response: bool,
    pub opcode: u8,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub rcode: u8,
    pub question_count: u16,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
}

impl Header {
    pub fn rcode(&self) -> Rcode {
        Rcode::from(self.rcode)
    }

    fn flags(&self) -> u16 {
        let mut flags = (u16::from(self.opcode & 0x0F) << 11) | u16::from(self.rcode & 0x0F);
        for (set, bit) in [
            (self.response, QR),
            (self.authoritative, AA),
            (self.truncated, TC),
            (self.recursion_desired, RD),
            (self.recursion_available, RA),
        ] {
            if set {
                flags |= bit;
            }
        }
        flags
    }

    fn parse(rdr: &mut Cursor<&[u8]>) -> Result<Header, DecodeError> {
        let id = rdr.read_u16::<NetworkEndian>()?;
        let flags = rdr.read_u16::<NetworkEndian>()?;
        Ok(Header {
            id,
            response: flags & QR != 0,
            opcode: ((flags >> 11) & 0x0F) as u8,
            authoritative: flags & AA != 0,
            truncated: flags & TC != 0,
            recursion_desired: flags & RD != 0,
            recursion_available: flags & RA != 0,
            rcode: (flags & 0x0F) as u8,
            question_count: rdr.read_u16::<NetworkEndian>()?,
            answer_count: rdr.read_u16::<NetworkEndian>()?,
            authority_count: rdr.read_u16::<NetworkEndian>()?,
            additional_count: rdr.read_u16::<NetworkEndian>()?,
        })
    }

    fn encode(&self, buffer: &mut Vec<u8>) -> IoResult<()> {
        buffer.write_u16::<NetworkEndian>(self.id)?;
        buffer.write_u16::<NetworkEndian>(self.flags())?;
        buffer.write_u16::<NetworkEndian>(self.question_count)?;
        buffer.write_u16::<NetworkEndian>(self.answer_count)?;
        buffer.write_u16::<NetworkEndian>(self.authority_count)?;
        buffer.write_u16::<NetworkEndian>(self.additional_count)?;
        Ok(())
    }
}

/// A whole DNS message. Section counts in `header` are recomputed from the
/// section lengths when encoding.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

impl Message {
    /// An empty reply to `request`: same ID and question, QR set.
    pub fn reply_to(request: &Message) -> Message {
        Message {
            header: Header {
                id: request.header.id,
                response: true,
                opcode: request.header.opcode,
                recursion_desired: request.header.recursion_desired,
                ..Header::default()
            },
            questions: request.questions.clone(),
            ..Message::default()
        }
    }

    pub fn id(&self) -> u16 {
        self.header.id
    }

    pub fn rcode(&self) -> Rcode {
        self.header.rcode()
    }

    /// UDP payload size advertised by an OPT record in the additional section.
    pub fn edns_payload(&self) -> Option<u16> {
        self.additionals
            .iter()
            .find(|rr| rr.rtype() == RecordType::OPT)
            .map(|rr| u16::from(rr.question().class()))
    }

    pub fn decode(buf: &[u8]) -> Result<Message, DecodeError> {
        let mut rdr = Cursor::new(buf);
        let header = Header::parse(&mut rdr)?;

        let mut questions = Vec::with_capacity(header.question_count as usize);
        for _ in 0..header.question_count {
            questions.push(Question::parse(&mut rdr)?);
        }

        let answers = parse_section(&mut rdr, header.answer_count)?;
        let authorities = parse_section(&mut rdr, header.authority_count)?;
        let additionals = parse_section(&mut rdr, header.additional_count)?;

        Ok(Message {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }

    pub fn to_bytes(&self) -> IoResult<Vec<u8>> {
        let header = Header {
            question_count: self.questions.len() as u16,
            answer_count: self.answers.len() as u16,
            authority_count: self.authorities.len() as u16,
            additional_count: self.additionals.len() as u16,
            ..self.header
        };

        let mut buffer = vec![];
        header.encode(&mut buffer)?;
        for question in &self.questions {
            question.encode(&mut buffer)?;
        }
        for record in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additionals)
        {
            record.encode(&mut buffer)?;
        }
        Ok(buffer)
    }
}

fn parse_section(rdr: &mut Cursor<&[u8]>, count: u16) -> Result<Vec<ResourceRecord>, DecodeError> {
    // counts are untrusted, no preallocation
    let mut records = Vec::new();
    for _ in 0..count {
        records.push(ResourceRecord::parse(rdr)?);
    }
    Ok(records)
}

/// Collects the parts of an iterative (RD clear) single-question query.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    id: u16,
    question: Question,
    edns_payload: Option<u16>,
}

impl QueryBuilder {
    /// Starts a query with a fresh random transaction ID.
    pub fn new(question: Question) -> QueryBuilder {
        QueryBuilder {
            id: rand::random::<u16>(),
            question,
            edns_payload: None,
        }
    }

    pub fn id(mut self, id: u16) -> QueryBuilder {
        self.id = id;
        self
    }

    /// Appends an OPT pseudo-record advertising `payload` bytes.
    pub fn edns(mut self, payload: u16) -> QueryBuilder {
        self.edns_payload = Some(payload);
        self
    }

    pub fn build(self) -> IoResult<Query> {
        let message = Message {
            header: Header {
                id: self.id,
                ..Header::default()
            },
            questions: vec![self.question.clone()],
            additionals: self.edns_payload.map(ResourceRecord::opt).into_iter().collect(),
            ..Message::default()
        };
        let wire = message.to_bytes()?;
        Ok(Query {
            id: self.id,
            question: self.question,
            edns_payload: self.edns_payload,
            wire,
        })
    }
}

/// A sealed request. The wire bytes are fixed at build time.
#[derive(Debug, Clone)]
pub struct Query {
    id: u16,
    question: Question,
    edns_payload: Option<u16>,
    wire: Vec<u8>,
}

impl Query {
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn question(&self) -> &Question {
        &self.question
    }

    pub fn edns_payload(&self) -> Option<u16> {
        self.edns_payload
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.wire
    }

    /// A new sealed query with the same ID and question plus an OPT record.
    pub fn with_edns(&self, payload: u16) -> IoResult<Query> {
        QueryBuilder::new(self.question.clone())
            .id(self.id)
            .edns(payload)
            .build()
    }
}
