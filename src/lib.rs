//! An iterative DNS resolver.
//!
//! [`Resolver`] walks the delegation tree from a root nameserver, one UDP
//! query at a time, keeping everything it learns in a [`ResolutionCache`]
//! that can be shared between resolvers.
//!
//! ```no_run
//! use dnslookup::{Question, Resolver, ResolverConfig};
//!
//! let resolver = Resolver::new(&ResolverConfig::default())?;
//! for record in resolver.resolve(&Question::a("www.example.com"))? {
//!     println!("{}", record);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod query;
pub mod resolver;

pub use cache::ResolutionCache;
pub use config::ResolverConfig;
pub use error::{ConfigError, DecodeError, ResolveError};
pub use observer::{NoopObserver, QueryObserver, Section};
pub use protocol::{Message, Query, QueryBuilder, Question, RData, Rcode, RecordClass, RecordType, ResourceRecord};
pub use query::{QueryExecutor, QueryOutcome};
pub use resolver::{Lookup, Resolver};
