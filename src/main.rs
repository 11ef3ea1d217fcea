use std::net::IpAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dnslookup::{
    NoopObserver, QueryObserver, Question, Rcode, RecordClass, RecordType, ResolutionCache,
    ResolverConfig, ResourceRecord, Resolver, Section,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dnslookup")]
#[command(version)]
#[command(about = "Iterative DNS lookup starting from a root nameserver")]
struct Cli {
    /// Name to look up
    hostname: String,

    /// Record type (A, AAAA, NS, CNAME, MX, ...)
    #[arg(default_value = "A")]
    record_type: RecordType,

    /// Nameserver to start from instead of the configured root
    #[arg(short, long, value_name = "IP")]
    server: Option<IpAddr>,

    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Print every query and response
    #[arg(short, long)]
    verbose: bool,

    /// Print the cache contents after the lookup
    #[arg(long)]
    dump_cache: bool,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// Prints the query trace to stdout.
struct VerbosePrinter;

impl QueryObserver for VerbosePrinter {
    fn query_to_send(&self, server: IpAddr, question: &Question, id: u16) {
        println!();
        println!("Query ID     {} {} --> {}", id, question, server);
    }

    fn response_header(&self, id: u16, authoritative: bool, truncated: bool, rcode: Rcode) {
        println!(
            "Response ID: {} Authoritative = {} Truncated = {} Rcode = {}",
            id, authoritative, truncated, rcode
        );
    }

    fn section(&self, section: Section, count: usize) {
        let title = match section {
            Section::Answer => "Answers",
            Section::Authority => "Nameservers",
            Section::Additional => "Additional Information",
        };
        println!("  {} ({})", title, count);
    }

    fn record(&self, record: &ResourceRecord, _section: Section) {
        println!("       {}", record);
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init()
        .ok();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = ResolverConfig::load(cli.config.as_deref())?;
    if let Some(server) = cli.server {
        config.root_server = server;
    }
    info!(root = %config.root_server, "starting lookup");

    let cache = Arc::new(ResolutionCache::with_root(&config.root_name, config.root_server));
    let resolver = if cli.verbose {
        Resolver::with_cache(&config, cache.clone(), Arc::new(VerbosePrinter))?
    } else {
        Resolver::with_cache(&config, cache.clone(), Arc::new(NoopObserver))?
    };

    let question = Question::new(&cli.hostname, cli.record_type, RecordClass::IN);
    let status = match resolver.resolve(&question) {
        Ok(records) if records.is_empty() => {
            println!("{} -> no records", question);
            ExitCode::SUCCESS
        }
        Ok(records) => {
            for record in &records {
                println!("{}", record);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(%question, "{}", e);
            eprintln!("{}: {}", question, e);
            ExitCode::FAILURE
        }
    };

    if cli.dump_cache {
        println!();
        for record in cache.entries() {
            println!("{}", record);
        }
    }

    Ok(status)
}
