//! Command-line front end for resolving oracle rounds.
//!
//! Rounds are read as JSON (`RoundInput`); results are printed either as
//! JSON or as `QSYS|mod=ORACLE|...` lines.  Diagnostics go to stderr and are
//! filtered with `RUST_LOG` (default `warn`).

use reputation_oracle::{
    digest_from_hex, digest_to_hex, resolve_round, round_digest, ConsensusConfig, EventBounds,
    Fixed, ReportMatrix, RoundInput, RoundOutcome,
};
use std::{env, fs, io, path::Path};
use tracing_subscriber::EnvFilter;

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn usage() -> ! {
    eprintln!("Usage: oracle <resolve|digest|verify|demo> ...");
    eprintln!("  resolve <round.json> [--config <cfg.json>] [--json]");
    eprintln!("  digest <round.json> [--config <cfg.json>]");
    eprintln!("  verify <round.json> <digest_hex> [--config <cfg.json>]");
    eprintln!("  demo");
    std::process::exit(1);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let mut args = env::args().skip(1);
    let command = args.next();
    let tail = Options::parse(args.collect());
    match command.as_deref() {
        Some("resolve") => cmd_resolve(tail),
        Some("digest") => cmd_digest(tail),
        Some("verify") => cmd_verify(tail),
        Some("demo") => cmd_demo(),
        Some("-h") | Some("--help") => usage(),
        Some(other) => {
            eprintln!("Unknown command: {other}");
            usage();
        }
        None => usage(),
    }
}

/// Positional arguments plus the few flags the commands share.
struct Options {
    positional: Vec<String>,
    config: Option<String>,
    json: bool,
}

impl Options {
    fn parse(args: Vec<String>) -> Self {
        let mut options = Options {
            positional: Vec::new(),
            config: None,
            json: false,
        };
        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--json" => options.json = true,
                "--config" => {
                    let path = iter
                        .next()
                        .unwrap_or_else(|| fatal("--config requires a path"));
                    options.config = Some(path);
                }
                _ => options.positional.push(arg),
            }
        }
        options
    }

    fn consensus_config(&self) -> ConsensusConfig {
        match &self.config {
            Some(path) => ConsensusConfig::load(Path::new(path))
                .unwrap_or_else(|err| fatal(&format!("error loading config: {err}"))),
            None => ConsensusConfig::default(),
        }
    }
}

fn load_round(path: &str) -> RoundInput {
    let contents = fs::read_to_string(path)
        .unwrap_or_else(|err| fatal(&format!("error reading {path}: {err}")));
    serde_json::from_str(&contents)
        .unwrap_or_else(|err| fatal(&format!("error parsing {path}: {err}")))
}

fn run_round(input: &RoundInput, config: &ConsensusConfig) -> RoundOutcome {
    resolve_round(input, config).unwrap_or_else(|err| fatal(&format!("round failed: {err}")))
}

fn print_outcome(input: &RoundInput, outcome: &RoundOutcome) {
    for (j, value) in outcome.outcomes.iter().enumerate() {
        println!(
            "QSYS|mod=ORACLE|evt=OUTCOME|event={j}|scaled={}|value={value}|raw={}|certainty={}",
            input.events[j].scaled, outcome.outcomes_raw[j], outcome.certainty[j]
        );
    }
    for (i, value) in outcome.reputation.iter().enumerate() {
        println!(
            "QSYS|mod=ORACLE|evt=REPUTATION|reporter={i}|prior={}|updated={value}|bonus={}",
            input.reputation[i], outcome.bonus[i]
        );
    }
    println!(
        "QSYS|mod=ORACLE|evt=ROUND|iterations={}|converged={}|na_fraction={}|digest={}",
        outcome.iterations,
        outcome.converged,
        outcome.na_fraction,
        digest_to_hex(&round_digest(input, outcome))
    );
}

fn cmd_resolve(options: Options) {
    if options.positional.len() != 1 {
        eprintln!("Usage: oracle resolve <round.json> [--config <cfg.json>] [--json]");
        std::process::exit(1);
    }
    let config = options.consensus_config();
    let input = load_round(&options.positional[0]);
    let outcome = run_round(&input, &config);
    if options.json {
        match serde_json::to_string_pretty(&outcome) {
            Ok(text) => println!("{text}"),
            Err(err) => fatal(&format!("error encoding outcome: {err}")),
        }
    } else {
        print_outcome(&input, &outcome);
    }
}

fn cmd_digest(options: Options) {
    if options.positional.len() != 1 {
        eprintln!("Usage: oracle digest <round.json> [--config <cfg.json>]");
        std::process::exit(1);
    }
    let config = options.consensus_config();
    let input = load_round(&options.positional[0]);
    let outcome = run_round(&input, &config);
    println!("{}", digest_to_hex(&round_digest(&input, &outcome)));
}

fn cmd_verify(options: Options) {
    if options.positional.len() != 2 {
        eprintln!("Usage: oracle verify <round.json> <digest_hex> [--config <cfg.json>]");
        std::process::exit(1);
    }
    let expected = digest_from_hex(&options.positional[1])
        .unwrap_or_else(|err| fatal(&format!("invalid digest: {err}")));
    let config = options.consensus_config();
    let input = load_round(&options.positional[0]);
    let outcome = run_round(&input, &config);
    let computed = round_digest(&input, &outcome);
    if computed == expected {
        println!("QSYS|mod=ORACLE|evt=VERIFY|status=match|digest={}", digest_to_hex(&computed));
    } else {
        fatal(&format!(
            "QSYS|mod=ORACLE|evt=VERIFY|status=mismatch|expected={}|computed={}",
            digest_to_hex(&expected),
            digest_to_hex(&computed)
        ));
    }
}

fn decimal(text: &str) -> Fixed {
    text.parse()
        .unwrap_or_else(|err| fatal(&format!("invalid decimal {text}: {err}")))
}

fn matrix(rows: &[&[Option<&str>]]) -> ReportMatrix {
    let rows = rows
        .iter()
        .map(|row| row.iter().map(|cell| cell.map(decimal)).collect())
        .collect();
    ReportMatrix::from_rows(rows).unwrap_or_else(|err| fatal(&format!("demo matrix: {err}")))
}

fn binary_demo() -> RoundInput {
    let (y, n) = (Some("1"), Some("0"));
    RoundInput {
        reports: matrix(&[
            &[y, y, n, y],
            &[y, n, n, n],
            &[y, y, n, n],
            &[y, y, y, n],
            &[y, n, y, y],
            &[n, n, y, y],
        ]),
        reputation: [2, 10, 4, 2, 7, 1].map(Fixed::from_int).to_vec(),
        events: vec![EventBounds::binary(); 4],
    }
}

fn scalar_demo() -> RoundInput {
    let (y, n) = (Some("1"), Some("0"));
    let scaled = |min: i64, max: i64| {
        EventBounds::scaled(Fixed::from_int(min), Fixed::from_int(max))
            .unwrap_or_else(|err| fatal(&format!("demo bounds: {err}")))
    };
    let mut events = vec![EventBounds::binary(); 4];
    events.push(scaled(0, 435));
    events.push(scaled(8000, 20000));
    RoundInput {
        reports: matrix(&[
            &[y, y, n, n, Some("233"), Some("16027.59")],
            &[y, n, n, n, Some("199"), None],
            &[y, y, n, n, Some("233"), Some("16027.59")],
            &[y, y, y, n, Some("250"), None],
            &[n, n, y, y, Some("435"), Some("8001")],
            &[n, n, y, y, Some("435"), Some("19999")],
        ]),
        reputation: vec![Fixed::ONE; 6],
        events,
    }
}

fn cmd_demo() {
    let config = ConsensusConfig::default();
    for (name, input) in [("binary", binary_demo()), ("scalar", scalar_demo())] {
        println!(
            "QSYS|mod=ORACLE|evt=DEMO|name={name}|reporters={}|events={}",
            input.reports.num_reporters(),
            input.reports.num_events()
        );
        let outcome = run_round(&input, &config);
        print_outcome(&input, &outcome);
    }
}
