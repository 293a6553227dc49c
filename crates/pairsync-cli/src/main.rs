//! # pairsync CLI
//!
//! Command-line utilities for inspecting clocks, dry-running sync decisions,
//! and debugging a local metadata store.

use anyhow::{Context, Result};
use pairsync_core::{sync, sync_to_missing, Clock, ReplicaId};
use pairsync_store::{MetaStore, Outcome, Resolution, StoreConfig};
use std::env;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    tracing::debug!(command = %args[1], "dispatching");

    match args[1].as_str() {
        "inspect" => {
            if args.len() < 3 {
                eprintln!("Usage: pairsync inspect <clock>");
                std::process::exit(1);
            }
            inspect(&args[2])?;
        }
        "compare" | "compare-missing" => {
            if args.len() < 4 {
                eprintln!("Usage: pairsync {} <source> <dest>", args[1]);
                std::process::exit(1);
            }
            let from = parse_clock(&args[2])?;
            let to = parse_clock(&args[3])?;
            let action = if args[1] == "compare" {
                sync(&from, &to)
            } else {
                sync_to_missing(&from, &to)
            };
            println!("{action}");
        }
        "resolve" => {
            if args.len() < 5 {
                eprintln!("Usage: pairsync resolve <ours|theirs|new> <self> <other>");
                std::process::exit(1);
            }
            let mut own = parse_clock(&args[3])?;
            let other = parse_clock(&args[4])?;
            match args[2].as_str() {
                "ours" => own.resolve_ours(&other),
                "theirs" => own.resolve_theirs(&other),
                "new" => own.resolve_new(&other),
                mode => {
                    eprintln!("Unknown resolution: {mode}");
                    std::process::exit(1);
                }
            }
            own.validate();
            println!("{own}");
        }
        "status" => {
            status()?;
        }
        "demo" => {
            demo()?;
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn parse_clock(raw: &str) -> Result<Clock> {
    raw.parse::<Clock>()
        .with_context(|| format!("Failed to parse clock {raw:?}"))
}

fn inspect(raw: &str) -> Result<()> {
    let clock = parse_clock(raw)?;
    println!("clock:  {clock}");
    println!("sync:   {}", clock.sync_vector());
    println!("mod:    {}", clock.mod_vector());
    match clock.create_stamp() {
        Some(stamp) => println!("create: {stamp}"),
        None if clock.is_zero() => println!("create: (none; absent object)"),
        None => println!("create: (none; origin unknown)"),
    }
    // Aborts with the violated invariant if the clock is inconsistent.
    clock.validate();
    println!("state:  valid");
    Ok(())
}

fn status() -> Result<()> {
    let config = StoreConfig::from_env()?;
    let store = config.open()?;

    println!(
        "replica {} ({}), store {}",
        store.self_id(),
        store.self_uuid(),
        config.db_path.display()
    );

    let objects = store.list_objects()?;
    println!("{} object(s):", objects.len());
    for (path, record) in objects {
        let marker = if record.tombstone { " [deleted]" } else { "" };
        println!("  {path}{marker}  {}", record.clock);
    }

    let conflicts = store.list_conflicts()?;
    if !conflicts.is_empty() {
        println!("{} unresolved conflict(s):", conflicts.len());
        for conflict in conflicts {
            println!(
                "  {} at {}\n    ours:   {}\n    theirs: {}",
                conflict.path, conflict.noted_at, conflict.ours, conflict.theirs
            );
        }
    }
    Ok(())
}

/// Walk two in-memory replicas through a create, a divergence, and a
/// resolution, printing every decision along the way.
fn demo() -> Result<()> {
    let mut a = MetaStore::in_memory(ReplicaId(10))?;
    let mut b = MetaStore::in_memory(ReplicaId(11))?;
    a.register_replica(b.self_id(), b.self_uuid())?;
    b.register_replica(a.self_id(), a.self_uuid())?;

    println!("replica A is {}, replica B is {}", a.self_id(), b.self_id());

    a.record_write("notes.txt")?;
    let state = a.export_state("notes.txt")?.expect("just written");
    println!("A writes notes.txt        {}", state.clock);

    let outcome = b.reconcile(&state)?;
    println!("B reconciles from A       {outcome:?}");

    a.record_write("notes.txt")?;
    b.record_write("notes.txt")?;
    println!("both edit independently");

    let from_b = b.export_state("notes.txt")?.expect("present");
    let outcome = a.reconcile(&from_b)?;
    println!("A reconciles from B       {outcome:?}");
    assert_eq!(outcome, Outcome::Conflicted);

    let merged = a.resolve_conflict(&from_b, Resolution::New)?;
    println!("A writes a merged version {merged}");

    let from_a = a.export_state("notes.txt")?.expect("present");
    let outcome = b.reconcile(&from_a)?;
    println!("B reconciles the merge    {outcome:?}");

    for state in b.export_all()?.states {
        println!("B final state             {} {}", state.path, state.clock);
    }
    Ok(())
}

fn print_help() {
    println!(
        r#"pairsync CLI

USAGE:
    pairsync <COMMAND> [OPTIONS]

COMMANDS:
    inspect <clock>                      Parse and validate a textual clock
    compare <source> <dest>              Print the sync decision for a pair of clocks
    compare-missing <source> <dest>      Same, when the destination object is absent
    resolve <ours|theirs|new> <a> <b>    Print the merged clock for a resolution
    status                               List objects and conflicts in the local store
    demo                                 Run a scripted two-replica exchange
    help                                 Show this help message

ENVIRONMENT:
    PAIRSYNC_DB_PATH        store database path (status)
    PAIRSYNC_REPLICA_ID     compact replica id (status)
    PAIRSYNC_REPLICA_UUID   explicit peer identity (status)
    RUST_LOG                log filter, e.g. pairsync_store=debug

EXAMPLES:
    pairsync inspect '{{sync{{10:3}} mod{{10:3}} create{{10:1}}}}'
    pairsync compare '{{sync{{10:3}} mod{{10:3}} create{{10:1}}}}' '{{sync{{}} mod{{}} create{{}}}}'
"#
    );
}
