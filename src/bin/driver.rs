//! shardmap Driver Binary
//!
//! Runs a multimap workload on an in-process group and checks that the
//! find strategies agree.

use std::time::Instant;

use clap::Parser;
use shardmap::{AcceptAll, Communicator, Config, LocalComm, LocalGroup, MultiMap, Strategy};
use tracing_subscriber::{fmt, EnvFilter};

/// shardmap driver
#[derive(Parser, Debug)]
#[command(name = "shardmap-driver")]
#[command(about = "Exercise a distributed multimap on an in-process worker group")]
#[command(version)]
struct Args {
    /// Number of worker ranks
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Distinct keys inserted across the group
    #[arg(short, long, default_value = "100000")]
    keys: u64,

    /// Values inserted per key
    #[arg(short, long, default_value = "3")]
    multiplicity: u64,

    /// Run only this strategy (bulk, count-then-ring, adaptive, pipelined)
    #[arg(short, long)]
    strategy: Option<Strategy>,
}

/// Per-rank outcome: sorted results of each strategy that ran
type Outcome = Vec<(Strategy, Vec<(u64, u64)>)>;

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shardmap=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("shardmap driver v{}", shardmap::VERSION);
    tracing::info!(
        "{} workers, {} keys x {} values",
        args.workers,
        args.keys,
        args.multiplicity
    );

    let strategies: Vec<Strategy> = match args.strategy {
        Some(strategy) => vec![strategy],
        None => Strategy::ALL.to_vec(),
    };

    let outcomes = match LocalGroup::run(args.workers, |comm| worker(comm, &args, &strategies)) {
        Ok(outcomes) => outcomes,
        Err(e) => {
            tracing::error!("Group failed: {}", e);
            std::process::exit(1);
        }
    };

    let mut failed = false;
    for (rank, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(results) => {
                if let Some((reference, expected)) = results.first() {
                    for (strategy, found) in &results[1..] {
                        if found != expected {
                            tracing::error!(
                                "rank {}: {} returned {} results, {} returned {}",
                                rank,
                                strategy,
                                found.len(),
                                reference,
                                expected.len()
                            );
                            failed = true;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!("rank {} failed: {}", rank, e);
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    tracing::info!("All strategies agree");
}

fn worker(comm: LocalComm, args: &Args, strategies: &[Strategy]) -> shardmap::Result<Outcome> {
    let rank = comm.rank() as u64;
    let size = comm.size() as u64;

    let mut map = MultiMap::<u64, u64, _>::multimap(comm, Config::default())?;

    // Each rank inserts the keys congruent to its rank
    let batch: Vec<(u64, u64)> = (0..args.keys)
        .filter(|key| key % size == rank)
        .flat_map(|key| (0..args.multiplicity).map(move |i| (key, key * 10 + i)))
        .collect();

    let started = Instant::now();
    let grown = map.insert(batch, &AcceptAll)?;
    tracing::info!(
        "rank {}: inserted in {:?}, local shard holds {} entries",
        rank,
        started.elapsed(),
        grown
    );

    let multiplicity = map.get_multiplicity()?;
    if rank == 0 {
        tracing::info!("Global multiplicity: {:.3}", multiplicity);
    }

    // Query every other key, shifted so ranks ask for keys they do not own
    let queries: Vec<u64> = (0..args.keys)
        .filter(|key| key % 2 == 0 && (key / 2) % size == (rank + 1) % size)
        .collect();

    let mut outcome = Vec::with_capacity(strategies.len());
    for &strategy in strategies {
        let started = Instant::now();
        let mut found = map.find(queries.clone(), strategy, &AcceptAll)?;
        tracing::info!(
            "rank {}: {} found {} entries in {:?}",
            rank,
            strategy,
            found.len(),
            started.elapsed()
        );
        found.sort_unstable();
        outcome.push((strategy, found));
    }

    Ok(outcome)
}
