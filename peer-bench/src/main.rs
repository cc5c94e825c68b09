use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::Instrument;

use peer_bench::cli::{AllToAllArgs, Cli, Command, LookupArgs};
use peer_bench::config::Placement;
use peer_bench::harness::HarnessReport;
use peer_bench::runner::{self, PeerReport};
use peer_bench::transport::Transport;

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_timer(fmt::time::uptime())
        .with_file(true)
        .with_line_number(true)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Lookup(args) => lookup(args).await,
        Command::Alltoall(args) => alltoall(args).await,
    }
}

async fn lookup(args: LookupArgs) -> Result<()> {
    let config = args.config();
    let placement = args.peer.placement()?;
    config.validate(placement.total())?;

    let reports = match placement {
        Placement::Single { rank, peers } => {
            let transport = Transport::bind(rank, peers, args.peer.transport_options())
                .instrument(runner::peer_span(rank))
                .await
                .context("failed to join the mesh")?;
            vec![runner::run_lookup(transport, &config).await?]
        }
        Placement::Local { count } => runner::run_local_lookup(count, &config).await?,
    };

    for report in &reports {
        if args.peer.json {
            print_json(report)?;
            continue;
        }
        match report {
            PeerReport::Server(server) => println!(
                "server {}: served {} requests ({} misses) in {:.6}s",
                server.rank,
                server.served,
                server.misses,
                server.elapsed.as_secs_f64()
            ),
            PeerReport::Client(client) => println!(
                "client {} (rank {}): {} requests in {:.6}s, mean rtt {:.6}s, {:.0} req/s",
                client.client_id,
                client.rank,
                client.requests,
                client.elapsed.as_secs_f64(),
                client.round_trips.mean.as_secs_f64(),
                client.throughput
            ),
        }
    }
    Ok(())
}

async fn alltoall(args: AllToAllArgs) -> Result<()> {
    let config = args.config();
    let reports: Vec<HarnessReport> = match args.peer.placement()? {
        Placement::Single { rank, peers } => {
            let transport = Transport::bind(rank, peers, args.peer.transport_options())
                .instrument(runner::peer_span(rank))
                .await
                .context("failed to join the mesh")?;
            vec![runner::run_alltoall(transport, &config).await?]
        }
        Placement::Local { count } => runner::run_local_alltoall(count, &config).await?,
    };

    for report in &reports {
        if args.peer.json {
            print_json(report)?;
            continue;
        }
        println!("{}", report.epoch_csv);
        println!(
            "rank {}: {} epochs, chunk {} bytes, median {:.6}s, {:.0} bytes/s",
            report.rank,
            report.summary.count,
            report.chunk_size,
            report.summary.median.as_secs_f64(),
            report.bandwidth
        );
    }
    Ok(())
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    let line = serde_json::to_string(report).context("failed to encode report")?;
    println!("{line}");
    Ok(())
}
