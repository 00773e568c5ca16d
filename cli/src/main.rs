//! Command-line interface for the grantgraph relationship network
//!
//! Works against a snapshot file: `ingest` loads filings into it, every other
//! command reads it and answers one question.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use grantgraph::export::{write_graphml, write_json};
use grantgraph::{ExportFormat, GrantNetwork, GraphFilter, NetworkConfig, NodeKey, OrgId};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "grantgraph", version, about = "Funder, grantee and board-member network analytics")]
struct Cli {
    /// Snapshot file holding the network
    #[arg(long, default_value = "grantgraph.snapshot", global = true, env = "GRANTGRAPH_SNAPSHOT")]
    snapshot: PathBuf,

    /// YAML configuration file
    #[arg(long, global = true, env = "GRANTGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a JSON array of role, grant and organization records
    Ingest {
        /// Record file
        records: PathBuf,
    },
    /// Node and edge counts, density and top connectors
    Stats,
    /// Recipients shared by several funders
    Bundle {
        /// Funder id (repeatable)
        #[arg(long = "funder", required = true)]
        funders: Vec<String>,

        #[arg(long, default_value_t = 2)]
        min_funders: usize,

        /// Tax year (repeatable); all years when omitted
        #[arg(long = "year")]
        years: Vec<i32>,
    },
    /// Funder similarity and peer groups
    Similarity {
        /// Funder id (repeatable); every funder when omitted
        #[arg(long = "funder")]
        funders: Vec<String>,

        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Strongest introduction paths between two nodes
    Paths {
        /// Source node (`org:<id>` or `person:<n>`)
        source: String,
        /// Target node
        target: String,

        #[arg(long, default_value_t = 3)]
        max_hops: usize,

        /// Drop paths made only of grant edges
        #[arg(long)]
        require_role_hop: bool,
    },
    /// Influence score of one node
    Influence {
        node: String,
    },
    /// Export the network
    Export {
        /// graphml or json
        #[arg(long = "as", default_value = "graphml")]
        export_format: String,

        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<NetworkConfig> {
    match path {
        Some(path) => NetworkConfig::from_file(path).with_context(|| format!("loading {}", path.display())),
        None => NetworkConfig::from_env().context("reading GRANTGRAPH_* overrides"),
    }
}

async fn open_network(snapshot: &Path, config: NetworkConfig) -> Result<GrantNetwork> {
    if snapshot.exists() {
        GrantNetwork::open(snapshot, config)
            .await
            .with_context(|| format!("opening snapshot {}", snapshot.display()))
    } else {
        info!("No snapshot at {}, starting empty", snapshot.display());
        Ok(GrantNetwork::new(config))
    }
}

fn org_ids(ids: &[String]) -> Vec<OrgId> {
    ids.iter().map(|id| OrgId::new(id.as_str())).collect()
}

fn parse_node(s: &str) -> Result<NodeKey> {
    s.parse::<NodeKey>().map_err(anyhow::Error::msg)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header.to_vec());
    table
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let network = open_network(&cli.snapshot, config).await?;
    let format = &cli.format;

    match cli.command {
        Commands::Ingest { records } => {
            let json = std::fs::read_to_string(&records).with_context(|| format!("reading {}", records.display()))?;
            let summary = network.ingest_json(&json).await?;
            network.save_snapshot(&cli.snapshot).await?;
            match format {
                OutputFormat::Json => print_json(&summary)?,
                OutputFormat::Table => {
                    let mut t = table(&["", "inserted", "updated", "unchanged"]);
                    t.add_row(vec![
                        "roles".to_string(),
                        summary.roles_inserted.to_string(),
                        summary.roles_updated.to_string(),
                        summary.roles_unchanged.to_string(),
                    ]);
                    t.add_row(vec![
                        "grants".to_string(),
                        summary.grants_inserted.to_string(),
                        summary.grants_updated.to_string(),
                        summary.grants_unchanged.to_string(),
                    ]);
                    println!("{}", t);
                    println!(
                        "{} records, {} persons created, {} merged, {} ambiguous, {} errors",
                        summary.records,
                        summary.persons_created,
                        summary.persons_merged,
                        summary.ambiguous_matches,
                        summary.errors
                    );
                    for example in summary.error_examples.iter().chain(&summary.ambiguous_examples) {
                        println!("  {}", example);
                    }
                }
            }
        }
        Commands::Stats => {
            let stats = network.stats().await;
            match format {
                OutputFormat::Json => print_json(&stats)?,
                OutputFormat::Table => {
                    println!("Nodes:   {}", stats.node_count);
                    println!("Edges:   {}", stats.edge_count);
                    println!("Density: {:.6}", stats.density);
                    let mut t = table(&["person", "name", "organizations"]);
                    for c in &stats.top_connectors {
                        t.add_row(vec![c.person.0.to_string(), c.name.clone(), c.organizations.to_string()]);
                    }
                    println!("{}", t);
                }
            }
        }
        Commands::Bundle { funders, min_funders, years } => {
            let years = (!years.is_empty()).then_some(years);
            let result = network.bundle(&org_ids(&funders), min_funders, years.as_deref()).await?;
            match format {
                OutputFormat::Json => print_json(&result)?,
                OutputFormat::Table => {
                    let mut t = table(&["recipient", "name", "funders", "total"]);
                    for g in &result.grantees {
                        t.add_row(vec![
                            g.recipient.to_string(),
                            g.name.clone(),
                            g.funder_count.to_string(),
                            format!("{:.2}", g.total_funding),
                        ]);
                    }
                    println!("{}", t);
                    println!("{} grantee(s)", result.grantees.len());
                }
            }
        }
        Commands::Similarity { funders, threshold } => {
            let report = network.similarity(&org_ids(&funders), threshold).await?;
            match format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Table => {
                    let mut t = table(&["funder a", "funder b", "shared", "recent", "jaccard", "score"]);
                    for e in &report.graph.edges {
                        t.add_row(vec![
                            e.a.to_string(),
                            e.b.to_string(),
                            e.shared_recipients.to_string(),
                            e.recent_shared.to_string(),
                            format!("{:.3}", e.jaccard),
                            format!("{:.3}", e.score),
                        ]);
                    }
                    println!("{}", t);
                    for group in &report.peer_groups {
                        let members: Vec<String> = group.funders.iter().map(ToString::to_string).collect();
                        println!("Peer group {} (mean {:.3}): {}", group.id, group.mean_similarity, members.join(", "));
                    }
                    println!("Modularity: {:.4}", report.modularity);
                }
            }
        }
        Commands::Paths { source, target, max_hops, require_role_hop } => {
            let (source, target) = (parse_node(&source)?, parse_node(&target)?);
            let handle = network.build_graph(&GraphFilter::default()).await;
            let search = network
                .find_paths(&handle, &source, &target, Some(max_hops), require_role_hop)
                .await?;
            match format {
                OutputFormat::Json => print_json(&search)?,
                OutputFormat::Table => {
                    let mut t = table(&["strength", "hops", "strategy", "path"]);
                    for p in &search.paths {
                        t.add_row(vec![
                            format!("{:.3}", p.strength),
                            p.hop_count().to_string(),
                            p.strategy.to_string(),
                            p.description.clone(),
                        ]);
                    }
                    println!("{}", t);
                    if search.truncated {
                        println!("(search truncated after {} paths)", search.enumerated);
                    }
                }
            }
        }
        Commands::Influence { node } => {
            let key = parse_node(&node)?;
            network.recompute().await;
            let report = network.influence(&key).await?;
            match format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Table => {
                    let flag = if report.degraded { " (degraded)" } else { "" };
                    println!("{}: {:.2}{}", report.key, report.influence_score, flag);
                    println!("{}", serde_json::to_string_pretty(&report.metrics)?);
                }
            }
        }
        Commands::Export { export_format, output } => {
            let Some(export_format) = ExportFormat::from_name(&export_format) else {
                bail!("unknown export format {:?}, expected graphml or json", export_format);
            };
            network.recompute().await;
            let handle = network.build_graph(&GraphFilter::default()).await;
            let metrics = network.metrics().read();
            let mut writer: Box<dyn Write> = match &output {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path).with_context(|| format!("creating {}", path.display()))?,
                )),
                None => Box::new(std::io::stdout().lock()),
            };
            match export_format {
                ExportFormat::GraphMl => write_graphml(handle.network(), Some(&metrics), &mut writer)?,
                ExportFormat::Json => write_json(handle.network(), Some(&metrics), &mut writer)?,
            }
            writer.flush()?;
        }
    }

    Ok(())
}
