//! Command-line harness for the mixer library — wires a single local
//! RocksDB-backed row-store instance plus an empty overlay into a
//! [`StoreFacade`] and runs one request handler against it.

use clap::{Parser, Subcommand};
use comfy_table::Table;
use mixer::dcid::Dcid;
use mixer::handlers::{self, PlaceStatVarsRequest, PropertyLabelsRequest, StatValueRequest};
use mixer::rank::RankFilter;
use mixer::store::{InstanceKind, OverlayCache, RocksDbRowStore, RowStoreInstance, StoreFacade};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mixer-cli", version, about = "Mixer federated query service CLI")]
struct Cli {
    /// Path to the local RocksDB row-store instance to read from.
    #[arg(long, default_value = "./data", env = "MIXER_DB_PATH")]
    db_path: String,

    /// Output format.
    #[arg(long, default_value = "table")]
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
    /// Fetch a place's property in/out labels.
    PropertyLabels { dcid: String },
    /// Fetch the list of stat-vars observed for a place.
    PlaceStatVars { dcid: String },
    /// Fetch the best-ranked observation for (place, stat-var[, date]).
    StatValue {
        place: String,
        stat_var: String,
        #[arg(long)]
        date: Option<String>,
    },
    /// Print the crate version.
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let result = run(&cli).await;
    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::Version = cli.command {
        println!("mixer {}", mixer::version());
        return Ok(());
    }

    let store = RocksDbRowStore::open(&cli.db_path)?;
    let instance = RowStoreInstance {
        name: "local".to_string(),
        kind: InstanceKind::Custom,
        client: Arc::new(store),
    };
    let overlay = Arc::new(OverlayCache::new());
    let facade = StoreFacade::new(overlay, vec![instance]);

    match &cli.command {
        Commands::PropertyLabels { dcid } => {
            let dcid = Dcid::parse(dcid.clone())?;
            let resp = handlers::property_labels(&facade, PropertyLabelsRequest { dcids: vec![dcid.clone()] }).await?;
            let labels = resp.labels.get(&dcid).cloned().unwrap_or_default();
            print_rows(
                &cli.format,
                vec!["in_labels".to_string(), "out_labels".to_string()],
                vec![vec![format!("{:?}", labels.in_labels), format!("{:?}", labels.out_labels)]],
            );
        }
        Commands::PlaceStatVars { dcid } => {
            let dcid = Dcid::parse(dcid.clone())?;
            let resp = handlers::place_stat_vars(&facade, PlaceStatVarsRequest { dcids: vec![dcid.clone()] }).await?;
            let svs = resp.stat_vars.get(&dcid).cloned().unwrap_or_default();
            print_rows(
                &cli.format,
                vec!["stat_var".to_string()],
                svs.into_iter().map(|sv| vec![sv.to_string()]).collect(),
            );
        }
        Commands::StatValue { place, stat_var, date } => {
            let place = Dcid::parse(place.clone())?;
            let stat_var = Dcid::parse(stat_var.clone())?;
            let resp = handlers::stat_value(
                &facade,
                StatValueRequest {
                    place,
                    stat_var,
                    date: date.clone(),
                    filter: RankFilter::default(),
                },
            )
            .await?;
            print_rows(
                &cli.format,
                vec!["date".to_string(), "value".to_string()],
                vec![vec![resp.date, resp.value.to_string()]],
            );
        }
        Commands::Version => unreachable!(),
    }
    Ok(())
}

fn print_rows(format: &OutputFormat, header: Vec<String>, rows: Vec<Vec<String>>) {
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({ "columns": header, "rows": rows });
            println!("{}", serde_json::to_string_pretty(&json).unwrap());
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_header(header);
            for row in rows {
                table.add_row(row);
            }
            println!("{table}");
        }
    }
}
