//! Browse a CSV history table in a native window.

use std::path::PathBuf;

use clap::Parser;
use histplot::config::time_to_sec;
use histplot::panel::set_query_params;
use histplot::{now, ChartParams, MemoryHistory, Target};

#[derive(Parser, Debug)]
#[command(version, about = "Interactive history chart over a CSV table")]
struct Args {
    /// Table whose first column is Unix time in seconds and whose other
    /// columns are variables named `Event:Tag` or `Event:Tag[index]`.
    csv: PathBuf,

    /// Panel document (JSON). Built from the other options when omitted.
    #[arg(long)]
    panel: Option<PathBuf>,

    /// Tunable chart parameters (JSON); unset fields keep their defaults.
    #[arg(long)]
    params: Option<PathBuf>,

    #[arg(long, default_value = "Local")]
    group: String,

    #[arg(long, default_value = "CSV")]
    name: String,

    /// Variables to plot, comma separated. Defaults to every column.
    #[arg(long, value_delimiter = ',')]
    variables: Vec<String>,

    #[arg(long, default_value = "1h")]
    timescale: String,

    /// Initial view as a page query, e.g. `A=1700000000&B=1700003600`.
    #[arg(long, default_value = "")]
    query: String,
}

fn main() -> histplot::Result<()> {
    let args = Args::parse();
    let mut service = MemoryHistory::from_csv_path(&args.csv)?;

    let config = match &args.panel {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => {
            let variables = if args.variables.is_empty() {
                service.keys().iter().map(|k| k.to_string()).collect()
            } else {
                args.variables.clone()
            };
            serde_json::json!({
                "Timescale": args.timescale,
                "Variables": variables,
            })
        }
    };
    service.insert_panel(&args.group, &args.name, config);

    let params: ChartParams = match &args.params {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => ChartParams::default(),
    };

    // a table older than the live window would open empty; show all of it
    let mut query = args.query.clone();
    if query.is_empty() {
        if let Some((first, last)) = service.extent() {
            let scale = time_to_sec(&args.timescale)?;
            if last < now() - scale {
                query = set_query_params(
                    "",
                    &[
                        ("A", Some(format!("{}", first.floor()))),
                        ("B", Some(format!("{}", last.ceil().max(first.floor() + 1.0)))),
                    ],
                );
            }
        }
    }

    let target = Target::Panel {
        group: args.group,
        panel: args.name,
    };
    histplot::run_native(service, vec![target], params, &query)
}
