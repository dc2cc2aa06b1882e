//! Read-only command line access to the node's database.

use std::path::PathBuf;

use anyhow::{bail, Context};
use argh::FromArgs;

use rollups_db::traits::Repository;
use rollups_primitives::Buf20;
use rollups_rocksdb::{open_rocksdb_database, NodeDb};

#[derive(Debug, FromArgs)]
#[argh(description = "Reads rollups node state")]
struct Args {
    #[argh(
        option,
        short = 'd',
        description = "datadir containing the node database",
        default = "PathBuf::from(\"rollups-data\")"
    )]
    datadir: PathBuf,

    #[argh(subcommand)]
    command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Read(ReadCmd),
}

#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "read", description = "read entities from the database")]
struct ReadCmd {
    #[argh(subcommand)]
    target: ReadTarget,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum ReadTarget {
    Inputs(InputsCmd),
    Reports(ReportsCmd),
}

#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "inputs", description = "reads inputs ordered by index")]
struct InputsCmd {
    #[argh(option, short = 'a', description = "application address")]
    application: String,

    #[argh(option, description = "index of the input")]
    index: Option<u64>,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "reports", description = "reads reports ordered by index")]
struct ReportsCmd {
    #[argh(option, short = 'a', description = "application address")]
    application: String,

    #[argh(option, description = "only reports of the input with this index")]
    input_index: Option<u64>,

    #[argh(option, description = "only the report with this index")]
    report_index: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    let rbdb = open_rocksdb_database(&args.datadir)?;
    let db = NodeDb::new(rbdb);

    let Command::Read(read) = args.command;
    let rendered = match read.target {
        ReadTarget::Inputs(cmd) => {
            let app = parse_app(&cmd.application)?;
            match cmd.index {
                Some(index) => {
                    let input = db
                        .get_input(app, index)?
                        .with_context(|| format!("no input with index {index}"))?;
                    serde_json::to_string_pretty(&input)?
                }
                None => serde_json::to_string_pretty(&db.get_inputs(app)?)?,
            }
        }
        ReadTarget::Reports(cmd) => {
            if cmd.input_index.is_some() && cmd.report_index.is_some() {
                bail!("--input-index and --report-index are mutually exclusive");
            }
            let app = parse_app(&cmd.application)?;
            match cmd.report_index {
                Some(index) => {
                    let report = db
                        .get_report(app, index)?
                        .with_context(|| format!("no report with index {index}"))?;
                    serde_json::to_string_pretty(&report)?
                }
                None => serde_json::to_string_pretty(&db.get_reports(app, cmd.input_index)?)?,
            }
        }
    };

    println!("{rendered}");
    Ok(())
}

fn parse_app(raw: &str) -> anyhow::Result<Buf20> {
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid application address `{raw}`: {e}"))
}
