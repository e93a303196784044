//! csv2parquet command line
//!
//! ```bash
//! csv2parquet convert sales.csv                       # → sales.parquet
//! csv2parquet convert sales.parquet -o sales.csv.gz   # → gzipped CSV
//! csv2parquet convert sales.csv --split length --split-by 4
//! csv2parquet convert sales.csv --split date --split-by Yearly --date-col day
//! csv2parquet preview sales.parquet --rows 10
//! ```
//!
//! Set `RUST_LOG=info` (or `debug`) to see what is read and written.

use std::process;

use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;

use csv2parquet::cli::{self, Command, ConvertArgs, PreviewArgs};
use csv2parquet::data::loader;
use csv2parquet::ReadOptions;

fn main() {
    env_logger::init();

    let args = cli::parse_args();
    let result = match &args.command {
        Command::Convert(args) => run_convert(args),
        Command::Preview(args) => run_preview(args),
    };

    if let Err(e) = result {
        log::error!("{e:#}");
        eprintln!("Error converting file:\n{e:#}");
        process::exit(1);
    }
}

fn run_convert(args: &ConvertArgs) -> Result<()> {
    let conversion = args.to_conversion()?;
    log::info!(
        "Converting {} ({}) to {} ({})",
        conversion.input.path.display(),
        conversion.input.kind,
        conversion.output.path.display(),
        conversion.output.kind
    );

    let report = conversion.convert()?;
    println!("File converted successfully:");
    for output in &report.outputs {
        println!("  {} ({} rows)", output.path.display(), output.rows);
    }
    Ok(())
}

fn run_preview(args: &PreviewArgs) -> Result<()> {
    let input = args.input()?;
    let mut options = ReadOptions::default();
    if let Some(encoding) = &args.encoding {
        options.encoding = encoding.clone();
    }

    let table = loader::preview(&input, &options, args.rows)?;
    let rendered = pretty_format_batches(&[table.batch().clone()])
        .context("formatting preview table")?;
    println!("{rendered}");
    println!(
        "{} rows shown, columns: {}",
        table.num_rows(),
        table.column_names().join(", ")
    );
    Ok(())
}
