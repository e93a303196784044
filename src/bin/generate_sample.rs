//! Writes `sample_sales.csv` and `sample_sales.parquet`: three years of daily
//! orders, handy for trying the date and length split modes.

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Days, NaiveDate};

use csv2parquet::data::options::SaveOptions;
use csv2parquet::data::writer;
use csv2parquet::{FileKind, FileRef, Table};

/// Deterministic splitmix64 so repeated runs write identical files.
struct SampleRng(u64);

impl SampleRng {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut rng = SampleRng(42);
    let regions = ["North", "South", "East", "West"];
    let start = NaiveDate::from_ymd_opt(2021, 1, 1).context("start date")?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).context("epoch")?;

    let mut ids = Vec::new();
    let mut days = Vec::new();
    let mut region = Vec::new();
    let mut amount = Vec::new();

    for offset in 0..(3 * 365) {
        let day = start
            .checked_add_days(Days::new(offset))
            .context("date out of range")?;
        for _ in 0..rng.below(4) {
            ids.push(ids.len() as i64 + 1);
            days.push((day - epoch).num_days() as i32);
            region.push(regions[rng.below(regions.len() as u64) as usize]);
            amount.push(rng.below(100_000) as f64 / 100.0);
        }
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("order_id", DataType::Int64, false),
        Field::new("order_date", DataType::Date32, false),
        Field::new("region", DataType::Utf8, false),
        Field::new("amount", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(Date32Array::from(days)),
            Arc::new(StringArray::from(region)),
            Arc::new(Float64Array::from(amount)),
        ],
    )
    .context("building sample batch")?;
    let table = Table::new(batch);

    for output in [
        FileRef::new("sample_sales.csv", FileKind::Csv),
        FileRef::new("sample_sales.parquet", FileKind::Parquet),
    ] {
        writer::save(&table, &output, &SaveOptions::default())
            .with_context(|| format!("writing {}", output.path.display()))?;
        println!("Wrote {} orders to {}", table.num_rows(), output.path.display());
    }
    Ok(())
}
