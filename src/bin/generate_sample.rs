//! Writes `sample_sales.csv` and `sample_sales.parquet` with the same synthetic
//! daily sales rows, for trying the explorer without real data.

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{BooleanArray, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use parquet::arrow::ArrowWriter;

const DAYS: i64 = 120;
const REGIONS: [&str; 4] = ["North", "South", "East", "West"];
const PRODUCTS: [(&str, f64); 5] = [
    ("Widget", 4.5),
    ("Gadget", 12.0),
    ("Gizmo", 7.25),
    ("Doohickey", 2.1),
    ("Thingamajig", 19.9),
];
const CHANNELS: [&str; 2] = ["Online", "Retail"];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

struct SaleRow {
    date: NaiveDateTime,
    region: &'static str,
    product: &'static str,
    channel: &'static str,
    units: i64,
    /// Missing for roughly 2% of rows.
    revenue: Option<f64>,
    returned: bool,
}

fn generate_rows(rng: &mut SimpleRng) -> Result<Vec<SaleRow>> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .context("invalid start date")?;

    let mut rows = Vec::new();
    for day in 0..DAYS {
        let date = start + Duration::days(day);
        // Mild weekly seasonality.
        let season = 1.0 + 0.25 * (2.0 * std::f64::consts::PI * day as f64 / 7.0).sin();
        for (r, &region) in REGIONS.iter().enumerate() {
            for &(product, price) in &PRODUCTS {
                let channel = CHANNELS[(rng.next_u64() % CHANNELS.len() as u64) as usize];
                let base = 20.0 + 5.0 * r as f64;
                let units = rng.gauss(base * season, 4.0).round().max(0.0) as i64;
                let revenue = (rng.next_f64() >= 0.02).then(|| {
                    let discount = 1.0 - 0.1 * rng.next_f64();
                    (units as f64 * price * discount * 100.0).round() / 100.0
                });
                rows.push(SaleRow {
                    date,
                    region,
                    product,
                    channel,
                    units,
                    revenue,
                    returned: rng.next_f64() < 0.05,
                });
            }
        }
    }
    Ok(rows)
}

fn write_csv(path: &str, rows: &[SaleRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {path}"))?;
    writer.write_record(["date", "region", "product", "channel", "units", "revenue", "returned"])?;
    for row in rows {
        writer.write_record([
            row.date.format("%Y-%m-%d %H:%M:%S").to_string(),
            row.region.to_string(),
            row.product.to_string(),
            row.channel.to_string(),
            row.units.to_string(),
            row.revenue.map(|r| r.to_string()).unwrap_or_default(),
            row.returned.to_string(),
        ])?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

fn write_parquet(path: &str, rows: &[SaleRow]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("date", DataType::Timestamp(TimeUnit::Microsecond, None), false),
        Field::new("region", DataType::Utf8, false),
        Field::new("product", DataType::Utf8, false),
        Field::new("channel", DataType::Utf8, false),
        Field::new("units", DataType::Int64, false),
        Field::new("revenue", DataType::Float64, true),
        Field::new("returned", DataType::Boolean, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(TimestampMicrosecondArray::from(
                rows.iter()
                    .map(|r| r.date.and_utc().timestamp_micros())
                    .collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(rows.iter().map(|r| r.region).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.product).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.channel).collect::<Vec<_>>())),
            Arc::new(Int64Array::from(rows.iter().map(|r| r.units).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.revenue).collect::<Vec<_>>())),
            Arc::new(BooleanArray::from(rows.iter().map(|r| r.returned).collect::<Vec<_>>())),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {path}"))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);
    let rows = generate_rows(&mut rng)?;

    write_csv("sample_sales.csv", &rows)?;
    write_parquet("sample_sales.parquet", &rows)?;

    println!(
        "Wrote {} rows ({} days x {} regions x {} products) to sample_sales.csv and sample_sales.parquet",
        rows.len(),
        DAYS,
        REGIONS.len(),
        PRODUCTS.len()
    );
    Ok(())
}
