/// Data layer: typed tables, loading, filtering and aggregation.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Table (one type per column)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  catalog  │  named datasets, one active
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  categorical + temporal predicates → filtered Table
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ aggregate  │  group by chart dimensions → reduced Table
///   └───────────┘
/// ```

pub mod aggregate;
pub mod catalog;
pub mod filter;
pub mod loader;
pub mod model;
pub mod timestamp;
