//! Insight Studio: load a tabular dataset, filter its rows, and configure any
//! number of independent charts over the result.
//!
//! The pipeline is `data` (load → filter → aggregate), then `chart` (validated
//! config → declarative spec), orchestrated by `state`. `app` and `ui` render it
//! with egui.

pub mod app;
pub mod chart;
pub mod color;
pub mod data;
pub mod state;
pub mod ui;

pub use chart::config::{ChartConfig, ChartConfigFactory, ChartType, ConfigError};
pub use chart::spec::ChartSpec;
pub use data::aggregate::Aggregation;
pub use data::filter::FilterSpec;
pub use data::model::{CellValue, ColumnType, Table};
pub use state::{ChartId, ChartOrchestrator, Workspace, WorkspaceEvent};
