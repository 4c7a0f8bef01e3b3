use std::fmt;
use std::time::Instant;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::chart::config::{ChartConfig, ChartConfigFactory, ChartConfigPatch, ConfigError, RawChartConfig};
use crate::chart::spec::{self, ChartSpec};
use crate::data::aggregate::aggregate;
use crate::data::filter::{self, FilterError, FilterReport, FilterSpec};
use crate::data::model::Table;

/// Rows of the globally filtered table shown in the preview grid.
pub const PREVIEW_ROWS: usize = 50;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("no chart with id {0}")]
    UnknownChart(ChartId),

    #[error("no numeric columns found for charting")]
    NoNumericColumns,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Why one chart could not be computed. Other charts are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

// ---------------------------------------------------------------------------
// Chart instances
// ---------------------------------------------------------------------------

/// Stable chart identity. Assigned once, never reused within a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChartId(u64);

impl fmt::Display for ChartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chart-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartInstance {
    id: ChartId,
    config: ChartConfig,
    local_filter: Option<FilterSpec>,
}

impl ChartInstance {
    pub fn id(&self) -> ChartId {
        self.id
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn local_filter(&self) -> Option<&FilterSpec> {
        self.local_filter.as_ref()
    }
}

/// Column lists for populating pickers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnOptions {
    pub all: Vec<String>,
    pub numeric: Vec<String>,
}

/// What a dataset swap did to existing filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetSwapReport {
    pub global_filter_reset: bool,
    /// Charts whose local filter named a column the new dataset lacks.
    pub cleared_local_filters: Vec<ChartId>,
    /// Charts whose config was refitted to the new columns.
    pub refitted_configs: Vec<ChartId>,
}

// ---------------------------------------------------------------------------
// Workspace – the live state
// ---------------------------------------------------------------------------

/// One active table, one global filter and the charts built on them.
///
/// Every mutating method validates first and changes nothing on error.
#[derive(Debug, Clone)]
pub struct Workspace {
    table: Table,
    factory: ChartConfigFactory,
    global_filter: FilterSpec,
    charts: IndexMap<ChartId, ChartInstance>,
    next_id: u64,
}

impl Workspace {
    pub fn new(table: Table) -> Self {
        if table.numeric_column_names().is_empty() {
            log::warn!("dataset has no numeric columns; charts cannot be added");
        }
        Self {
            factory: ChartConfigFactory::for_table(&table),
            table,
            global_filter: FilterSpec::default(),
            charts: IndexMap::new(),
            next_id: 1,
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn factory(&self) -> &ChartConfigFactory {
        &self.factory
    }

    pub fn global_filter(&self) -> &FilterSpec {
        &self.global_filter
    }

    /// Charts in display order.
    pub fn charts(&self) -> impl Iterator<Item = &ChartInstance> {
        self.charts.values()
    }

    pub fn chart(&self, id: ChartId) -> Option<&ChartInstance> {
        self.charts.get(&id)
    }

    pub fn chart_ids(&self) -> Vec<ChartId> {
        self.charts.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    pub fn column_options(&self) -> ColumnOptions {
        ColumnOptions {
            all: self.table.column_names(),
            numeric: self.table.numeric_column_names(),
        }
    }

    /// Append a chart with the default config.
    pub fn add_chart(&mut self) -> Result<ChartId, WorkspaceError> {
        let config = self.factory.default_config().map_err(|err| match err {
            ConfigError::NoNumericColumns => WorkspaceError::NoNumericColumns,
            other => WorkspaceError::Config(other),
        })?;
        let id = ChartId(self.next_id);
        self.next_id += 1;
        self.charts.insert(
            id,
            ChartInstance {
                id,
                config,
                local_filter: None,
            },
        );
        log::info!("added {id}");
        Ok(id)
    }

    /// Remove a chart; the others keep their ids and relative order.
    pub fn remove_chart(&mut self, id: ChartId) -> Result<ChartInstance, WorkspaceError> {
        let removed = self
            .charts
            .shift_remove(&id)
            .ok_or(WorkspaceError::UnknownChart(id))?;
        log::info!("removed {id}");
        Ok(removed)
    }

    pub fn update_chart_config(
        &mut self,
        id: ChartId,
        patch: &ChartConfigPatch,
    ) -> Result<(), WorkspaceError> {
        let instance = self
            .charts
            .get_mut(&id)
            .ok_or(WorkspaceError::UnknownChart(id))?;
        let config = self.factory.validate(&patch.apply_to(&instance.config))?;
        instance.config = config;
        Ok(())
    }

    pub fn update_global_filter(&mut self, spec: FilterSpec) -> Result<(), WorkspaceError> {
        self.check_filter_columns(&spec)?;
        self.global_filter = spec;
        Ok(())
    }

    /// Set or clear (`None`) a chart's own filter.
    pub fn update_local_filter(
        &mut self,
        id: ChartId,
        spec: Option<FilterSpec>,
    ) -> Result<(), WorkspaceError> {
        if let Some(spec) = &spec {
            self.check_filter_columns(spec)?;
        }
        let instance = self
            .charts
            .get_mut(&id)
            .ok_or(WorkspaceError::UnknownChart(id))?;
        instance.local_filter = spec;
        Ok(())
    }

    /// Swap in a new dataset.
    ///
    /// The global filter is reset. Local filters naming a column the new table
    /// lacks are cleared, and configs naming one are refitted with
    /// [`ChartConfigFactory::reconcile`]. Both are reported per chart.
    pub fn replace_dataset(&mut self, table: Table) -> DatasetSwapReport {
        let mut report = DatasetSwapReport {
            global_filter_reset: self.global_filter != FilterSpec::default(),
            ..DatasetSwapReport::default()
        };
        let factory = ChartConfigFactory::for_table(&table);
        for instance in self.charts.values_mut() {
            if let Some(fitted) = factory.reconcile(&instance.config) {
                log::info!("{}: config refitted to the new dataset", instance.id);
                instance.config = fitted;
                report.refitted_configs.push(instance.id);
            }
            let stale = instance
                .local_filter
                .as_ref()
                .is_some_and(|f| f.referenced_columns().any(|c| !table.has_column(c)));
            if stale {
                log::warn!("{}: local filter cleared, its column is not in the new dataset", instance.id);
                instance.local_filter = None;
                report.cleared_local_filters.push(instance.id);
            }
        }
        log::info!(
            "dataset replaced: {} rows x {} columns",
            table.num_rows(),
            table.num_columns()
        );
        self.factory = factory;
        self.global_filter = FilterSpec::default();
        self.table = table;
        report
    }

    fn check_filter_columns(&self, spec: &FilterSpec) -> Result<(), FilterError> {
        match spec.referenced_columns().find(|c| !self.table.has_column(c)) {
            Some(missing) => Err(FilterError::UnknownColumn(missing.to_string())),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Recomputation – the one path that produces chart data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ChartOutput {
    pub data: Table,
    pub spec: ChartSpec,
    /// Coercion diagnostics of the chart's local filter.
    pub filter_report: FilterReport,
}

pub type ChartOutcome = Result<ChartOutput, ChartError>;

/// Head of the globally filtered table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preview {
    pub columns: Vec<String>,
    pub rows: Table,
    /// Row count of the full globally filtered table.
    pub total_rows: usize,
}

impl Preview {
    fn of(table: &Table) -> Self {
        Self {
            columns: table.column_names(),
            rows: table.head(PREVIEW_ROWS),
            total_rows: table.num_rows(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recomputation {
    /// The globally filtered table every chart starts from.
    pub base: Table,
    pub base_report: FilterReport,
    pub preview: Preview,
    pub charts: IndexMap<ChartId, ChartOutcome>,
}

/// Filter, aggregate and derive a spec for every chart.
pub fn recompute(workspace: &Workspace) -> Recomputation {
    let started = Instant::now();
    let (base, base_report) = match filter::apply_with_report(&workspace.table, &workspace.global_filter) {
        Ok(result) => result,
        Err(err) => {
            log::warn!("global filter failed: {err}");
            let charts = workspace
                .charts
                .keys()
                .map(|id| (*id, Err(ChartError::Filter(err.clone()))))
                .collect();
            return Recomputation {
                base: Table::default(),
                base_report: FilterReport::default(),
                preview: Preview::default(),
                charts,
            };
        }
    };
    let charts = workspace
        .charts
        .values()
        .map(|instance| (instance.id, compute_chart(&base, instance, &workspace.factory)))
        .collect();
    log::debug!(
        "recomputed {} chart(s) over {} row(s) in {:?}",
        workspace.len(),
        base.num_rows(),
        started.elapsed()
    );
    Recomputation {
        preview: Preview::of(&base),
        base,
        base_report,
        charts,
    }
}

/// Compute one chart from the globally filtered table.
pub fn compute_chart(
    base: &Table,
    instance: &ChartInstance,
    factory: &ChartConfigFactory,
) -> ChartOutcome {
    let config = factory.validate(&RawChartConfig::from(&instance.config))?;
    let (filtered, filter_report) = match &instance.local_filter {
        Some(local) => filter::apply_with_report(base, local)?,
        None => (base.clone(), FilterReport::default()),
    };
    let data = aggregate(&filtered, &config)?;
    let spec = spec::derive(&data, &config);
    Ok(ChartOutput {
        data,
        spec,
        filter_report,
    })
}

// ---------------------------------------------------------------------------
// Orchestrator – event dispatch over a workspace
// ---------------------------------------------------------------------------

/// One external input.
#[derive(Debug, Clone)]
pub enum WorkspaceEvent {
    AddChart,
    RemoveChart(ChartId),
    UpdateChartConfig(ChartId, ChartConfigPatch),
    UpdateGlobalFilter(FilterSpec),
    UpdateLocalFilter(ChartId, Option<FilterSpec>),
    ReplaceDataset(Table),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    ChartAdded(ChartId),
    ChartRemoved(ChartId),
    Updated,
    DatasetReplaced(DatasetSwapReport),
}

/// Owns a [`Workspace`] and the outputs derived from it.
///
/// Events are applied one at a time; each is followed by the recomputation it
/// needs before `dispatch` returns. A rejected event leaves workspace and
/// outputs exactly as they were.
pub struct ChartOrchestrator {
    workspace: Workspace,
    outputs: Recomputation,
}

impl ChartOrchestrator {
    pub fn new(table: Table) -> Self {
        let workspace = Workspace::new(table);
        let outputs = recompute(&workspace);
        Self { workspace, outputs }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn preview(&self) -> &Preview {
        &self.outputs.preview
    }

    pub fn base_report(&self) -> FilterReport {
        self.outputs.base_report
    }

    /// Outputs in display order.
    pub fn outputs(&self) -> &IndexMap<ChartId, ChartOutcome> {
        &self.outputs.charts
    }

    pub fn output(&self, id: ChartId) -> Option<&ChartOutcome> {
        self.outputs.charts.get(&id)
    }

    pub fn dispatch(&mut self, event: WorkspaceEvent) -> Result<EventOutcome, WorkspaceError> {
        let result = self.apply(event);
        if let Err(err) = &result {
            log::warn!("rejected update: {err}");
        }
        result
    }

    fn apply(&mut self, event: WorkspaceEvent) -> Result<EventOutcome, WorkspaceError> {
        match event {
            WorkspaceEvent::AddChart => {
                let id = self.workspace.add_chart()?;
                self.refresh_chart(id);
                Ok(EventOutcome::ChartAdded(id))
            }
            WorkspaceEvent::RemoveChart(id) => {
                self.workspace.remove_chart(id)?;
                self.outputs.charts.shift_remove(&id);
                Ok(EventOutcome::ChartRemoved(id))
            }
            WorkspaceEvent::UpdateChartConfig(id, patch) => {
                self.workspace.update_chart_config(id, &patch)?;
                self.refresh_chart(id);
                Ok(EventOutcome::Updated)
            }
            WorkspaceEvent::UpdateLocalFilter(id, spec) => {
                self.workspace.update_local_filter(id, spec)?;
                self.refresh_chart(id);
                Ok(EventOutcome::Updated)
            }
            WorkspaceEvent::UpdateGlobalFilter(spec) => {
                self.workspace.update_global_filter(spec)?;
                self.outputs = recompute(&self.workspace);
                Ok(EventOutcome::Updated)
            }
            WorkspaceEvent::ReplaceDataset(table) => {
                let report = self.workspace.replace_dataset(table);
                self.outputs = recompute(&self.workspace);
                Ok(EventOutcome::DatasetReplaced(report))
            }
        }
    }

    /// Recompute a single chart against the cached globally filtered table.
    fn refresh_chart(&mut self, id: ChartId) {
        let Some(instance) = self.workspace.chart(id) else {
            return;
        };
        let outcome = compute_chart(&self.outputs.base, instance, self.workspace.factory());
        if let Err(err) = &outcome {
            log::debug!("{id}: {err}");
        }
        self.outputs.charts.insert(id, outcome);
    }
}
