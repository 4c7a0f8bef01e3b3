use std::collections::BTreeSet;

use approx::assert_relative_eq;
use insight_studio::chart::config::ChartConfigPatch;
use insight_studio::chart::spec::{self, BarMode, ChartSpec, EMPTY_LABEL};
use insight_studio::data::catalog::DatasetCatalog;
use insight_studio::data::loader::load_csv;
use insight_studio::state::{EventOutcome, WorkspaceError};
use insight_studio::{
    CellValue, ChartId, ChartOrchestrator, ChartType, ConfigError, FilterSpec, Table, WorkspaceEvent,
};
use proptest::prelude::*;

const SALES: &str = "\
date,region,product,units,revenue
2024-01-01 09:00:00,North,Widget,3,13.5
2024-01-01 09:00:00,South,Widget,5,22.5
2024-01-02 09:00:00,North,Gadget,2,24.0
2024-01-02 09:00:00,North,Widget,4,18.0
2024-01-03 09:00:00,East,Gadget,1,
2024-01-03 09:00:00,South,Gadget,6,72.0
";

fn sales() -> Table {
    load_csv(SALES.as_bytes()).unwrap()
}

fn add_chart(orch: &mut ChartOrchestrator) -> ChartId {
    match orch.dispatch(WorkspaceEvent::AddChart).unwrap() {
        EventOutcome::ChartAdded(id) => id,
        other => panic!("expected ChartAdded, got {other:?}"),
    }
}

fn patch(json: &str) -> ChartConfigPatch {
    serde_json::from_str(json).unwrap()
}

fn regions(values: &[&str]) -> FilterSpec {
    FilterSpec::new()
        .with_title_column(Some("region".into()))
        .with_title_values(values.iter().copied())
}

#[test]
fn default_chart_plots_first_column_against_first_numeric() {
    let mut orch = ChartOrchestrator::new(sales());
    let id = add_chart(&mut orch);

    let config = orch.workspace().chart(id).unwrap().config().clone();
    assert_eq!(config.chart_type, ChartType::Line);
    assert_eq!((config.x_axis.as_str(), config.y_axis.as_str()), ("date", "units"));
    assert_eq!(config.height, 480);

    let output = orch.output(id).unwrap().as_ref().unwrap();
    assert_eq!(output.data.num_rows(), 6);
    let ChartSpec::Plot(plot) = &output.spec else {
        panic!("expected a plot");
    };
    assert!(plot.markers);
}

#[test]
fn mean_by_region_skips_missing_revenue() {
    let mut orch = ChartOrchestrator::new(sales());
    let id = add_chart(&mut orch);
    orch.dispatch(WorkspaceEvent::UpdateChartConfig(
        id,
        patch(r#"{"chart_type": "Bar", "x_axis": "region", "y_axis": "revenue", "aggregation": "Mean"}"#),
    ))
    .unwrap();

    let output = orch.output(id).unwrap().as_ref().unwrap();
    let names: Vec<String> = output
        .data
        .column("region")
        .unwrap()
        .values()
        .iter()
        .map(|v| v.to_string())
        .collect();
    assert_eq!(names, vec!["East", "North", "South"]);

    let means = output.data.column("revenue").unwrap().values();
    assert_eq!(means[0], CellValue::Null);
    assert_relative_eq!(means[1].as_f64().unwrap(), 18.5);
    assert_relative_eq!(means[2].as_f64().unwrap(), 47.25);

    let ChartSpec::Plot(plot) = &output.spec else {
        panic!("expected a plot");
    };
    assert_eq!(plot.bar_mode, Some(BarMode::Group));
}

#[test]
fn local_filter_only_touches_its_chart() {
    let mut orch = ChartOrchestrator::new(sales());
    let a = add_chart(&mut orch);
    let b = add_chart(&mut orch);
    let a_before = orch.output(a).unwrap().clone();

    orch.dispatch(WorkspaceEvent::UpdateLocalFilter(b, Some(regions(&["South"]))))
        .unwrap();
    assert_eq!(orch.output(a).unwrap(), &a_before);
    assert_eq!(orch.output(b).unwrap().as_ref().unwrap().data.num_rows(), 2);

    orch.dispatch(WorkspaceEvent::UpdateLocalFilter(b, None)).unwrap();
    assert_eq!(orch.output(b).unwrap().as_ref().unwrap().data.num_rows(), 6);
}

#[test]
fn temporal_filter_includes_both_bounds() {
    let mut orch = ChartOrchestrator::new(sales());
    let id = add_chart(&mut orch);
    let table = orch.workspace().table().clone();
    let (start, _) = insight_studio::data::filter::default_range(&table, "date")
        .unwrap()
        .unwrap();
    let end = start + chrono::Duration::days(1) + chrono::Duration::hours(9);

    let spec = FilterSpec::new()
        .with_time_column(Some("date".into()))
        .with_range(Some(start), Some(end));
    orch.dispatch(WorkspaceEvent::UpdateGlobalFilter(spec)).unwrap();
    assert_eq!(orch.preview().total_rows, 4);
    assert_eq!(orch.output(id).unwrap().as_ref().unwrap().data.num_rows(), 4);
}

#[test]
fn filtering_everything_shows_placeholder_not_error() {
    let mut orch = ChartOrchestrator::new(sales());
    let id = add_chart(&mut orch);
    orch.dispatch(WorkspaceEvent::UpdateGlobalFilter(regions(&["Nowhere"])))
        .unwrap();

    let output = orch.output(id).unwrap().as_ref().unwrap();
    assert_eq!(
        output.spec,
        ChartSpec::Placeholder {
            label: EMPTY_LABEL.to_string(),
            height: 480
        }
    );
}

#[test]
fn heatmap_without_aggregation_counts_rows() {
    let mut orch = ChartOrchestrator::new(sales());
    let id = add_chart(&mut orch);
    orch.dispatch(WorkspaceEvent::UpdateChartConfig(
        id,
        patch(r#"{"chart_type": "heatmap", "x_axis": "region", "color_dimension": "product"}"#),
    ))
    .unwrap();

    let output = orch.output(id).unwrap().as_ref().unwrap();
    let ChartSpec::Plot(plot) = &output.spec else {
        panic!("expected a plot");
    };
    assert_eq!(plot.encodings.color, None);
    let cells = spec::heatmap_cells(&output.data, plot, 1).unwrap();
    let total: f64 = cells.iter().map(|c| c.intensity).sum();
    assert_relative_eq!(total, 6.0);

    let json = serde_json::to_value(&output.spec).unwrap();
    assert_eq!(json["kind"], "plot");
    assert_eq!(json["heatmap"]["color_scale"], "Viridis");
}

#[test]
fn invalid_patches_are_rejected_whole() {
    let mut orch = ChartOrchestrator::new(sales());
    let id = add_chart(&mut orch);
    let before = orch.workspace().chart(id).unwrap().clone();

    for (json, expected) in [
        (
            r#"{"chart_type": "Scatter"}"#,
            ConfigError::UnknownChartType("Scatter".into()),
        ),
        (
            r#"{"aggregation": "Median"}"#,
            ConfigError::UnknownAggregation("Median".into()),
        ),
        (r#"{"height": 100}"#, ConfigError::HeightOutOfRange(100)),
        (
            r#"{"y_axis": "product"}"#,
            ConfigError::NonNumericYAxis("product".into()),
        ),
    ] {
        let err = orch
            .dispatch(WorkspaceEvent::UpdateChartConfig(id, patch(json)))
            .unwrap_err();
        assert_eq!(err, WorkspaceError::Config(expected));
        assert_eq!(orch.workspace().chart(id).unwrap(), &before);
    }
}

#[test]
fn dataset_switch_through_catalog() {
    let mut catalog = DatasetCatalog::new();
    catalog.insert("sales.csv", sales()).unwrap();
    let second = load_csv("region,units\nNorth,1\nSouth,2\n".as_bytes()).unwrap();
    let second_name = catalog.insert("sales.csv", second).unwrap();
    assert_eq!(second_name, "sales (1).csv");

    let mut orch = ChartOrchestrator::new(catalog.select("sales.csv").unwrap().clone());
    let id = add_chart(&mut orch);
    orch.dispatch(WorkspaceEvent::UpdateGlobalFilter(regions(&["North"])))
        .unwrap();

    let next = catalog.select(&second_name).unwrap().clone();
    let EventOutcome::DatasetReplaced(report) = orch.dispatch(WorkspaceEvent::ReplaceDataset(next)).unwrap() else {
        panic!("expected DatasetReplaced");
    };
    assert!(report.global_filter_reset);
    assert_eq!(orch.preview().total_rows, 2);
    // The chart plotted `date`, which the new dataset lacks.
    assert_eq!(report.refitted_configs, vec![id]);
    assert_eq!(orch.workspace().chart(id).unwrap().config().x_axis, "region");
    assert_eq!(orch.output(id).unwrap().as_ref().unwrap().data.num_rows(), 2);

    orch.dispatch(WorkspaceEvent::UpdateChartConfig(
        id,
        patch(r#"{"chart_type": "Bar", "aggregation": "Sum"}"#),
    ))
    .unwrap();
    assert!(orch.output(id).unwrap().is_ok());
}

#[test]
fn chart_survives_swap_to_disjoint_schema() {
    let mut orch = ChartOrchestrator::new(sales());
    let id = add_chart(&mut orch);
    orch.dispatch(WorkspaceEvent::UpdateChartConfig(
        id,
        patch(r#"{"x_axis": "product", "y_axis": "revenue", "color_dimension": "region"}"#),
    ))
    .unwrap();

    let stores = load_csv("store,qty
A,1
B,2
A,3
".as_bytes()).unwrap();
    orch.dispatch(WorkspaceEvent::ReplaceDataset(stores)).unwrap();
    let config = orch.workspace().chart(id).unwrap().config().clone();
    assert_eq!((config.x_axis.as_str(), config.y_axis.as_str()), ("store", "qty"));
    assert_eq!(config.color_dimension, None);

    orch.dispatch(WorkspaceEvent::UpdateChartConfig(id, patch(r#"{"aggregation": "Sum"}"#)))
        .unwrap();
    let output = orch.output(id).unwrap().as_ref().unwrap();
    assert_eq!(output.data.column("qty").unwrap().values(), &[CellValue::Integer(4), CellValue::Integer(2)]);

    // A patch naming a missing column is still refused.
    let err = orch
        .dispatch(WorkspaceEvent::UpdateChartConfig(id, patch(r#"{"x_axis": "region"}"#)))
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::Config(ConfigError::UnknownColumn { field: "x_axis", .. })));
}

const REGIONS: [&str; 3] = ["East", "North", "South"];

fn arb_regions() -> impl Strategy<Value = Vec<&'static str>> {
    proptest::sample::subsequence(REGIONS.to_vec(), 0..=REGIONS.len())
}

proptest! {
    #[test]
    fn chart_rows_match_both_filters(global in arb_regions(), local in arb_regions()) {
        let mut orch = ChartOrchestrator::new(sales());
        let id = add_chart(&mut orch);
        orch.dispatch(WorkspaceEvent::UpdateGlobalFilter(regions(&global))).unwrap();
        orch.dispatch(WorkspaceEvent::UpdateLocalFilter(id, Some(regions(&local)))).unwrap();

        // An empty selection leaves that filter inactive.
        let allowed = |set: &[&str], region: &str| set.is_empty() || set.contains(&region);
        let table = sales();
        let expected = table
            .column("region")
            .unwrap()
            .values()
            .iter()
            .filter(|v| {
                let r = v.to_string();
                allowed(&global, &r) && allowed(&local, &r)
            })
            .count();

        let output = orch.output(id).unwrap().as_ref().unwrap();
        prop_assert_eq!(output.data.num_rows(), expected);
        let seen: BTreeSet<String> = output
            .data
            .column("region")
            .unwrap()
            .values()
            .iter()
            .map(|v| v.to_string())
            .collect();
        for region in seen {
            prop_assert!(allowed(&global, &region) && allowed(&local, &region));
        }
    }
}
