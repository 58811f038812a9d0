use std::fmt::Display;

use anyhow::Result;
use chrono::{Local, TimeZone};
use clap::Parser;
use serde::Serialize;
use tracing::warn;

use crate::{
    engine::{
        aggregate,
        bucketing::Interval,
        heatmap::IntensityTier,
        reduction::{effective_operator, Operator},
        ProcessedPoint,
    },
    storage::{database::TrackerStore, entities::TrackerKind},
};

use super::{heatmap::paint_tier, trackers::require_tracker};

const BAR_WIDTH: f64 = 40.;

#[derive(Debug, Parser)]
pub struct ChartCommand {
    tracker_id: String,
    #[arg(long, short, default_value_t = Interval::Raw)]
    interval: Interval,
    #[arg(
        long,
        short,
        help = "How buckets of value trackers are reduced. Defaults to sum for daily and average for longer intervals. Events are always counted"
    )]
    operator: Option<Operator>,
    #[arg(long, help = "Print the series as JSON")]
    json: bool,
}

/// Aggregated series of one tracker, ready to be shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub tracker_id: String,
    pub tracker_name: String,
    pub kind: TrackerKind,
    pub unit: String,
    pub interval: Interval,
    pub operator: Option<Operator>,
    pub label: String,
    pub points: Vec<ProcessedPoint>,
}

pub async fn process_chart_command(
    store: &impl TrackerStore,
    ChartCommand {
        tracker_id,
        interval,
        operator,
        json,
    }: ChartCommand,
) -> Result<()> {
    let chart = build_chart(store, &tracker_id, interval, operator, &Local).await?;
    if chart.kind == TrackerKind::Event && operator.is_some_and(|v| Some(v) != chart.operator) {
        warn!("Ignoring operator {operator:?} for event tracker {tracker_id}");
        if !json {
            println!("Events are always counted, --operator is ignored.");
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&chart)?);
        return Ok(());
    }

    println!("{} ({})", chart.tracker_name, chart.label);
    if chart.points.is_empty() {
        match chart.kind {
            TrackerKind::Event => println!("No events logged for this tracker yet."),
            TrackerKind::Value => println!("No data points available for this tracker yet."),
        }
        return Ok(());
    }

    let max = chart.points.iter().map(|v| v.value).fold(0., f64::max);
    let bars = chart.kind == TrackerKind::Event && chart.interval != Interval::Raw;
    for point in &chart.points {
        let bar = if bars { render_bar(point.value, max) } else { String::new() };
        print!("{}\t{}", point.label, describe_value(&chart, point.value));
        if !bar.is_empty() {
            print!("\t{bar}");
        }
        match &point.notes {
            Some(notes) => println!("\t{notes}"),
            None => println!(),
        }
    }
    Ok(())
}

pub async fn build_chart<Tz: TimeZone>(
    store: &impl TrackerStore,
    tracker_id: &str,
    interval: Interval,
    operator: Option<Operator>,
    tz: &Tz,
) -> Result<Chart>
where
    Tz::Offset: Display,
{
    let tracker = require_tracker(store, tracker_id).await?;
    let points = store.get_data_points_for(&tracker).await?;

    let processed = aggregate(&tracker, &points, interval, operator, tz)?;
    let operator = effective_operator(tracker.kind, interval, operator);

    Ok(Chart {
        label: chart_label(tracker.kind, &tracker.unit, interval, operator),
        tracker_id: tracker.id,
        tracker_name: tracker.name,
        kind: tracker.kind,
        unit: tracker.unit,
        interval,
        operator,
        points: processed,
    })
}

/// Name of the plotted quantity, e.g. "Count of Events" or "Average kg".
pub fn chart_label(
    kind: TrackerKind,
    unit: &str,
    interval: Interval,
    operator: Option<Operator>,
) -> String {
    match (kind, interval, operator) {
        (TrackerKind::Event, Interval::Raw, _) => "Event Logged".to_string(),
        (TrackerKind::Event, _, _) => "Count of Events".to_string(),
        (TrackerKind::Value, _, None) if unit.is_empty() => "Value".to_string(),
        (TrackerKind::Value, _, None) => unit.to_string(),
        (TrackerKind::Value, _, Some(Operator::Count)) => "Count of Entries".to_string(),
        (TrackerKind::Value, _, Some(operator)) => {
            format!("{} {unit}", capitalized(&operator.to_string()))
        }
    }
}

fn capitalized(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0. {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn plural(count: f64, one: &str, many: &str) -> String {
    let noun = if count == 1. { one } else { many };
    format!("{} {noun}", format_number(count))
}

/// Value of a chart point as shown to the user.
pub fn describe_value(chart: &Chart, value: f64) -> String {
    match (chart.kind, chart.interval, chart.operator) {
        (TrackerKind::Event, Interval::Raw, _) => "Logged".to_string(),
        (TrackerKind::Event, _, _) => plural(value, "event", "events"),
        (TrackerKind::Value, _, Some(Operator::Count)) => plural(value, "entry", "entries"),
        (TrackerKind::Value, _, _) => format!("{} {}", format_number(value), chart.unit),
    }
}

fn render_bar(value: f64, max: f64) -> String {
    if max <= 0. {
        return String::new();
    }
    let width = ((value / max) * BAR_WIDTH).round().max(1.) as usize;
    paint_tier(IntensityTier::relative(value, max), &"█".repeat(width))
}
