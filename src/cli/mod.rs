pub mod chart;
pub mod dates;
pub mod heatmap;
pub mod points;
pub mod trackers;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chart::{process_chart_command, ChartCommand};
use clap::{Parser, Subcommand};
use dates::DateStyle;
use heatmap::{process_heatmap_command, HeatmapCommand};
use points::{process_log_command, process_point_command, LogCommand, PointCommand};
use tracing::{debug, level_filters::LevelFilter};
use trackers::{process_tracker_command, TrackerCommand};

use crate::{
    storage::database::Database,
    utils::{
        clock::DefaultClock,
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Insight Track", version, long_about = None)]
#[command(about = "Track personal metrics and events, chart them over time and see them on a calendar", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Create, list, edit, pin and delete trackers")]
    Tracker {
        #[command(subcommand)]
        command: TrackerCommand,
    },
    #[command(about = "Log a data point for a tracker")]
    Log {
        #[command(flatten)]
        command: LogCommand,
    },
    #[command(about = "List, edit and delete logged data points")]
    Point {
        #[command(subcommand)]
        command: PointCommand,
    },
    #[command(about = "Show a tracker aggregated by day, month or year")]
    Chart {
        #[command(flatten)]
        command: ChartCommand,
    },
    #[command(about = "Show the events of a tracker on a calendar")]
    Heatmap {
        #[command(flatten)]
        command: HeatmapCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let application_dir = match args.dir {
        Some(dir) => dir,
        None => create_application_default_path()?,
    };

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &application_dir, logging_level, args.log)?;

    let database = Database::open(application_dir.join("data")).with_context(|| {
        format!(
            "Failed to open the data directory in {}",
            application_dir.display()
        )
    })?;
    debug!("Using application directory {}", application_dir.display());
    let clock = DefaultClock;

    match args.commands {
        Commands::Tracker { command } => process_tracker_command(&database, &clock, command).await,
        Commands::Log { command } => {
            process_log_command(&database, &clock, args.date_style, command).await
        }
        Commands::Point { command } => {
            process_point_command(&database, &clock, args.date_style, command).await
        }
        Commands::Chart { command } => process_chart_command(&database, command).await,
        Commands::Heatmap { command } => {
            process_heatmap_command(&database, &clock, args.date_style, command).await
        }
    }
}
