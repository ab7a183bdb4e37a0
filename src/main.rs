mod analyzer;
mod error;
mod filter;
mod loader;
mod models;
mod report;
mod views;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use error::TrackerError;
use filter::FilterConfig;
use models::{Config, SeriesFilter, Table};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn university_arg(multiple: bool) -> Arg {
    let arg = Arg::new("university")
        .short('u')
        .long("university")
        .value_name("NAME")
        .required(true);
    if multiple {
        arg.action(ArgAction::Append)
            .help("University to include (repeat for several)")
    } else {
        arg.help("University to analyze")
    }
}

fn build_cli() -> Command {
    Command::new("susi-rate-tracker")
        .version("0.1")
        .about("Tracks and analyzes early-admission competition rates")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml")
                .global(true),
        )
        .subcommand(Command::new("dashboard").about("Average rates per university, group trends and recommendation ranking"))
        .subcommand(
            Command::new("analyze")
                .about("Per-admission trends and TOP/LOW rankings for one university")
                .arg(university_arg(false)),
        )
        .subcommand(
            Command::new("detail")
                .about("Per-department trends with last year's reference rates")
                .arg(university_arg(false)),
        )
        .subcommand(
            Command::new("search")
                .about("Filter departments by university, rate, series and recommendation")
                .arg(university_arg(true))
                .arg(
                    Arg::new("max-rate")
                        .long("max-rate")
                        .value_name("RATE")
                        .value_parser(clap::value_parser!(f64))
                        .help("Keep departments whose latest rate is at most RATE"),
                )
                .arg(
                    Arg::new("series")
                        .long("series")
                        .value_name("SERIES")
                        .default_value("모두")
                        .help("all | 인문 | 자연"),
                )
                .arg(
                    Arg::new("recommended-only")
                        .long("recommended-only")
                        .action(ArgAction::SetTrue)
                        .help("Only school-recommendation admissions"),
                ),
        )
        .subcommand(Command::new("universities").about("List universities in the data file"))
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let matches = build_cli().get_matches();
    let config_file = matches
        .subcommand()
        .and_then(|(_, sub)| sub.get_one::<String>("config"))
        .or_else(|| matches.get_one::<String>("config"))
        .map(String::as_str)
        .unwrap_or("config.toml");

    // Load or create configuration
    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file).with_context(|| format!("Failed to parse {}", config_file))?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        Config::default().save_to_file(config_file)?;
        println!("⚠️  Please check data_file in {}, then run the program again.", config_file);
        return Ok(());
    };

    let output_dir = config.output_directory.as_deref().unwrap_or("output");
    println!("📂 Reading competition rates from: {}", config.data_file);

    // The table is loaded once and shared read-only by every view
    let table = loader::load(Path::new(&config.data_file), &config.layout)
        .with_context(|| format!("Failed to load {}", config.data_file))?;

    let outcome = match matches.subcommand() {
        Some(("analyze", sub)) => run_analyze(&table, &config, sub, output_dir),
        Some(("detail", sub)) => run_detail(&table, &config, sub, output_dir),
        Some(("search", sub)) => run_search(&table, &config, sub, output_dir),
        Some(("universities", _)) => {
            for name in table.universities() {
                println!("{}", name);
            }
            Ok(())
        }
        _ => run_dashboard(&table, &config, output_dir),
    };

    match outcome {
        Ok(()) => {
            println!("\n✅ Analysis complete! Results in: {}", output_dir);
            Ok(())
        }
        Err(e) => match e.downcast_ref::<TrackerError>() {
            Some(TrackerError::Validation(msg)) => {
                warn!("{}", msg);
                println!("⚠️  {}", msg);
                Ok(())
            }
            Some(TrackerError::Schema(msg)) => {
                error!("view disabled: {}", msg);
                println!("❌ This view is unavailable: {}", msg);
                Ok(())
            }
            _ => Err(e),
        },
    }
}

fn selected_university(sub: &ArgMatches) -> Result<&str> {
    sub.get_one::<String>("university")
        .map(String::as_str)
        .ok_or_else(|| TrackerError::Validation("select a university".to_string()).into())
}

fn run_dashboard(table: &Table, config: &Config, output_dir: &str) -> Result<()> {
    info!("building dashboard for {} universities", table.universities().len());
    let view = views::dashboard_view(table, &config.university_groups, config.top_n)?;
    report::write_json(&view, output_dir, "dashboard")?;
    report::print_dashboard_summary(&view);
    Ok(())
}

fn run_analyze(table: &Table, config: &Config, sub: &ArgMatches, output_dir: &str) -> Result<()> {
    let university = selected_university(sub)?;
    info!("analyzing {}", university);
    let view = views::university_analysis_view(table, university, config.top_n)?;
    report::write_json(&view, output_dir, "analysis")?;
    report::generate_analysis_rankings_csv(&view, output_dir)?;
    report::print_analysis_summary(&view);
    Ok(())
}

fn run_detail(table: &Table, config: &Config, sub: &ArgMatches, output_dir: &str) -> Result<()> {
    let university = selected_university(sub)?;
    info!("building detail view for {}", university);
    let view = views::university_detail_view(table, university, config.baseline_rate)?;
    report::write_json(&view, output_dir, "detail")?;
    report::print_detail_summary(&view);
    Ok(())
}

fn run_search(table: &Table, config: &Config, sub: &ArgMatches, output_dir: &str) -> Result<()> {
    let universities: Vec<String> = sub
        .get_many::<String>("university")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    for name in &universities {
        if !table.contains_university(name) {
            warn!("university '{}' has no rows in the data file", name);
        }
    }

    let series = sub
        .get_one::<String>("series")
        .map(|s| s.parse::<SeriesFilter>())
        .transpose()?
        .unwrap_or_default();

    let filter = FilterConfig {
        universities,
        max_latest_rate: Some(sub.get_one::<f64>("max-rate").copied().unwrap_or(config.default_max_rate)),
        series_filter: series,
        only_recommended: sub.get_flag("recommended-only"),
    };

    let view = views::search_view(table, &filter, &config.layout.listing_reference_columns)?;
    report::write_json(&view, output_dir, "search")?;
    report::generate_search_csv(&view, output_dir)?;
    report::print_search_summary(&view);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_search_options() {
        let matches = build_cli()
            .try_get_matches_from([
                "susi-rate-tracker",
                "search",
                "-u",
                "A대학교",
                "--university",
                "B대학교",
                "--max-rate",
                "5.5",
                "--series",
                "자연",
                "--recommended-only",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "search");
        let universities: Vec<&String> = sub.get_many::<String>("university").unwrap().collect();
        assert_eq!(universities.len(), 2);
        assert_eq!(sub.get_one::<f64>("max-rate"), Some(&5.5));
        assert!(sub.get_flag("recommended-only"));
    }

    #[test]
    fn test_cli_requires_university_for_analyze() {
        assert!(build_cli().try_get_matches_from(["susi-rate-tracker", "analyze"]).is_err());
    }

    #[test]
    fn test_cli_config_is_global() {
        let matches = build_cli()
            .try_get_matches_from(["susi-rate-tracker", "dashboard", "-c", "other.toml"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(sub.get_one::<String>("config").map(String::as_str), Some("other.toml"));
    }
}
