use std::error::Error;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;
use mpt_engine::portfolio::PortfolioEngine;
use mpt_engine::portfolio::PortfolioEngineConfig;
use mpt_engine::portfolio::PriceSeries;
use prettytable::row;
use prettytable::Cell;
use prettytable::Table;

/// Long-only allocations and efficient frontier from daily close files.
#[derive(Parser, Debug)]
#[command(name = "mpt-engine", version, about)]
struct Args {
  /// Annual risk-free rate in percent
  #[arg(long, default_value_t = 5.0)]
  rf: f64,

  /// Number of efficient frontier targets
  #[arg(long, default_value_t = 20)]
  points: usize,

  /// Seed of the Sortino multi-start
  #[arg(long, default_value_t = 42)]
  seed: u64,

  /// `date,close` files, one per asset; the file stem is the symbol
  #[arg(required = true)]
  paths: Vec<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
  let args = Args::parse();
  let mut config = PortfolioEngineConfig {
    risk_free_pct: args.rf,
    seed: Some(args.seed),
    ..PortfolioEngineConfig::default()
  };
  config.frontier.points = args.points;

  let series = args
    .paths
    .iter()
    .map(|p| read_price_series(p))
    .collect::<Result<Vec<_>, _>>()?;

  let engine = PortfolioEngine::new(config);
  let estimate = engine.estimate(&series)?;
  println!(
    "{} assets, {} aligned daily returns, risk-free {}%",
    estimate.symbols.len(),
    estimate.returns.first().map(|r| r.len()).unwrap_or(0),
    engine.config().risk_free_pct
  );

  let mut table = Table::new();
  let mut titles = row!["Objective", "Return", "Volatility", "Sharpe", "Sortino"];
  for symbol in &estimate.symbols {
    titles.add_cell(Cell::new(symbol));
  }
  table.set_titles(titles);

  for (objective, m) in engine.optimize_all(&estimate)? {
    let mut r = row![
      objective,
      format!("{:.2}%", m.expected_return * 100.0),
      format!("{:.2}%", m.volatility * 100.0),
      format!("{:.3}", m.sharpe_ratio),
      format!("{:.3}", m.sortino_ratio)
    ];
    for (_, w) in m.weights.iter() {
      r.add_cell(Cell::new(&format!("{:.1}%", w * 100.0)));
    }
    table.add_row(r);
  }
  table.printstd();

  let frontier = engine.frontier_from_estimate(&estimate)?;
  println!("\nEfficient frontier ({} points)", frontier.len());
  let mut table = Table::new();
  table.set_titles(row!["Return", "Volatility", "Weights"]);
  for point in &frontier {
    let weights = point
      .weights
      .iter()
      .map(|(s, w)| format!("{s}={:.1}%", w * 100.0))
      .collect::<Vec<_>>()
      .join(" ");
    table.add_row(row![
      format!("{:.2}%", point.expected_return * 100.0),
      format!("{:.2}%", point.volatility * 100.0),
      weights
    ]);
  }
  table.printstd();

  Ok(())
}

/// Read `date,close` lines; a header line and blank lines are skipped.
fn read_price_series(path: &Path) -> Result<PriceSeries, Box<dyn Error>> {
  let file = File::open(path)?;
  let name = path.display();
  let reader = BufReader::new(file);
  let mut points = Vec::new();

  for (i, line) in reader.lines().enumerate() {
    let line = line?;
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let Some((date, close)) = line.split_once(',') else {
      return Err(format!("{name}:{}: expected `date,close`", i + 1).into());
    };
    let date = match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
      Ok(d) => d,
      Err(_) if i == 0 => continue,
      Err(e) => return Err(format!("{name}:{}: {e}", i + 1).into()),
    };
    points.push((date, close.trim().parse::<f64>()?));
  }
  points.sort_by_key(|&(d, _)| d);

  let symbol = path
    .file_stem()
    .map(|s| s.to_string_lossy().to_uppercase())
    .ok_or_else(|| format!("{name}: no file name"))?;
  Ok(PriceSeries::new(symbol, points))
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  #[test]
  fn args_definition_is_consistent() {
    Args::command().debug_assert();
  }

  #[test]
  fn defaults_and_overrides() {
    let args = Args::try_parse_from(["mpt-engine", "a.csv", "b.csv"]).unwrap();
    assert_eq!(args.rf, 5.0);
    assert_eq!(args.points, 20);
    assert_eq!(args.seed, 42);
    assert_eq!(args.paths, vec![PathBuf::from("a.csv"), PathBuf::from("b.csv")]);

    let args = Args::try_parse_from(["mpt-engine", "--rf", "2.5", "--points", "7", "--seed", "9", "a.csv"]).unwrap();
    assert_eq!(args.rf, 2.5);
    assert_eq!(args.points, 7);
    assert_eq!(args.seed, 9);
  }

  #[test]
  fn malformed_arguments_are_rejected() {
    assert!(Args::try_parse_from(["mpt-engine", "a.csv", "--rf"]).is_err());
    assert!(Args::try_parse_from(["mpt-engine", "--foo", "a.csv"]).is_err());
    assert!(Args::try_parse_from(["mpt-engine", "--points", "many", "a.csv"]).is_err());
    assert!(Args::try_parse_from(["mpt-engine"]).is_err());
  }
}
