use std::path::PathBuf;

use clap::Parser;
use lobsim::{
    config::{read_asset_config, read_backtest_config, read_engine_config, read_recorder_config},
    prelude::*,
};

/// Replays a recorded book/trade dataset against the grid-trading strategy.
#[derive(Parser)]
struct Args {
    /// Directory containing the configuration files.
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,
    /// Asset id to trade.
    #[arg(long, default_value_t = 1)]
    asset_id: AssetId,
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let asset_config = read_asset_config(args.config_dir.join("asset_config.txt"))?;
    let engine_config = read_engine_config(args.config_dir.join("backtest_engine_config.txt"))?;
    let backtest_config = read_backtest_config(args.config_dir.join("backtest_config.txt"))?;
    let recorder_config = read_recorder_config(args.config_dir.join("recorder_config.txt"))?;
    let grid_config =
        GridTradingConfig::from_file(args.config_dir.join("grid_trading_config.txt"))?;

    let asset_name = asset_config.name.clone();
    let mut engine = BacktestEngine::builder()
        .config(engine_config)
        .add_asset(args.asset_id, asset_config)
        .build()?;
    let mut recorder = BacktestRecorder::new(recorder_config.interval_us);
    let mut strategy = GridTrading::new(args.asset_id, grid_config);

    let start = std::time::Instant::now();
    let mut iterations = backtest_config.iterations;
    while engine.elapse(backtest_config.elapse_us) && iterations > 0 {
        iterations -= 1;
        engine.clear_inactive_orders();
        strategy.on_elapse(&mut engine)?;
        recorder.record(&engine);
    }

    println!(
        "Backtest wall time: {:.3} seconds",
        start.elapsed().as_secs_f64()
    );
    println!("Final equity: {:.2}", engine.equity());
    recorder.print_performance_metrics();

    let values = engine.state_values(args.asset_id);
    println!("=== Trading Statistics for: {asset_name} ===");
    println!("Number of Trades   : {}", values.num_trades);
    println!("Trading Volume     : {}", values.trading_volume);
    println!("Trading Value      : {}", values.trading_value);
    println!("Realized PnL       : {:.4}", values.realized_pnl);

    recorder.to_csv(&recorder_config.output_file, ".")?;
    Ok(())
}
