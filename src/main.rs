use std::path::PathBuf;
use std::str::FromStr;

use clap::{Arg, ArgMatches, Command};
use iadsc2::logging::{init_logging, parse_log_level, LogConfig, LogOutput};
use iadsc2::scenario::ScenarioConfig;
use iadsc2::simulation::SimulationEngine;
use tracing::{error, info};

fn main() {
    let matches = Command::new("iadsc2")
        .version(env!("CARGO_PKG_VERSION"))
        .about("統合防空 指揮統制 (IADS C2) 戦闘管理シミュレータ")
        .long_about("YAMLシナリオに従って戦闘管理（BM）を時間駆動で実行します。\n\
                     武器ペアリング・スコアリング・割り当て・ACK処理の挙動を評価できます。")
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定"),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細, -vvv: トレース)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .default_value("info")
                .help("ログレベル (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("OUTPUT")
                .default_value("console")
                .help("ログ出力先 (console, file, both)"),
        )
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .value_name("DIR")
                .default_value("logs")
                .help("ログファイルの出力ディレクトリ"),
        )
        .get_matches();

    let log_config = match build_log_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("エラー: {}", e);
            std::process::exit(2);
        }
    };
    // ファイル出力を維持するため main の終わりまで保持
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ログ初期化エラー: {}", e);
            std::process::exit(1);
        }
    };

    let verbose_level = matches.get_count("verbose");

    let Some(scenario_path) = matches.get_one::<String>("scenario") else {
        show_default_help();
        return;
    };

    if let Err(e) = run_scenario(scenario_path, matches.get_flag("info"), verbose_level) {
        error!(error = %e, "シナリオ実行に失敗");
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

fn build_log_config(matches: &ArgMatches) -> Result<LogConfig, String> {
    let mut config = LogConfig::default();
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.level = parse_log_level(level)?;
    }
    if let Some(output) = matches.get_one::<String>("log-output") {
        config.output = LogOutput::from_str(output)?;
    }
    if let Some(dir) = matches.get_one::<String>("log-dir") {
        config.log_dir = PathBuf::from(dir);
    }
    Ok(config)
}

/// シナリオファイルを読み込んで実行
fn run_scenario(scenario_path: &str, info_only: bool, verbose_level: u8) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = ScenarioConfig::from_file(scenario_path)?;
    info!(path = scenario_path, name = %scenario.meta.name, "シナリオファイル読み込み完了");

    scenario.print_summary();
    if info_only {
        return Ok(());
    }
    println!();

    let mut simulation = SimulationEngine::new(scenario, verbose_level);
    simulation.run()?;
    println!();
    simulation.print_summary();
    Ok(())
}

fn show_default_help() {
    println!("使用方法:");
    println!("  iadsc2 [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>   シナリオファイルを指定して実行");
    println!("  -i, --info              シナリオ情報のみ表示");
    println!("  -v, --verbose           詳細出力 (複数指定で詳細レベル上昇)");
    println!("      --log-level <LEVEL> ログレベル");
    println!("      --log-output <OUT>  ログ出力先 (console, file, both)");
    println!("      --log-dir <DIR>     ログディレクトリ");
    println!("  -h, --help              このヘルプを表示");
    println!();
    println!("利用可能なシナリオファイル:");
    println!("  scenarios/single_battery.yaml  - 単一射撃ユニットの基本交戦");
    println!("  scenarios/two_batteries.yaml   - 複数目標・最適割り当て・CANTCO");
    println!();
    println!("例:");
    println!("  iadsc2 -s scenarios/single_battery.yaml");
    println!("  iadsc2 -s scenarios/two_batteries.yaml -v --log-output both");
    println!("  iadsc2 -s scenarios/two_batteries.yaml -i");
}
