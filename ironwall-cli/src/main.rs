use clap::Parser;

use ironwall_cli::cli::{Cli, Commands};
use ironwall_cli::commands;
use ironwall_cli::error::CliError;
use ironwall_cli::logging;
use ironwall_cli::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // 로깅 초기화. 설정 파일 오류는 명령 실행 단계에서 보고합니다.
    let mut general = commands::config::load_or_default(&cli.config)
        .await
        .map(|c| c.general)
        .unwrap_or_default();
    if let Some(level) = cli.log_level.clone() {
        general.log_level = level;
    }
    if let Err(e) = logging::init_tracing(&general) {
        eprintln!("warning: {e}");
    }

    ironwall_core::metrics::describe_all();
    tracing::debug!(config = %cli.config.display(), "ironwall starting");

    let writer = OutputWriter::new(cli.output);
    let result: Result<(), CliError> = match cli.command {
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
        Commands::Replay(args) => commands::replay::execute(args, &cli.config, &writer).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}
