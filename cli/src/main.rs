mod args;

use clap::Parser;
use colored::Colorize;
use doris_cmd::{
    benchmark, config::CLIConfiguration, connect, OutputFormat, Result, SessionSettings,
};

#[tokio::main]
async fn main() {
    let cli = args::Cli::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    if let Err(e) = run(cli).await {
        eprintln!("{}", e.to_string().red());
        std::process::exit(1);
    }
}

async fn run(cli: args::Cli) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(doris_cmd::config::default_config_path);
    let config = CLIConfiguration::load(&config_path)?;
    let ui = config.resolved_ui();

    let options = config.to_connection_options(
        cli.host.as_deref(),
        cli.port,
        cli.user.as_deref(),
        cli.password.as_deref(),
        cli.database.as_deref(),
        cli.http_port,
    );
    let settings = SessionSettings {
        format: cli
            .format
            .or_else(|| OutputFormat::parse(&ui.format))
            .unwrap_or(OutputFormat::Table),
        color: !cli.no_color && ui.color,
        progress: !cli.no_progress && ui.progress,
        output: cli.output.clone(),
    };

    let mut session = connect::create_session(config, options, settings).await?;

    // SIGTERM ends the session after the statement in flight
    #[cfg(unix)]
    {
        let terminate = session.terminate_token();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            if let Ok(mut term) = signal(SignalKind::terminate()) {
                term.recv().await;
                terminate.cancel();
            }
        });
    }

    if let Some(path) = &cli.benchmark {
        let color = session.color();
        return benchmark::run_benchmark(
            session.connection(),
            path,
            cli.times,
            color,
            cli.output.as_deref(),
        )
        .await;
    }

    if let Some(sql) = &cli.execute {
        session.execute_batch(sql).await
    } else if let Some(file) = &cli.file {
        session.execute_file(file).await
    } else {
        session.run_interactive().await
    }
}
