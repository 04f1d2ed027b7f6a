use clap::{value_parser, Arg, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use deltasync::logging::*;
use deltasync::{Config, PipelineCoordinator, Server, SyncError, SyncOutcome, TcpConnector};

const DEFAULT_LISTEN: &str = "127.0.0.1:7777";
const EXIT_FAILURE: u8 = 1;
const EXIT_CANCELLED: u8 = 130;

///////////////////////
// Utility functions //
///////////////////////

fn load_config(matches: &ArgMatches) -> Result<Config, SyncError> {
	let mut config = match matches.get_one::<PathBuf>("config") {
		Some(path) => Config::load(path)?,
		None => Config::default(),
	};
	if let Some(level) = matches.get_one::<u8>("log-level") {
		config.log_level = *level;
	}
	Ok(config)
}

/// Token cancelled on the first Ctrl-C
fn cancel_on_interrupt() -> CancellationToken {
	let token = CancellationToken::new();
	let signal_token = token.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			info!("Interrupted, stopping");
			signal_token.cancel();
		}
	});
	token
}

fn dir_arg(matches: &ArgMatches) -> Result<PathBuf, SyncError> {
	matches
		.get_one::<PathBuf>("dir")
		.cloned()
		.ok_or_else(|| SyncError::InvalidConfig { message: "directory argument required".to_string() })
}

async fn serve(matches: &ArgMatches, config: Config) -> Result<ExitCode, SyncError> {
	let dir = dir_arg(matches)?;
	let listen = matches.get_one::<String>("listen").map(|s| s.as_str()).unwrap_or(DEFAULT_LISTEN);

	let listener = TcpListener::bind(listen).await?;

	let token = cancel_on_interrupt();
	Server::new(dir, config).serve(listener, token.clone()).await?;
	Ok(if token.is_cancelled() { ExitCode::from(EXIT_CANCELLED) } else { ExitCode::SUCCESS })
}

async fn sync(matches: &ArgMatches, mut config: Config) -> Result<ExitCode, SyncError> {
	let dir = dir_arg(matches)?;
	let remote = matches
		.get_one::<String>("remote")
		.ok_or_else(|| SyncError::InvalidConfig { message: "--remote is required".to_string() })?;
	if let Some(ignore_file) = matches.get_one::<PathBuf>("ignore-file") {
		config.ignore_file = ignore_file.clone();
	}

	let connector = Arc::new(TcpConnector::new(remote.clone(), config.call_timeout()));
	let coordinator = PipelineCoordinator::new(dir, config, connector);

	let token = cancel_on_interrupt();
	let outcome = coordinator.run(&token).await?;
	let report = outcome.report();
	eprintln!(
		"{} directories, {} files, {} bytes uploaded ({} literal, {} blocks copied)",
		report.dirs_created, report.files_synced, report.bytes_uploaded, report.literal_bytes, report.copied_blocks
	);

	Ok(match outcome {
		SyncOutcome::Completed(_) => ExitCode::SUCCESS,
		SyncOutcome::Cancelled(_) => ExitCode::from(EXIT_CANCELLED),
	})
}

fn cli() -> Command {
	let config_arg = Arg::new("config")
		.short('c')
		.long("config")
		.value_name("FILE")
		.value_parser(value_parser!(PathBuf))
		.help("TOML configuration file");
	let level_arg = Arg::new("log-level")
		.short('v')
		.long("log-level")
		.value_name("N")
		.value_parser(value_parser!(u8))
		.help("Log verbosity: 0 debug, 1 info, 2 warn, 3 and above error");
	let dir_arg = Arg::new("dir").required(true).value_parser(value_parser!(PathBuf));

	Command::new("deltasync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("One-way rsync-style directory synchronization")
		.subcommand_required(true)
		.subcommand(
			Command::new("serve")
				.about("Serve a directory as the synchronization target")
				.arg(dir_arg.clone())
				.arg(
					Arg::new("listen")
						.short('l')
						.long("listen")
						.value_name("ADDR")
						.help("Listen address (default 127.0.0.1:7777)"),
				)
				.arg(config_arg.clone())
				.arg(level_arg.clone()),
		)
		.subcommand(
			Command::new("sync")
				.about("Synchronize a local directory to a serving peer")
				.arg(dir_arg)
				.arg(
					Arg::new("remote")
						.short('r')
						.long("remote")
						.value_name("ADDR")
						.required(true)
						.help("Address of the serving peer"),
				)
				.arg(
					Arg::new("ignore-file")
						.long("ignore-file")
						.value_name("PATH")
						.value_parser(value_parser!(PathBuf))
						.help("Ignore file, relative paths resolve against the sync root"),
				)
				.arg(config_arg)
				.arg(level_arg),
		)
}

#[tokio::main]
async fn main() -> ExitCode {
	let matches = cli().get_matches();
	let (name, sub_matches) = match matches.subcommand() {
		Some(pair) => pair,
		None => return ExitCode::from(EXIT_FAILURE),
	};

	let config = match load_config(sub_matches) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("deltasync: {}", e);
			return ExitCode::from(EXIT_FAILURE);
		}
	};
	init_tracing(config.log_level);

	let result = match name {
		"serve" => serve(sub_matches, config).await,
		"sync" => sync(sub_matches, config).await,
		_ => return ExitCode::from(EXIT_FAILURE),
	};

	match result {
		Ok(code) => code,
		Err(e) => {
			error!("{}", e);
			ExitCode::from(EXIT_FAILURE)
		}
	}
}


// vim: ts=4
