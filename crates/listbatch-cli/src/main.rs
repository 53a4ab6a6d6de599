use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use listbatch_cli::{
    check, report, resolve_config, run, ConfigOverrides, Plan, EXIT_OPERATIONS_FAILED,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn plan_arg() -> Arg {
    Arg::new("plan")
        .long("plan")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Path to the JSON batch plan")
}

fn engine_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("Engine configuration TOML file"),
        )
        .arg(
            Arg::new("chunk-size")
                .long("chunk-size")
                .value_parser(value_parser!(usize))
                .help("Maximum operations per network call"),
        )
        .arg(
            Arg::new("concurrent")
                .long("concurrent")
                .action(ArgAction::SetTrue)
                .help("Dispatch all chunks at once"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Output as JSON"),
        )
}

fn cli() -> Command {
    Command::new("listbatch")
        .version(listbatch_core::VERSION)
        .about("Chunked batch writes against list stores")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(engine_args(
            Command::new("run")
                .about("Execute a plan against an in-memory list store")
                .arg(plan_arg()),
        ))
        .subcommand(engine_args(
            Command::new("check")
                .about("Validate a plan and show its chunk layout without executing it")
                .arg(plan_arg()),
        ))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load(args: &ArgMatches) -> Result<(Plan, listbatch_core::EngineConfig, bool)> {
    let plan_path = args
        .get_one::<PathBuf>("plan")
        .ok_or_else(|| anyhow::anyhow!("--plan is required"))?;
    let plan = Plan::load(plan_path)?;
    let overrides = ConfigOverrides {
        chunk_size: args.get_one::<usize>("chunk-size").copied(),
        concurrent: args.get_flag("concurrent"),
    };
    let config = resolve_config(
        &plan,
        args.get_one::<PathBuf>("config").map(PathBuf::as_path),
        &overrides,
    )?;
    Ok((plan, config, args.get_flag("json")))
}

async fn dispatch(matches: &ArgMatches) -> Result<ExitCode> {
    match matches.subcommand() {
        Some(("run", args)) => {
            let (plan, config, json) = load(args)?;
            let summary = run(&plan, config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", report::render_summary(&summary));
            }
            Ok(if summary.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_OPERATIONS_FAILED)
            })
        }
        Some(("check", args)) => {
            let (plan, config, json) = load(args)?;
            let checked = check(&plan, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&checked)?);
            } else {
                print!("{}", report::render_check(&checked));
            }
            Ok(if checked.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_OPERATIONS_FAILED)
            })
        }
        _ => Ok(ExitCode::SUCCESS),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match dispatch(&matches).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
