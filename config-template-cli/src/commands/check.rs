use crate::commands;
use crate::loader;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::bail;
use color_eyre::Result;

use config_template::event_channel;

/// Decide whether a host state change is observable by an instance
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Instance configuration (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Host state of the last render
    #[arg(long, value_name = "FILE")]
    pub old: PathBuf,

    /// Incoming host state
    #[arg(long, value_name = "FILE")]
    pub new: PathBuf,

    /// Dashboard-wide variables
    #[arg(long, value_name = "FILE")]
    pub globals: Option<PathBuf>,

    /// Engine settings (error sentinel, interpolation error text)
    #[arg(long, value_name = "FILE")]
    pub engine: Option<PathBuf>,
}

pub async fn execute(args: CheckArgs) -> Result<()> {
    let config = loader::load_instance(&args.config)?;
    let old = loader::load_host(&args.old)?;
    let new = loader::load_host(&args.new)?;
    let globals = loader::load_globals(args.globals.as_deref())?;
    let engine_config = loader::load_engine_config(args.engine.as_deref())?;

    let (tx, mut events) = event_channel();
    let engine = commands::build_engine(engine_config).with_events(tx);
    let mut instance = commands::instance(engine, config, globals, old.clone())?;

    output::header("Checking", &args.config);

    // Render the old state first so the instance is in its steady state
    let readiness = instance.prepare().await;
    let Some(outcome) = instance.render() else {
        commands::report_events(&mut events);
        bail!("Instance is not ready: {}", readiness);
    };
    outcome.settle().await;

    instance.set_host(new);
    let changed = instance.should_update(Some(&old));
    commands::report_events(&mut events);

    println!("{}", changed);
    if changed {
        output::done("Re-render warranted");
    } else {
        output::note("No observable change");
    }
    Ok(())
}
