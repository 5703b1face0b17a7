use crate::commands;
use crate::loader;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::bail;
use color_eyre::Result;

use config_template::event_channel;

/// Render an instance against a host state
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Instance configuration (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Host state: entity states and the current user
    #[arg(long, value_name = "FILE")]
    pub states: PathBuf,

    /// Dashboard-wide variables
    #[arg(long, value_name = "FILE")]
    pub globals: Option<PathBuf>,

    /// Engine settings (error sentinel, interpolation error text)
    #[arg(long, value_name = "FILE")]
    pub engine: Option<PathBuf>,

    /// Print compact JSON
    #[arg(long)]
    pub compact: bool,
}

pub async fn execute(args: RenderArgs) -> Result<()> {
    let config = loader::load_instance(&args.config)?;
    let host = loader::load_host(&args.states)?;
    let globals = loader::load_globals(args.globals.as_deref())?;
    let engine_config = loader::load_engine_config(args.engine.as_deref())?;

    let (tx, mut events) = event_channel();
    let engine = commands::build_engine(engine_config).with_events(tx);
    let mut instance = commands::instance(engine, config, globals, host)?;

    output::header("Rendering", &args.config);

    let readiness = instance.prepare().await;
    let Some(outcome) = instance.render() else {
        commands::report_events(&mut events);
        bail!("Instance is not ready: {}", readiness);
    };

    if outcome.is_pending() {
        output::note("waiting for pending values...");
    }
    let rendered = outcome.settle().await;
    commands::report_events(&mut events);

    let json = if args.compact {
        serde_json::to_string(&rendered)?
    } else {
        serde_json::to_string_pretty(&rendered)?
    };
    println!("{}", json);

    output::done(&format!("Rendered {}", rendered.kind));
    Ok(())
}
