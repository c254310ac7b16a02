mod cli;
mod paths;
mod run;

use std::path::Path;

use anyhow::{bail, Context, Result};
use cli::{Command, ConfigAction, GridArgs};
use dissolve::ParticleGrid;
use effectconfig::{particle_size_in_range, EffectConfig, MAX_PARTICLE_SIZE, MIN_PARTICLE_SIZE};
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Config(config_cmd)) => handle_config_command(config_cmd.action),
        Some(Command::Grid(args)) => run_grid(&args),
        None => run::run(cli.run),
    }
}

fn handle_config_command(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check { file } => run_config_check(&file),
        ConfigAction::Default => {
            print!("{}", EffectConfig::default().to_toml_string()?);
            Ok(())
        }
        ConfigAction::Where => {
            let paths = AppPaths::discover()?;
            let file = paths.config_file();
            println!("{}", file.display());
            if !file.is_file() {
                println!("  (not present; built-in defaults apply)");
            }
            Ok(())
        }
    }
}

fn run_config_check(file: &Path) -> Result<()> {
    let config = EffectConfig::from_path(file)
        .with_context(|| format!("{} is not a valid dissolve config", file.display()))?;
    println!("{}: ok", file.display());
    println!("  duration:       {} ms", config.duration.as_millis());
    println!("  particle_size:  {}", config.particle_size);
    println!("  sampling:       {:?}", config.sampling);
    println!(
        "  background:     {}{}",
        config.background_color,
        if config.composite_background {
            " (composited)"
        } else {
            ""
        }
    );
    println!(
        "  window:         {}x{} \"{}\"",
        config.window.width, config.window.height, config.window.title
    );
    Ok(())
}

fn run_grid(args: &GridArgs) -> Result<()> {
    if !particle_size_in_range(args.particle_size) {
        bail!(
            "particle size must be {MIN_PARTICLE_SIZE}..={MAX_PARTICLE_SIZE} px (got {})",
            args.particle_size
        );
    }
    let grid = ParticleGrid::new(args.width, args.height, args.particle_size);
    println!(
        "grid {}x{} ({} particles)",
        grid.width(),
        grid.height(),
        grid.count()
    );
    Ok(())
}
