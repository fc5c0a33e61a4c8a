//! Implementation of the `subagent env` command.
//!
//! Preflight: assembles the environment an agent would get in a working
//! directory and reports what went into it, without spawning anything.

use crate::cli::EnvArgs;
use crate::dispatch::Dispatcher;
use crate::env::PATH_VAR;

pub async fn cmd_env(dispatcher: &Dispatcher, args: EnvArgs) -> anyhow::Result<()> {
    let config = dispatcher.config();
    let work_dir = match args.work_dir {
        Some(dir) if dir.is_absolute() => dir,
        Some(dir) => config.default_work_dir.join(dir),
        None => config.default_work_dir.clone(),
    };
    let options = config.env.for_workdir(&work_dir);

    println!("Agent Environment");
    println!("=================");
    println!();
    println!("Working directory: {}", work_dir.display());
    println!("Execution mode:    {}", config.mode);
    println!(
        "Shell sourcing:    {}",
        if options.source_shell_env { "enabled" } else { "disabled" }
    );
    println!(
        "Dotenv:            {}",
        if options.load_dotenv {
            options.dotenv_path.display().to_string()
        } else {
            "disabled".to_string()
        }
    );

    let spec = dispatcher.environment(&work_dir).await?;

    match spec.find_executable(&config.agent_bin) {
        Some(path) => println!("Agent binary:      {}", path.display()),
        None => println!("Agent binary:      {} (NOT FOUND on PATH)", config.agent_bin),
    }
    println!("PATH:              {}", spec.get(PATH_VAR).unwrap_or("(unset)"));

    if !options.required_vars.is_empty() {
        println!();
        println!("Required variables (all present):");
        for name in &options.required_vars {
            println!("  {}", name);
        }
    }

    if !spec.diagnostics().is_empty() {
        println!();
        println!("Warnings:");
        for diagnostic in spec.diagnostics() {
            println!("  - {}", diagnostic);
        }
    }

    println!();
    println!("Variables ({}):", spec.vars().len());
    for (key, value) in spec.vars() {
        if args.show_values {
            println!("  {}={}", key, value);
        } else {
            println!("  {}", key);
        }
    }

    Ok(())
}
