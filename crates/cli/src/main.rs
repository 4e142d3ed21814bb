use anyhow::Result;
use clap::{Parser, Subcommand};
use transplant::commands::{
    clean_command, extract_command, list_models_command, order_command, restore_command,
    run_command, RunArgs,
};
use transplant::init_tracing;

/// Function-by-function C to Rust migration.
///
/// This CLI is a thin wrapper around `transplant-core` (exposed in code as
/// `transplant_core`). All substantive logic lives in the library so it can be
/// tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "transplant",
    version,
    about = "Migrate a C program to Rust one function at a time",
    long_about = None
)]
struct Cli {
    /// Log debug detail (model replies, compiler output).
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set up a workspace for a dataset and translate it.
    ///
    /// This will:
    /// - Copy the template crate and the C sources into `--output-dir`.
    /// - Build and test the untouched program as a baseline.
    /// - Translate every function reachable from the entry, callees first.
    /// - Write per-function outcomes to `<output-dir>/log.json`.
    Run {
        /// Dataset name in the datasets file.
        #[arg(long, default_value = "toy")]
        dataset: String,

        /// Datasets file (JSON or YAML). Defaults to `<data-dir>/datasets.json`.
        #[arg(long)]
        datasets: Option<String>,

        /// Directory dataset paths are relative to.
        #[arg(long, default_value = "data")]
        data_dir: String,

        /// Hybrid-binary crate used as the workspace skeleton.
        #[arg(long, default_value = "rust_wrapper")]
        template_dir: String,

        /// Workspace to create; must not exist.
        #[arg(long, default_value = "output/translation")]
        output_dir: String,

        /// Model backend (see `transplant models`).
        #[arg(long)]
        model: Option<String>,

        /// Translate-and-validate cycles per function.
        #[arg(long)]
        num_attempts: Option<u32>,

        /// Pipeline config file (JSON or YAML).
        #[arg(long)]
        config: Option<String>,
    },

    /// Print the translation order for a static-analysis snapshot.
    Order {
        /// Path to `functions.json`.
        #[arg(long)]
        functions: String,

        /// Entry function of the call graph.
        #[arg(long, default_value = transplant_core::analysis::DEFAULT_ENTRY_FUNCTION)]
        entry: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the C source of one function in a workspace.
    Extract {
        /// Workspace root. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Function name as recorded in `c_src/functions.json`.
        #[arg(long)]
        name: String,
    },

    /// Roll back an edit left behind by an interrupted run.
    Restore {
        /// Workspace root. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,
    },

    /// Remove the workspace's build directory.
    Clean {
        /// Workspace root. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,
    },

    /// List available model backends.
    Models {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run {
            dataset,
            datasets,
            data_dir,
            template_dir,
            output_dir,
            model,
            num_attempts,
            config,
        } => {
            run_command(RunArgs {
                dataset,
                datasets,
                data_dir,
                template_dir,
                output_dir,
                model,
                num_attempts,
                config,
                verbose: cli.verbose,
            })?;
        }
        Command::Order { functions, entry, json } => order_command(&functions, &entry, json)?,
        Command::Extract { root, name } => extract_command(&root, &name)?,
        Command::Restore { root } => restore_command(&root)?,
        Command::Clean { root } => clean_command(&root)?,
        Command::Models { json } => list_models_command(json)?,
    }

    Ok(())
}
