//! arvan-iaas CLI entrypoint.
//!
//! This is the main entrypoint for the arvan-iaas command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use arvan_iaas::api::{HttpRequester, IaasClient};
use arvan_iaas::cli::{
    AttachmentCommands, Cli, Commands, ImageCommands, OutputFormatter, ServerCommands,
    StateCommands,
};
use arvan_iaas::config::{find_config_file, ConfigParser, ConfigValidator, Manifest};
use arvan_iaas::error::Result;
use arvan_iaas::reconciler::Reconciler;
use arvan_iaas::state::{LocalStateStore, ProviderState, StateStore, STATE_DIR};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let formatter = OutputFormatter::new(cli.output);
    match runtime.block_on(run(cli, &formatter)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            emit(&formatter, &formatter.error(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

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

/// Main async entry point. Returns false when the command ran but failed.
async fn run(cli: Cli, formatter: &OutputFormatter) -> Result<bool> {
    let config = cli.config.as_ref();

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(config, warnings, formatter),
        Commands::Plan => cmd_plan(config, formatter).await,
        Commands::Apply { yes } => cmd_apply(config, yes, formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config, yes, formatter).await,
        Commands::Server { command } => cmd_server(config, command, formatter).await,
        Commands::Image { command } => cmd_image(config, command, formatter).await,
        Commands::Attachment {
            command: AttachmentCommands::Import { id },
        } => cmd_import(config, &id, formatter).await,
        Commands::State {
            command: StateCommands::Show,
        } => cmd_state_show(config, formatter).await,
    }
}

/// Validate the manifest.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool, formatter: &OutputFormatter) -> Result<bool> {
    let (manifest, _) = load_manifest(config_path)?;

    let result = ConfigValidator::new(manifest.provider.region_set()).check(&manifest);
    emit(formatter, &formatter.format_validation(&result, show_warnings));

    if result.is_valid() && !formatter.is_json() {
        eprintln!("\nManifest summary:");
        eprintln!("  Servers: {}", manifest.servers.len());
        eprintln!("  Volume attachments: {}", manifest.volume_attachments.len());
        eprintln!("  Images: {}", manifest.images.len());
    }

    Ok(result.is_valid())
}

/// Show what apply would change.
async fn cmd_plan(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<bool> {
    let (manifest, state_store) = load_manifest_and_state(config_path)?;
    let client = create_client(&manifest)?;

    let plan = Reconciler::new(&client, &state_store).plan(&manifest).await?;
    emit(formatter, &formatter.format_plan(&plan));

    Ok(true)
}

/// Apply the manifest.
async fn cmd_apply(config_path: Option<&PathBuf>, auto_approve: bool, formatter: &OutputFormatter) -> Result<bool> {
    let (manifest, state_store) = load_manifest_and_state(config_path)?;
    let client = create_client(&manifest)?;
    let reconciler = Reconciler::new(&client, &state_store);

    let plan = reconciler.plan(&manifest).await?;
    if plan.is_empty() && manifest.images.is_empty() {
        emit(formatter, &formatter.success("No changes to apply."));
        return Ok(true);
    }

    if !plan.is_empty() {
        emit(formatter, &formatter.format_plan(&plan));
    }

    if !auto_approve && !confirm("Do you want to apply this plan?")? {
        eprintln!("Apply cancelled.");
        return Ok(true);
    }

    let report = reconciler.apply(&manifest).await?;
    emit(formatter, &formatter.format_report(&report));

    Ok(report.is_success())
}

/// Detach and forget everything tracked.
async fn cmd_destroy(config_path: Option<&PathBuf>, auto_approve: bool, formatter: &OutputFormatter) -> Result<bool> {
    let (manifest, state_store) = load_manifest_and_state(config_path)?;

    let state = state_store.load().await?.unwrap_or_default();
    if state.is_empty() {
        emit(formatter, &formatter.success("Nothing tracked, nothing to destroy."));
        return Ok(true);
    }

    if !auto_approve {
        eprintln!(
            "This will detach {} volume(s) and stop tracking {} server(s).",
            state.attachments.len(),
            state.servers.len()
        );
        if !confirm("Are you sure you want to destroy?")? {
            eprintln!("Destroy cancelled.");
            return Ok(true);
        }
    }

    let client = create_client(&manifest)?;
    let report = Reconciler::new(&client, &state_store).destroy().await?;
    emit(formatter, &formatter.format_report(&report));

    Ok(report.is_success())
}

/// Run one server action.
async fn cmd_server(config_path: Option<&PathBuf>, command: ServerCommands, formatter: &OutputFormatter) -> Result<bool> {
    let manifest = load_manifest_or_default(config_path)?;
    let client = create_client(&manifest)?;

    let (target, action) = command.into_action();
    info!("Running {action} on {}", target.id);
    client.servers.perform(&target.region, &target.id, &action).await?;

    emit(formatter, &formatter.success(&format!("{action}: done for server {}", target.id)));
    Ok(true)
}

/// Query images.
async fn cmd_image(config_path: Option<&PathBuf>, command: ImageCommands, formatter: &OutputFormatter) -> Result<bool> {
    let manifest = load_manifest_or_default(config_path)?;
    let client = create_client(&manifest)?;

    match command {
        ImageCommands::List { region, image_type } => {
            let images = client.images.list_images(&region, &image_type).await?;
            emit(formatter, &formatter.format_images(&images));
        }
        ImageCommands::Find {
            region,
            name,
            image_type,
        } => {
            let id = client.images.find_image_id(&region, &name, &image_type).await?;
            if formatter.is_json() {
                let json = serde_json::json!({ "region": region, "name": name, "type": image_type, "id": id });
                emit(formatter, &serde_json::to_string_pretty(&json).unwrap_or_default());
            } else {
                emit(formatter, &format!("{id}\n"));
            }
        }
    }
    Ok(true)
}

/// Start tracking an existing attachment.
async fn cmd_import(config_path: Option<&PathBuf>, id: &str, formatter: &OutputFormatter) -> Result<bool> {
    let (manifest, state_store) = load_manifest_and_state(config_path)?;
    let client = create_client(&manifest)?;

    let outcome = Reconciler::new(&client, &state_store)
        .import_attachment(&manifest, id)
        .await?;
    emit(formatter, &formatter.format_outcome(&outcome));

    Ok(!outcome.diagnostics.has_errors())
}

/// Show tracked state.
async fn cmd_state_show(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<bool> {
    let (_, state_store) = load_manifest_and_state(config_path)?;

    match state_store.load().await? {
        Some(state) => emit(formatter, &formatter.format_state(&state)),
        None => {
            debug!("No state file yet");
            emit(formatter, &formatter.format_state(&ProviderState::new()));
        }
    }
    Ok(true)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Writes command output: JSON to stdout, text to stderr.
fn emit(formatter: &OutputFormatter, output: &str) {
    if formatter.is_json() {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", output.trim_end());
    } else {
        eprint!("{output}");
    }
}

/// Asks for a yes/no answer on stdin.
fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N]: ");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Resolves the manifest path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path.clone()),
        None => find_config_file(std::env::current_dir()?),
    }
}

/// Loads `.env` and the manifest, returning it with its directory.
fn load_manifest(config_path: Option<&PathBuf>) -> Result<(Manifest, PathBuf)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading manifest from: {}", config_file.display());

    let base_dir = config_file
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let parser = ConfigParser::new().with_base_path(&base_dir);
    parser.load_dotenv()?;

    Ok((parser.load_with_env(&config_file)?, base_dir))
}

/// Loads the manifest if one is given or found; server and image commands
/// work without one.
fn load_manifest_or_default(config_path: Option<&PathBuf>) -> Result<Manifest> {
    if config_path.is_some() {
        return Ok(load_manifest(config_path)?.0);
    }

    match load_manifest(None) {
        Ok((manifest, _)) => Ok(manifest),
        Err(e) => {
            debug!("No manifest loaded ({e}), using defaults");
            ConfigParser::new().load_dotenv()?;
            let mut manifest = Manifest::default();
            ConfigParser::apply_env_overrides(&mut manifest, |name| std::env::var(name).ok());
            Ok(manifest)
        }
    }
}

/// Loads the manifest and creates the state store next to it.
fn load_manifest_and_state(config_path: Option<&PathBuf>) -> Result<(Manifest, Box<dyn StateStore>)> {
    let (manifest, base_dir) = load_manifest(config_path)?;

    let state_store: Box<dyn StateStore> = match &manifest.state.path {
        Some(path) => Box::new(LocalStateStore::with_state_path(base_dir.join(path))),
        None => Box::new(LocalStateStore::with_base_dir(base_dir.join(STATE_DIR))),
    };
    debug!("Using {} state backend", state_store.backend_type());

    Ok((manifest, state_store))
}

/// Creates the API clients from the provider settings.
fn create_client(manifest: &Manifest) -> Result<IaasClient> {
    let api_key = ConfigParser::api_key()?;
    let provider = &manifest.provider;
    let requester = HttpRequester::with_options(&api_key, &provider.api_url, provider.timeout_secs)?;
    debug!("Using API at {}", requester.base_url());

    Ok(IaasClient::new(Arc::new(requester), provider.region_set()))
}
