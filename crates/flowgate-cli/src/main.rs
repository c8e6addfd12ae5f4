// crates/flowgate-cli/src/main.rs
// ============================================================================
// Module: Flowgate CLI Entry Point
// Description: Command dispatcher for running the HTTP server, driving the
//              Flow API against a running server, and validating/printing
//              flow graph definitions offline.
// Purpose: Give operators and flow authors a single binary for the three
//          day-to-day tasks: serve, exercise, inspect.
// Dependencies: clap, flowgate_config, flowgate_core, flowgate_http, reqwest,
//               serde, serde_json, thiserror, tokio.
// ============================================================================

//! ## Overview
//! `flowgate` is a thin wrapper: `serve` builds the same `Executor` the HTTP
//! layer exercises in tests, loading flow graphs from a directory of JSON
//! files; `flow` is a `reqwest`-based client for the public HTTP API; `graph`
//! compiles a graph definition offline, without a server or network, to
//! validate it and print its compiled shape.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use flowgate_config::FlowEngineConfig;
use flowgate_core::core::graph::GraphDefinition;
use flowgate_core::core::identifiers::FlowType;
use flowgate_core::runtime::compiler::compile;
use flowgate_core::runtime::registry::InMemoryFlowRegistry;
use flowgate_core::runtime::store::ShardedStateStore;
use flowgate_core::Executor;
use flowgate_http::HttpServerConfig;
use flowgate_http::TlsPaths;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "flowgate", disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Flow API HTTP server.
    Serve(ServeCommand),
    /// Exercise the public Flow API against a running server.
    Flow {
        /// Selected flow subcommand.
        #[command(subcommand)]
        command: FlowCommand,
    },
    /// Offline flow graph definition utilities.
    Graph {
        /// Selected graph subcommand.
        #[command(subcommand)]
        command: GraphCommand,
    },
}

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional engine config file path (defaults to flowgate.toml or `FLOWGATE_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Directory of `{flowType}.json` graph definitions to preload into the registry.
    #[arg(long, value_name = "DIR")]
    graphs: PathBuf,
    /// Socket address to bind.
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
    /// PEM certificate chain path; enables TLS when set together with `--tls-key`.
    #[arg(long, value_name = "PATH", requires = "tls_key")]
    tls_cert: Option<PathBuf>,
    /// PEM private key path; enables TLS when set together with `--tls-cert`.
    #[arg(long, value_name = "PATH", requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

/// Flow API client subcommands.
#[derive(Subcommand, Debug)]
enum FlowCommand {
    /// Initializes a new session.
    Init(FlowInitCommand),
    /// Submits a capability response for a session.
    Submit(FlowSubmitCommand),
    /// Fetches a session's current state and UI Contract.
    State(FlowStateCommand),
    /// Cancels a session.
    Cancel(FlowCancelCommand),
}

/// Shared arguments for reaching a running Flow API server.
#[derive(Args, Debug, Clone)]
struct ServerArgs {
    /// Base URL of the running Flow API server.
    #[arg(long, value_name = "URL", default_value = "http://127.0.0.1:8080")]
    server: String,
}

/// Arguments for `flow init`.
#[derive(Args, Debug)]
struct FlowInitCommand {
    /// Flow API server connection settings.
    #[command(flatten)]
    server: ServerArgs,
    /// Flow type to initialize.
    #[arg(long, value_name = "TYPE")]
    flow_type: String,
    /// Client identifier bound to the new session.
    #[arg(long, value_name = "CLIENT_ID")]
    client_id: String,
    /// Optional tenant identifier.
    #[arg(long, value_name = "TENANT_ID")]
    tenant_id: Option<String>,
    /// Optional JSON object of OAuth passthrough parameters.
    #[arg(long, value_name = "JSON")]
    oauth_params: Option<String>,
}

/// Arguments for `flow submit`.
#[derive(Args, Debug)]
struct FlowSubmitCommand {
    /// Flow API server connection settings.
    #[command(flatten)]
    server: ServerArgs,
    /// Session to advance.
    #[arg(long, value_name = "SESSION_ID")]
    session_id: String,
    /// Caller-supplied idempotency key.
    #[arg(long, value_name = "REQUEST_ID")]
    request_id: String,
    /// Capability being fulfilled.
    #[arg(long, value_name = "CAPABILITY_ID")]
    capability_id: String,
    /// JSON capability response payload.
    #[arg(long, value_name = "JSON")]
    response: String,
    /// Optional tenant id to re-validate against the session's bound identity.
    #[arg(long, value_name = "TENANT_ID")]
    tenant_id: Option<String>,
    /// Optional client id to re-validate against the session's bound identity.
    #[arg(long, value_name = "CLIENT_ID")]
    client_id: Option<String>,
}

/// Arguments for `flow state`.
#[derive(Args, Debug)]
struct FlowStateCommand {
    /// Flow API server connection settings.
    #[command(flatten)]
    server: ServerArgs,
    /// Session to inspect.
    #[arg(long, value_name = "SESSION_ID")]
    session_id: String,
}

/// Arguments for `flow cancel`.
#[derive(Args, Debug)]
struct FlowCancelCommand {
    /// Flow API server connection settings.
    #[command(flatten)]
    server: ServerArgs,
    /// Session to cancel.
    #[arg(long, value_name = "SESSION_ID")]
    session_id: String,
}

/// Graph definition subcommands.
#[derive(Subcommand, Debug)]
enum GraphCommand {
    /// Validates a graph definition by compiling it.
    Validate(GraphInputCommand),
    /// Prints a graph definition's compiled plan as JSON.
    Print(GraphPrintCommand),
}

/// Shared input argument for graph subcommands.
#[derive(Args, Debug)]
struct GraphInputCommand {
    /// Path to a `GraphDefinition` JSON file.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
}

/// Arguments for `graph print`.
#[derive(Args, Debug)]
struct GraphPrintCommand {
    /// Path to a `GraphDefinition` JSON file.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Output format for the printed plan.
    #[arg(long, value_enum, default_value_t = PrintFormat::Pretty)]
    format: PrintFormat,
}

/// Output formats for `graph print`.
#[derive(ValueEnum, Copy, Clone, Debug)]
enum PrintFormat {
    /// Single-line JSON.
    Json,
    /// Indented, human-readable JSON.
    Pretty,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper, printed to stderr without a backtrace.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Builds a `CliError` from any displayable cause.
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Flow { command } => command_flow(command).await,
        Commands::Graph { command } => command_graph(command),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command: builds an in-memory registry from
/// `--graphs`, wires an `Executor`, and serves the public Flow API.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let engine_config = FlowEngineConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load engine config: {err}")))?;

    let registry = Arc::new(InMemoryFlowRegistry::new());
    load_graphs(&registry, &command.graphs).await?;

    let store = ShardedStateStore::new(engine_config.store.shard_count);
    let executor = Arc::new(Executor::new(registry, store));
    let sweep_interval = std::time::Duration::from_millis(engine_config.store.sweep_interval_ms);
    flowgate_http::spawn_ttl_sweeper(Arc::new(executor.store().clone()), sweep_interval);
    let app = flowgate_http::router(executor);

    let tls = match (command.tls_cert, command.tls_key) {
        (Some(cert_path), Some(key_path)) => Some(TlsPaths { cert_path, key_path }),
        _ => None,
    };
    let server_config = HttpServerConfig { bind: command.bind, tls };

    flowgate_http::serve(app, server_config)
        .await
        .map_err(|err| CliError::new(format!("server failed: {err}")))?;

    Ok(ExitCode::SUCCESS)
}

/// Loads every `{flowType}.json` file in `dir` into `registry`, unscoped to any tenant.
async fn load_graphs(registry: &InMemoryFlowRegistry, dir: &Path) -> CliResult<()> {
    let entries = fs::read_dir(dir).map_err(|err| CliError::new(format!("failed to read {}: {err}", dir.display())))?;
    let mut loaded = 0usize;
    for entry in entries {
        let entry = entry.map_err(|err| CliError::new(format!("failed to read directory entry: {err}")))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let graph = read_graph_definition(&path)?;
        registry.register(&FlowType::from(stem), None, graph).await;
        loaded += 1;
    }
    if loaded == 0 {
        return Err(CliError::new(format!("no graph definitions found under {}", dir.display())));
    }
    write_stderr_line(&format!("loaded {loaded} flow graph(s) from {}", dir.display()))
        .map_err(|err| CliError::new(format!("stderr write failed: {err}")))?;
    Ok(())
}

// ============================================================================
// SECTION: Flow Client Commands
// ============================================================================

/// Dispatches a `flow` subcommand.
async fn command_flow(command: FlowCommand) -> CliResult<ExitCode> {
    match command {
        FlowCommand::Init(command) => flow_init(command).await,
        FlowCommand::Submit(command) => flow_submit(command).await,
        FlowCommand::State(command) => flow_state(command).await,
        FlowCommand::Cancel(command) => flow_cancel(command).await,
    }
}

/// Builds a `reqwest` client shared by every flow subcommand.
fn http_client() -> CliResult<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|err| CliError::new(format!("failed to build http client: {err}")))
}

/// Executes `flow init`.
async fn flow_init(command: FlowInitCommand) -> CliResult<ExitCode> {
    let oauth_params = match command.oauth_params {
        Some(raw) => parse_json_object(&raw)?,
        None => serde_json::Map::new(),
    };
    let body = serde_json::json!({
        "flowType": command.flow_type,
        "clientId": command.client_id,
        "tenantId": command.tenant_id,
        "oauthParams": oauth_params,
    });
    let url = format!("{}/api/flow/init", command.server.server);
    post_and_print(&url, &body).await
}

/// Executes `flow submit`.
async fn flow_submit(command: FlowSubmitCommand) -> CliResult<ExitCode> {
    let response = parse_json_value(&command.response)?;
    let body = serde_json::json!({
        "sessionId": command.session_id,
        "requestId": command.request_id,
        "capabilityId": command.capability_id,
        "response": response,
        "tenantId": command.tenant_id,
        "clientId": command.client_id,
    });
    let url = format!("{}/api/flow/submit", command.server.server);
    post_and_print(&url, &body).await
}

/// Executes `flow state`.
async fn flow_state(command: FlowStateCommand) -> CliResult<ExitCode> {
    let client = http_client()?;
    let url = format!("{}/api/flow/state/{}", command.server.server, command.session_id);
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|err| CliError::new(format!("request to {url} failed: {err}")))?;
    print_response(response).await
}

/// Executes `flow cancel`.
async fn flow_cancel(command: FlowCancelCommand) -> CliResult<ExitCode> {
    let body = serde_json::json!({ "sessionId": command.session_id });
    let url = format!("{}/api/flow/cancel", command.server.server);
    post_and_print(&url, &body).await
}

/// Posts `body` as JSON to `url` and prints the response body.
async fn post_and_print(url: &str, body: &Value) -> CliResult<ExitCode> {
    let client = http_client()?;
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|err| CliError::new(format!("request to {url} failed: {err}")))?;
    print_response(response).await
}

/// Prints a `reqwest::Response` body to stdout, returning a non-zero exit
/// code for non-2xx statuses without treating that as a CLI-level failure.
async fn print_response(response: reqwest::Response) -> CliResult<ExitCode> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| CliError::new(format!("failed to read response body: {err}")))?;
    write_stdout_bytes(&bytes).map_err(|err| CliError::new(format!("stdout write failed: {err}")))?;
    if status.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Parses `raw` as a JSON object, rejecting any other JSON shape.
fn parse_json_object(raw: &str) -> CliResult<serde_json::Map<String, Value>> {
    match parse_json_value(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(CliError::new("expected a JSON object")),
    }
}

/// Parses `raw` as an arbitrary JSON value.
fn parse_json_value(raw: &str) -> CliResult<Value> {
    serde_json::from_str(raw).map_err(|err| CliError::new(format!("invalid JSON: {err}")))
}

// ============================================================================
// SECTION: Graph Commands
// ============================================================================

/// Dispatches a `graph` subcommand.
fn command_graph(command: GraphCommand) -> CliResult<ExitCode> {
    match command {
        GraphCommand::Validate(command) => graph_validate(command),
        GraphCommand::Print(command) => graph_print(command),
    }
}

/// Executes `graph validate`: compiles the graph and reports success or the
/// first violated invariant.
fn graph_validate(command: GraphInputCommand) -> CliResult<ExitCode> {
    let graph = read_graph_definition(&command.input)?;
    match compile(&graph) {
        Ok(plan) => {
            write_stdout_line(&format!(
                "graph '{}' (flowVersion {}) compiles: {} node(s)",
                graph.id.as_str(),
                graph.flow_version.as_str(),
                plan.nodes.len(),
            ))
            .map_err(|err| CliError::new(format!("stdout write failed: {err}")))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            write_stderr_line(&format!("graph '{}' is invalid: {err}", graph.id.as_str()))
                .map_err(|write_err| CliError::new(format!("stderr write failed: {write_err}")))?;
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Executes `graph print`: compiles the graph and prints its plan as JSON.
fn graph_print(command: GraphPrintCommand) -> CliResult<ExitCode> {
    let graph = read_graph_definition(&command.input)?;
    let plan = compile(&graph).map_err(|err| CliError::new(format!("graph is invalid: {err}")))?;
    let rendered = match command.format {
        PrintFormat::Json => serde_json::to_string(&plan),
        PrintFormat::Pretty => serde_json::to_string_pretty(&plan),
    }
    .map_err(|err| CliError::new(format!("failed to render plan: {err}")))?;
    write_stdout_line(&rendered).map_err(|err| CliError::new(format!("stdout write failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Reads and parses a `GraphDefinition` from `path`.
fn read_graph_definition(path: &Path) -> CliResult<GraphDefinition> {
    let bytes = fs::read(path).map_err(|err| CliError::new(format!("failed to read {}: {err}", path.display())))?;
    serde_json::from_slice(&bytes).map_err(|err| CliError::new(format!("invalid graph definition in {}: {err}", path.display())))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)?;
    writeln!(&mut stdout)
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Prints a fatal error to stderr and returns a failing exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
