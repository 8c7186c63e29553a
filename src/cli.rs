use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Args, Parser, ValueEnum};
use serde_json::Value;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use obligraph::client::{API_BASE_ENV_VAR, EvaluateOptions, EvaluationClient};
#[cfg(feature = "server")]
use obligraph::serve::{ServeArgs, run_serve};
use obligraph::summary::{GroupBy, ObligationFilter, summarize_by};
use obligraph::svg::render_svg;
use obligraph::{CharWidthMeasure, EvaluationResult, LayoutConfig, MemoizedMeasure, Scene};

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputKind {
    Diagram,
    Layout,
    EvaluationResult,
}

impl OutputKind {
    fn written_message(self, path: &Path) -> String {
        let what = match self {
            OutputKind::Diagram => "Generated diagram",
            OutputKind::Layout => "Saved layout",
            OutputKind::EvaluationResult => "Saved evaluation result",
        };
        format!("{what} -> {}", path.display())
    }
}

/// Overrides applied on top of the loaded layout configuration.
#[derive(Debug, Clone, Args)]
struct LayoutFlags {
    /// Layout configuration file (JSON).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Canvas width in pixels.
    #[arg(long = "width")]
    width: Option<f32>,

    /// Canvas height in pixels.
    #[arg(long = "height")]
    height: Option<f32>,

    /// Maximum number of derived facts to draw.
    #[arg(long = "max-derived")]
    max_derived: Option<usize>,

    /// Maximum number of obligations drawn per rule.
    #[arg(long = "max-obligations")]
    max_obligations: Option<usize>,
}

impl LayoutFlags {
    fn resolve(&self) -> Result<LayoutConfig> {
        let config = LayoutConfig::load(self.config.as_deref())?;
        Ok(self.apply(config))
    }

    fn apply(&self, mut config: LayoutConfig) -> LayoutConfig {
        if let Some(width) = self.width {
            config.canvas.width = width;
        }
        if let Some(height) = self.height {
            config.canvas.height = height;
        }
        if let Some(max_derived) = self.max_derived {
            config.limits.max_derived = max_derived;
        }
        if let Some(max_obligations) = self.max_obligations {
            config.limits.max_obligations_per_rule = max_obligations;
        }
        config
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "obligraph",
    about = "Render compliance evaluation results as a facts -> rules -> obligations diagram."
)]
pub struct RenderArgs {
    /// Path to the evaluation result (JSON). Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    #[command(flatten)]
    layout: LayoutFlags,

    /// Background color for the rendered diagram.
    #[arg(short = 'b', long = "background-color", default_value = "white")]
    background_color: String,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Parser)]
#[command(name = "obligraph layout", about = "Print the computed diagram geometry as JSON.")]
pub struct LayoutArgs {
    /// Path to the evaluation result (JSON). Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    #[command(flatten)]
    layout: LayoutFlags,

    /// Pretty-print the JSON output.
    #[arg(long = "pretty", action = ArgAction::SetTrue)]
    pretty: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "obligraph summary",
    about = "Count obligations per jurisdiction or category."
)]
pub struct SummaryArgs {
    /// Path to the evaluation result (JSON). Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Group counts by jurisdiction or by category.
    #[arg(long = "by", value_enum, default_value_t = GroupBy::Jurisdiction)]
    by: GroupBy,

    /// Only count obligations of this jurisdiction, e.g. "Federal" or "State (CA)".
    #[arg(long = "jurisdiction")]
    jurisdiction: Option<String>,

    /// Only count obligations of this category, e.g. "Privacy".
    #[arg(long = "category")]
    category: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum EvaluateFormat {
    Json,
    Svg,
}

#[derive(Debug, Parser)]
#[command(
    name = "obligraph evaluate",
    about = "Send a business profile to the evaluation service and save the result."
)]
pub struct EvaluateArgs {
    /// Business profile to evaluate (JSON). Use '-' to read from stdin.
    #[arg(short = 'p', long = "profile")]
    profile: String,

    /// Base URL of the evaluation service (defaults to $OBLIGRAPH_API_BASE).
    #[arg(long = "api-base")]
    api_base: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: String,

    /// Write the raw result or a rendered diagram.
    #[arg(short = 'f', long = "format", value_enum, default_value_t = EvaluateFormat::Json)]
    format: EvaluateFormat,

    /// Reuse an idempotency key instead of generating one.
    #[arg(long = "idempotency-key")]
    idempotency_key: Option<String>,

    /// Request timeout in seconds.
    #[arg(long = "timeout", default_value_t = 20)]
    timeout_secs: u64,

    #[command(flatten)]
    layout: LayoutFlags,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Parser)]
#[command(name = "obligraph health", about = "Check the evaluation service status.")]
pub struct HealthArgs {
    /// Base URL of the evaluation service (defaults to $OBLIGRAPH_API_BASE).
    #[arg(long = "api-base")]
    api_base: Option<String>,
}

fn compute_scene(result: Option<&EvaluationResult>, config: &LayoutConfig) -> Scene {
    let measure = MemoizedMeasure::new(CharWidthMeasure::new(config.wrap.char_width));
    Scene::compute(result, config, &measure)
}

fn run_render(cli: RenderArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let output_dest = parse_output(cli.output.as_deref(), &input_source, "svg")?;
    let config = cli.layout.resolve()?;

    let result = load_result(&input_source)?;
    let scene = compute_scene(result.as_ref(), &config);
    let svg = render_svg(&scene, &cli.background_color)?;

    write_output(output_dest, svg.as_bytes(), OutputKind::Diagram, cli.quiet)
}

fn run_layout(cli: LayoutArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let output_dest = match cli.output.as_deref() {
        None => OutputDestination::Stdout,
        other => parse_output(other, &input_source, "json")?,
    };
    let config = cli.layout.resolve()?;

    let result = load_result(&input_source)?;
    let scene = compute_scene(result.as_ref(), &config);
    let mut json = if cli.pretty {
        serde_json::to_string_pretty(&scene)?
    } else {
        serde_json::to_string(&scene)?
    };
    json.push('\n');

    write_output(output_dest, json.as_bytes(), OutputKind::Layout, true)
}

fn run_summary(cli: SummaryArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let result = load_result(&input_source)?;
    let filter = ObligationFilter {
        jurisdiction: cli.jurisdiction,
        category: cli.category,
    };
    let counts = summarize_by(result.as_ref(), cli.by, &filter);

    if counts.is_empty() {
        println!("No obligations.");
        return Ok(());
    }
    let name_width = counts.iter().map(|entry| entry.name.len()).max().unwrap_or(0);
    for entry in counts {
        println!("{:<name_width$}  {}", entry.name, entry.value);
    }
    Ok(())
}

fn api_base(explicit: Option<String>) -> Result<String> {
    explicit
        .or_else(|| std::env::var(API_BASE_ENV_VAR).ok())
        .filter(|base| !base.trim().is_empty())
        .ok_or_else(|| anyhow!("no evaluation service configured; pass --api-base or set {API_BASE_ENV_VAR}"))
}

async fn run_evaluate(cli: EvaluateArgs) -> Result<()> {
    if cli.timeout_secs == 0 {
        bail!("--timeout must be greater than zero");
    }

    let client = EvaluationClient::new(api_base(cli.api_base.clone())?);
    let profile_source = parse_input(Some(cli.profile.as_str()))?;
    let profile: Value = serde_json::from_str(&load_definition(&profile_source)?)
        .context("business profile is not valid JSON")?;

    let options = EvaluateOptions {
        idempotency_key: cli.idempotency_key.clone(),
        timeout: Duration::from_secs(cli.timeout_secs),
    };
    let result = client
        .evaluate(&profile, &options)
        .await
        .with_context(|| format!("evaluation request to {} failed", client.url("/api/evaluate")))?;

    let (bytes, kind) = match cli.format {
        EvaluateFormat::Json => {
            let mut json = serde_json::to_string_pretty(&result)?;
            json.push('\n');
            (json.into_bytes(), OutputKind::EvaluationResult)
        }
        EvaluateFormat::Svg => {
            let config = cli.layout.resolve()?;
            let scene = compute_scene(Some(&result), &config);
            (render_svg(&scene, "white")?.into_bytes(), OutputKind::Diagram)
        }
    };

    let dest = parse_output(Some(cli.output.as_str()), &profile_source, "json")?;
    write_output(dest, &bytes, kind, cli.quiet)
}

async fn run_health(cli: HealthArgs) -> Result<()> {
    let client = EvaluationClient::new(api_base(cli.api_base)?);
    let status = client
        .health()
        .await
        .with_context(|| format!("health check against {} failed", client.url("/api/health/status")))?;
    println!(
        "ok={} version={} ruleset={}",
        status.ok, status.version, status.ruleset
    );
    Ok(())
}

fn subcommand_args(args: &[String]) -> impl Iterator<Item = String> + '_ {
    std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned())
}

pub async fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            #[cfg(feature = "server")]
            {
                run_serve(ServeArgs::parse_from(subcommand_args(&args))).await
            }
            #[cfg(not(feature = "server"))]
            {
                Err(anyhow!(
                    "'serve' command requires the 'server' feature to be enabled"
                ))
            }
        }
        Some("render") => run_render(RenderArgs::parse_from(subcommand_args(&args))),
        Some("layout") => run_layout(LayoutArgs::parse_from(subcommand_args(&args))),
        Some("summary") => run_summary(SummaryArgs::parse_from(subcommand_args(&args))),
        Some("evaluate") => run_evaluate(EvaluateArgs::parse_from(subcommand_args(&args))).await,
        Some("health") => run_health(HealthArgs::parse_from(subcommand_args(&args))).await,
        _ => run_render(RenderArgs::parse_from(args)),
    }
}

fn parse_input(input: Option<&str>) -> Result<InputSource> {
    match input {
        Some("-") => Ok(InputSource::Stdin),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
        None => Ok(InputSource::Stdin),
    }
}

fn parse_output(
    output: Option<&str>,
    input: &InputSource,
    extension: &str,
) -> Result<OutputDestination> {
    match output {
        Some("-") => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
        None => match input {
            InputSource::File(path) => Ok(OutputDestination::File(sibling_path(path, extension))),
            InputSource::Stdin => Ok(OutputDestination::File(PathBuf::from(format!(
                "out.{extension}"
            )))),
        },
    }
}

/// `result.json` -> `result.svg` next to the input.
fn sibling_path(path: &Path, extension: &str) -> PathBuf {
    let mut default_path = path.to_path_buf();
    default_path.set_extension(extension);
    if default_path == path {
        default_path.set_extension(format!("{extension}.{extension}"));
    }
    default_path
}

fn load_definition(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                Err(anyhow!("no JSON document supplied on stdin"))
            } else {
                Ok(buffer)
            }
        }
        InputSource::File(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            if contents.trim().is_empty() {
                Err(anyhow!("input file '{}' was empty", path.display()))
            } else {
                Ok(contents)
            }
        }
    }
}

/// A literal `null` document means no evaluation has run yet.
fn load_result(source: &InputSource) -> Result<Option<EvaluationResult>> {
    let contents = load_definition(source)?;
    let value: Value =
        serde_json::from_str(&contents).context("evaluation result is not valid JSON")?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(EvaluationResult::from_json(&value)))
}

fn write_output(
    dest: OutputDestination,
    bytes: &[u8],
    kind: OutputKind,
    quiet: bool,
) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                println!("{}", kind.written_message(&path));
            }
        }
    }
    Ok(())
}
