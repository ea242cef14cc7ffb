use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};

use podflow::config::Config;
use podflow::engine::{DryRunRunner, Executor, RunStatus, StepState};
use podflow::render::{render_pod, render_workflow, to_json_list, to_yaml_documents};
use podflow::templates::TemplateRegistry;
use podflow::workflow::{
    load_workflow_file, workflow_schema, SchedulePlan, StepGraph, WorkflowDefinition,
    WorkflowSchemaValidator,
};

#[derive(Parser)]
#[command(name = "podflow")]
#[command(about = "Scheduled container workflow definitions for Kubernetes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow definition
    Validate {
        /// Workflow file or built-in template name
        workflow: String,
    },
    /// Show workflow details
    Show {
        /// Workflow file or built-in template name
        workflow: String,
    },
    /// Show the step dependency graph
    Dag {
        /// Workflow file or built-in template name
        workflow: String,
        /// Show execution order instead of tree
        #[arg(long)]
        order: bool,
    },
    /// Show upcoming or due scheduled runs
    Schedule {
        /// Workflow file or built-in template name
        workflow: String,
        /// Number of upcoming runs to show
        #[arg(short, long, default_value = "5")]
        count: usize,
        /// Activation time (RFC3339, default: now)
        #[arg(long)]
        after: Option<String>,
        /// List runs due by now for a workflow activated at --after
        #[arg(long)]
        due: bool,
    },
    /// Render step pod manifests
    Render {
        /// Workflow file or built-in template name
        workflow: String,
        /// Render a single step
        #[arg(short, long)]
        step: Option<String>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },
    /// Evaluate one run without touching a cluster
    Run {
        /// Workflow file or built-in template name
        workflow: String,
        /// Make every attempt of this step fail (repeatable)
        #[arg(long = "fail")]
        fail: Vec<String>,
        /// Logical date of the run (RFC3339, default: next scheduled firing)
        #[arg(long)]
        logical_date: Option<String>,
        /// Seconds to wait between attempts
        #[arg(long, default_value = "0")]
        retry_delay: u64,
        /// Print the run record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Browse built-in workflow templates
    Templates {
        #[command(subcommand)]
        action: TemplateActions,
    },
    /// Print the workflow JSON Schema
    Schema,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand)]
enum TemplateActions {
    /// List available templates
    List,
    /// Show a template's YAML
    Show {
        /// Template name
        name: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum CompletionShell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
            CompletionShell::PowerShell => Shell::PowerShell,
            CompletionShell::Elvish => Shell::Elvish,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    podflow::telemetry::init_tracing(config.logging.level.as_deref());

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { workflow } => cmd_validate(&config, &workflow)?,
        Commands::Show { workflow } => cmd_show(&config, &workflow)?,
        Commands::Dag { workflow, order } => cmd_dag(&config, &workflow, order)?,
        Commands::Schedule {
            workflow,
            count,
            after,
            due,
        } => cmd_schedule(&config, &workflow, count, after.as_deref(), due)?,
        Commands::Render {
            workflow,
            step,
            format,
        } => cmd_render(&config, &workflow, step.as_deref(), format)?,
        Commands::Run {
            workflow,
            fail,
            logical_date,
            retry_delay,
            json,
        } => {
            cmd_run(
                &config,
                &workflow,
                &fail,
                logical_date.as_deref(),
                retry_delay,
                json,
            )
            .await?
        }
        Commands::Templates { action } => match action {
            TemplateActions::List => cmd_templates_list()?,
            TemplateActions::Show { name } => cmd_templates_show(&name)?,
        },
        Commands::Schema => cmd_schema()?,
        Commands::Completions { shell } => cmd_completions(shell)?,
    }

    Ok(())
}

/// Generate shell completions
fn cmd_completions(shell: CompletionShell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let shell: Shell = shell.into();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolve a workflow argument: a file path, a name in the configured
/// workflows directory, or a built-in template.
fn resolve_workflow(config: &Config, arg: &str) -> anyhow::Result<WorkflowDefinition> {
    let path = Path::new(arg);
    if path.is_file() {
        return Ok(load_workflow_file(path)?);
    }
    if let Some(found) = config.find_workflow(arg) {
        return Ok(load_workflow_file(&found)?);
    }

    let registry = TemplateRegistry::new();
    if registry.get(arg).is_some() {
        return Ok(registry.load(arg)?);
    }

    anyhow::bail!("Workflow not found: {} (not a file or a built-in template)", arg)
}

fn parse_time(value: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow::anyhow!("Invalid timestamp '{}': {}", value, e))
}

// ============================================================================
// Workflow Commands
// ============================================================================

fn cmd_validate(config: &Config, arg: &str) -> anyhow::Result<()> {
    let path = Path::new(arg);

    // For files, report every schema violation before the first semantic error.
    let workflow = if path.is_file() {
        let content = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_yaml::from_str(&content)?;
        let violations = WorkflowSchemaValidator::new()?.validate_detailed(&value);
        if !violations.is_empty() {
            println!("✗ {} schema violation(s):", violations.len());
            for violation in &violations {
                println!("  {}: {}", violation.path, violation.message);
            }
            anyhow::bail!("Workflow '{}' is invalid", arg);
        }
        load_workflow_file(path)?
    } else {
        resolve_workflow(config, arg)?
    };

    let plan = SchedulePlan::new(&workflow, Utc::now())?;

    println!("✓ Workflow '{}' is valid", workflow.name);
    println!();
    println!("  Steps: {}", workflow.steps.len());
    println!("  Edges: {}", workflow.edges.len());
    println!("  Schedule: {}", workflow.schedule);
    println!("  Next run: {}", plan.next_run(Utc::now())?.to_rfc3339());

    let config_maps = workflow.config_maps();
    if !config_maps.is_empty() {
        println!("  ConfigMaps required: {}", config_maps.join(", "));
    }
    let secrets = workflow.secrets();
    if !secrets.is_empty() {
        println!("  Secrets required: {}", secrets.join(", "));
    }

    Ok(())
}

fn cmd_show(config: &Config, arg: &str) -> anyhow::Result<()> {
    let workflow = resolve_workflow(config, arg)?;
    let options = config.render_options();

    println!("Workflow: {}", workflow.name);
    if !workflow.description.is_empty() {
        println!("Description: {}", workflow.description);
    }
    println!(
        "Schedule: {} ({})",
        workflow.schedule,
        workflow.timezone.as_deref().unwrap_or("UTC")
    );
    println!("Catchup: {}", workflow.catchup);
    if !workflow.tags.is_empty() {
        println!("Tags: {}", workflow.tags.join(", "));
    }
    println!(
        "Defaults: owner={} retries={} retry_delay={}s depends_on_past={}",
        workflow.default_args.owner,
        workflow.default_args.retries,
        workflow.default_args.retry_delay_seconds,
        workflow.default_args.depends_on_past
    );
    println!();

    println!(
        "{:<20} {:<22} {:<12} {:<26} {:<8} {:<10}",
        "STEP", "POD", "NAMESPACE", "IMAGE", "RETRIES", "ON FINISH"
    );
    println!("{}", "-".repeat(100));

    for step in &workflow.steps {
        let on_finish = serde_json::to_value(step.on_finish)?;
        println!(
            "{:<20} {:<22} {:<12} {:<26} {:<8} {:<10}",
            step.id,
            step.name,
            podflow::render::step_namespace(step, &options),
            step.image,
            workflow.effective_retries(step),
            on_finish.as_str().unwrap_or_default()
        );
    }

    if !workflow.edges.is_empty() {
        println!();
        println!("Edges:");
        for edge in &workflow.edges {
            println!("  {} -> {}", edge.upstream, edge.downstream);
        }
    }

    Ok(())
}

fn cmd_dag(config: &Config, arg: &str, show_order: bool) -> anyhow::Result<()> {
    let workflow = resolve_workflow(config, arg)?;
    let graph = StepGraph::from_definition(&workflow);

    if show_order {
        let order = graph.execution_order()?;
        println!("Execution order for '{}':", workflow.name);
        println!();
        for (i, step) in order.iter().enumerate() {
            println!("  {}. {}", i + 1, step);
        }
    } else {
        println!("Step graph for '{}':", workflow.name);
        println!();
        print!("{}", graph.to_text());
    }

    Ok(())
}

fn cmd_schedule(
    config: &Config,
    arg: &str,
    count: usize,
    after: Option<&str>,
    due: bool,
) -> anyhow::Result<()> {
    let workflow = resolve_workflow(config, arg)?;
    let now = Utc::now();
    let activation = after.map(parse_time).transpose()?.unwrap_or(now);
    let plan = SchedulePlan::new(&workflow, activation)?;

    println!(
        "Schedule: {} ({})",
        plan.schedule().expression(),
        workflow.timezone.as_deref().unwrap_or("UTC")
    );
    println!("Start: {}", plan.start().to_rfc3339());
    println!("Activated: {}", plan.activation().to_rfc3339());
    println!();

    if due {
        let runs = plan.due_runs(now)?;
        if runs.is_empty() {
            println!("No runs due.");
        } else {
            println!("Due runs ({}):", runs.len());
            for run in runs {
                println!("  {}", run.to_rfc3339());
            }
        }
        return Ok(());
    }

    println!("Next {} run(s):", count);
    if count > 0 {
        let first = plan.next_run(activation)?;
        println!("  {}", first.to_rfc3339());
        for next in plan.schedule().upcoming(first, count - 1)? {
            println!("  {}", next.to_rfc3339());
        }
    }

    Ok(())
}

fn cmd_render(
    config: &Config,
    arg: &str,
    step_id: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let workflow = resolve_workflow(config, arg)?;
    let options = config.render_options();
    let run_id = uuid::Uuid::new_v4().simple().to_string();

    let pods = match step_id {
        Some(id) => {
            let step = workflow
                .get_step(id)
                .ok_or_else(|| anyhow::anyhow!("Step not found: {}", id))?;
            vec![render_pod(&workflow, step, &run_id, &options)?]
        }
        None => render_workflow(&workflow, &run_id, &options)?,
    };

    match format {
        OutputFormat::Yaml => print!("{}", to_yaml_documents(&pods)?),
        OutputFormat::Json => println!("{}", to_json_list(&pods)?),
    }

    Ok(())
}

async fn cmd_run(
    config: &Config,
    arg: &str,
    fail: &[String],
    logical_date: Option<&str>,
    retry_delay: u64,
    json: bool,
) -> anyhow::Result<()> {
    let workflow = resolve_workflow(config, arg)?;

    for id in fail {
        if workflow.get_step(id).is_none() {
            anyhow::bail!("Step not found: {}", id);
        }
    }

    let logical_date = match logical_date {
        Some(value) => parse_time(value)?,
        None => SchedulePlan::new(&workflow, Utc::now())?.next_run(Utc::now())?,
    };

    let runner = fail
        .iter()
        .fold(DryRunRunner::new(), |runner, id| runner.failing(id.clone()));

    let executor = Executor::new()
        .with_render_options(config.render_options())
        .with_retry_delay(Duration::from_secs(retry_delay));

    let run = executor.execute(&workflow, logical_date, &runner).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        let icon = if run.status == RunStatus::Success { "✓" } else { "✗" };
        println!("{} Run {} of '{}': {}", icon, run.id, run.workflow_name, run.status);
        println!("  Logical date: {}", run.logical_date.to_rfc3339());
        println!();

        println!(
            "{:<20} {:<16} {:<9} {:<10} ERROR",
            "STEP", "STATE", "ATTEMPTS", "POD"
        );
        println!("{}", "-".repeat(80));
        for step in &run.steps {
            let disposal = match step.disposal() {
                Some(d) => serde_json::to_value(d)?
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                None => "-".to_string(),
            };
            println!(
                "{:<20} {:<16} {:<9} {:<10} {}",
                step.step_id,
                step.state,
                step.attempts.len(),
                disposal,
                step.error.as_deref().unwrap_or("")
            );
        }

        let failed_logs: Vec<_> = run
            .steps
            .iter()
            .filter(|s| s.state == StepState::Failed && !s.logs.is_empty())
            .collect();
        for step in failed_logs {
            println!();
            println!("Logs for '{}':", step.step_id);
            for (i, logs) in step.logs.iter().enumerate() {
                println!("  [attempt {}] {}", i + 1, logs);
            }
        }
    }

    if run.status != RunStatus::Success {
        anyhow::bail!("Workflow run failed");
    }

    Ok(())
}

// ============================================================================
// Template Commands
// ============================================================================

fn cmd_templates_list() -> anyhow::Result<()> {
    let registry = TemplateRegistry::new();
    let templates = registry.list();

    if templates.is_empty() {
        println!("No templates available.");
        return Ok(());
    }

    println!("{:<25} DESCRIPTION", "NAME");
    println!("{}", "-".repeat(70));

    for template in templates {
        println!("{:<25} {}", template.name, template.description);
    }

    println!();
    println!("Use a template with: podflow show <name>");

    Ok(())
}

fn cmd_templates_show(name: &str) -> anyhow::Result<()> {
    let registry = TemplateRegistry::new();
    let template = registry
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("Template not found: {}", name))?;

    println!("Template: {}", template.name);
    println!("Description: {}", template.description);
    println!();
    println!("---");
    print!("{}", template.content);

    Ok(())
}

fn cmd_schema() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&workflow_schema())?);
    Ok(())
}
