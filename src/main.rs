use clap::{Parser, Subcommand};
use pageship::config::{self, BuildContext, DeployConfig};
use pageship::deploy::{self, AzCli};
use pageship::pipeline::{self, PipelineError};
use pageship::{output, routes};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pageship")]
#[command(about = "Deploy a compiled file-routed web app to a function host and blob storage")]
#[command(long_about = "\
Deploy a compiled file-routed web app to a function host and blob storage

pageship reads the upstream compiler's output, turns every server-rendered
page into its own function, orders the route-proxy table most-specific-first
and deploys the result.

Build layout:

  workspace/
  ├── pageship.toml                 # Deployment config
  ├── build/
  │   ├── serverless/pages/
  │   │   ├── _app.js               # Reserved shell, never deployed on its own
  │   │   ├── index.html            # Static page → blob container
  │   │   ├── [id].js               # Dynamic page → function
  │   │   └── docs/[...path].js     # Catch-all → function
  │   └── static/                   # Build assets → container _next/static/
  └── public/                       # Author assets → container public/

CI context:
  GITHUB_WORKSPACE    workspace root when --workspace is not given
  GITHUB_REF          refs/pull/<n>/merge selects an ephemeral deployment

Run 'pageship gen-config' to generate a documented pageship.toml.")]
#[command(version)]
struct Cli {
    /// Workspace root (defaults to $GITHUB_WORKSPACE, then the current directory)
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Config file (defaults to <workspace>/pageship.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for the package and asset trees
    #[arg(long, default_value = ".pageship", global = true)]
    out: PathBuf,

    /// Deploy per change request (defaults to the number in $GITHUB_REF)
    #[arg(long, global = true)]
    pr: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

/// Shared flags for commands that touch the cloud.
#[derive(clap::Args, Clone)]
struct CloudArgs {
    /// Log the cloud commands instead of running them
    #[arg(long)]
    dry_run: bool,
}

/// Shared flags for commands that list pipeline data.
#[derive(clap::Args, Clone)]
struct ListArgs {
    /// Print JSON instead of the readable listing
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List page modules with their kind and function name
    Classify(ListArgs),
    /// Print the ordered route-proxy table
    Routes {
        #[command(flatten)]
        list: ListArgs,
        /// Resolve a request path against the table instead
        #[arg(long = "match", value_name = "PATH")]
        match_path: Option<String>,
    },
    /// Write the function package and asset trees
    Package,
    /// Deploy the output of an earlier `package` run
    Deploy(CloudArgs),
    /// Run the full pipeline: classify → package → deploy
    Build(CloudArgs),
    /// Delete the function app, asset container and telemetry component of a
    /// change-request deployment
    Teardown(CloudArgs),
    /// Print a stock pageship.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match &cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Classify(list) => {
            let run = Run::load(&cli)?;
            let plan = pipeline::plan(&run.config, run.workspace())?;
            if list.json {
                println!("{}", serde_json::to_string_pretty(&plan.pages)?);
            } else {
                output::print_classify_output(&plan.pages);
            }
        }
        Command::Routes { list, match_path } => {
            let run = Run::load(&cli)?;
            let plan = pipeline::plan(&run.config, run.workspace())?;
            match match_path {
                Some(path) => {
                    let matched = routes::resolve(&plan.routes, path)
                        .map_err(PipelineError::from)?;
                    output::print_match_output(
                        path,
                        matched.as_ref().map(|(e, c)| (*e, c.as_slice())),
                    );
                }
                None if list.json => {
                    println!("{}", serde_json::to_string_pretty(&plan.routes)?);
                }
                None => output::print_routes_output(&plan.routes),
            }
        }
        Command::Package => {
            let run = Run::load(&cli)?;
            let plan = pipeline::plan(&run.config, run.workspace())?;
            let packaged =
                pipeline::package_plan(&plan, &run.config, run.workspace(), &run.out_dir)?;
            output::print_package_output(&packaged);
        }
        Command::Deploy(cloud) => {
            let run = Run::load(&cli)?;
            let provider = provider(cloud);
            let (target, report) = pipeline::deploy_package(&provider, &run.config, &run.out_dir)?;
            println!("{}", output::format_target(&target));
            output::print_deploy_output(&report);
        }
        Command::Build(cloud) => {
            let run = Run::load(&cli)?;
            let provider = provider(cloud);
            let workspace = run.workspace();

            println!(
                "==> Stage 1: Classifying {}",
                run.config.pages_dir(workspace).display()
            );
            let plan = pipeline::plan(&run.config, workspace)?;
            output::print_classify_output(&plan.pages);

            println!("==> Stage 2: Routing");
            output::print_routes_output(&plan.routes);

            println!("==> Stage 3: Packaging \u{2192} {}", run.out_dir.display());
            let packaged = pipeline::package_plan(&plan, &run.config, workspace, &run.out_dir)?;
            output::print_package_output(&packaged);

            println!("==> Stage 4: Deploying");
            println!("{}", output::format_target(&plan.target));
            let report = deploy::deploy(&provider, &plan.target, &run.config, &packaged)
                .map_err(PipelineError::from)?;
            output::print_deploy_output(&report);
        }
        Command::Teardown(cloud) => {
            let run = Run::load(&cli)?;
            let provider = provider(cloud);
            let (target, done) = pipeline::teardown(&provider, &run.config)?;
            output::print_teardown_output(&target, &done);
        }
    }

    Ok(())
}

/// Loaded configuration plus where to read and write.
struct Run {
    context: BuildContext,
    config: DeployConfig,
    out_dir: PathBuf,
}

impl Run {
    fn load(cli: &Cli) -> Result<Self, PipelineError> {
        let context = build_context(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| context.workspace.join(config::CONFIG_FILENAME));
        log::debug!("loading config from {}", config_path.display());
        let config = config::load_config(&config_path, &context)?;
        let out_dir = resolve_out(&context.workspace, &cli.out);
        Ok(Self {
            context,
            config,
            out_dir,
        })
    }

    fn workspace(&self) -> &Path {
        &self.context.workspace
    }
}

/// Gather the ambient CI state once. Flags win over the environment.
fn build_context(cli: &Cli) -> BuildContext {
    let workspace = cli
        .workspace
        .clone()
        .or_else(|| std::env::var_os("GITHUB_WORKSPACE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let change_request = cli.pr.or_else(|| {
        std::env::var("GITHUB_REF")
            .ok()
            .and_then(|r| config::change_request_from_ref(&r))
    });
    BuildContext {
        workspace,
        change_request,
    }
}

fn resolve_out(workspace: &Path, out: &Path) -> PathBuf {
    if out.is_absolute() {
        out.to_path_buf()
    } else {
        workspace.join(out)
    }
}

fn provider(cloud: &CloudArgs) -> AzCli {
    if cloud.dry_run {
        AzCli::dry_run()
    } else {
        AzCli::new()
    }
}
