use std::process;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use k3cluster::cli::{
    self, format_cluster_detail, format_cluster_list, format_create_success, format_registry_list,
    Cli, Commands, KubeconfigAction, RegistryAction,
};
use k3cluster::kubeconfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let exit_code = match run(cli.command).await {
        Ok(()) => 0,
        Err(e) => {
            error!("{e}");
            e.exit_code()
        }
    };
    process::exit(exit_code);
}

async fn run(command: Commands) -> Result<(), cli::CommandError> {
    match command {
        Commands::Validate(args) => run_validate(args),
        Commands::Create(args) => run_create(args).await,
        Commands::Delete(args) => run_delete(args).await,
        Commands::List => run_list().await,
        Commands::Get(args) => run_get(args).await,
        Commands::Start(args) => run_start(args).await,
        Commands::Stop(args) => run_stop(args).await,
        Commands::Kubeconfig(args) => run_kubeconfig(args).await,
        Commands::Registry(args) => run_registry(args).await,
    }
}

fn run_validate(args: cli::ValidateArgs) -> Result<(), cli::CommandError> {
    let plan = cli::load_plan(&args.file, &[])?;
    println!(
        "valid: {:?} — {} server(s), {} agent(s)",
        plan.cluster.name,
        plan.cluster.servers().count(),
        plan.cluster.agents().count()
    );
    Ok(())
}

async fn run_create(args: cli::CreateArgs) -> Result<(), cli::CommandError> {
    let plan = cli::load_plan(&args.file, &args.set)?;
    let options = cli::run_options(&plan, args.timeout, args.strict_hooks, args.no_wait);
    let runtime = cli::connect_runtime()?;

    info!(cluster = %plan.cluster.name, "starting create");
    let outcome = cli::create_cluster(&runtime, plan, options).await?;
    print!("{}", format_create_success(&outcome));

    let doc = kubeconfig::standalone(&outcome.cluster, &outcome.kube_api_url);
    match args.kubeconfig_output {
        Some(path) => {
            kubeconfig::save_to(&doc, &path)?;
            println!("kubeconfig written to {}", path.display());
        }
        None => {
            let mut existing = kubeconfig::load_from(&kubeconfig::default_path())?;
            kubeconfig::merge(&mut existing, &outcome.cluster, &outcome.kube_api_url, true);
            kubeconfig::save_to(&existing, &kubeconfig::default_path())?;
            println!("kubeconfig merged into {}", kubeconfig::default_path().display());
        }
    }
    Ok(())
}

async fn run_delete(args: cli::DeleteArgs) -> Result<(), cli::CommandError> {
    let runtime = cli::connect_runtime()?;
    cli::delete_cluster(&runtime, &args.name).await?;
    println!("cluster {:?} deleted", args.name);
    Ok(())
}

async fn run_list() -> Result<(), cli::CommandError> {
    let runtime = cli::connect_runtime()?;
    let clusters = cli::list_clusters(&runtime).await?;
    print!("{}", format_cluster_list(&clusters));
    Ok(())
}

async fn run_get(args: cli::GetArgs) -> Result<(), cli::CommandError> {
    let runtime = cli::connect_runtime()?;
    let cluster = cli::get_cluster(&runtime, &args.name).await?;
    print!("{}", format_cluster_detail(&cluster));
    Ok(())
}

async fn run_start(args: cli::ClusterNameArgs) -> Result<(), cli::CommandError> {
    let runtime = cli::connect_runtime()?;
    let started = cli::start_cluster(&runtime, &args.name).await?;
    println!("started {} node(s) in cluster {:?}", started, args.name);
    Ok(())
}

async fn run_stop(args: cli::StopArgs) -> Result<(), cli::CommandError> {
    let runtime = cli::connect_runtime()?;
    let stopped = cli::stop_cluster(&runtime, &args.name, args.timeout).await?;
    println!("stopped {} node(s) in cluster {:?}", stopped, args.name);
    Ok(())
}

async fn run_kubeconfig(args: cli::KubeconfigArgs) -> Result<(), cli::CommandError> {
    match args.action {
        KubeconfigAction::Write {
            name,
            output,
            switch_context,
        } => {
            let runtime = cli::connect_runtime()?;
            let doc = cli::cluster_kubeconfig(&runtime, &name).await?;
            let result = cli::write_kubeconfig(&doc, output.as_ref(), switch_context)?;
            if output.is_some() {
                println!("{result}");
            } else {
                print!("{result}");
            }
            Ok(())
        }
    }
}

async fn run_registry(args: cli::RegistryArgs) -> Result<(), cli::CommandError> {
    match args.action {
        RegistryAction::List => {
            let runtime = cli::connect_runtime()?;
            let registries = cli::list_registries(&runtime).await?;
            print!("{}", format_registry_list(&registries));
            Ok(())
        }
        RegistryAction::Delete { name, force } => {
            let runtime = cli::connect_runtime()?;
            cli::delete_registry(&runtime, &name, force).await?;
            println!("registry {:?} deleted", name);
            Ok(())
        }
    }
}
