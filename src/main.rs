use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::error;
use mongo_provision::input::provision_request::DEFAULT_ENDPOINT;
use mongo_provision::{
    Connector, DatabaseConfiguration, MemoryConnector, MongoConnector, ProvisionRequest,
    Provisioner,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(
    name = "mongo-provision",
    version = env!("CARGO_PKG_VERSION"),
    about = "Reset a MongoDB database and provision its admin user, collection, index and seed data"
)]
struct Cli {
    /// Connection string of the server.
    #[clap(long, env = "MONGO_PROVISION_HOST", default_value = DEFAULT_ENDPOINT)]
    host: String,
    /// Administrative user to log in as.
    #[clap(long, short = 'u', env = "MONGO_PROVISION_USERNAME", default_value = "root")]
    username: String,
    #[clap(
        long,
        short = 'p',
        env = "MONGO_PROVISION_PASSWORD",
        default_value = "password",
        hide_env_values = true,
        hide_default_value = true
    )]
    password: String,
    /// Database the administrative user is defined in.
    #[clap(long, env = "MONGO_PROVISION_AUTH_DB", default_value = "admin")]
    authentication_database: String,
    /// PEM file with the CA certificate; enables TLS.
    #[clap(long, env = "MONGO_PROVISION_TLS_CA_FILE")]
    tls_ca_file: Option<PathBuf>,
    /// JSON provision request; defaults to the built-in test-server setup.
    #[clap(long, env = "MONGO_PROVISION_REQUEST")]
    request: Option<PathBuf>,
    /// Server selection timeout in seconds.
    #[clap(long, default_value = "30")]
    timeout_secs: u64,
    /// Run against an in-process engine instead of a server.
    #[clap(long)]
    dry_run: bool,
    /// Print the resulting database state as JSON.
    #[clap(long)]
    report: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("provisioning failed: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let request = match &cli.request {
        Some(path) => ProvisionRequest::from_json_file(path)?,
        None => ProvisionRequest::default(),
    };
    let db_config = DatabaseConfiguration {
        endpoint: cli.host.clone(),
        username: Some(cli.username.clone()),
        password: Some(cli.password.clone()),
        authentication_database: cli.authentication_database.clone(),
        tls_cert: cli
            .tls_ca_file
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
    };

    if cli.dry_run {
        let connector = MemoryConnector::new(&cli.username, &cli.password);
        // only the admin database can authenticate the in-process root user
        let db_config = DatabaseConfiguration {
            authentication_database: "admin".into(),
            ..db_config
        };
        execute(connector, &db_config, &request, true).await
    } else {
        let connector = MongoConnector::new(Some(Duration::from_secs(cli.timeout_secs)));
        execute(connector, &db_config, &request, cli.report).await
    }
}

async fn execute<C: Connector>(
    connector: C,
    db_config: &DatabaseConfiguration,
    request: &ProvisionRequest,
    report: bool,
) -> anyhow::Result<()> {
    let provisioner = Provisioner::new(connector);
    let summary = provisioner
        .provision(db_config, request)
        .await
        .with_context(|| format!("could not provision database {}", request.database))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if report {
        let state = provisioner
            .inspect(db_config, request)
            .await
            .context("could not read back the provisioned database")?;
        println!("{}", serde_json::to_string_pretty(&state)?);
    }
    Ok(())
}
