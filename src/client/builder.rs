use crate::client::auth::handle_auth;
use crate::client::config::ClientConfig;
use crate::engine::EngineError;
use crate::input::provision_request::DatabaseConfiguration;
use mongodb::options::{ClientOptions, Tls, TlsOptions};
use mongodb::Client;
use std::path::PathBuf;

/// Builds a driver client for `db_config`. The driver connects lazily, so
/// nothing here touches the network beyond SRV/TXT lookups for `mongodb+srv`.
pub async fn build_client(
    db_config: &DatabaseConfiguration,
    config: &ClientConfig,
) -> Result<Client, EngineError> {
    let mut options = ClientOptions::parse(&db_config.endpoint).await?;
    options.app_name = Some(config.app_name.clone());
    if config.server_selection_timeout.is_some() {
        options.server_selection_timeout = config.server_selection_timeout;
    }

    if config.use_tls {
        let mut tls_options = TlsOptions::default();
        if let Some(cert_path) = &config.tls_cert {
            tls_options.ca_file_path = Some(PathBuf::from(cert_path));
        }
        options.tls = Some(Tls::Enabled(tls_options));
    }

    handle_auth(&mut options, db_config);
    let client = Client::with_options(options)?;
    Ok(client)
}
