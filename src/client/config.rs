use std::time::Duration;

pub const DEFAULT_APP_NAME: &str = "mongo-provision";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub app_name: String,
    pub server_selection_timeout: Option<Duration>,
    pub tls_cert: Option<String>,
    pub use_tls: bool,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }
}

pub struct ClientConfigBuilder {
    server_selection_timeout: Option<Duration>,
    tls_cert: Option<String>,
    use_tls: bool,
}

impl ClientConfigBuilder {
    pub fn new() -> ClientConfigBuilder {
        ClientConfigBuilder {
            server_selection_timeout: None,
            tls_cert: None,
            use_tls: false,
        }
    }

    pub fn server_selection_timeout_opt(
        mut self,
        timeout: Option<Duration>,
    ) -> ClientConfigBuilder {
        self.server_selection_timeout = timeout;
        self
    }

    pub fn tls_cert_opt(mut self, cert: Option<String>) -> ClientConfigBuilder {
        self.tls_cert = cert;
        self
    }

    pub fn use_tls(mut self, use_tls: bool) -> ClientConfigBuilder {
        self.use_tls = use_tls;
        self
    }

    pub fn build(self) -> ClientConfig {
        ClientConfig {
            app_name: DEFAULT_APP_NAME.to_string(),
            server_selection_timeout: self.server_selection_timeout,
            tls_cert: self.tls_cert,
            use_tls: self.use_tls,
        }
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
