use std::time::Duration;

const DEFAULT_RECONNECT_LIMIT: u32 = 5;
const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration shared by every node of a client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Id of the bot user, sent as `User-Id` and used to filter voice states.
    pub user_id: u64,
    /// Sent as `Client-Name` when connecting.
    pub client_name: String
}

impl ClientConfig {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            client_name: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
        }
    }
}

/// How a node retries after losing its connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts made before giving up.
    pub limit: u32,
    /// Fixed wait between attempts.
    pub interval: Duration
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RECONNECT_LIMIT,
            interval: DEFAULT_RECONNECT_INTERVAL
        }
    }
}

/// Connection information of a node.
#[derive(Clone, Debug, Default)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Use `wss`/`https` instead of `ws`/`http`. REST calls use reqwest's
    /// default TLS, the websocket needs the `rustls` or `native-tls` feature.
    pub secure: bool,
    pub reconnect: ReconnectPolicy
}

impl NodeConfig {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn builder() -> NodeConfigBuilder {
        NodeConfigBuilder::default()
    }

    /// `host:port` of the node.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_url(&self) -> String {
        format!("{}://{}", if self.secure { "wss" } else { "ws" }, self.address())
    }

    pub fn http_url(&self) -> String {
        format!("{}://{}", if self.secure { "https" } else { "http" }, self.address())
    }
}

#[derive(Default)]
pub struct NodeConfigBuilder {
    config: NodeConfig
}

impl NodeConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.config.secure = secure;
        self
    }

    pub fn reconnect(mut self, limit: u32, interval: Duration) -> Self {
        self.config.reconnect = ReconnectPolicy { limit, interval };
        self
    }

    pub fn build(self) -> NodeConfig {
        self.config
    }
}
