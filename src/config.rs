//! Command line configuration for the server and client binaries

use clap::Parser;

/// Default TCP port for both binaries
pub const DEFAULT_PORT: u16 = 55555;

/// Default server address
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Chat relay server
#[derive(Parser, Clone, Debug)]
#[command(name = "chat_relay", version, about = "Multi-user TCP chat relay")]
pub struct ServerConfig {
    /// Port to listen on
    #[arg(env = "CHAT_RELAY_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "CHAT_RELAY_HOST", default_value = DEFAULT_HOST)]
    pub host: String,
}

impl ServerConfig {
    /// Address to bind, as `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Chat relay client
#[derive(Parser, Clone, Debug)]
#[command(name = "chat_client", version, about = "Terminal client for chat_relay")]
pub struct ClientConfig {
    /// Server host
    #[arg(default_value = DEFAULT_HOST)]
    pub host: String,

    /// Server port
    #[arg(default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl ClientConfig {
    /// Address to connect to, as `host:port`
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
