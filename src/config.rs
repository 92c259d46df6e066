use anyhow::{Context, Result};

pub const ADMIN_KEY_VAR: &str = "ADMIN_KEY";

const USAGE: &str = "usage: mayhem_server <address> <port>";

/// Server configuration. Address and port are positional arguments, the admin key comes from the
/// environment so it never shows up in process listings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub admin_key: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        Self::parse(&args, std::env::var(ADMIN_KEY_VAR).ok())
    }

    /// `args` includes the program name at index 0, as returned by [std::env::args].
    pub fn parse(args: &[String], admin_key: Option<String>) -> Result<Self> {
        let address = args.get(1).cloned().context(USAGE)?;
        let port_arg = args.get(2).context(USAGE)?;
        let port = port_arg
            .parse::<u16>()
            .with_context(|| format!("invalid port {port_arg}"))?;
        let admin_key = admin_key
            .filter(|key| !key.is_empty())
            .with_context(|| format!("{ADMIN_KEY_VAR} must be set"))?;

        Ok(Self {
            address,
            port,
            admin_key,
        })
    }
}
