use clap::Parser;
use policy_engine::Environment;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "secure-gateway",
    version,
    about = "Forwarding gateway that keeps upstream secrets off the browser"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "gateway.yaml")]
    pub config: PathBuf,

    /// Listen address (overrides config file and PORT)
    #[arg(long)]
    pub listen: Option<String>,

    /// Deployment environment; anything but "production" is development
    #[arg(long)]
    pub environment: Option<Environment>,
}
