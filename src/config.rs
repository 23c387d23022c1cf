//! CLI arguments and server configuration defaults.

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_BIND: &str = "0.0.0.0:3030";
pub const DEFAULT_DATADIR: &str = "data";
pub const DEFAULT_SLOT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 0;
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// Two-phase file upload server and client.
#[derive(Parser, Debug)]
#[command(name = "himawari", version, about = "Simple negotiated file upload server/client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the upload server.
    Serve(ServeArgs),
    /// Upload a single file to a running server.
    Send(SendArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(
        short = 'b',
        long,
        env = "HIMAWARI_BIND",
        default_value = DEFAULT_BIND,
        help = "Address to listen on"
    )]
    pub bind: String,
    #[arg(
        short = 'd',
        long,
        env = "HIMAWARI_DATADIR",
        default_value = DEFAULT_DATADIR,
        help = "Directory to save the uploaded files into"
    )]
    pub datadir: String,
    #[arg(
        long,
        env = "HIMAWARI_PUBLIC_URL",
        help = "Base URL handed out to clients (defaults to http://<bind>)"
    )]
    pub public_url: Option<String>,
    #[arg(
        long,
        env = "HIMAWARI_SLOT_TIMEOUT_SECS",
        default_value_t = DEFAULT_SLOT_TIMEOUT_SECS,
        help = "Seconds a negotiated upload slot stays claimable"
    )]
    pub slot_timeout_secs: u64,
    #[arg(
        long,
        env = "HIMAWARI_REAPER_INTERVAL_SECS",
        default_value_t = DEFAULT_REAPER_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds between expiry sweeps of pending slots"
    )]
    pub reaper_interval_secs: u64,
    #[arg(
        long,
        env = "HIMAWARI_TRANSFER_TIMEOUT_SECS",
        default_value_t = DEFAULT_TRANSFER_TIMEOUT_SECS,
        help = "Deadline in seconds for receiving a claimed upload (0 to disable)"
    )]
    pub transfer_timeout_secs: u64,
}

impl ServeArgs {
    /// Base address prefixed to every slot URL, without a trailing slash.
    pub fn base_url(&self) -> String {
        let base = match &self.public_url {
            Some(url) => url.clone(),
            None => format!("http://{}", self.bind),
        };
        base.trim_end_matches('/').to_string()
    }
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    #[arg(short = 'f', long, help = "The file to upload")]
    pub file: String,
    #[arg(
        short = 's',
        long,
        env = "HIMAWARI_SERVER",
        help = "The server to upload it to"
    )]
    pub server: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["himawari", "serve"]).expect("parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.bind, "0.0.0.0:3030");
        assert_eq!(args.datadir, "data");
        assert_eq!(args.slot_timeout_secs, 60);
        assert_eq!(args.reaper_interval_secs, 10);
        assert_eq!(args.base_url(), "http://0.0.0.0:3030");
    }

    #[test]
    fn public_url_trailing_slash_is_trimmed() {
        let cli = Cli::try_parse_from([
            "himawari",
            "serve",
            "--public-url",
            "https://files.example.org/",
        ])
        .expect("parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.base_url(), "https://files.example.org");
    }

    #[test]
    fn send_requires_file_and_server() {
        assert!(Cli::try_parse_from(["himawari", "send", "-f", "a.txt"]).is_err());
        let cli = Cli::try_parse_from(["himawari", "send", "-f", "a.txt", "-s", "http://h"])
            .expect("parse");
        assert!(matches!(cli.command, Command::Send(_)));
    }
}
