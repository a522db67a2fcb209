//! Argument definitions for the `scaninout` binary.

use clap::Parser;

/// Issues one command to the scan-in/scan-out daemon.
///
/// Configuration flags such as `--daemon-socket` must precede COMMAND.
#[derive(Parser, Debug)]
#[command(name = "scaninout", disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Authorises the call with the configured passphrase.
    #[arg(long)]
    pub(crate) authenticated: bool,
    /// Command name or `snake_case` alias (for example `member_get_all`).
    #[arg(value_name = "COMMAND")]
    pub(crate) command: String,
    /// Request fields as a JSON object. Defaults to `{}`.
    #[arg(value_name = "FIELDS_JSON")]
    pub(crate) fields: Option<String>,
}
