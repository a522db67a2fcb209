//! Client library and command-line front end for the scan-in/scan-out
//! daemon.
//!
//! [`Client`] and [`AuthenticatedClient`] perform blocking request/response
//! exchanges over the configured socket. [`run`] drives the `scaninout`
//! binary: it loads configuration from the leading flags, sends one command
//! with fields given as a JSON object, and prints the decoded response
//! fields as JSON.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use scaninout_proto::Record;
use serde_json::{Map as JsonMap, Value as Json};

mod cli;
mod client;
mod config;
mod errors;
mod transport;

pub use client::{AuthenticatedClient, Client};
pub use errors::ClientError;

use cli::Cli;
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
use errors::AppError;

/// Runs the CLI with the given arguments and output streams.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

fn run_with_loader<I, W, E, L>(args: I, stdout: &mut W, stderr: &mut E, loader: &L) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);
    let cli = match Cli::try_parse_from(command_arguments(&args, split.command_start)) {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => {
            let _ = write!(stdout, "{error}");
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            let _ = writeln!(stderr, "{}", AppError::CliUsage(error));
            return ExitCode::FAILURE;
        }
    };

    let outcome = loader
        .load(&split.config_arguments)
        .and_then(|config| execute(&cli, &config))
        .and_then(|response| print_fields(stdout, &response));
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::Client(ClientError::Command(error))) => {
            let _ = writeln!(stderr, "error [{}]: {}", error.id(), error.message());
            ExitCode::FAILURE
        }
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

/// The program name followed by the tokens after the configuration flags.
fn command_arguments(args: &[OsString], command_start: usize) -> Vec<OsString> {
    args.first()
        .into_iter()
        .chain(args.get(command_start..).unwrap_or_default())
        .cloned()
        .collect()
}

fn execute(cli: &Cli, config: &scaninout_config::Config) -> Result<Record, AppError> {
    let fields = parse_fields(cli.fields.as_deref())?;
    let response = if cli.authenticated {
        AuthenticatedClient::from_config(config)?.call_json(&cli.command, &fields)
    } else {
        Client::from_config(config)?.call_json(&cli.command, &fields)
    };
    Ok(response?)
}

fn parse_fields(text: Option<&str>) -> Result<JsonMap<String, Json>, AppError> {
    text.map_or_else(
        || Ok(JsonMap::new()),
        |text| serde_json::from_str(text).map_err(AppError::ParseFields),
    )
}

fn print_fields<W: Write>(stdout: &mut W, response: &Record) -> Result<(), AppError> {
    let fields = response.encode().map_err(AppError::EncodeResponse)?;
    serde_json::to_writer(&mut *stdout, &fields)
        .map_err(|error| AppError::WriteOutput(error.into()))?;
    writeln!(stdout).map_err(AppError::WriteOutput)
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write as _};
    use std::net::TcpListener;
    use std::thread;

    use rstest::rstest;
    use scaninout_config::{Config, SocketEndpoint};

    use super::*;

    struct StubLoader(Config);

    impl ConfigLoader for StubLoader {
        fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
            Ok(self.0.clone())
        }
    }

    /// Answers a single request with `reply`.
    fn serve_once(reply: &'static str) -> Config {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut line = String::new();
            reader.read_line(&mut line).expect("request");
            let mut writer = stream;
            writer.write_all(reply.as_bytes()).expect("reply");
        });
        Config {
            daemon_socket: SocketEndpoint::tcp("127.0.0.1", port),
            ..Config::default()
        }
    }

    fn invoke(args: &[&str], config: Config) -> (ExitCode, String, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run_with_loader(
            args.iter().map(OsString::from),
            &mut stdout,
            &mut stderr,
            &StubLoader(config),
        );
        (
            code,
            String::from_utf8(stdout).expect("stdout utf8"),
            String::from_utf8(stderr).expect("stderr utf8"),
        )
    }

    #[test]
    fn prints_the_response_fields() {
        let config = serve_once("{\"success\":true,\"fields\":{\"scanned_in\":true}}\n");
        let (code, stdout, stderr) = invoke(
            &["scaninout", "member_scan_in_out", r#"{"tag":"H012345678"}"#],
            config,
        );
        assert_eq!(code, ExitCode::SUCCESS, "{stderr}");
        assert!(stdout.ends_with('\n'));
        let printed: Json = serde_json::from_str(&stdout).expect("json output");
        assert_eq!(
            printed,
            serde_json::json!({"scanned_in": true, "elapsed_hours": null})
        );
    }

    #[test]
    fn command_errors_print_their_id() {
        let config = serve_once(
            "{\"success\":false,\"error\":{\"id\":\"forbidden\",\"message\":\"Forbidden.\"}}\n",
        );
        let (code, stdout, stderr) = invoke(&["scaninout", "authenticated_ping"], config);
        assert_eq!(code, ExitCode::FAILURE);
        assert!(stdout.is_empty());
        assert_eq!(stderr, "error [forbidden]: Forbidden.\n");
    }

    #[rstest]
    #[case::not_json("{tag")]
    #[case::not_an_object("[1, 2]")]
    fn malformed_fields_are_rejected(#[case] fields: &str) {
        let (code, _, stderr) = invoke(&["scaninout", "ping", fields], Config::default());
        assert_eq!(code, ExitCode::FAILURE);
        assert!(stderr.starts_with("FIELDS_JSON must be a JSON object"), "{stderr}");
    }

    #[test]
    fn a_command_is_required() {
        let (code, _, stderr) = invoke(&["scaninout"], Config::default());
        assert_eq!(code, ExitCode::FAILURE);
        assert!(stderr.contains("COMMAND"), "{stderr}");
    }

    #[test]
    fn help_is_printed_to_stdout() {
        let (code, stdout, _) = invoke(&["scaninout", "--help"], Config::default());
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(stdout.contains("--authenticated"));
    }

    #[test]
    fn command_arguments_skip_the_configuration_flags() {
        let args: Vec<OsString> = ["scaninout", "--passphrase", "x", "ping"]
            .iter()
            .map(OsString::from)
            .collect();
        assert_eq!(
            command_arguments(&args, 3),
            [OsString::from("scaninout"), OsString::from("ping")]
        );
    }
}
