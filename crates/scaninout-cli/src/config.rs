//! Configuration loading for the `scaninout` binary.
//!
//! Configuration flags lead the argument list; everything from the first
//! other token onwards belongs to the command. The split keeps the loader
//! from rejecting command arguments it does not know.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig as _;
use scaninout_config::{CONFIG_CLI_FLAGS, Config};

use crate::errors::AppError;

pub(crate) trait ConfigLoader {
    /// Loads configuration from the leading configuration flags.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    let (flag, has_inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (&*text, false),
    };
    if flag.starts_with("--") && CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    /// Program name followed by the configuration flags and their values.
    pub(crate) config_arguments: Vec<OsString>,
    /// Index of the first command token in the original arguments.
    pub(crate) command_start: usize,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut arguments = args.iter();
    let mut config_arguments: Vec<OsString> = arguments.next().cloned().into_iter().collect();
    let mut command_start = config_arguments.len();

    while let Some(argument) = arguments.next() {
        let FlagAction::Include { needs_value } = classify(argument) else {
            break;
        };
        config_arguments.push(argument.clone());
        command_start += 1;
        if needs_value {
            if let Some(value) = arguments.next() {
                config_arguments.push(value.clone());
                command_start += 1;
            }
        }
    }

    ConfigArgumentSplit {
        config_arguments,
        command_start,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case::inline("--log-filter=debug", FlagAction::Include { needs_value: false })]
    #[case::separate("--daemon-socket", FlagAction::Include { needs_value: true })]
    #[case::command("ping", FlagAction::Stop)]
    #[case::unknown("--authenticated", FlagAction::Stop)]
    fn flags_are_classified(#[case] argument: &str, #[case] expected: FlagAction) {
        assert_eq!(classify(OsStr::new(argument)), expected);
    }

    #[test]
    fn configuration_flags_lead_the_command() {
        let args = os(&[
            "scaninout",
            "--daemon-socket",
            "tcp://127.0.0.1:9780",
            "--passphrase=secret",
            "member_get",
            "{\"id\":1}",
            "--authenticated",
        ]);
        let split = split_config_arguments(&args);
        assert_eq!(
            split.config_arguments,
            os(&[
                "scaninout",
                "--daemon-socket",
                "tcp://127.0.0.1:9780",
                "--passphrase=secret"
            ])
        );
        assert_eq!(split.command_start, 4);
    }

    #[test]
    fn configuration_flags_after_the_command_stay_with_it() {
        let args = os(&["scaninout", "ping", "--log-filter", "debug"]);
        let split = split_config_arguments(&args);
        assert_eq!(split.config_arguments, os(&["scaninout"]));
        assert_eq!(split.command_start, 1);
    }

    #[test]
    fn empty_arguments_split_cleanly() {
        let split = split_config_arguments(&[]);
        assert!(split.config_arguments.is_empty());
        assert_eq!(split.command_start, 0);
    }
}
