use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::Url;

/// Where the daemon listens and clients connect.
///
/// Configuration files may spell an endpoint as a table
/// (`{ transport = "unix", path = "..." }`) or as a URL string
/// (`unix:///run/scaninout.sock`, `tcp://127.0.0.1:9780`); environment
/// variables and flags use the URL form.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// Unix domain socket endpoint.
    Unix { path: Utf8PathBuf },
    /// TCP socket endpoint.
    Tcp { host: String, port: u16 },
}

#[derive(Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
enum TaggedEndpoint {
    Unix { path: Utf8PathBuf },
    Tcp { host: String, port: u16 },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EndpointRepr {
    Url(String),
    Table(TaggedEndpoint),
}

impl<'de> Deserialize<'de> for SocketEndpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match EndpointRepr::deserialize(deserializer)? {
            EndpointRepr::Url(text) => text.parse().map_err(serde::de::Error::custom),
            EndpointRepr::Table(TaggedEndpoint::Unix { path }) => Ok(Self::Unix { path }),
            EndpointRepr::Table(TaggedEndpoint::Tcp { host, port }) => Ok(Self::Tcp { host, port }),
        }
    }
}

impl SocketEndpoint {
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// The socket file, for Unix endpoints.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_path()),
            Self::Tcp { .. } => None,
        }
    }

    /// Ensures the directory that will hold a Unix socket exists, creating it
    /// private to the current user. TCP endpoints need nothing.
    ///
    /// # Errors
    ///
    /// Fails when the socket path is bare or its directory cannot be created.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let directory = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => {
                return Err(SocketPreparationError::MissingParent {
                    path: path.to_owned(),
                });
            }
        };
        private_dir_builder()
            .create(directory)
            .map_err(|source| SocketPreparationError::CreateDirectory {
                path: directory.to_owned(),
                source,
            })
    }
}

fn private_dir_builder() -> DirBuilder {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    std::os::unix::fs::DirBuilderExt::mode(&mut builder, 0o700);
    builder
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        let missing = |part| SocketParseError::Missing {
            part,
            input: input.to_owned(),
        };
        match url.scheme() {
            "unix" => match url.path() {
                "" | "/" => Err(missing("socket path")),
                path => Ok(Self::unix(path)),
            },
            "tcp" => {
                let host = url.host_str().ok_or_else(|| missing("host"))?;
                let port = url.port().ok_or_else(|| missing("port"))?;
                Ok(Self::tcp(host, port))
            }
            scheme => Err(SocketParseError::Scheme(scheme.to_owned())),
        }
    }
}

/// A socket endpoint string that could not be understood.
#[derive(Debug, Error)]
pub enum SocketParseError {
    #[error("endpoint scheme '{0}' is neither unix nor tcp")]
    Scheme(String),
    #[error("endpoint '{input}' has no {part}")]
    Missing { part: &'static str, input: String },
    #[error("endpoint is not a URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum SocketPreparationError {
    #[error("socket '{path}' is not inside a directory")]
    MissingParent { path: Utf8PathBuf },
    #[error("cannot create socket directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}
