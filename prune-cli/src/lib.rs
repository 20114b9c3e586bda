// Copyright ⓒ 2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Prune CLI
//!
//! Command line for removing static members from a Kafka Streams
//! application's consumer group.

use std::{
    collections::HashMap, convert::Infallible, env::vars, fmt, io, result, str::FromStr, sync::Arc,
};

mod cli;
mod properties;

pub use cli::{Cli, ClientConfig};
pub use properties::Properties;
use regex::{Regex, Replacer};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    DotEnv(#[from] dotenv::Error),
    Group(#[from] prune_group::Error),
    Io(Arc<io::Error>),
    Json(#[from] serde_json::Error),
    Regex(#[from] regex::Error),
    Url(#[from] url::ParseError),
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<Infallible> for Error {
    fn from(value: Infallible) -> Self {
        match value {}
    }
}

impl Error {
    /// process exit code for this failure, success being zero
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Group(error) => error.exit_code(),
            Self::Regex(_) | Self::Url(_) => 2,
            Self::DotEnv(_) | Self::Io(_) | Self::Json(_) => 1,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(error) => write!(f, "{error}"),
            error => write!(f, "{error:?}"),
        }
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;

/// Substitutes `${NAME}` placeholders using a table of variables. A name
/// missing from the table substitutes as the empty string.
#[derive(Clone, Debug)]
pub struct VarRep {
    variables: HashMap<String, String>,
    placeholder: Regex,
}

impl VarRep {
    pub fn new(variables: HashMap<String, String>) -> Result<Self> {
        Regex::new(r"\$\{(?<var>[^\}]+)\}")
            .map(|placeholder| Self {
                variables,
                placeholder,
            })
            .map_err(Into::into)
    }

    /// placeholders filled from this process's environment
    pub fn from_env() -> Result<Self> {
        Self::new(vars().collect())
    }

    pub fn replace(&self, haystack: &str) -> String {
        self.placeholder.replace_all(haystack, self).into_owned()
    }
}

impl Replacer for &VarRep {
    fn replace_append(&mut self, caps: &regex::Captures<'_>, dst: &mut String) {
        if let Some(value) = caps
            .name("var")
            .and_then(|name| self.variables.get(name.as_str()))
        {
            dst.push_str(value);
        }
    }
}

/// Command line value parsed only after its placeholders are filled from
/// the environment, so `--application-id ${APP_ID}` reads `APP_ID`.
#[derive(Clone, Debug)]
pub struct EnvVarExp<T>(T);

impl<T> EnvVarExp<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> FromStr for EnvVarExp<T>
where
    T: FromStr,
    Error: From<<T as FromStr>::Err>,
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expanded = VarRep::from_env()?.replace(s);
        T::from_str(&expanded).map(Self).map_err(Into::into)
    }
}
