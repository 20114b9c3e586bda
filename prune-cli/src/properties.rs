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

use std::{collections::BTreeMap, fs, path::Path, str::FromStr};

use prune_group::Error as GroupError;
use tracing::debug;

use crate::{Error, Result, VarRep};

/// Admin client properties in `java.util.Properties` format, each value
/// with `${VAR}` expanded from the environment.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(?path);

        fs::read_to_string(path)
            .map_err(|err| {
                GroupError::InvalidArguments(format!(
                    "unable to read config file {}: {err}",
                    path.display()
                ))
                .into()
            })
            .and_then(|contents| contents.parse())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl FromStr for Properties {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let var_rep = VarRep::from_env()?;

        java_properties::read(s.as_bytes())
            .map_err(|err| GroupError::InvalidArguments(format!("invalid config file: {err}")))
            .map(|properties| {
                properties
                    .into_iter()
                    .map(|(key, value)| (key, var_rep.replace(&value)))
                    .collect()
            })
            .map(Self)
            .map_err(Into::into)
    }
}
