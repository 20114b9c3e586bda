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

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::{
    Command, Coordinator, Error, ExecutionMode, Report, Result, lookup, removal::submit,
    valid_group_id,
};

#[derive(Clone, Debug, Default)]
pub struct Builder<G, P> {
    group_id: G,
    prefix: P,
    mode: ExecutionMode,
}

impl<G, P> Builder<G, P> {
    pub fn group_id(self, group_id: impl Into<String>) -> Builder<String, P> {
        Builder {
            group_id: group_id.into(),
            prefix: self.prefix,
            mode: self.mode,
        }
    }

    pub fn prefix(self, prefix: impl Into<String>) -> Builder<G, String> {
        Builder {
            group_id: self.group_id,
            prefix: prefix.into(),
            mode: self.mode,
        }
    }

    pub fn mode(self, mode: ExecutionMode) -> Self {
        Self { mode, ..self }
    }
}

impl Builder<String, String> {
    pub fn build(self) -> Result<Command> {
        let group_id = valid_group_id(self.group_id)?;

        if self.prefix.is_empty() {
            return Err(Error::InvalidArguments("prefix must not be empty".into()));
        }

        Ok(Command::RemoveByPrefix(Configuration {
            group_id,
            prefix: self.prefix,
            mode: self.mode,
        }))
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Configuration {
    pub(crate) group_id: String,
    pub(crate) prefix: String,
    pub(crate) mode: ExecutionMode,
}

impl Configuration {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

/// Keep the static members whose instance id starts with the prefix,
/// removing every other static member.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct RemoveByPrefix {
    configuration: Configuration,
}

impl From<Configuration> for RemoveByPrefix {
    fn from(configuration: Configuration) -> Self {
        Self { configuration }
    }
}

impl RemoveByPrefix {
    pub(crate) async fn main<C>(self, coordinator: &C) -> Result<Report>
    where
        C: Coordinator + ?Sized,
    {
        let Configuration {
            group_id,
            prefix,
            mode,
        } = self.configuration;

        let (keep, remove): (BTreeSet<_>, BTreeSet<_>) = lookup(coordinator, &group_id)
            .await?
            .instance_ids()
            .into_iter()
            .partition(|instance_id| instance_id.starts_with(&prefix));

        debug!(%group_id, %prefix, ?keep, ?remove);

        if remove.is_empty() {
            info!(%group_id, %prefix, "nothing to remove");
            return Ok(Report::NothingToRemove { group_id, prefix });
        }

        submit(coordinator, group_id, remove, mode).await
    }
}
