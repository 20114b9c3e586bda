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

use tracing::warn;

use crate::{
    Command, Coordinator, Error, ExecutionMode, Report, Result, lookup, removal::submit,
    valid_group_id,
};

#[derive(Clone, Debug, Default)]
pub struct Builder<G, I> {
    group_id: G,
    instance_ids: I,
    mode: ExecutionMode,
}

impl<G, I> Builder<G, I> {
    pub fn group_id(self, group_id: impl Into<String>) -> Builder<String, I> {
        Builder {
            group_id: group_id.into(),
            instance_ids: self.instance_ids,
            mode: self.mode,
        }
    }

    pub fn instance_ids<T>(self, instance_ids: impl IntoIterator<Item = T>) -> Builder<G, Vec<String>>
    where
        T: Into<String>,
    {
        Builder {
            group_id: self.group_id,
            instance_ids: instance_ids.into_iter().map(Into::into).collect(),
            mode: self.mode,
        }
    }

    pub fn mode(self, mode: ExecutionMode) -> Self {
        Self { mode, ..self }
    }
}

impl Builder<String, Vec<String>> {
    pub fn build(self) -> Result<Command> {
        let group_id = valid_group_id(self.group_id)?;

        if self.instance_ids.is_empty() {
            return Err(Error::InvalidArguments(
                "at least one instance id is required".into(),
            ));
        }

        if self
            .instance_ids
            .iter()
            .any(|instance_id| instance_id.trim().is_empty())
        {
            return Err(Error::InvalidArguments(
                "instance ids must not be empty".into(),
            ));
        }

        Ok(Command::RemoveByIds(Configuration {
            group_id,
            instance_ids: self.instance_ids.into_iter().collect(),
            mode: self.mode,
        }))
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Configuration {
    pub(crate) group_id: String,
    pub(crate) instance_ids: BTreeSet<String>,
    pub(crate) mode: ExecutionMode,
}

impl Configuration {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn instance_ids(&self) -> &BTreeSet<String> {
        &self.instance_ids
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

/// Remove an explicit set of static members, refusing the whole batch when
/// any of them is not currently active.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct RemoveByIds {
    configuration: Configuration,
}

impl From<Configuration> for RemoveByIds {
    fn from(configuration: Configuration) -> Self {
        Self { configuration }
    }
}

impl RemoveByIds {
    pub(crate) async fn main<C>(self, coordinator: &C) -> Result<Report>
    where
        C: Coordinator + ?Sized,
    {
        let Configuration {
            group_id,
            instance_ids,
            mode,
        } = self.configuration;

        let active = lookup(coordinator, &group_id).await?.instance_ids();

        let missing = instance_ids
            .difference(&active)
            .cloned()
            .collect::<BTreeSet<_>>();

        if !missing.is_empty() {
            warn!(%group_id, ?missing, ?active);

            return Err(Error::UnknownMember {
                group_id,
                missing,
                active,
            });
        }

        submit(coordinator, group_id, instance_ids, mode).await
    }
}
