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

use tracing::info;

use crate::{Command, Coordinator, Report, Result, lookup, valid_group_id};

#[derive(Clone, Debug, Default)]
pub struct Builder<G> {
    group_id: G,
}

impl<G> Builder<G> {
    pub fn group_id(self, group_id: impl Into<String>) -> Builder<String> {
        Builder {
            group_id: group_id.into(),
        }
    }
}

impl Builder<String> {
    pub fn build(self) -> Result<Command> {
        valid_group_id(self.group_id).map(|group_id| Command::Show(Configuration { group_id }))
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Configuration {
    pub(crate) group_id: String,
}

impl Configuration {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct Show {
    configuration: Configuration,
}

impl From<Configuration> for Show {
    fn from(configuration: Configuration) -> Self {
        Self { configuration }
    }
}

impl Show {
    pub(crate) async fn main<C>(self, coordinator: &C) -> Result<Report>
    where
        C: Coordinator + ?Sized,
    {
        let snapshot = lookup(coordinator, &self.configuration.group_id).await?;

        for member in snapshot.static_members() {
            info!(
                member_id = %member.member_id,
                instance_id = ?member.instance_id,
                client_id = %member.client_id,
                client_host = %member.client_host
            );
        }

        Ok(Report::Members {
            instance_ids: snapshot.instance_ids(),
            group_id: snapshot.group_id,
            state: snapshot.state,
        })
    }
}
