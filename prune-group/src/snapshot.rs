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

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct GroupMember {
    pub member_id: String,
    pub instance_id: Option<String>,
    pub client_id: String,
    pub client_host: String,
}

impl GroupMember {
    pub fn member_id(self, member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            ..self
        }
    }

    pub fn instance_id(self, instance_id: Option<String>) -> Self {
        Self {
            instance_id,
            ..self
        }
    }

    pub fn client_id(self, client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..self
        }
    }

    pub fn client_host(self, client_host: impl Into<String>) -> Self {
        Self {
            client_host: client_host.into(),
            ..self
        }
    }

    /// a member with an operator assigned instance id
    pub fn is_static(&self) -> bool {
        self.instance_id.is_some()
    }
}

/// The membership of a group at one point in time.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct GroupSnapshot {
    pub group_id: String,
    pub state: String,
    pub members: Vec<GroupMember>,
}

impl GroupSnapshot {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Default::default()
        }
    }

    pub fn state(self, state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            ..self
        }
    }

    pub fn members(self, members: impl IntoIterator<Item = GroupMember>) -> Self {
        Self {
            members: members.into_iter().collect(),
            ..self
        }
    }

    pub fn static_members(&self) -> impl Iterator<Item = &GroupMember> {
        self.members.iter().filter(|member| member.is_static())
    }

    /// instance ids of the static members, dynamic members are ignored
    pub fn instance_ids(&self) -> BTreeSet<String> {
        self.members
            .iter()
            .filter_map(|member| member.instance_id.clone())
            .collect()
    }
}
