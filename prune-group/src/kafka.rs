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

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use async_trait::async_trait;
use kafka_protocol::messages::{
    describe_groups_response::{DescribedGroup, DescribedGroupMember},
    leave_group_response::MemberResponse,
};
use prune_client::{Client, response_error};
use tokio::time::timeout;
use tracing::debug;

use crate::{Cause, Coordinator, GroupMember, GroupSnapshot, Outcome};

impl From<DescribedGroupMember> for GroupMember {
    fn from(member: DescribedGroupMember) -> Self {
        Self {
            member_id: member.member_id.as_str().to_owned(),
            instance_id: member
                .group_instance_id
                .map(|instance_id| instance_id.as_str().to_owned()),
            client_id: member.client_id.as_str().to_owned(),
            client_host: member.client_host.as_str().to_owned(),
        }
    }
}

impl From<DescribedGroup> for GroupSnapshot {
    fn from(group: DescribedGroup) -> Self {
        Self {
            group_id: group.group_id.as_str().to_owned(),
            state: group.group_state.as_str().to_owned(),
            members: group.members.into_iter().map(GroupMember::from).collect(),
        }
    }
}

/// the outcome of each static member in a leave group response
fn outcomes(members: Vec<MemberResponse>) -> Result<BTreeMap<String, Outcome>, Cause> {
    members
        .into_iter()
        .filter_map(|member| {
            let Some(instance_id) = member.group_instance_id else {
                debug!(member_id = member.member_id.as_str(), error_code = member.error_code);
                return None;
            };

            let outcome = match response_error(member.error_code) {
                Ok(()) => Ok(Outcome::Removed),
                Err(prune_client::Error::Api(error)) => Ok(Outcome::Failed(error)),
                Err(otherwise) => Err(Cause::from(otherwise)),
            };

            Some(outcome.map(|outcome| (instance_id.as_str().to_owned(), outcome)))
        })
        .collect()
}

#[async_trait]
impl Coordinator for Client {
    async fn describe_group(
        &self,
        group_id: &str,
        within: Duration,
    ) -> Result<GroupSnapshot, Cause> {
        timeout(within, Client::describe_group(self, group_id))
            .await
            .map_err(|_elapsed| Cause::Timeout(within))?
            .map(GroupSnapshot::from)
            .map_err(Into::into)
    }

    async fn remove_members(
        &self,
        group_id: &str,
        instance_ids: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, Outcome>, Cause> {
        let instance_ids = instance_ids.iter().cloned().collect::<Vec<_>>();

        self.leave_group(group_id, &instance_ids[..])
            .await
            .map_err(Cause::from)
            .and_then(outcomes)
    }

    async fn close(&self, within: Duration) -> Result<(), Cause> {
        Client::close(self, within).await.map_err(Into::into)
    }
}
