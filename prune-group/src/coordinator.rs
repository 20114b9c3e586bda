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
    fmt::{self, Debug},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use kafka_protocol::ResponseError;

use crate::{GroupSnapshot, Outcome};

/// Why the coordinator could not satisfy a request.
#[derive(thiserror::Error, Clone, Debug)]
pub enum Cause {
    Api(ResponseError),
    Client(Arc<prune_client::Error>),
    Message(String),
    Timeout(Duration),
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api(error) => write!(f, "{error:?}: {error}"),
            Self::Client(error) => write!(f, "{error}"),
            Self::Message(message) => write!(f, "{message}"),
            Self::Timeout(duration) => write!(f, "timed out after {}ms", duration.as_millis()),
        }
    }
}

impl From<prune_client::Error> for Cause {
    fn from(value: prune_client::Error) -> Self {
        match value {
            prune_client::Error::Api(error) => Self::Api(error),
            prune_client::Error::Timeout(duration) => Self::Timeout(duration),
            otherwise => Self::Client(Arc::new(otherwise)),
        }
    }
}

/// The group coordination operations needed to reconcile membership.
#[async_trait]
pub trait Coordinator: Debug + Send + Sync {
    /// the current membership of a group, a group that does not exist is
    /// an error
    async fn describe_group(&self, group_id: &str, timeout: Duration)
    -> Result<GroupSnapshot, Cause>;

    /// remove static members by instance id in one request, returning the
    /// outcome for each member
    async fn remove_members(
        &self,
        group_id: &str,
        instance_ids: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, Outcome>, Cause>;

    /// release the connection, waiting no longer than the timeout
    async fn close(&self, timeout: Duration) -> Result<(), Cause>;
}

#[async_trait]
impl<T> Coordinator for Arc<T>
where
    T: Coordinator + ?Sized,
{
    async fn describe_group(
        &self,
        group_id: &str,
        timeout: Duration,
    ) -> Result<GroupSnapshot, Cause> {
        (**self).describe_group(group_id, timeout).await
    }

    async fn remove_members(
        &self,
        group_id: &str,
        instance_ids: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, Outcome>, Cause> {
        (**self).remove_members(group_id, instance_ids).await
    }

    async fn close(&self, timeout: Duration) -> Result<(), Cause> {
        (**self).close(timeout).await
    }
}
