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
    future, io,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use kafka_protocol::ResponseError;
use prune_group::{Cause, Coordinator, GroupMember, GroupSnapshot, Outcome};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{EnvFilter, filter::ParseError};

#[path = "../../../prune-client/tests/common/broker.rs"]
pub(crate) mod broker;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[allow(dead_code)]
    Client(Arc<prune_client::Error>),

    #[allow(dead_code)]
    Group(#[from] prune_group::Error),

    #[allow(dead_code)]
    Io(Arc<io::Error>),

    #[allow(dead_code)]
    ParseFilter(#[from] ParseError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<prune_client::Error> for Error {
    fn from(value: prune_client::Error) -> Self {
        Self::Client(Arc::new(value))
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

pub(crate) fn init_tracing() -> Result<DefaultGuard, Error> {
    Ok(tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_level(true)
            .with_line_number(true)
            .with_thread_names(false)
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(
                    format!("{}=debug", env!("CARGO_PKG_NAME").replace("-", "_")).parse()?,
                ),
            )
            .with_test_writer()
            .finish(),
    ))
}

pub(crate) const GROUP_ID: &str = "word-count";

pub(crate) fn snapshot<'a>(
    instance_ids: impl IntoIterator<Item = &'a str>,
) -> GroupSnapshot {
    GroupSnapshot::new(GROUP_ID).state("Stable").members(
        instance_ids
            .into_iter()
            .enumerate()
            .map(|(i, instance_id)| {
                GroupMember::default()
                    .member_id(format!("{instance_id}-{i}"))
                    .instance_id(Some(instance_id.into()))
                    .client_id(format!("{GROUP_ID}-StreamThread-{i}"))
                    .client_host("/10.0.0.1")
            }),
    )
}

pub(crate) fn ids<'a>(instance_ids: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    instance_ids.into_iter().map(String::from).collect()
}

/// A coordinator that records every interaction.
#[derive(Debug, Default)]
pub(crate) struct FakeCoordinator {
    snapshot: Option<GroupSnapshot>,
    unresponsive: bool,
    stalled: bool,
    rejected: BTreeMap<String, ResponseError>,
    omitted: BTreeSet<String>,
    submission_failure: Option<Cause>,

    lookups: Mutex<Vec<(String, Duration)>>,
    submissions: Mutex<Vec<(String, BTreeSet<String>)>>,
    closed: Mutex<Vec<Duration>>,
}

#[allow(dead_code)]
impl FakeCoordinator {
    pub(crate) fn new(snapshot: GroupSnapshot) -> Arc<Self> {
        Arc::new(Self {
            snapshot: Some(snapshot),
            ..Default::default()
        })
    }

    pub(crate) fn missing_group() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn unresponsive() -> Arc<Self> {
        Arc::new(Self {
            unresponsive: true,
            ..Default::default()
        })
    }

    /// describes the group, but never answers a removal
    pub(crate) fn stalled(snapshot: GroupSnapshot) -> Arc<Self> {
        Arc::new(Self {
            snapshot: Some(snapshot),
            stalled: true,
            ..Default::default()
        })
    }

    pub(crate) fn rejecting(
        snapshot: GroupSnapshot,
        rejected: impl IntoIterator<Item = (&'static str, ResponseError)>,
    ) -> Arc<Self> {
        Arc::new(Self {
            snapshot: Some(snapshot),
            rejected: rejected
                .into_iter()
                .map(|(instance_id, error)| (instance_id.into(), error))
                .collect(),
            ..Default::default()
        })
    }

    pub(crate) fn omitting(snapshot: GroupSnapshot, omitted: BTreeSet<String>) -> Arc<Self> {
        Arc::new(Self {
            snapshot: Some(snapshot),
            omitted,
            ..Default::default()
        })
    }

    pub(crate) fn failing(snapshot: GroupSnapshot, cause: Cause) -> Arc<Self> {
        Arc::new(Self {
            snapshot: Some(snapshot),
            submission_failure: Some(cause),
            ..Default::default()
        })
    }

    pub(crate) fn lookups(&self) -> Vec<(String, Duration)> {
        self.lookups.lock().unwrap().clone()
    }

    pub(crate) fn submissions(&self) -> Vec<(String, BTreeSet<String>)> {
        self.submissions.lock().unwrap().clone()
    }

    pub(crate) fn closed(&self) -> Vec<Duration> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Coordinator for FakeCoordinator {
    async fn describe_group(
        &self,
        group_id: &str,
        timeout: Duration,
    ) -> Result<GroupSnapshot, Cause> {
        self.lookups
            .lock()
            .unwrap()
            .push((group_id.into(), timeout));

        if self.unresponsive {
            return future::pending().await;
        }

        self.snapshot
            .clone()
            .filter(|snapshot| snapshot.group_id == group_id)
            .ok_or(Cause::Api(ResponseError::GroupIdNotFound))
    }

    async fn remove_members(
        &self,
        group_id: &str,
        instance_ids: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, Outcome>, Cause> {
        self.submissions
            .lock()
            .unwrap()
            .push((group_id.into(), instance_ids.clone()));

        if self.stalled {
            return future::pending().await;
        }

        if let Some(cause) = self.submission_failure.clone() {
            return Err(cause);
        }

        Ok(instance_ids
            .iter()
            .filter(|instance_id| !self.omitted.contains(*instance_id))
            .map(|instance_id| {
                (
                    instance_id.clone(),
                    Outcome::from(self.rejected.get(instance_id).copied()),
                )
            })
            .collect())
    }

    async fn close(&self, timeout: Duration) -> Result<(), Cause> {
        self.closed.lock().unwrap().push(timeout);
        Ok(())
    }
}
