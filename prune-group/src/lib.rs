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

//! Prune Group
//!
//! Reconciles the static membership of a consumer group against an
//! operator's selection: show the static members, remove an explicit list
//! of instance ids, or remove every instance that does not match a prefix.
//!
//! A [`Command`] is resolved from the operator's intent before any network
//! activity. Running it fetches a fresh [`GroupSnapshot`] from a
//! [`Coordinator`], computes the removal set, and (unless in
//! [`ExecutionMode::DryRun`]) submits it as a single batch.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    marker::PhantomData,
    result,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

pub use coordinator::{Cause, Coordinator};
pub use report::{Outcome, Report};
pub use snapshot::{GroupMember, GroupSnapshot};

mod coordinator;
pub mod ids;
mod kafka;
pub mod prefix;
mod removal;
mod report;
pub mod show;
mod snapshot;

/// Upper bound on retrieving the group snapshot.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on submitting a removal, from locating the coordinator
/// through to its response.
pub const REMOVAL_TIMEOUT: Duration = prune_client::DEFAULT_REQUEST_TIMEOUT;

/// Upper bound on releasing the coordinator connection.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(60);

pub type Result<T, E = Error> = result::Result<T, E>;

#[derive(thiserror::Error, Clone, Debug)]
pub enum Error {
    InvalidArguments(String),

    GroupLookup {
        group_id: String,
        cause: Cause,
    },

    UnknownMember {
        group_id: String,
        missing: BTreeSet<String>,
        active: BTreeSet<String>,
    },

    Submission {
        group_id: String,
        cause: Cause,
        outcomes: BTreeMap<String, Outcome>,
    },
}

impl Error {
    /// process exit code for this failure, success being zero
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidArguments(_) => 2,
            Self::GroupLookup { .. } | Self::UnknownMember { .. } | Self::Submission { .. } => 1,
        }
    }
}

pub(crate) fn list<'a>(ids: impl IntoIterator<Item = &'a String>) -> String {
    ids.into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArguments(reason) => write!(f, "invalid arguments: {reason}"),

            Self::GroupLookup { group_id, cause } => {
                write!(f, "unable to describe group {group_id}: {cause}")
            }

            Self::UnknownMember {
                group_id,
                missing,
                active,
            } => write!(
                f,
                "refusing to remove members [{}] from group {group_id} because they are not \
                 active, active members: [{}]",
                list(missing),
                list(active)
            ),

            Self::Submission {
                group_id,
                cause,
                outcomes,
            } => {
                write!(f, "removing members from group {group_id} failed: {cause}")?;

                for (instance_id, outcome) in outcomes {
                    write!(f, "\n  {instance_id}: {outcome}")?;
                }

                Ok(())
            }
        }
    }
}

/// Whether a computed removal is submitted to the coordinator.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    DryRun,
    Execute,
}

impl ExecutionMode {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun)
    }
}

impl From<bool> for ExecutionMode {
    fn from(execute: bool) -> Self {
        if execute { Self::Execute } else { Self::DryRun }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DryRun => f.write_str("dry run"),
            Self::Execute => f.write_str("execute"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Show(show::Configuration),
    RemoveByIds(ids::Configuration),
    RemoveByPrefix(prefix::Configuration),
}

impl Command {
    pub fn show() -> show::Builder<PhantomData<String>> {
        show::Builder::default()
    }

    pub fn remove_by_ids() -> ids::Builder<PhantomData<String>, PhantomData<Vec<String>>> {
        ids::Builder::default()
    }

    pub fn remove_by_prefix() -> prefix::Builder<PhantomData<String>, PhantomData<String>> {
        prefix::Builder::default()
    }

    /// Resolve the operator's intent into exactly one command, supplying
    /// neither instance ids nor a prefix resolves to [`Command::Show`].
    pub fn resolve(
        group_id: impl Into<String>,
        instance_ids: Option<Vec<String>>,
        prefix: Option<String>,
        mode: ExecutionMode,
    ) -> Result<Self> {
        match (instance_ids, prefix) {
            (Some(_), Some(_)) => Err(Error::InvalidArguments(
                "instance ids and prefix cannot be used together".into(),
            )),

            (Some(instance_ids), None) => Self::remove_by_ids()
                .group_id(group_id)
                .instance_ids(instance_ids)
                .mode(mode)
                .build(),

            (None, Some(prefix)) => Self::remove_by_prefix()
                .group_id(group_id)
                .prefix(prefix)
                .mode(mode)
                .build(),

            (None, None) => {
                if !mode.is_dry_run() {
                    debug!("nothing selected for removal, showing members");
                }

                Self::show().group_id(group_id).build()
            }
        }
    }

    pub fn group_id(&self) -> &str {
        match self {
            Self::Show(configuration) => configuration.group_id(),
            Self::RemoveByIds(configuration) => configuration.group_id(),
            Self::RemoveByPrefix(configuration) => configuration.group_id(),
        }
    }

    /// Run this command against the coordinator, which is closed before
    /// returning whatever the outcome.
    pub async fn main<C>(self, coordinator: C) -> Result<Report>
    where
        C: Coordinator,
    {
        let outcome = match self {
            Self::Show(configuration) => show::Show::from(configuration).main(&coordinator).await,

            Self::RemoveByIds(configuration) => {
                ids::RemoveByIds::from(configuration)
                    .main(&coordinator)
                    .await
            }

            Self::RemoveByPrefix(configuration) => {
                prefix::RemoveByPrefix::from(configuration)
                    .main(&coordinator)
                    .await
            }
        };

        if let Err(cause) = coordinator.close(CLOSE_TIMEOUT).await {
            warn!(%cause);
        }

        outcome
    }
}

pub(crate) fn valid_group_id(group_id: String) -> Result<String> {
    if group_id.trim().is_empty() {
        Err(Error::InvalidArguments("group id must not be empty".into()))
    } else {
        Ok(group_id)
    }
}

/// fetch a fresh snapshot of the group, bounded by [`LOOKUP_TIMEOUT`]
pub(crate) async fn lookup<C>(coordinator: &C, group_id: &str) -> Result<GroupSnapshot>
where
    C: Coordinator + ?Sized,
{
    timeout(
        LOOKUP_TIMEOUT,
        coordinator.describe_group(group_id, LOOKUP_TIMEOUT),
    )
    .await
    .unwrap_or(Err(Cause::Timeout(LOOKUP_TIMEOUT)))
    .inspect(|snapshot| debug!(?snapshot))
    .map_err(|cause| Error::GroupLookup {
        group_id: group_id.into(),
        cause,
    })
}
