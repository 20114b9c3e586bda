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
    fmt,
};

use kafka_protocol::ResponseError;
use serde::{Deserialize, Serialize};

use crate::{ExecutionMode, list};

/// What happened to one member of a submitted removal.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Removed,
    Failed(#[serde(with = "error_code")] ResponseError),
}

impl Outcome {
    pub fn is_removed(&self) -> bool {
        matches!(self, Self::Removed)
    }

    /// the error of a member that was not removed
    pub fn error(&self) -> Option<ResponseError> {
        match self {
            Self::Removed => None,
            Self::Failed(error) => Some(*error),
        }
    }
}

impl From<Option<ResponseError>> for Outcome {
    fn from(error: Option<ResponseError>) -> Self {
        error.map_or(Self::Removed, Self::Failed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Removed => f.write_str("removed"),
            Self::Failed(error) => write!(f, "{error:?}: {error}"),
        }
    }
}

/// A response error as its numeric Kafka error code.
mod error_code {
    use kafka_protocol::ResponseError;
    use serde::{Deserialize as _, Deserializer, Serializer, de::Error as _};

    pub(super) fn serialize<S>(error: &ResponseError, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i16(error.code())
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<ResponseError, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = i16::deserialize(deserializer)?;
        ResponseError::try_from_code(code)
            .ok_or_else(|| D::Error::custom(format!("not an error code: {code}")))
    }
}

/// The result of a successful command.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum Report {
    Members {
        group_id: String,
        state: String,
        instance_ids: BTreeSet<String>,
    },

    Removal {
        group_id: String,
        mode: ExecutionMode,
        instance_ids: BTreeSet<String>,
        outcomes: BTreeMap<String, Outcome>,
    },

    NothingToRemove {
        group_id: String,
        prefix: String,
    },
}

impl Report {
    /// instance ids that were, or in a dry run would be, removed
    pub fn removed(&self) -> BTreeSet<String> {
        match self {
            Self::Removal { instance_ids, .. } => instance_ids.clone(),
            Self::Members { .. } | Self::NothingToRemove { .. } => BTreeSet::new(),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Members {
                group_id,
                state,
                instance_ids,
            } => write!(
                f,
                "group {group_id} ({state}) static members: [{}]",
                list(instance_ids)
            ),

            Self::Removal {
                group_id,
                mode: ExecutionMode::DryRun,
                instance_ids,
                ..
            } => write!(
                f,
                "dry run, would remove from group {group_id}: [{}]",
                list(instance_ids)
            ),

            Self::Removal {
                group_id,
                mode: ExecutionMode::Execute,
                outcomes,
                ..
            } => {
                write!(f, "removed from group {group_id}:")?;

                for (instance_id, outcome) in outcomes {
                    write!(f, "\n  {instance_id}: {outcome}")?;
                }

                Ok(())
            }

            Self::NothingToRemove { group_id, prefix } => write!(
                f,
                "nothing to remove from group {group_id}, every static member matches \
                 prefix {prefix}"
            ),
        }
    }
}
