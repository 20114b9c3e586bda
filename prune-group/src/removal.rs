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

use std::collections::{BTreeMap, BTreeSet};

use kafka_protocol::ResponseError;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    Cause, Coordinator, Error, ExecutionMode, Outcome, REMOVAL_TIMEOUT, Report, Result,
};

/// Submit the whole removal set as one request bounded by
/// [`REMOVAL_TIMEOUT`], or in a dry run report it without submitting.
pub(crate) async fn submit<C>(
    coordinator: &C,
    group_id: String,
    instance_ids: BTreeSet<String>,
    mode: ExecutionMode,
) -> Result<Report>
where
    C: Coordinator + ?Sized,
{
    if mode.is_dry_run() {
        warn!(%group_id, ?instance_ids, "dry run, not removing");

        return Ok(Report::Removal {
            group_id,
            mode,
            instance_ids,
            outcomes: BTreeMap::new(),
        });
    }

    warn!(%group_id, ?instance_ids, "removing");

    let returned = match timeout(
        REMOVAL_TIMEOUT,
        coordinator.remove_members(&group_id, &instance_ids),
    )
    .await
    .unwrap_or(Err(Cause::Timeout(REMOVAL_TIMEOUT)))
    {
        Ok(returned) => returned,
        Err(cause) => {
            return Err(Error::Submission {
                group_id,
                cause,
                outcomes: BTreeMap::new(),
            });
        }
    };

    debug!(?returned);

    // a member absent from the response was not confirmed removed
    let outcomes = instance_ids
        .iter()
        .map(|instance_id| {
            (
                instance_id.clone(),
                returned
                    .get(instance_id)
                    .copied()
                    .unwrap_or(Outcome::Failed(ResponseError::UnknownServerError)),
            )
        })
        .collect::<BTreeMap<_, _>>();

    if let Some(error) = outcomes
        .values()
        .find(|outcome| !outcome.is_removed())
        .and_then(Outcome::error)
    {
        return Err(Error::Submission {
            group_id,
            cause: Cause::Api(error),
            outcomes,
        });
    }

    info!(%group_id, removed = instance_ids.len());

    Ok(Report::Removal {
        group_id,
        mode,
        instance_ids,
        outcomes,
    })
}
