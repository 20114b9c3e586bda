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

//! Prune Client
//!
//! Administrative connection to a Kafka cluster, limited to describing a
//! consumer group and removing its static members.

use std::{
    collections::{BTreeMap, btree_map::Entry},
    fmt, io,
    sync::Arc,
    time::Duration,
};

use connection::Connection;
use kafka_protocol::{
    ResponseError,
    messages::{
        ApiKey, ApiVersionsRequest, DescribeGroupsRequest, FindCoordinatorRequest, GroupId,
        LeaveGroupRequest, api_versions_response::ApiVersion,
        describe_groups_response::DescribedGroup, leave_group_request::MemberIdentity,
        leave_group_response::MemberResponse,
    },
    protocol::{Request, StrBytes},
};
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, instrument, warn};
use url::Url;

mod connection;

pub use connection::MAX_FRAME_SIZE;

/// Kafka's default `request.timeout.ms`
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// State of a group that the coordinator has no record of.
pub const DEAD: &str = "Dead";

/// Coordinator key type for a consumer group.
pub const GROUP_KEY_TYPE: i8 = 0;

/// Member id used when a member is addressed by its instance id only.
pub const UNKNOWN_MEMBER_ID: &str = "";

const API_VERSIONS_VERSION: i16 = 0;
const FIND_COORDINATOR_VERSION: i16 = 1;
const DESCRIBE_GROUPS_VERSION: i16 = 4;

/// batched removal by `group.instance.id` arrived in version 3
pub const LEAVE_GROUP_VERSION: i16 = 3;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    Api(ResponseError),
    CorrelationMismatch { expected: i32, found: i32 },
    FrameSize(i32),
    Io(Arc<io::Error>),
    Message(String),
    NoBootstrapServers,
    Protocol(String),
    Timeout(Duration),
    TryFromInt(#[from] std::num::TryFromIntError),
    UnknownErrorCode(i16),
    UnknownHost(Url),
    UnsupportedVersion { api_key: ApiKey, api_version: i16 },
    Url(#[from] url::ParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) | Self::Protocol(msg) => write!(f, "{msg}"),
            Self::Api(error) => write!(f, "{error:?}: {error}"),
            Self::FrameSize(size) => write!(f, "frame of {size} bytes exceeds {MAX_FRAME_SIZE}"),
            Self::Timeout(duration) => write!(f, "timed out after {}ms", duration.as_millis()),
            error => write!(f, "{error:?}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A response error code as a result, zero being success.
pub fn response_error(error_code: i16) -> Result<()> {
    if error_code == 0 {
        return Ok(());
    }

    Err(ResponseError::try_from_code(error_code)
        .map_or(Error::UnknownErrorCode(error_code), Error::Api))
}

/// Parse `HOST1:PORT1,HOST2:PORT2` (optionally `tcp://` prefixed) into broker urls.
pub fn bootstrap_servers(servers: &str) -> Result<Vec<Url>> {
    servers
        .split(',')
        .map(str::trim)
        .filter(|server| !server.is_empty())
        .map(|server| {
            if server.contains("://") {
                Url::parse(server)
            } else {
                Url::parse(&format!("tcp://{server}"))
            }
            .map_err(Error::from)
            .and_then(|url| {
                if url.host_str().is_some() && url.port().is_some() {
                    Ok(url)
                } else {
                    Err(Error::UnknownHost(url))
                }
            })
        })
        .collect::<Result<Vec<_>>>()
        .and_then(|urls| {
            if urls.is_empty() {
                Err(Error::NoBootstrapServers)
            } else {
                Ok(urls)
            }
        })
}

/// Leave group request removing static members by instance id.
pub fn static_members<I>(group_id: &str, instance_ids: I) -> LeaveGroupRequest
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    LeaveGroupRequest::default()
        .with_group_id(GroupId::from(StrBytes::from_string(group_id.to_owned())))
        .with_members(
            instance_ids
                .into_iter()
                .map(|instance_id| {
                    MemberIdentity::default()
                        .with_member_id(StrBytes::from_static_str(UNKNOWN_MEMBER_ID))
                        .with_group_instance_id(Some(StrBytes::from_string(instance_id.into())))
                })
                .collect(),
        )
}

fn supports(api_keys: &[ApiVersion], api_key: ApiKey, api_version: i16) -> bool {
    api_keys.iter().any(|supported| {
        supported.api_key == api_key as i16
            && (supported.min_version..=supported.max_version).contains(&api_version)
    })
}

/// Group administration client: one bootstrap connection, plus one
/// connection per group coordinator it has been directed to.
#[derive(Debug)]
pub struct Client {
    client_id: Option<String>,
    request_timeout: Duration,
    bootstrap: Mutex<Connection>,
    coordinators: Mutex<BTreeMap<String, Connection>>,
}

impl Client {
    pub fn builder(bootstrap: Vec<Url>) -> Builder {
        Builder::bootstrap(bootstrap)
    }

    /// the coordinator's description of a group
    #[instrument(skip(self))]
    pub async fn describe_group(&self, group_id: &str) -> Result<DescribedGroup> {
        let req = DescribeGroupsRequest::default()
            .with_groups(vec![GroupId::from(StrBytes::from_string(
                group_id.to_owned(),
            ))])
            .with_include_authorized_operations(false);

        let response = self
            .call_coordinator(group_id, &req, DESCRIBE_GROUPS_VERSION)
            .await?;

        let group = response
            .groups
            .into_iter()
            .find(|group| group.group_id.as_str() == group_id)
            .ok_or(Error::Api(ResponseError::GroupIdNotFound))?;

        response_error(group.error_code)?;

        if group.group_state.as_str() == DEAD {
            Err(Error::Api(ResponseError::GroupIdNotFound))
        } else {
            Ok(group)
        }
    }

    /// remove static members from a group by instance id, in a single request
    #[instrument(skip(self, instance_ids))]
    pub async fn leave_group(
        &self,
        group_id: &str,
        instance_ids: &[String],
    ) -> Result<Vec<MemberResponse>> {
        let req = static_members(group_id, instance_ids.iter().cloned());

        let response = self
            .call_coordinator(group_id, &req, LEAVE_GROUP_VERSION)
            .await?;

        response_error(response.error_code).map(|()| response.members)
    }

    /// shutdown every connection, within the supplied timeout
    pub async fn close(&self, within: Duration) -> Result<()> {
        timeout(within, async {
            let mut coordinators = self.coordinators.lock().await;

            for (peer, mut connection) in std::mem::take(&mut *coordinators) {
                if let Err(err) = connection.shutdown().await {
                    warn!(%peer, %err);
                }
            }

            self.bootstrap.lock().await.shutdown().await
        })
        .await
        .unwrap_or_else(|_elapsed| Err(Error::Timeout(within)))
    }

    async fn call_coordinator<Q>(
        &self,
        group_id: &str,
        req: &Q,
        api_version: i16,
    ) -> Result<Q::Response>
    where
        Q: Request + fmt::Debug,
        Q::Response: fmt::Debug,
    {
        let (host, port) = self.find_coordinator(group_id).await?;
        let mut coordinators = self.coordinators.lock().await;

        let connection = match coordinators.entry(format!("{host}:{port}")) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                vacant.insert(Connection::open(&host, port, self.request_timeout).await?)
            }
        };

        connection
            .call(
                req,
                api_version,
                self.client_id.as_deref(),
                self.request_timeout,
            )
            .await
    }

    async fn find_coordinator(&self, group_id: &str) -> Result<(String, u16)> {
        let req = FindCoordinatorRequest::default()
            .with_key(StrBytes::from_string(group_id.to_owned()))
            .with_key_type(GROUP_KEY_TYPE);

        let response = self
            .bootstrap
            .lock()
            .await
            .call(
                &req,
                FIND_COORDINATOR_VERSION,
                self.client_id.as_deref(),
                self.request_timeout,
            )
            .await?;

        response_error(response.error_code).inspect_err(|err| {
            debug!(group_id, %err, error_message = ?response.error_message);
        })?;

        let host = response.host.as_str();
        debug!(group_id, node_id = ?response.node_id, host, port = response.port);
        Ok((host.to_owned(), u16::try_from(response.port)?))
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Builder {
    bootstrap: Vec<Url>,
    client_id: Option<String>,
    request_timeout: Duration,
}

impl Builder {
    /// broker urls, tried in order
    pub fn bootstrap(bootstrap: Vec<Url>) -> Self {
        Self {
            bootstrap,
            client_id: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// client id used when making requests to the broker
    pub fn client_id(self, client_id: Option<String>) -> Self {
        Self { client_id, ..self }
    }

    /// upper bound on connecting and on each request/response exchange
    pub fn request_timeout(self, request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            ..self
        }
    }

    /// connect to the first reachable bootstrap broker, verifying that it
    /// supports the API versions spoken by this client
    pub async fn build(self) -> Result<Client> {
        let mut connection = self.connect().await?;

        let versions = connection
            .call(
                &ApiVersionsRequest::default(),
                API_VERSIONS_VERSION,
                self.client_id.as_deref(),
                self.request_timeout,
            )
            .await?;

        response_error(versions.error_code)?;

        for (api_key, api_version) in [
            (ApiKey::FindCoordinator, FIND_COORDINATOR_VERSION),
            (ApiKey::DescribeGroups, DESCRIBE_GROUPS_VERSION),
            (ApiKey::LeaveGroup, LEAVE_GROUP_VERSION),
        ] {
            if !supports(&versions.api_keys, api_key, api_version) {
                return Err(Error::UnsupportedVersion {
                    api_key,
                    api_version,
                });
            }
        }

        Ok(Client {
            client_id: self.client_id,
            request_timeout: self.request_timeout,
            bootstrap: Mutex::new(connection),
            coordinators: Mutex::new(BTreeMap::new()),
        })
    }

    async fn connect(&self) -> Result<Connection> {
        let mut last = Error::NoBootstrapServers;

        for broker in &self.bootstrap {
            let Some((host, port)) = broker.host_str().zip(broker.port()) else {
                last = Error::UnknownHost(broker.clone());
                continue;
            };

            match Connection::open(host, port, self.request_timeout).await {
                Ok(connection) => {
                    debug!(peer = connection.peer());
                    return Ok(connection);
                }

                Err(err) => {
                    warn!(%broker, %err);
                    last = err;
                }
            }
        }

        Err(last)
    }
}
