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

//! An in process broker that is its own group coordinator.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    io,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use bytes::{BufMut as _, Bytes, BytesMut};
use kafka_protocol::{
    ResponseError,
    messages::{
        ApiKey, ApiVersionsRequest, ApiVersionsResponse, BrokerId, DescribeGroupsRequest,
        DescribeGroupsResponse, FindCoordinatorRequest, FindCoordinatorResponse, LeaveGroupRequest,
        LeaveGroupResponse, RequestHeader, ResponseHeader,
        api_versions_response::ApiVersion,
        describe_groups_response::{DescribedGroup, DescribedGroupMember},
        leave_group_response::MemberResponse,
    },
    protocol::{Decodable, Encodable, HeaderVersion, Request, StrBytes},
};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::{TcpListener, TcpStream},
};
use tracing::debug;
use url::Url;

const DEAD: &str = "Dead";

fn invalid(error: impl Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, error.to_string())
}

fn str_bytes(s: &str) -> StrBytes {
    StrBytes::from_string(s.to_owned())
}

fn api_version(api_key: ApiKey, max_version: i16) -> ApiVersion {
    ApiVersion::default()
        .with_api_key(api_key as i16)
        .with_min_version(0)
        .with_max_version(max_version)
}

/// the api versions of a broker supporting static membership administration
pub fn api_versions() -> Vec<ApiVersion> {
    vec![
        api_version(ApiKey::FindCoordinator, 4),
        api_version(ApiKey::LeaveGroup, 5),
        api_version(ApiKey::DescribeGroups, 5),
        api_version(ApiKey::ApiVersions, 3),
    ]
}

/// a broker whose LeaveGroup predates removal by instance id
pub fn api_versions_without_batched_leave() -> Vec<ApiVersion> {
    vec![
        api_version(ApiKey::FindCoordinator, 4),
        api_version(ApiKey::LeaveGroup, 2),
        api_version(ApiKey::DescribeGroups, 5),
    ]
}

pub fn static_member(member_id: &str, instance_id: &str) -> DescribedGroupMember {
    DescribedGroupMember::default()
        .with_member_id(str_bytes(member_id))
        .with_group_instance_id(Some(str_bytes(instance_id)))
        .with_client_id(str_bytes("stream-thread-1"))
        .with_client_host(str_bytes("/10.0.0.1"))
}

pub fn dynamic_member(member_id: &str) -> DescribedGroupMember {
    DescribedGroupMember::default()
        .with_member_id(str_bytes(member_id))
        .with_client_id(str_bytes("stream-thread-1"))
        .with_client_host(str_bytes("/10.0.0.2"))
}

#[derive(Clone, Debug, Default)]
pub struct State {
    pub api_versions: Vec<ApiVersion>,
    pub groups: BTreeMap<String, Vec<DescribedGroupMember>>,

    /// instance ids whose removal is refused
    pub fenced: BTreeSet<String>,

    pub leave_requests: Vec<LeaveGroupRequest>,
}

impl State {
    pub fn group(
        self,
        group_id: impl Into<String>,
        members: impl IntoIterator<Item = DescribedGroupMember>,
    ) -> Self {
        let mut groups = self.groups;
        _ = groups.insert(group_id.into(), members.into_iter().collect());
        Self { groups, ..self }
    }

    pub fn fenced<'a>(self, instance_ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            fenced: instance_ids.into_iter().map(String::from).collect(),
            ..self
        }
    }
}

pub async fn broker(state: State) -> io::Result<(Url, Arc<Mutex<State>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local_addr = listener.local_addr()?;
    let state = Arc::new(Mutex::new(state));

    {
        let state = state.clone();

        _ = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                debug!(%peer);

                let state = state.clone();
                _ = tokio::spawn(async move {
                    if let Err(err) = serve(stream, local_addr, state).await {
                        debug!(%peer, %err);
                    }
                });
            }
        });
    }

    Url::parse(&format!("tcp://{local_addr}"))
        .map(|url| (url, state))
        .map_err(invalid)
}

fn decode<Q>(body: &mut Bytes, api_version: i16) -> io::Result<(i32, Q)>
where
    Q: Request,
{
    let header = RequestHeader::decode(body, <Q as HeaderVersion>::header_version(api_version))
        .map_err(invalid)?;

    <Q as Decodable>::decode(body, api_version)
        .map(|req| (header.correlation_id, req))
        .map_err(invalid)
}

fn encode<Q>(correlation_id: i32, api_version: i16, response: &Q::Response) -> io::Result<Bytes>
where
    Q: Request,
{
    let mut frame = BytesMut::new();
    frame.put_i32(0);

    ResponseHeader::default()
        .with_correlation_id(correlation_id)
        .encode(
            &mut frame,
            <Q::Response as HeaderVersion>::header_version(api_version),
        )
        .map_err(invalid)?;

    response.encode(&mut frame, api_version).map_err(invalid)?;

    let size = i32::try_from(frame.len() - size_of::<i32>()).map_err(invalid)?;
    frame[..size_of::<i32>()].copy_from_slice(&size.to_be_bytes());
    Ok(frame.freeze())
}

async fn serve(
    mut stream: TcpStream,
    local_addr: SocketAddr,
    state: Arc<Mutex<State>>,
) -> io::Result<()> {
    loop {
        let mut size = [0u8; 4];
        if stream.read_exact(&mut size).await.is_err() {
            return Ok(());
        }

        let mut body = vec![0u8; usize::try_from(i32::from_be_bytes(size)).map_err(invalid)?];
        _ = stream.read_exact(&mut body[..]).await?;

        let Some(&[k0, k1, v0, v1]) = body.get(..4) else {
            return Err(invalid("frame too short for a request header"));
        };

        let api_key = i16::from_be_bytes([k0, k1]);
        let api_version = i16::from_be_bytes([v0, v1]);
        let mut body = Bytes::from(body);

        let response = match api_key {
            ApiVersionsRequest::KEY => {
                let (correlation_id, _) = decode::<ApiVersionsRequest>(&mut body, api_version)?;
                let api_versions = state.lock().unwrap().api_versions.clone();

                encode::<ApiVersionsRequest>(
                    correlation_id,
                    api_version,
                    &ApiVersionsResponse::default().with_api_keys(api_versions),
                )?
            }

            FindCoordinatorRequest::KEY => {
                let (correlation_id, _) =
                    decode::<FindCoordinatorRequest>(&mut body, api_version)?;

                encode::<FindCoordinatorRequest>(
                    correlation_id,
                    api_version,
                    &FindCoordinatorResponse::default()
                        .with_node_id(BrokerId(111))
                        .with_host(StrBytes::from_string(local_addr.ip().to_string()))
                        .with_port(i32::from(local_addr.port())),
                )?
            }

            DescribeGroupsRequest::KEY => {
                let (correlation_id, req) =
                    decode::<DescribeGroupsRequest>(&mut body, api_version)?;
                let groups = state.lock().unwrap().groups.clone();

                let described = req
                    .groups
                    .into_iter()
                    .map(|group_id| match groups.get(group_id.as_str()) {
                        Some(members) => DescribedGroup::default()
                            .with_group_id(group_id)
                            .with_group_state(str_bytes("Stable"))
                            .with_protocol_type(str_bytes("consumer"))
                            .with_members(members.clone()),

                        None => DescribedGroup::default()
                            .with_group_id(group_id)
                            .with_group_state(str_bytes(DEAD)),
                    })
                    .collect();

                encode::<DescribeGroupsRequest>(
                    correlation_id,
                    api_version,
                    &DescribeGroupsResponse::default().with_groups(described),
                )?
            }

            LeaveGroupRequest::KEY => {
                let (correlation_id, req) = decode::<LeaveGroupRequest>(&mut body, api_version)?;
                let response = leave(&mut state.lock().unwrap(), req);
                encode::<LeaveGroupRequest>(correlation_id, api_version, &response)?
            }

            _ => return Err(invalid(format!("unexpected api key: {api_key}"))),
        };

        stream.write_all(&response[..]).await?;
    }
}

fn leave(state: &mut State, req: LeaveGroupRequest) -> LeaveGroupResponse {
    state.leave_requests.push(req.clone());

    let Some(members) = state.groups.get_mut(req.group_id.as_str()) else {
        return LeaveGroupResponse::default()
            .with_error_code(ResponseError::GroupIdNotFound.code());
    };

    let fenced = &state.fenced;

    let outcomes = req
        .members
        .into_iter()
        .map(|identity| {
            if identity
                .group_instance_id
                .as_deref()
                .is_some_and(|instance_id| fenced.contains(instance_id))
            {
                MemberResponse::default()
                    .with_member_id(identity.member_id)
                    .with_group_instance_id(identity.group_instance_id)
                    .with_error_code(ResponseError::FencedInstanceId.code())
            } else if let Some(position) = members
                .iter()
                .position(|member| member.group_instance_id == identity.group_instance_id)
            {
                let removed = members.remove(position);

                MemberResponse::default()
                    .with_member_id(removed.member_id)
                    .with_group_instance_id(identity.group_instance_id)
            } else {
                MemberResponse::default()
                    .with_member_id(identity.member_id)
                    .with_group_instance_id(identity.group_instance_id)
                    .with_error_code(ResponseError::UnknownMemberId.code())
            }
        })
        .collect();

    LeaveGroupResponse::default().with_members(outcomes)
}
