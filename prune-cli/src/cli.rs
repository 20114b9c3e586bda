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

use std::{io::Write, path::PathBuf, process, time::Duration};

use clap::{ArgAction, Parser};
use prune_client::{Client, DEFAULT_REQUEST_TIMEOUT, bootstrap_servers};
use prune_group::{
    Cause, Command, Error as GroupError, ExecutionMode, LOOKUP_TIMEOUT, Report,
};
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use crate::{EnvVarExp, Properties, Result};

const DEFAULT_BOOTSTRAP_SERVERS: &str = "localhost:9092";

const BOOTSTRAP_SERVERS: &str = "bootstrap.servers";
const CLIENT_ID: &str = "client.id";
const REQUEST_TIMEOUT_MS: &str = "request.timeout.ms";
const SECURITY_PROTOCOL: &str = "security.protocol";
const PLAINTEXT: &str = "PLAINTEXT";

/// Remove static members from a Kafka Streams application's consumer group
#[derive(Clone, Debug, Parser)]
#[command(name = "prune", version, about, long_about = None)]
pub struct Cli {
    /// The application id, which is the group id of the application's consumer group
    #[arg(long)]
    application_id: EnvVarExp<String>,

    /// Comma separated list of brokers: HOST1:PORT1,HOST2:PORT2 [default: localhost:9092]
    #[arg(long, env = "BOOTSTRAP_SERVERS", visible_alias = "bootstrap-server")]
    bootstrap_servers: Option<EnvVarExp<String>>,

    /// Comma separated instance ids of the static members to remove
    #[arg(long, value_delimiter = ',', conflicts_with = "prefix_keep")]
    instance_ids: Option<Vec<EnvVarExp<String>>>,

    /// Keep the static members with an instance id starting with this prefix, removing all others
    #[arg(long)]
    prefix_keep: Option<EnvVarExp<String>>,

    /// Properties file of admin client configuration
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Remove the members, rather than a dry run
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true"
    )]
    execute: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

/// How to reach the cluster.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ClientConfig {
    pub bootstrap: Vec<Url>,
    pub client_id: Option<String>,
    pub request_timeout: Duration,
}

fn invalid(reason: impl Into<String>) -> crate::Error {
    GroupError::InvalidArguments(reason.into()).into()
}

impl Cli {
    pub async fn main() -> Result<Report> {
        debug!(pid = process::id());

        let cli = Cli::parse();
        debug!(?cli);

        let report = cli.run().await?;
        cli.print(&report, &mut std::io::stdout())?;
        Ok(report)
    }

    /// the group command, resolved before any connection is made
    pub fn command(&self) -> Result<Command> {
        Command::resolve(
            self.application_id.clone().into_inner(),
            self.instance_ids.clone().map(|instance_ids| {
                instance_ids
                    .into_iter()
                    .map(EnvVarExp::into_inner)
                    .collect()
            }),
            self.prefix_keep.clone().map(EnvVarExp::into_inner),
            ExecutionMode::from(self.execute),
        )
        .map_err(Into::into)
    }

    /// admin client configuration, the bootstrap servers flag taking
    /// precedence over the properties file
    pub fn client_config(&self) -> Result<ClientConfig> {
        let properties = self
            .config_file
            .as_ref()
            .map(Properties::from_file)
            .transpose()?
            .unwrap_or_default();

        for (key, value) in properties.iter() {
            if ![BOOTSTRAP_SERVERS, CLIENT_ID, REQUEST_TIMEOUT_MS, SECURITY_PROTOCOL].contains(&key)
            {
                debug!(key, value, "ignored");
            }
        }

        if let Some(protocol) = properties.get(SECURITY_PROTOCOL) {
            if !protocol.eq_ignore_ascii_case(PLAINTEXT) {
                return Err(invalid(format!(
                    "unsupported {SECURITY_PROTOCOL}: {protocol}"
                )));
            }
        }

        let servers = self
            .bootstrap_servers
            .clone()
            .map(EnvVarExp::into_inner)
            .or(properties.get(BOOTSTRAP_SERVERS).map(str::to_owned))
            .unwrap_or(DEFAULT_BOOTSTRAP_SERVERS.to_owned());

        let bootstrap = bootstrap_servers(&servers)
            .map_err(|err| invalid(format!("invalid bootstrap servers {servers}: {err}")))?;

        let request_timeout = properties
            .get(REQUEST_TIMEOUT_MS)
            .map(|ms| {
                ms.parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|err| invalid(format!("invalid {REQUEST_TIMEOUT_MS}: {ms}: {err}")))
            })
            .transpose()?
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let client_id = properties
            .get(CLIENT_ID)
            .filter(|client_id| !client_id.is_empty())
            .unwrap_or(env!("CARGO_PKG_NAME"))
            .to_owned();

        Ok(ClientConfig {
            bootstrap,
            client_id: Some(client_id),
            request_timeout,
        })
    }

    async fn run(&self) -> Result<Report> {
        let command = self.command()?;
        debug!(?command);

        let ClientConfig {
            bootstrap,
            client_id,
            request_timeout,
        } = self.client_config()?;

        let client = timeout(
            LOOKUP_TIMEOUT,
            Client::builder(bootstrap)
                .client_id(client_id)
                .request_timeout(request_timeout)
                .build(),
        )
        .await
        .map_err(|_elapsed| Cause::Timeout(LOOKUP_TIMEOUT))
        .and_then(|client| client.map_err(Cause::from))
        .map_err(|cause| GroupError::GroupLookup {
            group_id: command.group_id().into(),
            cause,
        })?;

        command.main(client).await.map_err(Into::into)
    }

    fn print(&self, report: &Report, out: &mut impl Write) -> Result<()> {
        if self.json {
            serde_json::to_writer_pretty(&mut *out, report)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{report}")?;
        }

        Ok(())
    }
}
