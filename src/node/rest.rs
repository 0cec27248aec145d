use super::{
    interfaces::{NodeStatusDto, ParticipationKeyDto},
    Error, HostAddr, NodeParticipationClient,
};
use crate::partkey::{Address, Round};
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    StatusCode, Url,
};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const API_TOKEN_HEADER: &str = "X-Algo-API-Token";

const API_VERSION: &str = "v2";
const PARTICIPATION: &str = "participation";

/// [`NodeParticipationClient`] talking to the node REST API with
/// blocking requests.
///
/// [`NodeParticipationClient`]: ../trait.NodeParticipationClient.html
#[derive(Debug, Clone)]
pub struct RestNodeClient {
    host: HostAddr,
    api_token: Option<String>,
    client: Client,
}

impl RestNodeClient {
    pub fn new(
        host: HostAddr,
        api_token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(RestNodeClient {
            host,
            api_token,
            client: builder.build()?,
        })
    }

    pub fn host(&self) -> &HostAddr {
        &self.host
    }

    pub fn status(&self) -> Result<NodeStatusDto, Error> {
        let url = self.host.with_segments(&[API_VERSION, "status"])?;
        let response = self.send(self.client.get(url))?;
        json(ok_response(response)?)
    }

    pub(crate) fn generate_url(
        &self,
        address: &Address,
        first: Round,
        last: Round,
        dilution: Option<u64>,
    ) -> Result<Url, Error> {
        let mut url = self.host.with_segments(&[
            API_VERSION,
            PARTICIPATION,
            "generate",
            address.as_str(),
        ])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("first", &first.to_string())
                .append_pair("last", &last.to_string());
            if let Some(dilution) = dilution {
                query.append_pair("dilution", &dilution.to_string());
            }
        }
        Ok(url)
    }

    fn send(&self, builder: RequestBuilder) -> Result<Response, Error> {
        let builder = match &self.api_token {
            Some(token) => builder.header(API_TOKEN_HEADER, token),
            None => builder,
        };
        let request = builder.build()?;
        tracing::trace!(method = %request.method(), url = %request.url(), "node request");
        let response = self.client.execute(request)?;
        tracing::trace!(status = %response.status(), "node response");
        Ok(response)
    }
}

impl NodeParticipationClient for RestNodeClient {
    fn current_round(&self) -> Result<Round, Error> {
        self.status().map(|status| status.last_round)
    }

    fn participation_keys(&self) -> Result<Vec<ParticipationKeyDto>, Error> {
        let url = self.host.with_segments(&[API_VERSION, PARTICIPATION])?;
        let response = self.send(self.client.get(url))?;
        // the node answers 404 when it holds no key at all
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        json(ok_response(response)?)
    }

    fn generate_participation_key(
        &self,
        address: &Address,
        first: Round,
        last: Round,
        dilution: Option<u64>,
    ) -> Result<(), Error> {
        let url = self.generate_url(address, first, last, dilution)?;
        let response = self.send(self.client.post(url))?;
        ok_response(response).map(|_| ())
    }

    fn delete_participation_key(&self, id: &str) -> Result<(), Error> {
        let url = self.host.with_segments(&[API_VERSION, PARTICIPATION, id])?;
        let response = self.send(self.client.delete(url))?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(id, "participation key already absent from the node");
            return Ok(());
        }
        ok_response(response).map(|_| ())
    }
}

fn ok_response(response: Response) -> Result<String, Error> {
    let status = response.status();
    let body = response.text()?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(Error::UnexpectedStatus { status, body })
    }
}

fn json<T: DeserializeOwned>(body: String) -> Result<T, Error> {
    serde_json::from_str(&body).map_err(Error::Deserialization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::address;

    fn client(host: &str) -> RestNodeClient {
        RestNodeClient::new(HostAddr::new(host.parse().unwrap()), None, None).unwrap()
    }

    #[test]
    fn generate_url_with_window() {
        let owner = address(1);
        let url = client("http://127.0.0.1:8080")
            .generate_url(&owner, Round::new(100), Round::new(2000), None)
            .unwrap();
        assert_eq!(
            url.as_str(),
            format!(
                "http://127.0.0.1:8080/v2/participation/generate/{}?first=100&last=2000",
                owner
            )
        );
    }

    #[test]
    fn generate_url_with_dilution() {
        let owner = address(1);
        let url = client("http://127.0.0.1:8080")
            .generate_url(&owner, Round::new(100), Round::new(2000), Some(45))
            .unwrap();
        assert_eq!(url.query(), Some("first=100&last=2000&dilution=45"));
    }

    #[test]
    fn unreachable_node_is_a_request_error() {
        // nothing listens on the discard port
        let client = RestNodeClient::new(
            HostAddr::new("http://127.0.0.1:9".parse().unwrap()),
            None,
            Some(Duration::from_secs(2)),
        )
        .unwrap();
        assert!(matches!(client.current_round(), Err(Error::Request(_))));
    }
}
