use super::Error;
use reqwest::Url;
use structopt::StructOpt;

#[derive(Debug, Clone, StructOpt)]
pub struct HostAddr {
    /// node API address. Must always have `http://` or `https://` prefix.
    /// E.g. `--host http://127.0.0.1:8080`, `--host https://node.com:8443/algod`
    #[structopt(long)]
    host: Url,
}

impl HostAddr {
    pub fn new(host: Url) -> Self {
        HostAddr { host }
    }

    pub fn with_segments(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.host.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidHost)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn url(&self) -> &Url {
        &self.host
    }
}
