mod output_format;

pub use self::output_format::OutputFormat;

use crate::{
    node::{self, HostAddr, NodeParticipationClient, RestNodeClient},
    partkey::{Address, PartkeyRecord, Round},
};
use structopt::StructOpt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("node request failed")]
    Node(#[from] node::Error),
    #[error("formatting output failed")]
    OutputFormatFailed(#[from] output_format::Error),
    #[error("no participation key with id {id} on the node")]
    UnknownKey { id: String },
}

#[derive(StructOpt, Debug)]
pub struct NodeArgs {
    #[structopt(flatten)]
    addr: HostAddr,

    /// token sent to the node with every request
    #[structopt(long)]
    api_token: Option<String>,
}

impl NodeArgs {
    fn client(self) -> Result<RestNodeClient, Error> {
        RestNodeClient::new(self.addr, self.api_token, None).map_err(Error::Node)
    }
}

#[derive(StructOpt, Debug)]
#[structopt(rename_all = "kebab-case")]
pub enum Keys {
    /// List the participation keys installed on the node
    List {
        #[structopt(flatten)]
        node: NodeArgs,
        #[structopt(flatten)]
        output_format: OutputFormat,
    },
    /// Ask the node to generate a participation key. Generation runs in the
    /// background, use `keys list` to see when it is done
    Generate {
        #[structopt(flatten)]
        node: NodeArgs,
        /// account the key is generated for
        #[structopt(long)]
        address: Address,
        /// first round the key is valid for
        #[structopt(long)]
        first: Round,
        /// last round the key is valid for
        #[structopt(long)]
        last: Round,
        /// key dilution, the node picks one when not given
        #[structopt(long)]
        dilution: Option<u64>,
    },
    /// Delete a participation key from the node
    Delete {
        #[structopt(flatten)]
        node: NodeArgs,
        /// node identifier of the key
        id: String,
    },
}

impl Keys {
    pub fn exec(self) -> Result<(), Error> {
        match self {
            Keys::List {
                node,
                output_format,
            } => list(node, output_format),
            Keys::Generate {
                node,
                address,
                first,
                last,
                dilution,
            } => {
                node.client()?
                    .generate_participation_key(&address, first, last, dilution)?;
                println!("Generation started");
                Ok(())
            }
            Keys::Delete { node, id } => delete(node, id),
        }
    }
}

fn list(node: NodeArgs, output_format: OutputFormat) -> Result<(), Error> {
    let keys = node.client()?.participation_keys()?;
    let records: Vec<PartkeyRecord> = keys.iter().map(PartkeyRecord::from).collect();
    let formatted = output_format.format(&records)?;
    println!("{}", formatted);
    Ok(())
}

fn delete(node: NodeArgs, id: String) -> Result<(), Error> {
    let client = node.client()?;
    // the node treats unknown ids as a no-op, check first to report typos
    if !client.participation_keys()?.iter().any(|key| key.id == id) {
        return Err(Error::UnknownKey { id });
    }
    client.delete_participation_key(&id)?;
    println!("Success");
    Ok(())
}

/// Get the node status
#[derive(StructOpt, Debug)]
pub struct Status {
    #[structopt(flatten)]
    node: NodeArgs,
    #[structopt(flatten)]
    output_format: OutputFormat,
}

impl Status {
    pub fn exec(self) -> Result<(), Error> {
        let status = self.node.client()?.status()?;
        let formatted = self.output_format.format(&status)?;
        println!("{}", formatted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::address;

    #[derive(StructOpt, Debug)]
    struct Command {
        #[structopt(subcommand)]
        keys: Keys,
    }

    #[test]
    fn parse_generate() {
        let owner = address(4).to_string();
        let command = Command::from_iter_safe(vec![
            "keys",
            "generate",
            "--host",
            "http://127.0.0.1:8080",
            "--address",
            &owner,
            "--first",
            "10",
            "--last",
            "20",
        ])
        .unwrap();
        match command.keys {
            Keys::Generate {
                address: parsed,
                first,
                last,
                dilution,
                ..
            } => {
                assert_eq!(parsed, address(4));
                assert_eq!(first, Round::new(10));
                assert_eq!(last, Round::new(20));
                assert_eq!(dilution, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn generate_rejects_bad_address() {
        let result = Command::from_iter_safe(vec![
            "keys",
            "generate",
            "--host",
            "http://127.0.0.1:8080",
            "--address",
            "nope",
            "--first",
            "10",
            "--last",
            "20",
        ]);
        assert!(result.is_err());
    }
}
