//! wire format of the node administrative API

use crate::partkey::{Address, KeyMaterial, PartkeyRecord, Round};
use serde::{Deserialize, Serialize};

/// one entry of `GET /v2/participation`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParticipationKeyDto {
    pub id: String,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_first_valid: Option<Round>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_last_valid: Option<Round>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_vote: Option<Round>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_block_proposal: Option<Round>,
    pub key: AccountParticipationDto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccountParticipationDto {
    pub vote_first_valid: Round,
    pub vote_last_valid: Round,
    #[serde(default)]
    pub vote_key_dilution: Option<u64>,
    #[serde(default)]
    pub selection_participation_key: Option<String>,
    #[serde(default)]
    pub vote_participation_key: Option<String>,
    #[serde(default)]
    pub state_proof_key: Option<String>,
}

/// subset of `GET /v2/status` the daemon relies on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeStatusDto {
    pub last_round: Round,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_since_last_round: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catchup_time: Option<u64>,
}

impl ParticipationKeyDto {
    pub fn matches(&self, address: &Address, first: Round, last: Round) -> bool {
        self.key.vote_first_valid == first
            && self.key.vote_last_valid == last
            && &self.address == address
    }

    fn key_material(&self) -> KeyMaterial {
        KeyMaterial {
            selection_participation_key: self.key.selection_participation_key.clone(),
            vote_participation_key: self.key.vote_participation_key.clone(),
            state_proof_key: self.key.state_proof_key.clone(),
        }
    }
}

impl PartkeyRecord {
    /// fill in what only the node knows about this key
    pub fn enrich_from_node(&mut self, key: &ParticipationKeyDto) {
        self.node_id = Some(key.id.clone());
        self.key_material = Some(key.key_material());
        if self.vote_key_dilution.is_none() {
            self.vote_key_dilution = key.key.vote_key_dilution;
        }
    }
}

impl From<&ParticipationKeyDto> for PartkeyRecord {
    fn from(key: &ParticipationKeyDto) -> Self {
        let mut record = PartkeyRecord::new(
            key.address.clone(),
            key.key.vote_first_valid,
            key.key.vote_last_valid,
        );
        record.enrich_from_node(key);
        record
    }
}
