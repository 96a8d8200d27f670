//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::CleanroomError;
use crate::storage::Location;
use crate::storage::StorageError;

/// Progress of one participant, in protocol order
///
/// Names the service sends that this client does not know decode as
/// `Unspecified`, which orders below every known state.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "String", into = "String")]
pub enum ParticipantState {
    #[default]
    Unspecified,
    Invited,
    DataContributed,
    DataTransforming,
    DataTransformed,
    Running,
    Succeeded,
}

impl ParticipantState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantState::Unspecified => "STATE_UNSPECIFIED",
            ParticipantState::Invited => "INVITED",
            ParticipantState::DataContributed => "DATA_CONTRIBUTED",
            ParticipantState::DataTransforming => "DATA_TRANSFORMING",
            ParticipantState::DataTransformed => "DATA_TRANSFORMED",
            ParticipantState::Running => "RUNNING",
            ParticipantState::Succeeded => "SUCCEEDED",
        }
    }
}

impl From<&str> for ParticipantState {
    fn from(name: &str) -> Self {
        match name {
            "INVITED" => ParticipantState::Invited,
            "DATA_CONTRIBUTED" => ParticipantState::DataContributed,
            "DATA_TRANSFORMING" => ParticipantState::DataTransforming,
            "DATA_TRANSFORMED" => ParticipantState::DataTransformed,
            "RUNNING" => ParticipantState::Running,
            "SUCCEEDED" => ParticipantState::Succeeded,
            _ => ParticipantState::Unspecified,
        }
    }
}

impl From<String> for ParticipantState {
    fn from(name: String) -> Self {
        ParticipantState::from(name.as_str())
    }
}

impl From<ParticipantState> for String {
    fn from(state: ParticipantState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    #[default]
    Unspecified,
    Publisher,
    Advertiser,
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        match name.as_str() {
            "PUBLISHER" => Role::Publisher,
            "ADVERTISER" => Role::Advertiser,
            _ => Role::Unspecified,
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        let name = match role {
            Role::Unspecified => "ROLE_UNSPECIFIED",
            Role::Publisher => "PUBLISHER",
            Role::Advertiser => "ADVERTISER",
        };
        name.to_string()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub state: ParticipantState,
}

/// Scoped storage credential handed out by the clean room
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageToken {
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<DateTime<Utc>>,
}

impl StorageToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expire_time, Some(t) if t < now)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairConfig {
    #[serde(default)]
    pub advertiser_twice_encrypted_data_url: String,
    #[serde(default)]
    pub advertiser_triple_encrypted_data_url: String,
    #[serde(default)]
    pub publisher_twice_encrypted_data_url: String,
    #[serde(default)]
    pub publisher_triple_encrypted_data_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<StorageToken>,
}

impl PairConfig {
    pub fn locations(&self) -> Result<Locations, StorageError> {
        Ok(Locations {
            advertiser_twice: Location::from_str(&self.advertiser_twice_encrypted_data_url)?,
            advertiser_triple: Location::from_str(&self.advertiser_triple_encrypted_data_url)?,
            publisher_twice: Location::from_str(&self.publisher_twice_encrypted_data_url)?,
            publisher_triple: Location::from_str(&self.publisher_triple_encrypted_data_url)?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanroomConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair_config: Option<PairConfig>,
}

/// Snapshot of a clean room as returned by the coordination service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cleanroom {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<CleanroomConfig>,
}

impl Cleanroom {
    pub fn state_of(&self, role: Role) -> ParticipantState {
        self.participants
            .iter()
            .rev()
            .find(|p| p.role == role)
            .map(|p| p.state)
            .unwrap_or_default()
    }

    /// `(publisher, advertiser)` states
    pub fn states(&self) -> (ParticipantState, ParticipantState) {
        (
            self.state_of(Role::Publisher),
            self.state_of(Role::Advertiser),
        )
    }

    pub fn pair_config(&self) -> Result<&PairConfig, CleanroomError> {
        self.config
            .as_ref()
            .and_then(|c| c.pair_config.as_ref())
            .ok_or(CleanroomError::MissingConfig)
    }
}

/// The four storage locations of a PAIR clean room
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Locations {
    /// Written by the advertiser in step 1
    pub advertiser_twice: Location,
    /// Read by the advertiser in step 3
    pub advertiser_triple: Location,
    /// Read by the advertiser in step 2
    pub publisher_twice: Location,
    /// Written by the advertiser in step 2
    pub publisher_triple: Location,
}

/// The work implied by a pair of participant states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Start at step 1 and continue through steps 2 and 3
    ContributeAdvertiserData,
    /// Start at step 2 and continue through step 3
    ReEncryptPublisherData,
    /// Only step 3
    MatchData,
}

impl Action {
    pub fn from_states(
        publisher: ParticipantState,
        advertiser: ParticipantState,
    ) -> Option<Action> {
        use ParticipantState::*;

        match (publisher, advertiser) {
            (DataContributed, Invited) => Some(Action::ContributeAdvertiserData),
            (DataContributed, DataContributed)
            | (DataTransforming, DataContributed)
            | (DataTransformed, DataContributed) => Some(Action::ReEncryptPublisherData),
            (DataContributed, DataTransformed)
            | (DataTransforming, DataTransformed)
            | (DataTransformed, DataTransformed)
            | (Running, DataTransformed)
            | (Succeeded, DataTransformed) => Some(Action::MatchData),
            _ => None,
        }
    }
}
