//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Wire messages of the clean room coordination service, JSON encoded the
//! way protobuf maps to JSON: camelCase fields, enum values by name.

use protocol::cleanroom::traits::View;
use serde::Deserialize;
use serde::Serialize;

pub mod cleanroom;

pub const GET_CLEANROOM_PATH: &str = "/admin/api/external/v1/cleanroom/get";
pub const REFRESH_TOKEN_PATH: &str = "/admin/api/external/v1/cleanroom/refresh-token";
pub const ADVANCE_STATE_PATH: &str = "/admin/api/external/v1/cleanroom/advance-state";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCleanroomRequest {
    pub name: String,
    pub view: View,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceStateRequest {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_json() {
        let req = GetCleanroomRequest {
            name: "cleanrooms/1".to_string(),
            view: View::Sensitive,
        };
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"name":"cleanrooms/1","view":"SENSITIVE"}"#
        );
        let req = AdvanceStateRequest {
            name: "cleanrooms/1".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"name":"cleanrooms/1"}"#
        );
    }
}
