//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::future::Future;

use protocol::cleanroom::state::Cleanroom;
use protocol::cleanroom::traits::CleanroomService;
use protocol::cleanroom::traits::View;
use protocol::cleanroom::CleanroomError;
use reqwest::StatusCode;
use reqwest::Url;
use serde::Serialize;

use super::AdvanceStateRequest;
use super::GetCleanroomRequest;
use super::RefreshTokenRequest;
use super::ADVANCE_STATE_PATH;
use super::GET_CLEANROOM_PATH;
use super::REFRESH_TOKEN_PATH;

/// HTTP client of the coordination service, bound to one clean room
#[derive(Clone, Debug)]
pub struct CleanroomClient {
    http: reqwest::Client,
    base: String,
    token: String,
    cleanroom: String,
}

impl CleanroomClient {
    pub fn new(http: reqwest::Client, base: Url, token: &str, cleanroom: &str) -> CleanroomClient {
        CleanroomClient {
            http,
            base: base.as_str().trim_end_matches('/').to_string(),
            token: token.to_string(),
            cleanroom: cleanroom.to_string(),
        }
    }

    /// Resource name of the clean room
    pub fn name(&self) -> &str {
        &self.cleanroom
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<Cleanroom, CleanroomError> {
        let url = self.endpoint(path);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| CleanroomError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| CleanroomError::Transport(e.to_string()))?;
        if status != StatusCode::OK {
            return Err(CleanroomError::Status(status.as_u16()));
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

impl CleanroomService for CleanroomClient {
    fn get_cleanroom(
        &self,
        view: View,
    ) -> impl Future<Output = Result<Cleanroom, CleanroomError>> + Send {
        let req = GetCleanroomRequest {
            name: self.cleanroom.clone(),
            view,
        };
        async move { self.post(GET_CLEANROOM_PATH, &req).await }
    }

    fn refresh_token(&self) -> impl Future<Output = Result<Cleanroom, CleanroomError>> + Send {
        let req = RefreshTokenRequest {
            name: self.cleanroom.clone(),
        };
        async move { self.post(REFRESH_TOKEN_PATH, &req).await }
    }

    fn advance_state(&self) -> impl Future<Output = Result<Cleanroom, CleanroomError>> + Send {
        let req = AdvanceStateRequest {
            name: self.cleanroom.clone(),
        };
        async move { self.post(ADVANCE_STATE_PATH, &req).await }
    }
}
