//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::state::Cleanroom;
use super::state::PairConfig;
use super::state::ParticipantState;
use super::CleanroomError;
use crate::pair::cancel::CancelToken;

/// How much of the clean room a read returns; `Sensitive` includes the
/// storage credential
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum View {
    Full,
    Sensitive,
}

/// Remote coordination service of a clean room
pub trait CleanroomService: Send + Sync {
    fn get_cleanroom(
        &self,
        view: View,
    ) -> impl Future<Output = Result<Cleanroom, CleanroomError>> + Send;

    /// Issues a new storage credential
    fn refresh_token(&self) -> impl Future<Output = Result<Cleanroom, CleanroomError>> + Send;

    /// Tells the clean room the advertiser finished its current step
    fn advance_state(&self) -> impl Future<Output = Result<Cleanroom, CleanroomError>> + Send;

    /// Storage credential of the clean room, refreshed when it expired
    fn get_downscoped_token(&self) -> impl Future<Output = Result<String, CleanroomError>> + Send {
        async move {
            let cleanroom = self.get_cleanroom(View::Sensitive).await?;
            let token = cleanroom
                .pair_config()?
                .token
                .clone()
                .ok_or(CleanroomError::MissingToken)?;

            if !token.is_expired(Utc::now()) {
                return Ok(token.token);
            }

            debug!("storage token expired, refreshing");
            let refreshed = self.refresh_token().await?;
            refreshed
                .pair_config()?
                .token
                .as_ref()
                .map(|t| t.token.clone())
                .ok_or(CleanroomError::MissingToken)
        }
    }

    fn get_config(&self) -> impl Future<Output = Result<PairConfig, CleanroomError>> + Send {
        async move {
            let cleanroom = self.get_cleanroom(View::Full).await?;
            Ok(cleanroom.pair_config()?.clone())
        }
    }

    /// Polls until the publisher reached `DataTransformed` or beyond
    fn wait_ready_for_match(
        &self,
        poll_interval: Duration,
        timeout: Duration,
        token: &CancelToken,
    ) -> impl Future<Output = Result<(), CleanroomError>> + Send {
        async move {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if token.is_cancelled() {
                    return Err(CleanroomError::Cancelled);
                }

                let (publisher, _) = self.get_cleanroom(View::Full).await?.states();
                if publisher >= ParticipantState::DataTransformed {
                    return Ok(());
                }

                let now = tokio::time::Instant::now();
                if now >= deadline {
                    return Err(CleanroomError::WaitTimeout(timeout));
                }
                debug!("publisher is {}, waiting", publisher);
                tokio::time::sleep(poll_interval.min(deadline - now)).await;
            }
        }
    }
}
