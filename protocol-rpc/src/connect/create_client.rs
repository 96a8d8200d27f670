//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use protocol::cleanroom::CleanroomError;
use reqwest::Url;

use crate::connect::token::CleanroomToken;
use crate::proto::cleanroom::CleanroomClient;

/// Base URL of the coordination service, `https` unless the host says
/// otherwise
pub fn host_into_url(host: &str) -> Result<Url, CleanroomError> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(CleanroomError::Transport("issuer host is empty".to_string()));
    }

    let full = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };
    Url::parse(&full).map_err(|e| CleanroomError::Transport(format!("{}: {}", full, e)))
}

/// Client for the clean room named in `token`, on the host that issued it
///
/// `timeout` bounds every single request.
pub fn create_client(
    token: &CleanroomToken,
    timeout: Duration,
) -> Result<CleanroomClient, CleanroomError> {
    let url = host_into_url(&token.issuer_host)?;
    let http = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CleanroomError::Transport(e.to_string()))?;

    info!("Connecting to clean room {} at {}", token.cleanroom, url);
    Ok(CleanroomClient::new(
        http,
        url,
        &token.raw,
        &token.cleanroom,
    ))
}
