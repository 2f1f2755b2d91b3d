/********************************************************************************
 * Copyright (c) 2025 Contributors to the gs-streamer project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use thiserror::Error;

/// Error taxonomy for topology construction and transport setup.
///
/// Per-entry configuration errors are caught and logged by the server so one
/// bad entry never aborts loading the rest of the topology; only errors that
/// make the topology as a whole non-functional (broker bind failures) are
/// allowed to escape startup.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("required configuration missing: {0}")]
    ConfigMissing(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("duplicate component name: {0}")]
    DuplicateName(String),

    #[error("invalid handler workflow: {0}")]
    InvalidWorkflow(String),

    #[error("connectivity error: {0}")]
    Connectivity(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TopologyError>;
