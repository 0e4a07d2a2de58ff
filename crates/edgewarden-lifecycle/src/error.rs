// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for edgewarden-lifecycle.

use thiserror::Error;

/// Lifecycle errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Container engine operation failed.
    #[error("Runtime error: {0}")]
    Runtime(#[from] crate::runtime::RuntimeError),

    /// Element was not found in the catalog.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Named registry was not found in the catalog.
    #[error("Registry not found: {0}")]
    RegistryNotFound(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using lifecycle [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
