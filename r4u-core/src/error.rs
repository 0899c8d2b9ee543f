// Copyright 2025 R4U Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error taxonomy shared across the pipeline.
//!
//! Only the error kinds that can surface as an HTTP response or abort a
//! background job live here (`NotFound`, `BadRequest`, `Validation`,
//! `Internal`). Recoverable per-row failures (`ProviderCallFailed`,
//! `ParserFailed`, `OptimizerProduceEmpty`) are modeled as data — an
//! `error: Option<String>` field on the affected entity — not as variants of
//! this enum, per the pipeline's "no partial-success hiding" policy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("serde_json: {err}"))
    }
}
