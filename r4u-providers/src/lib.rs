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

//! Provider Parser Registry (spec §4.A).
//!
//! Decodes raw HTTP trace bytes into a normalized [`r4u_core::Trace`].
//! Parsing is CPU-only and never suspends (spec §5), so every parser here is
//! a plain synchronous trait implementation — no `async_trait` needed.

mod generic;
mod openai;
mod registry;
mod sse;

pub use generic::GenericParser;
pub use openai::OpenAiParser;
pub use registry::{ParseRequest, ParserRegistry, ProviderParser};
