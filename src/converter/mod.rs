//!
//! Format conversion between the OpenAI chat API and the Bing bridge.
//!
//! Requests flow in through [`OpenAiToBingConverter`]; answers flow back out
//! through [`BingToOpenAiConverter`]. Each converter handles one direction.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod bing_to_openai;
pub mod openai_to_bing;

/* --- start of code -------------------------------------------------------------------------- */

pub use bing_to_openai::{BingToOpenAiConverter, DeltaTracker};
pub use openai_to_bing::{OpenAiToBingConverter, ParsedChat};
