// Copyright 2026 Scout Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scout engine library: acquisition resilience for AI agents.
//!
//! Acquires content from hostile, JavaScript-heavy web surfaces through a
//! stealth-postured Chromium session, detects blocked or challenged fetches,
//! and extracts typed facts (prices, transcripts, cleaned text, link
//! validity, video frames) through layered fallback chains.

pub mod config;
pub mod detect;
pub mod engine;
pub mod errors;
pub mod extract;
pub mod fallback;
pub mod rest;
pub mod search;
pub mod session;
pub mod settle;
pub mod snapshot;
pub mod transcript;
pub mod video;
pub mod vision;
