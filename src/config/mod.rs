// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Configuration module for Parley
//!
//! Handles loading, saving, and resolving user settings.

pub mod settings;

pub use settings::*;
