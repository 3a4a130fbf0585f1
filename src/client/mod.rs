// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Chat service client

pub mod backend;
pub mod http;
pub mod mock;

pub use backend::{
    records_list, ByteStream, ChatBackend, ChatRequest, DetailMessage, RecordsQuery,
    RequestMessages, DEFAULT_PAGE_SIZE,
};
pub use http::HttpBackend;
pub use mock::{MockBackend, MockReply};
