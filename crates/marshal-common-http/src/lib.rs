// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP client construction for marshal.
//!
//! GitHub rejects API requests without a `User-Agent`, so every client in the
//! workspace is built from [`builder`].

mod client;

pub use client::{builder, new_client_with_timeout, user_agent};
