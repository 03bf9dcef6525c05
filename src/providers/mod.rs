// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External service integrations.

pub mod partner;

pub use partner::{AssetPage, AssetRecord, PartnerApi, PartnerClient, PartnerError, PartnerToken};
