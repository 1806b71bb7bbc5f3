// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Platform module - container-hosting backends.

pub mod dockhost;
pub mod mock;
mod traits;

pub use dockhost::{DockhostCli, DockhostConfig};
pub use mock::{MockPlatform, PlatformCall};
pub use traits::*;
