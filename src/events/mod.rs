// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! ERC-20 event definitions and log filters used by the alloy provider adapter

pub mod definitions;
pub mod filter;

pub use definitions::Transfer;
pub use filter::TransferFilterBuilder;
