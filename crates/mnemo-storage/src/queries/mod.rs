// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules over the shared [`crate::Database`] handle.

pub mod memories;
pub mod search;
