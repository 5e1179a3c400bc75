// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

pub mod configuration;
pub mod constants;
