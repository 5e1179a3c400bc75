// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

pub mod crash_handler;
pub mod dump_context;
pub mod dump_producer;
pub mod signal_handler_manager;
