/*
 * Copyright (C) 2026 the flow-controller contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! Control-plane core library.
//!
//! Provides manifest synthesis, phase resolution, the store adapter, the log
//! pipeline, and the volume helper pod manager that together turn submitted
//! Python tasks and flows into Argo Workflows runs.

pub mod argo;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod error;
pub mod flow_run;
pub mod helper_pod;
pub mod http;
pub mod ids;
pub mod logs;
pub mod manifest;
pub mod monitor;
pub mod phase;
pub mod pvc;
pub mod store;
pub mod telemetry;
pub mod validation;
