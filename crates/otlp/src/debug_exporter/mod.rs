// SPDX-License-Identifier: Apache-2.0

//! Implementation of the Debug Exporter node

/// allows the user to configure their debug exporter
pub mod config;
/// implements the debug counter to allow the debug exporter to keep track of certain stats
pub mod counter;
/// implements the otlp marshaler trait for a detailed verbosity output
pub mod detailed_otlp_marshaler;
/// debug exporter implementation
pub mod exporter;
/// helps take otlp data and extract data to report on
pub mod marshaler;
/// implements the otlp marshaler trait for a normal verbosity output
pub mod normal_otlp_marshaler;
