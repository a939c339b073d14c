//! Shared helpers for integration tests

#![allow(dead_code)]

#[path = "../../src/handlers/capture.rs"]
mod capture;

pub(crate) use capture::CaptureServer;
