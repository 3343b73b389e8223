//! Steward Engine Library
//!
//! This library provides the core functionality of the Steward engine:
//! an orchestration-and-governance core for autonomous agent tasks,
//! independent of any UI or network transport.

/// Configuration management module
pub mod config;

/// Vector memory and persistence module
pub mod memory;

/// Virtual file system and static analysis module
pub mod scanner;

/// Plugin registry module
pub mod plugins;

/// Planning and risk assessment module
pub mod decision;

/// Approval gating module
pub mod approval;

/// Top-level task orchestration module
pub mod orchestrator;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;
