//! # GPR Agent
//!
//! A natural-language query agent for ground-penetrating radar road survey
//! data.
//!
//! GPR Agent turns plain-language questions into validated, read-only SQL
//! over a SQLite database of scans, detected subsurface defects,
//! measurements, and repair history. A language model proposes the SQL; a
//! deterministic validation gate decides whether it runs. The same pipeline
//! backs a CLI, an interactive chat loop, and a JSON API for the web
//! dashboard.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐
//! │ Question │──▶│   Model   │──▶│ Validation │──▶│  SQLite   │
//! │  (text)  │   │ (SQL gen) │   │   gate    │   │ read-only │
//! └──────────┘   └───────────┘   └───────────┘   └────┬─────┘
//!                                                     │
//!                                 ┌───────────────────┤
//!                                 ▼                   ▼
//!                            ┌──────────┐       ┌──────────┐
//!                            │   CLI    │       │   HTTP   │
//!                            │  (gpr)   │       │ (serve)  │
//!                            └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gpr init --seed               # create database with sample survey data
//! gpr schema                    # what the agent is allowed to query
//! gpr ask "How many critical defects are there?"
//! gpr chat                      # interactive loop
//! gpr serve                     # start dashboard API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`catalog`] | Schema catalog read from the live database |
//! | [`model`] | SQL generation provider abstraction |
//! | [`validate`] | Deterministic SQL validation gate |
//! | [`mediator`] | Question pipeline and error taxonomy |
//! | [`format`] | Answer text and chart payload construction |
//! | [`history`] | Append-only question/answer log |
//! | [`stats`] | Dashboard summary statistics |
//! | [`chat`] | Interactive terminal session |
//! | [`server`] | Dashboard JSON API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`seed`] | Deterministic sample dataset |

pub mod catalog;
pub mod chat;
pub mod config;
pub mod db;
pub mod format;
pub mod history;
pub mod mediator;
pub mod migrate;
pub mod model;
pub mod models;
pub mod seed;
pub mod server;
pub mod stats;
pub mod validate;
