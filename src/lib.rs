//! # askdrive
//!
//! A terminal chat assistant grounded in documents from Google Drive.
//!
//! askdrive walks a Drive folder tree (or local paths), extracts text from
//! PDF, DOCX, and native Google documents, accumulates it in a
//! de-duplicated per-session context ledger, and feeds that context
//! wholesale into an LLM chat session. Replies can be saved back as DOCX
//! (locally or uploaded to Drive) or as synthesized speech.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Sources    │──▶│   Decode     │──▶│    Ledger     │
//! │ Drive/local │   │  PDF/DOCX   │   │ dedup+append │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                           │
//!                       ┌───────────────────┤
//!                       ▼                   ▼
//!                  ┌──────────┐       ┌──────────┐
//!                  │   Chat    │       │   Save    │
//!                  │ (Gemini) │       │ DOCX/WAV │
//!                  └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ask auth                        # verify the Drive credential
//! ask folders                     # browse the folder tree
//! ask read --deep --limit 5       # pull documents into the context
//! ask chat                        # talk about them
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`drive`] | Storage gateway (Drive v3 REST) |
//! | [`walker`] | Bounded folder-tree traversal |
//! | [`extract`] | PDF/DOCX text extraction |
//! | [`ledger`] | De-duplicated context accumulation |
//! | [`ingest`] | Batched read pipeline |
//! | [`session`] | Per-session state |
//! | [`chat`] | System instruction + completion provider |
//! | [`speech`] | Transcription and synthesis boundaries |
//! | [`render`] | DOCX rendering and save naming |
//! | [`repl`] | Interactive session |

pub mod chat;
pub mod config;
pub mod drive;
pub mod extract;
pub mod ingest;
pub mod ledger;
pub mod models;
pub mod progress;
pub mod render;
pub mod repl;
pub mod session;
pub mod speech;
pub mod walker;
