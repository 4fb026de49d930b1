//! Dashboard HTTP back end.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌───────────────────────────────────────────────┐
//! │  Browser │ ───────> │  server.rs  (Router, ServerConfig)            │
//! │          │ <─────── │    └─ api.rs  (handlers, AppState, ApiError)  │
//! └──────────┘ WebSocket│         │                                     │
//!                       │         ├─ board::cache / views / mutations   │
//!                       │         └─ db.rs  (projects, schedule items)  │
//!                       │  poller.rs  ── try_refresh() every interval   │
//!                       │  ws.rs      <── CacheEvent + DashboardEvent   │
//!                       └───────────────────────────────────────────────┘
//! ```
//!
//! | Module   | Responsibility                                          |
//! |----------|---------------------------------------------------------|
//! | `models` | `Project`, `ScheduleItem`, `Session`                    |
//! | `db`     | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)     |
//! | `ws`     | `DashboardEvent` + `broadcast_event()` helper           |
//! | `poller` | Background snapshot refresh                             |
//!
//! ## Request Flow (drag a task onto Wednesday)
//!
//! 1. `PATCH /api/cards/{id}/planned-range` → `api::adjust_planned_range()`
//! 2. `MutationOrchestrator` resolves the target day, computes the new range
//!    and writes both planned-date fields in one request.
//! 3. The cache is invalidated; `CacheEvent::Invalidated` and
//!    `DashboardEvent::PlannedRangeChanged` reach every websocket client,
//!    which reload the weekly view.

pub mod api;
pub mod db;
pub mod models;
pub mod poller;
pub mod server;
pub mod ws;
