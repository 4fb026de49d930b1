//! CLI command implementations.
//!
//! | Module   | Commands handled                     |
//! |----------|--------------------------------------|
//! | `serve`  | `Serve`, `InitDb`                    |
//! | `views`  | `Week`, `Clients`, `Milestones`      |
//! | `config` | `Config`                             |

pub mod config;
pub mod serve;
pub mod views;

pub use config::cmd_config;
pub use serve::{cmd_init_db, cmd_serve};
pub use views::{cmd_clients, cmd_milestones, cmd_week};
