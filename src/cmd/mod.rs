//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `serve`   | `Serve`          |
//! | `ask`     | `Ask`            |
//! | `migrate` | `Migrate`        |
//! | `config`  | `Config`         |

pub mod ask;
pub mod config;
pub mod migrate;
pub mod serve;

pub use ask::cmd_ask;
pub use config::cmd_config;
pub use migrate::cmd_migrate;
pub use serve::cmd_serve;
