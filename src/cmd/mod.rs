//! CLI command implementations.
//!
//! | Module  | Commands handled |
//! |---------|------------------|
//! | `run`   | `Run`            |
//! | `clean` | `Clean`          |
//! | `post`  | `Post`           |

pub mod clean;
pub mod post;
pub mod run;

pub use clean::cmd_clean;
pub use post::cmd_post_extract;
pub use run::{RunArgs, cmd_run};
