pub mod animation;
pub mod app_config;
pub mod config;
pub mod error;
pub mod genesis;
pub mod monitor;
pub mod node_cli;
pub mod prompt;
pub mod proposal;
pub mod runner;
pub mod session;
pub mod shutdown;
pub mod workflow;

pub use config::Settings;
pub use error::{BridgeError, BridgeResult};
pub use node_cli::{NodeCli, VoteOption};
pub use prompt::Console;
pub use runner::{CommandRunner, Invocation, Mode, RunError, SystemRunner};
pub use session::{Dispatch, Phase, SessionState, StateFile};
pub use shutdown::NodeSession;
