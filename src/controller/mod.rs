//! Session controller: the single owner of session state.

pub mod machine;
pub mod driver;

pub use machine::{Action, ControllerSettings, SessionController};
pub use driver::{Command, ControllerHandle, Services, spawn_controller};
