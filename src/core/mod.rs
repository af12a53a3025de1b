//! The facade the UI talks to: commands, polling, notices and the view
//! model for one peer in one session.
pub mod call_view;
pub mod controller;
pub mod notice;

pub use call_view::{CallTimer, CallView, Roster, format_elapsed};
pub use controller::CallController;
pub use notice::CallNotice;
