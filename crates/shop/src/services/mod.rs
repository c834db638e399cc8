//! Business logic sitting between the routes and the repositories.

pub mod groups;
pub mod guest_tracking;
pub mod installer;

pub use groups::{GroupError, GroupService};
pub use guest_tracking::{GuestTracker, ReferenceCache, VisitorRequest};
pub use installer::{InstallError, Installer};
