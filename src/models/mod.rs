pub mod activities;
pub mod attendees;
pub mod comments;
pub mod users;

pub use activities::{ActivityRow, HostLookupRow};
pub use attendees::{AttendanceRow, AttendeeRow};
pub use comments::CommentRow;
pub use users::UserRow;
