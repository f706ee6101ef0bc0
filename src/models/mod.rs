pub mod assignment;
pub mod classroom_record;
pub mod notification;
pub mod settings;
pub mod submission;
pub mod tracked_repository;
pub mod user;

pub use assignment::{Assignment, NewAssignment};
pub use classroom_record::{ClassroomRecord, NewClassroomRecord};
pub use notification::{Notification, DEADLINE_WARNING};
pub use settings::{AppSettings, NotifySettings};
pub use submission::Submission;
pub use tracked_repository::TrackedRepository;
pub use user::{ChatIdentity, Role, User};
