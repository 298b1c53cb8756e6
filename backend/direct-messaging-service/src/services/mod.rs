pub mod key_directory;
pub mod message_lifecycle;
pub mod presence;
pub mod uploads;

pub use key_directory::{KeyDirectory, PublishedKey};
pub use message_lifecycle::{MessageLifecycleManager, ReadOutcome, ReadTarget};
pub use presence::PresenceTracker;
pub use uploads::{ChunkedUploadManager, StartUpload, UploadStatus};
