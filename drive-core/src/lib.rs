mod client;

pub use client::{DriveClient, DriveError, FOLDER_MIME_TYPE, FilePage, RemoteEntry};
