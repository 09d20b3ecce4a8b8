//! Capabilities backed by external services: the chat gateway, remote
//! folder storage and plain HTTP image fetching.

pub mod drive;
pub mod gateway;
pub mod http;

pub use drive::{GoogleDriveStore, ObjectStore, RemoteFile, SharedObjectStore};
pub use gateway::{ChatGateway, Embed, SerenityGateway, SharedGateway};
pub use http::{FetchedImage, HttpImageSource, ImageSource, SharedImageSource};
