pub mod capabilities;
pub mod catalog;
pub mod chat_stream;
pub mod message;
pub mod providers;
pub mod session;
pub mod thread;
