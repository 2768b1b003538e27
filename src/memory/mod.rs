//! 记忆层：会话线程（短期记忆，进程内，不持久化）

pub mod thread;

pub use thread::{Message, Role, Thread};
