pub mod chat;
pub mod completion;
pub mod config;
pub mod constants;
pub mod dashboard;
pub mod error;
pub mod prompt;
pub mod render;
pub mod reveal;
pub mod session;
pub mod splitter;
pub mod web_server;

pub use completion::{CompletionClient, CompletionRequest, CompletionService, GeminiService};
pub use config::{ApiKey, Config};
pub use dashboard::Dashboard;
pub use error::{AdvisorError, CompletionError, ErrorKind};
pub use prompt::{Category, PromptBuilder};
pub use session::{Message, Role, Session, SessionStore, Turn};
pub use splitter::{split_reply, ChartRecord, SplitReply};
