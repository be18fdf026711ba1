mod chat;
mod template;

pub use chat::{MessageTemplate, PromptTemplate};
pub use template::TextTemplate;
