mod analysis;
mod prompts;
mod publish;
mod records;
mod settings;
mod sqlite;
mod tasks;

pub use sqlite::Storage;
