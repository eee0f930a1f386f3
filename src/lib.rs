pub mod catalog;
pub mod cli;
pub mod config;
pub mod logging;
pub mod parser;
pub mod source;
pub mod store;
pub mod sync;
pub mod ui;

pub use catalog::{CatalogItem, Locale};
pub use cli::{Cli, Commands};
pub use config::SeederConfig;
pub use ui::{LogUi, Phase, SilentUi, TerminalUi, Ui};
