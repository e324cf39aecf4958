//! Menu Photo Common Library
//!
//! CLIと他のフロントエンドで共有される型とユーティリティ（I/Oなし）

pub mod types;
pub mod menu;
pub mod sanitize;
pub mod namer;
pub mod progress;
pub mod prompts;
pub mod parser;

pub use types::{Classification, FallbackReason, InputItem, MatchOutcome, OutputRecord, FALLBACK_LABEL};
pub use menu::{MenuItem, MenuReference};
pub use sanitize::{brand_name, sanitize};
pub use namer::NameTracker;
pub use progress::ProgressCounter;
pub use prompts::{build_classify_prompt, build_menu_extraction_prompt};
pub use parser::{parse_label_reply, parse_menu_lines};
