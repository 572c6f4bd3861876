//! Output writers for scraped articles.
//!
//! # Submodules
//!
//! - [`text`]: Appends `【title】` / body / separator sections to a text file
//! - [`json`]: Writes every scraped article to a single JSON array
//!
//! # Output Structure
//!
//! ```text
//! merged_articles.txt
//! ├── 【title 1】 + body + ======
//! ├── 【title 2】 + body + ======
//! └── ...
//! ```

pub mod json;
pub mod text;
