pub mod db;
pub mod poller;
pub mod source;

pub use db::{NewsDb, NewsDbError};
pub use poller::{NewsPoller, PollReport};
pub use source::{MockNewsSource, NewsSource, RawArticle};
