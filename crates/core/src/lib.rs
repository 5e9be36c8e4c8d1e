pub mod activity;
pub mod history;
pub mod timeline;

pub use activity::ActivityEvent;
pub use history::ActivityHistoryStore;
pub use timeline::Timeline;
