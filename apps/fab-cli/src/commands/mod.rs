pub mod clear;
pub mod export;
pub mod list;
pub mod logs;
pub mod ping;
pub mod status;
pub mod util;
pub mod watch;
