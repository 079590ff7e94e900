pub mod artifact;
pub mod classify;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod paginate;
pub mod pipeline;
pub mod rank;
pub mod record;
pub mod report;
pub mod util;
pub mod verify;
