pub mod api;
pub mod auth;
pub mod directory;
pub mod election;
pub mod tally;
pub mod user;
pub mod vote;
