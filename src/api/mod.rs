pub mod chat;
pub mod movies;
pub mod parse;
